use reqwest::Method;
use serde_json::Value;

/// A request relative to the configured API base URL.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: Option<Value>,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            body: None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>, body: Value) -> Self {
        Self::new(Method::POST, path).with_body(body)
    }

    pub fn put(path: impl Into<String>, body: Value) -> Self {
        Self::new(Method::PUT, path).with_body(body)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    /// Append a filter object as query parameters.
    ///
    /// Keys are emitted in sorted order. `null` values are skipped, arrays
    /// repeat the key once per element, nested objects are sent as JSON.
    pub fn with_filters(mut self, filters: &Value) -> Self {
        self.query.extend(query_pairs(filters));
        self
    }
}

fn query_pairs(filters: &Value) -> Vec<(String, String)> {
    let Value::Object(map) = filters else {
        return Vec::new();
    };

    let mut keys: Vec<&String> = map.keys().collect();
    keys.sort();

    let mut pairs = Vec::new();
    for key in keys {
        match &map[key.as_str()] {
            Value::Array(items) => {
                for item in items {
                    if let Some(value) = scalar(item) {
                        pairs.push((key.clone(), value));
                    }
                }
            }
            other => {
                if let Some(value) = scalar(other) {
                    pairs.push((key.clone(), value));
                }
            }
        }
    }
    pairs
}

fn scalar(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        nested => Some(nested.to_string()),
    }
}
