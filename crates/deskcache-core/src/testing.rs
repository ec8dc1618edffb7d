//! Scripted network for unit tests.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;

use crate::api::{HttpRequest, RawResponse, Transport, TransportError};

enum Scripted {
    Respond(Result<RawResponse, TransportError>),
    Hang,
}

/// Replays queued responses in order. An empty queue behaves like an
/// unplugged network cable.
#[derive(Default)]
pub(crate) struct FakeTransport {
    script: Mutex<VecDeque<Scripted>>,
    requests: Mutex<Vec<HttpRequest>>,
}

impl FakeTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn push(&self, item: Scripted) {
        self.script.lock().unwrap().push_back(item);
    }

    pub fn push_json(&self, status: u16, body: Value) {
        self.push(Scripted::Respond(Ok(RawResponse {
            status,
            content_type: Some("application/json".to_string()),
            body: body.to_string(),
        })));
    }

    pub fn push_text(&self, status: u16, body: &str) {
        self.push(Scripted::Respond(Ok(RawResponse {
            status,
            content_type: Some("text/plain".to_string()),
            body: body.to_string(),
        })));
    }

    pub fn push_raw(&self, response: RawResponse) {
        self.push(Scripted::Respond(Ok(response)));
    }

    pub fn push_error(&self, error: TransportError) {
        self.push(Scripted::Respond(Err(error)));
    }

    /// The next request never completes.
    pub fn push_hang(&self) {
        self.push(Scripted::Hang);
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn send(&self, request: HttpRequest) -> Result<RawResponse, TransportError> {
        self.requests.lock().unwrap().push(request);
        let next = self.script.lock().unwrap().pop_front();
        match next {
            Some(Scripted::Respond(result)) => result,
            Some(Scripted::Hang) => std::future::pending().await,
            None => Err(TransportError::Connect("network unreachable".to_string())),
        }
    }
}
