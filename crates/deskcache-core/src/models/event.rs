use chrono::DateTime;
use serde::{Deserialize, Serialize};

use crate::resources::Resource;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct Event {
    #[serde(default)]
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    #[serde(rename = "startDate")]
    pub start_date: Option<String>,
    #[serde(rename = "endDate")]
    pub end_date: Option<String>,
    pub location: Option<String>,
    #[serde(rename = "ticketIds", default)]
    pub ticket_ids: Vec<i64>,
}

impl Resource for Event {
    const PATH: &'static str = "/events";
}

impl Event {
    /// "Feb 06, 2026", or "TBD" without a start date.
    pub fn formatted_date(&self) -> String {
        match &self.start_date {
            Some(date) => {
                if let Ok(dt) = DateTime::parse_from_rfc3339(date) {
                    dt.format("%b %d, %Y").to_string()
                } else {
                    // Fall back to raw date string, truncate if too long
                    date.chars().take(10).collect()
                }
            }
            None => "TBD".to_string(),
        }
    }

    /// True when both dates parse and the end precedes the start.
    pub fn has_inverted_dates(&self) -> bool {
        let parse = |d: &Option<String>| d.as_deref().and_then(|s| DateTime::parse_from_rfc3339(s).ok());
        match (parse(&self.start_date), parse(&self.end_date)) {
            (Some(start), Some(end)) => end < start,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(start: Option<&str>, end: Option<&str>) -> Event {
        Event {
            id: 1,
            name: "Quarterly stocktake".into(),
            description: None,
            start_date: start.map(String::from),
            end_date: end.map(String::from),
            location: None,
            ticket_ids: Vec::new(),
        }
    }

    #[test]
    fn test_formatted_date() {
        assert_eq!(event(Some("2026-02-06T19:00:00Z"), None).formatted_date(), "Feb 06, 2026");
        assert_eq!(event(Some("2026-02-06 evening"), None).formatted_date(), "2026-02-06");
        assert_eq!(event(None, None).formatted_date(), "TBD");
    }

    #[test]
    fn test_inverted_dates() {
        assert!(event(Some("2026-02-06T19:00:00Z"), Some("2026-02-05T19:00:00Z")).has_inverted_dates());
        assert!(!event(Some("2026-02-06T19:00:00Z"), Some("2026-02-07T19:00:00Z")).has_inverted_dates());
        assert!(!event(Some("2026-02-06T19:00:00Z"), None).has_inverted_dates());
    }

    #[test]
    fn test_deserialize_camel_case() {
        let json = r#"{"id": 4, "name": "Audit", "startDate": "2026-03-01T09:00:00Z", "ticketIds": [1, 2]}"#;
        let event: Event = serde_json::from_str(json).unwrap();
        assert_eq!(event.ticket_ids, vec![1, 2]);
        assert!(event.end_date.is_none());
    }
}
