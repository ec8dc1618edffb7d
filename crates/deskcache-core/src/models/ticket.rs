use serde::{Deserialize, Serialize};

use crate::resources::Resource;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
#[serde(rename_all = "snake_case")]
pub enum TicketStatus {
    Open,
    InProgress,
    Closed,
    #[serde(other)]
    Unknown,
}

impl std::fmt::Display for TicketStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TicketStatus::Open => write!(f, "Open"),
            TicketStatus::InProgress => write!(f, "In Progress"),
            TicketStatus::Closed => write!(f, "Closed"),
            TicketStatus::Unknown => write!(f, "Unknown"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct Ticket {
    #[serde(default)]
    pub id: i64,
    #[serde(default)]
    pub title: String,
    pub status: TicketStatus,
    pub priority: Option<String>,
    pub assignee: Option<String>,
    pub description: Option<String>,
    #[serde(rename = "eventId")]
    pub event_id: Option<i64>,
    #[serde(rename = "updatedAt")]
    pub updated_at: Option<String>,
}

impl Resource for Ticket {
    const PATH: &'static str = "/tickets";
}

impl Ticket {
    pub fn is_open(&self) -> bool {
        matches!(self.status, TicketStatus::Open | TicketStatus::InProgress)
    }
}
