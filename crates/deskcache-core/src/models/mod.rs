//! Data models for deskcache records.
//!
//! - `Ticket`: work items with status and assignee
//! - `Event`: scheduled events, optionally linked to tickets
//! - `InventoryItem`: stock records with reorder levels

pub mod event;
pub mod inventory;
pub mod ticket;

pub use event::Event;
pub use inventory::InventoryItem;
pub use ticket::{Ticket, TicketStatus};
