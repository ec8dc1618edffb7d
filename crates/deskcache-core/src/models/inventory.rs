use serde::{Deserialize, Serialize};

use crate::resources::Resource;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct InventoryItem {
    #[serde(default)]
    pub id: i64,
    pub name: String,
    pub sku: Option<String>,
    #[serde(default)]
    pub quantity: i64,
    pub location: Option<String>,
    #[serde(rename = "reorderLevel")]
    pub reorder_level: Option<i64>,
}

impl Resource for InventoryItem {
    const PATH: &'static str = "/inventory";
}

impl InventoryItem {
    /// At or below the reorder level. Items without one never need reordering.
    pub fn needs_reorder(&self) -> bool {
        self.reorder_level
            .map(|level| self.quantity <= level)
            .unwrap_or(false)
    }
}
