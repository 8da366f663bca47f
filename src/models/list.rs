//! Generated list snapshots and the generation endpoint payloads.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Rarity;

/// One aggregated line of a generated list.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ListItem {
    pub provision_id: String,
    pub name: String,
    pub rarity: Rarity,
    pub price: f64,
    pub count: u32,
}

/// Immutable snapshot produced by one generation request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedList {
    pub id: String,
    pub hub_id: String,
    pub hub_name: String,
    pub items: Vec<ListItem>,
    pub timestamp: DateTime<Utc>,
}

impl GeneratedList {
    /// Sum of `price * count` over all lines.
    pub fn total_value(&self) -> f64 {
        self.items
            .iter()
            .map(|item| item.price * f64::from(item.count))
            .sum()
    }
}

/// Request body for POST /api/generate.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateRequest {
    pub hub_id: String,
    /// Overrides the configured random draw count
    #[serde(default)]
    pub draws: Option<usize>,
}

/// Line of the generation response; `id` is the provision id.
#[derive(Debug, Clone, Serialize)]
pub struct GeneratedItemResponse {
    pub id: String,
    pub name: String,
    pub rarity: Rarity,
    pub price: f64,
    pub count: u32,
}

/// Response body for POST /api/generate.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateResponse {
    pub id: String,
    pub hub_id: String,
    pub hub_name: String,
    pub items: Vec<GeneratedItemResponse>,
    pub total_value: f64,
    pub timestamp: DateTime<Utc>,
}

impl From<&GeneratedList> for GenerateResponse {
    fn from(list: &GeneratedList) -> Self {
        Self {
            id: list.id.clone(),
            hub_id: list.hub_id.clone(),
            hub_name: list.hub_name.clone(),
            items: list
                .items
                .iter()
                .map(|item| GeneratedItemResponse {
                    id: item.provision_id.clone(),
                    name: item.name.clone(),
                    rarity: item.rarity,
                    price: item.price,
                    count: item.count,
                })
                .collect(),
            total_value: list.total_value(),
            timestamp: list.timestamp,
        }
    }
}
