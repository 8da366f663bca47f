//! Provision model: a single item definition a hub can hand out.

use serde::{Deserialize, Serialize};

/// Ordinal rarity tier. Rarer tiers sort after more common ones.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Rarity {
    Common,
    Uncommon,
    Rare,
    VeryRare,
    Legendary,
}

impl Rarity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Rarity::Common => "common",
            Rarity::Uncommon => "uncommon",
            Rarity::Rare => "rare",
            Rarity::VeryRare => "very_rare",
            Rarity::Legendary => "legendary",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "common" => Some(Rarity::Common),
            "uncommon" => Some(Rarity::Uncommon),
            "rare" => Some(Rarity::Rare),
            "very_rare" | "very rare" | "very-rare" => Some(Rarity::VeryRare),
            "legendary" => Some(Rarity::Legendary),
            _ => None,
        }
    }
}

impl std::fmt::Display for Rarity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An item definition belonging to a resource hub.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Provision {
    pub id: String,
    pub name: String,
    pub rarity: Rarity,
    pub price: f64,
    pub hub_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    /// Internal version for optimistic concurrency control
    #[serde(default)]
    pub version: i64,
}

/// Request body for creating a new provision.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateProvisionRequest {
    pub name: String,
    pub rarity: Rarity,
    pub price: f64,
    pub hub_id: String,
    #[serde(default)]
    pub description: Option<String>,
}

/// Request body for updating an existing provision.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProvisionRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub rarity: Option<Rarity>,
    #[serde(default)]
    pub price: Option<f64>,
    /// Moves the provision to another hub
    #[serde(default)]
    pub hub_id: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    /// Expected version for optimistic concurrency control
    #[serde(default)]
    pub expected_version: Option<i64>,
}

/// Prices must be finite and strictly positive.
pub fn is_valid_price(price: f64) -> bool {
    price.is_finite() && price > 0.0
}
