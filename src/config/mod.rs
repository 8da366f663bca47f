//! Configuration module for the Lodestone backend.
//!
//! All configuration is loaded from environment variables with sensible defaults.

use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;

use crate::generator::{DrawRange, RarityWeights};

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Pre-shared key guarding the admin routes
    pub api_psk: Option<String>,
    /// Path to SQLite database file backing the catalog and document store
    pub db_path: PathBuf,
    /// Directory for the local list history
    pub history_dir: PathBuf,
    /// Address to bind the server to
    pub bind_addr: SocketAddr,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Selection weight per rarity tier
    pub rarity_weights: RarityWeights,
    /// Bounds for the number of draws per generated list
    pub draws: DrawRange,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let api_psk = env::var("LODESTONE_API_PSK")
            .ok()
            .filter(|psk| !psk.trim().is_empty());

        let db_path = env::var("LODESTONE_DB_PATH")
            .unwrap_or_else(|_| "./data/lodestone.sqlite".to_string())
            .into();

        let history_dir = env::var("LODESTONE_HISTORY_DIR")
            .unwrap_or_else(|_| "./data/history".to_string())
            .into();

        let bind_addr = env::var("LODESTONE_BIND_ADDR")
            .ok()
            .and_then(|raw| match raw.parse() {
                Ok(addr) => Some(addr),
                Err(e) => {
                    tracing::warn!("Invalid LODESTONE_BIND_ADDR {:?}: {}", raw, e);
                    None
                }
            })
            .unwrap_or_else(default_bind_addr);

        let log_level = env::var("LODESTONE_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        let rarity_weights = env::var("LODESTONE_RARITY_WEIGHTS")
            .ok()
            .and_then(|raw| match RarityWeights::parse(&raw) {
                Ok(weights) => Some(weights),
                Err(e) => {
                    tracing::warn!("Ignoring LODESTONE_RARITY_WEIGHTS: {}", e);
                    None
                }
            })
            .unwrap_or_default();

        let draws = draw_range_from_env();

        Self {
            api_psk,
            db_path,
            history_dir,
            bind_addr,
            log_level,
            rarity_weights,
            draws,
        }
    }
}

fn default_bind_addr() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 8080))
}

fn draw_range_from_env() -> DrawRange {
    let default = DrawRange::default();
    let min = env_usize("LODESTONE_MIN_DRAWS").unwrap_or(default.min);
    let max = env_usize("LODESTONE_MAX_DRAWS").unwrap_or(default.max);

    match DrawRange::new(min, max) {
        Ok(range) => range,
        Err(e) => {
            tracing::warn!("Ignoring draw bounds: {}", e);
            default
        }
    }
}

fn env_usize(key: &str) -> Option<usize> {
    let raw = env::var(key).ok()?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!("Ignoring {}: {:?} is not a number", key, raw);
            None
        }
    }
}
