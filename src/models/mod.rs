//! Data models for the Lodestone application.
//!
//! Field names serialize in camelCase to match the web client.

mod hub;
mod list;
mod provision;
mod settings;

pub use hub::*;
pub use list::*;
pub use provision::*;
pub use settings::*;
