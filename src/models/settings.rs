//! Global settings document.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::AppError;

/// Document collection holding the settings singleton.
pub const SETTINGS_COLLECTION: &str = "settings";
/// Document id of the settings singleton.
pub const SETTINGS_DOCUMENT_ID: &str = "general";

/// The singleton settings document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    pub show_deletion_confirmation: bool,
    /// Set while deletion confirmation is disabled and the revert is pending
    #[serde(default)]
    pub deletion_confirmation_disabled_at: Option<DateTime<Utc>>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            show_deletion_confirmation: true,
            deletion_confirmation_disabled_at: None,
        }
    }
}

/// Where the settings sit in the auto-revert state machine.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SettingsPhase {
    Enabled,
    DisabledPendingRevert,
}

impl Settings {
    /// Settings with deletion confirmation switched off at `at`.
    pub fn disabled_at(at: DateTime<Utc>) -> Self {
        Self {
            show_deletion_confirmation: false,
            deletion_confirmation_disabled_at: Some(at),
        }
    }

    pub fn phase(&self) -> SettingsPhase {
        if self.show_deletion_confirmation {
            SettingsPhase::Enabled
        } else {
            SettingsPhase::DisabledPendingRevert
        }
    }

    /// Check that the disabled timestamp is present exactly when confirmation is off.
    pub fn validate(&self) -> Result<(), AppError> {
        match (
            self.show_deletion_confirmation,
            self.deletion_confirmation_disabled_at,
        ) {
            (true, None) | (false, Some(_)) => Ok(()),
            (true, Some(_)) => Err(AppError::Validation(
                "deletionConfirmationDisabledAt must be null while confirmation is enabled"
                    .to_string(),
            )),
            (false, None) => Err(AppError::Validation(
                "deletionConfirmationDisabledAt is required while confirmation is disabled"
                    .to_string(),
            )),
        }
    }

    /// Decode a stored document, rejecting malformed payloads.
    pub fn from_document(value: serde_json::Value) -> Result<Self, AppError> {
        let settings: Settings = serde_json::from_value(value).map_err(|e| {
            AppError::Validation(format!("Malformed settings document: {}", e))
        })?;
        settings.validate()?;
        Ok(settings)
    }
}

/// Snapshot of the settings machine exposed to admin clients.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsStatus {
    pub settings: Settings,
    pub phase: SettingsPhase,
    /// When the pending auto-revert is due
    #[serde(skip_serializing_if = "Option::is_none")]
    pub revert_at: Option<DateTime<Utc>>,
    pub loading: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Message for the most recent background transition, cleared by the next disablement
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_notice: Option<String>,
}

/// Request body for toggling deletion confirmation.
#[derive(Debug, Clone, Deserialize)]
pub struct ToggleDeletionConfirmationRequest {
    pub enabled: bool,
}
