//! Settings state machine.
//!
//! Owns the `settings/general` document: keeps a local copy in sync with the
//! document store subscription and runs the deletion-confirmation auto-revert.
//!
//! Phases are `Enabled` and `DisabledPendingRevert`. Disabling schedules a
//! one-shot revert at `disabledAt + AUTO_REVERT_DELAY`; re-enabling, or any
//! store update, cancels it and reschedules from the new document. Every
//! schedule bumps an epoch, and a revert that wakes up with a stale epoch is
//! a [`AppError::TimerRace`] that gets logged at debug and dropped.

use std::sync::{Arc, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;

use crate::errors::AppError;
use crate::models::{Settings, SettingsStatus, SETTINGS_COLLECTION, SETTINGS_DOCUMENT_ID};
use crate::store::{DocumentStore, Subscription};

/// How long deletion confirmation stays off before it is switched back on.
pub const AUTO_REVERT_DELAY: Duration = Duration::from_secs(5 * 60);

const NOTICE_CHANNEL_CAPACITY: usize = 16;

/// How far ahead of the local clock a written disable timestamp may be.
const MAX_CLOCK_SKEW: Duration = Duration::from_secs(30);

/// User-facing notifications raised by background transitions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SettingsNotice {
    DeletionConfirmationReEnabled,
}

impl SettingsNotice {
    pub fn message(&self) -> &'static str {
        match self {
            SettingsNotice::DeletionConfirmationReEnabled => {
                "Delete confirmation has been automatically re-enabled"
            }
        }
    }
}

/// Handle to the running settings machine.
///
/// Dropping it (or calling [`SettingsMachine::shutdown`]) stops the store
/// subscription and cancels any pending revert.
pub struct SettingsMachine {
    inner: Arc<Inner>,
    listener: JoinHandle<()>,
}

struct Inner {
    store: Arc<dyn DocumentStore>,
    revert_delay: Duration,
    state: Mutex<MachineState>,
    notices: broadcast::Sender<SettingsNotice>,
}

struct MachineState {
    settings: Settings,
    loading: bool,
    error: Option<String>,
    revert: Option<PendingRevert>,
    last_notice: Option<SettingsNotice>,
    epoch: u64,
    closed: bool,
}

struct PendingRevert {
    epoch: u64,
    due: DateTime<Utc>,
    handle: JoinHandle<()>,
}

impl SettingsMachine {
    /// Load the settings document (creating it with defaults if absent) and
    /// start following it.
    pub async fn start(store: Arc<dyn DocumentStore>) -> Self {
        Self::with_revert_delay(store, AUTO_REVERT_DELAY).await
    }

    async fn with_revert_delay(store: Arc<dyn DocumentStore>, revert_delay: Duration) -> Self {
        let (notices, _) = broadcast::channel(NOTICE_CHANNEL_CAPACITY);
        let inner = Arc::new(Inner {
            store,
            revert_delay,
            state: Mutex::new(MachineState {
                settings: Settings::default(),
                loading: true,
                error: None,
                revert: None,
                last_notice: None,
                epoch: 0,
                closed: false,
            }),
            notices,
        });

        // Subscribe before the initial read so no write slips between the two.
        let subscription = inner
            .store
            .subscribe(SETTINGS_COLLECTION, SETTINGS_DOCUMENT_ID);
        inner.load().await;

        let listener = tokio::spawn(listen(Arc::downgrade(&inner), subscription));

        Self { inner, listener }
    }

    pub async fn current_settings(&self) -> Settings {
        self.inner.state.lock().await.settings.clone()
    }

    pub async fn status(&self) -> SettingsStatus {
        let state = self.inner.state.lock().await;
        SettingsStatus {
            settings: state.settings.clone(),
            phase: state.settings.phase(),
            revert_at: state.revert.as_ref().map(|r| r.due),
            loading: state.loading,
            error: state.error.clone(),
            last_notice: state.last_notice.as_ref().map(|n| n.message().to_string()),
        }
    }

    /// Whether destructive catalog operations must be confirmed.
    pub async fn requires_deletion_confirmation(&self) -> bool {
        self.inner.state.lock().await.settings.show_deletion_confirmation
    }

    /// Replace the settings document.
    ///
    /// A disable timestamp in the future is rejected: the revert deadline is
    /// always measured from when confirmation actually went off.
    pub async fn update(&self, settings: Settings) -> Result<Settings, AppError> {
        settings.validate()?;
        if let Some(at) = settings.deletion_confirmation_disabled_at {
            let skew = chrono::Duration::from_std(MAX_CLOCK_SKEW)
                .unwrap_or_else(|_| chrono::Duration::zero());
            if at > Utc::now() + skew {
                return Err(AppError::Validation(format!(
                    "deletionConfirmationDisabledAt {} is in the future",
                    at
                )));
            }
        }
        if self.inner.state.lock().await.closed {
            return Err(AppError::Internal(
                "Settings machine has been shut down".to_string(),
            ));
        }

        if let Err(e) = self.inner.write(&settings).await {
            self.inner.record_error(&e).await;
            return Err(e);
        }
        self.inner.apply(settings.clone()).await;
        Ok(settings)
    }

    /// Switch deletion confirmation on or off. Switching it off stamps the
    /// current time, which starts the auto-revert countdown.
    pub async fn toggle_deletion_confirmation(&self, enabled: bool) -> Result<Settings, AppError> {
        let next = if enabled {
            Settings::default()
        } else {
            Settings::disabled_at(Utc::now())
        };
        tracing::info!(enabled, "Toggling deletion confirmation");
        self.update(next).await
    }

    pub fn subscribe_notices(&self) -> broadcast::Receiver<SettingsNotice> {
        self.inner.notices.subscribe()
    }

    /// Stop following the store and cancel any pending revert.
    pub async fn shutdown(&self) {
        self.listener.abort();
        let mut state = self.inner.state.lock().await;
        state.closed = true;
        if let Some(revert) = state.revert.take() {
            revert.handle.abort();
        }
        tracing::debug!("Settings machine shut down");
    }
}

impl Drop for SettingsMachine {
    fn drop(&mut self) {
        self.listener.abort();
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        if let Some(revert) = self.state.get_mut().revert.take() {
            revert.handle.abort();
        }
    }
}

impl Inner {
    async fn load(self: &Arc<Self>) {
        match self
            .store
            .get_document(SETTINGS_COLLECTION, SETTINGS_DOCUMENT_ID)
            .await
        {
            Ok(Some(value)) => self.apply_document(value).await,
            Ok(None) => {
                let defaults = Settings::default();
                tracing::info!("Settings document missing, writing defaults");
                if let Err(e) = self.write(&defaults).await {
                    self.record_error(&e).await;
                }
                self.apply(defaults).await;
            }
            Err(e) => self.record_error(&e).await,
        }

        self.state.lock().await.loading = false;
    }

    async fn write(&self, settings: &Settings) -> Result<(), AppError> {
        let value = serde_json::to_value(settings)
            .map_err(|e| AppError::Internal(format!("Failed to encode settings: {}", e)))?;
        self.store
            .set_document(SETTINGS_COLLECTION, SETTINGS_DOCUMENT_ID, value)
            .await
    }

    async fn apply_document(self: &Arc<Self>, value: serde_json::Value) {
        match Settings::from_document(value) {
            Ok(settings) => self.apply(settings).await,
            Err(e) => self.record_error(&e).await,
        }
    }

    /// Make `settings` authoritative and re-evaluate the revert timer.
    async fn apply(self: &Arc<Self>, settings: Settings) {
        let mut state = self.state.lock().await;
        if state.closed {
            return;
        }
        state.error = None;

        let settled = settings.show_deletion_confirmation || state.revert.is_some();
        if state.settings == settings && settled {
            return;
        }

        state.settings = settings;
        self.reschedule(&mut state);
    }

    /// Cancel the pending revert, then schedule a new one if confirmation is off.
    fn reschedule(self: &Arc<Self>, state: &mut MachineState) {
        if let Some(previous) = state.revert.take() {
            previous.handle.abort();
        }

        let Some(disabled_at) = state.settings.deletion_confirmation_disabled_at else {
            return;
        };
        if state.settings.show_deletion_confirmation {
            return;
        }

        let delay = chrono::Duration::from_std(self.revert_delay)
            .unwrap_or_else(|_| chrono::Duration::zero());
        // A future timestamp from the store counts as disabled now.
        let now = Utc::now();
        let due = disabled_at.min(now) + delay;
        let remaining = (due - now).to_std().unwrap_or(Duration::ZERO);

        state.epoch += 1;
        let epoch = state.epoch;
        let inner = Arc::downgrade(self);
        let handle = tokio::spawn(async move {
            tokio::time::sleep(remaining).await;
            if let Some(inner) = inner.upgrade() {
                inner.fire_revert(epoch).await;
            }
        });

        tracing::debug!(epoch, due = %due, "Scheduled deletion confirmation revert");
        state.revert = Some(PendingRevert { epoch, due, handle });
        state.last_notice = None;
    }

    async fn fire_revert(self: &Arc<Self>, epoch: u64) {
        match self.revert(epoch).await {
            Ok(()) => {}
            Err(AppError::TimerRace(msg)) => tracing::debug!("Auto-revert suppressed: {}", msg),
            Err(e) => tracing::error!("Failed to re-enable deletion confirmation: {}", e),
        }
    }

    /// At most one attempt per disablement: the pending slot is cleared before
    /// writing, so a failed write is not retried.
    async fn revert(self: &Arc<Self>, epoch: u64) -> Result<(), AppError> {
        {
            let mut state = self.state.lock().await;
            let current = state.revert.as_ref().map(|r| r.epoch);
            if state.closed || current != Some(epoch) {
                return Err(AppError::TimerRace(format!(
                    "revert {} superseded by {:?}",
                    epoch, current
                )));
            }
            if state.settings.show_deletion_confirmation {
                state.revert = None;
                return Err(AppError::TimerRace(format!(
                    "revert {} fired after manual re-enable",
                    epoch
                )));
            }
            state.revert = None;
        }

        let enabled = Settings::default();
        self.write(&enabled).await?;
        self.apply(enabled).await;

        tracing::debug!(epoch, "Auto-revert written");
        let notice = SettingsNotice::DeletionConfirmationReEnabled;
        self.state.lock().await.last_notice = Some(notice.clone());
        if self.notices.send(notice).is_err() {
            tracing::debug!("No notice subscribers");
        }
        Ok(())
    }

    async fn record_error(&self, error: &AppError) {
        tracing::warn!("Settings store error: {}", error);
        self.state.lock().await.error = Some(error.message());
    }
}

/// Apply every change delivered by the store until the machine goes away.
async fn listen(inner: Weak<Inner>, mut subscription: Subscription) {
    while let Some(change) = subscription.next().await {
        let Some(inner) = inner.upgrade() else {
            break;
        };
        match change {
            Ok(value) => inner.apply_document(value).await,
            Err(e) => {
                inner.record_error(&e).await;
                // Missed updates: resync from the stored document.
                match inner
                    .store
                    .get_document(SETTINGS_COLLECTION, SETTINGS_DOCUMENT_ID)
                    .await
                {
                    Ok(Some(value)) => inner.apply_document(value).await,
                    Ok(None) => {}
                    Err(e) => inner.record_error(&e).await,
                }
            }
        }
    }
    tracing::debug!("Settings subscription ended");
}
