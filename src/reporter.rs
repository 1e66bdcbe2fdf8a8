//! Best-effort status delivery.
//!
//! Progress strings are delivered as edits of the ephemeral "processing"
//! message. Status updates are cosmetic: a transient network failure is
//! swallowed so a flaky connection never aborts a running pipeline, while
//! every other delivery failure propagates to the orchestrator.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tracing::debug;

use crate::telegram::{TelegramClient, TelegramError};

/// Minimum spacing between throttled edits. Telegram rate-limits message
/// edits well below the cadence of download progress hooks.
const MIN_EDIT_INTERVAL: Duration = Duration::from_millis(1500);

/// Delivers progress strings to one ephemeral status message.
pub struct StatusReporter {
    client: Arc<TelegramClient>,
    chat_id: i64,
    message_id: i64,
    min_interval: Duration,
    last_edit: Mutex<Option<Instant>>,
}

impl StatusReporter {
    pub fn new(client: Arc<TelegramClient>, chat_id: i64, message_id: i64) -> Self {
        Self {
            client,
            chat_id,
            message_id,
            min_interval: MIN_EDIT_INTERVAL,
            last_edit: Mutex::new(None),
        }
    }

    /// Throttled edit: updates arriving inside the minimum interval are
    /// dropped. High-frequency download progress goes through here.
    pub async fn report(&self, text: &str) -> Result<(), TelegramError> {
        {
            let mut last = self.last_edit.lock().unwrap_or_else(|e| e.into_inner());
            if let Some(previous) = *last {
                if previous.elapsed() < self.min_interval {
                    return Ok(());
                }
            }
            *last = Some(Instant::now());
        }

        self.deliver(text).await
    }

    /// Unthrottled edit for phase transitions that must not be dropped.
    pub async fn report_now(&self, text: &str) -> Result<(), TelegramError> {
        {
            let mut last = self.last_edit.lock().unwrap_or_else(|e| e.into_inner());
            *last = Some(Instant::now());
        }

        self.deliver(text).await
    }

    async fn deliver(&self, text: &str) -> Result<(), TelegramError> {
        match self
            .client
            .edit_message_text(self.chat_id, self.message_id, text)
            .await
        {
            Ok(()) => Ok(()),
            Err(e) if e.is_transient() => {
                debug!(error = %e, "dropping transient status delivery failure");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}
