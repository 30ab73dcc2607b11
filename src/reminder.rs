//! Outcome reminders.
//!
//! After each single-shot hype a reminder is scheduled to nudge the user to
//! log how it went. Reminders are keyed by session id, fire once after a
//! delay, and are cancelled when the outcome gets logged first.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// A reminder to log the outcome of one session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reminder {
    pub session_id: Uuid,
    /// Scenario label shown in the reminder body.
    pub scenario: String,
    pub delay: Duration,
}

impl Reminder {
    /// Stable key: `winlog_<session id>`.
    pub fn key(&self) -> String {
        reminder_key(self.session_id)
    }

    /// Human-readable reminder text.
    pub fn body(&self) -> String {
        format!("How did your {} go? Log your result!", self.scenario)
    }
}

pub fn reminder_key(session_id: Uuid) -> String {
    format!("winlog_{session_id}")
}

/// A reminder whose delay elapsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FiredReminder {
    pub key: String,
    pub session_id: Uuid,
    pub body: String,
}

/// Notification scheduler seam. Fire-and-forget: nothing is returned.
pub trait ReminderScheduler: Send + Sync {
    fn schedule(&self, reminder: Reminder);

    /// Cancel a pending reminder. No-op if none is pending.
    fn cancel(&self, session_id: Uuid);
}

/// Scheduler that only logs. Used when reminders are disabled.
#[derive(Debug, Default)]
pub struct NoopReminders;

impl ReminderScheduler for NoopReminders {
    fn schedule(&self, reminder: Reminder) {
        debug!(key = %reminder.key(), "reminders disabled; not scheduling");
    }

    fn cancel(&self, _session_id: Uuid) {}
}

/// Tokio-timer scheduler; fired reminders are sent on a channel.
pub struct TokioReminders {
    fired_tx: mpsc::UnboundedSender<FiredReminder>,
    pending: Arc<Mutex<HashMap<String, CancellationToken>>>,
}

impl TokioReminders {
    pub fn new(fired_tx: mpsc::UnboundedSender<FiredReminder>) -> Self {
        Self {
            fired_tx,
            pending: Default::default(),
        }
    }

    /// Number of reminders waiting to fire.
    pub fn pending_count(&self) -> usize {
        self.pending.lock().map(|p| p.len()).unwrap_or(0)
    }
}

impl ReminderScheduler for TokioReminders {
    fn schedule(&self, reminder: Reminder) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!(key = %reminder.key(), "no async runtime; reminder not scheduled");
            return;
        };

        let key = reminder.key();
        let token = CancellationToken::new();
        match self.pending.lock() {
            Ok(mut pending) => {
                if let Some(previous) = pending.insert(key.clone(), token.clone()) {
                    previous.cancel();
                }
            }
            Err(e) => {
                warn!(error = %e, "reminder table poisoned; reminder not scheduled");
                return;
            }
        }

        let fired_tx = self.fired_tx.clone();
        let pending = Arc::clone(&self.pending);
        info!(key = %key, delay_secs = reminder.delay.as_secs(), "outcome reminder scheduled");

        runtime.spawn(async move {
            tokio::select! {
                () = token.cancelled() => return,
                () = tokio::time::sleep(reminder.delay) => {}
            }
            // A reschedule may have raced the timer; the replacement owns the key.
            match pending.lock() {
                Ok(mut pending) => {
                    if token.is_cancelled() {
                        return;
                    }
                    pending.remove(&key);
                }
                Err(_) => return,
            }
            let fired = FiredReminder {
                key,
                session_id: reminder.session_id,
                body: reminder.body(),
            };
            if fired_tx.send(fired).is_err() {
                debug!("reminder receiver dropped");
            }
        });
    }

    fn cancel(&self, session_id: Uuid) {
        let key = reminder_key(session_id);
        let token = match self.pending.lock() {
            Ok(mut pending) => pending.remove(&key),
            Err(_) => None,
        };
        if let Some(token) = token {
            token.cancel();
            debug!(key = %key, "outcome reminder cancelled");
        }
    }
}

impl Drop for TokioReminders {
    fn drop(&mut self) {
        if let Ok(mut pending) = self.pending.lock() {
            for (_, token) in pending.drain() {
                token.cancel();
            }
        }
    }
}
