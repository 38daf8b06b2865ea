//! In-process one-shot timers on the Tokio runtime.
//!
//! Each registration is a spawned task that sleeps until its instant and then
//! hands the payload to the fired channel. The service loop drains that
//! channel, so the fire handler never runs inside the timer task itself.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use busreminder_core::ReminderPayload;
use busreminder_scheduler::{SchedulerError, TimerKey, TimerService};
use chrono::{DateTime, Duration, Utc};
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

struct Entry {
    generation: u64,
    task: JoinHandle<()>,
}

#[derive(Default)]
struct Registry {
    next_generation: u64,
    entries: HashMap<TimerKey, Entry>,
}

pub struct TokioTimerService {
    handle: Handle,
    registry: Arc<Mutex<Registry>>,
    fired_tx: mpsc::Sender<ReminderPayload>,
    exact: bool,
}

impl TokioTimerService {
    /// `exact = false` makes the service refuse exact registrations, as a
    /// platform without the exact-alarm permission would.
    pub fn new(handle: Handle, fired_tx: mpsc::Sender<ReminderPayload>, exact: bool) -> Self {
        Self {
            handle,
            registry: Arc::new(Mutex::new(Registry::default())),
            fired_tx,
            exact,
        }
    }

    /// Number of registrations that have not fired or been cancelled.
    pub fn pending(&self) -> usize {
        self.registry
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entries
            .len()
    }

    fn spawn(&self, key: &TimerKey, at: DateTime<Utc>, payload: ReminderPayload) -> busreminder_scheduler::Result<()> {
        if self.fired_tx.is_closed() {
            return Err(SchedulerError::TimerUnavailable(
                "fired channel closed".to_string(),
            ));
        }

        let mut registry = self.registry.lock().unwrap_or_else(PoisonError::into_inner);
        registry.next_generation += 1;
        let generation = registry.next_generation;

        let delay = (at - Utc::now()).to_std().unwrap_or_default();
        let tx = self.fired_tx.clone();
        let owner = Arc::clone(&self.registry);
        let task_key = key.clone();
        let task = self.handle.spawn(async move {
            tokio::time::sleep(delay).await;
            {
                let mut registry = owner.lock().unwrap_or_else(PoisonError::into_inner);
                // A newer registration under the same key owns the slot now.
                if registry.entries.get(&task_key).map(|e| e.generation) == Some(generation) {
                    registry.entries.remove(&task_key);
                }
            }
            debug!(key = %task_key, favorite_id = %payload.favorite.id, "timer fired");
            if tx.try_send(payload).is_err() {
                warn!(key = %task_key, "fired channel full or closed; reminder dropped");
            }
        });

        if let Some(old) = registry.entries.insert(key.clone(), Entry { generation, task }) {
            old.task.abort();
        }
        Ok(())
    }
}

impl TimerService for TokioTimerService {
    fn supports_exact_scheduling(&self) -> bool {
        self.exact
    }

    fn register_exact(&self, key: &TimerKey, at: DateTime<Utc>, payload: ReminderPayload) -> busreminder_scheduler::Result<()> {
        if !self.exact {
            return Err(SchedulerError::TimerPermissionDenied(
                "exact timers disabled by engine.force_inexact".to_string(),
            ));
        }
        debug!(%key, %at, "registering exact timer");
        self.spawn(key, at, payload)
    }

    fn register_inexact(
        &self,
        key: &TimerKey,
        at: DateTime<Utc>,
        tolerance: Duration,
        payload: ReminderPayload,
    ) -> busreminder_scheduler::Result<()> {
        // Tokio timers are precise; the window is only advisory here.
        debug!(%key, %at, tolerance_secs = tolerance.num_seconds(), "registering inexact timer");
        self.spawn(key, at, payload)
    }

    fn cancel(&self, key: &TimerKey) -> busreminder_scheduler::Result<()> {
        let removed = self
            .registry
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entries
            .remove(key);
        if let Some(entry) = removed {
            entry.task.abort();
            debug!(%key, "timer cancelled");
        }
        Ok(())
    }
}
