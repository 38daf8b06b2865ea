//! Contract of the one-shot timer service the engine registers reminders with,
//! and the deterministic key every registration is filed under.

use std::fmt;

use busreminder_core::{FavoriteId, ReminderPayload};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::Result;

/// Fixed namespace mixed into every key so reminder timers never collide with
/// other registrations the host keeps in the same service.
pub const TIMER_NAMESPACE: &str = "busreminder.departure";

/// Registration key for one favorite.
///
/// `hex(sha256("busreminder.departure:" + favorite_id))[..16]`. Depends only on
/// the favorite id, so a `cancel` issued after a restart still matches a
/// registration made before it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TimerKey(String);

impl TimerKey {
    pub fn for_favorite(id: &FavoriteId) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(TIMER_NAMESPACE.as_bytes());
        hasher.update(b":");
        hasher.update(id.as_str().as_bytes());
        let digest = hasher.finalize();
        Self(hex::encode(&digest[..8]))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TimerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// How precisely a registration will fire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerPrecision {
    Exact,
    /// May fire anywhere within `±tolerance` of the requested instant.
    Inexact { tolerance: Duration },
}

/// One-shot wake-up timers keyed by [`TimerKey`].
///
/// Registration calls are synchronous; the fire event is delivered later on a
/// context the implementation controls, carrying the registered payload.
/// Registering a key that already exists replaces it, but the engine never
/// relies on that: it always cancels first.
pub trait TimerService: Send + Sync {
    /// Whether exact-time wake registration is permitted on this platform.
    fn supports_exact_scheduling(&self) -> bool;

    fn register_exact(&self, key: &TimerKey, at: DateTime<Utc>, payload: ReminderPayload) -> Result<()>;

    fn register_inexact(
        &self,
        key: &TimerKey,
        at: DateTime<Utc>,
        tolerance: Duration,
        payload: ReminderPayload,
    ) -> Result<()>;

    /// Cancel the registration for `key`. An unknown key is not an error.
    fn cancel(&self, key: &TimerKey) -> Result<()>;
}
