//! Reminder payload types, shared between the timer lifecycle manager, the
//! timer service adapters, and the fire handler.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::FavoriteDeparture;

/// Attached to every timer registration and handed back when it fires.
///
/// Carries the favorite as it was at scheduling time so the fire handler never
/// has to query the favorites store from the non-blocking callback context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReminderPayload {
    pub favorite: FavoriteDeparture,
    /// The departure instant the reminder announces.
    pub departure_at: DateTime<Utc>,
    /// Registration instant (departure minus lead time).
    pub fire_at: DateTime<Utc>,
}

impl ReminderPayload {
    /// Minutes between the reminder and the departure, as shown to the user.
    pub fn lead_minutes(&self) -> i64 {
        (self.departure_at - self.fire_at).num_minutes()
    }
}

/// A reminder that passed every fire-time check and should be surfaced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reminder {
    /// Originating favorite id, used for logging and notification grouping.
    pub favorite_id: String,
    pub title: String,
    pub body: String,
    pub departure_at: DateTime<Utc>,
}

impl Reminder {
    pub fn from_payload(payload: &ReminderPayload) -> Self {
        let fav = &payload.favorite;
        let title = format!("Bus {} in {} min", fav.route_label(), payload.lead_minutes());
        let body = match fav.stop_name.as_deref() {
            Some(stop) => format!("Departs {} at {}", stop, fav.departure_time),
            None => format!("Departs at {}", fav.departure_time),
        };
        Self {
            favorite_id: fav.id.to_string(),
            title,
            body,
            departure_at: payload.departure_at,
        }
    }
}
