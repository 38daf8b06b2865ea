use async_trait::async_trait;
use busreminder_core::{FavoriteDeparture, FavoriteId};
use tokio::sync::broadcast;

use crate::error::Result;

/// Emitted by the favorites store after a mutation has been persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FavoriteChange {
    Added { id: FavoriteId },
    Removed { id: FavoriteId },
    ActivityToggled { id: FavoriteId, active: bool },
    /// Route, time, or display fields were edited in place.
    Updated { id: FavoriteId },
}

/// Read side of the favorites collaborator.
#[async_trait]
pub trait FavoritesStore: Send + Sync {
    async fn list_active(&self) -> Result<Vec<FavoriteDeparture>>;
    /// Every favorite, inactive ones included, so a full pass can cancel
    /// timers left behind by changes it never heard about.
    async fn list_all(&self) -> Result<Vec<FavoriteDeparture>>;
    async fn get(&self, id: &FavoriteId) -> Result<Option<FavoriteDeparture>>;
    fn subscribe(&self) -> broadcast::Receiver<FavoriteChange>;
}
