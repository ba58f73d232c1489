pub mod chunkserver_details;
pub mod heartbeat_monitor;
pub mod membership;
pub mod state_snapshot;

use std::{collections::HashMap, sync::Arc};

use tokio::sync::RwLock;
use utilities::logger::{debug, warn};

use crate::error::{ChunkmasterError, Result};
use chunkserver_details::Chunkserver;
use membership::StatusTransition;

pub type ChunkserverMap = HashMap<String, Arc<Chunkserver>>;

/// In-memory view of every known chunkserver keyed by `ip:port`.
///
/// Readers get an `Arc` of the whole map and keep it as long as they like.
/// Writers never mutate a map or a record a reader may hold: records are
/// replaced by new ones and the map is cloned on write whenever a snapshot of
/// it is still alive.
#[derive(Debug, Default)]
pub struct ClusterRegistry {
    chunkservers: RwLock<Arc<ChunkserverMap>>,
}

impl ClusterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn snapshot(&self) -> Arc<ChunkserverMap> {
        self.chunkservers.read().await.clone()
    }

    pub async fn get(&self, key: &str) -> Option<Arc<Chunkserver>> {
        self.chunkservers.read().await.get(key).cloned()
    }

    /// Adds or overwrites a record by swapping in a new map
    pub async fn insert(&self, chunkserver: Chunkserver) -> Arc<Chunkserver> {
        let key = chunkserver.key();
        let chunkserver = Arc::new(chunkserver);
        let mut chunkservers = self.chunkservers.write().await;
        let mut updated = ChunkserverMap::clone(&chunkservers);
        updated.insert(key, chunkserver.clone());
        *chunkservers = Arc::new(updated);
        chunkserver
    }

    /// Replaces the whole content, nothing from the previous map survives
    pub async fn replace_all(&self, content: ChunkserverMap) {
        let mut chunkservers = self.chunkservers.write().await;
        *chunkservers = Arc::new(content);
    }

    /// Stores the record built from a report whose `transition` was already
    /// persisted. If another transition got cached for the key in the
    /// meantime that newer status wins and only metrics and timestamp apply.
    pub async fn apply_report(
        &self,
        transition: StatusTransition,
        reported: Chunkserver,
    ) -> Result<Arc<Chunkserver>> {
        let key = reported.key();
        let mut chunkservers = self.chunkservers.write().await;
        let cached_status = match chunkservers.get(&key) {
            Some(cached) => cached.status,
            None => return Err(ChunkmasterError::NotFound(key)),
        };
        let reported = if cached_status == transition.from {
            reported
        } else {
            warn!(%key, ?cached_status, ?transition, "Status changed while report was persisted");
            reported.with_status(cached_status)
        };
        let reported = Arc::new(reported);
        Arc::make_mut(&mut chunkservers).insert(key, reported.clone());
        Ok(reported)
    }

    /// Moves a cached record along `transition` if it is still in
    /// `transition.from`, returns whether it did.
    pub async fn apply_status(&self, key: &str, transition: StatusTransition) -> bool {
        let mut chunkservers = self.chunkservers.write().await;
        let updated = match chunkservers.get(key) {
            Some(cached) if cached.status == transition.from => {
                Arc::new(cached.with_status(transition.to))
            }
            Some(cached) => {
                debug!(%key, status = ?cached.status, ?transition, "Skipping stale status update");
                return false;
            }
            None => {
                warn!(%key, "Chunkserver vanished before status update");
                return false;
            }
        };
        Arc::make_mut(&mut chunkservers).insert(key.to_owned(), updated);
        true
    }
}
