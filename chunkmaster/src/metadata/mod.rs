pub mod ledger_store;
pub mod memory_store;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::{
    chunkmaster_state::chunkserver_details::{Chunkserver, ChunkserverStatus},
    error::{ChunkmasterError, Result},
};

/// Durable home of chunkserver records and of the fid high-water-mark
#[async_trait]
pub trait MetadataStore: Send + Sync {
    async fn add_chunkserver(&self, chunkserver: &Chunkserver) -> Result<()>;
    async fn list_chunkservers(&self) -> Result<Vec<Chunkserver>>;
    /// Persists `chunkserver` with status `new_status`, only if the stored
    /// status is still `expected_status`.
    async fn update_chunkserver_status(
        &self,
        chunkserver: &Chunkserver,
        expected_status: ChunkserverStatus,
        new_status: ChunkserverStatus,
    ) -> Result<()>;
    /// Moves the stored record of `key` from `expected_status` to
    /// `new_status`, keeping the metrics and timestamp already stored.
    async fn set_chunkserver_status(
        &self,
        key: &str,
        expected_status: ChunkserverStatus,
        new_status: ChunkserverStatus,
    ) -> Result<()>;
    async fn fetch_fid(&self) -> Result<u64>;
    async fn update_fid(&self, fid: u64) -> Result<()>;
}

/// One mutation of the metadata, also the unit written to the ledger
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum MetadataEntry {
    AddChunkserver {
        chunkserver: Chunkserver,
    },
    UpdateChunkserver {
        chunkserver: Chunkserver,
        expected_status: ChunkserverStatus,
    },
    SetChunkserverStatus {
        key: String,
        expected_status: ChunkserverStatus,
        status: ChunkserverStatus,
    },
    UpdateFid {
        fid: u64,
    },
}

impl MetadataEntry {
    pub fn update_chunkserver(
        chunkserver: &Chunkserver,
        expected_status: ChunkserverStatus,
        new_status: ChunkserverStatus,
    ) -> Self {
        MetadataEntry::UpdateChunkserver {
            chunkserver: chunkserver.with_status(new_status),
            expected_status,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct MetadataState {
    chunkservers: HashMap<String, Chunkserver>,
    fid: u64,
}

impl MetadataState {
    /// Rejects entries that would break the store contract, leaves state as is
    pub fn check(&self, entry: &MetadataEntry) -> Result<()> {
        match entry {
            MetadataEntry::AddChunkserver { chunkserver } => {
                let key = chunkserver.key();
                if self.chunkservers.contains_key(&key) {
                    return Err(ChunkmasterError::AlreadyExists(key));
                }
            }
            MetadataEntry::UpdateChunkserver {
                chunkserver,
                expected_status,
            } => self.check_status(chunkserver.key(), *expected_status)?,
            MetadataEntry::SetChunkserverStatus {
                key,
                expected_status,
                ..
            } => self.check_status(key.clone(), *expected_status)?,
            MetadataEntry::UpdateFid { fid } => {
                if *fid < self.fid {
                    return Err(ChunkmasterError::Metadata(format!(
                        "fid high-water-mark can't move back from {} to {}",
                        self.fid, fid
                    )));
                }
            }
        }
        Ok(())
    }

    fn check_status(&self, key: String, expected_status: ChunkserverStatus) -> Result<()> {
        let stored = self
            .chunkservers
            .get(&key)
            .ok_or_else(|| ChunkmasterError::NotFound(key.clone()))?;
        if stored.status != expected_status {
            return Err(ChunkmasterError::StatusConflict {
                key,
                expected: expected_status,
                actual: stored.status,
            });
        }
        Ok(())
    }

    /// Applies an entry that already passed `check`
    pub fn apply(&mut self, entry: MetadataEntry) {
        match entry {
            MetadataEntry::AddChunkserver { chunkserver }
            | MetadataEntry::UpdateChunkserver { chunkserver, .. } => {
                self.chunkservers.insert(chunkserver.key(), chunkserver);
            }
            MetadataEntry::SetChunkserverStatus { key, status, .. } => {
                if let Some(stored) = self.chunkservers.get_mut(&key) {
                    stored.status = status;
                }
            }
            MetadataEntry::UpdateFid { fid } => {
                self.fid = fid;
            }
        }
    }

    pub fn chunkservers(&self) -> Vec<Chunkserver> {
        self.chunkservers.values().cloned().collect()
    }

    pub fn fid(&self) -> u64 {
        self.fid
    }
}
