use async_trait::async_trait;
use tokio::sync::Mutex;

use super::{MetadataEntry, MetadataState, MetadataStore};
use crate::{
    chunkmaster_state::chunkserver_details::{Chunkserver, ChunkserverStatus},
    error::Result,
};

/// Metadata kept only in process memory, lost on restart
#[derive(Debug, Default)]
pub struct MemoryMetadataStore {
    state: Mutex<MetadataState>,
}

impl MemoryMetadataStore {
    pub fn new() -> Self {
        Self::default()
    }
    async fn commit(&self, entry: MetadataEntry) -> Result<()> {
        let mut state = self.state.lock().await;
        state.check(&entry)?;
        state.apply(entry);
        Ok(())
    }
}

#[async_trait]
impl MetadataStore for MemoryMetadataStore {
    async fn add_chunkserver(&self, chunkserver: &Chunkserver) -> Result<()> {
        self.commit(MetadataEntry::AddChunkserver {
            chunkserver: chunkserver.clone(),
        })
        .await
    }
    async fn list_chunkservers(&self) -> Result<Vec<Chunkserver>> {
        Ok(self.state.lock().await.chunkservers())
    }
    async fn update_chunkserver_status(
        &self,
        chunkserver: &Chunkserver,
        expected_status: ChunkserverStatus,
        new_status: ChunkserverStatus,
    ) -> Result<()> {
        self.commit(MetadataEntry::update_chunkserver(
            chunkserver,
            expected_status,
            new_status,
        ))
        .await
    }
    async fn set_chunkserver_status(
        &self,
        key: &str,
        expected_status: ChunkserverStatus,
        new_status: ChunkserverStatus,
    ) -> Result<()> {
        self.commit(MetadataEntry::SetChunkserverStatus {
            key: key.to_owned(),
            expected_status,
            status: new_status,
        })
        .await
    }
    async fn fetch_fid(&self) -> Result<u64> {
        Ok(self.state.lock().await.fid())
    }
    async fn update_fid(&self, fid: u64) -> Result<()> {
        self.commit(MetadataEntry::UpdateFid { fid }).await
    }
}
