use std::{
    path::Path,
    time::{SystemTime, UNIX_EPOCH},
};

use async_trait::async_trait;
use tokio::{io::AsyncWriteExt, sync::Mutex};
use utilities::logger::{debug, error, info, instrument, tracing, warn};

use super::{MetadataEntry, MetadataState, MetadataStore};
use crate::{
    chunkmaster_state::chunkserver_details::{Chunkserver, ChunkserverStatus},
    error::{ChunkmasterError, Result},
};

/// Metadata store backed by an append only log file.
///
/// Every line is `<unix millis> <json entry>`. The file is replayed into
/// memory on open and rewritten as one entry per chunkserver plus the fid
/// mark. Each later mutation is validated against memory, written and synced
/// before memory changes.
pub struct LedgerMetadataStore {
    log_store: String,
    inner: Mutex<LedgerInner>,
}

struct LedgerInner {
    state: MetadataState,
    appendable: tokio::fs::File,
}

fn stamp(entry: &MetadataEntry) -> Result<String> {
    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis())
        .unwrap_or_default();
    Ok(format!("{} {}\n", timestamp, serde_json::to_string(entry)?))
}

impl LedgerMetadataStore {
    pub async fn open(log_store: &str) -> Result<Self> {
        if let Some(parent) = Path::new(log_store).parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let state = match tokio::fs::read_to_string(log_store).await {
            Ok(content) => Self::replay(log_store, &content)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => MetadataState::default(),
            Err(e) => return Err(e.into()),
        };
        Self::compact(log_store, &state).await?;
        let appendable = tokio::fs::File::options()
            .append(true)
            .create(true)
            .open(log_store)
            .await?;
        info!(path = %log_store, chunkservers = state.chunkservers().len(), fid = state.fid(), "Replayed metadata ledger");
        Ok(Self {
            log_store: log_store.to_owned(),
            inner: Mutex::new(LedgerInner { state, appendable }),
        })
    }

    #[instrument(name = "metadata_ledger_replay", skip(content))]
    fn replay(log_store: &str, content: &str) -> Result<MetadataState> {
        let mut state = MetadataState::default();
        for (line_number, log) in content.split_inclusive('\n').enumerate() {
            // a line without its newline is an append that never finished
            let Some(log) = log.strip_suffix('\n') else {
                warn!(%log, line_number, "Dropping unterminated ledger tail");
                break;
            };
            if log.trim().is_empty() {
                continue;
            }
            let entry = match log.split_once(' ') {
                Some((_timestamp, item)) => serde_json::from_str::<MetadataEntry>(item)?,
                None => {
                    error!(%log, line_number, "Malformed ledger line");
                    return Err(ChunkmasterError::Metadata(format!(
                        "malformed ledger line {} in {}",
                        line_number + 1,
                        log_store
                    )));
                }
            };
            // entries were checked before they were written, a failing check
            // means the file was edited by hand
            if let Err(e) = state.check(&entry) {
                error!(error = %e, line_number, "Ledger entry does not apply");
                return Err(e);
            }
            state.apply(entry);
        }
        Ok(state)
    }

    /// Replaces the ledger with the smallest log that replays to `state`
    #[instrument(name = "metadata_ledger_compact", skip(state))]
    async fn compact(log_store: &str, state: &MetadataState) -> Result<()> {
        let mut compacted = String::new();
        for chunkserver in state.chunkservers() {
            compacted.push_str(&stamp(&MetadataEntry::AddChunkserver { chunkserver })?);
        }
        if state.fid() > 0 {
            compacted.push_str(&stamp(&MetadataEntry::UpdateFid { fid: state.fid() })?);
        }
        let temp_store = format!("{}.tmp", log_store);
        let mut temp = tokio::fs::File::create(&temp_store).await?;
        temp.write_all(compacted.as_bytes()).await?;
        temp.flush().await?;
        temp.sync_all().await?;
        drop(temp);
        tokio::fs::rename(&temp_store, log_store).await?;
        debug!(bytes = compacted.len(), "Metadata ledger compacted");
        Ok(())
    }

    async fn commit(&self, entry: MetadataEntry) -> Result<()> {
        let mut inner = self.inner.lock().await;
        inner.state.check(&entry)?;
        let stamped_log = stamp(&entry)?;
        if let Err(e) = Self::append(&mut inner.appendable, stamped_log.as_bytes()).await {
            error!(error = %e, path = %self.log_store, "Error while appending to metadata ledger");
            return Err(e);
        }
        debug!(entry = ?entry, "Ledger entry committed");
        inner.state.apply(entry);
        Ok(())
    }

    /// Writes `log` durably, cutting the file back to its old length if any
    /// step fails
    async fn append(appendable: &mut tokio::fs::File, log: &[u8]) -> Result<()> {
        let committed_len = appendable.metadata().await?.len();
        let written = async {
            appendable.write_all(log).await?;
            appendable.flush().await?;
            appendable.sync_data().await
        }
        .await;
        if let Err(e) = written {
            if let Err(truncate_error) = appendable.set_len(committed_len).await {
                error!(error = %truncate_error, committed_len, "Error while dropping partial ledger append");
            }
            return Err(e.into());
        }
        Ok(())
    }
}

#[async_trait]
impl MetadataStore for LedgerMetadataStore {
    async fn add_chunkserver(&self, chunkserver: &Chunkserver) -> Result<()> {
        self.commit(MetadataEntry::AddChunkserver {
            chunkserver: chunkserver.clone(),
        })
        .await
    }
    async fn list_chunkservers(&self) -> Result<Vec<Chunkserver>> {
        Ok(self.inner.lock().await.state.chunkservers())
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
        Ok(self.inner.lock().await.state.fid())
    }
    async fn update_fid(&self, fid: u64) -> Result<()> {
        self.commit(MetadataEntry::UpdateFid { fid }).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn temp_ledger() -> PathBuf {
        std::env::temp_dir()
            .join(format!("chunkmaster-ledger-{}", uuid::Uuid::new_v4()))
            .join("metadata.log")
    }

    async fn cleanup(path: &Path) {
        if let Some(parent) = path.parent() {
            let _ = tokio::fs::remove_dir_all(parent).await;
        }
    }

    #[tokio::test]
    async fn reopen_replays_committed_entries() {
        let path = temp_ledger();
        let path_str = path.to_str().unwrap();
        let chunkserver = Chunkserver::new(4, "10.0.0.1".to_owned(), 5444);
        {
            let store = LedgerMetadataStore::open(path_str).await.unwrap();
            store.add_chunkserver(&chunkserver).await.unwrap();
            let mut reported = chunkserver.clone();
            reported.metrics.total_chunks = 17;
            store
                .update_chunkserver_status(
                    &reported,
                    ChunkserverStatus::Init,
                    ChunkserverStatus::ReadWrite,
                )
                .await
                .unwrap();
            store.update_fid(10000).await.unwrap();
            // rejected entries never reach the file
            assert!(store.add_chunkserver(&chunkserver).await.is_err());
        }

        let store = LedgerMetadataStore::open(path_str).await.unwrap();
        let chunkservers = store.list_chunkservers().await.unwrap();
        assert_eq!(chunkservers.len(), 1);
        assert_eq!(chunkservers[0].status, ChunkserverStatus::ReadWrite);
        assert_eq!(chunkservers[0].metrics.total_chunks, 17);
        assert_eq!(chunkservers[0].group_id, 4);
        assert_eq!(store.fetch_fid().await.unwrap(), 10000);
        assert!(matches!(
            store
                .update_chunkserver_status(
                    &chunkserver,
                    ChunkserverStatus::Init,
                    ChunkserverStatus::ReadWrite
                )
                .await,
            Err(ChunkmasterError::StatusConflict { .. })
        ));

        // compacted on open to one add entry plus the fid mark
        let content = tokio::fs::read_to_string(&path).await.unwrap();
        assert_eq!(content.lines().count(), 2);
        cleanup(&path).await;
    }

    #[tokio::test]
    async fn reopen_compacts_heartbeat_history() {
        let path = temp_ledger();
        let path_str = path.to_str().unwrap();
        let mut chunkserver = Chunkserver::new(1, "10.0.0.1".to_owned(), 5444);
        {
            let store = LedgerMetadataStore::open(path_str).await.unwrap();
            store.add_chunkserver(&chunkserver).await.unwrap();
            let mut expected = ChunkserverStatus::Init;
            for total_chunks in 0..50 {
                chunkserver.metrics.total_chunks = total_chunks;
                store
                    .update_chunkserver_status(&chunkserver, expected, ChunkserverStatus::ReadWrite)
                    .await
                    .unwrap();
                expected = ChunkserverStatus::ReadWrite;
            }
            store.update_fid(100).await.unwrap();
            store.update_fid(200).await.unwrap();
        }
        let before = tokio::fs::read_to_string(&path).await.unwrap();
        assert_eq!(before.lines().count(), 53);

        let store = LedgerMetadataStore::open(path_str).await.unwrap();
        let after = tokio::fs::read_to_string(&path).await.unwrap();
        assert_eq!(after.lines().count(), 2);
        assert!(after.len() < before.len());
        let chunkservers = store.list_chunkservers().await.unwrap();
        assert_eq!(chunkservers[0].status, ChunkserverStatus::ReadWrite);
        assert_eq!(chunkservers[0].metrics.total_chunks, 49);
        assert_eq!(store.fetch_fid().await.unwrap(), 200);

        store.update_fid(300).await.unwrap();
        drop(store);
        let store = LedgerMetadataStore::open(path_str).await.unwrap();
        assert_eq!(store.fetch_fid().await.unwrap(), 300);
        cleanup(&path).await;
    }

    #[tokio::test]
    async fn unterminated_tail_is_dropped_on_open() {
        let path = temp_ledger();
        tokio::fs::create_dir_all(path.parent().unwrap())
            .await
            .unwrap();
        tokio::fs::write(
            &path,
            "1718000000000 {\"op\":\"update_fid\",\"fid\":10}\n1718000000001 {\"op\":\"update_f",
        )
        .await
        .unwrap();
        let path_str = path.to_str().unwrap();
        let store = LedgerMetadataStore::open(path_str).await.unwrap();
        assert_eq!(store.fetch_fid().await.unwrap(), 10);
        let content = tokio::fs::read_to_string(&path).await.unwrap();
        assert!(content.ends_with('\n'));
        assert!(!content.contains("update_f\""));

        store.update_fid(20).await.unwrap();
        drop(store);
        let store = LedgerMetadataStore::open(path_str).await.unwrap();
        assert_eq!(store.fetch_fid().await.unwrap(), 20);
        cleanup(&path).await;
    }

    #[tokio::test]
    async fn malformed_ledger_refuses_to_open() {
        let path = temp_ledger();
        tokio::fs::create_dir_all(path.parent().unwrap())
            .await
            .unwrap();
        tokio::fs::write(&path, "1718000000000 {\"op\":\"update_fid\",\"fid\":10}\ngarbage\n")
            .await
            .unwrap();
        let result = LedgerMetadataStore::open(path.to_str().unwrap()).await;
        assert!(matches!(result, Err(ChunkmasterError::Metadata(_))));
        cleanup(&path).await;
    }
}
