use std::{
    sync::Arc,
    time::{Duration, SystemTime},
};

use tokio::{
    sync::mpsc::Sender,
    task::JoinHandle,
    time::{MissedTickBehavior, interval},
};
use utilities::logger::{Instrument, Level, error, info, span, trace, warn};

use super::{ClusterRegistry, membership, state_snapshot::ClusterStateSnapshot};
use crate::metadata::MetadataStore;

/// Demotes writable chunkservers that stopped sending heartbeats
pub struct HeartbeatMonitor {
    registry: Arc<ClusterRegistry>,
    store: Arc<dyn MetadataStore>,
    interval: Duration,
    timeout: Duration,
    state_sender: Option<Sender<ClusterStateSnapshot>>,
}

impl HeartbeatMonitor {
    pub fn new(
        registry: Arc<ClusterRegistry>,
        store: Arc<dyn MetadataStore>,
        interval: Duration,
        timeout: Duration,
    ) -> Self {
        Self {
            registry,
            store,
            interval,
            timeout,
            state_sender: None,
        }
    }

    /// Every sweep also pushes the resulting membership to `sender`
    pub fn with_state_sender(mut self, sender: Sender<ClusterStateSnapshot>) -> Self {
        self.state_sender = Some(sender);
        self
    }

    pub fn start(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let span = span!(Level::INFO, "chunkserver_heartbeat_sweep");
                self.sweep(SystemTime::now()).instrument(span).await;
                self.publish_state().await;
            }
        })
    }

    /// One pass of the detector as seen at `now`, returns how many
    /// chunkservers got demoted
    pub async fn sweep(&self, now: SystemTime) -> usize {
        // the read lock is released here, before any durable write
        let snapshot = self.registry.snapshot().await;
        let stale: Vec<_> = snapshot
            .iter()
            .filter_map(|(key, chunkserver)| {
                let transition = membership::on_heartbeat_timeout(chunkserver.status)?;
                chunkserver
                    .is_stale(now, self.timeout)
                    .then(|| (key.clone(), chunkserver.clone(), transition))
            })
            .collect();
        drop(snapshot);
        if stale.is_empty() {
            trace!("No stale chunkservers");
            return 0;
        }

        let mut demoted = 0;
        for (key, chunkserver, transition) in stale {
            if let Err(e) = self
                .store
                .set_chunkserver_status(&key, transition.from, transition.to)
                .await
            {
                error!(%key, error = %e, "Error while demoting chunkserver, retrying next sweep");
                continue;
            }
            if self.registry.apply_status(&key, transition).await {
                warn!(%key, last_update = ?chunkserver.update_time, "Chunkserver missed heartbeats, demoted to read only");
                demoted += 1;
            }
        }
        if demoted > 0 {
            info!(demoted, "Heartbeat sweep finished");
        }
        demoted
    }

    async fn publish_state(&self) {
        let Some(sender) = &self.state_sender else {
            return;
        };
        let chunkservers = self.registry.snapshot().await;
        let snapshot = ClusterStateSnapshot::from(&*chunkservers);
        if let Err(e) = sender.send(snapshot).await {
            error!(error = %e, "State logger is gone");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        chunkmaster_state::chunkserver_details::{Chunkserver, ChunkserverStatus},
        error::Result,
        metadata::memory_store::{
            MemoryMetadataStore,
            testing::{FlakyStore, StoreOperation},
        },
    };
    use async_trait::async_trait;

    /// Lands a read write report in the store right before the sweep's
    /// demotion, as a concurrent heartbeat would
    struct ReportBeforeDemotion {
        inner: MemoryMetadataStore,
        report: Chunkserver,
    }

    #[async_trait]
    impl MetadataStore for ReportBeforeDemotion {
        async fn add_chunkserver(&self, chunkserver: &Chunkserver) -> Result<()> {
            self.inner.add_chunkserver(chunkserver).await
        }
        async fn list_chunkservers(&self) -> Result<Vec<Chunkserver>> {
            self.inner.list_chunkservers().await
        }
        async fn update_chunkserver_status(
            &self,
            chunkserver: &Chunkserver,
            expected_status: ChunkserverStatus,
            new_status: ChunkserverStatus,
        ) -> Result<()> {
            self.inner
                .update_chunkserver_status(chunkserver, expected_status, new_status)
                .await
        }
        async fn set_chunkserver_status(
            &self,
            key: &str,
            expected_status: ChunkserverStatus,
            new_status: ChunkserverStatus,
        ) -> Result<()> {
            self.inner
                .update_chunkserver_status(
                    &self.report,
                    ChunkserverStatus::ReadWrite,
                    ChunkserverStatus::ReadWrite,
                )
                .await?;
            self.inner
                .set_chunkserver_status(key, expected_status, new_status)
                .await
        }
        async fn fetch_fid(&self) -> Result<u64> {
            self.inner.fetch_fid().await
        }
        async fn update_fid(&self, fid: u64) -> Result<()> {
            self.inner.update_fid(fid).await
        }
    }

    const TIMEOUT: Duration = Duration::from_secs(30);

    async fn setup(
        statuses: &[(&str, ChunkserverStatus)],
    ) -> (Arc<ClusterRegistry>, Arc<FlakyStore>, HeartbeatMonitor) {
        let registry = Arc::new(ClusterRegistry::new());
        let store = Arc::new(FlakyStore::new());
        for (ip, status) in statuses {
            let chunkserver = Chunkserver::new(1, ip.to_string(), 5444).with_status(*status);
            store.seed(chunkserver.clone()).await;
            registry.insert(chunkserver).await;
        }
        let monitor = HeartbeatMonitor::new(
            registry.clone(),
            store.clone(),
            Duration::from_secs(5),
            TIMEOUT,
        );
        (registry, store, monitor)
    }

    fn late() -> SystemTime {
        SystemTime::now() + TIMEOUT + Duration::from_secs(1)
    }

    async fn status_of(registry: &ClusterRegistry, ip: &str) -> ChunkserverStatus {
        registry
            .get(&format!("{ip}:5444"))
            .await
            .map(|chunkserver| chunkserver.status)
            .unwrap()
    }

    #[tokio::test]
    async fn empty_registry_is_a_no_op() {
        let (_, _, monitor) = setup(&[]).await;
        assert_eq!(monitor.sweep(late()).await, 0);
    }

    #[tokio::test]
    async fn fresh_chunkservers_are_left_alone() {
        let (registry, _, monitor) = setup(&[("10.0.0.1", ChunkserverStatus::ReadWrite)]).await;
        assert_eq!(monitor.sweep(SystemTime::now()).await, 0);
        assert_eq!(
            status_of(&registry, "10.0.0.1").await,
            ChunkserverStatus::ReadWrite
        );
    }

    #[tokio::test]
    async fn only_stale_read_write_chunkservers_are_demoted() {
        let (registry, store, monitor) = setup(&[
            ("10.0.0.1", ChunkserverStatus::ReadWrite),
            ("10.0.0.2", ChunkserverStatus::Init),
            ("10.0.0.3", ChunkserverStatus::ReadOnly),
        ])
        .await;
        assert_eq!(monitor.sweep(late()).await, 1);
        assert_eq!(
            status_of(&registry, "10.0.0.1").await,
            ChunkserverStatus::ReadOnly
        );
        assert_eq!(status_of(&registry, "10.0.0.2").await, ChunkserverStatus::Init);
        assert_eq!(
            status_of(&registry, "10.0.0.3").await,
            ChunkserverStatus::ReadOnly
        );
        let stored = store.list_chunkservers().await.unwrap();
        let demoted = stored
            .iter()
            .find(|chunkserver| chunkserver.ip == "10.0.0.1")
            .unwrap();
        assert_eq!(demoted.status, ChunkserverStatus::ReadOnly);
    }

    #[tokio::test]
    async fn failed_demotion_is_retried_next_sweep() {
        let (registry, store, monitor) =
            setup(&[("10.0.0.1", ChunkserverStatus::ReadWrite)]).await;
        store.fail(StoreOperation::SetChunkserverStatus);
        assert_eq!(monitor.sweep(late()).await, 0);
        assert_eq!(
            status_of(&registry, "10.0.0.1").await,
            ChunkserverStatus::ReadWrite
        );

        store.heal(StoreOperation::SetChunkserverStatus);
        assert_eq!(monitor.sweep(late()).await, 1);
        assert_eq!(
            status_of(&registry, "10.0.0.1").await,
            ChunkserverStatus::ReadOnly
        );
    }

    #[tokio::test]
    async fn demotion_keeps_metrics_of_a_concurrent_report() {
        let mut stale = Chunkserver::new(1, "10.0.0.1".to_owned(), 5444)
            .with_status(ChunkserverStatus::ReadWrite);
        stale.metrics.total_chunks = 1;
        let mut report = stale.clone();
        report.metrics.total_chunks = 99;
        report.update_time = late();

        let store = Arc::new(ReportBeforeDemotion {
            inner: MemoryMetadataStore::new(),
            report,
        });
        store.add_chunkserver(&stale).await.unwrap();
        let registry = Arc::new(ClusterRegistry::new());
        registry.insert(stale).await;
        let monitor = HeartbeatMonitor::new(
            registry.clone(),
            store.clone(),
            Duration::from_secs(5),
            TIMEOUT,
        );

        assert_eq!(monitor.sweep(late()).await, 1);
        let stored = store.list_chunkservers().await.unwrap();
        assert_eq!(stored[0].status, ChunkserverStatus::ReadOnly);
        assert_eq!(stored[0].metrics.total_chunks, 99);
    }

    #[tokio::test]
    async fn sweep_publishes_membership() {
        let (_, _, monitor) = setup(&[("10.0.0.1", ChunkserverStatus::ReadWrite)]).await;
        let (sender, mut receiver) = tokio::sync::mpsc::channel(1);
        let monitor = monitor.with_state_sender(sender);
        monitor.sweep(late()).await;
        monitor.publish_state().await;
        let snapshot = receiver.recv().await.unwrap();
        assert_eq!(
            snapshot.chunkservers["10.0.0.1:5444"].status,
            ChunkserverStatus::ReadOnly
        );
    }
}
