use std::{sync::Arc, time::SystemTime};

use utilities::logger::{info, instrument, tracing};

use super::request::{ChunkserverAddress, ChunkserverReport, InitChunkserverRequest};
use crate::{
    chunkmaster_state::{
        ChunkserverMap, ClusterRegistry,
        chunkserver_details::{Chunkserver, ChunkserverStatus},
        membership,
        state_snapshot::{ClusterStateSnapshot, RouteTable, route_table},
    },
    error::{ChunkmasterError, Result},
    metadata::MetadataStore,
};

/// Entry point for everything chunkservers and storage clients ask of the
/// registry. Every status change is written to the metadata store before the
/// registry sees it.
pub struct ChunkserverHandler {
    registry: Arc<ClusterRegistry>,
    store: Arc<dyn MetadataStore>,
}

impl ChunkserverHandler {
    pub fn new(registry: Arc<ClusterRegistry>, store: Arc<dyn MetadataStore>) -> Self {
        Self { registry, store }
    }

    #[instrument(name = "chunkserver_init", skip(self, request), fields(ip = %request.address.ip, port = request.address.port, group_id = request.group_id))]
    pub async fn init(&self, request: InitChunkserverRequest) -> Result<Arc<Chunkserver>> {
        let key = request.address.validated_key()?;
        if self.registry.get(&key).await.is_some() {
            return Err(ChunkmasterError::AlreadyExists(key));
        }
        let chunkserver = Chunkserver::new(
            request.group_id,
            request.address.canonical_ip()?,
            request.address.port,
        );
        self.store.add_chunkserver(&chunkserver).await?;
        let chunkserver = self.registry.insert(chunkserver).await;
        info!(%key, "Chunkserver registered");
        Ok(chunkserver)
    }

    #[instrument(name = "chunkserver_report", skip(self, report), fields(ip = %report.address.ip, port = report.address.port))]
    pub async fn report(&self, report: ChunkserverReport) -> Result<Arc<Chunkserver>> {
        let key = report.address.validated_key()?;
        let cached = self
            .registry
            .get(&key)
            .await
            .ok_or_else(|| ChunkmasterError::NotFound(key.clone()))?;
        let transition = membership::on_report(&key, cached.status)?;
        let reported = cached.with_report(report.metrics, transition.to, SystemTime::now());
        self.store
            .update_chunkserver_status(&reported, transition.from, transition.to)
            .await?;
        let stored = self.registry.apply_report(transition, reported).await?;
        if transition.from != transition.to {
            info!(%key, from = ?transition.from, to = ?stored.status, "Chunkserver status changed");
        }
        Ok(stored)
    }

    /// Rebuilds the registry from the metadata store. Errored chunkservers
    /// stay out and everyone else counts as just seen.
    #[instrument(name = "chunkserver_reload", skip(self))]
    pub async fn reload(&self) -> Result<usize> {
        let chunkservers = self.store.list_chunkservers().await?;
        let now = SystemTime::now();
        let content: ChunkserverMap = chunkservers
            .into_iter()
            .filter(|chunkserver| chunkserver.status != ChunkserverStatus::Error)
            .map(|mut chunkserver| {
                chunkserver.update_time = now;
                (chunkserver.key(), Arc::new(chunkserver))
            })
            .collect();
        let loaded = content.len();
        self.registry.replace_all(content).await;
        info!(loaded, "Registry reloaded from metadata store");
        Ok(loaded)
    }

    /// Looks at the store rather than the registry, errored chunkservers are
    /// never cached
    #[instrument(name = "chunkserver_check_error", skip(self))]
    pub async fn has_errored(&self) -> Result<bool> {
        Ok(self
            .store
            .list_chunkservers()
            .await?
            .iter()
            .any(|chunkserver| chunkserver.status == ChunkserverStatus::Error))
    }

    /// Clears an errored chunkserver back to `Init` so it can heartbeat again
    #[instrument(name = "chunkserver_reset", skip(self, address), fields(ip = %address.ip, port = address.port))]
    pub async fn reset(&self, address: ChunkserverAddress) -> Result<Arc<Chunkserver>> {
        let key = address.validated_key()?;
        let stored = self
            .store
            .list_chunkservers()
            .await?
            .into_iter()
            .find(|chunkserver| chunkserver.key() == key)
            .ok_or_else(|| ChunkmasterError::NotFound(key.clone()))?;
        let transition = membership::on_reset(&key, stored.status)?;
        let cleared = Chunkserver::new(stored.group_id, stored.ip, stored.port);
        self.store
            .update_chunkserver_status(&cleared, transition.from, transition.to)
            .await?;
        let chunkserver = self.registry.insert(cleared).await;
        info!(%key, "Errored chunkserver reset");
        Ok(chunkserver)
    }

    pub async fn route(&self) -> RouteTable {
        route_table(&*self.registry.snapshot().await)
    }

    pub async fn state_snapshot(&self) -> ClusterStateSnapshot {
        ClusterStateSnapshot::from(&*self.registry.snapshot().await)
    }
}
