mod api_service;
mod chunkmaster_state;
mod chunkserver;
mod config;
mod error;
mod fid_allocator;
mod metadata;

use std::{net::IpAddr, path::Path, sync::Arc};

use utilities::{
    logger::{error, info, init_logger, warn},
    result::Result,
    state_logger::StateLogger,
};

use crate::{
    api_service::rocket,
    chunkmaster_state::{
        ClusterRegistry, heartbeat_monitor::HeartbeatMonitor, state_snapshot::ClusterStateSnapshot,
    },
    chunkserver::handler::ChunkserverHandler,
    fid_allocator::FidAllocator,
    metadata::{MetadataStore, ledger_store::LedgerMetadataStore, memory_store::MemoryMetadataStore},
};

#[tokio::main]
async fn main() -> Result<()> {
    let config = config::load().map_err(|e| e.to_string())?;
    let _gaurd = init_logger(
        "Chunkmaster",
        &config.id,
        &config.log_level,
        config.apm_endpoint.as_deref(),
        &config.log_base,
    )?;

    let store: Arc<dyn MetadataStore> = match &config.metadata_file {
        Some(path) => {
            info!(%path, "Opening metadata ledger");
            match LedgerMetadataStore::open(path).await {
                Ok(store) => Arc::new(store),
                Err(e) => {
                    error!(error = %e, "Error while opening the metadata ledger hence shutting down");
                    return Err(e.into());
                }
            }
        }
        None => {
            warn!("No metadata file configured, chunkserver records and fids won't survive a restart");
            Arc::new(MemoryMetadataStore::new())
        }
    };

    let registry = Arc::new(ClusterRegistry::new());
    let handler = Arc::new(ChunkserverHandler::new(registry.clone(), store.clone()));
    if let Err(e) = handler.reload().await {
        error!(error = %e, "Error while loading chunkservers hence shutting down");
        return Err(e.into());
    }
    let allocator = Arc::new(FidAllocator::new(
        store.clone(),
        config.fid_max_range,
        config.fid_allocate_range,
    )?);

    let mut monitor = HeartbeatMonitor::new(
        registry,
        store,
        config.monitor_interval(),
        config.heartbeat_timeout(),
    );
    if let Some(path) = &config.state_log_file {
        info!(%path, "Logging cluster state changes");
        let sender = StateLogger::<ClusterStateSnapshot, ClusterStateSnapshot>::start(
            handler.state_snapshot().await,
            Path::new(path),
        )
        .await?;
        monitor = monitor.with_state_sender(sender);
    }
    info!(
        interval_secs = config.monitor_interval_secs,
        timeout_secs = config.heartbeat_timeout_secs,
        "Starting heartbeat monitor"
    );
    monitor.start();

    let address: IpAddr = config.api_address.parse()?;
    info!(%address, port = config.api_port, "Starting api service");
    if let Err(e) = rocket(handler, allocator, address, config.api_port)
        .launch()
        .await
    {
        error!(error = %e, "Api service has returned error");
        return Err(e.to_string().into());
    }
    Ok(())
}
