use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChunkserverStatus {
    /// registered but never confirmed healthy
    Init,
    ReadWrite,
    /// degraded after a missed heartbeat, serves reads only
    ReadOnly,
    /// persistently failed, only an explicit reset brings it back
    Error,
}

/// Load figures pushed by a chunkserver with every heartbeat
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ChunkserverMetrics {
    pub total_free_space: u64,
    pub max_free_space: u64,
    pub pending_writes: u64,
    pub writing_count: u64,
    pub reading_count: u64,
    pub total_chunks: u64,
    pub connections_count: u64,
    #[serde(default)]
    pub data_dir: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Chunkserver {
    pub group_id: u16,
    pub ip: String,
    pub port: u16,
    pub status: ChunkserverStatus,
    #[serde(flatten)]
    pub metrics: ChunkserverMetrics,
    pub update_time: SystemTime,
}

pub fn chunkserver_key(ip: &str, port: u16) -> String {
    format!("{ip}:{port}")
}

impl Chunkserver {
    /// Freshly registered chunkserver, zeroed metrics
    pub fn new(group_id: u16, ip: String, port: u16) -> Self {
        Self {
            group_id,
            ip,
            port,
            status: ChunkserverStatus::Init,
            metrics: ChunkserverMetrics::default(),
            update_time: SystemTime::now(),
        }
    }
    pub fn key(&self) -> String {
        chunkserver_key(&self.ip, self.port)
    }
    /// New record carrying the reported metrics, the given status and a
    /// refreshed timestamp. Identity and group stay as registered.
    pub fn with_report(
        &self,
        metrics: ChunkserverMetrics,
        status: ChunkserverStatus,
        update_time: SystemTime,
    ) -> Self {
        Self {
            group_id: self.group_id,
            ip: self.ip.clone(),
            port: self.port,
            status,
            metrics,
            update_time,
        }
    }
    pub fn with_status(&self, status: ChunkserverStatus) -> Self {
        Self {
            status,
            ..self.clone()
        }
    }
    /// A clock that went backwards never makes a record stale
    pub fn is_stale(&self, now: SystemTime, timeout: Duration) -> bool {
        now.duration_since(self.update_time)
            .map(|elapsed| elapsed > timeout)
            .unwrap_or(false)
    }
}
