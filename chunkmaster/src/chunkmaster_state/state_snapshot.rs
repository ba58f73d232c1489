use super::{
    ChunkserverMap,
    chunkserver_details::{Chunkserver, ChunkserverStatus},
};
use serde::Serialize;
use std::{collections::BTreeMap, time::SystemTime};

/// Chunkservers grouped by replication group, keyed by the decimal group id
pub type RouteTable = BTreeMap<String, Vec<Chunkserver>>;

pub fn route_table(chunkservers: &ChunkserverMap) -> RouteTable {
    let mut groups = RouteTable::new();
    for chunkserver in chunkservers.values() {
        groups
            .entry(chunkserver.group_id.to_string())
            .or_insert_with(|| Vec::with_capacity(3))
            .push(Chunkserver::clone(chunkserver));
    }
    groups
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ChunkserverStateSnapshot {
    pub group_id: u16,
    pub status: ChunkserverStatus,
}

/// Membership of the cluster at one instant, compared without the timestamp
/// so that only real membership changes show up as different.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ClusterStateSnapshot {
    pub timestamp: SystemTime,
    pub chunkservers: BTreeMap<String, ChunkserverStateSnapshot>,
}

impl From<&ChunkserverMap> for ClusterStateSnapshot {
    fn from(value: &ChunkserverMap) -> Self {
        Self {
            timestamp: SystemTime::now(),
            chunkservers: value
                .iter()
                .map(|(key, chunkserver)| {
                    (
                        key.clone(),
                        ChunkserverStateSnapshot {
                            group_id: chunkserver.group_id,
                            status: chunkserver.status,
                        },
                    )
                })
                .collect(),
        }
    }
}

impl PartialEq for ClusterStateSnapshot {
    fn eq(&self, other: &Self) -> bool {
        self.chunkservers == other.chunkservers
    }
}
