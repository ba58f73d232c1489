use serde::{Deserialize, Serialize};
use std::net::IpAddr;

use crate::{
    chunkmaster_state::chunkserver_details::{ChunkserverMetrics, chunkserver_key},
    error::{ChunkmasterError, Result},
};

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ChunkserverAddress {
    pub ip: String,
    pub port: u16,
}

impl ChunkserverAddress {
    /// `ip` in its shortest textual form, so every spelling of one address
    /// maps to one record
    pub fn canonical_ip(&self) -> Result<String> {
        self.ip
            .parse::<IpAddr>()
            .map(|ip| ip.to_string())
            .map_err(|_| {
                ChunkmasterError::MalformedRequest(format!("invalid ip address {:?}", self.ip))
            })
    }

    /// Registry key of the address once it is known to be well formed
    pub fn validated_key(&self) -> Result<String> {
        let ip = self.canonical_ip()?;
        if self.port == 0 {
            return Err(ChunkmasterError::MalformedRequest(
                "port must be non zero".to_owned(),
            ));
        }
        Ok(chunkserver_key(&ip, self.port))
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct InitChunkserverRequest {
    pub group_id: u16,
    #[serde(flatten)]
    pub address: ChunkserverAddress,
}

/// Heartbeat payload. Any status a chunkserver sends along is ignored, the
/// coordinator alone decides status.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ChunkserverReport {
    #[serde(flatten)]
    pub address: ChunkserverAddress,
    #[serde(flatten)]
    pub metrics: ChunkserverMetrics,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_ignores_client_status() {
        let report: ChunkserverReport = serde_json::from_str(
            r#"{"Ip":"10.0.0.1","Port":5444,"Status":3,"GroupId":1,
                "TotalFreeSpace":100,"MaxFreeSpace":50,"PendingWrites":1,
                "WritingCount":2,"ReadingCount":3,"TotalChunks":4,
                "ConnectionsCount":5,"DataDir":"/data"}"#,
        )
        .unwrap();
        assert_eq!(report.address.validated_key().unwrap(), "10.0.0.1:5444");
        assert_eq!(report.metrics.total_free_space, 100);
        assert_eq!(report.metrics.connections_count, 5);
        assert_eq!(report.metrics.data_dir, "/data");
    }

    #[test]
    fn rejects_malformed_addresses() {
        let bad_ip = ChunkserverAddress {
            ip: "chunkserver-1".to_owned(),
            port: 5444,
        };
        assert!(matches!(
            bad_ip.validated_key(),
            Err(ChunkmasterError::MalformedRequest(_))
        ));
        let bad_port = ChunkserverAddress {
            ip: "10.0.0.1".to_owned(),
            port: 0,
        };
        assert!(matches!(
            bad_port.validated_key(),
            Err(ChunkmasterError::MalformedRequest(_))
        ));
        let v6 = ChunkserverAddress {
            ip: "::1".to_owned(),
            port: 5444,
        };
        assert_eq!(v6.validated_key().unwrap(), "::1:5444");
    }

    #[test]
    fn spellings_of_one_address_share_a_key() {
        let long = ChunkserverAddress {
            ip: "0:0:0:0:0:0:0:1".to_owned(),
            port: 5444,
        };
        assert_eq!(long.canonical_ip().unwrap(), "::1");
        assert_eq!(long.validated_key().unwrap(), "::1:5444");
    }
}
