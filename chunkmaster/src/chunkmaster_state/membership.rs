//! Legal status edges of a chunkserver. Callers persist `from -> to` through
//! the metadata store first and only then touch the cached record.

use super::chunkserver_details::ChunkserverStatus;
use crate::error::{ChunkmasterError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusTransition {
    pub from: ChunkserverStatus,
    pub to: ChunkserverStatus,
}

impl StatusTransition {
    fn new(from: ChunkserverStatus, to: ChunkserverStatus) -> Self {
        Self { from, to }
    }
}

/// Edge taken when a heartbeat report arrives. Reports for an errored
/// chunkserver are rejected, it has to be reset first.
pub fn on_report(key: &str, current: ChunkserverStatus) -> Result<StatusTransition> {
    match current {
        ChunkserverStatus::Init
        | ChunkserverStatus::ReadWrite
        | ChunkserverStatus::ReadOnly => {
            Ok(StatusTransition::new(current, ChunkserverStatus::ReadWrite))
        }
        ChunkserverStatus::Error => Err(ChunkmasterError::InvalidTransition {
            key: key.to_owned(),
            status: current,
        }),
    }
}

/// Edge taken by the failure detector, only writable chunkservers get demoted
pub fn on_heartbeat_timeout(current: ChunkserverStatus) -> Option<StatusTransition> {
    match current {
        ChunkserverStatus::ReadWrite => Some(StatusTransition::new(
            ChunkserverStatus::ReadWrite,
            ChunkserverStatus::ReadOnly,
        )),
        _ => None,
    }
}

pub fn on_reset(key: &str, current: ChunkserverStatus) -> Result<StatusTransition> {
    match current {
        ChunkserverStatus::Error => Ok(StatusTransition::new(current, ChunkserverStatus::Init)),
        _ => Err(ChunkmasterError::InvalidTransition {
            key: key.to_owned(),
            status: current,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ChunkserverStatus::*;

    #[test]
    fn report_transitions() {
        let key = "10.0.0.1:5444";
        assert_eq!(on_report(key, Init).unwrap(), StatusTransition::new(Init, ReadWrite));
        assert_eq!(
            on_report(key, ReadWrite).unwrap(),
            StatusTransition::new(ReadWrite, ReadWrite)
        );
        assert_eq!(
            on_report(key, ReadOnly).unwrap(),
            StatusTransition::new(ReadOnly, ReadWrite)
        );
        assert_eq!(
            on_report(key, Error),
            Err(ChunkmasterError::InvalidTransition {
                key: key.to_owned(),
                status: Error
            })
        );
    }

    #[test]
    fn only_read_write_times_out() {
        assert_eq!(
            on_heartbeat_timeout(ReadWrite),
            Some(StatusTransition::new(ReadWrite, ReadOnly))
        );
        assert_eq!(on_heartbeat_timeout(Init), None);
        assert_eq!(on_heartbeat_timeout(ReadOnly), None);
        assert_eq!(on_heartbeat_timeout(Error), None);
    }

    #[test]
    fn reset_only_leaves_error() {
        let key = "10.0.0.1:5444";
        assert_eq!(on_reset(key, Error).unwrap(), StatusTransition::new(Error, Init));
        for status in [Init, ReadWrite, ReadOnly] {
            assert!(matches!(
                on_reset(key, status),
                Err(ChunkmasterError::InvalidTransition { .. })
            ));
        }
    }
}
