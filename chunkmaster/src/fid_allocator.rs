use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use utilities::logger::{debug, error, info, instrument, tracing};

use crate::{
    error::{ChunkmasterError, Result},
    metadata::MetadataStore,
};

/// Half open range `[fid_begin, fid_end)` handed to one caller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct FidRange {
    pub fid_begin: u64,
    pub fid_end: u64,
}

/// Part of the durable lease not handed out yet, empty once `begin >= end`
#[derive(Debug, Default)]
struct Lease {
    begin: u64,
    end: u64,
}

/// Issues never reused fid ranges. The store is asked for a new lease of
/// `max_range` fids only when the current one is used up, and the lease upper
/// bound is persisted before any fid from it leaves the allocator.
pub struct FidAllocator {
    lease: Mutex<Lease>,
    store: Arc<dyn MetadataStore>,
    max_range: u64,
    allocate_range: u64,
}

impl FidAllocator {
    pub fn new(store: Arc<dyn MetadataStore>, max_range: u64, allocate_range: u64) -> Result<Self> {
        if max_range == 0
            || allocate_range == 0
            || allocate_range > max_range
            || max_range % allocate_range != 0
        {
            return Err(ChunkmasterError::MalformedRequest(format!(
                "fid allocate range {} must be non zero and divide non zero max range {}",
                allocate_range, max_range
            )));
        }
        Ok(Self {
            lease: Mutex::new(Lease::default()),
            store,
            max_range,
            allocate_range,
        })
    }

    #[instrument(name = "fid_allocate", skip(self))]
    pub async fn allocate(&self) -> Result<FidRange> {
        let mut lease = self.lease.lock().await;
        if lease.begin >= lease.end {
            self.refill(&mut lease).await?;
        }
        let range = FidRange {
            fid_begin: lease.begin,
            fid_end: lease.begin + self.allocate_range,
        };
        lease.begin = range.fid_end;
        debug!(fid_begin = range.fid_begin, fid_end = range.fid_end, "Allocated fid range");
        Ok(range)
    }

    async fn refill(&self, lease: &mut Lease) -> Result<()> {
        let begin = self.store.fetch_fid().await?;
        let end = begin
            .checked_add(self.max_range)
            .ok_or(ChunkmasterError::FidExhausted)?;
        lease.begin = begin;
        lease.end = end;
        if let Err(e) = self.store.update_fid(end).await {
            error!(error = %e, begin, end, "Error while persisting fid lease, dropping it");
            lease.begin = 0;
            lease.end = 0;
            return Err(e);
        }
        info!(begin, end, "Leased new fid range");
        Ok(())
    }
}
