//! Batched event copy from a source shard group's store into a freshly
//! provisioned target store. The source writer is expected to be paused
//! by the caller; before the final batch the copier additionally verifies
//! that the writer has drained its in-flight operations, so no event can
//! land after the copy believes it has seen the tail.

use std::ops::RangeInclusive;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::sleep;
use tracing::{debug, info};

use crate::clients::{Event, EventBulkPersister, EventReader, WriterAdminClient};
use crate::sharding::DataElement;

#[derive(Debug, Error)]
pub enum CopyError {
    #[error("{0}")]
    Client(#[from] crate::clients::Error),

    #[error("source writer still reports {in_flight} in-flight events after {checks} checks")]
    WriterNotIdle { in_flight: u64, checks: u32 },
}

/// Which source events move to the target during a split.
///
/// Group events carry a per-key hash and are filtered to the moved range;
/// user events are partitioned by the entire key and move unfiltered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventFilterPolicy {
    CopyAll,
    FilterToRange,
}

impl EventFilterPolicy {
    pub fn for_element(element: DataElement) -> Self {
        match element {
            DataElement::Group => EventFilterPolicy::FilterToRange,
            _ => EventFilterPolicy::CopyAll,
        }
    }

    fn keeps(&self, event: &Event, range: &RangeInclusive<i32>) -> bool {
        match self {
            EventFilterPolicy::CopyAll => true,
            EventFilterPolicy::FilterToRange => range.contains(&event.hash_code),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CopyStats {
    pub copied: usize,
    pub batches: usize,
}

pub struct ShardGroupSplitter {
    reader: Arc<dyn EventReader>,
    persister: Arc<dyn EventBulkPersister>,
    writer_admin: WriterAdminClient,
    batch_size: usize,
    idle_checks: u32,
    idle_interval: Duration,
    filter: EventFilterPolicy,
}

impl ShardGroupSplitter {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        reader: Arc<dyn EventReader>,
        persister: Arc<dyn EventBulkPersister>,
        writer_admin: WriterAdminClient,
        batch_size: usize,
        idle_checks: u32,
        idle_interval: Duration,
        filter: EventFilterPolicy,
    ) -> Self {
        Self {
            reader,
            persister,
            writer_admin,
            batch_size,
            idle_checks,
            idle_interval,
            filter,
        }
    }

    /// Stream events into the target in batches. When the tail of the
    /// log comes into view, verify the writer is idle, then keep reading
    /// until nothing new appears. The persister is idempotent, so an
    /// interrupted copy can simply be re-driven.
    pub async fn copy_events_to_target(
        &self,
        range: RangeInclusive<i32>,
    ) -> Result<CopyStats, CopyError> {
        let mut stats = CopyStats::default();
        let mut after = None;
        let mut quiesced = false;

        loop {
            let batch = self.reader.read_batch(after, self.batch_size).await?;
            let full = batch.len() == self.batch_size;
            if let Some(last) = batch.last() {
                after = Some(last.sequence);
            }

            if !batch.is_empty() {
                let kept: Vec<Event> = batch
                    .into_iter()
                    .filter(|event| self.filter.keeps(event, &range))
                    .collect();
                if !kept.is_empty() {
                    self.persister.persist(&kept).await?;
                    stats.copied += kept.len();
                    stats.batches += 1;
                }
            }

            if full {
                continue;
            }
            if quiesced {
                break;
            }
            self.wait_for_writer_idle().await?;
            quiesced = true;
        }

        info!(
            "event copy complete: {} events in {} batches",
            stats.copied, stats.batches
        );

        Ok(stats)
    }

    async fn wait_for_writer_idle(&self) -> Result<(), CopyError> {
        let mut in_flight = 0;
        for check in 0..self.idle_checks {
            in_flight = self.writer_admin.in_flight_event_count().await?;
            if in_flight == 0 {
                return Ok(());
            }
            debug!(
                "source writer has {} in-flight events (check {}/{})",
                in_flight,
                check + 1,
                self.idle_checks
            );
            sleep(self.idle_interval).await;
        }

        Err(CopyError::WriterNotIdle {
            in_flight,
            checks: self.idle_checks,
        })
    }
}
