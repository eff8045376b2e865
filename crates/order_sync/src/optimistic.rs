//! Speculative local edits confirmed or reverted by a remote mutation.

use std::{future::Future, sync::Arc};

use order_types::{domain::MutationId, protocol::ChangeEnvelope};
use tracing::{debug, warn};

use crate::{
    error::SyncError,
    row::{Dataset, Row},
    sync_bus::SyncBus,
    view_cache::{LoadResult, ViewCache},
};

/// The dataset as it was right before one in-flight mutation edited it.
///
/// Lives only until the mutation settles: discarded on success, consumed to
/// restore the cache on failure.
#[must_use = "an optimistic edit must be discarded or rolled back"]
pub struct OptimisticEdit<R> {
    id: MutationId,
    snapshot: Dataset<R>,
}

impl<R: Row> OptimisticEdit<R> {
    /// Snapshots the cache and applies `local_edit` in one step.
    pub fn begin(cache: &ViewCache<R>, local_edit: impl FnOnce(&Dataset<R>) -> Dataset<R>) -> Self {
        let snapshot = cache.edit(local_edit);
        Self {
            id: MutationId::new(),
            snapshot,
        }
    }

    pub fn id(&self) -> MutationId {
        self.id
    }

    pub fn snapshot(&self) -> &Dataset<R> {
        &self.snapshot
    }

    pub fn discard(self) -> MutationId {
        self.id
    }

    /// Restores the snapshot. Edits applied after this one began are lost too.
    pub fn roll_back(self, cache: &ViewCache<R>) -> MutationId {
        cache.restore(self.snapshot);
        self.id
    }
}

#[derive(Debug)]
pub struct MutationOutcome<R> {
    pub mutation_id: MutationId,
    /// Result of the post-confirmation refresh. A failed refresh leaves the
    /// confirmed local edit in place.
    pub refreshed: LoadResult<R>,
    pub delivered_to: usize,
}

pub struct OptimisticMutator {
    bus: Arc<SyncBus>,
}

impl OptimisticMutator {
    pub fn new(bus: Arc<SyncBus>) -> Self {
        Self { bus }
    }

    pub fn bus(&self) -> &Arc<SyncBus> {
        &self.bus
    }

    /// Concurrent calls on the same cache compose: each snapshots whatever
    /// is current when it starts, so a failure only undoes its own step.
    pub async fn apply<R, E, F>(
        &self,
        cache: &ViewCache<R>,
        local_edit: E,
        remote_call: F,
        on_success: ChangeEnvelope,
    ) -> Result<MutationOutcome<R>, SyncError>
    where
        R: Row,
        E: FnOnce(&Dataset<R>) -> Dataset<R>,
        F: Future<Output = anyhow::Result<()>>,
    {
        let edit = OptimisticEdit::begin(cache, local_edit);
        let mutation_id = edit.id();
        debug!(%mutation_id, view = %cache.view(), "optimistic edit applied");

        match remote_call.await {
            Ok(()) => {
                edit.discard();
                let refreshed = cache.force_refresh().await;
                if let Err(err) = &refreshed {
                    warn!(%mutation_id, error = %err, "refresh after mutation failed");
                }
                let delivered_to = self.bus.publish(on_success);
                Ok(MutationOutcome {
                    mutation_id,
                    refreshed,
                    delivered_to,
                })
            }
            Err(err) => {
                let error = SyncError::mutation(mutation_id, &err);
                warn!(%mutation_id, view = %cache.view(), error = %error, "mutation failed; rolling back");
                edit.roll_back(cache);
                Err(error)
            }
        }
    }
}

#[cfg(test)]
#[path = "tests/optimistic_tests.rs"]
mod tests;
