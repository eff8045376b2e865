use order_types::domain::{MutationId, OrderId};
use thiserror::Error;

use crate::{gate::GatedOperation, ViewKind};

/// Local rule that rejected an action before any remote call was made.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PolicyViolation {
    #[error("{}", .operation.locked_message())]
    OrderLocked { operation: GatedOperation },
    #[error("page size {size} is not one of the allowed options")]
    PageSizeNotAllowed { size: usize },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SyncError {
    /// The view cache could not load; the previous dataset is still current.
    #[error("failed to load {view}: {message}")]
    Fetch { view: ViewKind, message: String },
    #[error("failed to load status of order {order_id}: {message}")]
    StatusFetch { order_id: OrderId, message: String },
    /// A remote mutation failed after its optimistic edit; the edit was rolled back.
    #[error("mutation {mutation_id} failed: {message}")]
    Mutation {
        mutation_id: MutationId,
        message: String,
    },
    #[error(transparent)]
    Policy(#[from] PolicyViolation),
    #[error("malformed change envelope: {0}")]
    MalformedEnvelope(String),
}

impl SyncError {
    pub fn fetch(view: ViewKind, err: &anyhow::Error) -> Self {
        Self::Fetch {
            view,
            message: format!("{err:#}"),
        }
    }

    pub fn status_fetch(order_id: &OrderId, err: &anyhow::Error) -> Self {
        Self::StatusFetch {
            order_id: order_id.clone(),
            message: format!("{err:#}"),
        }
    }

    pub fn mutation(mutation_id: MutationId, err: &anyhow::Error) -> Self {
        Self::Mutation {
            mutation_id,
            message: format!("{err:#}"),
        }
    }

    pub fn is_policy(&self) -> bool {
        matches!(self, SyncError::Policy(_))
    }

    /// True for failures reported by a remote collaborator.
    pub fn is_remote(&self) -> bool {
        matches!(
            self,
            SyncError::Fetch { .. } | SyncError::StatusFetch { .. } | SyncError::Mutation { .. }
        )
    }
}
