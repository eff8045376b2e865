//! Client-side state synchronization for the catalog and order-lines views
//! of one order: cached datasets, optimistic mutations with rollback,
//! paginated/sorted windows, and change relay between sibling views.

use std::fmt;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use order_types::{
    domain::{OrderId, OrderItemId, OrderStatus, PricebookEntryId},
    protocol::{CatalogEntry, OrderLineRecord},
};
use serde::Serialize;

pub mod controller;
pub mod error;
pub mod gate;
pub mod memory;
pub mod notify;
pub mod observer;
pub mod optimistic;
pub mod page;
pub mod pagination;
pub mod row;
pub mod settings;
pub mod sort;
pub mod sync_bus;
pub mod view_cache;

#[cfg(test)]
pub(crate) mod test_support;

pub use controller::{
    catalog::{CatalogAction, CatalogController},
    order_lines::{OrderLineAction, OrderLinesController},
    ControllerContext, ExternalEffect, ViewController,
};
pub use error::{PolicyViolation, SyncError};
pub use gate::{GateState, GatedOperation, OrderLifecycleGate};
pub use memory::{BackendOp, InMemoryOrderBackend};
pub use notify::{NotificationKind, NotificationSink, TracingNotificationSink};
pub use optimistic::{MutationOutcome, OptimisticEdit, OptimisticMutator};
pub use page::{OrderPage, PageLoadReport, PageServices};
pub use pagination::{PaginationState, PaginationViewModel};
pub use row::{CatalogRow, Dataset, FieldValue, OrderLineRow, Row};
pub use settings::ViewSettings;
pub use sort::{SortDirection, SortSpec};
pub use sync_bus::SyncBus;
pub use view_cache::{CacheEvent, DatasetSource, ViewCache};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ViewKind {
    Catalog,
    OrderLines,
}

impl ViewKind {
    pub fn load_failed_message(self) -> &'static str {
        match self {
            ViewKind::Catalog => "Failed to load available products",
            ViewKind::OrderLines => "Failed to load order products",
        }
    }
}

impl fmt::Display for ViewKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ViewKind::Catalog => f.write_str("available products"),
            ViewKind::OrderLines => f.write_str("order products"),
        }
    }
}

#[async_trait]
pub trait CatalogQuery: Send + Sync {
    async fn fetch_available(&self, order_id: &OrderId, keyword: &str)
        -> Result<Vec<CatalogEntry>>;
}

#[async_trait]
pub trait OrderLineQuery: Send + Sync {
    async fn fetch_lines(&self, order_id: &OrderId) -> Result<Vec<OrderLineRecord>>;
    async fn fetch_status(&self, order_id: &OrderId) -> Result<OrderStatus>;
}

#[async_trait]
pub trait OrderMutations: Send + Sync {
    async fn add_line(&self, order_id: &OrderId, product: &PricebookEntryId) -> Result<()>;
    async fn remove_line(&self, line_id: &OrderItemId) -> Result<()>;
    async fn activate_order(&self, order_id: &OrderId) -> Result<()>;
}

pub struct MissingCatalogQuery;

#[async_trait]
impl CatalogQuery for MissingCatalogQuery {
    async fn fetch_available(
        &self,
        order_id: &OrderId,
        _keyword: &str,
    ) -> Result<Vec<CatalogEntry>> {
        Err(anyhow!("catalog query is unavailable for order {order_id}"))
    }
}

pub struct MissingOrderLineQuery;

#[async_trait]
impl OrderLineQuery for MissingOrderLineQuery {
    async fn fetch_lines(&self, order_id: &OrderId) -> Result<Vec<OrderLineRecord>> {
        Err(anyhow!("order line query is unavailable for order {order_id}"))
    }

    async fn fetch_status(&self, order_id: &OrderId) -> Result<OrderStatus> {
        Err(anyhow!("order status query is unavailable for order {order_id}"))
    }
}

pub struct MissingOrderMutations;

#[async_trait]
impl OrderMutations for MissingOrderMutations {
    async fn add_line(&self, order_id: &OrderId, product: &PricebookEntryId) -> Result<()> {
        Err(anyhow!(
            "order mutations are unavailable; cannot add {product} to order {order_id}"
        ))
    }

    async fn remove_line(&self, line_id: &OrderItemId) -> Result<()> {
        Err(anyhow!(
            "order mutations are unavailable; cannot remove line {line_id}"
        ))
    }

    async fn activate_order(&self, order_id: &OrderId) -> Result<()> {
        Err(anyhow!(
            "order mutations are unavailable; cannot activate order {order_id}"
        ))
    }
}
