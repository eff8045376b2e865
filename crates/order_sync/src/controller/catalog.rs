//! Purchasable products for one order, with search and add-to-order.

use std::sync::{Arc, Mutex, PoisonError};

use anyhow::{Context, Result};
use async_trait::async_trait;
use order_types::{
    domain::{OrderId, OrderStatus},
    protocol::{ChangeEnvelope, OrderChange},
};
use tracing::info;

use super::{
    attach_to_bus, ActionMessages, ControllerContext, ExternalEffect, GatedRow, ViewController,
    ViewCore,
};
use crate::{
    error::SyncError,
    gate::{GatedOperation, OrderLifecycleGate},
    row::CatalogRow,
    view_cache::DatasetSource,
    CatalogQuery, ViewKind,
};

const ADD_MESSAGES: ActionMessages = ActionMessages {
    success: "Product added to order successfully",
    failure: "Failed to add product to order",
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CatalogAction {
    Add,
}

impl GatedRow for CatalogRow {
    fn locked(&self) -> Self {
        self.with_added(true)
    }
}

struct CatalogSource {
    query: Arc<dyn CatalogQuery>,
    order_id: OrderId,
    keyword: Arc<Mutex<String>>,
    gate: Arc<OrderLifecycleGate>,
}

#[async_trait]
impl DatasetSource<CatalogRow> for CatalogSource {
    async fn fetch(&self) -> Result<Vec<CatalogRow>> {
        let keyword = self
            .keyword
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        let entries = self
            .query
            .fetch_available(&self.order_id, &keyword)
            .await
            .with_context(|| format!("fetching available products for order {}", self.order_id))?;
        let locked = self.gate.is_locked();
        Ok(entries
            .into_iter()
            .map(|entry| CatalogRow::from_entry(entry, locked))
            .collect())
    }
}

pub struct CatalogController {
    core: ViewCore<CatalogRow>,
    keyword: Arc<Mutex<String>>,
}

impl CatalogController {
    /// `status` is the order status as last read by the page's authoritative
    /// fetcher; this view never queries status itself.
    pub fn new(
        context: &ControllerContext,
        query: Arc<dyn CatalogQuery>,
        status: OrderStatus,
    ) -> Arc<Self> {
        let order_id = context.order_id().clone();
        let gate = Arc::new(OrderLifecycleGate::new(order_id.clone(), status));
        let keyword = Arc::new(Mutex::new(String::new()));
        let source = Arc::new(CatalogSource {
            query,
            order_id,
            keyword: Arc::clone(&keyword),
            gate: Arc::clone(&gate),
        });
        let controller = Arc::new(Self {
            core: ViewCore::new(ViewKind::Catalog, context, gate, source),
            keyword,
        });
        attach_to_bus(&controller);
        controller
    }

    pub fn keyword(&self) -> String {
        self.keyword
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Replaces the search keyword and reloads the catalog.
    pub async fn on_search(&self, keyword: &str) -> Result<(), SyncError> {
        *self.keyword.lock().unwrap_or_else(PoisonError::into_inner) = keyword.trim().to_string();
        self.core.cache().force_refresh().await.map(|_| ())
    }

    async fn add(&self, row: &CatalogRow) -> Result<(), SyncError> {
        self.core.authorize(GatedOperation::AddLine)?;

        let order_id = self.core.order_id().clone();
        let entry_id = row.pricebook_entry_id.clone();
        info!(%order_id, pricebook_entry_id = %entry_id, "adding product to order");

        let mutations = Arc::clone(self.core.mutations());
        let edit_key = entry_id.clone();
        let remote_order = order_id.clone();
        let remote_entry = entry_id.clone();
        self.core
            .mutate(
                move |dataset| dataset.replace_row(&edit_key, |row| row.with_added(true)),
                async move { mutations.add_line(&remote_order, &remote_entry).await },
                ChangeEnvelope::line_added(order_id, entry_id),
                ADD_MESSAGES,
            )
            .await
    }
}

#[async_trait]
impl ViewController for CatalogController {
    type Row = CatalogRow;
    type Action = CatalogAction;

    fn core(&self) -> &ViewCore<CatalogRow> {
        &self.core
    }

    async fn load(&self) -> Result<(), SyncError> {
        self.core.load().await
    }

    async fn on_row_action(&self, action: CatalogAction, row: &CatalogRow) -> Result<(), SyncError> {
        match action {
            CatalogAction::Add => self.add(row).await,
        }
    }

    fn on_external_change(&self, envelope: &ChangeEnvelope) -> ExternalEffect<CatalogRow> {
        if !self.core.accepts(envelope) {
            return ExternalEffect::Ignored;
        }
        let cache = self.core.cache();
        match &envelope.change {
            OrderChange::LineAdded { pricebook_entry_id } => {
                if !cache.current().contains(pricebook_entry_id) {
                    return ExternalEffect::Ignored;
                }
                cache.edit(|dataset| {
                    dataset.replace_row(pricebook_entry_id, |row| row.with_added(true))
                });
                ExternalEffect::Patched
            }
            OrderChange::LineRemoved {
                pricebook_entry_id: Some(pricebook_entry_id),
                ..
            } => {
                if self.core.gate().is_locked() || !cache.current().contains(pricebook_entry_id) {
                    return ExternalEffect::Ignored;
                }
                cache.edit(|dataset| {
                    dataset.replace_row(pricebook_entry_id, |row| row.with_added(false))
                });
                ExternalEffect::Patched
            }
            OrderChange::LineRemoved {
                pricebook_entry_id: None,
                ..
            } => ExternalEffect::Refresh(self.core.refresh_in_background()),
            OrderChange::StatusActivated => {
                self.core.gate().observe(envelope);
                ExternalEffect::Locked
            }
        }
    }
}
