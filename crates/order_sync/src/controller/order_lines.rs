//! Lines already on an order. This view is the page's single authoritative
//! reader of order status.

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use order_types::{
    domain::{OrderId, OrderStatus},
    protocol::{ChangeEnvelope, OrderChange},
};
use tracing::{info, warn};

use super::{
    attach_to_bus, ActionMessages, ControllerContext, ExternalEffect, GatedRow, ViewController,
    ViewCore,
};
use crate::{
    error::SyncError,
    gate::{GatedOperation, OrderLifecycleGate},
    row::OrderLineRow,
    view_cache::DatasetSource,
    OrderLineQuery, ViewKind,
};

const REMOVE_MESSAGES: ActionMessages = ActionMessages {
    success: "Product removed from order successfully",
    failure: "Failed to remove product from order",
};

const ACTIVATE_MESSAGES: ActionMessages = ActionMessages {
    success: "Order activated successfully",
    failure: "Failed to activate order",
};

const STATUS_LOAD_FAILED: &str = "Failed to load order status";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderLineAction {
    Remove,
}

impl GatedRow for OrderLineRow {
    fn locked(&self) -> Self {
        self.with_remove_disabled(true)
    }
}

struct OrderLineSource {
    query: Arc<dyn OrderLineQuery>,
    order_id: OrderId,
    gate: Arc<OrderLifecycleGate>,
}

#[async_trait]
impl DatasetSource<OrderLineRow> for OrderLineSource {
    async fn fetch(&self) -> Result<Vec<OrderLineRow>> {
        let records = self
            .query
            .fetch_lines(&self.order_id)
            .await
            .with_context(|| format!("fetching lines for order {}", self.order_id))?;
        let locked = self.gate.is_locked();
        Ok(records
            .into_iter()
            .map(|record| OrderLineRow::from_record(record, locked))
            .collect())
    }
}

pub struct OrderLinesController {
    core: ViewCore<OrderLineRow>,
    query: Arc<dyn OrderLineQuery>,
}

impl OrderLinesController {
    pub fn new(context: &ControllerContext, query: Arc<dyn OrderLineQuery>) -> Arc<Self> {
        let order_id = context.order_id().clone();
        let gate = Arc::new(OrderLifecycleGate::new(order_id.clone(), OrderStatus::Draft));
        let source = Arc::new(OrderLineSource {
            query: Arc::clone(&query),
            order_id,
            gate: Arc::clone(&gate),
        });
        let controller = Arc::new(Self {
            core: ViewCore::new(ViewKind::OrderLines, context, gate, source),
            query,
        });
        attach_to_bus(&controller);
        controller
    }

    /// Latest status as this view knows it.
    pub fn order_status(&self) -> OrderStatus {
        if self.core.gate().is_locked() {
            OrderStatus::Activated
        } else {
            OrderStatus::Draft
        }
    }

    /// Reads status from the server of record and feeds it to the gate.
    pub async fn refresh_status(&self) -> Result<OrderStatus, SyncError> {
        let order_id = self.core.order_id();
        match self.query.fetch_status(order_id).await {
            Ok(status) => {
                self.core.gate().observe_status(status);
                Ok(self.order_status())
            }
            Err(err) => {
                warn!(%order_id, error = %err, "status fetch failed");
                self.core.notifier().error(STATUS_LOAD_FAILED);
                Err(SyncError::status_fetch(order_id, &err))
            }
        }
    }

    /// Toolbar action: activate the order, locking every view on the page.
    pub async fn on_activate(&self) -> Result<(), SyncError> {
        self.core.authorize(GatedOperation::ActivateOrder)?;

        let order_id = self.core.order_id().clone();
        info!(%order_id, "activating order");
        let mutations = Arc::clone(self.core.mutations());
        let gate = Arc::clone(self.core.gate());
        let remote_order = order_id.clone();
        self.core
            .mutate(
                |dataset| dataset.map_rows(|row| row.with_remove_disabled(true)),
                async move {
                    mutations.activate_order(&remote_order).await?;
                    gate.lock();
                    Ok::<(), anyhow::Error>(())
                },
                ChangeEnvelope::status_activated(order_id),
                ACTIVATE_MESSAGES,
            )
            .await
    }

    async fn remove(&self, row: &OrderLineRow) -> Result<(), SyncError> {
        self.core.authorize(GatedOperation::RemoveLine)?;

        let order_id = self.core.order_id().clone();
        let line_id = row.order_item_id.clone();
        info!(%order_id, order_item_id = %line_id, "removing line from order");

        let mutations = Arc::clone(self.core.mutations());
        let edit_key = line_id.clone();
        let remote_line = line_id.clone();
        self.core
            .mutate(
                move |dataset| dataset.without(&edit_key),
                async move { mutations.remove_line(&remote_line).await },
                ChangeEnvelope::line_removed(
                    order_id,
                    line_id,
                    Some(row.pricebook_entry_id.clone()),
                ),
                REMOVE_MESSAGES,
            )
            .await
    }
}

#[async_trait]
impl ViewController for OrderLinesController {
    type Row = OrderLineRow;
    type Action = OrderLineAction;

    fn core(&self) -> &ViewCore<OrderLineRow> {
        &self.core
    }

    /// Status first, so rows are built with the right disabled state.
    async fn load(&self) -> Result<(), SyncError> {
        let status = self.refresh_status().await;
        let lines = self.core.load().await;
        status.and(lines)
    }

    async fn on_row_action(
        &self,
        action: OrderLineAction,
        row: &OrderLineRow,
    ) -> Result<(), SyncError> {
        match action {
            OrderLineAction::Remove => self.remove(row).await,
        }
    }

    fn on_external_change(&self, envelope: &ChangeEnvelope) -> ExternalEffect<OrderLineRow> {
        if !self.core.accepts(envelope) {
            return ExternalEffect::Ignored;
        }
        let cache = self.core.cache();
        match &envelope.change {
            // Quantity on an existing line may have changed server-side.
            OrderChange::LineAdded { .. } => {
                ExternalEffect::Refresh(self.core.refresh_in_background())
            }
            OrderChange::LineRemoved { order_item_id, .. } => {
                if !cache.current().contains(order_item_id) {
                    return ExternalEffect::Ignored;
                }
                cache.edit(|dataset| dataset.without(order_item_id));
                ExternalEffect::Patched
            }
            OrderChange::StatusActivated => {
                self.core.gate().observe(envelope);
                ExternalEffect::Locked
            }
        }
    }
}
