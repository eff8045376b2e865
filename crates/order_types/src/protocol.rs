use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{Money, OrderId, OrderItemId, PricebookEntryId};

/// A purchasable product as returned by the catalog query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub pricebook_entry_id: PricebookEntryId,
    pub product_name: String,
    pub list_price: Money,
    /// Set when the product already has a line on the queried order.
    #[serde(default)]
    pub on_order: bool,
}

/// A product already on an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLineRecord {
    pub order_item_id: OrderItemId,
    pub pricebook_entry_id: PricebookEntryId,
    pub product_name: String,
    pub unit_price: Money,
    pub quantity: u32,
}

/// What changed on an order. Each kind carries its own payload schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "payload", rename_all = "snake_case")]
pub enum OrderChange {
    LineAdded {
        pricebook_entry_id: PricebookEntryId,
    },
    LineRemoved {
        order_item_id: OrderItemId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pricebook_entry_id: Option<PricebookEntryId>,
    },
    StatusActivated,
}

impl OrderChange {
    pub fn kind_name(&self) -> &'static str {
        match self {
            OrderChange::LineAdded { .. } => "line_added",
            OrderChange::LineRemoved { .. } => "line_removed",
            OrderChange::StatusActivated => "status_activated",
        }
    }
}

/// A committed change published between sibling views of one order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeEnvelope {
    pub order_id: OrderId,
    pub change: OrderChange,
    pub published_at: DateTime<Utc>,
}

impl ChangeEnvelope {
    pub fn new(order_id: OrderId, change: OrderChange) -> Self {
        Self {
            order_id,
            change,
            published_at: Utc::now(),
        }
    }

    pub fn line_added(order_id: OrderId, pricebook_entry_id: PricebookEntryId) -> Self {
        Self::new(order_id, OrderChange::LineAdded { pricebook_entry_id })
    }

    pub fn line_removed(
        order_id: OrderId,
        order_item_id: OrderItemId,
        pricebook_entry_id: Option<PricebookEntryId>,
    ) -> Self {
        Self::new(
            order_id,
            OrderChange::LineRemoved {
                order_item_id,
                pricebook_entry_id,
            },
        )
    }

    pub fn status_activated(order_id: OrderId) -> Self {
        Self::new(order_id, OrderChange::StatusActivated)
    }

    pub fn is_for(&self, order_id: &OrderId) -> bool {
        &self.order_id == order_id
    }
}
