//! Display rows and the immutable datasets that hold them.

use std::{fmt, ops::Deref, sync::Arc};

use order_types::{
    domain::{Money, OrderItemId, PricebookEntryId},
    protocol::{CatalogEntry, OrderLineRecord},
};
use serde::Serialize;

/// A sortable cell value. Missing fields sort as empty text.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Text(String),
    Number(f64),
    Flag(bool),
    Missing,
}

pub trait Row: Clone + Send + Sync + 'static {
    type Key: Clone + Eq + fmt::Debug + Send + Sync;

    fn key(&self) -> &Self::Key;

    fn field(&self, name: &str) -> FieldValue;
}

/// An ordered snapshot of rows. Never edited in place; every change builds a
/// new dataset, so holders of an older one keep seeing what they read.
pub struct Dataset<R>(Arc<Vec<R>>);

impl<R> Dataset<R> {
    pub fn new(rows: Vec<R>) -> Self {
        Self(Arc::new(rows))
    }

    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    pub fn rows(&self) -> &[R] {
        &self.0
    }

    /// True when both handles point at the same snapshot.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl<R: Row> Dataset<R> {
    pub fn find(&self, key: &R::Key) -> Option<&R> {
        self.0.iter().find(|row| row.key() == key)
    }

    pub fn contains(&self, key: &R::Key) -> bool {
        self.find(key).is_some()
    }

    /// Rebuilds the dataset with the row matching `key` replaced by `edit`.
    pub fn replace_row(&self, key: &R::Key, edit: impl Fn(&R) -> R) -> Self {
        self.map_rows(|row| {
            if row.key() == key {
                edit(row)
            } else {
                row.clone()
            }
        })
    }

    pub fn map_rows(&self, f: impl FnMut(&R) -> R) -> Self {
        Self::new(self.0.iter().map(f).collect())
    }

    pub fn without(&self, key: &R::Key) -> Self {
        Self::new(self.0.iter().filter(|row| row.key() != key).cloned().collect())
    }
}

impl<R> Clone for Dataset<R> {
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}

impl<R> Default for Dataset<R> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<R> Deref for Dataset<R> {
    type Target = [R];

    fn deref(&self) -> &[R] {
        &self.0
    }
}

impl<R> From<Vec<R>> for Dataset<R> {
    fn from(rows: Vec<R>) -> Self {
        Self::new(rows)
    }
}

impl<R: PartialEq> PartialEq for Dataset<R> {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl<R: fmt::Debug> fmt::Debug for Dataset<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.0.iter()).finish()
    }
}

fn money(value: Money) -> FieldValue {
    FieldValue::Number(value.cents() as f64)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CatalogRow {
    pub pricebook_entry_id: PricebookEntryId,
    pub product_name: String,
    pub list_price: Money,
    /// Drives the disabled state of the add button.
    pub is_added: bool,
}

impl CatalogRow {
    pub fn from_entry(entry: CatalogEntry, order_locked: bool) -> Self {
        Self {
            pricebook_entry_id: entry.pricebook_entry_id,
            product_name: entry.product_name,
            list_price: entry.list_price,
            is_added: entry.on_order || order_locked,
        }
    }

    pub fn with_added(&self, is_added: bool) -> Self {
        Self {
            is_added,
            ..self.clone()
        }
    }
}

impl Row for CatalogRow {
    type Key = PricebookEntryId;

    fn key(&self) -> &PricebookEntryId {
        &self.pricebook_entry_id
    }

    fn field(&self, name: &str) -> FieldValue {
        match name {
            "product_name" => FieldValue::Text(self.product_name.clone()),
            "list_price" => money(self.list_price),
            "is_added" => FieldValue::Flag(self.is_added),
            _ => FieldValue::Missing,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderLineRow {
    pub order_item_id: OrderItemId,
    pub pricebook_entry_id: PricebookEntryId,
    pub product_name: String,
    pub unit_price: Money,
    pub quantity: u32,
    pub total_price: Money,
    pub remove_disabled: bool,
}

impl OrderLineRow {
    pub fn from_record(record: OrderLineRecord, order_locked: bool) -> Self {
        Self {
            total_price: record.unit_price.times(record.quantity),
            order_item_id: record.order_item_id,
            pricebook_entry_id: record.pricebook_entry_id,
            product_name: record.product_name,
            unit_price: record.unit_price,
            quantity: record.quantity,
            remove_disabled: order_locked,
        }
    }

    pub fn with_remove_disabled(&self, remove_disabled: bool) -> Self {
        Self {
            remove_disabled,
            ..self.clone()
        }
    }
}

impl Row for OrderLineRow {
    type Key = OrderItemId;

    fn key(&self) -> &OrderItemId {
        &self.order_item_id
    }

    fn field(&self, name: &str) -> FieldValue {
        match name {
            "product_name" => FieldValue::Text(self.product_name.clone()),
            "unit_price" => money(self.unit_price),
            "quantity" => FieldValue::Number(f64::from(self.quantity)),
            "total_price" => money(self.total_price),
            "remove_disabled" => FieldValue::Flag(self.remove_disabled),
            _ => FieldValue::Missing,
        }
    }
}
