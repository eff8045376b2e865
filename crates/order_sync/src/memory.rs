//! In-process order backend implementing every collaborator trait.
//!
//! Used by the console host and by tests. Any operation can be told to fail
//! so rollback and error surfacing can be exercised.

use std::{
    collections::{HashMap, HashSet},
    sync::{Mutex, MutexGuard, PoisonError},
};

use anyhow::Result;
use async_trait::async_trait;
use order_types::{
    domain::{Money, OrderId, OrderItemId, OrderStatus, PricebookEntryId},
    error::{ApiException, ErrorCode},
    protocol::{CatalogEntry, OrderLineRecord},
};

use crate::{CatalogQuery, OrderLineQuery, OrderMutations};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendOp {
    FetchAvailable,
    FetchLines,
    FetchStatus,
    AddLine,
    RemoveLine,
    ActivateOrder,
}

#[derive(Debug, Default)]
struct OrderRecord {
    status: OrderStatus,
    lines: Vec<OrderLineRecord>,
}

#[derive(Debug, Default)]
struct BackendState {
    products: Vec<CatalogEntry>,
    orders: HashMap<OrderId, OrderRecord>,
    next_line: u64,
    calls: HashMap<BackendOp, usize>,
    failing: HashSet<BackendOp>,
}

#[derive(Debug, Default)]
pub struct InMemoryOrderBackend {
    state: Mutex<BackendState>,
}

impl InMemoryOrderBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_product(self, id: &str, name: &str, list_price_cents: i64) -> Self {
        self.lock().products.push(CatalogEntry {
            pricebook_entry_id: PricebookEntryId::new(id),
            product_name: name.to_string(),
            list_price: Money::from_cents(list_price_cents),
            on_order: false,
        });
        self
    }

    pub fn with_order(self, order_id: &OrderId, status: OrderStatus) -> Self {
        self.lock().orders.insert(
            order_id.clone(),
            OrderRecord {
                status,
                lines: Vec::new(),
            },
        );
        self
    }

    /// Every later call to `op` fails until [`Self::heal`].
    pub fn fail(&self, op: BackendOp) {
        self.lock().failing.insert(op);
    }

    pub fn heal(&self, op: BackendOp) {
        self.lock().failing.remove(&op);
    }

    pub fn calls(&self, op: BackendOp) -> usize {
        self.lock().calls.get(&op).copied().unwrap_or(0)
    }

    pub fn lines(&self, order_id: &OrderId) -> Vec<OrderLineRecord> {
        self.lock()
            .orders
            .get(order_id)
            .map(|order| order.lines.clone())
            .unwrap_or_default()
    }

    pub fn status(&self, order_id: &OrderId) -> Option<OrderStatus> {
        self.lock().orders.get(order_id).map(|order| order.status)
    }

    fn lock(&self) -> MutexGuard<'_, BackendState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Counts the call and returns the state, or the injected failure.
    fn enter(&self, op: BackendOp) -> Result<MutexGuard<'_, BackendState>, ApiException> {
        let mut state = self.lock();
        *state.calls.entry(op).or_default() += 1;
        if state.failing.contains(&op) {
            return Err(ApiException::new(
                ErrorCode::Unavailable,
                format!("{op:?} is unavailable"),
            ));
        }
        Ok(state)
    }
}

fn order_mut<'a>(
    state: &'a mut BackendState,
    order_id: &OrderId,
) -> Result<&'a mut OrderRecord, ApiException> {
    state
        .orders
        .get_mut(order_id)
        .ok_or_else(|| ApiException::not_found(format!("order {order_id} not found")))
}

#[async_trait]
impl CatalogQuery for InMemoryOrderBackend {
    async fn fetch_available(
        &self,
        order_id: &OrderId,
        keyword: &str,
    ) -> Result<Vec<CatalogEntry>> {
        let state = self.enter(BackendOp::FetchAvailable)?;
        let order = state
            .orders
            .get(order_id)
            .ok_or_else(|| ApiException::not_found(format!("order {order_id} not found")))?;
        let needle = keyword.trim().to_lowercase();
        Ok(state
            .products
            .iter()
            .filter(|product| {
                needle.is_empty() || product.product_name.to_lowercase().contains(&needle)
            })
            .map(|product| CatalogEntry {
                on_order: order
                    .lines
                    .iter()
                    .any(|line| line.pricebook_entry_id == product.pricebook_entry_id),
                ..product.clone()
            })
            .collect())
    }
}

#[async_trait]
impl OrderLineQuery for InMemoryOrderBackend {
    async fn fetch_lines(&self, order_id: &OrderId) -> Result<Vec<OrderLineRecord>> {
        let mut state = self.enter(BackendOp::FetchLines)?;
        Ok(order_mut(&mut state, order_id)?.lines.clone())
    }

    async fn fetch_status(&self, order_id: &OrderId) -> Result<OrderStatus> {
        let mut state = self.enter(BackendOp::FetchStatus)?;
        Ok(order_mut(&mut state, order_id)?.status)
    }
}

#[async_trait]
impl OrderMutations for InMemoryOrderBackend {
    /// Adding a product already on the order bumps that line's quantity.
    async fn add_line(&self, order_id: &OrderId, product: &PricebookEntryId) -> Result<()> {
        let mut state = self.enter(BackendOp::AddLine)?;
        let entry = state
            .products
            .iter()
            .find(|entry| &entry.pricebook_entry_id == product)
            .cloned()
            .ok_or_else(|| ApiException::not_found(format!("product {product} not found")))?;
        state.next_line += 1;
        let line_id = OrderItemId::new(format!("{order_id}-L{}", state.next_line));

        let order = order_mut(&mut state, order_id)?;
        if order.status.is_activated() {
            return Err(ApiException::forbidden(format!("order {order_id} is activated")).into());
        }
        match order
            .lines
            .iter_mut()
            .find(|line| &line.pricebook_entry_id == product)
        {
            Some(line) => line.quantity += 1,
            None => order.lines.push(OrderLineRecord {
                order_item_id: line_id,
                pricebook_entry_id: entry.pricebook_entry_id,
                product_name: entry.product_name,
                unit_price: entry.list_price,
                quantity: 1,
            }),
        }
        Ok(())
    }

    async fn remove_line(&self, line_id: &OrderItemId) -> Result<()> {
        let mut state = self.enter(BackendOp::RemoveLine)?;
        let order = state
            .orders
            .values_mut()
            .find(|order| order.lines.iter().any(|line| &line.order_item_id == line_id))
            .ok_or_else(|| ApiException::not_found(format!("line {line_id} not found")))?;
        if order.status.is_activated() {
            return Err(ApiException::forbidden("order is activated").into());
        }
        order.lines.retain(|line| &line.order_item_id != line_id);
        Ok(())
    }

    async fn activate_order(&self, order_id: &OrderId) -> Result<()> {
        let mut state = self.enter(BackendOp::ActivateOrder)?;
        let order = order_mut(&mut state, order_id)?;
        if order.status.is_activated() {
            return Err(ApiException::new(
                ErrorCode::Validation,
                format!("order {order_id} is already activated"),
            )
            .into());
        }
        order.status = OrderStatus::Activated;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn order() -> OrderId {
        OrderId::new("801")
    }

    fn backend() -> InMemoryOrderBackend {
        InMemoryOrderBackend::new()
            .with_product("01u1", "Laptop", 120_000)
            .with_product("01u2", "Laptop Bag", 4_500)
            .with_product("01u3", "Mouse", 2_000)
            .with_order(&order(), OrderStatus::Draft)
    }

    #[tokio::test]
    async fn keyword_filters_case_insensitively() {
        let backend = backend();
        let found = backend
            .fetch_available(&order(), "LAPTOP")
            .await
            .expect("fetch");
        assert_eq!(found.len(), 2);
    }

    #[tokio::test]
    async fn adding_twice_bumps_quantity_and_flags_on_order() {
        let backend = backend();
        let entry = PricebookEntryId::new("01u3");
        backend.add_line(&order(), &entry).await.expect("first add");
        backend.add_line(&order(), &entry).await.expect("second add");

        let lines = backend.lines(&order());
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].quantity, 2);

        let catalog = backend.fetch_available(&order(), "").await.expect("fetch");
        let mouse = catalog
            .iter()
            .find(|entry| entry.pricebook_entry_id.as_str() == "01u3")
            .expect("mouse");
        assert!(mouse.on_order);
    }

    #[tokio::test]
    async fn activated_orders_reject_changes() {
        let backend = backend();
        backend.activate_order(&order()).await.expect("activate");

        let err = backend
            .add_line(&order(), &PricebookEntryId::new("01u1"))
            .await
            .expect_err("activated order rejects add");
        assert!(err.to_string().contains("Forbidden"));
        assert!(backend.activate_order(&order()).await.is_err());
    }

    #[tokio::test]
    async fn injected_failures_are_counted_and_healable() {
        let backend = backend();
        backend.fail(BackendOp::FetchLines);
        assert!(backend.fetch_lines(&order()).await.is_err());
        backend.heal(BackendOp::FetchLines);
        assert!(backend.fetch_lines(&order()).await.is_ok());
        assert_eq!(backend.calls(BackendOp::FetchLines), 2);
    }
}
