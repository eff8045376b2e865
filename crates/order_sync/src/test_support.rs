use std::sync::{
    atomic::{AtomicBool, AtomicUsize, Ordering},
    Arc, Mutex,
};

use async_trait::async_trait;
use order_types::{
    domain::{Money, OrderId, OrderItemId, OrderStatus, PricebookEntryId},
    protocol::OrderLineRecord,
};
use tokio::sync::Semaphore;

use crate::{
    memory::InMemoryOrderBackend,
    notify::{NotificationKind, NotificationSink},
    page::PageServices,
    row::{CatalogRow, OrderLineRow},
    view_cache::DatasetSource,
};

pub fn catalog_row(id: &str, name: &str, cents: i64) -> CatalogRow {
    CatalogRow {
        pricebook_entry_id: PricebookEntryId::new(id),
        product_name: name.to_string(),
        list_price: Money::from_cents(cents),
        is_added: false,
    }
}

pub fn line_row(id: &str, entry: &str, cents: i64, quantity: u32) -> OrderLineRow {
    OrderLineRow::from_record(
        OrderLineRecord {
            order_item_id: OrderItemId::new(id),
            pricebook_entry_id: PricebookEntryId::new(entry),
            product_name: format!("Product {entry}"),
            unit_price: Money::from_cents(cents),
            quantity,
        },
        false,
    )
}

/// Twelve products `01u01..=01u12` named `Product 01..=Product 12`; later
/// products cost more.
pub fn sample_backend(order_id: &OrderId, status: OrderStatus) -> Arc<InMemoryOrderBackend> {
    let backend = (1..=12i64).fold(InMemoryOrderBackend::new(), |backend, n| {
        backend.with_product(
            &format!("01u{n:02}"),
            &format!("Product {n:02}"),
            1_000 + n * 250,
        )
    });
    Arc::new(backend.with_order(order_id, status))
}

pub fn services(
    backend: &Arc<InMemoryOrderBackend>,
    notifier: &Arc<RecordingNotifier>,
) -> PageServices {
    PageServices {
        catalog_query: backend.clone(),
        line_query: backend.clone(),
        mutations: backend.clone(),
        notifier: notifier.clone(),
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    log: Mutex<Vec<(NotificationKind, String)>>,
}

impl RecordingNotifier {
    fn messages(&self, kind: NotificationKind) -> Vec<String> {
        self.log
            .lock()
            .unwrap()
            .iter()
            .filter(|(logged, _)| *logged == kind)
            .map(|(_, message)| message.clone())
            .collect()
    }

    pub fn errors(&self) -> Vec<String> {
        self.messages(NotificationKind::Error)
    }

    pub fn successes(&self) -> Vec<String> {
        self.messages(NotificationKind::Success)
    }

    pub fn clear(&self) {
        self.log.lock().unwrap().clear();
    }
}

impl NotificationSink for RecordingNotifier {
    fn notify(&self, kind: NotificationKind, _title: &str, message: &str) {
        self.log.lock().unwrap().push((kind, message.to_string()));
    }
}

/// Dataset source returning whatever rows it was last given. With a gate,
/// every fetch waits for one permit.
pub struct ScriptedSource<R> {
    rows: Mutex<Vec<R>>,
    failing: AtomicBool,
    calls: AtomicUsize,
    gate: Option<Arc<Semaphore>>,
}

impl<R: Clone> ScriptedSource<R> {
    pub fn new(rows: Vec<R>) -> Self {
        Self {
            rows: Mutex::new(rows),
            failing: AtomicBool::new(false),
            calls: AtomicUsize::new(0),
            gate: None,
        }
    }

    pub fn gated(rows: Vec<R>, gate: Arc<Semaphore>) -> Self {
        Self {
            gate: Some(gate),
            ..Self::new(rows)
        }
    }

    pub fn set_rows(&self, rows: Vec<R>) {
        *self.rows.lock().unwrap() = rows;
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl<R: Clone + Send + Sync> DatasetSource<R> for ScriptedSource<R> {
    async fn fetch(&self) -> anyhow::Result<Vec<R>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            gate.acquire().await?.forget();
        }
        if self.failing.load(Ordering::SeqCst) {
            anyhow::bail!("scripted source is down");
        }
        Ok(self.rows.lock().unwrap().clone())
    }
}
