//! Both views of one order, sharing one bus.

use std::sync::Arc;

use order_types::domain::OrderId;
use tracing::info;

use crate::{
    controller::{
        catalog::CatalogController, order_lines::OrderLinesController, ControllerContext,
        ViewController,
    },
    error::SyncError,
    notify::NotificationSink,
    settings::ViewSettings,
    sync_bus::SyncBus,
    CatalogQuery, OrderLineQuery, OrderMutations,
};

pub struct OrderPage {
    context: ControllerContext,
    catalog: Arc<CatalogController>,
    order_lines: Arc<OrderLinesController>,
}

/// Collaborators an order page is built from.
pub struct PageServices {
    pub catalog_query: Arc<dyn CatalogQuery>,
    pub line_query: Arc<dyn OrderLineQuery>,
    pub mutations: Arc<dyn OrderMutations>,
    pub notifier: Arc<dyn NotificationSink>,
}

#[derive(Debug, Default)]
pub struct PageLoadReport {
    pub order_lines: Option<SyncError>,
    pub catalog: Option<SyncError>,
}

impl PageLoadReport {
    pub fn is_clean(&self) -> bool {
        self.order_lines.is_none() && self.catalog.is_none()
    }
}

impl OrderPage {
    /// Loads the order-lines view first: it reads the order status, and the
    /// catalog starts from what it read. Load failures were already surfaced
    /// as notifications and are returned for inspection only.
    pub async fn open(
        order_id: OrderId,
        services: PageServices,
        settings: ViewSettings,
    ) -> (Self, PageLoadReport) {
        let context = ControllerContext {
            bus: Arc::new(SyncBus::new(order_id.clone())),
            mutations: services.mutations,
            notifier: services.notifier,
            settings,
        };

        let order_lines = OrderLinesController::new(&context, services.line_query);
        let mut report = PageLoadReport {
            order_lines: order_lines.load().await.err(),
            ..PageLoadReport::default()
        };

        let status = order_lines.order_status();
        let catalog = CatalogController::new(&context, services.catalog_query, status);
        report.catalog = catalog.load().await.err();

        info!(%order_id, %status, clean = report.is_clean(), "order page opened");
        (
            Self {
                context,
                catalog,
                order_lines,
            },
            report,
        )
    }

    pub fn order_id(&self) -> &OrderId {
        self.context.order_id()
    }

    pub fn bus(&self) -> &Arc<SyncBus> {
        &self.context.bus
    }

    pub fn catalog(&self) -> &Arc<CatalogController> {
        &self.catalog
    }

    pub fn order_lines(&self) -> &Arc<OrderLinesController> {
        &self.order_lines
    }

    /// Waits until neither view has a fetch outstanding.
    pub async fn settled(&self) {
        self.order_lines.core().cache().settled().await;
        self.catalog.core().cache().settled().await;
    }
}
