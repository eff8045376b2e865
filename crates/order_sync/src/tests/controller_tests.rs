use std::sync::Arc;

use order_types::{
    domain::{OrderId, OrderStatus, PricebookEntryId},
    protocol::ChangeEnvelope,
};

use super::{
    catalog::CatalogAction, order_lines::OrderLineAction, ActionMessages, ExternalEffect,
    ViewController,
};
use crate::{
    error::{PolicyViolation, SyncError},
    gate::{GateState, GatedOperation},
    memory::{BackendOp, InMemoryOrderBackend},
    page::{OrderPage, PageLoadReport, PageServices},
    row::{CatalogRow, OrderLineRow},
    settings::ViewSettings,
    sort::SortDirection,
    test_support::{sample_backend, services, RecordingNotifier},
    MissingCatalogQuery, MissingOrderLineQuery, MissingOrderMutations, OrderMutations,
};

fn order() -> OrderId {
    OrderId::new("801")
}

fn entry(id: &str) -> PricebookEntryId {
    PricebookEntryId::new(id)
}

struct Harness {
    backend: Arc<InMemoryOrderBackend>,
    notifier: Arc<RecordingNotifier>,
    page: OrderPage,
    report: PageLoadReport,
}

impl Harness {
    async fn open(backend: Arc<InMemoryOrderBackend>) -> Self {
        let notifier = Arc::new(RecordingNotifier::default());
        let (page, report) = OrderPage::open(
            order(),
            services(&backend, &notifier),
            ViewSettings::default(),
        )
        .await;
        Self {
            backend,
            notifier,
            page,
            report,
        }
    }

    async fn draft_with_lines(entries: &[&str]) -> Self {
        let backend = sample_backend(&order(), OrderStatus::Draft);
        for id in entries {
            backend
                .add_line(&order(), &entry(id))
                .await
                .expect("seed line");
        }
        Self::open(backend).await
    }

    async fn activated_with_lines(entries: &[&str]) -> Self {
        let backend = sample_backend(&order(), OrderStatus::Draft);
        for id in entries {
            backend
                .add_line(&order(), &entry(id))
                .await
                .expect("seed line");
        }
        backend.activate_order(&order()).await.expect("activate");
        Self::open(backend).await
    }

    fn catalog_row(&self, id: &str) -> CatalogRow {
        self.page
            .catalog()
            .core()
            .cache()
            .current()
            .find(&entry(id))
            .cloned()
            .expect("catalog row")
    }

    fn line_for(&self, id: &str) -> OrderLineRow {
        self.page
            .order_lines()
            .core()
            .cache()
            .current()
            .iter()
            .find(|row| row.pricebook_entry_id == entry(id))
            .cloned()
            .expect("order line")
    }

    fn line_count(&self) -> usize {
        self.page.order_lines().core().cache().current().len()
    }
}

fn names(rows: &[CatalogRow]) -> Vec<&str> {
    rows.iter().map(|row| row.product_name.as_str()).collect()
}

#[tokio::test]
async fn open_loads_both_views_from_one_status_read() {
    let harness = Harness::draft_with_lines(&["01u03"]).await;
    let page = &harness.page;

    assert!(harness.report.is_clean());
    assert!(harness.notifier.errors().is_empty());
    assert_eq!(harness.backend.calls(BackendOp::FetchStatus), 1);
    assert_eq!(page.order_id(), &order());

    assert_eq!(page.catalog().gate_state(), GateState::Editable);
    assert_eq!(page.order_lines().gate_state(), GateState::Editable);
    assert_eq!(page.order_lines().order_status(), OrderStatus::Draft);

    let catalog_state = page.catalog().pagination_state();
    assert_eq!(catalog_state.total_count, 12);
    assert_eq!(catalog_state.total_pages(), 3);
    assert_eq!(page.catalog().visible_rows().len(), 5);
    assert!(harness.catalog_row("01u03").is_added);
    assert!(!harness.catalog_row("01u04").is_added);

    assert_eq!(harness.line_count(), 1);
    assert!(!page.catalog().task_in_flight());
    assert!(!page.order_lines().task_in_flight());
}

#[tokio::test]
async fn activated_order_opens_locked() {
    let harness = Harness::activated_with_lines(&["01u01", "01u02"]).await;
    let page = &harness.page;

    assert_eq!(page.order_lines().order_status(), OrderStatus::Activated);
    assert_eq!(page.catalog().gate_state(), GateState::Locked);
    assert_eq!(page.order_lines().gate_state(), GateState::Locked);
    assert!(page.catalog().visible_rows().iter().all(|row| row.is_added));
    assert!(page
        .order_lines()
        .visible_rows()
        .iter()
        .all(|row| row.remove_disabled));
}

#[tokio::test]
async fn add_marks_row_and_refreshes_sibling_once() {
    let harness = Harness::draft_with_lines(&[]).await;
    let page = &harness.page;
    let lines_before = harness.backend.calls(BackendOp::FetchLines);
    let row = harness.catalog_row("01u05");

    page.catalog()
        .on_row_action(CatalogAction::Add, &row)
        .await
        .expect("add");
    page.settled().await;

    assert_eq!(harness.backend.calls(BackendOp::AddLine), 1);
    assert_eq!(harness.backend.calls(BackendOp::FetchLines), lines_before + 1);
    assert!(harness.catalog_row("01u05").is_added);
    assert_eq!(harness.line_count(), 1);
    assert_eq!(harness.line_for("01u05").quantity, 1);
    assert_eq!(page.bus().published_count(), 1);
    assert_eq!(
        harness.notifier.successes(),
        vec!["Product added to order successfully"]
    );
}

#[tokio::test]
async fn add_on_locked_order_never_reaches_the_backend() {
    let harness = Harness::activated_with_lines(&["01u01"]).await;
    let page = &harness.page;
    let before = page.catalog().core().cache().current();
    let row = harness.catalog_row("01u07");

    let err = page
        .catalog()
        .on_row_action(CatalogAction::Add, &row)
        .await
        .expect_err("locked");

    assert_eq!(
        err,
        SyncError::Policy(PolicyViolation::OrderLocked {
            operation: GatedOperation::AddLine
        })
    );
    assert_eq!(harness.backend.calls(BackendOp::AddLine), 1, "only the seed");
    assert!(page.catalog().core().cache().current().ptr_eq(&before));
    assert_eq!(page.bus().published_count(), 0);
    assert_eq!(
        harness.notifier.errors(),
        vec!["Order is already activated. Cannot add products."]
    );
}

#[tokio::test]
async fn remove_on_locked_order_never_reaches_the_backend() {
    let harness = Harness::activated_with_lines(&["01u01"]).await;
    let row = harness.line_for("01u01");

    let err = harness
        .page
        .order_lines()
        .on_row_action(OrderLineAction::Remove, &row)
        .await
        .expect_err("locked");

    assert!(err.is_policy());
    assert_eq!(harness.backend.calls(BackendOp::RemoveLine), 0);
    assert_eq!(harness.line_count(), 1);
    assert_eq!(
        harness.notifier.errors(),
        vec!["Order is already activated. Cannot remove products."]
    );
}

#[tokio::test]
async fn failed_remove_restores_lines_and_reports_once() {
    let harness = Harness::draft_with_lines(&["01u01", "01u02"]).await;
    let page = &harness.page;
    let before = page.order_lines().core().cache().current();
    harness.backend.fail(BackendOp::RemoveLine);
    let row = harness.line_for("01u02");

    let err = page
        .order_lines()
        .on_row_action(OrderLineAction::Remove, &row)
        .await
        .expect_err("backend rejects");

    assert!(matches!(err, SyncError::Mutation { .. }));
    assert!(err.is_remote());
    assert!(page.order_lines().core().cache().current().ptr_eq(&before));
    assert_eq!(
        harness.notifier.errors(),
        vec!["Failed to remove product from order"]
    );
    assert_eq!(page.bus().published_count(), 0);
    assert!(harness.catalog_row("01u02").is_added);
}

#[tokio::test]
async fn remove_frees_the_catalog_row() {
    let harness = Harness::draft_with_lines(&["01u01", "01u02"]).await;
    let page = &harness.page;
    let row = harness.line_for("01u02");

    page.order_lines()
        .on_row_action(OrderLineAction::Remove, &row)
        .await
        .expect("remove");
    page.settled().await;

    assert_eq!(harness.line_count(), 1);
    assert!(!harness.catalog_row("01u02").is_added);
    assert!(harness.catalog_row("01u01").is_added);
    assert_eq!(
        harness.notifier.successes(),
        vec!["Product removed from order successfully"]
    );
}

#[tokio::test]
async fn activation_locks_both_views() {
    let harness = Harness::draft_with_lines(&["01u01"]).await;
    let page = &harness.page;

    page.order_lines().on_activate().await.expect("activate");
    page.settled().await;

    assert_eq!(harness.backend.status(&order()), Some(OrderStatus::Activated));
    assert_eq!(page.order_lines().gate_state(), GateState::Locked);
    assert_eq!(page.catalog().gate_state(), GateState::Locked);
    assert!(harness.line_for("01u01").remove_disabled);
    assert!(page
        .catalog()
        .core()
        .cache()
        .current()
        .iter()
        .all(|row| row.is_added));
    assert_eq!(harness.notifier.successes(), vec!["Order activated successfully"]);

    let err = page
        .order_lines()
        .on_activate()
        .await
        .expect_err("already active");
    assert_eq!(err.to_string(), "Order is already activated.");
    assert_eq!(harness.backend.calls(BackendOp::ActivateOrder), 1);
}

#[tokio::test]
async fn failed_activation_leaves_order_editable() {
    let harness = Harness::draft_with_lines(&["01u01"]).await;
    let page = &harness.page;
    harness.backend.fail(BackendOp::ActivateOrder);

    page.order_lines()
        .on_activate()
        .await
        .expect_err("backend rejects");

    assert_eq!(page.order_lines().gate_state(), GateState::Editable);
    assert_eq!(page.catalog().gate_state(), GateState::Editable);
    assert!(!harness.line_for("01u01").remove_disabled);
    assert_eq!(harness.notifier.errors(), vec!["Failed to activate order"]);
}

#[tokio::test]
async fn rollback_after_activation_keeps_rows_locked() {
    let harness = Harness::draft_with_lines(&[]).await;
    let page = &harness.page;
    let catalog = page.catalog();
    let key = entry("01u04");

    let result = catalog
        .core()
        .mutate(
            move |dataset| dataset.replace_row(&key, |row| row.with_added(true)),
            async {
                page.bus().publish(ChangeEnvelope::status_activated(order()));
                assert!(catalog.core().cache().current().iter().all(|row| row.is_added));
                Err::<(), _>(anyhow::anyhow!("add rejected"))
            },
            ChangeEnvelope::line_added(order(), entry("01u04")),
            ActionMessages {
                success: "added",
                failure: "add failed",
            },
        )
        .await;

    assert!(matches!(result, Err(SyncError::Mutation { .. })));
    assert_eq!(catalog.gate_state(), GateState::Locked);
    assert!(catalog.core().cache().current().iter().all(|row| row.is_added));
    assert!(catalog.visible_rows().iter().all(|row| row.is_added));
    assert_eq!(harness.backend.calls(BackendOp::AddLine), 0);
    assert_eq!(harness.notifier.errors(), vec!["add failed"]);
}

#[tokio::test]
async fn envelopes_for_other_orders_are_ignored() {
    let harness = Harness::draft_with_lines(&["01u01"]).await;
    let page = &harness.page;
    let other = OrderId::new("999");
    let lines_before = harness.backend.calls(BackendOp::FetchLines);

    assert!(page
        .catalog()
        .on_external_change(&ChangeEnvelope::status_activated(other.clone()))
        .is_ignored());
    assert!(page
        .order_lines()
        .on_external_change(&ChangeEnvelope::line_added(other.clone(), entry("01u02")))
        .is_ignored());

    page.bus()
        .publish(ChangeEnvelope::line_removed(
            other,
            harness.line_for("01u01").order_item_id,
            Some(entry("01u01")),
        ));
    page.settled().await;

    assert_eq!(page.catalog().gate_state(), GateState::Editable);
    assert_eq!(harness.line_count(), 1);
    assert!(harness.catalog_row("01u01").is_added);
    assert_eq!(harness.backend.calls(BackendOp::FetchLines), lines_before);
}

#[tokio::test]
async fn external_line_added_refreshes_order_lines() {
    let harness = Harness::draft_with_lines(&[]).await;
    let page = &harness.page;
    harness
        .backend
        .add_line(&order(), &entry("01u09"))
        .await
        .expect("added elsewhere");

    let effect = page
        .order_lines()
        .on_external_change(&ChangeEnvelope::line_added(order(), entry("01u09")));
    assert!(matches!(effect, ExternalEffect::Refresh(_)));
    effect.settled().await;

    assert_eq!(harness.line_count(), 1);
    assert!(matches!(
        page.catalog()
            .on_external_change(&ChangeEnvelope::line_added(order(), entry("01u09"))),
        ExternalEffect::Patched
    ));
    assert!(harness.catalog_row("01u09").is_added);
    assert!(page
        .catalog()
        .on_external_change(&ChangeEnvelope::line_added(order(), entry("missing")))
        .is_ignored());
}

#[tokio::test]
async fn activation_from_an_external_channel_locks_the_page() {
    let harness = Harness::draft_with_lines(&["01u01"]).await;
    let page = &harness.page;
    let raw = serde_json::to_string(&ChangeEnvelope::status_activated(order()))
        .expect("serialize");

    let delivered = page.bus().deliver_json(&raw).expect("valid envelope");

    assert_eq!(delivered, 2);
    assert_eq!(page.catalog().gate_state(), GateState::Locked);
    assert_eq!(page.order_lines().gate_state(), GateState::Locked);
    assert!(harness.line_for("01u01").remove_disabled);

    assert!(page.bus().deliver_json("{\"order_id\":").is_err());
}

#[tokio::test]
async fn search_reloads_catalog_with_keyword() {
    let harness = Harness::draft_with_lines(&[]).await;
    let catalog = harness.page.catalog();

    catalog.on_search("  product 1 ").await.expect("search");

    assert_eq!(catalog.keyword(), "product 1");
    assert_eq!(
        names(&catalog.visible_rows()),
        vec!["Product 10", "Product 11", "Product 12"]
    );
    assert_eq!(catalog.pagination_state().total_count, 3);
    assert_eq!(catalog.pagination_state().current_page, 1);

    catalog.on_search("").await.expect("clear search");
    assert_eq!(catalog.pagination_state().total_count, 12);
}

#[tokio::test]
async fn sort_and_paging_project_through_the_view() {
    let harness = Harness::draft_with_lines(&[]).await;
    let catalog = harness.page.catalog();

    catalog.on_sort("list_price", SortDirection::Desc);
    assert_eq!(
        names(&catalog.visible_rows()),
        vec![
            "Product 12",
            "Product 11",
            "Product 10",
            "Product 09",
            "Product 08"
        ]
    );

    assert!(catalog.on_next_page());
    assert_eq!(catalog.visible_rows()[0].product_name, "Product 07");
    assert_eq!(catalog.on_page_change(99), 3);
    assert_eq!(catalog.visible_rows().len(), 2);
    assert!(!catalog.on_next_page());
    assert!(catalog.on_previous_page());

    catalog.on_page_size_change(10).expect("allowed size");
    let state = catalog.pagination_state();
    assert_eq!(state.current_page, 1);
    assert_eq!(state.page_size.get(), 10);
    assert_eq!(catalog.visible_rows().len(), 10);
}

#[tokio::test]
async fn sort_survives_a_reload() {
    let harness = Harness::draft_with_lines(&[]).await;
    let catalog = harness.page.catalog();
    catalog.on_sort("product_name", SortDirection::Desc);

    catalog.load().await.expect("reload");

    assert_eq!(catalog.visible_rows()[0].product_name, "Product 12");
    assert_eq!(
        catalog.sort_spec().map(|spec| spec.direction),
        Some(SortDirection::Desc)
    );
}

#[tokio::test]
async fn disallowed_page_size_is_rejected() {
    let harness = Harness::draft_with_lines(&[]).await;
    let catalog = harness.page.catalog();

    let err = catalog.on_page_size_change(7).expect_err("not an option");

    assert_eq!(
        err,
        SyncError::Policy(PolicyViolation::PageSizeNotAllowed { size: 7 })
    );
    assert_eq!(catalog.pagination_state().page_size.get(), 5);
    assert_eq!(catalog.page_size_options(), &[5, 10, 20, 50]);
    assert_eq!(harness.notifier.errors().len(), 1);
}

#[tokio::test]
async fn catalog_load_failure_is_reported_once() {
    let backend = sample_backend(&order(), OrderStatus::Draft);
    backend.fail(BackendOp::FetchAvailable);

    let harness = Harness::open(backend).await;

    assert!(matches!(
        harness.report.catalog,
        Some(SyncError::Fetch { .. })
    ));
    assert!(harness.report.order_lines.is_none());
    assert_eq!(
        harness.notifier.errors(),
        vec!["Failed to load available products"]
    );
    assert!(harness.page.catalog().visible_rows().is_empty());
}

#[tokio::test]
async fn status_failure_still_loads_lines() {
    let backend = sample_backend(&order(), OrderStatus::Draft);
    backend
        .add_line(&order(), &entry("01u04"))
        .await
        .expect("seed line");
    backend.fail(BackendOp::FetchStatus);

    let harness = Harness::open(backend).await;

    let err = harness.report.order_lines.as_ref().expect("status read fails");
    assert!(matches!(err, SyncError::StatusFetch { .. }));
    assert!(err.to_string().starts_with("failed to load status of order 801"));
    assert!(err.is_remote());
    assert!(harness.report.catalog.is_none());
    assert_eq!(harness.line_count(), 1);
    assert_eq!(harness.notifier.errors(), vec!["Failed to load order status"]);
}

#[tokio::test]
async fn task_in_flight_covers_the_remote_call() {
    let harness = Harness::draft_with_lines(&[]).await;
    let catalog = Arc::clone(harness.page.catalog());
    let probe = Arc::clone(&catalog);

    catalog
        .core()
        .mutate(
            |dataset| dataset.clone(),
            async move {
                assert!(probe.task_in_flight());
                Ok::<(), anyhow::Error>(())
            },
            ChangeEnvelope::line_added(order(), entry("01u01")),
            ActionMessages {
                success: "done",
                failure: "failed",
            },
        )
        .await
        .expect("mutation");

    assert!(!catalog.task_in_flight());
    assert_eq!(harness.notifier.successes(), vec!["done"]);
}

#[tokio::test]
async fn dropped_controllers_leave_the_bus() {
    let harness = Harness::draft_with_lines(&[]).await;
    let bus = Arc::clone(harness.page.bus());
    assert_eq!(bus.subscriber_count(), 2);

    drop(harness);

    assert_eq!(bus.subscriber_count(), 0);
}

#[tokio::test]
async fn unwired_collaborators_fail_every_load() {
    let notifier = Arc::new(RecordingNotifier::default());
    let services = PageServices {
        catalog_query: Arc::new(MissingCatalogQuery),
        line_query: Arc::new(MissingOrderLineQuery),
        mutations: Arc::new(MissingOrderMutations),
        notifier: notifier.clone(),
    };

    let (page, report) = OrderPage::open(order(), services, ViewSettings::default()).await;

    let catalog_err = report.catalog.expect("catalog load fails");
    assert!(catalog_err.to_string().contains("unavailable"));
    assert!(report.order_lines.is_some());
    assert_eq!(
        notifier.errors(),
        vec![
            "Failed to load order status",
            "Failed to load order products",
            "Failed to load available products"
        ]
    );
    assert_eq!(page.catalog().gate_state(), GateState::Editable);
}
