//! Per-screen composition of cache, pagination, sort, gate and bus.

pub mod catalog;
pub mod order_lines;

use std::{
    future::Future,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex, MutexGuard, PoisonError,
    },
};

use async_trait::async_trait;
use order_types::{domain::OrderId, protocol::ChangeEnvelope};
use tracing::{debug, trace};

use crate::{
    error::SyncError,
    gate::{GateState, GatedOperation, OrderLifecycleGate},
    notify::NotificationSink,
    observer::SubscriptionToken,
    optimistic::OptimisticMutator,
    pagination::{PaginationState, PaginationViewModel},
    row::{Dataset, Row},
    settings::ViewSettings,
    sort::{sort_by_spec, SortDirection, SortSpec},
    sync_bus::SyncBus,
    view_cache::{CacheEvent, DatasetSource, PendingLoad, ViewCache},
    OrderMutations, ViewKind,
};

/// A row that knows how to present itself once the order is locked.
pub trait GatedRow: Row {
    fn locked(&self) -> Self;
}

/// Collaborators shared by every controller on one order page.
#[derive(Clone)]
pub struct ControllerContext {
    pub bus: Arc<SyncBus>,
    pub mutations: Arc<dyn OrderMutations>,
    pub notifier: Arc<dyn NotificationSink>,
    pub settings: ViewSettings,
}

impl ControllerContext {
    pub fn order_id(&self) -> &OrderId {
        self.bus.order_id()
    }
}

/// What a controller did with an envelope from the bus.
pub enum ExternalEffect<R> {
    /// Another order, or a change this view does not track.
    Ignored,
    /// Applied as a targeted local edit.
    Patched,
    /// Flipped the gate to Locked.
    Locked,
    /// Started (or joined) a refresh of the view cache.
    Refresh(PendingLoad<R>),
}

impl<R> ExternalEffect<R> {
    pub fn is_ignored(&self) -> bool {
        matches!(self, ExternalEffect::Ignored)
    }

    /// Waits for a refresh started by this effect; other effects are already done.
    pub async fn settled(self)
    where
        R: Row,
    {
        if let ExternalEffect::Refresh(pending) = self {
            let _ = pending.await;
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

struct TaskGuard(Arc<AtomicUsize>);

impl TaskGuard {
    fn start(counter: &Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(Arc::clone(counter))
    }
}

impl Drop for TaskGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Toast texts for one kind of user action.
pub struct ActionMessages {
    pub success: &'static str,
    pub failure: &'static str,
}

/// State and plumbing common to both concrete controllers.
pub struct ViewCore<R: Row> {
    view: ViewKind,
    cache: ViewCache<R>,
    pagination: Arc<PaginationViewModel<R>>,
    sort: Arc<Mutex<Option<SortSpec>>>,
    visible: Arc<Mutex<Dataset<R>>>,
    gate: Arc<OrderLifecycleGate>,
    mutator: OptimisticMutator,
    mutations: Arc<dyn OrderMutations>,
    notifier: Arc<dyn NotificationSink>,
    settings: ViewSettings,
    tasks: Arc<AtomicUsize>,
    bus_token: Mutex<Option<SubscriptionToken>>,
}

impl<R: GatedRow> ViewCore<R> {
    pub fn new(
        view: ViewKind,
        context: &ControllerContext,
        gate: Arc<OrderLifecycleGate>,
        source: Arc<dyn DatasetSource<R>>,
    ) -> Self {
        let cache = ViewCache::new(view, source);
        let pagination = Arc::new(PaginationViewModel::new(context.settings.default_page_size));
        let sort: Arc<Mutex<Option<SortSpec>>> = Arc::new(Mutex::new(None));
        let visible = Arc::new(Mutex::new(Dataset::empty()));

        {
            let visible = Arc::clone(&visible);
            pagination.subscribe(move |window| *lock(&visible) = window.rows.clone());
        }
        {
            let pagination = Arc::clone(&pagination);
            let sort = Arc::clone(&sort);
            let notifier = Arc::clone(&context.notifier);
            cache.subscribe(move |event| match event {
                CacheEvent::Loaded(dataset) | CacheEvent::Edited(dataset) => {
                    let spec = lock(&sort).clone();
                    pagination.set_dataset(sort_by_spec(dataset, spec.as_ref()));
                }
                CacheEvent::LoadFailed(_) => notifier.error(view.load_failed_message()),
            });
        }
        {
            let cache = cache.downgrade();
            gate.subscribe(move |_| {
                if let Some(cache) = cache.upgrade() {
                    cache.edit(|dataset| dataset.map_rows(R::locked));
                }
            });
        }

        Self {
            view,
            cache,
            pagination,
            sort,
            visible,
            gate,
            mutator: OptimisticMutator::new(Arc::clone(&context.bus)),
            mutations: Arc::clone(&context.mutations),
            notifier: Arc::clone(&context.notifier),
            settings: context.settings.clone(),
            tasks: Arc::new(AtomicUsize::new(0)),
            bus_token: Mutex::new(None),
        }
    }

    pub fn view(&self) -> ViewKind {
        self.view
    }

    pub fn order_id(&self) -> &OrderId {
        self.gate.order_id()
    }

    pub fn cache(&self) -> &ViewCache<R> {
        &self.cache
    }

    pub fn gate(&self) -> &Arc<OrderLifecycleGate> {
        &self.gate
    }

    pub fn bus(&self) -> &Arc<SyncBus> {
        self.mutator.bus()
    }

    pub fn mutations(&self) -> &Arc<dyn OrderMutations> {
        &self.mutations
    }

    pub fn notifier(&self) -> &Arc<dyn NotificationSink> {
        &self.notifier
    }

    pub fn settings(&self) -> &ViewSettings {
        &self.settings
    }

    pub fn visible_rows(&self) -> Dataset<R> {
        lock(&self.visible).clone()
    }

    pub fn pagination_state(&self) -> PaginationState {
        self.pagination.state()
    }

    pub fn sort_spec(&self) -> Option<SortSpec> {
        lock(&self.sort).clone()
    }

    pub fn task_in_flight(&self) -> bool {
        self.tasks.load(Ordering::SeqCst) > 0 || self.cache.is_loading()
    }

    /// Envelopes for other orders fail the filter and are dropped silently.
    pub fn accepts(&self, envelope: &ChangeEnvelope) -> bool {
        let accepted = envelope.is_for(self.order_id());
        if !accepted {
            trace!(
                view = %self.view,
                order_id = %self.order_id(),
                envelope_order_id = %envelope.order_id,
                "ignoring envelope for another order"
            );
        }
        accepted
    }

    pub async fn load(&self) -> Result<(), SyncError> {
        let _task = TaskGuard::start(&self.tasks);
        self.cache.load().await.map(|_| ())
    }

    pub fn refresh_in_background(&self) -> PendingLoad<R> {
        self.cache.spawn_refresh()
    }

    pub fn sort_by(&self, field: &str, direction: SortDirection) {
        let spec = SortSpec::new(field, direction);
        debug!(view = %self.view, field, direction = direction.as_str(), "sorting");
        *lock(&self.sort) = Some(spec.clone());
        self.pagination
            .set_dataset(sort_by_spec(&self.cache.current(), Some(&spec)));
    }

    pub fn go_to_page(&self, page: usize) -> usize {
        self.pagination.go_to(page)
    }

    pub fn next_page(&self) -> bool {
        self.pagination.next()
    }

    pub fn previous_page(&self) -> bool {
        self.pagination.previous()
    }

    pub fn change_page_size(&self, size: usize) -> Result<(), SyncError> {
        match self.settings.validate_page_size(size) {
            Ok(size) => {
                self.pagination.set_page_size(size);
                Ok(())
            }
            Err(violation) => Err(self.surface_policy(violation.into())),
        }
    }

    /// Rejects locally, before any request is built, when the gate is locked.
    pub fn authorize(&self, operation: GatedOperation) -> Result<(), SyncError> {
        self.gate
            .check(operation)
            .map_err(|violation| self.surface_policy(violation.into()))
    }

    /// Runs one optimistic mutation and surfaces its outcome as a toast.
    pub async fn mutate<E, F>(
        &self,
        local_edit: E,
        remote_call: F,
        on_success: ChangeEnvelope,
        messages: ActionMessages,
    ) -> Result<(), SyncError>
    where
        E: FnOnce(&Dataset<R>) -> Dataset<R>,
        F: Future<Output = anyhow::Result<()>>,
    {
        let _task = TaskGuard::start(&self.tasks);
        match self
            .mutator
            .apply(&self.cache, local_edit, remote_call, on_success)
            .await
        {
            Ok(_) => {
                self.notifier.success(messages.success);
                Ok(())
            }
            Err(err) => {
                // The restored snapshot predates any lock taken mid-flight.
                if self.gate.is_locked() {
                    self.cache.edit(|dataset| dataset.map_rows(R::locked));
                }
                self.notifier.error(messages.failure);
                Err(err)
            }
        }
    }

    pub fn surface_policy(&self, err: SyncError) -> SyncError {
        debug!(view = %self.view, error = %err, "rejected by local policy");
        self.notifier.error(&err.to_string());
        err
    }

    pub(crate) fn set_bus_token(&self, token: SubscriptionToken) {
        if let Some(previous) = lock(&self.bus_token).replace(token) {
            self.bus().unsubscribe(previous);
        }
    }
}

impl<R: Row> Drop for ViewCore<R> {
    fn drop(&mut self) {
        if let Some(token) = lock(&self.bus_token).take() {
            self.mutator.bus().unsubscribe(token);
        }
    }
}

/// Operations the presentation layer drives, plus the projections it polls
/// after every notification.
#[async_trait]
pub trait ViewController: Send + Sync {
    type Row: GatedRow;
    type Action: Send + Sync;

    fn core(&self) -> &ViewCore<Self::Row>;

    async fn load(&self) -> Result<(), SyncError>;

    async fn on_row_action(&self, action: Self::Action, row: &Self::Row) -> Result<(), SyncError>;

    fn on_external_change(&self, envelope: &ChangeEnvelope) -> ExternalEffect<Self::Row>;

    fn view(&self) -> ViewKind {
        self.core().view()
    }

    fn on_sort(&self, field: &str, direction: SortDirection) {
        self.core().sort_by(field, direction);
    }

    fn on_page_change(&self, page: usize) -> usize {
        self.core().go_to_page(page)
    }

    fn on_next_page(&self) -> bool {
        self.core().next_page()
    }

    fn on_previous_page(&self) -> bool {
        self.core().previous_page()
    }

    fn on_page_size_change(&self, size: usize) -> Result<(), SyncError> {
        self.core().change_page_size(size)
    }

    fn visible_rows(&self) -> Dataset<Self::Row> {
        self.core().visible_rows()
    }

    fn gate_state(&self) -> GateState {
        self.core().gate().state()
    }

    fn pagination_state(&self) -> PaginationState {
        self.core().pagination_state()
    }

    fn page_size_options(&self) -> &[usize] {
        &self.core().settings().page_size_options
    }

    fn sort_spec(&self) -> Option<SortSpec> {
        self.core().sort_spec()
    }

    fn task_in_flight(&self) -> bool {
        self.core().task_in_flight()
    }
}

/// Routes bus envelopes to `controller` for as long as it is alive.
pub fn attach_to_bus<C>(controller: &Arc<C>)
where
    C: ViewController + 'static,
{
    let weak = Arc::downgrade(controller);
    let token = controller.core().bus().subscribe(move |envelope| {
        if let Some(controller) = weak.upgrade() {
            controller.on_external_change(envelope);
        }
    });
    controller.core().set_bus_token(token);
}

#[cfg(test)]
#[path = "../tests/controller_tests.rs"]
mod tests;
