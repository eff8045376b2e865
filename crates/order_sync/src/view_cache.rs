//! Last authoritative dataset for one view, with coalesced reloads.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use async_trait::async_trait;
use futures::{
    future::{BoxFuture, Shared},
    FutureExt,
};
use tracing::{debug, warn};

use crate::{
    error::SyncError,
    observer::{Observers, SubscriptionToken},
    row::{Dataset, Row},
    ViewKind,
};

/// Server-of-record query backing one view.
#[async_trait]
pub trait DatasetSource<R>: Send + Sync {
    async fn fetch(&self) -> anyhow::Result<Vec<R>>;
}

pub type LoadResult<R> = Result<Dataset<R>, SyncError>;

/// A load that may be awaited by any number of callers; all of them observe
/// the same outcome.
pub type PendingLoad<R> = Shared<BoxFuture<'static, LoadResult<R>>>;

#[derive(Debug, Clone)]
pub enum CacheEvent<R> {
    /// A fetch replaced the dataset.
    Loaded(Dataset<R>),
    /// A local edit or rollback replaced the dataset.
    Edited(Dataset<R>),
    /// A fetch failed; the previous dataset is still current.
    LoadFailed(SyncError),
}

struct CacheState<R> {
    dataset: Dataset<R>,
    in_flight: Option<PendingLoad<R>>,
    fetches: u64,
}

struct CacheInner<R> {
    view: ViewKind,
    source: Arc<dyn DatasetSource<R>>,
    state: Mutex<CacheState<R>>,
    observers: Observers<CacheEvent<R>>,
}

impl<R: Row> CacheInner<R> {
    fn lock(&self) -> MutexGuard<'_, CacheState<R>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn run_fetch(self: Arc<Self>) -> LoadResult<R> {
        debug!(view = %self.view, "fetching dataset");
        let fetched = self.source.fetch().await;

        let (result, event) = {
            let mut state = self.lock();
            state.in_flight = None;
            match fetched {
                Ok(rows) => {
                    state.fetches += 1;
                    state.dataset = Dataset::new(rows);
                    let dataset = state.dataset.clone();
                    (Ok(dataset.clone()), CacheEvent::Loaded(dataset))
                }
                Err(err) => {
                    let err = SyncError::fetch(self.view, &err);
                    warn!(view = %self.view, error = %err, "fetch failed; keeping last dataset");
                    (Err(err.clone()), CacheEvent::LoadFailed(err))
                }
            }
        };
        self.observers.notify(&event);
        result
    }
}

/// Cheap to clone; clones share the same dataset and in-flight load.
pub struct ViewCache<R> {
    inner: Arc<CacheInner<R>>,
}

impl<R> Clone for ViewCache<R> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

/// Non-owning handle, for listeners that must not keep the cache alive.
pub struct WeakViewCache<R> {
    inner: Weak<CacheInner<R>>,
}

impl<R> WeakViewCache<R> {
    pub fn upgrade(&self) -> Option<ViewCache<R>> {
        self.inner.upgrade().map(|inner| ViewCache { inner })
    }
}

impl<R: Row> ViewCache<R> {
    pub fn downgrade(&self) -> WeakViewCache<R> {
        WeakViewCache {
            inner: Arc::downgrade(&self.inner),
        }
    }

    pub fn new(view: ViewKind, source: Arc<dyn DatasetSource<R>>) -> Self {
        Self {
            inner: Arc::new(CacheInner {
                view,
                source,
                state: Mutex::new(CacheState {
                    dataset: Dataset::empty(),
                    in_flight: None,
                    fetches: 0,
                }),
                observers: Observers::new(),
            }),
        }
    }

    pub fn view(&self) -> ViewKind {
        self.inner.view
    }

    pub fn subscribe(
        &self,
        listener: impl Fn(&CacheEvent<R>) + Send + Sync + 'static,
    ) -> SubscriptionToken {
        self.inner.observers.subscribe(listener)
    }

    pub fn unsubscribe(&self, token: SubscriptionToken) -> bool {
        self.inner.observers.unsubscribe(token)
    }

    /// Starts a fetch, or joins the one already outstanding.
    ///
    /// The returned future does nothing until polled; see [`Self::spawn_refresh`]
    /// for callers that cannot await.
    pub fn begin_load(&self) -> PendingLoad<R> {
        let mut state = self.inner.lock();
        if let Some(in_flight) = &state.in_flight {
            debug!(view = %self.inner.view, "joining in-flight fetch");
            return in_flight.clone();
        }
        let pending = Arc::clone(&self.inner).run_fetch().boxed().shared();
        state.in_flight = Some(pending.clone());
        pending
    }

    pub async fn load(&self) -> LoadResult<R> {
        self.begin_load().await
    }

    /// Reconciles with the server after a mutation. Same coalescing as `load`.
    pub async fn force_refresh(&self) -> LoadResult<R> {
        debug!(view = %self.inner.view, "forced refresh");
        self.begin_load().await
    }

    /// Starts a refresh on the ambient tokio runtime without waiting for it.
    pub fn spawn_refresh(&self) -> PendingLoad<R> {
        let pending = self.begin_load();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(pending.clone());
            }
            Err(_) => {
                warn!(
                    view = %self.inner.view,
                    "no async runtime; refresh will run when next awaited"
                );
            }
        }
        pending
    }

    /// Waits for the outstanding fetch, if there is one.
    pub async fn settled(&self) {
        let in_flight = self.inner.lock().in_flight.clone();
        if let Some(pending) = in_flight {
            let _ = pending.await;
        }
    }

    pub fn current(&self) -> Dataset<R> {
        self.inner.lock().dataset.clone()
    }

    pub fn is_loading(&self) -> bool {
        self.inner.lock().in_flight.is_some()
    }

    /// Number of fetches that replaced the dataset.
    pub fn fetch_count(&self) -> u64 {
        self.inner.lock().fetches
    }

    /// Replaces the dataset with `edit(current)` and returns the dataset it replaced.
    pub fn edit(&self, edit: impl FnOnce(&Dataset<R>) -> Dataset<R>) -> Dataset<R> {
        let (previous, event) = {
            let mut state = self.inner.lock();
            let next = edit(&state.dataset);
            let previous = std::mem::replace(&mut state.dataset, next);
            (previous, CacheEvent::Edited(state.dataset.clone()))
        };
        self.inner.observers.notify(&event);
        previous
    }

    pub fn restore(&self, snapshot: Dataset<R>) {
        self.edit(|_| snapshot);
    }
}

#[cfg(test)]
#[path = "tests/view_cache_tests.rs"]
mod tests;
