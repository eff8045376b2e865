//! Bounded visible window over an ordered dataset.

use std::{
    num::NonZeroUsize,
    sync::{Mutex, PoisonError},
};

use serde::Serialize;

use crate::{
    observer::{Observers, SubscriptionToken},
    row::Dataset,
};

pub const DEFAULT_PAGE_SIZE: NonZeroUsize = match NonZeroUsize::new(5) {
    Some(size) => size,
    None => unreachable!(),
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PaginationState {
    pub current_page: usize,
    pub page_size: NonZeroUsize,
    pub total_count: usize,
}

impl PaginationState {
    pub fn new(page_size: NonZeroUsize) -> Self {
        Self {
            current_page: 1,
            page_size,
            total_count: 0,
        }
    }

    pub fn total_pages(&self) -> usize {
        self.total_count.div_ceil(self.page_size.get())
    }

    pub fn can_previous(&self) -> bool {
        self.current_page > 1
    }

    pub fn can_next(&self) -> bool {
        self.current_page < self.total_pages()
    }

    fn clamp_current_page(&mut self) {
        let last = self.total_pages().max(1);
        self.current_page = self.current_page.clamp(1, last);
    }
}

/// Slice of `rows` visible under `state`. Out-of-range pages yield an empty window.
pub fn window_of<R: Clone>(rows: &[R], state: &PaginationState) -> Dataset<R> {
    let size = state.page_size.get();
    let start = state.current_page.saturating_sub(1).saturating_mul(size);
    if start >= rows.len() {
        return Dataset::empty();
    }
    let end = start.saturating_add(size).min(rows.len());
    Dataset::new(rows[start..end].to_vec())
}

/// Emitted synchronously after every state-affecting call.
#[derive(Debug, Clone)]
pub struct WindowChanged<R> {
    pub state: PaginationState,
    pub rows: Dataset<R>,
}

struct PaginationInner<R> {
    state: PaginationState,
    dataset: Dataset<R>,
}

pub struct PaginationViewModel<R> {
    inner: Mutex<PaginationInner<R>>,
    observers: Observers<WindowChanged<R>>,
}

impl<R: Clone> PaginationViewModel<R> {
    pub fn new(page_size: NonZeroUsize) -> Self {
        Self {
            inner: Mutex::new(PaginationInner {
                state: PaginationState::new(page_size),
                dataset: Dataset::empty(),
            }),
            observers: Observers::new(),
        }
    }

    pub fn subscribe(
        &self,
        listener: impl Fn(&WindowChanged<R>) + Send + Sync + 'static,
    ) -> SubscriptionToken {
        self.observers.subscribe(listener)
    }

    pub fn unsubscribe(&self, token: SubscriptionToken) -> bool {
        self.observers.unsubscribe(token)
    }

    /// Keeps the current page unless it now points past the last page.
    pub fn set_dataset(&self, dataset: Dataset<R>) {
        self.update(|inner| {
            inner.state.total_count = dataset.len();
            inner.dataset = dataset;
            inner.state.clamp_current_page();
        });
    }

    pub fn set_page_size(&self, page_size: NonZeroUsize) {
        self.update(|inner| {
            inner.state.page_size = page_size;
            inner.state.current_page = 1;
        });
    }

    /// No-op on the last page. Returns whether the page moved.
    pub fn next(&self) -> bool {
        self.update(|inner| {
            let moved = inner.state.can_next();
            if moved {
                inner.state.current_page += 1;
            }
            moved
        })
    }

    /// No-op on the first page. Returns whether the page moved.
    pub fn previous(&self) -> bool {
        self.update(|inner| {
            let moved = inner.state.can_previous();
            if moved {
                inner.state.current_page -= 1;
            }
            moved
        })
    }

    /// Jumps to `page`, clamped to the valid range.
    pub fn go_to(&self, page: usize) -> usize {
        self.update(|inner| {
            inner.state.current_page = page;
            inner.state.clamp_current_page();
            inner.state.current_page
        })
    }

    pub fn visible_window(&self) -> Dataset<R> {
        let inner = self.lock();
        window_of(&inner.dataset, &inner.state)
    }

    pub fn state(&self) -> PaginationState {
        self.lock().state
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, PaginationInner<R>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn update<T>(&self, mutate: impl FnOnce(&mut PaginationInner<R>) -> T) -> T {
        let (result, event) = {
            let mut inner = self.lock();
            let result = mutate(&mut inner);
            let event = WindowChanged {
                state: inner.state,
                rows: window_of(&inner.dataset, &inner.state),
            };
            (result, event)
        };
        self.observers.notify(&event);
        result
    }
}

#[cfg(test)]
#[path = "tests/pagination_tests.rs"]
mod tests;
