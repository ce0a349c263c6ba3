//! One-shot query and mutation lifecycle.
//!
//! The UI-framework hook becomes an explicit handle: callers re-invoke
//! [`QueryHandle::run`] whenever an input changes, and observe state
//! through a watch channel. Each invocation cancels the previous in-flight
//! fetch for the handle; a superseded fetch that completes late never
//! overwrites newer state.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::cancel::AbortHandle;
use crate::error::{RequestError, Result};

/// Where a request is in its lifecycle, mirroring what consumers render.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NetworkStatus {
    /// Never called.
    #[default]
    Idle,
    /// First fetch in flight.
    Loading,
    /// Explicit refetch in flight (existing data stays shown).
    Refetch,
    /// Poll tick in flight (existing data stays shown).
    Poll,
    /// Last fetch succeeded.
    Ready,
    /// Last fetch failed.
    Error,
}

/// Snapshot of one query's state.
#[derive(Debug, Clone)]
pub struct QueryState<T> {
    pub data: Option<T>,
    pub error: Option<Arc<RequestError>>,
    pub loading: bool,
    pub called: bool,
    pub network_status: NetworkStatus,
}

impl<T> Default for QueryState<T> {
    fn default() -> Self {
        Self {
            data: None,
            error: None,
            loading: false,
            called: false,
            network_status: NetworkStatus::Idle,
        }
    }
}

struct Flight {
    abort: AbortHandle,
    generation: u64,
}

struct Inner<T> {
    state: watch::Sender<QueryState<T>>,
    flight: Mutex<Option<Flight>>,
    generation: Mutex<u64>,
    poll_task: Mutex<Option<JoinHandle<()>>>,
}

/// Handle to one logical query.
///
/// Cloning shares the same state and supersede discipline.
pub struct QueryHandle<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for QueryHandle<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T> std::fmt::Debug for QueryHandle<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryHandle").finish()
    }
}

impl<T> Default for QueryHandle<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T> QueryHandle<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        let (state, _) = watch::channel(QueryState::default());
        Self {
            inner: Arc::new(Inner {
                state,
                flight: Mutex::new(None),
                generation: Mutex::new(0),
                poll_task: Mutex::new(None),
            }),
        }
    }

    /// Observe state changes.
    pub fn subscribe(&self) -> watch::Receiver<QueryState<T>> {
        self.inner.state.subscribe()
    }

    pub fn state(&self) -> QueryState<T> {
        self.inner.state.borrow().clone()
    }

    /// Start a fetch, cancelling any in-flight one for this handle. The
    /// first call counts as the initial load; later calls keep existing
    /// data visible while refetching.
    pub fn run<F, Fut>(&self, fetch: F) -> AbortHandle
    where
        F: FnOnce(AbortHandle) -> Fut,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        let status = if self.inner.state.borrow().called {
            NetworkStatus::Refetch
        } else {
            NetworkStatus::Loading
        };
        self.start(status, fetch)
    }

    /// Re-run, always treated as a refetch (never the initial load).
    pub fn refetch<F, Fut>(&self, fetch: F) -> AbortHandle
    where
        F: FnOnce(AbortHandle) -> Fut,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        self.start(NetworkStatus::Refetch, fetch)
    }

    /// Cancel the in-flight fetch, if any.
    pub fn abort_request(&self, reason: impl Into<String>) {
        if let Some(flight) = self.inner.flight.lock().as_ref() {
            flight.abort.abort(reason);
        }
    }

    /// Re-trigger the fetch on a fixed interval without resetting to the
    /// initial loading state. Runs until [`stop_polling`](Self::stop_polling).
    pub fn start_polling<F, Fut>(&self, interval: Duration, fetch: F)
    where
        F: Fn(AbortHandle) -> Fut + Send + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        self.stop_polling();
        let handle = self.clone();
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(
                tokio::time::MissedTickBehavior::Delay,
            );
            // The first tick fires immediately; skip it so polling starts
            // one interval after the initial fetch.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                handle.start(NetworkStatus::Poll, &fetch);
            }
        });
        *self.inner.poll_task.lock() = Some(task);
    }

    pub fn stop_polling(&self) {
        if let Some(task) = self.inner.poll_task.lock().take() {
            task.abort();
        }
    }

    fn start<F, Fut>(&self, status: NetworkStatus, fetch: F) -> AbortHandle
    where
        F: FnOnce(AbortHandle) -> Fut,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        let abort = AbortHandle::new();
        let generation = {
            let mut flight = self.inner.flight.lock();
            if let Some(previous) = flight.take() {
                previous.abort.abort("superseded by newer request");
            }
            let mut generation = self.inner.generation.lock();
            *generation += 1;
            *flight = Some(Flight {
                abort: abort.clone(),
                generation: *generation,
            });
            *generation
        };

        self.inner.state.send_modify(|state| {
            state.called = true;
            state.loading = true;
            state.network_status = status;
            if status == NetworkStatus::Loading {
                state.data = None;
                state.error = None;
            }
        });

        let future = fetch(abort.clone());
        let inner = self.inner.clone();
        let task_abort = abort.clone();
        tokio::spawn(async move {
            let result = future.await;
            inner.commit(generation, &task_abort, result);
        });
        abort
    }
}

impl<T> Inner<T> {
    /// Commit a fetch result unless it was superseded or aborted.
    fn commit(
        &self,
        generation: u64,
        abort: &AbortHandle,
        result: Result<T>,
    ) {
        {
            let mut flight = self.flight.lock();
            let current = flight.as_ref().map(|f| f.generation);
            if current != Some(generation) {
                debug!(generation, "discarding superseded fetch result");
                return;
            }
            if abort.is_aborted() {
                // The consumer asked to stop caring; not an error.
                debug!(generation, "discarding aborted fetch result");
                *flight = None;
                return;
            }
            *flight = None;
        }

        self.state.send_modify(|state| {
            state.loading = false;
            match result {
                Ok(data) => {
                    state.data = Some(data);
                    state.error = None;
                    state.network_status = NetworkStatus::Ready;
                }
                Err(err) if err.is_cancelled() => {
                    // Raced with its own cancellation; keep prior state.
                    state.network_status = if state.data.is_some() {
                        NetworkStatus::Ready
                    } else {
                        NetworkStatus::Idle
                    };
                }
                Err(err) => {
                    state.error = Some(Arc::new(err));
                    state.network_status = NetworkStatus::Error;
                }
            }
        });
    }
}

/// Handle to one logical mutation.
pub struct MutationHandle<T> {
    query: QueryHandle<T>,
}

impl<T> Clone for MutationHandle<T> {
    fn clone(&self) -> Self {
        Self {
            query: self.query.clone(),
        }
    }
}

impl<T> std::fmt::Debug for MutationHandle<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MutationHandle").finish()
    }
}

impl<T> Default for MutationHandle<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T> MutationHandle<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self {
            query: QueryHandle::new(),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<QueryState<T>> {
        self.query.subscribe()
    }

    pub fn state(&self) -> QueryState<T> {
        self.query.state()
    }

    /// Execute the mutation, cancelling any prior in-flight one from this
    /// handle. Resolves to the data or the normalized error.
    pub async fn mutate<F, Fut>(&self, mutate: F) -> Result<T>
    where
        F: FnOnce(AbortHandle) -> Fut,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        let abort = self.query.run(mutate);
        let mut updates = self.query.subscribe();
        loop {
            let state = updates.borrow_and_update().clone();
            if abort.is_aborted() {
                return Err(RequestError::cancelled(
                    abort.reason().unwrap_or_else(|| "superseded".into()),
                ));
            }
            if state.called && !state.loading {
                if let Some(err) = state.error {
                    return Err(RequestError::other(err.to_string()));
                }
                if let Some(data) = state.data {
                    return Ok(data);
                }
            }
            updates
                .changed()
                .await
                .map_err(|_| RequestError::cancelled("handle dropped"))?;
        }
    }

    /// Clear all state back to the uncalled baseline.
    pub fn reset(&self) {
        self.query.abort_request("reset");
        self.query.inner.state.send_modify(|state| {
            *state = QueryState::default();
        });
    }
}
