//! Per-source bounded-concurrency queue for image work.
//!
//! A single upstream source hit with many parallel requests throttles
//! server-side and slows down unrelated sources sharing the client, so
//! every queued job is keyed by source and admitted by a per-source
//! semaphore. Queued jobs carry a priority; admission picks the highest
//! priority first, FIFO within a priority.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::sync::oneshot;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinHandle;
use tracing::debug;

use crate::cancel::AbortHandle;
use crate::error::{RequestError, Result};

/// Admission priority for queued work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum Priority {
    Low,
    #[default]
    Normal,
    High,
}

struct Pending {
    priority: Priority,
    seq: u64,
    key: String,
    admit: oneshot::Sender<OwnedSemaphorePermit>,
}

#[derive(Default)]
struct SourceState {
    pending: Mutex<Vec<Pending>>,
    processing: Mutex<std::collections::HashSet<String>>,
}

impl SourceState {
    /// Admit queued jobs while permits are available. Jobs whose receiver
    /// is gone (aborted before start) are discarded without side effects.
    fn pump(self: &Arc<Self>, semaphore: &Arc<Semaphore>) {
        loop {
            let Ok(permit) = semaphore.clone().try_acquire_owned() else {
                return;
            };
            let job = {
                let mut queue = self.pending.lock();
                if queue.is_empty() {
                    return;
                }
                let best = queue
                    .iter()
                    .enumerate()
                    .max_by_key(|(_, p)| (p.priority, std::cmp::Reverse(p.seq)))
                    .map(|(i, _)| i);
                best.map(|i| queue.remove(i))
            };
            match job {
                Some(job) => {
                    if job.admit.send(permit).is_err() {
                        debug!(key = %job.key, "queued job gone before admission");
                    }
                }
                None => return,
            }
        }
    }
}

/// Handle to one queued job.
#[derive(Debug)]
pub struct QueuedWork<T> {
    pub key: String,
    /// Resolves to the job's result once the limiter has admitted and run it.
    pub handle: JoinHandle<Result<T>>,
}

/// The per-source queue. One instance gates all image fetches of an engine.
pub struct SourceQueue {
    limit: usize,
    seq: AtomicU64,
    semaphores: DashMap<String, Arc<Semaphore>>,
    states: DashMap<String, Arc<SourceState>>,
}

impl std::fmt::Debug for SourceQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceQueue")
            .field("limit", &self.limit)
            .field("sources", &self.states.len())
            .finish()
    }
}

impl SourceQueue {
    /// `limit` is the per-source concurrency bound. Multiplexed transports
    /// get a much larger budget than plain HTTP/1.x (see
    /// [`ClientConfig::image_concurrency`](crate::config::ClientConfig::image_concurrency)).
    pub fn new(limit: usize) -> Self {
        Self {
            limit: limit.max(1),
            seq: AtomicU64::new(0),
            semaphores: DashMap::new(),
            states: DashMap::new(),
        }
    }

    fn source_state(
        &self,
        source: &str,
    ) -> (Arc<Semaphore>, Arc<SourceState>) {
        let semaphore = self
            .semaphores
            .entry(source.to_string())
            .or_insert_with(|| Arc::new(Semaphore::new(self.limit)))
            .clone();
        let state = self
            .states
            .entry(source.to_string())
            .or_default()
            .clone();
        (semaphore, state)
    }

    /// Queue `work` under `source`. The job starts when the limiter admits
    /// it; aborting before admission removes it from the queue without side
    /// effects.
    pub fn enqueue<T, F, Fut>(
        &self,
        source: &str,
        key: &str,
        priority: Priority,
        abort: AbortHandle,
        work: F,
    ) -> QueuedWork<T>
    where
        T: Send + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: std::future::Future<Output = Result<T>> + Send,
    {
        let (semaphore, state) = self.source_state(source);
        let (admit_tx, admit_rx) = oneshot::channel();
        state.pending.lock().push(Pending {
            priority,
            seq: self.seq.fetch_add(1, Ordering::Relaxed),
            key: key.to_string(),
            admit: admit_tx,
        });
        state.pump(&semaphore);

        let key_owned = key.to_string();
        let task_key = key_owned.clone();
        let handle = tokio::spawn(async move {
            let mut admit_rx = admit_rx;
            let permit = tokio::select! {
                _ = abort.aborted() => {
                    // A permit may already be parked in the channel;
                    // dropping the receiver releases it, and the queue must
                    // be pumped or the source wedges.
                    drop(admit_rx);
                    state.pump(&semaphore);
                    return Err(RequestError::cancelled(
                        abort
                            .reason()
                            .unwrap_or_else(|| "dequeued".into()),
                    ));
                }
                permit = &mut admit_rx => match permit {
                    Ok(permit) => permit,
                    Err(_) => {
                        state.pump(&semaphore);
                        return Err(RequestError::cancelled("queue cleared"));
                    }
                },
            };

            state.processing.lock().insert(task_key.clone());
            let result = work().await;
            state.processing.lock().remove(&task_key);
            drop(permit);
            state.pump(&semaphore);
            result
        });

        QueuedWork {
            key: key_owned,
            handle,
        }
    }

    /// Whether the limiter has already started executing this key. Aborts
    /// for in-progress work are ignored so the server's effort isn't wasted
    /// on a request that would immediately be retried.
    pub fn is_processing(&self, source: &str, key: &str) -> bool {
        self.states
            .get(source)
            .map(|s| s.processing.lock().contains(key))
            .unwrap_or(false)
    }

    /// Drop all queued (unstarted) jobs across every source.
    pub fn clear(&self) {
        for state in self.states.iter() {
            state.pending.lock().clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    fn spin(
        queue: &SourceQueue,
        source: &str,
        key: &str,
        priority: Priority,
        running: Arc<AtomicUsize>,
        peak: Arc<AtomicUsize>,
        order: Arc<Mutex<Vec<String>>>,
    ) -> QueuedWork<()> {
        let key_owned = key.to_string();
        queue.enqueue(source, key, priority, AbortHandle::new(), move || {
            async move {
                order.lock().push(key_owned);
                let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(10)).await;
                running.fetch_sub(1, Ordering::SeqCst);
                Ok(())
            }
        })
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn bound_is_never_exceeded_per_source() {
        let queue = SourceQueue::new(2);
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let order = Arc::new(Mutex::new(Vec::new()));

        let jobs: Vec<_> = (0..8)
            .map(|i| {
                spin(
                    &queue,
                    "s1",
                    &format!("img{i}"),
                    Priority::Normal,
                    running.clone(),
                    peak.clone(),
                    order.clone(),
                )
            })
            .collect();
        for job in jobs {
            job.handle.await.unwrap().unwrap();
        }
        assert!(peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn high_priority_jumps_the_queue() {
        let queue = SourceQueue::new(1);
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let order = Arc::new(Mutex::new(Vec::new()));

        // First job occupies the only permit; the rest queue up.
        let first = spin(
            &queue,
            "s1",
            "first",
            Priority::Normal,
            running.clone(),
            peak.clone(),
            order.clone(),
        );
        let low = spin(
            &queue,
            "s1",
            "low",
            Priority::Low,
            running.clone(),
            peak.clone(),
            order.clone(),
        );
        let high = spin(
            &queue,
            "s1",
            "high",
            Priority::High,
            running.clone(),
            peak.clone(),
            order.clone(),
        );

        first.handle.await.unwrap().unwrap();
        high.handle.await.unwrap().unwrap();
        low.handle.await.unwrap().unwrap();

        let order = order.lock().clone();
        assert_eq!(order, vec!["first", "high", "low"]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn abort_before_admission_dequeues() {
        let queue = SourceQueue::new(1);

        let (block_tx, block_rx) = oneshot::channel::<()>();
        let blocker = queue.enqueue(
            "s1",
            "blocker",
            Priority::Normal,
            AbortHandle::new(),
            move || async move {
                let _ = block_rx.await;
                Ok(())
            },
        );

        let abort = AbortHandle::new();
        let queued = queue.enqueue(
            "s1",
            "queued",
            Priority::Normal,
            abort.clone(),
            || async { Ok(()) },
        );
        abort.abort("unmounted");

        let err = queued.handle.await.unwrap().unwrap_err();
        assert!(err.is_cancelled());
        assert!(!queue.is_processing("s1", "queued"));

        block_tx.send(()).unwrap();
        blocker.handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn abort_racing_admission_does_not_wedge_the_source() {
        let queue = SourceQueue::new(1);

        // The first job is admitted synchronously (its permit is parked in
        // the admission channel) but is aborted before its task runs.
        let abort = AbortHandle::new();
        let first = queue.enqueue(
            "s1",
            "first",
            Priority::Normal,
            abort.clone(),
            || async { Ok(()) },
        );
        abort.abort("unmounted");

        // The released permit must be re-pumped to later jobs.
        let second = queue.enqueue(
            "s1",
            "second",
            Priority::Normal,
            AbortHandle::new(),
            || async { Ok(()) },
        );
        tokio::time::timeout(Duration::from_secs(2), second.handle)
            .await
            .expect("second job was admitted")
            .unwrap()
            .unwrap();
        let _ = first.handle.await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn sources_do_not_share_a_bound() {
        let queue = SourceQueue::new(1);
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let order = Arc::new(Mutex::new(Vec::new()));

        let a = spin(
            &queue,
            "s1",
            "a",
            Priority::Normal,
            running.clone(),
            peak.clone(),
            order.clone(),
        );
        let b = spin(
            &queue,
            "s2",
            "b",
            Priority::Normal,
            running.clone(),
            peak.clone(),
            order.clone(),
        );
        a.handle.await.unwrap().unwrap();
        b.handle.await.unwrap().unwrap();
        // Two sources can overlap even with a per-source limit of 1.
        assert!(peak.load(Ordering::SeqCst) <= 2);
    }
}
