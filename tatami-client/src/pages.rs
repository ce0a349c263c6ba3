//! Incremental pagination with cache revalidation.
//!
//! Serves "infinite scroll" listings page by page while keeping cached
//! pages consistent with the upstream source: stale-while-revalidate with
//! cascading invalidation. A content change detected early in the range
//! stops the engine trusting any page after it, while an unchanged (or
//! fresh enough) first page short-circuits the whole pass.

use std::collections::BTreeSet;
use std::marker::PhantomData;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;
use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use parking_lot::Mutex;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::cache::{CachedResponse, ResponseCache};
use crate::cancel::AbortHandle;
use crate::config::ClientConfig;
use crate::error::{RequestError, Result};
use tatami_model::{EntityKey, PagedResponse, RequestKey};

/// Fetches one page of a paginated listing from the network.
#[async_trait]
pub trait PageFetcher<T>: Send + Sync {
    async fn fetch_page(
        &self,
        page: u32,
        abort: &AbortHandle,
    ) -> Result<PagedResponse<T>>;
}

/// One page as presented to consumers, with enough flags to distinguish
/// "first load" from "appending a page" from "revalidating in the
/// background".
#[derive(Debug, Clone)]
pub struct PageResult<T> {
    pub page: u32,
    pub data: Option<PagedResponse<T>>,
    pub error: Option<String>,
    /// True only while no data yet exists for this page.
    pub is_loading: bool,
    /// True while a page beyond the first is being appended.
    pub is_loading_more: bool,
    /// True while a background revalidation is overwriting this page.
    pub is_validating: bool,
}

#[derive(Default)]
struct KeyState {
    pages: Mutex<BTreeSet<u32>>,
    initial_fetching: AtomicBool,
    revalidated: AtomicBool,
}

impl KeyState {
    fn highest(&self) -> Option<u32> {
        self.pages.lock().iter().next_back().copied()
    }
}

struct ActiveRevalidation {
    id: u64,
    key: String,
    abort: AbortHandle,
    done: Shared<BoxFuture<'static, ()>>,
}

type ActiveSlot = Arc<Mutex<Option<ActiveRevalidation>>>;

/// Shared pagination state for one entity type: page sets per base key and
/// the single-flight revalidation slot.
pub struct PagedEngine<T> {
    cache: Arc<ResponseCache>,
    config: Arc<ClientConfig>,
    states: DashMap<String, Arc<KeyState>>,
    active: ActiveSlot,
    revalidation_seq: AtomicU64,
    _marker: PhantomData<fn() -> T>,
}

impl<T> std::fmt::Debug for PagedEngine<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PagedEngine")
            .field("keys", &self.states.len())
            .finish()
    }
}

impl<T> PagedEngine<T>
where
    T: Serialize
        + DeserializeOwned
        + EntityKey
        + Clone
        + Send
        + Sync
        + 'static,
{
    pub fn new(cache: Arc<ResponseCache>, config: Arc<ClientConfig>) -> Self {
        Self {
            cache,
            config,
            states: DashMap::new(),
            active: Arc::new(Mutex::new(None)),
            revalidation_seq: AtomicU64::new(0),
            _marker: PhantomData,
        }
    }

    pub fn cache(&self) -> &Arc<ResponseCache> {
        &self.cache
    }

    fn key_state(&self, base: &str) -> Arc<KeyState> {
        self.states.entry(base.to_string()).or_default().clone()
    }

    /// Bind a query for one (operation, variables, source) triple.
    pub fn query(
        self: &Arc<Self>,
        op: impl Into<String>,
        variables: serde_json::Value,
        source: impl Into<String>,
        fetcher: Arc<dyn PageFetcher<T>>,
    ) -> PagedQuery<T> {
        PagedQuery {
            engine: self.clone(),
            key: RequestKey::new(op, variables).base(),
            source: source.into(),
            fetcher,
        }
    }
}

/// A bound paginated query. Cheap to clone; all state lives in the engine
/// and the shared response cache.
pub struct PagedQuery<T> {
    engine: Arc<PagedEngine<T>>,
    /// Base key: operation plus variables with the page field stripped.
    key: RequestKey,
    source: String,
    fetcher: Arc<dyn PageFetcher<T>>,
}

impl<T> Clone for PagedQuery<T> {
    fn clone(&self) -> Self {
        Self {
            engine: self.engine.clone(),
            key: self.key.clone(),
            source: self.source.clone(),
            fetcher: self.fetcher.clone(),
        }
    }
}

impl<T> std::fmt::Debug for PagedQuery<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PagedQuery")
            .field("key", &self.key.canonical())
            .field("source", &self.source)
            .finish()
    }
}

impl<T> PagedQuery<T>
where
    T: Serialize
        + DeserializeOwned
        + EntityKey
        + Clone
        + Send
        + Sync
        + 'static,
{
    fn base(&self) -> String {
        self.key.canonical()
    }

    fn page_vars(&self, page: u32) -> serde_json::Value {
        self.key.with_page(page).variables
    }

    /// Fetch page `n`, revalidating cached pages below it first when the
    /// range is being extended. Re-fetching the highest cached page evicts
    /// it up front so progress indicators reflect a genuine re-fetch.
    pub async fn fetch_page(
        &self,
        page: u32,
        abort: &AbortHandle,
    ) -> Result<PagedResponse<T>> {
        let state = self.engine.key_state(&self.base());
        let cache = &self.engine.cache;
        let op = &self.key.op;

        if state.highest() == Some(page) {
            debug!(page, key = %self.base(), "re-fetching highest cached page");
            state.pages.lock().remove(&page);
            cache.clear_by_key(op, &self.page_vars(page));
        }

        if page > 1 && state.highest().is_some() {
            // Correct stale intermediate pages before extending the range.
            // Failures (including cancellation of a superseded pass) never
            // fail this read.
            self.revalidate(page).await;
        }

        let vars = self.page_vars(page);
        let had_data = cache
            .get(op, &vars, None)
            .map(|r| r.data.is_some())
            .unwrap_or(false);
        if !had_data {
            cache.set(
                op,
                &vars,
                CachedResponse {
                    loading: true,
                    called: true,
                    size: Some(page),
                    ..CachedResponse::default()
                },
            );
        }

        match self.fetcher.fetch_page(page, abort).await {
            Ok(fresh) => {
                cache.set_data(op, &vars, &fresh, Some(page))?;
                state.pages.lock().insert(page);
                Ok(fresh)
            }
            Err(err) if err.is_cancelled() => {
                // The consumer stopped caring; drop the placeholder rather
                // than caching a loading husk.
                if !had_data {
                    cache.clear_by_key(op, &vars);
                }
                Err(err)
            }
            Err(err) => {
                cache.set(op, &vars, CachedResponse::failed(err.to_string()));
                Err(err)
            }
        }
    }

    /// On first mount for a key: sequentially fetch pages `1..=initial`,
    /// stopping early once the upstream reports no further results. A no-op
    /// when pages are already cached or another bootstrap is mid-flight.
    pub async fn ensure_initial_pages(
        &self,
        abort: &AbortHandle,
    ) -> Result<()> {
        let state = self.engine.key_state(&self.base());
        if !state.pages.lock().is_empty() {
            return Ok(());
        }
        if state.initial_fetching.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let result = async {
            for page in 1..=self.engine.config.initial_pages {
                let response = self.fetch_page(page, abort).await?;
                if !response.has_next_page {
                    break;
                }
            }
            Ok(())
        }
        .await;
        state.initial_fetching.store(false, Ordering::SeqCst);
        result
    }

    /// Run the auto re-revalidation pass once per base key: after the key's
    /// variables change, the first observation that finds cached pages
    /// revalidates up to the highest one.
    pub async fn revalidate_if_needed(&self) {
        let state = self.engine.key_state(&self.base());
        if state.revalidated.load(Ordering::SeqCst) {
            return;
        }
        let Some(highest) = state.highest() else {
            return;
        };
        state.revalidated.store(true, Ordering::SeqCst);
        self.revalidate(highest).await;
    }

    /// Revalidate cached pages `1..=max_page`. Single-flight per base key:
    /// a concurrent call for the same key joins the in-flight pass, and a
    /// call for a different key cancels it first. Errors are logged, never
    /// surfaced; stale cached data beats a background-refresh failure.
    pub async fn revalidate(&self, max_page: u32) {
        let done = self.join_or_start_revalidation(max_page);
        done.await;
    }

    fn join_or_start_revalidation(
        &self,
        max_page: u32,
    ) -> Shared<BoxFuture<'static, ()>> {
        let base = self.base();
        let mut active = self.engine.active.lock();

        if let Some(current) = active.as_ref() {
            if current.key == base && !current.abort.is_aborted() {
                debug!(key = %base, "joining in-flight revalidation");
                return current.done.clone();
            }
            current.abort.abort(format!(
                "superseded by revalidation for {base}"
            ));
        }

        let id = self
            .engine
            .revalidation_seq
            .fetch_add(1, Ordering::Relaxed);
        let abort = AbortHandle::new();
        let run = RevalidationRun {
            cache: self.engine.cache.clone(),
            config: self.engine.config.clone(),
            state: self.engine.key_state(&base),
            fetcher: self.fetcher.clone(),
            key: self.key.clone(),
            source: self.source.clone(),
        };
        let slot = self.engine.active.clone();
        let task_abort = abort.clone();
        let task_key = base.clone();
        let done = async move {
            match run.execute(max_page, &task_abort).await {
                Ok(()) => {}
                Err(err) if err.is_cancelled() => {
                    debug!(key = %task_key, reason = %err, "revalidation cancelled");
                }
                Err(err) => {
                    warn!(key = %task_key, error = %err, "revalidation failed");
                }
            }
            // Clear the slot only if it is still ours.
            let mut active = slot.lock();
            if active.as_ref().map(|a| a.id) == Some(id) {
                *active = None;
            }
        }
        .boxed()
        .shared();

        *active = Some(ActiveRevalidation {
            id,
            key: base,
            abort,
            done: done.clone(),
        });
        done
    }

    /// Ordered per-page view over the cache for this key.
    pub fn results(&self) -> Vec<PageResult<T>> {
        let state = self.engine.key_state(&self.base());
        let pages = state.pages.lock().clone();
        let cache = &self.engine.cache;
        let mut out = Vec::new();
        let mut page = 1u32;
        loop {
            let cached = cache.get(&self.key.op, &self.page_vars(page), None);
            if cached.is_none() && !pages.contains(&page) {
                break;
            }
            let response = cached.unwrap_or_default();
            let (data, error) = match response.decode::<PagedResponse<T>>() {
                Ok(data) => (data, response.error.clone()),
                Err(err) => (None, Some(err.to_string())),
            };
            out.push(PageResult {
                page,
                is_loading: response.loading && data.is_none() && page == 1,
                is_loading_more: response.loading && page > 1,
                is_validating: response.is_validating,
                error,
                data,
            });
            page += 1;
        }
        out
    }

    /// Pages currently cached for this key.
    pub fn page_set(&self) -> BTreeSet<u32> {
        self.engine.key_state(&self.base()).pages.lock().clone()
    }
}

/// Owned inputs of one revalidation pass, detached from the query so the
/// single-flight future is `'static`.
struct RevalidationRun<T> {
    cache: Arc<ResponseCache>,
    config: Arc<ClientConfig>,
    state: Arc<KeyState>,
    fetcher: Arc<dyn PageFetcher<T>>,
    key: RequestKey,
    source: String,
}

impl<T> RevalidationRun<T>
where
    T: Serialize
        + DeserializeOwned
        + EntityKey
        + Clone
        + Send
        + Sync
        + 'static,
{
    fn page_vars(&self, page: u32) -> serde_json::Value {
        self.key.with_page(page).variables
    }

    async fn execute(&self, max_page: u32, abort: &AbortHandle) -> Result<()> {
        if self
            .config
            .revalidation_unsupported
            .contains(&self.source)
        {
            debug!(source = %self.source, "revalidation unsupported, skipping");
            return Ok(());
        }

        // A fresh-enough page 1 short-circuits the whole pass.
        if !self.config.revalidation_never_skip.contains(&self.source)
            && let Some(fetched_at) = self
                .cache
                .fetch_timestamp(&self.key.op, &self.page_vars(1))
            && fetched_at.elapsed() < self.config.response_ttl
        {
            debug!(key = %self.key.canonical(), "page 1 still fresh, skipping revalidation");
            return Ok(());
        }

        let mut page = 1u32;
        loop {
            if abort.is_aborted() {
                return Err(RequestError::cancelled(
                    abort.reason().unwrap_or_else(|| "superseded".into()),
                ));
            }

            let vars = self.page_vars(page);
            let cached_ids = self
                .cache
                .get_data::<PagedResponse<T>>(&self.key.op, &vars, None)
                .ok()
                .flatten()
                .map(|cached| cached.entity_ids());
            self.cache.update(&self.key.op, &vars, |r| {
                r.is_validating = true;
            });

            let fresh = match self.fetcher.fetch_page(page, abort).await {
                Ok(fresh) => fresh,
                Err(err) => {
                    self.cache.update(&self.key.op, &vars, |r| {
                        r.is_validating = false;
                    });
                    return Err(err);
                }
            };

            // Positional identifier comparison; a missing cached page
            // counts as divergent.
            let divergent = match &cached_ids {
                Some(ids) => *ids != fresh.entity_ids(),
                None => true,
            };

            // The fresh result always wins, divergent or not.
            self.cache
                .set_data(&self.key.op, &vars, &fresh, Some(page))?;
            self.state.pages.lock().insert(page);

            if !fresh.has_next_page {
                self.truncate_above(page);
                return Ok(());
            }
            if divergent && page < max_page {
                debug!(page, key = %self.key.canonical(), "page diverged, cascading to next");
                page += 1;
                continue;
            }
            return Ok(());
        }
    }

    /// Drop every page above `cut` from the page set together with its
    /// cache entries. The page set stays contiguous from 1.
    fn truncate_above(&self, cut: u32) {
        let mut pages = self.state.pages.lock();
        let above: Vec<u32> =
            pages.iter().copied().filter(|p| *p > cut).collect();
        if above.is_empty() {
            return;
        }
        debug!(cut, removed = above.len(), key = %self.key.canonical(), "truncating page set");
        for page in above {
            pages.remove(&page);
            self.cache
                .clear_by_key(&self.key.op, &self.page_vars(page));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Card {
        id: u32,
    }

    impl EntityKey for Card {
        fn entity_id(&self) -> String {
            self.id.to_string()
        }
    }

    /// In-memory source whose catalog can shrink or grow between calls.
    struct FakeSource {
        items: Mutex<Vec<u32>>,
        per_page: usize,
        delay: Mutex<Duration>,
        calls: AtomicUsize,
    }

    impl FakeSource {
        fn new(count: u32, per_page: usize) -> Arc<Self> {
            Arc::new(Self {
                items: Mutex::new((1..=count).collect()),
                per_page,
                delay: Mutex::new(Duration::ZERO),
                calls: AtomicUsize::new(0),
            })
        }

        fn set_items(&self, count: u32) {
            *self.items.lock() = (1..=count).collect();
        }

        fn set_delay(&self, delay: Duration) {
            *self.delay.lock() = delay;
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl PageFetcher<Card> for FakeSource {
        async fn fetch_page(
            &self,
            page: u32,
            abort: &AbortHandle,
        ) -> Result<PagedResponse<Card>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let delay = *self.delay.lock();
            if !delay.is_zero() {
                tokio::select! {
                    _ = abort.aborted() => {
                        return Err(RequestError::cancelled(
                            abort.reason().unwrap_or_else(|| "aborted".into()),
                        ));
                    }
                    _ = tokio::time::sleep(delay) => {}
                }
            }
            let items = self.items.lock().clone();
            let start = (page as usize - 1) * self.per_page;
            let slice: Vec<Card> = items
                .iter()
                .skip(start)
                .take(self.per_page)
                .map(|id| Card { id: *id })
                .collect();
            let has_next_page = start + self.per_page < items.len();
            Ok(PagedResponse::new(slice, has_next_page))
        }
    }

    fn engine(config: ClientConfig) -> Arc<PagedEngine<Card>> {
        Arc::new(PagedEngine::new(
            Arc::new(ResponseCache::new()),
            Arc::new(config),
        ))
    }

    fn browse(
        engine: &Arc<PagedEngine<Card>>,
        fetcher: &Arc<FakeSource>,
        source: &str,
    ) -> PagedQuery<Card> {
        engine.query(
            "browse",
            json!({ "source": source }),
            source,
            fetcher.clone() as Arc<dyn PageFetcher<Card>>,
        )
    }

    fn pages_of(query: &PagedQuery<Card>) -> Vec<u32> {
        query.page_set().into_iter().collect()
    }

    #[tokio::test]
    async fn forty_items_fill_exactly_two_pages() {
        let fetcher = FakeSource::new(40, 25);
        let engine = engine(ClientConfig::new("localhost:4567"));
        let query = browse(&engine, &fetcher, "s1");
        let abort = AbortHandle::new();

        let p1 = query.fetch_page(1, &abort).await.unwrap();
        assert_eq!(p1.items.len(), 25);
        assert!(p1.has_next_page);

        let p2 = query.fetch_page(2, &abort).await.unwrap();
        assert_eq!(p2.items.len(), 15);
        assert!(!p2.has_next_page);
        assert_eq!(p2.items[0].id, 26);

        assert_eq!(pages_of(&query), vec![1, 2]);
        // Page 1 was still fresh, so extending the range skipped the
        // revalidation pass.
        assert_eq!(fetcher.calls(), 2);

        let results = query.results();
        assert_eq!(results.len(), 2);
        assert!(
            results
                .iter()
                .all(|r| r.data.is_some() && r.error.is_none())
        );
    }

    #[tokio::test]
    async fn shrinking_upstream_truncates_the_page_set() {
        let fetcher = FakeSource::new(40, 25);
        let engine = engine(ClientConfig::new("localhost:4567"));
        let query = browse(&engine, &fetcher, "s1");
        let abort = AbortHandle::new();
        query.fetch_page(1, &abort).await.unwrap();
        query.fetch_page(2, &abort).await.unwrap();

        fetcher.set_items(20);
        engine.cache().backdate(
            "browse",
            &query.page_vars(1),
            Duration::from_secs(600),
        );
        query.revalidate(2).await;

        assert_eq!(pages_of(&query), vec![1]);
        let results = query.results();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].data.as_ref().unwrap().items.len(), 20);
        // Page 2's entry is evicted, not just hidden.
        assert!(
            engine
                .cache()
                .get("browse", &query.page_vars(2), None)
                .is_none()
        );
    }

    #[tokio::test]
    async fn unchanged_listing_revalidates_only_page_one() {
        let mut config = ClientConfig::new("localhost:4567");
        config.revalidation_never_skip.insert("s1".into());
        let fetcher = FakeSource::new(40, 25);
        let engine = engine(config);
        let query = browse(&engine, &fetcher, "s1");
        let abort = AbortHandle::new();
        query.fetch_page(1, &abort).await.unwrap();
        query.fetch_page(2, &abort).await.unwrap();

        let before = fetcher.calls();
        query.revalidate(2).await;
        // No divergence on page 1, so the cascade never reached page 2.
        assert_eq!(fetcher.calls(), before + 1);
        assert_eq!(pages_of(&query), vec![1, 2]);

        // And again: revalidation is idempotent on a stable listing.
        query.revalidate(2).await;
        assert_eq!(fetcher.calls(), before + 2);
        assert_eq!(pages_of(&query), vec![1, 2]);
    }

    #[tokio::test]
    async fn unsupported_sources_are_never_revalidated() {
        let mut config = ClientConfig::new("localhost:4567");
        config.revalidation_unsupported.insert("s1".into());
        let fetcher = FakeSource::new(40, 25);
        let engine = engine(config);
        let query = browse(&engine, &fetcher, "s1");
        let abort = AbortHandle::new();
        query.fetch_page(1, &abort).await.unwrap();

        engine.cache().backdate(
            "browse",
            &query.page_vars(1),
            Duration::from_secs(600),
        );
        query.revalidate(1).await;
        assert_eq!(fetcher.calls(), 1);
        assert_eq!(pages_of(&query), vec![1]);
    }

    #[tokio::test]
    async fn refetching_the_highest_page_evicts_it_first() {
        let fetcher = FakeSource::new(40, 25);
        let engine = engine(ClientConfig::new("localhost:4567"));
        let query = browse(&engine, &fetcher, "s1");
        let abort = AbortHandle::new();
        query.fetch_page(1, &abort).await.unwrap();
        query.fetch_page(2, &abort).await.unwrap();

        fetcher.set_items(41);
        let p2 = query.fetch_page(2, &abort).await.unwrap();
        assert_eq!(p2.items.len(), 16);
        assert!(!p2.has_next_page);
        // Page 1 was fresh, so only page 2 itself hit the network again.
        assert_eq!(fetcher.calls(), 3);
        assert_eq!(pages_of(&query), vec![1, 2]);
    }

    #[tokio::test]
    async fn initial_pages_stop_at_the_last_page() {
        let fetcher = FakeSource::new(40, 25);
        let engine = engine(ClientConfig::new("localhost:4567"));
        let query = browse(&engine, &fetcher, "s1");
        let abort = AbortHandle::new();

        // Catalog runs out after page 2 even though the bootstrap wants 3.
        query.ensure_initial_pages(&abort).await.unwrap();
        assert_eq!(pages_of(&query), vec![1, 2]);
        assert_eq!(fetcher.calls(), 2);

        // Already populated: a second bootstrap is a no-op.
        query.ensure_initial_pages(&abort).await.unwrap();
        assert_eq!(fetcher.calls(), 2);
    }

    #[tokio::test]
    async fn auto_revalidation_runs_once_per_key() {
        let mut config = ClientConfig::new("localhost:4567");
        config.revalidation_never_skip.insert("s1".into());
        let fetcher = FakeSource::new(40, 25);
        let engine = engine(config);
        let query = browse(&engine, &fetcher, "s1");
        let abort = AbortHandle::new();

        // Nothing cached yet: observation does not fetch.
        query.revalidate_if_needed().await;
        assert_eq!(fetcher.calls(), 0);

        query.fetch_page(1, &abort).await.unwrap();
        query.revalidate_if_needed().await;
        assert_eq!(fetcher.calls(), 2);
        query.revalidate_if_needed().await;
        assert_eq!(fetcher.calls(), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn concurrent_same_key_revalidations_share_one_pass() {
        let fetcher = FakeSource::new(10, 25);
        fetcher.set_delay(Duration::from_millis(100));
        let engine = engine(ClientConfig::new("localhost:4567"));
        let query = browse(&engine, &fetcher, "s1");

        let a = query.clone();
        let b = query.clone();
        let (ra, rb) = tokio::join!(
            tokio::spawn(async move { a.revalidate(1).await }),
            tokio::spawn(async move { b.revalidate(1).await }),
        );
        ra.unwrap();
        rb.unwrap();

        assert_eq!(fetcher.calls(), 1);
        assert_eq!(pages_of(&query), vec![1]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn newer_key_cancels_the_previous_revalidation() {
        let fetcher = FakeSource::new(10, 25);
        fetcher.set_delay(Duration::from_millis(200));
        let engine = engine(ClientConfig::new("localhost:4567"));
        let first = browse(&engine, &fetcher, "s1");
        let second = browse(&engine, &fetcher, "s2");

        let running = first.clone();
        let handle =
            tokio::spawn(async move { running.revalidate(1).await });
        tokio::time::sleep(Duration::from_millis(50)).await;

        second.revalidate(1).await;
        handle.await.unwrap();

        // The superseded pass committed nothing; the newer key did.
        assert!(pages_of(&first).is_empty());
        assert_eq!(pages_of(&second), vec![1]);
    }
}
