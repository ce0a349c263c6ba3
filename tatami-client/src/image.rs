//! Image loading.
//!
//! Resolves image URLs to displayable payloads: cross-origin URLs are
//! rewritten through the same-origin proxy, auth-required fetches go
//! through the transport (which can attach headers), and everything else
//! uses the bare client. All fetches route through the per-source
//! [`SourceQueue`] unless the caller bypasses it or a lower-level cache
//! already holds the URL.

use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;
use tokio::task::JoinHandle;
use tracing::debug;
use url::Url;

use crate::cancel::AbortHandle;
use crate::config::ClientConfig;
use crate::error::{RequestError, Result};
use crate::limiter::{Priority, SourceQueue};
use crate::transport::Transport;

/// Cache-busting revision appended to icon-like URLs. Bump when upstream
/// icons are known to have been replaced in place.
const ICON_REVISION: &str = "2";

/// Narrow "likely icon" pattern: small static assets that upstreams replace
/// in place without changing the URL.
static ICON_URL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(favicon[^/]*|/icon[^/]*)\.(png|ico|webp)$")
        .expect("icon pattern is valid")
});

/// Probe for a lower-level disk/service image cache. External collaborator;
/// a hit lets the request skip the queue entirely.
pub trait ImageCacheProbe: Send + Sync {
    fn contains(&self, url: &str) -> bool;
}

/// Per-request knobs.
#[derive(Debug, Clone, Default)]
pub struct ImageOptions {
    pub priority: Priority,
    /// Fetch with the bearer header via the transport.
    pub requires_auth: bool,
    /// Fully decode the payload before resolving, keeping the decode cost
    /// off the caller's render path.
    pub decode: bool,
    /// Skip the concurrency limiter.
    pub ignore_queue: bool,
}

/// The loaded image. Dropping it releases the buffer; `cleanup` makes the
/// release explicit for call sites that hold payloads in shared state.
#[derive(Debug)]
pub struct LoadedImage {
    pub bytes: Vec<u8>,
    pub content_type: Option<String>,
    /// Present when the request asked for pre-decode.
    pub decoded: Option<image::DynamicImage>,
}

impl LoadedImage {
    /// Release the payload.
    pub fn cleanup(self) {}
}

/// Handle to one in-flight image request.
#[derive(Debug)]
pub struct ImageRequest {
    /// Queue key of this request.
    pub key: String,
    /// True when a lower-level cache already held the URL (the queue was
    /// skipped).
    pub from_cache: bool,
    source: String,
    abort: AbortHandle,
    queue: Arc<SourceQueue>,
    handle: JoinHandle<Result<LoadedImage>>,
}

impl ImageRequest {
    /// Await the payload. Rejects on load failure; callers decide fallback.
    pub async fn response(self) -> Result<LoadedImage> {
        self.handle
            .await
            .map_err(|e| RequestError::wrap("image task failed", e))?
    }

    /// Abort the request. Honored only while the limiter has not started
    /// executing it; cancelling work the server is already doing would just
    /// force a wasted retry.
    pub fn abort_request(&self, reason: impl Into<String>) {
        if self.queue.is_processing(&self.source, &self.key) {
            debug!(key = %self.key, "abort ignored, request already in progress");
            return;
        }
        self.abort.abort(reason);
    }
}

/// Source-aware image loader.
#[derive(Clone)]
pub struct ImageLoader {
    transport: Arc<Transport>,
    queue: Arc<SourceQueue>,
    config: Arc<ClientConfig>,
    probe: Option<Arc<dyn ImageCacheProbe>>,
}

impl std::fmt::Debug for ImageLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageLoader")
            .field("base_url", &self.config.base_url)
            .finish()
    }
}

impl ImageLoader {
    pub fn new(transport: Arc<Transport>, config: Arc<ClientConfig>) -> Self {
        let queue = Arc::new(SourceQueue::new(config.image_concurrency()));
        Self {
            transport,
            queue,
            config,
            probe: None,
        }
    }

    /// Attach a lower-level cache probe.
    pub fn with_probe(mut self, probe: Arc<dyn ImageCacheProbe>) -> Self {
        self.probe = Some(probe);
        self
    }

    pub fn queue(&self) -> &Arc<SourceQueue> {
        &self.queue
    }

    /// Rewrite a URL per loader policy: cross-origin URLs route through the
    /// same-origin proxy unless already same-origin or already proxied, and
    /// icon-like URLs get a cache-busting revision parameter.
    pub fn resolve_url(&self, raw: &str) -> Result<Url> {
        let base = Url::parse(&self.config.base_url)
            .map_err(|e| RequestError::wrap("invalid base URL", e))?;
        let mut url = if raw.starts_with("http://")
            || raw.starts_with("https://")
        {
            Url::parse(raw)
                .map_err(|e| RequestError::wrap("invalid image URL", e))?
        } else {
            base.join(raw)
                .map_err(|e| RequestError::wrap("invalid image path", e))?
        };

        let same_origin = url.origin() == base.origin();
        let already_proxied =
            same_origin && url.path().starts_with(&self.config.proxy_prefix);
        if !same_origin && !already_proxied {
            let mut proxied = base.clone();
            proxied.set_path(&self.config.proxy_prefix);
            proxied
                .query_pairs_mut()
                .append_pair("url", url.as_str());
            url = proxied;
        }

        if ICON_URL.is_match(url.path()) {
            url.query_pairs_mut().append_pair("rev", ICON_REVISION);
        }
        Ok(url)
    }

    /// Source identifier parsed out of a URL, used to bound per-provider
    /// concurrency. Prefers an explicit sourceId query parameter, then a
    /// /source/{id}/ path segment, then the host.
    pub fn source_id_for(url: &Url) -> String {
        if let Some((_, id)) =
            url.query_pairs().find(|(k, _)| k == "sourceId")
        {
            return id.into_owned();
        }
        let mut segments = url.path_segments().into_iter().flatten();
        while let Some(segment) = segments.next() {
            if segment == "source"
                && let Some(id) = segments.next()
            {
                return id.to_string();
            }
        }
        url.host_str().unwrap_or("unknown").to_string()
    }

    /// Request an image.
    pub fn request_image(
        &self,
        raw_url: &str,
        options: ImageOptions,
    ) -> Result<ImageRequest> {
        let url = self.resolve_url(raw_url)?;
        let source = Self::source_id_for(&url);
        let key = url.to_string();
        let abort = AbortHandle::new();

        let from_cache = self
            .probe
            .as_ref()
            .map(|p| p.contains(url.as_str()))
            .unwrap_or(false);
        let bypass = from_cache || options.ignore_queue;

        let transport = self.transport.clone();
        let decode = options.decode;
        let requires_auth = options.requires_auth;
        let fetch_abort = abort.clone();
        let fetch_url = url.clone();
        let work = move || async move {
            fetch_image(
                transport,
                fetch_url,
                requires_auth,
                decode,
                fetch_abort,
            )
            .await
        };

        let handle = if bypass {
            debug!(%url, from_cache, "image request bypasses queue");
            tokio::spawn(work())
        } else {
            self.queue
                .enqueue(&source, &key, options.priority, abort.clone(), work)
                .handle
        };

        Ok(ImageRequest {
            key,
            from_cache,
            source,
            abort,
            queue: self.queue.clone(),
            handle,
        })
    }
}

async fn fetch_image(
    transport: Arc<Transport>,
    url: Url,
    requires_auth: bool,
    decode: bool,
    abort: AbortHandle,
) -> Result<LoadedImage> {
    if abort.is_aborted() {
        return Err(RequestError::cancelled(
            abort.reason().unwrap_or_else(|| "aborted".into()),
        ));
    }

    let (bytes, content_type) = if requires_auth {
        // The transport can attach the bearer header (and handles 401).
        let response = transport
            .fetch(
                url.as_str(),
                crate::transport::FetchOptions {
                    abort: Some(abort.clone()),
                    ..Default::default()
                },
            )
            .await?;
        let content_type = header_str(&response, "content-type");
        (response.bytes().await?.to_vec(), content_type)
    } else {
        // Headerless path: plain client, no auth attached.
        let response = tokio::select! {
            _ = abort.aborted() => {
                return Err(RequestError::cancelled(
                    abort.reason().unwrap_or_else(|| "aborted".into()),
                ));
            }
            result = transport.bare_client().get(url.as_str()).send() => {
                result?
            }
        };
        let status = response.status();
        if !status.is_success() {
            return Err(RequestError::Http {
                status: status.as_u16(),
                message: format!("image fetch failed for {url}"),
            });
        }
        let content_type = header_str(&response, "content-type");
        (response.bytes().await?.to_vec(), content_type)
    };

    let decoded = if decode {
        let buffer = bytes.clone();
        let img = tokio::task::spawn_blocking(move || {
            image::load_from_memory(&buffer)
        })
        .await
        .map_err(|e| RequestError::wrap("decode task failed", e))?
        .map_err(|e| RequestError::Image(e.to_string()))?;
        Some(img)
    } else {
        None
    };

    Ok(LoadedImage {
        bytes,
        content_type,
        decoded,
    })
}

fn header_str(response: &reqwest::Response, name: &str) -> Option<String> {
    response
        .headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}
