//! Data-access engine for a remote media-library server.
//!
//! Everything a frontend needs between "the user scrolled" and "bytes on
//! the wire": an abortable one-shot query/mutation engine, incremental
//! pagination with cache revalidation, a source-aware image loader behind
//! a per-source concurrency limiter, a bearer-auth transport with
//! coordinated token refresh, and WebSocket live-update channels.
//!
//! The engine optimizes for good-enough, eventually-correct client state:
//! cached pages are served immediately and corrected in the background,
//! and a divergence detected early in a page range invalidates everything
//! cached after it.

pub mod cache;
pub mod cancel;
pub mod config;
pub mod error;
pub mod image;
pub mod limiter;
pub mod live;
pub mod pages;
pub mod query;
pub mod routes;
pub mod transport;

pub use cache::{CachedResponse, ResponseCache};
pub use cancel::AbortHandle;
pub use config::{ClientConfig, RESPONSE_TTL};
pub use error::{RequestError, Result};
pub use image::{
    ImageCacheProbe, ImageLoader, ImageOptions, ImageRequest, LoadedImage,
};
pub use limiter::{Priority, QueuedWork, SourceQueue};
pub use live::{ChannelHandle, ChannelState, LiveChannels, LiveState, Snapshot};
pub use pages::{PageFetcher, PageResult, PagedEngine, PagedQuery};
pub use query::{MutationHandle, NetworkStatus, QueryHandle, QueryState};
pub use transport::{FetchOptions, MultipartFile, Transport};
