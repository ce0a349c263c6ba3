//! Core data model definitions shared across Tatami crates.
#![allow(missing_docs)]

pub mod auth;
pub mod entities;
pub mod key;
pub mod live;
pub mod page;

pub use auth::{AuthToken, LoginRequest, RefreshRequest};
pub use entities::{
    Category, Chapter, Extension, Series, SourceInfo, SourceRef,
};
pub use key::RequestKey;
pub use live::{
    DownloadState, DownloadStatus, GlobalMeta, LibraryUpdateStatus,
    MetaEntry, ServerSettings,
};
pub use page::{EntityKey, PagedResponse};
