//! API route constants for the Tatami server.
//!
//! All versioned REST routes are prefixed with /api/v1; the WebSocket
//! endpoints upgrade on the same base URL.

/// Base API path for versioned endpoints
pub const API_BASE: &str = "/api/v1";

/// Authentication endpoints
pub mod auth {
    /// User login
    pub const LOGIN: &str = "/auth/login";
    /// Token refresh
    pub const REFRESH: &str = "/auth/refresh";
    /// User logout
    pub const LOGOUT: &str = "/auth/logout";
}

/// Source browsing endpoints
pub mod source {
    /// List installed sources
    pub const LIST: &str = "/source/list";

    /// Browse a source's popular listing (page/query/filter parameters)
    pub fn popular(source_id: &str) -> String {
        format!("/source/{source_id}/popular")
    }

    /// Browse a source's latest listing
    pub fn latest(source_id: &str) -> String {
        format!("/source/{source_id}/latest")
    }

    /// Search within a source
    pub fn search(source_id: &str) -> String {
        format!("/source/{source_id}/search")
    }
}

/// Extension management endpoints
pub mod extension {
    /// List available extensions
    pub const LIST: &str = "/extension/list";
    /// Install an extension by package name
    pub fn install(pkg_name: &str) -> String {
        format!("/extension/install/{pkg_name}")
    }
    /// Update an installed extension
    pub fn update(pkg_name: &str) -> String {
        format!("/extension/update/{pkg_name}")
    }
}

/// Category CRUD endpoints
pub mod category {
    pub const LIST: &str = "/category";
    pub const CREATE: &str = "/category";
    pub fn modify(category_id: i64) -> String {
        format!("/category/{category_id}")
    }
}

/// Download queue endpoints
pub mod downloads {
    pub const START: &str = "/downloads/start";
    pub const STOP: &str = "/downloads/stop";
    pub const CLEAR: &str = "/downloads/clear";
}

/// Backup/restore endpoints
pub mod backup {
    pub const EXPORT: &str = "/backup/export";
    pub const IMPORT: &str = "/backup/import";
}

/// Tracker endpoints
pub mod tracker {
    pub const LIST: &str = "/track/list";
    pub const BIND: &str = "/track/bind";
    pub const SEARCH: &str = "/track/search";
}

/// WebSocket upgrade paths (relative to the base URL, not API_BASE)
pub mod ws {
    /// Download queue progress stream
    pub const DOWNLOADS: &str = "/api/v1/downloads";
    /// Library update progress stream
    pub const UPDATES: &str = "/api/v1/update";
    /// Server settings stream
    pub const SETTINGS: &str = "/api/v1/settings";
    /// Global key/value metadata stream
    pub const META: &str = "/api/v1/meta";
}
