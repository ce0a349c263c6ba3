//! Library entity DTOs.
//!
//! These are the wire shapes the thin endpoint wrappers deserialize into.
//! The engine itself only cares about their stable ids (via [`EntityKey`]);
//! everything else is opaque payload to it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::page::EntityKey;

/// A series in the library (or in a source's browse listing).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Series {
    pub id: i64,
    pub source_id: String,
    pub title: String,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub thumbnail_url: Option<String>,
    #[serde(default)]
    pub in_library: bool,
    #[serde(default)]
    pub unread_count: Option<u32>,
    #[serde(default)]
    pub last_fetched_at: Option<DateTime<Utc>>,
}

impl EntityKey for Series {
    fn entity_id(&self) -> String {
        self.id.to_string()
    }
}

/// A chapter of a series.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Chapter {
    pub id: i64,
    pub series_id: i64,
    pub name: String,
    pub chapter_number: f64,
    #[serde(default)]
    pub read: bool,
    #[serde(default)]
    pub downloaded: bool,
    #[serde(default)]
    pub page_count: Option<u32>,
    #[serde(default)]
    pub uploaded_at: Option<DateTime<Utc>>,
}

impl EntityKey for Chapter {
    fn entity_id(&self) -> String {
        self.id.to_string()
    }
}

/// An upstream content provider.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SourceInfo {
    pub id: String,
    pub name: String,
    pub lang: String,
    #[serde(default)]
    pub icon_url: Option<String>,
    #[serde(default)]
    pub supports_latest: bool,
}

impl EntityKey for SourceInfo {
    fn entity_id(&self) -> String {
        self.id.clone()
    }
}

/// Identifies a source inside request variables.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceRef(pub String);

impl SourceRef {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SourceRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A user-defined library category.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Category {
    pub id: i64,
    pub name: String,
    pub order: u32,
    #[serde(default)]
    pub default: bool,
}

impl EntityKey for Category {
    fn entity_id(&self) -> String {
        self.id.to_string()
    }
}

/// An installable source extension.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Extension {
    pub pkg_name: String,
    pub name: String,
    pub lang: String,
    pub version_name: String,
    #[serde(default)]
    pub installed: bool,
    #[serde(default)]
    pub has_update: bool,
    #[serde(default)]
    pub icon_url: Option<String>,
}

impl EntityKey for Extension {
    fn entity_id(&self) -> String {
        self.pkg_name.clone()
    }
}
