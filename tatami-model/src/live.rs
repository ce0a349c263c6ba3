//! Payloads pushed by the server over its WebSocket endpoints.

use serde::{Deserialize, Serialize};

/// Server-side settings snapshot.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ServerSettings {
    #[serde(default)]
    pub download_as_cbz: bool,
    #[serde(default)]
    pub auto_download_new_chapters: bool,
    #[serde(default)]
    pub max_sources_in_parallel: u32,
    #[serde(default)]
    pub extension_repos: Vec<String>,
    #[serde(default)]
    pub web_ui_update_check_interval: Option<f64>,
}

/// One key/value entry of the global metadata store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MetaEntry {
    pub key: String,
    pub value: String,
}

/// The full global key/value metadata snapshot.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct GlobalMeta {
    pub entries: Vec<MetaEntry>,
}

impl GlobalMeta {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|e| e.key == key)
            .map(|e| e.value.as_str())
    }
}

/// State of one queued download.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DownloadState {
    Queued,
    Downloading,
    Finished,
    Error,
}

/// Download queue progress frame.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DownloadStatus {
    pub state: DownloadState,
    pub chapter_id: i64,
    pub series_id: i64,
    pub progress: f64,
    #[serde(default)]
    pub tries: u32,
}

/// Library update pass progress frame.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LibraryUpdateStatus {
    pub running: bool,
    pub complete: u32,
    pub pending: u32,
    #[serde(default)]
    pub failed: u32,
}
