//! Keyed response cache.
//!
//! Maps (operation name, variables) to the last response plus its fetch
//! timestamp. Lookups can be TTL-aware, invalidation works by exact key or
//! by pattern over canonical key strings (e.g. all pages of one source),
//! and writes always overwrite whole entries so readers never observe a
//! half-updated response.

use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use regex::Regex;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::Result;
use tatami_model::RequestKey;

/// One cached response. `data` is the serialized payload; the surrounding
/// flags mirror what consumers render from (loading spinners, error rows,
/// background-validation shimmer).
#[derive(Debug, Clone, Default)]
pub struct CachedResponse {
    pub data: Option<Value>,
    pub error: Option<String>,
    pub loading: bool,
    pub called: bool,
    /// Page number, where applicable.
    pub size: Option<u32>,
    pub is_validating: bool,
}

impl CachedResponse {
    pub fn ready(data: Value, size: Option<u32>) -> Self {
        Self {
            data: Some(data),
            called: true,
            size,
            ..Self::default()
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            called: true,
            ..Self::default()
        }
    }

    /// Deserialize the payload, if any.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<Option<T>> {
        match &self.data {
            Some(value) => Ok(Some(serde_json::from_value(value.clone())?)),
            None => Ok(None),
        }
    }
}

#[derive(Debug, Clone)]
struct CacheEntry {
    response: CachedResponse,
    fetched_at: Instant,
    // Wall-clock stamp for diagnostics only; TTL math stays monotonic.
    fetched_wall: DateTime<Utc>,
}

/// Process-wide response cache. Cheap to clone handles are not needed;
/// share it behind an `Arc`.
#[derive(Debug, Default)]
pub struct ResponseCache {
    entries: DashMap<String, CacheEntry>,
}

impl ResponseCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Canonical cache key for an operation and its variables.
    pub fn key_for(op: &str, variables: &Value) -> String {
        RequestKey::new(op, variables.clone()).canonical()
    }

    /// Look up a response. With a TTL, entries older than the window are
    /// treated as absent (they stay stored for `fetch_timestamp` callers).
    pub fn get(
        &self,
        op: &str,
        variables: &Value,
        ttl: Option<Duration>,
    ) -> Option<CachedResponse> {
        let entry = self.entries.get(&Self::key_for(op, variables))?;
        if let Some(ttl) = ttl
            && entry.fetched_at.elapsed() > ttl
        {
            return None;
        }
        Some(entry.response.clone())
    }

    /// Overwrite the entry for a key, stamping the fetch time.
    pub fn set(&self, op: &str, variables: &Value, response: CachedResponse) {
        self.entries.insert(
            Self::key_for(op, variables),
            CacheEntry {
                response,
                fetched_at: Instant::now(),
                fetched_wall: Utc::now(),
            },
        );
    }

    /// Serialize and store a typed payload.
    pub fn set_data<T: Serialize>(
        &self,
        op: &str,
        variables: &Value,
        data: &T,
        size: Option<u32>,
    ) -> Result<()> {
        let value = serde_json::to_value(data)?;
        self.set(op, variables, CachedResponse::ready(value, size));
        Ok(())
    }

    /// Decode the cached payload for a key, honoring an optional TTL.
    pub fn get_data<T: DeserializeOwned>(
        &self,
        op: &str,
        variables: &Value,
        ttl: Option<Duration>,
    ) -> Result<Option<T>> {
        match self.get(op, variables, ttl) {
            Some(response) => response.decode(),
            None => Ok(None),
        }
    }

    /// Update an entry in place without touching its fetch timestamp.
    /// Used to flip presentation flags (`is_validating`, `loading`).
    pub fn update<F>(&self, op: &str, variables: &Value, f: F) -> bool
    where
        F: FnOnce(&mut CachedResponse),
    {
        match self.entries.get_mut(&Self::key_for(op, variables)) {
            Some(mut entry) => {
                f(&mut entry.response);
                true
            }
            None => false,
        }
    }

    /// Remove one entry. Returns whether it existed.
    pub fn clear_by_key(&self, op: &str, variables: &Value) -> bool {
        self.entries
            .remove(&Self::key_for(op, variables))
            .is_some()
    }

    /// Remove every entry whose canonical key matches the pattern.
    /// Returns the number of entries removed.
    pub fn clear_by_pattern(&self, pattern: &Regex) -> usize {
        let keys: Vec<String> = self
            .entries
            .iter()
            .filter(|e| pattern.is_match(e.key()))
            .map(|e| e.key().clone())
            .collect();
        let mut removed = 0;
        for key in keys {
            if self.entries.remove(&key).is_some() {
                removed += 1;
            }
        }
        removed
    }

    /// Monotonic fetch timestamp for a key, ignoring TTL.
    pub fn fetch_timestamp(
        &self,
        op: &str,
        variables: &Value,
    ) -> Option<Instant> {
        self.entries
            .get(&Self::key_for(op, variables))
            .map(|e| e.fetched_at)
    }

    /// Wall-clock fetch stamp, for diagnostics.
    pub fn fetched_wall(
        &self,
        op: &str,
        variables: &Value,
    ) -> Option<DateTime<Utc>> {
        self.entries
            .get(&Self::key_for(op, variables))
            .map(|e| e.fetched_wall)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Age an entry backwards for tests exercising the TTL window.
    #[cfg(test)]
    pub(crate) fn backdate(
        &self,
        op: &str,
        variables: &Value,
        age: Duration,
    ) {
        if let Some(mut entry) =
            self.entries.get_mut(&Self::key_for(op, variables))
        {
            entry.fetched_at = Instant::now() - age;
        }
    }
}
