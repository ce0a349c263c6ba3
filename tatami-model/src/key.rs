//! Request keys: the cache address of one logical query.
//!
//! A key is an operation name plus its variables. Two keys are equal iff
//! their variables are deep-equal regardless of field order, so the
//! canonical form sorts every object's keys recursively before rendering.

use serde_json::{Map, Value};

/// Name of the page field inside paginated variables. Stripping it yields
/// the base key that groups all pages of one logical query.
pub const PAGE_FIELD: &str = "page";

/// (operation name, variables) pair addressing one cached response.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestKey {
    pub op: String,
    pub variables: Value,
}

impl RequestKey {
    pub fn new(op: impl Into<String>, variables: Value) -> Self {
        Self {
            op: op.into(),
            variables,
        }
    }

    /// Canonical string form used for cache addressing.
    pub fn canonical(&self) -> String {
        format!("{}::{}", self.op, canonical_variables(&self.variables))
    }

    /// The same key with the page field removed from its variables.
    pub fn base(&self) -> RequestKey {
        let mut variables = self.variables.clone();
        if let Value::Object(map) = &mut variables {
            map.remove(PAGE_FIELD);
        }
        RequestKey {
            op: self.op.clone(),
            variables,
        }
    }

    /// The same key addressing one specific page.
    pub fn with_page(&self, page: u32) -> RequestKey {
        let mut variables = match self.variables.clone() {
            Value::Object(map) => Value::Object(map),
            Value::Null => Value::Object(Map::new()),
            other => other,
        };
        if let Value::Object(map) = &mut variables {
            map.insert(PAGE_FIELD.to_string(), Value::from(page));
        }
        RequestKey {
            op: self.op.clone(),
            variables,
        }
    }
}

/// Render variables with object keys sorted recursively so serialization
/// order never produces distinct cache keys for equal variables.
pub fn canonical_variables(value: &Value) -> String {
    fn sort(value: &Value) -> Value {
        match value {
            Value::Object(map) => {
                let mut sorted: Vec<(&String, &Value)> = map.iter().collect();
                sorted.sort_by(|a, b| a.0.cmp(b.0));
                let mut out = Map::new();
                for (k, v) in sorted {
                    out.insert(k.clone(), sort(v));
                }
                Value::Object(out)
            }
            Value::Array(items) => {
                Value::Array(items.iter().map(sort).collect())
            }
            other => other.clone(),
        }
    }
    sort(value).to_string()
}
