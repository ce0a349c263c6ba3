//! Paged wire responses and the identity hook used by revalidation.

use serde::{Deserialize, Serialize};

/// One page of results as every source-browse endpoint returns it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PagedResponse<T> {
    pub items: Vec<T>,
    pub has_next_page: bool,
}

impl<T> PagedResponse<T> {
    pub fn new(items: Vec<T>, has_next_page: bool) -> Self {
        Self {
            items,
            has_next_page,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Stable identity of a library entity.
///
/// Revalidation compares fresh pages against cached ones positionally by
/// this id; any entity that can appear in a paginated listing implements it.
pub trait EntityKey {
    fn entity_id(&self) -> String;
}

impl<T: EntityKey> PagedResponse<T> {
    /// Positional ids for the divergence check.
    pub fn entity_ids(&self) -> Vec<String> {
        self.items.iter().map(EntityKey::entity_id).collect()
    }
}
