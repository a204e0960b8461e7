//! Inventory lookup trait and in-memory implementation.

use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use async_trait::async_trait;
use common::PartId;
use domain::Money;
use serde::{Deserialize, Serialize};

use crate::error::SagaError;

/// Kind of spaceship part.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PartCategory {
    #[default]
    Unknown,
    Engine,
    Fuel,
    Porthole,
    Wing,
}

/// A part as listed by the inventory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Part {
    pub id: PartId,
    pub name: String,
    pub price: Money,
    pub category: PartCategory,
    pub manufacturer_country: String,
    pub tags: Vec<String>,
}

impl Part {
    /// Creates an uncategorised part with no manufacturer details.
    pub fn new(id: PartId, name: impl Into<String>, price: Money) -> Self {
        Self {
            id,
            name: name.into(),
            price,
            category: PartCategory::Unknown,
            manufacturer_country: String::new(),
            tags: Vec::new(),
        }
    }

    pub fn with_category(mut self, category: PartCategory) -> Self {
        self.category = category;
        self
    }

    pub fn with_manufacturer_country(mut self, country: impl Into<String>) -> Self {
        self.manufacturer_country = country.into();
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }
}

/// Criteria for listing parts.
///
/// An empty criterion matches everything. A part matches a non-empty
/// criterion if it matches any of its values; all criteria must match.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PartsFilter {
    pub ids: Vec<PartId>,
    pub names: Vec<String>,
    pub categories: Vec<PartCategory>,
    pub manufacturer_countries: Vec<String>,
    pub tags: Vec<String>,
}

impl PartsFilter {
    /// Filter selecting a single part by id.
    pub fn by_id(id: PartId) -> Self {
        Self {
            ids: vec![id],
            ..Self::default()
        }
    }

    pub fn matches(&self, part: &Part) -> bool {
        (self.ids.is_empty() || self.ids.contains(&part.id))
            && (self.names.is_empty() || self.names.contains(&part.name))
            && (self.categories.is_empty() || self.categories.contains(&part.category))
            && (self.manufacturer_countries.is_empty()
                || self
                    .manufacturer_countries
                    .contains(&part.manufacturer_country))
            && (self.tags.is_empty() || part.tags.iter().any(|t| self.tags.contains(t)))
    }
}

/// Synchronous inventory collaborator.
#[async_trait]
pub trait PartLookup: Send + Sync {
    /// Lists the parts matching `filter`.
    async fn list_parts(&self, filter: &PartsFilter) -> Result<Vec<Part>, SagaError>;
}

#[derive(Debug, Default)]
struct InMemoryInventoryState {
    parts: HashMap<PartId, Part>,
    calls: usize,
    fail_on_list: bool,
    delay: Option<Duration>,
}

/// In-memory part catalog.
#[derive(Debug, Clone, Default)]
pub struct InMemoryPartLookup {
    state: Arc<RwLock<InMemoryInventoryState>>,
}

impl InMemoryPartLookup {
    /// Creates an empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a catalog holding `parts`.
    pub fn with_parts(parts: impl IntoIterator<Item = Part>) -> Self {
        let lookup = Self::new();
        for part in parts {
            lookup.insert(part);
        }
        lookup
    }

    /// Adds or replaces a part.
    pub fn insert(&self, part: Part) {
        self.write().parts.insert(part.id, part);
    }

    /// Configures the lookup to fail every call.
    pub fn set_fail_on_list(&self, fail: bool) {
        self.write().fail_on_list = fail;
    }

    /// Delays every call, to simulate a slow inventory.
    pub fn set_delay(&self, delay: Option<Duration>) {
        self.write().delay = delay;
    }

    /// Returns how many lookups were made.
    pub fn call_count(&self) -> usize {
        self.read().calls
    }

    fn read(&self) -> RwLockReadGuard<'_, InMemoryInventoryState> {
        self.state.read().unwrap_or_else(|p| p.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, InMemoryInventoryState> {
        self.state.write().unwrap_or_else(|p| p.into_inner())
    }
}

#[async_trait]
impl PartLookup for InMemoryPartLookup {
    async fn list_parts(&self, filter: &PartsFilter) -> Result<Vec<Part>, SagaError> {
        let delay = {
            let mut state = self.write();
            state.calls += 1;
            state.delay
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let state = self.read();
        if state.fail_on_list {
            return Err(SagaError::Inventory("inventory unavailable".to_string()));
        }

        let mut parts: Vec<Part> = state
            .parts
            .values()
            .filter(|p| filter.matches(p))
            .cloned()
            .collect();
        parts.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(parts)
    }
}
