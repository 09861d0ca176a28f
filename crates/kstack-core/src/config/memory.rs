//! In-memory config adapter for testing

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use super::{ConfigAdapter, ConfigValues};
use crate::error::Result;

/// Stores scopes in memory and counts operations for assertions
#[derive(Clone, Default)]
pub struct MemoryConfigAdapter {
    store: Arc<RwLock<HashMap<Option<String>, ConfigValues>>>,
    counts: Arc<RwLock<AdapterCounts>>,
    saved_scopes: Arc<RwLock<Vec<Option<String>>>>,
}

/// Counts of adapter operations performed
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct AdapterCounts {
    pub loads: usize,
    pub saves: usize,
}

impl MemoryConfigAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-populate a scope without counting it as a save
    pub fn seed(&self, scope: Option<&str>, values: ConfigValues) {
        self.store
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(scope.map(str::to_string), values);
    }

    /// Values currently stored for a scope
    pub fn stored(&self, scope: Option<&str>) -> Option<ConfigValues> {
        self.store
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&scope.map(str::to_string))
            .cloned()
    }

    pub fn counts(&self) -> AdapterCounts {
        self.counts.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Scopes passed to `save`, in call order
    pub fn saved_scopes(&self) -> Vec<Option<String>> {
        self.saved_scopes
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

#[async_trait]
impl ConfigAdapter for MemoryConfigAdapter {
    async fn load(&self, scope: Option<&str>) -> Result<ConfigValues> {
        self.counts.write().unwrap_or_else(|e| e.into_inner()).loads += 1;
        Ok(self.stored(scope).unwrap_or_default())
    }

    async fn save(&self, values: &ConfigValues, scope: Option<&str>) -> Result<()> {
        self.counts.write().unwrap_or_else(|e| e.into_inner()).saves += 1;
        self.saved_scopes
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push(scope.map(str::to_string));
        self.seed(scope, values.clone());
        Ok(())
    }
}
