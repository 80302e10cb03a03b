use std::collections::HashMap;

use tokio::sync::RwLock;

use crate::repository::{Catalog, CatalogError};

/// Process-wide cache of `(table, name) -> id` resolutions. Automation
/// definitions reference devices and actions by name on every tick; without
/// this each trigger and action would cost two extra catalog reads.
pub struct NameCache {
    entries: RwLock<HashMap<String, i32>>,
}

impl NameCache {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Returns the cached id for `table:name`, consulting the catalog on a
    /// miss. Concurrent misses for the same key may each query the catalog;
    /// both writes store the same id.
    pub async fn id_by_name(
        &self,
        catalog: &dyn Catalog,
        table: &str,
        name: &str,
    ) -> Result<i32, CatalogError> {
        let key = format!("{}:{}", table, name);

        let cached = self.entries.read().await.get(&key).copied();
        if let Some(id) = cached {
            return Ok(id);
        }

        let id = catalog.id_by_name(table, name).await?;
        self.entries.write().await.insert(key, id);
        Ok(id)
    }

    /// Clears every entry. Called after any catalog mutation; coarse but
    /// removes the whole class of stale-resolution bugs.
    pub async fn invalidate(&self) {
        self.entries.write().await.clear();
    }
}

impl Default for NameCache {
    fn default() -> Self {
        Self::new()
    }
}
