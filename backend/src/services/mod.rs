use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;

use crate::cache::NameCache;
use crate::repository::Catalog;

pub mod automation;
pub mod conditions;
pub mod execute;
pub mod rpc;

#[cfg(test)]
pub(crate) mod testutil;

/// The automation engine. Owns the name cache, the per-device lock table and
/// the HTTP client; every device RPC in the process goes through it.
pub struct Engine {
    catalog: Arc<dyn Catalog>,
    names: NameCache,
    device_locks: Mutex<HashMap<i32, Arc<Mutex<()>>>>,
    http: reqwest::Client,
}

impl Engine {
    pub fn new(catalog: Arc<dyn Catalog>) -> Self {
        // The timeout covers connect and response read for a single RPC.
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .expect("Failed to build HTTP client");

        Self {
            catalog,
            names: NameCache::new(),
            device_locks: Mutex::new(HashMap::new()),
            http,
        }
    }

    /// Drops every cached name resolution. Wired to catalog mutations by the
    /// REST layer.
    pub async fn invalidate_names(&self) {
        self.names.invalidate().await;
    }
}
