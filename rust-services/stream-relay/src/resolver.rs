//! Destination → ingest URL resolution
// Copyright 2025 Francisco F. Pinochet
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.


use relay_config::IngestConfig;
use relay_types::{ConfigError, DestinationId};
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};
use tracing::info;

/// Maps destinations to ingest URLs using per-destination stream keys.
///
/// Keys live in memory for the lifetime of the process.
pub struct DestinationResolver {
    base_url: String,
    keys: RwLock<HashMap<DestinationId, String>>,
}

impl DestinationResolver {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            keys: RwLock::new(HashMap::new()),
        }
    }

    /// Create a resolver seeded with the configured keys
    pub fn from_config(config: &IngestConfig) -> Self {
        let keys = config
            .initial_keys
            .iter()
            .map(|(dest, key)| (DestinationId(*dest), key.clone()))
            .collect();

        Self {
            base_url: config.base_url.clone(),
            keys: RwLock::new(keys),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Set or replace the stream key of a destination
    pub fn set_key(&self, destination: DestinationId, key: impl Into<String>) {
        let mut keys = self.keys.write().unwrap_or_else(PoisonError::into_inner);
        keys.insert(destination, key.into());
        info!(destination = %destination, "Stream key configured");
    }

    /// Forget the stream key of a destination. Returns whether one was set.
    pub fn remove_key(&self, destination: DestinationId) -> bool {
        let mut keys = self.keys.write().unwrap_or_else(PoisonError::into_inner);
        keys.remove(&destination).is_some()
    }

    pub fn has_key(&self, destination: DestinationId) -> bool {
        let keys = self.keys.read().unwrap_or_else(PoisonError::into_inner);
        keys.contains_key(&destination)
    }

    /// Fully qualified ingest URL for `destination`
    pub fn resolve(&self, destination: DestinationId) -> Result<String, ConfigError> {
        let keys = self.keys.read().unwrap_or_else(PoisonError::into_inner);
        match keys.get(&destination) {
            Some(key) => Ok(format!("{}/{}", self.base_url.trim_end_matches('/'), key)),
            None => Err(ConfigError::NoKeyConfigured(destination)),
        }
    }
}
