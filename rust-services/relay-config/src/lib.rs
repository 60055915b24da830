//! Configuration management for the stream relay
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


use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;

/// Ingest base URL used when none is configured
pub const DEFAULT_INGEST_BASE_URL: &str = "rtmps://dc5-1.rtmp.t.me/s/";

/// How long a stopped encoder gets to exit before it is killed
pub const DEFAULT_STOP_GRACE_SECS: u64 = 5;

const ENV_PREFIX: &str = "RELAY";

/// Configuration loading errors
#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Console,
    Json,
}

/// Ingest endpoint configuration
#[derive(Debug, Clone)]
pub struct IngestConfig {
    /// Base URL the per-destination key is appended to
    pub base_url: String,
    /// Keys known at startup, by destination id
    pub initial_keys: HashMap<i64, String>,
}

/// External encoder configuration
#[derive(Debug, Clone)]
pub struct EncoderConfig {
    /// Path or name of the ffmpeg binary
    pub ffmpeg_path: String,
    /// Grace period between the terminate request and the forced kill
    pub stop_grace: Duration,
}

/// Identity the console front-end submits jobs as
#[derive(Debug, Clone)]
pub struct OwnerConfig {
    pub user_id: i64,
    pub username: String,
}

/// Application configuration
#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub ingest: IngestConfig,
    pub encoder: EncoderConfig,
    pub owner: OwnerConfig,
    /// Upper bound on a single notifier call
    pub notify_timeout: Duration,
    pub log_level: Option<String>,
    pub log_format: LogFormat,
}

/// Flat shape of the `RELAY_*` environment
#[derive(Debug, Deserialize)]
struct RawSettings {
    ingest_base_url: String,
    #[serde(default)]
    ingest_keys: Option<String>,
    ffmpeg_path: String,
    stop_grace_secs: u64,
    notify_timeout_secs: u64,
    log_level: String,
    log_format: LogFormat,
    owner_id: i64,
    owner_username: String,
}

impl RelayConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, SettingsError> {
        // Load .env file if it exists
        let _ = dotenvy::dotenv();

        Self::load()
    }

    fn load() -> Result<Self, SettingsError> {
        let raw: RawSettings = config::Config::builder()
            .set_default("ingest_base_url", DEFAULT_INGEST_BASE_URL)?
            .set_default("ffmpeg_path", "ffmpeg")?
            .set_default("stop_grace_secs", DEFAULT_STOP_GRACE_SECS)?
            .set_default("notify_timeout_secs", 10u64)?
            .set_default("log_level", "info")?
            .set_default("log_format", "console")?
            .set_default("owner_id", 0i64)?
            .set_default("owner_username", "owner")?
            .add_source(config::Environment::with_prefix(ENV_PREFIX).try_parsing(true))
            .build()?
            .try_deserialize()?;

        let initial_keys = match raw.ingest_keys.as_deref() {
            Some(list) => parse_key_list(list)?,
            None => HashMap::new(),
        };

        let config = Self {
            ingest: IngestConfig {
                base_url: raw.ingest_base_url,
                initial_keys,
            },
            encoder: EncoderConfig {
                ffmpeg_path: raw.ffmpeg_path,
                stop_grace: Duration::from_secs(raw.stop_grace_secs),
            },
            owner: OwnerConfig {
                user_id: raw.owner_id,
                username: raw.owner_username,
            },
            notify_timeout: Duration::from_secs(raw.notify_timeout_secs),
            log_level: Some(raw.log_level),
            log_format: raw.log_format,
        };

        config.validate()?;
        Ok(config)
    }

    /// Reject settings the relay cannot run with
    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.ingest.base_url.trim().is_empty() {
            return Err(SettingsError::Invalid(
                "ingest base URL must not be empty".to_string(),
            ));
        }
        if self.encoder.ffmpeg_path.trim().is_empty() {
            return Err(SettingsError::Invalid(
                "ffmpeg path must not be empty".to_string(),
            ));
        }
        if self.encoder.stop_grace.is_zero() {
            return Err(SettingsError::Invalid(
                "stop grace period must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Get log level, defaulting to "info"
    pub fn log_level(&self) -> &str {
        self.log_level.as_deref().unwrap_or("info")
    }
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            ingest: IngestConfig {
                base_url: DEFAULT_INGEST_BASE_URL.to_string(),
                initial_keys: HashMap::new(),
            },
            encoder: EncoderConfig {
                ffmpeg_path: "ffmpeg".to_string(),
                stop_grace: Duration::from_secs(DEFAULT_STOP_GRACE_SECS),
            },
            owner: OwnerConfig {
                user_id: 0,
                username: "owner".to_string(),
            },
            notify_timeout: Duration::from_secs(10),
            log_level: Some("info".to_string()),
            log_format: LogFormat::Console,
        }
    }
}

/// Parse `dest=key,dest=key`
fn parse_key_list(list: &str) -> Result<HashMap<i64, String>, SettingsError> {
    let mut keys = HashMap::new();
    for pair in list.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let (dest, key) = pair.split_once('=').ok_or_else(|| {
            SettingsError::Invalid(format!("ingest key entry '{}' is not dest=key", pair))
        })?;
        let dest: i64 = dest.trim().parse().map_err(|_| {
            SettingsError::Invalid(format!("ingest key destination '{}' is not a number", dest))
        })?;
        let key = key.trim();
        if key.is_empty() {
            return Err(SettingsError::Invalid(format!(
                "ingest key for destination {} is empty",
                dest
            )));
        }
        keys.insert(dest, key.to_string());
    }
    Ok(keys)
}
