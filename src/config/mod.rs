//! # Configuration Management Module
//!
//! Centralized configuration for the command dispatcher: the command
//! surface (prefix, chunk size), the shared store connection, the TTL
//! knobs the lock manager and queue store rely on, and logging.
//!
//! ## Configuration Structure
//!
//! - [`DispatcherConfig`] - command parsing / chunking / timing knobs
//! - [`StoreConfig`] - connection details + TTLs for the shared key-value store
//! - [`LoggingConfig`] - logging level and optional log file
//!
//! ## Usage
//!
//! ```rust,no_run
//! use riddlebot_dispatch::config::Config;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("config.toml").await?;
//!     println!("prefix: {}", config.dispatcher.command_prefix);
//!     Config::create_default("config.toml").await?;
//!     Ok(())
//! }
//! ```

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use tokio::fs;

/// Allowed command prefixes. Arbitrary prefixes are rejected at load time to
/// keep accidental-trigger risk low, the same way meshbbs restricts
/// `public_command_prefix` to a hard-coded allowed set.
const ALLOWED_PREFIXES: &[&str] = &["/20q", "/q", "!20q", "20q"];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub dispatcher: DispatcherConfig,
    pub store: StoreConfig,
    pub logging: LoggingConfig,
    #[serde(default)]
    pub categories: CategoriesConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatcherConfig {
    /// Prefix the parser anchors on, e.g. `/20q`. Must be one of
    /// [`ALLOWED_PREFIXES`]; invalid values fall back to `/20q`.
    #[serde(default = "default_prefix")]
    pub command_prefix: String,
    /// Maximum rune count per outbound chunk.
    #[serde(default = "default_max_chunk_len")]
    pub max_chunk_len: usize,
    /// Deadline applied to every external (riddle service / LLM) call.
    #[serde(default = "default_ai_timeout_seconds")]
    pub ai_timeout_seconds: u64,
    /// Delay before the "delayed waiting" message is shown for Ask-kind commands.
    #[serde(default = "default_delayed_waiting_ms")]
    pub delayed_waiting_ms: u64,
    /// Safety bound on queue-drain iterations per `ProcessQueuedMessages` call.
    #[serde(default = "default_mq_max_queue_iterations")]
    pub mq_max_queue_iterations: u32,
    /// Messages dequeued per drain iteration.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Bounded pending-queue capacity per chat.
    #[serde(default = "default_queue_max")]
    pub queue_max: usize,
}

fn default_prefix() -> String {
    "/20q".to_string()
}
fn default_max_chunk_len() -> usize {
    900
}
fn default_ai_timeout_seconds() -> u64 {
    20
}
fn default_delayed_waiting_ms() -> u64 {
    5000
}
fn default_mq_max_queue_iterations() -> u32 {
    50
}
fn default_batch_size() -> usize {
    4
}
fn default_queue_max() -> usize {
    100
}

impl DispatcherConfig {
    /// Validate and normalize the configured prefix, matching the
    /// fallback-to-default behavior meshbbs applies to its own prefix field.
    pub fn effective_prefix(&self) -> &str {
        if ALLOWED_PREFIXES.contains(&self.command_prefix.as_str()) {
            &self.command_prefix
        } else {
            "/20q"
        }
    }
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            command_prefix: default_prefix(),
            max_chunk_len: default_max_chunk_len(),
            ai_timeout_seconds: default_ai_timeout_seconds(),
            delayed_waiting_ms: default_delayed_waiting_ms(),
            mq_max_queue_iterations: default_mq_max_queue_iterations(),
            batch_size: default_batch_size(),
            queue_max: default_queue_max(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// `redis://host:port/db`-style connection URL for the shared store.
    pub url: String,
    /// TTL for the exclusive write lock, milliseconds. Must exceed the
    /// expected maximum critical section length (slow LLM round trips).
    #[serde(default = "default_write_lock_ttl_ms")]
    pub write_lock_ttl_ms: u64,
    /// TTL for shared read-lock tokens, milliseconds.
    #[serde(default = "default_read_lock_ttl_ms")]
    pub read_lock_ttl_ms: u64,
    /// TTL for the per-chat processing flag, milliseconds.
    #[serde(default = "default_processing_flag_ttl_ms")]
    pub processing_flag_ttl_ms: u64,
    /// TTL for a per-(chat,user) chain-skip flag, milliseconds.
    #[serde(default = "default_chain_skip_ttl_ms")]
    pub chain_skip_ttl_ms: u64,
    /// TTL for queued pending messages (safety net), milliseconds.
    #[serde(default = "default_pending_ttl_ms")]
    pub pending_ttl_ms: u64,
    /// How long a lock acquisition attempt may block before failing with `LockError`.
    #[serde(default = "default_lock_acquire_timeout_ms")]
    pub lock_acquire_timeout_ms: u64,
}

fn default_write_lock_ttl_ms() -> u64 {
    30_000
}
fn default_read_lock_ttl_ms() -> u64 {
    30_000
}
fn default_processing_flag_ttl_ms() -> u64 {
    30_000
}
fn default_chain_skip_ttl_ms() -> u64 {
    120_000
}
fn default_pending_ttl_ms() -> u64 {
    600_000
}
fn default_lock_acquire_timeout_ms() -> u64 {
    250
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            url: "redis://127.0.0.1:6379/0".to_string(),
            write_lock_ttl_ms: default_write_lock_ttl_ms(),
            read_lock_ttl_ms: default_read_lock_ttl_ms(),
            processing_flag_ttl_ms: default_processing_flag_ttl_ms(),
            chain_skip_ttl_ms: default_chain_skip_ttl_ms(),
            pending_ttl_ms: default_pending_ttl_ms(),
            lock_acquire_timeout_ms: default_lock_acquire_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub file: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file.
    pub async fn load(path: &str) -> Result<Self> {
        let content = fs::read_to_string(path)
            .await
            .map_err(|e| anyhow!("Failed to read config file {}: {}", path, e))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| anyhow!("Failed to parse config file {}: {}", path, e))?;

        Ok(config)
    }

    /// Write a default configuration file to `path`.
    pub async fn create_default(path: &str) -> Result<()> {
        let config = Config::default();
        let content = toml::to_string_pretty(&config)
            .map_err(|e| anyhow!("Failed to serialize default config: {}", e))?;

        fs::write(path, content)
            .await
            .map_err(|e| anyhow!("Failed to write config file {}: {}", path, e))?;

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            dispatcher: DispatcherConfig::default(),
            store: StoreConfig::default(),
            logging: LoggingConfig::default(),
            categories: CategoriesConfig::default(),
        }
    }
}

/// Feature toggles for riddle categories, mirroring the shape of meshbbs's
/// `GamesConfig` (a flat set of per-game enable switches read once at
/// startup and consulted by the command handlers, not re-read per request).
/// The dispatcher itself never interprets category names; it only decides
/// whether a `Start { categories }` request is allowed to name a category
/// at all, leaving what a category *means* to the riddle service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoriesConfig {
    #[serde(default = "default_true")]
    pub animals_enabled: bool,
    #[serde(default = "default_true")]
    pub objects_enabled: bool,
    #[serde(default)]
    pub people_enabled: bool,
    /// Categories beyond the built-in set, keyed by name.
    #[serde(default)]
    pub custom: std::collections::HashMap<String, bool>,
}

fn default_true() -> bool {
    true
}

impl CategoriesConfig {
    /// Whether `Start` may request the named category. Unknown names
    /// default to disabled rather than silently falling through to "any
    /// category goes", the same conservative-default meshbbs applies to an
    /// unrecognized `GamesConfig` key.
    pub fn is_enabled(&self, category: &str) -> bool {
        match category {
            "animal" | "animals" => self.animals_enabled,
            "object" | "objects" => self.objects_enabled,
            "person" | "people" => self.people_enabled,
            other => self.custom.get(other).copied().unwrap_or(false),
        }
    }
}

impl Default for CategoriesConfig {
    fn default() -> Self {
        Self {
            animals_enabled: true,
            objects_enabled: true,
            people_enabled: false,
            custom: std::collections::HashMap::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn effective_prefix_falls_back_for_unknown_values() {
        let mut cfg = DispatcherConfig::default();
        cfg.command_prefix = "!!!".to_string();
        assert_eq!(cfg.effective_prefix(), "/20q");
    }

    #[test]
    fn effective_prefix_keeps_allowed_values() {
        let mut cfg = DispatcherConfig::default();
        cfg.command_prefix = "!20q".to_string();
        assert_eq!(cfg.effective_prefix(), "!20q");
    }

    #[test]
    fn default_config_serializes_round_trip() {
        let config = Config::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.dispatcher.command_prefix, config.dispatcher.command_prefix);
        assert_eq!(parsed.store.url, config.store.url);
    }

    #[test]
    fn categories_unknown_name_defaults_disabled() {
        let categories = CategoriesConfig::default();
        assert!(categories.is_enabled("animal"));
        assert!(!categories.is_enabled("nonexistent"));
    }

    #[test]
    fn categories_custom_override() {
        let mut categories = CategoriesConfig::default();
        categories.custom.insert("space".to_string(), true);
        assert!(categories.is_enabled("space"));
    }
}
