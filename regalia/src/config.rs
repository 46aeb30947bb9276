//! Regalia configuration
//!
//! Loaded once at startup from YAML and swapped wholesale on reload.

use crate::catalog::StyleCatalog;
use crate::error::{RegaliaError, Result};
use crate::tier::TierPolicy;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RegaliaConfig {
    #[serde(default)]
    pub tiers: TierConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub limits: LimitsConfig,
    /// Case-insensitive substrings rejected in prefixes and suffixes
    #[serde(default)]
    pub forbidden_words: Vec<String>,
    #[serde(default)]
    pub nametag: NametagConfig,
    #[serde(default)]
    pub catalog: CatalogConfig,
    /// Fixed tier assignments used by the standalone daemon
    #[serde(default)]
    pub static_tiers: HashMap<Uuid, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TierConfig {
    #[serde(default = "default_tier_ttl")]
    pub ttl_ms: u64,
    #[serde(default = "default_tier_name")]
    pub default_tier: String,
    /// Lowest to highest
    #[serde(default = "default_tier_order")]
    pub order: Vec<String>,
    #[serde(default)]
    pub capabilities: CapabilityTable,
}

impl Default for TierConfig {
    fn default() -> Self {
        Self {
            ttl_ms: default_tier_ttl(),
            default_tier: default_tier_name(),
            order: default_tier_order(),
            capabilities: CapabilityTable::default(),
        }
    }
}

impl TierConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_millis(self.ttl_ms)
    }
}

fn default_tier_ttl() -> u64 { 5000 }
fn default_tier_name() -> String { "member".into() }
fn default_tier_order() -> Vec<String> {
    ["member", "supporter", "vip", "mvp", "legend"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

/// Minimum tier for each capability. Custom tags are always top-tier only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapabilityTable {
    #[serde(default = "default_color_tier")]
    pub color: String,
    #[serde(default = "default_gradient_tier")]
    pub gradient: String,
    #[serde(default = "default_nickname_tier")]
    pub nickname: String,
    #[serde(default = "default_prefix_tier")]
    pub prefix: String,
}

impl Default for CapabilityTable {
    fn default() -> Self {
        Self {
            color: default_color_tier(),
            gradient: default_gradient_tier(),
            nickname: default_nickname_tier(),
            prefix: default_prefix_tier(),
        }
    }
}

fn default_color_tier() -> String { "supporter".into() }
fn default_gradient_tier() -> String { "mvp".into() }
fn default_nickname_tier() -> String { "vip".into() }
fn default_prefix_tier() -> String { "vip".into() }

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Grace period after an identity goes inactive before eviction
    #[serde(default = "default_idle_eviction")]
    pub idle_eviction_secs: u64,
    #[serde(default = "default_save_retries")]
    pub save_retries: u32,
    #[serde(default = "default_retry_backoff")]
    pub retry_backoff_ms: u64,
    #[serde(default = "default_flush_interval")]
    pub flush_interval_secs: u64,
    /// Concurrent store operations
    #[serde(default = "default_io_workers")]
    pub io_workers: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            idle_eviction_secs: default_idle_eviction(),
            save_retries: default_save_retries(),
            retry_backoff_ms: default_retry_backoff(),
            flush_interval_secs: default_flush_interval(),
            io_workers: default_io_workers(),
        }
    }
}

impl CacheConfig {
    pub fn idle_grace(&self) -> Duration {
        Duration::from_secs(self.idle_eviction_secs)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    pub fn flush_interval(&self) -> Duration {
        Duration::from_secs(self.flush_interval_secs.max(1))
    }
}

fn default_idle_eviction() -> u64 { 30 }
fn default_save_retries() -> u32 { 3 }
fn default_retry_backoff() -> u64 { 250 }
fn default_flush_interval() -> u64 { 60 }
fn default_io_workers() -> usize { 4 }

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    #[serde(default = "default_nickname_min")]
    pub nickname_min: usize,
    #[serde(default = "default_nickname_max")]
    pub nickname_max: usize,
    /// Nicknames must also look like an identity handle (`[A-Za-z0-9_]`)
    #[serde(default = "default_true")]
    pub strict_nicknames: bool,
    #[serde(default = "default_tag_min")]
    pub prefix_min: usize,
    #[serde(default = "default_tag_max")]
    pub prefix_max: usize,
    #[serde(default = "default_tag_min")]
    pub suffix_min: usize,
    #[serde(default = "default_tag_max")]
    pub suffix_max: usize,
    /// Hard cut applied to the composed display string
    #[serde(default = "default_width")]
    pub max_display_width: usize,
    /// Hard cut applied to overhead labels by the native nametag backend
    #[serde(default = "default_width")]
    pub max_label_width: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            nickname_min: default_nickname_min(),
            nickname_max: default_nickname_max(),
            strict_nicknames: true,
            prefix_min: default_tag_min(),
            prefix_max: default_tag_max(),
            suffix_min: default_tag_min(),
            suffix_max: default_tag_max(),
            max_display_width: default_width(),
            max_label_width: default_width(),
        }
    }
}

fn default_nickname_min() -> usize { 3 }
fn default_nickname_max() -> usize { 16 }
fn default_tag_min() -> usize { 1 }
fn default_tag_max() -> usize { 16 }
fn default_width() -> usize { 64 }
fn default_true() -> bool { true }

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct NametagConfig {
    #[serde(default)]
    pub backend: NametagBackendKind,
}

/// Which overhead-label renderer receives composed displays
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum NametagBackendKind {
    /// Labels are kept and truncated in-process
    #[default]
    Native,
    /// Labels are published to an external renderer
    External,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogConfig {
    #[serde(default)]
    pub colors: Vec<StyleEntry>,
    #[serde(default)]
    pub prefixes: Vec<StyleEntry>,
    #[serde(default)]
    pub suffixes: Vec<StyleEntry>,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            colors: vec![
                StyleEntry::new("red", "Red", "red", "supporter"),
                StyleEntry::new("gold", "Gold", "gold", "supporter"),
                StyleEntry::new("aqua", "Aqua", "aqua", "supporter"),
                StyleEntry::new("sunset", "Sunset", "#FF5F6D:#FFC371", "mvp"),
                StyleEntry::new("rainbow", "Rainbow", "rainbow", "legend"),
            ],
            prefixes: vec![
                StyleEntry::new("vip", "VIP", "&a[VIP]", "vip"),
                StyleEntry::new("mvp", "MVP", "&b[MVP]", "mvp"),
                StyleEntry::new("legend", "Legend", "<gradient:gold:red>[LEGEND]</gradient>", "legend"),
            ],
            suffixes: vec![
                StyleEntry::new("star", "Star", "&e*", "vip"),
                StyleEntry::new("crown", "Crown", "&6[+]", "mvp"),
            ],
        }
    }
}

/// Raw catalog entry as written in the config file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StyleEntry {
    pub id: String,
    pub label: String,
    pub value: String,
    #[serde(default = "default_tier_name")]
    pub tier: String,
}

impl StyleEntry {
    pub fn new(id: &str, label: &str, value: &str, tier: &str) -> Self {
        Self {
            id: id.to_string(),
            label: label.to_string(),
            value: value.to_string(),
            tier: tier.to_string(),
        }
    }
}

/// Load configuration, falling back to defaults when the file is absent
pub fn load_config(path: &Path) -> Result<RegaliaConfig> {
    if path.exists() {
        let contents = std::fs::read_to_string(path)?;
        let config: RegaliaConfig = serde_yaml::from_str(&contents)?;
        config.check()?;
        Ok(config)
    } else {
        Ok(RegaliaConfig::default())
    }
}

impl RegaliaConfig {
    /// Reject configurations whose tier references cannot be resolved
    pub fn check(&self) -> Result<()> {
        if self.tiers.order.is_empty() {
            return Err(RegaliaError::Config("tiers.order must not be empty".into()));
        }
        let known = |tier: &str| self.tiers.order.iter().any(|t| t == tier);
        if !known(&self.tiers.default_tier) {
            return Err(RegaliaError::Config(format!(
                "default tier {:?} is not listed in tiers.order",
                self.tiers.default_tier
            )));
        }
        let caps = &self.tiers.capabilities;
        for tier in [&caps.color, &caps.gradient, &caps.nickname, &caps.prefix] {
            if !known(tier) {
                return Err(RegaliaError::Config(format!(
                    "capability tier {:?} is not listed in tiers.order",
                    tier
                )));
            }
        }
        if self.limits.nickname_min > self.limits.nickname_max
            || self.limits.prefix_min > self.limits.prefix_max
            || self.limits.suffix_min > self.limits.suffix_max
        {
            return Err(RegaliaError::Config("length limits have min > max".into()));
        }
        Ok(())
    }
}

/// Configuration plus everything derived from it
#[derive(Debug)]
pub struct ActiveConfig {
    pub config: RegaliaConfig,
    pub catalog: StyleCatalog,
    pub policy: TierPolicy,
}

impl ActiveConfig {
    pub fn build(config: RegaliaConfig) -> Self {
        let catalog = StyleCatalog::build(&config.catalog);
        let policy = TierPolicy::from_config(&config.tiers);
        Self { config, catalog, policy }
    }
}

/// Shared, swappable view of the active configuration
pub struct ConfigHandle {
    active: RwLock<Arc<ActiveConfig>>,
}

impl ConfigHandle {
    pub fn new(config: RegaliaConfig) -> Self {
        Self {
            active: RwLock::new(Arc::new(ActiveConfig::build(config))),
        }
    }

    /// Current configuration snapshot
    pub async fn current(&self) -> Arc<ActiveConfig> {
        self.active.read().await.clone()
    }

    /// Replace the configuration and rebuild the catalog
    pub async fn replace(&self, config: RegaliaConfig) -> Arc<ActiveConfig> {
        let active = Arc::new(ActiveConfig::build(config));
        *self.active.write().await = active.clone();
        active
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_consistent() {
        let config = RegaliaConfig::default();
        config.check().unwrap();
        assert_eq!(config.tiers.ttl(), Duration::from_secs(5));
        assert_eq!(config.limits.max_display_width, 64);
        assert_eq!(config.tiers.default_tier, "member");
    }

    #[test]
    fn test_partial_yaml_fills_defaults() {
        let yaml = r#"
tiers:
  ttl_ms: 1000
limits:
  nickname_max: 12
forbidden_words: ["badword"]
nametag:
  backend: external
"#;
        let config: RegaliaConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.tiers.ttl_ms, 1000);
        assert_eq!(config.tiers.order.len(), 5);
        assert_eq!(config.limits.nickname_max, 12);
        assert_eq!(config.limits.nickname_min, 3);
        assert_eq!(config.nametag.backend, NametagBackendKind::External);
        assert_eq!(config.forbidden_words, vec!["badword".to_string()]);
    }

    #[test]
    fn test_check_rejects_unknown_capability_tier() {
        let mut config = RegaliaConfig::default();
        config.tiers.capabilities.gradient = "emperor".into();
        assert!(matches!(config.check(), Err(RegaliaError::Config(_))));
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config(&dir.path().join("absent.yaml")).unwrap();
        assert_eq!(config.cache.save_retries, 3);
    }

    #[tokio::test]
    async fn test_replace_swaps_catalog() {
        let handle = ConfigHandle::new(RegaliaConfig::default());
        assert!(handle.current().await.catalog.prefix("vip").is_some());

        let mut config = RegaliaConfig::default();
        config.catalog.prefixes.clear();
        handle.replace(config).await;
        assert!(handle.current().await.catalog.prefix("vip").is_none());
    }
}
