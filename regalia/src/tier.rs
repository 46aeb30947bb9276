//! Permission tiers
//!
//! Resolves an identity's tier through an external permission service and
//! caches the answer for a short TTL. Capability checks are pure functions of
//! the tier name against the configured tier order.

use crate::config::TierConfig;
use crate::error::{RegaliaError, Result};
use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, warn};
use uuid::Uuid;

/// Backend that knows each identity's primary tier
#[async_trait]
pub trait PermissionService: Send + Sync {
    async fn primary_tier(&self, id: Uuid) -> Result<String>;
}

/// Fixed identity to tier table
pub struct StaticPermissions {
    tiers: HashMap<Uuid, String>,
    fallback: String,
}

impl StaticPermissions {
    pub fn new(tiers: HashMap<Uuid, String>, fallback: &str) -> Self {
        Self {
            tiers,
            fallback: fallback.to_string(),
        }
    }
}

#[async_trait]
impl PermissionService for StaticPermissions {
    async fn primary_tier(&self, id: Uuid) -> Result<String> {
        Ok(self.tiers.get(&id).cloned().unwrap_or_else(|| self.fallback.clone()))
    }
}

/// Capability gates derived from the tier order
#[derive(Debug, Clone)]
pub struct TierPolicy {
    order: Vec<String>,
    default_rank: usize,
    color: usize,
    gradient: usize,
    nickname: usize,
    prefix: usize,
}

impl TierPolicy {
    pub fn from_config(config: &TierConfig) -> Self {
        let order: Vec<String> = config.order.iter().map(|t| t.to_lowercase()).collect();
        let position = |tier: &str| {
            let tier = tier.to_lowercase();
            order.iter().position(|t| *t == tier)
        };

        let default_rank = position(&config.default_tier).unwrap_or(0);
        let rank_or_default = |tier: &str| position(tier).unwrap_or(default_rank);
        let caps = &config.capabilities;

        Self {
            color: rank_or_default(&caps.color),
            gradient: rank_or_default(&caps.gradient),
            nickname: rank_or_default(&caps.nickname),
            prefix: rank_or_default(&caps.prefix),
            default_rank,
            order,
        }
    }

    /// Position in the tier order; unknown tiers rank as the default tier
    pub fn rank(&self, tier: &str) -> usize {
        let tier = tier.to_lowercase();
        self.order
            .iter()
            .position(|t| *t == tier)
            .unwrap_or(self.default_rank)
    }

    pub fn top_tier(&self) -> &str {
        self.order.last().map(String::as_str).unwrap_or_default()
    }

    /// `tier` is at or above `required`
    pub fn meets(&self, tier: &str, required: &str) -> bool {
        self.rank(tier) >= self.rank(required)
    }

    pub fn can_use_color(&self, tier: &str) -> bool {
        self.rank(tier) >= self.color
    }

    pub fn can_use_gradient(&self, tier: &str) -> bool {
        self.rank(tier) >= self.gradient
    }

    pub fn can_use_nickname(&self, tier: &str) -> bool {
        self.rank(tier) >= self.nickname
    }

    pub fn can_use_prefix(&self, tier: &str) -> bool {
        self.rank(tier) >= self.prefix
    }

    /// Free-form prefixes and suffixes: top tier only
    pub fn can_use_custom_tag(&self, tier: &str) -> bool {
        !self.order.is_empty() && self.rank(tier) == self.order.len() - 1
    }
}

#[derive(Debug, Clone)]
struct CachedTier {
    tier: String,
    fetched_at: Instant,
}

/// TTL cache in front of a [`PermissionService`]
pub struct TierCache {
    service: Arc<dyn PermissionService>,
    entries: DashMap<Uuid, CachedTier>,
    ttl: RwLock<Duration>,
    default_tier: RwLock<String>,
    queries: AtomicU64,
}

impl TierCache {
    pub fn new(service: Arc<dyn PermissionService>, config: &TierConfig) -> Self {
        Self {
            service,
            entries: DashMap::new(),
            ttl: RwLock::new(config.ttl()),
            default_tier: RwLock::new(config.default_tier.clone()),
            queries: AtomicU64::new(0),
        }
    }

    /// Tier for `id`, served from cache while younger than the TTL
    pub async fn get_tier(&self, id: Uuid) -> String {
        let ttl = *self.ttl.read().await;
        if let Some(entry) = self.entries.get(&id) {
            if entry.fetched_at.elapsed() < ttl {
                return entry.tier.clone();
            }
        }

        self.queries.fetch_add(1, Ordering::Relaxed);
        match self.service.primary_tier(id).await {
            Ok(tier) => {
                debug!("Resolved tier for {}: {}", id, tier);
                self.entries.insert(
                    id,
                    CachedTier {
                        tier: tier.clone(),
                        fetched_at: Instant::now(),
                    },
                );
                tier
            }
            Err(e) => {
                let fallback = self.default_tier.read().await.clone();
                let e = match e {
                    RegaliaError::PermissionServiceUnavailable(_) => e,
                    other => RegaliaError::PermissionServiceUnavailable(other.to_string()),
                };
                warn!("Tier lookup for {} failed, using {}: {}", id, fallback, e);
                fallback
            }
        }
    }

    /// Forget one identity's cached tier
    pub fn invalidate(&self, id: Uuid) {
        self.entries.remove(&id);
    }

    /// Forget every cached tier
    pub fn clear_all(&self) {
        self.entries.clear();
    }

    /// Apply a reloaded configuration and drop every cached tier
    pub async fn reconfigure(&self, config: &TierConfig) {
        *self.ttl.write().await = config.ttl();
        *self.default_tier.write().await = config.default_tier.clone();
        self.clear_all();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of permission-service queries issued so far
    pub fn query_count(&self) -> u64 {
        self.queries.load(Ordering::Relaxed)
    }
}
