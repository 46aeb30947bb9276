//! Regalia context
//!
//! Builds every component once and hands out shared references. Hosts keep
//! one `RegaliaContext` for the lifetime of the process.

use crate::cache::PlayerDataCache;
use crate::composer::DisplayComposer;
use crate::config::{ActiveConfig, ConfigHandle, RegaliaConfig};
use crate::error::Result;
use crate::hooks::HookChain;
use crate::nametag::{self, NametagBackend};
use crate::presence::{PlaceholderResolver, PresenceHub};
use crate::record::Identity;
use crate::store::CustomizationStore;
use crate::tier::{PermissionService, TierCache};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::task::JoinHandle;
use tracing::{debug, info};
use uuid::Uuid;

pub struct RegaliaContext {
    config: Arc<ConfigHandle>,
    cache: Arc<PlayerDataCache>,
    tiers: Arc<TierCache>,
    hooks: Arc<HookChain>,
    presence: Arc<PresenceHub>,
    nametag: Arc<dyn NametagBackend>,
    composer: Arc<DisplayComposer>,
    placeholders: PlaceholderResolver,
    maintenance: Mutex<Option<JoinHandle<()>>>,
}

impl RegaliaContext {
    /// Validate the configuration and wire up every component.
    /// Must run inside a Tokio runtime.
    pub fn new(
        config: RegaliaConfig,
        store: Arc<dyn CustomizationStore>,
        permissions: Arc<dyn PermissionService>,
    ) -> Result<Self> {
        config.check()?;

        let nametag = nametag::from_config(&config);
        let cache = Arc::new(PlayerDataCache::new(store, config.cache.clone()));
        let tiers = Arc::new(TierCache::new(permissions, &config.tiers));
        let hooks = Arc::new(HookChain::new());
        let presence = Arc::new(PresenceHub::new());
        let config = Arc::new(ConfigHandle::new(config));

        let composer = Arc::new(DisplayComposer::new(
            config.clone(),
            cache.clone(),
            tiers.clone(),
            hooks.clone(),
            nametag.clone(),
            presence.clone(),
        ));
        let placeholders = PlaceholderResolver::new(composer.clone());

        Ok(Self {
            config,
            cache,
            tiers,
            hooks,
            presence,
            nametag,
            composer,
            placeholders,
            maintenance: Mutex::new(None),
        })
    }

    // ========== Accessors ==========

    pub fn composer(&self) -> &Arc<DisplayComposer> {
        &self.composer
    }

    pub fn cache(&self) -> &Arc<PlayerDataCache> {
        &self.cache
    }

    pub fn tiers(&self) -> &Arc<TierCache> {
        &self.tiers
    }

    pub fn hooks(&self) -> &Arc<HookChain> {
        &self.hooks
    }

    pub fn presence(&self) -> &Arc<PresenceHub> {
        &self.presence
    }

    pub fn nametag(&self) -> &Arc<dyn NametagBackend> {
        &self.nametag
    }

    pub fn placeholders(&self) -> &PlaceholderResolver {
        &self.placeholders
    }

    pub async fn config(&self) -> Arc<ActiveConfig> {
        self.config.current().await
    }

    // ========== Lifecycle ==========

    /// Identity connected: load its record and show its nametag
    pub async fn activate(&self, identity: &Identity) -> String {
        self.cache.activate(identity).await;
        let composed = self.composer.refresh(identity.id).await;
        debug!("Activated {} ({})", identity.username, identity.id);
        composed
    }

    /// Identity disconnected: hide its nametag and start the eviction grace period
    pub fn deactivate(&self, id: Uuid) {
        self.composer.clear_nametag(id);
        self.cache.deactivate(id);
    }

    /// Swap in a new configuration and drop every cache
    pub async fn reload(&self, config: RegaliaConfig) -> Result<()> {
        config.check()?;

        let cache_config = config.cache.clone();
        let tier_config = config.tiers.clone();
        let active = self.config.replace(config).await;

        self.tiers.reconfigure(&tier_config).await;
        self.cache.reconfigure(cache_config);
        self.cache.reload().await;

        info!(
            "Configuration reloaded: {} catalog styles, {} tiers",
            active.catalog.len(),
            active.config.tiers.order.len()
        );
        Ok(())
    }

    /// Write every dirty record now
    pub async fn flush(&self) -> usize {
        self.cache.flush_all().await
    }

    /// Run the periodic flush and idle sweep until shutdown
    pub async fn spawn_maintenance(self: &Arc<Self>) {
        let period = self.config.current().await.config.cache.flush_interval();
        let context = Arc::downgrade(self);

        let task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            // First tick completes immediately
            interval.tick().await;

            loop {
                interval.tick().await;
                let Some(context) = context.upgrade() else {
                    break;
                };
                let evicted = context.cache.sweep_idle().await;
                let flushed = context.cache.flush_all().await;
                debug!("Maintenance: {} evicted, {} flushed", evicted, flushed);
            }
        });

        info!("Maintenance started with {}s interval", period.as_secs());
        let previous = self
            .maintenance
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(task);
        if let Some(previous) = previous {
            previous.abort();
        }
    }

    /// Stop maintenance, drain queued saves and flush everything dirty
    pub async fn shutdown(&self) {
        info!("Shutting down, draining pending saves...");
        let task = self
            .maintenance
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(task) = task {
            task.abort();
        }
        self.cache.shutdown().await;
    }
}
