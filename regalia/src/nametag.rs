//! Overhead nametag backends
//!
//! The composer pushes every composed display through one [`NametagBackend`],
//! picked once at startup from `nametag.backend`.

use crate::config::{NametagBackendKind, RegaliaConfig};
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info};
use uuid::Uuid;

/// Capacity of the external renderer feed
const FEED_CAPACITY: usize = 256;

pub trait NametagBackend: Send + Sync {
    fn name(&self) -> &'static str;

    /// Show `text` above the identity
    fn sync_display(&self, id: Uuid, text: &str);

    /// Remove the identity's label
    fn clear(&self, id: Uuid);
}

/// Select the configured backend
pub fn from_config(config: &RegaliaConfig) -> Arc<dyn NametagBackend> {
    let backend: Arc<dyn NametagBackend> = match config.nametag.backend {
        NametagBackendKind::Native => Arc::new(NativeNametag::new(config.limits.max_label_width)),
        NametagBackendKind::External => Arc::new(ExternalNametag::new()),
    };
    info!("Using {} nametag backend", backend.name());
    backend
}

// ========== Native ==========

/// Labels kept in-process, hard-cut to the label width
pub struct NativeNametag {
    labels: DashMap<Uuid, String>,
    max_width: usize,
}

impl NativeNametag {
    pub fn new(max_width: usize) -> Self {
        Self {
            labels: DashMap::new(),
            max_width,
        }
    }

    pub fn label(&self, id: Uuid) -> Option<String> {
        self.labels.get(&id).map(|l| l.clone())
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

impl NametagBackend for NativeNametag {
    fn name(&self) -> &'static str {
        "native"
    }

    fn sync_display(&self, id: Uuid, text: &str) {
        let label: String = text.chars().take(self.max_width).collect();
        self.labels.insert(id, label);
    }

    fn clear(&self, id: Uuid) {
        self.labels.remove(&id);
    }
}

// ========== External ==========

/// Message published to an external renderer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NametagUpdate {
    Display { id: Uuid, text: String },
    Cleared { id: Uuid },
}

/// Labels forwarded untouched to subscribers
pub struct ExternalNametag {
    tx: broadcast::Sender<NametagUpdate>,
}

impl ExternalNametag {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(FEED_CAPACITY);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<NametagUpdate> {
        self.tx.subscribe()
    }

    fn publish(&self, update: NametagUpdate) {
        // Fails only when no renderer is subscribed
        if self.tx.send(update).is_err() {
            debug!("No external nametag renderer attached");
        }
    }
}

impl Default for ExternalNametag {
    fn default() -> Self {
        Self::new()
    }
}

impl NametagBackend for ExternalNametag {
    fn name(&self) -> &'static str {
        "external"
    }

    fn sync_display(&self, id: Uuid, text: &str) {
        self.publish(NametagUpdate::Display {
            id,
            text: text.to_string(),
        });
    }

    fn clear(&self, id: Uuid) {
        self.publish(NametagUpdate::Cleared { id });
    }
}
