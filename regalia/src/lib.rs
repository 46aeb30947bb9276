//! # Regalia
//!
//! Display customizations worn by an identity: a colored name, an optional
//! nickname, and prefix/suffix badges, gated by permission tier.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                      RegaliaContext                          │
//! │                                                              │
//! │   set_* ──► HookChain ──► validation ──► TierPolicy          │
//! │      │                                        │              │
//! │      ▼                                        ▼              │
//! │  DisplayComposer ◄──── TierCache ◄──── PermissionService     │
//! │      │                                                       │
//! │      ├──► PlayerDataCache ──► save queue ──► Store           │
//! │      │                                                       │
//! │      └──► NametagBackend, PresenceHub listeners              │
//! └──────────────────────────────────────────────────────────────┘
//! ```

pub mod cache;
pub mod catalog;
pub mod color;
pub mod composer;
pub mod config;
pub mod context;
pub mod error;
pub mod hooks;
pub mod nametag;
pub mod presence;
pub mod record;
pub mod store;
pub mod tier;
pub mod validation;

pub use cache::{PlayerDataCache, RecordHandle, RecordState};
pub use catalog::{StyleCatalog, StyleCategory, StyleOption};
pub use color::{ColorSpec, NamedColor, Rgb, TextColor};
pub use composer::{ChangeReceipt, DisplayComposer};
pub use config::{load_config, RegaliaConfig};
pub use context::RegaliaContext;
pub use error::{RegaliaError, Result, ValidationFailure};
pub use hooks::{ChangeKind, ChangeProposal, HookChain, HookDecision, PreCommitHook};
pub use nametag::NametagBackend;
pub use presence::{DisplayListener, Placeholder, PlaceholderResolver, PresenceHub};
pub use record::{CustomizationRecord, Identity};
pub use store::{CustomizationStore, JsonFileStore, MemoryStore};
pub use tier::{PermissionService, StaticPermissions, TierCache, TierPolicy};
