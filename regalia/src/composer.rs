//! Display composer
//!
//! Owns every mutation of a customization record and renders the composed
//! display string (`prefix name suffix`) handed to chat and nametags.
//!
//! Each `set_*` call runs, under the record's edit lock:
//! hooks, sanitize/normalize, validate, authorize, commit, save, notify.

use crate::cache::{EditGuard, PlayerDataCache, RecordHandle};
use crate::catalog::StyleOption;
use crate::color::{render_legacy, strip_colors, ColorSpec};
use crate::config::{ActiveConfig, ConfigHandle};
use crate::error::{RegaliaError, Result, ValidationFailure};
use crate::hooks::{ChangeKind, ChangeProposal, HookChain};
use crate::nametag::NametagBackend;
use crate::presence::PresenceHub;
use crate::record::CustomizationRecord;
use crate::tier::{TierCache, TierPolicy};
use crate::validation::{
    check_color_spec, check_identity_handle, check_nickname, check_prefix_or_suffix, sanitize,
};
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

/// Outcome of a committed change
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeReceipt {
    pub id: Uuid,
    pub kind: ChangeKind,
    pub old: Option<String>,
    /// Value as stored on the record
    pub new: Option<String>,
    pub composed: String,
    pub version: u64,
}

impl ChangeReceipt {
    /// The field had no value before this change
    pub fn is_initial(&self) -> bool {
        self.old.is_none()
    }
}

/// A validated, authorized value ready to commit
#[derive(Debug, Clone)]
struct Update {
    value: Option<String>,
    from_catalog: bool,
}

impl Update {
    fn clear() -> Self {
        Self {
            value: None,
            from_catalog: false,
        }
    }

    fn custom(value: String) -> Self {
        Self {
            value: Some(value),
            from_catalog: false,
        }
    }

    fn catalog(option: &StyleOption) -> Self {
        Self {
            value: Some(option.rendered.clone()),
            from_catalog: true,
        }
    }
}

pub struct DisplayComposer {
    config: Arc<ConfigHandle>,
    cache: Arc<PlayerDataCache>,
    tiers: Arc<TierCache>,
    hooks: Arc<HookChain>,
    nametag: Arc<dyn NametagBackend>,
    presence: Arc<PresenceHub>,
}

impl DisplayComposer {
    pub fn new(
        config: Arc<ConfigHandle>,
        cache: Arc<PlayerDataCache>,
        tiers: Arc<TierCache>,
        hooks: Arc<HookChain>,
        nametag: Arc<dyn NametagBackend>,
        presence: Arc<PresenceHub>,
    ) -> Self {
        Self {
            config,
            cache,
            tiers,
            hooks,
            nametag,
            presence,
        }
    }

    // ========== Mutations ==========

    /// Set or clear the name color: a catalog id, named, `#RRGGBB`, `a:b` or `rainbow`
    pub async fn set_color(&self, id: Uuid, spec: Option<&str>) -> Result<ChangeReceipt> {
        self.change(id, ChangeKind::Color, spec).await
    }

    pub async fn set_nickname(&self, id: Uuid, nickname: Option<&str>) -> Result<ChangeReceipt> {
        self.change(id, ChangeKind::Nickname, nickname).await
    }

    /// Set or clear the prefix: a catalog id, or free text for the top tier
    pub async fn set_prefix(&self, id: Uuid, prefix: Option<&str>) -> Result<ChangeReceipt> {
        self.change(id, ChangeKind::Prefix, prefix).await
    }

    /// Set or clear the suffix: a catalog id, or free text for the top tier
    pub async fn set_suffix(&self, id: Uuid, suffix: Option<&str>) -> Result<ChangeReceipt> {
        self.change(id, ChangeKind::Suffix, suffix).await
    }

    async fn change(&self, id: Uuid, kind: ChangeKind, value: Option<&str>) -> Result<ChangeReceipt> {
        loop {
            let handle = self.cache.get_or_create(id).await;
            let guard = handle.lock_edits().await;
            // Evicted while we waited for the lock; fetch the live record
            if handle.is_evicted() {
                continue;
            }
            if handle.is_fallback() {
                return Err(RegaliaError::StoreUnavailable(format!(
                    "record {} could not be loaded",
                    id
                )));
            }
            return self.change_locked(&handle, &guard, kind, value).await;
        }
    }

    async fn change_locked(
        &self,
        handle: &Arc<RecordHandle>,
        guard: &EditGuard<'_>,
        kind: ChangeKind,
        value: Option<&str>,
    ) -> Result<ChangeReceipt> {
        let id = handle.id();
        let active = self.config.current().await;
        let old = current_value(&handle.snapshot(), kind);

        let proposal = self.hooks.run(ChangeProposal {
            id,
            kind,
            old: old.clone(),
            new: value.map(str::to_string),
        })?;

        let requested = proposal
            .new
            .as_deref()
            .map(str::trim)
            .filter(|v| !v.is_empty());

        let update = match requested {
            None => Update::clear(),
            Some(value) => {
                let tier = self.tiers.get_tier(id).await;
                resolve(&active, kind, &tier, value)?
            }
        };

        let record = handle.commit(guard, |record| apply(record, kind, &update));
        self.cache.save(handle);

        let composed = compose(&record, active.config.limits.max_display_width);
        self.nametag.sync_display(id, &composed);
        self.presence.notify(id, &composed);

        info!("Updated {} for {}", kind, id);
        Ok(ChangeReceipt {
            id,
            kind,
            old,
            new: update.value,
            composed,
            version: handle.version(),
        })
    }

    // ========== Rendering ==========

    /// Current record for `id`, loading it if needed
    pub async fn record(&self, id: Uuid) -> Arc<CustomizationRecord> {
        self.cache.get_or_create(id).await.snapshot()
    }

    /// `prefix name suffix`, cut to the configured display width
    pub async fn compose_display(&self, id: Uuid) -> String {
        let width = self.config.current().await.config.limits.max_display_width;
        let record = self.record(id).await;
        compose(&record, width)
    }

    /// Colored name alone, cut to the configured display width
    pub async fn display_name(&self, id: Uuid) -> String {
        let width = self.config.current().await.config.limits.max_display_width;
        let record = self.record(id).await;
        truncate(&render_name(&record), width)
    }

    /// Push the current composed display to the nametag backend
    pub async fn refresh(&self, id: Uuid) -> String {
        let composed = self.compose_display(id).await;
        self.nametag.sync_display(id, &composed);
        composed
    }

    /// Remove the identity's nametag label
    pub fn clear_nametag(&self, id: Uuid) {
        self.nametag.clear(id);
    }
}

fn current_value(record: &CustomizationRecord, kind: ChangeKind) -> Option<String> {
    match kind {
        ChangeKind::Color => record.name_color.clone(),
        ChangeKind::Nickname => record.nickname.clone(),
        ChangeKind::Prefix => record.prefix().map(str::to_string),
        ChangeKind::Suffix => record.suffix.clone(),
    }
}

fn apply(record: &mut CustomizationRecord, kind: ChangeKind, update: &Update) {
    let value = update.value.clone();
    match kind {
        ChangeKind::Color => record.name_color = value,
        ChangeKind::Nickname => record.nickname = value,
        ChangeKind::Suffix => record.suffix = value,
        ChangeKind::Prefix => {
            if update.from_catalog {
                record.prefix_style = value;
                record.custom_prefix = None;
            } else if value.is_none() {
                record.prefix_style = None;
                record.custom_prefix = None;
            } else {
                record.custom_prefix = value;
            }
        }
    }
}

fn denied(kind: ChangeKind, tier: &str) -> RegaliaError {
    RegaliaError::PermissionDenied(format!("tier {} cannot change {}", tier, kind))
}

/// Effects need the gradient capability, solid colors the color capability
fn color_allowed(policy: &TierPolicy, tier: &str, spec: &ColorSpec) -> bool {
    if spec.is_effect() {
        policy.can_use_gradient(tier)
    } else {
        policy.can_use_color(tier)
    }
}

/// Normalize, validate and authorize a non-empty requested value
fn resolve(active: &ActiveConfig, kind: ChangeKind, tier: &str, value: &str) -> Result<Update> {
    let policy = &active.policy;
    let limits = &active.config.limits;

    match kind {
        ChangeKind::Color => {
            if let Some(option) = active.catalog.color(value) {
                let spec = ColorSpec::parse(&option.rendered)?
                    .ok_or_else(|| ValidationFailure::InvalidColor(option.rendered.clone()))?;
                if !policy.meets(tier, &option.tier) || !color_allowed(policy, tier, &spec) {
                    return Err(denied(kind, tier));
                }
                return Ok(Update::catalog(option));
            }

            check_color_spec(value)?;
            let spec = ColorSpec::parse(value)?
                .ok_or_else(|| ValidationFailure::InvalidColor(value.to_string()))?;
            if !color_allowed(policy, tier, &spec) {
                return Err(denied(kind, tier));
            }
            Ok(Update::custom(spec.to_string()))
        }

        ChangeKind::Nickname => {
            let nickname = sanitize(&strip_colors(value));
            check_nickname(&nickname, limits.nickname_min, limits.nickname_max)?;
            if limits.strict_nicknames {
                check_identity_handle(&nickname, limits.nickname_min, limits.nickname_max)?;
            }
            if !policy.can_use_nickname(tier) {
                return Err(denied(kind, tier));
            }
            Ok(Update::custom(nickname))
        }

        ChangeKind::Prefix | ChangeKind::Suffix => {
            let (option, min, max) = if kind == ChangeKind::Prefix {
                (active.catalog.prefix(value), limits.prefix_min, limits.prefix_max)
            } else {
                (active.catalog.suffix(value), limits.suffix_min, limits.suffix_max)
            };

            if let Some(option) = option {
                if !policy.can_use_prefix(tier) || !policy.meets(tier, &option.tier) {
                    return Err(denied(kind, tier));
                }
                return Ok(Update::catalog(option));
            }

            if !policy.can_use_custom_tag(tier) {
                return Err(ValidationFailure::UnknownStyle(value.to_string()).into());
            }

            let tag = sanitize(&render_legacy(value));
            check_prefix_or_suffix(&tag, min, max, &active.config.forbidden_words)?;
            Ok(Update::custom(tag))
        }
    }
}

/// Shown name, painted with the record's color if it parses
pub fn render_name(record: &CustomizationRecord) -> String {
    let name = record.shown_name();
    match record.name_color.as_deref().map(ColorSpec::parse) {
        Some(Ok(Some(spec))) => spec.paint(name),
        Some(Err(e)) => {
            debug!("Ignoring stored color for {}: {}", record.id, e);
            name.to_string()
        }
        _ => name.to_string(),
    }
}

/// Join the present parts with single spaces and hard-cut to `width` characters
pub fn compose(record: &CustomizationRecord, width: usize) -> String {
    let name = render_name(record);
    let composed = [record.prefix(), Some(name.as_str()), record.suffix.as_deref()]
        .into_iter()
        .flatten()
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ");
    truncate(&composed, width)
}

fn truncate(text: &str, width: usize) -> String {
    text.chars().take(width).collect()
}
