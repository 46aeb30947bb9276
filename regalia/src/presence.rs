//! Presence and chat collaborators
//!
//! Listeners are told whenever an identity's composed display changes, and
//! can query individual display fields by placeholder key.

use crate::composer::DisplayComposer;
use std::sync::{Arc, PoisonError, RwLock};
use uuid::Uuid;

/// Receives every composed display after a committed change
pub trait DisplayListener: Send + Sync {
    fn on_display_changed(&self, id: Uuid, composed: &str);
}

impl<F> DisplayListener for F
where
    F: Fn(Uuid, &str) + Send + Sync,
{
    fn on_display_changed(&self, id: Uuid, composed: &str) {
        self(id, composed)
    }
}

#[derive(Default)]
pub struct PresenceHub {
    listeners: RwLock<Vec<Arc<dyn DisplayListener>>>,
}

impl PresenceHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, listener: Arc<dyn DisplayListener>) {
        self.listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(listener);
    }

    pub fn notify(&self, id: Uuid, composed: &str) {
        let listeners = self
            .listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        for listener in listeners {
            listener.on_display_changed(id, composed);
        }
    }
}

/// Named display fields exposed to chat formats and scoreboards
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placeholder {
    Prefix,
    Suffix,
    Nickname,
    NameColor,
    Username,
    DisplayName,
    ComposedDisplay,
}

impl Placeholder {
    pub const ALL: [Placeholder; 7] = [
        Placeholder::Prefix,
        Placeholder::Suffix,
        Placeholder::Nickname,
        Placeholder::NameColor,
        Placeholder::Username,
        Placeholder::DisplayName,
        Placeholder::ComposedDisplay,
    ];

    pub fn key(self) -> &'static str {
        match self {
            Placeholder::Prefix => "prefix",
            Placeholder::Suffix => "suffix",
            Placeholder::Nickname => "nickname",
            Placeholder::NameColor => "name_color",
            Placeholder::Username => "username",
            Placeholder::DisplayName => "display_name",
            Placeholder::ComposedDisplay => "composed_display",
        }
    }

    /// Case-insensitive; accepts camelCase spellings too
    pub fn from_key(key: &str) -> Option<Self> {
        let normalized: String = key
            .trim()
            .chars()
            .filter(|c| *c != '_' && *c != '-')
            .map(|c| c.to_ascii_lowercase())
            .collect();
        Self::ALL
            .iter()
            .copied()
            .find(|p| p.key().replace('_', "") == normalized)
    }
}

/// Resolves placeholder keys against the composer's records
pub struct PlaceholderResolver {
    composer: Arc<DisplayComposer>,
}

impl PlaceholderResolver {
    pub fn new(composer: Arc<DisplayComposer>) -> Self {
        Self { composer }
    }

    /// Value for `key`, empty when the field is unset; `None` for unknown keys
    pub async fn resolve(&self, id: Uuid, key: &str) -> Option<String> {
        let placeholder = Placeholder::from_key(key)?;

        let value = match placeholder {
            Placeholder::DisplayName => self.composer.display_name(id).await,
            Placeholder::ComposedDisplay => self.composer.compose_display(id).await,
            field => {
                let record = self.composer.record(id).await;
                match field {
                    Placeholder::Prefix => record.prefix().unwrap_or_default().to_string(),
                    Placeholder::Suffix => record.suffix.clone().unwrap_or_default(),
                    Placeholder::Nickname => record.nickname.clone().unwrap_or_default(),
                    Placeholder::NameColor => record.name_color.clone().unwrap_or_default(),
                    _ => record.username.clone(),
                }
            }
        };
        Some(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn test_placeholder_keys() {
        for placeholder in Placeholder::ALL {
            assert_eq!(Placeholder::from_key(placeholder.key()), Some(placeholder));
        }
        assert_eq!(Placeholder::from_key("nameColor"), Some(Placeholder::NameColor));
        assert_eq!(
            Placeholder::from_key("COMPOSED_DISPLAY"),
            Some(Placeholder::ComposedDisplay)
        );
        assert_eq!(Placeholder::from_key("balance"), None);
    }

    #[test]
    fn test_hub_notifies_all_listeners() {
        let hub = PresenceHub::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        for _ in 0..2 {
            let seen = seen.clone();
            hub.register(Arc::new(move |id: Uuid, text: &str| {
                seen.lock().unwrap().push((id, text.to_string()));
            }));
        }

        let id = Uuid::new_v4();
        hub.notify(id, "§cNova");
        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0], (id, "§cNova".to_string()));
    }
}
