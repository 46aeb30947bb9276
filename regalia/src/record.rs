//! Customization records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A customization owner: stable id plus the handle it last connected with
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Identity {
    pub id: Uuid,
    pub username: String,
}

impl Identity {
    pub fn new(id: Uuid, username: impl Into<String>) -> Self {
        Self {
            id,
            username: username.into(),
        }
    }
}

/// Persisted display customizations for one identity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomizationRecord {
    pub id: Uuid,
    #[serde(default)]
    pub username: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nickname: Option<String>,
    /// Stored spec: named, `#RRGGBB`, `start:end` or `rainbow`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name_color: Option<String>,
    /// Catalog prefix, already rendered to legacy codes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prefix_style: Option<String>,
    /// Free-form prefix; wins over `prefix_style` when both are set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_prefix: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suffix: Option<String>,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

impl CustomizationRecord {
    /// Fresh record with no customizations
    pub fn new(id: Uuid) -> Self {
        Self {
            id,
            username: String::new(),
            nickname: None,
            name_color: None,
            prefix_style: None,
            custom_prefix: None,
            suffix: None,
            updated_at: Utc::now(),
        }
    }

    /// The prefix that is actually displayed
    pub fn prefix(&self) -> Option<&str> {
        self.custom_prefix
            .as_deref()
            .or(self.prefix_style.as_deref())
    }

    /// Nickname when set, otherwise the username
    pub fn shown_name(&self) -> &str {
        self.nickname.as_deref().unwrap_or(&self.username)
    }

    /// No customization fields are set
    pub fn is_empty(&self) -> bool {
        self.nickname.is_none()
            && self.name_color.is_none()
            && self.prefix_style.is_none()
            && self.custom_prefix.is_none()
            && self.suffix.is_none()
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_custom_prefix_wins() {
        let mut record = CustomizationRecord::new(Uuid::new_v4());
        assert!(record.is_empty());
        assert_eq!(record.prefix(), None);

        record.prefix_style = Some("§a[VIP]".into());
        assert_eq!(record.prefix(), Some("§a[VIP]"));

        record.custom_prefix = Some("§d[Me]".into());
        assert_eq!(record.prefix(), Some("§d[Me]"));
        assert!(!record.is_empty());
    }

    #[test]
    fn test_shown_name_prefers_nickname() {
        let mut record = CustomizationRecord::new(Uuid::new_v4());
        record.username = "Steve".into();
        assert_eq!(record.shown_name(), "Steve");
        record.nickname = Some("Nova".into());
        assert_eq!(record.shown_name(), "Nova");
    }

    #[test]
    fn test_sparse_json_deserializes() {
        let id = Uuid::new_v4();
        let json = format!(r#"{{"id":"{}","nickname":"Nova"}}"#, id);
        let record: CustomizationRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(record.id, id);
        assert_eq!(record.nickname.as_deref(), Some("Nova"));
        assert_eq!(record.username, "");
        assert!(record.suffix.is_none());
    }
}
