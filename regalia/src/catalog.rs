//! Style catalog
//!
//! Immutable set of predefined colors, prefixes and suffixes, each gated by a
//! minimum tier. Rebuilt wholesale from configuration on every reload.

use crate::color::{render_legacy, strip_colors, ColorSpec};
use crate::config::{CatalogConfig, StyleEntry};
use crate::tier::TierPolicy;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, warn};

/// Which customization slot an option fills
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StyleCategory {
    Color,
    Prefix,
    Suffix,
}

impl StyleCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            StyleCategory::Color => "color",
            StyleCategory::Prefix => "prefix",
            StyleCategory::Suffix => "suffix",
        }
    }
}

/// One catalog entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StyleOption {
    pub id: String,
    pub label: String,
    /// Value as written in configuration
    pub value: String,
    /// Value stored on a record: a canonical color spec or legacy-coded text
    pub rendered: String,
    pub tier: String,
    pub category: StyleCategory,
}

#[derive(Debug, Default)]
pub struct StyleCatalog {
    colors: Vec<StyleOption>,
    prefixes: Vec<StyleOption>,
    suffixes: Vec<StyleOption>,
    index: HashMap<(StyleCategory, String), usize>,
}

impl StyleCatalog {
    /// Build from configuration, skipping entries that do not parse
    pub fn build(config: &CatalogConfig) -> Self {
        let mut catalog = Self::default();

        for (category, entries) in [
            (StyleCategory::Color, &config.colors),
            (StyleCategory::Prefix, &config.prefixes),
            (StyleCategory::Suffix, &config.suffixes),
        ] {
            for entry in entries {
                match build_option(category, entry) {
                    Some(option) => catalog.insert(option),
                    None => warn!(
                        "Skipping invalid {} style {:?}: {:?}",
                        category.as_str(),
                        entry.id,
                        entry.value
                    ),
                }
            }
        }

        debug!(
            "Built style catalog: {} colors, {} prefixes, {} suffixes",
            catalog.colors.len(),
            catalog.prefixes.len(),
            catalog.suffixes.len()
        );
        catalog
    }

    fn insert(&mut self, option: StyleOption) {
        let key = (option.category, option.id.to_lowercase());
        if self.index.contains_key(&key) {
            warn!("Duplicate {} style id {:?}, keeping the first", option.category.as_str(), option.id);
            return;
        }
        let list = self.list_mut(option.category);
        list.push(option);
        let position = list.len() - 1;
        self.index.insert(key, position);
    }

    fn list(&self, category: StyleCategory) -> &Vec<StyleOption> {
        match category {
            StyleCategory::Color => &self.colors,
            StyleCategory::Prefix => &self.prefixes,
            StyleCategory::Suffix => &self.suffixes,
        }
    }

    fn list_mut(&mut self, category: StyleCategory) -> &mut Vec<StyleOption> {
        match category {
            StyleCategory::Color => &mut self.colors,
            StyleCategory::Prefix => &mut self.prefixes,
            StyleCategory::Suffix => &mut self.suffixes,
        }
    }

    /// Case-insensitive lookup by id
    pub fn get(&self, category: StyleCategory, id: &str) -> Option<&StyleOption> {
        let position = self.index.get(&(category, id.trim().to_lowercase()))?;
        self.list(category).get(*position)
    }

    pub fn color(&self, id: &str) -> Option<&StyleOption> {
        self.get(StyleCategory::Color, id)
    }

    pub fn prefix(&self, id: &str) -> Option<&StyleOption> {
        self.get(StyleCategory::Prefix, id)
    }

    pub fn suffix(&self, id: &str) -> Option<&StyleOption> {
        self.get(StyleCategory::Suffix, id)
    }

    /// All options in a category, in configuration order
    pub fn options(&self, category: StyleCategory) -> &[StyleOption] {
        self.list(category)
    }

    /// Options in `category` that `tier` is allowed to pick
    pub fn available_for<'a>(
        &'a self,
        policy: &'a TierPolicy,
        tier: &'a str,
        category: StyleCategory,
    ) -> impl Iterator<Item = &'a StyleOption> + 'a {
        self.list(category)
            .iter()
            .filter(move |option| policy.meets(tier, &option.tier))
    }

    pub fn len(&self) -> usize {
        self.colors.len() + self.prefixes.len() + self.suffixes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn build_option(category: StyleCategory, entry: &StyleEntry) -> Option<StyleOption> {
    if entry.id.trim().is_empty() {
        return None;
    }

    let rendered = match category {
        StyleCategory::Color => ColorSpec::parse(&entry.value).ok()??.to_string(),
        StyleCategory::Prefix | StyleCategory::Suffix => {
            let rendered = render_legacy(&entry.value);
            if strip_colors(&rendered).trim().is_empty() {
                return None;
            }
            rendered
        }
    };

    Some(StyleOption {
        id: entry.id.trim().to_string(),
        label: entry.label.clone(),
        value: entry.value.clone(),
        rendered,
        tier: entry.tier.to_lowercase(),
        category,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TierConfig;

    #[test]
    fn test_default_catalog_builds() {
        let catalog = StyleCatalog::build(&CatalogConfig::default());
        assert_eq!(catalog.options(StyleCategory::Color).len(), 5);
        assert_eq!(catalog.options(StyleCategory::Prefix).len(), 3);
        assert_eq!(catalog.options(StyleCategory::Suffix).len(), 2);
        assert_eq!(catalog.len(), 10);
    }

    #[test]
    fn test_prefix_rendered_to_legacy() {
        let catalog = StyleCatalog::build(&CatalogConfig::default());
        let vip = catalog.prefix("VIP").unwrap();
        assert_eq!(vip.rendered, "§a[VIP]");
        assert_eq!(vip.category, StyleCategory::Prefix);

        let legend = catalog.prefix("legend").unwrap();
        assert_eq!(strip_colors(&legend.rendered), "[LEGEND]");
    }

    #[test]
    fn test_color_rendered_to_canonical_spec() {
        let catalog = StyleCatalog::build(&CatalogConfig::default());
        assert_eq!(catalog.color("red").unwrap().rendered, "red");
        assert_eq!(catalog.color("sunset").unwrap().rendered, "#FF5F6D:#FFC371");
        assert_eq!(catalog.color("rainbow").unwrap().rendered, "rainbow");
    }

    #[test]
    fn test_invalid_entries_skipped() {
        let config = CatalogConfig {
            colors: vec![
                StyleEntry::new("bad", "Bad", "octarine", "member"),
                StyleEntry::new("ok", "Ok", "#00FF00", "member"),
            ],
            prefixes: vec![StyleEntry::new("blank", "Blank", "&a&l", "member")],
            suffixes: vec![],
        };
        let catalog = StyleCatalog::build(&config);
        assert!(catalog.color("bad").is_none());
        assert!(catalog.color("ok").is_some());
        assert!(catalog.prefix("blank").is_none());
        assert_eq!(catalog.len(), 1);
    }

    #[test]
    fn test_duplicate_ids_keep_first() {
        let config = CatalogConfig {
            colors: vec![
                StyleEntry::new("main", "First", "red", "member"),
                StyleEntry::new("Main", "Second", "blue", "member"),
            ],
            prefixes: vec![],
            suffixes: vec![],
        };
        let catalog = StyleCatalog::build(&config);
        assert_eq!(catalog.color("main").unwrap().label, "First");
        assert_eq!(catalog.len(), 1);
    }

    #[test]
    fn test_available_for_tier() {
        let catalog = StyleCatalog::build(&CatalogConfig::default());
        let policy = TierPolicy::from_config(&TierConfig::default());

        let ids = |tier: &str| -> Vec<String> {
            catalog
                .available_for(&policy, tier, StyleCategory::Prefix)
                .map(|o| o.id.clone())
                .collect()
        };

        assert!(ids("member").is_empty());
        assert_eq!(ids("vip"), vec!["vip"]);
        assert_eq!(ids("legend"), vec!["vip", "mvp", "legend"]);
    }
}
