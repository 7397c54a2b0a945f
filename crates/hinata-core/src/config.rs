//! Store Configuration
//!
//! Serde-deserializable configuration with sensible defaults. The stores
//! are libraries; loading these structs from a file or environment is the
//! embedding application's concern.

use serde::{Deserialize, Serialize};

/// Top-level configuration for the four stores and their maintenance task.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub relation: RelationStoreConfig,
    pub tag: TagStoreConfig,
    pub maintenance: MaintenanceConfig,
}

/// Relation store tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelationStoreConfig {
    /// TTL for system-created relations, measured against `last_accessed`.
    /// User-created relations are never auto-expired.
    pub system_relation_ttl_secs: u64,
    /// Run the derivation hook after each created relation
    pub derivation_enabled: bool,
}

impl Default for RelationStoreConfig {
    fn default() -> Self {
        Self {
            // 30 days
            system_relation_ttl_secs: 30 * 24 * 60 * 60,
            derivation_enabled: false,
        }
    }
}

/// Tag store tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TagStoreConfig {
    /// Lifetime of auto-extracted tags from the moment of extraction
    pub ai_tag_expiry_secs: u64,
    /// TTL for never-used system tags (seeded tags are exempt)
    pub unused_system_tag_ttl_secs: u64,
    /// Seed the fixed status/priority tags at startup
    pub seed_system_tags: bool,
}

impl Default for TagStoreConfig {
    fn default() -> Self {
        Self {
            // 30 days
            ai_tag_expiry_secs: 30 * 24 * 60 * 60,
            // 90 days
            unused_system_tag_ttl_secs: 90 * 24 * 60 * 60,
            seed_system_tags: true,
        }
    }
}

/// Background maintenance tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MaintenanceConfig {
    pub enabled: bool,
    pub sweep_interval_secs: u64,
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            sweep_interval_secs: 3600,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = StorageConfig::default();
        assert_eq!(config.relation.system_relation_ttl_secs, 30 * 24 * 60 * 60);
        assert!(!config.relation.derivation_enabled);
        assert!(config.tag.seed_system_tags);
        assert_eq!(config.maintenance.sweep_interval_secs, 3600);
    }

    #[test]
    fn test_partial_config_fills_defaults() {
        let json = r#"{"relation":{"derivation_enabled":true}}"#;
        let config: StorageConfig = serde_json::from_str(json).unwrap();

        assert!(config.relation.derivation_enabled);
        // untouched sections keep their defaults
        assert_eq!(config.relation.system_relation_ttl_secs, 30 * 24 * 60 * 60);
        assert_eq!(config.tag, TagStoreConfig::default());
    }
}
