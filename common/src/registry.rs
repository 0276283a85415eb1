// Equipment configuration snapshots shared across handlers
use crate::error::{AgentError, Result};
use crate::types::EquipmentConfig;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

type Snapshot = Arc<HashMap<String, Arc<EquipmentConfig>>>;

/// Holds the current equipment map as an immutable snapshot. Readers grab
/// the whole snapshot; `replace_all` swaps it atomically so a reader never
/// observes a half-updated map.
#[derive(Debug, Default)]
pub struct EquipmentRegistry {
    snapshot: RwLock<Snapshot>,
}

impl EquipmentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, equipment_id: &str) -> Option<Arc<EquipmentConfig>> {
        self.snapshot.read().get(equipment_id).cloned()
    }

    pub fn all(&self) -> Vec<Arc<EquipmentConfig>> {
        self.snapshot.read().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.snapshot.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshot.read().is_empty()
    }

    /// Validate and publish a new snapshot, replacing the old one wholesale.
    pub fn replace_all(&self, configs: Vec<EquipmentConfig>) -> Result<()> {
        let mut map = HashMap::with_capacity(configs.len());
        for config in configs {
            config.validate().map_err(AgentError::Config)?;
            map.insert(config.id.clone(), Arc::new(config));
        }
        let count = map.len();
        *self.snapshot.write() = Arc::new(map);
        info!(count, "published equipment configuration snapshot");
        Ok(())
    }

    pub fn load_from_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        let configs: Vec<EquipmentConfig> = serde_json::from_str(&raw)?;
        self.replace_all(configs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample(id: &str) -> EquipmentConfig {
        serde_json::from_value(json!({
            "id": id,
            "address": "10.0.0.2",
            "vendor": "huawei",
            "cli": {"host": "10.0.0.2", "port": 23, "username": "root", "password": "admin123"},
            "datagram": {"community": "public", "port": 1661, "enabled": false}
        }))
        .unwrap()
    }

    #[test]
    fn replace_all_swaps_snapshot() {
        let registry = EquipmentRegistry::new();
        registry.replace_all(vec![sample("olt-1")]).unwrap();
        let old = registry.get("olt-1").unwrap();

        registry
            .replace_all(vec![sample("olt-1"), sample("olt-2")])
            .unwrap();
        assert_eq!(registry.len(), 2);
        // The old snapshot handle stays valid for readers that grabbed it.
        assert_eq!(old.id, "olt-1");
    }

    #[test]
    fn rejects_config_with_no_enabled_transport() {
        let registry = EquipmentRegistry::new();
        let mut bad = sample("olt-1");
        bad.cli.enabled = false;
        bad.datagram.enabled = false;
        assert!(registry.replace_all(vec![bad]).is_err());
        assert!(registry.is_empty());
    }
}
