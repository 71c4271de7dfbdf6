use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::{
    binding_table::{BindingEntry, BINDING_TABLE_SIZE},
    pending::MAX_PENDING_NOTIFICATIONS,
};

/// Binding manager configuration, stored as JSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BindingConfig {
    /// Rows in the binding table. Also the size of the pending notification pool.
    #[serde(default = "default_binding_table_size")]
    pub binding_table_size: usize,
    /// Distinct (endpoint, cluster) changes queued per peer while its session is being established.
    #[serde(default = "default_max_pending_notifications")]
    pub max_pending_notifications: usize,
    /// Open sessions to all unicast peers when the manager starts.
    #[serde(default)]
    pub establish_sessions_on_init: bool,
    /// Initial binding table content.
    #[serde(default)]
    pub bindings: Vec<BindingEntry>,
}

fn default_binding_table_size() -> usize {
    BINDING_TABLE_SIZE
}

fn default_max_pending_notifications() -> usize {
    MAX_PENDING_NOTIFICATIONS
}

impl Default for BindingConfig {
    fn default() -> Self {
        Self {
            binding_table_size: BINDING_TABLE_SIZE,
            max_pending_notifications: MAX_PENDING_NOTIFICATIONS,
            establish_sessions_on_init: false,
            bindings: Vec::new(),
        }
    }
}

impl BindingConfig {
    pub fn validate(&self) -> Result<()> {
        if self.binding_table_size == 0 {
            anyhow::bail!("binding_table_size must be positive");
        }
        if self.max_pending_notifications == 0 {
            anyhow::bail!("max_pending_notifications must be positive");
        }
        if self.bindings.len() > self.binding_table_size {
            anyhow::bail!(
                "{} bindings configured but binding_table_size is {}",
                self.bindings.len(),
                self.binding_table_size
            );
        }
        Ok(())
    }
}

pub fn load_config(path: &str) -> Result<BindingConfig> {
    let data = std::fs::read_to_string(path).context(format!("reading config from {}", path))?;
    let config: BindingConfig = serde_json::from_str(&data).context(format!("parsing {}", path))?;
    config.validate().context(format!("validating {}", path))?;
    Ok(config)
}

pub fn save_config(path: &str, config: &BindingConfig) -> Result<()> {
    let data = serde_json::to_string_pretty(config)?;
    std::fs::write(path, data).context(format!("writing config to {}", path))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_path(name: &str) -> String {
        let dir = std::env::temp_dir().join(format!("matc_binding_test_{}", name));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        dir.join("binding.json").to_str().unwrap().to_owned()
    }

    #[test]
    fn defaults_for_missing_fields() {
        let c: BindingConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(c.binding_table_size, BINDING_TABLE_SIZE);
        assert_eq!(c.max_pending_notifications, MAX_PENDING_NOTIFICATIONS);
        assert!(!c.establish_sessions_on_init);
        assert!(c.bindings.is_empty());
    }

    #[test]
    fn config_round_trip() {
        let path = test_path("cfg_rt");
        let config = BindingConfig {
            binding_table_size: 4,
            max_pending_notifications: 2,
            establish_sessions_on_init: true,
            bindings: vec![
                BindingEntry::unicast(1, 300, 1, 1, Some(6)),
                BindingEntry::multicast(1, 0x20, 1, None),
            ],
        };
        save_config(&path, &config).unwrap();
        let loaded = load_config(&path).unwrap();
        assert_eq!(loaded.binding_table_size, 4);
        assert_eq!(loaded.max_pending_notifications, 2);
        assert!(loaded.establish_sessions_on_init);
        assert_eq!(loaded.bindings, config.bindings);
    }

    #[test]
    fn invalid_config_rejected() {
        let path = test_path("cfg_invalid");
        std::fs::write(&path, r#"{"binding_table_size":0}"#).unwrap();
        assert!(load_config(&path).is_err());

        let too_many = BindingConfig {
            binding_table_size: 1,
            bindings: vec![
                BindingEntry::unicast(1, 300, 1, 1, None),
                BindingEntry::unicast(1, 301, 1, 1, None),
            ],
            ..Default::default()
        };
        assert!(too_many.validate().is_err());
    }

    #[test]
    fn missing_file() {
        assert!(load_config("/nonexistent/matc-binding/config.json").is_err());
    }
}
