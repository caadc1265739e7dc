//! CLI run settings: the work-team default, last-used directories, and log
//! level — pure ambient convenience persisted as JSON via a simple
//! `Settings::load`/`save` round trip. The core engine has no notion of
//! this; it only ever sees `metatree_core::Config`.

use std::path::Path;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub work_team: String,
    #[serde(default)]
    pub developer_name: String,
    #[serde(default)]
    pub last_source_dir: Option<String>,
    #[serde(default)]
    pub last_target_dirs: Vec<String>,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            work_team: String::new(),
            developer_name: String::new(),
            last_source_dir: None,
            last_target_dirs: Vec::new(),
            log_level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Settings {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let settings: Settings = serde_json::from_str(&content)?;
        Ok(settings)
    }

    pub fn load_or_default(path: &Path) -> Self {
        Settings::load(path).unwrap_or_default()
    }

    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}
