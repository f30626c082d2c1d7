use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::PathBuf;

const APP_DIR: &str = "lull";
const CONFIG_FILE: &str = "config.json";
const DATA_DIR: &str = "data";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionConfig {
    #[serde(default = "default_max_history_items")]
    pub max_history_items: usize,
    #[serde(default = "default_max_favorites")]
    pub max_favorites: usize,
    #[serde(default = "default_volume")]
    pub default_volume: f32,
    #[serde(default)]
    pub catalog_path: Option<PathBuf>,
    #[serde(default)]
    pub data_dir: Option<PathBuf>,
}

fn default_max_history_items() -> usize {
    50
}

fn default_max_favorites() -> usize {
    200
}

fn default_volume() -> f32 {
    0.7
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_history_items: default_max_history_items(),
            max_favorites: default_max_favorites(),
            default_volume: default_volume(),
            catalog_path: None,
            data_dir: None,
        }
    }
}

impl SessionConfig {
    /// Directory backing the durable key-value store.
    pub fn resolved_data_dir(&self) -> Result<PathBuf> {
        match &self.data_dir {
            Some(dir) => Ok(dir.clone()),
            None => Ok(config_root()?.join(DATA_DIR)),
        }
    }
}

pub fn config_root() -> Result<PathBuf> {
    if let Ok(override_dir) = env::var("LULL_CONFIG_DIR") {
        return Ok(PathBuf::from(override_dir));
    }

    if let Ok(xdg) = env::var("XDG_CONFIG_HOME")
        && !xdg.trim().is_empty()
    {
        return Ok(PathBuf::from(xdg).join(APP_DIR));
    }

    let home = env::var("HOME")
        .or_else(|_| env::var("USERPROFILE"))
        .context("neither HOME nor USERPROFILE is set")?;
    Ok(PathBuf::from(home).join(".config").join(APP_DIR))
}

pub fn config_path() -> Result<PathBuf> {
    Ok(config_root()?.join(CONFIG_FILE))
}

pub fn ensure_config_dir() -> Result<PathBuf> {
    let root = config_root()?;
    fs::create_dir_all(&root).with_context(|| format!("failed to create {}", root.display()))?;
    Ok(root)
}

pub fn load_config() -> Result<SessionConfig> {
    let path = config_path()?;
    if !path.exists() {
        return Ok(SessionConfig::default());
    }

    let raw = fs::read_to_string(&path)
        .with_context(|| format!("failed to read config file {}", path.display()))?;
    let config: SessionConfig = serde_json::from_str(&raw)
        .with_context(|| format!("failed to parse config file {}", path.display()))?;
    Ok(config)
}

pub fn save_config(config: &SessionConfig) -> Result<()> {
    ensure_config_dir()?;
    let path = config_path()?;
    let json = serde_json::to_string_pretty(config)?;
    fs::write(&path, json).with_context(|| format!("failed to write {}", path.display()))?;
    Ok(())
}
