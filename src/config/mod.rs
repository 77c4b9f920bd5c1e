//! Configuration for heapnav
//!
//! Loaded from `heapnav.toml` in the working directory (or an explicit
//! `--config` path). Every setting has a default, and command-line flags
//! override the file.
//!
//! ```toml
//! # heapnav.toml
//!
//! [aux]
//! dir = "/tmp/heapnav"   # where auxiliary files go (default: user cache dir)
//! keep_files = false     # leave them on disk after the command
//!
//! [navigation]
//! include_soft_weak = false
//!
//! [output]
//! max_references = 50
//! ```

pub mod paths;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

pub const CONFIG_FILE_NAME: &str = "heapnav.toml";

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct HeapnavConfig {
    #[serde(default)]
    pub aux: AuxConfig,
    #[serde(default)]
    pub navigation: NavigationConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct AuxConfig {
    /// Directory for the auxiliary files
    pub dir: Option<PathBuf>,
    #[serde(default)]
    pub keep_files: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct NavigationConfig {
    /// Show soft/weak edges by default
    #[serde(default)]
    pub include_soft_weak: bool,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct OutputConfig {
    /// Cap on references printed per object (0 = all)
    #[serde(default = "default_max_references")]
    pub max_references: usize,
}

fn default_max_references() -> usize {
    50
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            max_references: default_max_references(),
        }
    }
}

impl HeapnavConfig {
    /// Auxiliary file directory for `dump_path`: the configured one, or a
    /// per-dump directory under the user cache
    pub fn aux_dir_for(&self, dump_path: &Path) -> PathBuf {
        self.aux
            .dir
            .clone()
            .unwrap_or_else(|| paths::get_aux_dir(dump_path))
    }
}

/// Parse a config file
pub fn load_config_file(path: &Path) -> Result<HeapnavConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let config: HeapnavConfig = toml::from_str(&content)
        .with_context(|| format!("Failed to parse {}", path.display()))?;
    Ok(config)
}

/// Load `heapnav.toml` from `dir`, falling back to defaults
pub fn load_config(dir: &Path) -> HeapnavConfig {
    let toml_path = dir.join(CONFIG_FILE_NAME);
    if !toml_path.exists() {
        return HeapnavConfig::default();
    }
    match load_config_file(&toml_path) {
        Ok(config) => {
            debug!("Loaded config from {}", toml_path.display());
            config
        }
        Err(e) => {
            warn!("Failed to load {}: {:#}", toml_path.display(), e);
            HeapnavConfig::default()
        }
    }
}
