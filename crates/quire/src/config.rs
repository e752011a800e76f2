//! Configuration file support for quire
//!
//! Config file location: `~/.config/quire/config.toml` (XDG_CONFIG_HOME)
//!
//! Example config:
//! ```toml
//! [session]
//! auto_refine = "on"
//! auto_refine_limit = 14000
//! ignore_similar_regions = false
//! default_variant = "a"
//!
//! [session.diff]
//! ignore_whitespace = false
//! ignore_case = false
//!
//! [session.combination]
//! a = "<<<<<<< variant A"
//! b = ">>>>>>> variant B"
//! ancestor = "####### Ancestor"
//! end = "======= end"
//!
//! [tools]
//! external = false
//! diff = "diff"
//! diff3 = "diff3"
//!
//! [output]
//! json = false
//! ```

use quire_core::SessionOptions;
use serde::Deserialize;
use std::path::PathBuf;

/// External diff program configuration
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    /// Use the external programs instead of the builtin diff
    pub external: bool,
    pub diff: String,
    pub diff3: String,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            external: false,
            diff: "diff".to_string(),
            diff3: "diff3".to_string(),
        }
    }
}

/// Report configuration
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct OutputConfig {
    /// Print reports as JSON
    pub json: bool,
}

/// Root configuration
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub session: SessionOptions,
    pub tools: ToolsConfig,
    pub output: OutputConfig,
}

impl Config {
    /// Get all possible config file paths in priority order
    fn config_paths() -> Vec<PathBuf> {
        let mut paths = Vec::new();

        if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
            paths.push(PathBuf::from(xdg).join("quire").join("config.toml"));
        }

        if let Some(home) = dirs::home_dir() {
            paths.push(home.join(".config").join("quire").join("config.toml"));
        }

        // Platform-specific config dir (~/Library/Application Support on macOS)
        if let Some(config_dir) = dirs::config_dir() {
            let platform_path = config_dir.join("quire").join("config.toml");
            if !paths.contains(&platform_path) {
                paths.push(platform_path);
            }
        }

        paths
    }

    /// Get the first existing config file path
    pub fn config_path() -> Option<PathBuf> {
        Self::config_paths().into_iter().find(|p| p.exists())
    }

    /// Load config from XDG config path
    /// Returns default config if file doesn't exist or can't be parsed
    pub fn load() -> Self {
        Self::config_path()
            .and_then(|path| {
                log::debug!("loading config from {}", path.display());
                std::fs::read_to_string(&path).ok()
            })
            .and_then(|content| Self::parse(&content))
            .unwrap_or_default()
    }

    fn parse(content: &str) -> Option<Self> {
        toml::from_str(content)
            .map_err(|e| {
                eprintln!("Warning: Failed to parse config: {}", e);
                e
            })
            .ok()
    }
}
