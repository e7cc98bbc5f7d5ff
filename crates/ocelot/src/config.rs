//! Project configuration (`ocelot.toml`)

use anyhow::{Context, Result};
use ocelot_transform::ConvertOptions;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

pub const CONFIG_FILE: &str = "ocelot.toml";

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub closure: ClosureConfig,
}

/// `[closure]` section
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ClosureConfig {
    pub known_function_optimization: bool,
    pub verify: bool,
}

impl Default for ClosureConfig {
    fn default() -> Self {
        Self {
            known_function_optimization: true,
            verify: true,
        }
    }
}

impl Config {
    pub fn parse(text: &str) -> Result<Self> {
        toml::from_str(text).context("Invalid configuration")
    }

    /// Load `explicit` if given, else `ocelot.toml` in the current directory
    /// if present, else defaults.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let path = match explicit {
            Some(path) => path.to_path_buf(),
            None => {
                let default = PathBuf::from(CONFIG_FILE);
                if !default.is_file() {
                    log::debug!("no {} found, using defaults", CONFIG_FILE);
                    return Ok(Self::default());
                }
                default
            }
        };

        let text = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config = Self::parse(&text)
            .with_context(|| format!("Failed to load config file {}", path.display()))?;
        log::debug!("loaded {}: {:?}", path.display(), config);
        Ok(config)
    }

    /// Command line switches can only turn features off.
    pub fn apply_overrides(&mut self, no_kfo: bool, no_verify: bool) {
        if no_kfo {
            self.closure.known_function_optimization = false;
        }
        if no_verify {
            self.closure.verify = false;
        }
    }

    pub fn convert_options(&self) -> ConvertOptions {
        ConvertOptions {
            known_function_optimization: self.closure.known_function_optimization,
        }
    }
}
