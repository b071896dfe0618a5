//! Interpreter configuration loaded from TOML.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::bytecode::format::{ByteOrder, CommandLayout, PointerWidth};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("reading configuration {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("parsing configuration: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Configuration for a [`LevelVm`](crate::LevelVm).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VmConfig {
    /// Physical command layout of the scripts this interpreter runs.
    pub layout: CommandLayout,
    /// Diagnostics delivered per `execute` call before the rest are summarised.
    pub diagnostic_budget: usize,
    /// Capacity of the content memory pool.
    pub main_pool_bytes: usize,
    /// Upper bound for the level pool created by `ALLOC_LEVEL_POOL`.
    pub level_pool_bytes: usize,
    /// Commands a single `execute` call may dispatch before it faults; zero disables the limit.
    pub step_limit: u64,
}

impl Default for VmConfig {
    fn default() -> Self {
        Self {
            layout: CommandLayout::default(),
            diagnostic_budget: 64,
            main_pool_bytes: 0x0040_0000,
            level_pool_bytes: 0x0002_0000,
            step_limit: 1_000_000,
        }
    }
}

impl VmConfig {
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(input)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let data = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&data)
    }

    pub fn with_pointer_width(mut self, width: PointerWidth) -> Self {
        self.layout.pointer_width = width;
        self
    }

    pub fn with_extension_byte_order(mut self, order: ByteOrder) -> Self {
        self.layout.extension_byte_order = order;
        self
    }

    pub fn with_diagnostic_budget(mut self, budget: usize) -> Self {
        self.diagnostic_budget = budget;
        self
    }

    pub fn with_main_pool_bytes(mut self, bytes: usize) -> Self {
        self.main_pool_bytes = bytes;
        self
    }

    pub fn with_level_pool_bytes(mut self, bytes: usize) -> Self {
        self.level_pool_bytes = bytes;
        self
    }

    pub fn with_step_limit(mut self, limit: u64) -> Self {
        self.step_limit = limit;
        self
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.main_pool_bytes == 0 {
            return Err(ConfigError::Invalid("main_pool_bytes must be non-zero".into()));
        }
        if self.level_pool_bytes > self.main_pool_bytes {
            return Err(ConfigError::Invalid(format!(
                "level_pool_bytes ({}) exceeds main_pool_bytes ({})",
                self.level_pool_bytes, self.main_pool_bytes
            )));
        }
        Ok(())
    }
}
