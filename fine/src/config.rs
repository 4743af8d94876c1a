//! Runtime configuration
//!
//! Settings come from an optional `fine.toml` and can be overridden from the
//! command line. Every field has a default, so an empty file is valid.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// File looked up in the working directory when no `--config` is given
pub const DEFAULT_CONFIG_FILE: &str = "fine.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config '{}': {error}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        error: std::io::Error,
    },

    #[error("invalid config{}: {message}", path.as_ref().map(|p| format!(" '{}'", p.display())).unwrap_or_default())]
    Parse {
        path: Option<PathBuf>,
        message: String,
    },
}

/// Limits and paths shared by the evaluator, module loader and VM
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Evaluator call-depth ceiling
    pub max_stack_depth: usize,
    /// VM operand stack capacity
    pub vm_stack_capacity: usize,
    /// VM executed-instruction ceiling
    pub vm_max_instructions: usize,
    /// Search directory for bare module names
    pub stdlib_dir: PathBuf,
    /// File name reported in traces for top-level code
    pub source_name: String,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            max_stack_depth: 1000,
            vm_stack_capacity: 256,
            vm_max_instructions: 10_000,
            stdlib_dir: PathBuf::from("stdlib"),
            source_name: "<input>".to_string(),
        }
    }
}

impl RuntimeConfig {
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|error| ConfigError::Parse {
            path: None,
            message: error.message().to_string(),
        })
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|error| ConfigError::Io {
            path: path.to_path_buf(),
            error,
        })?;
        Self::from_toml_str(&content).map_err(|err| match err {
            ConfigError::Parse { message, .. } => ConfigError::Parse {
                path: Some(path.to_path_buf()),
                message,
            },
            other => other,
        })
    }

    /// Load `path` if given, else `fine.toml` in `dir` when it exists, else defaults
    pub fn discover(path: Option<&Path>, dir: &Path) -> Result<Self, ConfigError> {
        if let Some(path) = path {
            return Self::load(path);
        }
        let candidate = dir.join(DEFAULT_CONFIG_FILE);
        if candidate.is_file() {
            Self::load(&candidate)
        } else {
            Ok(Self::default())
        }
    }

    pub fn with_max_stack_depth(mut self, depth: usize) -> Self {
        self.max_stack_depth = depth;
        self
    }

    pub fn with_vm_stack_capacity(mut self, capacity: usize) -> Self {
        self.vm_stack_capacity = capacity;
        self
    }

    pub fn with_vm_max_instructions(mut self, limit: usize) -> Self {
        self.vm_max_instructions = limit;
        self
    }

    pub fn with_stdlib_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.stdlib_dir = dir.into();
        self
    }

    pub fn with_source_name(mut self, name: impl Into<String>) -> Self {
        self.source_name = name.into();
        self
    }
}
