//! Defaults read from an `itarctl` configuration file.
//!
//! ```toml
//! thread_safe = true
//! buffer_capacity = 65536
//! max_link_depth = 8
//!
//! [limits]
//! preset = "strict"
//! max_path_len = 2048
//! ```
//!
//! Every key is optional. Command-line flags take precedence over the file.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

use itar::{BuildOptions, OpenOptions};
use tar_header::stream::Limits;

/// Parsed configuration file.
#[derive(Debug, Default, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CliConfig {
    /// Read shards with `pread(2)`.
    pub thread_safe: Option<bool>,
    /// Read-ahead buffer for member readers, 0 to disable.
    pub buffer_capacity: Option<usize>,
    /// Link redirects followed before giving up.
    pub max_link_depth: Option<usize>,
    /// Parser limits.
    pub limits: LimitsConfig,
}

/// Starting point for the `[limits]` table.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LimitsPreset {
    #[default]
    Default,
    Strict,
    Permissive,
}

impl LimitsPreset {
    fn limits(self) -> Limits {
        match self {
            Self::Default => Limits::default(),
            Self::Strict => Limits::strict(),
            Self::Permissive => Limits::permissive(),
        }
    }
}

/// The `[limits]` table: a preset, then per-key overrides.
#[derive(Debug, Default, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LimitsConfig {
    pub preset: LimitsPreset,
    pub max_path_len: Option<usize>,
    pub max_pax_size: Option<u64>,
    pub max_gnu_long_size: Option<u64>,
    pub max_pending_entries: Option<usize>,
}

impl LimitsConfig {
    /// Overlay the configured values on `limits`.
    pub fn apply(&self, mut limits: Limits) -> Limits {
        if let Some(value) = self.max_path_len {
            limits.max_path_len = value;
        }
        if let Some(value) = self.max_pax_size {
            limits.max_pax_size = value;
        }
        if let Some(value) = self.max_gnu_long_size {
            limits.max_gnu_long_size = value;
        }
        if let Some(value) = self.max_pending_entries {
            limits.max_pending_entries = value;
        }
        limits
    }

    /// The preset with the configured keys overlaid.
    pub fn resolve(&self) -> Limits {
        self.apply(self.preset.limits())
    }
}

impl CliConfig {
    /// Parse configuration from TOML text.
    pub fn from_toml(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Read and parse the file at `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let config = Self::from_toml(&content)
            .with_context(|| format!("parsing config {}", path.display()))?;
        log::debug!("loaded config from {}: {config:?}", path.display());
        Ok(config)
    }

    /// Options for opening an archive. `thread_safe` set on the command
    /// line wins over the file; `shards`, when not empty, replaces the
    /// layout-derived shard paths.
    pub fn open_options(&self, thread_safe: bool, shards: Vec<PathBuf>) -> OpenOptions {
        let mut options = OpenOptions::new()
            .thread_safe(thread_safe || self.thread_safe.unwrap_or(false))
            .limits(self.limits.resolve());
        if let Some(capacity) = self.buffer_capacity {
            options = options.buffer_capacity(capacity);
        }
        if let Some(depth) = self.max_link_depth {
            options = options.max_link_depth(depth);
        }
        if !shards.is_empty() {
            options = options.shards(shards);
        }
        options
    }

    /// Options for building an index.
    pub fn build_options(&self) -> BuildOptions {
        BuildOptions::new().limits(self.limits.resolve())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config() {
        let config = CliConfig::from_toml("").unwrap();
        assert_eq!(config, CliConfig::default());
        assert_eq!(config.limits.apply(Limits::default()), Limits::default());
    }

    #[test]
    fn test_full_config() {
        let config = CliConfig::from_toml(
            r#"
thread_safe = true
buffer_capacity = 0
max_link_depth = 3

[limits]
max_path_len = 100
max_pending_entries = 4
"#,
        )
        .unwrap();
        assert_eq!(config.thread_safe, Some(true));
        assert_eq!(config.buffer_capacity, Some(0));
        assert_eq!(config.max_link_depth, Some(3));

        let limits = config.limits.apply(Limits::default());
        similar_asserts::assert_eq!(
            limits,
            Limits {
                max_path_len: 100,
                max_pending_entries: 4,
                ..Limits::default()
            }
        );
    }

    #[test]
    fn test_limits_preset() {
        let config = CliConfig::from_toml("[limits]\npreset = \"strict\"\nmax_path_len = 2048").unwrap();
        similar_asserts::assert_eq!(
            config.limits.resolve(),
            Limits {
                max_path_len: 2048,
                ..Limits::strict()
            }
        );

        let open = CliConfig::from_toml("[limits]\npreset = \"permissive\"").unwrap();
        assert_eq!(open.limits.resolve(), Limits::permissive());
        assert!(CliConfig::from_toml("[limits]\npreset = \"lax\"").is_err());
    }

    #[test]
    fn test_unknown_key_rejected() {
        assert!(CliConfig::from_toml("thread_sfe = true").is_err());
        assert!(CliConfig::from_toml("[limits]\nmax_depth = 1").is_err());
    }

    #[test]
    fn test_wrong_type_rejected() {
        assert!(CliConfig::from_toml("buffer_capacity = \"big\"").is_err());
    }

    #[test]
    fn test_load_missing_file() {
        let err = CliConfig::load(Path::new("/nonexistent/itarctl.toml")).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/itarctl.toml"));
    }
}
