//! Top-level configuration: [`TestConfig`](crate::testing::TestConfig) for
//! the engine itself, plus the ambient [`OutputConfig`] `weave-check` reads
//! to decide where bug reports land. Grouped the way the storage
//! component's own `Config` is — a `Default` that resolves a real OS data
//! directory via `directories`, loadable from a TOML file on top of that
//! default.

use std::fs;
use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::testing::TestConfig;

const QUALIFIER: &str = "io";
const ORGANIZATION: &str = "Weave";
const APPLICATION: &str = "weave-check";

/// Where a testing run's artifacts (trace text, bug report XML) are
/// written when an iteration fails.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Directory bug reports are written under. Created if missing.
    pub directory: PathBuf,
    /// Whether to write the `<Tag> payload` trace alongside the report.
    pub write_trace: bool,
    /// Whether to write the XML actor graph alongside the report.
    pub write_actor_graph: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        let directory = ProjectDirs::from(QUALIFIER, ORGANIZATION, APPLICATION)
            .map(|project_dirs| project_dirs.data_dir().to_path_buf())
            .unwrap_or_else(|| {
                warn!("failed to resolve a project data directory - falling back to current dir");
                PathBuf::from(".")
            });

        OutputConfig {
            directory,
            write_trace: true,
            write_actor_graph: true,
        }
    }
}

/// The configuration `weave-check` loads, as TOML, before CLI flags are
/// layered on top.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct WeaveConfig {
    pub testing: TestConfig,
    pub output: OutputConfig,
}

impl WeaveConfig {
    /// Reads and parses `path` as TOML. Missing optional sections fall back
    /// to their defaults via `#[serde(default)]`.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// Errors loading a [`WeaveConfig`] from disk.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_file_reads_a_partial_toml_document() {
        let dir = tempfile::tempdir().expect("should get tempdir");
        let path = dir.path().join("weave.toml");
        fs::write(
            &path,
            r#"
            [testing]
            iterations = 5
            strategy = "exhaustive"
            "#,
        )
        .unwrap();

        let config = WeaveConfig::from_file(&path).expect("config should parse");
        assert_eq!(config.testing.iterations, 5);
        assert_eq!(config.output, OutputConfig::default());
    }

    #[test]
    fn from_file_reports_missing_file() {
        let missing = PathBuf::from("/nonexistent/weave.toml");
        let err = WeaveConfig::from_file(&missing).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn to_string_then_parse_round_trips_to_an_equivalent_config() {
        let mut config = WeaveConfig::default();
        config.testing.iterations = 250;
        config.testing.strategy = crate::testing::StrategyKind::Pct;
        config.testing.seed = 99;

        let rendered = toml::to_string(&config).expect("should serialize");
        let parsed: WeaveConfig = toml::from_str(&rendered).expect("should parse back");
        assert_eq!(config, parsed);
    }
}
