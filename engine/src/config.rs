//! Configuration surface consumed by the indexing engine
//!
//! The engine is configured by a plain record: scan roots, include/exclude
//! glob patterns, the index file destination, and two behavior flags. A
//! `terraudit.toml` at the repository root overrides the built-in defaults.
//!
//! The configuration fingerprint summarizes roots and patterns; the
//! validator compares it against the fingerprint stored in a persisted
//! envelope to detect configuration drift without touching any source file.

use crate::checksum;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Version of the on-disk envelope format; an exact match is required on load
pub const CODEC_VERSION: &str = "1.0";

/// Identifier written into every envelope this build produces
pub const TOOL_VERSION: &str = concat!("terraudit/", env!("CARGO_PKG_VERSION"));

/// Maximum index age before the soft `index_too_old` signal fires, in days
pub const DEFAULT_MAX_AGE_DAYS: u64 = 7;

/// Failed to load a configuration file
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path:?}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path:?}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// Scan and cache configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    /// Directories to scan, in order
    pub scan_roots: Vec<PathBuf>,
    /// Include glob patterns (basename, or full path when the pattern
    /// contains a separator)
    pub include: Vec<String>,
    /// Exclude glob patterns, applied after includes
    pub exclude: Vec<String>,
    /// Destination of the persisted index envelope
    pub index_path: PathBuf,
    /// Recompute checksums for files whose mtime and size are unchanged
    pub deep_validation: bool,
    /// Age threshold for the soft staleness signal
    pub max_age_days: u64,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            scan_roots: vec![PathBuf::from(".")],
            include: vec![
                "*.tf".to_owned(),
                "*.tfvars".to_owned(),
                "*.yaml".to_owned(),
                "*.yml".to_owned(),
            ],
            exclude: vec![
                ".terraform/*".to_owned(),
                "*.tfstate".to_owned(),
                "*.tfstate.backup".to_owned(),
            ],
            index_path: PathBuf::from(".terraudit/index.json.gz"),
            deep_validation: false,
            max_age_days: DEFAULT_MAX_AGE_DAYS,
        }
    }
}

impl IndexConfig {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Load `terraudit.toml` from `dir` if present, defaults otherwise
    pub fn load_or_default(dir: &Path) -> Result<Self, ConfigError> {
        let path = dir.join("terraudit.toml");
        if path.is_file() {
            Self::load(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Content hash of the canonicalized scan roots and glob patterns
    ///
    /// Elements are joined with the ASCII unit separator and sections with
    /// the record separator; neither can occur inside a path or pattern.
    pub fn fingerprint(&self) -> String {
        let roots: Vec<String> = self
            .scan_roots
            .iter()
            .map(|r| r.to_string_lossy().into_owned())
            .collect();

        let canonical = [roots.join("\u{1f}"), self.include.join("\u{1f}"), self.exclude.join("\u{1f}")]
            .join("\u{1e}");

        checksum::bytes_md5(canonical.as_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_patterns_cover_terraform_trees() {
        let config = IndexConfig::default();
        assert!(config.include.contains(&"*.tf".to_owned()));
        assert!(config.exclude.iter().any(|p| p.contains("tfstate")));
        assert_eq!(config.max_age_days, DEFAULT_MAX_AGE_DAYS);
    }

    #[test]
    fn test_fingerprint_stable_for_identical_config() {
        let a = IndexConfig::default();
        let b = IndexConfig::default();
        assert_eq!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn test_fingerprint_changes_with_patterns() {
        let a = IndexConfig::default();
        let mut b = IndexConfig::default();
        b.include.push("*.hcl".to_owned());
        assert_ne!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn test_fingerprint_distinguishes_sections() {
        // Moving a pattern from include to exclude must change the hash
        let mut a = IndexConfig::default();
        a.include = vec!["*.tf".to_owned()];
        a.exclude = vec![];
        let mut b = IndexConfig::default();
        b.include = vec![];
        b.exclude = vec!["*.tf".to_owned()];
        assert_ne!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn test_load_from_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("terraudit.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(
            file,
            r#"
scan_roots = ["terraform", "stacks"]
include = ["*.tf"]
exclude = ["*_test.tf"]
index_path = "out/index.json.gz"
deep_validation = true
"#
        )
        .unwrap();

        let config = IndexConfig::load(&path).unwrap();
        assert_eq!(config.scan_roots, vec![PathBuf::from("terraform"), PathBuf::from("stacks")]);
        assert!(config.deep_validation);
        // Unset fields fall back to defaults
        assert_eq!(config.max_age_days, DEFAULT_MAX_AGE_DAYS);
    }

    #[test]
    fn test_load_or_default_without_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = IndexConfig::load_or_default(dir.path()).unwrap();
        assert_eq!(config, IndexConfig::default());
    }

    #[test]
    fn test_load_rejects_bad_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("terraudit.toml");
        std::fs::write(&path, "scan_roots = [").unwrap();
        assert!(matches!(IndexConfig::load(&path), Err(ConfigError::Parse { .. })));
    }
}
