//! Cache validation: is a loaded envelope still authoritative?
//!
//! The fast path compares versions, the configuration fingerprint and
//! stat-level file metadata without reading a single file body. The deep
//! path additionally recomputes checksums for files whose mtime and size
//! are unchanged; it is opt-in because it reads every in-scope file.
//!
//! Index age is a soft signal: it only forces a rebuild when no file-level
//! change was found, so an untouched tree does not churn.

use crate::cancel::{CancelToken, Cancelled};
use crate::checksum;
use crate::config::IndexConfig;
use crate::persist;
use crate::scanner::{FileStat, ScanError, Scanner};
use crate::types::IndexEnvelope;
use rayon::prelude::*;
use std::collections::BTreeMap;
use std::fmt;

/// Why an envelope is no longer authoritative
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RebuildReason {
    VersionMismatch,
    ConfigChanged,
    IndexTooOld,
    FileAdded,
    FileDeleted,
    FileModified,
    ChecksumMismatch,
    IndexCorrupted,
}

impl RebuildReason {
    /// Wire name of the reason
    pub fn name(&self) -> &'static str {
        match self {
            Self::VersionMismatch => "version_mismatch",
            Self::ConfigChanged => "config_changed",
            Self::IndexTooOld => "index_too_old",
            Self::FileAdded => "file_added",
            Self::FileDeleted => "file_deleted",
            Self::FileModified => "file_modified",
            Self::ChecksumMismatch => "checksum_mismatch",
            Self::IndexCorrupted => "index_corrupted",
        }
    }
}

impl fmt::Display for RebuildReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Validation verdict
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Validation {
    /// The envelope reflects the current tree and configuration
    UpToDate,
    /// The envelope must be rebuilt
    Rebuild {
        reason: RebuildReason,
        /// Paths that changed, sorted; empty for non-file reasons
        changed_files: Vec<String>,
    },
}

impl Validation {
    fn rebuild(reason: RebuildReason) -> Self {
        Self::Rebuild { reason, changed_files: Vec::new() }
    }

    /// Does this verdict demand a rebuild?
    pub fn needs_rebuild(&self) -> bool {
        matches!(self, Self::Rebuild { .. })
    }
}

/// Decides whether a loaded envelope is current
pub struct Validator<'a> {
    config: &'a IndexConfig,
    cancel: CancelToken,
}

impl<'a> Validator<'a> {
    pub fn new(config: &'a IndexConfig, cancel: CancelToken) -> Self {
        Self { config, cancel }
    }

    /// Fast or deep validation per the configuration flag
    pub fn validate(&self, envelope: &IndexEnvelope) -> Result<Validation, Cancelled> {
        self.run(envelope, self.config.deep_validation)
    }

    /// Stat-level validation; never reads file contents
    pub fn validate_fast(&self, envelope: &IndexEnvelope) -> Result<Validation, Cancelled> {
        self.run(envelope, false)
    }

    /// Full validation including checksum recomputation
    pub fn validate_deep(&self, envelope: &IndexEnvelope) -> Result<Validation, Cancelled> {
        self.run(envelope, true)
    }

    fn run(&self, envelope: &IndexEnvelope, deep: bool) -> Result<Validation, Cancelled> {
        self.cancel.check()?;

        // 1. Version
        if envelope.version != crate::config::CODEC_VERSION {
            return Ok(Validation::rebuild(RebuildReason::VersionMismatch));
        }

        // 2. Configuration fingerprint
        if envelope.config_fingerprint != self.config.fingerprint() {
            return Ok(Validation::rebuild(RebuildReason::ConfigChanged));
        }

        // 3. Age is recorded here, applied only when nothing else changed
        let age_ms = persist::now_millis().saturating_sub(envelope.indexed_at);
        let too_old = age_ms > self.config.max_age_days * 24 * 60 * 60 * 1000;

        // 4. File-set comparison
        let current = match self.enumerate() {
            Ok(current) => current,
            Err(ScanError::Cancelled(c)) => return Err(c),
            Err(err) => {
                log::warn!("validation could not enumerate the tree: {err}");
                return Ok(Validation::rebuild(RebuildReason::IndexCorrupted));
            }
        };
        self.cancel.check()?;

        if let Some(validation) = diff_file_sets(envelope, &current) {
            return Ok(validation);
        }

        // 5. Optional checksum pass over files that compared equal
        if deep {
            let mismatched = self.checksum_mismatches(envelope, &current)?;
            if !mismatched.is_empty() {
                return Ok(Validation::Rebuild {
                    reason: RebuildReason::ChecksumMismatch,
                    changed_files: mismatched,
                });
            }
        }

        if too_old {
            return Ok(Validation::rebuild(RebuildReason::IndexTooOld));
        }

        Ok(Validation::UpToDate)
    }

    fn enumerate(&self) -> Result<BTreeMap<String, FileStat>, ScanError> {
        Scanner::new(self.config, self.cancel.clone())?.list_files()
    }

    fn checksum_mismatches(
        &self,
        envelope: &IndexEnvelope,
        current: &BTreeMap<String, FileStat>,
    ) -> Result<Vec<String>, Cancelled> {
        let mut mismatched: Vec<String> = current
            .par_iter()
            .filter_map(|(path, stat)| {
                if self.cancel.is_cancelled() {
                    return None;
                }
                let stored = envelope.files.get(path)?;
                match checksum::file_md5(&stat.abs_path) {
                    Ok(actual) if actual != stored.checksum => Some(path.clone()),
                    Ok(_) => None,
                    Err(err) => {
                        // The file might still exist as indexed; never force
                        // a rebuild on a read error here.
                        log::warn!("checksum read failed for {path}: {err}");
                        None
                    }
                }
            })
            .collect();
        self.cancel.check()?;

        mismatched.sort();
        Ok(mismatched)
    }
}

/// Compare the stored inventory against the current file set
///
/// Returns a rebuild verdict when any file was added, deleted or modified.
/// The reason is whichever change kind has the largest count; ties go to
/// `file_modified`.
fn diff_file_sets(
    envelope: &IndexEnvelope,
    current: &BTreeMap<String, FileStat>,
) -> Option<Validation> {
    let mut added: Vec<String> = Vec::new();
    let mut modified: Vec<String> = Vec::new();
    let mut deleted: Vec<String> = Vec::new();

    for (path, stat) in current {
        match envelope.files.get(path) {
            None => added.push(path.clone()),
            Some(stored) if stored.mtime_ms != stat.mtime_ms || stored.size != stat.size => {
                modified.push(path.clone());
            }
            Some(_) => {}
        }
    }

    for path in envelope.files.keys() {
        if current.contains_key(path) {
            continue;
        }
        // A stat failure during enumeration must not read as a deletion
        match std::fs::metadata(path) {
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                deleted.push(path.clone());
            }
            Err(err) => log::debug!("cannot stat {path}, assuming it still exists: {err}"),
            Ok(_) => log::debug!("{path} exists but was not enumerated; leaving it alone"),
        }
    }

    if added.is_empty() && modified.is_empty() && deleted.is_empty() {
        return None;
    }

    let reason = if modified.len() >= added.len() && modified.len() >= deleted.len() {
        RebuildReason::FileModified
    } else if added.len() > deleted.len() {
        RebuildReason::FileAdded
    } else if deleted.len() > added.len() {
        RebuildReason::FileDeleted
    } else {
        RebuildReason::FileModified
    };

    let mut changed_files: Vec<String> = added;
    changed_files.extend(modified);
    changed_files.extend(deleted);
    changed_files.sort();

    Some(Validation::Rebuild { reason, changed_files })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CODEC_VERSION;
    use crate::index;
    use crate::scanner::Scanner;
    use crate::taxonomy::Taxonomy;
    use crate::types::SourceFileMeta;
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    fn config_for(root: &Path) -> IndexConfig {
        IndexConfig {
            scan_roots: vec![root.to_path_buf()],
            ..IndexConfig::default()
        }
    }

    fn write(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    /// Scan the tree and assemble an envelope the way a build would
    fn envelope_for(config: &IndexConfig) -> IndexEnvelope {
        let taxonomy = Taxonomy::builtin();
        let scanner = Scanner::new(config, CancelToken::new()).unwrap();
        let outcome = scanner.scan(&taxonomy).unwrap();

        let mut files = BTreeMap::new();
        for (path, stat) in &outcome.files {
            files.insert(
                path.clone(),
                SourceFileMeta {
                    mtime_ms: stat.mtime_ms,
                    size: stat.size,
                    checksum: checksum::file_md5(&stat.abs_path).unwrap(),
                },
            );
        }

        let mtimes: BTreeMap<String, u64> =
            outcome.files.iter().map(|(p, s)| (p.clone(), s.mtime_ms)).collect();
        let records: Vec<_> = outcome
            .records
            .into_iter()
            .map(|r| {
                let mtime = mtimes.get(&r.file_path).copied().unwrap_or(0);
                (r, mtime)
            })
            .collect();

        IndexEnvelope {
            version: CODEC_VERSION.to_owned(),
            indexed_at: persist::now_millis(),
            tool_version: crate::config::TOOL_VERSION.to_owned(),
            config_fingerprint: config.fingerprint(),
            files,
            index: index::build_index(&Taxonomy::builtin(), records),
            ..Default::default()
        }
    }

    #[test]
    fn test_fresh_build_is_up_to_date() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "a.tf", "resource \"aws_vpc\" \"v\" {\n}\n");

        let config = config_for(dir.path());
        let envelope = envelope_for(&config);
        let validator = Validator::new(&config, CancelToken::new());
        assert_eq!(validator.validate_fast(&envelope).unwrap(), Validation::UpToDate);
    }

    #[test]
    fn test_version_mismatch_wins_over_everything() {
        let dir = TempDir::new().unwrap();
        let config = config_for(dir.path());
        let mut envelope = envelope_for(&config);
        envelope.version = "0.0".to_owned();

        let validator = Validator::new(&config, CancelToken::new());
        assert_eq!(
            validator.validate_fast(&envelope).unwrap(),
            Validation::rebuild(RebuildReason::VersionMismatch)
        );
    }

    #[test]
    fn test_config_change_detected_without_touching_files() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "a.tf", "resource \"aws_vpc\" \"v\" {\n}\n");

        let config = config_for(dir.path());
        let envelope = envelope_for(&config);

        let mut changed = config.clone();
        changed.include.push("*.hcl".to_owned());
        let validator = Validator::new(&changed, CancelToken::new());
        assert_eq!(
            validator.validate_fast(&envelope).unwrap(),
            Validation::rebuild(RebuildReason::ConfigChanged)
        );
    }

    #[test]
    fn test_modified_file_detected_by_mtime() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "a.tf", "resource \"aws_vpc\" \"a\" {\n}\n");
        write(dir.path(), "b.tf", "resource \"aws_vpc\" \"b\" {\n}\n");

        let config = config_for(dir.path());
        let mut envelope = envelope_for(&config);

        // Regress the stored mtime instead of sleeping for a fresh one
        let key = envelope.files.keys().find(|k| k.ends_with("a.tf")).unwrap().clone();
        envelope.files.get_mut(&key).unwrap().mtime_ms -= 5_000;

        let validator = Validator::new(&config, CancelToken::new());
        match validator.validate_fast(&envelope).unwrap() {
            Validation::Rebuild { reason, changed_files } => {
                assert_eq!(reason, RebuildReason::FileModified);
                assert_eq!(changed_files, vec![key]);
            }
            Validation::UpToDate => panic!("expected a rebuild"),
        }
    }

    #[test]
    fn test_added_file_detected() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "a.tf", "resource \"aws_vpc\" \"a\" {\n}\n");

        let config = config_for(dir.path());
        let envelope = envelope_for(&config);

        write(dir.path(), "new.tf", "resource \"aws_vpc\" \"n\" {\n}\n");
        let validator = Validator::new(&config, CancelToken::new());
        match validator.validate_fast(&envelope).unwrap() {
            Validation::Rebuild { reason, changed_files } => {
                assert_eq!(reason, RebuildReason::FileAdded);
                assert_eq!(changed_files.len(), 1);
                assert!(changed_files[0].ends_with("new.tf"));
            }
            Validation::UpToDate => panic!("expected a rebuild"),
        }
    }

    #[test]
    fn test_deleted_file_detected() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "a.tf", "resource \"aws_vpc\" \"a\" {\n}\n");
        write(dir.path(), "b.tf", "resource \"aws_vpc\" \"b\" {\n}\n");

        let config = config_for(dir.path());
        let envelope = envelope_for(&config);

        fs::remove_file(dir.path().join("b.tf")).unwrap();
        let validator = Validator::new(&config, CancelToken::new());
        match validator.validate_fast(&envelope).unwrap() {
            Validation::Rebuild { reason, changed_files } => {
                assert_eq!(reason, RebuildReason::FileDeleted);
                assert!(changed_files[0].ends_with("b.tf"));
            }
            Validation::UpToDate => panic!("expected a rebuild"),
        }
    }

    #[test]
    fn test_age_alone_forces_rebuild_only_without_changes() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "a.tf", "resource \"aws_vpc\" \"a\" {\n}\n");

        let config = config_for(dir.path());
        let mut envelope = envelope_for(&config);
        envelope.indexed_at = persist::now_millis() - 8 * 24 * 60 * 60 * 1000;

        let validator = Validator::new(&config, CancelToken::new());
        assert_eq!(
            validator.validate_fast(&envelope).unwrap(),
            Validation::rebuild(RebuildReason::IndexTooOld)
        );

        // With a file change present, the file reason wins
        write(dir.path(), "fresh.tf", "resource \"aws_vpc\" \"f\" {\n}\n");
        match validator.validate_fast(&envelope).unwrap() {
            Validation::Rebuild { reason, .. } => assert_eq!(reason, RebuildReason::FileAdded),
            Validation::UpToDate => panic!("expected a rebuild"),
        }
    }

    #[test]
    fn test_deep_validation_catches_checksum_drift() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "a.tf", "resource \"aws_vpc\" \"a\" {\n}\n");

        let config = config_for(dir.path());
        let mut envelope = envelope_for(&config);

        // Same mtime and size, different stored checksum
        let key = envelope.files.keys().next().unwrap().clone();
        envelope.files.get_mut(&key).unwrap().checksum = "0".repeat(32);

        let validator = Validator::new(&config, CancelToken::new());
        // The fast path cannot see it
        assert_eq!(validator.validate_fast(&envelope).unwrap(), Validation::UpToDate);
        match validator.validate_deep(&envelope).unwrap() {
            Validation::Rebuild { reason, changed_files } => {
                assert_eq!(reason, RebuildReason::ChecksumMismatch);
                assert_eq!(changed_files, vec![key]);
            }
            Validation::UpToDate => panic!("expected a rebuild"),
        }
    }

    #[test]
    fn test_unreachable_root_is_defensive_rebuild() {
        let dir = TempDir::new().unwrap();
        let config = config_for(dir.path());
        let envelope = envelope_for(&config);

        let gone = config_for(&dir.path().join("missing"));
        // Keep the fingerprint identical so the file-set step is reached
        let mut envelope = envelope;
        envelope.config_fingerprint = gone.fingerprint();

        let validator = Validator::new(&gone, CancelToken::new());
        assert_eq!(
            validator.validate_fast(&envelope).unwrap(),
            Validation::rebuild(RebuildReason::IndexCorrupted)
        );
    }

    #[test]
    fn test_cancellation_propagates() {
        let dir = TempDir::new().unwrap();
        let config = config_for(dir.path());
        let envelope = envelope_for(&config);

        let cancel = CancelToken::new();
        cancel.cancel();
        let validator = Validator::new(&config, cancel);
        assert!(validator.validate_fast(&envelope).is_err());
    }
}
