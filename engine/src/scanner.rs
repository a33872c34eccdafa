//! Repository scanner: root traversal, glob filtering, record extraction
//!
//! For each configured root the scanner walks the subtree depth-first in a
//! deterministic order, selects files through the include/exclude filter,
//! and hands file contents to the HCL or stack-YAML extractor. File reading
//! and extraction are parallelized with rayon; the emitted record stream is
//! reassembled into traversal order so downstream index assembly stays
//! deterministic.
//!
//! Unreadable files and subtrees are skipped with a warning. Only failure to
//! enumerate a root itself is an error.

use crate::cancel::{CancelToken, Cancelled};
use crate::config::IndexConfig;
use crate::extract::HclExtractor;
use crate::globs::{InvalidPattern, PathFilter};
use crate::stacks;
use crate::taxonomy::Taxonomy;
use crate::types::ResourceRecord;
use rayon::prelude::*;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;
use thiserror::Error;
use walkdir::WalkDir;

/// Scanning failed at the root level
#[derive(Debug, Error)]
pub enum ScanError {
    #[error("failed to enumerate scan root {root:?}")]
    RootUnreadable {
        root: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Pattern(#[from] InvalidPattern),

    #[error(transparent)]
    Cancelled(#[from] Cancelled),
}

/// Stat snapshot of one selected file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileStat {
    /// Path usable for opening the file
    pub abs_path: PathBuf,
    /// Modification time, epoch milliseconds
    pub mtime_ms: u64,
    /// Size in bytes
    pub size: u64,
}

/// Everything a full scan produces
#[derive(Debug, Default)]
pub struct ScanOutcome {
    /// Resource records in traversal order
    pub records: Vec<ResourceRecord>,
    /// Selected files: display path -> stat snapshot
    pub files: BTreeMap<String, FileStat>,
}

/// Walks scan roots and extracts resource records
pub struct Scanner<'a> {
    config: &'a IndexConfig,
    filter: PathFilter,
    cancel: CancelToken,
}

impl<'a> Scanner<'a> {
    /// Compile the glob filter for `config`
    pub fn new(config: &'a IndexConfig, cancel: CancelToken) -> Result<Self, ScanError> {
        let filter = PathFilter::new(&config.include, &config.exclude)?;
        Ok(Self { config, filter, cancel })
    }

    /// Enumerate the in-scope file set without reading any contents
    ///
    /// This is the validator's fast path: stat data only.
    pub fn list_files(&self) -> Result<BTreeMap<String, FileStat>, ScanError> {
        let mut files = BTreeMap::new();
        for root in &self.config.scan_roots {
            for (display, stat) in self.walk_root(root)? {
                files.insert(display, stat);
            }
        }
        Ok(files)
    }

    /// Full scan: enumerate, read and extract every selected file
    pub fn scan(&self, taxonomy: &Taxonomy) -> Result<ScanOutcome, ScanError> {
        let mut selected: Vec<(String, FileStat)> = Vec::new();
        for root in &self.config.scan_roots {
            selected.extend(self.walk_root(root)?);
        }

        // Read and extract in parallel; collect preserves input order
        let extractor = HclExtractor::new();
        let per_file: Vec<Vec<ResourceRecord>> = selected
            .par_iter()
            .map(|(display, stat)| {
                if self.cancel.is_cancelled() {
                    return Vec::new();
                }
                match std::fs::read_to_string(&stat.abs_path) {
                    Ok(content) => extract_records(&extractor, &content, display),
                    Err(err) => {
                        log::warn!("skipping unreadable file {display}: {err}");
                        Vec::new()
                    }
                }
            })
            .collect();
        self.cancel.check()?;

        // Serial reassembly: attach initial taxonomy codes in scan order
        let mut records = Vec::new();
        for mut file_records in per_file {
            for record in &mut file_records {
                record.control_codes =
                    taxonomy.exact_controls(&record.resource_type).to_vec();
            }
            records.append(&mut file_records);
        }

        let files = selected.into_iter().collect();
        Ok(ScanOutcome { records, files })
    }

    /// Walk one root depth-first in sorted order, yielding selected files
    fn walk_root(&self, root: &Path) -> Result<Vec<(String, FileStat)>, ScanError> {
        self.cancel.check()?;

        if !root.is_dir() {
            return Err(ScanError::RootUnreadable {
                root: root.to_path_buf(),
                source: std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    "not a directory",
                ),
            });
        }

        let mut selected = Vec::new();

        for entry in WalkDir::new(root).follow_links(false).sort_by_file_name() {
            self.cancel.check()?;

            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    if err.depth() == 0 {
                        return Err(ScanError::RootUnreadable {
                            root: root.to_path_buf(),
                            source: err.into(),
                        });
                    }
                    log::warn!("skipping unreadable subtree under {}: {err}", root.display());
                    continue;
                }
            };

            if !entry.file_type().is_file() {
                continue;
            }

            let rel = entry.path().strip_prefix(root).unwrap_or(entry.path());
            let display = display_path(root, rel);
            if !self.filter.matches(&display) {
                continue;
            }

            let metadata = match entry.metadata() {
                Ok(m) => m,
                Err(err) => {
                    log::warn!("skipping {display}: stat failed: {err}");
                    continue;
                }
            };

            selected.push((
                display,
                FileStat {
                    abs_path: entry.path().to_path_buf(),
                    mtime_ms: mtime_millis(&metadata),
                    size: metadata.len(),
                },
            ));
        }

        Ok(selected)
    }
}

/// Dispatch on extension: stack YAML or HCL
fn extract_records(
    extractor: &HclExtractor,
    content: &str,
    display: &str,
) -> Vec<ResourceRecord> {
    if display.ends_with(".yaml") || display.ends_with(".yml") {
        stacks::extract_stack(content, display)
    } else {
        extractor.extract(content, display)
    }
}

/// Display path: the configured root joined with the root-relative path,
/// `/`-separated; a `.` root contributes no prefix
fn display_path(root: &Path, rel: &Path) -> String {
    let rel_s = rel.to_string_lossy().replace('\\', "/");
    let root_s = root.to_string_lossy().replace('\\', "/");
    let root_s = root_s.trim_end_matches('/');
    if root_s.is_empty() || root_s == "." {
        rel_s
    } else {
        format!("{root_s}/{rel_s}")
    }
}

fn mtime_millis(metadata: &std::fs::Metadata) -> u64 {
    metadata
        .modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
