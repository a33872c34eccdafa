//! Load-or-build orchestration over the cache, scanner and validator
//!
//! The single entry point is [`Indexer::load_or_build`]. A valid persisted
//! envelope is served as-is; a stale one triggers a full rebuild and
//! re-persist; a corrupt or unreadable one degrades to a live in-memory
//! build without persisting. A persist failure after a successful build is
//! logged and the caller still receives the usable envelope.

use crate::cancel::{CancelToken, Cancelled};
use crate::checksum;
use crate::config::{IndexConfig, CODEC_VERSION, TOOL_VERSION};
use crate::index::IndexBuilder;
use crate::persist::{self, PersistError, ValidateError};
use crate::scanner::{ScanError, Scanner};
use crate::taxonomy::Taxonomy;
use crate::types::{IndexEnvelope, ScanMetadata, SourceFileMeta};
use crate::validate::{Validation, Validator};
use rayon::prelude::*;
use std::collections::BTreeMap;
use std::time::Instant;
use thiserror::Error;

/// Failure of the build or load path
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("operation cancelled")]
    Cancelled,

    #[error("scan failed")]
    Scan(#[source] ScanError),

    #[error("persistence failed")]
    Persist(#[source] PersistError),

    #[error("persisted envelope is invalid")]
    Validate(#[source] ValidateError),
}

impl From<Cancelled> for BuildError {
    fn from(_: Cancelled) -> Self {
        Self::Cancelled
    }
}

impl From<ScanError> for BuildError {
    fn from(err: ScanError) -> Self {
        match err {
            ScanError::Cancelled(_) => Self::Cancelled,
            other => Self::Scan(other),
        }
    }
}

impl From<PersistError> for BuildError {
    fn from(err: PersistError) -> Self {
        match err {
            PersistError::Cancelled(_) => Self::Cancelled,
            other => Self::Persist(other),
        }
    }
}

impl From<ValidateError> for BuildError {
    fn from(err: ValidateError) -> Self {
        Self::Validate(err)
    }
}

/// Owns the configuration and taxonomy for one indexed tree
pub struct Indexer {
    config: IndexConfig,
    taxonomy: Taxonomy,
}

impl Indexer {
    /// Indexer with the built-in taxonomy
    pub fn new(config: IndexConfig) -> Self {
        Self::with_taxonomy(config, Taxonomy::builtin())
    }

    /// Indexer with caller-supplied taxonomy tables
    pub fn with_taxonomy(config: IndexConfig, taxonomy: Taxonomy) -> Self {
        Self { config, taxonomy }
    }

    pub fn config(&self) -> &IndexConfig {
        &self.config
    }

    pub fn taxonomy(&self) -> &Taxonomy {
        &self.taxonomy
    }

    /// Serve the persisted envelope when it is current, rebuild otherwise
    ///
    /// `skip_cache` forces a full rebuild and re-persist. Load or validation
    /// problems degrade to a live in-memory build.
    pub fn load_or_build(
        &self,
        skip_cache: bool,
        cancel: &CancelToken,
    ) -> Result<IndexEnvelope, BuildError> {
        if skip_cache || !self.config.index_path.exists() {
            return self.build_and_persist(cancel);
        }

        let envelope = match self.load() {
            Ok(envelope) => envelope,
            Err(BuildError::Cancelled) => return Err(BuildError::Cancelled),
            Err(BuildError::Validate(err)) => {
                // Well-formed but wrong version: rebuild and replace it
                log::info!("cached envelope rejected ({err}), rebuilding");
                return self.build_and_persist(cancel);
            }
            Err(err) => {
                log::warn!("cached index unusable, falling back to live scan: {err}");
                return self.build(cancel);
            }
        };

        let validator = Validator::new(&self.config, cancel.clone());
        match validator.validate(&envelope)? {
            Validation::UpToDate => {
                log::debug!("persisted index is current, {} resources", envelope.index.len());
                Ok(envelope)
            }
            Validation::Rebuild { reason, changed_files } => {
                log::info!(
                    "rebuilding index: {reason} ({} changed files)",
                    changed_files.len()
                );
                self.build_and_persist(cancel)
            }
        }
    }

    /// Read and structurally check the persisted envelope
    pub fn load(&self) -> Result<IndexEnvelope, BuildError> {
        let envelope = persist::read(&self.config.index_path)?;
        persist::check(&envelope)?;
        Ok(envelope)
    }

    /// Full pipeline without persisting: scan, classify, assemble
    pub fn build(&self, cancel: &CancelToken) -> Result<IndexEnvelope, BuildError> {
        let started = Instant::now();

        let scanner = Scanner::new(&self.config, cancel.clone())?;
        let outcome = scanner.scan(&self.taxonomy)?;

        // Checksums are computed at build time so fast validation never has
        // to read file contents.
        let files: BTreeMap<String, SourceFileMeta> = outcome
            .files
            .par_iter()
            .map(|(path, stat)| {
                let checksum = if cancel.is_cancelled() {
                    String::new()
                } else {
                    checksum::file_md5(&stat.abs_path).unwrap_or_else(|err| {
                        log::warn!("checksum failed for {path}: {err}");
                        String::new()
                    })
                };
                (
                    path.clone(),
                    SourceFileMeta {
                        mtime_ms: stat.mtime_ms,
                        size: stat.size,
                        checksum,
                    },
                )
            })
            .collect();
        cancel.check()?;

        // Classification and assembly stay serial for deterministic order
        let mut builder = IndexBuilder::new(&self.taxonomy);
        for record in outcome.records {
            let last_modified = outcome
                .files
                .get(&record.file_path)
                .map(|stat| stat.mtime_ms)
                .unwrap_or(0);
            builder.add(record, last_modified);
        }
        let index = builder.finish();

        let metadata = ScanMetadata {
            roots: self
                .config
                .scan_roots
                .iter()
                .map(|r| r.to_string_lossy().into_owned())
                .collect(),
            include: self.config.include.clone(),
            exclude: self.config.exclude.clone(),
            total_files: files.len() as u32,
            total_resources: index.len() as u32,
            scan_duration_ms: started.elapsed().as_millis() as u64,
        };

        Ok(IndexEnvelope {
            version: CODEC_VERSION.to_owned(),
            indexed_at: persist::now_millis(),
            tool_version: TOOL_VERSION.to_owned(),
            metadata,
            files,
            config_fingerprint: self.config.fingerprint(),
            index,
        })
    }

    fn build_and_persist(&self, cancel: &CancelToken) -> Result<IndexEnvelope, BuildError> {
        let mut envelope = self.build(cancel)?;

        match persist::write(&mut envelope, &self.config.index_path, cancel) {
            Ok(()) => Ok(envelope),
            Err(PersistError::Cancelled(_)) => Err(BuildError::Cancelled),
            Err(err) => {
                // The in-memory build is still good; the next call rebuilds.
                log::warn!("failed to persist index: {err}");
                Ok(envelope)
            }
        }
    }
}
