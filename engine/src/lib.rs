//! Terraudit Engine - Security-attribute indexing for infrastructure-as-code
//!
//! This crate provides the core logic for scanning Terraform HCL trees (and
//! optional multi-environment stack YAML), classifying resources against
//! compliance controls, and serving structured queries over the result:
//!
//! - Deterministic repository scanning with include/exclude globs
//! - Line-based extraction of `resource` blocks with line spans
//! - Classification into control codes, security attributes, environment,
//!   risk level and compliance status
//! - An inverted index with aggregate statistics
//! - A persistent, gzip-compressed, versioned on-disk cache
//! - Fast and deep cache validation with incremental invalidation
//! - A composable query algebra (selectors, set operations, aggregations)
//!
//! # Example
//!
//! ```rust,ignore
//! use terraudit_engine::{CancelToken, IndexConfig, Indexer, QueryEngine};
//!
//! let config = IndexConfig::load_or_default(std::path::Path::new("."))?;
//! let indexer = Indexer::new(config);
//! let envelope = indexer.load_or_build(false, &CancelToken::new())?;
//!
//! let engine = QueryEngine::new(&envelope.index, indexer.taxonomy());
//! let open = engine.by_compliance_status(&[ComplianceStatus::NonCompliant]);
//! for resource in &open.resources {
//!     println!("{} ({})", resource.id, resource.file_path);
//! }
//! ```

// Core modules
pub mod cancel;
pub mod checksum;
pub mod classifier;
pub mod config;
pub mod extract;
pub mod globs;
pub mod index;
pub mod orchestrator;
pub mod persist;
pub mod query;
pub mod scanner;
pub mod stacks;
pub mod taxonomy;
pub mod types;
pub mod validate;

// Re-exports from core modules
pub use cancel::{CancelToken, Cancelled};
pub use config::{ConfigError, IndexConfig, CODEC_VERSION, TOOL_VERSION};
pub use extract::HclExtractor;
pub use globs::PathFilter;
pub use index::{build_index, IndexBuilder};
pub use orchestrator::{BuildError, Indexer};
pub use persist::{PersistError, ValidateError};
pub use query::{
    aggregate, exclude, filter, intersect, limit, sort, union, GroupBy, QueryEngine,
    QueryRequest, ResultSet, SortField, SortOrder,
};
pub use scanner::{ScanError, ScanOutcome, Scanner};
pub use taxonomy::{EvidenceTask, Taxonomy};
pub use types::*;
pub use validate::{RebuildReason, Validation, Validator};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
