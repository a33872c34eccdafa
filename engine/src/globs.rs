//! Include/exclude path filtering with shell glob patterns
//!
//! A pattern without a path separator is matched against the file name only;
//! a pattern containing `/` is matched against the full display path. A file
//! is selected when at least one include pattern matches and no exclude
//! pattern matches.

use glob::{Pattern, PatternError};
use thiserror::Error;

/// A glob pattern failed to compile
#[derive(Debug, Error)]
#[error("invalid glob pattern {pattern:?}")]
pub struct InvalidPattern {
    /// The offending pattern text
    pub pattern: String,
    #[source]
    source: PatternError,
}

/// Compiled include/exclude filter
#[derive(Debug, Clone)]
pub struct PathFilter {
    includes: Vec<Pattern>,
    excludes: Vec<Pattern>,
}

impl PathFilter {
    /// Compile include and exclude pattern lists
    pub fn new(include: &[String], exclude: &[String]) -> Result<Self, InvalidPattern> {
        Ok(Self {
            includes: compile(include)?,
            excludes: compile(exclude)?,
        })
    }

    /// Should the file at `path` (display form, `/`-separated) be scanned?
    pub fn matches(&self, path: &str) -> bool {
        let name = path.rsplit('/').next().unwrap_or(path);

        let included = self.includes.iter().any(|p| matches_one(p, path, name));
        if !included {
            return false;
        }

        !self.excludes.iter().any(|p| matches_one(p, path, name))
    }
}

fn compile(patterns: &[String]) -> Result<Vec<Pattern>, InvalidPattern> {
    patterns
        .iter()
        .map(|text| {
            Pattern::new(text).map_err(|source| InvalidPattern {
                pattern: text.clone(),
                source,
            })
        })
        .collect()
}

fn matches_one(pattern: &Pattern, path: &str, name: &str) -> bool {
    if pattern.as_str().contains('/') {
        pattern.matches(path)
    } else {
        pattern.matches(name)
    }
}
