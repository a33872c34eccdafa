//! Index assembly: classified records in, security index out
//!
//! The builder consumes records in scan order and is fully deterministic:
//! a fixed input sequence yields byte-identical serialized output. All maps
//! are `BTreeMap`s, resource identifiers are assigned in insertion order,
//! and inverted maps store indices into the canonical resource list.

use crate::classifier;
use crate::taxonomy::Taxonomy;
use crate::types::{
    AttributeStats, ComplianceStatus, IndexedResource, ResourceRecord, SecurityIndex,
};
use std::collections::BTreeSet;

/// Assembles a [`SecurityIndex`] from classified resource records
pub struct IndexBuilder<'a> {
    taxonomy: &'a Taxonomy,
    index: SecurityIndex,
    seen_ids: BTreeSet<String>,
    applicable: u32,
    covered: u32,
}

impl<'a> IndexBuilder<'a> {
    /// Start a new build against `taxonomy`
    pub fn new(taxonomy: &'a Taxonomy) -> Self {
        Self {
            taxonomy,
            index: SecurityIndex::default(),
            seen_ids: BTreeSet::new(),
            applicable: 0,
            covered: 0,
        }
    }

    /// Classify `record` and append it to the index
    ///
    /// `last_modified` is the owning file's mtime in epoch milliseconds.
    pub fn add(&mut self, record: ResourceRecord, last_modified: u64) {
        let classification = classifier::classify(&record, self.taxonomy);
        let id = self.assign_id(&record);
        let position = self.index.resources.len();

        for code in &classification.control_relevance {
            self.index
                .control_map
                .entry(code.clone())
                .or_default()
                .push(position);
        }

        for framework in self.taxonomy.framework_names() {
            let codes = self
                .taxonomy
                .framework_controls(framework)
                .unwrap_or(&[]);
            if classification
                .control_relevance
                .iter()
                .any(|code| codes.contains(code))
            {
                self.index
                    .framework_map
                    .entry(framework.to_owned())
                    .or_default()
                    .push(position);
            }
        }

        for attribute in &classification.security_attributes {
            let stats = self
                .index
                .stats
                .attribute_stats
                .entry(*attribute)
                .or_insert_with(|| AttributeStats {
                    count: 0,
                    first_seen: last_modified,
                    last_seen: last_modified,
                });
            stats.count += 1;
            stats.first_seen = stats.first_seen.min(last_modified);
            stats.last_seen = stats.last_seen.max(last_modified);
        }

        *self
            .index
            .stats
            .risk_distribution
            .entry(classification.risk_level)
            .or_default() += 1;

        let env_stats = self
            .index
            .stats
            .environment_stats
            .entry(classification.environment.clone())
            .or_default();
        env_stats.count += 1;
        *env_stats.by_risk.entry(classification.risk_level).or_default() += 1;

        match classification.compliance_status {
            ComplianceStatus::Compliant | ComplianceStatus::PartiallyCompliant => {
                self.applicable += 1;
                self.covered += 1;
            }
            ComplianceStatus::NonCompliant => self.applicable += 1,
            ComplianceStatus::NotApplicable => {}
        }

        self.index.resources.push(IndexedResource {
            id,
            resource_type: record.resource_type,
            name: record.name,
            file_path: record.file_path,
            line_range: format!("{}-{}", record.line_start, record.line_end),
            environment: classification.environment,
            security_attributes: classification.security_attributes,
            control_relevance: classification.control_relevance,
            risk_level: classification.risk_level,
            compliance_status: classification.compliance_status,
            config: record.config,
            last_modified,
        });
    }

    /// Finalize statistics and return the index
    pub fn finish(mut self) -> SecurityIndex {
        self.index.stats.compliance_coverage = if self.applicable == 0 {
            0.0
        } else {
            f64::from(self.covered) / f64::from(self.applicable)
        };
        self.index
    }

    /// `type.name`, disambiguated with `@<file>:<line>` when already taken
    fn assign_id(&mut self, record: &ResourceRecord) -> String {
        let short = format!("{}.{}", record.resource_type, record.name);
        let id = if self.seen_ids.contains(&short) {
            format!("{short}@{}:{}", record.file_path, record.line_start)
        } else {
            short
        };
        self.seen_ids.insert(id.clone());
        id
    }
}

/// Build an index from records and their owning-file mtimes
pub fn build_index<I>(taxonomy: &Taxonomy, records: I) -> SecurityIndex
where
    I: IntoIterator<Item = (ResourceRecord, u64)>,
{
    let mut builder = IndexBuilder::new(taxonomy);
    for (record, last_modified) in records {
        builder.add(record, last_modified);
    }
    builder.finish()
}
