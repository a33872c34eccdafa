//! Query engine: selectors, set algebra, post-filters and aggregations
//!
//! Every operation returns a fresh [`ResultSet`] borrowing resources from
//! the loaded index; nothing mutates the index or a prior result set. Binary
//! combinators build a hash set of identifiers from one side so they stay
//! O(N + M).
//!
//! Unknown framework or evidence-task names are soft failures: they produce
//! an empty result set whose metadata carries an `error` entry, never a
//! panic or an `Err`.

use crate::taxonomy::Taxonomy;
use crate::types::{
    ComplianceStatus, IndexedResource, RiskLevel, SecurityAttribute, SecurityIndex,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::time::{Duration, Instant};

/// Ordered resources plus provenance metadata
#[derive(Debug, Clone)]
pub struct ResultSet<'a> {
    /// Matching resources, in a deterministic order
    pub resources: Vec<&'a IndexedResource>,
    /// Time spent producing this set
    pub elapsed: Duration,
    /// How the set was produced: query kind, parameters, elapsed time,
    /// and an `error` entry for soft failures
    pub metadata: BTreeMap<String, String>,
}

impl<'a> ResultSet<'a> {
    /// Number of resources in the set
    pub fn count(&self) -> usize {
        self.resources.len()
    }

    /// The `error` metadata entry, if the producing query soft-failed
    pub fn error(&self) -> Option<&str> {
        self.metadata.get("error").map(String::as_str)
    }

    fn finish(
        kind: &str,
        params: Vec<(&'static str, String)>,
        resources: Vec<&'a IndexedResource>,
        started: Instant,
    ) -> Self {
        let elapsed = started.elapsed();
        let mut metadata = BTreeMap::new();
        metadata.insert("query".to_owned(), kind.to_owned());
        metadata.insert("elapsed_us".to_owned(), elapsed.as_micros().to_string());
        for (key, value) in params {
            metadata.insert(key.to_owned(), value);
        }
        Self { resources, elapsed, metadata }
    }

    fn soft_failure(kind: &str, error: String, started: Instant) -> Self {
        let mut set = Self::finish(kind, Vec::new(), Vec::new(), started);
        set.metadata.insert("error".to_owned(), error);
        set
    }
}

/// Sortable fields of an indexed resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortField {
    Id,
    ResourceType,
    Environment,
    FilePath,
    RiskLevel,
    ComplianceStatus,
}

/// Sort direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    Ascending,
    Descending,
}

/// Grouping key for aggregations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupBy {
    RiskLevel,
    Environment,
    ComplianceStatus,
    ResourceType,
}

/// The enumerated query-request record
///
/// Every populated selector is evaluated and the results intersected; an
/// empty request selects the whole index. Anything outside these fields is
/// not a recognized query option.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryRequest {
    pub control_codes: Vec<String>,
    pub security_attributes: Vec<SecurityAttribute>,
    pub environments: Vec<String>,
    pub resource_types: Vec<String>,
    pub risk_levels: Vec<RiskLevel>,
    pub compliance_statuses: Vec<ComplianceStatus>,
    pub evidence_task: Option<String>,
    pub frameworks: Vec<String>,
    pub include_metadata: bool,
}

impl Default for QueryRequest {
    fn default() -> Self {
        Self {
            control_codes: Vec::new(),
            security_attributes: Vec::new(),
            environments: Vec::new(),
            resource_types: Vec::new(),
            risk_levels: Vec::new(),
            compliance_statuses: Vec::new(),
            evidence_task: None,
            frameworks: Vec::new(),
            include_metadata: true,
        }
    }
}

/// Read-only query interface over a loaded index
pub struct QueryEngine<'a> {
    index: &'a SecurityIndex,
    taxonomy: &'a Taxonomy,
}

impl<'a> QueryEngine<'a> {
    pub fn new(index: &'a SecurityIndex, taxonomy: &'a Taxonomy) -> Self {
        Self { index, taxonomy }
    }

    /// Every indexed resource, in scan order
    pub fn all(&self) -> ResultSet<'a> {
        let started = Instant::now();
        let resources = self.index.resources.iter().collect();
        ResultSet::finish("all", Vec::new(), resources, started)
    }

    /// Union of `control_map[code]` over the requested codes
    pub fn by_control(&self, codes: &[&str]) -> ResultSet<'a> {
        let started = Instant::now();
        let resources = self.control_union(codes);
        ResultSet::finish(
            "by_control",
            vec![("control_codes", codes.join(","))],
            resources,
            started,
        )
    }

    /// Translate frameworks to control codes, then select by control
    pub fn by_framework(&self, frameworks: &[&str]) -> ResultSet<'a> {
        let started = Instant::now();

        let mut codes: Vec<&str> = Vec::new();
        for framework in frameworks {
            match self.taxonomy.framework_controls(framework) {
                Some(framework_codes) => {
                    for code in framework_codes {
                        if !codes.contains(&code.as_str()) {
                            codes.push(code.as_str());
                        }
                    }
                }
                None => {
                    return ResultSet::soft_failure(
                        "by_framework",
                        format!("unknown framework: {framework}"),
                        started,
                    );
                }
            }
        }

        let resources = self.control_union(&codes);
        ResultSet::finish(
            "by_framework",
            vec![("frameworks", frameworks.join(","))],
            resources,
            started,
        )
    }

    /// Resources whose attribute list intersects the request
    pub fn by_attribute(&self, attributes: &[SecurityAttribute]) -> ResultSet<'a> {
        let started = Instant::now();
        let resources = self
            .index
            .resources
            .iter()
            .filter(|r| r.security_attributes.iter().any(|a| attributes.contains(a)))
            .collect();
        let rendered: Vec<&str> = attributes.iter().map(|a| a.name()).collect();
        ResultSet::finish(
            "by_attribute",
            vec![("security_attributes", rendered.join(","))],
            resources,
            started,
        )
    }

    /// Membership test on the resource type
    pub fn by_resource_type(&self, types: &[&str]) -> ResultSet<'a> {
        let started = Instant::now();
        let resources = self
            .index
            .resources
            .iter()
            .filter(|r| types.contains(&r.resource_type.as_str()))
            .collect();
        ResultSet::finish(
            "by_resource_type",
            vec![("resource_types", types.join(","))],
            resources,
            started,
        )
    }

    /// Membership test on the environment tag
    pub fn by_environment(&self, environments: &[&str]) -> ResultSet<'a> {
        let started = Instant::now();
        let resources = self
            .index
            .resources
            .iter()
            .filter(|r| environments.contains(&r.environment.as_str()))
            .collect();
        ResultSet::finish(
            "by_environment",
            vec![("environments", environments.join(","))],
            resources,
            started,
        )
    }

    /// Membership test on the risk level
    pub fn by_risk_level(&self, levels: &[RiskLevel]) -> ResultSet<'a> {
        let started = Instant::now();
        let resources = self
            .index
            .resources
            .iter()
            .filter(|r| levels.contains(&r.risk_level))
            .collect();
        let rendered: Vec<&str> = levels.iter().map(|l| l.name()).collect();
        ResultSet::finish(
            "by_risk_level",
            vec![("risk_levels", rendered.join(","))],
            resources,
            started,
        )
    }

    /// Membership test on the compliance status
    pub fn by_compliance_status(&self, statuses: &[ComplianceStatus]) -> ResultSet<'a> {
        let started = Instant::now();
        let resources = self
            .index
            .resources
            .iter()
            .filter(|r| statuses.contains(&r.compliance_status))
            .collect();
        let rendered: Vec<&str> = statuses.iter().map(|s| s.name()).collect();
        ResultSet::finish(
            "by_compliance_status",
            vec![("compliance_statuses", rendered.join(","))],
            resources,
            started,
        )
    }

    /// Controls of the task first, then resources matching its attributes
    /// that are not already included
    pub fn by_evidence_task(&self, task: &str) -> ResultSet<'a> {
        let started = Instant::now();

        let Some(task_def) = self.taxonomy.evidence_task(task) else {
            return ResultSet::soft_failure(
                "by_evidence_task",
                format!("unknown evidence task: {task}"),
                started,
            );
        };

        let codes: Vec<&str> = task_def.controls.iter().map(String::as_str).collect();
        let mut resources = self.control_union(&codes);
        let mut seen: HashSet<&str> = resources.iter().map(|r| r.id.as_str()).collect();

        for resource in &self.index.resources {
            if seen.contains(resource.id.as_str()) {
                continue;
            }
            if resource
                .security_attributes
                .iter()
                .any(|a| task_def.attributes.contains(a))
            {
                seen.insert(resource.id.as_str());
                resources.push(resource);
            }
        }

        ResultSet::finish(
            "by_evidence_task",
            vec![("evidence_task", task.to_owned())],
            resources,
            started,
        )
    }

    /// Evaluate a request record: intersect every populated selector
    pub fn run(&self, request: &QueryRequest) -> ResultSet<'a> {
        let started = Instant::now();
        let mut sets: Vec<ResultSet<'a>> = Vec::new();

        if !request.control_codes.is_empty() {
            let codes: Vec<&str> = request.control_codes.iter().map(String::as_str).collect();
            sets.push(self.by_control(&codes));
        }
        if !request.frameworks.is_empty() {
            let names: Vec<&str> = request.frameworks.iter().map(String::as_str).collect();
            sets.push(self.by_framework(&names));
        }
        if !request.security_attributes.is_empty() {
            sets.push(self.by_attribute(&request.security_attributes));
        }
        if !request.environments.is_empty() {
            let envs: Vec<&str> = request.environments.iter().map(String::as_str).collect();
            sets.push(self.by_environment(&envs));
        }
        if !request.resource_types.is_empty() {
            let types: Vec<&str> = request.resource_types.iter().map(String::as_str).collect();
            sets.push(self.by_resource_type(&types));
        }
        if !request.risk_levels.is_empty() {
            sets.push(self.by_risk_level(&request.risk_levels));
        }
        if !request.compliance_statuses.is_empty() {
            sets.push(self.by_compliance_status(&request.compliance_statuses));
        }
        if let Some(task) = &request.evidence_task {
            sets.push(self.by_evidence_task(task));
        }

        let mut result = if sets.is_empty() {
            self.all()
        } else {
            // The first soft failure poisons the whole request
            if let Some(failed) = sets.iter().position(|s| s.error().is_some()) {
                let error = sets[failed].metadata.get("error").cloned().unwrap_or_default();
                ResultSet::soft_failure("run", error, started)
            } else {
                let mut combined = intersect(&sets);
                combined.metadata.insert("query".to_owned(), "run".to_owned());
                combined
            }
        };

        if !request.include_metadata {
            result.metadata.clear();
        }
        result
    }

    fn control_union(&self, codes: &[&str]) -> Vec<&'a IndexedResource> {
        let mut seen: HashSet<&str> = HashSet::new();
        let mut resources = Vec::new();
        for code in codes {
            let Some(members) = self.index.control_map.get(*code) else {
                continue;
            };
            for resource in self.index.resolve(members) {
                if seen.insert(resource.id.as_str()) {
                    resources.push(resource);
                }
            }
        }
        resources
    }
}

/// Resources present in every input set, in the first input's order
pub fn intersect<'a>(sets: &[ResultSet<'a>]) -> ResultSet<'a> {
    let started = Instant::now();

    let Some((first, rest)) = sets.split_first() else {
        return ResultSet::finish("intersect", Vec::new(), Vec::new(), started);
    };

    let memberships: Vec<HashSet<&str>> = rest
        .iter()
        .map(|set| set.resources.iter().map(|r| r.id.as_str()).collect())
        .collect();

    let resources = first
        .resources
        .iter()
        .filter(|r| memberships.iter().all(|ids| ids.contains(r.id.as_str())))
        .copied()
        .collect();

    ResultSet::finish(
        "intersect",
        vec![("inputs", sets.len().to_string())],
        resources,
        started,
    )
}

/// Resources present in any input set; first appearance wins the ordering
pub fn union<'a>(sets: &[ResultSet<'a>]) -> ResultSet<'a> {
    let started = Instant::now();

    let mut seen: HashSet<&str> = HashSet::new();
    let mut resources = Vec::new();
    for set in sets {
        for resource in &set.resources {
            if seen.insert(resource.id.as_str()) {
                resources.push(*resource);
            }
        }
    }

    ResultSet::finish(
        "union",
        vec![("inputs", sets.len().to_string())],
        resources,
        started,
    )
}

/// Base minus second, in the base's order
pub fn exclude<'a>(base: &ResultSet<'a>, minus: &ResultSet<'a>) -> ResultSet<'a> {
    let started = Instant::now();

    let removed: HashSet<&str> = minus.resources.iter().map(|r| r.id.as_str()).collect();
    let resources = base
        .resources
        .iter()
        .filter(|r| !removed.contains(r.id.as_str()))
        .copied()
        .collect();

    ResultSet::finish("exclude", Vec::new(), resources, started)
}

/// Keep resources satisfying `predicate`, preserving insertion order
pub fn filter<'a, P>(set: &ResultSet<'a>, predicate: P) -> ResultSet<'a>
where
    P: Fn(&IndexedResource) -> bool,
{
    let started = Instant::now();
    let resources = set
        .resources
        .iter()
        .filter(|r| predicate(r))
        .copied()
        .collect();
    ResultSet::finish("filter", Vec::new(), resources, started)
}

/// Sort by a named field; ties fall back to the resource identifier
pub fn sort<'a>(set: &ResultSet<'a>, field: SortField, order: SortOrder) -> ResultSet<'a> {
    let started = Instant::now();

    let mut resources = set.resources.clone();
    resources.sort_by(|a, b| {
        let primary = match field {
            SortField::Id => a.id.cmp(&b.id),
            SortField::ResourceType => a.resource_type.cmp(&b.resource_type),
            SortField::Environment => a.environment.cmp(&b.environment),
            SortField::FilePath => a.file_path.cmp(&b.file_path),
            SortField::RiskLevel => a.risk_level.cmp(&b.risk_level),
            SortField::ComplianceStatus => {
                a.compliance_status.severity().cmp(&b.compliance_status.severity())
            }
        };
        let primary = match order {
            SortOrder::Ascending => primary,
            SortOrder::Descending => primary.reverse(),
        };
        primary.then_with(|| a.id.cmp(&b.id))
    });

    ResultSet::finish("sort", Vec::new(), resources, started)
}

/// Truncate to the first `n` resources
pub fn limit<'a>(set: &ResultSet<'a>, n: usize) -> ResultSet<'a> {
    let started = Instant::now();
    let resources = set.resources.iter().take(n).copied().collect();
    ResultSet::finish("limit", vec![("limit", n.to_string())], resources, started)
}

/// Count resources grouped by the requested key
pub fn aggregate(set: &ResultSet<'_>, group: GroupBy) -> BTreeMap<String, usize> {
    let mut counts: BTreeMap<String, usize> = BTreeMap::new();
    for resource in &set.resources {
        let key = match group {
            GroupBy::RiskLevel => resource.risk_level.name().to_owned(),
            GroupBy::Environment => resource.environment.clone(),
            GroupBy::ComplianceStatus => resource.compliance_status.name().to_owned(),
            GroupBy::ResourceType => resource.resource_type.clone(),
        };
        *counts.entry(key).or_default() += 1;
    }
    counts
}
