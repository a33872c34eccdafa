//! Core type definitions for the terraudit engine

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Closed vocabulary of security attributes
///
/// Every attribute on an indexed resource comes from this set; additions
/// require a codec-version bump.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SecurityAttribute {
    Encryption,
    AccessControl,
    NetworkSecurity,
    Monitoring,
    Backup,
    DataProtection,
    SslTls,
    IdentityManagement,
    HighAvailability,
}

impl SecurityAttribute {
    /// All attributes, in canonical order
    pub const ALL: [Self; 9] = [
        Self::Encryption,
        Self::AccessControl,
        Self::NetworkSecurity,
        Self::Monitoring,
        Self::Backup,
        Self::DataProtection,
        Self::SslTls,
        Self::IdentityManagement,
        Self::HighAvailability,
    ];

    /// Wire name (matches the serialized form)
    pub fn name(&self) -> &'static str {
        match self {
            Self::Encryption => "encryption",
            Self::AccessControl => "access_control",
            Self::NetworkSecurity => "network_security",
            Self::Monitoring => "monitoring",
            Self::Backup => "backup",
            Self::DataProtection => "data_protection",
            Self::SslTls => "ssl_tls",
            Self::IdentityManagement => "identity_management",
            Self::HighAvailability => "high_availability",
        }
    }

    /// Parse a wire name
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|a| a.name() == name)
    }
}

impl fmt::Display for SecurityAttribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Risk level of a resource
///
/// Derived `Ord` follows severity: `Low < Medium < High`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    /// Wire name (matches the serialized form)
    pub fn name(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }

    /// Parse a wire name
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "low" => Some(Self::Low),
            "medium" => Some(Self::Medium),
            "high" => Some(Self::High),
            _ => None,
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Compliance status of a resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComplianceStatus {
    Compliant,
    PartiallyCompliant,
    NonCompliant,
    NotApplicable,
}

impl ComplianceStatus {
    /// Wire name (matches the serialized form)
    pub fn name(&self) -> &'static str {
        match self {
            Self::Compliant => "compliant",
            Self::PartiallyCompliant => "partially_compliant",
            Self::NonCompliant => "non_compliant",
            Self::NotApplicable => "not_applicable",
        }
    }

    /// Parse a wire name
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "compliant" => Some(Self::Compliant),
            "partially_compliant" => Some(Self::PartiallyCompliant),
            "non_compliant" => Some(Self::NonCompliant),
            "not_applicable" => Some(Self::NotApplicable),
            _ => None,
        }
    }

    /// Ordering weight for sorting: `non_compliant` is the most severe,
    /// `not_applicable` the least.
    pub fn severity(&self) -> u8 {
        match self {
            Self::NonCompliant => 3,
            Self::PartiallyCompliant => 2,
            Self::Compliant => 1,
            Self::NotApplicable => 0,
        }
    }
}

impl fmt::Display for ComplianceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A value in a resource's filtered configuration
///
/// Configurations are tagged-variant trees so the classifier and query
/// engine can pattern-match instead of reflecting over dynamic maps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConfigValue {
    Bool(bool),
    Int(i64),
    String(String),
    List(Vec<ConfigValue>),
    Map(BTreeMap<String, ConfigValue>),
}

impl ConfigValue {
    /// The string payload, for scalar string values
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Does this value, or any nested value, contain `needle` in its
    /// textual form?
    pub fn contains_text(&self, needle: &str) -> bool {
        match self {
            Self::Bool(b) => (if *b { "true" } else { "false" }).contains(needle),
            Self::Int(i) => i.to_string().contains(needle),
            Self::String(s) => s.contains(needle),
            Self::List(items) => items.iter().any(|v| v.contains_text(needle)),
            Self::Map(entries) => entries.values().any(|v| v.contains_text(needle)),
        }
    }
}

/// Shallow configuration map attached to a resource
pub type ConfigMap = BTreeMap<String, ConfigValue>;

/// A resource block as emitted by the scanner
///
/// Transient: consumed by the classifier and index builder, never persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceRecord {
    /// Resource type, e.g. `aws_s3_bucket`
    pub resource_type: String,
    /// Resource name (the second block label)
    pub name: String,
    /// Display path of the owning file
    pub file_path: String,
    /// First line of the block (1-based, inclusive)
    pub line_start: u32,
    /// Last line of the block (1-based, inclusive)
    pub line_end: u32,
    /// Top-level attribute assignments, values with quotes stripped
    pub config: ConfigMap,
    /// Initial control codes from the exact taxonomy lookup
    pub control_codes: Vec<String>,
}

/// The canonical entity exposed by the index
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexedResource {
    /// Stable identifier: `type.name`, disambiguated with
    /// `@<file_path>:<line_start>` on collision
    pub id: String,
    /// Resource type
    pub resource_type: String,
    /// Resource name
    pub name: String,
    /// Display path of the owning file
    pub file_path: String,
    /// Line span rendered as `start-end`
    pub line_range: String,
    /// Deployment environment derived from the file path
    pub environment: String,
    /// Security attributes (closed vocabulary)
    pub security_attributes: Vec<SecurityAttribute>,
    /// Compliance-control codes this resource is relevant to
    pub control_relevance: Vec<String>,
    /// Risk level
    pub risk_level: RiskLevel,
    /// Compliance status
    pub compliance_status: ComplianceStatus,
    /// Filtered configuration map
    pub config: ConfigMap,
    /// Last-modified time of the owning file, epoch milliseconds
    pub last_modified: u64,
}

/// Per-attribute aggregate statistics
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AttributeStats {
    /// Number of resources carrying the attribute
    pub count: u32,
    /// Earliest owning-file mtime among those resources, epoch ms
    pub first_seen: u64,
    /// Latest owning-file mtime among those resources, epoch ms
    pub last_seen: u64,
}

/// Per-environment aggregate statistics
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EnvironmentStats {
    /// Number of resources in the environment
    pub count: u32,
    /// Resource counts per risk level
    pub by_risk: BTreeMap<RiskLevel, u32>,
}

/// Aggregate statistics over the whole index
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IndexStats {
    /// Security attribute -> {count, first-seen, last-seen}
    pub attribute_stats: BTreeMap<SecurityAttribute, AttributeStats>,
    /// Risk level -> resource count
    pub risk_distribution: BTreeMap<RiskLevel, u32>,
    /// Environment -> {count, per-risk counts}
    pub environment_stats: BTreeMap<String, EnvironmentStats>,
    /// (compliant + partially_compliant) / (total - not_applicable),
    /// zero when the denominator is zero
    pub compliance_coverage: f64,
}

/// The in-memory security index
///
/// The resource list preserves scan order. Inverted maps hold indices into
/// that list rather than owned copies, so the envelope stays a tree.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SecurityIndex {
    /// Indexed resources in scan order
    pub resources: Vec<IndexedResource>,
    /// Control code -> indices of relevant resources
    pub control_map: BTreeMap<String, Vec<usize>>,
    /// Framework name -> indices of resources relevant to any of its controls
    pub framework_map: BTreeMap<String, Vec<usize>>,
    /// Aggregate statistics
    pub stats: IndexStats,
}

impl SecurityIndex {
    /// Number of indexed resources
    pub fn len(&self) -> usize {
        self.resources.len()
    }

    /// Is the index empty?
    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    /// Resolve a list of indices to resource references
    pub fn resolve(&self, indices: &[usize]) -> Vec<&IndexedResource> {
        indices.iter().filter_map(|&i| self.resources.get(i)).collect()
    }
}

/// Metadata describing how a scan was performed
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScanMetadata {
    /// Scan roots, as configured
    pub roots: Vec<String>,
    /// Include patterns, as configured
    pub include: Vec<String>,
    /// Exclude patterns, as configured
    pub exclude: Vec<String>,
    /// Number of files scanned
    pub total_files: u32,
    /// Number of resources extracted
    pub total_resources: u32,
    /// Wall-clock scan duration in milliseconds
    pub scan_duration_ms: u64,
}

/// Inventory entry for one scanned source file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SourceFileMeta {
    /// Modification time, epoch milliseconds
    pub mtime_ms: u64,
    /// Size in bytes
    pub size: u64,
    /// MD5 content checksum, lowercase hex
    pub checksum: String,
}

/// The persisted on-disk artifact wrapping a [`SecurityIndex`]
///
/// Unknown fields are ignored on read; format changes bump the codec
/// version, which forces a rebuild.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IndexEnvelope {
    /// Codec version string; must match exactly on load
    pub version: String,
    /// Build completion time, epoch milliseconds
    pub indexed_at: u64,
    /// Identifier of the tool that wrote the envelope
    pub tool_version: String,
    /// Scan metadata
    pub metadata: ScanMetadata,
    /// Source-file inventory: display path -> {mtime, size, checksum}
    pub files: BTreeMap<String, SourceFileMeta>,
    /// Fingerprint of scan roots and glob patterns
    pub config_fingerprint: String,
    /// The index itself
    pub index: SecurityIndex,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attribute_wire_names_round_trip() {
        for attr in SecurityAttribute::ALL {
            assert_eq!(SecurityAttribute::from_name(attr.name()), Some(attr));
        }
        assert_eq!(SecurityAttribute::SslTls.name(), "ssl_tls");
        assert_eq!(SecurityAttribute::from_name("bogus"), None);
    }

    #[test]
    fn test_risk_ordering_follows_severity() {
        assert!(RiskLevel::Low < RiskLevel::Medium);
        assert!(RiskLevel::Medium < RiskLevel::High);
    }

    #[test]
    fn test_compliance_severity_ordering() {
        let mut statuses = [
            ComplianceStatus::Compliant,
            ComplianceStatus::NotApplicable,
            ComplianceStatus::NonCompliant,
            ComplianceStatus::PartiallyCompliant,
        ];
        statuses.sort_by_key(|s| std::cmp::Reverse(s.severity()));
        assert_eq!(
            statuses,
            [
                ComplianceStatus::NonCompliant,
                ComplianceStatus::PartiallyCompliant,
                ComplianceStatus::Compliant,
                ComplianceStatus::NotApplicable,
            ]
        );
    }

    #[test]
    fn test_config_value_contains_text() {
        let mut map = BTreeMap::new();
        map.insert(
            "cidr_blocks".to_owned(),
            ConfigValue::List(vec![ConfigValue::String("0.0.0.0/0".to_owned())]),
        );
        let value = ConfigValue::Map(map);
        assert!(value.contains_text("0.0.0.0/0"));
        assert!(!value.contains_text("10.0.0.0/8"));
    }

    #[test]
    fn test_config_value_serializes_untagged() {
        let value = ConfigValue::List(vec![
            ConfigValue::String("a".to_owned()),
            ConfigValue::Int(2),
            ConfigValue::Bool(true),
        ]);
        let json = serde_json::to_string(&value).unwrap();
        assert_eq!(json, r#"["a",2,true]"#);
        let back: ConfigValue = serde_json::from_str(&json).unwrap();
        assert_eq!(back, value);
    }

    #[test]
    fn test_enum_keys_serialize_as_strings() {
        let mut stats = IndexStats::default();
        stats.risk_distribution.insert(RiskLevel::High, 3);
        let json = serde_json::to_string(&stats).unwrap();
        assert!(json.contains(r#""high":3"#));
    }
}
