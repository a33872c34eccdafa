//! Resource classification: attributes, environment, risk, compliance
//!
//! A pure function from a scanned resource record to the annotations carried
//! by an indexed resource. Identical inputs produce identical outputs; no
//! filesystem or clock access happens here.

use crate::taxonomy::Taxonomy;
use crate::types::{ComplianceStatus, ResourceRecord, RiskLevel, SecurityAttribute};

/// Path segments that name repository structure, never an environment
const STRUCTURAL_SEGMENTS: &[&str] = &[
    "stacks",
    "components",
    "terraform",
    "modules",
    "configs",
    "common",
    "shared",
    "global",
    "base",
];

/// Environment keywords in priority order: (segment, canonical tag)
const ENVIRONMENT_KEYWORDS: &[(&str, &str)] = &[
    ("production", "prod"),
    ("prod", "prod"),
    ("staging", "staging"),
    ("stage", "staging"),
    ("development", "dev"),
    ("dev", "dev"),
    ("test", "test"),
];

/// Keyword rules over the lowercased resource type
const TYPE_ATTRIBUTE_RULES: &[(&[&str], &[SecurityAttribute])] = &[
    (&["kms", "encrypt"], &[SecurityAttribute::Encryption]),
    (
        &["iam"],
        &[SecurityAttribute::IdentityManagement, SecurityAttribute::AccessControl],
    ),
    (
        &["security_group", "firewall", "network", "vpc", "subnet"],
        &[SecurityAttribute::NetworkSecurity],
    ),
    (
        &["log", "monitor", "audit", "cloudtrail", "alarm"],
        &[SecurityAttribute::Monitoring],
    ),
    (&["backup", "snapshot"], &[SecurityAttribute::Backup]),
    (
        &["s3_bucket", "db_instance", "rds", "storage"],
        &[SecurityAttribute::DataProtection],
    ),
    (
        &["acm", "certificate", "ssl", "tls"],
        &[SecurityAttribute::SslTls],
    ),
    (
        &["autoscal", "scaling", "lb"],
        &[SecurityAttribute::HighAvailability],
    ),
];

/// Keyword rules over lowercased configuration keys
const KEY_ATTRIBUTE_RULES: &[(&[&str], SecurityAttribute)] = &[
    (&["encrypt", "kms"], SecurityAttribute::Encryption),
    (&["policy", "role", "access", "acl"], SecurityAttribute::AccessControl),
    (&["log", "monitor"], SecurityAttribute::Monitoring),
    (&["backup", "snapshot", "retention"], SecurityAttribute::Backup),
    (&["ssl", "tls", "certificate"], SecurityAttribute::SslTls),
    (&["versioning", "replication"], SecurityAttribute::DataProtection),
    (&["multi_az", "availability"], SecurityAttribute::HighAvailability),
    (&["cidr", "ingress", "egress"], SecurityAttribute::NetworkSecurity),
];

/// Resource-type substrings per risk tier; the first matching tier wins
const HIGH_RISK_TYPES: &[&str] = &["iam_user", "s3_bucket", "security_group", "db_instance"];
const MEDIUM_RISK_TYPES: &[&str] = &["kms_key", "cloudtrail", "vpc"];

/// Annotations derived for one resource record
#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    /// Environment tag, `unknown` when the path carries no signal
    pub environment: String,
    /// Security attributes, canonical order, deduplicated
    pub security_attributes: Vec<SecurityAttribute>,
    /// Control relevance (exact taxonomy plus keyword fallback)
    pub control_relevance: Vec<String>,
    /// Risk level
    pub risk_level: RiskLevel,
    /// Compliance status
    pub compliance_status: ComplianceStatus,
}

/// Classify one record against the taxonomy
pub fn classify(record: &ResourceRecord, taxonomy: &Taxonomy) -> Classification {
    let control_relevance = taxonomy.control_relevance(&record.resource_type);
    let security_attributes = derive_attributes(record);
    let environment = environment_from_path(&record.file_path);
    let risk_level = derive_risk(&record.resource_type);
    let compliance_status = derive_compliance(record, &control_relevance);

    Classification {
        environment,
        security_attributes,
        control_relevance,
        risk_level,
        compliance_status,
    }
}

/// Extract the environment tag from path segments
///
/// Segments are matched case-insensitively by exact equality against the
/// keyword table; structural folder names are skipped. The first matching
/// segment wins; `unknown` otherwise.
pub fn environment_from_path(path: &str) -> String {
    for segment in path.split('/') {
        let lowered = segment.to_lowercase();
        if STRUCTURAL_SEGMENTS.contains(&lowered.as_str()) {
            continue;
        }
        for (keyword, tag) in ENVIRONMENT_KEYWORDS {
            if lowered == *keyword {
                return (*tag).to_owned();
            }
        }
    }
    "unknown".to_owned()
}

fn derive_attributes(record: &ResourceRecord) -> Vec<SecurityAttribute> {
    let lowered_type = record.resource_type.to_lowercase();
    let mut found = Vec::new();

    for (keywords, attributes) in TYPE_ATTRIBUTE_RULES {
        if keywords.iter().any(|k| lowered_type.contains(k)) {
            for attr in *attributes {
                if !found.contains(attr) {
                    found.push(*attr);
                }
            }
        }
    }

    for key in record.config.keys() {
        let lowered_key = key.to_lowercase();
        for (keywords, attribute) in KEY_ATTRIBUTE_RULES {
            if keywords.iter().any(|k| lowered_key.contains(k)) && !found.contains(attribute) {
                found.push(*attribute);
            }
        }
    }

    found.sort();
    found
}

fn derive_risk(resource_type: &str) -> RiskLevel {
    let lowered = resource_type.to_lowercase();
    if HIGH_RISK_TYPES.iter().any(|t| lowered.contains(t)) {
        RiskLevel::High
    } else if MEDIUM_RISK_TYPES.iter().any(|t| lowered.contains(t)) {
        RiskLevel::Medium
    } else {
        RiskLevel::Low
    }
}

/// Issue severity found in a configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum IssueSeverity {
    Medium,
    High,
}

fn derive_compliance(record: &ResourceRecord, relevance: &[String]) -> ComplianceStatus {
    if relevance.is_empty() {
        return ComplianceStatus::NotApplicable;
    }

    match worst_issue(record) {
        Some(IssueSeverity::High) => ComplianceStatus::NonCompliant,
        Some(IssueSeverity::Medium) => ComplianceStatus::PartiallyCompliant,
        None => ComplianceStatus::Compliant,
    }
}

fn worst_issue(record: &ResourceRecord) -> Option<IssueSeverity> {
    let lowered_type = record.resource_type.to_lowercase();
    let mut worst: Option<IssueSeverity> = None;

    // Open CIDR ranges
    for (key, value) in &record.config {
        if key.to_lowercase().contains("cidr") && value.contains_text("0.0.0.0/0") {
            return Some(IssueSeverity::High);
        }
    }

    // S3 bucket with no encryption-related configuration
    if lowered_type.contains("s3_bucket")
        && !record.config.keys().any(|k| k.to_lowercase().contains("encrypt"))
    {
        return Some(IssueSeverity::High);
    }

    // RDS without storage encryption declared
    if (lowered_type.contains("db_instance") || lowered_type.contains("rds"))
        && !record.config.contains_key("storage_encrypted")
    {
        return Some(IssueSeverity::High);
    }

    // Wildcards in policy attributes
    for (key, value) in &record.config {
        if key.to_lowercase().contains("policy") && value.contains_text("*") {
            worst = worst.max(Some(IssueSeverity::Medium));
        }
    }

    worst
}
