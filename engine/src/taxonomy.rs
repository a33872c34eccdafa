//! Compliance-control taxonomy: resource types, frameworks, evidence tasks
//!
//! The taxonomy maps resource types to the control codes they are relevant
//! to, frameworks to their canonical control lists, and evidence tasks to
//! the controls and attributes that satisfy them. The built-in tables are
//! representative rather than authoritative; deployments can construct a
//! [`Taxonomy`] from their own tables.

use crate::types::SecurityAttribute;
use std::collections::BTreeMap;

/// Exact resource-type table: type -> control codes
const RESOURCE_CONTROLS: &[(&str, &[&str])] = &[
    ("aws_s3_bucket", &["CC6.8", "CC7.2"]),
    ("aws_s3_bucket_policy", &["CC6.1", "CC6.3"]),
    ("aws_iam_user", &["CC6.1", "CC6.2", "CC6.3"]),
    ("aws_iam_role", &["CC6.1", "CC6.3"]),
    ("aws_iam_policy", &["CC6.1", "CC6.3"]),
    ("aws_kms_key", &["CC6.8"]),
    ("aws_security_group", &["CC6.6", "CC7.1"]),
    ("aws_db_instance", &["CC6.1", "CC6.8"]),
    ("aws_rds_cluster", &["CC6.1", "CC6.8"]),
    ("aws_cloudtrail", &["CC7.2", "CC7.3"]),
    ("aws_cloudwatch_log_group", &["CC7.2"]),
    ("aws_cloudwatch_metric_alarm", &["CC7.2"]),
    ("aws_vpc", &["CC6.6"]),
    ("aws_subnet", &["CC6.6"]),
    ("aws_autoscaling_group", &["SO2"]),
    ("aws_backup_plan", &["A1.2"]),
    ("aws_acm_certificate", &["CC6.7"]),
    ("google_storage_bucket", &["CC6.8", "CC7.2"]),
    ("google_kms_crypto_key", &["CC6.8"]),
    ("azurerm_storage_account", &["CC6.8", "CC7.2"]),
    ("azurerm_key_vault", &["CC6.8"]),
];

/// Keyword fallback over the lowercased resource type
const KEYWORD_CONTROLS: &[(&[&str], &[&str])] = &[
    (&["iam"], &["CC6.1", "CC6.3"]),
    (&["kms", "encrypt"], &["CC6.8"]),
    (&["security_group", "firewall", "network"], &["CC6.6", "CC7.1"]),
    (&["log", "monitor", "audit"], &["CC7.2"]),
    (&["autoscal", "scaling"], &["SO2"]),
];

/// Framework name -> canonical control codes
const FRAMEWORKS: &[(&str, &[&str])] = &[
    (
        "SOC2",
        &[
            "CC6.1", "CC6.2", "CC6.3", "CC6.6", "CC6.7", "CC6.8", "CC7.1", "CC7.2", "CC7.3",
            "CC8.1",
        ],
    ),
    (
        "ISO27001",
        &["A.8.2", "A.9.1", "A.9.2", "A.10.1", "A.12.4", "A.13.1", "A.18.1"],
    ),
    (
        "PCI",
        &["1.2", "1.3", "3.4", "7.1", "8.2", "10.1", "10.2"],
    ),
];

/// Evidence task -> the controls and attributes that satisfy it
const EVIDENCE_TASKS: &[(&str, &[&str], &[SecurityAttribute])] = &[
    (
        "encryption-at-rest",
        &["CC6.8"],
        &[SecurityAttribute::Encryption],
    ),
    (
        "access-review",
        &["CC6.1", "CC6.2", "CC6.3"],
        &[SecurityAttribute::AccessControl, SecurityAttribute::IdentityManagement],
    ),
    (
        "network-restrictions",
        &["CC6.6", "CC7.1"],
        &[SecurityAttribute::NetworkSecurity],
    ),
    (
        "audit-logging",
        &["CC7.2", "CC7.3"],
        &[SecurityAttribute::Monitoring],
    ),
    (
        "backup-coverage",
        &["A1.2", "SO2"],
        &[SecurityAttribute::Backup, SecurityAttribute::HighAvailability],
    ),
];

/// Controls and attributes an evidence task draws on
#[derive(Debug, Clone, PartialEq)]
pub struct EvidenceTask {
    /// Control codes queried directly
    pub controls: Vec<String>,
    /// Attributes that also satisfy the task
    pub attributes: Vec<SecurityAttribute>,
}

/// Static lookup tables for classification and query translation
#[derive(Debug, Clone)]
pub struct Taxonomy {
    resource_controls: BTreeMap<String, Vec<String>>,
    frameworks: BTreeMap<String, Vec<String>>,
    evidence_tasks: BTreeMap<String, EvidenceTask>,
}

impl Default for Taxonomy {
    fn default() -> Self {
        Self::builtin()
    }
}

impl Taxonomy {
    /// The built-in representative tables
    pub fn builtin() -> Self {
        let resource_controls = RESOURCE_CONTROLS
            .iter()
            .map(|(ty, codes)| ((*ty).to_owned(), to_strings(codes)))
            .collect();
        let frameworks = FRAMEWORKS
            .iter()
            .map(|(name, codes)| ((*name).to_owned(), to_strings(codes)))
            .collect();
        let evidence_tasks = EVIDENCE_TASKS
            .iter()
            .map(|(name, controls, attributes)| {
                (
                    (*name).to_owned(),
                    EvidenceTask {
                        controls: to_strings(controls),
                        attributes: attributes.to_vec(),
                    },
                )
            })
            .collect();

        Self { resource_controls, frameworks, evidence_tasks }
    }

    /// Construct from caller-supplied tables
    pub fn new(
        resource_controls: BTreeMap<String, Vec<String>>,
        frameworks: BTreeMap<String, Vec<String>>,
        evidence_tasks: BTreeMap<String, EvidenceTask>,
    ) -> Self {
        Self { resource_controls, frameworks, evidence_tasks }
    }

    /// Exact-table lookup for a resource type
    pub fn exact_controls(&self, resource_type: &str) -> &[String] {
        self.resource_controls
            .get(resource_type)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Full control relevance: exact lookup unioned with keyword fallback,
    /// deduplicated, empty when nothing is known about the type
    pub fn control_relevance(&self, resource_type: &str) -> Vec<String> {
        let lowered = resource_type.to_lowercase();
        let mut codes: Vec<String> = Vec::new();

        for code in self.exact_controls(resource_type) {
            if !codes.contains(code) {
                codes.push(code.clone());
            }
        }

        for (keywords, fallback) in KEYWORD_CONTROLS {
            if keywords.iter().any(|k| lowered.contains(k)) {
                for code in *fallback {
                    if !codes.iter().any(|c| c == code) {
                        codes.push((*code).to_owned());
                    }
                }
            }
        }

        codes
    }

    /// Canonical control list of a framework, `None` when unknown
    pub fn framework_controls(&self, framework: &str) -> Option<&[String]> {
        self.frameworks.get(framework).map(Vec::as_slice)
    }

    /// Names of all known frameworks, in canonical order
    pub fn framework_names(&self) -> impl Iterator<Item = &str> {
        self.frameworks.keys().map(String::as_str)
    }

    /// Lookup an evidence task, `None` when unknown
    pub fn evidence_task(&self, task: &str) -> Option<&EvidenceTask> {
        self.evidence_tasks.get(task)
    }
}

fn to_strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| (*s).to_owned()).collect()
}
