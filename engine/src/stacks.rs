//! Extraction of component records from multi-environment stack YAML
//!
//! A stack file declares infrastructure components for one environment:
//!
//! ```yaml
//! components:
//!   data_bucket:
//!     type: aws_s3_bucket
//!     vars:
//!       server_side_encryption: "aws:kms"
//!   api_gateway:
//!     vars:
//!       logging: true
//! ```
//!
//! Each component yields one resource record; the component key is the
//! resource name and `type` defaults to it. Files that do not parse as YAML
//! or carry no `components:` mapping contribute zero records, mirroring the
//! per-file degradation policy of the HCL extractor.

use crate::types::{ConfigMap, ConfigValue, ResourceRecord};
use serde::Deserialize;
use std::collections::BTreeMap;

#[derive(Debug, Deserialize)]
struct StackDoc {
    #[serde(default)]
    components: BTreeMap<String, StackComponent>,
}

#[derive(Debug, Deserialize)]
struct StackComponent {
    #[serde(rename = "type")]
    component_type: Option<String>,
    #[serde(default)]
    vars: BTreeMap<String, serde_yaml::Value>,
}

/// Extract component records from stack YAML text
pub fn extract_stack(content: &str, file_path: &str) -> Vec<ResourceRecord> {
    let doc: StackDoc = match serde_yaml::from_str(content) {
        Ok(doc) => doc,
        Err(err) => {
            log::debug!("not a stack file {file_path}: {err}");
            return Vec::new();
        }
    };

    if doc.components.is_empty() {
        return Vec::new();
    }

    let line_end = content.lines().count().max(1) as u32;

    doc.components
        .into_iter()
        .map(|(name, component)| {
            let resource_type = component.component_type.unwrap_or_else(|| name.clone());
            let config: ConfigMap = component
                .vars
                .into_iter()
                .map(|(k, v)| (k, yaml_to_config(v)))
                .collect();

            ResourceRecord {
                resource_type,
                name,
                file_path: file_path.to_owned(),
                line_start: 1,
                line_end,
                config,
                control_codes: Vec::new(),
            }
        })
        .collect()
}

fn yaml_to_config(value: serde_yaml::Value) -> ConfigValue {
    match value {
        serde_yaml::Value::Bool(b) => ConfigValue::Bool(b),
        serde_yaml::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                ConfigValue::Int(i)
            } else {
                ConfigValue::String(n.to_string())
            }
        }
        serde_yaml::Value::String(s) => ConfigValue::String(s),
        serde_yaml::Value::Sequence(items) => {
            ConfigValue::List(items.into_iter().map(yaml_to_config).collect())
        }
        serde_yaml::Value::Mapping(entries) => ConfigValue::Map(
            entries
                .into_iter()
                .filter_map(|(k, v)| {
                    k.as_str().map(|key| (key.to_owned(), yaml_to_config(v)))
                })
                .collect(),
        ),
        // Null and tagged values carry no classifiable signal
        _ => ConfigValue::String(String::new()),
    }
}
