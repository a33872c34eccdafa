//! Line-based extraction of `resource` blocks from Terraform HCL
//!
//! The extractor scans a file line by line with a brace-depth counter. It
//! deliberately stops short of a full HCL parse: only top-level attribute
//! assignments inside a resource block are recorded, nested blocks are noted
//! by name, and everything else is tolerated and skipped. Heredocs and
//! string literals containing `{` or `}` are counted as brace characters;
//! pathological inputs can misalign block boundaries, which is an accepted
//! limitation of the line-based approach.

use crate::types::{ConfigMap, ConfigValue, ResourceRecord};
use regex::Regex;

/// Stop reading a single file beyond this many lines; records found so far
/// are still emitted.
const MAX_SCAN_LINES: usize = 100_000;

/// Extracts resource blocks from HCL text
pub struct HclExtractor {
    resource_re: Regex,
    attribute_re: Regex,
    block_re: Regex,
}

impl Default for HclExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl HclExtractor {
    /// Compile the extraction patterns
    pub fn new() -> Self {
        Self {
            resource_re: Regex::new(r#"^resource\s+"([^"]+)"\s+"([^"]+)"\s*\{"#).unwrap(),
            attribute_re: Regex::new(r"^([A-Za-z_][A-Za-z0-9_]*)\s*=\s*(.+)$").unwrap(),
            block_re: Regex::new(r#"^([A-Za-z_][A-Za-z0-9_-]*)(?:\s+"[^"]*")*\s*\{\s*$"#).unwrap(),
        }
    }

    /// Extract every resource block from `content`
    ///
    /// `file_path` is recorded verbatim on the emitted records. Lines are
    /// 1-based and inclusive.
    pub fn extract(&self, content: &str, file_path: &str) -> Vec<ResourceRecord> {
        let mut records = Vec::new();

        let mut depth: i32 = 0;
        let mut current: Option<OpenBlock> = None;

        for (idx, line) in content.lines().enumerate().take(MAX_SCAN_LINES) {
            let line_no = (idx + 1) as u32;
            let trimmed = line.trim();
            let code = strip_inline_comment(trimmed);

            if depth == 0 {
                let Some(caps) = self.resource_re.captures(code) else {
                    continue;
                };
                let after_brace = &code[caps.get(0).unwrap().end()..];
                depth = 1 + brace_delta(after_brace);

                let block = OpenBlock {
                    resource_type: caps[1].to_owned(),
                    name: caps[2].to_owned(),
                    line_start: line_no,
                    config: ConfigMap::new(),
                };

                if depth <= 0 {
                    // Single-line block: `resource "t" "n" {}`
                    records.push(block.finish(file_path, line_no));
                    depth = 0;
                } else {
                    current = Some(block);
                }
                continue;
            }

            // Inside a block: record top-level assignments and nested-block
            // names before adjusting depth.
            if depth == 1 {
                if let Some(block) = current.as_mut() {
                    self.collect_attribute(block, code.trim_end());
                }
            }

            depth += brace_delta(code);

            if depth <= 0 {
                depth = 0;
                if let Some(block) = current.take() {
                    records.push(block.finish(file_path, line_no));
                }
            }
        }

        // An unterminated block at EOF is dropped; the file yielded what it
        // yielded.
        if let Some(block) = current {
            log::debug!(
                "unclosed resource block {}.{} at {}:{}",
                block.resource_type,
                block.name,
                file_path,
                block.line_start
            );
        }

        records
    }

    fn collect_attribute(&self, block: &mut OpenBlock, trimmed: &str) {
        if trimmed.is_empty() || trimmed.starts_with('#') || trimmed.starts_with("//") {
            return;
        }

        if let Some(caps) = self.attribute_re.captures(trimmed) {
            let key = caps[1].to_owned();
            let raw = strip_inline_comment(&caps[2]);
            let raw = raw.trim();
            if !raw.is_empty() {
                block.config.insert(key, parse_value(raw));
            }
            return;
        }

        // Nested block opening: note its presence by name only
        if let Some(caps) = self.block_re.captures(trimmed) {
            block
                .config
                .entry(caps[1].to_owned())
                .or_insert_with(|| ConfigValue::Map(ConfigMap::new()));
        }
    }
}

struct OpenBlock {
    resource_type: String,
    name: String,
    line_start: u32,
    config: ConfigMap,
}

impl OpenBlock {
    fn finish(self, file_path: &str, line_end: u32) -> ResourceRecord {
        ResourceRecord {
            resource_type: self.resource_type,
            name: self.name,
            file_path: file_path.to_owned(),
            line_start: self.line_start,
            line_end,
            config: self.config,
            control_codes: Vec::new(),
        }
    }
}

/// Net brace depth change of a line fragment
///
/// Braces inside string literals and heredocs are counted too; that is the
/// accepted limitation of line-based extraction.
fn brace_delta(fragment: &str) -> i32 {
    let opens = fragment.matches('{').count() as i32;
    let closes = fragment.matches('}').count() as i32;
    opens - closes
}

/// Drop a trailing `# ...` comment that is not inside a double-quoted string
fn strip_inline_comment(line: &str) -> &str {
    let mut in_quotes = false;
    for (i, c) in line.char_indices() {
        match c {
            '"' => in_quotes = !in_quotes,
            '#' if !in_quotes => return &line[..i],
            _ => {}
        }
    }
    line
}

/// Parse an attribute value: quotes stripped, scalars typed, one-line lists
/// split, anything else kept verbatim
fn parse_value(raw: &str) -> ConfigValue {
    if raw == "{" {
        // Multi-line map attribute; presence is all we record
        return ConfigValue::Map(ConfigMap::new());
    }

    if raw.len() >= 2 && raw.starts_with('"') && raw.ends_with('"') {
        return ConfigValue::String(raw[1..raw.len() - 1].to_owned());
    }

    if raw.starts_with('[') && raw.ends_with(']') {
        let inner = &raw[1..raw.len() - 1];
        if inner.trim().is_empty() {
            return ConfigValue::List(Vec::new());
        }
        let items = inner
            .split(',')
            .map(|item| parse_value(item.trim()))
            .collect();
        return ConfigValue::List(items);
    }

    match raw {
        "true" => return ConfigValue::Bool(true),
        "false" => return ConfigValue::Bool(false),
        _ => {}
    }

    if let Ok(n) = raw.parse::<i64>() {
        return ConfigValue::Int(n);
    }

    ConfigValue::String(raw.to_owned())
}
