//! Terraudit CLI - compliance-control indexing for infrastructure-as-code
//!
//! Thin front end over the terraudit engine: build or refresh the index,
//! validate the cache, run queries, and show aggregate statistics.

// CLI tools legitimately use print macros for user output
#![allow(clippy::print_stdout, clippy::print_stderr)]

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use humansize::{format_size, BINARY};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::time::Duration;

use terraudit_engine::{
    aggregate, limit as limit_set, sort as sort_set, CancelToken, ComplianceStatus, GroupBy,
    IndexConfig, IndexEnvelope, Indexer, QueryEngine, QueryRequest, ResultSet, RiskLevel,
    SecurityAttribute, SortField, SortOrder, Validation,
};

/// Terraudit - compliance-control indexer for Terraform trees
#[derive(Parser)]
#[command(
    name = "terraudit",
    version,
    about = "Index infrastructure-as-code for compliance auditing",
    long_about = "Terraudit scans Terraform HCL (and stack YAML) for resources relevant to\ncompliance controls, keeps a persistent index, and answers structured queries."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build or refresh the security index
    Build {
        /// Path to the repository root (default: current directory)
        #[arg(default_value = ".")]
        path: PathBuf,

        /// Ignore any cached index and rebuild from scratch
        #[arg(long)]
        no_cache: bool,

        /// Recompute checksums during validation (reads every file)
        #[arg(long)]
        deep: bool,
    },

    /// Check whether the cached index is still current
    Validate {
        /// Path to the repository root
        #[arg(default_value = ".")]
        path: PathBuf,

        /// Recompute checksums (reads every file)
        #[arg(long)]
        deep: bool,
    },

    /// Query the index
    Query {
        /// Path to the repository root
        #[arg(default_value = ".")]
        path: PathBuf,

        /// Select by control code (repeatable)
        #[arg(long = "control")]
        controls: Vec<String>,

        /// Select by framework name, e.g. SOC2 (repeatable)
        #[arg(long = "framework")]
        frameworks: Vec<String>,

        /// Select by security attribute, e.g. encryption (repeatable)
        #[arg(long = "attribute")]
        attributes: Vec<String>,

        /// Select by environment tag (repeatable)
        #[arg(long = "environment")]
        environments: Vec<String>,

        /// Select by resource type (repeatable)
        #[arg(long = "resource-type")]
        resource_types: Vec<String>,

        /// Select by risk level: low, medium, high (repeatable)
        #[arg(long = "risk")]
        risks: Vec<String>,

        /// Select by compliance status, e.g. non_compliant (repeatable)
        #[arg(long = "compliance")]
        compliance: Vec<String>,

        /// Select by evidence task, e.g. encryption-at-rest
        #[arg(long)]
        task: Option<String>,

        /// Sort field
        #[arg(long, value_enum)]
        sort: Option<SortArg>,

        /// Sort descending instead of ascending
        #[arg(long)]
        desc: bool,

        /// Keep only the first N results (applied after sorting)
        #[arg(long)]
        limit: Option<usize>,

        /// Emit machine-readable JSON
        #[arg(long)]
        json: bool,
    },

    /// Show aggregate index statistics
    Stats {
        /// Path to the repository root
        #[arg(default_value = ".")]
        path: PathBuf,

        /// Emit machine-readable JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum SortArg {
    Id,
    Type,
    Environment,
    Path,
    Risk,
    Compliance,
}

impl From<SortArg> for SortField {
    fn from(arg: SortArg) -> Self {
        match arg {
            SortArg::Id => Self::Id,
            SortArg::Type => Self::ResourceType,
            SortArg::Environment => Self::Environment,
            SortArg::Path => Self::FilePath,
            SortArg::Risk => Self::RiskLevel,
            SortArg::Compliance => Self::ComplianceStatus,
        }
    }
}

fn main() -> Result<()> {
    env_logger::init();

    match Cli::parse().command {
        Commands::Build { path, no_cache, deep } => run_build(&path, no_cache, deep),
        Commands::Validate { path, deep } => run_validate(&path, deep),
        Commands::Query {
            path,
            controls,
            frameworks,
            attributes,
            environments,
            resource_types,
            risks,
            compliance,
            task,
            sort,
            desc,
            limit,
            json,
        } => {
            let request = build_request(
                controls,
                frameworks,
                attributes,
                environments,
                resource_types,
                risks,
                compliance,
                task,
            )?;
            run_query(&path, &request, sort, desc, limit, json)
        }
        Commands::Stats { path, json } => run_stats(&path, json),
    }
}

/// Load the configuration for `root` and anchor its paths there
fn indexer_for(root: &Path, deep: bool) -> Result<Indexer> {
    let mut config = IndexConfig::load_or_default(root)
        .with_context(|| format!("loading configuration from {}", root.display()))?;

    config.scan_roots = config
        .scan_roots
        .iter()
        .map(|r| if r.is_absolute() { r.clone() } else { root.join(r) })
        .collect();
    if !config.index_path.is_absolute() {
        config.index_path = root.join(&config.index_path);
    }
    config.deep_validation = config.deep_validation || deep;
    log::debug!("scan roots: {:?}, index at {:?}", config.scan_roots, config.index_path);

    Ok(Indexer::new(config))
}

fn load_envelope(root: &Path) -> Result<(Indexer, IndexEnvelope)> {
    let indexer = indexer_for(root, false)?;
    let envelope = indexer
        .load_or_build(false, &CancelToken::new())
        .context("building the security index")?;
    Ok((indexer, envelope))
}

fn run_build(root: &Path, no_cache: bool, deep: bool) -> Result<()> {
    let indexer = indexer_for(root, deep)?;

    let spinner = ProgressBar::new_spinner();
    spinner.set_style(ProgressStyle::with_template("{spinner} {msg}").unwrap());
    spinner.set_message("indexing infrastructure...");
    spinner.enable_steady_tick(Duration::from_millis(80));

    let envelope = indexer
        .load_or_build(no_cache, &CancelToken::new())
        .context("building the security index")?;

    spinner.finish_and_clear();

    let index_size = std::fs::metadata(&indexer.config().index_path)
        .map(|m| m.len())
        .unwrap_or(0);

    println!("{}", "Index ready".green().bold());
    println!("  Resources:  {}", envelope.index.len());
    println!("  Files:      {}", envelope.metadata.total_files);
    println!(
        "  Coverage:   {:.1}%",
        envelope.index.stats.compliance_coverage * 100.0
    );
    println!(
        "  Scan time:  {}",
        humantime::format_duration(Duration::from_millis(envelope.metadata.scan_duration_ms))
    );
    if index_size > 0 {
        println!("  Cache size: {}", format_size(index_size, BINARY));
    }

    Ok(())
}

fn run_validate(root: &Path, deep: bool) -> Result<()> {
    let indexer = indexer_for(root, deep)?;
    let envelope = indexer.load().context("loading the cached index")?;

    let validator =
        terraudit_engine::Validator::new(indexer.config(), CancelToken::new());
    let verdict = if deep {
        validator.validate_deep(&envelope)
    } else {
        validator.validate_fast(&envelope)
    }
    .context("validating the cached index")?;

    match verdict {
        Validation::UpToDate => {
            println!("{}", "Index is up to date".green());
        }
        Validation::Rebuild { reason, changed_files } => {
            println!(
                "{} ({reason}, {} changed files)",
                "Index needs a rebuild".yellow(),
                changed_files.len()
            );
            for file in changed_files.iter().take(10) {
                println!("  {file}");
            }
            if changed_files.len() > 10 {
                println!("  ... and {} more", changed_files.len() - 10);
            }
        }
    }

    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn build_request(
    controls: Vec<String>,
    frameworks: Vec<String>,
    attributes: Vec<String>,
    environments: Vec<String>,
    resource_types: Vec<String>,
    risks: Vec<String>,
    compliance: Vec<String>,
    task: Option<String>,
) -> Result<QueryRequest> {
    let security_attributes = attributes
        .iter()
        .map(|name| {
            SecurityAttribute::from_name(name)
                .ok_or_else(|| anyhow::anyhow!("unknown security attribute: {name}"))
        })
        .collect::<Result<Vec<_>>>()?;

    let risk_levels = risks
        .iter()
        .map(|name| {
            RiskLevel::from_name(name)
                .ok_or_else(|| anyhow::anyhow!("unknown risk level: {name}"))
        })
        .collect::<Result<Vec<_>>>()?;

    let compliance_statuses = compliance
        .iter()
        .map(|name| {
            ComplianceStatus::from_name(name)
                .ok_or_else(|| anyhow::anyhow!("unknown compliance status: {name}"))
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(QueryRequest {
        control_codes: controls,
        security_attributes,
        environments,
        resource_types,
        risk_levels,
        compliance_statuses,
        evidence_task: task,
        frameworks,
        include_metadata: true,
    })
}

fn run_query(
    root: &Path,
    request: &QueryRequest,
    sort: Option<SortArg>,
    desc: bool,
    limit: Option<usize>,
    json: bool,
) -> Result<()> {
    let (indexer, envelope) = load_envelope(root)?;
    let engine = QueryEngine::new(&envelope.index, indexer.taxonomy());

    let mut result = engine.run(request);
    if let Some(field) = sort {
        let order = if desc { SortOrder::Descending } else { SortOrder::Ascending };
        result = sort_set(&result, field.into(), order);
    }
    if let Some(n) = limit {
        result = limit_set(&result, n);
    }

    if let Some(error) = result.error() {
        if json {
            println!("{}", serde_json::to_string_pretty(&result_json(&result))?);
            return Ok(());
        }
        bail!("query failed: {error}");
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&result_json(&result))?);
        return Ok(());
    }

    if result.count() == 0 {
        println!("{}", "No matching resources".dimmed());
        return Ok(());
    }

    for resource in &result.resources {
        let risk = match resource.risk_level {
            RiskLevel::High => resource.risk_level.name().red().to_string(),
            RiskLevel::Medium => resource.risk_level.name().yellow().to_string(),
            RiskLevel::Low => resource.risk_level.name().green().to_string(),
        };
        println!(
            "{}  [{risk}/{}] {} ({}:{})",
            resource.id.bold(),
            resource.compliance_status,
            resource.environment,
            resource.file_path,
            resource.line_range,
        );
    }
    println!(
        "\n{} resources in {} us",
        result.count(),
        result.elapsed.as_micros()
    );

    Ok(())
}

fn result_json(result: &ResultSet<'_>) -> serde_json::Value {
    serde_json::json!({
        "count": result.count(),
        "resources": &result.resources,
        "metadata": &result.metadata,
    })
}

fn run_stats(root: &Path, json: bool) -> Result<()> {
    let (indexer, envelope) = load_envelope(root)?;
    let stats = &envelope.index.stats;

    if json {
        println!("{}", serde_json::to_string_pretty(stats)?);
        return Ok(());
    }

    println!("{}", "Index statistics".bold());
    println!("  Resources: {}", envelope.index.len());
    println!("  Files:     {}", envelope.metadata.total_files);
    println!("  Coverage:  {:.1}%", stats.compliance_coverage * 100.0);

    println!("\n{}", "By risk".bold());
    for (risk, count) in &stats.risk_distribution {
        println!("  {:<8} {count}", risk.name());
    }

    println!("\n{}", "By environment".bold());
    for (environment, env_stats) in &stats.environment_stats {
        println!("  {environment:<12} {}", env_stats.count);
    }

    println!("\n{}", "By attribute".bold());
    for (attribute, attr_stats) in &stats.attribute_stats {
        println!("  {:<20} {}", attribute.name(), attr_stats.count);
    }

    let engine = QueryEngine::new(&envelope.index, indexer.taxonomy());
    let by_status = aggregate(&engine.all(), GroupBy::ComplianceStatus);
    println!("\n{}", "By compliance status".bold());
    for (status, count) in &by_status {
        println!("  {status:<22} {count}");
    }

    Ok(())
}
