//! Mediaflow - multimedia workflow generator.
//!
//! Extracts task nodes from YAML templates, resolves free-text requirements
//! against them and writes the resulting GitHub Actions workflow.

#![allow(clippy::single_match_else)]

use std::io;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use mediaflow::catalog::{KeywordTable, NodeDatabase};
use mediaflow::core::Config;
use mediaflow::emit::WorkflowEmitter;
use mediaflow::plan::{
    EnhancedContext, MatchKind, RequirementResolver, Resolution, ScheduleOrder, StageScheduler,
};
use mediaflow::validate::{repair_file, ValidationReport, WorkflowValidator};

/// Generate GitHub Actions workflows from multimedia task templates
#[derive(Parser)]
#[command(name = "mediaflow")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Subcommand to run
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Configuration file (defaults to .mediaflow.toml, then the user config)
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the node database from a template directory
    Extract {
        /// Template directory
        #[arg(short, long, value_name = "DIR")]
        templates: Option<PathBuf>,

        /// Where to write the node database
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,

        /// Keyword table replacing the embedded one
        #[arg(short, long, value_name = "FILE")]
        keywords: Option<PathBuf>,
    },

    /// Show which task nodes a set of requirements selects
    Resolve {
        #[command(flatten)]
        plan: PlanArgs,

        /// Print the resolution as JSON
        #[arg(long)]
        json: bool,
    },

    /// Generate a workflow for a set of requirements
    Assemble {
        #[command(flatten)]
        plan: PlanArgs,

        /// Workflow name
        #[arg(short, long)]
        name: Option<String>,

        /// Directory the workflow is written to
        #[arg(short, long, value_name = "DIR")]
        output_dir: Option<PathBuf>,

        /// How nodes are grouped into stages (stage, dependencies)
        #[arg(long)]
        order: Option<ScheduleOrder>,

        /// Print the workflow instead of writing it
        #[arg(long)]
        dry_run: bool,

        /// Validate the written workflow
        #[arg(long)]
        validate: bool,
    },

    /// Check a workflow file for known failure patterns
    Validate {
        /// Workflow file
        path: PathBuf,

        /// Repair known problems before validating (keeps a .backup copy)
        #[arg(long)]
        fix: bool,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,

        /// Also write the report as JSON to this file
        #[arg(long, value_name = "FILE")]
        report: Option<PathBuf>,
    },

    /// Show configuration
    Config {
        /// Show config file path
        #[arg(long)]
        path: bool,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        shell: Shell,
    },
}

/// Inputs shared by `resolve` and `assemble`.
#[derive(Args)]
struct PlanArgs {
    /// Requirement text (repeatable, or `|`-separated)
    #[arg(short, long = "requirement", env = "REQUIREMENTS", value_delimiter = '|')]
    requirements: Vec<String>,

    /// JSON file with `clarity_score` and `fallback_assumptions`
    #[arg(long, env = "ENHANCED_CONTEXT_FILE", value_name = "FILE")]
    context: Option<PathBuf>,

    /// Clarity score (0-10), overrides the context file
    #[arg(long, env = "CLARITY_SCORE", value_parser = clap::value_parser!(u8).range(0..=10))]
    clarity: Option<u8>,

    /// Node database (extracted from the template directory when missing)
    #[arg(long, value_name = "FILE")]
    database: Option<PathBuf>,

    /// Template directory used when the database has to be built
    #[arg(short, long, value_name = "DIR")]
    templates: Option<PathBuf>,

    /// Keyword table replacing the embedded one
    #[arg(short, long, value_name = "FILE")]
    keywords: Option<PathBuf>,
}

fn main() {
    let cli = Cli::parse();

    // Setup logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    tracing_subscriber::registry().with(fmt::layer().with_target(false)).with(filter).init();

    match run(cli) {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => {
            eprintln!("Error: {e:#}");
            std::process::exit(1);
        }
    }
}

/// Dispatch a command. `Ok(false)` means the command ran but failed its check.
fn run(cli: Cli) -> Result<bool> {
    match cli.command {
        Commands::Completions { shell } => {
            cmd_completions(shell);
            return Ok(true);
        }
        Commands::Config { path } => {
            cmd_config(cli.config.as_deref(), path)?;
            return Ok(true);
        }
        _ => {}
    }

    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Extract { templates, output, keywords } => {
            cmd_extract(&config, templates, output, keywords)?;
            Ok(true)
        }
        Commands::Resolve { plan, json } => {
            cmd_resolve(&config, &plan, json)?;
            Ok(true)
        }
        Commands::Assemble { plan, name, output_dir, order, dry_run, validate } => {
            let options = AssembleOptions { name, output_dir, order, dry_run, validate };
            cmd_assemble(&config, &plan, options)
        }
        Commands::Validate { path, fix, json, report } => {
            cmd_validate(&path, fix, json, report.as_deref())
        }
        Commands::Config { .. } | Commands::Completions { .. } => Ok(true),
    }
}

fn load_config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => Config::load_from_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display())),
        None => Config::load().context("Failed to load configuration"),
    }
}

fn load_keywords(config: &Config, path: Option<&Path>) -> Result<KeywordTable> {
    let path = path.or(config.paths.keywords.as_deref());
    KeywordTable::load_or_embedded(path).context("Failed to load keyword table")
}

/// Build the node database and save it.
fn cmd_extract(
    config: &Config,
    templates: Option<PathBuf>,
    output: Option<PathBuf>,
    keywords: Option<PathBuf>,
) -> Result<()> {
    let templates = templates.unwrap_or_else(|| config.paths.templates_dir.clone());
    let output = output.unwrap_or_else(|| config.paths.database.clone());
    let table = load_keywords(config, keywords.as_deref())?;

    let db = NodeDatabase::extract(&templates, &table)
        .with_context(|| format!("Failed to extract task nodes from {}", templates.display()))?;
    db.save(&output)?;

    let meta = &db.extraction_metadata;
    println!(
        "Extracted {} task nodes from {} templates",
        meta.total_nodes,
        meta.source_templates.len()
    );
    println!("Capabilities ({}):", meta.total_capabilities);
    for (tag, ids) in &db.capabilities_index {
        println!("  {tag}: {}", ids.len());
    }
    if !meta.skipped_templates.is_empty() {
        println!("Skipped ({}):", meta.skipped_templates.len());
        for path in &meta.skipped_templates {
            println!("  {path}");
        }
    }
    println!("Saved to {}", output.display());

    Ok(())
}

/// Load the node database, building it from templates when it does not exist.
fn open_database(config: &Config, plan: &PlanArgs, table: &KeywordTable) -> Result<NodeDatabase> {
    let path = plan.database.clone().unwrap_or_else(|| config.paths.database.clone());

    let db = if path.exists() {
        NodeDatabase::load(&path)
            .with_context(|| format!("Failed to load node database {}", path.display()))?
    } else {
        let templates = plan.templates.as_deref().unwrap_or(&config.paths.templates_dir);
        tracing::info!(path = ?path, templates = ?templates, "Node database missing, extracting");
        let db = NodeDatabase::extract(templates, table).with_context(|| {
            format!("Failed to extract task nodes from {}", templates.display())
        })?;
        db.save(&path)?;
        db
    };

    if let Some(version) = db.extraction_metadata.keywords_version {
        if version != table.version {
            tracing::warn!(
                database = version,
                keywords = table.version,
                "Node database was tagged with a different keyword table version"
            );
        }
    }

    Ok(db)
}

fn requirements(plan: &PlanArgs) -> Result<Vec<String>> {
    let requirements: Vec<String> = plan
        .requirements
        .iter()
        .map(|r| r.trim())
        .filter(|r| !r.is_empty())
        .map(String::from)
        .collect();

    if requirements.is_empty() {
        anyhow::bail!("No requirements given. Pass --requirement or set REQUIREMENTS");
    }
    Ok(requirements)
}

fn enhanced_context(plan: &PlanArgs) -> Result<Option<EnhancedContext>> {
    let mut context = match &plan.context {
        Some(path) => Some(
            EnhancedContext::load(path)
                .with_context(|| format!("Failed to load context {}", path.display()))?,
        ),
        None => None,
    };

    if let Some(score) = plan.clarity {
        context.get_or_insert_with(EnhancedContext::default).clarity_score = Some(score);
    }

    Ok(context)
}

fn resolve(config: &Config, plan: &PlanArgs) -> Result<(NodeDatabase, Vec<String>, Resolution)> {
    let requirements = requirements(plan)?;
    let context = enhanced_context(plan)?;
    let table = load_keywords(config, plan.keywords.as_deref())?;
    let db = open_database(config, plan, &table)?;

    let resolution = RequirementResolver::new(&db, &table)
        .with_policy(config.resolver.policy())
        .resolve(&requirements, context.as_ref());

    Ok((db, requirements, resolution))
}

fn print_resolution(db: &NodeDatabase, resolution: &Resolution) {
    println!("Requirements:");
    for m in &resolution.matches {
        let marker = match m.kind {
            MatchKind::Direct => "+",
            MatchKind::Partial => "~",
            MatchKind::Unmatched => "-",
        };
        let capabilities =
            if m.capabilities.is_empty() { "no match".to_string() } else { m.capabilities.join(", ") };
        println!("  {marker} {} -> {capabilities} ({} nodes)", m.requirement, m.node_count);
    }

    println!("\nSelected nodes:");
    for id in &resolution.node_ids {
        match db.get(id) {
            Some(node) => println!("  [stage {}] {id} - {}", node.stage, node.name),
            None => println!("  {id}"),
        }
    }
    if !resolution.padded.is_empty() {
        println!("\nAdded from fallback assumptions: {}", resolution.padded.join(", "));
    }
    println!("\nTotal: {} nodes", resolution.node_ids.len());
}

/// Show which nodes the requirements select.
fn cmd_resolve(config: &Config, plan: &PlanArgs, json: bool) -> Result<()> {
    let (db, _, resolution) = resolve(config, plan)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&resolution)?);
    } else if resolution.is_empty() {
        println!("No task nodes matched the requirements");
    } else {
        print_resolution(&db, &resolution);
    }

    Ok(())
}

struct AssembleOptions {
    name: Option<String>,
    output_dir: Option<PathBuf>,
    order: Option<ScheduleOrder>,
    dry_run: bool,
    validate: bool,
}

/// Resolve, schedule and emit a workflow.
fn cmd_assemble(config: &Config, plan: &PlanArgs, options: AssembleOptions) -> Result<bool> {
    let (db, requirements, resolution) = resolve(config, plan)?;

    if resolution.is_empty() {
        let unmatched: Vec<&str> = resolution.unmatched().collect();
        anyhow::bail!("No task nodes matched the requirements: {}", unmatched.join(", "));
    }

    let order = options.order.unwrap_or(config.resolver.order);
    let stages = StageScheduler::new(&db)
        .schedule(&resolution.node_ids, order)
        .context("Failed to schedule task nodes")?;

    let name = options.name.unwrap_or_else(|| config.emitter.workflow_name.clone());
    let document = WorkflowEmitter::new(&db)
        .with_options(config.emitter.options())
        .emit(&name, &requirements, &stages)
        .context("Failed to build workflow")?;

    if options.dry_run {
        print!("{}", WorkflowEmitter::to_yaml(&document)?);
        return Ok(true);
    }

    let output_dir = options.output_dir.unwrap_or_else(|| config.paths.output_dir.clone());
    let path = WorkflowEmitter::write(&document, &output_dir)
        .with_context(|| format!("Failed to write workflow to {}", output_dir.display()))?;

    println!(
        "Generated {} ({} stages, {} jobs, {} steps)",
        path.display(),
        stages.len(),
        document.jobs.len(),
        document.step_count()
    );

    if options.validate {
        let report = WorkflowValidator::new().validate_file(&path);
        print_report(&path, &report);
        return Ok(report.valid);
    }

    Ok(true)
}

fn print_report(path: &Path, report: &ValidationReport) {
    if !report.fixes_applied.is_empty() {
        println!("Fixes applied:");
        for fix in &report.fixes_applied {
            println!("  * {fix}");
        }
    }
    for error in &report.errors {
        println!("ERROR: {error}");
    }
    for warning in &report.warnings {
        println!("WARNING: {warning}");
    }
    if report.valid {
        println!("{} is valid", path.display());
    } else {
        println!("{} has {} error(s)", path.display(), report.errors.len());
    }
}

/// Validate (and optionally repair) a workflow file.
fn cmd_validate(path: &Path, fix: bool, json: bool, report_path: Option<&Path>) -> Result<bool> {
    let mut fixes = Vec::new();
    if fix {
        let (repair, backup) = repair_file(path)
            .with_context(|| format!("Failed to repair {}", path.display()))?;
        if let Some(backup) = backup {
            tracing::info!(backup = ?backup, "Original saved");
        }
        fixes = repair.fixes;
    }

    let mut report = WorkflowValidator::new().validate_file(path);
    report.fixes_applied = fixes;

    if let Some(report_path) = report_path {
        report.write_json(report_path)?;
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(path, &report);
    }

    Ok(report.valid)
}

fn cmd_completions(shell: Shell) {
    let mut cmd = Cli::command();
    generate(shell, &mut cmd, "mediaflow", &mut io::stdout());
}

fn cmd_config(config_path: Option<&Path>, show_path: bool) -> Result<()> {
    if show_path {
        if let Some(path) = Config::config_dir() {
            println!("{}", path.display());
        }
        return Ok(());
    }

    let config = load_config(config_path)?;
    let toml = toml::to_string_pretty(&config)?;
    println!("{toml}");

    Ok(())
}
