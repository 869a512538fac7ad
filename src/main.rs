//! CLI for cite-lifecycle - Validate, prune and consolidate footnote citations.

use std::fmt;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process;

use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use cite_lifecycle::{
    consolidate::GlobalCitation,
    document::SkippedSection,
    remove::RemovalSummary,
    renumber::RenumberOutcome,
    load_sections, write_sections, CitationCounts, CitationKey, Classifier, Consolidated,
    Consolidator, Document, EngineConfig, MissingDefinitionPolicy, OfflineProbe, Pipeline, Probe,
    ValidationReport, Validator, VerdictStatus,
};

// ---------------------------------------------------------------------------
// CLI definition
// ---------------------------------------------------------------------------

/// Validate, prune, renumber and consolidate footnote citations
#[derive(Parser)]
#[command(name = "cite-lifecycle")]
#[command(version)]
#[command(after_help = "\
Examples:
  cite-lifecycle validate sections/
  cite-lifecycle clean sections/ --header header.md
  cite-lifecycle consolidate sections/ -o report.md
  cite-lifecycle run sections/ -o report.md --report citations.json")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (JSON)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Number of concurrent URL probes
    #[arg(long, global = true)]
    workers: Option<usize>,

    /// Per-probe timeout in seconds
    #[arg(long, global = true)]
    timeout: Option<u64>,

    /// Never touch the network; every URL not caught by a pattern is uncertain
    #[arg(long, global = true)]
    offline: bool,
}

#[derive(Args)]
struct InputArgs {
    /// Directory of Markdown sections (one .md file per section)
    dir: PathBuf,

    /// Header file, placed before every section
    #[arg(long)]
    header: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Check every citation and print a report
    Validate {
        #[command(flatten)]
        input: InputArgs,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Remove invalid citations and renumber, rewriting sections in place
    #[command(after_help = "\
Only citations confirmed invalid are removed. Uncertain ones are kept and reported.")]
    Clean {
        #[command(flatten)]
        input: InputArgs,

        /// Report what would change without writing anything
        #[arg(long)]
        dry_run: bool,
    },

    /// Merge all sections into one document with a single citations block
    Consolidate {
        #[command(flatten)]
        input: InputArgs,

        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Validate, clean and consolidate in one go, leaving the sections untouched
    Run {
        #[command(flatten)]
        input: InputArgs,

        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Write the full JSON report to this file
        #[arg(long)]
        report: Option<PathBuf>,
    },
}

// ---------------------------------------------------------------------------
// AppError: semantic exit codes
// ---------------------------------------------------------------------------

enum AppError {
    /// Exit 10: section directory or header not found / unreadable
    InputFile(String),
    /// Exit 11: configuration file not found / invalid
    Config(String),
    /// Exit 15: cannot write output file or sections
    OutputFile(String),
}

impl AppError {
    fn exit_code(&self) -> i32 {
        match self {
            AppError::InputFile(_) => 10,
            AppError::Config(_) => 11,
            AppError::OutputFile(_) => 15,
        }
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::InputFile(msg) => {
                write!(
                    f,
                    "{}\n  hint: pass a directory containing one .md file per section",
                    msg
                )
            }
            AppError::Config(msg) => {
                write!(
                    f,
                    "{}\n  hint: the config file is a JSON object; known keys are workers, probe_timeout_secs, user_agent, max_age_years, missing_definitions",
                    msg
                )
            }
            AppError::OutputFile(msg) => {
                write!(
                    f,
                    "{}\n  hint: check that the output directory exists and is writable",
                    msg
                )
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "cite_lifecycle=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();

    if let Err(e) = run() {
        eprintln!("Error: {}", e);
        process::exit(e.exit_code());
    }
}

fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    let config = load_config(&cli)?;

    if cli.offline {
        execute(cli.command, &config, Classifier::new(OfflineProbe))
    } else {
        let classifier = Classifier::http(&config);
        execute(cli.command, &config, classifier)
    }
}

fn execute<P: Probe>(
    command: Commands,
    config: &EngineConfig,
    classifier: Classifier<P>,
) -> Result<(), AppError> {
    let validator = Validator::new(classifier, config.clone());

    match command {
        Commands::Validate { input, json } => validate_command(&input, validator, json),
        Commands::Clean { input, dry_run } => {
            clean_command(&input, Pipeline::new(validator, config), dry_run)
        }
        Commands::Consolidate { input, output } => {
            consolidate_command(&input, config.missing_definitions, output.as_deref())
        }
        Commands::Run {
            input,
            output,
            report,
        } => run_command(
            &input,
            Pipeline::new(validator, config),
            output.as_deref(),
            report.as_deref(),
        ),
    }
}

/// Loads the config file, if any, and applies command-line overrides.
fn load_config(cli: &Cli) -> Result<EngineConfig, AppError> {
    let mut config = match &cli.config {
        Some(path) => EngineConfig::load(path)
            .map_err(|e| AppError::Config(format!("'{}': {}", path.display(), e)))?,
        None => EngineConfig::default(),
    };
    if let Some(workers) = cli.workers {
        config.workers = workers;
    }
    if let Some(timeout) = cli.timeout {
        config.probe_timeout_secs = timeout;
    }
    config
        .validate()
        .map_err(|e| AppError::Config(e.to_string()))?;
    Ok(config)
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

/// Validate every citation without changing anything.
fn validate_command<P: Probe>(
    input: &InputArgs,
    validator: Validator<P>,
    json: bool,
) -> Result<(), AppError> {
    let document = load_input(input)?;
    let report = validator.validate(&document);

    let rendered = if json {
        let mut text = serde_json::to_string_pretty(&report)
            .map_err(|e| AppError::OutputFile(format!("failed to serialize report: {}", e)))?;
        text.push('\n');
        text
    } else {
        render_report(&report)
    };
    write_output(None, &rendered)?;

    let total = report.summary.total;
    print_counts(&CitationCounts {
        total,
        removed: 0,
        remaining: total,
    });
    Ok(())
}

/// Validate, remove invalid citations and renumber, in place.
fn clean_command<P: Probe>(
    input: &InputArgs,
    pipeline: Pipeline<P>,
    dry_run: bool,
) -> Result<(), AppError> {
    let document = load_input(input)?;
    let outcome = pipeline.clean(document);

    for (section, counts) in &outcome.removal.sections {
        eprintln!(
            "{}: removed {} mark(s), {} definition(s)",
            section, counts.marks, counts.definitions
        );
    }
    for renumbered in outcome.renumbered.iter().filter(|o| o.changed()) {
        let pairs: Vec<String> = renumbered
            .mapping
            .iter()
            .map(|(old, new)| format!("{}->{}", old, new))
            .collect();
        eprintln!("{}: renumbered {}", renumbered.section, pairs.join(", "));
    }

    if dry_run {
        eprintln!("dry run, no section written");
    } else {
        let written = write_sections(&outcome.document)
            .map_err(|e| AppError::OutputFile(format!("failed to write sections: {}", e)))?;
        eprintln!("wrote {} section(s)", written);
    }

    print_counts(&outcome.counts);
    Ok(())
}

/// Merge the sections as they currently are.
fn consolidate_command(
    input: &InputArgs,
    policy: MissingDefinitionPolicy,
    output: Option<&Path>,
) -> Result<(), AppError> {
    let document = load_input(input)?;
    let consolidated = Consolidator::new(policy).consolidate(&document);

    write_output(output, &consolidated.text)?;
    if let Some(path) = output {
        eprintln!(
            "listed {} citation(s), wrote {}",
            consolidated.listed(),
            path.display()
        );
    }

    print_counts(&consolidation_counts(&consolidated, policy));
    Ok(())
}

/// Run the whole lifecycle and write the final document.
fn run_command<P: Probe>(
    input: &InputArgs,
    pipeline: Pipeline<P>,
    output: Option<&Path>,
    report: Option<&Path>,
) -> Result<(), AppError> {
    let document = load_input(input)?;
    let outcome = pipeline.run(document);

    write_output(output, &outcome.consolidated.text)?;

    if let Some(path) = report {
        let full = RunReport {
            counts: outcome.clean.counts,
            validation: &outcome.clean.report,
            removal: &outcome.clean.removal,
            renumbered: outcome.clean.renumbered.iter().filter(|o| o.changed()).collect(),
            consolidation: ConsolidationReport {
                citations: &outcome.consolidated.citations,
                missing_definitions: &outcome.consolidated.missing_definitions,
                dropped_definitions: &outcome.consolidated.dropped_definitions,
            },
        };
        let mut json = serde_json::to_string_pretty(&full)
            .map_err(|e| AppError::OutputFile(format!("failed to serialize report: {}", e)))?;
        json.push('\n');
        fs::write(path, json)
            .map_err(|e| AppError::OutputFile(format!("'{}': {}", path.display(), e)))?;
    }

    let summary = outcome.clean.report.summary;
    eprintln!(
        "{} uncertain citation(s) kept, {} error(s), {} warning(s)",
        summary.uncertain, summary.errors, summary.warnings
    );
    print_counts(&outcome.clean.counts);
    Ok(())
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct RunReport<'a> {
    counts: CitationCounts,
    validation: &'a ValidationReport,
    removal: &'a RemovalSummary,
    renumbered: Vec<&'a RenumberOutcome>,
    consolidation: ConsolidationReport<'a>,
}

#[derive(Serialize)]
struct ConsolidationReport<'a> {
    citations: &'a [GlobalCitation],
    missing_definitions: &'a [CitationKey],
    dropped_definitions: &'a [CitationKey],
}

fn load_input(input: &InputArgs) -> Result<Document, AppError> {
    let loaded = load_sections(&input.dir, input.header.as_deref())
        .map_err(|e| AppError::InputFile(e.to_string()))?;
    report_skipped(&loaded.skipped);
    Ok(loaded.document)
}

fn report_skipped(skipped: &[SkippedSection]) {
    for s in skipped {
        eprintln!("skipped '{}': {}", s.path.display(), s.reason);
    }
}

/// Writes to a file, or to stdout when no path is given.
fn write_output(path: Option<&Path>, content: &str) -> Result<(), AppError> {
    if let Some(path) = path {
        fs::write(path, content)
            .map_err(|e| AppError::OutputFile(format!("'{}': {}", path.display(), e)))
    } else {
        let stdout = io::stdout();
        let mut handle = stdout.lock();
        write!(handle, "{}", content).map_err(|e| AppError::OutputFile(format!("stdout: {}", e)))
    }
}

fn print_counts(counts: &CitationCounts) {
    eprintln!("{}", counts);
}

/// Consolidation removes nothing it was told to keep: only uncited
/// definitions, plus undefined marks under the drop policy.
fn consolidation_counts(consolidated: &Consolidated, policy: MissingDefinitionPolicy) -> CitationCounts {
    let mut removed = consolidated.dropped_definitions.len();
    if policy == MissingDefinitionPolicy::Drop {
        removed += consolidated.missing_definitions.len();
    }
    let remaining = consolidated.citations.len();
    CitationCounts {
        total: remaining + removed,
        removed,
        remaining,
    }
}

fn status_label(status: VerdictStatus) -> &'static str {
    match status {
        VerdictStatus::Valid => "valid",
        VerdictStatus::Uncertain => "uncertain",
        VerdictStatus::Invalid => "invalid",
    }
}

/// Human-readable validation report.
fn render_report(report: &ValidationReport) -> String {
    let mut out = String::new();

    for citation in &report.citations {
        out.push_str(&format!(
            "{}  {}  {}\n",
            citation.key,
            status_label(citation.status),
            citation.url.as_deref().unwrap_or("-")
        ));
        for issue in &citation.issues {
            out.push_str(&format!("    {}: {}\n", issue.severity, issue.message));
        }
    }
    for key in &report.missing_definitions {
        out.push_str(&format!(
            "{}  undefined  -\n    warning: cited inline but never defined in its section\n",
            key
        ));
    }

    let s = report.summary;
    out.push_str(&format!(
        "\n{} citation(s): {} valid, {} uncertain, {} invalid ({} error(s), {} warning(s))\n",
        s.total, s.valid, s.uncertain, s.invalid, s.errors, s.warnings
    ));
    out
}
