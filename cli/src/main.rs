use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use schema_consolidate_core::{
    analyze, apply_renames, consolidate, ConflictPolicy, ConsolidateOptions, ConsolidationTier,
    DuplicateReport, SchemaDocument,
};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::level_filters::LevelFilter;

#[derive(Parser)]
#[command(name = "schema-consolidate")]
#[command(about = "Find and merge duplicate schema definitions in an OpenAPI document")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging (sets log level to debug)
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Report duplicate groups at every tier without changing anything
    Analyze {
        /// Input OpenAPI document (JSON)
        input: PathBuf,

        /// Number of largest groups listed per tier
        #[arg(long)]
        top: Option<usize>,

        /// Consolidation config file (JSON, kebab-case keys)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Output report file (defaults to stdout if not specified)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Output format
        #[arg(long, value_enum, default_value_t = OutputFormat::Pretty)]
        format: OutputFormat,
    },

    /// Merge duplicate definitions and rewrite every reference
    Consolidate {
        /// Input OpenAPI document (JSON)
        input: PathBuf,

        /// Output document file (defaults to stdout if not specified)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Write the consolidation report to this file
        #[arg(long)]
        report: Option<PathBuf>,

        /// Equivalence tier whose groups are merged
        #[arg(long, value_enum)]
        tier: Option<TierArg>,

        /// Consolidation config file (JSON, kebab-case keys)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Hoist repeated inline object shapes into named definitions first
        #[arg(long)]
        extract_inline: bool,

        /// What to do when two groups want the same canonical name
        #[arg(long, value_enum)]
        conflict_policy: Option<ConflictPolicyArg>,

        /// Output format
        #[arg(long, value_enum, default_value_t = OutputFormat::Pretty)]
        format: OutputFormat,
    },

    /// Apply an explicit rename map ({"OldName": "NewName", ...})
    Rename {
        /// Input OpenAPI document (JSON)
        input: PathBuf,

        /// Rename map file
        #[arg(long)]
        map: PathBuf,

        /// Output document file (defaults to stdout if not specified)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Output format
        #[arg(long, value_enum, default_value_t = OutputFormat::Pretty)]
        format: OutputFormat,
    },
}

#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum)]
enum TierArg {
    Exact,
    Structural,
    StructuralLoose,
}

impl From<TierArg> for ConsolidationTier {
    fn from(val: TierArg) -> Self {
        match val {
            TierArg::Exact => ConsolidationTier::Exact,
            TierArg::Structural => ConsolidationTier::Structural,
            TierArg::StructuralLoose => ConsolidationTier::StructuralLoose,
        }
    }
}

#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum)]
enum ConflictPolicyArg {
    Suffix,
    Fail,
}

impl From<ConflictPolicyArg> for ConflictPolicy {
    fn from(val: ConflictPolicyArg) -> Self {
        match val {
            ConflictPolicyArg::Suffix => ConflictPolicy::Suffix,
            ConflictPolicyArg::Fail => ConflictPolicy::Fail,
        }
    }
}

#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum)]
enum OutputFormat {
    Pretty,
    Compact,
}

/// Report as written to disk: the library report plus run metadata.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ReportFile<'a> {
    generated_at: DateTime<Utc>,
    input: String,
    #[serde(flatten)]
    report: &'a DuplicateReport,
}

impl<'a> ReportFile<'a> {
    fn new(input: &Path, report: &'a DuplicateReport) -> Self {
        Self {
            generated_at: Utc::now(),
            input: input.display().to_string(),
            report,
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr so stdout stays clean for JSON
    let log_level = if cli.verbose {
        LevelFilter::DEBUG
    } else {
        LevelFilter::WARN
    };
    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Analyze {
            input,
            top,
            config,
            output,
            format,
        } => {
            let document = read_document(&input)?;
            let mut options = load_options(config.as_deref())?;
            if let Some(top) = top {
                options.top_n = top;
            }

            let report = analyze(&document, &options)
                .map_err(|e| anyhow::Error::from(e).context("Analysis failed"))?;

            write_json(&ReportFile::new(&input, &report), output.as_ref(), format)?;
        }
        Commands::Consolidate {
            input,
            output,
            report: report_path,
            tier,
            config,
            extract_inline,
            conflict_policy,
            format,
        } => {
            let document = read_document(&input)?;
            let mut options = load_options(config.as_deref())?;
            if let Some(tier) = tier {
                options.tier = tier.into();
            }
            if let Some(policy) = conflict_policy {
                options.conflict_policy = policy.into();
            }
            if extract_inline {
                options.extract_inline = true;
            }

            let result = consolidate(&document, &options)
                .map_err(|e| anyhow::Error::from(e).context("Consolidation failed"))?;

            for conflict in &result.report.conflicts {
                eprintln!(
                    "Warning: canonical name {} already taken, used {} for {}",
                    conflict.requested,
                    conflict.assigned,
                    conflict.members.join(", ")
                );
            }

            // Write consolidated document
            write_json(result.document.as_value(), output.as_ref(), format)?;

            // Write report sidecar
            if let Some(path) = report_path {
                write_json(&ReportFile::new(&input, &result.report), Some(&path), format)?;
            }
        }
        Commands::Rename {
            input,
            map,
            output,
            format,
        } => {
            let document = read_document(&input)?;
            let renames: BTreeMap<String, String> = {
                let file = File::open(&map)
                    .with_context(|| format!("Failed to open rename map: {}", map.display()))?;
                let reader = BufReader::new(file);
                serde_json::from_reader(reader)
                    .with_context(|| format!("Failed to parse rename map from: {}", map.display()))?
            };

            let (renamed, _) = apply_renames(&document, &renames)
                .map_err(|e| anyhow::Error::from(e).context("Rename failed"))?;

            write_json(renamed.as_value(), output.as_ref(), format)?;
        }
    }

    Ok(())
}

fn read_document(input: &Path) -> Result<SchemaDocument> {
    let file = File::open(input)
        .with_context(|| format!("Failed to open input file: {}", input.display()))?;
    let reader = BufReader::new(file);
    let value: serde_json::Value = serde_json::from_reader(reader)
        .with_context(|| format!("Failed to parse document from: {}", input.display()))?;
    SchemaDocument::from_value(value)
        .with_context(|| format!("Not a consolidatable document: {}", input.display()))
}

fn load_options(config: Option<&Path>) -> Result<ConsolidateOptions> {
    let Some(path) = config else {
        return Ok(ConsolidateOptions::default());
    };
    let file = File::open(path)
        .with_context(|| format!("Failed to open config file: {}", path.display()))?;
    let reader = BufReader::new(file);
    serde_json::from_reader(reader)
        .with_context(|| format!("Failed to parse config from: {}", path.display()))
}

fn write_json<T: Serialize + ?Sized>(
    val: &T,
    path: Option<&PathBuf>,
    format: OutputFormat,
) -> Result<()> {
    let mut writer: Box<dyn Write> = if let Some(p) = path {
        let file = File::create(p)
            .with_context(|| format!("Failed to create output file: {}", p.display()))?;
        Box::new(BufWriter::new(file))
    } else {
        Box::new(BufWriter::new(io::stdout()))
    };

    match format {
        OutputFormat::Pretty => {
            serde_json::to_writer_pretty(&mut writer, val).context("Failed to write JSON")?;
        }
        OutputFormat::Compact => {
            serde_json::to_writer(&mut writer, val).context("Failed to write JSON")?;
        }
    }

    // Ensure trailing newline
    writeln!(writer).context("Failed to write trailing newline")?;
    writer.flush().context("Failed to flush output")?;

    Ok(())
}
