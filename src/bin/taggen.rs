//! Tag generation command line
//!
//! # Usage
//!
//! ```bash
//! # Show what a name part normalizes to
//! taggen normalize "Motor.01 Test-A"
//!
//! # Expand entries without touching any project
//! taggen expand --entries tags.yaml
//!
//! # Plan against a project, review, then apply
//! taggen plan --project ./Plant1 --entries tags.yaml --out plan.json
//! taggen apply --project ./Plant1 --diff plan.json
//!
//! # Bring an existing project under generation
//! taggen import --project ./Plant1 --out tags.yaml
//!
//! # Look at a table file
//! taggen inspect ./Plant1/variable.dbf
//! ```

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use serde::Serialize;
use tracing::Level;
use tracing_subscriber::EnvFilter;

use taggen::dbf::Table;
use taggen::{
    commit_project, import_project, load_entries, plan_project, ProjectDiff, ProjectFiles,
    Settings,
};

#[derive(Parser)]
#[command(name = "taggen")]
#[command(version)]
#[command(about = "Generate and reconcile SCADA tag tables from tag definitions")]
#[command(long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Settings file (defaults to ./taggen.yaml if present)
    #[arg(long, short, global = true, env = "TAGGEN_CONFIG")]
    config: Option<PathBuf>,

    /// Output format: json or pretty (default)
    #[arg(long, short = 'o', global = true, default_value = "pretty", value_enum)]
    format: OutputFormat,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Json,
    Pretty,
}

#[derive(Subcommand)]
enum Commands {
    /// Normalize a name part the way template suffixes are
    Normalize { text: String },

    /// List available templates
    Templates {
        /// Show members
        #[arg(long)]
        verbose: bool,
    },

    /// Expand entries into records
    Expand {
        /// Entries file (YAML or JSON)
        #[arg(short, long)]
        entries: PathBuf,
    },

    /// Expand entries and diff them against a project
    Plan {
        /// Project directory holding the table files
        #[arg(short, long)]
        project: PathBuf,

        /// Entries file (YAML or JSON)
        #[arg(short, long)]
        entries: PathBuf,

        /// Write the plan as JSON for a later `apply`
        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// Apply a saved plan to a project
    Apply {
        #[arg(short, long)]
        project: PathBuf,

        /// Plan written by `plan --out`
        #[arg(short, long)]
        diff: PathBuf,
    },

    /// Read a project's tables back into entries
    Import {
        #[arg(short, long)]
        project: PathBuf,

        /// Write the entries as YAML
        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// Show a table file's header and columns
    Inspect {
        file: PathBuf,

        /// Also print live rows
        #[arg(long)]
        rows: bool,
    },
}

// =============================================================================
// MAIN
// =============================================================================

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(Level::WARN.into()))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let result = load_settings(cli.config.as_deref()).and_then(|settings| match cli.command {
        Commands::Normalize { text } => cmd_normalize(&settings, &text, cli.format),
        Commands::Templates { verbose } => cmd_templates(&settings, verbose, cli.format),
        Commands::Expand { entries } => cmd_expand(&settings, &entries, cli.format),
        Commands::Plan {
            project,
            entries,
            out,
        } => cmd_plan(&settings, &project, &entries, out.as_deref(), cli.format),
        Commands::Apply { project, diff } => cmd_apply(&project, &diff, cli.format),
        Commands::Import { project, out } => cmd_import(&project, out.as_deref(), cli.format),
        Commands::Inspect { file, rows } => cmd_inspect(&file, rows, cli.format),
    });

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            if cli.format == OutputFormat::Json {
                println!("{}", serde_json::json!({ "error": format!("{:#}", e) }));
            } else {
                eprintln!("{}: {:#}", "error".red().bold(), e);
            }
            ExitCode::FAILURE
        }
    }
}

fn load_settings(path: Option<&Path>) -> Result<Settings> {
    match path {
        Some(path) => Settings::load(path),
        None => Settings::from_env(),
    }
}

// =============================================================================
// COMMAND IMPLEMENTATIONS
// =============================================================================

fn cmd_normalize(settings: &Settings, text: &str, format: OutputFormat) -> Result<()> {
    let normalized = settings.normalizer().normalize(text);
    match format {
        OutputFormat::Json => print_json(&serde_json::json!({
            "input": text,
            "normalized": normalized,
        })),
        OutputFormat::Pretty => {
            println!("{}", normalized);
            Ok(())
        }
    }
}

fn cmd_templates(settings: &Settings, verbose: bool, format: OutputFormat) -> Result<()> {
    let registry = settings.template_registry()?;

    if format == OutputFormat::Json {
        return print_json(&registry.list());
    }

    for template in registry.list() {
        println!(
            "{} {}",
            template.name.cyan().bold(),
            template.description.dimmed()
        );
        if verbose {
            for m in &template.members {
                let mut flags = Vec::new();
                if m.is_trend {
                    flags.push("trend");
                }
                if m.is_alarm {
                    flags.push("alarm");
                }
                println!(
                    "  {:<12} {:<8} {:<14} {}",
                    m.suffix,
                    m.data_type,
                    m.address_offset,
                    flags.join(",")
                );
            }
        }
    }
    Ok(())
}

fn cmd_expand(settings: &Settings, entries: &Path, format: OutputFormat) -> Result<()> {
    let entries = load_entries(entries)?;
    let registry = settings.template_registry()?;
    let expansion = settings.expander(&registry).expand(&entries);

    match format {
        OutputFormat::Json => print_json(&expansion),
        OutputFormat::Pretty => {
            println!(
                "{} {} points, {} trends, {} alarms",
                "OK".green().bold(),
                expansion.point.len(),
                expansion.trend.len(),
                expansion.alarm.len()
            );
            for p in &expansion.point {
                println!("  {:<32} {:<8} {}", p.name, p.data_type, p.addr);
            }
            print_warnings(expansion.warnings.iter());
            Ok(())
        }
    }
}

fn cmd_plan(
    settings: &Settings,
    project: &Path,
    entries: &Path,
    out: Option<&Path>,
    format: OutputFormat,
) -> Result<()> {
    let entries = load_entries(entries)?;
    let registry = settings.template_registry()?;
    let expander = settings.expander(&registry);
    let files = ProjectFiles::resolve(project);

    let diff = plan_project(&files, &entries, &expander, settings.stabilize_identifiers)?;

    if let Some(out) = out {
        let json = serde_json::to_vec_pretty(&diff).context("Failed to serialize plan")?;
        write_atomic(out, &json)?;
    }

    match format {
        OutputFormat::Json => print_json(&diff),
        OutputFormat::Pretty => {
            print_plan(&diff);
            if let Some(out) = out {
                println!("Plan written to {}", out.display());
            }
            Ok(())
        }
    }
}

fn cmd_apply(project: &Path, diff: &Path, format: OutputFormat) -> Result<()> {
    let content =
        std::fs::read(diff).with_context(|| format!("Failed to read {}", diff.display()))?;
    let plan: ProjectDiff = serde_json::from_slice(&content)
        .with_context(|| format!("Failed to parse {}", diff.display()))?;

    let files = ProjectFiles::resolve(project);
    let reports = commit_project(&files, &plan)?;

    match format {
        OutputFormat::Json => print_json(&reports),
        OutputFormat::Pretty => {
            for r in &reports {
                println!(
                    "{} {:<6} {} deleted, {} updated, {} appended",
                    "OK".green().bold(),
                    r.family.to_string(),
                    r.deleted,
                    r.updated,
                    r.appended
                );
                if let Some(backup) = &r.backup {
                    println!("       backup {}", backup.display());
                }
                for w in &r.warnings {
                    println!("  {} {:?}", "warning".yellow(), w);
                }
            }
            Ok(())
        }
    }
}

fn cmd_import(project: &Path, out: Option<&Path>, format: OutputFormat) -> Result<()> {
    let files = ProjectFiles::resolve(project);
    let imported = import_project(&files)?;

    if let Some(out) = out {
        let yaml = serde_yaml::to_string(&imported.entries).context("Failed to serialize entries")?;
        write_atomic(out, yaml.as_bytes())?;
    }

    match format {
        OutputFormat::Json => print_json(&imported),
        OutputFormat::Pretty => {
            println!(
                "{} Imported {} entries from {}",
                "OK".green().bold(),
                imported.entries.len(),
                project.display()
            );
            for w in &imported.warnings {
                println!("  {} {:?}", "warning".yellow(), w);
            }
            if !imported.left_out.is_empty() {
                println!(
                    "{} {} rows were not imported; a plan from these entries deletes them:",
                    "note".yellow().bold(),
                    imported.left_out.len()
                );
                for row in &imported.left_out {
                    println!("  - {:<6} {}", row.family.to_string(), row.key.red());
                }
            }
            Ok(())
        }
    }
}

fn cmd_inspect(file: &Path, rows: bool, format: OutputFormat) -> Result<()> {
    let table = Table::open(file)?;

    if format == OutputFormat::Json {
        let live: Vec<_> = if rows { table.rows().collect() } else { Vec::new() };
        return print_json(&serde_json::json!({
            "path": file,
            "header": table.header(),
            "fields": table.fields(),
            "live_rows": table.live_count(),
            "deleted_rows": table.len() - table.live_count(),
            "rows": live,
        }));
    }

    let header = table.header();
    println!("{}", file.display().to_string().cyan().bold());
    println!("  version      0x{:02X}", header.version);
    if let Some(date) = header.last_update {
        println!("  last update  {}", date);
    }
    println!(
        "  rows         {} ({} deleted)",
        table.len(),
        table.len() - table.live_count()
    );
    println!("  header len   {}", header.header_len);
    println!("  record len   {}", header.record_len);
    println!();
    for f in table.fields() {
        println!("  {:<10} {}({:>3}) @{}", f.name, char::from(f.kind.code()), f.width, f.offset);
    }

    if rows {
        println!();
        for row in table.rows() {
            let line: Vec<String> = row
                .iter()
                .filter(|(_, v)| !v.is_empty())
                .map(|(k, v)| format!("{}={}", k, v))
                .collect();
            println!("  {}", line.join(" "));
        }
    }
    Ok(())
}

// =============================================================================
// HELPERS
// =============================================================================

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).context("JSON serialization failed")?;
    println!("{}", json);
    Ok(())
}

fn print_warnings<'a, W: std::fmt::Display + 'a>(warnings: impl Iterator<Item = &'a W>) {
    for w in warnings {
        println!("  {} {}", "warning".yellow(), w);
    }
}

fn print_plan(diff: &ProjectDiff) {
    for (family, s) in diff.summary() {
        println!(
            "{:<6} {} new, {} modified, {} orphaned, {} unchanged",
            family.to_string().bold(),
            s.new.to_string().green(),
            s.modified.to_string().yellow(),
            s.orphaned.to_string().red(),
            s.unchanged
        );
    }

    for m in &diff.point.modified {
        println!("  ~ {}", m.record.name);
        for c in &m.changes {
            println!("      {}: {:?} -> {:?}", c.field, c.old, c.new);
        }
    }
    for r in &diff.point.orphaned {
        println!("  - {}", r.name.red());
    }

    print_warnings(diff.warnings.iter());

    if diff.is_empty() {
        println!("{} project is up to date", "OK".green().bold());
    }
}

/// Write through a temp file in the target directory, then rename.
fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    let mut tmp = tempfile::NamedTempFile::new_in(&dir)
        .with_context(|| format!("Failed to create temp file in {}", dir.display()))?;
    tmp.write_all(contents)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    tmp.persist(path)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}
