//! notecalc - evaluate calc blocks in Markdown notes
//!
//! Acts as the document surface for the engine: it reads a note, hands each
//! fenced ```` ```calc ```` block to the engine in document order and prints
//! the rendered rows.

mod blocks;
mod render;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use colored::*;
use notecalc_engine::{
    load_settings, BlockOptions, CalcEngine, CalcSettings, GlobalConstantStore,
    JsonFilePersistence, LineResult, UnitSystem,
};
use std::path::{Path, PathBuf};
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "notecalc")]
#[command(about = "Unit-aware calculations for Markdown notes")]
#[command(long_about = "Unit-aware calculations for Markdown notes

Examples:
  notecalc eval notes/pump.md               # Evaluate every calc block
  notecalc inline '72 km/h to m/s'          # Evaluate one statement
  notecalc --system us inline 'mass = 5 kg' # Display in US units
  notecalc const set g0 '9.80665 m/s^2'     # Store a global constant
  notecalc units                            # List unit symbols")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Settings file (TOML, YAML or JSON)
    #[arg(short = 'c', long, global = true, env = "NOTECALC_CONFIG")]
    config: Option<PathBuf>,

    /// Global constants file
    #[arg(
        long,
        global = true,
        env = "NOTECALC_CONSTANTS",
        default_value = "notecalc-constants.json"
    )]
    constants: PathBuf,

    /// Display unit system
    #[arg(long, global = true, value_enum)]
    system: Option<SystemArg>,

    /// Decimal places
    #[arg(long, global = true)]
    precision: Option<u32>,

    /// Two-line equation rendering
    #[arg(long, global = true)]
    equations: bool,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,
}

#[derive(Clone, Copy, ValueEnum)]
enum SystemArg {
    Si,
    Us,
}

impl From<SystemArg> for UnitSystem {
    fn from(arg: SystemArg) -> Self {
        match arg {
            SystemArg::Si => UnitSystem::Si,
            SystemArg::Us => UnitSystem::Us,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Evaluate every calc block of a Markdown file
    Eval {
        /// Markdown file
        file: PathBuf,

        /// Print results as JSON
        #[arg(long)]
        json: bool,
    },

    /// Evaluate one statement
    Inline {
        /// Assignment, conversion or expression
        expr: String,

        /// Document identity the statement runs in
        #[arg(long, default_value = "inline")]
        doc: String,

        /// Evaluate this file's blocks first so their variables are visible
        #[arg(long)]
        file: Option<PathBuf>,
    },

    /// List known unit symbols
    Units,

    /// Manage global constants
    Const {
        #[command(subcommand)]
        command: ConstCommands,
    },
}

#[derive(Subcommand)]
enum ConstCommands {
    /// List all constants
    List,

    /// Create or replace a constant
    Set {
        /// Constant name
        name: String,
        /// Source expression
        expr: String,
    },

    /// Delete a constant
    Delete {
        /// Constant name
        name: String,
    },
}

fn init_logging(verbose: u8) {
    let filter = match verbose {
        0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        1 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn resolve_settings(cli: &Cli) -> Result<CalcSettings> {
    let mut settings = load_settings(cli.config.as_deref()).context("Failed to load settings")?;
    if let Some(system) = cli.system {
        settings.unit_system = system.into();
    }
    if let Some(precision) = cli.precision {
        settings.precision = precision;
    }
    if cli.equations {
        settings.equation_rendering_enabled = true;
    }
    Ok(settings)
}

fn build_engine(cli: &Cli) -> Result<CalcEngine<JsonFilePersistence>> {
    let settings = resolve_settings(cli)?;
    debug!(?settings, "Resolved settings");

    let mut constants = GlobalConstantStore::new(JsonFilePersistence::new(&cli.constants));
    constants.load().with_context(|| {
        format!(
            "Failed to load constants from {}",
            cli.constants.display()
        )
    })?;
    Ok(CalcEngine::new(settings, constants)?)
}

/// Evaluate every block of `path` in document order
fn evaluate_file(
    engine: &mut CalcEngine<JsonFilePersistence>,
    path: &Path,
    document_id: &str,
) -> Result<Vec<(u64, Vec<LineResult>)>> {
    let markdown = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let blocks = blocks::extract_blocks(&markdown);
    debug!(path = %path.display(), blocks = blocks.len(), "Extracted calc blocks");

    let mut rendered = Vec::with_capacity(blocks.len());
    for (index, block) in blocks.iter().enumerate() {
        // Manual mode starts each run of the document from an empty scope
        let options = BlockOptions {
            position: Some(block.line),
            reset_before: index == 0,
        };
        let results = engine.evaluate_block_with(&block.source, document_id, options);
        rendered.push((block.line, results));
    }
    Ok(rendered)
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.no_color {
        colored::control::set_override(false);
    }
    init_logging(cli.verbose);

    match &cli.command {
        Commands::Eval { file, json } => {
            let mut engine = build_engine(&cli)?;
            let document_id = file.display().to_string();
            let rendered = evaluate_file(&mut engine, file, &document_id)?;

            if *json {
                let blocks: Vec<_> = rendered
                    .iter()
                    .map(|(line, results)| serde_json::json!({ "line": line, "results": results }))
                    .collect();
                println!("{}", serde_json::to_string_pretty(&blocks)?);
                return Ok(());
            }

            if rendered.is_empty() {
                println!("{}", "No calc blocks found".dimmed());
            }
            for (line, results) in &rendered {
                render::print_block_header(*line);
                for result in results {
                    render::print_line(result);
                }
            }
        }
        Commands::Inline { expr, doc, file } => {
            let mut engine = build_engine(&cli)?;
            if let Some(file) = file {
                evaluate_file(&mut engine, file, doc)?;
            }
            let result = engine.evaluate_inline(expr, doc);
            render::print_line(&result);
            if result.is_error() {
                std::process::exit(1);
            }
        }
        Commands::Units => {
            let engine = CalcEngine::with_settings(CalcSettings::default())?;
            for symbol in engine.list_known_units() {
                println!("{}", symbol);
            }
        }
        Commands::Const { command } => {
            let mut engine = build_engine(&cli)?;
            match command {
                ConstCommands::List => render::print_constants(&engine.list_global_vars()),
                ConstCommands::Set { name, expr } => {
                    let constant = engine
                        .upsert_global_var(name, expr)
                        .with_context(|| format!("Failed to set constant '{}'", name))?;
                    println!(
                        "{} {} = {}",
                        "OK".green(),
                        constant.name.bright_cyan(),
                        constant.display
                    );
                }
                ConstCommands::Delete { name } => {
                    engine
                        .delete_global_var(name)
                        .with_context(|| format!("Failed to delete constant '{}'", name))?;
                    println!("{} {} removed", "OK".green(), name.bright_cyan());
                }
            }
        }
    }

    Ok(())
}
