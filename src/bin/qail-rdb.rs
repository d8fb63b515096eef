//! qail-rdb — compile commands and queries to MySQL without a database
//!
//! # Usage
//!
//! ```bash
//! # Show the execution units of a command batch
//! qail-rdb compile --schema catalog.toml commands.json
//!
//! # Show the SELECT for a query
//! qail-rdb select --schema catalog.toml query.json --mode paging
//! ```

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use colored::*;
use qail_rdb::prelude::*;

#[derive(Parser)]
#[command(name = "qail-rdb")]
#[command(version)]
#[command(about = "Compile abstract commands and queries to MySQL", long_about = None)]
#[command(after_help = "EXAMPLES:
    qail-rdb compile --schema catalog.toml commands.json
    qail-rdb select --schema catalog.toml query.json --mode exists")]
struct Cli {
    /// Entity catalog (TOML)
    #[arg(short, long, global = true, env = "QAIL_RDB_SCHEMA")]
    schema: Option<PathBuf>,

    /// Engine config (TOML); defaults to the user config directory
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum SelectMode {
    Select,
    Paging,
    Exists,
    Count,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile a JSON list of commands into execution units
    Compile {
        /// Path to the commands JSON file
        commands: PathBuf,
    },
    /// Compile a JSON query into a read statement
    Select {
        /// Path to the query JSON file
        query: PathBuf,

        #[arg(short, long, value_enum, default_value = "select")]
        mode: SelectMode,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    if let Err(e) = run(&cli) {
        eprintln!("{} {:#}", "Error:".red().bold(), e);
        std::process::exit(1);
    }
}

fn run(cli: &Cli) -> anyhow::Result<()> {
    let catalog = match &cli.schema {
        Some(path) => EntityCatalog::load(path)
            .with_context(|| format!("loading schema {}", path.display()))?,
        None => EntityCatalog::new(),
    };
    let config = match &cli.config {
        Some(path) => EngineConfig::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => EngineConfig::load_default()?,
    };

    match &cli.command {
        Commands::Compile { commands } => compile_commands(&catalog, &config, commands),
        Commands::Select { query, mode } => compile_query(&catalog, query, *mode),
    }
}

fn compile_commands(catalog: &EntityCatalog, config: &EngineConfig, path: &Path) -> anyhow::Result<()> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    let commands: Vec<Command> = serde_json::from_str(&content).context("parsing commands")?;

    let converter = MySqlFieldConverter;
    let compiler = CommandCompiler::new(catalog, &converter);
    let policy = config.batch.policy();
    let units = BatchPlanner::new(&compiler, &policy)
        .trace(config.trace_statements)
        .plan(&commands)?;

    println!(
        "{} {} commands → {} units",
        "Compiled".green().bold(),
        commands.len(),
        units.len()
    );
    for (i, unit) in units.iter().enumerate() {
        println!();
        let mut flags = Vec::new();
        if unit.perform_alone {
            flags.push("alone");
        }
        if unit.must_affect_rows {
            flags.push("must-affect");
        }
        println!(
            "{} {}",
            format!("Unit {}:", i + 1).cyan().bold(),
            flags.join(", ").dimmed()
        );
        for statement in &unit.statements {
            println!("  {}", statement.white());
        }
        print_parameters(&unit.parameters);
    }
    Ok(())
}

fn compile_query(catalog: &EntityCatalog, path: &Path, mode: SelectMode) -> anyhow::Result<()> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    let query: Query = serde_json::from_str(&content).context("parsing query")?;

    let converter = MySqlFieldConverter;
    let builder = StatementBuilder::new(catalog, &converter);
    let mut ctx = TranslationContext::new();
    let statement = match mode {
        SelectMode::Select => builder.select(&query, &mut ctx)?,
        SelectMode::Paging => builder.paging(&query, &mut ctx)?,
        SelectMode::Exists => builder.exists(&query, &mut ctx)?,
        SelectMode::Count => builder.aggregate(AggregateFunction::Count, &query, &mut ctx)?,
    };

    println!("{}", "Generated SQL:".green().bold());
    println!("{}", statement.text.white());
    print_parameters(&statement.parameters);
    Ok(())
}

fn print_parameters(parameters: &ParameterSet) {
    if parameters.is_empty() {
        return;
    }
    println!("{}", "  Parameters:".cyan());
    for p in parameters.iter() {
        println!("    ?{} = {}", p.name, p.value.to_string().yellow());
    }
}
