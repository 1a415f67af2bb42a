//! Tabula CLI - inspect and edit plan documents
//!
//! Usage:
//!   tabula check <plan.json>
//!   tabula deps <plan.json> <node>
//!   tabula rename <plan.json> <old> <new> [-o <out.json>]
//!   tabula key <plan.json> <node>
//!   tabula decompose <FORMULA> <column> [--secondary <column>]
//!
//! Examples:
//!   tabula check plans/sales.json
//!   tabula rename plans/sales.json orders orders_2024 -o plans/sales_2024.json
//!   tabula decompose VARIANCE amount

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tabula::aggregate::{decompose, AggregateFormula, AggregateRef};
use tabula::config::Settings;
use tabula::content::ContentKey;
use tabula::document;
use tabula::model::ColumnRef;
use tabula::PlanGraph;

#[derive(Parser)]
#[command(name = "tabula")]
#[command(about = "Tabula - inspect, validate and edit logical query plans")]
#[command(version)]
struct Cli {
    /// Log at debug level regardless of settings
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate every node of a plan
    Check {
        /// Path to the plan document
        file: PathBuf,
    },

    /// Show what a node depends on and what depends on it
    Deps {
        /// Path to the plan document
        file: PathBuf,

        /// Node name
        node: String,
    },

    /// Rename a node and every reference to it
    Rename {
        /// Path to the plan document
        file: PathBuf,

        /// Current node name
        old: String,

        /// New node name
        new: String,

        /// Write the result here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Print the canonical content key of a node
    Key {
        /// Path to the plan document
        file: PathBuf,

        /// Node name
        node: String,
    },

    /// Show how an aggregate splits into per-partition partials
    Decompose {
        /// Aggregate formula, e.g. SUM, VARIANCE, CORRELATION
        formula: String,

        /// Aggregated column
        column: String,

        /// Second column (weight or second variable)
        #[arg(short, long)]
        secondary: Option<String>,
    },
}

fn init_logging(settings: &Settings, verbose: bool) {
    let level = if verbose {
        tracing::Level::DEBUG
    } else {
        settings
            .logging
            .level
            .parse()
            .unwrap_or(tracing::Level::INFO)
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let settings = match Settings::load() {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            return ExitCode::FAILURE;
        }
    };
    init_logging(&settings, cli.verbose);

    match cli.command {
        Commands::Check { file } => cmd_check(&settings, file),
        Commands::Deps { file, node } => cmd_deps(&settings, file, &node),
        Commands::Rename {
            file,
            old,
            new,
            output,
        } => cmd_rename(&settings, file, &old, &new, output),
        Commands::Key { file, node } => cmd_key(&settings, file, &node),
        Commands::Decompose {
            formula,
            column,
            secondary,
        } => cmd_decompose(&settings, &formula, &column, secondary),
    }
}

fn load(settings: &Settings, file: &PathBuf) -> Option<PlanGraph> {
    match document::read_file(file) {
        Ok(graph) => Some(graph.with_options(settings.validation_options())),
        Err(e) => {
            eprintln!("Error reading plan '{}': {}", file.display(), e);
            None
        }
    }
}

fn cmd_check(settings: &Settings, file: PathBuf) -> ExitCode {
    let Some(mut graph) = load(settings, &file) else {
        return ExitCode::FAILURE;
    };

    let report = graph.update_all();
    for name in &report.stale {
        eprintln!("stale: {}", name);
    }
    let problems = graph.validate_all();
    if problems.is_empty() && report.stale.is_empty() {
        println!("OK: {} ({} nodes)", file.display(), graph.len());
        return ExitCode::SUCCESS;
    }

    eprintln!("Validation errors:");
    for (node, err) in &problems {
        eprintln!("  {}: {}", node, err);
    }
    ExitCode::FAILURE
}

fn cmd_deps(settings: &Settings, file: PathBuf, node: &str) -> ExitCode {
    let Some(graph) = load(settings, &file) else {
        return ExitCode::FAILURE;
    };

    let dependents = match graph.augmented_dependents_of(node) {
        Ok(d) => d,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    println!("{} depends on:", node);
    if dependents.is_empty() {
        println!("  (nothing)");
    }
    for (target, types) in &dependents {
        let types: Vec<_> = types.iter().map(|t| t.as_str()).collect();
        println!("  - {} [{}]", target, types.join(", "));
    }

    let dependers = graph.dependers_of(node);
    println!();
    println!("Used by:");
    if dependers.is_empty() {
        println!("  (nothing)");
    }
    for depender in dependers {
        println!("  - {}", depender);
    }
    ExitCode::SUCCESS
}

fn cmd_rename(
    settings: &Settings,
    file: PathBuf,
    old: &str,
    new: &str,
    output: Option<PathBuf>,
) -> ExitCode {
    let Some(mut graph) = load(settings, &file) else {
        return ExitCode::FAILURE;
    };

    if let Err(e) = graph.rename_node(old, new) {
        eprintln!("Rename failed: {}", e);
        return ExitCode::FAILURE;
    }

    let result = match &output {
        Some(path) => document::write_file(path, &graph),
        None => document::to_json(&graph).map(|text| println!("{}", text)),
    };
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error writing plan: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn cmd_key(settings: &Settings, file: PathBuf, node: &str) -> ExitCode {
    let Some(graph) = load(settings, &file) else {
        return ExitCode::FAILURE;
    };

    match graph.get(node) {
        Some(n) => {
            println!("{}", n.content_key());
            println!("digest: {}", n.content_digest());
            ExitCode::SUCCESS
        }
        None => {
            eprintln!("Unknown node: '{}'", node);
            ExitCode::FAILURE
        }
    }
}

fn cmd_decompose(settings: &Settings, formula: &str, column: &str, secondary: Option<String>) -> ExitCode {
    let Some(formula) = AggregateFormula::parse(formula) else {
        eprintln!("Unknown formula: '{}'", formula);
        return ExitCode::FAILURE;
    };

    let mut aggr = AggregateRef::new(formula, ColumnRef::new(column));
    if let Some(sec) = secondary {
        aggr = aggr.with_secondary(ColumnRef::new(sec));
    }

    // A non-decomposable formula is an answer, not a failure.
    match decompose(&aggr, &settings.aggregate_capabilities()) {
        Ok(composite) => {
            println!("{} ({})", aggr.output_name(), composite.uid);
            println!("Partials:");
            for partial in &composite.partials {
                println!("  - {} [{}]", partial.output_name(), partial.unique_id());
            }
            println!("Combiner: {:?}", composite.combiner);
        }
        Err(reason) => println!("{}", reason),
    }
    ExitCode::SUCCESS
}
