use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use graphsift_api::CypherResponse;
use graphsift_app::FilterController;
use graphsift_core::{CollapseConfig, EntityKind, Operator, Predicate, SessionMode};
use graphsift_events::Event;
use graphsift_store::Storage;
use serde::Serialize;
use std::path::{Path, PathBuf};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the SQLite database holding saved filters
    #[arg(short, long, global = true)]
    db: Option<PathBuf>,

    /// Graph query response (JSON) to filter
    #[arg(short, long, global = true)]
    graph: Option<PathBuf>,

    /// Log pipeline details to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the filter pipeline and print what stays visible
    Apply,
    /// List sessions found in the graph
    Sessions,
    /// List properties found on nodes or edges
    Properties {
        #[arg(long, default_value = "node")]
        kind: EntityKind,
    },
    /// Print the saved filter configuration
    Show,
    /// Choose the session/time view mode
    SetSession {
        mode: SessionMode,
        #[arg(long)]
        session: Option<String>,
    },
    /// Restrict the time-range mode to [start, end] (epoch ms)
    TimeWindow { start: i64, end: i64 },
    /// Add a property predicate
    AddPredicate {
        #[arg(long, default_value = "node")]
        kind: EntityKind,
        property: String,
        operator: Operator,
        #[arg(default_value = "")]
        value: String,
    },
    /// Enable or disable a predicate by index
    TogglePredicate {
        #[arg(long, default_value = "node")]
        kind: EntityKind,
        index: usize,
        #[arg(long)]
        off: bool,
    },
    /// Remove a predicate by index
    RemovePredicate {
        #[arg(long, default_value = "node")]
        kind: EntityKind,
        index: usize,
    },
    /// Group nodes or edges sharing the given property values
    Collapse {
        #[arg(long, default_value = "node")]
        kind: EntityKind,
        #[arg(value_delimiter = ',')]
        group_by: Vec<String>,
        #[arg(long)]
        disable: bool,
    },
    /// Expand every collapsed group and switch collapsing off
    ExpandAll,
    /// Restore default filters
    Reset,
    /// Write the visible subgraph and its filters as JSON
    Export {
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
}

fn default_db_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("graphsift")
        .join("state.db")
}

fn load_graph(controller: &FilterController, path: Option<&Path>) -> Result<()> {
    let Some(path) = path else {
        bail!("This command needs a graph. Pass --graph <response.json>.");
    };
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read graph file {}", path.display()))?;
    let response: CypherResponse = serde_json::from_str(&raw)
        .with_context(|| format!("Graph file {} is not a query response", path.display()))?;
    let report = controller.load_response(response)?;
    if !report.is_clean() {
        eprintln!(
            "Dropped {} edges, {} duplicate nodes, {} duplicate edges.",
            report.dropped_edges.len(),
            report.duplicate_nodes.len(),
            report.duplicate_edges.len()
        );
    }
    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_max_level(if args.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::WARN
        })
        .init();

    let db_path = args.db.unwrap_or_else(default_db_path);
    let storage = Storage::open(&db_path)
        .with_context(|| format!("Failed to open state store {}", db_path.display()))?;
    let controller = FilterController::new().with_store(Box::new(storage))?;
    let graph = args.graph.as_deref();

    match args.command {
        Command::Apply => {
            load_graph(&controller, graph)?;
            let applied = controller.apply_all_filters()?;
            if let Some(fallback) = applied.fallback {
                eprintln!("{}", fallback.message());
            }
            for invalid in &applied.report.invalid_patterns {
                eprintln!(
                    "Invalid regex for {} property {}: {}",
                    invalid.kind.as_str(),
                    invalid.property,
                    invalid.error
                );
            }
            print_json(&controller.stats())?;
            let nodes: Vec<&str> = applied.view.nodes.iter().map(|id| id.as_str()).collect();
            let edges: Vec<&str> = applied.view.edges.iter().map(|id| id.as_str()).collect();
            print_json(&serde_json::json!({ "nodes": nodes, "edges": edges }))?;
        }
        Command::Sessions => {
            load_graph(&controller, graph)?;
            print_json(&controller.sessions())?;
        }
        Command::Properties { kind } => {
            load_graph(&controller, graph)?;
            print_json(&controller.available_properties(kind))?;
        }
        Command::Show => print_json(&controller.filters())?,
        Command::SetSession { mode, session } => {
            controller.set_session_mode(mode);
            if session.is_some() {
                controller.select_session(session);
            } else if mode.requires_session()
                && controller.filters().session.session().is_none()
            {
                eprintln!(
                    "Mode {} shows everything until a session is selected.",
                    mode.as_str()
                );
            }
        }
        Command::TimeWindow { start, end } => {
            if graph.is_some() {
                load_graph(&controller, graph)?;
            }
            controller.set_time_window(start, end)?;
        }
        Command::AddPredicate {
            kind,
            property,
            operator,
            value,
        } => {
            if operator.takes_value() && value.is_empty() {
                bail!("Operator {} needs a value", operator.as_str());
            }
            let index = controller.add_predicate(kind, Predicate::new(property, operator, value));
            println!("Added {} predicate #{index}", kind.as_str());
        }
        Command::TogglePredicate { kind, index, off } => {
            controller.set_predicate_enabled(kind, index, !off)?;
        }
        Command::RemovePredicate { kind, index } => {
            let removed = controller.remove_predicate(kind, index)?;
            println!("Removed predicate on {}", removed.property);
        }
        Command::Collapse {
            kind,
            group_by,
            disable,
        } => {
            let config = if disable {
                CollapseConfig {
                    enabled: false,
                    group_by,
                }
            } else {
                if group_by.is_empty() {
                    bail!("Give at least one property to group by");
                }
                CollapseConfig::new(group_by)
            };
            controller.set_collapse(kind, config);
        }
        Command::ExpandAll => controller.expand_all_collapsed(),
        Command::Reset => controller.reset_filters(),
        Command::Export { out } => {
            load_graph(&controller, graph)?;
            let export = controller.export_filtered_view()?;
            let json = serde_json::to_string_pretty(&export)?;
            match out {
                Some(path) => {
                    std::fs::write(&path, json)
                        .with_context(|| format!("Failed to write {}", path.display()))?;
                    println!(
                        "Exported {} nodes and {} edges to {}",
                        export.nodes.len(),
                        export.edges.len(),
                        path.display()
                    );
                }
                None => println!("{json}"),
            }
        }
    }

    for event in controller.event_bus().drain() {
        if let Event::FilterStateSaveFailed { error } = event {
            eprintln!("Warning: filters were not saved: {error}");
        }
    }
    Ok(())
}
