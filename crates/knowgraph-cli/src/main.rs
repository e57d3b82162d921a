//! Knowgraph CLI - query a typed knowledge graph

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use knowgraph_core::config::Config;
use knowgraph_core::engine::{Constraints, KnowledgeEngine, QueryResult, SemanticQuery};
use knowgraph_core::Error;
use knowgraph_core::graph::{
    Confidence, DEFAULT_LINEAGE_DEPTH, DEFAULT_MIN_URGENCY, Graph, Lineage, Node, get_blocked_wants,
    get_related_nodes, get_untested_ideas, get_urgent_wants, trace_lineage,
};
use knowgraph_core::learning::LearningLog;
use serde::Serialize;
use tracing::debug;

#[derive(Parser)]
#[command(name = "knowgraph")]
#[command(author, version, about = "Query and rank a typed knowledge graph", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Graph document (JSON-LD style, with an @graph array)
    #[arg(long, global = true, default_value = "knowledge.jsonld")]
    graph: PathBuf,

    /// Directory for learning state (defaults to the configured one)
    #[arg(long, global = true)]
    state_dir: Option<PathBuf>,

    /// Output format (text or json)
    #[arg(long, global = true, default_value = "text")]
    format: OutputFormat,
}

#[derive(Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Ask a question and get ranked nodes
    Query {
        question: String,
        /// Maximum nodes returned
        #[arg(long)]
        max_items: Option<usize>,
        /// Traversal depth
        #[arg(long)]
        max_hops: Option<usize>,
        /// Only nodes of this type (repeatable)
        #[arg(long = "type")]
        types: Vec<String>,
        /// Only nodes at or above this tier (high, medium, low)
        #[arg(long, value_parser = parse_confidence)]
        min_confidence: Option<Confidence>,
    },

    /// Wants at or above an urgency
    Urgent {
        #[arg(long, default_value_t = DEFAULT_MIN_URGENCY)]
        min: u8,
    },

    /// Wants with a declared blocker
    Blocked,

    /// Nodes that have never been tested
    Untested,

    /// Nodes one relationship away from a node
    Related { id: String },

    /// Follow emergedFrom links back from a node
    Lineage {
        id: String,
        #[arg(long, default_value_t = DEFAULT_LINEAGE_DEPTH)]
        depth: usize,
    },

    /// Report dangling references and graph insights
    Check,

    /// Summarize the graph and its usage
    Introspect,

    /// Adjust confidence from recent usage and save the graph
    Reinforce,

    /// Record a test outcome for a node and save the graph
    Validate {
        id: String,
        #[arg(long, conflicts_with = "failed", required_unless_present = "failed")]
        passed: bool,
        #[arg(long)]
        failed: bool,
    },

    /// Show recent queries
    History {
        #[arg(short, long, default_value_t = 20)]
        limit: usize,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Get a configuration value
    Get { key: String },
    /// Set a configuration value
    Set { key: String, value: String },
    /// List all configuration values
    List,
    /// Show config file path
    Path,
}

fn parse_confidence(s: &str) -> Result<Confidence, String> {
    Confidence::parse(s).ok_or_else(|| format!("unknown confidence tier '{s}' (expected high, medium or low)"))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive("knowgraph=info".parse()?),
        )
        .init();

    let cli = Cli::parse();
    let result = run(cli).await;
    if let Err(err) = &result {
        if let Some(hint) = err.downcast_ref::<Error>().and_then(Error::suggestion) {
            eprintln!("Hint: {}", hint);
        }
    }
    result
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let format = cli.format;

    match cli.command {
        Commands::Query {
            question,
            max_items,
            max_hops,
            types,
            min_confidence,
        } => {
            let constraints = Constraints {
                types,
                min_confidence,
                max_hops,
                include_emotional: None,
            };
            let mut query = SemanticQuery::new(question);
            if let Some(max_items) = max_items {
                query = query.with_max_items(max_items);
            }
            if !constraints.is_empty() {
                query = query.with_constraints(constraints);
            }
            cmd_query(&cli.graph, cli.state_dir, query, format).await
        }

        Commands::Urgent { min } => {
            let graph = Graph::load_file(&cli.graph).await?;
            print_nodes(&get_urgent_wants(&graph, min), format, "No urgent wants.")
        }

        Commands::Blocked => {
            let graph = Graph::load_file(&cli.graph).await?;
            print_nodes(&get_blocked_wants(&graph), format, "Nothing is blocked.")
        }

        Commands::Untested => {
            let graph = Graph::load_file(&cli.graph).await?;
            print_nodes(&get_untested_ideas(&graph), format, "No untested ideas.")
        }

        Commands::Related { id } => cmd_related(&cli.graph, &id, format).await,

        Commands::Lineage { id, depth } => {
            let graph = Graph::load_file(&cli.graph).await?;
            if !graph.contains(&id) {
                return Err(Error::NodeNotFound(id).into());
            }
            let lineage = trace_lineage(&graph, &id, depth);
            match format {
                OutputFormat::Json => print_json(&lineage),
                OutputFormat::Text => {
                    print_lineage(&lineage, 0);
                    Ok(())
                }
            }
        }

        Commands::Check => cmd_check(&cli.graph, cli.state_dir, format).await,

        Commands::Introspect => {
            let engine = open_engine(&cli.graph, cli.state_dir).await?;
            let report = engine.introspect().await;
            match format {
                OutputFormat::Json => print_json(&report)?,
                OutputFormat::Text => {
                    println!("Nodes: {}", report.node_count);
                    for (node_type, count) in &report.type_counts {
                        println!("  {}: {}", node_type, count);
                    }
                    println!("Relationships:");
                    for (field, count) in &report.relationship_counts {
                        println!("  {}: {}", field, count);
                    }
                    println!("Dangling references: {}", report.dangling_references);
                    println!("History: {} queries, {} patterns", report.history_len, report.pattern_count);
                    if !report.top_queries.is_empty() {
                        println!("Top queries:");
                        for (query, count) in &report.top_queries {
                            println!("  {} ({})", query, count);
                        }
                    }
                }
            }
            Ok(())
        }

        Commands::Reinforce => {
            let engine = open_engine(&cli.graph, cli.state_dir).await?;
            let updates = engine.reinforce().await;
            engine.save_graph(&cli.graph).await?;
            engine.shutdown().await?;
            match format {
                OutputFormat::Json => print_json(&updates),
                OutputFormat::Text => {
                    if updates.is_empty() {
                        println!("No confidence changes.");
                    }
                    for update in &updates {
                        println!(
                            "{}: {} -> {} ({})",
                            update.node_id,
                            update.old.map(|c| c.as_str()).unwrap_or("none"),
                            update.new,
                            update.reason
                        );
                    }
                    Ok(())
                }
            }
        }

        Commands::Validate { id, passed, .. } => {
            let engine = open_engine(&cli.graph, cli.state_dir).await?;
            let outcome = engine.validate_node(&id, passed).await?;
            engine.save_graph(&cli.graph).await?;
            engine.shutdown().await?;
            match format {
                OutputFormat::Json => print_json(&outcome),
                OutputFormat::Text => {
                    println!(
                        "{}: {} (tested {} times, confidence {})",
                        outcome.node_id,
                        if outcome.passed { "passed" } else { "failed" },
                        outcome.tested,
                        outcome.new.map(|c| c.as_str()).unwrap_or("none")
                    );
                    Ok(())
                }
            }
        }

        Commands::History { limit } => {
            let state_dir = resolve_state_dir(cli.state_dir)?;
            let config = Config::load()?;
            let log = LearningLog::open(&state_dir, &config.learning).await?;
            let records = log.recent_history(limit);
            match format {
                OutputFormat::Json => print_json(&records),
                OutputFormat::Text => {
                    if records.is_empty() {
                        println!("No queries recorded.");
                    }
                    for record in records {
                        println!(
                            "{}  {}  ({} results)",
                            record.timestamp.format("%Y-%m-%d %H:%M:%S"),
                            record.query,
                            record.result_node_ids.len()
                        );
                    }
                    Ok(())
                }
            }
        }

        Commands::Config { action } => cmd_config(action),
    }
}

// ============================================================================
// Command Implementations
// ============================================================================

fn resolve_state_dir(state_dir: Option<PathBuf>) -> anyhow::Result<PathBuf> {
    match state_dir {
        Some(dir) => Ok(dir),
        None => Config::load()?.resolved_state_dir(),
    }
}

async fn open_engine(graph_path: &Path, state_dir: Option<PathBuf>) -> anyhow::Result<KnowledgeEngine> {
    let config = Config::load()?;
    let state_dir = resolve_state_dir(state_dir)?;
    debug!(graph = %graph_path.display(), state_dir = %state_dir.display(), "Opening engine");
    Ok(KnowledgeEngine::open(graph_path, &state_dir, config).await?)
}

async fn cmd_query(
    graph_path: &Path,
    state_dir: Option<PathBuf>,
    query: SemanticQuery,
    format: OutputFormat,
) -> anyhow::Result<()> {
    let engine = open_engine(graph_path, state_dir).await?;
    let result = engine.query(query).await;
    engine.shutdown().await?;

    match format {
        OutputFormat::Json => print_json(&result),
        OutputFormat::Text => {
            print_result(&result);
            Ok(())
        }
    }
}

async fn cmd_related(graph_path: &Path, id: &str, format: OutputFormat) -> anyhow::Result<()> {
    let graph = Graph::load_file(graph_path).await?;
    if !graph.contains(id) {
        return Err(Error::NodeNotFound(id.to_string()).into());
    }
    let related = get_related_nodes(&graph, id);
    match format {
        OutputFormat::Json => print_json(&related)?,
        OutputFormat::Text => {
            if related.is_empty() {
                println!("Nothing is related to '{}'.", id);
            }
            for related_id in &related {
                match graph.get(related_id) {
                    Some(node) => println!("  {}", node_line(node)),
                    None => println!("  {} [missing]", related_id),
                }
            }
        }
    }
    Ok(())
}

async fn cmd_check(graph_path: &Path, state_dir: Option<PathBuf>, format: OutputFormat) -> anyhow::Result<()> {
    let engine = open_engine(graph_path, state_dir).await?;
    let dangling = engine.integrity().await;
    let insights = engine.insights().await;

    match format {
        OutputFormat::Json => print_json(&serde_json::json!({
            "danglingReferences": dangling,
            "insights": insights,
        })),
        OutputFormat::Text => {
            if dangling.is_empty() && insights.is_empty() {
                println!("No problems found.");
                return Ok(());
            }
            if !dangling.is_empty() {
                println!("Dangling references:");
                for reference in &dangling {
                    println!("  {}.{} -> {}", reference.node_id, reference.field, reference.dangling_target);
                }
            }
            if !insights.is_empty() {
                println!("Insights:");
                for insight in &insights {
                    println!("  [{}] {} ({:.2})", insight.kind, insight.description, insight.confidence);
                    println!("       nodes: {}", insight.affected_nodes.join(", "));
                    println!("       action: {}", insight.suggested_action);
                }
            }
            Ok(())
        }
    }
}

fn cmd_config(action: ConfigAction) -> anyhow::Result<()> {
    match action {
        ConfigAction::Get { key } => {
            let config = Config::load()?;
            println!("{}", config.get(&key)?);
        }
        ConfigAction::Set { key, value } => {
            let mut config = Config::load()?;
            config.set(&key, &value)?;
            config.save()?;
            println!("Set {} = {}", key, value);
        }
        ConfigAction::List => {
            let config = Config::load()?;
            for (key, value) in config.list()? {
                println!("{} = {}", key, value);
            }
        }
        ConfigAction::Path => {
            println!("{}", Config::config_path()?.display());
        }
    }
    Ok(())
}

// ============================================================================
// Output
// ============================================================================

fn print_json<T: Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn node_line(node: &Node) -> String {
    let mut line = format!("{} [{}]", node.id, node.node_type);
    if let Some(description) = &node.description {
        line.push_str(&format!(" {}", description));
    }
    if let Some(urgency) = node.urgency {
        line.push_str(&format!(" (urgency {})", urgency));
    }
    if let Some(confidence) = node.confidence {
        line.push_str(&format!(" ({} confidence)", confidence));
    }
    line
}

fn print_nodes(nodes: &[&Node], format: OutputFormat, empty: &str) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => print_json(nodes),
        OutputFormat::Text => {
            if nodes.is_empty() {
                println!("{}", empty);
            }
            for node in nodes {
                println!("  {}", node_line(node));
            }
            Ok(())
        }
    }
}

fn print_result(result: &QueryResult) {
    if result.is_empty() {
        println!("No matching nodes.");
    }
    for (rank, ranked) in result.nodes.iter().enumerate() {
        println!("{:>2}. {} (score {})", rank + 1, node_line(&ranked.node), ranked.score);
        if !ranked.reasons.is_empty() {
            println!("      {}", ranked.reasons.join(", "));
        }
    }
    println!();
    println!("Confidence: {:.2}", result.confidence);
    println!("{}", result.reasoning);
    if !result.suggested_connections.is_empty() {
        println!("Suggested connections:");
        for suggestion in &result.suggested_connections {
            println!(
                "  {} -{}-> {} ({:.2})",
                suggestion.from, suggestion.relationship, suggestion.to, suggestion.confidence
            );
        }
    }
}

fn print_lineage(lineage: &Lineage, level: usize) {
    let indent = "  ".repeat(level);
    match &lineage.description {
        Some(description) => println!("{}{} {}", indent, lineage.id, description),
        None => println!("{}{}", indent, lineage.id),
    }
    if let Some(parent) = &lineage.emerged_from {
        print_lineage(parent, level + 1);
    }
}
