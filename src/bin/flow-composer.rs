use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use flow_composer::{
    catalog::Resources,
    config::ComposerConfig,
    definition::{FlowDefinition, FlowHeader, definition_to_persisted, graph_to_definition},
    edges::{generate_edges, start_node_id, terminal_node_id},
    id::IdGenerator,
    layout::auto_layout,
    loader::load_persisted_from_path,
    model::{CanvasGraph, EdgeStyle, Step},
    orchestrator::{FlowInitializer, FlowInputs},
    validate::{is_reachable, lint_edges, validate_edges},
};
use serde::{Serialize, de::DeserializeOwned};
use serde_json::{Value, json};
use std::{
    fs,
    io::{self, Read, Write},
    path::{Path, PathBuf},
};
use tracing::debug;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "flow-composer", version, about = "Flow builder graph tools")]
struct Cli {
    /// Composer configuration (JSON, or TOML with the `toml` feature).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Derive and validate edges for a list of steps.
    Edges(EdgesArgs),
    /// Build the initial canvas from a catalog and optional saved flow.
    Init(InitArgs),
    /// Expand `{{ID}}` placeholders in a JSON document.
    Ids(IdsArgs),
    /// Report edges whose endpoints are missing from a graph.
    CheckEdges(CheckEdgesArgs),
    /// Convert a canvas graph into a server flow definition.
    Export(ExportArgs),
}

#[derive(Args, Debug)]
struct EdgesArgs {
    /// JSON array of steps (`-` for stdin).
    #[arg(long)]
    steps: PathBuf,
    /// Edge rendering mode applied to the output.
    #[arg(long, value_parser = parse_style)]
    style: Option<EdgeStyle>,
}

#[derive(Args, Debug)]
struct InitArgs {
    /// Resource catalog JSON.
    #[arg(long)]
    resources: PathBuf,
    /// Saved canvas flow to hydrate from.
    #[arg(long, conflicts_with = "definition")]
    persisted: Option<PathBuf>,
    /// Server flow definition to hydrate from.
    #[arg(long)]
    definition: Option<PathBuf>,
    /// Flow id; defaults to the file name of the saved flow.
    #[arg(long)]
    flow_id: Option<String>,
    /// Place nodes without a saved position.
    #[arg(long)]
    layout: bool,
    /// Use counter suffixes for generated ids.
    #[arg(long)]
    sequential_ids: bool,
}

#[derive(Args, Debug)]
struct IdsArgs {
    /// JSON document (`-` for stdin).
    input: PathBuf,
    /// Placeholder name between the braces.
    #[arg(long)]
    matcher: Option<String>,
    #[arg(long)]
    sequential_ids: bool,
}

#[derive(Args, Debug)]
struct CheckEdgesArgs {
    /// Graph JSON `{ "nodes": [...], "edges": [...] }` (`-` for stdin).
    graph: PathBuf,
}

#[derive(Args, Debug)]
struct ExportArgs {
    /// Graph JSON `{ "nodes": [...], "edges": [...] }` (`-` for stdin).
    graph: PathBuf,
    #[arg(long)]
    handle: String,
    #[arg(long)]
    name: String,
    #[arg(long, default_value = "AUTHENTICATION")]
    flow_type: String,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_new(&cli.log_level).unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(io::stderr),
        )
        .init();

    let config = match &cli.config {
        Some(path) => ComposerConfig::load_from_file(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => ComposerConfig::default(),
    };

    match cli.command {
        Commands::Edges(args) => handle_edges(args, &config),
        Commands::Init(args) => handle_init(args, config),
        Commands::Ids(args) => handle_ids(args, &config),
        Commands::CheckEdges(args) => handle_check_edges(args, &config),
        Commands::Export(args) => handle_export(args, &config),
    }
}

fn parse_style(raw: &str) -> std::result::Result<EdgeStyle, String> {
    serde_json::from_value(Value::String(raw.to_ascii_lowercase()))
        .map_err(|_| format!("unknown edge style '{raw}'"))
}

fn read_text(path: &Path) -> Result<String> {
    if path == Path::new("-") {
        let mut buf = String::new();
        io::stdin()
            .read_to_string(&mut buf)
            .context("failed to read stdin")?;
        return Ok(buf);
    }
    fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let text = read_text(path)?;
    serde_json::from_str(&text).with_context(|| format!("invalid JSON in {}", path.display()))
}

fn write_json<T: Serialize>(value: &T) -> Result<()> {
    let mut stdout = io::stdout().lock();
    serde_json::to_writer_pretty(&mut stdout, value).context("failed to write output")?;
    writeln!(stdout).context("failed to write output")?;
    Ok(())
}

fn id_generator(sequential: bool, config: &ComposerConfig) -> IdGenerator {
    if sequential {
        IdGenerator::sequential()
            .with_matcher(&config.id_placeholder)
            .with_fallback_prefix(&config.fallback_id_prefix)
    } else {
        IdGenerator::from_config(config)
    }
}

fn handle_edges(args: EdgesArgs, config: &ComposerConfig) -> Result<()> {
    let steps: Vec<Step> = read_json(&args.steps)?;
    let start = start_node_id(&steps, config);
    let terminal = terminal_node_id(&steps, config);
    let generated = generate_edges(&steps, config);
    let style = args.style.unwrap_or(config.edge_style);
    let edges: Vec<_> = validate_edges(&generated, &steps, start, terminal)
        .into_iter()
        .map(|edge| edge.styled(style))
        .collect();
    debug!(steps = steps.len(), edges = edges.len(), "edges generated");
    write_json(&edges)
}

fn handle_init(args: InitArgs, config: ComposerConfig) -> Result<()> {
    let resources = Resources::load_from_file(&args.resources)
        .with_context(|| format!("failed to load resources {}", args.resources.display()))?;

    let persisted = if let Some(path) = &args.persisted {
        Some(
            load_persisted_from_path(path)
                .with_context(|| format!("failed to load flow {}", path.display()))?,
        )
    } else if let Some(path) = &args.definition {
        let definition: FlowDefinition = read_json(path)?;
        Some(definition_to_persisted(&definition, &config))
    } else {
        None
    };
    let source_path = args.persisted.as_ref().or(args.definition.as_ref());
    let flow_id = args.flow_id.clone().or_else(|| {
        source_path
            .and_then(|p| p.file_stem())
            .map(|stem| stem.to_string_lossy().into_owned())
    });
    if flow_id.is_some() && persisted.is_none() {
        anyhow::bail!("--flow-id needs --persisted or --definition");
    }

    let id_gen = id_generator(args.sequential_ids, &config);
    let mut initializer = FlowInitializer::new(config).with_id_generator(id_gen);
    let settled = initializer
        .settle(FlowInputs {
            flow_id,
            persisted,
            resources,
        })
        .context("initialization produced no canvas")?;

    let mut graph = settled.graph;
    if args.layout && settled.needs_auto_layout {
        let start = start_node_id(&graph.nodes, initializer.config()).to_string();
        auto_layout(&mut graph.nodes, &graph.edges, &start);
    }
    write_json(&graph)
}

fn handle_ids(args: IdsArgs, config: &ComposerConfig) -> Result<()> {
    let doc: Value = read_json(&args.input)?;
    let mut id_gen = id_generator(args.sequential_ids, config);
    if let Some(matcher) = args.matcher {
        id_gen = id_gen.with_matcher(matcher);
    }
    write_json(&id_gen.generate(&doc))
}

fn handle_check_edges(args: CheckEdgesArgs, config: &ComposerConfig) -> Result<()> {
    let graph: CanvasGraph = read_json(&args.graph)?;
    let start = start_node_id(&graph.nodes, config);
    let terminal = terminal_node_id(&graph.nodes, config);
    let diagnostics = lint_edges(&graph.edges, &graph.nodes, start, terminal);
    let reachable = is_reachable(&graph.edges, start, terminal);
    write_json(&json!({
        "ok": diagnostics.is_empty(),
        "terminalReachable": reachable,
        "diagnostics": diagnostics,
    }))?;
    if !diagnostics.is_empty() {
        anyhow::bail!("{} dangling edge endpoint(s)", diagnostics.len());
    }
    Ok(())
}

fn handle_export(args: ExportArgs, config: &ComposerConfig) -> Result<()> {
    let graph: CanvasGraph = read_json(&args.graph)?;
    let header = FlowHeader {
        handle: args.handle,
        name: args.name,
        flow_type: args.flow_type,
    };
    write_json(&graph_to_definition(&graph, header, config))
}
