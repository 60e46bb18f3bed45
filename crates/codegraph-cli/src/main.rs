use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use codegraph_ai::LLMProviderFactory;
use codegraph_core::PipelineConfig;
use codegraph_graph::InMemoryGraphAdapter;
use codegraph_justify::{JustificationPipeline, JustifyOptions};
use colored::Colorize;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

mod seed;

#[derive(Parser)]
#[command(name = "codegraph-justify")]
#[command(about = "CodeGraph Justification Engine CLI", long_about = None)]
#[command(version)]
struct Cli {
    /// Output format (json, pretty, table)
    #[arg(short, long, global = true, default_value = "pretty")]
    output: OutputFormat,

    /// Seed graph file (JSON: entities + relationships). Defaults to a
    /// small built-in demo graph when omitted.
    #[arg(long, global = true, env = "CODEGRAPH_SEED")]
    seed: Option<PathBuf>,

    /// Pipeline configuration directory (looks for `codegraph.toml`)
    #[arg(long, global = true, env = "CODEGRAPH_CONFIG_DIR")]
    config_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    Json,
    Pretty,
    Table,
}

#[derive(Subcommand)]
enum Commands {
    /// Justify every entity in the seed graph
    Project {
        #[arg(long)]
        force: bool,
        #[arg(long)]
        skip_llm: bool,
    },

    /// Justify every entity in one file
    File {
        path: String,
        #[arg(long)]
        force: bool,
    },

    /// Justify a specific entity by id
    Entity {
        entity_id: Uuid,
        #[arg(long)]
        force: bool,
    },

    /// Re-run inference on low-confidence or pending-clarification entities
    RejustifyUncertain,

    /// Retrieval and reporting
    #[command(subcommand)]
    Show(ShowCommands),

    /// Clarification workflow
    #[command(subcommand)]
    Clarify(ClarifyCommands),

    /// System status
    Status,
}

#[derive(Subcommand)]
enum ShowCommands {
    /// Get one entity's justification
    Justification { entity_id: Uuid },

    /// Get every justification for a file
    File { path: String },

    /// Walk a justification's parent chain to its root
    Hierarchy { entity_id: Uuid },

    /// Full-text search over justifications
    Search {
        query: String,
        #[arg(short, long, default_value = "10")]
        limit: usize,
    },

    /// Aggregate confidence and coverage stats
    Stats,

    /// Justified/total entity counts per file
    Coverage,
}

#[derive(Subcommand)]
enum ClarifyCommands {
    /// List the next batch of justifications pending clarification
    List {
        #[arg(short, long, default_value = "10")]
        limit: usize,
    },

    /// Dismiss every pending question for an entity without answering
    Skip { entity_id: Uuid },
}

#[derive(Serialize)]
struct StatusResult {
    seed: String,
    entities_loaded: usize,
    status: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    let config = match &cli.config_dir {
        Some(dir) => PipelineConfig::load(dir).context("loading pipeline configuration")?,
        None => PipelineConfig::default(),
    };

    let adapter: Arc<InMemoryGraphAdapter> = match &cli.seed {
        Some(path) => Arc::new(seed::load_seed(path).context("loading seed graph")?),
        None => Arc::new(seed::demo_seed()),
    };
    let entity_count = codegraph_graph::GraphAdapter::list_all_entities(adapter.as_ref())
        .await
        .map(|e| e.len())
        .unwrap_or(0);

    let llm = LLMProviderFactory::from_env().ok();
    tracing::info!(entities = entity_count, llm_configured = llm.is_some(), "pipeline ready");
    let pipeline = JustificationPipeline::new(adapter.clone(), llm, config);

    match execute_command(&cli, &pipeline, entity_count).await {
        Ok(value) => {
            print_output(&cli.output, &value)?;
            Ok(())
        }
        Err(e) => {
            eprintln!("{} {}", "Error:".red().bold(), e);
            std::process::exit(1);
        }
    }
}

async fn execute_command(
    cli: &Cli,
    pipeline: &JustificationPipeline,
    entity_count: usize,
) -> Result<serde_json::Value> {
    match &cli.command {
        Commands::Project { force, skip_llm } => {
            let options = JustifyOptions { force: *force, skip_llm: *skip_llm, ..Default::default() };
            let result = pipeline.justify_project(&options).await?;
            Ok(serde_json::to_value(ResultView::from(result))?)
        }
        Commands::File { path, force } => {
            let options = JustifyOptions { force: *force, ..Default::default() };
            let result = pipeline.justify_file(path, &options).await?;
            Ok(serde_json::to_value(ResultView::from(result))?)
        }
        Commands::Entity { entity_id, force } => {
            let options = JustifyOptions { force: *force, ..Default::default() };
            let result = pipeline.justify_entities(&[*entity_id], &options).await?;
            Ok(serde_json::to_value(ResultView::from(result))?)
        }
        Commands::RejustifyUncertain => {
            let result = pipeline.rejustify_uncertain(&JustifyOptions::default()).await?;
            Ok(serde_json::to_value(ResultView::from(result))?)
        }
        Commands::Show(cmd) => execute_show_command(cmd, pipeline).await,
        Commands::Clarify(cmd) => execute_clarify_command(cmd, pipeline).await,
        Commands::Status => {
            let result = StatusResult {
                seed: cli.seed.as_ref().map(|p| p.display().to_string()).unwrap_or_else(|| "<demo>".to_string()),
                entities_loaded: entity_count,
                status: "ok".to_string(),
            };
            Ok(serde_json::to_value(result)?)
        }
    }
}

async fn execute_show_command(cmd: &ShowCommands, pipeline: &JustificationPipeline) -> Result<serde_json::Value> {
    match cmd {
        ShowCommands::Justification { entity_id } => {
            let justification = pipeline
                .get_justification(*entity_id)
                .await?
                .ok_or_else(|| anyhow::anyhow!("no justification for entity {entity_id}"))?;
            Ok(serde_json::to_value(justification)?)
        }
        ShowCommands::File { path } => {
            let justifications = pipeline.get_file_justifications(path).await?;
            Ok(serde_json::to_value(justifications)?)
        }
        ShowCommands::Hierarchy { entity_id } => {
            let chain = pipeline.get_justification_hierarchy(*entity_id).await?;
            Ok(serde_json::to_value(chain)?)
        }
        ShowCommands::Search { query, limit } => {
            let hits = pipeline.search_justifications(query, *limit).await?;
            Ok(serde_json::to_value(hits)?)
        }
        ShowCommands::Stats => {
            let stats = pipeline.get_stats().await?;
            Ok(serde_json::json!({
                "total_justified": stats.total_justified,
                "high_confidence": stats.high_confidence,
                "medium_confidence": stats.medium_confidence,
                "low_confidence": stats.low_confidence,
                "pending_clarification": stats.pending_clarification,
                "average_confidence": stats.average_confidence,
            }))
        }
        ShowCommands::Coverage => {
            let coverage = pipeline.get_coverage_by_file().await?;
            let mut files: Vec<_> = coverage.into_iter().collect();
            files.sort_by(|a, b| a.0.cmp(&b.0));
            let rows: Vec<_> = files
                .into_iter()
                .map(|(path, c)| serde_json::json!({ "file": path, "justified": c.justified_count, "total": c.total_count }))
                .collect();
            Ok(serde_json::Value::Array(rows))
        }
    }
}

async fn execute_clarify_command(cmd: &ClarifyCommands, pipeline: &JustificationPipeline) -> Result<serde_json::Value> {
    match cmd {
        ClarifyCommands::List { limit } => {
            let batch = pipeline.get_next_clarification_batch(*limit).await?;
            Ok(serde_json::to_value(batch)?)
        }
        ClarifyCommands::Skip { entity_id } => {
            pipeline.skip_clarification(*entity_id).await?;
            Ok(serde_json::json!({ "entity_id": entity_id, "status": "skipped" }))
        }
    }
}

/// Flattens `JustificationResult` into something serde-friendly for the
/// CLI's three output modes, without leaking `Uuid`'s debug formatting.
#[derive(Serialize)]
struct ResultView {
    justified: Vec<Uuid>,
    failed: Vec<FailureView>,
    needing_clarification: Vec<Uuid>,
    succeeded: usize,
    skipped: usize,
    pending_clarification: usize,
    average_confidence: f32,
    duration_ms: u64,
}

#[derive(Serialize)]
struct FailureView {
    entity_id: Uuid,
    error: String,
}

impl From<codegraph_justify::JustificationResult> for ResultView {
    fn from(result: codegraph_justify::JustificationResult) -> Self {
        Self {
            justified: result.justified,
            failed: result
                .failed
                .into_iter()
                .map(|f| FailureView { entity_id: f.entity_id, error: f.error })
                .collect(),
            needing_clarification: result.needing_clarification,
            succeeded: result.stats.succeeded,
            skipped: result.stats.skipped,
            pending_clarification: result.stats.pending_clarification,
            average_confidence: result.stats.average_confidence,
            duration_ms: result.stats.duration_ms,
        }
    }
}

fn print_output(format: &OutputFormat, value: &serde_json::Value) -> Result<()> {
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(value)?);
        }
        OutputFormat::Pretty => {
            print_pretty(value)?;
        }
        OutputFormat::Table => {
            print_table(value)?;
        }
    }
    Ok(())
}

fn print_pretty(value: &serde_json::Value) -> Result<()> {
    match value {
        serde_json::Value::Object(map) => {
            for (key, val) in map {
                let key_colored = key.cyan().bold();
                match val {
                    serde_json::Value::String(s) => println!("{}: {}", key_colored, s.green()),
                    serde_json::Value::Number(n) => println!("{}: {}", key_colored, n.to_string().yellow()),
                    serde_json::Value::Bool(b) => {
                        let val_colored = if *b { "true".green() } else { "false".red() };
                        println!("{}: {}", key_colored, val_colored);
                    }
                    _ => println!("{}: {}", key_colored, val),
                }
            }
        }
        serde_json::Value::Array(arr) => {
            for (i, item) in arr.iter().enumerate() {
                println!("\n{}{}:", "Item ".cyan(), (i + 1).to_string().yellow());
                print_pretty(item)?;
            }
        }
        _ => println!("{}", serde_json::to_string_pretty(value)?),
    }
    Ok(())
}

fn print_table(value: &serde_json::Value) -> Result<()> {
    use tabled::builder::Builder;

    let serde_json::Value::Array(rows) = value else {
        return print_pretty(value);
    };
    let Some(serde_json::Value::Object(first)) = rows.first() else {
        return print_pretty(value);
    };

    let headers: Vec<String> = first.keys().cloned().collect();
    let mut builder = Builder::default();
    builder.push_record(headers.clone());
    for row in rows {
        if let serde_json::Value::Object(map) = row {
            let record: Vec<String> = headers
                .iter()
                .map(|h| map.get(h).map(render_cell).unwrap_or_default())
                .collect();
            builder.push_record(record);
        }
    }
    println!("{}", builder.build());
    Ok(())
}

fn render_cell(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
