use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use pipeline::{
    run_batch, save_results, ExpertStatus, OperationMode, Orchestrator, PipelineConfig,
    SynthesizedKnowledge,
};
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "knowledge-pipeline")]
#[command(about = "Turn geological report text into validated, persistence-ready knowledge")]
struct Cli {
    /// JSON config file; defaults apply when omitted
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Preset used when no config file is given
    #[arg(long, global = true, value_parser = parse_mode)]
    mode: Option<OperationMode>,

    #[arg(short, long, global = true, default_value = "output")]
    output: PathBuf,

    /// Log as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Process one document
    Run { file: PathBuf },
    /// Process every .txt/.md file in a directory
    Batch { dir: PathBuf },
}

fn parse_mode(value: &str) -> Result<OperationMode, String> {
    match value {
        "fast" => Ok(OperationMode::Fast),
        "balanced" => Ok(OperationMode::Balanced),
        "accurate" => Ok(OperationMode::Accurate),
        other => Err(format!("unknown mode '{}', expected fast, balanced or accurate", other)),
    }
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if json {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.json_logs);

    let config = match &cli.config {
        Some(path) => PipelineConfig::from_file(path)?,
        None => PipelineConfig::for_mode(cli.mode.unwrap_or(OperationMode::Balanced)),
    };
    let orchestrator = Orchestrator::from_config(&config)?;

    println!("=== Knowledge Pipeline ===\n");

    match cli.command {
        Command::Run { file } => {
            let doc = ingest::ingest_file(&file)
                .await
                .context(format!("Cannot read document {:?}", file))?;

            let cancel = CancellationToken::new();
            let on_ctrl_c = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    on_ctrl_c.cancel();
                }
            });

            let knowledge = orchestrator.run_with_cancellation(&doc, &cancel).await?;
            print_summary(&knowledge);

            let saved = save_results(&knowledge, &cli.output).await?;
            println!("\n✅ Knowledge saved to {}", saved.knowledge_path.display());
            println!("✅ Records saved to {}", saved.records_path.display());
        }
        Command::Batch { dir } => {
            let report = run_batch(&orchestrator, &dir, &cli.output).await?;

            println!("Files: {}", report.total_files);
            println!("Succeeded: {}", report.succeeded);
            println!("Failed: {}", report.failed);
            println!("Success rate: {:.1}%", report.success_rate * 100.0);
            println!(
                "\n✅ Batch report saved to {}",
                cli.output.join("batch_report.json").display()
            );
        }
    }

    Ok(())
}

fn print_summary(knowledge: &SynthesizedKnowledge) {
    let summary = &knowledge.summary;

    println!("📄 {}", knowledge.source_document);
    println!("  Triage: {:?}", knowledge.triage_source);
    println!("  Tasks planned: {}", summary.tasks_planned);

    println!("\n🔬 EXPERTS:");
    for run in &knowledge.expert_runs {
        if run.status == ExpertStatus::NotRequested {
            continue;
        }
        match &run.detail {
            Some(detail) => println!("  {}: {:?} ({})", run.expert, run.status, detail),
            None => println!("  {}: {:?} in {} ms", run.expert, run.status, run.elapsed_ms),
        }
    }

    println!("\n📊 RESULTS:");
    println!("  Spatial features: {}", summary.spatial_features);
    println!("  Geochemical conclusions: {}", summary.geochemical_conclusions);
    println!("  Evidence entries: {}", summary.evidence_entries);
    println!("  Tables: {}", summary.tables);
    println!("  Text entities: {}", summary.text_entities);
    println!("  Graph: {} nodes, {} edges", summary.graph_nodes, summary.graph_edges);
    println!("  Records: {}", summary.records);

    println!("\n✔ VALIDATION:");
    for (check, result) in knowledge.validation.checks() {
        println!(
            "  {}: {} ({:.2})",
            check,
            if result.is_valid { "passed" } else { "failed" },
            result.confidence_score
        );
        for issue in &result.issues {
            println!("    - {}", issue);
        }
    }
    println!("  Overall confidence: {:.2}", knowledge.overall_confidence);
}
