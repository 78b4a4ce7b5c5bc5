//! PaperLens Ingestion CLI
//!
//! Analyzes every PDF in a directory as one project batch, waits for the
//! queue to settle and prints what was extracted.

use anyhow::Context;
use clap::Parser;
use paperlens_common::context::{DocumentAnalyzer, OutlierDetector};
use paperlens_common::llm::create_client;
use paperlens_common::models::{AnalysisStatus, ThematicStatus};
use paperlens_common::retry::RetryPolicy;
use paperlens_common::store::create_store;
use paperlens_common::{config::AppConfig, VERSION};
use paperlens_ingestion::upload::read_dir_files;
use paperlens_ingestion::{AnalysisQueue, QueueEvent};
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "ingestion", version, about = "Analyze a directory of PDFs as one project")]
struct Args {
    /// Directory containing the documents
    dir: PathBuf,

    /// Project nickname (defaults to the directory name)
    #[arg(short, long)]
    nickname: Option<String>,

    /// Configuration file (otherwise APP__* environment variables)
    #[arg(short, long)]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => AppConfig::from_file(path),
        None => AppConfig::load(),
    }
    .context("Failed to load configuration")?;

    init_tracing(&config.observability.log_level, config.observability.json_logging);
    info!("Starting PaperLens Ingestion v{}", VERSION);

    let store = create_store(&config.storage).await?;
    let client = create_client(&config.llm)?;
    let retry = RetryPolicy::from(&config.retry);
    let analyzer = DocumentAnalyzer::new(client.clone(), &config.llm.extraction_model, retry);
    let detector = OutlierDetector::new(client, &config.llm.synthesis_model, retry);
    let queue = AnalysisQueue::start(store, analyzer, detector).await;

    let nickname = args.nickname.clone().unwrap_or_else(|| {
        args.dir
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "Untitled project".to_string())
    });
    let project = queue.create_project(nickname).await?;
    let mut events = queue.subscribe();

    let files = read_dir_files(&args.dir)
        .await
        .with_context(|| format!("Failed to read {}", args.dir.display()))?;
    let outcome = queue.add_files(project.id, files).await?;
    info!(
        project_id = %project.id,
        accepted = outcome.accepted.len(),
        rejected = outcome.rejected,
        "Batch queued"
    );

    if !outcome.accepted.is_empty() {
        loop {
            match events.recv().await {
                Ok(QueueEvent::Settled { project_id }) if project_id == project.id => break,
                Ok(event) => info!(?event, "Queue progress"),
                Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Missed queue events");
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => {
                    anyhow::bail!("Analysis queue stopped before the batch settled");
                }
            }
        }
    }

    let project = queue.project(project.id).await?;
    println!("{} ({})", project.nickname, project.id);
    if let Some(theme) = &project.theme_description {
        println!("Theme: {}", theme);
    }
    for file in &project.files {
        let line = match (file.status(), file.result()) {
            (AnalysisStatus::Completed, Some(result)) => {
                let marker = match file.thematic_status() {
                    ThematicStatus::Outlier => " [outlier]",
                    _ => "",
                };
                format!("{}: {}{}", file.file_name, result.title, marker)
            }
            (status, _) => format!(
                "{}: {:?} {}",
                file.file_name,
                status,
                file.error().unwrap_or_default()
            ),
        };
        println!("  {}", line);
        if let Some(reason) = file.outlier_reason() {
            println!("    {}", reason);
        }
    }

    queue.shutdown().await?;
    info!("Ingestion finished");
    Ok(())
}

fn init_tracing(level: &str, json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(true);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}
