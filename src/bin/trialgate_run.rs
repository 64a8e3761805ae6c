use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::Parser;
use futures_util::{StreamExt, stream};
use serde_json::{Value, json};
use trialgate::{
    config, logging,
    processing::{DocumentRequest, ProcessingService, build_orchestrator},
    workflow::{CancelSignal, Orchestrator, RawDocument, cancel_pair},
};

#[derive(Parser)]
#[command(
    name = "trialgate-run",
    about = "Run trial documents through the quality-gated workflow and print the final state"
)]
struct Cli {
    /// Markdown or text documents to process; several run concurrently.
    #[arg(required = true)]
    files: Vec<PathBuf>,
    /// Cooperative that owns the documents; required with --index.
    #[arg(long)]
    cooperative: Option<String>,
    /// Index the chunks into Qdrant after a non-rejected run.
    #[arg(long)]
    index: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = config::init_config().context("Failed to load configuration")?;
    logging::init_tracing();

    let documents = cli
        .files
        .iter()
        .map(|path| read_document(path))
        .collect::<Result<Vec<_>>>()?;

    let (handle, cancel) = cancel_pair();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received; cancelling in-flight runs");
            handle.cancel();
        }
    });

    let results: Vec<(String, Result<Value, String>)> = if cli.index {
        let Some(cooperative) = cli.cooperative else {
            bail!("--cooperative is required with --index");
        };
        let service = ProcessingService::from_config(config).await?;
        let names: Vec<_> = documents.iter().map(|doc| doc.file_name.clone()).collect();
        let requests = documents
            .into_iter()
            .map(|document| DocumentRequest {
                document,
                cooperative: cooperative.clone(),
                index: true,
            })
            .collect();
        let outcomes = service.process_batch_with_cancel(requests, &cancel).await;
        names
            .into_iter()
            .zip(outcomes)
            .map(|(name, outcome)| {
                let rendered = outcome
                    .map_err(|error| error.to_string())
                    .and_then(|outcome| to_json(&outcome));
                (name, rendered)
            })
            .collect()
    } else {
        let orchestrator = build_orchestrator(config)?;
        run_unindexed(&orchestrator, documents, &cancel, config.workflow_concurrency).await
    };

    let failed = results.iter().filter(|(_, result)| result.is_err()).count();
    let output = match results.as_slice() {
        [(_, Ok(value))] => serde_json::to_string_pretty(value)?,
        [(name, Err(error))] => bail!("{name}: {error}"),
        _ => serde_json::to_string_pretty(
            &results
                .iter()
                .map(|(name, result)| match result {
                    Ok(value) => json!({ "file": name, "result": value }),
                    Err(error) => json!({ "file": name, "error": error }),
                })
                .collect::<Vec<_>>(),
        )?,
    };
    println!("{output}");

    if failed > 0 {
        bail!("{failed} of {} documents failed", results.len());
    }
    Ok(())
}

async fn run_unindexed(
    orchestrator: &Orchestrator,
    documents: Vec<RawDocument>,
    cancel: &CancelSignal,
    concurrency: usize,
) -> Vec<(String, Result<Value, String>)> {
    stream::iter(documents)
        .map(|document| async move {
            let state = orchestrator
                .run_with_cancel(&document, cancel)
                .await
                .map_err(|error| error.to_string())
                .and_then(|state| to_json(&state));
            (document.file_name, state)
        })
        .buffered(concurrency.max(1))
        .collect()
        .await
}

fn read_document(path: &Path) -> Result<RawDocument> {
    let bytes =
        std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    Ok(RawDocument::new(file_name, bytes))
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<Value, String> {
    serde_json::to_value(value).map_err(|error| error.to_string())
}
