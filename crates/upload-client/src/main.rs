//! docsign-upload
//!
//! Upload local files to the document service with retries and bounded
//! concurrency.
//!
//! ```bash
//! docsign-upload --endpoint http://localhost:3001/api/files/upload a.pdf b.png
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use upload_client::{
    format_file_size, validate_batch, HttpTransport, ProgressSink, UploadOptions, UploadOrchestrator,
    UploadProgress, UploadStatus, UploadTask,
};
use upload_core::{FileValidator, ValidationLimits};

#[derive(Parser, Debug)]
#[command(name = "docsign-upload")]
#[command(about = "Upload documents to the docsign file endpoint")]
struct Args {
    /// Upload endpoint URL
    #[arg(
        long,
        env = "UPLOAD_ENDPOINT",
        default_value = "http://localhost:3001/api/files/upload"
    )]
    endpoint: String,

    /// Attempts per file
    #[arg(long, default_value = "3")]
    retries: u32,

    /// Base delay before the first retry; doubles on each subsequent one
    #[arg(long, default_value = "1000")]
    retry_delay_ms: u64,

    /// Files uploaded at the same time
    #[arg(long, default_value = "3")]
    concurrency: usize,

    /// Per-attempt timeout
    #[arg(long, default_value = "30000")]
    timeout_ms: u64,

    /// Maximum accepted size per file in bytes
    #[arg(long, env = "MAX_FILE_SIZE", default_value = "10485760")]
    max_file_size: u64,

    /// Maximum files per run
    #[arg(long, env = "MAX_FILES", default_value = "10")]
    max_files: usize,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Files to upload
    #[arg(required = true)]
    files: Vec<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    let directive = if args.verbose {
        "upload_client=debug"
    } else {
        "upload_client=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(directive.parse()?))
        .init();

    let mut tasks = Vec::with_capacity(args.files.len());
    for path in &args.files {
        let task = UploadTask::from_path(path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?;
        tasks.push(task);
    }

    let validator = FileValidator::new(ValidationLimits {
        max_file_size: args.max_file_size,
        max_files: args.max_files,
    });
    let batch = validate_batch(&validator, tasks)?;
    for rejected in &batch.rejected {
        warn!(file = %rejected.task.file_name, "{}", rejected.error);
    }
    if batch.accepted.is_empty() {
        bail!("No files passed validation");
    }

    let options = UploadOptions {
        max_retries: args.retries,
        retry_delay: Duration::from_millis(args.retry_delay_ms),
        concurrency: args.concurrency,
        timeout: Duration::from_millis(args.timeout_ms),
    };
    info!(
        endpoint = %args.endpoint,
        files = batch.accepted.len(),
        concurrency = options.concurrency,
        "Starting upload"
    );

    let cancel = CancellationToken::new();
    let on_ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling in-flight uploads");
            on_ctrl_c.cancel();
        }
    });

    let progress: ProgressSink = Arc::new(|p: UploadProgress| match p.status {
        UploadStatus::Error => {}
        UploadStatus::Completed => info!(file = %p.file_name, "completed"),
        _ => tracing::debug!(file = %p.file_name, percent = p.percent, status = %p.status, "progress"),
    });

    let orchestrator = UploadOrchestrator::new(HttpTransport::new(&args.endpoint), options);
    let results = orchestrator.upload(&batch.accepted, progress, cancel).await;

    let mut failed = batch.rejected.len();
    for (task, result) in batch.accepted.iter().zip(&results) {
        match &result.stored_file {
            Some(meta) if result.success => println!(
                "OK     {} ({}) -> {}",
                task.file_name,
                format_file_size(meta.size),
                meta.url
            ),
            _ => {
                failed += 1;
                println!(
                    "FAILED {}: {}",
                    task.file_name,
                    result.error.as_deref().unwrap_or("unknown error")
                );
            }
        }
    }
    for rejected in &batch.rejected {
        println!("SKIP   {}: {}", rejected.task.file_name, rejected.error);
    }

    if failed > 0 {
        bail!("{} of {} file(s) were not uploaded", failed, args.files.len());
    }
    Ok(())
}
