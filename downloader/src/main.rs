//! Cobalt Fetch command line
//!
//! Resolves each media link given on the command line through the configured
//! Cobalt API and saves the results into DOWNLOAD_DIR.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use anyhow::Context;
use tracing::{info, warn};

use cobalt_downloader::{
    AudioFormat, CancellationToken, ClientConfig, DirectoryDestination, DownloadOptions,
    DownloadOrchestrator, DownloadResult, JobQueue, ProgressCallback, VideoCodec, VideoQuality,
};

const PROGRESS_STEP: u64 = 4 * 1024 * 1024;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("cobalt_downloader=info".parse()?)
                .add_directive("cobalt_shared=info".parse()?),
        )
        .init();

    let urls: Vec<String> = std::env::args().skip(1).collect();
    if urls.is_empty() {
        eprintln!("usage: cobalt-downloader <media-url>...");
        std::process::exit(2);
    }

    // Read configuration from environment
    let config = ClientConfig::from_env();
    let template = options_from_env()?;
    let download_dir = std::env::var("DOWNLOAD_DIR").unwrap_or_else(|_| "./downloads".to_string());
    let overwrite = env_flag("OVERWRITE");
    let max_concurrent: usize = std::env::var("MAX_CONCURRENT_TASKS")
        .unwrap_or_else(|_| "3".to_string())
        .parse()
        .unwrap_or(3);

    std::fs::create_dir_all(&download_dir)
        .with_context(|| format!("failed to create download directory {}", download_dir))?;

    info!(
        "Using {} (audio only: {}, format: {}, dir: {})",
        config.api_url, template.audio_only, template.audio_format, download_dir
    );

    let destinations = Arc::new(DirectoryDestination::new(&download_dir).with_overwrite(overwrite));
    let orchestrator = DownloadOrchestrator::new(&config, destinations)
        .context("failed to build HTTP client")?;
    let orchestrator = Arc::new(orchestrator);
    let queue = Arc::new(JobQueue::new(max_concurrent));
    let cancel = CancellationToken::new();

    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, canceling downloads");
            ctrl_c.cancel();
        }
    });

    let mut handles = Vec::with_capacity(urls.len());
    for (index, url) in urls.into_iter().enumerate() {
        let job_id = format!("job-{}", index + 1);
        queue.enqueue(&job_id, &url).await;

        let options = DownloadOptions {
            url: url.clone(),
            ..template.clone()
        };
        let orchestrator = orchestrator.clone();
        let queue = queue.clone();
        let cancel = cancel.clone();

        handles.push(tokio::spawn(async move {
            let acquired = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    queue.cancel(&job_id).await;
                    return (url, DownloadResult::Canceled);
                }
                acquired = queue.acquire(&job_id) => acquired,
            };
            if !acquired {
                return (url, DownloadResult::Canceled);
            }

            let progress = progress_logger(job_id.clone());
            let result = orchestrator.run_with_progress(&options, &cancel, Some(&progress)).await;
            queue.finish(&job_id, &result).await;
            (url, result)
        }));
    }

    let mut failed = 0;
    for handle in handles {
        let (url, result) = handle.await.context("download task panicked")?;
        match result.error() {
            Some(error) if error.is_retriable() => {
                failed += 1;
                println!("{}: {} (temporary, try again later)", url, result);
            }
            Some(_) => {
                failed += 1;
                println!("{}: {}", url, result);
            }
            None => println!("{}: {}", url, result),
        }
    }

    let stats = queue.stats().await;
    info!(
        "Finished: {} saved, {} failed, {} canceled ({} bytes)",
        stats.saved, stats.failed, stats.canceled, stats.bytes_written
    );

    if failed > 0 {
        std::process::exit(1);
    }
    Ok(())
}

/// Download options shared by every URL in this invocation.
fn options_from_env() -> anyhow::Result<DownloadOptions> {
    let mut options = DownloadOptions::default();
    options.audio_only = env_flag("AUDIO_ONLY");
    if let Ok(raw) = std::env::var("AUDIO_FORMAT") {
        options.audio_format = raw.parse::<AudioFormat>().map_err(anyhow::Error::msg)?;
    }
    if let Ok(raw) = std::env::var("VIDEO_CODEC") {
        options.video_codec = raw.parse::<VideoCodec>().map_err(anyhow::Error::msg)?;
    }
    if let Ok(raw) = std::env::var("VIDEO_QUALITY") {
        options.video_quality = raw.parse::<VideoQuality>().map_err(anyhow::Error::msg)?;
    }
    Ok(options)
}

fn env_flag(key: &str) -> bool {
    std::env::var(key)
        .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(false)
}

/// Log a line every PROGRESS_STEP bytes.
fn progress_logger(job_id: String) -> ProgressCallback {
    let next_mark = AtomicU64::new(PROGRESS_STEP);
    Arc::new(move |written: u64| {
        if written >= next_mark.load(Ordering::Relaxed) {
            info!("[{}] {} MiB written", job_id, written / (1024 * 1024));
            next_mark.store((written / PROGRESS_STEP + 1) * PROGRESS_STEP, Ordering::Relaxed);
        }
    })
}
