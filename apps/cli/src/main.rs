//! Command-line driver for the download manager

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use downloader::{
    ConsoleObserver, DownloadManager, DownloadObserver, IntoEventCallback, ManagerConfig,
};

#[derive(Parser, Debug)]
#[command(name = "fetch", about = "Download files with pause/resume support")]
struct Args {
    /// URLs to download
    #[arg(required = true)]
    urls: Vec<String>,

    /// Directory completed files are placed in
    #[arg(long, default_value = "downloads")]
    dir: PathBuf,

    /// Per-request timeout in seconds
    #[arg(long, default_value_t = 30)]
    timeout_secs: u64,

    /// Print per-tick progress
    #[arg(short, long)]
    verbose: bool,
}

/// Console reporting plus a failure count for the exit code
struct CliObserver {
    console: ConsoleObserver,
    failures: Arc<AtomicUsize>,
}

impl DownloadObserver for CliObserver {
    fn on_progress(&self, url: &str, fraction: Option<f64>, expected_total: Option<u64>) {
        self.console.on_progress(url, fraction, expected_total);
    }

    fn on_completed(&self, url: &str, path: &std::path::Path) {
        self.console.on_completed(url, path);
    }

    fn on_failed(&self, url: &str, resumable: bool, reason: &str) {
        self.console.on_failed(url, resumable, reason);
        self.failures.fetch_add(1, Ordering::Relaxed);
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let config = ManagerConfig::default()
        .with_download_dir(&args.dir)
        .with_timeout(Duration::from_secs(args.timeout_secs));

    let failures = Arc::new(AtomicUsize::new(0));
    let observer = CliObserver {
        console: ConsoleObserver::new(args.verbose),
        failures: failures.clone(),
    };

    let manager = DownloadManager::new(config, observer.into_callback())
        .context("could not create download manager")?;

    for url in &args.urls {
        if manager.is_downloaded(url) {
            println!("already downloaded: {}", url);
            continue;
        }
        manager.start(url).await.context("could not start download")?;
    }

    // A failed-but-resumable record stays in the active set; with no
    // one around to resume it, treat it as final and cancel it.
    loop {
        let active = manager.active().await;
        if active.is_empty() {
            break;
        }
        for snapshot in &active {
            if snapshot.status == downloader::TransferStatus::Failed {
                manager.cancel(&snapshot.url).await;
            }
        }
        tokio::time::sleep(Duration::from_millis(250)).await;
    }

    let failed = failures.load(Ordering::Relaxed);
    if failed > 0 {
        anyhow::bail!("{} download(s) failed", failed);
    }
    Ok(())
}
