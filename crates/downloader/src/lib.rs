//! Download manager library
//!
//! Concurrent media downloads with pause, resume, cancel and live
//! progress. Callers drive a [`DownloadManager`] through four
//! commands and observe it through normalized [`DownloadEvent`]s;
//! byte movement happens in per-URL transfer engine runs that can be
//! interrupted into resumable checkpoints.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use downloader::{DownloadEvent, DownloadManager, ManagerConfig};
//! use std::sync::Arc;
//!
//! # async fn example() -> downloader::Result<()> {
//! let config = ManagerConfig::default().with_download_dir("previews");
//!
//! let observer = Arc::new(|event: DownloadEvent| match event {
//!     DownloadEvent::Progress { url, fraction, expected_display, .. } => {
//!         if let Some(fraction) = fraction {
//!             println!("{}: {:.1}% of {}", url, fraction * 100.0, expected_display);
//!         }
//!     }
//!     DownloadEvent::Completed { url, path } => {
//!         println!("{} -> {}", url, path.display());
//!     }
//!     _ => {}
//! });
//!
//! let manager = DownloadManager::new(config, observer)?;
//! manager.start("https://example.com/previews/track.mp3").await?;
//!
//! // Later, from any task:
//! manager.pause("https://example.com/previews/track.mp3").await;
//! manager.resume("https://example.com/previews/track.mp3").await?;
//! # Ok(())
//! # }
//! ```

pub mod track;
pub mod transfers;

// Re-export commonly used types for convenience
pub use track::Track;
pub use transfers::{
    Checkpoint, ConsoleObserver, DownloadEvent, DownloadManager, DownloadObserver, EventCallback,
    IntoEventCallback, ManagerConfig, NullObserver, Result, TransferEngine, TransferError,
    TransferSnapshot, TransferStatus, format_bytes,
};
