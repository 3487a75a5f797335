//! Normalized events the manager emits to its observer

use std::sync::Arc;

/// Callback invoked once per normalized event
pub type EventCallback = Arc<dyn Fn(DownloadEvent) + Send + Sync>;

/// Events emitted by the download manager, keyed by the transfer URL
#[derive(Debug, Clone)]
pub enum DownloadEvent {
    Progress {
        url: String,
        /// `None` while the total size is unknown; observers must not
        /// assume a numeric value in that case.
        fraction: Option<f64>,
        expected_total: Option<u64>,
        /// Human-readable rendering of the expected total
        expected_display: String,
    },
    Completed {
        url: String,
        path: std::path::PathBuf,
    },
    Paused {
        url: String,
    },
    Cancelled {
        url: String,
    },
    Failed {
        url: String,
        resumable: bool,
        reason: String,
    },
}

/// Trait for observers that want per-event methods instead of a closure
pub trait DownloadObserver: Send + Sync {
    fn on_progress(&self, _url: &str, _fraction: Option<f64>, _expected_total: Option<u64>) {}
    fn on_completed(&self, _url: &str, _path: &std::path::Path) {}
    fn on_paused(&self, _url: &str) {}
    fn on_cancelled(&self, _url: &str) {}
    fn on_failed(&self, _url: &str, _resumable: bool, _reason: &str) {}
}

/// Extension trait to convert a [`DownloadObserver`] into an [`EventCallback`]
pub trait IntoEventCallback {
    fn into_callback(self) -> EventCallback;
}

impl<T: DownloadObserver + 'static> IntoEventCallback for T {
    fn into_callback(self) -> EventCallback {
        Arc::new(move |event| match event {
            DownloadEvent::Progress {
                url,
                fraction,
                expected_total,
                ..
            } => {
                self.on_progress(&url, fraction, expected_total);
            }
            DownloadEvent::Completed { url, path } => {
                self.on_completed(&url, &path);
            }
            DownloadEvent::Paused { url } => {
                self.on_paused(&url);
            }
            DownloadEvent::Cancelled { url } => {
                self.on_cancelled(&url);
            }
            DownloadEvent::Failed {
                url,
                resumable,
                reason,
            } => {
                self.on_failed(&url, resumable, &reason);
            }
        })
    }
}

/// Observer that prints events to the console
#[derive(Debug, Default)]
pub struct ConsoleObserver {
    pub verbose: bool,
}

impl ConsoleObserver {
    pub fn new(verbose: bool) -> Self {
        Self { verbose }
    }
}

impl DownloadObserver for ConsoleObserver {
    fn on_progress(&self, url: &str, fraction: Option<f64>, expected_total: Option<u64>) {
        if self.verbose {
            match (fraction, expected_total) {
                (Some(fraction), Some(total)) => {
                    println!("{}: {:.1}% of {}", url, fraction * 100.0, format_bytes(total));
                }
                _ => println!("{}: downloading (size unknown)", url),
            }
        }
    }

    fn on_completed(&self, url: &str, path: &std::path::Path) {
        println!("completed: {} -> {}", url, path.display());
    }

    fn on_paused(&self, url: &str) {
        println!("paused: {}", url);
    }

    fn on_cancelled(&self, url: &str) {
        println!("cancelled: {}", url);
    }

    fn on_failed(&self, url: &str, resumable: bool, reason: &str) {
        if resumable {
            eprintln!("failed (resumable): {}: {}", url, reason);
        } else {
            eprintln!("failed: {}: {}", url, reason);
        }
    }
}

/// Observer that discards every event
#[derive(Debug, Default)]
pub struct NullObserver;

impl DownloadObserver for NullObserver {}

/// Render a byte count with binary units
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} {}", bytes, UNITS[unit])
    } else {
        format!("{:.1} {}", value, UNITS[unit])
    }
}
