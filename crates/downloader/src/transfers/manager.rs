//! Download manager: owns the active set and drives the engine
//!
//! The call chain flows as follows:
//!
//! Caller commands (start/pause/resume/cancel)
//! ↓
//! DownloadManager (this file) — active record set
//! ↓
//! TransferEngine runs (engine.rs) — one per downloading URL
//! ↓
//! Engine events, drained by a single dispatch task
//! ↓
//! LocalStore finalize + normalized observer events

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use tokio::sync::{Mutex, mpsc};
use tracing::{debug, info, warn};

use super::config::ManagerConfig;
use super::core::{DownloadEvent, EventCallback, Result, format_bytes};
use super::engine::{EngineEvent, EngineSink, HttpTransferEngine, TransferEngine};
use super::record::{Checkpoint, TransferRecord, TransferSnapshot, TransferStatus};
use super::store::LocalStore;
use crate::track::Track;

/// Manager for a set of concurrent, pausable downloads.
///
/// All record mutation is serialized: commands take the records lock,
/// and engine callbacks are drained by one dispatch task that takes
/// the same lock. Commands never wait on network I/O.
pub struct DownloadManager {
    inner: Arc<ManagerInner>,
}

struct ManagerInner {
    records: Mutex<HashMap<String, TransferRecord>>,
    engine: Arc<dyn TransferEngine>,
    store: LocalStore,
    observer: EventCallback,
    known_tracks: Mutex<Vec<Track>>,
    sink: EngineSink,
}

impl DownloadManager {
    /// Create a manager backed by the HTTP transfer engine
    pub fn new(config: ManagerConfig, observer: EventCallback) -> Result<Self> {
        let store = LocalStore::new(&config.download_dir)?;
        let engine = Arc::new(HttpTransferEngine::new(config, store.clone())?);
        Self::with_engine(engine, store, observer)
    }

    /// Create a manager with a custom engine implementation
    pub fn with_engine(
        engine: Arc<dyn TransferEngine>,
        store: LocalStore,
        observer: EventCallback,
    ) -> Result<Self> {
        let (sink, mut events) = mpsc::unbounded_channel();
        let inner = Arc::new(ManagerInner {
            records: Mutex::new(HashMap::new()),
            engine,
            store,
            observer,
            known_tracks: Mutex::new(Vec::new()),
            sink,
        });

        // Single-consumer drain: engine callbacks apply in submission
        // order. The task holds only a weak reference so dropping the
        // manager closes the channel and lets the task finish.
        let weak: Weak<ManagerInner> = Arc::downgrade(&inner);
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                match weak.upgrade() {
                    Some(inner) => inner.handle_engine_event(event).await,
                    None => break,
                }
            }
        });

        Ok(Self { inner })
    }

    /// Start downloading `url`.
    ///
    /// No-op if a transfer for this URL is already downloading or
    /// paused. A malformed URL is rejected before any record exists.
    pub async fn start(&self, url: &str) -> Result<()> {
        // Surfaces InvalidUrl up front; also derives the staging path
        self.inner.store.path_for(url)?;

        let mut records = self.inner.records.lock().await;
        if let Some(record) = records.get(url) {
            if record.is_active() {
                debug!("start({}) ignored, transfer already {:?}", url, record.status);
                return Ok(());
            }
        }

        let handle = self
            .inner
            .engine
            .begin(url, None, self.inner.sink.clone())
            .await?;

        let mut record = TransferRecord::new(url.to_string());
        record.status = TransferStatus::Downloading;
        record.handle = Some(handle);
        records.insert(url.to_string(), record);
        info!("started download of {}", url);
        Ok(())
    }

    /// Request a pause. No-op unless the transfer is downloading.
    ///
    /// Returns as soon as interruption is requested; the record moves
    /// to `Paused` when the engine confirms with its checkpoint.
    pub async fn pause(&self, url: &str) {
        let records = self.inner.records.lock().await;
        match records.get(url) {
            Some(record) if record.status == TransferStatus::Downloading => {
                if let Some(handle) = &record.handle {
                    handle.interrupt();
                    info!("pause requested for {}", url);
                }
            }
            _ => debug!("pause({}) ignored, no downloading transfer", url),
        }
    }

    /// Resume a paused or resumable-failed transfer.
    ///
    /// Begins a new engine run from the stored checkpoint, or from
    /// byte zero when none was retained.
    pub async fn resume(&self, url: &str) -> Result<()> {
        let mut records = self.inner.records.lock().await;
        let record = match records.get_mut(url) {
            Some(record)
                if matches!(
                    record.status,
                    TransferStatus::Paused | TransferStatus::Failed
                ) =>
            {
                record
            }
            _ => {
                debug!("resume({}) ignored, nothing to resume", url);
                return Ok(());
            }
        };

        let checkpoint = record.checkpoint.clone();
        let handle = self
            .inner
            .engine
            .begin(url, checkpoint, self.inner.sink.clone())
            .await?;
        record.handle = Some(handle);
        record.status = TransferStatus::Downloading;
        info!("resumed download of {}", url);
        Ok(())
    }

    /// Cancel a transfer and discard all of its state.
    ///
    /// No-op if no record exists. Any in-flight run is aborted, any
    /// retained staging data is deleted, and the record leaves the
    /// active set immediately.
    pub async fn cancel(&self, url: &str) {
        let removed = {
            let mut records = self.inner.records.lock().await;
            records.remove(url)
        };
        let Some(record) = removed else {
            debug!("cancel({}) ignored, no record", url);
            return;
        };

        if let Some(handle) = &record.handle {
            handle.abort();
        } else if let Some(Checkpoint { staging_path, .. }) = &record.checkpoint {
            // Paused record: nothing in flight, clean the partial data here
            self.inner.discard_staging(url, staging_path).await;
        }

        info!("cancelled download of {}", url);
        self.inner.emit(DownloadEvent::Cancelled {
            url: url.to_string(),
        });
    }

    /// Tracks whose completion callbacks may arrive without a record,
    /// e.g. transfers continued by the platform across a restart
    pub async fn set_known_tracks(&self, tracks: Vec<Track>) {
        *self.inner.known_tracks.lock().await = tracks;
    }

    /// Snapshot of one transfer, if it is in the active set
    pub async fn snapshot(&self, url: &str) -> Option<TransferSnapshot> {
        self.inner.records.lock().await.get(url).map(Into::into)
    }

    /// Snapshots of every record in the active set
    pub async fn active(&self) -> Vec<TransferSnapshot> {
        self.inner
            .records
            .lock()
            .await
            .values()
            .map(Into::into)
            .collect()
    }

    /// Whether a completed file already exists for `url`
    pub fn is_downloaded(&self, url: &str) -> bool {
        self.inner.store.exists(url)
    }

    /// Canonical local path for `url`
    pub fn local_path(&self, url: &str) -> Result<std::path::PathBuf> {
        self.inner.store.path_for(url)
    }

    /// Sender side of the engine channel.
    ///
    /// Transfers that outlive a process restart deliver their events
    /// here; the manager finalizes them even without a matching record.
    pub fn engine_sink(&self) -> EngineSink {
        self.inner.sink.clone()
    }
}

impl ManagerInner {
    fn emit(&self, event: DownloadEvent) {
        (self.observer)(event);
    }

    async fn discard_staging(&self, url: &str, staging: &std::path::Path) {
        if let Err(e) = tokio::fs::remove_file(staging).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!("could not remove staging file for {}: {}", url, e);
            }
        }
    }

    async fn handle_engine_event(&self, event: EngineEvent) {
        match event {
            EngineEvent::Started { url, total } => {
                let mut records = self.records.lock().await;
                if let Some(record) = records.get_mut(&url) {
                    record.reset_progress_for_resume(total);
                }
            }

            EngineEvent::Restarted { url } => {
                let mut records = self.records.lock().await;
                if let Some(record) = records.get_mut(&url) {
                    // The old checkpoint's fraction is stale now
                    record.checkpoint = None;
                    record.progress = Some(0.0);
                    drop(records);
                    self.emit(DownloadEvent::Progress {
                        url,
                        fraction: Some(0.0),
                        expected_total: None,
                        expected_display: "unknown".to_string(),
                    });
                }
            }

            EngineEvent::Progress {
                url,
                written,
                total,
            } => {
                let mut records = self.records.lock().await;
                let Some(record) = records.get_mut(&url) else {
                    // Command raced ahead of the callback; benign
                    debug!("progress for {} ignored, record gone", url);
                    return;
                };
                if record.status != TransferStatus::Downloading {
                    return;
                }
                if let Some(total) = total {
                    if total > 0 {
                        record.advance_progress(written as f64 / total as f64);
                    }
                }
                let fraction = record.progress;
                drop(records);
                self.emit(DownloadEvent::Progress {
                    url,
                    fraction,
                    expected_total: total,
                    expected_display: total
                        .map(format_bytes)
                        .unwrap_or_else(|| "unknown".to_string()),
                });
            }

            EngineEvent::Interrupted { url, checkpoint } => {
                let mut records = self.records.lock().await;
                let Some(record) = records.get_mut(&url) else {
                    drop(records);
                    // Cancel won the race; the partial data has no owner left
                    debug!("interrupt confirmation for {} ignored, record gone", url);
                    if let Some(checkpoint) = &checkpoint {
                        self.discard_staging(&url, &checkpoint.staging_path).await;
                    }
                    return;
                };
                record.handle = None;
                record.checkpoint = checkpoint;
                record.status = TransferStatus::Paused;
                drop(records);
                self.emit(DownloadEvent::Paused { url });
            }

            EngineEvent::Aborted { url } => {
                // Cancel already removed the record and emitted its event
                debug!("abort confirmed for {}", url);
            }

            EngineEvent::Completed { url, staging_path } => {
                let known = {
                    let mut records = self.records.lock().await;
                    if records.remove(&url).is_some() {
                        true
                    } else {
                        // No record: a transfer that survived a restart.
                        // Resolve against the caller's track list instead.
                        self.known_tracks
                            .lock()
                            .await
                            .iter()
                            .any(|track| track.preview_url.as_deref() == Some(url.as_str()))
                    }
                };
                if !known {
                    warn!("completion for unknown url {} dropped", url);
                    self.discard_staging(&url, &staging_path).await;
                    return;
                }

                match self.store.finalize(&url, &staging_path).await {
                    Ok(path) => {
                        info!("download of {} finalized at {}", url, path.display());
                        self.emit(DownloadEvent::Completed { url, path });
                    }
                    Err(e) => {
                        // The transfer itself succeeded; report the
                        // persistence failure once, no automatic retry
                        warn!("finalize of {} failed: {}", url, e);
                        self.emit(DownloadEvent::Failed {
                            url,
                            resumable: false,
                            reason: e.to_string(),
                        });
                    }
                }
            }

            EngineEvent::Failed {
                url,
                error,
                checkpoint,
            } => {
                let resumable = error.is_resumable();
                let mut records = self.records.lock().await;
                let Some(record) = records.get_mut(&url) else {
                    drop(records);
                    debug!("failure for {} ignored, record gone", url);
                    if let Some(checkpoint) = &checkpoint {
                        self.discard_staging(&url, &checkpoint.staging_path).await;
                    }
                    return;
                };
                if resumable {
                    record.handle = None;
                    record.status = TransferStatus::Failed;
                    if checkpoint.is_some() {
                        record.checkpoint = checkpoint;
                    }
                } else {
                    records.remove(&url);
                }
                drop(records);
                warn!(
                    "download of {} failed ({}): {}",
                    url,
                    error.category(),
                    error
                );
                self.emit(DownloadEvent::Failed {
                    url,
                    resumable,
                    reason: error.to_string(),
                });
            }
        }
    }
}

impl std::fmt::Debug for DownloadManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DownloadManager")
            .field("store", &self.inner.store)
            .finish()
    }
}
