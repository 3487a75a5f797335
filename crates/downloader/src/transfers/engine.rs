//! Transfer engine: moves the bytes for one run of one download
//!
//! An engine run streams the response body into the store's staging
//! file and reports everything that happens over the engine channel.
//! Every run terminates in exactly one of `Completed`, `Interrupted`,
//! `Aborted` or `Failed`.

use std::path::PathBuf;
use std::time::Instant;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::{Client, StatusCode, header};
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::config::ManagerConfig;
use super::core::{FileOperation, Result, TransferError};
use super::record::Checkpoint;
use super::store::LocalStore;

/// Events an engine run streams back to its manager
#[derive(Debug)]
pub enum EngineEvent {
    /// The run is live; `total` is absent when the server does not
    /// report a content length
    Started { url: String, total: Option<u64> },
    /// A resume attempt was rejected (resource changed or ranges
    /// unsupported); the run restarted from byte zero
    Restarted { url: String },
    Progress {
        url: String,
        written: u64,
        total: Option<u64>,
    },
    /// Graceful interruption; `checkpoint` is absent when the run had
    /// not yet written its first byte
    Interrupted {
        url: String,
        checkpoint: Option<Checkpoint>,
    },
    /// Hard abort; all partial state has been discarded
    Aborted { url: String },
    Completed { url: String, staging_path: PathBuf },
    Failed {
        url: String,
        error: TransferError,
        /// Present when enough data is on disk for a later resume
        checkpoint: Option<Checkpoint>,
    },
}

impl EngineEvent {
    pub fn url(&self) -> &str {
        match self {
            EngineEvent::Started { url, .. }
            | EngineEvent::Restarted { url }
            | EngineEvent::Progress { url, .. }
            | EngineEvent::Interrupted { url, .. }
            | EngineEvent::Aborted { url }
            | EngineEvent::Completed { url, .. }
            | EngineEvent::Failed { url, .. } => url,
        }
    }
}

/// Sender half of the engine channel.
///
/// Cloned into every run; also the port through which transfers that
/// outlived a process restart deliver their callbacks.
pub type EngineSink = mpsc::UnboundedSender<EngineEvent>;

/// Handle to one in-flight engine run.
///
/// Both requests are non-blocking: the engine confirms over the event
/// channel (`Interrupted` / `Aborted`) once it has actually stopped.
#[derive(Debug)]
pub struct EngineHandle {
    url: String,
    interrupt: CancellationToken,
    abort: CancellationToken,
}

impl EngineHandle {
    /// Fresh handle with its own interrupt and abort tokens.
    ///
    /// Engine implementations watch the tokens from inside their run.
    pub fn new<S: Into<String>>(url: S) -> Self {
        Self {
            url: url.into(),
            interrupt: CancellationToken::new(),
            abort: CancellationToken::new(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn interrupt_token(&self) -> CancellationToken {
        self.interrupt.clone()
    }

    pub fn abort_token(&self) -> CancellationToken {
        self.abort.clone()
    }

    /// Request graceful interruption; partial state is kept for resume
    pub fn interrupt(&self) {
        self.interrupt.cancel();
    }

    /// Request immediate abort; partial state is discarded
    pub fn abort(&self) {
        self.abort.cancel();
    }
}

/// Trait seam between the manager and whatever moves the bytes
#[async_trait]
pub trait TransferEngine: Send + Sync {
    /// Start one run for `url`, resuming from `checkpoint` when given.
    ///
    /// Returns immediately after the run is registered; all outcomes
    /// arrive through `sink`.
    async fn begin(
        &self,
        url: &str,
        checkpoint: Option<Checkpoint>,
        sink: EngineSink,
    ) -> Result<EngineHandle>;
}

/// HTTP engine streaming into the store's staging files
pub struct HttpTransferEngine {
    client: Client,
    store: LocalStore,
    config: ManagerConfig,
}

impl HttpTransferEngine {
    pub fn new(config: ManagerConfig, store: LocalStore) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .user_agent(&config.user_agent)
            .build()
            .map_err(|e| TransferError::Network {
                url: String::new(),
                source: e,
            })?;
        Ok(Self {
            client,
            store,
            config,
        })
    }
}

#[async_trait]
impl TransferEngine for HttpTransferEngine {
    async fn begin(
        &self,
        url: &str,
        checkpoint: Option<Checkpoint>,
        sink: EngineSink,
    ) -> Result<EngineHandle> {
        let staging = self.store.staging_path(url)?;
        let handle = EngineHandle::new(url);

        let run = TransferRun {
            client: self.client.clone(),
            url: url.to_string(),
            staging,
            checkpoint: if self.config.allow_resume {
                checkpoint
            } else {
                None
            },
            interrupt: handle.interrupt.clone(),
            abort: handle.abort.clone(),
            sink,
            progress_interval: self.config.progress_interval,
        };
        tokio::spawn(run.execute());

        Ok(handle)
    }
}

/// State for one spawned run
struct TransferRun {
    client: Client,
    url: String,
    staging: PathBuf,
    checkpoint: Option<Checkpoint>,
    interrupt: CancellationToken,
    abort: CancellationToken,
    sink: EngineSink,
    progress_interval: std::time::Duration,
}

impl TransferRun {
    async fn execute(self) {
        let url = self.url.clone();
        let sink = self.sink.clone();
        if let Err(error) = self.run().await {
            // Terminal events for interrupt/abort/stream failures are
            // sent inside run(); only setup errors land here.
            let _ = sink.send(EngineEvent::Failed {
                url,
                error,
                checkpoint: None,
            });
        }
    }

    async fn run(mut self) -> Result<()> {
        // Trust the checkpoint only as far as the staging file backs it up
        let mut offset = match &self.checkpoint {
            Some(checkpoint) => {
                let on_disk = tokio::fs::metadata(&self.staging)
                    .await
                    .map(|m| m.len())
                    .unwrap_or(0);
                checkpoint.offset.min(on_disk)
            }
            None => 0,
        };

        let mut request = self.client.get(&self.url);
        if offset > 0 {
            request = request.header(header::RANGE, format!("bytes={}-", offset));
            if let Some(validator) = self.checkpoint.as_ref().and_then(|c| c.validator.clone()) {
                request = request.header(header::IF_RANGE, validator);
            }
            debug!("resuming {} from byte {}", self.url, offset);
        }

        let response = request.send().await.map_err(|e| TransferError::Network {
            url: self.url.clone(),
            source: e,
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransferError::HttpStatus {
                url: self.url.clone(),
                status: status.as_u16(),
            });
        }

        // A 200 answer to a range request means the resource changed or
        // the server does not do ranges: restart from zero so the
        // manager can reset its stale fraction.
        if offset > 0 && status != StatusCode::PARTIAL_CONTENT {
            debug!("resume of {} rejected, restarting from zero", self.url);
            offset = 0;
            self.checkpoint = None;
            let _ = self.sink.send(EngineEvent::Restarted {
                url: self.url.clone(),
            });
        }

        let total = response.content_length().map(|len| len + offset);
        let validator = extract_validator(response.headers());

        let _ = self.sink.send(EngineEvent::Started {
            url: self.url.clone(),
            total,
        });

        let mut file = self.open_staging(offset).await?;
        let mut written = offset;
        let mut last_emit = Instant::now();
        let mut stream = response.bytes_stream();

        loop {
            tokio::select! {
                biased;

                () = self.abort.cancelled() => {
                    drop(file);
                    self.discard_staging().await;
                    let _ = self.sink.send(EngineEvent::Aborted { url: self.url.clone() });
                    return Ok(());
                }

                () = self.interrupt.cancelled() => {
                    flush(&mut file, &self.staging).await?;
                    let checkpoint = if written == 0 {
                        // Nothing resumable yet; force restart-from-zero later
                        drop(file);
                        self.discard_staging().await;
                        None
                    } else {
                        Some(Checkpoint {
                            offset: written,
                            validator: validator.clone(),
                            staging_path: self.staging.clone(),
                        })
                    };
                    let _ = self.sink.send(EngineEvent::Interrupted {
                        url: self.url.clone(),
                        checkpoint,
                    });
                    return Ok(());
                }

                chunk = stream.next() => {
                    match chunk {
                        Some(Ok(chunk)) => {
                            file.write_all(&chunk).await.map_err(|e| {
                                TransferError::storage(&self.staging, FileOperation::Write, e)
                            })?;
                            written += chunk.len() as u64;

                            let now = Instant::now();
                            if now.duration_since(last_emit) >= self.progress_interval {
                                let _ = self.sink.send(EngineEvent::Progress {
                                    url: self.url.clone(),
                                    written,
                                    total,
                                });
                                last_emit = now;
                            }
                        }
                        Some(Err(e)) => {
                            // Keep what we have so a manual resume can pick it up
                            flush(&mut file, &self.staging).await?;
                            let checkpoint = (written > 0).then(|| Checkpoint {
                                offset: written,
                                validator: validator.clone(),
                                staging_path: self.staging.clone(),
                            });
                            warn!("transfer of {} failed mid-stream: {}", self.url, e);
                            let _ = self.sink.send(EngineEvent::Failed {
                                url: self.url.clone(),
                                error: TransferError::Network {
                                    url: self.url.clone(),
                                    source: e,
                                },
                                checkpoint,
                            });
                            return Ok(());
                        }
                        None => break,
                    }
                }
            }
        }

        flush(&mut file, &self.staging).await?;
        file.sync_all()
            .await
            .map_err(|e| TransferError::storage(&self.staging, FileOperation::Write, e))?;

        // Final progress so observers land exactly on the total
        let _ = self.sink.send(EngineEvent::Progress {
            url: self.url.clone(),
            written,
            total,
        });
        let _ = self.sink.send(EngineEvent::Completed {
            url: self.url.clone(),
            staging_path: self.staging.clone(),
        });
        debug!("transfer of {} completed, {} bytes staged", self.url, written);
        Ok(())
    }

    async fn open_staging(&self, offset: u64) -> Result<File> {
        if let Some(parent) = self.staging.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| TransferError::storage(parent, FileOperation::CreateDir, e))?;
        }
        if offset > 0 {
            OpenOptions::new()
                .append(true)
                .open(&self.staging)
                .await
                .map_err(|e| TransferError::storage(&self.staging, FileOperation::Write, e))
        } else {
            File::create(&self.staging)
                .await
                .map_err(|e| TransferError::storage(&self.staging, FileOperation::Create, e))
        }
    }

    async fn discard_staging(&self) {
        if let Err(e) = tokio::fs::remove_file(&self.staging).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!("could not remove staging file {}: {}", self.staging.display(), e);
            }
        }
    }
}

async fn flush(file: &mut File, path: &std::path::Path) -> Result<()> {
    file.flush()
        .await
        .map_err(|e| TransferError::storage(path, FileOperation::Write, e))
}

/// Resource identity token for `If-Range`: ETag preferred, then Last-Modified
fn extract_validator(headers: &header::HeaderMap) -> Option<String> {
    headers
        .get(header::ETAG)
        .or_else(|| headers.get(header::LAST_MODIFIED))
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_string())
}
