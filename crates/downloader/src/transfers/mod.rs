//! Transfer subsystem
//!
//! This module contains the download manager and everything under it:
//! core types, configuration, the local store, the transfer engine
//! and the per-transfer records.

pub mod config;
pub mod core;
pub mod engine;
pub mod manager;
pub mod record;
pub mod store;

// Re-export main types for convenience
pub use config::ManagerConfig;
pub use core::{
    ConsoleObserver, DownloadEvent, DownloadObserver, EventCallback, FileOperation,
    IntoEventCallback, NullObserver, Result, TransferError, format_bytes,
};
pub use engine::{EngineEvent, EngineHandle, EngineSink, HttpTransferEngine, TransferEngine};
pub use manager::DownloadManager;
pub use record::{Checkpoint, TransferRecord, TransferSnapshot, TransferStatus};
pub use store::LocalStore;
