//! Core types shared by the transfer engine, local store and manager

pub mod error;
pub mod progress;

pub use error::{FileOperation, Result, TransferError};
pub use progress::{
    ConsoleObserver, DownloadEvent, DownloadObserver, EventCallback, IntoEventCallback,
    NullObserver, format_bytes,
};
