//! Configuration for the download manager

use std::path::PathBuf;
use std::time::Duration;

/// Configuration shared by the manager and its HTTP engine
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    /// Directory completed files are placed in; must be stable across
    /// restarts so previously completed files can be found again
    pub download_dir: PathBuf,
    pub timeout: Duration,
    pub user_agent: String,
    /// When false, every run starts from byte zero and checkpoints are ignored
    pub allow_resume: bool,
    /// Minimum interval between progress events per run
    pub progress_interval: Duration,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            download_dir: PathBuf::from("downloads"),
            timeout: Duration::from_secs(30),
            user_agent: format!("downloader/{}", env!("CARGO_PKG_VERSION")),
            allow_resume: true,
            progress_interval: Duration::from_millis(100),
        }
    }
}

impl ManagerConfig {
    pub fn with_download_dir<P: Into<PathBuf>>(mut self, dir: P) -> Self {
        self.download_dir = dir.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}
