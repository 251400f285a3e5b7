//! Upload orchestration core: drives an external transfer tool, tracks its
//! progress and turns the result into a public URL.
//!
//! The actual SFTP exchange is delegated to a curl-compatible executable.
//! This crate validates the configuration, spawns the tool with a private
//! diagnostics file, polls that file for progress and classifies the exit.
//!
//! # Pipeline
//!
//! 1. **Validate**: check settings and the local file, spawn nothing on failure
//! 2. **Spawn**: start the tool via a [`TransferRunner`]
//! 3. **Run**: poll the diagnostics file and forward progress fractions
//! 4. **Finalize**: map the exit status to a URL or a [`TransferError`]

mod config;
mod orchestrator;
mod progress;
mod runner;
mod types;
mod validation;

#[cfg(test)]
mod test_support;

use std::path::PathBuf;
use std::time::Duration;

pub use config::{
    TransferConfig, encode_path, encode_path_segment, normalize_base_url, normalize_remote_path,
};
pub use orchestrator::{UploadHandle, UploadOrchestrator};
pub use progress::{ProgressObserver, parse_progress};
pub use runner::{
    CurlRunner, DiagnosticsReader, RunningTransfer, TransferJob, TransferRunner,
    redact_credentials,
};
pub use types::{UploadOutcome, UploadRequest, UploadSession, UploadState};
pub use validation::{is_executable_file, validate_local_file, validate_remote_name};

/// Default interval between diagnostics polls while the tool is running.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Errors produced by the transfer crate.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("missing setting: {0}")]
    MissingSettings(&'static str),

    #[error("transfer tool not found or not executable: {}", .0.display())]
    InvalidToolPath(PathBuf),

    #[error("file not found: {}", .0.display())]
    FileNotFound(PathBuf),

    #[error("invalid remote name: {0}")]
    InvalidRemoteName(String),

    #[error("failed to start transfer tool: {0}")]
    SpawnFailed(#[source] std::io::Error),

    #[error("upload failed: {0}")]
    UploadFailed(String),

    #[error("cancelled")]
    Cancelled,

    #[error("timed out after {0:?}")]
    TimedOut(Duration),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
