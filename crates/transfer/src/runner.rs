//! Spawning the external transfer tool.
//!
//! `CurlRunner` starts a curl-compatible executable with its progress and
//! error output redirected into a private temporary file. The returned
//! [`RunningTransfer`] owns both the child process and that file.

use std::ffi::OsString;
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;

use tempfile::TempPath;
use tokio::process::{Child, Command};
use tracing::{debug, warn};

use crate::config::{TransferConfig, encode_path, encode_path_segment};
use crate::types::UploadRequest;
use crate::validation::is_executable_file;
use crate::TransferError;

/// Prefix of the per-upload diagnostics files.
const DIAGNOSTICS_PREFIX: &str = "dropcast-";

/// Immutable snapshot of everything needed to run one transfer.
///
/// Taken before spawning so later edits to the caller's config cannot
/// affect an upload in flight.
#[derive(Clone)]
pub struct TransferJob {
    pub tool_path: PathBuf,
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    /// Normalized remote directory (leading `/`, no trailing `/`).
    pub remote_dir: String,
    pub remote_name: String,
    pub local_path: PathBuf,
    pub allow_insecure: bool,
    pub connect_timeout_secs: Option<u32>,
}

impl fmt::Debug for TransferJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransferJob")
            .field("tool_path", &self.tool_path)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("remote_dir", &self.remote_dir)
            .field("remote_name", &self.remote_name)
            .field("local_path", &self.local_path)
            .field("allow_insecure", &self.allow_insecure)
            .field("connect_timeout_secs", &self.connect_timeout_secs)
            .finish()
    }
}

impl TransferJob {
    pub fn new(config: &TransferConfig, request: &UploadRequest) -> Self {
        Self {
            tool_path: config.transfer_tool_path.clone(),
            host: config.host.trim().to_string(),
            port: config.port,
            username: config.username.clone(),
            password: config.password.clone(),
            remote_dir: config.normalized_remote_path(),
            remote_name: request.remote_name().to_string(),
            local_path: request.local_path().to_path_buf(),
            allow_insecure: config.allow_insecure,
            connect_timeout_secs: config.connect_timeout_secs,
        }
    }

    /// `sftp://{host}:{port}{remote_dir}/{remote_name}`, with the path percent-encoded.
    pub fn target_url(&self) -> String {
        let dir = if self.remote_dir == "/" {
            String::new()
        } else {
            encode_path(&self.remote_dir)
        };
        format!(
            "sftp://{}:{}{dir}/{}",
            self.host,
            self.port,
            encode_path_segment(&self.remote_name)
        )
    }

    /// Command-line arguments for the tool, writing diagnostics to `diagnostics`.
    ///
    /// Contains the plaintext credential; log only via [`redact_credentials`].
    pub fn args(&self, diagnostics: &Path) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec![
            "-T".into(),
            self.local_path.clone().into_os_string(),
            "-u".into(),
            format!("{}:{}", self.username, self.password).into(),
            "--stderr".into(),
            diagnostics.as_os_str().to_owned(),
            "--progress-bar".into(),
        ];
        if self.allow_insecure {
            args.push("--insecure".into());
        }
        if let Some(secs) = self.connect_timeout_secs {
            args.push("--connect-timeout".into());
            args.push(secs.to_string().into());
        }
        args.push(self.target_url().into());
        args
    }
}

/// Renders an argument list for logging with the password masked.
pub fn redact_credentials(args: &[OsString]) -> String {
    let mut out = Vec::with_capacity(args.len());
    let mut redact_next = false;
    for arg in args {
        let arg = arg.to_string_lossy();
        if redact_next {
            match arg.split_once(':') {
                Some((user, _)) => out.push(format!("{user}:<redacted>")),
                None => out.push("<redacted>".to_string()),
            }
            redact_next = false;
        } else {
            redact_next = arg == "-u" || arg == "--user";
            out.push(arg.into_owned());
        }
    }
    out.join(" ")
}

/// Starts transfer processes.
///
/// Implemented by [`CurlRunner`]; tests substitute their own runners to
/// count or intercept spawns.
pub trait TransferRunner: Send + Sync {
    /// Spawns the tool for `job`.
    ///
    /// Fails with `InvalidToolPath` when the executable is missing and
    /// `SpawnFailed` when the OS refuses to start it. No diagnostics file
    /// outlives a failed start.
    fn start(&self, job: &TransferJob) -> Result<RunningTransfer, TransferError>;
}

/// Runs a curl-compatible executable.
#[derive(Debug, Clone, Default)]
pub struct CurlRunner {
    diagnostics_dir: Option<PathBuf>,
}

impl CurlRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates diagnostics files in `dir` instead of the system temp dir.
    pub fn with_diagnostics_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            diagnostics_dir: Some(dir.into()),
        }
    }

    fn create_diagnostics_file(&self) -> Result<TempPath, TransferError> {
        let mut builder = tempfile::Builder::new();
        builder.prefix(DIAGNOSTICS_PREFIX).suffix(".log");
        let file = match &self.diagnostics_dir {
            Some(dir) => builder.tempfile_in(dir)?,
            None => builder.tempfile()?,
        };
        Ok(file.into_temp_path())
    }
}

impl TransferRunner for CurlRunner {
    fn start(&self, job: &TransferJob) -> Result<RunningTransfer, TransferError> {
        if !is_executable_file(&job.tool_path) {
            return Err(TransferError::InvalidToolPath(job.tool_path.clone()));
        }

        let diagnostics = self.create_diagnostics_file()?;
        let args = job.args(&diagnostics);

        debug!(
            tool = %job.tool_path.display(),
            args = %redact_credentials(&args),
            diagnostics = %diagnostics.display(),
            "spawning transfer tool"
        );

        // On error `diagnostics` is dropped here, which deletes the file.
        let child = Command::new(&job.tool_path)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(TransferError::SpawnFailed)?;

        Ok(RunningTransfer::new(child, diagnostics))
    }
}

/// Cloneable, read-only access to a transfer's diagnostics file.
#[derive(Debug, Clone)]
pub struct DiagnosticsReader {
    path: Arc<PathBuf>,
}

impl DiagnosticsReader {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Arc::new(path.into()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Best-effort read of the file's current contents.
    ///
    /// The tool may be writing concurrently; a failed read yields `None`
    /// and the caller simply tries again later.
    pub async fn snapshot(&self) -> Option<String> {
        match tokio::fs::read(self.path.as_path()).await {
            Ok(bytes) => Some(String::from_utf8_lossy(&bytes).into_owned()),
            Err(e) => {
                debug!(path = %self.path.display(), error = %e, "diagnostics read missed");
                None
            }
        }
    }
}

/// A spawned transfer: the child process plus its diagnostics file.
///
/// The file is deleted by [`cleanup`](Self::cleanup) or, failing that, on drop.
pub struct RunningTransfer {
    child: Child,
    reader: DiagnosticsReader,
    diagnostics: Option<TempPath>,
}

impl RunningTransfer {
    /// Wraps a child that writes its diagnostics to `diagnostics`.
    pub fn new(child: Child, diagnostics: TempPath) -> Self {
        let reader = DiagnosticsReader::new(diagnostics.to_path_buf());
        Self {
            child,
            reader,
            diagnostics: Some(diagnostics),
        }
    }

    /// OS process id, if the process has not been reaped yet.
    pub fn id(&self) -> Option<u32> {
        self.child.id()
    }

    /// Non-blocking check whether the process is still alive.
    pub fn is_running(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(None))
    }

    /// Waits for the process to exit.
    ///
    /// Returns the exit code, or `None` if the process was killed by a signal.
    /// Cancel safe.
    pub async fn wait_for_exit(&mut self) -> Result<Option<i32>, TransferError> {
        let status = self.child.wait().await?;
        Ok(status.code())
    }

    /// Kills the process and waits for it to be reaped.
    pub async fn kill(&mut self) {
        if let Err(e) = self.child.kill().await {
            warn!(error = %e, "failed to kill transfer tool");
        }
    }

    /// Current contents of the diagnostics file, if readable.
    pub async fn diagnostics_snapshot(&self) -> Option<String> {
        self.reader.snapshot().await
    }

    /// A reader that can poll the diagnostics file from another task.
    pub fn diagnostics(&self) -> DiagnosticsReader {
        self.reader.clone()
    }

    /// Deletes the diagnostics file. Safe to call more than once.
    pub fn cleanup(&mut self) {
        if let Some(path) = self.diagnostics.take() {
            let shown = path.display().to_string();
            match path.close() {
                Ok(()) => debug!(path = %shown, "diagnostics file removed"),
                Err(e) => warn!(path = %shown, error = %e, "failed to remove diagnostics file"),
            }
        }
    }
}

impl Drop for RunningTransfer {
    fn drop(&mut self) {
        self.cleanup();
    }
}
