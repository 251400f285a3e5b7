use std::path::{Path, PathBuf};
use std::sync::RwLock;
use std::time::Instant;

use crate::TransferError;
use crate::validation::validate_remote_name;

/// Result of exactly one orchestrated upload: the public URL or a classified error.
pub type UploadOutcome = Result<String, TransferError>;

/// A single file to upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadRequest {
    local_path: PathBuf,
    remote_name: String,
}

impl UploadRequest {
    /// Creates a request that keeps the local file's base name on the server.
    ///
    /// Fails with `FileNotFound` if the path has no file name component.
    pub fn new(local_path: impl Into<PathBuf>) -> Result<Self, TransferError> {
        let local_path = local_path.into();
        let remote_name = local_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| TransferError::FileNotFound(local_path.clone()))?;
        validate_remote_name(&remote_name)?;
        Ok(Self {
            local_path,
            remote_name,
        })
    }

    /// Creates a request with an explicit remote filename.
    pub fn with_remote_name(
        local_path: impl Into<PathBuf>,
        remote_name: impl Into<String>,
    ) -> Result<Self, TransferError> {
        let remote_name = remote_name.into();
        validate_remote_name(&remote_name)?;
        Ok(Self {
            local_path: local_path.into(),
            remote_name,
        })
    }

    pub fn local_path(&self) -> &Path {
        &self.local_path
    }

    pub fn remote_name(&self) -> &str {
        &self.remote_name
    }
}

/// Lifecycle of a single upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadState {
    Validating,
    Spawning,
    Running,
    Finalizing,
    Succeeded,
    Failed,
    Cancelled,
    TimedOut,
}

impl UploadState {
    /// Returns `true` once the upload can no longer change.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Succeeded | Self::Failed | Self::Cancelled | Self::TimedOut
        )
    }
}

/// Tracks one upload's state and progress (thread-safe).
///
/// Written by the orchestrator, read by whoever holds the upload's handle.
pub struct UploadSession {
    inner: RwLock<SessionInner>,
}

struct SessionInner {
    id: String,
    local_path: PathBuf,
    remote_name: String,
    state: UploadState,
    fraction: f64,
    url: Option<String>,
    error: String,
    started_at: Instant,
    updated_at: Instant,
    completed_at: Option<Instant>,
}

impl UploadSession {
    /// Creates a session in the `Validating` state with a fresh id.
    pub fn new(request: &UploadRequest) -> Self {
        let now = Instant::now();
        Self {
            inner: RwLock::new(SessionInner {
                id: uuid::Uuid::new_v4().to_string(),
                local_path: request.local_path().to_path_buf(),
                remote_name: request.remote_name().to_string(),
                state: UploadState::Validating,
                fraction: 0.0,
                url: None,
                error: String::new(),
                started_at: now,
                updated_at: now,
                completed_at: None,
            }),
        }
    }

    /// Moves to a non-terminal state.
    pub fn set_state(&self, state: UploadState) {
        let mut s = self.write();
        s.state = state;
        s.updated_at = Instant::now();
    }

    /// Records the latest progress fraction.
    pub fn set_progress(&self, fraction: f64) {
        let mut s = self.write();
        s.fraction = fraction;
        s.updated_at = Instant::now();
    }

    /// Marks the session as succeeded with its public URL.
    pub fn succeed(&self, url: &str) {
        let mut s = self.write();
        s.state = UploadState::Succeeded;
        s.fraction = 1.0;
        s.url = Some(url.to_string());
        let now = Instant::now();
        s.completed_at = Some(now);
        s.updated_at = now;
    }

    /// Marks the session as finished with an error.
    pub fn fail(&self, err: &TransferError) {
        let mut s = self.write();
        s.state = match err {
            TransferError::Cancelled => UploadState::Cancelled,
            TransferError::TimedOut(_) => UploadState::TimedOut,
            _ => UploadState::Failed,
        };
        s.error = err.to_string();
        let now = Instant::now();
        s.completed_at = Some(now);
        s.updated_at = now;
    }

    pub fn id(&self) -> String {
        self.read().id.clone()
    }

    pub fn local_path(&self) -> PathBuf {
        self.read().local_path.clone()
    }

    pub fn remote_name(&self) -> String {
        self.read().remote_name.clone()
    }

    pub fn state(&self) -> UploadState {
        self.read().state
    }

    pub fn fraction(&self) -> f64 {
        self.read().fraction
    }

    pub fn url(&self) -> Option<String> {
        self.read().url.clone()
    }

    /// Error text of a failed upload (empty otherwise).
    pub fn error(&self) -> String {
        self.read().error.clone()
    }

    /// Time since the session was created, or its total duration once finished.
    pub fn elapsed(&self) -> std::time::Duration {
        let s = self.read();
        s.completed_at
            .unwrap_or_else(Instant::now)
            .duration_since(s.started_at)
    }

    /// Time of the last state or progress change.
    pub fn updated_at(&self) -> Instant {
        self.read().updated_at
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, SessionInner> {
        self.inner.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, SessionInner> {
        self.inner.write().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> UploadRequest {
        UploadRequest::new("/tmp/shots/a.txt").unwrap()
    }

    #[test]
    fn request_defaults_to_base_name() {
        let req = request();
        assert_eq!(req.remote_name(), "a.txt");
        assert_eq!(req.local_path(), Path::new("/tmp/shots/a.txt"));
    }

    #[test]
    fn request_without_file_name_is_rejected() {
        assert!(matches!(
            UploadRequest::new("/"),
            Err(TransferError::FileNotFound(_))
        ));
    }

    #[test]
    fn request_with_remote_name_is_validated() {
        let req = UploadRequest::with_remote_name("/tmp/a.txt", "b.txt").unwrap();
        assert_eq!(req.remote_name(), "b.txt");
        assert!(matches!(
            UploadRequest::with_remote_name("/tmp/a.txt", "../b.txt"),
            Err(TransferError::InvalidRemoteName(_))
        ));
    }

    #[test]
    fn new_session_is_validating() {
        let session = UploadSession::new(&request());
        assert_eq!(session.state(), UploadState::Validating);
        assert_eq!(session.fraction(), 0.0);
        assert_eq!(session.remote_name(), "a.txt");
        assert!(session.url().is_none());
        assert!(!session.id().is_empty());
    }

    #[test]
    fn sessions_get_distinct_ids() {
        let a = UploadSession::new(&request());
        let b = UploadSession::new(&request());
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn succeed_records_url_and_full_progress() {
        let session = UploadSession::new(&request());
        session.set_state(UploadState::Running);
        session.set_progress(0.4);
        assert_eq!(session.fraction(), 0.4);

        session.succeed("https://x/a.txt");
        assert_eq!(session.state(), UploadState::Succeeded);
        assert!(session.state().is_terminal());
        assert_eq!(session.fraction(), 1.0);
        assert_eq!(session.url().as_deref(), Some("https://x/a.txt"));
    }

    #[test]
    fn fail_maps_error_kind_to_state() {
        let session = UploadSession::new(&request());
        session.fail(&TransferError::UploadFailed("auth failed".into()));
        assert_eq!(session.state(), UploadState::Failed);
        assert!(session.error().contains("auth failed"));

        let session = UploadSession::new(&request());
        session.fail(&TransferError::Cancelled);
        assert_eq!(session.state(), UploadState::Cancelled);

        let session = UploadSession::new(&request());
        session.fail(&TransferError::TimedOut(std::time::Duration::from_secs(1)));
        assert_eq!(session.state(), UploadState::TimedOut);
    }

    #[test]
    fn running_states_are_not_terminal() {
        for state in [
            UploadState::Validating,
            UploadState::Spawning,
            UploadState::Running,
            UploadState::Finalizing,
        ] {
            assert!(!state.is_terminal());
        }
    }

    #[test]
    fn concurrent_progress_updates() {
        use std::sync::Arc;
        use std::thread;

        let session = Arc::new(UploadSession::new(&request()));
        let mut handles = vec![];

        for i in 0..8 {
            let s = Arc::clone(&session);
            handles.push(thread::spawn(move || {
                for j in 0..100 {
                    s.set_progress(f64::from(i * 100 + j) / 1000.0);
                    let _ = s.fraction();
                    let _ = s.state();
                }
            }));
        }

        for h in handles {
            h.join().unwrap();
        }

        let f = session.fraction();
        assert!((0.0..=1.0).contains(&f));
    }
}
