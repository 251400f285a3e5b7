//! Upload orchestrator: validate, spawn, poll progress, finalize.
//!
//! Each upload owns its process, diagnostics file, progress stream and
//! [`UploadSession`]; any number of uploads may run concurrently.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::{TransferConfig, encode_path_segment};
use crate::progress::{ProgressObserver, parse_progress};
use crate::runner::{
    CurlRunner, DiagnosticsReader, RunningTransfer, TransferJob, TransferRunner,
};
use crate::types::{UploadOutcome, UploadRequest, UploadSession, UploadState};
use crate::validation::validate_local_file;
use crate::{DEFAULT_POLL_INTERVAL, TransferError};

/// Poll intervals below this are raised to it; a zero-period timer is invalid.
const MIN_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Drives uploads through the external transfer tool.
#[derive(Clone)]
pub struct UploadOrchestrator {
    runner: Arc<dyn TransferRunner>,
    poll_interval: Duration,
    timeout: Option<Duration>,
}

impl Default for UploadOrchestrator {
    fn default() -> Self {
        Self::new(Arc::new(CurlRunner::new()))
    }
}

/// How waiting on the process ended.
enum Exit {
    Status(Result<Option<i32>, TransferError>),
    Cancelled,
    TimedOut(Duration),
}

impl UploadOrchestrator {
    /// Creates an orchestrator that starts processes through `runner`.
    pub fn new(runner: Arc<dyn TransferRunner>) -> Self {
        Self {
            runner,
            poll_interval: DEFAULT_POLL_INTERVAL,
            timeout: None,
        }
    }

    /// Sets the interval between diagnostics polls (default 500 ms, at least 10 ms).
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval.max(MIN_POLL_INTERVAL);
        self
    }

    /// Kills the tool and fails with `TimedOut` if it runs longer than `timeout`.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Uploads one file and returns its public URL.
    ///
    /// Progress fractions go to `observer` in sampling order; on success a
    /// final `1.0` is delivered before this returns. Failures deliver no
    /// terminal value.
    pub async fn upload(
        &self,
        config: &TransferConfig,
        request: &UploadRequest,
        observer: impl ProgressObserver + 'static,
    ) -> UploadOutcome {
        self.upload_with_cancel(config, request, observer, CancellationToken::new())
            .await
    }

    /// Like [`upload`](Self::upload), but kills the tool and fails with
    /// `Cancelled` once `cancel` fires.
    pub async fn upload_with_cancel(
        &self,
        config: &TransferConfig,
        request: &UploadRequest,
        observer: impl ProgressObserver + 'static,
        cancel: CancellationToken,
    ) -> UploadOutcome {
        let session = Arc::new(UploadSession::new(request));
        self.run(config, request, Arc::new(observer), session, cancel)
            .await
    }

    /// Starts an upload on a background task and returns its handle.
    ///
    /// `config` is moved into the task, so the caller is free to change its
    /// own settings while the upload is in flight.
    pub fn spawn(&self, config: TransferConfig, request: UploadRequest) -> UploadHandle {
        let session = Arc::new(UploadSession::new(&request));
        let (progress_tx, progress_rx) = watch::channel(0.0_f64);
        let cancel = CancellationToken::new();

        let orchestrator = self.clone();
        let task_session = Arc::clone(&session);
        let task_cancel = cancel.clone();
        let task = tokio::spawn(async move {
            orchestrator
                .run(
                    &config,
                    &request,
                    Arc::new(progress_tx),
                    task_session,
                    task_cancel,
                )
                .await
        });

        UploadHandle {
            session,
            progress: progress_rx,
            cancel,
            task,
        }
    }

    async fn run(
        &self,
        config: &TransferConfig,
        request: &UploadRequest,
        observer: Arc<dyn ProgressObserver>,
        session: Arc<UploadSession>,
        cancel: CancellationToken,
    ) -> UploadOutcome {
        let upload_id = session.id();
        let outcome = self
            .drive(config, request, Arc::clone(&observer), &session, &cancel)
            .await;

        match &outcome {
            Ok(url) => {
                session.succeed(url);
                observer.on_progress(1.0);
                info!(
                    upload_id = %upload_id,
                    url = %url,
                    elapsed_ms = session.elapsed().as_millis() as u64,
                    "upload completed"
                );
            }
            Err(e) => {
                session.fail(e);
                warn!(upload_id = %upload_id, error = %e, "upload failed");
            }
        }

        outcome
    }

    async fn drive(
        &self,
        config: &TransferConfig,
        request: &UploadRequest,
        observer: Arc<dyn ProgressObserver>,
        session: &Arc<UploadSession>,
        cancel: &CancellationToken,
    ) -> UploadOutcome {
        let upload_id = session.id();

        // -- Validating --
        session.set_state(UploadState::Validating);
        config.validate()?;
        let size = validate_local_file(request.local_path())?;

        // Everything below works from this snapshot, never from `config`.
        let job = TransferJob::new(config, request);
        let public_url = format!(
            "{}{}",
            config.normalized_base_url(),
            encode_path_segment(&job.remote_name)
        );

        // -- Spawning --
        session.set_state(UploadState::Spawning);
        let mut transfer = self.runner.start(&job)?;
        info!(
            upload_id = %upload_id,
            host = %job.host,
            remote = %job.target_url(),
            bytes = size,
            "upload started"
        );

        // -- Running --
        session.set_state(UploadState::Running);
        let poll_cancel = CancellationToken::new();
        // Stops the poller even if this future is dropped mid-upload.
        let _poll_guard = poll_cancel.clone().drop_guard();
        let poller = tokio::spawn(poll_progress(
            transfer.diagnostics(),
            observer,
            Arc::clone(session),
            poll_cancel.clone(),
            self.poll_interval,
        ));

        let exit = self.await_exit(&mut transfer, cancel).await;

        // Join the poller so every progress update lands before the outcome.
        poll_cancel.cancel();
        if let Err(e) = poller.await {
            warn!(upload_id = %upload_id, error = %e, "progress poller ended abnormally");
        }

        // -- Finalizing --
        session.set_state(UploadState::Finalizing);
        let result = match exit {
            Exit::Status(Ok(Some(0))) => Ok(public_url),
            Exit::Status(Ok(code)) => {
                debug!(upload_id = %upload_id, ?code, "transfer tool exited with failure");
                Err(TransferError::UploadFailed(
                    failure_detail(&transfer, code).await,
                ))
            }
            Exit::Status(Err(e)) => Err(e),
            Exit::Cancelled => {
                transfer.kill().await;
                Err(TransferError::Cancelled)
            }
            Exit::TimedOut(after) => {
                transfer.kill().await;
                Err(TransferError::TimedOut(after))
            }
        };

        transfer.cleanup();
        result
    }

    async fn await_exit(
        &self,
        transfer: &mut RunningTransfer,
        cancel: &CancellationToken,
    ) -> Exit {
        let timeout = self.timeout;
        let deadline = async move {
            match timeout {
                Some(after) => {
                    tokio::time::sleep(after).await;
                    after
                }
                None => std::future::pending().await,
            }
        };

        tokio::select! {
            status = transfer.wait_for_exit() => Exit::Status(status),
            _ = cancel.cancelled() => Exit::Cancelled,
            after = deadline => Exit::TimedOut(after),
        }
    }
}

/// Polls the diagnostics file until `cancel` fires, forwarding new fractions.
async fn poll_progress(
    reader: DiagnosticsReader,
    observer: Arc<dyn ProgressObserver>,
    session: Arc<UploadSession>,
    cancel: CancellationToken,
    interval: Duration,
) {
    let mut previous = String::new();
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                // A missed read is not an error; try again next tick.
                let Some(snapshot) = reader.snapshot().await else {
                    continue;
                };
                if let Some(fraction) = parse_progress(&snapshot, &previous) {
                    observer.on_progress(fraction);
                    session.set_progress(fraction);
                }
                previous = snapshot;
            }
        }
    }
}

/// Error text for a failed transfer: the tool's diagnostics without the
/// progress-bar frames, or a generic message when nothing else was written.
async fn failure_detail(transfer: &RunningTransfer, code: Option<i32>) -> String {
    let text = transfer.diagnostics_snapshot().await.unwrap_or_default();
    let detail = text
        .split(['\r', '\n'])
        .map(str::trim)
        .filter(|line| !line.is_empty() && !is_progress_frame(line))
        .collect::<Vec<_>>()
        .join("\n");

    if !detail.is_empty() {
        return detail;
    }
    match code {
        Some(code) => format!("exited with status {code}"),
        None => "terminated by signal".to_string(),
    }
}

fn is_progress_frame(line: &str) -> bool {
    line.starts_with('#') || parse_progress(line, "").is_some()
}

/// A running upload started by [`UploadOrchestrator::spawn`].
///
/// Each upload gets its own handle; there is no shared "current upload".
pub struct UploadHandle {
    session: Arc<UploadSession>,
    progress: watch::Receiver<f64>,
    cancel: CancellationToken,
    task: JoinHandle<UploadOutcome>,
}

impl UploadHandle {
    pub fn id(&self) -> String {
        self.session.id()
    }

    /// Live state of this upload.
    pub fn session(&self) -> Arc<UploadSession> {
        Arc::clone(&self.session)
    }

    /// Receiver for the latest progress fraction; the upload is its only writer.
    pub fn progress(&self) -> watch::Receiver<f64> {
        self.progress.clone()
    }

    /// Requests cancellation; the outcome becomes `Cancelled`.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Token that cancels this upload, for wiring to signals or UI buttons.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Waits for the upload to finish.
    ///
    /// A panic inside the upload task is resumed on the caller.
    pub async fn outcome(self) -> UploadOutcome {
        match self.task.await {
            Ok(outcome) => outcome,
            Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
            Err(_) => Err(TransferError::Cancelled),
        }
    }
}
