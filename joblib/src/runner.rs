use crate::actors::worker::{ExitReport, StopOutcome, WorkerHandle};
use crate::error::{JobError, Result};
use crate::job::{Command, Job, JobState};
use crate::output::{OutputBuffer, OutputWriter};
use crate::store::JobStore;
use crate::stream;
use crate::types::{JobId, OutputBlob, Owner};
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Bounds how far the output pipes can run ahead of the output file.
const OUTPUT_CHANNEL_CAPACITY: usize = 64;

/// Drives jobs from creation to a terminal state.
///
/// The runner is cheap to clone. All clones share the same [`JobStore`], which is the only place
/// job state lives: background tasks never hold on to the request that created a job.
#[derive(Clone, Debug)]
pub struct JobRunner {
    store: Arc<JobStore>,
    output_dir: Arc<PathBuf>,
}

impl JobRunner {
    /// Create a runner with an empty store, writing job output under `output_dir`.
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self::with_store(Arc::new(JobStore::new()), output_dir)
    }

    pub fn with_store(store: Arc<JobStore>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            store,
            output_dir: Arc::new(output_dir.into()),
        }
    }

    /// Register a new job in the `Created` state. Nothing is started yet.
    pub fn create_job(&self, id: JobId, owner: Owner, command: Command) -> Job {
        self.store
            .create_record(id, command, owner, JobState::Created, None)
    }

    /// Run `job` on a detached task. The outcome is recorded in the store.
    pub fn spawn_job(&self, job: Job) -> JoinHandle<Result<()>> {
        let runner = self.clone();
        tokio::spawn(async move { runner.start_job(job).await })
    }

    /// Start the job's process and drive it until it exits.
    ///
    /// Failures are recorded on the job record as well as returned, since the caller is usually a
    /// detached task that nobody awaits.
    pub async fn start_job(&self, job: Job) -> Result<()> {
        let id = job.id;

        let (output, writer) = match OutputBuffer::create(&self.output_dir, &id).await {
            Ok(pair) => pair,
            Err(err) => return Err(self.record_failure(&id, JobError::OutputIo(err))),
        };
        self.store.update_record_output(&id, output)?;

        let (output_tx, output_rx) = mpsc::channel(OUTPUT_CHANNEL_CAPACITY);
        let (worker, exit_rx) = match WorkerHandle::spawn(id.clone(), &job.command, output_tx) {
            Ok(spawned) => spawned,
            Err(err) => return Err(self.record_failure(&id, JobError::ProcessStart(err))),
        };
        self.store.update_record_process(&id, worker)?;
        tracing::info!(job_id = %id, program = %job.command.program, "job started");

        // a stop may already have landed between launch and here
        if let Err(err) = self.store.update_record_state(&id, JobState::Running) {
            tracing::warn!(job_id = %id, error = %err, "job left the created state early");
        }

        let copied = copy_output(output_rx, writer).await;
        self.finish(&id, copied, exit_rx).await
    }

    /// Kill a job's process and mark it `Stopped`.
    ///
    /// Once the kill has been handed to the worker the job ends up `Stopped` even if this future
    /// is dropped, since the job task records the stop when it reaps the process.
    pub async fn stop_job(&self, id: &str) -> Result<()> {
        let job = self.store.get_record(id)?;
        let process = job.process.ok_or(JobError::NotStarted)?;
        if job.state.is_terminal() {
            return Err(JobError::TerminalJob);
        }

        let outcome = match process.stop().await {
            Ok(outcome) => outcome,
            Err(err) => return Err(self.record_failure(id, JobError::ProcessSignal(err))),
        };
        if outcome == StopOutcome::AlreadyRequested {
            return Err(JobError::TerminalJob);
        }

        match self.store.update_record_state(id, JobState::Stopped) {
            Ok(()) => {}
            // the job task saw our kill land and recorded it first
            Err(JobError::IllegalStateChange {
                from: JobState::Stopped,
                ..
            }) if outcome == StopOutcome::Killed => {}
            // the process exited on its own and that outcome was recorded first
            Err(JobError::IllegalStateChange { .. }) => return Err(JobError::TerminalJob),
            Err(err) => return Err(err),
        }
        tracing::info!(job_id = %id, ?outcome, "job stopped");
        Ok(())
    }

    pub fn get_job(&self, id: &str) -> Result<Job> {
        self.store.get_record(id)
    }

    /// Tail the output of job `id` into `sink`. See [`stream::stream_output`].
    pub async fn stream_output(
        &self,
        id: &str,
        sink: mpsc::Sender<OutputBlob>,
        cancel: CancellationToken,
    ) -> Result<()> {
        stream::stream_output(&self.store, id, sink, cancel).await
    }

    async fn finish(
        &self,
        id: &str,
        copied: io::Result<u64>,
        exit_rx: oneshot::Receiver<ExitReport>,
    ) -> Result<()> {
        let report = match exit_rx.await {
            Ok(report) => report,
            Err(_) => {
                let err = io::Error::new(io::ErrorKind::Other, "worker exited without a status");
                return Err(self.record_failure(id, JobError::ProcessWait(err)));
            }
        };
        let status = match report.status {
            Ok(status) => status,
            Err(err) => return Err(self.record_failure(id, JobError::ProcessWait(err))),
        };
        let written = match copied {
            Ok(written) => written,
            Err(err) => return Err(self.record_failure(id, JobError::OutputIo(err))),
        };

        if report.stopped {
            match self.store.update_record_state(id, JobState::Stopped) {
                Ok(()) => {
                    tracing::info!(job_id = %id, %status, written, "job exited after stop request")
                }
                // the stop request recorded it already
                Err(JobError::IllegalStateChange { .. }) => {}
                Err(err) => return Err(err),
            }
            return Ok(());
        }
        if !status.success() {
            return Err(self.record_failure(id, JobError::ProcessExit(status)));
        }

        let current = self.store.get_record(id)?;
        if current.state.is_terminal() {
            tracing::warn!(job_id = %id, state = ?current.state, "job exited after reaching a terminal state");
            return Ok(());
        }
        match self.store.update_record_state(id, JobState::Completed) {
            Ok(()) => {
                tracing::info!(job_id = %id, written, "job completed");
                Ok(())
            }
            Err(err @ JobError::IllegalStateChange { .. }) => {
                tracing::warn!(job_id = %id, error = %err, "job finalized concurrently");
                Ok(())
            }
            Err(err) => Err(err),
        }
    }

    /// Record `err` on the job unless it already reached a terminal state, and hand it back.
    fn record_failure(&self, id: &str, err: JobError) -> JobError {
        tracing::error!(job_id = %id, error = %err, "job failed");
        match self.store.update_record_error_if_active(id, err.to_string()) {
            Ok(true) => {}
            Ok(false) => {
                tracing::debug!(job_id = %id, "job already finished, failure not recorded");
            }
            Err(lookup) => {
                tracing::warn!(job_id = %id, error = %lookup, "failed job has no record");
            }
        }
        err
    }
}

/// Copy process output into the job's buffer until both pipes close.
///
/// A write failure stops writing but keeps draining, so the process is never blocked on a full
/// pipe. The writer is dropped on return, sealing the buffer.
async fn copy_output(
    mut output_rx: mpsc::Receiver<OutputBlob>,
    mut writer: OutputWriter,
) -> io::Result<u64> {
    let mut result = Ok(());
    while let Some(blob) = output_rx.recv().await {
        if result.is_ok() {
            result = writer.write(&blob).await;
        }
    }
    result.map(|()| writer.bytes_written())
}
