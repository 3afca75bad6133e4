use crate::actors::worker::WorkerHandle;
use crate::error::{JobError, Result};
use crate::job::{Command, Job, JobState};
use crate::output::OutputBuffer;
use crate::types::{JobId, Owner};
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// In-memory table of job records.
///
/// Every operation takes the table lock for its whole duration, so a caller never observes a
/// partially updated record and state checks are atomic with the writes that depend on them.
#[derive(Debug, Default)]
pub struct JobStore {
    jobs: RwLock<HashMap<JobId, Job>>,
}

impl JobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a new record. A reused id silently replaces the previous record.
    pub fn create_record(
        &self,
        id: JobId,
        command: Command,
        owner: Owner,
        state: JobState,
        error: Option<String>,
    ) -> Job {
        let job = Job {
            id: id.clone(),
            command,
            owner,
            state,
            error,
            output: None,
            process: None,
        };
        self.write().insert(id, job.clone());
        job
    }

    /// Snapshot of the record for `id`.
    pub fn get_record(&self, id: &str) -> Result<Job> {
        self.read()
            .get(id)
            .cloned()
            .ok_or_else(|| JobError::NotFound(id.to_string()))
    }

    /// Move a job to `state`. Fails if the job already reached a terminal state.
    pub fn update_record_state(&self, id: &str, state: JobState) -> Result<()> {
        self.update(id, |job| {
            if job.state.is_terminal() {
                return Err(JobError::IllegalStateChange {
                    id: job.id.clone(),
                    from: job.state,
                    to: state,
                });
            }
            job.state = state;
            Ok(())
        })
    }

    pub fn update_record_output(&self, id: &str, output: OutputBuffer) -> Result<()> {
        self.update(id, |job| {
            job.output = Some(output);
            Ok(())
        })
    }

    pub(crate) fn update_record_process(&self, id: &str, process: WorkerHandle) -> Result<()> {
        self.update(id, |job| {
            job.process = Some(process);
            Ok(())
        })
    }

    /// Record a failure. This always moves the job to [`JobState::Error`], since entering
    /// `Error` is itself the terminal transition.
    pub fn update_record_error(&self, id: &str, error: impl Into<String>) -> Result<()> {
        let error = error.into();
        self.update(id, |job| {
            job.error = Some(error);
            job.state = JobState::Error;
            Ok(())
        })
    }

    /// Record a failure unless the job already reached a terminal state.
    ///
    /// Returns whether the failure was recorded.
    pub fn update_record_error_if_active(
        &self,
        id: &str,
        error: impl Into<String>,
    ) -> Result<bool> {
        let error = error.into();
        self.update(id, |job| {
            if job.state.is_terminal() {
                return Ok(false);
            }
            job.error = Some(error);
            job.state = JobState::Error;
            Ok(true)
        })
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    fn update<T>(&self, id: &str, f: impl FnOnce(&mut Job) -> Result<T>) -> Result<T> {
        let mut jobs = self.write();
        let job = jobs
            .get_mut(id)
            .ok_or_else(|| JobError::NotFound(id.to_string()))?;
        f(job)
    }

    // a panic while holding the lock can't leave a record half-written, so poisoning is ignored
    fn read(&self) -> RwLockReadGuard<'_, HashMap<JobId, Job>> {
        self.jobs.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<JobId, Job>> {
        self.jobs.write().unwrap_or_else(PoisonError::into_inner)
    }
}
