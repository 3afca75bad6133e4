use crate::job::JobState;
use crate::types::JobId;
use std::{io, process::ExitStatus, result};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum JobError {
    #[error("no such job exists: {0}")]
    NotFound(JobId),
    #[error("illegal state change for job {id}: {from:?} -> {to:?}")]
    IllegalStateChange {
        id: JobId,
        from: JobState,
        to: JobState,
    },
    #[error("cannot stop a job that was never started")]
    NotStarted,
    #[error("cannot stop a job in a terminal state")]
    TerminalJob,
    #[error("failed to start process: {0}")]
    ProcessStart(#[source] io::Error),
    #[error("failed to signal process: {0}")]
    ProcessSignal(#[source] io::Error),
    #[error("failed to wait for process: {0}")]
    ProcessWait(#[source] io::Error),
    #[error("process failed with {0}")]
    ProcessExit(ExitStatus),
    #[error("job output i/o error: {0}")]
    OutputIo(#[from] io::Error),
    #[error("output stream cancelled")]
    Cancelled,
    #[error("output stream receiver closed")]
    StreamClosed,
}

pub type Result<T> = result::Result<T, JobError>;
