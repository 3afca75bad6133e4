use crate::actors::worker::WorkerHandle;
use crate::output::OutputBuffer;
use crate::types::{Args, JobId, Owner, Program};

/// Lifecycle state of a job.
///
/// Variants are declared in ordinal order: `Created < Running < {Stopped, Completed, Error}`.
/// Everything past `Running` is terminal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum JobState {
    Created,
    Running,
    Stopped,
    Completed,
    Error,
}

impl JobState {
    pub fn is_terminal(self) -> bool {
        self > JobState::Running
    }
}

/// The executable and argument vector a job runs.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Command {
    pub program: Program,
    pub args: Args,
}

impl Command {
    pub fn new<P, I, A>(program: P, args: I) -> Self
    where
        P: Into<Program>,
        I: IntoIterator<Item = A>,
        A: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }
}

/// A snapshot of a job record as held by the [`JobStore`](crate::store::JobStore).
#[derive(Clone, Debug)]
pub struct Job {
    pub id: JobId,
    pub command: Command,
    pub owner: Owner,
    pub state: JobState,
    pub error: Option<String>,
    pub output: Option<OutputBuffer>,
    pub(crate) process: Option<WorkerHandle>,
}

impl Job {
    /// Whether a process has been launched for this job.
    pub fn is_started(&self) -> bool {
        self.process.is_some()
    }

    pub fn is_owned_by(&self, owner: &Owner) -> bool {
        self.owner == *owner
    }
}
