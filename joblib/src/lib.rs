//! Job execution engine: a concurrent record store, a process lifecycle runner, and file-backed
//! output that can be tailed live by any number of readers.

mod actors;
pub mod error;
pub mod job;
pub mod output;
pub mod runner;
pub mod store;
pub mod stream;
pub mod types;

pub use error::{JobError, Result};
pub use job::{Command, Job, JobState};
pub use runner::JobRunner;
pub use store::JobStore;

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;
    use tokio_util::sync::CancellationToken;

    #[tokio::test]
    async fn basic() {
        let dir = tempfile::tempdir().expect("tempdir");
        let runner = JobRunner::new(dir.path());
        let echo_str = "hello world!";
        let no_trailing_newline = "-n";
        let job = runner.create_job(
            types::new_job_id(),
            types::Owner::from(42u32),
            Command::new("echo", [no_trailing_newline, echo_str]),
        );
        let job_id = job.id.clone();
        runner.spawn_job(job);

        let (tx, mut output) = mpsc::channel(8);
        let streaming = runner.stream_output(&job_id, tx, CancellationToken::new());
        let receiving = async {
            let mut output_bytes = vec![];
            while let Some(blob) = output.recv().await {
                output_bytes.extend(blob);
            }
            output_bytes
        };
        let (result, output_bytes) = tokio::join!(streaming, receiving);
        result.expect("failed to stream output for job");
        assert_eq!(String::from_utf8_lossy(&output_bytes), echo_str);
        assert_eq!(runner.get_job(&job_id).unwrap().state, JobState::Completed);
    }
}
