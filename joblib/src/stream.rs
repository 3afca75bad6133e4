//! Live tailing of a job's output buffer.
//!
//! A consumer polls the job's output file from offset 0, forwarding whatever bytes are available,
//! and only finishes once the job is terminal and the buffer has been fully drained. Any number of
//! consumers can tail the same job concurrently; each one gets its own file handle.

use crate::error::{JobError, Result};
use crate::output::OutputBuffer;
use crate::store::JobStore;
use crate::types::OutputBlob;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::select;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Upper bound on the size of a single forwarded chunk.
pub const CHUNK_SIZE: usize = 16_000;

/// Backoff between reads that hit end-of-file on a job that is still running.
pub const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Stream the output of `job_id` into `sink` until the job is done or the caller cancels.
///
/// Returns [`JobError::Cancelled`] when `cancel` fires and [`JobError::StreamClosed`] when the
/// receiving half of `sink` goes away. Neither affects the job itself.
pub async fn stream_output(
    store: &JobStore,
    job_id: &str,
    sink: mpsc::Sender<OutputBlob>,
    cancel: CancellationToken,
) -> Result<()> {
    let output = match wait_for_output(store, job_id, &cancel).await? {
        Some(output) => output,
        // the job ended before it ever produced an output buffer
        None => return Ok(()),
    };
    let mut reader = output.open_reader().await?;
    let mut chunk = vec![0u8; CHUNK_SIZE];

    loop {
        if cancel.is_cancelled() {
            return Err(JobError::Cancelled);
        }

        // Sampled before the read: once the job is terminal and the writer is gone, an empty
        // read really is the end of the output.
        let finished = store.get_record(job_id)?.state.is_terminal() && output.is_sealed();

        let n = reader.read(&mut chunk).await?;
        if n == 0 {
            if finished {
                tracing::debug!(job_id, "output stream drained");
                return Ok(());
            }
            backoff(&cancel).await?;
            continue;
        }

        let blob = OutputBlob::copy_from_slice(&chunk[..n]);
        select! {
            _ = cancel.cancelled() => return Err(JobError::Cancelled),
            sent = sink.send(blob) => sent.map_err(|_| JobError::StreamClosed)?,
        }
    }
}

/// Wait until the runner attaches an output buffer to the job.
///
/// Yields `None` if the job became terminal without one (e.g. the output file couldn't be created).
async fn wait_for_output(
    store: &JobStore,
    job_id: &str,
    cancel: &CancellationToken,
) -> Result<Option<OutputBuffer>> {
    loop {
        let job = store.get_record(job_id)?;
        if let Some(output) = job.output {
            return Ok(Some(output));
        }
        if job.state.is_terminal() {
            return Ok(None);
        }
        backoff(cancel).await?;
    }
}

async fn backoff(cancel: &CancellationToken) -> Result<()> {
    select! {
        _ = cancel.cancelled() => Err(JobError::Cancelled),
        _ = tokio::time::sleep(POLL_INTERVAL) => Ok(()),
    }
}
