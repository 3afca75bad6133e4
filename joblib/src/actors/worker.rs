mod actor;
mod messages;

use crate::job::Command;
use crate::types::{JobId, OutputBlob};
use actor::Actor;
use messages::WorkerMessage;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::{io, process::ExitStatus, process::Stdio};
use tokio::{
    process,
    sync::{mpsc, oneshot},
};

/// How a job's process ended.
#[derive(Debug)]
pub struct ExitReport {
    pub status: io::Result<ExitStatus>,
    /// A stop request delivered a kill signal before the process was reaped.
    pub stopped: bool,
}

/// What a stop request found when it reached the worker.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StopOutcome {
    /// This request delivered the kill signal.
    Killed,
    /// The process had already exited on its own.
    Exited,
    /// An earlier stop request already claimed the process.
    AlreadyRequested,
}

/// Handle to the actor that owns a job's child process.
///
/// The actor pipes the child's stdout and stderr into the output channel concurrently, serves
/// stop requests, and reports the exit status once the child has been reaped.
#[derive(Clone, Debug)]
pub struct WorkerHandle {
    sender: mpsc::UnboundedSender<WorkerMessage>,
    stop_requested: Arc<AtomicBool>,
}

impl WorkerHandle {
    pub fn spawn(
        job_id: JobId,
        command: &Command,
        output_tx: mpsc::Sender<OutputBlob>,
    ) -> io::Result<(Self, oneshot::Receiver<ExitReport>)> {
        let child = process::Command::new(&command.program)
            .args(&command.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;
        let (sender, inbox) = mpsc::unbounded_channel();
        let (exit_tx, exit_rx) = oneshot::channel();
        Actor::spawn(job_id, inbox, child, output_tx, exit_tx);
        let handle = Self {
            sender,
            stop_requested: Arc::new(AtomicBool::new(false)),
        };
        Ok((handle, exit_rx))
    }

    /// Ask the worker to kill its process.
    ///
    /// Only the first request on a job is forwarded to the worker. Once forwarded, the kill is
    /// delivered even if the caller stops waiting for the reply.
    pub async fn stop(&self) -> io::Result<StopOutcome> {
        if self.stop_requested.swap(true, Ordering::SeqCst) {
            return Ok(StopOutcome::AlreadyRequested);
        }
        let (tx, rx) = oneshot::channel();
        if self.sender.send(WorkerMessage::Stop { response: tx }).is_err() {
            // worker is gone, so the child was already reaped
            return Ok(StopOutcome::Exited);
        }
        match rx.await {
            Ok(Ok(true)) => Ok(StopOutcome::Killed),
            // reaped before the request was served
            Ok(Ok(false)) | Err(_) => Ok(StopOutcome::Exited),
            Ok(Err(err)) => Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::process::ExitStatusExt;

    async fn collect(mut output_rx: mpsc::Receiver<OutputBlob>) -> Vec<u8> {
        let mut bytes = vec![];
        while let Some(blob) = output_rx.recv().await {
            bytes.extend(blob);
        }
        bytes
    }

    #[tokio::test]
    async fn pipes_stdout_and_stderr() {
        let (output_tx, output_rx) = mpsc::channel(8);
        let command = Command::new("sh", ["-c", "printf out; printf err 1>&2"]);
        let (_worker, exit_rx) =
            WorkerHandle::spawn("w1".into(), &command, output_tx).expect("spawn");
        let output = String::from_utf8(collect(output_rx).await).unwrap();
        assert_eq!(output.len(), 6);
        assert!(output.contains("out"));
        assert!(output.contains("err"));

        let report = exit_rx.await.unwrap();
        assert!(report.status.unwrap().success());
        assert!(!report.stopped);
    }

    #[tokio::test]
    async fn stop_kills_process() {
        let (output_tx, output_rx) = mpsc::channel(8);
        let command = Command::new("sleep", ["10"]);
        let (worker, exit_rx) =
            WorkerHandle::spawn("w2".into(), &command, output_tx).expect("spawn");
        assert_eq!(worker.stop().await.expect("stop"), StopOutcome::Killed);
        assert!(collect(output_rx).await.is_empty());

        let report = exit_rx.await.unwrap();
        assert!(report.stopped);
        assert_eq!(report.status.unwrap().signal(), Some(9));

        // only the first request is forwarded
        assert_eq!(
            worker.stop().await.expect("second stop"),
            StopOutcome::AlreadyRequested
        );
    }

    #[tokio::test]
    async fn stop_after_exit_reports_exited() {
        let (output_tx, output_rx) = mpsc::channel(8);
        let command = Command::new("true", Vec::<String>::new());
        let (worker, exit_rx) =
            WorkerHandle::spawn("w4".into(), &command, output_tx).expect("spawn");
        collect(output_rx).await;
        let report = exit_rx.await.unwrap();
        assert!(!report.stopped);

        assert_eq!(worker.stop().await.expect("stop"), StopOutcome::Exited);
    }

    #[tokio::test]
    async fn missing_program_fails_to_spawn() {
        let (output_tx, _output_rx) = mpsc::channel(8);
        let command = Command::new("/nonexistent/program", Vec::<String>::new());
        assert!(WorkerHandle::spawn("w3".into(), &command, output_tx).is_err());
    }
}
