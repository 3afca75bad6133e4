use super::messages::WorkerMessage;
use super::ExitReport;
use crate::types::{JobId, OutputBlob};

use bytes::BytesMut;
use std::io;
use tokio::{
    io::{AsyncRead, AsyncReadExt},
    process::Child,
    select,
    sync::{mpsc, oneshot},
};

const PIPE_READ_CAPACITY: usize = 4096;

pub struct Actor {
    job_id: JobId,
    inbox: mpsc::UnboundedReceiver<WorkerMessage>,
    inbox_open: bool,
    child: Child,
    stopped: bool,
}

impl Actor {
    pub fn spawn(
        job_id: JobId,
        inbox: mpsc::UnboundedReceiver<WorkerMessage>,
        mut child: Child,
        output_tx: mpsc::Sender<OutputBlob>,
        exit_tx: oneshot::Sender<ExitReport>,
    ) {
        // pipe stdout and stderr concurrently, so a full pipe on one side can't stall the child
        if let Some(stdout) = child.stdout.take() {
            tokio::spawn(pump(job_id.clone(), stdout, output_tx.clone()));
        }
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(pump(job_id.clone(), stderr, output_tx));
        }

        let actor = Self {
            job_id,
            inbox,
            inbox_open: true,
            child,
            stopped: false,
        };
        tokio::spawn(async move { actor.run(exit_tx).await });
    }

    async fn run(mut self, exit_tx: oneshot::Sender<ExitReport>) {
        let status = loop {
            select! {
                maybe_msg = self.inbox.recv(), if self.inbox_open => {
                    match maybe_msg {
                        Some(WorkerMessage::Stop { response }) => {
                            let _ = response.send(self.kill());
                        }
                        // all handles dropped, nobody can stop the job anymore
                        None => self.inbox_open = false,
                    }
                }
                // wait for the child to finish and clean up its resources
                status = self.child.wait() => break status,
            }
        };
        let _ = exit_tx.send(ExitReport {
            status,
            stopped: self.stopped,
        });
    }

    fn kill(&mut self) -> io::Result<bool> {
        match self.child.start_kill() {
            Ok(()) => {
                tracing::debug!(job_id = %self.job_id, "sent kill signal");
                self.stopped = true;
                Ok(true)
            }
            // already exited and reaped
            Err(err) if err.kind() == io::ErrorKind::InvalidInput => Ok(false),
            Err(err) => Err(err),
        }
    }
}

async fn pump<R>(job_id: JobId, mut pipe: R, output_tx: mpsc::Sender<OutputBlob>)
where
    R: AsyncRead + Unpin,
{
    let mut buf = BytesMut::with_capacity(PIPE_READ_CAPACITY);
    loop {
        match pipe.read_buf(&mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                // move the bytes out of buf and into a message
                if output_tx.send(buf.split().freeze()).await.is_err() {
                    break;
                }
                buf.reserve(PIPE_READ_CAPACITY);
            }
            Err(err) => {
                tracing::warn!(job_id = %job_id, error = %err, "failed to read process output");
                break;
            }
        }
    }
}
