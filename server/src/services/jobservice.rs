use crate::UserExtension;
use futures::Stream;
use joblib::types::{new_job_id, Owner};
use joblib::{Command, Job, JobError, JobRunner, JobState};
use protobuf::remote_jobs_server::RemoteJobs;
use protobuf::{JobInfo, JobQuery, OutputChunk, StartRequest, StopRequest};
use std::pin::Pin;
use tokio::select;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tonic::{Request, Response, Status};

/// How many output chunks may queue up per streaming client.
const OUTPUT_STREAM_CAPACITY: usize = 16;

// tonic wraps this in Arc anyway internally, so we don't need Arc
pub struct RemoteJobsService {
    runner: JobRunner,
}

impl RemoteJobsService {
    pub fn new(runner: JobRunner) -> Self {
        Self { runner }
    }

    /// Look up a job on behalf of `caller`, who must own it.
    fn owned_job(&self, caller: &Owner, job_id: &str) -> Result<Job, Status> {
        let job = self.runner.get_job(job_id).map_err(job_error_status)?;
        if !job.is_owned_by(caller) {
            tracing::warn!(job_id, caller = %caller, "rejected access to job owned by someone else");
            return Err(Status::permission_denied("Permission denied"));
        }
        Ok(job)
    }
}

fn caller<T>(req: &Request<T>) -> Result<Owner, Status> {
    req.extensions()
        .get::<UserExtension>()
        .map(|user| user.owner.clone())
        .ok_or_else(|| Status::unauthenticated("Request missing caller identity"))
}

/// Map a job error to the status code the client sees.
fn job_error_status(err: JobError) -> Status {
    match err {
        JobError::NotFound(id) => Status::not_found(format!("Cannot find job with ID: {}", id)),
        JobError::IllegalStateChange { .. } | JobError::NotStarted | JobError::TerminalJob => {
            Status::failed_precondition(err.to_string())
        }
        JobError::Cancelled => Status::cancelled(err.to_string()),
        _ => Status::internal(err.to_string()),
    }
}

fn job_info(job: &Job) -> JobInfo {
    let state = match job.state {
        JobState::Created => protobuf::JobState::Created,
        JobState::Running => protobuf::JobState::Running,
        JobState::Stopped => protobuf::JobState::Stopped,
        JobState::Completed => protobuf::JobState::Completed,
        JobState::Error => protobuf::JobState::Error,
    };
    JobInfo {
        job_id: job.id.clone(),
        command: job.command.program.clone(),
        args: job.command.args.clone(),
        owner: job.owner.to_bytes_be(),
        state: state.into(),
        error: job.error.clone().unwrap_or_default(),
    }
}

#[tonic::async_trait]
impl RemoteJobs for RemoteJobsService {
    type StreamOutputStream = Pin<Box<dyn Stream<Item = Result<OutputChunk, Status>> + Send>>;

    async fn start_job(&self, req: Request<StartRequest>) -> Result<Response<JobInfo>, Status> {
        let owner = caller(&req)?;
        let StartRequest { command, args } = req.into_inner();
        if command.is_empty() {
            return Err(Status::invalid_argument("Command cannot be empty"));
        }

        let job = self
            .runner
            .create_job(new_job_id(), owner, Command::new(command, args));
        tracing::info!(job_id = %job.id, owner = %job.owner, "job created");
        self.runner.spawn_job(job.clone());
        Ok(Response::new(job_info(&job)))
    }

    async fn stop_job(&self, req: Request<StopRequest>) -> Result<Response<JobInfo>, Status> {
        let owner = caller(&req)?;
        let job_id = req.into_inner().job_id;
        self.owned_job(&owner, &job_id)?;

        self.runner
            .stop_job(&job_id)
            .await
            .map_err(job_error_status)?;
        let job = self.runner.get_job(&job_id).map_err(job_error_status)?;
        Ok(Response::new(job_info(&job)))
    }

    async fn get_job_info(&self, req: Request<JobQuery>) -> Result<Response<JobInfo>, Status> {
        let owner = caller(&req)?;
        let job = self.owned_job(&owner, &req.get_ref().job_id)?;
        Ok(Response::new(job_info(&job)))
    }

    async fn stream_output(
        &self,
        req: Request<JobQuery>,
    ) -> Result<Response<Self::StreamOutputStream>, Status> {
        let owner = caller(&req)?;
        let job_id = req.into_inner().job_id;
        self.owned_job(&owner, &job_id)?;

        let (response_tx, response_rx) = mpsc::channel(OUTPUT_STREAM_CAPACITY);
        let runner = self.runner.clone();
        tokio::spawn(async move {
            let cancel = CancellationToken::new();
            let (blob_tx, mut blob_rx) = mpsc::channel(OUTPUT_STREAM_CAPACITY);
            let streaming = runner.stream_output(&job_id, blob_tx, cancel.clone());
            let forwarding = async {
                loop {
                    select! {
                        // client went away while the job is quiet
                        _ = response_tx.closed() => break,
                        maybe_blob = blob_rx.recv() => match maybe_blob {
                            Some(blob) => {
                                let chunk = OutputChunk { data: blob.to_vec() };
                                if response_tx.send(Ok(chunk)).await.is_err() {
                                    break;
                                }
                            }
                            None => break,
                        },
                    }
                }
                cancel.cancel();
            };

            let (result, ()) = tokio::join!(streaming, forwarding);
            match result {
                Ok(()) => tracing::debug!(job_id = %job_id, "output stream finished"),
                Err(err @ (JobError::Cancelled | JobError::StreamClosed)) => {
                    tracing::debug!(job_id = %job_id, reason = %err, "output stream closed by client")
                }
                Err(err) => {
                    tracing::error!(job_id = %job_id, error = %err, "output stream failed");
                    let _ = response_tx.send(Err(job_error_status(err))).await;
                }
            }
        });

        let response_stream = ReceiverStream::new(response_rx);
        Ok(Response::new(
            Box::pin(response_stream) as Self::StreamOutputStream
        ))
    }
}
