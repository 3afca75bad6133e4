use protobuf::{
    remote_jobs_client::RemoteJobsClient, JobInfo, JobQuery, OutputChunk, StartRequest,
    StopRequest,
};
use std::error;
use std::io::Write;
use tonic::transport::{Certificate, Channel, ClientTlsConfig, Identity};
use tonic::Request;

use crate::arg_parser::ArgParser;

type CliResult = Result<(), Box<dyn error::Error>>;

pub struct ClientCli {
    inner: RemoteJobsClient<Channel>,
}

impl ClientCli {
    /// Connect to the server using the client identity named in `args`.
    pub async fn connect(args: &ArgParser) -> Result<Self, Box<dyn error::Error>> {
        let ca_cert = tokio::fs::read(&args.ca_cert).await?;
        let client_cert = tokio::fs::read(&args.cert).await?;
        let client_key = tokio::fs::read(&args.key).await?;

        let tls = ClientTlsConfig::new()
            .domain_name(args.domain.clone())
            .ca_certificate(Certificate::from_pem(ca_cert))
            .identity(Identity::from_pem(client_cert, client_key));
        let channel = Channel::from_shared(args.server.clone())?
            .tls_config(tls)?
            .connect()
            .await?;
        Ok(Self {
            inner: RemoteJobsClient::new(channel),
        })
    }

    pub async fn start_job(&mut self, command: &str, args: &[String]) -> CliResult {
        let request = Request::new(StartRequest {
            command: command.into(),
            args: args.into(),
        });
        let info = self.inner.start_job(request).await?.into_inner();
        println!("Started job id: {}", info.job_id);
        Ok(())
    }

    pub async fn stop_job(&mut self, job_id: String) -> CliResult {
        let request = Request::new(StopRequest { job_id });
        let info = self.inner.stop_job(request).await?.into_inner();
        println!("Stopped job id: {}", info.job_id);
        Ok(())
    }

    pub async fn get_job(&mut self, job_id: String) -> CliResult {
        let request = Request::new(JobQuery { job_id });
        let info = self.inner.get_job_info(request).await?.into_inner();
        println!("{}", format_job_info(&info));
        Ok(())
    }

    /// Copy the job's output to stdout until the server ends the stream.
    pub async fn stream_output(&mut self, job_id: String) -> CliResult {
        let request = Request::new(JobQuery { job_id });
        let mut stream = self.inner.stream_output(request).await?.into_inner();
        let mut stdout = std::io::stdout();
        while let Some(OutputChunk { data }) = stream.message().await? {
            stdout.write_all(&data)?;
            stdout.flush()?;
        }
        Ok(())
    }
}

/// Human readable summary of a job record.
pub fn format_job_info(info: &JobInfo) -> String {
    let owner: String = info.owner.iter().map(|b| format!("{:02x}", b)).collect();
    let mut command = info.command.clone();
    for arg in &info.args {
        command.push(' ');
        command.push_str(arg);
    }
    let mut summary = format!(
        "id:      {}\ncommand: {}\nowner:   {}\nstate:   {:?}",
        info.job_id,
        command,
        owner,
        info.state()
    );
    if !info.error.is_empty() {
        summary.push_str(&format!("\nerror:   {}", info.error));
    }
    summary
}
