mod config;
mod interceptors;
mod services;
mod tls;

use clap::Parser;
use config::ServerConfig;
pub use interceptors::cert::UserExtension;
use joblib::JobRunner;
use protobuf::remote_jobs_server::RemoteJobsServer;
use services::jobservice::RemoteJobsService;
use tls::TlsIdentity;
use tonic::transport::Server;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
    serve(ServerConfig::parse()).await
}

async fn serve(config: ServerConfig) -> Result<(), Box<dyn std::error::Error>> {
    let tls = TlsIdentity::load(&config).await?;
    tokio::fs::create_dir_all(&config.output_dir).await?;

    let job_service = RemoteJobsService::new(JobRunner::new(&config.output_dir));
    let remote_jobs_server =
        RemoteJobsServer::with_interceptor(job_service, interceptors::cert::extract_owner);
    tracing::info!(
        addr = %config.addr,
        output_dir = %config.output_dir.display(),
        "listening"
    );

    Server::builder()
        .tls_config(tls.server_tls_config())?
        .add_service(remote_jobs_server)
        .serve_with_shutdown(config.addr, shutdown_signal())
        .await?;

    tracing::info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("received shutdown signal");
}
