use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;

/// Serve the remote jobs API over mutual TLS
#[derive(Debug, Parser)]
#[clap(name = "remote-jobs-server", version)]
pub struct ServerConfig {
    /// Address to listen on
    #[clap(long, env = "REMOTEJOBS_ADDR", default_value = "[::1]:50051")]
    pub addr: SocketAddr,

    /// Directory that receives one output file per job
    #[clap(long, env = "REMOTEJOBS_OUTPUT_DIR", default_value = "/var/log/remote-jobs")]
    pub output_dir: PathBuf,

    /// Server certificate (PEM)
    #[clap(long, env = "REMOTEJOBS_CERT")]
    pub cert: PathBuf,

    /// Server private key (PEM)
    #[clap(long, env = "REMOTEJOBS_KEY")]
    pub key: PathBuf,

    /// CA certificate used to verify client certificates (PEM)
    #[clap(long, env = "REMOTEJOBS_CA_CERT")]
    pub ca_cert: PathBuf,
}
