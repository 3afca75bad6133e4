use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Connect to a remote jobs server over mutual TLS
#[derive(Debug, Parser)]
pub struct ArgParser {
    /// The address of the server
    #[clap(
        short = 's',
        long = "server",
        env = "REMOTEJOBS_SERVER",
        default_value = "https://[::1]:50051"
    )]
    pub server: String,

    /// Domain name the server certificate is issued for
    #[clap(long, env = "REMOTEJOBS_DOMAIN", default_value = "localhost")]
    pub domain: String,

    /// Client certificate (PEM); its serial number identifies you as a job owner
    #[clap(long, env = "REMOTEJOBS_CERT")]
    pub cert: PathBuf,

    /// Client private key (PEM)
    #[clap(long, env = "REMOTEJOBS_KEY")]
    pub key: PathBuf,

    /// CA certificate used to verify the server (PEM)
    #[clap(long, env = "REMOTEJOBS_CA_CERT")]
    pub ca_cert: PathBuf,

    /// The sub-command to use
    #[clap(subcommand)]
    pub sub_command: SubCommand,
}

#[derive(Clone, Debug, PartialEq, Eq, Subcommand)]
pub enum SubCommand {
    /// start a new job; put `--` before the command if it takes flags
    Start {
        /// path or name of the executable to run
        command: String,

        /// arguments passed to the command
        args: Vec<String>,
    },
    /// stop a job
    Stop {
        /// id returned by `start`
        job_id: String,
    },
    /// show a job's state
    Get {
        /// id returned by `start`
        job_id: String,
    },
    /// stream a job's combined output from the beginning
    Stream {
        /// id returned by `start`
        job_id: String,
    },
}
