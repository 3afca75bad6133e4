mod arg_parser;
mod client_cli;

use arg_parser::{ArgParser, SubCommand};
use client_cli::ClientCli;

use clap::Parser;
use std::error;

#[tokio::main]
async fn main() -> Result<(), Box<dyn error::Error>> {
    let args = ArgParser::parse();
    let mut client = ClientCli::connect(&args).await?;

    match args.sub_command {
        SubCommand::Start {
            command,
            args: command_args,
        } => client.start_job(&command, &command_args).await,
        SubCommand::Stop { job_id } => client.stop_job(job_id).await,
        SubCommand::Get { job_id } => client.get_job(job_id).await,
        SubCommand::Stream { job_id } => client.stream_output(job_id).await,
    }
}
