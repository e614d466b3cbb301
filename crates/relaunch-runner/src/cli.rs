use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "relaunch",
    version,
    about = "Submit a computational job and restart it with corrected parameters until it succeeds.",
    long_about = "This tool reads a TOML job file, submits the job to an execution backend, and \
                  drives the restart loop: failed attempts are diagnosed by error handlers, which \
                  may correct the inputs before the next submission."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(short, long, action = clap::ArgAction::Count, global = true, help = "Increase verbosity level (-v for debug, -vv for trace)")]
    pub verbose: u8,
}

#[derive(Subcommand)]
pub enum Commands {
    #[command(about = "Run a job file through the restart loop")]
    Run(RunArgs),
}

#[derive(Args)]
pub struct RunArgs {
    #[arg(help = "Path to the TOML job file")]
    pub job: PathBuf,

    #[arg(
        long,
        help = "Working directory for attempt outputs (overrides the job file)"
    )]
    pub workdir: Option<PathBuf>,

    #[arg(long, help = "Maximum number of submission attempts")]
    pub max_attempts: Option<u32>,

    #[arg(long, help = "Disable the repeated-failure loop guard")]
    pub no_loop_guard: bool,
}
