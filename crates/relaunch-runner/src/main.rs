use clap::Parser;
use colored::Colorize;

mod backend;
mod cli;
mod commands;
mod error;
mod job_file;

fn main() {
    let args = cli::Cli::parse();
    relaunch_core::logging::init_logging(args.verbose);

    let result = match args.command {
        cli::Commands::Run(run_args) => commands::run::handle_run(run_args),
    };

    if let Err(e) = result {
        eprintln!("{} {}", "Error:".red().bold(), e);
        std::process::exit(1);
    }
}
