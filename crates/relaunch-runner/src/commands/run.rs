use crate::backend::LocalProcessBackend;
use crate::cli::RunArgs;
use crate::error::CliError;
use crate::job_file::JobFile;
use colored::Colorize;
use relaunch_core::backend::CancellationToken;
use relaunch_core::constants::files;
use relaunch_core::model::{WorkflowOutcome, WorkflowReport};
use relaunch_engine::plugins::{builtin_registry, default_handlers};
use relaunch_engine::RestartController;
use std::sync::Arc;

pub fn handle_run(args: RunArgs) -> Result<(), CliError> {
    let job_file = JobFile::load(&args.job)?;
    let raw = job_file.raw_inputs();
    let settings = job_file.restart_settings(args.max_attempts, args.no_loop_guard);
    let workdir = job_file.workdir(args.workdir);

    println!(
        "- Submitting job '{}' (kind '{}', up to {} attempt(s))...",
        raw.job.to_string().cyan(),
        raw.kind.to_string().cyan(),
        settings.max_attempts
    );

    let backend = Arc::new(LocalProcessBackend::new(
        workdir.clone(),
        job_file.execution.command.clone(),
        job_file.execution.args.clone(),
        &raw.job,
    ));

    let token = CancellationToken::new();
    {
        let token = token.clone();
        ctrlc::set_handler(move || {
            eprintln!("cancellation requested, stopping after the current attempt");
            token.cancel();
        })?;
    }

    let job = raw.job.clone();
    let controller = RestartController::new(raw, backend, builtin_registry(), default_handlers())
        .with_settings(settings)
        .with_cancellation(token);

    let report = controller.run()?;
    write_report(&workdir, &report)?;
    print_summary(&report);

    match &report.outcome {
        WorkflowOutcome::Succeeded { .. } => Ok(()),
        WorkflowOutcome::Failed { exit_status } => Err(CliError::JobFailed {
            job,
            exit_status: exit_status.clone(),
            attempts: report.attempts.len(),
        }),
    }
}

fn write_report(workdir: &std::path::Path, report: &WorkflowReport) -> Result<(), CliError> {
    fs_err::create_dir_all(workdir)?;
    let path = workdir.join(files::REPORT_JSON);
    fs_err::write(&path, serde_json::to_string_pretty(report)?)?;
    tracing::info!("attempt history written to {}", path.display());
    Ok(())
}

fn print_summary(report: &WorkflowReport) {
    for attempt in &report.attempts {
        let verdict = if attempt.outcome.is_success() {
            "ok".green()
        } else {
            attempt
                .outcome
                .failure_kind
                .as_deref()
                .unwrap_or("failed")
                .red()
        };
        println!("  attempt {:>2}: {}", attempt.sequence, verdict);
    }

    match &report.outcome {
        WorkflowOutcome::Succeeded { outputs } => {
            println!(
                "{} after {} attempt(s).",
                "SUCCEEDED".green().bold(),
                report.attempts.len()
            );
            if let Some(folder) = &outputs.remote_folder {
                println!("  results folder: {}", folder.display());
            }
            if let Some(retrieved) = &outputs.retrieved {
                println!("  retrieved artifacts: {}", retrieved.display());
            }
        }
        WorkflowOutcome::Failed { exit_status } => {
            println!(
                "{} after {} attempt(s): {}",
                "FAILED".red().bold(),
                report.attempts.len(),
                exit_status
            );
        }
    }
}
