use relaunch_core::model::{ExitStatus, JobId};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CliError {
    #[error(transparent)]
    Engine(#[from] relaunch_engine::EngineError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Failed to parse job file: {0}")]
    Toml(#[from] toml::de::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error("Failed to install the Ctrl-C handler: {0}")]
    Ctrlc(#[from] ctrlc::Error),

    #[error("Job '{job}' failed with status '{exit_status}' after {attempts} attempt(s).")]
    JobFailed {
        job: JobId,
        exit_status: ExitStatus,
        attempts: usize,
    },
}
