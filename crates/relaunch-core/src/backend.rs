use crate::model::{Outcome, WorkingInputs};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;

/// Infrastructure faults raised by a backend while submitting, as opposed
/// to job-level failure verdicts, which arrive as ordinary [`Outcome`]s.
#[derive(Error, Debug)]
pub enum BackendError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to launch job command '{command}': {source}")]
    Launch {
        command: String,
        source: std::io::Error,
    },

    #[error("Backend rejected the submission: {0}")]
    Rejected(String),

    #[error("Failed to encode or parse a backend payload: {0}")]
    Payload(#[from] serde_json::Error),
}

/// The remote execution backend as seen by the controller: the single
/// blocking call of the whole loop. The backend runs the job to a terminal
/// verdict; timeouts it enforces come back as failure outcomes.
pub trait ExecutionBackend: Send + Sync {
    fn submit(&self, inputs: &WorkingInputs) -> Result<Outcome, BackendError>;
}

/// Caller-facing cancellation flag. The controller checks it at the top of
/// each loop iteration, never mid-submission.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}
