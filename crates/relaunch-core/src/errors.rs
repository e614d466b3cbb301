use crate::model::JobKind;
use thiserror::Error;

/// Fatal input errors. These are raised during setup or validation, never
/// retried, and surfaced verbatim to the caller.
#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("No automatic parallelization requested, but the resource options do not specify: {}.", .missing.join(", "))]
    IncompleteParallelizationSpec { missing: Vec<&'static str> },

    #[error("No calculation plugin is registered for job kind '{0}'.")]
    UnsupportedPlugin(JobKind),

    #[error("The calculation plugin for job kind '{kind}' does not provide the required capability '{capability}'.")]
    MissingCapability {
        kind: JobKind,
        capability: &'static str,
    },

    #[error("Invalid mutation path '{path}': {reason}")]
    InvalidMutation { path: String, reason: String },

    #[error("Failed to prepare dataset inputs: {0}")]
    DatasetPreparation(String),
}
