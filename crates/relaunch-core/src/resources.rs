use crate::errors::ValidationError;
use crate::model::ResourceOptions;

pub const NUM_MACHINES: &str = "num_machines";
pub const MAX_WALLCLOCK_SECONDS: &str = "max_wallclock_seconds";

/// Checks the parallelization directives once, before the first submission.
/// Automatic parallelization needs nothing further; otherwise both a machine
/// count and a wall-clock limit are required. Resource directives are never
/// corrected by error handlers, so this does not run again during retries.
pub fn validate_parallelization(options: &ResourceOptions) -> Result<(), ValidationError> {
    if options.automatic {
        return Ok(());
    }

    let mut missing = Vec::new();
    if options.num_machines.is_none() {
        missing.push(NUM_MACHINES);
    }
    if options.max_wallclock_seconds.is_none() {
        missing.push(MAX_WALLCLOCK_SECONDS);
    }

    if missing.is_empty() {
        Ok(())
    } else {
        Err(ValidationError::IncompleteParallelizationSpec { missing })
    }
}
