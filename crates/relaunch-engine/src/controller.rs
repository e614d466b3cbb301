use crate::error::EngineError;
use crate::handlers::ErrorHandlerRegistry;
use chrono::Local;
use relaunch_core::backend::{CancellationToken, ExecutionBackend};
use relaunch_core::capability::PluginRegistry;
use relaunch_core::constants::defaults;
use relaunch_core::model::{
    AttemptRecord, ExitStatus, JobOutputs, Mutation, RawInputs, RestartSource, WorkflowOutcome,
    WorkflowReport,
};
use relaunch_core::resources::validate_parallelization;
use relaunch_core::snapshot::InputSnapshot;
use std::fmt;
use std::sync::Arc;

/// What counts as "the same error twice in a row" for the degenerate-loop
/// guard. The default compares the failure kind together with the priority
/// of the handler that claimed it across consecutive attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoopGuardPolicy {
    #[default]
    ConsecutiveKindAndPriority,
    Disabled,
}

#[derive(Debug, Clone)]
pub struct RestartSettings {
    pub max_attempts: u32,
    pub loop_guard: LoopGuardPolicy,
}

impl Default for RestartSettings {
    fn default() -> Self {
        Self {
            max_attempts: defaults::MAX_ATTEMPTS,
            loop_guard: LoopGuardPolicy::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Setup,
    Validating,
    Preparing,
    Submitting,
    Inspecting,
    Finalizing,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Setup => write!(f, "setup"),
            Phase::Validating => write!(f, "validating"),
            Phase::Preparing => write!(f, "preparing"),
            Phase::Submitting => write!(f, "submitting"),
            Phase::Inspecting => write!(f, "inspecting"),
            Phase::Finalizing => write!(f, "finalizing"),
        }
    }
}

/// Drives one job through setup, validation, and the submit/inspect/correct
/// loop until it succeeds, the retry budget runs out, or a terminal verdict
/// is reached. Collaborators are injected at construction; nothing is
/// registered globally.
pub struct RestartController {
    raw: RawInputs,
    backend: Arc<dyn ExecutionBackend>,
    plugins: Arc<PluginRegistry>,
    handlers: ErrorHandlerRegistry,
    settings: RestartSettings,
    cancellation: CancellationToken,
}

impl RestartController {
    pub fn new(
        raw: RawInputs,
        backend: Arc<dyn ExecutionBackend>,
        plugins: Arc<PluginRegistry>,
        handlers: ErrorHandlerRegistry,
    ) -> Self {
        Self {
            raw,
            backend,
            plugins,
            handlers,
            settings: RestartSettings::default(),
            cancellation: CancellationToken::new(),
        }
    }

    pub fn with_settings(mut self, settings: RestartSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    /// Runs the workflow to completion. Fatal input errors (unsupported
    /// plugin, missing capability, malformed directives or datasets) come
    /// back as `Err` before any attempt is submitted; everything that
    /// happens inside the loop is absorbed into the [`WorkflowReport`].
    pub fn run(self) -> Result<WorkflowReport, EngineError> {
        let job = self.raw.job.clone();

        self.transition(Phase::Setup, &job);
        let table = self.plugins.bind(&self.raw.kind)?;

        self.transition(Phase::Validating, &job);
        let mut snapshot = InputSnapshot::new(self.raw.clone());
        validate_parallelization(&snapshot.raw().options)?;
        {
            let (raw, working) = snapshot.parts_mut();
            table.prepare_dataset_inputs(raw, working)?;
        }

        let mut attempts: Vec<AttemptRecord> = Vec::new();
        let mut approved: Vec<Mutation> = Vec::new();
        let mut restart_source: Option<RestartSource> = None;
        let mut previous_guard: Option<(Option<String>, Option<u32>)> = None;
        let mut verdict: Option<WorkflowOutcome> = None;

        while verdict.is_none() && (attempts.len() as u32) < self.settings.max_attempts {
            if self.cancellation.is_cancelled() {
                tracing::info!("job '{}': cancellation requested, stopping", job);
                verdict = Some(WorkflowOutcome::Failed {
                    exit_status: ExitStatus::Cancelled,
                });
                break;
            }

            let sequence = attempts.len() as u32 + 1;

            self.transition(Phase::Preparing, &job);
            if sequence > 1 {
                snapshot.reset();
                {
                    let (raw, working) = snapshot.parts_mut();
                    table.prepare_dataset_inputs(raw, working)?;
                }
                for mutation in &approved {
                    snapshot.apply(mutation)?;
                }
                if let Some(source) = &restart_source {
                    table.prepare_restart_parameters(snapshot.working_mut(), source);
                }
            }

            self.transition(Phase::Submitting, &job);
            tracing::info!(
                "job '{}': submitting attempt {}/{}",
                job,
                sequence,
                self.settings.max_attempts
            );
            let submitted_at = Local::now();
            let outcome = self.backend.submit(snapshot.working())?;

            self.transition(Phase::Inspecting, &job);
            let mut record = AttemptRecord {
                sequence,
                inputs: snapshot.working().clone(),
                outcome,
                report: None,
                submitted_at,
            };

            if record.outcome.is_success() {
                tracing::info!("job '{}': attempt {} succeeded", job, sequence);
                verdict = Some(WorkflowOutcome::Succeeded {
                    outputs: JobOutputs::from_outcome(&record.outcome),
                });
            } else {
                let report = self.handlers.classify(&record);
                let guard_key = (record.outcome.failure_kind.clone(), report.priority);
                let guard_tripped = self.settings.loop_guard
                    == LoopGuardPolicy::ConsecutiveKindAndPriority
                    && previous_guard.as_ref() == Some(&guard_key);

                if guard_tripped {
                    tracing::warn!(
                        "job '{}': attempt {} repeated the previous failure ({}), stopping",
                        job,
                        sequence,
                        record.outcome.failure_kind.as_deref().unwrap_or("?"),
                    );
                    verdict = Some(WorkflowOutcome::Failed {
                        exit_status: ExitStatus::RepeatedFailure,
                    });
                } else if report.do_break {
                    let exit_status = report
                        .exit_status
                        .clone()
                        .unwrap_or(ExitStatus::UnhandledFailure);
                    tracing::warn!(
                        "job '{}': attempt {} failed terminally ({})",
                        job,
                        sequence,
                        exit_status
                    );
                    verdict = Some(WorkflowOutcome::Failed { exit_status });
                } else {
                    tracing::info!(
                        "job '{}': attempt {} failed ({}), will retry",
                        job,
                        sequence,
                        record.outcome.failure_kind.as_deref().unwrap_or("?"),
                    );
                    if let Some(action) = report.action.clone() {
                        approved.push(action);
                    }
                    restart_source = record
                        .outcome
                        .remote_folder
                        .clone()
                        .map(|folder| RestartSource { folder });
                }

                previous_guard = Some(guard_key);
                record.report = Some(report);
            }

            attempts.push(record);
        }

        self.transition(Phase::Finalizing, &job);
        let outcome = verdict.unwrap_or(WorkflowOutcome::Failed {
            exit_status: ExitStatus::MaxAttemptsExceeded,
        });

        match &outcome {
            WorkflowOutcome::Succeeded { .. } => {
                tracing::info!("job '{}': finished after {} attempt(s)", job, attempts.len())
            }
            WorkflowOutcome::Failed { exit_status } => tracing::warn!(
                "job '{}': failed after {} attempt(s) with status '{}'",
                job,
                attempts.len(),
                exit_status
            ),
        }

        Ok(WorkflowReport { outcome, attempts })
    }

    fn transition(&self, phase: Phase, job: &relaunch_core::model::JobId) {
        tracing::debug!("job '{}': entering {} phase", job, phase);
    }
}
