use relaunch_core::backend::{BackendError, ExecutionBackend};
use relaunch_core::model::{
    JobId, JobKind, Outcome, RawInputs, ResourceOptions, WorkingInputs,
};
use serde_json::json;
use std::collections::{BTreeMap, VecDeque};
use std::path::PathBuf;
use std::sync::Mutex;

/// A backend that replays a scripted sequence of outcomes, one per
/// submission, and records every WorkingInputs it was handed.
pub struct ScriptedBackend {
    outcomes: Mutex<VecDeque<Outcome>>,
    submissions: Mutex<Vec<WorkingInputs>>,
}

impl ScriptedBackend {
    pub fn new(outcomes: Vec<Outcome>) -> Self {
        Self {
            outcomes: Mutex::new(outcomes.into()),
            submissions: Mutex::new(Vec::new()),
        }
    }

    pub fn submissions(&self) -> Vec<WorkingInputs> {
        self.submissions
            .lock()
            .expect("submissions mutex must not be poisoned")
            .clone()
    }

    pub fn submission_count(&self) -> usize {
        self.submissions
            .lock()
            .expect("submissions mutex must not be poisoned")
            .len()
    }
}

impl ExecutionBackend for ScriptedBackend {
    fn submit(&self, inputs: &WorkingInputs) -> Result<Outcome, BackendError> {
        self.submissions
            .lock()
            .expect("submissions mutex must not be poisoned")
            .push(inputs.clone());
        self.outcomes
            .lock()
            .expect("outcomes mutex must not be poisoned")
            .pop_front()
            .ok_or_else(|| BackendError::Rejected("scripted outcomes exhausted".to_string()))
    }
}

/// A plane-wave silicon job with complete explicit parallelization
/// directives, the common starting point for loop tests.
pub fn sample_raw_inputs() -> RawInputs {
    RawInputs {
        job: JobId("si-scf".to_string()),
        kind: JobKind("plane-wave".to_string()),
        structure: json!({"elements": ["Si"]}),
        parameters: json!({"electron_maxstep": 40, "ecutwfc": 60.0}),
        options: ResourceOptions {
            automatic: false,
            num_machines: Some(2),
            max_wallclock_seconds: Some(3600),
            extra: BTreeMap::new(),
        },
        restart_source: None,
        settings: None,
        pseudo_family: Some("pbe-v1".to_string()),
        pseudos: BTreeMap::new(),
        aux_table: None,
    }
}

pub fn success_outcome() -> Outcome {
    let mut outcome = Outcome::success(json!({"total_energy": -31.17}));
    outcome.remote_folder = Some(PathBuf::from("/scratch/si-scf/final"));
    outcome.retrieved = Some(PathBuf::from("/scratch/si-scf/final/out"));
    outcome
}

/// A failure outcome carrying a remote folder, so the next attempt can be
/// prepared as a restart.
pub fn failure_outcome(kind: &str, attempt: u32) -> Outcome {
    let mut outcome = Outcome::failure(kind);
    outcome.remote_folder = Some(PathBuf::from(format!("/scratch/si-scf/attempt-{attempt}")));
    outcome
}
