use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

#[derive(Debug, Clone, Eq, PartialEq, Hash, Serialize, Deserialize, Ord, PartialOrd)]
pub struct JobId(pub String);

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for JobId {
    fn from(s: String) -> Self {
        JobId(s)
    }
}

impl FromStr for JobId {
    type Err = std::convert::Infallible;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(JobId(s.to_string()))
    }
}

/// Identifier of the calculation plugin a job is driven by, e.g. "plane-wave".
#[derive(Debug, Clone, Eq, PartialEq, Hash, Serialize, Deserialize, Ord, PartialOrd)]
pub struct JobKind(pub String);

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for JobKind {
    fn from(s: String) -> Self {
        JobKind(s)
    }
}

impl FromStr for JobKind {
    type Err = std::convert::Infallible;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(JobKind(s.to_string()))
    }
}

/// Parallelization directives supplied by the caller. Either `automatic` is
/// requested, or both a machine count and a wall-clock limit must be given.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ResourceOptions {
    #[serde(default)]
    pub automatic: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub num_machines: Option<u32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_wallclock_seconds: Option<u64>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, Value>,
}

/// Reference to a prior attempt's remote output folder, used to resume a
/// calculation instead of starting from scratch.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RestartSource {
    pub folder: PathBuf,
}

/// The immutable input set supplied by the caller. Created once at workflow
/// start; the controller only ever reads it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RawInputs {
    pub job: JobId,
    pub kind: JobKind,
    pub structure: Value,
    pub parameters: Value,
    pub options: ResourceOptions,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub restart_source: Option<RestartSource>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub settings: Option<BTreeMap<String, Value>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub pseudo_family: Option<String>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub pseudos: BTreeMap<String, PathBuf>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub aux_table: Option<PathBuf>,
}

/// The mutable per-attempt copy of the inputs. Rebuilt from [`RawInputs`] at
/// the start of every retry; never shares storage with it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkingInputs {
    pub job: JobId,
    pub kind: JobKind,
    pub structure: Value,
    pub parameters: Value,
    pub settings: BTreeMap<String, Value>,
    pub options: ResourceOptions,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub restart_source: Option<RestartSource>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub datasets: BTreeMap<String, PathBuf>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub aux_table: Option<PathBuf>,
}

impl WorkingInputs {
    /// Independent copy of the raw inputs merged with defaults: empty
    /// settings mapping if absent, no resolved datasets yet.
    pub fn from_raw(raw: &RawInputs) -> Self {
        Self {
            job: raw.job.clone(),
            kind: raw.kind.clone(),
            structure: raw.structure.clone(),
            parameters: raw.parameters.clone(),
            settings: raw.settings.clone().unwrap_or_default(),
            options: raw.options.clone(),
            restart_source: raw.restart_source.clone(),
            datasets: BTreeMap::new(),
            aux_table: raw.aux_table.clone(),
        }
    }
}

/// A corrective instruction proposed by an error handler: a dotted field
/// path inside the `parameters.` or `settings.` section plus the new value.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Mutation {
    pub path: String,
    pub value: Value,
}

impl Mutation {
    pub fn new(path: impl Into<String>, value: Value) -> Self {
        Self {
            path: path.into(),
            value,
        }
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutcomeStatus {
    Success,
    Failure,
    Exception,
}

impl fmt::Display for OutcomeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutcomeStatus::Success => write!(f, "success"),
            OutcomeStatus::Failure => write!(f, "failure"),
            OutcomeStatus::Exception => write!(f, "exception"),
        }
    }
}

/// Terminal verdict of one submission, as reported by the execution backend.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Outcome {
    pub status: OutcomeStatus,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_kind: Option<String>,

    #[serde(default)]
    pub payload: Value,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote_folder: Option<PathBuf>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub retrieved: Option<PathBuf>,
}

impl Outcome {
    pub fn success(payload: Value) -> Self {
        Self {
            status: OutcomeStatus::Success,
            failure_kind: None,
            payload,
            remote_folder: None,
            retrieved: None,
        }
    }

    pub fn failure(kind: impl Into<String>) -> Self {
        Self {
            status: OutcomeStatus::Failure,
            failure_kind: Some(kind.into()),
            payload: Value::Null,
            remote_folder: None,
            retrieved: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == OutcomeStatus::Success
    }
}

/// Terminal failure codes surfaced to the caller.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(tag = "code", content = "detail", rename_all = "kebab-case")]
pub enum ExitStatus {
    UnhandledFailure,
    MaxAttemptsExceeded,
    RepeatedFailure,
    Cancelled,
    Unrecoverable(String),
}

impl fmt::Display for ExitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExitStatus::UnhandledFailure => write!(f, "unhandled-failure"),
            ExitStatus::MaxAttemptsExceeded => write!(f, "max-attempts-exceeded"),
            ExitStatus::RepeatedFailure => write!(f, "repeated-failure"),
            ExitStatus::Cancelled => write!(f, "cancelled"),
            ExitStatus::Unrecoverable(reason) => write!(f, "unrecoverable: {}", reason),
        }
    }
}

/// Result of classifying one failed attempt. Exactly one handler's report
/// (the first that sets `handled`) governs the response; `priority` records
/// which handler that was.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ErrorHandlerReport {
    pub handled: bool,
    pub do_break: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_status: Option<ExitStatus>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<Mutation>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<u32>,
}

impl ErrorHandlerReport {
    /// The default report when no registered handler claims a failure.
    pub fn unhandled() -> Self {
        Self {
            handled: false,
            do_break: true,
            exit_status: Some(ExitStatus::UnhandledFailure),
            action: None,
            priority: None,
        }
    }

    pub fn retry_with(action: Mutation) -> Self {
        Self {
            handled: true,
            do_break: false,
            exit_status: None,
            action: Some(action),
            priority: None,
        }
    }

    pub fn retry() -> Self {
        Self {
            handled: true,
            do_break: false,
            exit_status: None,
            action: None,
            priority: None,
        }
    }

    pub fn abort(exit_status: ExitStatus) -> Self {
        Self {
            handled: true,
            do_break: true,
            exit_status: Some(exit_status),
            action: None,
            priority: None,
        }
    }
}

/// One entry per submission attempt, append-only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttemptRecord {
    pub sequence: u32,
    pub inputs: WorkingInputs,
    pub outcome: Outcome,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub report: Option<ErrorHandlerReport>,

    pub submitted_at: DateTime<Local>,
}

/// Output handles exposed to the caller on success.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JobOutputs {
    pub results: Value,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote_folder: Option<PathBuf>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub retrieved: Option<PathBuf>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub secondary: BTreeMap<String, Value>,
}

impl JobOutputs {
    pub fn from_outcome(outcome: &Outcome) -> Self {
        let secondary = outcome
            .payload
            .get("secondary")
            .and_then(Value::as_object)
            .map(|map| map.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
            .unwrap_or_default();
        Self {
            results: outcome.payload.clone(),
            remote_folder: outcome.remote_folder.clone(),
            retrieved: outcome.retrieved.clone(),
            secondary,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum WorkflowOutcome {
    Succeeded { outputs: JobOutputs },
    Failed { exit_status: ExitStatus },
}

/// Final result of one workflow instance: the terminal outcome plus the
/// full attempt history for diagnosis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowReport {
    pub outcome: WorkflowOutcome,
    pub attempts: Vec<AttemptRecord>,
}

impl WorkflowReport {
    pub fn is_success(&self) -> bool {
        matches!(self.outcome, WorkflowOutcome::Succeeded { .. })
    }

    pub fn exit_status(&self) -> Option<&ExitStatus> {
        match &self.outcome {
            WorkflowOutcome::Succeeded { .. } => None,
            WorkflowOutcome::Failed { exit_status } => Some(exit_status),
        }
    }
}
