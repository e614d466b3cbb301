use crate::error::CliError;
use relaunch_core::constants::defaults;
use relaunch_core::model::{JobId, JobKind, RawInputs, ResourceOptions, RestartSource};
use relaunch_engine::{LoopGuardPolicy, RestartSettings};
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// A TOML job file: the job description, parallelization directives, retry
/// policy, and the command the local backend runs per attempt.
#[derive(Debug, Deserialize)]
pub struct JobFile {
    pub job: JobSection,

    #[serde(default)]
    pub resources: ResourceOptions,

    #[serde(default)]
    pub restart: RestartSection,

    pub execution: ExecutionSection,
}

#[derive(Debug, Deserialize)]
pub struct JobSection {
    pub id: String,
    pub kind: String,
    pub structure: Value,

    #[serde(default = "empty_mapping")]
    pub parameters: Value,

    pub settings: Option<BTreeMap<String, Value>>,
    pub pseudo_family: Option<String>,

    #[serde(default)]
    pub pseudos: BTreeMap<String, PathBuf>,

    pub restart_from: Option<PathBuf>,
    pub aux_table: Option<PathBuf>,
}

fn empty_mapping() -> Value {
    Value::Object(serde_json::Map::new())
}

#[derive(Debug, Deserialize)]
pub struct RestartSection {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_loop_guard")]
    pub loop_guard: bool,
}

impl Default for RestartSection {
    fn default() -> Self {
        Self {
            max_attempts: defaults::MAX_ATTEMPTS,
            loop_guard: true,
        }
    }
}

fn default_max_attempts() -> u32 {
    defaults::MAX_ATTEMPTS
}

fn default_loop_guard() -> bool {
    true
}

#[derive(Debug, Deserialize)]
pub struct ExecutionSection {
    pub command: String,

    #[serde(default)]
    pub args: Vec<String>,

    pub workdir: Option<String>,
}

impl JobFile {
    pub fn load(path: &Path) -> Result<Self, CliError> {
        let text = fs_err::read_to_string(path)?;
        Ok(toml::from_str(&text)?)
    }

    pub fn raw_inputs(&self) -> RawInputs {
        RawInputs {
            job: JobId(self.job.id.clone()),
            kind: JobKind(self.job.kind.clone()),
            structure: self.job.structure.clone(),
            parameters: self.job.parameters.clone(),
            options: self.resources.clone(),
            restart_source: self
                .job
                .restart_from
                .clone()
                .map(|folder| RestartSource { folder }),
            settings: self.job.settings.clone(),
            pseudo_family: self.job.pseudo_family.clone(),
            pseudos: self.job.pseudos.clone(),
            aux_table: self.job.aux_table.clone(),
        }
    }

    pub fn restart_settings(
        &self,
        max_attempts_override: Option<u32>,
        no_loop_guard: bool,
    ) -> RestartSettings {
        let loop_guard = if no_loop_guard || !self.restart.loop_guard {
            LoopGuardPolicy::Disabled
        } else {
            LoopGuardPolicy::ConsecutiveKindAndPriority
        };
        RestartSettings {
            max_attempts: max_attempts_override.unwrap_or(self.restart.max_attempts),
            loop_guard,
        }
    }

    /// CLI override first, then the job file's workdir (with `~` expanded),
    /// then `./work/<job id>`.
    pub fn workdir(&self, cli_override: Option<PathBuf>) -> PathBuf {
        if let Some(dir) = cli_override {
            return dir;
        }
        if let Some(dir) = &self.execution.workdir {
            return PathBuf::from(shellexpand::tilde(dir).into_owned());
        }
        PathBuf::from("work").join(&self.job.id)
    }
}
