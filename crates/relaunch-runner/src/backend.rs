use relaunch_core::backend::{BackendError, ExecutionBackend};
use relaunch_core::constants::{dirs, files, markers};
use relaunch_core::model::{JobId, Outcome, OutcomeStatus, WorkingInputs};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::atomic::{AtomicU32, Ordering};
use walkdir::WalkDir;

/// Runs the job command once per submission in a fresh attempt directory
/// and reads the verdict back from marker files: a `SUCCESS` marker means
/// success, a `FAIL` marker carries the failure kind, and a missing marker
/// is reported as an exception. Results are read from `results.json` when
/// the command writes one.
pub struct LocalProcessBackend {
    workdir: PathBuf,
    command: String,
    args: Vec<String>,
    run_tag: String,
    attempt: AtomicU32,
}

impl LocalProcessBackend {
    pub fn new(workdir: PathBuf, command: String, args: Vec<String>, job: &JobId) -> Self {
        let run_tag = format!("{:x}", Sha256::digest(job.0.as_bytes()))
            .chars()
            .take(12)
            .collect();
        Self {
            workdir,
            command,
            args,
            run_tag,
            attempt: AtomicU32::new(0),
        }
    }

    fn read_results(attempt_dir: &Path) -> Value {
        match fs_err::read_to_string(attempt_dir.join(files::RESULTS_JSON)) {
            Ok(text) => serde_json::from_str(&text).unwrap_or_else(|e| {
                tracing::warn!("ignoring malformed results.json: {}", e);
                Value::Null
            }),
            Err(_) => Value::Null,
        }
    }
}

impl ExecutionBackend for LocalProcessBackend {
    fn submit(&self, inputs: &WorkingInputs) -> Result<Outcome, BackendError> {
        let sequence = self.attempt.fetch_add(1, Ordering::SeqCst) + 1;
        let attempt_dir = self
            .workdir
            .join(dirs::ATTEMPTS)
            .join(format!("{:03}-{}", sequence, self.run_tag));
        let out_dir = attempt_dir.join(dirs::OUT);
        fs_err::create_dir_all(&out_dir)?;

        fs_err::write(
            attempt_dir.join(files::INPUTS_JSON),
            serde_json::to_string_pretty(inputs)?,
        )?;

        tracing::info!(
            "running '{}' for attempt {} in {}",
            self.command,
            sequence,
            attempt_dir.display()
        );
        let status = Command::new(&self.command)
            .args(&self.args)
            .current_dir(&attempt_dir)
            .env("RELAUNCH_INPUTS", files::INPUTS_JSON)
            .status()
            .map_err(|source| BackendError::Launch {
                command: self.command.clone(),
                source,
            })?;

        let mut payload = Self::read_results(&attempt_dir);

        if attempt_dir.join(markers::SUCCESS).exists() {
            let retrieved_count = WalkDir::new(&out_dir)
                .into_iter()
                .filter_map(|e| e.ok())
                .filter(|e| e.file_type().is_file())
                .count();
            tracing::debug!(
                "attempt {} succeeded, retrieved {} artifact(s)",
                sequence,
                retrieved_count
            );
            return Ok(Outcome {
                status: OutcomeStatus::Success,
                failure_kind: None,
                payload,
                remote_folder: Some(attempt_dir),
                retrieved: Some(out_dir),
            });
        }

        if let Some(map) = payload.as_object_mut() {
            map.insert("exit_code".to_string(), json!(status.code()));
        } else if payload.is_null() {
            payload = json!({"exit_code": status.code()});
        }

        match fs_err::read_to_string(attempt_dir.join(markers::FAIL)) {
            Ok(marker) => {
                let kind = marker.lines().next().unwrap_or("").trim();
                let kind = if kind.is_empty() {
                    "unknown-failure"
                } else {
                    kind
                };
                Ok(Outcome {
                    status: OutcomeStatus::Failure,
                    failure_kind: Some(kind.to_string()),
                    payload,
                    remote_folder: Some(attempt_dir),
                    retrieved: None,
                })
            }
            Err(_) => Ok(Outcome {
                status: OutcomeStatus::Exception,
                failure_kind: Some("missing-verdict-marker".to_string()),
                payload,
                remote_folder: Some(attempt_dir),
                retrieved: None,
            }),
        }
    }
}
