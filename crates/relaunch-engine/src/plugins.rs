use crate::handlers::ErrorHandlerRegistry;
use once_cell::sync::Lazy;
use regex::Regex;
use relaunch_core::capability::{BoundCapability, CalculationPlugin, PluginRegistry};
use relaunch_core::constants::{capabilities, failure_kinds};
use relaunch_core::errors::ValidationError;
use relaunch_core::model::{
    ErrorHandlerReport, ExitStatus, Mutation, RawInputs, WorkingInputs,
};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

/// Fallback parameter values used by correction steps when the job's own
/// parameters are silent. Computed once, read-only afterwards.
pub fn process_defaults() -> &'static BTreeMap<String, Value> {
    static DEFAULTS: Lazy<BTreeMap<String, Value>> = Lazy::new(|| {
        BTreeMap::from([
            ("electron_maxstep".to_string(), json!(80)),
            ("mixing_beta".to_string(), json!(0.4)),
        ])
    });
    &DEFAULTS
}

/// Plugin for plane-wave electronic-structure jobs. Restart preparation
/// points the calculation at the prior attempt's remote folder; dataset
/// preparation resolves one pseudopotential per structure element.
pub struct PlaneWavePlugin;

pub const PLANE_WAVE: &str = "plane-wave";

impl CalculationPlugin for PlaneWavePlugin {
    fn kind(&self) -> &str {
        PLANE_WAVE
    }

    fn capability(&self, name: &str) -> Option<BoundCapability> {
        match name {
            capabilities::PREPARE_RESTART_PARAMETERS => Some(
                BoundCapability::PrepareRestartParameters(Arc::new(|inputs, source| {
                    inputs.restart_source = Some(source.clone());
                    if let Some(params) = inputs.parameters.as_object_mut() {
                        params.insert("restart_mode".to_string(), json!("restart"));
                    }
                })),
            ),
            capabilities::PREPARE_DATASET_INPUTS => Some(BoundCapability::PrepareDatasetInputs(
                Arc::new(prepare_pseudopotential_inputs),
            )),
            _ => None,
        }
    }
}

/// Resolves the pseudopotential binding for every element in the structure.
/// A per-element table entry takes precedence over the family; an element
/// covered by neither is a malformed dataset reference.
fn prepare_pseudopotential_inputs(
    raw: &RawInputs,
    inputs: &mut WorkingInputs,
) -> Result<(), ValidationError> {
    let elements = raw
        .structure
        .get("elements")
        .and_then(Value::as_array)
        .ok_or_else(|| {
            ValidationError::DatasetPreparation(
                "the structure payload does not list its elements".to_string(),
            )
        })?;

    for element in elements {
        let symbol = element.as_str().ok_or_else(|| {
            ValidationError::DatasetPreparation(format!(
                "structure element '{}' is not a symbol",
                element
            ))
        })?;

        let dataset = if let Some(path) = raw.pseudos.get(symbol) {
            path.clone()
        } else if let Some(family) = &raw.pseudo_family {
            PathBuf::from(family).join(format!("{symbol}.upf"))
        } else {
            return Err(ValidationError::DatasetPreparation(format!(
                "no pseudopotential for element '{symbol}': supply a per-element table or a family name"
            )));
        };

        inputs.datasets.insert(symbol.to_string(), dataset);
    }

    Ok(())
}

/// The process-wide plugin registry with the built-in plugins. Resolution is
/// pure metadata lookup, so sharing one instance across workflows is safe.
pub fn builtin_registry() -> Arc<PluginRegistry> {
    static REGISTRY: Lazy<Arc<PluginRegistry>> = Lazy::new(|| {
        let mut registry = PluginRegistry::new();
        registry.register(Arc::new(PlaneWavePlugin));
        Arc::new(registry)
    });
    REGISTRY.clone()
}

static CONVERGENCE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)convergence not (?:achieved|reached)").expect("static pattern must compile")
});

fn mentions_convergence(payload: &Value) -> bool {
    payload
        .get("log")
        .and_then(Value::as_str)
        .is_some_and(|log| CONVERGENCE_RE.is_match(log))
}

/// The built-in diagnosis set for plane-wave jobs, in priority order:
/// electronic convergence (raise the iteration cap and retry), exceeded
/// walltime (retry, resuming from the attempt's remote folder), and
/// unrecoverable input errors (stop immediately).
pub fn default_handlers() -> ErrorHandlerRegistry {
    let mut registry = ErrorHandlerRegistry::new();

    registry.register(100, "electronic-convergence", |attempt| {
        let kind_matches = attempt.outcome.failure_kind.as_deref()
            == Some(failure_kinds::CONVERGENCE_NOT_REACHED);
        if !kind_matches && !mentions_convergence(&attempt.outcome.payload) {
            return None;
        }

        let current = attempt
            .inputs
            .parameters
            .get("electron_maxstep")
            .and_then(Value::as_u64)
            .or_else(|| {
                process_defaults()
                    .get("electron_maxstep")
                    .and_then(Value::as_u64)
            })
            .unwrap_or(80);

        Some(ErrorHandlerReport::retry_with(Mutation::new(
            "parameters.electron_maxstep",
            json!(current * 2),
        )))
    });

    registry.register(200, "walltime-exceeded", |attempt| {
        if attempt.outcome.failure_kind.as_deref() == Some(failure_kinds::WALLTIME_EXCEEDED) {
            // No parameter change; the restart source carries the progress.
            Some(ErrorHandlerReport::retry())
        } else {
            None
        }
    });

    registry.register(900, "input-error", |attempt| {
        if attempt.outcome.failure_kind.as_deref() == Some(failure_kinds::INPUT_ERROR) {
            let reason = attempt
                .outcome
                .payload
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("the backend rejected the input as malformed")
                .to_string();
            Some(ErrorHandlerReport::abort(ExitStatus::Unrecoverable(reason)))
        } else {
            None
        }
    });

    registry
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Local;
    use relaunch_core::model::{
        AttemptRecord, JobId, JobKind, Outcome, ResourceOptions, RestartSource,
    };

    fn raw_with_structure(structure: Value) -> RawInputs {
        RawInputs {
            job: JobId("si-scf".to_string()),
            kind: JobKind(PLANE_WAVE.to_string()),
            structure,
            parameters: json!({"electron_maxstep": 40}),
            options: ResourceOptions {
                automatic: true,
                ..Default::default()
            },
            restart_source: None,
            settings: None,
            pseudo_family: Some("pbe-v1".to_string()),
            pseudos: BTreeMap::new(),
            aux_table: None,
        }
    }

    fn failed_attempt(raw: &RawInputs, outcome: Outcome) -> AttemptRecord {
        AttemptRecord {
            sequence: 1,
            inputs: WorkingInputs::from_raw(raw),
            outcome,
            report: None,
            submitted_at: Local::now(),
        }
    }

    #[test]
    fn test_pseudos_resolved_from_family() {
        let raw = raw_with_structure(json!({"elements": ["Si", "O"]}));
        let mut working = WorkingInputs::from_raw(&raw);
        prepare_pseudopotential_inputs(&raw, &mut working).unwrap();
        assert_eq!(working.datasets["Si"], PathBuf::from("pbe-v1/Si.upf"));
        assert_eq!(working.datasets["O"], PathBuf::from("pbe-v1/O.upf"));
    }

    #[test]
    fn test_per_element_table_wins_over_family() {
        let mut raw = raw_with_structure(json!({"elements": ["Si"]}));
        raw.pseudos
            .insert("Si".to_string(), PathBuf::from("/custom/Si.paw"));
        let mut working = WorkingInputs::from_raw(&raw);
        prepare_pseudopotential_inputs(&raw, &mut working).unwrap();
        assert_eq!(working.datasets["Si"], PathBuf::from("/custom/Si.paw"));
    }

    #[test]
    fn test_uncovered_element_is_a_dataset_error() {
        let mut raw = raw_with_structure(json!({"elements": ["Si"]}));
        raw.pseudo_family = None;
        let mut working = WorkingInputs::from_raw(&raw);
        let err = prepare_pseudopotential_inputs(&raw, &mut working).unwrap_err();
        assert!(matches!(err, ValidationError::DatasetPreparation(_)));
    }

    #[test]
    fn test_structure_without_elements_is_rejected() {
        let raw = raw_with_structure(json!({"cell": [1, 0, 0]}));
        let mut working = WorkingInputs::from_raw(&raw);
        assert!(prepare_pseudopotential_inputs(&raw, &mut working).is_err());
    }

    #[test]
    fn test_restart_preparer_sets_source_and_mode() {
        let raw = raw_with_structure(json!({"elements": ["Si"]}));
        let table = builtin_registry().bind(&raw.kind).unwrap();
        let mut working = WorkingInputs::from_raw(&raw);
        let source = RestartSource {
            folder: PathBuf::from("/scratch/attempt-001"),
        };
        table.prepare_restart_parameters(&mut working, &source);
        assert_eq!(working.restart_source, Some(source));
        assert_eq!(working.parameters["restart_mode"], json!("restart"));
    }

    #[test]
    fn test_convergence_handler_doubles_iteration_cap() {
        let raw = raw_with_structure(json!({"elements": ["Si"]}));
        let registry = default_handlers();
        let attempt = failed_attempt(&raw, Outcome::failure(failure_kinds::CONVERGENCE_NOT_REACHED));
        let report = registry.classify(&attempt);
        assert!(report.handled);
        assert!(!report.do_break);
        let action = report.action.unwrap();
        assert_eq!(action.path, "parameters.electron_maxstep");
        assert_eq!(action.value, json!(80));
    }

    #[test]
    fn test_convergence_detected_in_log_text() {
        let raw = raw_with_structure(json!({"elements": ["Si"]}));
        let registry = default_handlers();
        let mut outcome = Outcome::failure("scf-failed");
        outcome.payload = json!({"log": "WARNING: convergence NOT achieved after 40 steps"});
        let report = registry.classify(&failed_attempt(&raw, outcome));
        assert_eq!(report.priority, Some(100));
    }

    #[test]
    fn test_input_error_breaks_with_unrecoverable() {
        let raw = raw_with_structure(json!({"elements": ["Si"]}));
        let registry = default_handlers();
        let mut outcome = Outcome::failure(failure_kinds::INPUT_ERROR);
        outcome.payload = json!({"message": "unknown parameter 'ecutwfcx'"});
        let report = registry.classify(&failed_attempt(&raw, outcome));
        assert!(report.do_break);
        assert_eq!(
            report.exit_status,
            Some(ExitStatus::Unrecoverable(
                "unknown parameter 'ecutwfcx'".to_string()
            ))
        );
    }
}
