use relaunch_core::backend::CancellationToken;
use relaunch_core::capability::{BoundCapability, CalculationPlugin, PluginRegistry};
use relaunch_core::constants::{capabilities, failure_kinds};
use relaunch_core::errors::ValidationError;
use relaunch_core::model::ExitStatus;
use relaunch_engine::plugins::{builtin_registry, default_handlers};
use relaunch_engine::{
    EngineError, ErrorHandlerRegistry, LoopGuardPolicy, RestartController, RestartSettings,
};
use relaunch_test_utils::harness::{
    failure_outcome, sample_raw_inputs, success_outcome, ScriptedBackend,
};
use serde_json::json;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

fn controller(
    backend: Arc<ScriptedBackend>,
    handlers: ErrorHandlerRegistry,
) -> RestartController {
    RestartController::new(sample_raw_inputs(), backend, builtin_registry(), handlers)
}

#[test]
fn success_on_first_attempt_consults_no_handler() {
    let backend = Arc::new(ScriptedBackend::new(vec![success_outcome()]));
    let consulted = Arc::new(AtomicUsize::new(0));

    let mut handlers = ErrorHandlerRegistry::new();
    let counter = consulted.clone();
    handlers.register(100, "spy", move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
        None
    });

    let report = controller(backend.clone(), handlers).run().unwrap();

    assert!(report.is_success());
    assert_eq!(report.attempts.len(), 1);
    assert!(report.attempts[0].report.is_none());
    assert_eq!(consulted.load(Ordering::SeqCst), 0);
    assert_eq!(backend.submission_count(), 1);
}

#[test]
fn convergence_failure_is_corrected_and_retried() {
    let backend = Arc::new(ScriptedBackend::new(vec![
        failure_outcome(failure_kinds::CONVERGENCE_NOT_REACHED, 1),
        success_outcome(),
    ]));

    let report = controller(backend.clone(), default_handlers())
        .run()
        .unwrap();

    assert!(report.is_success());
    assert_eq!(report.attempts.len(), 2);

    // The first attempt's report carries the approved correction.
    let first_report = report.attempts[0].report.as_ref().unwrap();
    assert!(first_report.handled);
    assert_eq!(first_report.priority, Some(100));
    let action = first_report.action.as_ref().unwrap();
    assert_eq!(action.path, "parameters.electron_maxstep");

    // The second attempt ran with the raised cap and as a restart.
    let submissions = backend.submissions();
    assert_eq!(submissions[0].parameters["electron_maxstep"], json!(40));
    assert_eq!(submissions[1].parameters["electron_maxstep"], json!(80));
    assert_eq!(submissions[1].parameters["restart_mode"], json!("restart"));
    assert_eq!(
        submissions[1].restart_source.as_ref().unwrap().folder,
        PathBuf::from("/scratch/si-scf/attempt-1")
    );

    // Dataset preparation ran for both attempts.
    assert_eq!(submissions[0].datasets["Si"], PathBuf::from("pbe-v1/Si.upf"));
    assert_eq!(submissions[1].datasets["Si"], PathBuf::from("pbe-v1/Si.upf"));
}

#[test]
fn loop_guard_stops_on_second_identical_failure() {
    let backend = Arc::new(ScriptedBackend::new(vec![
        failure_outcome(failure_kinds::WALLTIME_EXCEEDED, 1),
        failure_outcome(failure_kinds::WALLTIME_EXCEEDED, 2),
        failure_outcome(failure_kinds::WALLTIME_EXCEEDED, 3),
    ]));

    let report = controller(backend.clone(), default_handlers())
        .run()
        .unwrap();

    assert_eq!(report.exit_status(), Some(&ExitStatus::RepeatedFailure));
    assert_eq!(report.attempts.len(), 2);
    assert_eq!(backend.submission_count(), 2);
}

#[test]
fn loop_never_exceeds_the_attempt_budget() {
    let outcomes = (1..=5)
        .map(|n| failure_outcome(failure_kinds::WALLTIME_EXCEEDED, n))
        .collect();
    let backend = Arc::new(ScriptedBackend::new(outcomes));

    let settings = RestartSettings {
        max_attempts: 3,
        loop_guard: LoopGuardPolicy::Disabled,
    };
    let report = controller(backend.clone(), default_handlers())
        .with_settings(settings)
        .run()
        .unwrap();

    assert_eq!(report.exit_status(), Some(&ExitStatus::MaxAttemptsExceeded));
    assert_eq!(report.attempts.len(), 3);
    assert_eq!(backend.submission_count(), 3);
}

#[test]
fn unhandled_failure_is_terminal_on_the_first_attempt() {
    let backend = Arc::new(ScriptedBackend::new(vec![failure_outcome(
        "meteor-strike",
        1,
    )]));

    let report = controller(backend.clone(), ErrorHandlerRegistry::new())
        .run()
        .unwrap();

    assert_eq!(report.exit_status(), Some(&ExitStatus::UnhandledFailure));
    assert_eq!(report.attempts.len(), 1);
    let attempt_report = report.attempts[0].report.as_ref().unwrap();
    assert!(!attempt_report.handled);
}

#[test]
fn handler_abort_surfaces_its_exit_status() {
    let mut outcome = failure_outcome(failure_kinds::INPUT_ERROR, 1);
    outcome.payload = json!({"message": "negative cutoff"});
    let backend = Arc::new(ScriptedBackend::new(vec![outcome]));

    let report = controller(backend, default_handlers()).run().unwrap();

    assert_eq!(
        report.exit_status(),
        Some(&ExitStatus::Unrecoverable("negative cutoff".to_string()))
    );
    assert_eq!(report.attempts.len(), 1);
}

struct RestartOnlyPlugin;

impl CalculationPlugin for RestartOnlyPlugin {
    fn kind(&self) -> &str {
        "plane-wave"
    }

    fn capability(&self, name: &str) -> Option<BoundCapability> {
        match name {
            capabilities::PREPARE_RESTART_PARAMETERS => Some(
                BoundCapability::PrepareRestartParameters(Arc::new(|inputs, source| {
                    inputs.restart_source = Some(source.clone());
                })),
            ),
            _ => None,
        }
    }
}

#[test]
fn missing_capability_fails_before_any_attempt() {
    let backend = Arc::new(ScriptedBackend::new(vec![success_outcome()]));

    let mut partial = PluginRegistry::new();
    partial.register(Arc::new(RestartOnlyPlugin));

    let controller = RestartController::new(
        sample_raw_inputs(),
        backend.clone(),
        Arc::new(partial),
        ErrorHandlerRegistry::new(),
    );
    let err = controller.run().unwrap_err();

    match err {
        EngineError::Validation(ValidationError::MissingCapability { capability, .. }) => {
            assert_eq!(capability, capabilities::PREPARE_DATASET_INPUTS);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(backend.submission_count(), 0);
}

#[test]
fn incomplete_parallelization_fails_before_any_attempt() {
    let backend = Arc::new(ScriptedBackend::new(vec![success_outcome()]));

    let mut raw = sample_raw_inputs();
    raw.options.num_machines = None;

    let controller = RestartController::new(
        raw,
        backend.clone(),
        builtin_registry(),
        ErrorHandlerRegistry::new(),
    );
    let err = controller.run().unwrap_err();

    assert!(matches!(
        err,
        EngineError::Validation(ValidationError::IncompleteParallelizationSpec { .. })
    ));
    assert_eq!(backend.submission_count(), 0);
}

#[test]
fn cancellation_is_honored_before_the_next_attempt() {
    let backend = Arc::new(ScriptedBackend::new(vec![success_outcome()]));
    let token = CancellationToken::new();
    token.cancel();

    let report = controller(backend.clone(), ErrorHandlerRegistry::new())
        .with_cancellation(token)
        .run()
        .unwrap();

    assert_eq!(report.exit_status(), Some(&ExitStatus::Cancelled));
    assert!(report.attempts.is_empty());
    assert_eq!(backend.submission_count(), 0);
}

#[test]
fn retries_start_from_a_fresh_copy_of_the_raw_inputs() {
    let backend = Arc::new(ScriptedBackend::new(vec![
        failure_outcome(failure_kinds::CONVERGENCE_NOT_REACHED, 1),
        failure_outcome(failure_kinds::WALLTIME_EXCEEDED, 2),
        success_outcome(),
    ]));

    let report = controller(backend.clone(), default_handlers())
        .run()
        .unwrap();

    assert!(report.is_success());
    let submissions = backend.submissions();
    assert_eq!(submissions.len(), 3);

    // The convergence correction from attempt 1 is still in force on
    // attempt 3, re-applied onto a fresh copy; untouched fields match the
    // raw inputs exactly.
    assert_eq!(submissions[2].parameters["electron_maxstep"], json!(80));
    assert_eq!(submissions[2].parameters["ecutwfc"], json!(60.0));
    assert_eq!(
        submissions[2].restart_source.as_ref().unwrap().folder,
        PathBuf::from("/scratch/si-scf/attempt-2")
    );
}
