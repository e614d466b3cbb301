pub mod capabilities {
    pub const PREPARE_RESTART_PARAMETERS: &str = "prepare_restart_parameters";
    pub const PREPARE_DATASET_INPUTS: &str = "prepare_dataset_inputs";

    pub const REQUIRED: [&str; 2] = [PREPARE_RESTART_PARAMETERS, PREPARE_DATASET_INPUTS];
}

pub mod failure_kinds {
    pub const CONVERGENCE_NOT_REACHED: &str = "convergence-not-reached";
    pub const WALLTIME_EXCEEDED: &str = "walltime-exceeded";
    pub const INPUT_ERROR: &str = "input-error";
}

pub mod markers {
    pub const SUCCESS: &str = "SUCCESS";
    pub const FAIL: &str = "FAIL";
}

pub mod files {
    pub const INPUTS_JSON: &str = "inputs.json";
    pub const RESULTS_JSON: &str = "results.json";
    pub const REPORT_JSON: &str = "report.json";
}

pub mod dirs {
    pub const ATTEMPTS: &str = "attempts";
    pub const OUT: &str = "out";
}

pub mod defaults {
    pub const MAX_ATTEMPTS: u32 = 5;
}
