use crate::constants::capabilities;
use crate::errors::ValidationError;
use crate::model::{JobKind, RawInputs, RestartSource, WorkingInputs};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Injects a prior attempt's output folder reference into the working
/// inputs so the next attempt resumes instead of starting over.
pub type RestartPreparer = Arc<dyn Fn(&mut WorkingInputs, &RestartSource) + Send + Sync>;

/// Resolves dataset/pseudopotential bindings from the raw inputs onto the
/// working copy. Malformed references are fatal validation errors.
pub type DatasetPreparer =
    Arc<dyn Fn(&RawInputs, &mut WorkingInputs) -> Result<(), ValidationError> + Send + Sync>;

/// A named operation as advertised by a plugin's capability lookup.
pub enum BoundCapability {
    PrepareRestartParameters(RestartPreparer),
    PrepareDatasetInputs(DatasetPreparer),
}

/// The capability-discovery protocol a job-type plugin must implement.
/// Required capability names are fixed strings; see
/// [`capabilities::REQUIRED`].
pub trait CalculationPlugin: Send + Sync {
    fn kind(&self) -> &str;

    fn capability(&self, name: &str) -> Option<BoundCapability>;
}

/// The bound-operations table for one job type. Resolved once at setup and
/// owned by the controller; dispatch afterwards never re-checks the plugin.
pub struct CapabilityTable {
    prepare_restart_parameters: RestartPreparer,
    prepare_dataset_inputs: DatasetPreparer,
}

impl std::fmt::Debug for CapabilityTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CapabilityTable").finish_non_exhaustive()
    }
}

impl std::fmt::Debug for dyn CalculationPlugin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CalculationPlugin")
            .field("kind", &self.kind())
            .finish()
    }
}

impl CapabilityTable {
    pub fn bind(plugin: &dyn CalculationPlugin) -> Result<Self, ValidationError> {
        let prepare_restart_parameters =
            match plugin.capability(capabilities::PREPARE_RESTART_PARAMETERS) {
                Some(BoundCapability::PrepareRestartParameters(op)) => op,
                _ => {
                    return Err(missing(
                        plugin,
                        capabilities::PREPARE_RESTART_PARAMETERS,
                    ))
                }
            };

        let prepare_dataset_inputs = match plugin.capability(capabilities::PREPARE_DATASET_INPUTS) {
            Some(BoundCapability::PrepareDatasetInputs(op)) => op,
            _ => return Err(missing(plugin, capabilities::PREPARE_DATASET_INPUTS)),
        };

        Ok(Self {
            prepare_restart_parameters,
            prepare_dataset_inputs,
        })
    }

    pub fn prepare_restart_parameters(&self, inputs: &mut WorkingInputs, source: &RestartSource) {
        (self.prepare_restart_parameters)(inputs, source)
    }

    pub fn prepare_dataset_inputs(
        &self,
        raw: &RawInputs,
        inputs: &mut WorkingInputs,
    ) -> Result<(), ValidationError> {
        (self.prepare_dataset_inputs)(raw, inputs)
    }
}

fn missing(plugin: &dyn CalculationPlugin, capability: &'static str) -> ValidationError {
    ValidationError::MissingCapability {
        kind: JobKind(plugin.kind().to_string()),
        capability,
    }
}

/// Maps job kinds to their plugin implementations. Built once by the caller
/// and injected into the controller; read-only afterwards.
#[derive(Default)]
pub struct PluginRegistry {
    plugins: BTreeMap<String, Arc<dyn CalculationPlugin>>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, plugin: Arc<dyn CalculationPlugin>) {
        self.plugins.insert(plugin.kind().to_string(), plugin);
    }

    pub fn resolve(&self, kind: &JobKind) -> Result<Arc<dyn CalculationPlugin>, ValidationError> {
        self.plugins
            .get(&kind.0)
            .cloned()
            .ok_or_else(|| ValidationError::UnsupportedPlugin(kind.clone()))
    }

    /// Resolves the plugin for a job kind and binds its capability table in
    /// one step.
    pub fn bind(&self, kind: &JobKind) -> Result<CapabilityTable, ValidationError> {
        let plugin = self.resolve(kind)?;
        CapabilityTable::bind(plugin.as_ref())
    }
}
