use crate::errors::ValidationError;
use crate::model::{Mutation, RawInputs, WorkingInputs};
use serde_json::Value;

/// Owns the canonical raw inputs and the working copy used for the next
/// attempt. The working copy is rebuilt from the raw set on every reset, so
/// a failed attempt can never corrupt the inputs for the next one.
#[derive(Debug, Clone)]
pub struct InputSnapshot {
    raw: RawInputs,
    working: WorkingInputs,
}

impl InputSnapshot {
    pub fn new(raw: RawInputs) -> Self {
        let working = WorkingInputs::from_raw(&raw);
        Self { raw, working }
    }

    pub fn raw(&self) -> &RawInputs {
        &self.raw
    }

    pub fn working(&self) -> &WorkingInputs {
        &self.working
    }

    pub fn working_mut(&mut self) -> &mut WorkingInputs {
        &mut self.working
    }

    /// Split borrow for operations that read the raw inputs while writing
    /// the working copy, such as dataset preparation.
    pub fn parts_mut(&mut self) -> (&RawInputs, &mut WorkingInputs) {
        (&self.raw, &mut self.working)
    }

    /// Replaces the working copy with a fresh independent clone of the raw
    /// inputs merged with defaults. Accumulated corrections are gone after
    /// this; the controller re-applies the approved ones.
    pub fn reset(&mut self) {
        self.working = WorkingInputs::from_raw(&self.raw);
    }

    /// Applies a corrective mutation onto the current working copy. The path
    /// is dotted and rooted in the `parameters` or `settings` section. Both
    /// sections are free-form mappings, so a top-level key may be introduced
    /// by a correction; any deeper path must already exist.
    pub fn apply(&mut self, mutation: &Mutation) -> Result<(), ValidationError> {
        let mut segments = mutation.path.split('.');
        let section = segments.next().unwrap_or_default();
        let rest: Vec<&str> = segments.collect();

        if rest.is_empty() || rest.iter().any(|s| s.is_empty()) {
            return Err(invalid(
                &mutation.path,
                "expected '<section>.<field>' with non-empty segments",
            ));
        }

        match section {
            "parameters" => {
                let root = self.working.parameters.as_object_mut().ok_or_else(|| {
                    invalid(&mutation.path, "the parameters section is not a mapping")
                })?;
                if rest.len() == 1 {
                    root.insert(rest[0].to_string(), mutation.value.clone());
                    Ok(())
                } else {
                    let entry = root.get_mut(rest[0]).ok_or_else(|| {
                        invalid(&mutation.path, "no such field in the parameters section")
                    })?;
                    set_existing(entry, &rest[1..], &mutation.path, &mutation.value)
                }
            }
            "settings" => {
                if rest.len() == 1 {
                    self.working
                        .settings
                        .insert(rest[0].to_string(), mutation.value.clone());
                    Ok(())
                } else {
                    let entry = self.working.settings.get_mut(rest[0]).ok_or_else(|| {
                        invalid(&mutation.path, "no such field in the settings section")
                    })?;
                    set_existing(entry, &rest[1..], &mutation.path, &mutation.value)
                }
            }
            other => Err(invalid(
                &mutation.path,
                &format!(
                    "unknown section '{}'; corrections may only address 'parameters' or 'settings'",
                    other
                ),
            )),
        }
    }
}

fn invalid(path: &str, reason: &str) -> ValidationError {
    ValidationError::InvalidMutation {
        path: path.to_string(),
        reason: reason.to_string(),
    }
}

/// Walks a nested path where every segment must already exist, then replaces
/// the leaf value.
fn set_existing(
    mut node: &mut Value,
    segments: &[&str],
    path: &str,
    value: &Value,
) -> Result<(), ValidationError> {
    for segment in &segments[..segments.len() - 1] {
        node = node
            .as_object_mut()
            .and_then(|map| map.get_mut(*segment))
            .ok_or_else(|| invalid(path, "intermediate field does not exist"))?;
    }
    let leaf = segments[segments.len() - 1];
    let map = node
        .as_object_mut()
        .ok_or_else(|| invalid(path, "parent field is not a mapping"))?;
    let slot = map
        .get_mut(leaf)
        .ok_or_else(|| invalid(path, "no such field"))?;
    *slot = value.clone();
    Ok(())
}
