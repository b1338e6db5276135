//! Module parameters.
//!
//! Modules declare their parameters once at construction. Values are changed
//! through [`Module::set_parameter_value`](crate::pipeline::Module::set_parameter_value),
//! which validates against the declared type, the possible-value set, the
//! run-time changeability flag and the module's own verification hook before
//! committing.

use crate::error::{KernelError, Result};
use serde::{Deserialize, Serialize};

/// A parameter value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParameterValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl ParameterValue {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ParameterValue::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            ParameterValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            ParameterValue::Float(v) => Some(*v),
            ParameterValue::Int(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ParameterValue::Text(v) => Some(v),
            _ => None,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            ParameterValue::Bool(_) => "bool",
            ParameterValue::Int(_) => "int",
            ParameterValue::Float(_) => "float",
            ParameterValue::Text(_) => "text",
        }
    }

    /// Convert `self` to the variant of `template`, if lossless.
    ///
    /// Project files write `5` for a float parameter; that is accepted as `5.0`.
    pub fn coerce_like(self, template: &ParameterValue) -> Option<ParameterValue> {
        match (template, self) {
            (ParameterValue::Bool(_), v @ ParameterValue::Bool(_)) => Some(v),
            (ParameterValue::Int(_), v @ ParameterValue::Int(_)) => Some(v),
            (ParameterValue::Float(_), v @ ParameterValue::Float(_)) => Some(v),
            (ParameterValue::Float(_), ParameterValue::Int(i)) => Some(ParameterValue::Float(i as f64)),
            (ParameterValue::Text(_), v @ ParameterValue::Text(_)) => Some(v),
            _ => None,
        }
    }
}

impl std::fmt::Display for ParameterValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParameterValue::Bool(v) => write!(f, "{}", v),
            ParameterValue::Int(v) => write!(f, "{}", v),
            ParameterValue::Float(v) => write!(f, "{}", v),
            ParameterValue::Text(v) => write!(f, "{}", v),
        }
    }
}

/// A declared parameter and its current value.
#[derive(Debug, Clone)]
pub struct Parameter {
    pub name: String,
    pub display_name: String,
    pub description: String,
    value: ParameterValue,
    default: ParameterValue,
    /// Allowed values. Empty = unrestricted.
    possible_values: Vec<ParameterValue>,
    /// Whether the value may change while the module is started or paused.
    runtime_changeable: bool,
    enabled: bool,
}

impl Parameter {
    pub fn new(name: impl Into<String>, default: ParameterValue) -> Self {
        let name = name.into();
        Self {
            display_name: name.clone(),
            name,
            description: String::new(),
            value: default.clone(),
            default,
            possible_values: Vec::new(),
            runtime_changeable: false,
            enabled: true,
        }
    }

    pub fn display_name(mut self, display_name: impl Into<String>) -> Self {
        self.display_name = display_name.into();
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn possible_values(mut self, values: Vec<ParameterValue>) -> Self {
        self.possible_values = values;
        self
    }

    pub fn runtime_changeable(mut self) -> Self {
        self.runtime_changeable = true;
        self
    }

    pub fn value(&self) -> &ParameterValue {
        &self.value
    }

    pub fn default_value(&self) -> &ParameterValue {
        &self.default
    }

    pub fn allowed_values(&self) -> &[ParameterValue] {
        &self.possible_values
    }

    pub fn is_runtime_changeable(&self) -> bool {
        self.runtime_changeable
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }
}

/// Ordered table of a module's parameters.
#[derive(Debug, Clone, Default)]
pub struct ParameterTable {
    params: Vec<Parameter>,
}

impl ParameterTable {
    pub(crate) fn new(params: Vec<Parameter>) -> Self {
        Self { params }
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Parameter> {
        self.params.iter()
    }

    pub fn get(&self, name: &str) -> Option<&Parameter> {
        self.params.iter().find(|p| p.name == name)
    }

    pub fn value(&self, name: &str) -> Option<&ParameterValue> {
        self.get(name).map(|p| &p.value)
    }

    /// Enable or disable a parameter, e.g. when another parameter makes it moot.
    pub fn set_enabled(&mut self, module: &str, name: &str, enabled: bool) -> Result<()> {
        let param = self
            .params
            .iter_mut()
            .find(|p| p.name == name)
            .ok_or_else(|| KernelError::invalid_parameter(module, name, "no such parameter"))?;
        param.enabled = enabled;
        Ok(())
    }

    /// Check a candidate value and return it coerced to the declared type.
    pub fn validate(
        &self,
        module: &str,
        name: &str,
        candidate: ParameterValue,
        running: bool,
    ) -> Result<ParameterValue> {
        let param = self
            .get(name)
            .ok_or_else(|| KernelError::invalid_parameter(module, name, "no such parameter"))?;
        if !param.enabled {
            return Err(KernelError::invalid_parameter(module, name, "parameter is disabled"));
        }
        if running && !param.runtime_changeable {
            return Err(KernelError::invalid_parameter(
                module,
                name,
                "parameter cannot change while the module is running",
            ));
        }
        let candidate_type = candidate.type_name();
        let value = candidate.coerce_like(&param.default).ok_or_else(|| {
            KernelError::invalid_parameter(
                module,
                name,
                format!(
                    "expected a {} value, got {}",
                    param.default.type_name(),
                    candidate_type
                ),
            )
        })?;
        if !param.possible_values.is_empty() && !param.possible_values.contains(&value) {
            return Err(KernelError::invalid_parameter(
                module,
                name,
                format!("{} is not one of the possible values", value),
            ));
        }
        Ok(value)
    }

    /// Store an already validated value, returning the previous one.
    pub fn commit(&mut self, name: &str, value: ParameterValue) -> Option<ParameterValue> {
        let param = self.params.iter_mut().find(|p| p.name == name)?;
        Some(std::mem::replace(&mut param.value, value))
    }

    /// Restore every parameter to its default value.
    pub fn restore_defaults(&mut self) {
        for param in &mut self.params {
            param.value = param.default.clone();
            param.enabled = true;
        }
    }
}
