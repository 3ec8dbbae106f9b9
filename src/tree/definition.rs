//! Declarative module definitions.

use crate::error::{Result, VaultError};
use crate::namespace::validate_segment;
use crate::types::{PolicyKind, StateMap};
use serde_json::Value;

/// Raw definition of a subtree: default state, field persistence
/// declarations, and child definitions.
#[derive(Clone, Debug, Default)]
pub struct ModuleDefinition {
    /// Declared default state of the node.
    pub state: StateMap,

    /// Field-level persistence declarations, in declaration order.
    pub fields: Vec<(String, PolicyKind)>,

    /// Child definitions, in insertion order.
    pub children: Vec<(String, ModuleDefinition)>,
}

impl ModuleDefinition {
    /// Create a definition whose default state is `state`.
    ///
    /// Fails with a configuration error unless `state` is a JSON object.
    pub fn new(state: Value) -> Result<Self> {
        match state {
            Value::Object(state) => Ok(Self {
                state,
                ..Default::default()
            }),
            other => Err(VaultError::Configuration(format!(
                "module state must be an object, got {}",
                json_kind(&other)
            ))),
        }
    }

    /// A definition with no fields.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Declare `field` as persisted; switches the node to allow-list semantics.
    pub fn allow(mut self, field: impl Into<String>) -> Self {
        self.fields.push((field.into(), PolicyKind::Allow));
        self
    }

    /// Declare `field` as never persisted.
    pub fn deny(mut self, field: impl Into<String>) -> Self {
        self.fields.push((field.into(), PolicyKind::Deny));
        self
    }

    /// Add a named child definition.
    pub fn child(mut self, name: impl Into<String>, definition: ModuleDefinition) -> Self {
        self.children.push((name.into(), definition));
        self
    }

    /// Check child names recursively.
    pub fn validate(&self) -> Result<()> {
        for (i, (name, child)) in self.children.iter().enumerate() {
            validate_segment(name)?;
            if self.children[..i].iter().any(|(other, _)| other == name) {
                return Err(VaultError::Configuration(format!(
                    "duplicate child '{}'",
                    name
                )));
            }
            child.validate()?;
        }
        Ok(())
    }
}

/// Name of a JSON value's type, for messages.
pub(crate) fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
