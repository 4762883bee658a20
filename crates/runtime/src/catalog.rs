//! Translation of a host's tool catalog into provider tool declarations.

use std::collections::HashSet;

use serde_json::{Map, Value};
use thiserror::Error;

use crate::model::ToolSpec;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum CatalogError {
    #[error("duplicate tool name: {0}")]
    DuplicateName(String),

    #[error("tool `{tool}` has an unsupported schema: {reason}")]
    UnsupportedSchema { tool: String, reason: String },
}

/// A provider's wire declaration of one tool.
pub trait Declaration: Sized {
    /// Build the declaration. `schema` is already normalised to an object
    /// schema.
    fn from_spec(spec: &ToolSpec, schema: Value) -> Self;

    /// Recover the provider-agnostic spec.
    fn to_spec(&self) -> ToolSpec;

    fn name(&self) -> &str;
}

impl Declaration for ToolSpec {
    fn from_spec(spec: &ToolSpec, schema: Value) -> Self {
        ToolSpec {
            schema,
            ..spec.clone()
        }
    }

    fn to_spec(&self) -> ToolSpec {
        self.clone()
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Translate `specs` one-to-one, keeping their order.
pub fn translate<D: Declaration>(specs: &[ToolSpec]) -> Result<Vec<D>, CatalogError> {
    let mut seen = HashSet::with_capacity(specs.len());
    specs
        .iter()
        .map(|spec| {
            if !seen.insert(spec.name.as_str()) {
                return Err(CatalogError::DuplicateName(spec.name.clone()));
            }
            let schema = object_schema(spec)?;
            Ok(D::from_spec(spec, schema))
        })
        .collect()
}

/// Providers only accept object schemas for tool arguments.
fn object_schema(spec: &ToolSpec) -> Result<Value, CatalogError> {
    let unsupported = |reason: String| CatalogError::UnsupportedSchema {
        tool: spec.name.clone(),
        reason,
    };

    let Value::Object(schema) = &spec.schema else {
        return Err(unsupported(format!("expected a JSON object, got {}", spec.schema)));
    };

    match schema.get("type") {
        None => {
            let mut schema: Map<String, Value> = schema.clone();
            schema.insert("type".to_string(), Value::String("object".to_string()));
            Ok(Value::Object(schema))
        }
        Some(Value::String(kind)) if kind == "object" => Ok(spec.schema.clone()),
        Some(other) => Err(unsupported(format!(
            "top-level type must be \"object\", got {other}"
        ))),
    }
}
