//! Expected shapes of top-level schema fields.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Base output weight for a scalar field, before template size is added.
const SCALAR_BASE_TOKENS: usize = 32;
/// Base output weight for a mapping field.
const MAP_BASE_TOKENS: usize = 256;
/// Base output weight for a list field. Lists are the enumerable sections
/// (treatments, lab results) that grow with the input.
const LIST_BASE_TOKENS: usize = 1024;

/// Shape a generated value must have to be accepted for a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldShape {
    /// String, number, boolean or null.
    Scalar,
    /// JSON array.
    List,
    /// JSON object.
    Map,
    /// Unknown shape (prose templates); any value is accepted.
    #[default]
    Any,
}

impl FieldShape {
    /// Infer the shape from a template value.
    pub fn of(template: &Value) -> Self {
        match template {
            Value::Array(_) => Self::List,
            Value::Object(_) => Self::Map,
            _ => Self::Scalar,
        }
    }

    /// Check whether a generated value matches this shape.
    pub fn accepts(&self, value: &Value) -> bool {
        match self {
            Self::Scalar => !value.is_array() && !value.is_object(),
            Self::List => value.is_array(),
            Self::Map => value.is_object(),
            Self::Any => true,
        }
    }

    /// Heuristic output weight for a field of this shape whose template
    /// estimates to `template_tokens`.
    pub fn weight(&self, template_tokens: usize) -> usize {
        match self {
            Self::Scalar => SCALAR_BASE_TOKENS + template_tokens,
            Self::Map | Self::Any => MAP_BASE_TOKENS + 2 * template_tokens,
            Self::List => LIST_BASE_TOKENS + 8 * template_tokens,
        }
    }
}

impl std::fmt::Display for FieldShape {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Scalar => write!(f, "scalar"),
            Self::List => write!(f, "list"),
            Self::Map => write!(f, "map"),
            Self::Any => write!(f, "any"),
        }
    }
}
