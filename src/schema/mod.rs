//! Typed target schema.
//!
//! A schema is the ordered list of top-level fields a generation request must
//! produce, each with an expected [`FieldShape`] and an estimated output weight.
//! JSON templates are parsed into this tree once; model output is validated
//! against it instead of being probed at runtime.
//!
//! Templates are tolerated in the forms models and humans tend to write them:
//! wrapped in a markdown fence, surrounded by prose, or nested under a root key.

mod shape;

pub use shape::FieldShape;

use crate::errors::GenerationError;
use crate::estimate::{estimate_text, estimate_tokens};
use crate::util::{extract_json_object, strip_code_fences};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One top-level field of a schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaField {
    pub name: String,
    pub shape: FieldShape,
    /// Estimated output tokens for this field, used by the generic planner.
    pub estimated_tokens: usize,
}

impl SchemaField {
    pub fn new(name: impl Into<String>, shape: FieldShape, estimated_tokens: usize) -> Self {
        Self {
            name: name.into(),
            shape,
            estimated_tokens,
        }
    }

    /// Build a field from its template value using the shape weight heuristic.
    pub fn from_template(name: &str, template: &Value) -> Self {
        let shape = FieldShape::of(template);
        Self::new(name, shape, shape.weight(estimate_tokens(template)))
    }
}

/// Ordered set of top-level fields plus the template text they came from.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Schema {
    /// Key the merged document is nested under, if any.
    pub root_key: Option<String>,
    pub fields: Vec<SchemaField>,
    /// Template text shown to the model for structural reference.
    pub text: String,
}

impl Schema {
    /// Build a schema from explicit fields.
    ///
    /// Fails if the field list is empty or names a field twice.
    pub fn new(
        root_key: Option<String>,
        fields: Vec<SchemaField>,
        text: impl Into<String>,
    ) -> Result<Self, GenerationError> {
        if fields.is_empty() {
            return Err(GenerationError::InvalidSchema(
                "schema has no top-level fields".to_string(),
            ));
        }
        let mut seen = std::collections::HashSet::new();
        for field in &fields {
            if !seen.insert(field.name.as_str()) {
                return Err(GenerationError::InvalidSchema(format!(
                    "field '{}' is declared twice",
                    field.name
                )));
            }
        }
        Ok(Self {
            root_key,
            fields,
            text: text.into(),
        })
    }

    /// Parse a JSON template.
    ///
    /// When `root_key` is given and the template nests its fields under that key,
    /// the nesting is unwrapped. When the key is absent from the template the
    /// template's own fields are used and the root key is still applied to output.
    pub fn parse(text: &str, root_key: Option<&str>) -> Result<Self, GenerationError> {
        let template = parse_template(text).ok_or_else(|| {
            GenerationError::InvalidSchema("template is not a JSON object".to_string())
        })?;

        let fields_map = match root_key {
            Some(key) => match template.get(key) {
                Some(Value::Object(inner)) => inner.clone(),
                _ => template,
            },
            None => template,
        };

        let fields = fields_map
            .iter()
            .map(|(name, value)| SchemaField::from_template(name, value))
            .collect();

        Self::new(root_key.map(str::to_string), fields, text.trim())
    }

    /// Build a schema for a prose template whose field names come from elsewhere
    /// (a predefined or custom plan). Shapes are unknown.
    pub fn from_fields<I, S>(
        names: I,
        root_key: Option<&str>,
        text: &str,
    ) -> Result<Self, GenerationError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let fields = names
            .into_iter()
            .map(|name| SchemaField::new(name, FieldShape::Any, FieldShape::Any.weight(0)))
            .collect();
        Self::new(root_key.map(str::to_string), fields, text.trim())
    }

    /// Override a field's estimated weight. Returns false if the field is unknown.
    pub fn set_weight(&mut self, name: &str, tokens: usize) -> bool {
        match self.fields.iter_mut().find(|f| f.name == name) {
            Some(field) => {
                field.estimated_tokens = tokens;
                true
            }
            None => false,
        }
    }

    pub fn field(&self, name: &str) -> Option<&SchemaField> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.field(name).is_some()
    }

    /// Field names in declaration order.
    pub fn field_names(&self) -> Vec<&str> {
        self.fields.iter().map(|f| f.name.as_str()).collect()
    }

    /// Sum of all fields' estimated output tokens.
    pub fn estimated_output_tokens(&self) -> usize {
        self.fields.iter().map(|f| f.estimated_tokens).sum()
    }

    /// Estimated prompt tokens taken by the template text.
    pub fn text_tokens(&self) -> usize {
        estimate_text(&self.text)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Parse template text into a JSON object, tolerating fences and prose.
fn parse_template(text: &str) -> Option<Map<String, Value>> {
    let body = strip_code_fences(text);
    let value = serde_json::from_str::<Value>(body).ok().or_else(|| {
        extract_json_object(body).and_then(|candidate| serde_json::from_str(&candidate).ok())
    })?;
    match value {
        Value::Object(map) => Some(map),
        _ => None,
    }
}

/// Check whether a template looks like JSON rather than prose.
pub fn is_json_template(text: &str) -> bool {
    parse_template(text).is_some()
}

#[cfg(test)]
mod tests {
    use super::*;

    const TIMELINE: &str = r#"{
        "title": "",
        "patient": {"name": "", "age": 0},
        "diagnoses": [],
        "treatments": [{"date": "", "drug": ""}]
    }"#;

    #[test]
    fn test_parse_preserves_declaration_order() {
        let schema = Schema::parse(TIMELINE, None).unwrap();
        assert_eq!(
            schema.field_names(),
            vec!["title", "patient", "diagnoses", "treatments"]
        );
        assert_eq!(schema.root_key, None);
    }

    #[test]
    fn test_parse_infers_shapes() {
        let schema = Schema::parse(TIMELINE, None).unwrap();
        assert_eq!(schema.field("title").unwrap().shape, FieldShape::Scalar);
        assert_eq!(schema.field("patient").unwrap().shape, FieldShape::Map);
        assert_eq!(schema.field("diagnoses").unwrap().shape, FieldShape::List);
    }

    #[test]
    fn test_parse_weights_lists_heaviest() {
        let schema = Schema::parse(TIMELINE, None).unwrap();
        let title = schema.field("title").unwrap().estimated_tokens;
        let treatments = schema.field("treatments").unwrap().estimated_tokens;
        assert!(treatments > title);
        assert_eq!(
            schema.estimated_output_tokens(),
            schema.fields.iter().map(|f| f.estimated_tokens).sum::<usize>()
        );
    }

    #[test]
    fn test_parse_unwraps_root_key() {
        let text = r#"{"pptTemplate2Vm": {"title": "", "timeline": []}}"#;
        let schema = Schema::parse(text, Some("pptTemplate2Vm")).unwrap();
        assert_eq!(schema.root_key.as_deref(), Some("pptTemplate2Vm"));
        assert_eq!(schema.field_names(), vec!["title", "timeline"]);
    }

    #[test]
    fn test_parse_root_key_absent_from_template() {
        let schema = Schema::parse(r#"{"title": ""}"#, Some("data")).unwrap();
        assert_eq!(schema.root_key.as_deref(), Some("data"));
        assert_eq!(schema.field_names(), vec!["title"]);
    }

    #[test]
    fn test_parse_tolerates_fence_and_prose() {
        let fenced = "```json\n{\"title\": \"\"}\n```";
        assert_eq!(Schema::parse(fenced, None).unwrap().len(), 1);

        let prose = "Use this structure: {\"title\": \"\", \"items\": []} thanks";
        assert_eq!(Schema::parse(prose, None).unwrap().len(), 2);
    }

    #[test]
    fn test_parse_rejects_non_object() {
        assert!(matches!(
            Schema::parse("[1, 2]", None),
            Err(GenerationError::InvalidSchema(_))
        ));
        assert!(matches!(
            Schema::parse("a slide deck about the patient", None),
            Err(GenerationError::InvalidSchema(_))
        ));
        assert!(matches!(
            Schema::parse("{}", None),
            Err(GenerationError::InvalidSchema(_))
        ));
    }

    #[test]
    fn test_new_rejects_duplicate_fields() {
        let fields = vec![
            SchemaField::new("a", FieldShape::Scalar, 1),
            SchemaField::new("a", FieldShape::List, 1),
        ];
        assert!(Schema::new(None, fields, "").is_err());
    }

    #[test]
    fn test_from_fields_uses_any_shape() {
        let schema =
            Schema::from_fields(["title", "patient"], Some("data"), "A slide deck").unwrap();
        assert_eq!(schema.field("title").unwrap().shape, FieldShape::Any);
        assert_eq!(schema.text, "A slide deck");
        assert_eq!(schema.root_key.as_deref(), Some("data"));
    }

    #[test]
    fn test_set_weight() {
        let mut schema = Schema::parse(TIMELINE, None).unwrap();
        assert!(schema.set_weight("diagnoses", 1500));
        assert_eq!(schema.field("diagnoses").unwrap().estimated_tokens, 1500);
        assert!(!schema.set_weight("missing", 1));
    }

    #[test]
    fn test_is_json_template() {
        assert!(is_json_template(TIMELINE));
        assert!(!is_json_template("Generate a summary deck"));
    }
}
