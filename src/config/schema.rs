//! JSON Schema subset for validating workflow output

use crate::workflow::OutputValidator;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Expected shape of a workflow's output
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct OutputSchema {
    #[serde(rename = "type")]
    pub schema_type: String,

    #[serde(default)]
    pub required: Vec<String>,

    #[serde(default)]
    pub properties: HashMap<String, PropertySchema>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct PropertySchema {
    #[serde(rename = "type")]
    pub prop_type: String,

    pub items: Option<Box<PropertySchema>>,
}

impl OutputSchema {
    /// Schema for a JSON object with the given required properties
    pub fn object(required: &[&str]) -> Self {
        Self {
            schema_type: "object".into(),
            required: required.iter().map(|s| s.to_string()).collect(),
            properties: HashMap::new(),
        }
    }

    pub fn with_property(mut self, name: impl Into<String>, property: PropertySchema) -> Self {
        self.properties.insert(name.into(), property);
        self
    }

    /// Check a JSON value, collecting every violation
    pub fn check(&self, value: &Value) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if !type_matches(&self.schema_type, value) {
            errors.push(format!(
                "expected {}, got {}",
                self.schema_type,
                type_name(value)
            ));
            return Err(errors);
        }

        if let Value::Object(map) = value {
            for name in &self.required {
                if !map.contains_key(name) {
                    errors.push(format!("missing required property '{}'", name));
                }
            }

            let mut names: Vec<_> = self.properties.keys().collect();
            names.sort();
            for name in names {
                if let Some(actual) = map.get(name) {
                    self.properties[name].check(name, actual, &mut errors);
                }
            }
        }

        if errors.is_empty() { Ok(()) } else { Err(errors) }
    }
}

impl PropertySchema {
    pub fn of(prop_type: impl Into<String>) -> Self {
        Self {
            prop_type: prop_type.into(),
            items: None,
        }
    }

    pub fn array_of(items: PropertySchema) -> Self {
        Self {
            prop_type: "array".into(),
            items: Some(Box::new(items)),
        }
    }

    fn check(&self, path: &str, value: &Value, errors: &mut Vec<String>) {
        if !type_matches(&self.prop_type, value) {
            errors.push(format!(
                "property '{}' expected {}, got {}",
                path,
                self.prop_type,
                type_name(value)
            ));
            return;
        }

        if let (Some(items), Value::Array(elements)) = (&self.items, value) {
            for (i, element) in elements.iter().enumerate() {
                items.check(&format!("{}[{}]", path, i), element, errors);
            }
        }
    }
}

fn type_matches(expected: &str, value: &Value) -> bool {
    match expected {
        "any" => true,
        "integer" => value.is_i64() || value.is_u64(),
        "number" => value.is_number(),
        other => other == type_name(value),
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

impl<T: Serialize> OutputValidator<T> for OutputSchema {
    fn parse(&self, value: T) -> Result<T, String> {
        let json = serde_json::to_value(&value)
            .map_err(|e| format!("output is not representable as JSON: {}", e))?;
        self.check(&json).map_err(|errors| errors.join("; "))?;
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_schema_accepts_matching_object() {
        let schema = OutputSchema::object(&["sum"]).with_property("sum", PropertySchema::of("integer"));
        assert!(schema.check(&json!({"sum": 5})).is_ok());
    }

    #[test]
    fn test_schema_reports_all_violations() {
        let schema = OutputSchema::object(&["sum", "label"])
            .with_property("sum", PropertySchema::of("integer"));

        let errors = schema.check(&json!({"sum": "five"})).unwrap_err();
        assert_eq!(
            errors,
            vec![
                "missing required property 'label'".to_string(),
                "property 'sum' expected integer, got string".to_string(),
            ]
        );
    }

    #[test]
    fn test_schema_root_type_mismatch() {
        let schema = OutputSchema::object(&[]);
        let errors = schema.check(&json!([1, 2])).unwrap_err();
        assert_eq!(errors, vec!["expected object, got array".to_string()]);
    }

    #[test]
    fn test_schema_array_items() {
        let schema = OutputSchema::object(&["files"])
            .with_property("files", PropertySchema::array_of(PropertySchema::of("string")));

        assert!(schema.check(&json!({"files": ["a.rs", "b.rs"]})).is_ok());
        let errors = schema.check(&json!({"files": ["a.rs", 3]})).unwrap_err();
        assert!(errors[0].contains("files[1]"));
    }

    #[test]
    fn test_schema_from_toml() {
        let toml = r#"
            type = "object"
            required = ["verdict"]

            [properties.verdict]
            type = "string"

            [properties.issues]
            type = "array"
            items = { type = "object" }
        "#;
        let schema: OutputSchema = toml::from_str(toml).unwrap();
        assert_eq!(schema.required, vec!["verdict"]);
        assert!(schema.properties["issues"].items.is_some());
    }

    #[test]
    fn test_schema_as_validator() {
        let schema = OutputSchema::object(&["sum"]);
        assert_eq!(schema.parse(json!({"sum": 1})), Ok(json!({"sum": 1})));

        let err = OutputValidator::<Value>::parse(&schema, json!({})).unwrap_err();
        assert_eq!(err, "missing required property 'sum'");
    }
}
