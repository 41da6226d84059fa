//! Object schemas.

use serde_json::{Map, Value};

use crate::validation::error::{FieldError, ValidationErrors, ValidationResult};
use crate::validation::field::Field;

/// Options applied to a whole validation pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidateOptions {
    /// Drop keys the schema does not name instead of rejecting them.
    pub strip_unknown: bool,
    /// Coerce strings to numbers and booleans, apply trim and lowercase.
    pub convert: bool,
}

impl Default for ValidateOptions {
    fn default() -> Self {
        Self {
            strip_unknown: true,
            convert: true,
        }
    }
}

/// Rules for a JSON object, checked field by field in declaration order.
#[derive(Debug, Clone, Default)]
pub struct Schema {
    fields: Vec<(String, Field)>,
}

impl Schema {
    pub fn object() -> Self {
        Self::default()
    }

    pub fn field(mut self, name: &str, field: Field) -> Self {
        self.fields.push((name.to_string(), field));
        self
    }

    /// Validate with unknown keys stripped and conversion on.
    pub fn validate(&self, value: &Value) -> ValidationResult {
        self.validate_with(value, &ValidateOptions::default())
    }

    pub fn validate_with(&self, value: &Value, options: &ValidateOptions) -> ValidationResult {
        let mut errors = Vec::new();
        let normalized = match value {
            Value::Object(map) => Value::Object(self.check_object("", map, options, &mut errors)),
            other => {
                errors.push(FieldError::new(
                    "",
                    "\"value\" must be of type object",
                    other.clone(),
                ));
                other.clone()
            }
        };

        if errors.is_empty() {
            Ok(normalized)
        } else {
            Err(ValidationErrors::from(errors))
        }
    }

    pub(crate) fn check_object(
        &self,
        path: &str,
        map: &Map<String, Value>,
        options: &ValidateOptions,
        errors: &mut Vec<FieldError>,
    ) -> Map<String, Value> {
        let mut out = Map::new();

        for (name, field) in &self.fields {
            let field_path = join(path, name);
            if let Some(value) = field.check_value(&field_path, map.get(name), options, errors) {
                out.insert(name.clone(), value);
            }
        }

        for (key, value) in map {
            if self.fields.iter().any(|(name, _)| name == key) {
                continue;
            }
            if !options.strip_unknown {
                let key_path = join(path, key);
                errors.push(FieldError::new(
                    key_path.clone(),
                    format!("\"{key_path}\" is not allowed"),
                    value.clone(),
                ));
            }
        }

        out
    }
}

fn join(path: &str, key: &str) -> String {
    if path.is_empty() {
        key.to_string()
    } else {
        format!("{path}.{key}")
    }
}
