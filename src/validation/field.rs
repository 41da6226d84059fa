//! Field rules and their checks.
//!
//! A [`Field`] is built with chained modifiers and checked against an
//! optional JSON value. Every violated rule is reported; checking never
//! stops at the first failure.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use regex::Regex;
use serde_json::{Number, Value};

use crate::sanitize::{sanitize_email, sanitize_url};
use crate::validation::error::FieldError;
use crate::validation::schema::{Schema, ValidateOptions};

const LOCAL_DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

/// Parse an ISO 8601 date or date-time. Values without an offset are UTC.
pub fn parse_iso_date(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Some(dt) = LOCAL_DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
    {
        return Some(dt.and_utc());
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}

/// Caller-supplied rule. Returns the error message on failure.
#[derive(Clone)]
pub struct Check(Arc<dyn Fn(&Value) -> Result<(), String> + Send + Sync>);

impl fmt::Debug for Check {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Check(..)")
    }
}

#[derive(Debug, Clone)]
enum Format {
    Email { tlds: Option<Vec<String>> },
    Uri,
    Uuid { v4_only: bool },
    IsoDate,
}

#[derive(Debug, Clone)]
struct Pattern {
    regex: Regex,
    message: Option<String>,
}

#[derive(Debug, Clone, Default)]
struct StringRules {
    min_len: Option<usize>,
    max_len: Option<usize>,
    trim: bool,
    lowercase: bool,
    pattern: Option<Pattern>,
    format: Option<Format>,
    valid: Option<Vec<String>>,
    not_before_now: bool,
}

#[derive(Debug, Clone, Default)]
struct NumberRules {
    min: Option<f64>,
    max: Option<f64>,
    integer: bool,
}

#[derive(Debug, Clone, Default)]
struct ArrayRules {
    items: Option<Box<Field>>,
    min_items: Option<usize>,
    max_items: Option<usize>,
}

#[derive(Debug, Clone)]
enum Kind {
    String(StringRules),
    Number(NumberRules),
    Boolean,
    Array(ArrayRules),
    Object(Schema),
}

/// Rules for a single field.
#[derive(Debug, Clone)]
pub struct Field {
    kind: Kind,
    required: bool,
    default: Option<Value>,
    allow_empty: bool,
    checks: Vec<Check>,
}

impl Field {
    fn of(kind: Kind) -> Self {
        Self {
            kind,
            required: false,
            default: None,
            allow_empty: false,
            checks: Vec::new(),
        }
    }

    pub fn string() -> Self {
        Self::of(Kind::String(StringRules::default()))
    }

    pub fn number() -> Self {
        Self::of(Kind::Number(NumberRules::default()))
    }

    pub fn boolean() -> Self {
        Self::of(Kind::Boolean)
    }

    pub fn array() -> Self {
        Self::of(Kind::Array(ArrayRules::default()))
    }

    pub fn object(schema: Schema) -> Self {
        Self::of(Kind::Object(schema))
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Value used when the field is absent.
    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    /// Accept `""` for a string field.
    pub fn allow_empty(mut self) -> Self {
        self.allow_empty = true;
        self
    }

    /// Extra rule evaluated after the built-in ones pass.
    pub fn check<F>(mut self, f: F) -> Self
    where
        F: Fn(&Value) -> Result<(), String> + Send + Sync + 'static,
    {
        self.checks.push(Check(Arc::new(f)));
        self
    }

    fn string_rules(&mut self) -> Option<&mut StringRules> {
        match &mut self.kind {
            Kind::String(rules) => Some(rules),
            _ => None,
        }
    }

    fn number_rules(&mut self) -> Option<&mut NumberRules> {
        match &mut self.kind {
            Kind::Number(rules) => Some(rules),
            _ => None,
        }
    }

    fn array_rules(&mut self) -> Option<&mut ArrayRules> {
        match &mut self.kind {
            Kind::Array(rules) => Some(rules),
            _ => None,
        }
    }

    pub fn min_len(mut self, n: usize) -> Self {
        if let Some(rules) = self.string_rules() {
            rules.min_len = Some(n);
        }
        self
    }

    pub fn max_len(mut self, n: usize) -> Self {
        if let Some(rules) = self.string_rules() {
            rules.max_len = Some(n);
        }
        self
    }

    pub fn trim(mut self) -> Self {
        if let Some(rules) = self.string_rules() {
            rules.trim = true;
        }
        self
    }

    pub fn lowercase(mut self) -> Self {
        if let Some(rules) = self.string_rules() {
            rules.lowercase = true;
        }
        self
    }

    pub fn pattern(mut self, regex: Regex, message: Option<&str>) -> Self {
        if let Some(rules) = self.string_rules() {
            rules.pattern = Some(Pattern {
                regex,
                message: message.map(str::to_string),
            });
        }
        self
    }

    /// Restrict to one of the given values.
    pub fn one_of(mut self, values: &[&str]) -> Self {
        if let Some(rules) = self.string_rules() {
            rules.valid = Some(values.iter().map(|v| v.to_string()).collect());
        }
        self
    }

    pub fn email(mut self) -> Self {
        if let Some(rules) = self.string_rules() {
            rules.format = Some(Format::Email { tlds: None });
        }
        self
    }

    /// Email whose top-level domain is in `tlds`.
    pub fn email_with_tlds(mut self, tlds: &[&str]) -> Self {
        if let Some(rules) = self.string_rules() {
            rules.format = Some(Format::Email {
                tlds: Some(tlds.iter().map(|t| t.to_string()).collect()),
            });
        }
        self
    }

    /// Absolute `http`/`https` URI.
    pub fn uri(mut self) -> Self {
        if let Some(rules) = self.string_rules() {
            rules.format = Some(Format::Uri);
        }
        self
    }

    pub fn uuid(mut self) -> Self {
        if let Some(rules) = self.string_rules() {
            rules.format = Some(Format::Uuid { v4_only: false });
        }
        self
    }

    pub fn uuid_v4(mut self) -> Self {
        if let Some(rules) = self.string_rules() {
            rules.format = Some(Format::Uuid { v4_only: true });
        }
        self
    }

    pub fn iso_date(mut self) -> Self {
        if let Some(rules) = self.string_rules() {
            rules.format = Some(Format::IsoDate);
        }
        self
    }

    /// ISO 8601 date no earlier than the moment of validation.
    pub fn min_date_now(mut self) -> Self {
        if let Some(rules) = self.string_rules() {
            rules.format = Some(Format::IsoDate);
            rules.not_before_now = true;
        }
        self
    }

    pub fn min(mut self, n: f64) -> Self {
        if let Some(rules) = self.number_rules() {
            rules.min = Some(n);
        }
        self
    }

    pub fn max(mut self, n: f64) -> Self {
        if let Some(rules) = self.number_rules() {
            rules.max = Some(n);
        }
        self
    }

    pub fn integer(mut self) -> Self {
        if let Some(rules) = self.number_rules() {
            rules.integer = true;
        }
        self
    }

    pub fn items(mut self, item: Field) -> Self {
        if let Some(rules) = self.array_rules() {
            rules.items = Some(Box::new(item));
        }
        self
    }

    pub fn min_items(mut self, n: usize) -> Self {
        if let Some(rules) = self.array_rules() {
            rules.min_items = Some(n);
        }
        self
    }

    pub fn max_items(mut self, n: usize) -> Self {
        if let Some(rules) = self.array_rules() {
            rules.max_items = Some(n);
        }
        self
    }

    /// Check `value` at `path`, pushing every violation into `errors`.
    ///
    /// Returns the normalized value to keep, or `None` when the field is
    /// absent and has no default.
    pub(crate) fn check_value(
        &self,
        path: &str,
        value: Option<&Value>,
        options: &ValidateOptions,
        errors: &mut Vec<FieldError>,
    ) -> Option<Value> {
        let Some(value) = value else {
            if let Some(default) = &self.default {
                return Some(default.clone());
            }
            if self.required {
                errors.push(FieldError::new(
                    path,
                    format!("\"{path}\" is required"),
                    Value::Null,
                ));
            }
            return None;
        };

        let before = errors.len();
        let normalized = match &self.kind {
            Kind::String(rules) => self.check_string(rules, path, value, options, errors),
            Kind::Number(rules) => check_number(rules, path, value, options, errors),
            Kind::Boolean => check_boolean(path, value, options, errors),
            Kind::Array(rules) => check_array(rules, path, value, options, errors),
            Kind::Object(schema) => match value {
                Value::Object(map) => Value::Object(schema.check_object(path, map, options, errors)),
                other => {
                    errors.push(type_error(path, "of type object", other));
                    other.clone()
                }
            },
        };

        if errors.len() == before {
            for check in &self.checks {
                if let Err(message) = (check.0)(&normalized) {
                    errors.push(FieldError::new(path, message, normalized.clone()));
                }
            }
        }

        Some(normalized)
    }

    fn check_string(
        &self,
        rules: &StringRules,
        path: &str,
        value: &Value,
        options: &ValidateOptions,
        errors: &mut Vec<FieldError>,
    ) -> Value {
        let Value::String(raw) = value else {
            errors.push(type_error(path, "a string", value));
            return value.clone();
        };

        let mut s = raw.clone();
        if options.convert {
            if rules.trim {
                s = s.trim().to_string();
            }
            if rules.lowercase {
                s = s.to_lowercase();
            }
        }
        let current = Value::String(s.clone());

        if s.is_empty() {
            if !self.allow_empty {
                errors.push(FieldError::new(
                    path,
                    format!("\"{path}\" is not allowed to be empty"),
                    current.clone(),
                ));
            }
            return current;
        }

        if let Some(valid) = &rules.valid {
            if !valid.iter().any(|v| v == &s) {
                errors.push(FieldError::new(
                    path,
                    format!("\"{path}\" must be one of [{}]", valid.join(", ")),
                    current.clone(),
                ));
            }
            return current;
        }

        let len = s.chars().count();
        if let Some(min) = rules.min_len {
            if len < min {
                errors.push(FieldError::new(
                    path,
                    format!("\"{path}\" length must be at least {min} characters long"),
                    current.clone(),
                ));
            }
        }
        if let Some(max) = rules.max_len {
            if len > max {
                errors.push(FieldError::new(
                    path,
                    format!("\"{path}\" length must be less than or equal to {max} characters long"),
                    current.clone(),
                ));
            }
        }
        if let Some(pattern) = &rules.pattern {
            if !pattern.regex.is_match(&s) {
                let message = pattern.message.clone().unwrap_or_else(|| {
                    format!(
                        "\"{path}\" with value \"{s}\" fails to match the required pattern: {}",
                        pattern.regex.as_str()
                    )
                });
                errors.push(FieldError::new(path, message, current.clone()));
            }
        }
        if let Some(format) = &rules.format {
            if let Some(expected) = format_violation(format, &s) {
                errors.push(FieldError::new(
                    path,
                    format!("\"{path}\" must be {expected}"),
                    current.clone(),
                ));
            } else if rules.not_before_now
                && parse_iso_date(&s).is_some_and(|date| date < Utc::now())
            {
                errors.push(FieldError::new(
                    path,
                    format!("\"{path}\" must be greater than or equal to \"now\""),
                    current.clone(),
                ));
            }
        }

        current
    }
}

fn type_error(path: &str, expected: &str, value: &Value) -> FieldError {
    FieldError::new(path, format!("\"{path}\" must be {expected}"), value.clone())
}

/// Description of the expected format when `s` does not satisfy it.
fn format_violation(format: &Format, s: &str) -> Option<&'static str> {
    let ok = match format {
        Format::Email { tlds } => {
            sanitize_email(s).is_some()
                && tlds.as_ref().map_or(true, |allowed| {
                    s.rsplit('.')
                        .next()
                        .is_some_and(|tld| allowed.iter().any(|a| a.eq_ignore_ascii_case(tld)))
                })
        }
        // Request values are HTML-escaped before validation, slashes included.
        Format::Uri => sanitize_url(&s.replace("&#x2F;", "/")).is_some(),
        Format::Uuid { v4_only } => uuid::Uuid::parse_str(s)
            .map(|id| !v4_only || id.get_version_num() == 4)
            .unwrap_or(false),
        Format::IsoDate => parse_iso_date(s).is_some(),
    };
    if ok {
        return None;
    }
    Some(match format {
        Format::Email { .. } => "a valid email",
        Format::Uri => "a valid uri",
        Format::Uuid { .. } => "a valid GUID",
        Format::IsoDate => "in ISO 8601 date format",
    })
}

fn check_number(
    rules: &NumberRules,
    path: &str,
    value: &Value,
    options: &ValidateOptions,
    errors: &mut Vec<FieldError>,
) -> Value {
    let number = match value {
        Value::Number(n) => n.clone(),
        Value::String(s) if options.convert => match parse_number(s.trim()) {
            Some(n) => n,
            None => {
                errors.push(type_error(path, "a number", value));
                return value.clone();
            }
        },
        other => {
            errors.push(type_error(path, "a number", other));
            return other.clone();
        }
    };
    let current = Value::Number(number.clone());
    let Some(n) = number.as_f64() else {
        errors.push(type_error(path, "a number", &current));
        return current;
    };

    if rules.integer && n.fract() != 0.0 {
        errors.push(type_error(path, "an integer", &current));
    }
    if let Some(min) = rules.min {
        if n < min {
            errors.push(FieldError::new(
                path,
                format!("\"{path}\" must be greater than or equal to {min}"),
                current.clone(),
            ));
        }
    }
    if let Some(max) = rules.max {
        if n > max {
            errors.push(FieldError::new(
                path,
                format!("\"{path}\" must be less than or equal to {max}"),
                current.clone(),
            ));
        }
    }
    current
}

fn parse_number(s: &str) -> Option<Number> {
    if s.is_empty() {
        return None;
    }
    if let Ok(i) = s.parse::<i64>() {
        return Some(Number::from(i));
    }
    s.parse::<f64>().ok().and_then(Number::from_f64)
}

fn check_boolean(
    path: &str,
    value: &Value,
    options: &ValidateOptions,
    errors: &mut Vec<FieldError>,
) -> Value {
    match value {
        Value::Bool(_) => value.clone(),
        Value::String(s) if options.convert && s.eq_ignore_ascii_case("true") => Value::Bool(true),
        Value::String(s) if options.convert && s.eq_ignore_ascii_case("false") => Value::Bool(false),
        other => {
            errors.push(type_error(path, "a boolean", other));
            other.clone()
        }
    }
}

fn check_array(
    rules: &ArrayRules,
    path: &str,
    value: &Value,
    options: &ValidateOptions,
    errors: &mut Vec<FieldError>,
) -> Value {
    let Value::Array(items) = value else {
        errors.push(type_error(path, "an array", value));
        return value.clone();
    };

    let normalized: Vec<Value> = match &rules.items {
        Some(item_rule) => items
            .iter()
            .enumerate()
            .map(|(i, item)| {
                let item_path = format!("{path}.{i}");
                item_rule
                    .check_value(&item_path, Some(item), options, errors)
                    .unwrap_or_else(|| item.clone())
            })
            .collect(),
        None => items.clone(),
    };
    let current = Value::Array(normalized);

    if let Some(min) = rules.min_items {
        if items.len() < min {
            errors.push(FieldError::new(
                path,
                format!("\"{path}\" must contain at least {min} items"),
                current.clone(),
            ));
        }
    }
    if let Some(max) = rules.max_items {
        if items.len() > max {
            errors.push(FieldError::new(
                path,
                format!("\"{path}\" must contain less than or equal to {max} items"),
                current.clone(),
            ));
        }
    }
    current
}
