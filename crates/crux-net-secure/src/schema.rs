//! A small typed JSON schema.
//!
//! Covers what protocol messages need: strings with length bounds, string
//! enums, arrays, and objects with required/optional keys. Validation stops
//! at the first violation and reports its JSON path.

use std::collections::BTreeMap;
use std::fmt;

use serde_json::Value;

/// Shape a JSON value must have.
#[derive(Debug, Clone, PartialEq)]
pub enum Schema {
    /// Any value, including null.
    Any,
    String {
        exact_len: Option<usize>,
        min_len: Option<usize>,
        max_len: Option<usize>,
    },
    Number,
    Boolean,
    /// A string drawn from a fixed set.
    Enum(Vec<String>),
    /// An array, optionally with a schema every item must satisfy.
    Array(Option<Box<Schema>>),
    Object {
        properties: BTreeMap<String, Field>,
        additional_properties: bool,
        /// At least one of these keys must be present.
        any_of_required: Vec<String>,
    },
}

/// One property of an object schema.
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub schema: Schema,
    pub required: bool,
}

/// Where and why a value failed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    /// JSON path, `$` for the root.
    pub path: String,
    pub reason: String,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path, self.reason)
    }
}

impl std::error::Error for Violation {}

impl Schema {
    /// Any string.
    pub fn string() -> Self {
        Schema::String {
            exact_len: None,
            min_len: None,
            max_len: None,
        }
    }

    /// A string of exactly `len` characters.
    pub fn string_len(len: usize) -> Self {
        Schema::String {
            exact_len: Some(len),
            min_len: None,
            max_len: None,
        }
    }

    pub fn enumeration<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Schema::Enum(values.into_iter().map(Into::into).collect())
    }

    pub fn array_of(items: Schema) -> Self {
        Schema::Array(Some(Box::new(items)))
    }

    /// An object with no properties that rejects unknown keys.
    pub fn object() -> Self {
        Schema::Object {
            properties: BTreeMap::new(),
            additional_properties: false,
            any_of_required: Vec::new(),
        }
    }

    /// Add a required property. No-op on non-object schemas.
    pub fn required(self, name: &str, schema: Schema) -> Self {
        self.property(name, schema, true)
    }

    /// Add an optional property. No-op on non-object schemas.
    pub fn optional(self, name: &str, schema: Schema) -> Self {
        self.property(name, schema, false)
    }

    /// Require at least one of `names` to be present.
    pub fn any_of(mut self, names: &[&str]) -> Self {
        if let Schema::Object {
            any_of_required, ..
        } = &mut self
        {
            *any_of_required = names.iter().map(|n| (*n).to_owned()).collect();
        }
        self
    }

    pub fn allow_additional(mut self) -> Self {
        if let Schema::Object {
            additional_properties,
            ..
        } = &mut self
        {
            *additional_properties = true;
        }
        self
    }

    fn property(mut self, name: &str, schema: Schema, required: bool) -> Self {
        if let Schema::Object { properties, .. } = &mut self {
            properties.insert(name.to_owned(), Field { schema, required });
        }
        self
    }

    /// Validate `value`, reporting the first violation.
    pub fn validate(&self, value: &Value) -> Result<(), Violation> {
        self.validate_at(value, "$")
    }

    fn validate_at(&self, value: &Value, path: &str) -> Result<(), Violation> {
        let fail = |reason: String| {
            Err(Violation {
                path: path.to_owned(),
                reason,
            })
        };

        match self {
            Schema::Any => Ok(()),

            Schema::String {
                exact_len,
                min_len,
                max_len,
            } => {
                let s = match value.as_str() {
                    Some(s) => s,
                    None => return fail(format!("expected string, got {}", kind(value))),
                };
                let len = s.chars().count();
                if let Some(exact) = exact_len {
                    if len != *exact {
                        return fail(format!("expected length {exact}, got {len}"));
                    }
                }
                if let Some(min) = min_len {
                    if len < *min {
                        return fail(format!("shorter than {min}"));
                    }
                }
                if let Some(max) = max_len {
                    if len > *max {
                        return fail(format!("longer than {max}"));
                    }
                }
                Ok(())
            }

            Schema::Number if value.is_number() => Ok(()),
            Schema::Number => fail(format!("expected number, got {}", kind(value))),

            Schema::Boolean if value.is_boolean() => Ok(()),
            Schema::Boolean => fail(format!("expected boolean, got {}", kind(value))),

            Schema::Enum(allowed) => match value.as_str() {
                Some(s) if allowed.iter().any(|a| a == s) => Ok(()),
                Some(s) => fail(format!("{s:?} is not one of {allowed:?}")),
                None => fail(format!("expected string, got {}", kind(value))),
            },

            Schema::Array(items) => {
                let array = match value.as_array() {
                    Some(a) => a,
                    None => return fail(format!("expected array, got {}", kind(value))),
                };
                if let Some(items) = items {
                    for (i, item) in array.iter().enumerate() {
                        items.validate_at(item, &format!("{path}[{i}]"))?;
                    }
                }
                Ok(())
            }

            Schema::Object {
                properties,
                additional_properties,
                any_of_required,
            } => {
                let map = match value.as_object() {
                    Some(m) => m,
                    None => return fail(format!("expected object, got {}", kind(value))),
                };

                for (name, field) in properties {
                    let child = format!("{path}.{name}");
                    match map.get(name) {
                        Some(v) => field.schema.validate_at(v, &child)?,
                        None if field.required => {
                            return Err(Violation {
                                path: child,
                                reason: "missing required property".into(),
                            })
                        }
                        None => {}
                    }
                }

                if !additional_properties {
                    if let Some(extra) = map.keys().find(|k| !properties.contains_key(*k)) {
                        return Err(Violation {
                            path: format!("{path}.{extra}"),
                            reason: "unexpected property".into(),
                        });
                    }
                }

                if !any_of_required.is_empty()
                    && !any_of_required.iter().any(|k| map.contains_key(k))
                {
                    return fail(format!("expected one of {any_of_required:?}"));
                }
                Ok(())
            }
        }
    }
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
