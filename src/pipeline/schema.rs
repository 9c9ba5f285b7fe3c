//! Transformer option schemas and their validation.

use rustc_hash::FxHashMap;
use serde_json::Value;

use crate::{DeobfuscateError, Result};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OptionKind {
    Bool {
        default: bool,
    },
    Integer {
        default: i64,
        min: i64,
        max: i64,
    },
    Float {
        default: f64,
        min: f64,
        max: f64,
    },
    String {
        default: &'static str,
    },
    OneOf {
        default: &'static str,
        choices: &'static [&'static str],
    },
}

/// One declared option of a transformer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OptionSpec {
    pub name: &'static str,
    pub kind: OptionKind,
    pub description: &'static str,
}

impl OptionSpec {
    pub const fn new(name: &'static str, kind: OptionKind, description: &'static str) -> Self {
        Self {
            name,
            kind,
            description,
        }
    }

    pub fn default_value(&self) -> OptionValue {
        match self.kind {
            OptionKind::Bool { default } => OptionValue::Bool(default),
            OptionKind::Integer { default, .. } => OptionValue::Integer(default),
            OptionKind::Float { default, .. } => OptionValue::Float(default),
            OptionKind::String { default } | OptionKind::OneOf { default, .. } => {
                OptionValue::String(default.to_string())
            }
        }
    }

    /// Checks `value` against the declared kind. The error is the reason text.
    fn check(&self, value: &Value) -> std::result::Result<OptionValue, String> {
        match self.kind {
            OptionKind::Bool { .. } => value
                .as_bool()
                .map(OptionValue::Bool)
                .ok_or_else(|| format!("expected a boolean, got {value}")),
            OptionKind::Integer { min, max, .. } => {
                let n = value
                    .as_i64()
                    .ok_or_else(|| format!("expected an integer, got {value}"))?;
                if n < min || n > max {
                    return Err(format!("{n} is outside {min}..={max}"));
                }
                Ok(OptionValue::Integer(n))
            }
            OptionKind::Float { min, max, .. } => {
                let n = value
                    .as_f64()
                    .ok_or_else(|| format!("expected a number, got {value}"))?;
                if n < min || n > max {
                    return Err(format!("{n} is outside {min}..={max}"));
                }
                Ok(OptionValue::Float(n))
            }
            OptionKind::String { .. } => value
                .as_str()
                .map(|s| OptionValue::String(s.to_string()))
                .ok_or_else(|| format!("expected a string, got {value}")),
            OptionKind::OneOf { choices, .. } => {
                let s = value
                    .as_str()
                    .ok_or_else(|| format!("expected a string, got {value}"))?;
                if !choices.contains(&s) {
                    return Err(format!("`{s}` is not one of {}", choices.join(", ")));
                }
                Ok(OptionValue::String(s.to_string()))
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum OptionValue {
    Bool(bool),
    Integer(i64),
    Float(f64),
    String(String),
}

impl std::fmt::Display for OptionValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{b}"),
            Self::Integer(n) => write!(f, "{n}"),
            Self::Float(n) => write!(f, "{n}"),
            Self::String(s) => write!(f, "\"{s}\""),
        }
    }
}

/// Validated options of one pipeline entry, defaults filled in.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OptionValues {
    values: FxHashMap<&'static str, OptionValue>,
}

impl OptionValues {
    /// Checks `raw` against `schema`. `raw` must be an object or null.
    pub fn validate(transformer: &str, schema: &[OptionSpec], raw: &Value) -> Result<Self> {
        let mut values: FxHashMap<&'static str, OptionValue> =
            schema.iter().map(|spec| (spec.name, spec.default_value())).collect();

        let entries = match raw {
            Value::Null => return Ok(Self { values }),
            Value::Object(map) => map,
            other => {
                return Err(DeobfuscateError::InvalidOption {
                    transformer: transformer.to_string(),
                    option: "options".to_string(),
                    reason: format!("expected an object, got {other}"),
                });
            }
        };

        for (key, value) in entries {
            let spec = schema
                .iter()
                .find(|spec| spec.name == key)
                .ok_or_else(|| DeobfuscateError::UnknownOption {
                    transformer: transformer.to_string(),
                    option: key.clone(),
                })?;
            let checked = spec.check(value).map_err(|reason| DeobfuscateError::InvalidOption {
                transformer: transformer.to_string(),
                option: key.clone(),
                reason,
            })?;
            values.insert(spec.name, checked);
        }

        Ok(Self { values })
    }

    pub fn get(&self, name: &str) -> Option<&OptionValue> {
        self.values.get(name)
    }

    pub fn bool(&self, name: &str) -> Option<bool> {
        match self.values.get(name) {
            Some(OptionValue::Bool(b)) => Some(*b),
            _ => None,
        }
    }

    pub fn integer(&self, name: &str) -> Option<i64> {
        match self.values.get(name) {
            Some(OptionValue::Integer(n)) => Some(*n),
            _ => None,
        }
    }

    pub fn float(&self, name: &str) -> Option<f64> {
        match self.values.get(name) {
            Some(OptionValue::Float(n)) => Some(*n),
            Some(OptionValue::Integer(n)) => Some(*n as f64),
            _ => None,
        }
    }

    pub fn string(&self, name: &str) -> Option<&str> {
        match self.values.get(name) {
            Some(OptionValue::String(s)) => Some(s),
            _ => None,
        }
    }
}
