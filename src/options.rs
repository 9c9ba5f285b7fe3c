use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::Result;
use crate::transformers::DEFAULT_ORDER;

/// Run configuration for one deobfuscation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Options {
    pub source_type: SourceKind,
    /// Accept the parser's recovered tree instead of failing on the first error.
    pub loose: bool,
    pub comments: bool,
    pub transformers: Vec<TransformerConfig>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    #[default]
    Module,
    Script,
    Unambiguous,
}

/// One pipeline entry: a transformer name plus its raw, unvalidated options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransformerConfig {
    pub name: String,
    #[serde(default = "empty_object")]
    pub options: serde_json::Value,
}

fn empty_object() -> serde_json::Value {
    serde_json::Value::Object(serde_json::Map::new())
}

impl TransformerConfig {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            options: empty_object(),
        }
    }

    pub fn with_options(name: impl Into<String>, options: serde_json::Value) -> Self {
        Self {
            name: name.into(),
            options,
        }
    }
}

impl Default for Options {
    fn default() -> Self {
        Self {
            source_type: SourceKind::Module,
            loose: false,
            comments: true,
            transformers: DEFAULT_ORDER.iter().map(|name| TransformerConfig::named(*name)).collect(),
        }
    }
}

impl Options {
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_use_builtin_order() {
        let options = Options::default();
        let names: Vec<&str> = options.transformers.iter().map(|t| t.name.as_str()).collect();

        assert_eq!(names, DEFAULT_ORDER);
        assert_eq!(options.source_type, SourceKind::Module);
        assert!(!options.loose);
        assert!(options.comments);
    }

    #[test]
    fn test_from_json() {
        let json = r#"{
            "sourceType": "script",
            "loose": true,
            "transformers": [
                { "name": "string-array", "options": { "rotationMultiplier": 3 } },
                { "name": "dead-code" }
            ]
        }"#;

        let options = Options::from_json_str(json).expect("valid config");
        assert_eq!(options.source_type, SourceKind::Script);
        assert!(options.loose);
        assert!(options.comments, "Missing fields should keep defaults");
        assert_eq!(options.transformers.len(), 2);
        assert_eq!(options.transformers[0].options["rotationMultiplier"], 3);
        assert!(options.transformers[1].options.as_object().is_some_and(|o| o.is_empty()));
    }

    #[test]
    fn test_bad_source_type_is_config_error() {
        let err = Options::from_json_str(r#"{ "sourceType": "typescript" }"#).unwrap_err();
        assert!(matches!(err, crate::DeobfuscateError::Config(_)));
    }
}
