use super::Transformer;
use crate::{DeobfuscateError, Result};

/// Name → transformer lookup. Names compare case-insensitively.
pub struct TransformerRegistry {
    transformers: Vec<Box<dyn Transformer>>,
}

impl TransformerRegistry {
    /// Registry holding every built-in transformer.
    pub fn new() -> Self {
        Self {
            transformers: crate::transformers::builtin(),
        }
    }

    pub fn empty() -> Self {
        Self {
            transformers: Vec::new(),
        }
    }

    pub fn register(&mut self, transformer: Box<dyn Transformer>) -> Result<()> {
        if self.get(transformer.name()).is_some() {
            return Err(DeobfuscateError::DuplicateTransformer(transformer.name().to_string()));
        }
        self.transformers.push(transformer);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&dyn Transformer> {
        self.transformers
            .iter()
            .find(|t| t.name().eq_ignore_ascii_case(name))
            .map(|t| t.as_ref())
    }

    pub fn names(&self) -> Vec<&str> {
        self.transformers.iter().map(|t| t.name()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &dyn Transformer> {
        self.transformers.iter().map(|t| t.as_ref())
    }
}

impl Default for TransformerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Context;
    use crate::pipeline::{OptionSpec, OptionValues, TransformStats};

    struct Named(&'static str);

    impl Transformer for Named {
        fn name(&self) -> &'static str {
            self.0
        }

        fn description(&self) -> &'static str {
            "test"
        }

        fn options(&self) -> &'static [OptionSpec] {
            &[]
        }

        fn run(&self, _cx: &mut Context<'_>, _options: &OptionValues) -> Result<TransformStats> {
            Ok(TransformStats::default())
        }
    }

    #[test]
    fn test_lookup_ignores_case() {
        let registry = TransformerRegistry::new();
        assert!(registry.get("String-Array").is_some());
        assert!(registry.get("DEAD-CODE").is_some());
        assert!(registry.get("nope").is_none());
    }

    #[test]
    fn test_duplicate_rejected() {
        let mut registry = TransformerRegistry::empty();
        registry.register(Box::new(Named("marker"))).expect("first registration");

        let err = registry.register(Box::new(Named("MARKER"))).unwrap_err();
        assert!(matches!(err, DeobfuscateError::DuplicateTransformer(ref n) if n == "MARKER"));
        assert_eq!(registry.names(), vec!["marker"]);
    }

    #[test]
    fn test_builtin_names_unique() {
        let registry = TransformerRegistry::new();
        let names = registry.names();
        for (i, name) in names.iter().enumerate() {
            assert!(
                !names[..i].iter().any(|other| other.eq_ignore_ascii_case(name)),
                "duplicate {name}"
            );
        }
        assert_eq!(names, crate::transformers::DEFAULT_ORDER);
    }
}
