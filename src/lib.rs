//! # js-deobfuscate-rs
//!
//! A JavaScript deobfuscator: source is parsed into an oxc AST, a configured
//! pipeline of transformers rewrites the obfuscation patterns it recognizes,
//! and the tree is printed back out.
//!
//! ## Example
//!
//! ```rust,no_run
//! use js_deobfuscate_rs::{Options, deobfuscate};
//!
//! let code = r#"var a = ["log"]; console[a[0]]("hi");"#;
//! let output = deobfuscate(code, &Options::default()).expect("deobfuscation failed");
//! println!("{output}");
//! ```

pub mod codec;
pub mod context;
pub mod evaluate;
pub mod matcher;
pub mod node;
pub mod options;
pub mod pipeline;
pub mod scope;
pub mod transformers;
pub mod traverse;

use oxc_allocator::Allocator;
use oxc_ast::ast::Program;

pub use context::Context;
pub use matcher::{ArrayMode, Captures, Pattern, matches};
pub use options::{Options, SourceKind, TransformerConfig};
pub use pipeline::{OptionKind, OptionSpec, OptionValues, Pipeline, PipelineReport, TransformStats, Transformer, TransformerRegistry};
pub use scope::{Binding, ScopeModel};
pub use traverse::{Action, TraverseCtx, Visitor};

#[derive(Debug, thiserror::Error)]
pub enum DeobfuscateError {
    #[error("parse error at {line}:{column} (offset {offset}): {message}")]
    Parse {
        message: String,
        offset: u32,
        line: usize,
        column: usize,
    },

    #[error("unknown transformer `{0}`")]
    UnknownTransformer(String),

    #[error("transformer `{0}` is already registered")]
    DuplicateTransformer(String),

    #[error("unknown option `{option}` for transformer `{transformer}`")]
    UnknownOption { transformer: String, option: String },

    #[error("invalid option `{option}` for transformer `{transformer}`: {reason}")]
    InvalidOption {
        transformer: String,
        option: String,
        reason: String,
    },

    #[error("invalid configuration: {0}")]
    Config(#[from] serde_json::Error),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("transformer `{transformer}` failed: {message}")]
    Transform { transformer: String, message: String },
}

pub type Result<T> = std::result::Result<T, DeobfuscateError>;

/// Local failure inside a pass. Never aborts the pipeline: the traversal
/// engine and the transformers log it and leave the affected subtree alone.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransformError {
    #[error("{what} did not settle within {bound} iterations")]
    BoundExceeded { what: &'static str, bound: usize },

    #[error("unsafe rewrite: {0}")]
    UnsafeRewrite(String),

    #[error("unexpected node shape: {0}")]
    Shape(&'static str),

    #[error("{0}")]
    Failed(String),
}

/// Parses `source`, runs the configured pipeline and prints the result.
pub fn deobfuscate(source: &str, options: &Options) -> Result<String> {
    let registry = TransformerRegistry::new();
    let pipeline = Pipeline::build(&registry, &options.transformers)?;

    let allocator = Allocator::default();
    let mut cx = Context::parse(&allocator, source, options)?;
    pipeline.run(&mut cx)?;

    Ok(cx.generate())
}

/// Runs the pipeline over an already parsed program and hands the rewritten
/// tree back without printing it.
pub fn deobfuscate_program<'a>(
    allocator: &'a Allocator,
    program: Program<'a>,
    options: &Options,
) -> Result<Program<'a>> {
    let registry = TransformerRegistry::new();
    let pipeline = Pipeline::build(&registry, &options.transformers)?;

    let mut cx = Context::from_program(allocator, program, options);
    pipeline.run(&mut cx)?;

    Ok(cx.into_program())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_pipeline_runs() {
        let code = "var x = !0; if (x) { console.log('on'); }";
        let output = deobfuscate(code, &Options::default()).expect("deobfuscation failed");

        assert!(output.contains("console.log"), "got: {}", output);
        assert!(!output.contains("!0"), "Should fold !0, got: {}", output);
    }

    #[test]
    fn test_unknown_transformer_fails_before_parsing() {
        let mut options = Options::default();
        options.transformers = vec![TransformerConfig::named("no-such-pass")];

        let err = deobfuscate("this is not javascript (", &options).unwrap_err();
        assert!(matches!(err, DeobfuscateError::UnknownTransformer(ref n) if n == "no-such-pass"));
    }

    #[test]
    fn test_parse_error_reports_position() {
        let options = Options {
            transformers: Vec::new(),
            ..Options::default()
        };

        let err = deobfuscate("var a = ;\n", &options).unwrap_err();
        match err {
            DeobfuscateError::Parse { line, .. } => assert_eq!(line, 1),
            other => panic!("expected parse error, got {other:?}"),
        }
    }

    #[test]
    fn test_program_mode_returns_ast() {
        let allocator = Allocator::default();
        let ret = oxc_parser::Parser::new(&allocator, "var a = !1;", oxc_span::SourceType::mjs()).parse();
        let options = Options {
            transformers: vec![TransformerConfig::named("boolean-literals")],
            ..Options::default()
        };

        let program = deobfuscate_program(&allocator, ret.program, &options).expect("pipeline failed");
        let output = oxc_codegen::Codegen::new().build(&program).code;
        assert!(output.contains("false"), "got: {}", output);
    }
}
