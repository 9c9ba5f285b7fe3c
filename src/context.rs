//! Per-run state shared by every transformer.

use rustc_hash::FxHashMap;

use oxc_allocator::Allocator;
use oxc_ast::AstBuilder;
use oxc_ast::ast::Program;
use oxc_codegen::{Codegen, CodegenOptions, CommentOptions, LegalComment};
use oxc_parser::{ParseOptions, Parser};
use oxc_span::SourceType;

use crate::node::NodeKey;
use crate::options::{Options, SourceKind};
use crate::scope::ScopeModel;
use crate::transformers::control_flow_storage::ControlFlowStorage;
use crate::traverse::{TraverseReport, Visitor, traverse};
use crate::{DeobfuscateError, Result};

/// The tree being rewritten, its scope snapshot and the run caches.
pub struct Context<'a> {
    pub allocator: &'a Allocator,
    pub ast: AstBuilder<'a>,
    pub program: Program<'a>,
    scope: ScopeModel,
    comments: bool,
    storages: FxHashMap<NodeKey, ControlFlowStorage<'a>>,
}

impl<'a> Context<'a> {
    /// Parses `source`. Outside loose mode the first diagnostic is fatal.
    pub fn parse(allocator: &'a Allocator, source: &'a str, options: &Options) -> Result<Self> {
        let source_type = match options.source_type {
            SourceKind::Module => SourceType::mjs(),
            SourceKind::Script => SourceType::cjs(),
            SourceKind::Unambiguous => SourceType::unambiguous(),
        };
        let parse_options = ParseOptions {
            allow_return_outside_function: true,
            preserve_parens: false,
            ..ParseOptions::default()
        };
        let ret = Parser::new(allocator, source, source_type)
            .with_options(parse_options)
            .parse();

        let fatal = !options.loose || ret.panicked;
        if let Some(first) = ret.errors.first().filter(|_| fatal) {
            let offset = first
                .labels
                .as_ref()
                .and_then(|labels| labels.first())
                .map_or(0, |label| label.offset());
            let (line, column) = line_column(source, offset);
            return Err(DeobfuscateError::Parse {
                message: first.to_string(),
                offset: u32::try_from(offset).unwrap_or(u32::MAX),
                line,
                column,
            });
        }
        for error in &ret.errors {
            log::warn!("recovered from parse error: {error}");
        }

        Ok(Self::from_program(allocator, ret.program, options))
    }

    /// Wraps a program parsed elsewhere.
    pub fn from_program(allocator: &'a Allocator, program: Program<'a>, options: &Options) -> Self {
        let scope = ScopeModel::crawl(&program);
        Self {
            allocator,
            ast: AstBuilder::new(allocator),
            program,
            scope,
            comments: options.comments,
            storages: FxHashMap::default(),
        }
    }

    /// Scope snapshot from the last [`Context::crawl`].
    pub const fn scope(&self) -> &ScopeModel {
        &self.scope
    }

    /// Recomputes every binding from the current tree. Call this after any
    /// edit that adds or drops identifier references.
    pub fn crawl(&mut self) {
        self.scope = ScopeModel::crawl(&self.program);
    }

    pub fn traverse<V: Visitor<'a>>(&mut self, visitor: &mut V) -> TraverseReport {
        traverse(self.ast, &mut self.program, &self.scope, visitor)
    }

    /// Control-flow storage objects found so far, keyed by their block.
    pub fn control_flow_storage(&mut self) -> &mut FxHashMap<NodeKey, ControlFlowStorage<'a>> {
        &mut self.storages
    }

    pub fn generate(&self) -> String {
        let mut options = CodegenOptions::default();
        if !self.comments {
            options.comments = CommentOptions {
                normal: false,
                jsdoc: false,
                annotation: false,
                legal: LegalComment::None,
            };
        }
        Codegen::new().with_options(options).build(&self.program).code
    }

    pub fn into_program(self) -> Program<'a> {
        self.program
    }
}

/// One-based line and column of a byte offset.
fn line_column(source: &str, offset: usize) -> (usize, usize) {
    let prefix = source.get(..offset.min(source.len())).unwrap_or(source);
    let line = prefix.matches('\n').count() + 1;
    let column = prefix.rfind('\n').map_or(prefix.len(), |nl| prefix.len() - nl - 1) + 1;
    (line, column)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_line_column() {
        assert_eq!(line_column("abc", 0), (1, 1));
        assert_eq!(line_column("ab\ncd", 4), (2, 2));
    }

    #[test]
    fn test_loose_mode_still_fails_when_parser_gives_up() {
        let allocator = Allocator::default();
        let options = Options {
            loose: true,
            ..Options::default()
        };

        assert!(Context::parse(&allocator, "function (", &options).is_err());
    }

    #[test]
    fn test_script_source_type() {
        let allocator = Allocator::default();
        let options = Options {
            source_type: SourceKind::Script,
            ..Options::default()
        };
        let cx = Context::parse(&allocator, "with (o) { a = 1; }", &options).expect("sloppy script parses");
        assert!(cx.generate().contains("with"));
    }

    #[test]
    fn test_comments_toggle() {
        let allocator = Allocator::default();
        let source = "/** keep */\nfunction foo() {}";
        let with = Context::parse(&allocator, source, &Options::default()).expect("parses");
        assert!(with.generate().contains("keep"));

        let options = Options {
            comments: false,
            ..Options::default()
        };
        let without = Context::parse(&allocator, source, &options).expect("parses");
        assert!(!without.generate().contains("keep"));
    }
}
