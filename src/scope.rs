//! Scope and binding snapshot.
//!
//! [`ScopeModel::crawl`] runs the oxc semantic analyzer over the current tree
//! and copies out what the passes ask about: which declaration a name
//! resolves to, where it is read and written, and whether it is still used.
//! The snapshot does not follow later edits. Any pass that adds or removes
//! identifier references must crawl again before trusting a [`Binding`].

use rustc_hash::FxHashMap;

use oxc_ast::ast::Program;
use oxc_semantic::{Scoping, SemanticBuilder};
use oxc_span::{GetSpan, Span};
use oxc_syntax::scope::ScopeId;
use oxc_syntax::symbol::{SymbolFlags, SymbolId};

use crate::node::NodeKey;

/// A declared name and its uses at crawl time.
#[derive(Debug, Clone)]
pub struct Binding {
    pub name: String,
    pub symbol_id: SymbolId,
    pub scope_id: ScopeId,
    pub flags: SymbolFlags,
    /// Span of the binding identifier itself.
    pub identifier: Span,
    /// Span of the declaring node (declarator, function, parameter).
    pub declaration: Span,
    /// Sites that read the value.
    pub references: Vec<Span>,
    /// Assignments and redeclarations after the original declaration.
    pub constant_violations: Vec<Span>,
    pub constant: bool,
    pub referenced: bool,
}

impl Binding {
    /// True while some read remains. With `check_descendants_only`, reads
    /// nested inside the binding's own declaration do not count, so a
    /// function that only calls itself reads as unreferenced.
    pub fn is_referenced(&self, check_descendants_only: bool) -> bool {
        if !check_descendants_only {
            return self.referenced;
        }
        let declaration = NodeKey::of(self.declaration);
        self.references
            .iter()
            .any(|site| !declaration.contains(NodeKey::of(*site)))
    }

    pub fn is_function(&self) -> bool {
        self.flags.contains(SymbolFlags::Function)
    }

    /// Number of write sites, declaration excluded.
    pub fn violation_count(&self) -> usize {
        self.constant_violations.len()
    }
}

pub struct ScopeModel {
    scoping: Scoping,
    bindings: FxHashMap<SymbolId, Binding>,
    declared: FxHashMap<(ScopeId, String), SymbolId>,
    by_site: FxHashMap<NodeKey, SymbolId>,
    globals: FxHashMap<String, Vec<Span>>,
}

impl ScopeModel {
    /// Rebuilds every binding from the current state of `program`.
    pub fn crawl(program: &Program<'_>) -> Self {
        let ret = SemanticBuilder::new().with_check_syntax_error(false).build(program);
        let semantic = ret.semantic;

        let mut bindings = FxHashMap::default();
        let mut declared = FxHashMap::default();
        let mut by_site = FxHashMap::default();

        {
            let scoping = semantic.scoping();
            for symbol_id in scoping.symbol_ids() {
                let name = scoping.symbol_name(symbol_id).to_string();
                let scope_id = scoping.symbol_scope_id(symbol_id);
                let identifier = scoping.symbol_span(symbol_id);
                let declaration = semantic
                    .nodes()
                    .get_node(scoping.symbol_declaration(symbol_id))
                    .kind()
                    .span();

                let mut references = Vec::new();
                let mut constant_violations = Vec::new();
                for reference in semantic.symbol_references(symbol_id) {
                    let span = semantic.reference_span(reference);
                    if reference.is_read() {
                        references.push(span);
                    }
                    if reference.is_write() {
                        constant_violations.push(span);
                    }
                    by_site.insert(NodeKey::of(span), symbol_id);
                }
                for redeclaration in scoping.symbol_redeclarations(symbol_id) {
                    constant_violations.push(redeclaration.span);
                }

                by_site.insert(NodeKey::of(identifier), symbol_id);
                declared.insert((scope_id, name.clone()), symbol_id);
                bindings.insert(
                    symbol_id,
                    Binding {
                        constant: constant_violations.is_empty(),
                        referenced: !references.is_empty(),
                        name,
                        symbol_id,
                        scope_id,
                        flags: scoping.symbol_flags(symbol_id),
                        identifier,
                        declaration,
                        references,
                        constant_violations,
                    },
                );
            }
        }

        let mut globals: FxHashMap<String, Vec<Span>> = FxHashMap::default();
        {
            let scoping = semantic.scoping();
            for (name, reference_ids) in scoping.root_unresolved_references() {
                let spans = reference_ids
                    .iter()
                    .map(|id| semantic.reference_span(scoping.get_reference(*id)))
                    .collect();
                globals.insert(name.to_string(), spans);
            }
        }

        log::debug!("crawled {} bindings, {} unresolved globals", bindings.len(), globals.len());

        Self {
            scoping: semantic.into_scoping(),
            bindings,
            declared,
            by_site,
            globals,
        }
    }

    pub const fn scoping(&self) -> &Scoping {
        &self.scoping
    }

    pub fn root_scope(&self) -> ScopeId {
        self.scoping.root_scope_id()
    }

    pub fn parent_scope(&self, scope_id: ScopeId) -> Option<ScopeId> {
        self.scoping.scope_parent_id(scope_id)
    }

    pub fn bindings(&self) -> impl Iterator<Item = &Binding> {
        self.bindings.values()
    }

    pub fn binding(&self, symbol_id: SymbolId) -> Option<&Binding> {
        self.bindings.get(&symbol_id)
    }

    /// Resolves `name` from `scope_id` outward; the nearest declaration wins.
    pub fn get_binding(&self, name: &str, scope_id: ScopeId) -> Option<&Binding> {
        let mut current = Some(scope_id);
        while let Some(scope) = current {
            if let Some(symbol_id) = self.declared.get(&(scope, name.to_string())) {
                return self.bindings.get(symbol_id);
            }
            current = self.scoping.scope_parent_id(scope);
        }
        None
    }

    /// Binding that owns the identifier at `span`, either a reference to it
    /// or its declaring identifier.
    pub fn binding_at(&self, span: Span) -> Option<&Binding> {
        let key = NodeKey::of(span);
        if key.is_synthetic() {
            return None;
        }
        self.by_site.get(&key).and_then(|id| self.bindings.get(id))
    }

    /// First binding whose identifier lies inside `span`.
    pub fn binding_within(&self, span: Span) -> Option<&Binding> {
        let outer = NodeKey::of(span);
        self.bindings
            .values()
            .filter(|b| outer.contains(NodeKey::of(b.identifier)))
            .min_by_key(|b| b.identifier.start)
    }

    pub fn is_referenced(&self, binding: &Binding, check_descendants_only: bool) -> bool {
        binding.is_referenced(check_descendants_only)
    }

    /// True when nothing in scope declares `name`.
    pub fn is_global(&self, name: &str, scope_id: ScopeId) -> bool {
        self.get_binding(name, scope_id).is_none()
    }

    /// Read sites of names no scope declares.
    pub fn global_references(&self, name: &str) -> &[Span] {
        self.globals.get(name).map_or(&[], Vec::as_slice)
    }

    pub fn bindings_named<'s>(&'s self, name: &'s str) -> impl Iterator<Item = &'s Binding> + 's {
        self.bindings.values().filter(move |b| b.name == name)
    }
}

impl std::fmt::Debug for ScopeModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScopeModel")
            .field("bindings", &self.bindings.len())
            .field("globals", &self.globals.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::build;
    use oxc_allocator::Allocator;
    use oxc_ast::AstBuilder;
    use oxc_parser::Parser;
    use oxc_span::SourceType;

    fn parse<'a>(allocator: &'a Allocator, code: &'a str) -> Program<'a> {
        Parser::new(allocator, code, SourceType::mjs()).parse().program
    }

    #[test]
    fn test_constant_and_violations() {
        let allocator = Allocator::default();
        let program = parse(&allocator, "var a = 1; var b = 2; b = 3; console.log(a, b);");
        let scope = ScopeModel::crawl(&program);
        let root = scope.root_scope();

        let a = scope.get_binding("a", root).expect("a declared");
        assert!(a.constant);
        assert!(a.referenced);
        assert_eq!(a.references.len(), 1);

        let b = scope.get_binding("b", root).expect("b declared");
        assert!(!b.constant);
        assert_eq!(b.constant_violations.len(), 1);

        assert!(scope.get_binding("console", root).is_none());
        assert_eq!(scope.global_references("console").len(), 1);
    }

    #[test]
    fn test_nearest_scope_wins() {
        let allocator = Allocator::default();
        let program = parse(&allocator, "var x = 1; function f() { var x = 2; return x; }");
        let scope = ScopeModel::crawl(&program);

        let outer = scope.get_binding("x", scope.root_scope()).expect("outer x");
        let inner = scope
            .bindings_named("x")
            .find(|b| b.scope_id != scope.root_scope())
            .expect("inner x");

        assert_ne!(outer.symbol_id, inner.symbol_id);
        assert_eq!(
            scope.get_binding("x", inner.scope_id).map(|b| b.symbol_id),
            Some(inner.symbol_id)
        );
        assert!(!outer.referenced, "the read inside f resolves to the inner x");
        assert!(inner.referenced);
    }

    #[test]
    fn test_liveness_round_trip_requires_crawl() {
        let allocator = Allocator::default();
        let ast = AstBuilder::new(&allocator);
        let mut program = parse(&allocator, "const a = 1; use(a);");

        let scope = ScopeModel::crawl(&program);
        assert!(scope.get_binding("a", scope.root_scope()).is_some_and(|b| b.referenced));

        program.body.pop();
        assert!(
            scope.get_binding("a", scope.root_scope()).is_some_and(|b| b.referenced),
            "a stale snapshot still reports the removed read"
        );
        let scope = ScopeModel::crawl(&program);
        let a = scope.get_binding("a", scope.root_scope()).expect("a declared");
        assert!(!a.referenced);
        assert!(!a.is_referenced(false));

        program.body.push(build::expression_statement(ast, build::identifier(ast, "a")));
        let scope = ScopeModel::crawl(&program);
        assert!(scope.get_binding("a", scope.root_scope()).is_some_and(|b| b.referenced));
    }

    #[test]
    fn test_self_reference_only_counts_without_descendant_check() {
        let allocator = Allocator::default();
        let program = parse(&allocator, "function loop(n) { return n ? loop(n - 1) : 0; }");
        let scope = ScopeModel::crawl(&program);

        let func = scope.get_binding("loop", scope.root_scope()).expect("loop declared");
        assert!(func.is_referenced(false));
        assert!(!func.is_referenced(true), "only self-calls remain");
        assert!(func.is_function());
    }

    #[test]
    fn test_binding_at_reference_site() {
        let allocator = Allocator::default();
        let code = "let value = 1; value;";
        let program = parse(&allocator, code);
        let scope = ScopeModel::crawl(&program);

        let start = code.rfind("value").expect("reference present") as u32;
        let binding = scope.binding_at(Span::new(start, start + 5)).expect("resolved");
        assert_eq!(binding.name, "value");
    }
}
