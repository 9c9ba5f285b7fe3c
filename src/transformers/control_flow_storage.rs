//! Control-flow storage objects.
//!
//! The obfuscator hoists literals and tiny operator functions of a function
//! body into one object and reads them back through it:
//!
//! ```js
//! var _0xS = { abc: "log", xyz: function (a, b) { return a + b; } };
//! console[_0xS.abc](_0xS.xyz(1, 2));   // console["log"](1 + 2)
//! ```
//!
//! The first sub-pass collects such objects, one per block, and records
//! them on the [`Context`]. An object is only accepted when every use of it
//! is a read of a known key, so nothing can have changed a value since the
//! declaration. The second sub-pass replaces those reads from the recorded
//! objects, after which an object is unreferenced and removed. Objects that
//! survive stay recorded for later passes.

use lazy_static::lazy_static;
use rustc_hash::{FxHashMap, FxHashSet};

use oxc_allocator::{Allocator, CloneIn};
use oxc_ast::ast::*;
use oxc_ast_visit::{Visit, walk};
use oxc_span::Span;
use oxc_syntax::symbol::SymbolId;

use super::util::{
    ArgumentKind, IdentifierScan, Prune, arguments_preserve_order, classify_argument, simple_parameters, substitute,
};
use crate::context::Context;
use crate::evaluate::{Constant, evaluate_pure};
use crate::matcher::{Pattern, matches, matches_expression};
use crate::node::{NodeKey, NodeRef, build, member_object, member_property};
use crate::pipeline::{OptionSpec, OptionValues, TransformStats, Transformer};
use crate::scope::ScopeModel;
use crate::traverse::{Action, HookResult, TraverseCtx, Visitor};

/// Collect-and-inline rounds per run. A later round picks up a second
/// storage in a block, or storages whose values referenced earlier ones.
const MAX_ROUNDS: usize = 8;

lazy_static! {
    /// `var S = { ... }`
    static ref STORAGE_DECLARATOR: Pattern = Pattern::node("VariableDeclarator")
        .with("id", Pattern::extract_as("id", Pattern::node("Identifier")))
        .with("init", Pattern::node("ObjectExpression").with("properties", Pattern::extract("properties")));

    /// `key: value` or `"key": value`, never a getter, setter or method.
    static ref STORAGE_PROPERTY: Pattern = Pattern::either([
        storage_property(Pattern::extract_as("key", Pattern::node("StringLiteral"))),
        storage_property(Pattern::extract_as("key", Pattern::node("Identifier"))).with("computed", Pattern::bool(false)),
    ]);

    /// `function (..) { return e; }`, `(..) => e` or `(..) => { return e; }`.
    static ref SINGLE_RETURN: Pattern = Pattern::either([
        Pattern::node("FunctionExpression")
            .with("async", Pattern::bool(false))
            .with("generator", Pattern::bool(false))
            .with("body", returns()),
        Pattern::node("ArrowFunctionExpression")
            .with("async", Pattern::bool(false))
            .with("expression", Pattern::bool(true))
            .with(
                "body",
                Pattern::node("BlockStatement").with(
                    "body",
                    Pattern::exact([Pattern::node("ExpressionStatement").with("expression", Pattern::extract("returned"))]),
                ),
            ),
        Pattern::node("ArrowFunctionExpression")
            .with("async", Pattern::bool(false))
            .with("expression", Pattern::bool(false))
            .with("body", returns()),
    ]);
}

fn storage_property(key: Pattern) -> Pattern {
    Pattern::node("Property")
        .with("kind", Pattern::str("init"))
        .with("method", Pattern::bool(false))
        .with("key", key)
        .with("value", Pattern::extract("value"))
}

fn returns() -> Pattern {
    Pattern::node("BlockStatement").with(
        "body",
        Pattern::exact([Pattern::node("ReturnStatement")
            .with("argument", Pattern::extract_as("returned", Pattern::node("*")))]),
    )
}

/// One storage object: literal properties and single-return function
/// properties, by key.
pub struct ControlFlowStorage<'a> {
    pub identifier: String,
    pub symbol: SymbolId,
    /// The binding identifier. Survives re-crawls, unlike `symbol`.
    pub binding: Span,
    pub literals: FxHashMap<String, Constant>,
    pub functions: FxHashMap<String, FunctionAlias<'a>>,
    /// The declarator.
    pub declaration: Span,
}

impl ControlFlowStorage<'_> {
    pub fn len(&self) -> usize {
        self.literals.len() + self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn has_key(&self, key: &str) -> bool {
        self.literals.contains_key(key) || self.functions.contains_key(key)
    }
}

/// `function (a, b) { return <body>; }` as its parameters and body.
pub struct FunctionAlias<'a> {
    pub params: Vec<String>,
    pub body: Expression<'a>,
}

pub struct ControlFlowStorageTransformer;

impl Transformer for ControlFlowStorageTransformer {
    fn name(&self) -> &'static str {
        "control-flow-storage"
    }

    fn description(&self) -> &'static str {
        "Inlines literals and operator functions read through storage objects"
    }

    fn options(&self) -> &'static [OptionSpec] {
        &[]
    }

    fn run(&self, cx: &mut Context<'_>, _options: &OptionValues) -> crate::Result<TransformStats> {
        let mut stats = TransformStats::default();

        for round in 0..MAX_ROUNDS {
            cx.crawl();
            let found = collect_storages(cx.allocator, &cx.program, cx.scope());
            *cx.control_flow_storage() = found;
            if cx.control_flow_storage().is_empty() {
                break;
            }
            log::debug!("round {round}: {} storage objects", cx.control_flow_storage().len());

            // The traversal needs the context mutably, so the inliner reads
            // the recorded objects out of it for the duration.
            let mut storages = std::mem::take(cx.control_flow_storage());
            let mut inliner = StorageInliner::new(&storages);
            let report = cx.traverse(&mut inliner);
            stats.changes += inliner.replaced;
            stats.skipped += report.errors + inliner.refused;
            let replaced = inliner.replaced;
            drop(inliner);

            cx.crawl();
            let mut prune = Prune::new();
            let mut removed = FxHashSet::default();
            for (block, storage) in &storages {
                let unused = cx
                    .scope()
                    .binding_at(storage.binding)
                    .is_some_and(|binding| !binding.is_referenced(false));
                if unused {
                    log::debug!("removing storage {}", storage.identifier);
                    prune.mark(storage.declaration);
                    removed.insert(*block);
                }
            }
            if !prune.is_empty() {
                cx.traverse(&mut prune);
                stats.changes += prune.removed;
            }

            storages.retain(|block, _| !removed.contains(block));
            *cx.control_flow_storage() = storages;

            if replaced == 0 && removed.is_empty() {
                break;
            }
        }

        cx.crawl();
        Ok(stats)
    }
}

fn collect_storages<'a>(
    allocator: &'a Allocator,
    program: &Program<'a>,
    scope: &ScopeModel,
) -> FxHashMap<NodeKey, ControlFlowStorage<'a>> {
    let mut collector = StorageCollector {
        allocator,
        scope,
        blocks: vec![NodeKey::of(program.span)],
        storages: FxHashMap::default(),
    };
    collector.visit_program(program);
    let mut storages = collector.storages;

    let candidates: FxHashMap<SymbolId, NodeKey> =
        storages.iter().map(|(block, storage)| (storage.symbol, *block)).collect();
    let mut uses = StorageUses {
        scope,
        storages: &storages,
        candidates: &candidates,
        rejected: FxHashSet::default(),
    };
    uses.visit_program(program);
    let rejected = uses.rejected;

    storages.retain(|_, storage| {
        let keep = !rejected.contains(&storage.symbol);
        if !keep {
            log::debug!("storage {} is used in ways that could change it", storage.identifier);
        }
        keep
    });
    storages
}

struct StorageCollector<'s, 'a> {
    allocator: &'a Allocator,
    scope: &'s ScopeModel,
    blocks: Vec<NodeKey>,
    storages: FxHashMap<NodeKey, ControlFlowStorage<'a>>,
}

impl<'a> StorageCollector<'_, 'a> {
    fn storage(&self, declarator: &VariableDeclarator<'a>) -> Option<ControlFlowStorage<'a>> {
        let captures = matches(NodeRef::Declarator(declarator), &STORAGE_DECLARATOR)?;
        let properties = captures.list("properties")?;
        if properties.is_empty() {
            return None;
        }
        let identifier = captures.span("id")?;
        let binding = self.scope.binding_at(identifier)?;
        if binding.violation_count() > 0 {
            return None;
        }

        let mut literals = FxHashMap::default();
        let mut functions = FxHashMap::default();
        for property in properties {
            let property = matches(*property, &STORAGE_PROPERTY)?;
            let key = property.str("key")?.to_string();
            let value = property.expression("value")?;
            if literals.contains_key(&key) || functions.contains_key(&key) {
                return None;
            }

            if let Some(alias) = self.function_alias(value) {
                functions.insert(key, alias);
            } else if let Some(value) = evaluate_pure(value) {
                literals.insert(key, value);
            } else {
                return None;
            }
        }

        Some(ControlFlowStorage {
            identifier: captures.str("id")?.to_string(),
            symbol: binding.symbol_id,
            binding: identifier,
            literals,
            functions,
            declaration: declarator.span,
        })
    }

    fn function_alias(&self, value: &Expression<'a>) -> Option<FunctionAlias<'a>> {
        let captures = matches_expression(value, &SINGLE_RETURN)?;
        let returned = captures.expression("returned")?;
        let params = match value {
            Expression::FunctionExpression(func) => &func.params,
            Expression::ArrowFunctionExpression(arrow) => &arrow.params,
            _ => return None,
        };
        let params = simple_parameters(params)?;

        let scan = IdentifierScan::of_expression(returned);
        let closed = scan.references.iter().all(|(name, _)| params.contains(name));
        if !closed || scan.has_this || scan.has_closure || scan.has_assignment || scan.has_suspend {
            return None;
        }

        Some(FunctionAlias {
            params,
            body: returned.clone_in(self.allocator),
        })
    }
}

impl<'a> Visit<'a> for StorageCollector<'_, 'a> {
    fn visit_block_statement(&mut self, it: &BlockStatement<'a>) {
        self.blocks.push(NodeKey::of(it.span));
        walk::walk_block_statement(self, it);
        self.blocks.pop();
    }

    fn visit_function_body(&mut self, it: &FunctionBody<'a>) {
        self.blocks.push(NodeKey::of(it.span));
        walk::walk_function_body(self, it);
        self.blocks.pop();
    }

    fn visit_variable_declaration(&mut self, it: &VariableDeclaration<'a>) {
        if let Some(block) = self.blocks.last().copied()
            && !self.storages.contains_key(&block)
        {
            for declarator in &it.declarations {
                if let Some(storage) = self.storage(declarator) {
                    log::debug!("found storage {} with {} keys", storage.identifier, storage.len());
                    self.storages.insert(block, storage);
                    break;
                }
            }
        }
        walk::walk_variable_declaration(self, it);
    }
}

/// Rejects storages that are used as anything but a read of a known key.
struct StorageUses<'s, 'c, 'a> {
    scope: &'s ScopeModel,
    storages: &'c FxHashMap<NodeKey, ControlFlowStorage<'a>>,
    candidates: &'c FxHashMap<SymbolId, NodeKey>,
    rejected: FxHashSet<SymbolId>,
}

impl<'a> StorageUses<'_, '_, 'a> {
    /// Storage and key of `S.key` / `S["key"]` when `S` is a candidate.
    fn storage_read(&self, expr: &Expression<'a>) -> Option<(&ControlFlowStorage<'a>, Option<String>)> {
        let Some(Expression::Identifier(object)) = member_object(expr) else {
            return None;
        };
        let symbol = self.scope.binding_at(object.span)?.symbol_id;
        let storage = self.storages.get(self.candidates.get(&symbol)?)?;
        Some((storage, member_property(expr).map(str::to_string)))
    }
}

impl<'a> Visit<'a> for StorageUses<'_, '_, 'a> {
    fn visit_identifier_reference(&mut self, it: &IdentifierReference<'a>) {
        if let Some(binding) = self.scope.binding_at(it.span)
            && self.candidates.contains_key(&binding.symbol_id)
        {
            self.rejected.insert(binding.symbol_id);
        }
    }

    fn visit_call_expression(&mut self, it: &CallExpression<'a>) {
        if let Some((storage, key)) = self.storage_read(&it.callee) {
            if !key.is_some_and(|key| storage.has_key(&key)) {
                self.rejected.insert(storage.symbol);
            }
            for argument in &it.arguments {
                self.visit_argument(argument);
            }
            return;
        }
        walk::walk_call_expression(self, it);
    }

    fn visit_expression(&mut self, it: &Expression<'a>) {
        if let Expression::UnaryExpression(unary) = it
            && unary.operator == UnaryOperator::Delete
            && let Some((storage, _)) = self.storage_read(&unary.argument)
        {
            self.rejected.insert(storage.symbol);
            return;
        }
        if let Some((storage, key)) = self.storage_read(it) {
            let literal = key.is_some_and(|key| storage.literals.contains_key(&key));
            if !literal {
                self.rejected.insert(storage.symbol);
            }
            if let Expression::ComputedMemberExpression(member) = it {
                self.visit_expression(&member.expression);
            }
            return;
        }
        walk::walk_expression(self, it);
    }
}

pub struct StorageInliner<'c, 'a> {
    by_symbol: FxHashMap<SymbolId, &'c ControlFlowStorage<'a>>,
    replaced: usize,
    refused: usize,
}

impl<'c, 'a> StorageInliner<'c, 'a> {
    pub fn new(storages: &'c FxHashMap<NodeKey, ControlFlowStorage<'a>>) -> Self {
        Self {
            by_symbol: storages.values().map(|storage| (storage.symbol, storage)).collect(),
            replaced: 0,
            refused: 0,
        }
    }

    fn lookup<'e>(
        &self,
        expr: &'e Expression<'a>,
        ctx: &TraverseCtx<'_, 'a>,
    ) -> Option<(&'c ControlFlowStorage<'a>, &'e str)> {
        let Some(Expression::Identifier(object)) = member_object(expr) else {
            return None;
        };
        let binding = ctx.scope().binding_at(object.span)?;
        let storage = self.by_symbol.get(&binding.symbol_id)?;
        Some((*storage, member_property(expr)?))
    }
}

impl<'a> Visitor<'a> for StorageInliner<'_, 'a> {
    fn exit_expression(&mut self, expr: &mut Expression<'a>, ctx: &mut TraverseCtx<'_, 'a>) -> HookResult {
        if let Expression::CallExpression(call) = expr {
            let Some((storage, key)) = self.lookup(&call.callee, ctx) else {
                return Ok(Action::Continue);
            };
            let Some(alias) = storage.functions.get(key) else {
                return Ok(Action::Continue);
            };
            let Some(args) = call.arguments.iter().map(Argument::as_expression).collect::<Option<Vec<_>>>() else {
                return Ok(Action::Continue);
            };

            let kinds: Vec<ArgumentKind> = args.iter().map(|arg| classify_argument(arg, ctx.scope())).collect();
            if !arguments_preserve_order(&alias.params, &alias.body, &kinds) {
                log::debug!("not inlining {}.{key}: argument order would change", storage.identifier);
                self.refused += 1;
                return Ok(Action::Continue);
            }

            let replacement = substitute(ctx.ast, &alias.body, &alias.params, &args);
            *expr = replacement;
            self.replaced += 1;
            return Ok(Action::Replaced);
        }

        let Some((storage, key)) = self.lookup(expr, ctx) else {
            return Ok(Action::Continue);
        };
        let Some(value) = storage.literals.get(key) else {
            return Ok(Action::Continue);
        };
        *expr = build::constant(ctx.ast, value);
        self.replaced += 1;
        Ok(Action::Replaced)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::Options;
    use crate::transformers::test_support::run;

    fn run_control_flow_storage(code: &str) -> String {
        run(&ControlFlowStorageTransformer, code)
    }

    #[test]
    fn test_literals_and_functions_inlined() {
        let output = run_control_flow_storage(
            r#"function f(x) {
                var S = { a: "str", "b": function (p, q) { return p + q; }, c: function (g, v) { return g(v); } };
                return S.c(log, S.b(x, S["a"]));
            }
            f(1);"#,
        );
        assert!(output.contains("return log(x + \"str\")"), "got: {}", output);
        assert!(!output.contains("var S"), "Storage should be removed, got: {}", output);
    }

    #[test]
    fn test_arrow_aliases() {
        let output = run_control_flow_storage("function f() { var S = { eq: (a, b) => a === b }; return S.eq(1, 2); }");
        assert!(output.contains("return 1 === 2"), "got: {}", output);
    }

    #[test]
    fn test_mutated_storage_untouched() {
        let output = run_control_flow_storage("var S = { a: 1 };\nS.a = 2;\nuse(S.a);");
        assert!(output.contains("use(S.a)"), "got: {}", output);
    }

    #[test]
    fn test_escaping_storage_untouched() {
        let output = run_control_flow_storage("var S = { a: 1 };\nleak(S);\nuse(S.a);");
        assert!(output.contains("use(S.a)"), "got: {}", output);
    }

    #[test]
    fn test_unknown_key_untouched() {
        let output = run_control_flow_storage("var S = { a: 1 };\nuse(S.b, S.a);");
        assert!(output.contains("use(S.b, S.a)"), "got: {}", output);
    }

    #[test]
    fn test_function_property_read_as_value_untouched() {
        let output = run_control_flow_storage("var S = { f: function (a) { return a; } };\nvar g = S.f;");
        assert!(output.contains("g = S.f"), "got: {}", output);
    }

    #[test]
    fn test_removed_storages_leave_cache() {
        let allocator = oxc_allocator::Allocator::default();
        let code = "function f() { var S = { k: 1, sw: function (a, b) { return b - a; } }; return S.sw(one(), S.k); }\nfunction g() { var T = { v: 2 }; return T.v; }";
        let mut cx = Context::parse(&allocator, code, &Options::default()).expect("parses");
        let transformer = ControlFlowStorageTransformer;
        let values = OptionValues::validate(transformer.name(), transformer.options(), &serde_json::Value::Null)
            .expect("valid options");
        let stats = transformer.run(&mut cx, &values).expect("runs");

        let output = cx.generate();
        assert!(output.contains("return 1 - one()"), "got: {}", output);
        assert!(!output.contains("var T"), "got: {}", output);
        assert_eq!(stats.skipped, 0);
        let recorded: Vec<&str> = cx
            .control_flow_storage()
            .values()
            .map(|storage| storage.identifier.as_str())
            .collect();
        assert!(recorded.is_empty(), "Both storages were removed, got: {:?}", recorded);
    }

    #[test]
    fn test_refused_call_keeps_storage_recorded() {
        let allocator = oxc_allocator::Allocator::default();
        let code = "function f() { var S = { sw: function (a, b) { return b - a; } }; return S.sw(one(), two()); }";
        let mut cx = Context::parse(&allocator, code, &Options::default()).expect("parses");
        let transformer = ControlFlowStorageTransformer;
        let values = OptionValues::validate(transformer.name(), transformer.options(), &serde_json::Value::Null)
            .expect("valid options");
        let stats = transformer.run(&mut cx, &values).expect("runs");

        assert!(cx.generate().contains("S.sw(one(), two())"));
        assert_eq!(stats.skipped, 1);
        let storage = cx.control_flow_storage().values().next().expect("storage recorded");
        assert_eq!(storage.identifier, "S");
        assert!(storage.functions.contains_key("sw"));
    }

    #[test]
    fn test_getter_storage_untouched() {
        let output = run_control_flow_storage("var S = { get a() { return 1; } };\nuse(S.a);");
        assert!(output.contains("use(S.a)"), "got: {}", output);
    }

    #[test]
    fn test_cache_keyed_by_block() {
        let allocator = oxc_allocator::Allocator::default();
        let code = "function f() { var S = { a: 1 }; return S.a; }\nfunction g() { var T = { b: 2 }; return T.b; }";
        let mut cx = Context::parse(&allocator, code, &Options::default()).expect("parses");
        cx.crawl();
        let storages = collect_storages(cx.allocator, &cx.program, cx.scope());

        assert_eq!(storages.len(), 2);
        let mut names: Vec<&str> = storages.values().map(|s| s.identifier.as_str()).collect();
        names.sort_unstable();
        assert_eq!(names, vec!["S", "T"]);
    }
}
