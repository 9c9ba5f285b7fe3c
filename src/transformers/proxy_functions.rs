//! Proxy function inlining.
//!
//! Obfuscators route operators, calls and literals through one-line
//! wrappers:
//!
//! ```js
//! function _0x1a(a, b) { return a + b; }
//! var _0x2b = function (f, x) { return f(x); };
//! _0x1a(1, _0x2b(g, 2));   // 1 + g(2)
//! ```
//!
//! A wrapper qualifies when its body is a single `return` of an expression
//! that uses no `this`, `arguments`, nested function, assignment or
//! reference to itself. Each call site gets a copy of the returned
//! expression with the arguments substituted for the parameters. A call site
//! is refused when a name the body uses freely would resolve to a different
//! declaration at the call site than it does at the wrapper, and when
//! substituting the arguments would change the order in which they are
//! evaluated relative to each other or to calls in the body.

use rustc_hash::{FxHashMap, FxHashSet};

use oxc_allocator::{Allocator, CloneIn};
use oxc_ast::ast::*;
use oxc_ast_visit::{Visit, walk};
use oxc_span::{GetSpan, Span};
use oxc_syntax::symbol::SymbolId;

use super::util::{
    ArgumentKind, IdentifierScan, Prune, arguments_preserve_order, classify_argument, simple_parameters, substitute,
};
use crate::context::Context;
use crate::node::NodeKey;
use crate::pipeline::{OptionKind, OptionSpec, OptionValues, TransformStats, Transformer};
use crate::scope::ScopeModel;
use crate::traverse::{Action, HookResult, TraverseCtx, Visitor};

/// Inlining rounds per run. Each round resolves one more level of wrappers
/// calling wrappers.
const MAX_ROUNDS: usize = 16;

const OPTIONS: &[OptionSpec] = &[OptionSpec::new(
    "removeUnused",
    OptionKind::Bool { default: true },
    "Remove wrappers that are no longer called after inlining",
)];

pub struct ProxyFunctions;

impl Transformer for ProxyFunctions {
    fn name(&self) -> &'static str {
        "proxy-functions"
    }

    fn description(&self) -> &'static str {
        "Inlines single-return wrapper functions at their call sites"
    }

    fn options(&self) -> &'static [OptionSpec] {
        OPTIONS
    }

    fn run(&self, cx: &mut Context<'_>, options: &OptionValues) -> crate::Result<TransformStats> {
        let mut stats = TransformStats::default();
        let mut inlined_declarations: FxHashSet<NodeKey> = FxHashSet::default();

        for round in 0..MAX_ROUNDS {
            cx.crawl();
            let proxies = collect_proxies(cx.allocator, &cx.program, cx.scope());
            if proxies.is_empty() {
                break;
            }

            let mut inliner = ProxyInliner::new(proxies);
            let report = cx.traverse(&mut inliner);
            stats.skipped += report.errors + inliner.refused;
            if inliner.inlined == 0 {
                break;
            }
            log::debug!("round {round}: inlined {} call sites", inliner.inlined);
            stats.changes += inliner.inlined;
            inlined_declarations.extend(inliner.used_declarations);
        }

        if options.bool("removeUnused").unwrap_or(true) && !inlined_declarations.is_empty() {
            cx.crawl();
            let mut prune = Prune::new();
            for proxy in collect_proxies(cx.allocator, &cx.program, cx.scope()).values() {
                let unused = cx
                    .scope()
                    .binding(proxy.symbol)
                    .is_some_and(|binding| !binding.is_referenced(true));
                if unused && inlined_declarations.contains(&NodeKey::of(proxy.declaration)) {
                    log::debug!("removing proxy {}", proxy.name);
                    prune.mark(proxy.declaration);
                }
            }
            if !prune.is_empty() {
                cx.traverse(&mut prune);
                stats.changes += prune.removed;
                cx.crawl();
            }
        }

        Ok(stats)
    }
}

/// A wrapper function reduced to its parameters and returned expression.
pub struct ProxyFunction<'a> {
    pub name: String,
    pub symbol: SymbolId,
    pub params: Vec<String>,
    pub body: Expression<'a>,
    /// Names the body uses that are not parameters, with the declaration
    /// each resolves to at the wrapper (`None` for globals).
    free: Vec<(String, Option<SymbolId>)>,
    /// The function declaration or `var` declarator.
    pub declaration: Span,
}

impl ProxyFunction<'_> {
    fn has_free_references(&self) -> bool {
        !self.free.is_empty()
    }
}

fn collect_proxies<'a>(
    allocator: &'a Allocator,
    program: &Program<'a>,
    scope: &ScopeModel,
) -> FxHashMap<SymbolId, ProxyFunction<'a>> {
    let mut collector = ProxyCollector {
        allocator,
        scope,
        proxies: FxHashMap::default(),
    };
    collector.visit_program(program);
    collector.proxies
}

struct ProxyCollector<'s, 'a> {
    allocator: &'a Allocator,
    scope: &'s ScopeModel,
    proxies: FxHashMap<SymbolId, ProxyFunction<'a>>,
}

impl<'a> ProxyCollector<'_, 'a> {
    fn consider(
        &mut self,
        id: &BindingIdentifier<'a>,
        params: &FormalParameters<'a>,
        body: &FunctionBody<'a>,
        expression_body: bool,
        declaration: Span,
    ) {
        let Some(binding) = self.scope.binding_at(id.span) else {
            return;
        };
        if binding.violation_count() > 0 {
            return;
        }
        let Some(params) = simple_parameters(params) else {
            return;
        };
        if !body.directives.is_empty() {
            return;
        }
        let returned = match body.statements.as_slice() {
            [Statement::ReturnStatement(ret)] => ret.argument.as_ref(),
            [Statement::ExpressionStatement(stmt)] if expression_body => Some(&stmt.expression),
            _ => None,
        };
        let Some(returned) = returned else {
            return;
        };

        let scan = IdentifierScan::of_expression(returned);
        let name = id.name.to_string();
        if scan.has_this || scan.has_closure || scan.has_assignment || scan.has_suspend {
            return;
        }
        if scan.mentions("arguments") || scan.mentions(&name) {
            return;
        }

        let mut free: Vec<(String, Option<SymbolId>)> = Vec::new();
        for (reference, span) in &scan.references {
            if params.contains(reference) || free.iter().any(|(n, _)| n == reference) {
                continue;
            }
            let resolved = self.scope.binding_at(*span).map(|b| b.symbol_id);
            if resolved == Some(binding.symbol_id) {
                return;
            }
            free.push((reference.clone(), resolved));
        }

        log::debug!("found proxy {name}({})", params.join(", "));
        self.proxies.insert(
            binding.symbol_id,
            ProxyFunction {
                name,
                symbol: binding.symbol_id,
                params,
                body: returned.clone_in(self.allocator),
                free,
                declaration,
            },
        );
    }
}

impl<'a> Visit<'a> for ProxyCollector<'_, 'a> {
    fn visit_statement(&mut self, stmt: &Statement<'a>) {
        match stmt {
            Statement::FunctionDeclaration(func) if !func.r#async && !func.generator => {
                if let (Some(id), Some(body)) = (&func.id, &func.body) {
                    self.consider(id, &func.params, body, false, stmt.span());
                }
            }
            Statement::VariableDeclaration(decl) => {
                for declarator in &decl.declarations {
                    let (BindingPattern::BindingIdentifier(id), Some(init)) = (&declarator.id, &declarator.init)
                    else {
                        continue;
                    };
                    match init {
                        Expression::FunctionExpression(func) if !func.r#async && !func.generator => {
                            if let Some(body) = &func.body {
                                self.consider(id, &func.params, body, false, declarator.span);
                            }
                        }
                        Expression::ArrowFunctionExpression(arrow) if !arrow.r#async => {
                            self.consider(id, &arrow.params, &arrow.body, arrow.expression, declarator.span);
                        }
                        _ => {}
                    }
                }
            }
            _ => {}
        }
        walk::walk_statement(self, stmt);
    }
}

pub struct ProxyInliner<'a> {
    proxies: FxHashMap<SymbolId, ProxyFunction<'a>>,
    inlined: usize,
    refused: usize,
    used_declarations: FxHashSet<NodeKey>,
}

impl<'a> ProxyInliner<'a> {
    pub fn new(proxies: FxHashMap<SymbolId, ProxyFunction<'a>>) -> Self {
        Self {
            proxies,
            inlined: 0,
            refused: 0,
            used_declarations: FxHashSet::default(),
        }
    }
}

impl<'a> Visitor<'a> for ProxyInliner<'a> {
    fn exit_expression(&mut self, expr: &mut Expression<'a>, ctx: &mut TraverseCtx<'_, 'a>) -> HookResult {
        let Expression::CallExpression(call) = expr else {
            return Ok(Action::Continue);
        };
        if call.optional {
            return Ok(Action::Continue);
        }
        let Expression::Identifier(callee) = &call.callee else {
            return Ok(Action::Continue);
        };

        let scope = ctx.scope();
        let scope_id = ctx.scope_id();
        let Some(binding) = scope.get_binding(callee.name.as_str(), scope_id) else {
            return Ok(Action::Continue);
        };
        let Some(proxy) = self.proxies.get(&binding.symbol_id) else {
            return Ok(Action::Continue);
        };

        let args: Option<Vec<&Expression<'a>>> = call.arguments.iter().map(Argument::as_expression).collect();
        let Some(args) = args else {
            return Ok(Action::Continue);
        };

        for (name, expected) in &proxy.free {
            let actual = scope.get_binding(name, scope_id).map(|b| b.symbol_id);
            if actual != *expected {
                log::debug!(
                    "not inlining {} at {}..{}: `{name}` resolves elsewhere",
                    proxy.name,
                    call.span.start,
                    call.span.end
                );
                self.refused += 1;
                return Ok(Action::Continue);
            }
        }

        let kinds: Vec<ArgumentKind> = args.iter().map(|arg| classify_argument(arg, scope)).collect();
        let impure = kinds.contains(&ArgumentKind::Impure);
        if (impure && proxy.has_free_references()) || !arguments_preserve_order(&proxy.params, &proxy.body, &kinds) {
            log::debug!("not inlining {}: argument evaluation order would change", proxy.name);
            self.refused += 1;
            return Ok(Action::Continue);
        }

        let replacement = substitute(ctx.ast, &proxy.body, &proxy.params, &args);
        self.used_declarations.insert(NodeKey::of(proxy.declaration));
        *expr = replacement;
        self.inlined += 1;
        Ok(Action::Replaced)
    }
}
