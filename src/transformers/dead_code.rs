//! Dead code elimination.
//!
//! Three sweeps, in order:
//!
//! 1. Branch pruning: `if`, `?:` and `while` whose test has a certain
//!    truthiness keep only the branch that runs. `var` names declared in a
//!    dropped branch are kept as bare declarations since they hoist.
//! 2. List cleanup: empty statements go, and so does everything after an
//!    unconditional `return`, `throw`, `break` or `continue` in the same
//!    list, unless it declares something. Function, class, `let` and
//!    `const` declarations stay as they are, `var`s lose their
//!    initializers, and any other statement that declares a `var` somewhere
//!    inside shrinks to a bare `var` of those names.
//! 3. Unused bindings: declarations inside functions and blocks that
//!    nothing reads, that are never reassigned, and whose initializer has
//!    no side effects. Repeats with a fresh crawl, since dropping one
//!    declaration can orphan another. Top-level bindings are left alone,
//!    and the sweep is skipped entirely when the program calls `eval`.

use oxc_ast::AstBuilder;
use oxc_ast::ast::*;
use oxc_ast_visit::{Visit, VisitMut, walk_mut};
use oxc_span::Span;
use oxc_syntax::scope::ScopeFlags;

use crate::context::Context;
use crate::evaluate::{Opaque, evaluate_truthiness, is_side_effect_free};
use crate::node::{binding_name, build, is_terminator};
use crate::pipeline::{OptionSpec, OptionValues, TransformStats, Transformer};
use crate::scope::ScopeModel;
use crate::traverse::{Action, HookResult, TraverseCtx, Visitor};

/// Upper bound on unused-binding sweeps per run.
const MAX_SWEEPS: usize = 8;

pub struct DeadCode;

impl Transformer for DeadCode {
    fn name(&self) -> &'static str {
        "dead-code"
    }

    fn description(&self) -> &'static str {
        "Prunes constant branches, unreachable statements and unused local declarations"
    }

    fn options(&self) -> &'static [OptionSpec] {
        &[]
    }

    fn run(&self, cx: &mut Context<'_>, _options: &OptionValues) -> crate::Result<TransformStats> {
        let mut stats = TransformStats::default();

        let mut pruner = DeadCodeEliminator;
        let report = cx.traverse(&mut pruner);
        stats.changes += report.changes;
        stats.skipped += report.errors;

        let mut cleanup = ListCleanup {
            ast: cx.ast,
            removed: 0,
        };
        cleanup.visit_program(&mut cx.program);
        stats.changes += cleanup.removed;

        cx.crawl();
        if !cx.scope().global_references("eval").is_empty() {
            log::info!("program calls eval, keeping unused declarations");
            return Ok(stats);
        }

        for sweep in 0..MAX_SWEEPS {
            let mut unused = UnusedDeclarations::default();
            let report = cx.traverse(&mut unused);
            stats.skipped += report.errors;
            if unused.removed == 0 {
                break;
            }
            log::debug!("sweep {sweep}: removed {} unused declarations", unused.removed);
            stats.changes += unused.removed;
            cx.crawl();
        }

        Ok(stats)
    }
}

pub struct DeadCodeEliminator;

impl DeadCodeEliminator {
    /// Puts `kept` where `stmt` was. Hoisted `var` names survive as a bare
    /// declaration in front of it.
    fn splice<'a>(
        &mut self,
        stmt: &mut Statement<'a>,
        kept: Option<Statement<'a>>,
        hoisted: Vec<String>,
        ctx: &mut TraverseCtx<'_, 'a>,
    ) -> Action {
        let ast = ctx.ast;

        if !hoisted.is_empty() {
            let declaration = build::var_declarations(ast, &hoisted);
            if !ctx.is_list_item() {
                let mut body = ast.vec();
                body.push(declaration);
                body.extend(kept);
                *stmt = build::block(ast, body);
                return Action::Replaced;
            }
            ctx.insert_before(declaration);
        }

        match kept {
            Some(Statement::BlockStatement(mut block)) if ctx.is_list_item() && !has_lexical(&block.body) => {
                for inner in block.body.drain(..) {
                    ctx.insert_before(inner);
                }
                Action::Remove
            }
            Some(kept) => {
                *stmt = kept;
                Action::Replaced
            }
            None => Action::Remove,
        }
    }
}

impl<'a> Visitor<'a> for DeadCodeEliminator {
    fn exit_statement(&mut self, stmt: &mut Statement<'a>, ctx: &mut TraverseCtx<'_, 'a>) -> HookResult {
        let ast = ctx.ast;
        match stmt {
            Statement::IfStatement(if_stmt) => {
                let Some(truthy) = evaluate_truthiness(&if_stmt.test, &Opaque) else {
                    return Ok(Action::Continue);
                };
                log::debug!("if test is always {truthy}, pruning");

                let consequent = std::mem::replace(&mut if_stmt.consequent, build::empty_statement(ast));
                let alternate = if_stmt.alternate.take();
                let (kept, dropped) = if truthy { (Some(consequent), alternate) } else { (alternate, Some(consequent)) };
                let hoisted = dropped.as_ref().map(hoisted_vars).unwrap_or_default();
                Ok(self.splice(stmt, kept, hoisted, ctx))
            }
            Statement::WhileStatement(while_stmt) => {
                if evaluate_truthiness(&while_stmt.test, &Opaque) != Some(false) {
                    return Ok(Action::Continue);
                }
                let hoisted = hoisted_vars(&while_stmt.body);
                Ok(self.splice(stmt, None, hoisted, ctx))
            }
            _ => Ok(Action::Continue),
        }
    }

    fn exit_expression(&mut self, expr: &mut Expression<'a>, ctx: &mut TraverseCtx<'_, 'a>) -> HookResult {
        let Expression::ConditionalExpression(cond) = expr else {
            return Ok(Action::Continue);
        };
        let Some(truthy) = evaluate_truthiness(&cond.test, &Opaque) else {
            return Ok(Action::Continue);
        };

        let branch = if truthy { &mut cond.consequent } else { &mut cond.alternate };
        let kept = std::mem::replace(branch, build::void_zero(ctx.ast));
        *expr = kept;
        Ok(Action::Replaced)
    }
}

/// Block-scoped declarations that would change meaning if the block were
/// flattened into its parent.
fn has_lexical(body: &[Statement<'_>]) -> bool {
    body.iter().any(|stmt| match stmt {
        Statement::VariableDeclaration(decl) => decl.kind != VariableDeclarationKind::Var,
        Statement::FunctionDeclaration(_) | Statement::ClassDeclaration(_) => true,
        _ => false,
    })
}

/// Names of `var` bindings declared in `stmt`, nested functions excluded.
fn hoisted_vars(stmt: &Statement<'_>) -> Vec<String> {
    let mut names = HoistedNames::default();
    names.visit_statement(stmt);
    names.names
}

#[derive(Default)]
struct HoistedNames {
    names: Vec<String>,
    collecting: bool,
}

impl<'a> Visit<'a> for HoistedNames {
    fn visit_variable_declaration(&mut self, decl: &VariableDeclaration<'a>) {
        for declarator in &decl.declarations {
            self.collecting = decl.kind == VariableDeclarationKind::Var;
            self.visit_binding_pattern(&declarator.id);
            self.collecting = false;
            if let Some(init) = &declarator.init {
                self.visit_expression(init);
            }
        }
    }

    fn visit_binding_identifier(&mut self, it: &BindingIdentifier<'a>) {
        if self.collecting && !self.names.iter().any(|n| n == it.name.as_str()) {
            self.names.push(it.name.to_string());
        }
    }

    fn visit_function(&mut self, _it: &Function<'a>, _flags: ScopeFlags) {}

    fn visit_arrow_function_expression(&mut self, _it: &ArrowFunctionExpression<'a>) {}

    fn visit_class(&mut self, _it: &Class<'a>) {}
}

/// Drops empty statements and unreachable tails from every list.
struct ListCleanup<'a> {
    ast: AstBuilder<'a>,
    removed: usize,
}

impl<'a> VisitMut<'a> for ListCleanup<'a> {
    fn visit_statements(&mut self, stmts: &mut oxc_allocator::Vec<'a, Statement<'a>>) {
        walk_mut::walk_statements(self, stmts);

        let before = stmts.len();
        stmts.retain(|stmt| !matches!(stmt, Statement::EmptyStatement(_)));

        if let Some(end) = stmts.iter().position(is_terminator) {
            let mut index = end + 1;
            while index < stmts.len() {
                match &mut stmts[index] {
                    Statement::FunctionDeclaration(_) | Statement::ClassDeclaration(_) => index += 1,
                    Statement::VariableDeclaration(decl) if decl.kind == VariableDeclarationKind::Var => {
                        for declarator in decl.declarations.iter_mut() {
                            if declarator.init.take().is_some() {
                                self.removed += 1;
                            }
                        }
                        index += 1;
                    }
                    Statement::VariableDeclaration(_) => index += 1,
                    stmt => {
                        let hoisted = hoisted_vars(stmt);
                        if hoisted.is_empty() {
                            stmts.remove(index);
                        } else {
                            *stmt = build::var_declarations(self.ast, &hoisted);
                            self.removed += 1;
                            index += 1;
                        }
                    }
                }
            }
        }

        let removed = before - stmts.len();
        if removed > 0 {
            log::debug!("removed {removed} empty or unreachable statements");
        }
        self.removed += removed;
    }
}

/// Removes local declarations nothing reads.
#[derive(Default)]
struct UnusedDeclarations {
    removed: usize,
}

impl UnusedDeclarations {
    fn is_dead(scope: &ScopeModel, identifier: Span) -> bool {
        scope.binding_at(identifier).is_some_and(|binding| {
            binding.scope_id != scope.root_scope() && binding.violation_count() == 0 && !binding.is_referenced(true)
        })
    }
}

impl<'a> Visitor<'a> for UnusedDeclarations {
    fn enter_statement(&mut self, stmt: &mut Statement<'a>, ctx: &mut TraverseCtx<'_, 'a>) -> HookResult {
        match stmt {
            Statement::FunctionDeclaration(func) => {
                let Some(id) = &func.id else {
                    return Ok(Action::Continue);
                };
                if Self::is_dead(ctx.scope(), id.span) {
                    log::debug!("removing unused function {}", id.name);
                    self.removed += 1;
                    return Ok(Action::Remove);
                }
            }
            Statement::VariableDeclaration(decl) => {
                let scope = ctx.scope();
                let before = decl.declarations.len();
                decl.declarations.retain(|declarator| {
                    let removable = match &declarator.id {
                        BindingPattern::BindingIdentifier(ident) => {
                            declarator.init.as_ref().is_none_or(is_side_effect_free) && Self::is_dead(scope, ident.span)
                        }
                        _ => false,
                    };
                    if removable {
                        log::debug!("removing unused variable {}", binding_name(&declarator.id).unwrap_or("?"));
                    }
                    !removable
                });
                let dropped = before - decl.declarations.len();
                self.removed += dropped;
                if dropped > 0 && decl.declarations.is_empty() {
                    return Ok(Action::Remove);
                }
            }
            _ => {}
        }
        Ok(Action::Continue)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transformers::test_support::run;

    fn run_dead_code(code: &str) -> String {
        run(&DeadCode, code)
    }

    #[test]
    fn test_if_true_keeps_consequent() {
        let output = run_dead_code("if (true) { a(); } else { b(); }");
        assert!(output.contains("a()"), "got: {}", output);
        assert!(!output.contains("b()"), "Should drop else branch, got: {}", output);
        assert!(!output.contains("if"), "Should drop the if, got: {}", output);
    }

    #[test]
    fn test_if_false_idiom() {
        let output = run_dead_code("if (![]) { x(); } y();");
        assert!(!output.contains("x()"), "got: {}", output);
        assert!(output.contains("y()"), "got: {}", output);
    }

    #[test]
    fn test_unknown_test_untouched() {
        let output = run_dead_code("if (flag) { a(); } else { b(); }");
        assert!(output.contains("if (flag)"), "got: {}", output);
        assert!(output.contains("b()"), "got: {}", output);
    }

    #[test]
    fn test_ternary_pruning() {
        let output = run_dead_code("var v = 1 ? \"yes\" : \"no\";");
        assert!(output.contains("v = \"yes\""), "got: {}", output);
        assert!(!output.contains("\"no\""), "got: {}", output);
    }

    #[test]
    fn test_dropped_branch_keeps_hoisted_var() {
        let output = run_dead_code("if (false) { var x = 1; } console.log(x);");
        assert!(output.contains("var x;"), "Should keep the hoisted name, got: {}", output);
        assert!(!output.contains("x = 1"), "got: {}", output);
    }

    #[test]
    fn test_while_false_removed() {
        let output = run_dead_code("while (false) { spin(); } done();");
        assert!(!output.contains("spin"), "got: {}", output);
        assert!(output.contains("done()"), "got: {}", output);
    }

    #[test]
    fn test_code_after_return() {
        let output = run_dead_code("function f() { return g(); h(); function g() { return 1; } }\nf();");
        assert!(!output.contains("h()"), "Should drop unreachable call, got: {}", output);
        assert!(output.contains("function g()"), "Should keep hoisted function, got: {}", output);
    }

    #[test]
    fn test_declarations_after_return_kept() {
        let output = run_dead_code(
            "function f() { return () => [x, new K(), y]; g(); let x = 1; class K {} if (c) { var y = h(); } }\nf();",
        );
        assert!(!output.contains("g()"), "got: {}", output);
        assert!(!output.contains("h()"), "got: {}", output);
        assert!(output.contains("let x = 1"), "got: {}", output);
        assert!(output.contains("class K"), "got: {}", output);
        assert!(output.contains("var y"), "got: {}", output);
    }

    #[test]
    fn test_unused_locals_removed() {
        let output = run_dead_code("var top = 1; function f() { var unused = 5; var used = 2; return used; }\nf();");
        assert!(!output.contains("unused"), "got: {}", output);
        assert!(output.contains("var used = 2"), "got: {}", output);
        assert!(output.contains("var top = 1"), "Top level stays, got: {}", output);
    }

    #[test]
    fn test_cascading_removal() {
        let output = run_dead_code("function f() { var a = 1; var b = a; return 0; }\nf();");
        assert!(!output.contains("var a"), "got: {}", output);
        assert!(!output.contains("var b"), "got: {}", output);
    }

    #[test]
    fn test_self_recursive_local_function_removed() {
        let output = run_dead_code("function f() { function helper() { return helper(); } return 1; }\nf();");
        assert!(!output.contains("helper"), "got: {}", output);
    }

    #[test]
    fn test_side_effect_initializer_kept() {
        let output = run_dead_code("function f() { var unused = init(); return 1; }\nf();");
        assert!(output.contains("init()"), "got: {}", output);
    }

    #[test]
    fn test_eval_disables_binding_removal() {
        let output = run_dead_code("function f() { var hidden = 1; return eval(\"hidden\"); }\nf();");
        assert!(output.contains("var hidden = 1"), "got: {}", output);
    }
}
