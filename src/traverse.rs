//! Depth-first rewrite walk over a live tree.
//!
//! A [`Visitor`] gets enter and exit hooks for statements, expressions and
//! functions. Each hook may rewrite the node in place and tells the driver
//! what to do next through an [`Action`]. A hook that fails is logged with
//! the node it failed on and the walk moves on.

use std::cell::Cell;

use oxc_allocator::Vec as OxcVec;
use oxc_ast::AstBuilder;
use oxc_ast::ast::{Expression, Function, Program, Statement};
use oxc_ast_visit::{VisitMut, walk_mut};
use oxc_span::{GetSpan, Span};
use oxc_syntax::scope::{ScopeFlags, ScopeId};

use crate::TransformError;
use crate::node::{NodeRef, build};
use crate::scope::ScopeModel;

/// What the driver does after a hook returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Continue,
    /// Do not descend into the node's children.
    Skip,
    /// The hook swapped the node out. The replacement is not walked.
    Replaced,
    /// Splice the node out of its list, or leave a placeholder where the
    /// slot cannot be empty (`;` for statements, `void 0` for expressions).
    Remove,
    /// End the whole walk.
    Stop,
}

pub type HookResult = Result<Action, TransformError>;

pub trait Visitor<'a> {
    fn enter_statement(&mut self, _stmt: &mut Statement<'a>, _ctx: &mut TraverseCtx<'_, 'a>) -> HookResult {
        Ok(Action::Continue)
    }

    fn exit_statement(&mut self, _stmt: &mut Statement<'a>, _ctx: &mut TraverseCtx<'_, 'a>) -> HookResult {
        Ok(Action::Continue)
    }

    fn enter_expression(&mut self, _expr: &mut Expression<'a>, _ctx: &mut TraverseCtx<'_, 'a>) -> HookResult {
        Ok(Action::Continue)
    }

    fn exit_expression(&mut self, _expr: &mut Expression<'a>, _ctx: &mut TraverseCtx<'_, 'a>) -> HookResult {
        Ok(Action::Continue)
    }

    /// Called for declarations and function expressions alike. `Remove` is
    /// not meaningful here; remove the enclosing statement instead.
    fn enter_function(&mut self, _func: &mut Function<'a>, _ctx: &mut TraverseCtx<'_, 'a>) -> HookResult {
        Ok(Action::Continue)
    }

    fn exit_function(&mut self, _func: &mut Function<'a>, _ctx: &mut TraverseCtx<'_, 'a>) -> HookResult {
        Ok(Action::Continue)
    }

    fn exit_program(&mut self, _program: &mut Program<'a>, _ctx: &mut TraverseCtx<'_, 'a>) -> Result<(), TransformError> {
        Ok(())
    }
}

/// An enclosing node: its kind name and span.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ancestor {
    pub kind: &'static str,
    pub span: Span,
}

#[derive(Default)]
struct PendingInserts<'a> {
    before: Vec<Statement<'a>>,
    after: Vec<Statement<'a>>,
}

/// Walk state handed to every hook.
pub struct TraverseCtx<'s, 'a> {
    pub ast: AstBuilder<'a>,
    scope: &'s ScopeModel,
    scopes: Vec<ScopeId>,
    ancestors: Vec<Ancestor>,
    lists: Vec<PendingInserts<'a>>,
    list_item: bool,
    changes: usize,
}

impl<'s, 'a> TraverseCtx<'s, 'a> {
    pub fn new(ast: AstBuilder<'a>, scope: &'s ScopeModel) -> Self {
        Self {
            ast,
            scope,
            scopes: vec![scope.root_scope()],
            ancestors: Vec::new(),
            lists: Vec::new(),
            list_item: false,
            changes: 0,
        }
    }

    pub const fn scope(&self) -> &'s ScopeModel {
        self.scope
    }

    /// Innermost scope the walk is in.
    pub fn scope_id(&self) -> ScopeId {
        self.scopes.last().copied().unwrap_or_else(|| self.scope.root_scope())
    }

    /// Innermost enclosing node of `kind`. The node a hook is called for
    /// is not included.
    pub fn nearest(&self, kind: &str) -> Option<Ancestor> {
        self.ancestors.iter().rev().find(|a| a.kind == kind).copied()
    }

    pub fn in_function(&self) -> bool {
        self.ancestors.iter().any(|a| {
            matches!(
                a.kind,
                "FunctionDeclaration" | "FunctionExpression" | "ArrowFunctionExpression"
            )
        })
    }

    /// In a statement hook: whether the statement sits directly in a
    /// statement list, as opposed to a single slot like an `if` branch.
    pub const fn is_list_item(&self) -> bool {
        self.list_item
    }

    /// Queues `stmt` in front of the current statement of the nearest
    /// enclosing statement list.
    pub fn insert_before(&mut self, stmt: Statement<'a>) {
        if let Some(list) = self.lists.last_mut() {
            list.before.push(stmt);
            self.changes += 1;
        } else {
            log::debug!("insert_before outside any statement list dropped");
        }
    }

    pub fn insert_after(&mut self, stmt: Statement<'a>) {
        if let Some(list) = self.lists.last_mut() {
            list.after.push(stmt);
            self.changes += 1;
        } else {
            log::debug!("insert_after outside any statement list dropped");
        }
    }

    /// Counts an in-place edit that no [`Action`] reports.
    pub fn mark_changed(&mut self) {
        self.changes += 1;
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TraverseReport {
    pub changes: usize,
    pub errors: usize,
    pub stopped: bool,
}

/// Walks `program` with `visitor`. `scope` must describe the tree as it is
/// now; hooks read it through [`TraverseCtx::scope`].
pub fn traverse<'a, V: Visitor<'a>>(
    ast: AstBuilder<'a>,
    program: &mut Program<'a>,
    scope: &ScopeModel,
    visitor: &mut V,
) -> TraverseReport {
    let mut driver = Driver {
        visitor,
        ctx: TraverseCtx::new(ast, scope),
        errors: 0,
        stopped: false,
    };
    driver.visit_program(program);

    if let Err(err) = driver.visitor.exit_program(program, &mut driver.ctx) {
        log::warn!("exit_program hook failed: {err}");
        driver.errors += 1;
    }

    TraverseReport {
        changes: driver.ctx.changes,
        errors: driver.errors,
        stopped: driver.stopped,
    }
}

struct Driver<'v, 's, 'a, V> {
    visitor: &'v mut V,
    ctx: TraverseCtx<'s, 'a>,
    errors: usize,
    stopped: bool,
}

impl<'a, V: Visitor<'a>> Driver<'_, '_, 'a, V> {
    /// Turns a hook result into an action. Failures are logged and read as
    /// `Continue`.
    fn settle(&mut self, result: HookResult, hook: &str, kind: &str, span: Span) -> Action {
        match result {
            Ok(Action::Stop) => {
                self.stopped = true;
                Action::Stop
            }
            Ok(action) => {
                if matches!(action, Action::Replaced | Action::Remove) {
                    self.ctx.changes += 1;
                }
                action
            }
            Err(err) => {
                log::warn!("{hook} failed on {kind} at {}..{}: {err}", span.start, span.end);
                self.errors += 1;
                Action::Continue
            }
        }
    }

    /// Runs both hooks around the children of `stmt`. Returns true when the
    /// statement should be removed.
    fn statement_slot(&mut self, stmt: &mut Statement<'a>, in_list: bool) -> bool {
        if self.stopped {
            return false;
        }
        let (kind, span) = (NodeRef::Statement(stmt).kind(), stmt.span());

        self.ctx.list_item = in_list;
        let result = self.visitor.enter_statement(stmt, &mut self.ctx);
        match self.settle(result, "enter_statement", kind, span) {
            Action::Remove => return true,
            Action::Stop => return false,
            Action::Skip | Action::Replaced => {}
            Action::Continue => {
                self.ctx.ancestors.push(Ancestor { kind, span });
                walk_mut::walk_statement(self, stmt);
                self.ctx.ancestors.pop();
            }
        }
        if self.stopped {
            return false;
        }

        self.ctx.list_item = in_list;
        let result = self.visitor.exit_statement(stmt, &mut self.ctx);
        self.settle(result, "exit_statement", kind, span) == Action::Remove
    }
}

impl<'a, V: Visitor<'a>> VisitMut<'a> for Driver<'_, '_, 'a, V> {
    fn enter_scope(&mut self, _flags: ScopeFlags, scope_id: &Cell<Option<ScopeId>>) {
        let id = scope_id.get().unwrap_or_else(|| self.ctx.scope_id());
        self.ctx.scopes.push(id);
    }

    fn leave_scope(&mut self) {
        if self.ctx.scopes.len() > 1 {
            self.ctx.scopes.pop();
        }
    }

    fn visit_statements(&mut self, stmts: &mut OxcVec<'a, Statement<'a>>) {
        self.ctx.lists.push(PendingInserts::default());

        let mut index = 0;
        while index < stmts.len() && !self.stopped {
            let remove = self.statement_slot(&mut stmts[index], true);

            let pending = match self.ctx.lists.last_mut() {
                Some(list) => std::mem::take(list),
                None => PendingInserts::default(),
            };
            if remove {
                stmts.remove(index);
            } else {
                index += 1;
            }

            let before = pending.before.len();
            let start = if remove { index } else { index - 1 };
            for (offset, stmt) in pending.before.into_iter().enumerate() {
                stmts.insert(start + offset, stmt);
            }
            index += before;
            let after = pending.after.len();
            for (offset, stmt) in pending.after.into_iter().enumerate() {
                stmts.insert(index + offset, stmt);
            }
            index += after;
        }

        self.ctx.lists.pop();
    }

    fn visit_statement(&mut self, stmt: &mut Statement<'a>) {
        if self.statement_slot(stmt, false) {
            *stmt = build::empty_statement(self.ctx.ast);
        }
    }

    fn visit_expression(&mut self, expr: &mut Expression<'a>) {
        if self.stopped {
            return;
        }
        let (kind, span) = (NodeRef::Expression(expr).kind(), expr.span());

        let result = self.visitor.enter_expression(expr, &mut self.ctx);
        match self.settle(result, "enter_expression", kind, span) {
            Action::Remove => {
                *expr = build::void_zero(self.ctx.ast);
                return;
            }
            Action::Stop => return,
            Action::Skip | Action::Replaced => {}
            Action::Continue => {
                self.ctx.ancestors.push(Ancestor { kind, span });
                walk_mut::walk_expression(self, expr);
                self.ctx.ancestors.pop();
            }
        }
        if self.stopped {
            return;
        }

        let result = self.visitor.exit_expression(expr, &mut self.ctx);
        if self.settle(result, "exit_expression", kind, span) == Action::Remove {
            *expr = build::void_zero(self.ctx.ast);
        }
    }

    fn visit_function(&mut self, func: &mut Function<'a>, flags: ScopeFlags) {
        if self.stopped {
            return;
        }
        let span = func.span;

        let result = self.visitor.enter_function(func, &mut self.ctx);
        match self.settle(result, "enter_function", "Function", span) {
            Action::Stop => return,
            Action::Skip | Action::Replaced | Action::Remove => {}
            Action::Continue => walk_mut::walk_function(self, func, flags),
        }
        if self.stopped {
            return;
        }

        let result = self.visitor.exit_function(func, &mut self.ctx);
        self.settle(result, "exit_function", "Function", span);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use oxc_allocator::Allocator;
    use oxc_codegen::Codegen;
    use oxc_parser::Parser;
    use oxc_span::SourceType;

    fn run<'a, V: Visitor<'a>>(allocator: &'a Allocator, code: &'a str, visitor: &mut V) -> (String, TraverseReport) {
        let mut program = Parser::new(allocator, code, SourceType::mjs()).parse().program;
        let scope = ScopeModel::crawl(&program);
        let report = traverse(AstBuilder::new(allocator), &mut program, &scope, visitor);
        (Codegen::new().build(&program).code, report)
    }

    struct RemoveDebugger;

    impl<'a> Visitor<'a> for RemoveDebugger {
        fn enter_statement(&mut self, stmt: &mut Statement<'a>, _ctx: &mut TraverseCtx<'_, 'a>) -> HookResult {
            Ok(if matches!(stmt, Statement::DebuggerStatement(_)) { Action::Remove } else { Action::Continue })
        }
    }

    #[test]
    fn test_remove_splices_lists_and_fills_single_slots() {
        let allocator = Allocator::default();
        let (output, report) = run(&allocator, "debugger; a(); if (x) debugger; else b();", &mut RemoveDebugger);

        assert!(!output.contains("debugger"), "got: {}", output);
        assert!(output.contains("a()"), "got: {}", output);
        assert!(output.contains("if (x)"), "got: {}", output);
        assert_eq!(report.changes, 2);
    }

    struct FoldOnes;

    impl<'a> Visitor<'a> for FoldOnes {
        fn enter_expression(&mut self, expr: &mut Expression<'a>, ctx: &mut TraverseCtx<'_, 'a>) -> HookResult {
            match expr {
                Expression::NumericLiteral(lit) if lit.value == 1.0 => {
                    *expr = build::string(ctx.ast, "one");
                    Ok(Action::Replaced)
                }
                Expression::CallExpression(call) if crate::node::identifier_name(&call.callee) == Some("skip") => {
                    Ok(Action::Skip)
                }
                _ => Ok(Action::Continue),
            }
        }
    }

    #[test]
    fn test_replace_and_skip() {
        let allocator = Allocator::default();
        let (output, _) = run(&allocator, "f(1); skip(1);", &mut FoldOnes);

        assert!(output.contains("f(\"one\")"), "got: {}", output);
        assert!(output.contains("skip(1)"), "Skipped children stay, got: {}", output);
    }

    struct StopAtSecond {
        seen: usize,
    }

    impl<'a> Visitor<'a> for StopAtSecond {
        fn enter_statement(&mut self, _stmt: &mut Statement<'a>, _ctx: &mut TraverseCtx<'_, 'a>) -> HookResult {
            self.seen += 1;
            Ok(if self.seen == 2 { Action::Stop } else { Action::Continue })
        }
    }

    #[test]
    fn test_stop_ends_walk() {
        let allocator = Allocator::default();
        let mut visitor = StopAtSecond { seen: 0 };
        let (_, report) = run(&allocator, "a(); b(); c(); d();", &mut visitor);

        assert_eq!(visitor.seen, 2);
        assert!(report.stopped);
    }

    struct FailOnFirstCall {
        failed: bool,
    }

    impl<'a> Visitor<'a> for FailOnFirstCall {
        fn enter_expression(&mut self, expr: &mut Expression<'a>, ctx: &mut TraverseCtx<'_, 'a>) -> HookResult {
            if !matches!(expr, Expression::CallExpression(_)) {
                return Ok(Action::Continue);
            }
            if !self.failed {
                self.failed = true;
                return Err(TransformError::Failed("first call".to_string()));
            }
            *expr = build::identifier(ctx.ast, "rewritten");
            Ok(Action::Replaced)
        }
    }

    #[test]
    fn test_hook_error_is_isolated() {
        let allocator = Allocator::default();
        let mut visitor = FailOnFirstCall { failed: false };
        let (output, report) = run(&allocator, "a(); b();", &mut visitor);

        assert_eq!(report.errors, 1);
        assert!(output.contains("a()"), "Failed node left alone, got: {}", output);
        assert!(output.contains("rewritten"), "Walk continued, got: {}", output);
    }

    struct HoistMarker;

    impl<'a> Visitor<'a> for HoistMarker {
        fn enter_expression(&mut self, expr: &mut Expression<'a>, ctx: &mut TraverseCtx<'_, 'a>) -> HookResult {
            if crate::node::identifier_name(expr) == Some("marker") && ctx.nearest("IfStatement").is_some() {
                let decl = build::var_declaration(ctx.ast, "hoisted", Some(build::number(ctx.ast, 1.0)));
                ctx.insert_before(decl);
                ctx.insert_after(build::expression_statement(ctx.ast, build::identifier(ctx.ast, "after")));
            }
            Ok(Action::Continue)
        }
    }

    #[test]
    fn test_insert_into_enclosing_list() {
        let allocator = Allocator::default();
        let (output, _) = run(&allocator, "first(); if (x) { marker; } last();", &mut HoistMarker);

        let hoisted = output.find("var hoisted").expect("inserted declaration");
        let marker = output.find("marker").expect("marker kept");
        let after = output.find("after").expect("inserted statement");
        assert!(hoisted < marker && marker < after, "got: {}", output);
        assert!(output.find("first").is_some_and(|f| f < hoisted), "got: {}", output);
    }

    struct RecordScopes {
        inner_differs: bool,
    }

    impl<'a> Visitor<'a> for RecordScopes {
        fn enter_expression(&mut self, expr: &mut Expression<'a>, ctx: &mut TraverseCtx<'_, 'a>) -> HookResult {
            if crate::node::identifier_name(expr) == Some("x") && ctx.in_function() {
                let binding = ctx.scope().get_binding("x", ctx.scope_id());
                self.inner_differs = binding.is_some_and(|b| b.scope_id != ctx.scope().root_scope());
            }
            Ok(Action::Continue)
        }
    }

    #[test]
    fn test_scope_tracking() {
        let allocator = Allocator::default();
        let mut visitor = RecordScopes { inner_differs: false };
        run(&allocator, "var x = 1; function f(x) { return x; }", &mut visitor);

        assert!(visitor.inner_differs);
    }
}
