//! Call-stack reconstruction.
//!
//! Some obfuscators pass every argument through a rest array and address
//! locals as slots of it:
//!
//! ```js
//! function add(...S) { S.length = 2; S[2] = S[0] + S[1]; return S[2]; }
//! // becomes
//! function add(S_0, S_1) { var S_2; S_2 = S_0 + S_1; return S_2; }
//! ```
//!
//! Slots below the declared length, or read before any write, become
//! parameters. The rest become locals. A local written once with a constant
//! is propagated into its later reads, one slot per step, until nothing
//! changes. Locals that are never written read as `undefined`.
//!
//! The rewrite of one function is all or nothing: any failure, including
//! running out of steps, puts the original function back.

use rustc_hash::{FxHashMap, FxHashSet};

use oxc_allocator::CloneIn;
use oxc_ast::AstBuilder;
use oxc_ast::ast::*;
use oxc_ast_visit::{Visit, VisitMut, walk, walk_mut};
use oxc_span::{GetSpan, Span};

use super::util::{IdentifierScan, constant_index};
use crate::TransformError;
use crate::context::Context;
use crate::evaluate::evaluate_pure;
use crate::node::{NodeKey, build};
use crate::pipeline::{OptionKind, OptionSpec, OptionValues, TransformStats, Transformer};
use crate::scope::ScopeModel;
use crate::traverse::{Action, HookResult, TraverseCtx, Visitor};

const MAX_PARAMETERS: usize = 255;

const OPTIONS: &[OptionSpec] = &[OptionSpec::new(
    "maxIterations",
    OptionKind::Integer {
        default: 1000,
        min: 1,
        max: 1_000_000,
    },
    "Propagation steps allowed per function before it is restored",
)];

pub struct Unstack;

impl Transformer for Unstack {
    fn name(&self) -> &'static str {
        "unstack"
    }

    fn description(&self) -> &'static str {
        "Turns rest-array pseudo stacks back into named parameters and locals"
    }

    fn options(&self) -> &'static [OptionSpec] {
        OPTIONS
    }

    fn run(&self, cx: &mut Context<'_>, options: &OptionValues) -> crate::Result<TransformStats> {
        let max_iterations = options.integer("maxIterations").unwrap_or(1000).max(1) as usize;

        cx.crawl();
        let mut rebuilder = StackRebuilder::new(max_iterations);
        let report = cx.traverse(&mut rebuilder);
        cx.crawl();

        Ok(TransformStats {
            changes: rebuilder.rebuilt,
            skipped: report.errors,
        })
    }
}

pub struct StackRebuilder {
    max_iterations: usize,
    rebuilt: usize,
    #[cfg(test)]
    fail_after: Option<usize>,
}

impl StackRebuilder {
    pub fn new(max_iterations: usize) -> Self {
        Self {
            max_iterations,
            rebuilt: 0,
            #[cfg(test)]
            fail_after: None,
        }
    }

    pub fn rebuilt(&self) -> usize {
        self.rebuilt
    }

    fn rebuild<'a>(
        &self,
        func: &mut Function<'a>,
        stack: &StackParameter,
        ast: AstBuilder<'a>,
    ) -> Result<(), TransformError> {
        let body = func.body.as_mut().ok_or(TransformError::Shape("function without a body"))?;
        let (length, leading) = declared_length(&body.statements, &stack.references);
        let slots = SlotScan::run(&body.statements[leading..], leading, &stack.references);
        let parameters = match length {
            Some(length) => length,
            None => slots.read_before_written().map_or(0, |max| max + 1),
        };
        if parameters > MAX_PARAMETERS {
            return Err(TransformError::Shape("stack declares too many slots"));
        }

        let mut steps = 0;
        loop {
            let slots = SlotScan::run(&body.statements[leading..], leading, &stack.references);
            let Some((slot, statement)) = slots.propagatable(parameters) else {
                break;
            };
            if steps >= self.max_iterations {
                return Err(TransformError::BoundExceeded {
                    what: "stack propagation",
                    bound: self.max_iterations,
                });
            }
            #[cfg(test)]
            if self.fail_after == Some(steps) {
                return Err(TransformError::Failed("injected failure".to_string()));
            }

            let Statement::ExpressionStatement(write) = body.statements.remove(statement) else {
                return Err(TransformError::Shape("slot write is not an expression statement"));
            };
            let Expression::AssignmentExpression(assign) = write.unbox().expression else {
                return Err(TransformError::Shape("slot write is not an assignment"));
            };
            let value = assign.unbox().right;
            let mut replace = ReplaceSlot {
                ast,
                references: &stack.references,
                slot,
                value: &value,
            };
            for stmt in body.statements.iter_mut().skip(leading) {
                replace.visit_statement(stmt);
            }
            log::debug!("propagated {}[{slot}] into its reads", stack.name);
            steps += 1;
        }

        let slots = SlotScan::run(&body.statements[leading..], leading, &stack.references);
        let mut names = FxHashMap::default();
        let mut undefined = FxHashSet::default();
        let mut locals = Vec::new();
        for slot in slots.indices() {
            if slot < parameters || slots.writes.contains_key(&slot) {
                names.insert(slot, slot_name(&stack.name, slot));
                if slot >= parameters {
                    locals.push(slot_name(&stack.name, slot));
                }
            } else {
                undefined.insert(slot);
            }
        }
        let params: Vec<String> = (0..parameters).map(|slot| slot_name(&stack.name, slot)).collect();
        if let Some(taken) = params.iter().chain(&locals).find(|name| stack.taken.contains(*name)) {
            return Err(TransformError::UnsafeRewrite(format!("`{taken}` is already in use")));
        }

        let mut rename = RenameSlots {
            ast,
            references: &stack.references,
            names: &names,
            undefined: &undefined,
        };
        for stmt in body.statements.iter_mut().skip(leading) {
            rename.visit_statement(stmt);
        }

        body.statements.drain(..leading);
        if !locals.is_empty() {
            body.statements.insert(0, build::var_declarations(ast, &locals));
        }
        func.params =
            build::formal_parameters(ast, &params).ok_or(TransformError::Failed("could not build parameters".to_string()))?;
        Ok(())
    }
}

impl Default for StackRebuilder {
    fn default() -> Self {
        Self::new(1000)
    }
}

impl<'a> Visitor<'a> for StackRebuilder {
    fn enter_function(&mut self, func: &mut Function<'a>, ctx: &mut TraverseCtx<'_, 'a>) -> HookResult {
        let Some(stack) = stack_parameter(func, ctx.scope()) else {
            return Ok(Action::Continue);
        };

        let backup = func.clone_in(ctx.ast.allocator);
        match self.rebuild(func, &stack, ctx.ast) {
            Ok(()) => {
                log::debug!("rebuilt parameters of stack `{}`", stack.name);
                self.rebuilt += 1;
                ctx.mark_changed();
                Ok(Action::Continue)
            }
            Err(err) => {
                *func = backup;
                Err(err)
            }
        }
    }
}

/// The rest parameter of `function (...S)` and every site reading `S`.
struct StackParameter {
    name: String,
    references: FxHashSet<NodeKey>,
    /// Names already bound anywhere, which slot names must avoid.
    taken: FxHashSet<String>,
}

fn stack_parameter(func: &Function<'_>, scope: &ScopeModel) -> Option<StackParameter> {
    if !func.params.items.is_empty() {
        return None;
    }
    let rest = func.params.rest.as_ref()?;
    let BindingPattern::BindingIdentifier(id) = &rest.rest.argument else {
        return None;
    };
    let body = func.body.as_ref()?;

    let binding = scope.binding_within(rest.span)?;
    if binding.violation_count() > 0 || binding.name != id.name.as_str() {
        return None;
    }
    let scan = IdentifierScan::of_statements(&body.statements);
    if scan.mentions("arguments") {
        return None;
    }

    let prefix = format!("{}_", id.name);
    let taken = scope
        .bindings()
        .map(|b| b.name.as_str())
        .chain(scan.references.iter().map(|(name, _)| name.as_str()))
        .filter(|name| name.starts_with(&prefix))
        .map(str::to_string)
        .collect();

    let stack = StackParameter {
        name: id.name.to_string(),
        references: binding.references.iter().map(|site| NodeKey::of(*site)).collect(),
        taken,
    };
    let (_, leading) = declared_length(&body.statements, &stack.references);
    SlotScan::run(&body.statements[leading..], leading, &stack.references)
        .valid
        .then_some(stack)
}

fn slot_name(stack: &str, slot: usize) -> String {
    format!("{stack}_{slot}")
}

/// `S.length = N;` statements at the top of the body: the last `N` and how
/// many statements there are.
fn declared_length(stmts: &[Statement<'_>], references: &FxHashSet<NodeKey>) -> (Option<usize>, usize) {
    let mut length = None;
    let mut leading = 0;
    for stmt in stmts {
        let Statement::ExpressionStatement(expr) = stmt else {
            break;
        };
        let Expression::AssignmentExpression(assign) = &expr.expression else {
            break;
        };
        let AssignmentTarget::StaticMemberExpression(member) = &assign.left else {
            break;
        };
        let on_stack = matches!(&member.object, Expression::Identifier(ident) if references.contains(&NodeKey::of(ident.span)));
        if assign.operator != AssignmentOperator::Assign || !on_stack || member.property.name != "length" {
            break;
        }
        let Some(value) = constant_index(&assign.right) else {
            break;
        };
        length = Some(value);
        leading += 1;
    }
    (length, leading)
}

/// The single top-level `S[k] = value;` writing a slot.
#[derive(Debug, Clone, Copy)]
struct TopLevelWrite {
    statement: usize,
    span: Span,
    constant: bool,
}

/// Slot reads and writes of a function body, by source position.
#[derive(Default)]
struct SlotScan<'r> {
    references: Option<&'r FxHashSet<NodeKey>>,
    reads: FxHashMap<usize, Vec<u32>>,
    writes: FxHashMap<usize, Vec<u32>>,
    top_level: FxHashMap<usize, TopLevelWrite>,
    /// False once `S` is used as anything but `S[constant]`.
    valid: bool,
}

impl<'r> SlotScan<'r> {
    fn run(stmts: &[Statement<'_>], offset: usize, references: &'r FxHashSet<NodeKey>) -> Self {
        let mut scan = Self {
            references: Some(references),
            valid: true,
            ..Self::default()
        };

        for (index, stmt) in stmts.iter().enumerate() {
            if let Statement::ExpressionStatement(expr) = stmt
                && let Expression::AssignmentExpression(assign) = &expr.expression
                && assign.operator == AssignmentOperator::Assign
                && let Some(member) = assign.left.as_member_expression()
                && let Some(slot) = scan.slot_of(member)
            {
                let Some(slot) = slot else {
                    scan.valid = false;
                    continue;
                };
                let start = assign.left.span().start;
                scan.writes.entry(slot).or_default().push(start);
                scan.top_level.insert(
                    slot,
                    TopLevelWrite {
                        statement: offset + index,
                        span: expr.span,
                        constant: evaluate_pure(&assign.right).is_some(),
                    },
                );
                scan.visit_expression(&assign.right);
                continue;
            }
            scan.visit_statement(stmt);
        }
        scan
    }

    fn is_stack(&self, object: &Expression<'_>) -> bool {
        matches!(object, Expression::Identifier(ident)
            if self.references.is_some_and(|refs| refs.contains(&NodeKey::of(ident.span))))
    }

    /// `Some(Some(k))` for `S[k]`, `Some(None)` for `S[unknown]` or `S.name`,
    /// `None` when the member is not on the stack.
    fn slot_of(&self, member: &MemberExpression<'_>) -> Option<Option<usize>> {
        if !self.is_stack(member.object()) {
            return None;
        }
        match member {
            MemberExpression::ComputedMemberExpression(computed) => Some(constant_index(&computed.expression)),
            _ => Some(None),
        }
    }

    fn record_member(&mut self, member: &MemberExpression<'_>, start: u32, write: bool) -> bool {
        let Some(slot) = self.slot_of(member) else {
            return false;
        };
        match slot {
            Some(slot) => {
                self.reads.entry(slot).or_default().push(start);
                if write {
                    self.writes.entry(slot).or_default().push(start);
                    self.top_level.remove(&slot);
                }
            }
            None => self.valid = false,
        }
        true
    }

    fn indices(&self) -> Vec<usize> {
        let mut indices: Vec<usize> = self.reads.keys().chain(self.writes.keys()).copied().collect();
        indices.sort_unstable();
        indices.dedup();
        indices
    }

    /// Highest slot whose first access may see the caller's argument.
    fn read_before_written(&self) -> Option<usize> {
        self.reads
            .iter()
            .filter(|(slot, reads)| {
                let first_read = reads.iter().min().copied().unwrap_or(u32::MAX);
                !self.top_level.get(*slot).is_some_and(|write| {
                    self.writes.get(*slot).is_some_and(|w| w.len() == 1) && write.span.end <= first_read
                })
            })
            .map(|(slot, _)| *slot)
            .max()
    }

    /// A local slot written once, at the top level, with a constant, and
    /// only read after that statement. Returns the slot and statement index.
    fn propagatable(&self, parameters: usize) -> Option<(usize, usize)> {
        let mut candidates: Vec<(usize, TopLevelWrite)> = self
            .top_level
            .iter()
            .filter(|(slot, write)| {
                **slot >= parameters
                    && write.constant
                    && self.writes.get(*slot).is_some_and(|w| w.len() == 1)
                    && self
                        .reads
                        .get(*slot)
                        .is_none_or(|reads| reads.iter().all(|start| *start >= write.span.end))
            })
            .map(|(slot, write)| (*slot, *write))
            .collect();
        candidates.sort_unstable_by_key(|(slot, _)| *slot);
        candidates.first().map(|(slot, write)| (*slot, write.statement))
    }
}

impl<'a> Visit<'a> for SlotScan<'_> {
    fn visit_expression(&mut self, it: &Expression<'a>) {
        if let Some(member) = it.as_member_expression()
            && self.record_member(member, it.span().start, false)
        {
            if let MemberExpression::ComputedMemberExpression(computed) = member {
                self.visit_expression(&computed.expression);
            }
            return;
        }
        walk::walk_expression(self, it);
    }

    fn visit_simple_assignment_target(&mut self, it: &SimpleAssignmentTarget<'a>) {
        if let Some(member) = it.as_member_expression()
            && self.record_member(member, it.span().start, true)
        {
            return;
        }
        walk::walk_simple_assignment_target(self, it);
    }

    fn visit_call_expression(&mut self, it: &CallExpression<'a>) {
        if let Some(member) = it.callee.as_member_expression()
            && self.is_stack(member.object())
        {
            self.valid = false;
        }
        walk::walk_call_expression(self, it);
    }

    fn visit_unary_expression(&mut self, it: &UnaryExpression<'a>) {
        if it.operator == UnaryOperator::Delete
            && let Some(member) = it.argument.as_member_expression()
            && self.is_stack(member.object())
        {
            self.valid = false;
        }
        walk::walk_unary_expression(self, it);
    }

    fn visit_identifier_reference(&mut self, it: &IdentifierReference<'a>) {
        if self
            .references
            .is_some_and(|refs| refs.contains(&NodeKey::of(it.span)))
        {
            self.valid = false;
        }
    }
}

/// Replaces reads of one slot with a copy of its value.
struct ReplaceSlot<'r, 'a> {
    ast: AstBuilder<'a>,
    references: &'r FxHashSet<NodeKey>,
    slot: usize,
    value: &'r Expression<'a>,
}

impl<'a> VisitMut<'a> for ReplaceSlot<'_, 'a> {
    fn visit_expression(&mut self, it: &mut Expression<'a>) {
        if stack_slot(it, self.references) == Some(self.slot) {
            *it = self.value.clone_in(self.ast.allocator);
            return;
        }
        walk_mut::walk_expression(self, it);
    }
}

/// Swaps every `S[k]` for its parameter or local, or `void 0`.
struct RenameSlots<'r, 'a> {
    ast: AstBuilder<'a>,
    references: &'r FxHashSet<NodeKey>,
    names: &'r FxHashMap<usize, String>,
    undefined: &'r FxHashSet<usize>,
}

impl<'a> VisitMut<'a> for RenameSlots<'_, 'a> {
    fn visit_expression(&mut self, it: &mut Expression<'a>) {
        if let Some(slot) = stack_slot(it, self.references) {
            if let Some(name) = self.names.get(&slot) {
                *it = build::identifier(self.ast, name);
                return;
            }
            if self.undefined.contains(&slot) {
                *it = build::void_zero(self.ast);
                return;
            }
        }
        walk_mut::walk_expression(self, it);
    }

    fn visit_simple_assignment_target(&mut self, it: &mut SimpleAssignmentTarget<'a>) {
        if let SimpleAssignmentTarget::ComputedMemberExpression(member) = it
            && matches!(&member.object, Expression::Identifier(ident) if self.references.contains(&NodeKey::of(ident.span)))
            && let Some(slot) = constant_index(&member.expression)
            && let Some(name) = self.names.get(&slot)
        {
            *it = build::identifier_target(self.ast, name);
            return;
        }
        walk_mut::walk_simple_assignment_target(self, it);
    }
}

fn stack_slot(expr: &Expression<'_>, references: &FxHashSet<NodeKey>) -> Option<usize> {
    let Expression::ComputedMemberExpression(member) = expr else {
        return None;
    };
    let Expression::Identifier(object) = &member.object else {
        return None;
    };
    if !references.contains(&NodeKey::of(object.span)) {
        return None;
    }
    constant_index(&member.expression)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::Options;
    use crate::transformers::test_support::{reprint, run, run_with};
    use serde_json::json;

    fn run_unstack(code: &str) -> String {
        run(&Unstack, code)
    }

    #[test]
    fn test_declared_length_becomes_parameters() {
        let output = run_unstack("function add(...S) { S.length = 2; S[2] = S[0] + S[1]; return S[2]; }");
        assert!(output.contains("function add(S_0, S_1)"), "got: {}", output);
        assert!(output.contains("var S_2"), "got: {}", output);
        assert!(output.contains("S_2 = S_0 + S_1"), "got: {}", output);
        assert!(output.contains("return S_2"), "got: {}", output);
        assert!(!output.contains("length"), "got: {}", output);
    }

    #[test]
    fn test_written_first_slot_is_local() {
        let output = run_unstack("function f(...a) { a[1] = 2; return a[0] * a[1]; }");
        assert!(output.contains("function f(a_0)"), "got: {}", output);
        assert!(output.contains("return a_0 * 2"), "got: {}", output);
    }

    #[test]
    fn test_constants_propagate_through_chain() {
        let output = run_unstack("function f(...S) { S.length = 1; S[1] = 5; S[2] = S[1]; return S[0] + S[2]; }");
        assert!(output.contains("function f(S_0)"), "got: {}", output);
        assert!(output.contains("return S_0 + 5"), "got: {}", output);
        assert!(!output.contains("S_1"), "got: {}", output);
    }

    #[test]
    fn test_truncated_slot_reads_undefined() {
        let output = run_unstack("function g(...s) { s.length = 1; return s[0] + s[3]; }");
        assert!(output.contains("function g(s_0)"), "got: {}", output);
        assert!(output.contains("s_0 + void 0"), "got: {}", output);
    }

    #[test]
    fn test_non_stack_rest_untouched() {
        let output = run_unstack("function h(...r) { return r.map((x) => x); }\nfunction k(...r) { return r[i]; }");
        assert!(output.contains("function h(...r)"), "got: {}", output);
        assert!(output.contains("function k(...r)"), "got: {}", output);
    }

    #[test]
    fn test_arguments_use_untouched() {
        let output = run_unstack("function h(...r) { return r[0] + arguments.length; }");
        assert!(output.contains("function h(...r)"), "got: {}", output);
    }

    #[test]
    fn test_iteration_bound_restores_function() {
        let code = "function f(...S) { S.length = 1; S[1] = 5; S[2] = S[1]; return S[0] + S[2]; }";
        let (output, stats) = run_with(&Unstack, json!({ "maxIterations": 1 }), code);
        assert_eq!(output, reprint(code));
        assert_eq!(stats.changes, 0);
        assert_eq!(stats.skipped, 1);
    }

    #[test]
    fn test_failure_mid_rewrite_restores_function() {
        let code = "function f(...S) { S.length = 1; S[1] = 5; S[2] = S[1]; return S[0] + S[2]; }";
        let allocator = oxc_allocator::Allocator::default();
        let mut cx = Context::parse(&allocator, code, &Options::default()).expect("parses");
        cx.crawl();

        let mut rebuilder = StackRebuilder::new(1000);
        rebuilder.fail_after = Some(1);
        let report = cx.traverse(&mut rebuilder);

        assert_eq!(report.errors, 1);
        assert_eq!(rebuilder.rebuilt(), 0);
        assert_eq!(cx.generate(), reprint(code));
    }
}
