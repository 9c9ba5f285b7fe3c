//! Control-flow deflattening.
//!
//! Two dispatcher shapes are rebuilt into straight-line code. The
//! split-sequence form walks a fixed order:
//!
//! ```js
//! var order = "2|0|1".split("|"), i = 0;
//! while (true) {
//!     switch (order[i++]) {
//!         case "0": second(); continue;
//!         case "1": third(); continue;
//!         case "2": first(); continue;
//!     }
//!     break;
//! }
//! ```
//!
//! The numeric form drives one or more state variables through arithmetic:
//!
//! ```js
//! var s = 3;
//! while (s !== 0) {
//!     switch (s) {
//!         case 3: first(); s = s - 2; break;
//!         case 1: second(); s = 0; break;
//!     }
//! }
//! ```
//!
//! Both are simulated from the state declared right before the loop. A run
//! that has not left the loop after `(cases + 1) × iterationMultiplier`
//! steps is a failure, and the loop is left exactly as it was. So is a
//! loop whose cases declare `let`, `const`, `class` or `function` bindings,
//! since flattening would move them out of the switch block.

use lazy_static::lazy_static;
use rustc_hash::{FxHashMap, FxHashSet};

use oxc_allocator::{CloneIn, Vec as OxcVec};
use oxc_ast::AstBuilder;
use oxc_ast::ast::*;
use oxc_ast_visit::{Visit, walk};
use oxc_span::{GetSpan, Span};
use oxc_syntax::scope::ScopeFlags;

use super::util::{IdentifierScan, Prune};
use crate::TransformError;
use crate::context::Context;
use crate::evaluate::{Constant, binary_op, evaluate, evaluate_pure, evaluate_truthiness};
use crate::matcher::{Pattern, matches_expression, matches_statement};
use crate::node::NodeKey;
use crate::pipeline::{OptionKind, OptionSpec, OptionValues, TransformStats, Transformer};
use crate::scope::ScopeModel;
use crate::traverse::{Action, HookResult, TraverseCtx, Visitor};

/// A nested dispatcher is rebuilt one round after its parent.
const MAX_ROUNDS: usize = 8;

lazy_static! {
    /// `while (test) <body>` or `for (; test; ) <body>`.
    static ref DISPATCH_LOOP: Pattern = Pattern::either([
        Pattern::node("WhileStatement")
            .with("test", Pattern::extract("test"))
            .with("body", dispatch_body()),
        Pattern::node("ForStatement")
            .with("init", Pattern::extract("init"))
            .with("test", Pattern::extract("test"))
            .with("update", Pattern::extract("update"))
            .with("body", dispatch_body()),
    ]);

    /// `"1|0|2".split("|")`
    static ref SPLIT_SEQUENCE: Pattern = Pattern::call(
        Pattern::member(Pattern::extract_as("text", Pattern::node("StringLiteral")), "split"),
        Pattern::exact([Pattern::extract_as("separator", Pattern::node("StringLiteral"))]),
    );
}

/// The switch on its own, alone in a block, or followed by a `break;`.
fn dispatch_body() -> Pattern {
    let switch = || Pattern::extract_as("switch", Pattern::node("SwitchStatement"));
    Pattern::either([
        switch(),
        Pattern::node("BlockStatement").with("body", Pattern::exact([switch()])),
        Pattern::node("BlockStatement").with(
            "body",
            Pattern::exact([switch(), Pattern::node("BreakStatement").with("label", Pattern::extract("label"))]),
        ),
    ])
}

const OPTIONS: &[OptionSpec] = &[OptionSpec::new(
    "iterationMultiplier",
    OptionKind::Integer {
        default: 1,
        min: 1,
        max: 64,
    },
    "Simulation steps allowed per dispatcher, as a multiple of (cases + 1)",
)];

pub struct ControlFlowFlattening;

impl Transformer for ControlFlowFlattening {
    fn name(&self) -> &'static str {
        "control-flow-flattening"
    }

    fn description(&self) -> &'static str {
        "Rebuilds switch-dispatcher state machines into linear code"
    }

    fn options(&self) -> &'static [OptionSpec] {
        OPTIONS
    }

    fn run(&self, cx: &mut Context<'_>, options: &OptionValues) -> crate::Result<TransformStats> {
        let multiplier = options.integer("iterationMultiplier").unwrap_or(1).max(1) as usize;
        let mut stats = TransformStats::default();
        let mut failed = FxHashSet::default();

        for _ in 0..MAX_ROUNDS {
            cx.crawl();
            let mut finder = DispatcherFinder::new(cx.ast, cx.scope(), multiplier);
            finder.visit_program(&cx.program);
            let DispatcherFinder {
                plans,
                setup,
                failed: round_failures,
                ..
            } = finder;
            failed.extend(round_failures);
            if plans.is_empty() {
                break;
            }

            let mut splice = Splice { plans, applied: 0 };
            cx.traverse(&mut splice);
            stats.changes += splice.applied;

            let mut prune = Prune::new();
            for span in setup {
                prune.mark(span);
            }
            cx.traverse(&mut prune);
        }

        stats.skipped += failed.len();
        cx.crawl();
        Ok(stats)
    }
}

/// A dispatcher loop rebuilt as a flat statement sequence.
pub struct Unflattened<'a> {
    pub statements: Vec<Statement<'a>>,
    /// State declarators that are dead once the loop is gone.
    pub setup: Vec<Span>,
}

/// Tries to rebuild `list[index]`. `Ok(None)` when it is not a dispatcher
/// loop fed by state declared right before it.
pub fn unflatten<'a>(
    ast: AstBuilder<'a>,
    scope: &ScopeModel,
    list: &[Statement<'a>],
    index: usize,
    multiplier: usize,
) -> Result<Option<Unflattened<'a>>, TransformError> {
    let Some(dispatch) = list.get(index).and_then(dispatch_loop) else {
        return Ok(None);
    };

    let seeds = state_seeds(&list[..index]);
    let mut scan = IdentifierScan::of_expression(&dispatch.switch.discriminant);
    if let Some(test) = dispatch.test {
        scan.references.extend(IdentifierScan::of_expression(test).references);
    }
    let names: Vec<String> = seeds.keys().filter(|name| scan.mentions(name)).cloned().collect();
    if names.is_empty() {
        return Ok(None);
    }

    let region = NodeKey::of(dispatch.span);
    let mut state = MachineState::default();
    let mut setup = Vec::with_capacity(names.len());
    for name in &names {
        let seed = &seeds[name];
        let binding = scope
            .binding_at(seed.identifier)
            .ok_or(TransformError::Shape("state variable without a binding"))?;
        let contained = binding
            .references
            .iter()
            .chain(&binding.constant_violations)
            .all(|site| region.contains(NodeKey::of(*site)));
        if !contained {
            return Err(TransformError::UnsafeRewrite(format!("`{name}` is used outside the dispatcher")));
        }

        match &seed.value {
            Seed::Value(value) => {
                state.values.insert(name.clone(), value.clone());
            }
            Seed::Sequence(items) => {
                state.sequences.insert(name.clone(), items.clone());
            }
        }
        setup.push(seed.declarator);
    }

    let simulation = Simulation {
        ast,
        switch: dispatch.switch,
        names,
        state,
        output: Vec::new(),
    };
    let statements = simulation.run(&dispatch, multiplier)?;
    log::debug!(
        "dispatcher at {}..{} rebuilt into {} statements",
        dispatch.span.start,
        dispatch.span.end,
        statements.len()
    );
    Ok(Some(Unflattened { statements, setup }))
}

struct DispatchLoop<'b, 'a> {
    span: Span,
    test: Option<&'b Expression<'a>>,
    switch: &'b SwitchStatement<'a>,
    /// `break;` right after the switch: finishing a case leaves the loop.
    breaks_after: bool,
}

fn dispatch_loop<'b, 'a>(stmt: &'b Statement<'a>) -> Option<DispatchLoop<'b, 'a>> {
    let captures = matches_statement(stmt, &DISPATCH_LOOP)?;
    let present = |name: &str| captures.get(name).is_some() && !captures.is_absent(name);
    if present("init") || present("update") || present("label") {
        return None;
    }
    let Some(Statement::SwitchStatement(switch)) = captures.statement("switch") else {
        return None;
    };

    Some(DispatchLoop {
        span: stmt.span(),
        test: captures.expression("test"),
        switch,
        breaks_after: captures.is_absent("label"),
    })
}

enum Seed {
    Value(Constant),
    Sequence(Vec<String>),
}

struct SeedDeclaration {
    identifier: Span,
    declarator: Span,
    value: Seed,
}

/// Constant and split-sequence initializers of the declarations right
/// before the loop. The declaration nearest the loop wins.
fn state_seeds(preceding: &[Statement<'_>]) -> FxHashMap<String, SeedDeclaration> {
    let mut seeds = FxHashMap::default();
    for stmt in preceding.iter().rev() {
        let Statement::VariableDeclaration(decl) = stmt else {
            break;
        };
        for declarator in &decl.declarations {
            let BindingPattern::BindingIdentifier(id) = &declarator.id else {
                continue;
            };
            let Some(init) = &declarator.init else {
                continue;
            };
            let value = match split_sequence(init) {
                Some(items) => Seed::Sequence(items),
                None => match evaluate_pure(init) {
                    Some(value) => Seed::Value(value),
                    None => continue,
                },
            };
            seeds.entry(id.name.to_string()).or_insert(SeedDeclaration {
                identifier: id.span,
                declarator: declarator.span,
                value,
            });
        }
    }
    seeds
}

/// `"1|0|2".split("|")` as its parts.
fn split_sequence(expr: &Expression<'_>) -> Option<Vec<String>> {
    let captures = matches_expression(expr, &SPLIT_SEQUENCE)?;
    let (text, separator) = (captures.str("text")?, captures.str("separator")?);
    if separator.is_empty() {
        return None;
    }
    Some(text.split(separator).map(str::to_string).collect())
}

#[derive(Default)]
struct MachineState {
    values: FxHashMap<String, Constant>,
    sequences: FxHashMap<String, Vec<String>>,
}

enum Completion {
    Break,
    Continue,
    /// `return` or `throw`.
    Exit,
}

struct Simulation<'b, 'a> {
    ast: AstBuilder<'a>,
    switch: &'b SwitchStatement<'a>,
    names: Vec<String>,
    state: MachineState,
    output: Vec<Statement<'a>>,
}

impl<'a> Simulation<'_, 'a> {
    fn run(mut self, dispatch: &DispatchLoop<'_, 'a>, multiplier: usize) -> Result<Vec<Statement<'a>>, TransformError> {
        let bound = (self.switch.cases.len() + 1) * multiplier;

        for _ in 0..bound {
            if let Some(test) = dispatch.test {
                match evaluate_truthiness(test, &self.state.values) {
                    Some(true) => {}
                    Some(false) => return Ok(self.output),
                    None => return Err(TransformError::Shape("loop test depends on unknown values")),
                }
            }

            let selector = self.discriminant()?;
            let completion = match self.select(&selector)? {
                Some(start) => self.run_cases(start)?,
                None => Completion::Break,
            };
            match completion {
                Completion::Exit => return Ok(self.output),
                Completion::Break if dispatch.breaks_after => return Ok(self.output),
                Completion::Break | Completion::Continue => {}
            }
        }

        Err(TransformError::BoundExceeded {
            what: "control-flow dispatcher",
            bound,
        })
    }

    /// Value the switch selects on. `seq[i++]` advances the counter.
    fn discriminant(&mut self) -> Result<Constant, TransformError> {
        let switch = self.switch;
        let discriminant = &switch.discriminant;
        if let Expression::ComputedMemberExpression(member) = discriminant.without_parentheses()
            && let Expression::Identifier(object) = &member.object
            && let Some(sequence) = self.state.sequences.get(object.name.as_str())
        {
            let position = match &member.expression {
                Expression::UpdateExpression(update)
                    if !update.prefix && update.operator == UpdateOperator::Increment =>
                {
                    let SimpleAssignmentTarget::AssignmentTargetIdentifier(counter) = &update.argument else {
                        return Err(TransformError::Shape("sequence counter is not an identifier"));
                    };
                    let current = self
                        .state
                        .values
                        .get(counter.name.as_str())
                        .and_then(Constant::as_number)
                        .ok_or(TransformError::Shape("sequence counter is not a known number"))?;
                    self.state
                        .values
                        .insert(counter.name.to_string(), Constant::Number(current + 1.0));
                    current
                }
                other => evaluate(other, &self.state.values)
                    .and_then(|value| value.as_number())
                    .ok_or(TransformError::Shape("sequence index is not computable"))?,
            };

            let item = (position >= 0.0 && position.fract() == 0.0)
                .then(|| sequence.get(position as usize).cloned())
                .flatten();
            return Ok(item.map_or(Constant::Undefined, Constant::String));
        }

        evaluate(discriminant, &self.state.values).ok_or(TransformError::Shape("dispatcher discriminant is not computable"))
    }

    /// Case the switch jumps to, by strict equality, else `default`.
    fn select(&self, selector: &Constant) -> Result<Option<usize>, TransformError> {
        let mut default = None;
        for (index, case) in self.switch.cases.iter().enumerate() {
            let Some(test) = &case.test else {
                default = Some(index);
                continue;
            };
            let value = evaluate_pure(test).ok_or(TransformError::Shape("case test is not a constant"))?;
            if binary_op(BinaryOperator::StrictEquality, selector, &value) == Some(Constant::Boolean(true)) {
                return Ok(Some(index));
            }
        }
        Ok(default)
    }

    /// Runs from case `start`, falling through until a jump.
    fn run_cases(&mut self, start: usize) -> Result<Completion, TransformError> {
        let switch = self.switch;
        for (index, case) in switch.cases.iter().enumerate().skip(start) {
            if declares_scoped(&case.consequent) {
                return Err(TransformError::UnsafeRewrite(format!("case {index} declares block-scoped bindings")));
            }

            for stmt in &case.consequent {
                match stmt {
                    Statement::BreakStatement(brk) if brk.label.is_none() => return Ok(Completion::Break),
                    Statement::ContinueStatement(cont) if cont.label.is_none() => return Ok(Completion::Continue),
                    Statement::ExpressionStatement(expr) => {
                        if !self.apply_update(&expr.expression)? {
                            self.emit(stmt)?;
                        }
                    }
                    Statement::ReturnStatement(_) | Statement::ThrowStatement(_) => {
                        self.emit(stmt)?;
                        return Ok(Completion::Exit);
                    }
                    _ => self.emit(stmt)?,
                }
            }
        }
        Ok(Completion::Break)
    }

    /// Applies `state = expr`, `state op= expr` or `state++`. False when
    /// `expr` does not write a state variable.
    fn apply_update(&mut self, expr: &Expression<'a>) -> Result<bool, TransformError> {
        match expr.without_parentheses() {
            Expression::AssignmentExpression(assign) => {
                let AssignmentTarget::AssignmentTargetIdentifier(target) = &assign.left else {
                    return Ok(false);
                };
                let name = target.name.as_str();
                if !self.names.iter().any(|n| n == name) {
                    return Ok(false);
                }

                let right = evaluate(&assign.right, &self.state.values)
                    .ok_or(TransformError::Shape("state update is not computable"))?;
                let value = if assign.operator == AssignmentOperator::Assign {
                    right
                } else {
                    let operator = assign
                        .operator
                        .to_binary_operator()
                        .ok_or(TransformError::Shape("logical assignment to a state variable"))?;
                    let current = self.state.values.get(name).cloned().unwrap_or(Constant::Undefined);
                    binary_op(operator, &current, &right).ok_or(TransformError::Shape("state update is not computable"))?
                };
                self.state.values.insert(name.to_string(), value);
                Ok(true)
            }
            Expression::UpdateExpression(update) => {
                let SimpleAssignmentTarget::AssignmentTargetIdentifier(target) = &update.argument else {
                    return Ok(false);
                };
                let name = target.name.as_str();
                if !self.names.iter().any(|n| n == name) {
                    return Ok(false);
                }

                let current = self.state.values.get(name).map_or(f64::NAN, Constant::to_number);
                let next = match update.operator {
                    UpdateOperator::Increment => current + 1.0,
                    UpdateOperator::Decrement => current - 1.0,
                };
                self.state.values.insert(name.to_string(), Constant::Number(next));
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    fn emit(&mut self, stmt: &Statement<'a>) -> Result<(), TransformError> {
        let scan = IdentifierScan::of_statements(std::slice::from_ref(stmt));
        if let Some(name) = self.names.iter().find(|name| scan.mentions(name)) {
            return Err(TransformError::UnsafeRewrite(format!("`{name}` is used inside a case body")));
        }

        let mut jumps = EscapingJumps::default();
        jumps.visit_statement(stmt);
        if jumps.found {
            return Err(TransformError::UnsafeRewrite("case body jumps out of the dispatcher".to_string()));
        }

        self.output.push(stmt.clone_in(self.ast.allocator));
        Ok(())
    }
}

/// `let`, `const`, `class` and `function` declarations belong to the switch
/// block and cannot be lifted out of it.
fn declares_scoped(stmts: &[Statement<'_>]) -> bool {
    stmts.iter().any(|stmt| match stmt {
        Statement::VariableDeclaration(decl) => decl.kind != VariableDeclarationKind::Var,
        Statement::ClassDeclaration(_) | Statement::FunctionDeclaration(_) => true,
        _ => false,
    })
}

/// Finds `break` / `continue` that would leave the statement.
#[derive(Default)]
struct EscapingJumps {
    loops: usize,
    breakable: usize,
    labels: Vec<String>,
    found: bool,
}

impl EscapingJumps {
    fn in_loop(&mut self, walk: impl FnOnce(&mut Self)) {
        self.loops += 1;
        self.breakable += 1;
        walk(self);
        self.loops -= 1;
        self.breakable -= 1;
    }

    fn targets_inside(&self, label: Option<&LabelIdentifier<'_>>) -> bool {
        label.is_some_and(|label| self.labels.iter().any(|l| l == label.name.as_str()))
    }
}

impl<'a> Visit<'a> for EscapingJumps {
    fn visit_break_statement(&mut self, it: &BreakStatement<'a>) {
        let escapes = match &it.label {
            Some(label) => !self.targets_inside(Some(label)),
            None => self.breakable == 0,
        };
        self.found |= escapes;
    }

    fn visit_continue_statement(&mut self, it: &ContinueStatement<'a>) {
        let escapes = match &it.label {
            Some(label) => !self.targets_inside(Some(label)),
            None => self.loops == 0,
        };
        self.found |= escapes;
    }

    fn visit_labeled_statement(&mut self, it: &LabeledStatement<'a>) {
        self.labels.push(it.label.name.to_string());
        walk::walk_labeled_statement(self, it);
        self.labels.pop();
    }

    fn visit_switch_statement(&mut self, it: &SwitchStatement<'a>) {
        self.breakable += 1;
        walk::walk_switch_statement(self, it);
        self.breakable -= 1;
    }

    fn visit_while_statement(&mut self, it: &WhileStatement<'a>) {
        self.in_loop(|v| walk::walk_while_statement(v, it));
    }

    fn visit_do_while_statement(&mut self, it: &DoWhileStatement<'a>) {
        self.in_loop(|v| walk::walk_do_while_statement(v, it));
    }

    fn visit_for_statement(&mut self, it: &ForStatement<'a>) {
        self.in_loop(|v| walk::walk_for_statement(v, it));
    }

    fn visit_for_in_statement(&mut self, it: &ForInStatement<'a>) {
        self.in_loop(|v| walk::walk_for_in_statement(v, it));
    }

    fn visit_for_of_statement(&mut self, it: &ForOfStatement<'a>) {
        self.in_loop(|v| walk::walk_for_of_statement(v, it));
    }

    fn visit_function(&mut self, _it: &Function<'a>, _flags: ScopeFlags) {}

    fn visit_arrow_function_expression(&mut self, _it: &ArrowFunctionExpression<'a>) {}
}

/// Plans a rebuild for every dispatcher loop in a statement list. A planned
/// loop is not descended into; its nested dispatchers go next round.
struct DispatcherFinder<'s, 'a> {
    ast: AstBuilder<'a>,
    scope: &'s ScopeModel,
    multiplier: usize,
    plans: FxHashMap<NodeKey, Vec<Statement<'a>>>,
    setup: Vec<Span>,
    failed: Vec<NodeKey>,
}

impl<'s, 'a> DispatcherFinder<'s, 'a> {
    fn new(ast: AstBuilder<'a>, scope: &'s ScopeModel, multiplier: usize) -> Self {
        Self {
            ast,
            scope,
            multiplier,
            plans: FxHashMap::default(),
            setup: Vec::new(),
            failed: Vec::new(),
        }
    }
}

impl<'a> Visit<'a> for DispatcherFinder<'_, 'a> {
    fn visit_statements(&mut self, it: &OxcVec<'a, Statement<'a>>) {
        for (index, stmt) in it.iter().enumerate() {
            let span = stmt.span();
            match unflatten(self.ast, self.scope, it, index, self.multiplier) {
                Ok(Some(rebuilt)) => {
                    self.plans.insert(NodeKey::of(span), rebuilt.statements);
                    self.setup.extend(rebuilt.setup);
                    continue;
                }
                Ok(None) => {}
                Err(err @ TransformError::BoundExceeded { .. }) => {
                    log::warn!("leaving dispatcher at {}..{} as is: {err}", span.start, span.end);
                    self.failed.push(NodeKey::of(span));
                }
                Err(err) => {
                    log::debug!("dispatcher at {}..{} not rebuilt: {err}", span.start, span.end);
                    self.failed.push(NodeKey::of(span));
                }
            }
            self.visit_statement(stmt);
        }
    }
}

/// Swaps planned loops for their rebuilt statements.
struct Splice<'a> {
    plans: FxHashMap<NodeKey, Vec<Statement<'a>>>,
    applied: usize,
}

impl<'a> Visitor<'a> for Splice<'a> {
    fn enter_statement(&mut self, stmt: &mut Statement<'a>, ctx: &mut TraverseCtx<'_, 'a>) -> HookResult {
        if !ctx.is_list_item() {
            return Ok(Action::Continue);
        }
        let Some(statements) = self.plans.remove(&NodeKey::of(stmt.span())) else {
            return Ok(Action::Continue);
        };

        for rebuilt in statements {
            ctx.insert_before(rebuilt);
        }
        self.applied += 1;
        Ok(Action::Remove)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::Options;
    use crate::transformers::test_support::{run, run_with};
    use serde_json::json;

    fn run_control_flow_flattening(code: &str) -> String {
        run(&ControlFlowFlattening, code)
    }

    fn in_order(output: &str, parts: &[&str]) -> bool {
        let positions: Vec<Option<usize>> = parts.iter().map(|p| output.find(p)).collect();
        positions.iter().all(Option::is_some) && positions.windows(2).all(|w| w[0] < w[1])
    }

    #[test]
    fn test_split_sequence_dispatcher() {
        let output = run_control_flow_flattening(
            r#"function f() {
                var _flow = "2|0|1".split("|"), _i = 0;
                while (true) {
                    switch (_flow[_i++]) {
                        case "0": console.log("second"); continue;
                        case "1": console.log("third"); continue;
                        case "2": console.log("first"); continue;
                    }
                    break;
                }
            }"#,
        );
        assert!(!output.contains("switch"), "Dispatcher should be gone, got: {}", output);
        assert!(!output.contains("_flow"), "Sequence should be removed, got: {}", output);
        assert!(in_order(&output, &["first", "second", "third"]), "got: {}", output);
    }

    #[test]
    fn test_numeric_state_machine() {
        let output = run_control_flow_flattening(
            "function g() {
                var s = 3;
                while (s !== 0) {
                    switch (s) {
                        case 1: second(); s = 0; break;
                        case 3: first(); s = s - 2; break;
                    }
                }
                return done();
            }",
        );
        assert!(!output.contains("switch"), "got: {}", output);
        assert!(!output.contains("var s"), "got: {}", output);
        assert!(in_order(&output, &["first()", "second()", "return done()"]), "got: {}", output);
    }

    #[test]
    fn test_fallthrough_and_return() {
        let output = run_control_flow_flattening(
            "function h(x) {
                var s = 0;
                for (;;) {
                    switch (s) {
                        case 0: a(x);
                        case 1: b(); s = 2; break;
                        case 2: return x;
                    }
                }
            }",
        );
        assert!(!output.contains("for (;;)"), "got: {}", output);
        assert!(in_order(&output, &["a(x)", "b()", "return x"]), "got: {}", output);
    }

    #[test]
    fn test_unreachable_exit_hits_bound() {
        let code = "var s = 0;
            while (s !== 9) {
                switch (s) {
                    case 0: a(); s = 1; break;
                    case 1: b(); s = 2; break;
                    case 2: c(); s = 3; break;
                    case 3: d(); s = 4; break;
                    case 4: e(); s = 0; break;
                }
            }";

        let allocator = oxc_allocator::Allocator::default();
        let mut cx = Context::parse(&allocator, code, &Options::default()).expect("parses");
        cx.crawl();
        let result = unflatten(cx.ast, cx.scope(), &cx.program.body, 1, 1);
        match result {
            Err(TransformError::BoundExceeded { bound, .. }) => assert_eq!(bound, 6),
            Err(other) => panic!("expected bound failure, got {other}"),
            Ok(_) => panic!("expected bound failure, got a rebuild"),
        }

        let (output, stats) = run_with(&ControlFlowFlattening, json!({}), code);
        assert!(output.contains("switch (s)"), "Loop should be untouched, got: {}", output);
        assert_eq!(stats.changes, 0);
        assert_eq!(stats.skipped, 1);
    }

    #[test]
    fn test_iteration_multiplier() {
        let code = "function k() {
                var s = 0;
                while (s < 4) {
                    switch (s % 2) {
                        case 0: a(); s++; break;
                        case 1: b(); s++; break;
                    }
                }
            }";

        let output = run_control_flow_flattening(code);
        assert!(output.contains("switch"), "Default bound is too small, got: {}", output);

        let (output, _) = run_with(&ControlFlowFlattening, json!({ "iterationMultiplier": 2 }), code);
        assert!(!output.contains("switch"), "got: {}", output);
        assert_eq!(output.matches("a()").count(), 2, "got: {}", output);
        assert!(in_order(&output, &["a()", "b()"]), "got: {}", output);
    }

    #[test]
    fn test_state_used_after_loop_untouched() {
        let output = run_control_flow_flattening(
            "function f() {
                var s = 0;
                while (s !== 1) { switch (s) { case 0: a(); s = 1; break; } }
                return s;
            }",
        );
        assert!(output.contains("switch (s)"), "got: {}", output);
    }

    #[test]
    fn test_nested_break_untouched() {
        let output = run_control_flow_flattening(
            "function f(x) {
                var s = 0;
                while (s !== 2) {
                    switch (s) {
                        case 0: if (x) break; s = 1; break;
                        case 1: a(); s = 2; break;
                    }
                }
            }",
        );
        assert!(output.contains("switch (s)"), "got: {}", output);
    }

    #[test]
    fn test_inner_loop_break_kept() {
        let output = run_control_flow_flattening(
            "function f(xs) {
                var s = 0;
                while (s !== 1) {
                    switch (s) {
                        case 0: for (var x of xs) { if (x) break; } s = 1; break;
                    }
                }
            }",
        );
        assert!(!output.contains("switch"), "got: {}", output);
        assert!(output.contains("for (var x of xs)"), "got: {}", output);
    }

    #[test]
    fn test_scoped_declaration_in_case_untouched() {
        let code = "function f() {
                var s = 0;
                while (s !== 2) {
                    switch (s) {
                        case 0: let x = a(); s = 1; break;
                        case 1: b(); s = 2; break;
                    }
                }
                return typeof x;
            }";
        let (output, stats) = run_with(&ControlFlowFlattening, json!({}), code);
        assert!(output.contains("switch (s)"), "got: {}", output);
        assert!(output.contains("let x = a()"), "got: {}", output);
        assert_eq!(stats.changes, 0);
        assert_eq!(stats.skipped, 1);
    }

    #[test]
    fn test_labeled_break_after_switch_untouched() {
        let output = run_control_flow_flattening(
            "function f() {
                var s = 0;
                outer: while (s !== 1) {
                    switch (s) { case 0: a(); s = 1; break; }
                    break outer;
                }
            }",
        );
        assert!(output.contains("switch (s)"), "got: {}", output);
    }

    #[test]
    fn test_plain_loop_untouched() {
        let code = "while (true) { switch (next()) { case 1: a(); break; } }";
        let (output, stats) = run_with(&ControlFlowFlattening, json!({}), code);
        assert!(output.contains("switch (next())"), "got: {}", output);
        assert_eq!(stats.skipped, 0);
    }
}
