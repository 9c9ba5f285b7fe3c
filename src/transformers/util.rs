//! Pieces several transformers share: identifier scans, parameter
//! substitution, argument evaluation order and declaration pruning.

use lazy_static::lazy_static;
use regex::Regex;
use rustc_hash::{FxHashMap, FxHashSet};

use oxc_allocator::CloneIn;
use oxc_ast::AstBuilder;
use oxc_ast::ast::*;
use oxc_ast_visit::{Visit, VisitMut, walk, walk_mut};
use oxc_span::{GetSpan, Span};
use oxc_syntax::scope::ScopeFlags;

use crate::evaluate::{Constant, evaluate_pure};
use crate::node::{NodeKey, build};
use crate::scope::ScopeModel;
use crate::traverse::{Action, HookResult, TraverseCtx, Visitor};

lazy_static! {
    static ref IDENTIFIER_NAME: Regex = Regex::new(r"^[A-Za-z_$][A-Za-z0-9_$]*$").expect("valid regex");
}

/// Valid after a dot: `obj.name`. Reserved words are allowed there.
pub fn is_identifier_name(name: &str) -> bool {
    IDENTIFIER_NAME.is_match(name)
}

/// Non-negative integer an index expression evaluates to.
pub fn constant_index(expr: &Expression<'_>) -> Option<usize> {
    let value = match evaluate_pure(expr)? {
        Constant::Number(n) => n,
        Constant::String(s) => Constant::String(s).to_number(),
        _ => return None,
    };
    (value.is_finite() && value >= 0.0 && value.fract() == 0.0 && value < u32::MAX as f64).then_some(value as usize)
}

/// Names of a plain `(a, b, c)` parameter list: no rest element, no
/// defaults, no destructuring, no duplicates.
pub fn simple_parameters(params: &FormalParameters<'_>) -> Option<Vec<String>> {
    if params.rest.is_some() {
        return None;
    }
    let names = params
        .items
        .iter()
        .map(|param| match &param.pattern {
            BindingPattern::BindingIdentifier(ident) => Some(ident.name.to_string()),
            _ => None,
        })
        .collect::<Option<Vec<String>>>()?;

    let mut defaults = HasExpression(false);
    defaults.visit_formal_parameters(params);
    let unique = names.iter().enumerate().all(|(i, name)| !names[..i].contains(name));
    (unique && !defaults.0).then_some(names)
}

/// Notes whether a subtree holds any expression at all.
struct HasExpression(bool);

impl<'a> Visit<'a> for HasExpression {
    fn visit_expression(&mut self, _it: &Expression<'a>) {
        self.0 = true;
    }
}

/// Identifier usage of a subtree.
#[derive(Debug, Default)]
pub struct IdentifierScan {
    pub references: Vec<(String, Span)>,
    pub bindings: Vec<String>,
    pub has_this: bool,
    pub has_closure: bool,
    pub has_assignment: bool,
    pub has_suspend: bool,
}

impl IdentifierScan {
    pub fn of_expression(expr: &Expression<'_>) -> Self {
        let mut scan = Self::default();
        scan.visit_expression(expr);
        scan
    }

    pub fn of_statements(stmts: &[Statement<'_>]) -> Self {
        let mut scan = Self::default();
        for stmt in stmts {
            scan.visit_statement(stmt);
        }
        scan
    }

    pub fn names(&self) -> FxHashSet<&str> {
        self.references.iter().map(|(name, _)| name.as_str()).collect()
    }

    pub fn count(&self, name: &str) -> usize {
        self.references.iter().filter(|(n, _)| n == name).count()
    }

    pub fn mentions(&self, name: &str) -> bool {
        self.references.iter().any(|(n, _)| n == name) || self.bindings.iter().any(|n| n == name)
    }
}

impl<'a> Visit<'a> for IdentifierScan {
    fn visit_identifier_reference(&mut self, it: &IdentifierReference<'a>) {
        self.references.push((it.name.to_string(), it.span));
    }

    fn visit_binding_identifier(&mut self, it: &BindingIdentifier<'a>) {
        self.bindings.push(it.name.to_string());
    }

    fn visit_this_expression(&mut self, _it: &ThisExpression) {
        self.has_this = true;
    }

    fn visit_function(&mut self, it: &Function<'a>, flags: ScopeFlags) {
        self.has_closure = true;
        walk::walk_function(self, it, flags);
    }

    fn visit_arrow_function_expression(&mut self, it: &ArrowFunctionExpression<'a>) {
        self.has_closure = true;
        walk::walk_arrow_function_expression(self, it);
    }

    fn visit_assignment_expression(&mut self, it: &AssignmentExpression<'a>) {
        self.has_assignment = true;
        walk::walk_assignment_expression(self, it);
    }

    fn visit_update_expression(&mut self, it: &UpdateExpression<'a>) {
        self.has_assignment = true;
        walk::walk_update_expression(self, it);
    }

    fn visit_yield_expression(&mut self, it: &YieldExpression<'a>) {
        self.has_suspend = true;
        walk::walk_yield_expression(self, it);
    }

    fn visit_await_expression(&mut self, it: &AwaitExpression<'a>) {
        self.has_suspend = true;
        walk::walk_await_expression(self, it);
    }
}

/// Copy of `body` with each parameter replaced by its argument. Missing
/// arguments read as `void 0`.
pub fn substitute<'a>(
    ast: AstBuilder<'a>,
    body: &Expression<'a>,
    params: &[String],
    args: &[&Expression<'a>],
) -> Expression<'a> {
    let replacements: FxHashMap<&str, Expression<'a>> = params
        .iter()
        .enumerate()
        .map(|(i, param)| {
            let value = args
                .get(i)
                .map_or_else(|| build::void_zero(ast), |arg| arg.clone_in(ast.allocator));
            (param.as_str(), value)
        })
        .collect();

    let mut copy = body.clone_in(ast.allocator);
    Substitute { ast, replacements }.visit_expression(&mut copy);
    copy
}

struct Substitute<'p, 'a> {
    ast: AstBuilder<'a>,
    replacements: FxHashMap<&'p str, Expression<'a>>,
}

impl<'a> VisitMut<'a> for Substitute<'_, 'a> {
    fn visit_expression(&mut self, expr: &mut Expression<'a>) {
        if let Expression::Identifier(ident) = expr
            && let Some(value) = self.replacements.get(ident.name.as_str())
        {
            *expr = value.clone_in(self.ast.allocator);
            return;
        }
        walk_mut::walk_expression(self, expr);
    }

    fn visit_object_property(&mut self, prop: &mut ObjectProperty<'a>) {
        prop.shorthand = false;
        walk_mut::walk_object_property(self, prop);
    }
}

/// What moving a call argument into a function body can change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgumentKind {
    /// Same value wherever it is read: literals, `this`, bindings nothing
    /// writes after their declaration.
    Stable,
    /// A read of a binding that something may write. Harmless to repeat, but
    /// a call in the body may change what it reads.
    Volatile,
    /// May run code.
    Impure,
}

pub fn classify_argument(expr: &Expression<'_>, scope: &ScopeModel) -> ArgumentKind {
    match expr.without_parentheses() {
        Expression::StringLiteral(_)
        | Expression::NumericLiteral(_)
        | Expression::BooleanLiteral(_)
        | Expression::NullLiteral(_)
        | Expression::ThisExpression(_) => ArgumentKind::Stable,
        _ if evaluate_pure(expr).is_some() => ArgumentKind::Stable,
        Expression::Identifier(ident) => match scope.binding_at(ident.span) {
            Some(binding) if binding.violation_count() == 0 => ArgumentKind::Stable,
            _ => ArgumentKind::Volatile,
        },
        _ => ArgumentKind::Impure,
    }
}

/// Whether substituting arguments of the given kinds into `body` keeps what
/// the call observed. Arguments are evaluated left to right before the body
/// runs, so after substitution:
///
/// * an impure argument must be read exactly once, on every path;
/// * no call in the body may run before the last read of a non-stable
///   argument;
/// * when either of two non-stable arguments is impure, the earlier one
///   must be read completely before the later one is first read;
/// * impure arguments beyond the parameter list would be dropped.
pub fn arguments_preserve_order(params: &[String], body: &Expression<'_>, kinds: &[ArgumentKind]) -> bool {
    if kinds.iter().all(|kind| *kind == ArgumentKind::Stable) {
        return true;
    }
    if kinds.iter().skip(params.len()).any(|kind| *kind == ArgumentKind::Impure) {
        return false;
    }

    let mut order = EvaluationOrder {
        params,
        events: Vec::new(),
        conditional: 0,
    };
    order.visit_expression(body);
    let events = order.events;
    let first_effect = events.iter().position(|event| *event == Event::Effect);
    let reads_of = |param: usize| -> Vec<(usize, bool)> {
        events
            .iter()
            .enumerate()
            .filter_map(|(at, event)| match event {
                Event::Read { param: p, conditional } if *p == param => Some((at, *conditional)),
                _ => None,
            })
            .collect()
    };

    let count = kinds.len().min(params.len());
    let reads: Vec<Vec<(usize, bool)>> = (0..count).map(reads_of).collect();
    for (i, kind) in kinds.iter().take(count).enumerate() {
        match kind {
            ArgumentKind::Stable => continue,
            ArgumentKind::Impure if !matches!(reads[i].as_slice(), [(_, false)]) => return false,
            _ => {}
        }
        if let (Some(effect), Some((last, _))) = (first_effect, reads[i].last())
            && effect < *last
        {
            return false;
        }
        for j in 0..i {
            let sensitive = kinds[j] != ArgumentKind::Stable
                && (kinds[i] == ArgumentKind::Impure || kinds[j] == ArgumentKind::Impure);
            if sensitive
                && let (Some((last, _)), Some((first, _))) = (reads[j].last(), reads[i].first())
                && last > first
            {
                return false;
            }
        }
    }
    true
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Event {
    Read { param: usize, conditional: bool },
    /// A call, `new` or tagged template finished evaluating.
    Effect,
}

/// Parameter reads and calls of an expression, in evaluation order.
struct EvaluationOrder<'p> {
    params: &'p [String],
    events: Vec<Event>,
    conditional: usize,
}

impl EvaluationOrder<'_> {
    fn branch(&mut self, visit: impl FnOnce(&mut Self)) {
        self.conditional += 1;
        visit(self);
        self.conditional -= 1;
    }
}

impl<'a> Visit<'a> for EvaluationOrder<'_> {
    fn visit_identifier_reference(&mut self, it: &IdentifierReference<'a>) {
        if let Some(param) = self.params.iter().position(|name| name == it.name.as_str()) {
            self.events.push(Event::Read {
                param,
                conditional: self.conditional > 0,
            });
        }
    }

    fn visit_call_expression(&mut self, it: &CallExpression<'a>) {
        walk::walk_call_expression(self, it);
        self.events.push(Event::Effect);
    }

    fn visit_new_expression(&mut self, it: &NewExpression<'a>) {
        walk::walk_new_expression(self, it);
        self.events.push(Event::Effect);
    }

    fn visit_tagged_template_expression(&mut self, it: &TaggedTemplateExpression<'a>) {
        walk::walk_tagged_template_expression(self, it);
        self.events.push(Event::Effect);
    }

    fn visit_conditional_expression(&mut self, it: &ConditionalExpression<'a>) {
        self.visit_expression(&it.test);
        self.branch(|order| {
            order.visit_expression(&it.consequent);
            order.visit_expression(&it.alternate);
        });
    }

    fn visit_logical_expression(&mut self, it: &LogicalExpression<'a>) {
        self.visit_expression(&it.left);
        self.branch(|order| order.visit_expression(&it.right));
    }

    fn visit_chain_expression(&mut self, it: &ChainExpression<'a>) {
        self.branch(|order| walk::walk_chain_expression(order, it));
    }

    fn visit_function(&mut self, it: &Function<'a>, flags: ScopeFlags) {
        self.branch(|order| walk::walk_function(order, it, flags));
    }

    fn visit_arrow_function_expression(&mut self, it: &ArrowFunctionExpression<'a>) {
        self.branch(|order| walk::walk_arrow_function_expression(order, it));
    }
}

/// Removes whole statements and single declarators by span.
#[derive(Debug, Default)]
pub struct Prune {
    targets: FxHashSet<NodeKey>,
    pub removed: usize,
}

impl Prune {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks a statement or declarator. Synthesized spans are ignored.
    pub fn mark(&mut self, span: Span) {
        let key = NodeKey::of(span);
        if !key.is_synthetic() {
            self.targets.insert(key);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }
}

impl<'a> Visitor<'a> for Prune {
    fn enter_statement(&mut self, stmt: &mut Statement<'a>, ctx: &mut TraverseCtx<'_, 'a>) -> HookResult {
        if self.targets.contains(&NodeKey::of(stmt.span())) {
            self.removed += 1;
            return Ok(Action::Remove);
        }

        if let Statement::VariableDeclaration(decl) = stmt {
            let before = decl.declarations.len();
            decl.declarations
                .retain(|declarator| !self.targets.contains(&NodeKey::of(declarator.span)));
            let dropped = before - decl.declarations.len();
            if dropped > 0 {
                self.removed += dropped;
                if decl.declarations.is_empty() {
                    return Ok(Action::Remove);
                }
                ctx.mark_changed();
            }
        }
        Ok(Action::Continue)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use oxc_allocator::Allocator;
    use oxc_parser::Parser;
    use oxc_span::SourceType;

    fn first_expression<'a>(allocator: &'a Allocator, code: &'a str) -> Expression<'a> {
        let program = Parser::new(allocator, code, SourceType::mjs()).parse().program;
        match program.body.into_iter().next() {
            Some(Statement::ExpressionStatement(stmt)) => stmt.unbox().expression,
            _ => panic!("expected an expression statement"),
        }
    }

    #[test]
    fn test_identifier_names() {
        assert!(is_identifier_name("$foo_1"));
        assert!(is_identifier_name("default"));
        assert!(!is_identifier_name("foo-bar"));
        assert!(!is_identifier_name("1abc"));
    }

    #[test]
    fn test_constant_index() {
        let allocator = Allocator::default();
        assert_eq!(constant_index(&first_expression(&allocator, "0x1 + 2")), Some(3));
        assert_eq!(constant_index(&first_expression(&allocator, "'0x2'")), Some(2));
        assert_eq!(constant_index(&first_expression(&allocator, "-1")), None);
        assert_eq!(constant_index(&first_expression(&allocator, "i")), None);
    }

    #[test]
    fn test_substitute_parameters() {
        let allocator = Allocator::default();
        let ast = AstBuilder::new(&allocator);
        let body = first_expression(&allocator, "b(a, { a })");
        let x = first_expression(&allocator, "x");
        let f = first_expression(&allocator, "f");
        let params = vec!["a".to_string(), "b".to_string()];

        let result = substitute(ast, &body, &params, &[&x, &f]);
        let mut program = Parser::new(&allocator, "", SourceType::mjs()).parse().program;
        program.body.push(build::expression_statement(ast, result));
        let output = oxc_codegen::Codegen::new().build(&program).code;

        assert!(output.contains("f(x, { a: x })"), "got: {}", output);
    }

    fn kinds(list: &str) -> Vec<ArgumentKind> {
        list.chars()
            .map(|c| match c {
                's' => ArgumentKind::Stable,
                'v' => ArgumentKind::Volatile,
                _ => ArgumentKind::Impure,
            })
            .collect()
    }

    #[test]
    fn test_argument_order() {
        let allocator = Allocator::default();
        let params = vec!["a".to_string(), "b".to_string()];
        let call = first_expression(&allocator, "b(a)");
        let swapped = first_expression(&allocator, "b + a");
        let twice = first_expression(&allocator, "a + a");
        let guarded = first_expression(&allocator, "a && b");
        let late_read = first_expression(&allocator, "g() + a");

        assert!(arguments_preserve_order(&params, &call, &kinds("si")));
        assert!(arguments_preserve_order(&params, &call, &kinds("vv")));
        assert!(!arguments_preserve_order(&params, &call, &kinds("ii")));
        assert!(!arguments_preserve_order(&params, &swapped, &kinds("vi")));
        assert!(arguments_preserve_order(&params, &swapped, &kinds("si")));
        assert!(arguments_preserve_order(&params, &swapped, &kinds("vv")));
        assert!(!arguments_preserve_order(&params, &twice, &kinds("i")));
        assert!(!arguments_preserve_order(&params, &guarded, &kinds("si")));
        assert!(arguments_preserve_order(&params, &guarded, &kinds("is")));
        assert!(!arguments_preserve_order(&params, &late_read, &kinds("v")));
        assert!(!arguments_preserve_order(&params, &call, &kinds("ssi")));
    }

    #[test]
    fn test_classify_argument() {
        let allocator = Allocator::default();
        let code = "const k = 1; let x = 1; x = 2; f(k, x, g(), 'lit', y);";
        let program = Parser::new(&allocator, code, SourceType::mjs()).parse().program;
        let scope = ScopeModel::crawl(&program);
        let Some(Statement::ExpressionStatement(stmt)) = program.body.last() else {
            panic!("expected an expression statement");
        };
        let Expression::CallExpression(call) = &stmt.expression else {
            panic!("expected a call");
        };
        let found: Vec<ArgumentKind> = call
            .arguments
            .iter()
            .filter_map(Argument::as_expression)
            .map(|arg| classify_argument(arg, &scope))
            .collect();
        assert_eq!(found, kinds("svisv"));
    }
}
