//! Structural ("deep equality") matching of AST nodes against partial shapes.
//!
//! A [`Pattern`] mirrors a node kind and names only the fields it cares
//! about; a field left out is a wildcard. `Extract` markers capture the
//! subtree found at their position. Captures under the same name accumulate
//! in encounter order, so a pattern can name one slot several times and then
//! check that every occurrence is the same expression.
//!
//! ```text
//! Pattern::node("CallExpression")
//!     .with("callee", Pattern::extract("decoder"))
//!     .with("arguments", Pattern::exact([Pattern::extract("index")]))
//! ```

use rustc_hash::FxHashMap;

use oxc_ast::ast::{Expression, Function, Statement};
use oxc_span::Span;

use crate::node::{Field, NodeRef, Value};

/// How an array pattern lines up with a node list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArrayMode {
    /// Same length, every element matches positionally.
    Exact,
    /// The pattern matches a prefix; trailing node elements are ignored.
    StartsWith,
}

/// Owned scalar used inside patterns.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Str(String),
    Num(f64),
    Bool(bool),
    Null,
}

impl Literal {
    fn equals(&self, value: &Value<'_>) -> bool {
        match (self, value) {
            (Self::Str(a), Value::Str(b)) => a == b,
            (Self::Num(a), Value::Num(b)) => a == b,
            (Self::Bool(a), Value::Bool(b)) => a == b,
            (Self::Null, Value::Null) => true,
            _ => false,
        }
    }

    fn from_value(value: &Value<'_>) -> Self {
        match value {
            Value::Str(s) => Self::Str((*s).to_string()),
            Value::Num(n) => Self::Num(*n),
            Value::Bool(b) => Self::Bool(*b),
            Value::Null => Self::Null,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NodePattern {
    /// Kind name as reported by [`NodeRef::kind`], or `"*"` for any kind.
    pub kind: &'static str,
    pub fields: Vec<(&'static str, Pattern)>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Pattern {
    Any,
    Literal(Literal),
    Node(NodePattern),
    Extract(String),
    /// Captures like `Extract`, but only if the inner pattern matches.
    ExtractAs(String, Box<Pattern>),
    Array(ArrayMode, Vec<Pattern>),
    Either(Vec<Pattern>),
}

impl Pattern {
    pub const fn node(kind: &'static str) -> Self {
        Self::Node(NodePattern {
            kind,
            fields: Vec::new(),
        })
    }

    /// Adds a field constraint. Only meaningful on `Node` patterns.
    #[must_use]
    pub fn with(mut self, field: &'static str, pattern: Self) -> Self {
        if let Self::Node(node) = &mut self {
            node.fields.push((field, pattern));
        } else {
            debug_assert!(false, "field `{field}` added to a non-node pattern");
        }
        self
    }

    pub fn extract(name: impl Into<String>) -> Self {
        Self::Extract(name.into())
    }

    pub fn extract_as(name: impl Into<String>, pattern: Self) -> Self {
        Self::ExtractAs(name.into(), Box::new(pattern))
    }

    pub fn exact(items: impl IntoIterator<Item = Self>) -> Self {
        Self::Array(ArrayMode::Exact, items.into_iter().collect())
    }

    pub fn starts_with(items: impl IntoIterator<Item = Self>) -> Self {
        Self::Array(ArrayMode::StartsWith, items.into_iter().collect())
    }

    pub fn either(alternatives: impl IntoIterator<Item = Self>) -> Self {
        Self::Either(alternatives.into_iter().collect())
    }

    pub fn str(value: impl Into<String>) -> Self {
        Self::Literal(Literal::Str(value.into()))
    }

    pub const fn num(value: f64) -> Self {
        Self::Literal(Literal::Num(value))
    }

    pub const fn bool(value: bool) -> Self {
        Self::Literal(Literal::Bool(value))
    }

    pub fn ident(name: impl Into<String>) -> Self {
        Self::node("Identifier").with("name", Self::str(name))
    }

    pub fn string(value: impl Into<String>) -> Self {
        Self::node("StringLiteral").with("value", Self::str(value))
    }

    pub fn number(value: f64) -> Self {
        Self::node("NumericLiteral").with("value", Self::num(value))
    }

    /// `object.name` or `object["name"]`.
    pub fn member(object: Self, name: &str) -> Self {
        Self::node("MemberExpression").with("object", object).with(
            "property",
            Self::either([
                Self::node("Identifier").with("name", Self::str(name)),
                Self::node("StringLiteral").with("value", Self::str(name)),
            ]),
        )
    }

    pub fn call(callee: Self, arguments: Self) -> Self {
        Self::node("CallExpression")
            .with("callee", callee)
            .with("arguments", arguments)
    }

    /// The literal sub-copy of `node`: every exposed field, recursively.
    pub fn from_node(node: NodeRef<'_, '_>) -> Self {
        let mut pattern = NodePattern {
            kind: node.kind(),
            fields: Vec::new(),
        };
        for name in node.field_names() {
            let field = node.field(name);
            if let Some(sub) = Self::from_field(&field) {
                pattern.fields.push((name, sub));
            }
        }
        Self::Node(pattern)
    }

    fn from_field(field: &Field<'_, '_>) -> Option<Self> {
        match field {
            Field::Node(node) => Some(Self::from_node(*node)),
            Field::List(items) => Some(Self::exact(items.iter().map(|item| Self::from_node(*item)))),
            Field::Value(value) => Some(Self::Literal(Literal::from_value(value))),
            Field::Absent => None,
        }
    }
}

/// Named subtrees captured by a successful match.
#[derive(Debug, Clone, Default)]
pub struct Captures<'b, 'a> {
    slots: FxHashMap<String, Vec<Field<'b, 'a>>>,
}

impl<'b, 'a> Captures<'b, 'a> {
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    fn push(&mut self, name: &str, field: Field<'b, 'a>) {
        self.slots.entry(name.to_string()).or_default().push(field);
    }

    /// Scalar view: the most recent capture for `name`.
    pub fn get(&self, name: &str) -> Option<&Field<'b, 'a>> {
        self.slots.get(name).and_then(|all| all.last())
    }

    /// Aggregated view: every capture for `name`, in encounter order.
    pub fn all(&self, name: &str) -> &[Field<'b, 'a>] {
        self.slots.get(name).map_or(&[], Vec::as_slice)
    }

    pub fn node(&self, name: &str) -> Option<NodeRef<'b, 'a>> {
        match self.get(name)? {
            Field::Node(node) => Some(*node),
            _ => None,
        }
    }

    pub fn list(&self, name: &str) -> Option<&[NodeRef<'b, 'a>]> {
        match self.get(name)? {
            Field::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn expression(&self, name: &str) -> Option<&'b Expression<'a>> {
        self.node(name)?.as_expression()
    }

    pub fn statement(&self, name: &str) -> Option<&'b Statement<'a>> {
        self.node(name)?.as_statement()
    }

    pub fn function(&self, name: &str) -> Option<&'b Function<'a>> {
        self.node(name)?.as_function()
    }

    pub fn span(&self, name: &str) -> Option<Span> {
        self.node(name).map(NodeRef::span)
    }

    /// True when `name` captured a field the node leaves out, such as the
    /// `init` of `for (;;)`.
    pub fn is_absent(&self, name: &str) -> bool {
        matches!(self.get(name), Some(Field::Absent))
    }

    /// String behind a captured scalar, identifier or string literal.
    pub fn str(&self, name: &str) -> Option<&'b str> {
        let value = match self.get(name)? {
            Field::Value(value) => value.clone(),
            Field::Node(node) => node.literal_value()?,
            _ => return None,
        };
        match value {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn number(&self, name: &str) -> Option<f64> {
        let value = match self.get(name)? {
            Field::Value(value) => value.clone(),
            Field::Node(node) => node.literal_value()?,
            _ => return None,
        };
        match value {
            Value::Num(n) => Some(n),
            _ => None,
        }
    }

    /// True when every capture under `name` is structurally identical.
    pub fn all_equal(&self, name: &str) -> bool {
        let all = self.all(name);
        all.windows(2).all(|pair| structurally_equal(&pair[0], &pair[1]))
    }
}

/// Matches `node` against `pattern`. A miss is `None`, never an error.
pub fn matches<'b, 'a>(node: NodeRef<'b, 'a>, pattern: &Pattern) -> Option<Captures<'b, 'a>> {
    let mut captures = Captures::default();
    match_field(&Field::Node(node), pattern, &mut captures).then_some(captures)
}

pub fn matches_expression<'b, 'a>(expr: &'b Expression<'a>, pattern: &Pattern) -> Option<Captures<'b, 'a>> {
    matches(NodeRef::Expression(expr), pattern)
}

pub fn matches_statement<'b, 'a>(stmt: &'b Statement<'a>, pattern: &Pattern) -> Option<Captures<'b, 'a>> {
    matches(NodeRef::Statement(stmt), pattern)
}

fn match_field<'b, 'a>(field: &Field<'b, 'a>, pattern: &Pattern, captures: &mut Captures<'b, 'a>) -> bool {
    match pattern {
        Pattern::Any => true,
        Pattern::Extract(name) => {
            captures.push(name, field.clone());
            true
        }
        Pattern::ExtractAs(name, inner) => {
            if match_field(field, inner, captures) {
                captures.push(name, field.clone());
                true
            } else {
                false
            }
        }
        Pattern::Literal(literal) => match field {
            Field::Value(value) => literal.equals(value),
            _ => false,
        },
        Pattern::Node(node_pattern) => match field {
            Field::Node(node) => match_node(*node, node_pattern, captures),
            _ => false,
        },
        Pattern::Array(mode, items) => match field {
            Field::List(nodes) => match_list(nodes, *mode, items, captures),
            _ => false,
        },
        Pattern::Either(alternatives) => {
            for alternative in alternatives {
                let checkpoint = captures.clone();
                if match_field(field, alternative, captures) {
                    return true;
                }
                *captures = checkpoint;
            }
            false
        }
    }
}

fn match_node<'b, 'a>(node: NodeRef<'b, 'a>, pattern: &NodePattern, captures: &mut Captures<'b, 'a>) -> bool {
    if pattern.kind != "*" && node.kind() != pattern.kind {
        return false;
    }

    pattern.fields.iter().all(|(name, sub)| {
        debug_assert!(
            pattern.kind == "*" || node.has_field(name),
            "pattern field `{name}` does not exist on `{}`",
            pattern.kind
        );
        match_field(&node.field(name), sub, captures)
    })
}

fn match_list<'b, 'a>(
    nodes: &[NodeRef<'b, 'a>],
    mode: ArrayMode,
    items: &[Pattern],
    captures: &mut Captures<'b, 'a>,
) -> bool {
    let length_ok = match mode {
        ArrayMode::Exact => nodes.len() == items.len(),
        ArrayMode::StartsWith => items.len() <= nodes.len(),
    };

    length_ok
        && items
            .iter()
            .zip(nodes)
            .all(|(item, node)| match_field(&Field::Node(*node), item, captures))
}

/// Compares two fields by shape and values; spans are ignored.
pub fn structurally_equal(a: &Field<'_, '_>, b: &Field<'_, '_>) -> bool {
    match (a, b) {
        (Field::Node(x), Field::Node(y)) => nodes_equal(*x, *y),
        (Field::List(xs), Field::List(ys)) => {
            xs.len() == ys.len() && xs.iter().zip(ys).all(|(x, y)| nodes_equal(*x, *y))
        }
        (Field::Value(x), Field::Value(y)) => x == y,
        (Field::Absent, Field::Absent) => true,
        _ => false,
    }
}

fn nodes_equal(a: NodeRef<'_, '_>, b: NodeRef<'_, '_>) -> bool {
    let kind = a.kind();
    if kind != b.kind() {
        return false;
    }
    // Opaque kinds only compare equal to themselves.
    if kind == "Unknown" {
        return a.span() == b.span() && !a.span().is_empty();
    }

    a.field_names()
        .iter()
        .all(|name| structurally_equal(&a.field(name), &b.field(name)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use oxc_allocator::Allocator;
    use oxc_ast::ast::Program;
    use oxc_parser::Parser;
    use oxc_span::SourceType;

    fn parse<'a>(allocator: &'a Allocator, code: &'a str) -> Program<'a> {
        Parser::new(allocator, code, SourceType::mjs()).parse().program
    }

    fn first_expression<'b, 'a>(program: &'b Program<'a>) -> &'b Expression<'a> {
        match &program.body[0] {
            Statement::ExpressionStatement(stmt) => &stmt.expression,
            other => panic!("expected expression statement, got {other:?}"),
        }
    }

    #[test]
    fn test_literal_copy_matches_without_captures() {
        let allocator = Allocator::default();
        let program = parse(&allocator, "foo.bar(1, 'two', [3, x], function (a) { return a + 1; });");
        let expr = first_expression(&program);

        let pattern = Pattern::from_node(NodeRef::Expression(expr));
        let captures = matches_expression(expr, &pattern).expect("sub-copy must match");
        assert!(captures.is_empty());
    }

    #[test]
    fn test_literal_copy_rejects_other_node() {
        let allocator = Allocator::default();
        let program = parse(&allocator, "foo(1); foo(2);");
        let Statement::ExpressionStatement(first) = &program.body[0] else { panic!() };
        let Statement::ExpressionStatement(second) = &program.body[1] else { panic!() };

        let pattern = Pattern::from_node(NodeRef::Expression(&first.expression));
        assert!(matches_expression(&second.expression, &pattern).is_none());
    }

    #[test]
    fn test_extract_captures_field() {
        let allocator = Allocator::default();
        let program = parse(&allocator, "decode(0x1f, 'key');");
        let expr = first_expression(&program);

        let pattern = Pattern::call(
            Pattern::extract("callee"),
            Pattern::exact([Pattern::extract("index"), Pattern::extract("key")]),
        );
        let captures = matches_expression(expr, &pattern).expect("should match");

        let Expression::CallExpression(call) = expr else { panic!() };
        let callee = captures.get("callee").expect("callee captured");
        assert!(structurally_equal(callee, &Field::Node(NodeRef::Expression(&call.callee))));
        assert_eq!(captures.str("callee"), Some("decode"));
        assert_eq!(captures.number("index"), Some(31.0));
        assert_eq!(captures.str("key"), Some("key"));
    }

    #[test]
    fn test_absent_field_is_wildcard() {
        let allocator = Allocator::default();
        let program = parse(&allocator, "a + b;");
        let expr = first_expression(&program);

        let pattern = Pattern::node("BinaryExpression").with("operator", Pattern::str("+"));
        assert!(matches_expression(expr, &pattern).is_some());

        let wrong = Pattern::node("BinaryExpression").with("operator", Pattern::str("-"));
        assert!(matches_expression(expr, &wrong).is_none());
    }

    #[test]
    fn test_array_modes() {
        let allocator = Allocator::default();
        let program = parse(&allocator, "[1, 2, 3];");
        let expr = first_expression(&program);

        let prefix = [Pattern::number(1.0), Pattern::number(2.0)];
        let starts = Pattern::node("ArrayExpression").with("elements", Pattern::starts_with(prefix.clone()));
        let exact = Pattern::node("ArrayExpression").with("elements", Pattern::exact(prefix));

        assert!(matches_expression(expr, &starts).is_some(), "prefix of length 2 must match");
        assert!(matches_expression(expr, &exact).is_none(), "exact length 2 must reject 3 elements");

        let full = Pattern::node("ArrayExpression").with(
            "elements",
            Pattern::exact([Pattern::number(1.0), Pattern::number(2.0), Pattern::number(3.0)]),
        );
        assert!(matches_expression(expr, &full).is_some());

        let too_long = Pattern::node("ArrayExpression").with("elements", Pattern::starts_with(vec![Pattern::Any; 4]));
        assert!(matches_expression(expr, &too_long).is_none());
    }

    #[test]
    fn test_repeated_names_aggregate() {
        let allocator = Allocator::default();
        let program = parse(&allocator, "cache[k] || cache[k] || cache[j];");
        let expr = first_expression(&program);

        let member = || {
            Pattern::node("MemberExpression")
                .with("object", Pattern::extract("cache"))
                .with("property", Pattern::extract("key"))
        };
        let pattern = Pattern::node("LogicalExpression")
            .with("left", Pattern::node("LogicalExpression").with("left", member()).with("right", member()))
            .with("right", member());

        let captures = matches_expression(expr, &pattern).expect("should match");
        assert_eq!(captures.all("cache").len(), 3);
        assert!(captures.all_equal("cache"));
        assert!(!captures.all_equal("key"), "k, k, j differ");
        assert_eq!(captures.str("key"), Some("j"), "scalar view is the last capture");
    }

    #[test]
    fn test_either_rolls_back_failed_branch() {
        let allocator = Allocator::default();
        let program = parse(&allocator, "f(1);");
        let expr = first_expression(&program);

        let pattern = Pattern::either([
            Pattern::call(Pattern::extract("callee"), Pattern::exact([Pattern::string("x")])),
            Pattern::call(Pattern::Any, Pattern::exact([Pattern::extract("arg")])),
        ]);
        let captures = matches_expression(expr, &pattern).expect("second branch matches");
        assert!(captures.get("callee").is_none(), "failed branch must not leak captures");
        assert_eq!(captures.number("arg"), Some(1.0));
    }

    #[test]
    fn test_absent_capture() {
        let allocator = Allocator::default();
        let program = parse(&allocator, "for (;;) {} for (var i = 0;;) {}");

        let pattern = Pattern::node("ForStatement").with("init", Pattern::extract("init"));
        let bare = matches_statement(&program.body[0], &pattern).expect("should match");
        assert!(bare.is_absent("init"));
        let seeded = matches_statement(&program.body[1], &pattern).expect("should match");
        assert!(!seeded.is_absent("init"));
        assert!(!seeded.is_absent("missing"), "never captured is not absent");
    }

    #[test]
    fn test_function_capture() {
        let allocator = Allocator::default();
        let program = parse(&allocator, "(function (a) { return a; })(1);");

        let pattern = Pattern::node("ExpressionStatement").with(
            "expression",
            Pattern::call(Pattern::extract_as("callee", Pattern::node("FunctionExpression")), Pattern::Any),
        );
        let captures = matches_statement(&program.body[0], &pattern).expect("should match");
        let func = captures.function("callee").expect("function captured");
        assert_eq!(func.params.items.len(), 1);
        assert!(captures.span("callee").is_some_and(|span| !span.is_empty()));
    }

    #[test]
    fn test_member_matches_static_and_computed() {
        let allocator = Allocator::default();
        let program = parse(&allocator, "arr.push; arr['push'];");

        let pattern = Pattern::member(Pattern::ident("arr"), "push");
        for stmt in &program.body {
            assert!(matches_statement(stmt, &Pattern::node("ExpressionStatement").with("expression", pattern.clone())).is_some());
        }
    }
}
