//! Node identity and construction helpers over the oxc AST.
//!
//! The oxc arena AST is the node model: every kind is an enum variant and
//! every node carries a [`Span`]. Passes clone and rebuild subtrees freely,
//! so nodes are identified by span rather than by address. Nodes built here
//! carry [`SPAN`] (0, 0) and never act as identity keys.

pub mod build;
pub mod view;

use oxc_ast::ast::{BindingPattern, Expression, Statement};
use oxc_span::{GetSpan, SPAN, Span};

pub use view::{Field, NodeRef, Value};

/// Span-derived identity for a node of the original source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeKey {
    pub start: u32,
    pub end: u32,
}

impl NodeKey {
    pub const fn of(span: Span) -> Self {
        Self {
            start: span.start,
            end: span.end,
        }
    }

    pub fn of_node(node: &impl GetSpan) -> Self {
        Self::of(node.span())
    }

    /// Synthesized nodes share the empty span, so they cannot be told apart.
    pub const fn is_synthetic(self) -> bool {
        self.start == SPAN.start && self.end == SPAN.end
    }

    pub const fn contains(self, other: Self) -> bool {
        !self.is_synthetic() && self.start <= other.start && other.end <= self.end
    }

    pub const fn span(self) -> Span {
        Span::new(self.start, self.end)
    }
}

impl From<Span> for NodeKey {
    fn from(span: Span) -> Self {
        Self::of(span)
    }
}

/// Name of a plain `x` binding, `None` for destructuring patterns.
pub fn binding_name<'b>(pattern: &'b BindingPattern<'_>) -> Option<&'b str> {
    match pattern {
        BindingPattern::BindingIdentifier(ident) => Some(ident.name.as_str()),
        _ => None,
    }
}

pub fn identifier_name<'b>(expr: &'b Expression<'_>) -> Option<&'b str> {
    match expr.without_parentheses() {
        Expression::Identifier(ident) => Some(ident.name.as_str()),
        _ => None,
    }
}

/// Static property name of `obj.name` or `obj["name"]`.
pub fn member_property<'b>(expr: &'b Expression<'_>) -> Option<&'b str> {
    match expr.without_parentheses() {
        Expression::StaticMemberExpression(member) => Some(member.property.name.as_str()),
        Expression::ComputedMemberExpression(member) => match &member.expression {
            Expression::StringLiteral(lit) => Some(lit.value.as_str()),
            _ => None,
        },
        _ => None,
    }
}

/// Object of a member expression, whether static or computed.
pub fn member_object<'b, 'a>(expr: &'b Expression<'a>) -> Option<&'b Expression<'a>> {
    match expr.without_parentheses() {
        Expression::StaticMemberExpression(member) => Some(&member.object),
        Expression::ComputedMemberExpression(member) => Some(&member.object),
        _ => None,
    }
}

pub fn is_empty_statement(stmt: &Statement<'_>) -> bool {
    matches!(stmt, Statement::EmptyStatement(_))
}

/// Statements that end control flow in their list.
pub fn is_terminator(stmt: &Statement<'_>) -> bool {
    matches!(
        stmt,
        Statement::ReturnStatement(_)
            | Statement::ThrowStatement(_)
            | Statement::BreakStatement(_)
            | Statement::ContinueStatement(_)
    )
}
