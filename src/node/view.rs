//! Reflective, read-only view over oxc nodes.
//!
//! The matcher needs to walk "the field named `callee`" without knowing the
//! concrete Rust type, so every node kind it understands is exposed through
//! [`NodeRef`] with ESTree-style kind and field names. Kinds outside this set
//! report `Unknown` and have no fields.

use oxc_ast::ast::*;
use oxc_span::{GetSpan, Span};

#[derive(Debug, Clone, PartialEq)]
pub enum Value<'b> {
    Str(&'b str),
    Num(f64),
    Bool(bool),
    Null,
}

/// One field of a node as seen by the matcher.
#[derive(Debug, Clone)]
pub enum Field<'b, 'a> {
    Node(NodeRef<'b, 'a>),
    List(Vec<NodeRef<'b, 'a>>),
    Value(Value<'b>),
    Absent,
}

#[derive(Debug, Clone, Copy)]
pub enum NodeRef<'b, 'a> {
    Program(&'b Program<'a>),
    Statement(&'b Statement<'a>),
    Expression(&'b Expression<'a>),
    Function(&'b Function<'a>),
    Arrow(&'b ArrowFunctionExpression<'a>),
    FunctionBody(&'b FunctionBody<'a>),
    Block(&'b BlockStatement<'a>),
    Declaration(&'b VariableDeclaration<'a>),
    Declarator(&'b VariableDeclarator<'a>),
    Binding(&'b BindingPattern<'a>),
    BindingIdent(&'b BindingIdentifier<'a>),
    Name(&'b IdentifierName<'a>),
    Label(&'b LabelIdentifier<'a>),
    Case(&'b SwitchCase<'a>),
    Catch(&'b CatchClause<'a>),
    Argument(&'b Argument<'a>),
    Element(&'b ArrayExpressionElement<'a>),
    Property(&'b ObjectPropertyKind<'a>),
    Key(&'b PropertyKey<'a>),
    Target(&'b AssignmentTarget<'a>),
    SimpleTarget(&'b SimpleAssignmentTarget<'a>),
    ForInit(&'b ForStatementInit<'a>),
    Spread(&'b SpreadElement<'a>),
}

impl<'b, 'a> NodeRef<'b, 'a> {
    /// Collapses wrapper enums onto the variant that carries the node's fields.
    #[must_use]
    pub fn normalize(self) -> Self {
        match self {
            Self::Expression(expr) => match expr {
                Expression::ParenthesizedExpression(paren) => Self::Expression(&paren.expression).normalize(),
                Expression::FunctionExpression(func) => Self::Function(func),
                Expression::ArrowFunctionExpression(arrow) => Self::Arrow(arrow),
                _ => self,
            },
            Self::Statement(stmt) => match stmt {
                Statement::BlockStatement(block) => Self::Block(block),
                Statement::FunctionDeclaration(func) => Self::Function(func),
                Statement::VariableDeclaration(decl) => Self::Declaration(decl),
                _ => self,
            },
            Self::Argument(arg) => match arg {
                Argument::SpreadElement(spread) => Self::Spread(spread),
                _ => arg.as_expression().map_or(self, |expr| Self::Expression(expr).normalize()),
            },
            Self::Element(element) => match element {
                ArrayExpressionElement::SpreadElement(spread) => Self::Spread(spread),
                _ => element.as_expression().map_or(self, |expr| Self::Expression(expr).normalize()),
            },
            Self::Binding(BindingPattern::BindingIdentifier(ident)) => Self::BindingIdent(ident),
            Self::Key(key) => match key {
                PropertyKey::StaticIdentifier(name) => Self::Name(name),
                _ => key.as_expression().map_or(self, |expr| Self::Expression(expr).normalize()),
            },
            Self::Target(target) => target
                .as_simple_assignment_target()
                .map_or(self, |simple| Self::SimpleTarget(simple)),
            Self::ForInit(init) => match init {
                ForStatementInit::VariableDeclaration(decl) => Self::Declaration(decl),
                _ => init.as_expression().map_or(self, |expr| Self::Expression(expr).normalize()),
            },
            _ => self,
        }
    }

    pub fn kind(self) -> &'static str {
        match self.normalize() {
            Self::Program(_) => "Program",
            Self::Expression(expr) => expression_kind(expr),
            Self::Statement(stmt) => statement_kind(stmt),
            Self::Function(func) => {
                if matches!(func.r#type, FunctionType::FunctionDeclaration) {
                    "FunctionDeclaration"
                } else {
                    "FunctionExpression"
                }
            }
            Self::Arrow(_) => "ArrowFunctionExpression",
            Self::FunctionBody(_) | Self::Block(_) => "BlockStatement",
            Self::Declaration(_) => "VariableDeclaration",
            Self::Declarator(_) => "VariableDeclarator",
            Self::Binding(pattern) => match pattern {
                BindingPattern::ObjectPattern(_) => "ObjectPattern",
                BindingPattern::ArrayPattern(_) => "ArrayPattern",
                BindingPattern::AssignmentPattern(_) => "AssignmentPattern",
                BindingPattern::BindingIdentifier(_) => "Identifier",
            },
            Self::BindingIdent(_) | Self::Name(_) | Self::Label(_) => "Identifier",
            Self::Case(_) => "SwitchCase",
            Self::Catch(_) => "CatchClause",
            Self::Property(prop) => match prop {
                ObjectPropertyKind::ObjectProperty(_) => "Property",
                ObjectPropertyKind::SpreadProperty(_) => "SpreadElement",
            },
            Self::SimpleTarget(target) => match target {
                SimpleAssignmentTarget::AssignmentTargetIdentifier(_) => "Identifier",
                SimpleAssignmentTarget::StaticMemberExpression(_)
                | SimpleAssignmentTarget::ComputedMemberExpression(_) => "MemberExpression",
                _ => "Unknown",
            },
            Self::Spread(_) => "SpreadElement",
            Self::Element(ArrayExpressionElement::Elision(_)) => "Elision",
            Self::Argument(_) | Self::Element(_) | Self::Key(_) | Self::Target(_) | Self::ForInit(_) => "Unknown",
        }
    }

    pub fn span(self) -> Span {
        match self {
            Self::Program(n) => n.span,
            Self::Statement(n) => n.span(),
            Self::Expression(n) => n.span(),
            Self::Function(n) => n.span,
            Self::Arrow(n) => n.span,
            Self::FunctionBody(n) => n.span,
            Self::Block(n) => n.span,
            Self::Declaration(n) => n.span,
            Self::Declarator(n) => n.span,
            Self::Binding(n) => n.span(),
            Self::BindingIdent(n) => n.span,
            Self::Name(n) => n.span,
            Self::Label(n) => n.span,
            Self::Case(n) => n.span,
            Self::Catch(n) => n.span,
            Self::Argument(n) => n.span(),
            Self::Element(n) => n.span(),
            Self::Property(n) => n.span(),
            Self::Key(n) => n.span(),
            Self::Target(n) => n.span(),
            Self::SimpleTarget(n) => n.span(),
            Self::ForInit(n) => n.span(),
            Self::Spread(n) => n.span,
        }
    }

    /// Field names this kind exposes, in source order.
    pub fn field_names(self) -> &'static [&'static str] {
        match self.kind() {
            "Program" | "BlockStatement" => &["body"],
            "Identifier" => &["name"],
            "StringLiteral" | "NumericLiteral" | "BooleanLiteral" => &["value"],
            "CallExpression" | "NewExpression" => &["callee", "arguments", "optional"],
            "MemberExpression" => &["object", "property", "computed", "optional"],
            "BinaryExpression" | "LogicalExpression" | "AssignmentExpression" => &["operator", "left", "right"],
            "UnaryExpression" => &["operator", "argument"],
            "UpdateExpression" => &["operator", "prefix", "argument"],
            "SequenceExpression" => &["expressions"],
            "ConditionalExpression" | "IfStatement" => &["test", "consequent", "alternate"],
            "ArrayExpression" => &["elements"],
            "ObjectExpression" => &["properties"],
            "Property" => &["key", "value", "kind", "computed", "shorthand", "method"],
            "FunctionDeclaration" | "FunctionExpression" => &["id", "params", "body", "async", "generator"],
            "ArrowFunctionExpression" => &["params", "body", "async", "expression"],
            "VariableDeclaration" => &["kind", "declarations"],
            "VariableDeclarator" => &["id", "init"],
            "ExpressionStatement" => &["expression"],
            "ReturnStatement" | "ThrowStatement" | "SpreadElement" => &["argument"],
            "WhileStatement" => &["test", "body"],
            "DoWhileStatement" => &["body", "test"],
            "ForStatement" => &["init", "test", "update", "body"],
            "SwitchStatement" => &["discriminant", "cases"],
            "SwitchCase" => &["test", "consequent"],
            "BreakStatement" | "ContinueStatement" => &["label"],
            "TryStatement" => &["block", "handler", "finalizer"],
            "CatchClause" => &["param", "body"],
            _ => &[],
        }
    }

    pub fn has_field(self, name: &str) -> bool {
        self.field_names().contains(&name)
    }

    /// Reads one field. Fields the kind does not expose read as `Absent`.
    pub fn field(self, name: &str) -> Field<'b, 'a> {
        match self.normalize() {
            Self::Program(program) => match name {
                "body" => list(program.body.iter().map(NodeRef::Statement)),
                _ => Field::Absent,
            },
            Self::Expression(expr) => expression_field(expr, name),
            Self::Statement(stmt) => statement_field(stmt, name),
            Self::Function(func) => match name {
                "id" => func.id.as_ref().map_or(Field::Absent, |id| Field::Node(NodeRef::BindingIdent(id))),
                "params" => params_field(&func.params),
                "body" => func
                    .body
                    .as_ref()
                    .map_or(Field::Absent, |body| Field::Node(NodeRef::FunctionBody(body))),
                "async" => Field::Value(Value::Bool(func.r#async)),
                "generator" => Field::Value(Value::Bool(func.generator)),
                _ => Field::Absent,
            },
            Self::Arrow(arrow) => match name {
                "params" => params_field(&arrow.params),
                "body" => Field::Node(NodeRef::FunctionBody(&arrow.body)),
                "async" => Field::Value(Value::Bool(arrow.r#async)),
                "expression" => Field::Value(Value::Bool(arrow.expression)),
                _ => Field::Absent,
            },
            Self::FunctionBody(body) => match name {
                "body" => list(body.statements.iter().map(NodeRef::Statement)),
                _ => Field::Absent,
            },
            Self::Block(block) => match name {
                "body" => list(block.body.iter().map(NodeRef::Statement)),
                _ => Field::Absent,
            },
            Self::Declaration(decl) => match name {
                "kind" => Field::Value(Value::Str(decl.kind.as_str())),
                "declarations" => list(decl.declarations.iter().map(NodeRef::Declarator)),
                _ => Field::Absent,
            },
            Self::Declarator(decl) => match name {
                "id" => Field::Node(NodeRef::Binding(&decl.id)),
                "init" => optional_expression(decl.init.as_ref()),
                _ => Field::Absent,
            },
            Self::BindingIdent(ident) => name_field(name, ident.name.as_str()),
            Self::Name(ident) => name_field(name, ident.name.as_str()),
            Self::Label(ident) => name_field(name, ident.name.as_str()),
            Self::Case(case) => match name {
                "test" => optional_expression(case.test.as_ref()),
                "consequent" => list(case.consequent.iter().map(NodeRef::Statement)),
                _ => Field::Absent,
            },
            Self::Catch(clause) => match name {
                "param" => clause
                    .param
                    .as_ref()
                    .map_or(Field::Absent, |param| Field::Node(NodeRef::Binding(&param.pattern))),
                "body" => Field::Node(NodeRef::Block(&clause.body)),
                _ => Field::Absent,
            },
            Self::Property(ObjectPropertyKind::ObjectProperty(prop)) => match name {
                "key" => Field::Node(NodeRef::Key(&prop.key)),
                "value" => Field::Node(NodeRef::Expression(&prop.value)),
                "kind" => Field::Value(Value::Str(match prop.kind {
                    PropertyKind::Init => "init",
                    PropertyKind::Get => "get",
                    PropertyKind::Set => "set",
                })),
                "computed" => Field::Value(Value::Bool(prop.computed)),
                "shorthand" => Field::Value(Value::Bool(prop.shorthand)),
                "method" => Field::Value(Value::Bool(prop.method)),
                _ => Field::Absent,
            },
            Self::Property(ObjectPropertyKind::SpreadProperty(spread)) => match name {
                "argument" => Field::Node(NodeRef::Expression(&spread.argument)),
                _ => Field::Absent,
            },
            Self::Spread(spread) => match name {
                "argument" => Field::Node(NodeRef::Expression(&spread.argument)),
                _ => Field::Absent,
            },
            Self::SimpleTarget(target) => match target {
                SimpleAssignmentTarget::AssignmentTargetIdentifier(ident) => name_field(name, ident.name.as_str()),
                SimpleAssignmentTarget::StaticMemberExpression(member) => static_member_field(member, name),
                SimpleAssignmentTarget::ComputedMemberExpression(member) => computed_member_field(member, name),
                _ => Field::Absent,
            },
            _ => Field::Absent,
        }
    }

    /// The expression behind an expression, argument, element or key slot.
    /// Function and arrow expressions come back as expressions too.
    pub fn as_expression(self) -> Option<&'b Expression<'a>> {
        match self {
            Self::Expression(expr) => Some(expr),
            Self::Argument(arg) => arg.as_expression(),
            Self::Element(element) => element.as_expression(),
            Self::Key(key) => key.as_expression(),
            Self::ForInit(init) => init.as_expression(),
            _ => None,
        }
    }

    pub fn as_function(self) -> Option<&'b Function<'a>> {
        match self.normalize() {
            Self::Function(func) => Some(func),
            _ => None,
        }
    }

    pub fn as_statement(self) -> Option<&'b Statement<'a>> {
        match self {
            Self::Statement(stmt) => Some(stmt),
            _ => None,
        }
    }

    /// Scalar value of literal and identifier nodes: the string for
    /// `StringLiteral`, the name for `Identifier`, and so on.
    pub fn literal_value(self) -> Option<Value<'b>> {
        let field = match self.kind() {
            "Identifier" => self.field("name"),
            "StringLiteral" | "NumericLiteral" | "BooleanLiteral" => self.field("value"),
            "NullLiteral" => return Some(Value::Null),
            _ => return None,
        };
        match field {
            Field::Value(value) => Some(value),
            _ => None,
        }
    }
}

fn list<'b, 'a>(iter: impl Iterator<Item = NodeRef<'b, 'a>>) -> Field<'b, 'a> {
    Field::List(iter.collect())
}

fn name_field<'b, 'a>(field: &str, value: &'b str) -> Field<'b, 'a> {
    if field == "name" { Field::Value(Value::Str(value)) } else { Field::Absent }
}

fn optional_expression<'b, 'a>(expr: Option<&'b Expression<'a>>) -> Field<'b, 'a> {
    expr.map_or(Field::Absent, |expr| Field::Node(NodeRef::Expression(expr)))
}

fn params_field<'b, 'a>(params: &'b FormalParameters<'a>) -> Field<'b, 'a> {
    list(params.items.iter().map(|param| NodeRef::Binding(&param.pattern)))
}

fn static_member_field<'b, 'a>(member: &'b StaticMemberExpression<'a>, name: &str) -> Field<'b, 'a> {
    match name {
        "object" => Field::Node(NodeRef::Expression(&member.object)),
        "property" => Field::Node(NodeRef::Name(&member.property)),
        "computed" => Field::Value(Value::Bool(false)),
        "optional" => Field::Value(Value::Bool(member.optional)),
        _ => Field::Absent,
    }
}

fn computed_member_field<'b, 'a>(member: &'b ComputedMemberExpression<'a>, name: &str) -> Field<'b, 'a> {
    match name {
        "object" => Field::Node(NodeRef::Expression(&member.object)),
        "property" => Field::Node(NodeRef::Expression(&member.expression)),
        "computed" => Field::Value(Value::Bool(true)),
        "optional" => Field::Value(Value::Bool(member.optional)),
        _ => Field::Absent,
    }
}

fn expression_kind(expr: &Expression<'_>) -> &'static str {
    match expr {
        Expression::Identifier(_) => "Identifier",
        Expression::StringLiteral(_) => "StringLiteral",
        Expression::NumericLiteral(_) => "NumericLiteral",
        Expression::BooleanLiteral(_) => "BooleanLiteral",
        Expression::NullLiteral(_) => "NullLiteral",
        Expression::CallExpression(_) => "CallExpression",
        Expression::NewExpression(_) => "NewExpression",
        Expression::StaticMemberExpression(_) | Expression::ComputedMemberExpression(_) => "MemberExpression",
        Expression::BinaryExpression(_) => "BinaryExpression",
        Expression::LogicalExpression(_) => "LogicalExpression",
        Expression::UnaryExpression(_) => "UnaryExpression",
        Expression::UpdateExpression(_) => "UpdateExpression",
        Expression::AssignmentExpression(_) => "AssignmentExpression",
        Expression::SequenceExpression(_) => "SequenceExpression",
        Expression::ConditionalExpression(_) => "ConditionalExpression",
        Expression::ArrayExpression(_) => "ArrayExpression",
        Expression::ObjectExpression(_) => "ObjectExpression",
        Expression::ThisExpression(_) => "ThisExpression",
        Expression::FunctionExpression(_) => "FunctionExpression",
        Expression::ArrowFunctionExpression(_) => "ArrowFunctionExpression",
        _ => "Unknown",
    }
}

fn statement_kind(stmt: &Statement<'_>) -> &'static str {
    match stmt {
        Statement::ExpressionStatement(_) => "ExpressionStatement",
        Statement::ReturnStatement(_) => "ReturnStatement",
        Statement::IfStatement(_) => "IfStatement",
        Statement::WhileStatement(_) => "WhileStatement",
        Statement::DoWhileStatement(_) => "DoWhileStatement",
        Statement::ForStatement(_) => "ForStatement",
        Statement::SwitchStatement(_) => "SwitchStatement",
        Statement::BlockStatement(_) => "BlockStatement",
        Statement::BreakStatement(_) => "BreakStatement",
        Statement::ContinueStatement(_) => "ContinueStatement",
        Statement::VariableDeclaration(_) => "VariableDeclaration",
        Statement::FunctionDeclaration(_) => "FunctionDeclaration",
        Statement::TryStatement(_) => "TryStatement",
        Statement::ThrowStatement(_) => "ThrowStatement",
        Statement::EmptyStatement(_) => "EmptyStatement",
        _ => "Unknown",
    }
}

fn expression_field<'b, 'a>(expr: &'b Expression<'a>, name: &str) -> Field<'b, 'a> {
    match expr {
        Expression::Identifier(ident) => name_field(name, ident.name.as_str()),
        Expression::StringLiteral(lit) if name == "value" => Field::Value(Value::Str(lit.value.as_str())),
        Expression::NumericLiteral(lit) if name == "value" => Field::Value(Value::Num(lit.value)),
        Expression::BooleanLiteral(lit) if name == "value" => Field::Value(Value::Bool(lit.value)),
        Expression::CallExpression(call) => match name {
            "callee" => Field::Node(NodeRef::Expression(&call.callee)),
            "arguments" => list(call.arguments.iter().map(NodeRef::Argument)),
            "optional" => Field::Value(Value::Bool(call.optional)),
            _ => Field::Absent,
        },
        Expression::NewExpression(call) => match name {
            "callee" => Field::Node(NodeRef::Expression(&call.callee)),
            "arguments" => list(call.arguments.iter().map(NodeRef::Argument)),
            "optional" => Field::Value(Value::Bool(false)),
            _ => Field::Absent,
        },
        Expression::StaticMemberExpression(member) => static_member_field(member, name),
        Expression::ComputedMemberExpression(member) => computed_member_field(member, name),
        Expression::BinaryExpression(bin) => match name {
            "operator" => Field::Value(Value::Str(bin.operator.as_str())),
            "left" => Field::Node(NodeRef::Expression(&bin.left)),
            "right" => Field::Node(NodeRef::Expression(&bin.right)),
            _ => Field::Absent,
        },
        Expression::LogicalExpression(logical) => match name {
            "operator" => Field::Value(Value::Str(logical.operator.as_str())),
            "left" => Field::Node(NodeRef::Expression(&logical.left)),
            "right" => Field::Node(NodeRef::Expression(&logical.right)),
            _ => Field::Absent,
        },
        Expression::AssignmentExpression(assign) => match name {
            "operator" => Field::Value(Value::Str(assign.operator.as_str())),
            "left" => Field::Node(NodeRef::Target(&assign.left)),
            "right" => Field::Node(NodeRef::Expression(&assign.right)),
            _ => Field::Absent,
        },
        Expression::UnaryExpression(unary) => match name {
            "operator" => Field::Value(Value::Str(unary.operator.as_str())),
            "argument" => Field::Node(NodeRef::Expression(&unary.argument)),
            _ => Field::Absent,
        },
        Expression::UpdateExpression(update) => match name {
            "operator" => Field::Value(Value::Str(update.operator.as_str())),
            "prefix" => Field::Value(Value::Bool(update.prefix)),
            "argument" => Field::Node(NodeRef::SimpleTarget(&update.argument)),
            _ => Field::Absent,
        },
        Expression::SequenceExpression(seq) => match name {
            "expressions" => list(seq.expressions.iter().map(NodeRef::Expression)),
            _ => Field::Absent,
        },
        Expression::ConditionalExpression(cond) => match name {
            "test" => Field::Node(NodeRef::Expression(&cond.test)),
            "consequent" => Field::Node(NodeRef::Expression(&cond.consequent)),
            "alternate" => Field::Node(NodeRef::Expression(&cond.alternate)),
            _ => Field::Absent,
        },
        Expression::ArrayExpression(array) => match name {
            "elements" => list(array.elements.iter().map(NodeRef::Element)),
            _ => Field::Absent,
        },
        Expression::ObjectExpression(object) => match name {
            "properties" => list(object.properties.iter().map(NodeRef::Property)),
            _ => Field::Absent,
        },
        _ => Field::Absent,
    }
}

fn statement_field<'b, 'a>(stmt: &'b Statement<'a>, name: &str) -> Field<'b, 'a> {
    match stmt {
        Statement::ExpressionStatement(expr_stmt) => match name {
            "expression" => Field::Node(NodeRef::Expression(&expr_stmt.expression)),
            _ => Field::Absent,
        },
        Statement::ReturnStatement(ret) => match name {
            "argument" => optional_expression(ret.argument.as_ref()),
            _ => Field::Absent,
        },
        Statement::ThrowStatement(throw) => match name {
            "argument" => Field::Node(NodeRef::Expression(&throw.argument)),
            _ => Field::Absent,
        },
        Statement::IfStatement(if_stmt) => match name {
            "test" => Field::Node(NodeRef::Expression(&if_stmt.test)),
            "consequent" => Field::Node(NodeRef::Statement(&if_stmt.consequent)),
            "alternate" => if_stmt
                .alternate
                .as_ref()
                .map_or(Field::Absent, |alt| Field::Node(NodeRef::Statement(alt))),
            _ => Field::Absent,
        },
        Statement::WhileStatement(while_stmt) => match name {
            "test" => Field::Node(NodeRef::Expression(&while_stmt.test)),
            "body" => Field::Node(NodeRef::Statement(&while_stmt.body)),
            _ => Field::Absent,
        },
        Statement::DoWhileStatement(do_while) => match name {
            "test" => Field::Node(NodeRef::Expression(&do_while.test)),
            "body" => Field::Node(NodeRef::Statement(&do_while.body)),
            _ => Field::Absent,
        },
        Statement::ForStatement(for_stmt) => match name {
            "init" => for_stmt
                .init
                .as_ref()
                .map_or(Field::Absent, |init| Field::Node(NodeRef::ForInit(init))),
            "test" => optional_expression(for_stmt.test.as_ref()),
            "update" => optional_expression(for_stmt.update.as_ref()),
            "body" => Field::Node(NodeRef::Statement(&for_stmt.body)),
            _ => Field::Absent,
        },
        Statement::SwitchStatement(switch) => match name {
            "discriminant" => Field::Node(NodeRef::Expression(&switch.discriminant)),
            "cases" => list(switch.cases.iter().map(NodeRef::Case)),
            _ => Field::Absent,
        },
        Statement::BreakStatement(brk) => match name {
            "label" => brk.label.as_ref().map_or(Field::Absent, |l| Field::Node(NodeRef::Label(l))),
            _ => Field::Absent,
        },
        Statement::ContinueStatement(cont) => match name {
            "label" => cont.label.as_ref().map_or(Field::Absent, |l| Field::Node(NodeRef::Label(l))),
            _ => Field::Absent,
        },
        Statement::TryStatement(try_stmt) => match name {
            "block" => Field::Node(NodeRef::Block(&try_stmt.block)),
            "handler" => try_stmt
                .handler
                .as_ref()
                .map_or(Field::Absent, |handler| Field::Node(NodeRef::Catch(handler))),
            "finalizer" => try_stmt
                .finalizer
                .as_ref()
                .map_or(Field::Absent, |block| Field::Node(NodeRef::Block(block))),
            _ => Field::Absent,
        },
        _ => Field::Absent,
    }
}
