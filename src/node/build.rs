use oxc_allocator::{Box as ABox, Vec as OxcVec};
use oxc_ast::AstBuilder;
use oxc_ast::ast::*;
use oxc_ast_visit::VisitMut;
use oxc_parser::Parser;
use oxc_span::{SPAN, SourceType, Span};
use oxc_syntax::number::NumberBase;
use oxc_syntax::operator::UnaryOperator;

use crate::evaluate::{Constant, number_to_js_string};

pub fn string<'a>(ast: AstBuilder<'a>, value: &str) -> Expression<'a> {
    Expression::StringLiteral(ast.alloc(StringLiteral {
        span: SPAN,
        value: ast.atom(value).into(),
        raw: None,
        lone_surrogates: false,
    }))
}

/// Numeric literal. Negative values become `-n`, and the non-finite ones the
/// usual global names.
pub fn number<'a>(ast: AstBuilder<'a>, value: f64) -> Expression<'a> {
    if value.is_nan() {
        return identifier(ast, "NaN");
    }
    if value.is_infinite() {
        let infinity = identifier(ast, "Infinity");
        return if value > 0.0 { infinity } else { negate(ast, infinity) };
    }
    if value < 0.0 || (value == 0.0 && value.is_sign_negative()) {
        return negate(ast, number(ast, -value));
    }

    Expression::NumericLiteral(ast.alloc(NumericLiteral {
        span: SPAN,
        value,
        raw: Some(ast.atom(&number_to_js_string(value)).into()),
        base: NumberBase::Decimal,
    }))
}

pub fn boolean<'a>(ast: AstBuilder<'a>, value: bool) -> Expression<'a> {
    Expression::BooleanLiteral(ast.alloc(BooleanLiteral { span: SPAN, value }))
}

pub fn null<'a>(ast: AstBuilder<'a>) -> Expression<'a> {
    Expression::NullLiteral(ast.alloc(NullLiteral { span: SPAN }))
}

pub fn identifier<'a>(ast: AstBuilder<'a>, name: &str) -> Expression<'a> {
    Expression::Identifier(ast.alloc(IdentifierReference {
        span: SPAN,
        name: ast.atom(name).into(),
        reference_id: Default::default(),
    }))
}

pub fn binding_identifier<'a>(ast: AstBuilder<'a>, name: &str) -> BindingPattern<'a> {
    BindingPattern::BindingIdentifier(ast.alloc(BindingIdentifier {
        span: SPAN,
        name: ast.atom(name).into(),
        symbol_id: Default::default(),
    }))
}

pub fn void_zero<'a>(ast: AstBuilder<'a>) -> Expression<'a> {
    Expression::UnaryExpression(ast.alloc(UnaryExpression {
        span: SPAN,
        operator: UnaryOperator::Void,
        argument: number(ast, 0.0),
    }))
}

pub fn undefined<'a>(ast: AstBuilder<'a>) -> Expression<'a> {
    identifier(ast, "undefined")
}

pub fn negate<'a>(ast: AstBuilder<'a>, argument: Expression<'a>) -> Expression<'a> {
    Expression::UnaryExpression(ast.alloc(UnaryExpression {
        span: SPAN,
        operator: UnaryOperator::UnaryNegation,
        argument,
    }))
}

pub fn constant<'a>(ast: AstBuilder<'a>, value: &Constant) -> Expression<'a> {
    match value {
        Constant::Number(n) => number(ast, *n),
        Constant::String(s) => string(ast, s),
        Constant::Boolean(b) => boolean(ast, *b),
        Constant::Null => null(ast),
        Constant::Undefined => void_zero(ast),
    }
}

pub fn static_member<'a>(ast: AstBuilder<'a>, object: Expression<'a>, property: &str) -> Expression<'a> {
    Expression::StaticMemberExpression(ast.alloc(StaticMemberExpression {
        span: SPAN,
        object,
        property: IdentifierName {
            span: SPAN,
            name: ast.atom(property).into(),
        },
        optional: false,
    }))
}

pub fn expression_statement<'a>(ast: AstBuilder<'a>, expression: Expression<'a>) -> Statement<'a> {
    Statement::ExpressionStatement(ast.alloc(ExpressionStatement {
        span: SPAN,
        expression,
    }))
}

pub fn empty_statement<'a>(ast: AstBuilder<'a>) -> Statement<'a> {
    Statement::EmptyStatement(ast.alloc(EmptyStatement { span: SPAN }))
}

pub fn block<'a>(ast: AstBuilder<'a>, body: OxcVec<'a, Statement<'a>>) -> Statement<'a> {
    Statement::BlockStatement(ast.alloc(BlockStatement {
        span: SPAN,
        body,
        scope_id: Default::default(),
    }))
}

pub fn return_statement<'a>(ast: AstBuilder<'a>, argument: Option<Expression<'a>>) -> Statement<'a> {
    Statement::ReturnStatement(ast.alloc(ReturnStatement { span: SPAN, argument }))
}

/// `var name = init;`
pub fn var_declaration<'a>(ast: AstBuilder<'a>, name: &str, init: Option<Expression<'a>>) -> Statement<'a> {
    let mut declarations = ast.vec();
    declarations.push(VariableDeclarator {
        span: SPAN,
        kind: VariableDeclarationKind::Var,
        id: binding_identifier(ast, name),
        type_annotation: None,
        init,
        definite: false,
    });

    Statement::VariableDeclaration(ast.alloc(VariableDeclaration {
        span: SPAN,
        kind: VariableDeclarationKind::Var,
        declarations,
        declare: false,
    }))
}

/// `var a, b, c;` without initializers.
pub fn var_declarations<'a>(ast: AstBuilder<'a>, names: &[String]) -> Statement<'a> {
    let mut declarations = ast.vec();
    for name in names {
        declarations.push(VariableDeclarator {
            span: SPAN,
            kind: VariableDeclarationKind::Var,
            id: binding_identifier(ast, name),
            type_annotation: None,
            init: None,
            definite: false,
        });
    }

    Statement::VariableDeclaration(ast.alloc(VariableDeclaration {
        span: SPAN,
        kind: VariableDeclarationKind::Var,
        declarations,
        declare: false,
    }))
}

pub fn identifier_target<'a>(ast: AstBuilder<'a>, name: &str) -> SimpleAssignmentTarget<'a> {
    SimpleAssignmentTarget::AssignmentTargetIdentifier(ast.alloc(IdentifierReference {
        span: SPAN,
        name: ast.atom(name).into(),
        reference_id: Default::default(),
    }))
}

/// Plain parameter list `(a, b)`. Parsed from a template so the node carries
/// every field the parser fills in; spans are reset to [`SPAN`] afterwards.
pub fn formal_parameters<'a>(ast: AstBuilder<'a>, names: &[String]) -> Option<ABox<'a, FormalParameters<'a>>> {
    let source = ast.allocator.alloc_str(&format!("function f({}) {{}}", names.join(", ")));
    let ret = Parser::new(ast.allocator, source, SourceType::mjs()).parse();
    if !ret.errors.is_empty() {
        return None;
    }

    let mut program = ret.program;
    let Some(Statement::FunctionDeclaration(func)) = program.body.pop() else {
        return None;
    };
    let mut params = func.unbox().params;
    SyntheticSpans.visit_formal_parameters(&mut params);
    Some(params)
}

struct SyntheticSpans;

impl<'a> VisitMut<'a> for SyntheticSpans {
    fn visit_span(&mut self, span: &mut Span) {
        *span = SPAN;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use oxc_allocator::Allocator;
    use oxc_codegen::Codegen;

    fn print_with<'a>(allocator: &'a Allocator, stmts: Vec<Statement<'a>>) -> String {
        let ret = Parser::new(allocator, "", SourceType::mjs()).parse();
        let mut program = ret.program;
        for stmt in stmts {
            program.body.push(stmt);
        }
        Codegen::new().build(&program).code
    }

    #[test]
    fn test_number_forms() {
        let allocator = Allocator::default();
        let ast = AstBuilder::new(&allocator);
        let stmts = vec![
            expression_statement(ast, number(ast, 42.0)),
            expression_statement(ast, number(ast, -3.0)),
            expression_statement(ast, number(ast, f64::NAN)),
            expression_statement(ast, number(ast, 0.5)),
        ];

        let output = print_with(&allocator, stmts);
        assert!(output.contains("42"), "got: {}", output);
        assert!(output.contains("-3"), "got: {}", output);
        assert!(output.contains("NaN"), "got: {}", output);
        assert!(output.contains(".5"), "got: {}", output);
    }

    #[test]
    fn test_var_declaration() {
        let allocator = Allocator::default();
        let ast = AstBuilder::new(&allocator);
        let stmts = vec![var_declaration(ast, "answer", Some(string(ast, "yes")))];

        let output = print_with(&allocator, stmts);
        assert!(output.contains("var answer = \"yes\""), "got: {}", output);
    }

    #[test]
    fn test_formal_parameters_from_template() {
        let allocator = Allocator::default();
        let ast = AstBuilder::new(&allocator);
        let params = formal_parameters(ast, &["a".to_string(), "b".to_string()]).expect("valid names");

        assert_eq!(params.items.len(), 2);
        assert!(params.items.iter().all(|p| p.span == SPAN));
        assert!(formal_parameters(ast, &["not valid".to_string()]).is_none());
    }
}
