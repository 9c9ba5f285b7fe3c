//! Conservative constant evaluation with JavaScript value semantics.
//!
//! `evaluate` answers only when the result is certain: literals and the
//! operators over them. Identifiers are opaque unless an [`Environment`]
//! supplies their value, which is how the state-machine simulation feeds its
//! known state variables in.

use std::cmp::Ordering;

use rustc_hash::FxHashMap;

use oxc_ast::ast::*;

#[derive(Debug, Clone, PartialEq)]
pub enum Constant {
    Number(f64),
    String(String),
    Boolean(bool),
    Null,
    Undefined,
}

pub trait Environment {
    fn lookup(&self, name: &str) -> Option<Constant>;
}

/// Environment that knows no identifiers.
pub struct Opaque;

impl Environment for Opaque {
    fn lookup(&self, _name: &str) -> Option<Constant> {
        None
    }
}

impl Environment for FxHashMap<String, Constant> {
    fn lookup(&self, name: &str) -> Option<Constant> {
        self.get(name).cloned()
    }
}

impl Environment for FxHashMap<String, f64> {
    fn lookup(&self, name: &str) -> Option<Constant> {
        self.get(name).map(|n| Constant::Number(*n))
    }
}

impl Constant {
    pub fn to_number(&self) -> f64 {
        match self {
            Self::Number(n) => *n,
            Self::String(s) => string_to_number(s),
            Self::Boolean(b) => f64::from(u8::from(*b)),
            Self::Null => 0.0,
            Self::Undefined => f64::NAN,
        }
    }

    pub fn to_boolean(&self) -> bool {
        match self {
            Self::Number(n) => *n != 0.0 && !n.is_nan(),
            Self::String(s) => !s.is_empty(),
            Self::Boolean(b) => *b,
            Self::Null | Self::Undefined => false,
        }
    }

    pub fn to_js_string(&self) -> String {
        match self {
            Self::Number(n) => number_to_js_string(*n),
            Self::String(s) => s.clone(),
            Self::Boolean(b) => b.to_string(),
            Self::Null => "null".to_string(),
            Self::Undefined => "undefined".to_string(),
        }
    }

    pub const fn type_of(&self) -> &'static str {
        match self {
            Self::Number(_) => "number",
            Self::String(_) => "string",
            Self::Boolean(_) => "boolean",
            Self::Null => "object",
            Self::Undefined => "undefined",
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }
}

pub fn evaluate(expr: &Expression<'_>, env: &impl Environment) -> Option<Constant> {
    match expr {
        Expression::NumericLiteral(lit) => Some(Constant::Number(lit.value)),
        Expression::StringLiteral(lit) => Some(Constant::String(lit.value.to_string())),
        Expression::BooleanLiteral(lit) => Some(Constant::Boolean(lit.value)),
        Expression::NullLiteral(_) => Some(Constant::Null),
        Expression::TemplateLiteral(template) if template.expressions.is_empty() => {
            let quasi = template.quasis.first()?;
            Some(Constant::String(quasi.value.cooked.as_ref()?.to_string()))
        }
        Expression::Identifier(ident) => env.lookup(ident.name.as_str()),
        Expression::ParenthesizedExpression(paren) => evaluate(&paren.expression, env),
        Expression::UnaryExpression(unary) => evaluate_unary(unary, env),
        Expression::BinaryExpression(binary) => {
            let left = evaluate(&binary.left, env)?;
            let right = evaluate(&binary.right, env)?;
            binary_op(binary.operator, &left, &right)
        }
        Expression::LogicalExpression(logical) => {
            let left = evaluate(&logical.left, env)?;
            let short_circuits = match logical.operator {
                LogicalOperator::And => !left.to_boolean(),
                LogicalOperator::Or => left.to_boolean(),
                LogicalOperator::Coalesce => !matches!(left, Constant::Null | Constant::Undefined),
            };
            if short_circuits { Some(left) } else { evaluate(&logical.right, env) }
        }
        Expression::ConditionalExpression(cond) => {
            if evaluate(&cond.test, env)?.to_boolean() {
                evaluate(&cond.consequent, env)
            } else {
                evaluate(&cond.alternate, env)
            }
        }
        _ => None,
    }
}

/// Evaluates without any identifier knowledge.
pub fn evaluate_pure(expr: &Expression<'_>) -> Option<Constant> {
    evaluate(expr, &Opaque)
}

/// Truthiness of `expr` when it is certain. Covers the `![]` / `!![]` idiom
/// that plain evaluation cannot express as a constant.
pub fn evaluate_truthiness(expr: &Expression<'_>, env: &impl Environment) -> Option<bool> {
    match expr.without_parentheses() {
        Expression::ArrayExpression(array) if array.elements.is_empty() => Some(true),
        Expression::ObjectExpression(object) if object.properties.is_empty() => Some(true),
        Expression::FunctionExpression(_) | Expression::ArrowFunctionExpression(_) => Some(true),
        Expression::UnaryExpression(unary) if unary.operator == UnaryOperator::LogicalNot => {
            evaluate_truthiness(&unary.argument, env).map(|b| !b)
        }
        other => evaluate(other, env).map(|c| c.to_boolean()),
    }
}

fn evaluate_unary(unary: &UnaryExpression<'_>, env: &impl Environment) -> Option<Constant> {
    match unary.operator {
        UnaryOperator::LogicalNot => evaluate_truthiness(&unary.argument, env).map(|b| Constant::Boolean(!b)),
        UnaryOperator::Void => is_side_effect_free(&unary.argument).then_some(Constant::Undefined),
        UnaryOperator::Typeof => {
            let kind = match unary.argument.without_parentheses() {
                Expression::FunctionExpression(_) | Expression::ArrowFunctionExpression(_) => "function",
                Expression::ArrayExpression(_) | Expression::ObjectExpression(_) => "object",
                other => evaluate(other, env)?.type_of(),
            };
            Some(Constant::String(kind.to_string()))
        }
        UnaryOperator::UnaryNegation => Some(Constant::Number(-evaluate(&unary.argument, env)?.to_number())),
        UnaryOperator::UnaryPlus => Some(Constant::Number(evaluate(&unary.argument, env)?.to_number())),
        UnaryOperator::BitwiseNot => {
            let value = to_int32(evaluate(&unary.argument, env)?.to_number());
            Some(Constant::Number(f64::from(!value)))
        }
        UnaryOperator::Delete => None,
    }
}

pub fn binary_op(operator: BinaryOperator, left: &Constant, right: &Constant) -> Option<Constant> {
    use BinaryOperator as Op;

    let number = |f: fn(f64, f64) -> f64| Some(Constant::Number(f(left.to_number(), right.to_number())));
    let int32 = |f: fn(i32, i32) -> i32| {
        Some(Constant::Number(f64::from(f(
            to_int32(left.to_number()),
            to_int32(right.to_number()),
        ))))
    };

    match operator {
        Op::Addition => {
            if matches!(left, Constant::String(_)) || matches!(right, Constant::String(_)) {
                Some(Constant::String(left.to_js_string() + &right.to_js_string()))
            } else {
                number(|a, b| a + b)
            }
        }
        Op::Subtraction => number(|a, b| a - b),
        Op::Multiplication => number(|a, b| a * b),
        Op::Division => number(|a, b| a / b),
        Op::Remainder => number(|a, b| a % b),
        Op::Exponential => number(f64::powf),
        Op::BitwiseAnd => int32(|a, b| a & b),
        Op::BitwiseOR => int32(|a, b| a | b),
        Op::BitwiseXOR => int32(|a, b| a ^ b),
        Op::ShiftLeft => int32(|a, b| a.wrapping_shl(b as u32 & 0x1f)),
        Op::ShiftRight => int32(|a, b| a.wrapping_shr(b as u32 & 0x1f)),
        Op::ShiftRightZeroFill => {
            let value = to_uint32(left.to_number()) >> (to_uint32(right.to_number()) & 0x1f);
            Some(Constant::Number(f64::from(value)))
        }
        Op::StrictEquality => Some(Constant::Boolean(strict_equals(left, right))),
        Op::StrictInequality => Some(Constant::Boolean(!strict_equals(left, right))),
        Op::Equality => Some(Constant::Boolean(loose_equals(left, right))),
        Op::Inequality => Some(Constant::Boolean(!loose_equals(left, right))),
        Op::LessThan => Some(Constant::Boolean(compare(left, right) == Some(Ordering::Less))),
        Op::GreaterThan => Some(Constant::Boolean(compare(left, right) == Some(Ordering::Greater))),
        Op::LessEqualThan => Some(Constant::Boolean(matches!(
            compare(left, right),
            Some(Ordering::Less | Ordering::Equal)
        ))),
        Op::GreaterEqualThan => Some(Constant::Boolean(matches!(
            compare(left, right),
            Some(Ordering::Greater | Ordering::Equal)
        ))),
        _ => None,
    }
}

fn strict_equals(left: &Constant, right: &Constant) -> bool {
    match (left, right) {
        (Constant::Number(a), Constant::Number(b)) => a == b,
        (Constant::String(a), Constant::String(b)) => a == b,
        (Constant::Boolean(a), Constant::Boolean(b)) => a == b,
        (Constant::Null, Constant::Null) | (Constant::Undefined, Constant::Undefined) => true,
        _ => false,
    }
}

fn loose_equals(left: &Constant, right: &Constant) -> bool {
    match (left, right) {
        (Constant::Null | Constant::Undefined, Constant::Null | Constant::Undefined) => true,
        (Constant::Null | Constant::Undefined, _) | (_, Constant::Null | Constant::Undefined) => false,
        (Constant::String(a), Constant::String(b)) => a == b,
        _ => left.to_number() == right.to_number(),
    }
}

fn compare(left: &Constant, right: &Constant) -> Option<Ordering> {
    match (left, right) {
        (Constant::String(a), Constant::String(b)) => Some(a.encode_utf16().cmp(b.encode_utf16())),
        _ => left.to_number().partial_cmp(&right.to_number()),
    }
}

/// Conservative side-effect check: literals, identifiers, function values
/// and containers of those.
pub fn is_side_effect_free(expr: &Expression<'_>) -> bool {
    match expr {
        Expression::NumericLiteral(_)
        | Expression::StringLiteral(_)
        | Expression::BooleanLiteral(_)
        | Expression::NullLiteral(_)
        | Expression::BigIntLiteral(_)
        | Expression::RegExpLiteral(_)
        | Expression::Identifier(_)
        | Expression::ThisExpression(_)
        | Expression::FunctionExpression(_)
        | Expression::ArrowFunctionExpression(_) => true,
        Expression::TemplateLiteral(template) => template.expressions.is_empty(),
        Expression::ParenthesizedExpression(paren) => is_side_effect_free(&paren.expression),
        Expression::UnaryExpression(unary) => {
            !matches!(unary.operator, UnaryOperator::Delete) && is_side_effect_free(&unary.argument)
        }
        Expression::ArrayExpression(array) => array.elements.iter().all(|element| match element {
            ArrayExpressionElement::Elision(_) => true,
            ArrayExpressionElement::SpreadElement(_) => false,
            _ => element.as_expression().is_some_and(is_side_effect_free),
        }),
        Expression::ObjectExpression(object) => object.properties.iter().all(|prop| match prop {
            ObjectPropertyKind::ObjectProperty(prop) => {
                !prop.computed && prop.kind == PropertyKind::Init && is_side_effect_free(&prop.value)
            }
            ObjectPropertyKind::SpreadProperty(_) => false,
        }),
        _ => false,
    }
}

pub fn to_int32(value: f64) -> i32 {
    to_uint32(value) as i32
}

pub fn to_uint32(value: f64) -> u32 {
    if !value.is_finite() {
        return 0;
    }
    let truncated = value.trunc();
    let modulo = truncated.rem_euclid(4_294_967_296.0);
    modulo as u32
}

fn string_to_number(s: &str) -> f64 {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return 0.0;
    }
    let (radix, digits) = match trimmed.get(..2) {
        Some("0x" | "0X") => (16, &trimmed[2..]),
        Some("0o" | "0O") => (8, &trimmed[2..]),
        Some("0b" | "0B") => (2, &trimmed[2..]),
        _ => (10, trimmed),
    };
    if radix != 10 {
        return u64::from_str_radix(digits, radix).map_or(f64::NAN, |n| n as f64);
    }
    match trimmed {
        "Infinity" | "+Infinity" => f64::INFINITY,
        "-Infinity" => f64::NEG_INFINITY,
        _ if trimmed.contains(|c: char| c.is_ascii_alphabetic() && c != 'e' && c != 'E') => f64::NAN,
        _ => trimmed.parse::<f64>().unwrap_or(f64::NAN),
    }
}

/// `Number.prototype.toString()` for the values obfuscators produce.
pub fn number_to_js_string(value: f64) -> String {
    if value.is_nan() {
        return "NaN".to_string();
    }
    if value.is_infinite() {
        return if value > 0.0 { "Infinity" } else { "-Infinity" }.to_string();
    }
    if value == 0.0 {
        return "0".to_string();
    }
    let magnitude = value.abs();
    if magnitude >= 1e21 || magnitude < 1e-6 {
        let formatted = format!("{value:e}");
        return match formatted.split_once('e') {
            Some((mantissa, exponent)) if !exponent.starts_with('-') => format!("{mantissa}e+{exponent}"),
            _ => formatted,
        };
    }
    if value.fract() == 0.0 && magnitude < 9.007_199_254_740_992e15 {
        return format!("{}", value as i64);
    }
    format!("{value}")
}

/// `parseInt(s)` with an implicit radix, as rotation checks call it.
pub fn parse_int(s: &str) -> f64 {
    let trimmed = s.trim_start();
    let (negative, rest) = match trimmed.as_bytes().first() {
        Some(b'-') => (true, &trimmed[1..]),
        Some(b'+') => (false, &trimmed[1..]),
        _ => (false, trimmed),
    };
    let (radix, digits) = match rest.get(..2) {
        Some("0x" | "0X") => (16, &rest[2..]),
        _ => (10, rest),
    };

    let prefix: String = digits.chars().take_while(|c| c.is_digit(radix)).collect();
    if prefix.is_empty() {
        return f64::NAN;
    }

    let mut value = 0.0_f64;
    for c in prefix.chars() {
        value = value * f64::from(radix) + f64::from(c.to_digit(radix).unwrap_or(0));
    }
    if negative { -value } else { value }
}
