use oxc_ast::ast::*;

use crate::context::Context;
use crate::node::build;
use crate::pipeline::{OptionSpec, OptionValues, TransformStats, Transformer};
use crate::traverse::{Action, HookResult, TraverseCtx, Visitor};

/// `!0`, `!1`, `![]`, `!![]` and `void 0` back to their literal spelling.
pub struct BooleanLiterals;

impl Transformer for BooleanLiterals {
    fn name(&self) -> &'static str {
        "boolean-literals"
    }

    fn description(&self) -> &'static str {
        "Rewrites !0 / !1 / ![] / !![] to true and false, and void 0 to undefined"
    }

    fn options(&self) -> &'static [OptionSpec] {
        &[]
    }

    fn run(&self, cx: &mut Context<'_>, _options: &OptionValues) -> crate::Result<TransformStats> {
        cx.crawl();
        let mut converter = BooleanLiteralConverter;
        let report = cx.traverse(&mut converter);
        Ok(TransformStats {
            changes: report.changes,
            skipped: report.errors,
        })
    }
}

pub struct BooleanLiteralConverter;

impl<'a> Visitor<'a> for BooleanLiteralConverter {
    fn exit_expression(&mut self, expr: &mut Expression<'a>, ctx: &mut TraverseCtx<'_, 'a>) -> HookResult {
        let Expression::UnaryExpression(unary) = expr else {
            return Ok(Action::Continue);
        };

        match unary.operator {
            UnaryOperator::LogicalNot => {
                let value = match &unary.argument {
                    Expression::NumericLiteral(num) if num.value == 0.0 => Some(true),
                    Expression::NumericLiteral(num) if num.value == 1.0 => Some(false),
                    Expression::ArrayExpression(array) if array.elements.is_empty() => Some(false),
                    Expression::BooleanLiteral(lit) => Some(!lit.value),
                    _ => None,
                };
                let Some(value) = value else {
                    return Ok(Action::Continue);
                };

                log::debug!("converting negation at {}..{} to {value}", unary.span.start, unary.span.end);
                *expr = build::boolean(ctx.ast, value);
                Ok(Action::Replaced)
            }
            UnaryOperator::Void => {
                let literal = matches!(
                    unary.argument,
                    Expression::NumericLiteral(_)
                        | Expression::StringLiteral(_)
                        | Expression::BooleanLiteral(_)
                        | Expression::NullLiteral(_)
                );
                if !literal || ctx.scope().get_binding("undefined", ctx.scope_id()).is_some() {
                    return Ok(Action::Continue);
                }

                *expr = build::undefined(ctx.ast);
                Ok(Action::Replaced)
            }
            _ => Ok(Action::Continue),
        }
    }
}
