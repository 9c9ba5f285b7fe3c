//! Constant folding.
//!
//! Operator expressions whose operands are all literals become the literal
//! they evaluate to. Results that would print longer or lose precision,
//! such as `undefined` or non-finite numbers, are left as written.

use oxc_ast::ast::*;

use crate::context::Context;
use crate::evaluate::{Constant, evaluate_pure};
use crate::node::build;
use crate::pipeline::{OptionSpec, OptionValues, TransformStats, Transformer};
use crate::traverse::{Action, HookResult, TraverseCtx, Visitor};

/// Folds operator expressions over literals into a single literal.
pub struct ConstantFolding;

impl Transformer for ConstantFolding {
    fn name(&self) -> &'static str {
        "constant-folding"
    }

    fn description(&self) -> &'static str {
        "Folds arithmetic, concatenation, comparisons and typeof over literals"
    }

    fn options(&self) -> &'static [OptionSpec] {
        &[]
    }

    fn run(&self, cx: &mut Context<'_>, _options: &OptionValues) -> crate::Result<TransformStats> {
        let mut folder = ConstantFolder;
        let report = cx.traverse(&mut folder);
        Ok(TransformStats {
            changes: report.changes,
            skipped: report.errors,
        })
    }
}

pub struct ConstantFolder;

impl ConstantFolder {
    /// Already as short as the folded form would print.
    fn is_literal_form(expr: &Expression<'_>) -> bool {
        match expr {
            Expression::UnaryExpression(unary) => match unary.operator {
                UnaryOperator::UnaryNegation => matches!(unary.argument, Expression::NumericLiteral(_)),
                UnaryOperator::Void => matches!(unary.argument, Expression::NumericLiteral(_)),
                _ => false,
            },
            _ => false,
        }
    }
}

impl<'a> Visitor<'a> for ConstantFolder {
    fn exit_expression(&mut self, expr: &mut Expression<'a>, ctx: &mut TraverseCtx<'_, 'a>) -> HookResult {
        if !matches!(
            expr,
            Expression::BinaryExpression(_)
                | Expression::UnaryExpression(_)
                | Expression::LogicalExpression(_)
                | Expression::ConditionalExpression(_)
        ) || Self::is_literal_form(expr)
        {
            return Ok(Action::Continue);
        }

        let Some(value) = evaluate_pure(expr) else {
            return Ok(Action::Continue);
        };
        match value {
            Constant::Undefined => return Ok(Action::Continue),
            Constant::Number(n) if !n.is_finite() => return Ok(Action::Continue),
            _ => {}
        }

        log::debug!("folding expression to {}", value.to_js_string());
        *expr = build::constant(ctx.ast, &value);
        Ok(Action::Replaced)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transformers::test_support::{run, run_with};

    fn run_constant_folding(code: &str) -> String {
        run(&ConstantFolding, code)
    }

    #[test]
    fn test_arithmetic() {
        let output = run_constant_folding("var x = 5 + 10 * 2;");
        assert!(output.contains("x = 25"), "Expected 25, got: {}", output);
    }

    #[test]
    fn test_hex_arithmetic() {
        let output = run_constant_folding("var x = 0x10 - 0x1 * 0x2;");
        assert!(output.contains("x = 14"), "Expected 14, got: {}", output);
    }

    #[test]
    fn test_string_concatenation() {
        let output = run_constant_folding("var s = 'con' + 'sole';");
        assert!(output.contains("\"console\""), "Expected joined string, got: {}", output);
    }

    #[test]
    fn test_comparison_and_typeof() {
        let output = run_constant_folding("var a = 3 > 2; var b = typeof 'x';");
        assert!(output.contains("a = true"), "got: {}", output);
        assert!(output.contains("b = \"string\""), "got: {}", output);
    }

    #[test]
    fn test_negative_result() {
        let output = run_constant_folding("var x = 1 - 3;");
        assert!(output.contains("x = -2"), "got: {}", output);
    }

    #[test]
    fn test_unknowns_untouched() {
        let (output, stats) = run_with(&ConstantFolding, serde_json::Value::Null, "var x = y + 1; var z = -5; var d = 1 / 0;");
        assert!(output.contains("y + 1"), "got: {}", output);
        assert!(output.contains("1 / 0"), "Should not fold to Infinity, got: {}", output);
        assert_eq!(stats.changes, 0);
    }
}
