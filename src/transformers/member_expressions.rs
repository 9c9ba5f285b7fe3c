//! Property access demapping: `obj["name"]` → `obj.name`, and string keys
//! of object literals back to identifier keys.

use oxc_allocator::Box as ABox;
use oxc_ast::AstBuilder;
use oxc_ast::ast::*;

use super::util::is_identifier_name;
use crate::context::Context;
use crate::node::build;
use crate::pipeline::{OptionSpec, OptionValues, TransformStats, Transformer};
use crate::traverse::{Action, HookResult, TraverseCtx, Visitor};

pub struct MemberExpressions;

impl Transformer for MemberExpressions {
    fn name(&self) -> &'static str {
        "member-expressions"
    }

    fn description(&self) -> &'static str {
        "Rewrites obj[\"name\"] to obj.name and string object keys to identifiers"
    }

    fn options(&self) -> &'static [OptionSpec] {
        &[]
    }

    fn run(&self, cx: &mut Context<'_>, _options: &OptionValues) -> crate::Result<TransformStats> {
        let mut demapper = MemberDemapper;
        let report = cx.traverse(&mut demapper);
        Ok(TransformStats {
            changes: report.changes,
            skipped: report.errors,
        })
    }
}

pub struct MemberDemapper;

/// Dot form of `object["name"]`, taking the object out of `member`.
fn static_form<'a>(
    ast: AstBuilder<'a>,
    member: &mut ComputedMemberExpression<'a>,
) -> Option<ABox<'a, StaticMemberExpression<'a>>> {
    if member.optional {
        return None;
    }
    let Expression::StringLiteral(lit) = &member.expression else {
        return None;
    };
    if !is_identifier_name(lit.value.as_str()) {
        return None;
    }

    let property = IdentifierName {
        span: lit.span,
        name: ast.atom(lit.value.as_str()).into(),
    };
    let object = std::mem::replace(&mut member.object, build::null(ast));
    Some(ast.alloc(StaticMemberExpression {
        span: member.span,
        object,
        property,
        optional: false,
    }))
}

fn demap_keys<'a>(ast: AstBuilder<'a>, object: &mut ObjectExpression<'a>) -> usize {
    let mut rewritten = 0;
    for property in object.properties.iter_mut() {
        let ObjectPropertyKind::ObjectProperty(prop) = property else {
            continue;
        };
        let PropertyKey::StringLiteral(lit) = &prop.key else {
            continue;
        };
        let name = lit.value.as_str();
        if !is_identifier_name(name) || (prop.computed && name == "__proto__") {
            continue;
        }

        let key = IdentifierName {
            span: lit.span,
            name: ast.atom(name).into(),
        };
        prop.key = PropertyKey::StaticIdentifier(ast.alloc(key));
        prop.computed = false;
        rewritten += 1;
    }
    rewritten
}

impl<'a> Visitor<'a> for MemberDemapper {
    fn exit_expression(&mut self, expr: &mut Expression<'a>, ctx: &mut TraverseCtx<'_, 'a>) -> HookResult {
        let ast = ctx.ast;
        match expr {
            Expression::ComputedMemberExpression(member) => {
                if let Some(member) = static_form(ast, member) {
                    *expr = Expression::StaticMemberExpression(member);
                    return Ok(Action::Replaced);
                }
            }
            Expression::AssignmentExpression(assign) => {
                if let AssignmentTarget::ComputedMemberExpression(member) = &mut assign.left
                    && let Some(member) = static_form(ast, member)
                {
                    assign.left = AssignmentTarget::StaticMemberExpression(member);
                    ctx.mark_changed();
                }
            }
            Expression::UpdateExpression(update) => {
                if let SimpleAssignmentTarget::ComputedMemberExpression(member) = &mut update.argument
                    && let Some(member) = static_form(ast, member)
                {
                    update.argument = SimpleAssignmentTarget::StaticMemberExpression(member);
                    ctx.mark_changed();
                }
            }
            Expression::ObjectExpression(object) => {
                for _ in 0..demap_keys(ast, object) {
                    ctx.mark_changed();
                }
            }
            _ => {}
        }
        Ok(Action::Continue)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transformers::test_support::run;

    fn run_member_expressions(code: &str) -> String {
        run(&MemberExpressions, code)
    }

    #[test]
    fn test_bracket_call_to_dot() {
        let output = run_member_expressions("console[\"log\"](\"hi\");");
        assert!(output.contains("console.log(\"hi\")"), "got: {}", output);
    }

    #[test]
    fn test_nested_access() {
        let output = run_member_expressions("window[\"document\"][\"body\"];");
        assert!(output.contains("window.document.body"), "got: {}", output);
    }

    #[test]
    fn test_invalid_names_untouched() {
        let output = run_member_expressions("a[\"my-key\"]; a[\"1x\"]; a[i];");
        assert!(output.contains("a[\"my-key\"]"), "got: {}", output);
        assert!(output.contains("a[\"1x\"]"), "got: {}", output);
        assert!(output.contains("a[i]"), "got: {}", output);
    }

    #[test]
    fn test_reserved_word_property() {
        let output = run_member_expressions("exports[\"default\"] = f;");
        assert!(output.contains("exports.default = f"), "got: {}", output);
    }

    #[test]
    fn test_update_target() {
        let output = run_member_expressions("counter[\"n\"]++;");
        assert!(output.contains("counter.n++"), "got: {}", output);
    }

    #[test]
    fn test_object_keys() {
        let output = run_member_expressions("var o = { \"a\": 1, \"b-c\": 2 };");
        assert!(output.contains("a: 1"), "got: {}", output);
        assert!(output.contains("\"b-c\": 2"), "got: {}", output);
    }
}
