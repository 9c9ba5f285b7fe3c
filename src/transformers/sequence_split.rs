//! Sequence and declaration splitting.
//!
//! Statement-level sequences become one statement per expression:
//!
//! ```js
//! a = 1, b = 2, c();      // a = 1; b = 2; c();
//! return x(), y;          // x(); return y;
//! ```
//!
//! and `var a = 1, b = 2;` becomes one declaration per binding. Only
//! statements sitting directly in a statement list are split; `for` heads
//! and single-statement bodies keep their shape.

use oxc_ast::ast::*;
use oxc_span::SPAN;

use crate::context::Context;
use crate::node::build;
use crate::pipeline::{OptionSpec, OptionValues, TransformStats, Transformer};
use crate::traverse::{Action, HookResult, TraverseCtx, Visitor};

pub struct SequenceSplit;

impl Transformer for SequenceSplit {
    fn name(&self) -> &'static str {
        "sequence-split"
    }

    fn description(&self) -> &'static str {
        "Splits statement-level sequence expressions and multi-declarator var statements"
    }

    fn options(&self) -> &'static [OptionSpec] {
        &[]
    }

    fn run(&self, cx: &mut Context<'_>, _options: &OptionValues) -> crate::Result<TransformStats> {
        let mut splitter = SequenceSplitter::new();
        let report = cx.traverse(&mut splitter);
        log::debug!("split {} statements", splitter.split_count());
        Ok(TransformStats {
            changes: splitter.split_count(),
            skipped: report.errors,
        })
    }
}

pub struct SequenceSplitter {
    split_count: usize,
}

impl SequenceSplitter {
    pub fn new() -> Self {
        Self { split_count: 0 }
    }

    pub fn split_count(&self) -> usize {
        self.split_count
    }

    /// Moves all but the last expression of a sequence in front of the
    /// current statement.
    fn hoist_leading<'a>(expr: &mut Expression<'a>, ctx: &mut TraverseCtx<'_, 'a>) -> bool {
        let Expression::SequenceExpression(seq) = expr else {
            return false;
        };
        if seq.expressions.len() < 2 {
            return false;
        }

        let ast = ctx.ast;
        let mut expressions = std::mem::replace(&mut seq.expressions, ast.vec());
        let Some(last) = expressions.pop() else {
            return false;
        };
        for leading in expressions {
            ctx.insert_before(build::expression_statement(ast, leading));
        }
        *expr = last;
        true
    }
}

impl Default for SequenceSplitter {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a> Visitor<'a> for SequenceSplitter {
    fn exit_statement(&mut self, stmt: &mut Statement<'a>, ctx: &mut TraverseCtx<'_, 'a>) -> HookResult {
        if !ctx.is_list_item() {
            return Ok(Action::Continue);
        }

        let split = match stmt {
            Statement::ExpressionStatement(expr_stmt) => Self::hoist_leading(&mut expr_stmt.expression, ctx),
            Statement::ReturnStatement(ret) => match &mut ret.argument {
                Some(argument) => Self::hoist_leading(argument, ctx),
                None => false,
            },
            Statement::ThrowStatement(throw) => Self::hoist_leading(&mut throw.argument, ctx),
            Statement::IfStatement(if_stmt) => Self::hoist_leading(&mut if_stmt.test, ctx),
            Statement::VariableDeclaration(decl) if decl.declarations.len() > 1 => {
                let ast = ctx.ast;
                let kind = decl.kind;
                let rest: Vec<VariableDeclarator<'a>> = decl.declarations.drain(1..).collect();
                for declarator in rest {
                    let mut declarations = ast.vec();
                    declarations.push(declarator);
                    ctx.insert_after(Statement::VariableDeclaration(ast.alloc(VariableDeclaration {
                        span: SPAN,
                        kind,
                        declarations,
                        declare: false,
                    })));
                }
                true
            }
            _ => false,
        };

        if split {
            self.split_count += 1;
        }
        Ok(Action::Continue)
    }
}
