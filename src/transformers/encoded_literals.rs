//! Inline decoding of self-contained string encoders.
//!
//! Besides string tables, some obfuscators wrap single literals in a call to
//! a one-argument decoder: `b32("JBSWY3DP")`. The decoder is recognised by
//! what its body has to contain for the encoding to work. A Base32 decoder
//! carries the RFC 4648 alphabet, an Ascii85 decoder the constants 85 and
//! 33, a hex-table decoder a sixteen-symbol alphabet.

use oxc_ast::ast::*;
use oxc_ast_visit::{Visit, walk};
use oxc_span::{GetSpan, Span};
use oxc_syntax::scope::ScopeFlags;
use oxc_syntax::symbol::SymbolId;
use rustc_hash::FxHashMap;

use super::util::{Prune, simple_parameters};
use crate::codec::{BASE32_ALPHABET, ascii85_decode, base32_decode, hex_table_decode, is_hex_table};
use crate::context::Context;
use crate::node::{NodeKey, build};
use crate::pipeline::{OptionKind, OptionSpec, OptionValues, TransformStats, Transformer};
use crate::scope::ScopeModel;
use crate::traverse::{Action, HookResult, TraverseCtx, Visitor};

const OPTIONS: &[OptionSpec] = &[OptionSpec::new(
    "removeDecoders",
    OptionKind::Bool { default: true },
    "Remove decoder functions once every call has been decoded",
)];

pub struct EncodedLiterals;

impl Transformer for EncodedLiterals {
    fn name(&self) -> &'static str {
        "encoded-literals"
    }

    fn description(&self) -> &'static str {
        "Decodes Base32, Ascii85 and hex-table encoded string literals"
    }

    fn options(&self) -> &'static [OptionSpec] {
        OPTIONS
    }

    fn run(&self, cx: &mut Context<'_>, options: &OptionValues) -> crate::Result<TransformStats> {
        let remove_decoders = options.bool("removeDecoders").unwrap_or(true);

        cx.crawl();
        let mut collector = DecoderCollector {
            scope: cx.scope(),
            decoders: FxHashMap::default(),
        };
        collector.visit_program(&cx.program);
        let decoders = collector.decoders;
        if decoders.is_empty() {
            return Ok(TransformStats::default());
        }
        log::debug!("found {} literal decoders", decoders.len());

        let mut replacer = LiteralReplacer {
            decoders: &decoders,
            replaced: 0,
            refused: 0,
        };
        let report = cx.traverse(&mut replacer);
        let mut stats = TransformStats {
            changes: replacer.replaced,
            skipped: replacer.refused + report.errors,
        };

        if remove_decoders {
            cx.crawl();
            let mut prune = Prune::new();
            for decoder in decoders.values() {
                let region = NodeKey::of(decoder.declaration);
                let unused = cx.scope().binding_at(decoder.identifier).is_some_and(|binding| {
                    binding
                        .references
                        .iter()
                        .all(|reference| region.contains(NodeKey::of(*reference)))
                });
                if unused {
                    log::debug!("removing {:?} decoder {}", decoder.encoding, decoder.name);
                    prune.mark(decoder.declaration);
                }
            }
            if !prune.is_empty() {
                cx.traverse(&mut prune);
                stats.changes += prune.removed;
            }
        }

        cx.crawl();
        Ok(stats)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Encoding {
    Base32,
    Ascii85,
    HexTable(String),
}

impl Encoding {
    pub fn decode(&self, input: &str) -> Option<String> {
        match self {
            Self::Base32 => base32_decode(input),
            Self::Ascii85 => ascii85_decode(input),
            Self::HexTable(table) => hex_table_decode(input, table),
        }
    }

    /// Reads the encoding off a one-parameter function body.
    fn fingerprint(body: &FunctionBody<'_>) -> Option<Self> {
        let mut literals = Literals::default();
        literals.visit_function_body(body);

        if literals.strings.iter().any(|s| s.eq_ignore_ascii_case(BASE32_ALPHABET)) {
            return Some(Self::Base32);
        }
        if let Some(table) = literals.strings.into_iter().find(|s| is_hex_table(s)) {
            return Some(Self::HexTable(table));
        }
        let has = |n: f64| literals.numbers.iter().any(|value| *value == n);
        (has(85.0) && has(33.0)).then_some(Self::Ascii85)
    }
}

#[derive(Debug)]
struct LiteralDecoder {
    name: String,
    identifier: Span,
    declaration: Span,
    encoding: Encoding,
}

#[derive(Default)]
struct Literals {
    strings: Vec<String>,
    numbers: Vec<f64>,
}

impl<'a> Visit<'a> for Literals {
    fn visit_string_literal(&mut self, it: &StringLiteral<'a>) {
        self.strings.push(it.value.to_string());
    }

    fn visit_numeric_literal(&mut self, it: &NumericLiteral<'a>) {
        self.numbers.push(it.value);
    }
}

struct DecoderCollector<'s> {
    scope: &'s ScopeModel,
    decoders: FxHashMap<SymbolId, LiteralDecoder>,
}

impl DecoderCollector<'_> {
    fn consider(&mut self, id: &BindingIdentifier<'_>, func: &Function<'_>, declaration: Span) {
        if simple_parameters(&func.params).is_none_or(|params| params.len() != 1) {
            return;
        }
        let Some(body) = &func.body else {
            return;
        };
        let Some(binding) = self.scope.binding_at(id.span) else {
            return;
        };
        if binding.violation_count() > 0 {
            return;
        }
        if let Some(encoding) = Encoding::fingerprint(body) {
            self.decoders.insert(
                binding.symbol_id,
                LiteralDecoder {
                    name: id.name.to_string(),
                    identifier: id.span,
                    declaration,
                    encoding,
                },
            );
        }
    }
}

impl<'a> Visit<'a> for DecoderCollector<'_> {
    fn visit_function(&mut self, it: &Function<'a>, flags: ScopeFlags) {
        if matches!(it.r#type, FunctionType::FunctionDeclaration)
            && let Some(id) = &it.id
        {
            self.consider(id, it, it.span);
        }
        walk::walk_function(self, it, flags);
    }

    fn visit_variable_declarator(&mut self, it: &VariableDeclarator<'a>) {
        if let BindingPattern::BindingIdentifier(id) = &it.id
            && let Some(Expression::FunctionExpression(func)) = &it.init
        {
            self.consider(id, func, it.span);
        }
        walk::walk_variable_declarator(self, it);
    }
}

struct LiteralReplacer<'d> {
    decoders: &'d FxHashMap<SymbolId, LiteralDecoder>,
    replaced: usize,
    refused: usize,
}

impl<'a> Visitor<'a> for LiteralReplacer<'_> {
    fn exit_expression(&mut self, expr: &mut Expression<'a>, ctx: &mut TraverseCtx<'_, 'a>) -> HookResult {
        let Expression::CallExpression(call) = expr else {
            return Ok(Action::Continue);
        };
        let Expression::Identifier(callee) = &call.callee else {
            return Ok(Action::Continue);
        };
        let Some(decoder) = ctx
            .scope()
            .binding_at(callee.span)
            .and_then(|binding| self.decoders.get(&binding.symbol_id))
        else {
            return Ok(Action::Continue);
        };
        let [argument] = call.arguments.as_slice() else {
            return Ok(Action::Continue);
        };
        let Some(Expression::StringLiteral(lit)) = argument.as_expression() else {
            return Ok(Action::Continue);
        };
        if NodeKey::of(decoder.declaration).contains(NodeKey::of(call.span)) {
            return Ok(Action::Continue);
        }

        match decoder.encoding.decode(&lit.value) {
            Some(value) => {
                *expr = build::string(ctx.ast, &value);
                self.replaced += 1;
                Ok(Action::Replaced)
            }
            None => {
                log::debug!("{} could not decode {:?} at {:?}", decoder.name, lit.value.as_str(), expr.span());
                self.refused += 1;
                Ok(Action::Continue)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transformers::test_support::{run, run_with};
    use serde_json::json;

    const BASE32_DECODER: &str = r#"function b32(s) {
        var alphabet = "ABCDEFGHIJKLMNOPQRSTUVWXYZ234567", bits = 0, value = 0, out = "";
        for (var i = 0; i < s.length; i++) {
            value = (value << 5) | alphabet.indexOf(s[i]);
            bits += 5;
            if (bits >= 8) { out += String.fromCharCode((value >>> (bits - 8)) & 255); bits -= 8; }
        }
        return out;
    }
    "#;

    fn run_encoded_literals(code: &str) -> String {
        run(&EncodedLiterals, code)
    }

    #[test]
    fn test_base32_decoded_and_removed() {
        let output = run_encoded_literals(&format!("{BASE32_DECODER}use(b32(\"JBSWY3DP\"));"));
        assert!(output.contains(r#"use("Hello")"#), "got: {}", output);
        assert!(!output.contains("function b32"), "Decoder should be removed, got: {}", output);
    }

    #[test]
    fn test_ascii85() {
        let output = run_encoded_literals(
            r#"var a85 = function (s) {
                var out = [], n = 0;
                for (var i = 0; i < s.length; i++) { n = n * 85 + (s.charCodeAt(i) - 33); }
                return out.join("");
            };
            use(a85("87cURD]i,\"Ebo80"));"#,
        );
        assert!(output.contains(r#"use("Hello World")"#), "got: {}", output);
    }

    #[test]
    fn test_hex_table() {
        let output = run_encoded_literals(
            r#"function hx(s) {
                var table = "fedcba9876543210", out = "";
                for (var i = 0; i < s.length; i += 2) {
                    out += String.fromCharCode(table.indexOf(s[i]) * 16 + table.indexOf(s[i + 1]));
                }
                return out;
            }
            use(hx("b796"));"#,
        );
        assert!(output.contains(r#"use("Hi")"#), "got: {}", output);
    }

    #[test]
    fn test_undecodable_call_kept() {
        let (output, stats) =
            run_with(&EncodedLiterals, serde_json::Value::Null, &format!("{BASE32_DECODER}use(b32(\"1NVALID\"));"));
        assert!(output.contains(r#"b32("1NVALID")"#), "got: {}", output);
        assert!(output.contains("function b32"), "Decoder is still used, got: {}", output);
        assert_eq!(stats.skipped, 1);
    }

    #[test]
    fn test_non_literal_argument_kept() {
        let output = run_encoded_literals(&format!("{BASE32_DECODER}use(b32(x), b32(\"MZXW6===\"));"));
        assert!(output.contains(r#"use(b32(x), "foo")"#), "got: {}", output);
    }

    #[test]
    fn test_keep_decoders() {
        let (output, _) = run_with(
            &EncodedLiterals,
            json!({ "removeDecoders": false }),
            &format!("{BASE32_DECODER}use(b32(\"JBSWY3DP\"));"),
        );
        assert!(output.contains(r#"use("Hello")"#), "got: {}", output);
        assert!(output.contains("function b32"), "got: {}", output);
    }

    #[test]
    fn test_two_parameter_function_ignored() {
        let code = "function f(s, k) { return \"ABCDEFGHIJKLMNOPQRSTUVWXYZ234567\".indexOf(s) + k; }\nuse(f(\"JBSWY3DP\", 1));";
        let output = run_encoded_literals(code);
        assert!(output.contains(r#"f("JBSWY3DP", 1)"#), "got: {}", output);
    }

    #[test]
    fn test_encoding_decode() {
        assert_eq!(Encoding::HexTable("0123456789abcdef".into()).decode("4869").as_deref(), Some("Hi"));
        assert_eq!(Encoding::Base32.decode("JBSWY3DP").as_deref(), Some("Hello"));
        assert_eq!(Encoding::Ascii85.decode("~~"), None);
    }
}
