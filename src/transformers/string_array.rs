//! String table reconstruction.
//!
//! Obfuscators move every string literal into one array and read it back
//! through a decoder function, often after rotating the array at startup:
//!
//! ```js
//! function _0xt() { var a = ["log", "Hello"]; _0xt = function () { return a; }; return _0xt(); }
//! (function (t, target) {
//!     var d = _0xd, list = t();
//!     while (true) { try { if (parseInt(d(0)) === target) break; list.push(list.shift()); } catch (e) { list.push(list.shift()); } }
//! })(_0xt, 123);
//! function _0xd(i, k) { var t = _0xt(); return _0xd = function (i, k) { i = i - 0; return t[i]; }, _0xd(i, k); }
//! console[_0xd(0)](_0xd(1));
//! ```
//!
//! The table is rotated until the rotator's own check holds, then every
//! decoder call with constant arguments becomes the string it returns. The
//! table, its decoders and its rotator are removed once nothing else uses
//! them. A table that anything outside its decoders and rotator can read or
//! write is left alone.

use lazy_static::lazy_static;
use rustc_hash::FxHashMap;

use oxc_ast::ast::*;
use oxc_ast_visit::{Visit, walk};
use oxc_span::{GetSpan, Span};
use oxc_syntax::operator::{BinaryOperator, UnaryOperator, UpdateOperator};
use oxc_syntax::scope::ScopeFlags;
use oxc_syntax::symbol::SymbolId;

use super::util::{IdentifierScan, Prune};
use crate::TransformError;
use crate::codec::{OBFUSCATOR_BASE64_CHARSET, STANDARD_BASE64_CHARSET, base64_decode, rc4_decode};
use crate::context::Context;
use crate::evaluate::{Constant, binary_op, evaluate_pure, parse_int};
use crate::matcher::{Pattern, matches, matches_expression, matches_statement};
use crate::node::{NodeKey, NodeRef, binding_name, build, member_object, member_property};
use crate::pipeline::{OptionKind, OptionSpec, OptionValues, TransformStats, Transformer};
use crate::scope::ScopeModel;
use crate::traverse::{Action, HookResult, TraverseCtx, Visitor};

/// Largest integer a double holds exactly.
const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_991.0;

const MUTATING_METHODS: &[&str] = &["push", "pop", "shift", "unshift", "splice", "reverse", "sort", "fill", "copyWithin"];

lazy_static! {
    /// `var a = [...]; F = function () { return a; }; return F();`
    static ref FACTORY_BODY: Pattern = Pattern::node("BlockStatement").with(
        "body",
        Pattern::exact([
            Pattern::node("VariableDeclaration").with(
                "declarations",
                Pattern::exact([Pattern::node("VariableDeclarator")
                    .with("id", Pattern::extract("array"))
                    .with("init", Pattern::extract_as("strings", Pattern::node("ArrayExpression")))]),
            ),
            Pattern::node("ExpressionStatement").with(
                "expression",
                assignment(
                    Pattern::extract("factory"),
                    Pattern::node("FunctionExpression").with(
                        "body",
                        Pattern::node("BlockStatement").with(
                            "body",
                            Pattern::exact([Pattern::node("ReturnStatement").with("argument", Pattern::extract("array"))]),
                        ),
                    ),
                ),
            ),
            Pattern::node("ReturnStatement")
                .with("argument", Pattern::call(Pattern::extract("factory"), Pattern::exact([]))),
        ]),
    );

    /// `return D = function (i, k) { ... }, D(i, k);`
    static ref SELF_REPLACING_RETURN: Pattern = Pattern::node("ReturnStatement").with(
        "argument",
        Pattern::node("SequenceExpression").with(
            "expressions",
            Pattern::exact([
                assignment(
                    Pattern::extract("decoder"),
                    Pattern::extract_as("inner", Pattern::node("FunctionExpression")),
                ),
                Pattern::call(Pattern::extract("decoder"), Pattern::Any),
            ]),
        ),
    );

    /// `i`, `i + N` or `i - N`.
    static ref SHIFTED_INDEX: Pattern = Pattern::either([
        Pattern::extract_as("index", Pattern::node("Identifier")),
        Pattern::node("BinaryExpression")
            .with("operator", Pattern::extract("operator"))
            .with("left", Pattern::extract_as("index", Pattern::node("Identifier")))
            .with("right", Pattern::extract("delta")),
    ]);

    /// `i = i - N`, `i -= N`, `i += N`.
    static ref OFFSET_ASSIGNMENT: Pattern = Pattern::node("ExpressionStatement").with(
        "expression",
        Pattern::node("AssignmentExpression")
            .with("operator", Pattern::extract("operator"))
            .with("left", Pattern::extract_as("index", Pattern::node("Identifier")))
            .with("right", Pattern::extract("value")),
    );

    /// `(function (table, target) { ... })(T, N);`
    static ref ROTATOR_CALL: Pattern = Pattern::node("ExpressionStatement").with(
        "expression",
        Pattern::call(
            Pattern::extract_as("rotator", Pattern::node("FunctionExpression")),
            Pattern::exact([Pattern::extract_as("table", Pattern::node("Identifier")), Pattern::extract("target")]),
        ),
    );

    /// `list.push(list.shift())`
    static ref PUSH_SHIFT: Pattern = Pattern::call(
        Pattern::member(Pattern::extract("list"), "push"),
        Pattern::exact([Pattern::call(Pattern::member(Pattern::extract("list"), "shift"), Pattern::exact([]))]),
    );
}

fn assignment(left: Pattern, right: Pattern) -> Pattern {
    Pattern::node("AssignmentExpression")
        .with("operator", Pattern::str("="))
        .with("left", left)
        .with("right", right)
}

const OPTIONS: &[OptionSpec] = &[
    OptionSpec::new(
        "rotationMultiplier",
        OptionKind::Integer {
            default: 2,
            min: 1,
            max: 16,
        },
        "Rotations tried before giving up, as a multiple of the table length",
    ),
    OptionSpec::new(
        "removeDeadCode",
        OptionKind::Bool { default: true },
        "Remove the table, decoders and rotator once no call site needs them",
    ),
];

pub struct StringArray;

impl Transformer for StringArray {
    fn name(&self) -> &'static str {
        "string-array"
    }

    fn description(&self) -> &'static str {
        "Replaces string table decoder calls with the strings they return"
    }

    fn options(&self) -> &'static [OptionSpec] {
        OPTIONS
    }

    fn run(&self, cx: &mut Context<'_>, options: &OptionValues) -> crate::Result<TransformStats> {
        let multiplier = options.integer("rotationMultiplier").unwrap_or(2).max(1) as usize;
        let remove_dead_code = options.bool("removeDeadCode").unwrap_or(true);

        cx.crawl();
        let mut groups = collect_groups(&cx.program, cx.scope());
        if groups.is_empty() {
            return Ok(TransformStats::default());
        }

        let mut stats = TransformStats::default();
        groups.retain(|group| {
            let sealed = group.is_sealed(cx.scope());
            if !sealed {
                log::warn!("string table {} is used outside its decoders, leaving it", group.table.name);
                stats.skipped += 1;
            }
            sealed
        });

        for group in &mut groups {
            if let Err(err) = group.rotate(multiplier) {
                log::warn!("string table {}: {err}", group.table.name);
                stats.skipped += 1;
            }
        }

        let mut replacer = CallSiteReplacer::new(&groups);
        let report = cx.traverse(&mut replacer);
        stats.changes += replacer.replaced;
        stats.skipped += replacer.refused + report.errors;
        log::info!("decoded {} string table reads", replacer.replaced);

        if remove_dead_code {
            cx.crawl();
            let mut prune = Prune::new();
            for group in groups.iter().filter(|group| group.ready && group.is_dead(cx.scope())) {
                log::debug!("removing string table {}", group.table.name);
                for span in group.region() {
                    prune.mark(span);
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

/// How a decoder turns a table entry into the string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeKind {
    Simple,
    Base64 { charset: String },
    Rc4 { charset: String },
}

#[derive(Debug)]
struct StringTable {
    name: String,
    symbol: SymbolId,
    identifier: Span,
    declaration: Span,
    strings: Vec<String>,
}

#[derive(Debug)]
struct Decoder {
    name: String,
    symbol: SymbolId,
    identifier: Span,
    declaration: Span,
    table: SymbolId,
    offset: i64,
    kind: DecodeKind,
}

impl Decoder {
    fn decode(&self, strings: &[String], index: f64, key: Option<&str>) -> Option<String> {
        let raw = strings.get(table_position(index, self.offset)?)?;
        match &self.kind {
            DecodeKind::Simple => Some(raw.clone()),
            DecodeKind::Base64 { charset } => base64_decode(raw, charset),
            DecodeKind::Rc4 { charset } => rc4_decode(raw, key?, charset),
        }
    }
}

/// Entry a decoder reads for `index` after shifting it by `offset`.
fn table_position(index: f64, offset: i64) -> Option<usize> {
    if !index.is_finite() || index.fract() != 0.0 || index.abs() > MAX_SAFE_INTEGER {
        return None;
    }
    usize::try_from((index as i64).checked_add(offset)?).ok()
}

/// `var d = decoder;`
#[derive(Debug)]
struct Alias {
    symbol: SymbolId,
    identifier: Span,
    declaration: Span,
    target: SymbolId,
}

#[derive(Debug)]
struct Rotator {
    table: SymbolId,
    statement: Span,
    /// None when the loop was recognised but its stop condition was not.
    check: Option<RotationCheck>,
}

#[derive(Debug)]
enum RotationCheck {
    /// Rotate until `expr` evaluates to `target`.
    Expression {
        expr: RotationExpr,
        target: f64,
        aliases: FxHashMap<String, String>,
    },
    /// Rotate a fixed number of times.
    Count(usize),
}

/// The arithmetic a rotator compares against its target.
#[derive(Debug, Clone, PartialEq)]
enum RotationExpr {
    Number(f64),
    Negate(Box<RotationExpr>),
    Plus(Box<RotationExpr>),
    Binary(BinaryOperator, Box<RotationExpr>, Box<RotationExpr>),
    ParseInt(Box<RotationExpr>),
    Decode { callee: String, index: f64, key: Option<String> },
}

impl RotationExpr {
    fn compile(expr: &Expression<'_>) -> Option<Self> {
        match expr.without_parentheses() {
            Expression::NumericLiteral(lit) => Some(Self::Number(lit.value)),
            Expression::UnaryExpression(unary) => {
                let argument = Box::new(Self::compile(&unary.argument)?);
                match unary.operator {
                    UnaryOperator::UnaryNegation => Some(Self::Negate(argument)),
                    UnaryOperator::UnaryPlus => Some(Self::Plus(argument)),
                    _ => None,
                }
            }
            Expression::BinaryExpression(binary) => match binary.operator {
                BinaryOperator::Addition
                | BinaryOperator::Subtraction
                | BinaryOperator::Multiplication
                | BinaryOperator::Division
                | BinaryOperator::Remainder => Some(Self::Binary(
                    binary.operator,
                    Box::new(Self::compile(&binary.left)?),
                    Box::new(Self::compile(&binary.right)?),
                )),
                _ => None,
            },
            Expression::CallExpression(call) => {
                let Expression::Identifier(callee) = &call.callee else {
                    return None;
                };
                if callee.name == "parseInt" {
                    let [argument] = call.arguments.as_slice() else {
                        return None;
                    };
                    return Some(Self::ParseInt(Box::new(Self::compile(argument.as_expression()?)?)));
                }
                let (index, key) = match call.arguments.as_slice() {
                    [index] => (index, None),
                    [index, key] => (index, Some(key)),
                    _ => return None,
                };
                let index = evaluate_pure(index.as_expression()?)?.as_number()?;
                let key = match key.map(|key| key.as_expression()) {
                    None => None,
                    Some(Some(Expression::StringLiteral(lit))) => Some(lit.value.to_string()),
                    Some(_) => return None,
                };
                Some(Self::Decode {
                    callee: callee.name.to_string(),
                    index,
                    key,
                })
            }
            _ => None,
        }
    }

    fn value(&self, strings: &[String], decoders: &[Decoder], aliases: &FxHashMap<String, String>) -> Constant {
        let number = |expr: &Self| expr.value(strings, decoders, aliases).to_number();
        match self {
            Self::Number(n) => Constant::Number(*n),
            Self::Negate(argument) => Constant::Number(-number(&**argument)),
            Self::Plus(argument) => Constant::Number(number(&**argument)),
            Self::Binary(op, left, right) => binary_op(
                *op,
                &left.value(strings, decoders, aliases),
                &right.value(strings, decoders, aliases),
            )
            .unwrap_or(Constant::Number(f64::NAN)),
            Self::ParseInt(argument) => {
                Constant::Number(parse_int(&argument.value(strings, decoders, aliases).to_js_string()))
            }
            Self::Decode { callee, index, key } => {
                let name = aliases.get(callee).unwrap_or(callee);
                decoders
                    .iter()
                    .find(|decoder| &decoder.name == name)
                    .and_then(|decoder| decoder.decode(strings, *index, key.as_deref()))
                    .map_or(Constant::Undefined, Constant::String)
            }
        }
    }
}

/// Rotates `strings` left one entry at a time until `satisfied` holds,
/// trying at most `bound` rotations. Returns the rotations applied, or
/// `None` with `strings` unchanged.
pub fn rotate_until(strings: &mut Vec<String>, bound: usize, satisfied: impl Fn(&[String]) -> bool) -> Option<usize> {
    if strings.is_empty() {
        return None;
    }
    let original = strings.clone();
    for rotations in 0..=bound {
        if satisfied(strings) {
            return Some(rotations);
        }
        strings.rotate_left(1);
    }
    *strings = original;
    None
}

/// A table with its decoders, their aliases and its rotator.
#[derive(Debug)]
struct StringGroup {
    table: StringTable,
    decoders: Vec<Decoder>,
    aliases: Vec<Alias>,
    rotator: Option<Rotator>,
    /// Set once the table is in the order its decoders expect.
    ready: bool,
}

impl StringGroup {
    fn rotate(&mut self, multiplier: usize) -> Result<(), TransformError> {
        let Some(rotator) = &self.rotator else {
            self.ready = true;
            return Ok(());
        };
        let len = self.table.strings.len();
        match &rotator.check {
            None => return Err(TransformError::Shape("rotator without a recognisable stop condition")),
            Some(RotationCheck::Count(count)) => {
                if len > 0 {
                    self.table.strings.rotate_left(count % len);
                }
                log::debug!("rotated {} by a fixed {count}", self.table.name);
            }
            Some(RotationCheck::Expression { expr, target, aliases }) => {
                let bound = multiplier * len;
                let decoders = &self.decoders;
                let rotations = rotate_until(&mut self.table.strings, bound, |strings| {
                    expr.value(strings, decoders, aliases).to_number() == *target
                })
                .ok_or(TransformError::BoundExceeded {
                    what: "string table rotation",
                    bound,
                })?;
                log::debug!("rotated {} {rotations} times", self.table.name);
            }
        }
        self.ready = true;
        Ok(())
    }

    /// Statements and declarators that make up the group.
    fn region(&self) -> Vec<Span> {
        let mut spans = vec![self.table.declaration];
        spans.extend(self.decoders.iter().map(|decoder| decoder.declaration));
        spans.extend(self.aliases.iter().map(|alias| alias.declaration));
        spans.extend(self.rotator.iter().map(|rotator| rotator.statement));
        spans
    }

    /// True when the table can only change through the rotator: its one
    /// write is a factory replacing itself, and every read of it sits in a
    /// decoder or the rotator.
    fn is_sealed(&self, scope: &ScopeModel) -> bool {
        let Some(binding) = scope.binding_at(self.table.identifier) else {
            return false;
        };
        let declaration = NodeKey::of(self.table.declaration);
        let readers: Vec<NodeKey> = std::iter::once(declaration)
            .chain(self.decoders.iter().map(|decoder| NodeKey::of(decoder.declaration)))
            .chain(self.rotator.iter().map(|rotator| NodeKey::of(rotator.statement)))
            .collect();

        binding
            .constant_violations
            .iter()
            .all(|site| declaration.contains(NodeKey::of(*site)))
            && binding
                .references
                .iter()
                .all(|site| readers.iter().any(|outer| outer.contains(NodeKey::of(*site))))
    }

    /// True when the group's own names are only used inside the group.
    fn is_dead(&self, scope: &ScopeModel) -> bool {
        let region: Vec<NodeKey> = self.region().into_iter().map(NodeKey::of).collect();
        let members = std::iter::once(self.table.identifier)
            .chain(self.decoders.iter().map(|decoder| decoder.identifier))
            .chain(self.aliases.iter().map(|alias| alias.identifier));
        members.into_iter().all(|identifier| {
            scope.binding_at(identifier).is_some_and(|binding| {
                binding
                    .references
                    .iter()
                    .all(|reference| region.iter().any(|outer| outer.contains(NodeKey::of(*reference))))
            })
        })
    }
}

fn collect_groups(program: &Program<'_>, scope: &ScopeModel) -> Vec<StringGroup> {
    let mut collector = Collector {
        scope,
        tables: Vec::new(),
        decoders: Vec::new(),
        aliases: Vec::new(),
        rotators: Vec::new(),
    };
    collector.visit_program(program);

    let mut groups: Vec<StringGroup> = collector
        .tables
        .into_iter()
        .map(|table| StringGroup {
            table,
            decoders: Vec::new(),
            aliases: Vec::new(),
            rotator: None,
            ready: false,
        })
        .collect();

    for decoder in collector.decoders {
        if let Some(group) = groups.iter_mut().find(|group| group.table.symbol == decoder.table) {
            group.decoders.push(decoder);
        }
    }
    for alias in collector.aliases {
        let owner = groups
            .iter_mut()
            .find(|group| group.decoders.iter().any(|decoder| decoder.symbol == alias.target));
        if let Some(group) = owner {
            group.aliases.push(alias);
        }
    }
    for rotator in collector.rotators {
        if let Some(group) = groups.iter_mut().find(|group| group.table.symbol == rotator.table) {
            if group.rotator.is_some() {
                log::debug!("string table {} has more than one rotator", group.table.name);
                continue;
            }
            group.rotator = Some(rotator);
        }
    }

    groups.retain(|group| !group.decoders.is_empty());
    for group in &groups {
        log::debug!(
            "string table {}: {} entries, {} decoders, rotator: {}",
            group.table.name,
            group.table.strings.len(),
            group.decoders.len(),
            group.rotator.is_some()
        );
    }
    groups
}

struct Collector<'s> {
    scope: &'s ScopeModel,
    tables: Vec<StringTable>,
    decoders: Vec<Decoder>,
    aliases: Vec<Alias>,
    rotators: Vec<Rotator>,
}

impl Collector<'_> {
    fn consider_function(&mut self, id: &BindingIdentifier<'_>, func: &Function<'_>, declaration: Span) {
        let Some(binding) = self.scope.binding_at(id.span) else {
            return;
        };
        let (symbol, identifier) = (binding.symbol_id, id.span);

        if let Some(strings) = factory_strings(&id.name, func) {
            self.tables.push(StringTable {
                name: id.name.to_string(),
                symbol,
                identifier,
                declaration,
                strings,
            });
            return;
        }

        let Some(shape) = decoder_shape(func) else {
            return;
        };
        let Some(table) = self.scope.binding_at(shape.table) else {
            return;
        };
        let mut writes = TableWrites {
            scope: self.scope,
            table: table.symbol_id,
            found: false,
        };
        if let Some(body) = &func.body {
            writes.visit_function_body(body);
        }
        if writes.found {
            log::debug!("{} writes to its table, not a decoder", id.name);
            return;
        }
        self.decoders.push(Decoder {
            name: id.name.to_string(),
            symbol,
            identifier,
            declaration,
            table: table.symbol_id,
            offset: shape.offset,
            kind: shape.kind,
        });
    }
}

impl<'a> Visit<'a> for Collector<'_> {
    fn visit_function(&mut self, it: &Function<'a>, flags: ScopeFlags) {
        if matches!(it.r#type, FunctionType::FunctionDeclaration)
            && let Some(id) = &it.id
        {
            self.consider_function(id, it, it.span);
        }
        walk::walk_function(self, it, flags);
    }

    fn visit_variable_declarator(&mut self, it: &VariableDeclarator<'a>) {
        if let BindingPattern::BindingIdentifier(id) = &it.id
            && let Some(init) = &it.init
        {
            match init.without_parentheses() {
                Expression::ArrayExpression(array) => {
                    if let (Some(strings), Some(binding)) = (string_elements(array), self.scope.binding_at(id.span)) {
                        self.tables.push(StringTable {
                            name: id.name.to_string(),
                            symbol: binding.symbol_id,
                            identifier: id.span,
                            declaration: it.span,
                            strings,
                        });
                    }
                }
                Expression::FunctionExpression(func) => self.consider_function(id, func, it.span),
                Expression::Identifier(target) => {
                    if let (Some(alias), Some(target)) =
                        (self.scope.binding_at(id.span), self.scope.binding_at(target.span))
                        && alias.violation_count() == 0
                    {
                        self.aliases.push(Alias {
                            symbol: alias.symbol_id,
                            identifier: id.span,
                            declaration: it.span,
                            target: target.symbol_id,
                        });
                    }
                }
                _ => {}
            }
        }
        walk::walk_variable_declarator(self, it);
    }

    fn visit_statement(&mut self, it: &Statement<'a>) {
        if let Some(rotator) = rotator(it, self.scope) {
            self.rotators.push(rotator);
        }
        walk::walk_statement(self, it);
    }
}

/// `["a", "b", ...]` with string elements only.
fn string_elements(array: &ArrayExpression<'_>) -> Option<Vec<String>> {
    if array.elements.is_empty() {
        return None;
    }
    array
        .elements
        .iter()
        .map(|element| match element {
            ArrayExpressionElement::StringLiteral(lit) => Some(lit.value.to_string()),
            _ => None,
        })
        .collect()
}

/// `function F() { var a = [...]; F = function () { return a; }; return F(); }`
fn factory_strings(name: &str, func: &Function<'_>) -> Option<Vec<String>> {
    let body = func.body.as_ref()?;
    let captures = matches(NodeRef::FunctionBody(body), &FACTORY_BODY)?;
    if !(captures.all_equal("array") && captures.all_equal("factory") && captures.str("factory") == Some(name)) {
        return None;
    }
    match captures.expression("strings")? {
        Expression::ArrayExpression(array) => string_elements(array),
        _ => None,
    }
}

struct DecoderShape {
    /// The table reference the decoder indexes.
    table: Span,
    offset: i64,
    kind: DecodeKind,
}

/// Recognises a decoder and reads off its table, offset and encoding.
fn decoder_shape(func: &Function<'_>) -> Option<DecoderShape> {
    let body = func.body.as_ref()?;

    // `var t = F(); return D = function (i, k) { ... }, D(i, k);`
    let mut table_aliases: FxHashMap<String, Span> = FxHashMap::default();
    let (params, statements) = match inner_decoder(&body.statements) {
        Some(inner) => {
            for stmt in &body.statements {
                let Statement::VariableDeclaration(decl) = stmt else {
                    continue;
                };
                for declarator in &decl.declarations {
                    if let (Some(name), Some(source)) = (binding_name(&declarator.id), &declarator.init)
                        && let Some(span) = table_source(source)
                    {
                        table_aliases.insert(name.to_string(), span);
                    }
                }
            }
            (&inner.params, &inner.body.as_ref()?.statements)
        }
        None => (&func.params, &body.statements),
    };

    let index = params.items.first().and_then(|param| binding_name(&param.pattern))?;
    let key = params.items.get(1).and_then(|param| binding_name(&param.pattern));

    let mut offset: i64 = 0;
    for stmt in statements.iter() {
        if let Some(delta) = offset_assignment(stmt, index) {
            offset = offset.checked_add(delta)?;
        }
    }

    let mut access = TableAccess {
        index,
        found: None,
    };
    access.visit_statements(statements);
    let (object, inline_offset) = access.found?;
    let table = match object {
        TableObject::Identifier(name, span) => table_aliases.get(&name).copied().unwrap_or(span),
        TableObject::Call(span) => span,
    };
    let offset = offset.checked_add(inline_offset)?;

    let mut literals = StringLiterals::default();
    literals.visit_function_body(body);
    let scan = IdentifierScan::of_statements(statements);
    let charset = literals
        .values
        .into_iter()
        .find(|value| is_charset(value))
        .or_else(|| IdentifierScan::of_statements(&body.statements).mentions("atob").then(|| STANDARD_BASE64_CHARSET.to_string()));

    let kind = match charset {
        Some(charset) if key.is_some_and(|key| scan.count(key) > 0) => DecodeKind::Rc4 { charset },
        Some(charset) => DecodeKind::Base64 { charset },
        None if plain_lookup(statements, index) => DecodeKind::Simple,
        None => return None,
    };
    Some(DecoderShape { table, offset, kind })
}

fn inner_decoder<'b, 'a>(statements: &'b [Statement<'a>]) -> Option<&'b Function<'a>> {
    let captures = matches_statement(statements.last()?, &SELF_REPLACING_RETURN)?;
    if !captures.all_equal("decoder") {
        return None;
    }
    captures.function("inner")
}

/// `F()` or `t`, as the table a local may stand for.
fn table_source(expr: &Expression<'_>) -> Option<Span> {
    match expr.without_parentheses() {
        Expression::Identifier(ident) => Some(ident.span),
        Expression::CallExpression(call) if call.arguments.is_empty() => match &call.callee {
            Expression::Identifier(callee) => Some(callee.span),
            _ => None,
        },
        _ => None,
    }
}

/// `i = i - N`, `i -= N` and their additive forms.
fn offset_assignment(stmt: &Statement<'_>, index: &str) -> Option<i64> {
    let captures = matches_statement(stmt, &OFFSET_ASSIGNMENT)?;
    if captures.str("index") != Some(index) {
        return None;
    }
    let value = captures.expression("value")?;
    match captures.str("operator")? {
        "=" => index_offset(value, index),
        "-=" => integer(value)?.checked_neg(),
        "+=" => integer(value),
        _ => None,
    }
}

/// `i`, `i - N` or `i + N` as the offset applied to `i`.
fn index_offset(expr: &Expression<'_>, index: &str) -> Option<i64> {
    let captures = matches_expression(expr, &SHIFTED_INDEX)?;
    if captures.str("index") != Some(index) {
        return None;
    }
    match captures.str("operator") {
        None => Some(0),
        Some("+") => integer(captures.expression("delta")?),
        Some("-") => integer(captures.expression("delta")?)?.checked_neg(),
        Some(_) => None,
    }
}

fn integer(expr: &Expression<'_>) -> Option<i64> {
    let n = evaluate_pure(expr)?.as_number()?;
    (n.fract() == 0.0 && n.abs() <= MAX_SAFE_INTEGER).then_some(n as i64)
}

fn is_charset(value: &str) -> bool {
    value.len() == OBFUSCATOR_BASE64_CHARSET.len()
        && value.is_ascii()
        && value.bytes().enumerate().all(|(i, b)| !value.as_bytes()[..i].contains(&b))
}

/// Without an encoding the body may only shift the index, read the table and
/// return the entry.
fn plain_lookup(statements: &[Statement<'_>], index: &str) -> bool {
    statements.iter().all(|stmt| match stmt {
        Statement::ExpressionStatement(_) => offset_assignment(stmt, index).is_some(),
        Statement::VariableDeclaration(decl) => decl.declarations.iter().all(|declarator| {
            matches!(
                declarator.init.as_ref().map(|init| init.without_parentheses()),
                Some(Expression::ComputedMemberExpression(_) | Expression::CallExpression(_) | Expression::Identifier(_))
            )
        }),
        Statement::ReturnStatement(ret) => matches!(
            ret.argument.as_ref().map(|arg| arg.without_parentheses()),
            Some(Expression::Identifier(_) | Expression::ComputedMemberExpression(_))
        ),
        _ => false,
    })
}

enum TableObject {
    Identifier(String, Span),
    Call(Span),
}

/// First `T[i]`, `T[i - N]` or `F()[i]` in a decoder body.
struct TableAccess<'n> {
    index: &'n str,
    found: Option<(TableObject, i64)>,
}

impl<'a> Visit<'a> for TableAccess<'_> {
    fn visit_computed_member_expression(&mut self, it: &ComputedMemberExpression<'a>) {
        if self.found.is_none()
            && let Some(offset) = index_offset(&it.expression, self.index)
        {
            let object = match it.object.without_parentheses() {
                Expression::Identifier(ident) => Some(TableObject::Identifier(ident.name.to_string(), ident.span)),
                Expression::CallExpression(call) if call.arguments.is_empty() => match &call.callee {
                    Expression::Identifier(callee) => Some(TableObject::Call(callee.span)),
                    _ => None,
                },
                _ => None,
            };
            if let Some(object) = object {
                self.found = Some((object, offset));
                return;
            }
        }
        walk::walk_computed_member_expression(self, it);
    }
}

/// Writes through the table binding: `T[i] = v`, `T[i]++`, `delete T[i]`
/// and the mutating array methods.
struct TableWrites<'s> {
    scope: &'s ScopeModel,
    table: SymbolId,
    found: bool,
}

impl TableWrites<'_> {
    fn is_table(&self, expr: &Expression<'_>) -> bool {
        matches!(
            expr.without_parentheses(),
            Expression::Identifier(ident)
                if self.scope.binding_at(ident.span).is_some_and(|binding| binding.symbol_id == self.table)
        )
    }
}

impl<'a> Visit<'a> for TableWrites<'_> {
    fn visit_assignment_expression(&mut self, it: &AssignmentExpression<'a>) {
        if let Some(member) = it.left.as_member_expression()
            && self.is_table(member.object())
        {
            self.found = true;
        }
        walk::walk_assignment_expression(self, it);
    }

    fn visit_update_expression(&mut self, it: &UpdateExpression<'a>) {
        if let Some(member) = it.argument.as_member_expression()
            && self.is_table(member.object())
        {
            self.found = true;
        }
        walk::walk_update_expression(self, it);
    }

    fn visit_unary_expression(&mut self, it: &UnaryExpression<'a>) {
        if it.operator == UnaryOperator::Delete
            && member_object(&it.argument).is_some_and(|object| self.is_table(object))
        {
            self.found = true;
        }
        walk::walk_unary_expression(self, it);
    }

    fn visit_call_expression(&mut self, it: &CallExpression<'a>) {
        let mutates = member_property(&it.callee).is_some_and(|name| MUTATING_METHODS.contains(&name));
        if mutates && member_object(&it.callee).is_some_and(|object| self.is_table(object)) {
            self.found = true;
        }
        walk::walk_call_expression(self, it);
    }
}

#[derive(Default)]
struct StringLiterals {
    values: Vec<String>,
}

impl<'a> Visit<'a> for StringLiterals {
    fn visit_string_literal(&mut self, it: &StringLiteral<'a>) {
        self.values.push(it.value.to_string());
    }
}

/// `(function (table, target) { ...list.push(list.shift())... })(T, N);`
fn rotator(stmt: &Statement<'_>, scope: &ScopeModel) -> Option<Rotator> {
    let captures = matches_statement(stmt, &ROTATOR_CALL)?;
    let func = captures.function("rotator")?;
    let table = scope.binding_at(captures.span("table")?)?.symbol_id;
    let body = func.body.as_ref()?;

    let mut facts = RotatorFacts::default();
    facts.visit_function_body(body);
    if !facts.rotates {
        return None;
    }

    let target = captures.expression("target").and_then(evaluate_pure).and_then(|c| c.as_number());
    let counter = func.params.items.get(1).and_then(|param| binding_name(&param.pattern));
    let check = match (facts.parse_int.take(), target) {
        (Some(expr), Some(target)) => Some(RotationCheck::Expression {
            expr,
            target,
            aliases: facts.aliases,
        }),
        (Some(_), None) => None,
        (None, _) => rotation_count(&facts, counter, target).map(RotationCheck::Count),
    };
    Some(Rotator {
        table,
        statement: stmt.span(),
        check,
    })
}

/// Fixed rotations of a `f(++n)` or `f(K)` call into a `while (--c)` loop.
fn rotation_count(facts: &RotatorFacts, counter: Option<&str>, target: Option<f64>) -> Option<usize> {
    let passed = match facts.count_argument.as_ref()? {
        CountArgument::Literal(k) => *k,
        CountArgument::Increment(name) if counter == Some(name.as_str()) => target? + 1.0,
        CountArgument::Increment(_) => return None,
    };
    let runs = if facts.decrement_prefix? { passed - 1.0 } else { passed };
    (runs.is_finite() && runs >= 0.0 && runs.fract() == 0.0).then_some(runs as usize)
}

enum CountArgument {
    Literal(f64),
    Increment(String),
}

#[derive(Default)]
struct RotatorFacts {
    rotates: bool,
    parse_int: Option<RotationExpr>,
    aliases: FxHashMap<String, String>,
    count_argument: Option<CountArgument>,
    decrement_prefix: Option<bool>,
}

impl RotatorFacts {
    fn consider_check(&mut self, expr: &Expression<'_>) {
        if self.parse_int.is_none() && IdentifierScan::of_expression(expr).mentions("parseInt") {
            self.parse_int = RotationExpr::compile(expr);
        }
    }
}

impl<'a> Visit<'a> for RotatorFacts {
    fn visit_expression(&mut self, it: &Expression<'a>) {
        if !self.rotates && matches_expression(it, &PUSH_SHIFT).is_some_and(|captures| captures.all_equal("list")) {
            self.rotates = true;
        }
        walk::walk_expression(self, it);
    }

    fn visit_variable_declarator(&mut self, it: &VariableDeclarator<'a>) {
        if let (Some(name), Some(init)) = (binding_name(&it.id), &it.init) {
            match init.without_parentheses() {
                Expression::Identifier(target) => {
                    self.aliases.insert(name.to_string(), target.name.to_string());
                }
                init => self.consider_check(init),
            }
        }
        walk::walk_variable_declarator(self, it);
    }

    fn visit_assignment_expression(&mut self, it: &AssignmentExpression<'a>) {
        self.consider_check(&it.right);
        walk::walk_assignment_expression(self, it);
    }

    fn visit_binary_expression(&mut self, it: &BinaryExpression<'a>) {
        // `if (parseInt(...) === target) break;`
        if matches!(it.operator, BinaryOperator::StrictEquality | BinaryOperator::Equality) {
            self.consider_check(&it.left);
        }
        walk::walk_binary_expression(self, it);
    }

    fn visit_call_expression(&mut self, it: &CallExpression<'a>) {
        if self.count_argument.is_none()
            && matches!(it.callee, Expression::Identifier(_))
            && let [argument] = it.arguments.as_slice()
        {
            match argument.as_expression().map(|arg| arg.without_parentheses()) {
                Some(Expression::UpdateExpression(update))
                    if update.prefix && update.operator == UpdateOperator::Increment =>
                {
                    if let SimpleAssignmentTarget::AssignmentTargetIdentifier(ident) = &update.argument {
                        self.count_argument = Some(CountArgument::Increment(ident.name.to_string()));
                    }
                }
                Some(Expression::NumericLiteral(lit)) => self.count_argument = Some(CountArgument::Literal(lit.value)),
                _ => {}
            }
        }
        walk::walk_call_expression(self, it);
    }

    fn visit_while_statement(&mut self, it: &WhileStatement<'a>) {
        if let Expression::UpdateExpression(update) = it.test.without_parentheses()
            && update.operator == UpdateOperator::Decrement
        {
            self.decrement_prefix.get_or_insert(update.prefix);
        }
        walk::walk_while_statement(self, it);
    }
}

/// Replaces decoder calls with constant arguments by the decoded string.
struct CallSiteReplacer<'g> {
    groups: &'g [StringGroup],
    /// Decoder or alias symbol to (group, decoder).
    callees: FxHashMap<SymbolId, (usize, usize)>,
    protected: Vec<NodeKey>,
    replaced: usize,
    refused: usize,
}

impl<'g> CallSiteReplacer<'g> {
    fn new(groups: &'g [StringGroup]) -> Self {
        let mut callees = FxHashMap::default();
        let mut protected = Vec::new();
        for (g, group) in groups.iter().enumerate().filter(|(_, group)| group.ready) {
            for (d, decoder) in group.decoders.iter().enumerate() {
                callees.insert(decoder.symbol, (g, d));
                protected.push(NodeKey::of(decoder.declaration));
            }
            for alias in &group.aliases {
                if let Some(d) = group.decoders.iter().position(|decoder| decoder.symbol == alias.target) {
                    callees.insert(alias.symbol, (g, d));
                }
            }
            protected.extend(group.rotator.iter().map(|rotator| NodeKey::of(rotator.statement)));
            protected.push(NodeKey::of(group.table.declaration));
        }
        Self {
            groups,
            callees,
            protected,
            replaced: 0,
            refused: 0,
        }
    }
}

impl<'a> Visitor<'a> for CallSiteReplacer<'_> {
    fn exit_expression(&mut self, expr: &mut Expression<'a>, ctx: &mut TraverseCtx<'_, 'a>) -> HookResult {
        let Expression::CallExpression(call) = expr else {
            return Ok(Action::Continue);
        };
        let Expression::Identifier(callee) = &call.callee else {
            return Ok(Action::Continue);
        };
        let Some(&(g, d)) = ctx.scope().binding_at(callee.span).and_then(|binding| self.callees.get(&binding.symbol_id))
        else {
            return Ok(Action::Continue);
        };
        let site = NodeKey::of(call.span);
        if self.protected.iter().any(|outer| outer.contains(site)) {
            return Ok(Action::Continue);
        }

        let group = &self.groups[g];
        let decoder = &group.decoders[d];
        let index = match call.arguments.first().and_then(|arg| arg.as_expression()).and_then(evaluate_pure) {
            Some(Constant::Number(n)) => n,
            Some(Constant::String(s)) => Constant::String(s).to_number(),
            _ => return Ok(Action::Continue),
        };
        let key = match call.arguments.get(1).map(|arg| arg.as_expression()) {
            None => None,
            Some(Some(Expression::StringLiteral(lit))) => Some(lit.value.to_string()),
            Some(_) => return Ok(Action::Continue),
        };

        match decoder.decode(&group.table.strings, index, key.as_deref()) {
            Some(value) => {
                *expr = build::string(ctx.ast, &value);
                self.replaced += 1;
                Ok(Action::Replaced)
            }
            None => {
                log::debug!("{}({index}) at {:?} did not decode", decoder.name, expr.span());
                self.refused += 1;
                Ok(Action::Continue)
            }
        }
    }
}
