use std::sync::{Arc, Mutex};

use js_deobfuscate_rs::node::build;
use js_deobfuscate_rs::pipeline::OptionSpec;
use js_deobfuscate_rs::transformers::DEFAULT_ORDER;
use js_deobfuscate_rs::{
    Context, DeobfuscateError, OptionValues, Options, Pipeline, TransformStats, Transformer, TransformerConfig,
    TransformerRegistry, deobfuscate,
};
use oxc_allocator::Allocator;
use serde_json::json;

/// Appends its name to a shared log every time it runs.
struct Recorder {
    name: &'static str,
    log: Arc<Mutex<Vec<&'static str>>>,
}

impl Transformer for Recorder {
    fn name(&self) -> &'static str {
        self.name
    }

    fn description(&self) -> &'static str {
        "Records that it ran"
    }

    fn options(&self) -> &'static [OptionSpec] {
        &[]
    }

    fn run(&self, _cx: &mut Context<'_>, _options: &OptionValues) -> js_deobfuscate_rs::Result<TransformStats> {
        self.log.lock().expect("log lock").push(self.name);
        Ok(TransformStats::changed(1))
    }
}

fn recording_registry(names: &[&'static str]) -> (TransformerRegistry, Arc<Mutex<Vec<&'static str>>>) {
    let log = Arc::new(Mutex::new(Vec::new()));
    let mut registry = TransformerRegistry::empty();
    for &name in names {
        registry
            .register(Box::new(Recorder {
                name,
                log: Arc::clone(&log),
            }))
            .expect("unique names");
    }
    (registry, log)
}

/// Appends `__marker;` to the program.
struct MarkerWriter;

impl Transformer for MarkerWriter {
    fn name(&self) -> &'static str {
        "marker-writer"
    }

    fn description(&self) -> &'static str {
        "Appends a marker statement"
    }

    fn options(&self) -> &'static [OptionSpec] {
        &[]
    }

    fn run(&self, cx: &mut Context<'_>, _options: &OptionValues) -> js_deobfuscate_rs::Result<TransformStats> {
        let marker = build::expression_statement(cx.ast, build::identifier(cx.ast, "__marker"));
        cx.program.body.push(marker);
        Ok(TransformStats::changed(1))
    }
}

/// Fails unless an earlier pass left the marker behind.
struct MarkerChecker;

impl Transformer for MarkerChecker {
    fn name(&self) -> &'static str {
        "marker-checker"
    }

    fn description(&self) -> &'static str {
        "Requires the marker statement"
    }

    fn options(&self) -> &'static [OptionSpec] {
        &[]
    }

    fn run(&self, cx: &mut Context<'_>, _options: &OptionValues) -> js_deobfuscate_rs::Result<TransformStats> {
        if cx.generate().contains("__marker") {
            Ok(TransformStats::default())
        } else {
            Err(DeobfuscateError::Transform {
                transformer: self.name().to_string(),
                message: "marker missing".to_string(),
            })
        }
    }
}

fn marker_registry() -> TransformerRegistry {
    let mut registry = TransformerRegistry::empty();
    registry.register(Box::new(MarkerWriter)).expect("unique names");
    registry.register(Box::new(MarkerChecker)).expect("unique names");
    registry
}

#[test]
fn test_later_pass_sees_earlier_output() {
    let registry = marker_registry();
    let configs = vec![
        TransformerConfig::named("marker-writer"),
        TransformerConfig::named("marker-checker"),
    ];
    let pipeline = Pipeline::build(&registry, &configs).expect("valid pipeline");

    let allocator = Allocator::default();
    let mut cx = Context::parse(&allocator, "a();", &Options::default()).expect("parses");
    pipeline.run(&mut cx).expect("checker should find the marker");
    assert!(cx.generate().contains("__marker;"));
}

#[test]
fn test_checker_alone_fails() {
    let registry = marker_registry();
    let pipeline = Pipeline::build(&registry, &[TransformerConfig::named("marker-checker")]).expect("valid pipeline");

    let allocator = Allocator::default();
    let mut cx = Context::parse(&allocator, "a();", &Options::default()).expect("parses");
    let err = pipeline.run(&mut cx).unwrap_err();
    assert!(matches!(err, DeobfuscateError::Transform { ref transformer, .. } if transformer == "marker-checker"));
}

#[test]
fn test_string_table_end_to_end() {
    let obfuscated_code = r#"
var _0x1234 = ["hello", "world"];
function _0xdec(a) {
    return _0x1234[a];
}
console.log(_0xdec(0), _0xdec(1));
    "#;

    let output = deobfuscate(obfuscated_code, &Options::default()).expect("deobfuscation failed");

    assert!(output.contains(r#"console.log("hello", "world")"#), "got: {}", output);
    assert!(!output.contains("_0x1234"), "Table should be gone, got: {}", output);
    assert!(!output.contains("_0xdec"), "Decoder should be gone, got: {}", output);
}

#[test]
fn test_rotated_table_with_factory() {
    let obfuscated_code = r#"
function _0xt() {
    var a = ["123", "log", "Hello"];
    _0xt = function () { return a; };
    return _0xt();
}
(function (t, target) {
    var d = _0xd, list = t();
    while (true) {
        try {
            if (parseInt(d(2)) === target) break;
            list.push(list.shift());
        } catch (e) {
            list.push(list.shift());
        }
    }
})(_0xt, 123);
function _0xd(i, k) {
    var t = _0xt();
    return _0xd = function (i, k) { i = i - 0; var x = t[i]; return x; }, _0xd(i, k);
}
console[_0xd(0)](_0xd(1));
    "#;

    let output = deobfuscate(obfuscated_code, &Options::default()).expect("deobfuscation failed");

    assert!(output.contains(r#"console.log("Hello")"#), "got: {}", output);
    assert!(!output.contains("shift"), "Rotator should be gone, got: {}", output);
}

#[test]
fn test_pipeline_runs_in_configured_order() {
    let (registry, log) = recording_registry(&["first", "second", "third"]);
    let configs = vec![
        TransformerConfig::named("third"),
        TransformerConfig::named("FIRST"),
        TransformerConfig::named("third"),
    ];
    let pipeline = Pipeline::build(&registry, &configs).expect("valid pipeline");

    let allocator = Allocator::default();
    let mut cx = Context::parse(&allocator, "a();", &Options::default()).expect("parses");
    let report = pipeline.run(&mut cx).expect("pipeline runs");

    assert_eq!(*log.lock().expect("log lock"), vec!["third", "first", "third"]);
    assert_eq!(report.passes.len(), 3);
    assert_eq!(report.total_changes(), 3);
}

#[test]
fn test_invalid_entry_stops_before_anything_runs() {
    let (registry, log) = recording_registry(&["first"]);
    let configs = vec![
        TransformerConfig::named("first"),
        TransformerConfig::named("missing"),
    ];

    let err = Pipeline::build(&registry, &configs).err().expect("unknown name must fail");
    assert!(matches!(err, DeobfuscateError::UnknownTransformer(ref name) if name == "missing"));
    assert!(log.lock().expect("log lock").is_empty());
}

#[test]
fn test_duplicate_registration_rejected() {
    let (mut registry, log) = recording_registry(&["first"]);
    let err = registry
        .register(Box::new(Recorder { name: "First", log }))
        .unwrap_err();
    assert!(matches!(err, DeobfuscateError::DuplicateTransformer(_)));
}

#[test]
fn test_option_out_of_range() {
    let options = Options {
        transformers: vec![TransformerConfig::with_options(
            "string-array",
            json!({ "rotationMultiplier": 0 }),
        )],
        ..Options::default()
    };

    let err = deobfuscate("var a = 1;", &options).unwrap_err();
    match err {
        DeobfuscateError::InvalidOption { transformer, option, .. } => {
            assert_eq!(transformer, "string-array");
            assert_eq!(option, "rotationMultiplier");
        }
        other => panic!("expected an invalid option error, got {other:?}"),
    }
}

#[test]
fn test_unknown_option() {
    let options = Options {
        transformers: vec![TransformerConfig::with_options("dead-code", json!({ "aggressive": true }))],
        ..Options::default()
    };

    let err = deobfuscate("var a = 1;", &options).unwrap_err();
    assert!(matches!(err, DeobfuscateError::UnknownOption { ref option, .. } if option == "aggressive"));
}

#[test]
fn test_config_file_roundtrip() {
    let json = r#"{ "transformers": [ { "name": "boolean-literals" } ], "comments": false }"#;
    let options = Options::from_json_str(json).expect("valid config");

    let output = deobfuscate("// note\nvar a = !0;", &options).expect("deobfuscation failed");
    assert!(output.contains("var a = true"), "got: {}", output);
    assert!(!output.contains("note"), "Comments should be dropped, got: {}", output);
}

#[test]
fn test_builtin_registry_matches_default_order() {
    let registry = TransformerRegistry::new();
    assert_eq!(registry.names(), DEFAULT_ORDER);
}
