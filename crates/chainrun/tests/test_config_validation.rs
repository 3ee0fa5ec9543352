//! Tests for configuration validation.

mod common;

use std::collections::HashMap;

use chainrun::Config;
use chainrun::Function;
use chainrun::Runtime;
use chainrun::config;
use chainrun::runtime;

use common::TestContext;
use common::function;

fn build(config: Config<TestContext>) -> Option<runtime::Error> {
    common::init_tracing();
    Runtime::new(config).err()
}

fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
    pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
}

// --- Happy Path Tests ---

#[test]
fn test_valid_chain() {
    let config = Config::new(TestContext::new)
        .with_function(function("auth", common::middleware("-a")).middleware(true))
        .with_function_env(function("handler", common::endpoint("-h")), env(&[("LOG_LEVEL", "debug"), ("_x1", "")]));

    assert_eq!(config.validate(), Ok(()));
    assert_eq!(config.functions().len(), 2);
    assert!(build(config).is_none());
}

#[test]
fn test_with_functions_keeps_order() {
    let config = Config::new(TestContext::new).with_functions([
        function("a", common::passthrough()),
        function("b", common::passthrough()),
        function("c", common::endpoint("!")),
    ]);
    let names: Vec<_> = config.functions().iter().map(|f| f.function.name.as_str()).collect();
    assert_eq!(names, ["a", "b", "c"]);
}

// --- Rejections ---

#[test]
fn test_empty_chain() {
    let config = Config::new(TestContext::new);
    assert_eq!(config.validate(), Err(config::Error::NoFunctions));
    assert!(matches!(build(config), Some(runtime::Error::Config(config::Error::NoFunctions))));
}

#[test]
fn test_invalid_env_key() {
    for key in ["", "MY-VAR", "with space", "caf\u{e9}"] {
        let config = Config::new(TestContext::new)
            .with_function_env(function("handler", common::passthrough()), env(&[(key, "value")]));
        assert_eq!(
            config.validate(),
            Err(config::Error::InvalidEnv {
                function: "handler:v1".into(),
                key: key.into(),
            }),
            "key {:?} should be rejected",
            key
        );
    }
}

#[test]
fn test_signature_mismatch() {
    let config = Config::new(TestContext::new)
        .with_function(function("good", common::passthrough()))
        .with_function(Function::new("bad", "v2", "other-hash", common::passthrough()));

    assert_eq!(
        config.validate(),
        Err(config::Error::SignatureMismatch {
            function: "bad:v2".into(),
            expected: common::HASH.into(),
            found: "other-hash".into(),
        })
    );
    assert!(matches!(
        build(config),
        Some(runtime::Error::Config(config::Error::SignatureMismatch { .. }))
    ));
}

#[test]
fn test_empty_name_and_binary() {
    let unnamed = Config::new(TestContext::new).with_function(function("", common::passthrough()));
    assert!(matches!(unnamed.validate(), Err(config::Error::InvalidFunction(_))));

    let empty = Config::new(TestContext::new).with_function(Function::new("empty", "v1", common::HASH, Vec::<u8>::new()));
    assert!(matches!(empty.validate(), Err(config::Error::InvalidFunction(_))));
}

#[test]
fn test_malformed_binary_fails_compile() {
    let config = Config::new(TestContext::new)
        .with_function(function("good", common::passthrough()))
        .with_function(function("broken", "(module (func".to_string()));

    match build(config) {
        Some(runtime::Error::Compile { function, .. }) => assert_eq!(function, "broken:v1"),
        other => panic!("expected a compile error, got {:?}", other),
    }
}

#[test]
fn test_unresolved_import_fails_at_instantiation() {
    let wat = r#"(module
  (import "nowhere" "missing" (func))
  (memory (export "memory") 1)
  (func (export "initialize") (result i64) (i64.const 0))
  (func (export "resize") (param i64) (result i32) (i32.const 0))
  (func (export "run") (result i64) (i64.const 0)))"#;
    common::init_tracing();
    let rt = Runtime::new(Config::new(TestContext::new).with_function(function("orphan", wat.to_string())))
        .expect("Failed to create runtime");

    let err = rt
        .instance()
        .expect("Failed to create instance")
        .run(&mut TestContext::new())
        .unwrap_err();
    assert!(matches!(
        err,
        chainrun::instance::Error::Module(chainrun::module::Error::Instantiate { .. })
    ));
}
