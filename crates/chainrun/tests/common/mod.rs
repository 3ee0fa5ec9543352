//! Shared fixtures: a minimal context type and WebAssembly text guests.
//!
//! Every guest keeps a single buffer at offset 1024. `resize` records the
//! requested length and always hands out that buffer, so the input, any
//! reply from `next`, and the output all live in the same place.

#![allow(dead_code)]

use anyhow::anyhow;
use chainrun::Function;
use chainrun::Signature;

pub const HASH: &str = "chainrun-test-context-v1";

const OK: u8 = 0;
const ERR: u8 = 1;

/// Context made of one string. The wire format is a tag byte followed by
/// UTF-8: `0` for a value, `1` for an error message.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct TestContext {
    pub data: String,
}

impl TestContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(data: &str) -> Self {
        Self { data: data.to_string() }
    }
}

impl Signature for TestContext {
    fn write(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(1 + self.data.len());
        buf.push(OK);
        buf.extend_from_slice(self.data.as_bytes());
        buf
    }

    fn read(&mut self, buf: &[u8]) -> anyhow::Result<()> {
        match buf.split_first() {
            Some((&OK, data)) => {
                self.data = String::from_utf8(data.to_vec())?;
                Ok(())
            }
            Some((&ERR, message)) => Err(anyhow!("{}", String::from_utf8_lossy(message))),
            _ => Err(anyhow!("malformed context buffer")),
        }
    }

    fn error(&self, err: &dyn std::error::Error) -> Vec<u8> {
        let message = err.to_string();
        let mut buf = Vec::with_capacity(1 + message.len());
        buf.push(ERR);
        buf.extend_from_slice(message.as_bytes());
        buf
    }

    fn hash(&self) -> &str {
        HASH
    }
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// A `name:v1` function with the test context hash.
pub fn function(name: &str, wat: String) -> Function {
    Function::new(name, "v1", HASH, wat.into_bytes())
}

// --- Guest building blocks ---

const RESIZE: &str = r#"
  (func (export "resize") (param $size i64) (result i32)
    (global.set $len (i32.wrap_i64 (local.get $size)))
    (i32.const 1024))"#;

const INITIALIZE: &str = r#"
  (func (export "initialize") (result i64)
    (i64.const 0))"#;

const PACKED: &str = r#"
  (func $packed (result i64)
    (i64.or
      (i64.shl (i64.const 1024) (i64.const 32))
      (i64.extend_i32_u (global.get $len))))"#;

/// A module importing `env.next` plus `imports`, with one page of memory and
/// the `$len` global.
fn guest(imports: &str, body: &str) -> String {
    format!(
        r#"(module
  (import "env" "next" (func $next (param i32 i32)))
  {imports}
  (memory (export "memory") 1)
  (global $len (mut i32) (i32.const 0))
  {body})"#
    )
}

/// A guest with the standard `resize`, a successful `initialize`, and `body`.
fn standard(imports: &str, body: &str) -> String {
    guest(imports, &format!("{RESIZE}{INITIALIZE}{PACKED}{body}"))
}

/// Stores `bytes` at offset 512.
fn data(bytes: &str) -> String {
    format!(r#"(data (i32.const 512) "{bytes}")"#)
}

// --- Guests ---

/// Calls `next` and returns its reply untouched.
pub fn passthrough() -> String {
    standard(
        "",
        r#"
  (func (export "run") (result i64)
    (call $next (i32.const 1024) (global.get $len))
    (call $packed))"#,
    )
}

/// Appends `suffix` to its input, then hands the result to `next`.
pub fn middleware(suffix: &str) -> String {
    let n = suffix.len();
    standard(
        "",
        &format!(
            r#"
  {data}
  (func (export "run") (result i64)
    (memory.copy (i32.add (i32.const 1024) (global.get $len)) (i32.const 512) (i32.const {n}))
    (call $next (i32.const 1024) (i32.add (global.get $len) (i32.const {n})))
    (call $packed))"#,
            data = data(suffix)
        ),
    )
}

/// Appends `suffix` to its input without calling `next`.
pub fn endpoint(suffix: &str) -> String {
    let n = suffix.len();
    standard(
        "",
        &format!(
            r#"
  {data}
  (func (export "run") (result i64)
    (memory.copy (i32.add (i32.const 1024) (global.get $len)) (i32.const 512) (i32.const {n}))
    (global.set $len (i32.add (global.get $len) (i32.const {n})))
    (call $packed))"#,
            data = data(suffix)
        ),
    )
}

/// Replaces its input with `value`.
pub fn replacer(value: &str) -> String {
    let n = value.len() + 1;
    standard(
        "",
        &format!(
            r#"
  {data}
  (func (export "run") (result i64)
    (memory.copy (i32.const 1024) (i32.const 512) (i32.const {n}))
    (global.set $len (i32.const {n}))
    (call $packed))"#,
            data = data(&format!("\\00{value}"))
        ),
    )
}

/// Replaces its input with an error carrying `message`.
pub fn failing(message: &str) -> String {
    let n = message.len() + 1;
    standard(
        "",
        &format!(
            r#"
  {data}
  (func (export "run") (result i64)
    (memory.copy (i32.const 1024) (i32.const 512) (i32.const {n}))
    (global.set $len (i32.const {n}))
    (call $packed))"#,
            data = data(&format!("\\01{message}"))
        ),
    )
}

/// Returns how many times this module has run, as a single digit.
pub fn counter() -> String {
    standard(
        "",
        r#"
  (global $count (mut i32) (i32.const 0))
  (func (export "run") (result i64)
    (global.set $count (i32.add (global.get $count) (i32.const 1)))
    (i32.store8 (i32.const 1024) (i32.const 0))
    (i32.store8 (i32.const 1025) (i32.add (i32.const 48) (global.get $count)))
    (global.set $len (i32.const 2))
    (call $packed))"#,
    )
}

/// Fails `initialize` with `message`.
pub fn failing_initialize(message: &str) -> String {
    let n = message.len() + 1;
    guest(
        "",
        &format!(
            r#"{RESIZE}{PACKED}
  (data (i32.const 256) "\01{message}")
  (func (export "initialize") (result i64)
    (i64.or
      (i64.shl (i64.const 256) (i64.const 32))
      (i64.const {n})))
  (func (export "run") (result i64)
    (call $packed))"#
        ),
    )
}

pub fn trapping() -> String {
    standard(
        "",
        r#"
  (func (export "run") (result i64)
    unreachable)"#,
    )
}

/// Reports a fatal failure by returning zero from `run`.
pub fn fatal() -> String {
    standard(
        "",
        r#"
  (func (export "run") (result i64)
    (i64.const 0))"#,
    )
}

/// Returns a result buffer outside its memory.
pub fn out_of_bounds() -> String {
    standard(
        "",
        r#"
  (func (export "run") (result i64)
    (i64.or
      (i64.shl (i64.const 131072) (i64.const 32))
      (i64.const 16)))"#,
    )
}

pub fn missing_resize() -> String {
    guest(
        "",
        &format!(
            r#"{INITIALIZE}{PACKED}
  (func (export "run") (result i64)
    (call $packed))"#
        ),
    )
}

/// Never returns.
pub fn spinning() -> String {
    standard(
        "",
        r#"
  (func (export "run") (result i64)
    (loop $spin
      (br $spin))
    (i64.const 0))"#,
    )
}

/// Traces `event` and its instance id, then returns its own identifier.
pub fn tracer(event: &str) -> String {
    let n = event.len();
    standard(
        r#"
  (import "chainrun" "function_name_len" (func $function_name_len (result i32)))
  (import "chainrun" "function_name" (func $function_name (param i32)))
  (import "chainrun" "instance_id" (func $instance_id (param i32)))
  (import "chainrun" "trace" (func $trace (param i32 i32)))"#,
        &format!(
            r#"
  {data}
  (func (export "run") (result i64)
    (call $trace (i32.const 512) (i32.const {n}))
    (call $instance_id (i32.const 256))
    (call $trace (i32.const 256) (i32.const 16))
    (i32.store8 (i32.const 1024) (i32.const 0))
    (call $function_name (i32.const 1025))
    (global.set $len (i32.add (i32.const 1) (call $function_name_len)))
    (call $packed))"#,
            data = data(event)
        ),
    )
}

/// Calls the `test.bump` host function on `value` and returns the result as
/// a single digit.
pub fn bumper(value: i32) -> String {
    standard(
        r#"
  (import "test" "bump" (func $bump (param i32) (result i32)))"#,
        &format!(
            r#"
  (func (export "run") (result i64)
    (i32.store8 (i32.const 1024) (i32.const 0))
    (i32.store8 (i32.const 1025) (i32.add (i32.const 48) (call $bump (i32.const {value}))))
    (global.set $len (i32.const 2))
    (call $packed))"#
        ),
    )
}

/// Returns its environment as `KEY=VALUE`. Expects exactly one variable.
pub fn environment() -> String {
    standard(
        r#"
  (import "wasi_snapshot_preview1" "environ_sizes_get" (func $environ_sizes_get (param i32 i32) (result i32)))
  (import "wasi_snapshot_preview1" "environ_get" (func $environ_get (param i32 i32) (result i32)))"#,
        r#"
  (func (export "run") (result i64)
    (drop (call $environ_sizes_get (i32.const 0) (i32.const 4)))
    (drop (call $environ_get (i32.const 16) (i32.const 1025)))
    (i32.store8 (i32.const 1024) (i32.const 0))
    ;; drop the trailing NUL
    (global.set $len (i32.load (i32.const 4)))
    (call $packed))"#,
    )
}

/// Hands `next` a buffer with an unknown tag.
pub fn garbage_next() -> String {
    standard(
        "",
        r#"
  (func (export "run") (result i64)
    (i32.store8 (i32.const 1024) (i32.const 7))
    (call $next (i32.const 1024) (i32.const 1))
    (call $packed))"#,
    )
}

/// Writes `message` to file descriptor `fd`, then hands its input to `next`.
pub fn printer(fd: u32, message: &str) -> String {
    let n = message.len();
    standard(
        r#"
  (import "wasi_snapshot_preview1" "fd_write" (func $fd_write (param i32 i32 i32 i32) (result i32)))"#,
        &format!(
            r#"
  {data}
  (func (export "run") (result i64)
    (i32.store (i32.const 64) (i32.const 512))
    (i32.store (i32.const 68) (i32.const {n}))
    (drop (call $fd_write (i32.const {fd}) (i32.const 64) (i32.const 1) (i32.const 80)))
    (call $next (i32.const 1024) (global.get $len))
    (call $packed))"#,
            data = data(message)
        ),
    )
}

/// Returns whatever a single read from stdin produced.
pub fn stdin_reader() -> String {
    standard(
        r#"
  (import "wasi_snapshot_preview1" "fd_read" (func $fd_read (param i32 i32 i32 i32) (result i32)))"#,
        r#"
  (func (export "run") (result i64)
    (i32.store (i32.const 64) (i32.const 1025))
    (i32.store (i32.const 68) (i32.const 256))
    (drop (call $fd_read (i32.const 0) (i32.const 64) (i32.const 1) (i32.const 80)))
    (i32.store8 (i32.const 1024) (i32.const 0))
    (global.set $len (i32.add (i32.const 1) (i32.load (i32.const 80))))
    (call $packed))"#,
    )
}

/// Asks for its function name at the very end of its memory.
pub fn misplaced_name() -> String {
    standard(
        r#"
  (import "chainrun" "function_name" (func $function_name (param i32)))"#,
        r#"
  (func (export "run") (result i64)
    (call $function_name (i32.const 65535))
    (call $packed))"#,
    )
}
