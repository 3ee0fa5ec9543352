//! # Guest ABI
//!
//! The calling convention between the host and a compiled chain link.
//!
//! Every link exports:
//!
//! - `memory`
//! - `initialize() -> u64`: packed error buffer, `0` on success
//! - `resize(size: u64) -> u32`: pointer to a guest buffer of at least `size` bytes
//! - `run() -> u64`: packed result buffer, `0` on fatal failure
//!
//! and may import `env.next(offset: u32, length: u32)`.
//!
//! Buffers are handed across the boundary as `offset << 32 | length`. The
//! packed value `0` is reserved, so a guest can never return an empty buffer
//! at offset zero.

use wasmtime::AsContext;
use wasmtime::AsContextMut;
use wasmtime::Caller;
use wasmtime::Extern;
use wasmtime::Memory;
use wasmtime::TypedFunc;

use crate::context::ChainCtx;

pub const MEMORY: &str = "memory";
pub const INITIALIZE: &str = "initialize";
pub const RESIZE: &str = "resize";
pub const RUN: &str = "run";

/// Import module for the `next` trampoline.
pub const ENV: &str = "env";
pub const NEXT: &str = "next";

pub fn pack(offset: u32, length: u32) -> u64 {
    (offset as u64) << 32 | length as u64
}

pub fn unpack(packed: u64) -> (u32, u32) {
    ((packed >> 32) as u32, packed as u32)
}

/// Copies `length` bytes out of guest memory. Returns `None` when the range
/// is out of bounds, before anything is allocated.
pub fn read(memory: &Memory, store: impl AsContext, offset: u32, length: u32) -> Option<Vec<u8>> {
    let start = offset as usize;
    let end = start.checked_add(length as usize)?;
    memory
        .data(store.as_context())
        .get(start..end)
        .map(<[u8]>::to_vec)
}

/// Copies `bytes` into guest memory. Returns false when the range is out of
/// bounds.
pub fn write(memory: &Memory, store: impl AsContextMut, offset: u32, bytes: &[u8]) -> bool {
    memory.write(store, offset as usize, bytes).is_ok()
}

/// The calling guest's linear memory.
pub(crate) fn caller_memory(caller: &mut Caller<'_, ChainCtx>) -> wasmtime::Result<Memory> {
    caller
        .get_export(MEMORY)
        .and_then(Extern::into_memory)
        .ok_or_else(|| wasmtime::Error::msg(format!("module '{}' exports no memory", caller.data().identity())))
}

/// The calling guest's `resize` export.
pub(crate) fn caller_resize(caller: &mut Caller<'_, ChainCtx>) -> wasmtime::Result<TypedFunc<u64, u32>> {
    let func = caller
        .get_export(RESIZE)
        .and_then(Extern::into_func)
        .ok_or_else(|| wasmtime::Error::msg(format!("module '{}' exports no resize", caller.data().identity())))?;
    func.typed::<u64, u32>(&*caller)
}
