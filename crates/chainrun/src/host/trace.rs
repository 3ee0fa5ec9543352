//! # Tracing host functions
//!
//! Lets a guest find out which function it is running as and which instance
//! it belongs to, and emit trace events (for example serialized spans) to the
//! host. Events go to the configured callback, or are dropped. An accessor
//! asked to write outside the guest's memory traps the guest.

use std::sync::Arc;

use tracing::trace;
use wasmtime::Caller;
use wasmtime::Linker;

use crate::abi;
use crate::context::ChainCtx;
use crate::registry::Registry;
use crate::signature::Signature;

/// Import module of the tracing functions.
pub const NAMESPACE: &str = "chainrun";

/// Receives trace events emitted by guests.
pub type TraceCallback = Arc<dyn Fn(&str) + Send + Sync>;

pub(crate) fn install<T: Signature>(
    linker: &mut Linker<ChainCtx>,
    registry: &Registry<T>,
    callback: Option<TraceCallback>,
) -> wasmtime::Result<()> {
    let functions = registry.clone();
    linker.func_wrap(NAMESPACE, "function_name_len", move |caller: Caller<'_, ChainCtx>| -> u32 {
        functions
            .get(caller.data().identity())
            .map(|active| active.template.identifier().len() as u32)
            .unwrap_or(0)
    })?;

    let functions = registry.clone();
    linker.func_wrap(
        NAMESPACE,
        "function_name",
        move |mut caller: Caller<'_, ChainCtx>, pointer: u32| -> wasmtime::Result<()> {
            let Some(active) = functions.get(caller.data().identity()) else {
                return Ok(());
            };
            write(&mut caller, pointer, active.template.identifier().as_bytes())
        },
    )?;

    let instances = registry.clone();
    linker.func_wrap(
        NAMESPACE,
        "instance_id",
        move |mut caller: Caller<'_, ChainCtx>, pointer: u32| -> wasmtime::Result<()> {
            let Some(active) = instances.get(caller.data().identity()) else {
                return Ok(());
            };
            write(&mut caller, pointer, active.binding.id.as_bytes())
        },
    )?;

    linker.func_wrap(
        NAMESPACE,
        "trace",
        move |mut caller: Caller<'_, ChainCtx>, pointer: u32, length: u32| -> wasmtime::Result<()> {
            let Some(callback) = &callback else {
                return Ok(());
            };
            let memory = abi::caller_memory(&mut caller)?;
            if let Some(data) = abi::read(&memory, &caller, pointer, length) {
                let event = String::from_utf8_lossy(&data);
                trace!(identity = caller.data().identity(), "guest trace event");
                callback(&event);
            }
            Ok(())
        },
    )?;

    Ok(())
}

/// Writes `bytes` into the caller's memory, trapping the guest when they do
/// not fit.
fn write(caller: &mut Caller<'_, ChainCtx>, pointer: u32, bytes: &[u8]) -> wasmtime::Result<()> {
    let memory = abi::caller_memory(caller)?;
    if !abi::write(&memory, &mut *caller, pointer, bytes) {
        return Err(wasmtime::Error::msg(format!(
            "{} bytes at {} are out of bounds for module '{}'",
            bytes.len(),
            pointer,
            caller.data().identity()
        )));
    }
    Ok(())
}
