//! # The `next` trampoline
//!
//! A guest calls `env.next(offset, length)` after writing its context into
//! its own memory. The host decodes it, runs the rest of the chain (the next
//! template, or the instance's terminal continuation when the caller is the
//! last link), and writes the result back into the caller's memory at a
//! buffer obtained from the caller's `resize`. The guest then reads the
//! result from the buffer it handed out.
//!
//! Everything happens synchronously on the calling thread; nested links run
//! in their own stores while the caller's store is suspended inside this
//! function.
//!
//! Failures split two ways. If the caller cannot be identified or its memory
//! cannot be accessed, the host returns an error and the guest traps, which
//! surfaces at the module that owns it. If the context does not decode, the
//! decode error is encoded into the reply so the guest sees it as a value.

use tracing::trace;
use tracing::warn;
use wasmtime::Caller;

use crate::abi;
use crate::context::ChainCtx;
use crate::registry::Registry;
use crate::signature::New;
use crate::signature::Signature;

pub(crate) fn next<T: Signature>(
    caller: &mut Caller<'_, ChainCtx>,
    registry: &Registry<T>,
    new_signature: New<T>,
    pointer: u32,
    length: u32,
) -> wasmtime::Result<()> {
    let identity = caller.data().identity().to_string();
    let active = registry
        .get(&identity)
        .ok_or_else(|| wasmtime::Error::msg(format!("next called by unregistered module '{}'", identity)))?;

    let memory = abi::caller_memory(caller)?;
    let buf = abi::read(&memory, &*caller, pointer, length).ok_or_else(|| {
        wasmtime::Error::msg(format!("context at {}+{} is out of bounds for module '{}'", pointer, length, identity))
    })?;

    trace!(%identity, instance = %active.binding.id, length, "next");

    let mut ctx = new_signature();
    let reply = match ctx.read(&buf) {
        Err(e) => {
            warn!(%identity, error = %e, "failed to decode context passed to next");
            ctx.error(&*e)
        }
        Ok(()) => match active.template.next() {
            Some(template) => match template.run(&mut ctx, &active.binding) {
                Ok(()) => ctx.write(),
                Err(e) => ctx.error(&e),
            },
            None => match active.binding.resolve(ctx) {
                Ok(ctx) => ctx.write(),
                Err(e) => new_signature().error(&*e),
            },
        },
    };

    let resize = abi::caller_resize(caller)?;
    let offset = resize.call(&mut *caller, reply.len() as u64)?;
    if !abi::write(&memory, &mut *caller, offset, &reply) {
        return Err(wasmtime::Error::msg(format!(
            "reply of {} bytes at {} is out of bounds for module '{}'",
            reply.len(),
            offset,
            identity
        )));
    }

    Ok(())
}
