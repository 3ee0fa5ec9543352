//! # Host functions
//!
//! Functions the host exposes to guests:
//!
//! - `env.next`, the trampoline that continues the chain
//! - the `chainrun` tracing accessors
//! - WASI preview 1, so guests can read their environment
//! - extension functions supplied through [`HostFunction`]

pub mod next;
pub mod trace;

use std::sync::Arc;

use wasmtime::Caller;
use wasmtime::FuncType;
use wasmtime::Linker;
use wasmtime::Val;
use wasmtime::ValType;

use crate::abi;
use crate::context::ChainCtx;
use crate::registry::Registry;
use crate::signature::New;
use crate::signature::Signature;

use self::trace::TraceCallback;

/// Handler of an extension host function.
pub type Handler = Arc<dyn Fn(&mut Caller<'_, ChainCtx>, &[Val], &mut [Val]) -> wasmtime::Result<()> + Send + Sync>;

/// An extension function importable by guests as `namespace.name`.
#[derive(Clone)]
pub struct HostFunction {
    pub namespace: String,
    pub name: String,
    pub params: Vec<ValType>,
    pub results: Vec<ValType>,
    handler: Handler,
}

impl HostFunction {
    pub fn new<F>(
        namespace: impl Into<String>,
        name: impl Into<String>,
        params: impl IntoIterator<Item = ValType>,
        results: impl IntoIterator<Item = ValType>,
        handler: F,
    ) -> Self
    where
        F: Fn(&mut Caller<'_, ChainCtx>, &[Val], &mut [Val]) -> wasmtime::Result<()> + Send + Sync + 'static,
    {
        Self {
            namespace: namespace.into(),
            name: name.into(),
            params: params.into_iter().collect(),
            results: results.into_iter().collect(),
            handler: Arc::new(handler),
        }
    }

    fn define(&self, linker: &mut Linker<ChainCtx>) -> wasmtime::Result<()> {
        let ty = FuncType::new(linker.engine(), self.params.iter().cloned(), self.results.iter().cloned());
        let handler = Arc::clone(&self.handler);
        linker.func_new(&self.namespace, &self.name, ty, move |mut caller, params, results| {
            handler(&mut caller, params, results)
        })?;
        Ok(())
    }
}

impl std::fmt::Debug for HostFunction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostFunction")
            .field("namespace", &self.namespace)
            .field("name", &self.name)
            .field("params", &self.params)
            .field("results", &self.results)
            .finish_non_exhaustive()
    }
}

/// Installs every host function into `linker`.
pub(crate) fn install<T: Signature>(
    linker: &mut Linker<ChainCtx>,
    registry: &Registry<T>,
    new_signature: New<T>,
    trace_callback: Option<TraceCallback>,
    extensions: &[HostFunction],
) -> wasmtime::Result<()> {
    wasmtime_wasi::p1::add_to_linker_sync(linker, |ctx: &mut ChainCtx| &mut ctx.wasi)?;

    let trampoline = registry.clone();
    linker.func_wrap(
        abi::ENV,
        abi::NEXT,
        move |mut caller: Caller<'_, ChainCtx>, pointer: u32, length: u32| {
            next::next(&mut caller, &trampoline, new_signature, pointer, length)
        },
    )?;

    trace::install(linker, registry, trace_callback)?;

    for extension in extensions {
        extension.define(linker)?;
    }

    Ok(())
}
