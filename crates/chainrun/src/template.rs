//! # Templates
//!
//! A [`Template`] is one compiled chain link. Templates form a singly linked,
//! forward-only list: each one owns an `Arc` to the link after it, and the
//! runtime owns the head. Nothing changes after construction except the
//! contents of the module pool.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tracing::debug;
use tracing::trace;

use crate::config::ConfigFunction;
use crate::instance::Binding;
use crate::module;
use crate::module::Module;
use crate::pool::Lease;
use crate::pool::ModulePool;
use crate::runtime::Shared;
use crate::signature::Signature;

/// One compiled chain link.
pub struct Template<T: Signature> {
    identifier: String,
    compiled: wasmtime::Module,
    env: HashMap<String, String>,
    middleware: bool,
    pool: Option<ModulePool<T>>,
    next: Option<Arc<Template<T>>>,
    shared: Arc<Shared<T>>,
}

impl<T: Signature> Template<T> {
    /// Compiles the function's binary.
    pub(crate) fn compile(engine: &wasmtime::Engine, function: &ConfigFunction) -> wasmtime::Result<wasmtime::Module> {
        let compiled = wasmtime::Module::new(engine, &function.function.binary)?;
        debug!(function = %function.function.identifier(), "compiled function");
        Ok(compiled)
    }

    /// Links a compiled function in front of `next`.
    ///
    /// Stateless functions get a module pool; stateful functions instantiate
    /// a fresh module for every run.
    pub(crate) fn new(
        shared: Arc<Shared<T>>,
        function: ConfigFunction,
        compiled: wasmtime::Module,
        next: Option<Arc<Template<T>>>,
        pool_size: usize,
        idle_timeout: Duration,
    ) -> Self {
        let ConfigFunction { function, env } = function;
        Self {
            identifier: function.identifier(),
            compiled,
            env,
            middleware: function.middleware,
            pool: function.stateless.then(|| ModulePool::new(pool_size, idle_timeout)),
            next,
            shared,
        }
    }

    /// `name:tag` of the function.
    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    pub fn is_middleware(&self) -> bool {
        self.middleware
    }

    pub fn is_stateless(&self) -> bool {
        self.pool.is_some()
    }

    /// The link after this one, if any.
    pub fn next(&self) -> Option<&Arc<Template<T>>> {
        self.next.as_ref()
    }

    /// Idle modules waiting in the pool.
    pub fn idle(&self) -> usize {
        self.pool.as_ref().map(ModulePool::idle).unwrap_or(0)
    }

    pub(crate) fn compiled(&self) -> &wasmtime::Module {
        &self.compiled
    }

    pub(crate) fn env(&self) -> &HashMap<String, String> {
        &self.env
    }

    pub(crate) fn shared(&self) -> &Shared<T> {
        &self.shared
    }

    /// Checks out a module bound to `binding`.
    pub(crate) fn acquire(self: &Arc<Self>, binding: &Arc<Binding<T>>) -> module::Result<Lease<T>> {
        let module = match &self.pool {
            Some(pool) => pool.get(|| Module::new(self))?,
            None => Module::new(self)?,
        };
        trace!(function = %self.identifier, identity = module.identity(), "acquired module");
        Ok(Lease::new(module, self, binding))
    }

    /// Takes back a deregistered module.
    pub(crate) fn release(&self, module: Module<T>) {
        if let Some(pool) = &self.pool {
            pool.put(module);
        }
    }

    /// Runs this link, and through it the rest of the chain, on `ctx`.
    pub(crate) fn run(self: &Arc<Self>, ctx: &mut T, binding: &Arc<Binding<T>>) -> module::Result<()> {
        let mut lease = self.acquire(binding)?;
        lease.run(ctx)
    }

    /// Drops the reclaimable idle modules of this template.
    pub(crate) fn reclaim(&self) -> usize {
        self.pool.as_ref().map(ModulePool::reclaim).unwrap_or(0)
    }
}
