//! # Modules
//!
//! A [`Module`] is one live instantiation of a template: a Wasmtime store, the
//! guest's memory and its three required exports. Modules are pooled and
//! reused; while checked out, a module is registered under its identity so
//! that the guest's calls back into the host can be routed to the instance
//! that is running it.

use std::sync::Arc;

use tracing::debug;
use tracing::trace;
use wasmtime::Memory;
use wasmtime::Store;
use wasmtime::TypedFunc;
use wasmtime::WasmParams;
use wasmtime::WasmResults;

use crate::abi;
use crate::context::ChainCtx;
use crate::instance::Binding;
use crate::registry::Active;
use crate::registry::Registry;
use crate::signature::Signature;
use crate::template::Template;

#[derive(Debug)]
pub enum Error {
    Instantiate { function: String, source: wasmtime::Error },
    MissingExport { function: String, export: &'static str },
    ExportType { function: String, export: &'static str, source: wasmtime::Error },
    Initialize { function: String, source: anyhow::Error },
    NotRegistered(String),
    Fuel { function: String, source: wasmtime::Error },
    Allocate { function: String, source: wasmtime::Error },
    Write { function: String },
    Trap { function: String, export: &'static str, source: wasmtime::Error },
    Failed { function: String },
    Read { function: String },
    Decode { function: String, source: anyhow::Error },
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Instantiate { function, source } => {
                write!(f, "failed to instantiate function '{}': {}", function, source)
            }
            Self::MissingExport { function, export } => {
                write!(f, "function '{}' does not export '{}'", function, export)
            }
            Self::ExportType { function, export, source } => {
                write!(f, "export '{}' of function '{}' has the wrong type: {}", export, function, source)
            }
            Self::Initialize { function, source } => {
                write!(f, "failed to initialize function '{}': {}", function, source)
            }
            Self::NotRegistered(identity) => write!(f, "module '{}' is not registered", identity),
            Self::Fuel { function, source } => {
                write!(f, "failed to set fuel for function '{}': {}", function, source)
            }
            Self::Allocate { function, source } => {
                write!(f, "failed to allocate memory for function '{}': {}", function, source)
            }
            Self::Write { function } => write!(f, "failed to write memory for function '{}'", function),
            Self::Trap { function, export, source } => {
                write!(f, "function '{}' trapped in '{}': {}", function, export, source)
            }
            Self::Failed { function } => write!(f, "failed to run function '{}'", function),
            Self::Read { function } => write!(f, "failed to read memory for function '{}'", function),
            Self::Decode { function, source } => {
                write!(f, "error while running function '{}': {}", function, source)
            }
        }
    }
}

impl std::error::Error for Error {}

impl Error {
    /// Whether the module that produced this error may still be reused.
    ///
    /// A decode error is the guest's own result and leaves the module intact.
    /// Anything else may have left the guest in an unknown state.
    pub fn poisons(&self) -> bool {
        !matches!(self, Self::Decode { .. } | Self::NotRegistered(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// One instantiation of a template.
pub struct Module<T: Signature> {
    identity: String,
    function: String,
    store: Store<ChainCtx>,
    memory: Memory,
    run: TypedFunc<(), u64>,
    resize: TypedFunc<u64, u32>,
    registry: Registry<T>,
    fuel: Option<u64>,
    registered: bool,
}

impl<T: Signature> Module<T> {
    /// Instantiates `template` under a fresh identity and runs the guest's
    /// `initialize` export.
    pub fn new(template: &Template<T>) -> Result<Self> {
        let shared = template.shared();
        let function = template.identifier().to_string();
        let identity = format!("{}.{}", function, shared.module_id());

        let ctx = shared.context.build(identity.clone(), template.env());
        let mut store = Store::new(&shared.engine, ctx);
        if let Some(fuel) = shared.fuel {
            store
                .set_fuel(fuel)
                .map_err(|source| Error::Fuel { function: function.clone(), source })?;
        }

        let instance = shared
            .linker
            .instantiate(&mut store, template.compiled())
            .map_err(|source| Error::Instantiate { function: function.clone(), source })?;

        let memory = instance
            .get_memory(&mut store, abi::MEMORY)
            .ok_or_else(|| Error::MissingExport { function: function.clone(), export: abi::MEMORY })?;
        let run = export::<(), u64>(&instance, &mut store, &function, abi::RUN)?;
        let resize = export::<u64, u32>(&instance, &mut store, &function, abi::RESIZE)?;
        let initialize = export::<(), u64>(&instance, &mut store, &function, abi::INITIALIZE)?;

        let packed = initialize
            .call(&mut store, ())
            .map_err(|source| Error::Trap { function: function.clone(), export: abi::INITIALIZE, source })?;
        if packed != 0 {
            let (offset, length) = abi::unpack(packed);
            let buf = abi::read(&memory, &store, offset, length)
                .ok_or_else(|| Error::Read { function: function.clone() })?;
            let mut signature = (shared.new_signature)();
            let source = match signature.read(&buf) {
                Err(e) => e,
                Ok(()) => anyhow::anyhow!("guest reported an initialization failure"),
            };
            return Err(Error::Initialize { function, source });
        }

        debug!(%identity, "instantiated module");

        Ok(Self {
            identity,
            function,
            store,
            memory,
            run,
            resize,
            registry: shared.registry.clone(),
            fuel: shared.fuel,
            registered: false,
        })
    }

    /// Unique name of this instantiation.
    pub fn identity(&self) -> &str {
        &self.identity
    }

    /// Identifier of the template this module was instantiated from.
    pub fn function(&self) -> &str {
        &self.function
    }

    pub fn is_registered(&self) -> bool {
        self.registered
    }

    /// Binds the module to `binding` and makes it visible to host imports.
    pub(crate) fn register(&mut self, template: &Arc<Template<T>>, binding: &Arc<Binding<T>>) {
        self.registry.insert(
            self.identity.clone(),
            Active {
                template: Arc::clone(template),
                binding: Arc::clone(binding),
            },
        );
        self.registered = true;
        trace!(identity = %self.identity, instance = %binding.id, "registered module");
    }

    /// Removes the module from the registry. Calling it on an unregistered
    /// module does nothing.
    pub fn cleanup(&mut self) {
        if !self.registered {
            return;
        }
        self.registry.remove(&self.identity);
        self.registered = false;
        trace!(identity = %self.identity, "released module");
    }

    /// Runs the guest on `ctx` and decodes its result back into `ctx`.
    pub fn run(&mut self, ctx: &mut T) -> Result<()> {
        if !self.registered {
            return Err(Error::NotRegistered(self.identity.clone()));
        }
        if let Some(fuel) = self.fuel {
            self.store
                .set_fuel(fuel)
                .map_err(|source| Error::Fuel { function: self.function.clone(), source })?;
        }

        let buf = ctx.write();
        let offset = self
            .resize
            .call(&mut self.store, buf.len() as u64)
            .map_err(|source| Error::Allocate { function: self.function.clone(), source })?;
        if !abi::write(&self.memory, &mut self.store, offset, &buf) {
            return Err(Error::Write { function: self.function.clone() });
        }

        let packed = self
            .run
            .call(&mut self.store, ())
            .map_err(|source| Error::Trap { function: self.function.clone(), export: abi::RUN, source })?;
        if packed == 0 {
            return Err(Error::Failed { function: self.function.clone() });
        }

        let (offset, length) = abi::unpack(packed);
        let buf = abi::read(&self.memory, &self.store, offset, length)
            .ok_or_else(|| Error::Read { function: self.function.clone() })?;

        ctx.read(&buf)
            .map_err(|source| Error::Decode { function: self.function.clone(), source })
    }
}

impl<T: Signature> Drop for Module<T> {
    fn drop(&mut self) {
        self.cleanup();
    }
}

fn export<P: WasmParams, R: WasmResults>(
    instance: &wasmtime::Instance,
    store: &mut Store<ChainCtx>,
    function: &str,
    name: &'static str,
) -> Result<TypedFunc<P, R>> {
    let func = instance
        .get_func(&mut *store, name)
        .ok_or_else(|| Error::MissingExport { function: function.to_string(), export: name })?;
    func.typed::<P, R>(&*store)
        .map_err(|source| Error::ExportType { function: function.to_string(), export: name, source })
}
