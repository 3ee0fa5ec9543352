//! # Runtime
//!
//! Owns the Wasmtime engine, the linker every module is instantiated through,
//! and the chain of templates. Instances are handed out from here.
//!
//! The host imports (`env.next`, the tracing accessors, extension functions)
//! are installed into the linker once, before any template is compiled, and
//! find their way back to the calling module through the active-module
//! registry.

use std::sync::Arc;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;

use tracing::debug;
use wasmtime::Engine;
use wasmtime::Linker;

use crate::config;
use crate::config::Config;
use crate::context::ChainCtx;
use crate::context::ContextBuilder;
use crate::host;
use crate::instance::Instance;
use crate::instance::Next;
use crate::registry::Registry;
use crate::signature::New;
use crate::signature::Signature;
use crate::template::Template;

#[derive(Debug)]
pub enum Error {
    Config(config::Error),
    Engine(wasmtime::Error),
    Linker(wasmtime::Error),
    Compile { function: String, source: wasmtime::Error },
    ContinuationRequired,
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(e) => write!(f, "Configuration error: {}", e),
            Self::Engine(e) => write!(f, "Engine error: {}", e),
            Self::Linker(e) => write!(f, "Linker error: {}", e),
            Self::Compile { function, source } => {
                write!(f, "failed to pre-compile function '{}': {}", function, source)
            }
            Self::ContinuationRequired => write!(
                f,
                "next function required when the function chain only contains middleware"
            ),
        }
    }
}

impl std::error::Error for Error {}

impl From<config::Error> for Error {
    fn from(e: config::Error) -> Self {
        Self::Config(e)
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// State every template and module of a runtime needs.
pub(crate) struct Shared<T: Signature> {
    pub engine: Engine,
    pub linker: Linker<ChainCtx>,
    pub registry: Registry<T>,
    pub new_signature: New<T>,
    pub context: ContextBuilder,
    pub fuel: Option<u64>,
    next_module_id: AtomicU64,
}

impl<T: Signature> Shared<T> {
    /// Allocates the suffix that makes a module identity unique.
    pub fn module_id(&self) -> u64 {
        self.next_module_id.fetch_add(1, Ordering::Relaxed)
    }
}

/// A chain of compiled functions, ready to run.
pub struct Runtime<T: Signature> {
    shared: Arc<Shared<T>>,
    templates: Vec<Arc<Template<T>>>,
}

impl<T: Signature> Runtime<T> {
    /// Validates `config`, installs the host imports and compiles every
    /// function in chain order.
    pub fn new(config: Config<T>) -> Result<Self> {
        config.validate()?;

        let Config {
            new_signature,
            functions,
            pool_size,
            fuel,
            idle_timeout,
            context,
            trace_callback,
            host_functions,
        } = config;

        let mut engine_config = wasmtime::Config::new();
        engine_config.consume_fuel(fuel.is_some());
        let engine = Engine::new(&engine_config).map_err(Error::Engine)?;

        let registry = Registry::new();
        let mut linker = Linker::new(&engine);
        host::install(&mut linker, &registry, new_signature, trace_callback, &host_functions)
            .map_err(Error::Linker)?;

        let shared = Arc::new(Shared {
            engine,
            linker,
            registry,
            new_signature,
            context,
            fuel,
            next_module_id: AtomicU64::new(1),
        });

        let mut compiled = Vec::with_capacity(functions.len());
        for function in functions {
            let module = Template::<T>::compile(&shared.engine, &function).map_err(|source| Error::Compile {
                function: function.function.identifier(),
                source,
            })?;
            compiled.push((function, module));
        }

        // Link back to front so every template owns its successor from the start.
        let mut templates = Vec::with_capacity(compiled.len());
        let mut next = None;
        for (function, module) in compiled.into_iter().rev() {
            let template = Arc::new(Template::new(Arc::clone(&shared), function, module, next, pool_size, idle_timeout));
            next = Some(Arc::clone(&template));
            templates.push(template);
        }
        templates.reverse();

        debug!(functions = templates.len(), "runtime ready");

        Ok(Self { shared, templates })
    }

    /// Returns a reference to the wasmtime Engine.
    pub fn engine(&self) -> &Engine {
        &self.shared.engine
    }

    /// The chain, in order.
    pub fn templates(&self) -> &[Arc<Template<T>>] {
        &self.templates
    }

    pub fn head(&self) -> Option<&Arc<Template<T>>> {
        self.templates.first()
    }

    pub fn tail(&self) -> Option<&Arc<Template<T>>> {
        self.templates.last()
    }

    /// Number of modules currently checked out across all instances.
    pub fn active_modules(&self) -> usize {
        self.shared.registry.len()
    }

    /// Creates an instance whose chain ends in the identity continuation.
    ///
    /// Fails with [`Error::ContinuationRequired`] when every function in the
    /// chain is middleware, since nothing would produce a result.
    pub fn instance(&self) -> Result<Instance<T>> {
        self.build_instance(None)
    }

    /// Creates an instance whose chain ends in `next`.
    pub fn instance_with<F>(&self, next: F) -> Result<Instance<T>>
    where
        F: Fn(T) -> anyhow::Result<T> + Send + Sync + 'static,
    {
        self.build_instance(Some(Arc::new(next)))
    }

    fn build_instance(&self, next: Option<Next<T>>) -> Result<Instance<T>> {
        let next: Next<T> = match next {
            Some(next) => next,
            None if self.templates.iter().all(|template| template.is_middleware()) => {
                return Err(Error::ContinuationRequired);
            }
            None => Arc::new(|ctx: T| anyhow::Ok(ctx)),
        };
        Ok(Instance::new(self.head().cloned(), next))
    }

    /// Drops the idle modules held in the fallback tier of every pool.
    pub fn reclaim(&self) -> usize {
        self.templates.iter().map(|template| template.reclaim()).sum()
    }
}
