//! # Runtime configuration
//!
//! Collects the ordered chain of functions and the knobs that shape how their
//! modules are instantiated. Validation happens once, when the runtime is
//! built from the config.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use wasmtime_wasi::cli::StdinStream;
use wasmtime_wasi::cli::StdoutStream;

use crate::context::ContextBuilder;
use crate::function::Function;
use crate::host::HostFunction;
use crate::host::trace::TraceCallback;
use crate::signature::New;
use crate::signature::Signature;

/// Capacity of the bounded pool tier when none is configured.
pub const DEFAULT_POOL_SIZE: usize = 8;

/// How long a module may sit in the fallback pool tier before it is dropped.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    NoFunctions,
    InvalidFunction(String),
    InvalidEnv { function: String, key: String },
    SignatureMismatch { function: String, expected: String, found: String },
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoFunctions => write!(f, "no functions provided"),
            Self::InvalidFunction(reason) => write!(f, "invalid function: {}", reason),
            Self::InvalidEnv { function, key } => {
                write!(f, "invalid environment variable '{}' for function '{}'", key, function)
            }
            Self::SignatureMismatch { function, expected, found } => write!(
                f,
                "function '{}' has an invalid signature: expected hash '{}', found '{}'",
                function, expected, found
            ),
        }
    }
}

impl std::error::Error for Error {}

pub type Result<T> = std::result::Result<T, Error>;

/// A function in the chain plus its environment.
#[derive(Clone, Debug)]
pub struct ConfigFunction {
    pub function: Function,
    pub env: HashMap<String, String>,
}

/// Configuration for a [`crate::runtime::Runtime`].
pub struct Config<T: Signature> {
    pub(crate) new_signature: New<T>,
    pub(crate) functions: Vec<ConfigFunction>,
    pub(crate) pool_size: usize,
    pub(crate) fuel: Option<u64>,
    pub(crate) idle_timeout: Duration,
    pub(crate) context: ContextBuilder,
    pub(crate) trace_callback: Option<TraceCallback>,
    pub(crate) host_functions: Vec<HostFunction>,
}

impl<T: Signature> Config<T> {
    pub fn new(new_signature: New<T>) -> Self {
        Self {
            new_signature,
            functions: Vec::new(),
            pool_size: DEFAULT_POOL_SIZE,
            fuel: None,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            context: ContextBuilder::new(),
            trace_callback: None,
            host_functions: Vec::new(),
        }
    }

    /// Appends a function to the end of the chain.
    pub fn with_function(self, function: Function) -> Self {
        self.with_function_env(function, HashMap::new())
    }

    /// Appends a function with environment variables visible to its guest.
    pub fn with_function_env(mut self, function: Function, env: HashMap<String, String>) -> Self {
        self.functions.push(ConfigFunction { function, env });
        self
    }

    pub fn with_functions(mut self, functions: impl IntoIterator<Item = Function>) -> Self {
        for function in functions {
            self = self.with_function(function);
        }
        self
    }

    /// Caps the number of idle modules each stateless function keeps hot.
    /// Zero disables the bounded tier.
    pub fn with_pool_size(mut self, pool_size: usize) -> Self {
        self.pool_size = pool_size;
        self
    }

    /// Gives every `initialize` and `run` call an instruction budget.
    pub fn with_fuel(mut self, fuel: u64) -> Self {
        self.fuel = Some(fuel);
        self
    }

    /// Drops modules that have waited in the fallback pool tier for longer
    /// than `timeout`. The bounded tier is never evicted.
    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    pub fn with_inherit_stdio(mut self, inherit: bool) -> Self {
        self.context = self.context.inherit_stdio(inherit);
        self
    }

    /// Feeds `stream` to the stdin of every guest.
    pub fn with_stdin<S>(mut self, stream: S) -> Self
    where
        S: StdinStream + Clone + Send + Sync + 'static,
    {
        self.context = self.context.stdin(stream);
        self
    }

    /// Sends the stdout of every guest to `stream`.
    pub fn with_stdout<S>(mut self, stream: S) -> Self
    where
        S: StdoutStream + Clone + Send + Sync + 'static,
    {
        self.context = self.context.stdout(stream);
        self
    }

    pub fn with_stderr<S>(mut self, stream: S) -> Self
    where
        S: StdoutStream + Clone + Send + Sync + 'static,
    {
        self.context = self.context.stderr(stream);
        self
    }

    /// Receives every trace event emitted by guests.
    pub fn with_trace_callback(mut self, callback: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.trace_callback = Some(Arc::new(callback));
        self
    }

    pub fn with_host_function(mut self, function: HostFunction) -> Self {
        self.host_functions.push(function);
        self
    }

    pub fn functions(&self) -> &[ConfigFunction] {
        &self.functions
    }

    /// Checks the chain against the context type and the environment grammar.
    pub fn validate(&self) -> Result<()> {
        if self.functions.is_empty() {
            return Err(Error::NoFunctions);
        }

        let signature = (self.new_signature)();
        let expected = signature.hash();

        for ConfigFunction { function, env } in &self.functions {
            if function.name.is_empty() {
                return Err(Error::InvalidFunction("function name is empty".into()));
            }
            if function.binary.is_empty() {
                return Err(Error::InvalidFunction(format!(
                    "function '{}' has an empty binary",
                    function.identifier()
                )));
            }
            if function.signature_hash != expected {
                return Err(Error::SignatureMismatch {
                    function: function.identifier(),
                    expected: expected.to_string(),
                    found: function.signature_hash.clone(),
                });
            }
            if let Some(key) = env.keys().find(|key| !valid_env(key)) {
                return Err(Error::InvalidEnv {
                    function: function.identifier(),
                    key: key.clone(),
                });
            }
        }

        Ok(())
    }
}

/// Returns true if `key` can be used as an environment variable name.
pub fn valid_env(key: &str) -> bool {
    !key.is_empty() && key.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_')
}
