//! Store context for module instantiations.

use std::collections::HashMap;
use std::sync::Arc;

use wasmtime_wasi::WasiCtxBuilder;
use wasmtime_wasi::cli::StdinStream;
use wasmtime_wasi::cli::StdoutStream;
use wasmtime_wasi::p1::WasiP1Ctx;

/// Attaches one stdio stream to a WASI context under construction.
type Attach = Arc<dyn Fn(&mut WasiCtxBuilder) + Send + Sync>;

/// Settings shared by every store the runtime creates. Per-function
/// environment is supplied at build time.
///
/// Streams are cloned into every store, so all modules of a runtime write to
/// the same sink and read from the same source.
#[derive(Clone, Default)]
pub struct ContextBuilder {
    inherit_stdio: bool,
    stdin: Option<Attach>,
    stdout: Option<Attach>,
    stderr: Option<Attach>,
}

impl ContextBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Shares the host's stdin, stdout and stderr with guests. Streams set
    /// with [`stdin`](Self::stdin), [`stdout`](Self::stdout) or
    /// [`stderr`](Self::stderr) take precedence.
    pub fn inherit_stdio(mut self, inherit: bool) -> Self {
        self.inherit_stdio = inherit;
        self
    }

    pub fn stdin<S>(mut self, stream: S) -> Self
    where
        S: StdinStream + Clone + Send + Sync + 'static,
    {
        self.stdin = Some(Arc::new(move |wasi: &mut WasiCtxBuilder| {
            wasi.stdin(stream.clone());
        }));
        self
    }

    pub fn stdout<S>(mut self, stream: S) -> Self
    where
        S: StdoutStream + Clone + Send + Sync + 'static,
    {
        self.stdout = Some(Arc::new(move |wasi: &mut WasiCtxBuilder| {
            wasi.stdout(stream.clone());
        }));
        self
    }

    pub fn stderr<S>(mut self, stream: S) -> Self
    where
        S: StdoutStream + Clone + Send + Sync + 'static,
    {
        self.stderr = Some(Arc::new(move |wasi: &mut WasiCtxBuilder| {
            wasi.stderr(stream.clone());
        }));
        self
    }

    /// Builds the store data for one module instantiation.
    pub(crate) fn build(&self, identity: String, env: &HashMap<String, String>) -> ChainCtx {
        let mut wasi = WasiCtxBuilder::new();
        if self.inherit_stdio {
            wasi.inherit_stdio();
        }
        for attach in [&self.stdin, &self.stdout, &self.stderr].into_iter().flatten() {
            attach(&mut wasi);
        }
        for (key, value) in env {
            wasi.env(key, value);
        }

        ChainCtx {
            identity,
            wasi: wasi.build_p1(),
        }
    }
}

impl std::fmt::Debug for ContextBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContextBuilder")
            .field("inherit_stdio", &self.inherit_stdio)
            .field("stdin", &self.stdin.is_some())
            .field("stdout", &self.stdout.is_some())
            .field("stderr", &self.stderr.is_some())
            .finish()
    }
}

/// Per-module state stored in Wasmtime's Store.
///
/// The identity is the only thing a host import gets to know about its
/// caller, so it doubles as the key into the active-module registry.
pub struct ChainCtx {
    identity: String,
    pub(crate) wasi: WasiP1Ctx,
}

impl ChainCtx {
    /// Unique name of the module instantiation (`name:tag.N`).
    pub fn identity(&self) -> &str {
        &self.identity
    }
}
