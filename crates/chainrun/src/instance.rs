//! # Chain instances
//!
//! An [`Instance`] is one top-to-bottom execution of the chain. It owns the
//! terminal continuation, the step run when the last link calls `next`, and a
//! random identifier guests can read for trace correlation.
//!
//! Instances are single-use: [`Instance::run`] consumes the instance.

use std::sync::Arc;

use tracing::debug;
use tracing::debug_span;

use crate::module;
use crate::signature::Signature;
use crate::template::Template;

#[derive(Debug)]
pub enum Error {
    NoFunctions,
    Module(module::Error),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoFunctions => write!(f, "no functions registered"),
            Self::Module(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for Error {}

impl From<module::Error> for Error {
    fn from(e: module::Error) -> Self {
        Self::Module(e)
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// The terminal step of a chain.
pub type Next<T> = Arc<dyn Fn(T) -> anyhow::Result<T> + Send + Sync>;

/// Strong type for instance identifiers.
#[derive(Copy, Clone, Debug, Hash, PartialEq, Eq)]
pub struct InstanceId(pub [u8; 16]);

impl InstanceId {
    pub fn random() -> Self {
        Self(rand::random())
    }

    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }
}

impl std::fmt::Display for InstanceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for byte in self.0 {
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}

/// The per-instance half of a registry entry, shared by every module the
/// instance has checked out.
pub(crate) struct Binding<T: Signature> {
    pub id: InstanceId,
    next: Next<T>,
}

impl<T: Signature> Binding<T> {
    pub fn new(id: InstanceId, next: Next<T>) -> Self {
        Self { id, next }
    }

    /// Runs the terminal continuation.
    pub fn resolve(&self, ctx: T) -> anyhow::Result<T> {
        (self.next)(ctx)
    }
}

/// One execution of the chain.
pub struct Instance<T: Signature> {
    head: Option<Arc<Template<T>>>,
    binding: Arc<Binding<T>>,
}

impl<T: Signature> Instance<T> {
    pub(crate) fn new(head: Option<Arc<Template<T>>>, next: Next<T>) -> Self {
        Self {
            head,
            binding: Arc::new(Binding::new(InstanceId::random(), next)),
        }
    }

    pub fn id(&self) -> InstanceId {
        self.binding.id
    }

    /// Runs `ctx` through the chain, leaving the final context in `ctx`.
    ///
    /// The entry module is checked out, registered, run and released before
    /// this returns, whether or not the run succeeded. An error carried back
    /// through the context surfaces here as [`module::Error::Decode`].
    pub fn run(self, ctx: &mut T) -> Result<()> {
        let head = self.head.as_ref().ok_or(Error::NoFunctions)?;
        let _span = debug_span!("instance", id = %self.binding.id).entered();

        let result = head.run(ctx, &self.binding);
        match &result {
            Ok(()) => debug!(function = head.identifier(), "chain completed"),
            Err(e) => debug!(function = head.identifier(), error = %e, "chain failed"),
        }
        result.map_err(Error::Module)
    }
}
