//! # Module pools
//!
//! Each stateless template keeps its idle modules in two tiers: a bounded
//! channel of hot modules, and an unbounded fallback that absorbs bursts.
//! Fallback modules expire once they have been idle for longer than the
//! pool's idle timeout, and can be reclaimed at any time. Neither `get` nor
//! `put` waits on the other tier or on another thread.

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::PoisonError;
use std::time::Duration;
use std::time::Instant;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::debug;

use crate::instance::Binding;
use crate::module;
use crate::module::Module;
use crate::signature::Signature;
use crate::template::Template;

struct Bounded<T: Signature> {
    sender: mpsc::Sender<Module<T>>,
    receiver: Mutex<mpsc::Receiver<Module<T>>>,
}

/// A module parked in the fallback tier.
struct Parked<T: Signature> {
    module: Module<T>,
    since: Instant,
}

/// Idle modules of one template.
pub struct ModulePool<T: Signature> {
    bounded: Option<Bounded<T>>,
    /// Oldest first.
    fallback: Mutex<Vec<Parked<T>>>,
    idle_timeout: Duration,
}

impl<T: Signature> ModulePool<T> {
    /// Creates a pool whose bounded tier holds up to `capacity` modules. A
    /// capacity of zero leaves only the fallback tier. Fallback modules idle
    /// for longer than `idle_timeout` are dropped.
    pub fn new(capacity: usize, idle_timeout: Duration) -> Self {
        let bounded = (capacity > 0).then(|| {
            let (sender, receiver) = mpsc::channel(capacity);
            Bounded {
                sender,
                receiver: Mutex::new(receiver),
            }
        });

        Self {
            bounded,
            fallback: Mutex::new(Vec::new()),
            idle_timeout,
        }
    }

    /// Takes an idle module, or builds one with `new` when both tiers are
    /// empty.
    pub fn get(&self, new: impl FnOnce() -> module::Result<Module<T>>) -> module::Result<Module<T>> {
        self.sweep();

        if let Some(bounded) = &self.bounded {
            // Another thread draining the channel just means we look elsewhere.
            if let Ok(mut receiver) = bounded.receiver.try_lock() {
                if let Ok(module) = receiver.try_recv() {
                    return Ok(module);
                }
            }
        }

        let pooled = self
            .fallback
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop();
        match pooled {
            Some(parked) => Ok(parked.module),
            None => new(),
        }
    }

    /// Returns a module to the pool. The module must already be deregistered.
    pub fn put(&self, module: Module<T>) {
        debug_assert!(!module.is_registered());

        let module = match &self.bounded {
            Some(bounded) => match bounded.sender.try_send(module) {
                Ok(()) => {
                    self.sweep();
                    return;
                }
                Err(TrySendError::Full(module)) | Err(TrySendError::Closed(module)) => module,
            },
            None => module,
        };

        debug!(identity = module.identity(), "bounded pool full, using fallback");
        let expired = {
            let mut fallback = self.fallback.lock().unwrap_or_else(PoisonError::into_inner);
            let expired = self.expire(&mut fallback);
            fallback.push(Parked {
                module,
                since: Instant::now(),
            });
            expired
        };
        drop(expired);
    }

    /// Drops expired fallback modules unless another thread holds the tier.
    fn sweep(&self) {
        let expired = match self.fallback.try_lock() {
            Ok(mut fallback) => self.expire(&mut fallback),
            Err(_) => return,
        };
        drop(expired);
    }

    /// Splits off the fallback modules whose idle time ran out. The caller
    /// drops them after releasing the lock.
    fn expire(&self, fallback: &mut Vec<Parked<T>>) -> Vec<Parked<T>> {
        let count = fallback.partition_point(|parked| parked.since.elapsed() >= self.idle_timeout);
        if count > 0 {
            debug!(expired = count, "dropping idle fallback modules");
        }
        fallback.drain(..count).collect()
    }

    /// Drops every module in the fallback tier and returns how many were
    /// dropped.
    pub fn reclaim(&self) -> usize {
        let drained: Vec<_> = self
            .fallback
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect();
        drained.len()
    }

    /// Number of idle modules across both tiers.
    pub fn idle(&self) -> usize {
        let bounded = self
            .bounded
            .as_ref()
            .map(|bounded| bounded.sender.max_capacity() - bounded.sender.capacity())
            .unwrap_or(0);
        bounded + self.fallback.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

/// A module checked out for one run.
///
/// The lease registers the module when it is taken and, when dropped,
/// deregisters it and hands it back to its template. A module whose run
/// failed in a way that may have corrupted the guest is dropped instead.
pub struct Lease<T: Signature> {
    module: Option<Module<T>>,
    template: Arc<Template<T>>,
    poisoned: bool,
}

impl<T: Signature> Lease<T> {
    pub(crate) fn new(mut module: Module<T>, template: &Arc<Template<T>>, binding: &Arc<Binding<T>>) -> Self {
        module.register(template, binding);
        Self {
            module: Some(module),
            template: Arc::clone(template),
            poisoned: false,
        }
    }

    pub fn identity(&self) -> &str {
        self.module.as_ref().map(Module::identity).unwrap_or_default()
    }

    /// Runs the leased module on `ctx`.
    pub fn run(&mut self, ctx: &mut T) -> module::Result<()> {
        let Some(module) = self.module.as_mut() else {
            return Err(module::Error::NotRegistered(String::new()));
        };
        let result = module.run(ctx);
        if let Err(e) = &result {
            self.poisoned |= e.poisons();
        }
        result
    }
}

impl<T: Signature> Drop for Lease<T> {
    fn drop(&mut self) {
        let Some(mut module) = self.module.take() else {
            return;
        };
        module.cleanup();
        if self.poisoned {
            debug!(identity = module.identity(), "dropping poisoned module");
            return;
        }
        self.template.release(module);
    }
}
