//! # Active-module registry
//!
//! Host imports are called by the engine with nothing but the raw call
//! parameters and the caller's store. The registry maps the identity stored
//! there back to the template the module was instantiated from and the
//! instance it is currently bound to.
//!
//! This is the only state shared between concurrently running instances.
//! DashMap shards the map behind reader/writer locks, so trampoline lookups
//! run concurrently and register/cleanup only touch one shard.

use std::sync::Arc;

use dashmap::DashMap;

use crate::instance::Binding;
use crate::signature::Signature;
use crate::template::Template;

/// What a checked-out module is bound to.
pub(crate) struct Active<T: Signature> {
    pub template: Arc<Template<T>>,
    pub binding: Arc<Binding<T>>,
}

impl<T: Signature> Clone for Active<T> {
    fn clone(&self) -> Self {
        Self {
            template: Arc::clone(&self.template),
            binding: Arc::clone(&self.binding),
        }
    }
}

pub(crate) struct Registry<T: Signature> {
    inner: Arc<DashMap<String, Active<T>>>,
}

impl<T: Signature> Clone for Registry<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Signature> Registry<T> {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(DashMap::new()),
        }
    }

    pub fn insert(&self, identity: String, active: Active<T>) {
        self.inner.insert(identity, active);
    }

    pub fn remove(&self, identity: &str) -> bool {
        self.inner.remove(identity).is_some()
    }

    /// Looks up a module by identity.
    ///
    /// The entry is cloned out so no shard lock is held while the caller
    /// recurses into the rest of the chain.
    pub fn get(&self, identity: &str) -> Option<Active<T>> {
        self.inner.get(identity).map(|entry| entry.value().clone())
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }
}
