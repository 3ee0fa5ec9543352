//! # Signature contract
//!
//! The context value threaded through a chain. The runtime never looks inside
//! it: a context only has to serialize itself, deserialize itself, and encode
//! an error in its own wire format so that a failure can travel through the
//! chain like any other value.

/// A context type that can cross the host/guest boundary.
///
/// Contexts are never shared between call frames. At every `next` boundary the
/// current value is written to bytes and a fresh value is materialized on the
/// other side.
pub trait Signature: Send + 'static {
    /// Serializes the context.
    fn write(&self) -> Vec<u8>;

    /// Replaces the context with the decoded contents of `buf`.
    ///
    /// A buffer produced by [`Signature::error`] decodes into `Err` carrying
    /// the encoded error.
    fn read(&mut self, buf: &[u8]) -> anyhow::Result<()>;

    /// Encodes `err` in the context's wire format.
    fn error(&self, err: &dyn std::error::Error) -> Vec<u8>;

    /// Identifies the schema version. Every function in a chain must declare
    /// the same hash.
    fn hash(&self) -> &str;
}

/// Constructor for empty contexts.
pub type New<T> = fn() -> T;
