//! # chainrun
//!
//! Runs chains of independently compiled WebAssembly functions as one
//! pipeline. A context value enters the first function; any function may call
//! `next` to hand the context to the rest of the chain and get the result
//! back before finishing its own work. The last `next` in the chain lands in
//! a continuation supplied by the caller.
//!
//! ## Example
//!
//! ```rust,ignore
//! use chainrun::{Config, Function, Runtime};
//!
//! let config = Config::new(MyContext::new)
//!     .with_function(Function::new("auth", "v1", MyContext::HASH, auth_wasm).middleware(true))
//!     .with_function(Function::new("handler", "v1", MyContext::HASH, handler_wasm));
//! let runtime = Runtime::new(config)?;
//!
//! let mut ctx = MyContext::new();
//! runtime.instance()?.run(&mut ctx)?;
//! ```

pub mod abi;
pub mod config;
pub mod context;
pub mod function;
pub mod host;
pub mod instance;
pub mod module;
pub mod pool;
pub(crate) mod registry;
pub mod runtime;
pub mod signature;
pub mod template;

pub use config::Config;
pub use context::ChainCtx;
pub use function::Function;
pub use function::Language;
pub use host::HostFunction;
pub use instance::Instance;
pub use instance::InstanceId;
pub use runtime::Runtime;
pub use signature::Signature;
pub use template::Template;
