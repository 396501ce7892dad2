//! Async message handlers and their registry.

pub mod registry;

pub use registry::{BoxFuture, HandlerFn, HandlerRegistry, HandlerResult};
