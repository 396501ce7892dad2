//! Handler registry: message names mapped to boxed async handlers.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;

use crate::error::RemoteError;
use crate::protocol::Value;

/// Boxed future type used by handlers.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// What a handler produces: a response value, or a failure to classify
/// against the message's declared error set.
pub type HandlerResult = std::result::Result<Value, RemoteError>;

/// Type-erased async handler taking decoded arguments in request order.
pub type HandlerFn = Box<dyn Fn(Vec<Value>) -> BoxFuture<'static, HandlerResult> + Send + Sync>;

/// Message-name-keyed handler table.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<String, HandlerFn>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler, replacing any previous one for the same name.
    pub fn insert<F, Fut>(&mut self, name: impl Into<String>, handler: F)
    where
        F: Fn(Vec<Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.handlers
            .insert(name.into(), Box::new(move |args| Box::pin(handler(args))));
    }

    pub fn get(&self, name: &str) -> Option<&HandlerFn> {
        self.handlers.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.handlers.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_register_and_dispatch() {
        let mut registry = HandlerRegistry::new();
        registry.insert("hello", |_args| async { Ok(Value::String("goodbye".into())) });

        assert!(registry.contains("hello"));
        let handler = registry.get("hello").unwrap();
        let result = handler(vec!["bob".into()]).await.unwrap();
        assert_eq!(result, Value::String("goodbye".into()));
    }

    #[tokio::test]
    async fn test_handler_receives_arguments() {
        let mut registry = HandlerRegistry::new();
        registry.insert("echo", |mut args: Vec<Value>| async move {
            Ok(args.remove(0))
        });

        let handler = registry.get("echo").unwrap();
        let result = handler(vec![Value::Long(7)]).await.unwrap();
        assert_eq!(result, Value::Long(7));
    }

    #[test]
    fn test_missing_handler_lookup() {
        let registry = HandlerRegistry::new();
        assert!(registry.get("nope").is_none());
    }
}
