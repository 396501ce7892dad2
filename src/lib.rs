//! Schema-described RPC over framed byte streams.
//!
//! Two peers each hold a [`Protocol`]: a named set of message signatures
//! identified by a content fingerprint. A handshake record rides at the
//! front of every request and response frame; when fingerprints disagree the
//! sides exchange full JSON definitions, at most once, and either settle or
//! fail with [`RpcError::ProtocolMismatch`]. Calls and responses are encoded
//! by a schema-directed binary codec, so the wire carries no type tags.
//!
//! The client side is a [`Proxy`], which serializes invocations over one
//! connection. The server side is a [`Responder`], built from a protocol and
//! one async handler per message, shared across connections.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use reflectrpc::{Field, Protocol, Responder, Value, WireType};
//! use reflectrpc::transport::{serve, connect};
//!
//! #[tokio::main]
//! async fn main() -> reflectrpc::Result<()> {
//!     let protocol = Protocol::builder("Greeter")
//!         .message(
//!             "hello",
//!             vec![Field::new("name", WireType::String)],
//!             WireType::String,
//!             vec![],
//!         )
//!         .build()?;
//!
//!     let responder = Responder::builder(protocol.clone())
//!         .on("hello", |_args| async { Ok(Value::String("goodbye".into())) })
//!         .build()?;
//!
//!     let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
//!     let addr = listener.local_addr()?;
//!     tokio::spawn(serve(listener, responder));
//!
//!     let proxy = connect(addr, protocol).await?;
//!     let greeting = proxy.invoke("hello", vec!["bob".into()]).await?;
//!     assert_eq!(greeting, Value::String("goodbye".into()));
//!     Ok(())
//! }
//! ```

pub mod codec;
pub mod error;
pub mod handler;
pub mod protocol;
pub mod proxy;
pub mod responder;
pub mod transport;

pub use codec::Metadata;
pub use error::{RemoteError, Result, RpcError};
pub use handler::{HandlerRegistry, HandlerResult};
pub use protocol::{
    Field, Fingerprint, HandshakeMatch, Protocol, ProtocolBuilder, ProtocolCache, Value, WireType,
};
pub use proxy::Proxy;
pub use responder::{Responder, ResponderBuilder};
