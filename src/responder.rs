//! Server side of the engine: handshake resolution and call dispatch.
//!
//! A responder is built once from a protocol and a handler per message, then
//! shared across connections. Each request frame is answered with exactly
//! one response frame; application failures and dispatch problems travel in
//! the response, so a misbehaving call never costs the connection.
//!
//! # Example
//!
//! ```no_run
//! # use std::sync::Arc;
//! # use reflectrpc::{Protocol, Responder, Value, WireType, Field};
//! # fn example() -> reflectrpc::Result<Arc<Responder>> {
//! let protocol = Protocol::builder("Greeter")
//!     .message(
//!         "hello",
//!         vec![Field::new("name", WireType::String)],
//!         WireType::String,
//!         vec![],
//!     )
//!     .build()?;
//!
//! Responder::builder(protocol)
//!     .on("hello", |_args| async { Ok(Value::String("goodbye".into())) })
//!     .build()
//! # }
//! ```

use std::future::Future;
use std::sync::Arc;

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::codec::binary::{Reader, Writer};
use crate::codec::call::{decode_call, encode_response_err, encode_response_ok, Metadata};
use crate::error::{RemoteError, Result, RpcError};
use crate::handler::registry::{HandlerRegistry, HandlerResult};
use crate::protocol::handshake::{
    HandshakeMatch, HandshakeRequest, HandshakeResponse, ProtocolCache,
};
use crate::protocol::{Protocol, Value};
use crate::transport::framed::FramedStream;

/// Dispatches decoded calls to registered handlers.
pub struct Responder {
    protocol: Arc<Protocol>,
    protocol_json: String,
    handlers: HandlerRegistry,
    cache: ProtocolCache,
}

impl Responder {
    /// Start building a responder for a protocol.
    pub fn builder(protocol: Arc<Protocol>) -> ResponderBuilder {
        ResponderBuilder {
            protocol,
            handlers: HandlerRegistry::new(),
        }
    }

    /// The protocol this responder serves.
    pub fn protocol(&self) -> &Arc<Protocol> {
        &self.protocol
    }

    /// Answer one request frame with one response frame.
    ///
    /// Anything that can be reported to the caller is; only failures that
    /// leave the stream unusable (or a response impossible) return `Err`.
    pub async fn respond(&self, segments: &[Bytes]) -> Result<Vec<Bytes>> {
        let buf: Vec<u8> = segments.iter().flat_map(|s| s.iter().copied()).collect();
        let mut r = Reader::new(&buf);

        let request = HandshakeRequest::decode(&mut r)?;
        if let Some(text) = &request.client_protocol {
            self.cache.insert(Protocol::from_json(text)?);
        }

        let remote = self.resolve_client(&request.client_hash);
        let mut w = Writer::new();

        let remote = match remote {
            Some(remote) => remote,
            None => {
                // Can't decode the call without the client's protocol; answer
                // with the handshake alone and let the client retry.
                tracing::debug!(
                    client_hash = %request.client_hash,
                    "unknown client protocol, requesting definition"
                );
                HandshakeResponse {
                    match_: HandshakeMatch::None,
                    server_protocol: Some(self.protocol_json.clone()),
                    server_hash: Some(self.protocol.fingerprint()),
                }
                .encode(&mut w);
                return Ok(vec![Bytes::from(w.into_bytes())]);
            }
        };

        let match_ = if request.server_hash == self.protocol.fingerprint() {
            HandshakeMatch::Both
        } else {
            HandshakeMatch::Client
        };
        let attach = match_ == HandshakeMatch::Client;
        HandshakeResponse {
            match_,
            server_protocol: attach.then(|| self.protocol_json.clone()),
            server_hash: attach.then(|| self.protocol.fingerprint()),
        }
        .encode(&mut w);

        match self.dispatch(&remote, &mut r).await {
            Ok(payload) => w.write_raw(&payload),
            Err(err) => {
                // Report in-band on the string branch; the connection and
                // the handshake prefix built above both stay valid.
                tracing::warn!(error = %err, "call failed, reporting as system error");
                let mut pw = Writer::new();
                encode_response_err(
                    &mut pw,
                    None,
                    &Metadata::new(),
                    &RemoteError::Undeclared(err.to_string()),
                )?;
                w.write_raw(pw.as_bytes());
            }
        }
        Ok(vec![Bytes::from(w.into_bytes())])
    }

    /// Serve one connection until the peer closes cleanly.
    pub async fn run_connection<S>(&self, framed: &mut FramedStream<S>) -> Result<()>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        while let Some(segments) = framed.receive().await? {
            let reply = self.respond(&segments).await?;
            framed.send(&reply).await?;
        }
        Ok(())
    }

    fn resolve_client(&self, hash: &crate::protocol::Fingerprint) -> Option<Arc<Protocol>> {
        if *hash == self.protocol.fingerprint() {
            return Some(self.protocol.clone());
        }
        self.cache.get(hash)
    }

    /// Decode the call with the client's protocol, run the handler, and
    /// encode the response payload with our own message signature.
    async fn dispatch(&self, remote: &Protocol, r: &mut Reader<'_>) -> Result<Vec<u8>> {
        let envelope = decode_call(remote, r)?;
        let message = self.protocol.get_message(&envelope.message)?;
        let handler = self
            .handlers
            .get(&envelope.message)
            .ok_or_else(|| RpcError::HandlerMissing(envelope.message.clone()))?;

        tracing::debug!(message = %envelope.message, "dispatching call");
        let result = handler(envelope.args).await;

        let mut pw = Writer::new();
        match result {
            Ok(value) => {
                if let Err(err) = encode_response_ok(&mut pw, message, &Metadata::new(), &value) {
                    // Partial response bytes are poison; start over with a
                    // system error.
                    tracing::warn!(
                        message = %envelope.message,
                        error = %err,
                        "handler result does not fit the response type"
                    );
                    pw = Writer::new();
                    encode_response_err(
                        &mut pw,
                        None,
                        &Metadata::new(),
                        &RemoteError::Undeclared(err.to_string()),
                    )?;
                }
            }
            Err(error) => {
                encode_response_err(&mut pw, Some(message), &Metadata::new(), &error)?;
            }
        }
        Ok(pw.into_bytes())
    }
}

/// Builds a [`Responder`], collecting handlers message by message.
pub struct ResponderBuilder {
    protocol: Arc<Protocol>,
    handlers: HandlerRegistry,
}

impl ResponderBuilder {
    /// Register the handler for one protocol message.
    pub fn on<F, Fut>(mut self, name: impl Into<String>, handler: F) -> Self
    where
        F: Fn(Vec<Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.handlers.insert(name, handler);
        self
    }

    /// Finish building.
    ///
    /// Fails if any protocol message lacks a handler or any handler names a
    /// message the protocol does not declare. Capability gaps surface here,
    /// not when a call arrives.
    pub fn build(self) -> Result<Arc<Responder>> {
        for message in self.protocol.messages() {
            if !self.handlers.contains(&message.name) {
                return Err(RpcError::HandlerMissing(message.name.clone()));
            }
        }
        for name in self.handlers.names() {
            self.protocol.get_message(name)?;
        }
        let protocol_json = self.protocol.to_json()?;
        Ok(Arc::new(Responder {
            protocol: self.protocol,
            protocol_json,
            handlers: self.handlers,
            cache: ProtocolCache::new(),
        }))
    }
}
