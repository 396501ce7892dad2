//! Client side of the engine: typed calls over one framed connection.
//!
//! A [`Proxy`] owns the connection and serializes calls through it: each
//! invocation sends one request frame (handshake record first, call payload
//! after) and waits for the matching response frame. The first exchange on a
//! connection settles which protocols both sides speak; after that the
//! handshake shrinks to a pair of fingerprints.
//!
//! # Example
//!
//! ```no_run
//! # use std::sync::Arc;
//! # use reflectrpc::{Proxy, Protocol};
//! # use reflectrpc::transport::{FramedConfig, FramedStream};
//! # async fn example(protocol: Arc<Protocol>) -> reflectrpc::Result<()> {
//! let stream = tokio::net::TcpStream::connect("127.0.0.1:9090").await?;
//! let proxy = Proxy::new(protocol, FramedStream::new(stream, FramedConfig::default()));
//! let greeting = proxy.invoke("hello", vec!["bob".into()]).await?;
//! # let _ = greeting;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::Mutex;

use crate::codec::binary::{Reader, Writer};
use crate::codec::call::{decode_response, encode_call, Metadata};
use crate::error::{Result, RpcError};
use crate::protocol::handshake::{HandshakeMatch, HandshakeRequest, HandshakeResponse, ProtocolCache};
use crate::protocol::{Fingerprint, Protocol, Value};
use crate::transport::framed::FramedStream;

/// Client handle for invoking messages on a remote responder.
pub struct Proxy<S> {
    protocol: Arc<Protocol>,
    cache: Arc<ProtocolCache>,
    state: Mutex<ProxyState<S>>,
}

struct ProxyState<S> {
    framed: FramedStream<S>,
    /// Protocol the server speaks, once learned.
    remote: Option<Arc<Protocol>>,
    /// Server fingerprint to send; starts as a guess of our own hash.
    server_hash: Option<Fingerprint>,
    /// Attach our definition to the next handshake.
    send_protocol: bool,
}

impl<S: AsyncRead + AsyncWrite + Unpin> Proxy<S> {
    pub fn new(protocol: Arc<Protocol>, framed: FramedStream<S>) -> Self {
        Self::with_cache(protocol, framed, Arc::new(ProtocolCache::new()))
    }

    /// Share a protocol cache across proxies so a server definition seen on
    /// one connection is not re-parsed on the next.
    pub fn with_cache(
        protocol: Arc<Protocol>,
        framed: FramedStream<S>,
        cache: Arc<ProtocolCache>,
    ) -> Self {
        Self {
            protocol,
            cache,
            state: Mutex::new(ProxyState {
                framed,
                remote: None,
                server_hash: None,
                send_protocol: false,
            }),
        }
    }

    /// The protocol this proxy speaks.
    pub fn protocol(&self) -> &Arc<Protocol> {
        &self.protocol
    }

    /// Fingerprint of the server's protocol, once the handshake has settled.
    pub async fn remote_fingerprint(&self) -> Option<Fingerprint> {
        self.state.lock().await.remote.as_ref().map(|p| p.fingerprint())
    }

    /// The server's protocol, once the handshake has settled.
    pub async fn remote_protocol(&self) -> Option<Arc<Protocol>> {
        self.state.lock().await.remote.clone()
    }

    /// Request frames sent on this connection.
    pub async fn frames_sent(&self) -> u64 {
        self.state.lock().await.framed.frames_sent()
    }

    /// Invoke a message and wait for its result.
    pub async fn invoke(&self, message: &str, args: Vec<Value>) -> Result<Value> {
        self.invoke_with_meta(message, args, Metadata::new())
            .await
            .map(|(_, value)| value)
    }

    /// Invoke a message carrying per-call metadata, returning the response
    /// metadata alongside the result.
    ///
    /// Argument count and types are checked against the local signature
    /// before anything touches the wire.
    pub async fn invoke_with_meta(
        &self,
        message: &str,
        args: Vec<Value>,
        meta: Metadata,
    ) -> Result<(Metadata, Value)> {
        let signature = self.protocol.get_message(message)?;
        let mut call = Writer::new();
        encode_call(&mut call, signature, &args, &meta)?;
        let call = call.into_bytes();

        let mut state = self.state.lock().await;
        let mut retried = false;
        loop {
            let handshake = HandshakeRequest {
                client_hash: self.protocol.fingerprint(),
                client_protocol: if state.send_protocol {
                    Some(self.protocol.to_json()?)
                } else {
                    None
                },
                server_hash: state
                    .server_hash
                    .unwrap_or_else(|| self.protocol.fingerprint()),
            };
            let mut w = Writer::new();
            handshake.encode(&mut w);
            w.write_raw(&call);
            state.framed.send(&[Bytes::from(w.into_bytes())]).await?;

            let segments = state
                .framed
                .receive()
                .await?
                .ok_or(RpcError::ConnectionClosed)?;
            let buf: Vec<u8> = segments.concat();
            let mut r = Reader::new(&buf);
            let response = HandshakeResponse::decode(&mut r)?;

            if let Some(hash) = response.server_hash {
                state.server_hash = Some(hash);
            }
            if let Some(text) = &response.server_protocol {
                let remote = match response.server_hash.and_then(|h| self.cache.get(&h)) {
                    Some(cached) => cached,
                    None => {
                        let parsed = Protocol::from_json(text)?;
                        self.cache.insert(parsed.clone());
                        parsed
                    }
                };
                state.remote = Some(remote);
            }

            match response.match_ {
                HandshakeMatch::None => {
                    // Handshake-only reply; the call was not processed.
                    if retried {
                        return Err(RpcError::ProtocolMismatch);
                    }
                    tracing::debug!(message, "server requested protocol definition, retrying");
                    retried = true;
                    state.send_protocol = true;
                }
                HandshakeMatch::Both | HandshakeMatch::Client => {
                    state.send_protocol = false;
                    let remote = match &state.remote {
                        Some(remote) => remote.clone(),
                        None => {
                            // Matched on our own hash guess: same protocol.
                            state.remote = Some(self.protocol.clone());
                            self.protocol.clone()
                        }
                    };
                    if state.server_hash.is_none() {
                        state.server_hash = Some(self.protocol.fingerprint());
                    }
                    // The server encodes with its own signature; fall back
                    // to ours when it does not declare the message (the
                    // error union's string branch decodes either way).
                    let remote_signature = remote.get_message(message).unwrap_or(signature);
                    let (response_meta, result) = decode_response(remote_signature, &mut r)?;
                    return match result {
                        Ok(value) => Ok((response_meta, value)),
                        Err(remote_err) => Err(RpcError::Remote(remote_err)),
                    };
                }
            }
        }
    }
}
