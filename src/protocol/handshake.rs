//! Handshake records and the fingerprint-keyed protocol cache.
//!
//! A handshake request travels at the front of every request frame; a
//! handshake response travels at the front of every response frame. Once
//! both sides know each other's protocol the records shrink to fingerprints
//! and a match flag, a few dozen bytes per call.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;

use crate::codec::binary::{Reader, Writer};
use crate::error::{Result, RpcError};
use crate::protocol::model::{Fingerprint, Protocol, FINGERPRINT_SIZE};

/// Outcome of comparing the two sides' protocol knowledge.
///
/// Wire form is the variant's index as a varint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeMatch {
    /// Server recognized the client's fingerprint and the client already
    /// holds the server's protocol. Established.
    Both = 0,
    /// Server recognized the client but attaches its own definition, which
    /// the client did not yet have. Established.
    Client = 1,
    /// Server did not recognize the client's fingerprint. The client must
    /// retry once with its definition attached.
    None = 2,
}

impl HandshakeMatch {
    fn from_index(index: usize) -> Result<Self> {
        match index {
            0 => Ok(HandshakeMatch::Both),
            1 => Ok(HandshakeMatch::Client),
            2 => Ok(HandshakeMatch::None),
            other => Err(RpcError::Codec(format!(
                "invalid handshake match index: {other}"
            ))),
        }
    }
}

/// Client half of the handshake, prefixed to every request frame.
#[derive(Debug, Clone, PartialEq)]
pub struct HandshakeRequest {
    /// Fingerprint of the protocol the client speaks.
    pub client_hash: Fingerprint,
    /// Full JSON definition, attached only on a retry after a `None` match.
    pub client_protocol: Option<String>,
    /// Client's best guess at the server's fingerprint. Starts as the
    /// client's own hash and is corrected once the server identifies itself.
    pub server_hash: Fingerprint,
}

impl HandshakeRequest {
    pub fn encode(&self, w: &mut Writer) {
        w.write_raw(self.client_hash.as_bytes());
        encode_opt_string(w, self.client_protocol.as_deref());
        w.write_raw(self.server_hash.as_bytes());
    }

    pub fn decode(r: &mut Reader<'_>) -> Result<Self> {
        Ok(Self {
            client_hash: Fingerprint::from_slice(r.read_raw(FINGERPRINT_SIZE)?)?,
            client_protocol: decode_opt_string(r)?,
            server_hash: Fingerprint::from_slice(r.read_raw(FINGERPRINT_SIZE)?)?,
        })
    }
}

/// Server half of the handshake, prefixed to every response frame.
#[derive(Debug, Clone, PartialEq)]
pub struct HandshakeResponse {
    pub match_: HandshakeMatch,
    /// Server's JSON definition, attached on `Client` and `None` matches.
    pub server_protocol: Option<String>,
    /// Server's fingerprint, attached whenever the definition is.
    pub server_hash: Option<Fingerprint>,
}

impl HandshakeResponse {
    pub fn encode(&self, w: &mut Writer) {
        w.write_varint(self.match_ as i64);
        encode_opt_string(w, self.server_protocol.as_deref());
        match &self.server_hash {
            None => w.write_varint(0),
            Some(hash) => {
                w.write_varint(1);
                w.write_raw(hash.as_bytes());
            }
        }
    }

    pub fn decode(r: &mut Reader<'_>) -> Result<Self> {
        let match_ = HandshakeMatch::from_index(r.read_len()?)?;
        let server_protocol = decode_opt_string(r)?;
        let server_hash = match r.read_len()? {
            0 => None,
            1 => Some(Fingerprint::from_slice(r.read_raw(FINGERPRINT_SIZE)?)?),
            other => {
                return Err(RpcError::Codec(format!(
                    "invalid optional-hash union index: {other}"
                )))
            }
        };
        Ok(Self {
            match_,
            server_protocol,
            server_hash,
        })
    }
}

// Optional string: union index 0 (absent) or 1 followed by the string.
fn encode_opt_string(w: &mut Writer, s: Option<&str>) {
    match s {
        None => w.write_varint(0),
        Some(s) => {
            w.write_varint(1);
            w.write_string(s);
        }
    }
}

fn decode_opt_string(r: &mut Reader<'_>) -> Result<Option<String>> {
    match r.read_len()? {
        0 => Ok(None),
        1 => Ok(Some(r.read_string()?)),
        other => Err(RpcError::Codec(format!(
            "invalid optional-string union index: {other}"
        ))),
    }
}

/// Fingerprint-keyed cache of remote protocol definitions.
///
/// Shared across connections so a peer's definition is parsed once and
/// subsequent handshakes carry fingerprints only.
#[derive(Debug, Default)]
pub struct ProtocolCache {
    inner: Mutex<HashMap<Fingerprint, Arc<Protocol>>>,
}

impl ProtocolCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, hash: &Fingerprint) -> Option<Arc<Protocol>> {
        self.inner.lock().unwrap().get(hash).cloned()
    }

    pub fn insert(&self, protocol: Arc<Protocol>) {
        self.inner
            .lock()
            .unwrap()
            .insert(protocol.fingerprint(), protocol);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::value::WireType;

    fn fp(byte: u8) -> Fingerprint {
        Fingerprint([byte; FINGERPRINT_SIZE])
    }

    #[test]
    fn test_request_roundtrip_without_definition() {
        let req = HandshakeRequest {
            client_hash: fp(1),
            client_protocol: None,
            server_hash: fp(2),
        };
        let mut w = Writer::new();
        req.encode(&mut w);
        let bytes = w.into_bytes();
        // 16 + 1 (union) + 16
        assert_eq!(bytes.len(), 33);

        let mut r = Reader::new(&bytes);
        assert_eq!(HandshakeRequest::decode(&mut r).unwrap(), req);
        assert!(r.is_empty());
    }

    #[test]
    fn test_request_roundtrip_with_definition() {
        let req = HandshakeRequest {
            client_hash: fp(1),
            client_protocol: Some("{\"name\":\"Test\",\"messages\":[]}".to_string()),
            server_hash: fp(1),
        };
        let mut w = Writer::new();
        req.encode(&mut w);
        let bytes = w.into_bytes();
        let mut r = Reader::new(&bytes);
        assert_eq!(HandshakeRequest::decode(&mut r).unwrap(), req);
    }

    #[test]
    fn test_response_roundtrip_all_matches() {
        for (match_, attach) in [
            (HandshakeMatch::Both, false),
            (HandshakeMatch::Client, true),
            (HandshakeMatch::None, true),
        ] {
            let resp = HandshakeResponse {
                match_,
                server_protocol: attach.then(|| "{}".to_string()),
                server_hash: attach.then(|| fp(9)),
            };
            let mut w = Writer::new();
            resp.encode(&mut w);
            let bytes = w.into_bytes();
            let mut r = Reader::new(&bytes);
            assert_eq!(HandshakeResponse::decode(&mut r).unwrap(), resp);
            assert!(r.is_empty());
        }
    }

    #[test]
    fn test_invalid_match_index_rejected() {
        let mut w = Writer::new();
        w.write_varint(5);
        w.write_varint(0);
        w.write_varint(0);
        let bytes = w.into_bytes();
        let mut r = Reader::new(&bytes);
        assert!(HandshakeResponse::decode(&mut r).is_err());
    }

    #[test]
    fn test_cache_lookup_by_fingerprint() {
        let protocol = Protocol::builder("Test")
            .message("ping", vec![], WireType::Null, vec![])
            .build()
            .unwrap();
        let cache = ProtocolCache::new();
        assert!(cache.get(&protocol.fingerprint()).is_none());
        cache.insert(protocol.clone());
        let found = cache.get(&protocol.fingerprint()).unwrap();
        assert_eq!(found.name(), "Test");
    }
}
