//! Protocol model: message signatures, the protocol value, fingerprints.
//!
//! A [`Protocol`] is immutable once built. Its fingerprint is a pure function
//! of the protocol name and the declaration-ordered message signatures, so
//! two independently constructed protocols with identical signatures hash
//! identically and a definition received over the wire reproduces the hash
//! its sender computed.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{Result, RpcError};
use crate::protocol::value::{Field, WireType};

/// Width of a protocol fingerprint in bytes (128 bits).
pub const FINGERPRINT_SIZE: usize = 16;

/// Content hash identifying a protocol definition.
///
/// SHA-256 of the canonical JSON definition, truncated to 128 bits. Two
/// protocols are wire-compatible iff their fingerprints are equal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint(pub [u8; FINGERPRINT_SIZE]);

impl Fingerprint {
    pub fn as_bytes(&self) -> &[u8; FINGERPRINT_SIZE] {
        &self.0
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let arr: [u8; FINGERPRINT_SIZE] = bytes
            .try_into()
            .map_err(|_| RpcError::Codec(format!("fingerprint must be {FINGERPRINT_SIZE} bytes")))?;
        Ok(Fingerprint(arr))
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

/// One RPC message: request parameters, response type, declared errors.
///
/// Declared errors are the only failure payloads that cross the wire as
/// typed values; anything else degrades to a string description.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageSignature {
    pub name: String,
    pub request: Vec<Field>,
    pub response: WireType,
    #[serde(default)]
    pub errors: Vec<WireType>,
}

impl MessageSignature {
    /// Find the declared error type a failure value belongs to, if any.
    pub fn declared_error_index(&self, value: &crate::protocol::Value) -> Option<usize> {
        self.errors.iter().position(|ty| value.is_instance_of(ty))
    }
}

/// Exchange form of a protocol: what crosses the wire as JSON text.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ProtocolDef {
    name: String,
    messages: Vec<MessageSignature>,
}

/// A named set of message signatures plus a content-derived fingerprint.
///
/// Messages keep their declaration order (the fingerprint depends on it);
/// lookup by name is O(1) through a side index.
#[derive(Debug)]
pub struct Protocol {
    name: String,
    messages: Vec<MessageSignature>,
    index: HashMap<String, usize>,
    fingerprint: Fingerprint,
}

impl Protocol {
    fn from_def(def: ProtocolDef) -> Result<Arc<Self>> {
        let mut index = HashMap::with_capacity(def.messages.len());
        for (i, message) in def.messages.iter().enumerate() {
            if index.insert(message.name.clone(), i).is_some() {
                return Err(RpcError::Codec(format!(
                    "duplicate message in protocol {}: {}",
                    def.name, message.name
                )));
            }
        }
        // Canonical JSON of the declaration-ordered definition; no map
        // iteration order can leak into the hash.
        let canonical = serde_json::to_vec(&def)?;
        let digest = Sha256::digest(&canonical);
        let mut hash = [0u8; FINGERPRINT_SIZE];
        hash.copy_from_slice(&digest[..FINGERPRINT_SIZE]);

        Ok(Arc::new(Self {
            name: def.name,
            messages: def.messages,
            index,
            fingerprint: Fingerprint(hash),
        }))
    }

    /// Protocol name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Messages in declaration order.
    pub fn messages(&self) -> &[MessageSignature] {
        &self.messages
    }

    /// Look up a message signature by name.
    pub fn get_message(&self, name: &str) -> Result<&MessageSignature> {
        self.index
            .get(name)
            .map(|&i| &self.messages[i])
            .ok_or_else(|| RpcError::UnknownMessage(name.to_string()))
    }

    /// Content fingerprint of this protocol.
    pub fn fingerprint(&self) -> Fingerprint {
        self.fingerprint
    }

    /// Canonical JSON definition, as attached to handshakes.
    pub fn to_json(&self) -> Result<String> {
        let def = ProtocolDef {
            name: self.name.clone(),
            messages: self.messages.clone(),
        };
        Ok(serde_json::to_string(&def)?)
    }

    /// Rebuild a protocol from its JSON definition.
    ///
    /// The fingerprint is recomputed from the parsed definition, so it
    /// matches the sender's regardless of JSON whitespace.
    pub fn from_json(text: &str) -> Result<Arc<Self>> {
        let def: ProtocolDef = serde_json::from_str(text)?;
        Self::from_def(def)
    }

    /// Start building a protocol.
    pub fn builder(name: impl Into<String>) -> ProtocolBuilder {
        ProtocolBuilder {
            name: name.into(),
            messages: Vec::new(),
        }
    }
}

/// Builds a [`Protocol`] one message at a time.
///
/// This is the explicit stand-in for a reflective scan of a handler type:
/// message order follows declaration order, deterministically.
pub struct ProtocolBuilder {
    name: String,
    messages: Vec<MessageSignature>,
}

impl ProtocolBuilder {
    /// Declare a message.
    pub fn message(
        mut self,
        name: impl Into<String>,
        request: Vec<Field>,
        response: WireType,
        errors: Vec<WireType>,
    ) -> Self {
        self.messages.push(MessageSignature {
            name: name.into(),
            request,
            response,
            errors,
        });
        self
    }

    /// Finish, computing the fingerprint.
    ///
    /// Fails on duplicate message names.
    pub fn build(self) -> Result<Arc<Protocol>> {
        Protocol::from_def(ProtocolDef {
            name: self.name,
            messages: self.messages,
        })
    }
}
