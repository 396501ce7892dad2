//! Protocol model: schema types, runtime values, message signatures,
//! fingerprints, and the handshake records.

pub mod handshake;
pub mod model;
pub mod value;

pub use handshake::{HandshakeMatch, HandshakeRequest, HandshakeResponse, ProtocolCache};
pub use model::{Fingerprint, MessageSignature, Protocol, ProtocolBuilder, FINGERPRINT_SIZE};
pub use value::{Field, Value, WireType};
