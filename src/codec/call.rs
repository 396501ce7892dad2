//! Call and response payload codec.
//!
//! A request payload is `metadata, message name, arguments` with each
//! argument encoded against the matching request parameter type. A response
//! payload is `metadata, error flag, result`: flag clear means the response
//! type follows, flag set means an error union follows.
//!
//! The error union puts the untyped string branch at index 0 and the
//! message's declared error types at 1..=n. Branch 0 needs no message
//! context, so a failure can be reported even when the request named a
//! message the responder does not have.

use crate::codec::binary::{decode_value, encode_value, Reader, Writer};
use crate::error::{RemoteError, Result, RpcError};
use crate::protocol::{MessageSignature, Protocol, Value};

/// Per-call metadata: opaque string-keyed byte values, both directions.
pub type Metadata = Vec<(String, Vec<u8>)>;

pub fn encode_metadata(w: &mut Writer, meta: &Metadata) {
    if !meta.is_empty() {
        w.write_varint(meta.len() as i64);
        for (key, value) in meta {
            w.write_string(key);
            w.write_bytes(value);
        }
    }
    w.write_varint(0);
}

pub fn decode_metadata(r: &mut Reader<'_>) -> Result<Metadata> {
    let mut meta = Metadata::new();
    loop {
        let count = r.read_len()?;
        if count == 0 {
            break;
        }
        for _ in 0..count {
            let key = r.read_string()?;
            let value = r.read_bytes()?.to_vec();
            meta.push((key, value));
        }
    }
    Ok(meta)
}

/// A decoded request: what the responder dispatches on.
#[derive(Debug)]
pub struct CallEnvelope {
    pub meta: Metadata,
    pub message: String,
    pub args: Vec<Value>,
}

/// Encode a call against its message signature.
///
/// The argument count is checked against the signature before any bytes are
/// written; a mismatch never reaches the wire.
pub fn encode_call(
    w: &mut Writer,
    message: &MessageSignature,
    args: &[Value],
    meta: &Metadata,
) -> Result<()> {
    if args.len() != message.request.len() {
        return Err(RpcError::ArgumentCountMismatch {
            message: message.name.clone(),
            expected: message.request.len(),
            actual: args.len(),
        });
    }
    encode_metadata(w, meta);
    w.write_string(&message.name);
    for (arg, param) in args.iter().zip(&message.request) {
        encode_value(w, arg, &param.ty)?;
    }
    Ok(())
}

/// Decode a call using the protocol the *caller* speaks.
///
/// An unknown message name propagates as [`RpcError::UnknownMessage`];
/// any other decoding failure is a [`RpcError::MalformedCall`].
pub fn decode_call(protocol: &Protocol, r: &mut Reader<'_>) -> Result<CallEnvelope> {
    let meta = decode_metadata(r).map_err(malformed_call)?;
    let name = r.read_string().map_err(malformed_call)?;
    let message = protocol.get_message(&name)?;
    let mut args = Vec::with_capacity(message.request.len());
    for param in &message.request {
        args.push(decode_value(r, &param.ty).map_err(malformed_call)?);
    }
    Ok(CallEnvelope {
        meta,
        message: name,
        args,
    })
}

fn malformed_call(err: RpcError) -> RpcError {
    RpcError::MalformedCall(err.to_string())
}

fn malformed_response(err: RpcError) -> RpcError {
    RpcError::MalformedResponse(err.to_string())
}

/// Encode a successful response.
pub fn encode_response_ok(
    w: &mut Writer,
    message: &MessageSignature,
    meta: &Metadata,
    value: &Value,
) -> Result<()> {
    encode_metadata(w, meta);
    w.write_bool(false);
    encode_value(w, value, &message.response)
}

/// Encode an error response.
///
/// A value in the message's declared error set is written typed on its
/// union branch; everything else (including errors with no message context)
/// is written on the string branch at index 0.
pub fn encode_response_err(
    w: &mut Writer,
    message: Option<&MessageSignature>,
    meta: &Metadata,
    error: &RemoteError,
) -> Result<()> {
    encode_metadata(w, meta);
    w.write_bool(true);
    let declared = match (message, error) {
        (Some(sig), RemoteError::Declared(value)) => {
            sig.declared_error_index(value).map(|i| (sig, i, value))
        }
        _ => None,
    };
    match declared {
        Some((sig, index, value)) => {
            w.write_varint(index as i64 + 1);
            encode_value(w, value, &sig.errors[index])
        }
        None => {
            w.write_varint(0);
            w.write_string(&error.description());
            Ok(())
        }
    }
}

/// Decode a response against the message signature the call was made with.
pub fn decode_response(
    message: &MessageSignature,
    r: &mut Reader<'_>,
) -> Result<(Metadata, std::result::Result<Value, RemoteError>)> {
    let meta = decode_metadata(r).map_err(malformed_response)?;
    let is_error = r.read_bool().map_err(malformed_response)?;
    if !is_error {
        let value = decode_value(r, &message.response).map_err(malformed_response)?;
        return Ok((meta, Ok(value)));
    }
    let branch = r.read_len().map_err(malformed_response)?;
    if branch == 0 {
        let text = r.read_string().map_err(malformed_response)?;
        return Ok((meta, Err(RemoteError::Undeclared(text))));
    }
    let ty = message.errors.get(branch - 1).ok_or_else(|| {
        RpcError::MalformedResponse(format!(
            "error union branch {branch} out of range for message {}",
            message.name
        ))
    })?;
    let value = decode_value(r, ty).map_err(malformed_response)?;
    Ok((meta, Err(RemoteError::Declared(value))))
}
