//! Schema-directed binary codec for values, calls, and responses.

pub mod binary;
pub mod call;

pub use binary::{decode_value, encode_value, Reader, Writer};
pub use call::{
    decode_call, decode_metadata, decode_response, encode_call, encode_metadata,
    encode_response_err, encode_response_ok, CallEnvelope, Metadata,
};
