//! Framed byte transport and TCP plumbing.

pub mod framed;
pub mod tcp;

pub use framed::{FramedConfig, FramedStream};
pub use tcp::{connect, serve};
