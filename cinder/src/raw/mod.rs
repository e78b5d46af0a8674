//! Raw ECMA-335 input format: metadata tokens, CIL opcodes, method bodies.

pub mod token;
pub mod il;
pub mod body;

pub use crate::utilities::FromByteStream;
