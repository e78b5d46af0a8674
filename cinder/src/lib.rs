//! A baseline (tier-0) just-in-time compiler for ECMA-335 CIL bytecode.
//!
//! The crate ingests verified CIL method bodies together with the resolver
//! seams needed to turn metadata tokens into native descriptors, and emits
//! x86-64 machine code into a host-provided executable heap, along with the
//! unwind and exception-handling metadata the host unwinder needs to walk
//! frames through jitted code.
//!
//! No optimisation is performed beyond a single-slot top-of-stack register
//! cache and deferred constant materialisation. Each exception handler is
//! emitted as a separate funclet with its own unwind record.

pub mod raw;
pub mod asm;
pub mod abi;
pub mod stack;
pub mod frame;
pub mod resolve;
pub mod compile;
pub mod funclet;
pub mod unwind;
pub mod registry;
pub mod eh;
pub mod errors;

pub(crate) mod utilities;

pub use compile::{Jit, JitConfig};
pub use errors::CompileError;
