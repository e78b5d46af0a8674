//! x86-64 machine-code emission: a growable code buffer with forward-branch
//! fixups and an assembler over it. Knows nothing about CIL.

pub mod buffer;
pub mod x64;

pub use buffer::{CodeBuffer, Fixup};
pub use x64::{Assembler, Cond, Reg, Xmm};
