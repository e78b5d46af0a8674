//! Calling-convention and return-value classification.
//!
//! The target convention passes the first four integer or pointer arguments
//! in RCX, RDX, R8, R9 and the first four float arguments in XMM0-XMM3,
//! reserves 32 bytes of shadow space below the outgoing arguments, and
//! returns scalars in RAX or XMM0. Structs up to eight bytes return in RAX,
//! up to sixteen in RAX:RDX, and anything larger (or containing GC
//! references) through a caller-allocated hidden buffer whose address
//! travels as an implicit first argument.

use crate::asm::{Reg, Xmm};

pub const ARG_REGS: [Reg; 4] = [Reg::Rcx, Reg::Rdx, Reg::R8, Reg::R9];
pub const FLOAT_ARG_REGS: [Xmm; 4] = [Xmm::Xmm0, Xmm::Xmm1, Xmm::Xmm2, Xmm::Xmm3];

/// Bytes of shadow space the caller owns below the outgoing arguments.
pub const SHADOW_SPACE: u32 = 32;

pub const RETURN_REG: Reg = Reg::Rax;
pub const RETURN_HI_REG: Reg = Reg::Rdx;
pub const FLOAT_RETURN_REG: Xmm = Xmm::Xmm0;

/// The accumulator holding a cached top-of-stack integer value.
pub const ACC: Reg = Reg::Rax;
/// The float counterpart of [`ACC`].
pub const ACC_F: Xmm = Xmm::Xmm0;
/// Scratch register for the second operand of binary operations; doubles
/// as the shift-count register.
pub const SCRATCH: Reg = Reg::Rcx;
/// Address scratch, never an operand of IL-level arithmetic.
pub const ADDR_SCRATCH: Reg = Reg::R10;
pub const ADDR_SCRATCH2: Reg = Reg::R11;
pub const FLOAT_SCRATCH: Xmm = Xmm::Xmm1;

pub const FRAME_PTR: Reg = Reg::Rbp;

/// Finally and fault funclets receive the parent frame pointer here.
pub const FUNCLET_FRAME_ARG: Reg = Reg::Rcx;
/// Catch and filter funclets receive the exception object here and the
/// parent frame pointer in [`CATCH_FRAME_ARG`].
pub const EXCEPTION_ARG: Reg = Reg::Rcx;
pub const CATCH_FRAME_ARG: Reg = Reg::Rdx;

/// How a callee delivers its result, per §4.3 size classes.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum ReturnKind {
	Void,
	/// Integers, pointers, references and structs of at most 8 bytes.
	IntInRax,
	Float32InXmm0,
	Float64InXmm0,
	/// Value type of 1..=8 bytes returned in RAX.
	SmallStructInRax { size: u32 },
	/// Value type of 9..=16 bytes without GC references, low half in RAX.
	MediumStructInRaxRdx { size: u32 },
	/// Caller-allocated buffer; its address is the implicit first argument
	/// and is returned in RAX.
	HiddenBuffer { size: u32 },
}

impl ReturnKind {
	/// Classify a value type of `size` bytes as a return value.
	pub fn for_struct(size: u32, has_gc_refs: bool) -> ReturnKind {
		match size {
			0 => ReturnKind::Void,
			_ if has_gc_refs => ReturnKind::HiddenBuffer { size },
			1..=8 => ReturnKind::SmallStructInRax { size },
			9..=16 => ReturnKind::MediumStructInRaxRdx { size },
			_ => ReturnKind::HiddenBuffer { size },
		}
	}

	#[inline]
	pub fn is_hidden_buffer(&self) -> bool {
		matches!(self, ReturnKind::HiddenBuffer { .. })
	}

	/// Byte size of the returned value, zero for `Void`.
	pub fn size(&self) -> u32 {
		match *self {
			ReturnKind::Void => 0,
			ReturnKind::IntInRax => 8,
			ReturnKind::Float32InXmm0 => 4,
			ReturnKind::Float64InXmm0 => 8,
			ReturnKind::SmallStructInRax { size } => size,
			ReturnKind::MediumStructInRaxRdx { size } => size,
			ReturnKind::HiddenBuffer { size } => size,
		}
	}
}

/// Classification of one formal argument.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum ArgClass {
	/// Pointer-sized integer, managed pointer, or object reference.
	Int,
	Float32,
	Float64,
	/// Value type passed by value; larger than 16 bytes means it travels
	/// through a caller-owned scratch slot and is passed by pointer.
	Struct { size: u32 },
}

impl ArgClass {
	/// Evaluation-stack slots this argument occupies at a call site.
	pub fn stack_slots(&self) -> u32 {
		match *self {
			ArgClass::Struct { size } => crate::utilities::slot_count(size),
			_ => 1,
		}
	}

	/// True when the value itself stays in caller-owned memory and only
	/// its address is handed to the callee.
	pub fn by_pointer(&self) -> bool {
		matches!(*self, ArgClass::Struct { size } if size > 16)
	}

	pub fn is_float(&self) -> bool {
		matches!(self, ArgClass::Float32 | ArgClass::Float64)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn return_size_classes() {
		assert_eq!(ReturnKind::for_struct(0, false), ReturnKind::Void);
		assert_eq!(ReturnKind::for_struct(8, false), ReturnKind::SmallStructInRax { size: 8 });
		assert_eq!(
			ReturnKind::for_struct(16, false),
			ReturnKind::MediumStructInRaxRdx { size: 16 }
		);
		assert_eq!(ReturnKind::for_struct(17, false), ReturnKind::HiddenBuffer { size: 17 });
		// GC references force the hidden buffer regardless of size.
		assert_eq!(ReturnKind::for_struct(16, true), ReturnKind::HiddenBuffer { size: 16 });
		assert_eq!(ReturnKind::for_struct(8, true), ReturnKind::HiddenBuffer { size: 8 });
	}

	#[test]
	fn argument_classes() {
		assert_eq!(ArgClass::Int.stack_slots(), 1);
		assert_eq!(ArgClass::Struct { size: 24 }.stack_slots(), 3);
		assert!(ArgClass::Struct { size: 24 }.by_pointer());
		assert!(!ArgClass::Struct { size: 16 }.by_pointer());
		assert!(ArgClass::Float64.is_float());
	}
}
