//! Serialised unwind metadata the OS unwinder consumes for each compiled
//! function and funclet.
//!
//! The format follows the x64 UNWIND_INFO shape: a four-byte header, then
//! two-byte unwind code nodes describing the prolog in reverse order. A
//! funclet's record carries the handler-funclet flag so the unwinder binds
//! it to the parent frame instead of treating it as a standalone function.

use bitflags::bitflags;

/// Maximum (inclusive) size of a "small" stack allocation node.
const SMALL_ALLOC_MAX_SIZE: u32 = 128;
/// Maximum (inclusive) allocation representable with one extra 16-bit node.
const LARGE_ALLOC_16BIT_MAX_SIZE: u32 = 524280;

/// Hardware encoding of RBP, the only frame register this tier uses.
const FRAME_REG_RBP: u8 = 5;

bitflags! {
	#[derive(Debug, Default, Copy, Clone, Eq, PartialEq)]
	pub struct UnwindFlags: u8 {
		/// This record describes a handler funclet; its frame belongs to
		/// the parent method.
		const HANDLER_FUNCLET = 0x1;
	}
}

/// One prolog operation, recorded in emission order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnwindCode {
	PushNonvolatile {
		/// Prolog offset just past the instruction.
		offset: u8,
		reg: u8,
	},
	StackAlloc {
		offset: u8,
		size: u32,
	},
	SetFramePointer {
		offset: u8,
	},
}

impl UnwindCode {
	fn node_count(&self) -> usize {
		match self {
			Self::StackAlloc { size, .. } => {
				if *size <= SMALL_ALLOC_MAX_SIZE {
					1
				} else if *size <= LARGE_ALLOC_16BIT_MAX_SIZE {
					2
				} else {
					3
				}
			}
			_ => 1,
		}
	}

	fn emit(&self, out: &mut Vec<u8>) {
		enum Op {
			PushNonvolatile = 0,
			LargeStackAlloc = 1,
			SmallStackAlloc = 2,
			SetFramePointer = 3,
		}

		match self {
			Self::PushNonvolatile { offset, reg } => {
				out.push(*offset);
				out.push((*reg << 4) | Op::PushNonvolatile as u8);
			}
			Self::StackAlloc { offset, size } => {
				// Allocations are a multiple of 8 and at least one slot.
				assert!(*size >= 8 && *size % 8 == 0);
				out.push(*offset);
				if *size <= SMALL_ALLOC_MAX_SIZE {
					out.push(((((*size - 8) / 8) as u8) << 4) | Op::SmallStackAlloc as u8);
				} else if *size <= LARGE_ALLOC_16BIT_MAX_SIZE {
					out.push(Op::LargeStackAlloc as u8);
					out.extend_from_slice(&(((*size / 8) as u16).to_le_bytes()));
				} else {
					out.push((1 << 4) | Op::LargeStackAlloc as u8);
					out.extend_from_slice(&size.to_le_bytes());
				}
			}
			Self::SetFramePointer { offset } => {
				out.push(*offset);
				out.push(Op::SetFramePointer as u8);
			}
		}
	}
}

/// Unwind description of one emitted function (parent or funclet).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct UnwindInfo {
	pub flags: UnwindFlags,
	pub prolog_size: u8,
	pub codes: Vec<UnwindCode>,
}

impl UnwindInfo {
	/// Record for the standard parent prolog:
	/// `push rbp; mov rbp, rsp; sub rsp, frame_size`.
	pub fn for_frame(prolog_size: u8, frame_size: u32) -> Self {
		let mut codes = vec![
			UnwindCode::PushNonvolatile { offset: 1, reg: FRAME_REG_RBP },
			UnwindCode::SetFramePointer { offset: 4 },
		];
		if frame_size > 0 {
			codes.push(UnwindCode::StackAlloc { offset: prolog_size, size: frame_size });
		}
		Self { flags: UnwindFlags::empty(), prolog_size, codes }
	}

	/// Record for a funclet prolog: `push rbp; mov rbp, <arg>`.
	pub fn for_funclet(prolog_size: u8) -> Self {
		Self {
			flags: UnwindFlags::HANDLER_FUNCLET,
			prolog_size,
			codes: vec![
				UnwindCode::PushNonvolatile { offset: 1, reg: FRAME_REG_RBP },
				UnwindCode::SetFramePointer { offset: prolog_size },
			],
		}
	}

	/// Serialise to the installable byte form.
	pub fn serialize(&self) -> Vec<u8> {
		let node_count: usize = self.codes.iter().map(UnwindCode::node_count).sum();
		let mut out = Vec::with_capacity(4 + node_count * 2);
		out.push(1 | (self.flags.bits() << 3));
		out.push(self.prolog_size);
		out.push(node_count as u8);
		// Frame register RBP with zero frame offset.
		out.push(FRAME_REG_RBP);
		// Codes are consumed newest-first by the unwinder.
		for code in self.codes.iter().rev() {
			code.emit(&mut out);
		}
		out
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn frame_record_round_trip() {
		let info = UnwindInfo::for_frame(8, 0x40);
		let bytes = info.serialize();
		assert_eq!(bytes[0], 1);
		assert_eq!(bytes[1], 8);
		assert_eq!(bytes[2], 3);
		assert_eq!(bytes[3], FRAME_REG_RBP);
		// Newest first: small alloc, set-fp, push rbp.
		assert_eq!(&bytes[4..6], &[8, ((0x40 - 8) / 8 << 4) as u8 | 2]);
		assert_eq!(&bytes[6..8], &[4, 3]);
		assert_eq!(&bytes[8..10], &[1, (FRAME_REG_RBP << 4) | 0]);
	}

	#[test]
	fn funclet_record_is_flagged() {
		let info = UnwindInfo::for_funclet(4);
		assert!(info.flags.contains(UnwindFlags::HANDLER_FUNCLET));
		let bytes = info.serialize();
		assert_eq!(bytes[0], 1 | (1 << 3));
	}

	#[test]
	fn large_allocations_spill_into_extra_nodes() {
		let small = UnwindCode::StackAlloc { offset: 4, size: 128 };
		let medium = UnwindCode::StackAlloc { offset: 4, size: 0x2000 };
		let large = UnwindCode::StackAlloc { offset: 4, size: 0x100000 };
		assert_eq!(small.node_count(), 1);
		assert_eq!(medium.node_count(), 2);
		assert_eq!(large.node_count(), 3);

		let mut bytes = vec![];
		medium.emit(&mut bytes);
		assert_eq!(bytes, [4, 1, 0x00, 0x04]);
	}
}
