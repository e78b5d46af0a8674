//! Per-method frame layout, fixed before the first instruction is emitted.
//!
//! ```text
//!   rbp + 16 + 8n   argument home slot n (register args spilled here)
//!   rbp + 8         return address
//!   rbp + 0         saved rbp
//!   rbp - 8 ...     hidden return-buffer pointer (when present)
//!   rbp - ...       locals, packed by declared order
//! ```
//!
//! The first four argument slots overlay the caller's shadow space. The
//! evaluation stack grows below the locals through push/pop; outgoing
//! argument areas and large-struct temporaries are carved transiently at
//! call sites.

use crate::abi::{ArgClass, ReturnKind};
use crate::utilities::{round_to_multiple_of, slot_count};

#[derive(Debug, Copy, Clone)]
pub struct ArgSlot {
	/// Index of the argument's first 8-byte slot in the argument area.
	pub first_slot: u32,
	pub class: ArgClass,
}

impl ArgSlot {
	/// rbp-relative offset of the argument's home slot.
	#[inline]
	pub fn home_offset(&self) -> i32 {
		16 + self.first_slot as i32 * 8
	}
}

#[derive(Debug, Copy, Clone)]
pub struct LocalSlot {
	/// rbp-relative offset of the local's first byte (negative).
	pub offset: i32,
	pub class: ArgClass,
}

impl LocalSlot {
	pub fn size(&self) -> u32 {
		match self.class {
			ArgClass::Struct { size } => size,
			ArgClass::Float32 => 4,
			_ => 8,
		}
	}
}

#[derive(Debug)]
pub struct FrameLayout {
	pub args: Vec<ArgSlot>,
	pub locals: Vec<LocalSlot>,
	/// rbp-relative offset of the saved hidden return-buffer pointer.
	pub ret_buf_home: Option<i32>,
	/// rbp-relative offset of the lowest byte of the call-site scratch
	/// area (hidden return buffers, by-pointer argument copies, newobj
	/// temporaries). 16-byte aligned; zero-sized frames have none.
	pub scratch_base: i32,
	pub scratch_size: u32,
	/// Bytes subtracted from RSP in the prolog; a multiple of 16 so the
	/// evaluation-stack depth alone decides call-site alignment.
	pub frame_size: u32,
}

impl FrameLayout {
	/// Lay out a frame for the given signature. When the method returns
	/// through a hidden buffer, the buffer address occupies argument slot
	/// zero and the declared arguments shift right by one. `scratch_size`
	/// is the prescanned worst-case call-site scratch demand.
	pub fn new(
		arg_classes: &[ArgClass],
		local_classes: &[ArgClass],
		return_kind: ReturnKind,
		scratch_size: u32,
	) -> Self {
		let ret_buf = return_kind.is_hidden_buffer();
		let mut next_slot = ret_buf as u32;

		let mut args = Vec::with_capacity(arg_classes.len());
		for class in arg_classes {
			args.push(ArgSlot { first_slot: next_slot, class: *class });
			next_slot += match class.by_pointer() {
				true => 1,
				false => class.stack_slots(),
			};
		}

		let mut offset = 0i32;
		if ret_buf {
			offset -= 8;
		}
		let ret_buf_home = ret_buf.then_some(offset);

		let mut locals = Vec::with_capacity(local_classes.len());
		for class in local_classes {
			let slots = class.stack_slots().max(1);
			offset -= (slots * 8) as i32;
			if slots > 1 {
				// Multi-slot locals stay 16-byte aligned, matching the
				// alignment of hidden return buffers.
				offset = -(round_to_multiple_of::<16>((-offset) as usize) as i32);
			}
			locals.push(LocalSlot { offset, class: *class });
		}

		let locals_end = round_to_multiple_of::<16>((-offset) as usize) as u32;
		let frame_size = locals_end + round_to_multiple_of::<16>(scratch_size as usize) as u32;
		let scratch_base = -(frame_size as i32);
		Self {
			args,
			locals,
			ret_buf_home,
			scratch_base,
			scratch_size: frame_size - locals_end,
			frame_size,
		}
	}

	/// Incoming argument slots that arrive in registers (the first four),
	/// including the hidden return-buffer slot when present.
	pub fn register_slot_count(&self) -> u32 {
		let total = self.args.last().map_or(self.ret_buf_home.is_some() as u32, |arg| {
			arg.first_slot
				+ match arg.class.by_pointer() {
					true => 1,
					false => arg.class.stack_slots(),
				}
		});
		total.min(4)
	}

	/// Total bytes of the local area, for init-locals zeroing.
	pub fn locals_size(&self) -> u32 {
		match (self.locals.last(), self.ret_buf_home) {
			(Some(last), _) => (-last.offset) as u32 - self.ret_buf_home.map_or(0, |_| 8),
			(None, _) => 0,
		}
	}
}

/// Slot count a value of `class` occupies on the evaluation stack.
pub fn class_slots(class: ArgClass) -> u32 {
	match class {
		ArgClass::Struct { size } => slot_count(size).max(1),
		_ => 1,
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn scalar_frame_layout() {
		let frame = FrameLayout::new(
			&[ArgClass::Int, ArgClass::Int],
			&[ArgClass::Int, ArgClass::Float64],
			ReturnKind::IntInRax,
			0,
		);
		assert_eq!(frame.args[0].home_offset(), 16);
		assert_eq!(frame.args[1].home_offset(), 24);
		assert_eq!(frame.locals[0].offset, -8);
		assert_eq!(frame.locals[1].offset, -16);
		assert_eq!(frame.frame_size, 16);
		assert!(frame.ret_buf_home.is_none());
	}

	#[test]
	fn hidden_buffer_shifts_arguments() {
		let frame = FrameLayout::new(
			&[ArgClass::Int],
			&[],
			ReturnKind::HiddenBuffer { size: 32 },
			0,
		);
		assert_eq!(frame.ret_buf_home, Some(-8));
		assert_eq!(frame.args[0].first_slot, 1);
		assert_eq!(frame.args[0].home_offset(), 24);
		assert_eq!(frame.frame_size, 16);
	}

	#[test]
	fn multi_slot_locals_are_16_aligned() {
		let frame = FrameLayout::new(
			&[],
			&[ArgClass::Int, ArgClass::Struct { size: 24 }, ArgClass::Int],
			ReturnKind::Void,
			0,
		);
		assert_eq!(frame.locals[0].offset, -8);
		// 24-byte local needs -32, already 16-aligned.
		assert_eq!(frame.locals[1].offset, -32);
		assert_eq!(frame.locals[2].offset, -40);
		assert_eq!(frame.frame_size, 48);
	}

	#[test]
	fn by_pointer_args_take_one_slot() {
		let frame = FrameLayout::new(
			&[ArgClass::Struct { size: 64 }, ArgClass::Int],
			&[],
			ReturnKind::Void,
			0,
		);
		assert_eq!(frame.args[0].first_slot, 0);
		assert_eq!(frame.args[1].first_slot, 1);
	}

	#[test]
	fn medium_struct_args_take_two_slots() {
		let frame = FrameLayout::new(
			&[ArgClass::Struct { size: 16 }, ArgClass::Int],
			&[],
			ReturnKind::Void,
			0,
		);
		assert_eq!(frame.args[1].first_slot, 2);
	}
}
