/// Width of a displacement field left behind for a forward reference.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
enum FixupKind {
	Rel8,
	Rel32,
}

/// A pending displacement patch. `pos` is the offset of the displacement
/// field itself; the displacement is computed relative to the end of the
/// field, which is where the processor takes it from.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct Fixup {
	pos: usize,
	kind: FixupKind,
}

/// A 32-bit displacement field that must land on an absolute address once
/// the final base address of the code is known. The registry applies these
/// when installing the method into the code heap.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct Reloc {
	/// Offset of the displacement field within the buffer.
	pub pos: usize,
	/// Absolute native address the displacement must reach.
	pub target: usize,
}

/// Append-only machine-code buffer. Emission never fails; the registry
/// copies the finished bytes into the executable heap.
#[derive(Debug, Default)]
pub struct CodeBuffer {
	bytes: Vec<u8>,
	relocs: Vec<Reloc>,
}

impl CodeBuffer {
	pub fn new() -> Self {
		Self { bytes: Vec::with_capacity(256), relocs: Vec::new() }
	}

	#[inline]
	pub fn len(&self) -> usize {
		self.bytes.len()
	}

	#[inline]
	pub fn is_empty(&self) -> bool {
		self.bytes.is_empty()
	}

	#[inline]
	pub fn as_slice(&self) -> &[u8] {
		&self.bytes
	}

	pub fn into_parts(self) -> (Vec<u8>, Vec<Reloc>) {
		(self.bytes, self.relocs)
	}

	#[inline]
	pub fn put1(&mut self, byte: u8) {
		self.bytes.push(byte);
	}

	#[inline]
	pub fn put2(&mut self, value: u16) {
		self.bytes.extend_from_slice(&value.to_le_bytes());
	}

	#[inline]
	pub fn put4(&mut self, value: u32) {
		self.bytes.extend_from_slice(&value.to_le_bytes());
	}

	#[inline]
	pub fn put8(&mut self, value: u64) {
		self.bytes.extend_from_slice(&value.to_le_bytes());
	}

	/// Reserve an 8-bit displacement field and return its fixup.
	pub fn reserve_rel8(&mut self) -> Fixup {
		let pos = self.bytes.len();
		self.put1(0);
		Fixup { pos, kind: FixupKind::Rel8 }
	}

	/// Reserve a 32-bit displacement field and return its fixup.
	pub fn reserve_rel32(&mut self) -> Fixup {
		let pos = self.bytes.len();
		self.put4(0);
		Fixup { pos, kind: FixupKind::Rel32 }
	}

	/// Reserve a 32-bit displacement field that must reach the absolute
	/// address `target` once the code's base address is known.
	pub fn reserve_rel32_abs(&mut self, target: usize) {
		let pos = self.bytes.len();
		self.put4(0);
		self.relocs.push(Reloc { pos, target });
	}

	/// Patch a reserved displacement so it lands on `target` (a buffer
	/// offset). Panics if an 8-bit field cannot reach; callers reserve
	/// rel32 whenever the distance is not known to be short.
	pub fn patch(&mut self, fixup: Fixup, target: usize) {
		match fixup.kind {
			FixupKind::Rel8 => {
				let rel = target as i64 - (fixup.pos as i64 + 1);
				let rel = i8::try_from(rel).expect("rel8 fixup out of range");
				self.bytes[fixup.pos] = rel as u8;
			}
			FixupKind::Rel32 => {
				let rel = target as i64 - (fixup.pos as i64 + 4);
				let rel = i32::try_from(rel).expect("rel32 fixup out of range");
				self.bytes[fixup.pos..fixup.pos + 4].copy_from_slice(&rel.to_le_bytes());
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn rel32_patching_is_relative_to_field_end() {
		let mut buf = CodeBuffer::new();
		buf.put1(0xE9);
		let fixup = buf.reserve_rel32();
		buf.put1(0x90);
		let target = buf.len();
		buf.put1(0xC3);
		buf.patch(fixup, target);
		// jmp +1 over the nop.
		assert_eq!(buf.as_slice(), [0xE9, 0x01, 0x00, 0x00, 0x00, 0x90, 0xC3]);
	}

	#[test]
	fn rel8_patching_supports_backward_targets() {
		let mut buf = CodeBuffer::new();
		buf.put1(0x90);
		let target = 0usize;
		buf.put1(0xEB);
		let fixup = buf.reserve_rel8();
		buf.patch(fixup, target);
		assert_eq!(buf.as_slice(), [0x90, 0xEB, 0xFD]);
	}
}
