use std::fmt::Debug;
use std::io::{Cursor, Error, ErrorKind, Result};

use bitflags::bitflags;
use derivative::Derivative;

use crate::raw::il::debug_opcodes;
use crate::raw::token::{MetadataToken, StandAloneSigToken};
use crate::utilities::{read_bytes_slice_from_stream, round_to_multiple_of, FromByteStream};

bitflags! {
	#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
	pub struct SectionFlags: u8 {
		const EH_TABLE = 0x01;
		const OPT_IL = 0x02;
		const FAT_FORMAT = 0x40;
		const MORE_SECTS = 0x80;
	}
}

/// Kind of one exception-handling clause, ECMA-335 II.25.4.6.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum EhClauseKind {
	/// Catch of a given exception type.
	Typed,
	/// Catch guarded by a filter expression.
	Filter,
	Finally,
	Fault,
}

impl EhClauseKind {
	fn from_flags(flags: u32) -> Result<Self> {
		match flags {
			0 => Ok(Self::Typed),
			1 => Ok(Self::Filter),
			2 => Ok(Self::Finally),
			4 => Ok(Self::Fault),
			_ => Err(Error::from(ErrorKind::InvalidData)),
		}
	}
}

/// One protected region and its handler, with IL offsets.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct EhClause {
	pub kind: EhClauseKind,
	pub try_offset: u32,
	pub try_length: u32,
	pub handler_offset: u32,
	pub handler_length: u32,
	/// Exception type token for `Typed` clauses.
	pub class_token: Option<MetadataToken>,
	/// IL offset of the filter expression for `Filter` clauses.
	pub filter_offset: Option<u32>,
}

impl EhClause {
	#[inline]
	pub fn try_end(&self) -> u32 {
		self.try_offset + self.try_length
	}

	#[inline]
	pub fn handler_end(&self) -> u32 {
		self.handler_offset + self.handler_length
	}

	#[inline]
	pub fn protects(&self, il_offset: u32) -> bool {
		il_offset >= self.try_offset && il_offset < self.try_end()
	}

	#[inline]
	pub fn handles(&self, il_offset: u32) -> bool {
		il_offset >= self.handler_offset && il_offset < self.handler_end()
	}

	/// IL range the parent pass must skip: the handler, preceded by the
	/// filter expression when one exists.
	pub fn skip_range(&self) -> (u32, u32) {
		match self.filter_offset {
			Some(filter) => (filter, self.handler_end()),
			None => (self.handler_offset, self.handler_end()),
		}
	}

	fn read_small(stream: &mut Cursor<&[u8]>) -> Result<Self> {
		let flags = u16::read(stream)? as u32;
		let kind = EhClauseKind::from_flags(flags)?;
		let try_offset = u16::read(stream)? as u32;
		let try_length = u8::read(stream)? as u32;
		let handler_offset = u16::read(stream)? as u32;
		let handler_length = u8::read(stream)? as u32;
		let class_or_filter = u32::read(stream)?;
		Self::with_class_or_filter(kind, try_offset, try_length, handler_offset, handler_length, class_or_filter)
	}

	fn read_fat(stream: &mut Cursor<&[u8]>) -> Result<Self> {
		let flags = u32::read(stream)?;
		let kind = EhClauseKind::from_flags(flags)?;
		let try_offset = u32::read(stream)?;
		let try_length = u32::read(stream)?;
		let handler_offset = u32::read(stream)?;
		let handler_length = u32::read(stream)?;
		let class_or_filter = u32::read(stream)?;
		Self::with_class_or_filter(kind, try_offset, try_length, handler_offset, handler_length, class_or_filter)
	}

	fn with_class_or_filter(
		kind: EhClauseKind,
		try_offset: u32,
		try_length: u32,
		handler_offset: u32,
		handler_length: u32,
		class_or_filter: u32,
	) -> Result<Self> {
		let mut clause = Self {
			kind,
			try_offset,
			try_length,
			handler_offset,
			handler_length,
			class_token: None,
			filter_offset: None,
		};
		match kind {
			EhClauseKind::Typed => {
				let token = MetadataToken::try_from(class_or_filter)
					.map_err(|_| Error::from(ErrorKind::InvalidData))?;
				clause.class_token = Some(token);
			}
			EhClauseKind::Filter => clause.filter_offset = Some(class_or_filter),
			_ => {}
		}
		Ok(clause)
	}
}

/// A parsed CIL method body: header fields, code bytes, and EH clauses.
///
/// The local-variable signature token is carried through unresolved; the
/// compiler hands it to the stand-alone-signature resolver seam.
#[derive(Derivative)]
#[derivative(Debug)]
pub struct MethodBody<'l> {
	pub max_stack_size: u16,
	pub init_locals: bool,
	pub local_sig: Option<StandAloneSigToken>,
	#[derivative(Debug(format_with = "debug_opcodes"))]
	pub code: &'l [u8],
	pub clauses: Vec<EhClause>,
}

impl<'l> MethodBody<'l> {
	pub fn read(stream: &mut Cursor<&'l [u8]>) -> Result<Self> {
		let header = u8::read(stream)?;
		match header & 3 {
			2 => {
				let code_size = (header >> 2) as usize;
				let code = read_bytes_slice_from_stream(stream, code_size)?;
				Ok(Self {
					code,
					max_stack_size: 8,
					init_locals: false,
					local_sig: None,
					clauses: vec![],
				})
			}
			3 => {
				stream.set_position(stream.position() - 1);
				let flags = u16::read(stream)?;
				let max_stack_size = u16::read(stream)?;
				let code_size = u32::read(stream)?;
				let init_locals = flags & 0x10 != 0;
				let has_sections = flags & 0x08 != 0;

				let local_sig = match u32::read(stream)? {
					0 => None,
					raw => {
						let token = MetadataToken::try_from(raw)
							.map_err(|_| Error::from(ErrorKind::InvalidData))?;
						let token = StandAloneSigToken::try_from(token)
							.map_err(|_| Error::from(ErrorKind::InvalidData))?;
						Some(token)
					}
				};

				let code = read_bytes_slice_from_stream(stream, code_size as usize)?;

				let mut clauses = vec![];
				if has_sections {
					read_sections(stream, &mut clauses)?;
				}

				Ok(Self { max_stack_size, init_locals, local_sig, code, clauses })
			}
			_ => Err(Error::new(ErrorKind::InvalidData, "Invalid method header")),
		}
	}

	#[inline]
	pub fn has_eh(&self) -> bool {
		!self.clauses.is_empty()
	}
}

fn read_sections(stream: &mut Cursor<&[u8]>, clauses: &mut Vec<EhClause>) -> Result<()> {
	loop {
		// Sections start at the next 4-byte boundary.
		stream.set_position(round_to_multiple_of::<4>(stream.position() as usize) as u64);

		let kind = SectionFlags::from_bits(u8::read(stream)?)
			.ok_or_else(|| Error::from(ErrorKind::InvalidData))?;
		if !kind.contains(SectionFlags::EH_TABLE) {
			return Err(Error::new(ErrorKind::InvalidData, "Unknown method data section"));
		}

		match kind.contains(SectionFlags::FAT_FORMAT) {
			false => {
				let data_size = u8::read(stream)? as usize;
				let _reserved = u16::read(stream)?;
				for _ in 0..(data_size - 4) / 12 {
					clauses.push(EhClause::read_small(stream)?);
				}
			}
			true => {
				let size_bytes = <[u8; 3]>::read(stream)?;
				let data_size = u32::from_le_bytes([size_bytes[0], size_bytes[1], size_bytes[2], 0]) as usize;
				for _ in 0..(data_size - 4) / 24 {
					clauses.push(EhClause::read_fat(stream)?);
				}
			}
		}

		if !kind.contains(SectionFlags::MORE_SECTS) {
			return Ok(());
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::raw::token::MetadataTokenKind;

	#[test]
	fn tiny_header() {
		// ldc.i4.2; ldc.i4.3; add; ret — 4 bytes, tiny header 0x12.
		let image = [0x12u8, 0x18, 0x19, 0x58, 0x2A];
		let body = MethodBody::read(&mut Cursor::new(image.as_slice())).unwrap();
		assert_eq!(body.code.len(), 4);
		assert_eq!(body.max_stack_size, 8);
		assert!(!body.init_locals);
		assert!(body.local_sig.is_none());
		assert!(body.clauses.is_empty());
	}

	#[test]
	fn fat_header_with_locals() {
		let mut image = vec![
			0x13, 0x30, // flags: fat | init locals, header size 3
			0x08, 0x00, // max stack 8
			0x02, 0x00, 0x00, 0x00, // code size 2
			0x01, 0x00, 0x00, 0x11, // local sig token 0x11000001
		];
		image.extend_from_slice(&[0x00, 0x2A]); // nop; ret
		let body = MethodBody::read(&mut Cursor::new(image.as_slice())).unwrap();
		assert!(body.init_locals);
		assert_eq!(body.local_sig, Some(StandAloneSigToken(1)));
		assert_eq!(body.code, [0x00, 0x2A]);
	}

	#[test]
	fn fat_header_with_small_eh_section() {
		let mut image = vec![
			0x1B, 0x30, // flags: fat | more sections | init locals
			0x02, 0x00,
			0x05, 0x00, 0x00, 0x00, // code size 5 (odd, forces alignment padding)
			0x00, 0x00, 0x00, 0x00, // no locals
		];
		image.extend_from_slice(&[0x00, 0x00, 0x00, 0x00, 0x2A]);
		image.extend_from_slice(&[0x00, 0x00, 0x00]); // pad to 4-byte boundary
		image.extend_from_slice(&[
			0x01, // EH table, small
			0x10, // data size: 4 + one 12-byte clause
			0x00, 0x00, // reserved
			0x02, 0x00, // flags: finally
			0x00, 0x00, // try offset
			0x03, // try length
			0x03, 0x00, // handler offset
			0x02, // handler length
			0x00, 0x00, 0x00, 0x00,
		]);
		let body = MethodBody::read(&mut Cursor::new(image.as_slice())).unwrap();
		assert_eq!(body.clauses.len(), 1);
		let clause = body.clauses[0];
		assert_eq!(clause.kind, EhClauseKind::Finally);
		assert_eq!((clause.try_offset, clause.try_length), (0, 3));
		assert_eq!((clause.handler_offset, clause.handler_length), (3, 2));
		assert!(clause.class_token.is_none());
	}

	#[test]
	fn fat_eh_section_with_typed_and_filter_clauses() {
		let mut image = vec![
			0x1B, 0x30,
			0x04, 0x00,
			0x04, 0x00, 0x00, 0x00,
			0x00, 0x00, 0x00, 0x00,
		];
		image.extend_from_slice(&[0x00, 0x00, 0x00, 0x2A]);
		image.extend_from_slice(&[
			0x41, // EH table, fat
			0x34, 0x00, 0x00, // data size: 4 + two 24-byte clauses
		]);
		// Typed catch of 0x02000003 over try [0, 2), handler [2, 1).
		for word in [0u32, 0, 2, 2, 1, 0x02000003] {
			image.extend_from_slice(&word.to_le_bytes());
		}
		// Filter clause: filter expression at 5.
		for word in [1u32, 0, 2, 8, 1, 5] {
			image.extend_from_slice(&word.to_le_bytes());
		}
		let body = MethodBody::read(&mut Cursor::new(image.as_slice())).unwrap();
		assert_eq!(body.clauses.len(), 2);
		assert_eq!(body.clauses[0].kind, EhClauseKind::Typed);
		assert_eq!(body.clauses[0].class_token.unwrap().kind(), MetadataTokenKind::TypeDef);
		assert_eq!(body.clauses[1].kind, EhClauseKind::Filter);
		assert_eq!(body.clauses[1].filter_offset, Some(5));
		assert_eq!(body.clauses[1].skip_range(), (5, 9));
	}

	#[test]
	fn clause_range_predicates() {
		let clause = EhClause {
			kind: EhClauseKind::Finally,
			try_offset: 4,
			try_length: 6,
			handler_offset: 10,
			handler_length: 3,
			class_token: None,
			filter_offset: None,
		};
		assert!(clause.protects(4) && clause.protects(9) && !clause.protects(10));
		assert!(clause.handles(10) && clause.handles(12) && !clause.handles(13));
		assert_eq!(clause.skip_range(), (10, 13));
	}
}
