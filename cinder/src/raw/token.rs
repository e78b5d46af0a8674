use std::fmt::{Debug, Formatter};
use std::io::{Cursor, ErrorKind};

use paste::paste;

use crate::utilities::FromByteStream;

macro_rules! define_metadata_token {
	($($id: ident = $discriminant: literal),*) => {
		#[repr(u32)]
		#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
		pub enum MetadataTokenKind {
			$($id = $discriminant),*
		}

		#[repr(transparent)]
		#[derive(Copy, Clone, Eq, PartialEq, Hash)]
		pub struct MetadataToken(u32);

		impl MetadataToken {
			pub fn kind(&self) -> MetadataTokenKind {
				let discriminant = (self.0 & 0xFF000000) >> 24;
				match discriminant {
					$($discriminant => MetadataTokenKind::$id,)*
					_ => unreachable!(),
				}
			}

			#[inline]
			pub fn index(&self) -> usize {
				(self.0 & 0x00FFFFFF) as usize
			}

			#[inline]
			pub fn raw(&self) -> u32 {
				self.0
			}
		}

		impl TryFrom<u32> for MetadataToken {
			type Error = ();
			fn try_from(value: u32) -> Result<Self, Self::Error> {
				let discriminant = (value & 0xFF000000) >> 24;
				match discriminant {
					$($discriminant => Ok(Self(value)),)*
					_ => Err(())
				}
			}
		}

		paste! {
			$(
				#[repr(transparent)]
				#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
				pub struct [<$id Token>](pub usize);

				impl From<[<$id Token>]> for MetadataToken {
					fn from(value: [<$id Token>]) -> Self {
						MetadataToken(((MetadataTokenKind::$id as u32) << 24) | value.0 as u32)
					}
				}

				impl TryFrom<MetadataToken> for [<$id Token>] {
					type Error = ();
					fn try_from(value: MetadataToken) -> Result<Self, Self::Error> {
						match value.kind() {
							MetadataTokenKind::$id => Ok(Self(value.index())),
							_ => Err(()),
						}
					}
				}
			)*
		}
	};
}

impl Debug for MetadataToken {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		write!(f, "MetadataToken::{:?}(", self.kind())?;
		self.index().fmt(f)?;
		write!(f, ")")
	}
}

impl FromByteStream for MetadataToken {
	fn read(stream: &mut Cursor<&[u8]>) -> std::io::Result<Self> {
		let value = u32::read(stream)?;
		MetadataToken::try_from(value).map_err(|_| ErrorKind::InvalidData.into())
	}
}

// Only the kinds a method body can mention; anything else is a loader
// concern and never reaches the compiler.
define_metadata_token! {
	TypeRef = 0x01,
	TypeDef = 0x02,
	Field = 0x04,
	MethodDef = 0x06,
	MemberRef = 0x0a,
	StandAloneSig = 0x11,
	TypeSpec = 0x1b,
	MethodSpec = 0x2b,

	String = 0x70
}

impl MetadataToken {
	/// True for the token kinds that name a type.
	pub fn is_type(&self) -> bool {
		matches!(
			self.kind(),
			MetadataTokenKind::TypeDef | MetadataTokenKind::TypeRef | MetadataTokenKind::TypeSpec
		)
	}

	/// True for the token kinds that name a method.
	pub fn is_method(&self) -> bool {
		matches!(
			self.kind(),
			MetadataTokenKind::MethodDef | MetadataTokenKind::MemberRef | MetadataTokenKind::MethodSpec
		)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn round_trips_through_raw() {
		let token = MetadataToken::try_from(0x0600002Au32).unwrap();
		assert_eq!(token.kind(), MetadataTokenKind::MethodDef);
		assert_eq!(token.index(), 0x2A);
		assert_eq!(MetadataToken::from(MethodDefToken(0x2A)), token);
	}

	#[test]
	fn rejects_unknown_kinds() {
		assert!(MetadataToken::try_from(0xFF000001u32).is_err());
		assert!(MetadataToken::try_from(0x20000001u32).is_err());
	}

	#[test]
	fn kind_predicates() {
		let ty = MetadataToken::from(TypeDefToken(3));
		let method = MetadataToken::from(MemberRefToken(7));
		assert!(ty.is_type() && !ty.is_method());
		assert!(method.is_method() && !method.is_type());
	}
}
