//! Resolver seams: the narrow contracts through which the compiler asks its
//! host for the native shape of a token. Production hosts install a
//! [`TokenResolver`]; unit tests run against the token-encoded fallback.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use fxhash::FxHashMap;
use tracing::debug;

use crate::abi::{ArgClass, ReturnKind};
use crate::errors::CompileError;
use crate::raw::token::{MetadataToken, StandAloneSigToken, StringToken};
use crate::stack::TosKind;

/// Object layout constants shared with the host runtime: every heap object
/// starts with its type-descriptor pointer; arrays follow it with a
/// pointer-sized length.
pub const OBJECT_HEADER_SIZE: u32 = 8;
pub const ARRAY_LENGTH_OFFSET: i32 = 8;
pub const ARRAY_HEADER_SIZE: u32 = 16;

/// Offset of the first vtable slot within a type descriptor.
pub const VTABLE_OFFSET: i32 = 16;

/// Native shape of a callable method.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedMethod {
	/// Entry point, or the host's lazy-compile thunk if not yet compiled.
	pub entry_point: usize,
	/// Argument classes in signature order, `this` included for instance
	/// methods.
	pub args: Vec<ArgClass>,
	pub return_kind: ReturnKind,
	pub is_instance: bool,
	/// Slot index for virtual dispatch through the receiver's vtable.
	pub vtable_slot: Option<u32>,
	/// Opaque id the interface-dispatch helper maps to a target.
	pub iface_id: Option<u32>,
	/// Descriptor of the declaring type, for `newobj` allocation.
	pub declaring_type: usize,
	/// Unboxed instance size when the declaring type is a value type,
	/// zero for reference types.
	pub declaring_value_size: u32,
	/// Token of the declaring type, for the class-initializer barrier.
	pub declaring_type_token: Option<MetadataToken>,
}

/// Native shape of a field access.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct ResolvedField {
	/// Byte offset from the receiver pointer (header included for
	/// reference receivers) or from the start of a stack image.
	pub offset: u32,
	pub size: u32,
	pub signed: bool,
	pub is_static: bool,
	/// Absolute address of the static storage; zero for instance fields.
	pub static_address: usize,
	pub gc_ref: bool,
	/// Float width when the field is float32/float64; scalar loads of the
	/// field push the float stack tag instead of `Int`.
	pub float: Option<TosKind>,
	/// Token of the declaring type, for the class-initializer barrier on
	/// static access.
	pub declaring_type_token: Option<MetadataToken>,
}

/// Native shape of a type.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct ResolvedType {
	/// Opaque descriptor pointer; runtime handle for `ldtoken` and the
	/// argument of the cast/allocation helpers.
	pub descriptor: usize,
	pub base_size: u32,
	/// Element size for array types, zero otherwise.
	pub component_size: u32,
	pub is_nullable: bool,
	pub is_reference: bool,
	/// Whether the descriptor was constructed by this JIT's host loader or
	/// baked ahead of time; the two account object headers differently.
	pub jit_constructed: bool,
}

impl ResolvedType {
	/// Size of an instance of this type as a stack value: a pointer for
	/// reference types, the unboxed payload size for value types. Host-AOT
	/// descriptors fold the object header into `base_size`; JIT-built ones
	/// carry the payload size directly.
	pub fn value_size(&self) -> u32 {
		if self.is_reference {
			return 8;
		}
		match self.jit_constructed {
			true => self.base_size,
			false => self.base_size.saturating_sub(OBJECT_HEADER_SIZE),
		}
	}
}

/// One-shot class-initializer context. The flag word lives at a stable
/// address for the lifetime of the runtime because compiled code embeds it.
#[derive(Debug)]
pub struct CctorContext {
	/// Nonzero while the initializer is still pending; compiled barriers
	/// test this and skip the slow path once it reaches zero.
	init_flag: AtomicUsize,
	pub cctor_entry: usize,
}

impl CctorContext {
	pub fn new(cctor_entry: usize) -> Self {
		Self { init_flag: AtomicUsize::new(1), cctor_entry }
	}

	/// Address of the flag word, for embedding into the inline barrier.
	pub fn flag_address(self: &Arc<Self>) -> usize {
		&self.init_flag as *const AtomicUsize as usize
	}

	/// Claim the initializer. The winning caller must run the cctor; the
	/// flag is cleared on claim so a cctor touching its own statics skips
	/// the barrier instead of recursing.
	pub fn claim(&self) -> bool {
		self.init_flag.compare_exchange(1, 0, Ordering::AcqRel, Ordering::Acquire).is_ok()
	}

	pub fn is_pending(&self) -> bool {
		self.init_flag.load(Ordering::Acquire) != 0
	}
}

/// Slow path behind the inline cctor barrier; compiled code calls this with
/// the context pointer when it observes a nonzero flag.
///
/// # Safety
/// `ctx` must be the address of a live [`CctorContext`] whose entry point
/// is a callable static initializer.
pub unsafe extern "win64" fn ensure_cctor(ctx: *const CctorContext) {
	let ctx = &*ctx;
	if ctx.claim() {
		let cctor: unsafe extern "win64" fn() = std::mem::transmute(ctx.cctor_entry);
		cctor();
	}
}

/// A stand-alone signature resolves to either a `calli` call-site shape or
/// a local-variable layout; ECMA-335 stores both in the same table.
#[derive(Debug, Clone, PartialEq)]
pub enum StandAloneSig {
	Locals(Vec<ArgClass>),
	CallSite(CallSiteSig),
}

#[derive(Debug, Clone, PartialEq)]
pub struct CallSiteSig {
	pub args: Vec<ArgClass>,
	pub return_kind: ReturnKind,
}

/// The six entry points a production host implements.
pub trait TokenResolver {
	fn resolve_type(&self, token: MetadataToken) -> Option<ResolvedType>;
	fn resolve_field(&self, token: MetadataToken) -> Option<ResolvedField>;
	fn resolve_method(&self, token: MetadataToken) -> Option<ResolvedMethod>;
	/// Pointer to the interned string object for a user-string token.
	fn resolve_string(&self, token: StringToken) -> Option<usize>;
	fn resolve_standalone_sig(&self, token: StandAloneSigToken) -> Option<StandAloneSig>;
	/// Context for the type's class initializer, or `None` when the type
	/// has no cctor and needs no barrier. Must register the context before
	/// the cctor itself is compiled.
	fn cctor_context(&self, type_token: MetadataToken) -> Option<Arc<CctorContext>>;
}

/// Token resolution as the compiler consumes it: either the host's real
/// seams or the bit-packed fallback used to exercise the compiler without
/// a metadata layer.
pub enum Resolvers {
	Real(Box<dyn TokenResolver>),
	Fallback(FallbackResolver),
}

impl Resolvers {
	pub fn ty(&self, token: MetadataToken) -> Result<ResolvedType, CompileError> {
		let resolved = match self {
			Resolvers::Real(resolver) => resolver.resolve_type(token),
			Resolvers::Fallback(fallback) => fallback.decode_type(token),
		};
		resolved.ok_or(CompileError::UnresolvedToken(token))
	}

	pub fn field(&self, token: MetadataToken) -> Result<ResolvedField, CompileError> {
		let resolved = match self {
			Resolvers::Real(resolver) => resolver.resolve_field(token),
			Resolvers::Fallback(fallback) => fallback.decode_field(token),
		};
		resolved.ok_or(CompileError::UnresolvedToken(token))
	}

	pub fn method(&self, token: MetadataToken) -> Result<ResolvedMethod, CompileError> {
		let resolved = match self {
			Resolvers::Real(resolver) => resolver.resolve_method(token),
			Resolvers::Fallback(fallback) => fallback.methods.get(token.index()).cloned(),
		};
		resolved.ok_or(CompileError::UnresolvedToken(token))
	}

	pub fn string(&self, token: StringToken) -> Result<usize, CompileError> {
		let resolved = match self {
			Resolvers::Real(resolver) => resolver.resolve_string(token),
			Resolvers::Fallback(fallback) => fallback.strings.get(token.0).copied(),
		};
		resolved.ok_or(CompileError::UnresolvedToken(MetadataToken::from(token)))
	}

	pub fn standalone_sig(&self, token: StandAloneSigToken) -> Result<StandAloneSig, CompileError> {
		let resolved = match self {
			Resolvers::Real(resolver) => resolver.resolve_standalone_sig(token),
			Resolvers::Fallback(fallback) => fallback.sigs.get(token.0).cloned(),
		};
		resolved.ok_or(CompileError::UnresolvedToken(MetadataToken::from(token)))
	}

	pub fn cctor_context(&self, type_token: MetadataToken) -> Option<Arc<CctorContext>> {
		match self {
			Resolvers::Real(resolver) => resolver.cctor_context(type_token),
			Resolvers::Fallback(fallback) => fallback.cctors.get(&type_token.raw()).cloned(),
		}
	}
}

/// Resolver-less mode for unit tests: field and type tokens decode as
/// bit-packed descriptors, everything else is served from small tables the
/// test populates. Never installed in production.
///
/// Field token index: bits 0..12 offset, 12..20 size, 20 signed,
/// 21 static, 22 gc-ref, 23 float. Type token index: bits 0..16 value
/// size, 16 reference, 17 nullable.
#[derive(Default)]
pub struct FallbackResolver {
	pub methods: Vec<ResolvedMethod>,
	pub strings: Vec<usize>,
	pub sigs: Vec<StandAloneSig>,
	pub cctors: FxHashMap<u32, Arc<CctorContext>>,
	/// Base address fallback statics resolve against.
	pub static_base: usize,
}

impl FallbackResolver {
	pub fn new() -> Self {
		Self::default()
	}

	/// Register a method and return the token that calls it.
	pub fn push_method(&mut self, method: ResolvedMethod) -> MetadataToken {
		let token = crate::raw::token::MethodDefToken(self.methods.len());
		self.methods.push(method);
		token.into()
	}

	pub fn push_string(&mut self, address: usize) -> StringToken {
		let token = StringToken(self.strings.len());
		self.strings.push(address);
		token
	}

	pub fn push_sig(&mut self, sig: StandAloneSig) -> StandAloneSigToken {
		let token = StandAloneSigToken(self.sigs.len());
		self.sigs.push(sig);
		token
	}

	pub fn register_cctor(&mut self, type_token: MetadataToken, entry: usize) -> Arc<CctorContext> {
		let ctx = Arc::new(CctorContext::new(entry));
		debug!(token = ?type_token, entry, "registered fallback cctor context");
		self.cctors.insert(type_token.raw(), ctx.clone());
		ctx
	}

	/// Token for a packed instance field.
	pub fn field_token(offset: u32, size: u32, signed: bool) -> MetadataToken {
		let index = (offset & 0xFFF) | ((size & 0xFF) << 12) | ((signed as u32) << 20);
		crate::raw::token::FieldToken(index as usize).into()
	}

	/// Token for a packed static field at `offset` from the static base.
	pub fn static_field_token(offset: u32, size: u32, signed: bool) -> MetadataToken {
		let index = (offset & 0xFFF) | ((size & 0xFF) << 12) | ((signed as u32) << 20) | (1 << 21);
		crate::raw::token::FieldToken(index as usize).into()
	}

	/// Token for a packed value type of `size` bytes.
	pub fn value_type_token(size: u32) -> MetadataToken {
		crate::raw::token::TypeDefToken((size & 0xFFFF) as usize).into()
	}

	/// Token for a packed reference type.
	pub fn reference_type_token() -> MetadataToken {
		crate::raw::token::TypeDefToken((8 | (1 << 16)) as usize).into()
	}

	fn decode_field(&self, token: MetadataToken) -> Option<ResolvedField> {
		let index = token.index() as u32;
		let offset = index & 0xFFF;
		let size = (index >> 12) & 0xFF;
		let is_static = index & (1 << 21) != 0;
		Some(ResolvedField {
			offset,
			size,
			signed: index & (1 << 20) != 0,
			is_static,
			static_address: match is_static {
				true => self.static_base + offset as usize,
				false => 0,
			},
			gc_ref: index & (1 << 22) != 0,
			float: match index & (1 << 23) != 0 {
				true => Some(if size == 4 { TosKind::Float32 } else { TosKind::Float64 }),
				false => None,
			},
			declaring_type_token: None,
		})
	}

	fn decode_type(&self, token: MetadataToken) -> Option<ResolvedType> {
		let index = token.index() as u32;
		Some(ResolvedType {
			descriptor: token.raw() as usize,
			base_size: index & 0xFFFF,
			component_size: 0,
			is_nullable: index & (1 << 17) != 0,
			is_reference: index & (1 << 16) != 0,
			jit_constructed: true,
		})
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn fallback_field_packing_round_trips() {
		let resolvers = Resolvers::Fallback(FallbackResolver::new());
		let token = FallbackResolver::field_token(24, 4, true);
		let field = resolvers.field(token).unwrap();
		assert_eq!((field.offset, field.size), (24, 4));
		assert!(field.signed && !field.is_static);
	}

	#[test]
	fn fallback_static_fields_use_the_static_base() {
		let mut fallback = FallbackResolver::new();
		fallback.static_base = 0x4000;
		let resolvers = Resolvers::Fallback(fallback);
		let token = FallbackResolver::static_field_token(0x10, 8, false);
		let field = resolvers.field(token).unwrap();
		assert!(field.is_static);
		assert_eq!(field.static_address, 0x4010);
	}

	#[test]
	fn fallback_type_packing() {
		let resolvers = Resolvers::Fallback(FallbackResolver::new());
		let value = resolvers.ty(FallbackResolver::value_type_token(32)).unwrap();
		assert_eq!(value.value_size(), 32);
		assert!(!value.is_reference);

		let reference = resolvers.ty(FallbackResolver::reference_type_token()).unwrap();
		assert!(reference.is_reference);
		assert_eq!(reference.value_size(), 8);
	}

	#[test]
	fn fallback_method_table() {
		let mut fallback = FallbackResolver::new();
		let token = fallback.push_method(ResolvedMethod {
			entry_point: 0x1234,
			args: vec![ArgClass::Int],
			return_kind: ReturnKind::IntInRax,
			is_instance: false,
			vtable_slot: None,
			iface_id: None,
			declaring_type: 0,
			declaring_value_size: 0,
			declaring_type_token: None,
		});
		let resolvers = Resolvers::Fallback(fallback);
		assert_eq!(resolvers.method(token).unwrap().entry_point, 0x1234);
		let missing = crate::raw::token::MethodDefToken(99).into();
		assert!(matches!(resolvers.method(missing), Err(CompileError::UnresolvedToken(_))));
	}

	#[test]
	fn cctor_claim_is_one_shot() {
		let ctx = Arc::new(CctorContext::new(0));
		assert!(ctx.is_pending());
		assert!(ctx.claim());
		assert!(!ctx.claim());
		assert!(!ctx.is_pending());
	}

	#[test]
	fn aot_types_fold_the_header_out_of_value_size() {
		let ty = ResolvedType {
			descriptor: 0,
			base_size: 24,
			component_size: 0,
			is_nullable: false,
			is_reference: false,
			jit_constructed: false,
		};
		assert_eq!(ty.value_size(), 16);
	}
}
