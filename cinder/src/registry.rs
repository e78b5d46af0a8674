//! The method registry: owns the code heap seam, installs compiled bytes,
//! and answers the lookups exception dispatch depends on.

use std::ptr::NonNull;
use std::sync::{Arc, Mutex};

use nohash_hasher::IntMap;
use tracing::debug;

use crate::asm::buffer::Reloc;
use crate::errors::CompileError;
use crate::raw::body::EhClauseKind;
use crate::raw::token::MetadataToken;
use crate::unwind::UnwindInfo;

/// Executable-memory seam. The heap must serialise allocation internally;
/// the registry calls it from whatever thread compiles.
pub trait CodeHeap: Send + Sync {
	/// Allocate `size` writable bytes aligned to `align`.
	fn allocate(&self, size: usize, align: usize) -> Option<NonNull<u8>>;
	/// Seal a finished range read-execute. Called only under strict W^X
	/// ordering; hosts without W^X leave pages writable and ignore this.
	fn seal(&self, base: NonNull<u8>, size: usize);
}

/// A [`CodeHeap`] over a plain byte buffer. Suitable for tests and for
/// hosts that map the whole region executable up front.
pub struct BufferCodeHeap {
	inner: Mutex<BufferHeapInner>,
}

struct BufferHeapInner {
	storage: Box<[u8]>,
	used: usize,
}

impl BufferCodeHeap {
	pub fn new(capacity: usize) -> Self {
		Self {
			inner: Mutex::new(BufferHeapInner { storage: vec![0; capacity].into_boxed_slice(), used: 0 }),
		}
	}
}

impl CodeHeap for BufferCodeHeap {
	fn allocate(&self, size: usize, align: usize) -> Option<NonNull<u8>> {
		let mut inner = self.inner.lock().unwrap();
		let base = inner.storage.as_ptr() as usize;
		let start = (base + inner.used).next_multiple_of(align) - base;
		if start + size > inner.storage.len() {
			return None;
		}
		inner.used = start + size;
		NonNull::new(unsafe { inner.storage.as_mut_ptr().add(start) })
	}

	fn seal(&self, _base: NonNull<u8>, _size: usize) {}
}

/// Kind of an emitted funclet.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum HandlerKind {
	Catch,
	Filter,
	Finally,
	Fault,
}

/// One funclet inside a compiled artifact; offsets are relative to the
/// method's first byte.
#[derive(Debug, Clone)]
pub struct FuncletSpan {
	pub kind: HandlerKind,
	pub start: usize,
	pub end: usize,
	pub unwind: UnwindInfo,
	/// Index of the EH clause this funclet implements.
	pub clause_index: usize,
}

/// An EH clause translated to native offsets (relative to the method's
/// first byte) with its handlers resolved to funclet indices.
#[derive(Debug, Copy, Clone)]
pub struct NativeClause {
	pub kind: EhClauseKind,
	pub try_start: usize,
	pub try_end: usize,
	/// Funclet implementing the handler body.
	pub handler_funclet: usize,
	/// Funclet implementing the filter expression, for `Filter` clauses.
	pub filter_funclet: Option<usize>,
	/// Type descriptor a thrown object must be assignable to, for `Typed`.
	pub catch_type: Option<usize>,
}

/// Everything the compiler hands to the registry for installation.
#[derive(Debug)]
pub struct CompiledArtifact {
	pub token: MetadataToken,
	pub bytes: Vec<u8>,
	pub relocs: Vec<Reloc>,
	/// End of the parent function, relative to the first byte.
	pub parent_end: usize,
	pub unwind: UnwindInfo,
	pub funclets: Vec<FuncletSpan>,
	pub clauses: Vec<NativeClause>,
}

/// An installed funclet with absolute addresses.
#[derive(Debug)]
pub struct FuncletRecord {
	pub kind: HandlerKind,
	pub start: usize,
	pub end: usize,
	pub unwind: Vec<u8>,
	pub clause_index: usize,
}

/// The published record of one compiled method (§3.5).
#[derive(Debug)]
pub struct CompiledMethod {
	pub token: MetadataToken,
	/// Address of the first byte of the parent function.
	pub code: usize,
	/// End of the parent function.
	pub code_end: usize,
	/// End of the whole installation, funclets included.
	pub total_end: usize,
	pub unwind: Vec<u8>,
	pub funclets: Vec<FuncletRecord>,
	/// Clause offsets remain relative to `code`.
	pub clauses: Vec<NativeClause>,
}

impl CompiledMethod {
	#[inline]
	pub fn entry_point(&self) -> usize {
		self.code
	}

	/// Funclet index covering an absolute address, if any.
	pub fn funclet_at(&self, address: usize) -> Option<usize> {
		self.funclets.iter().position(|f| address >= f.start && address < f.end)
	}
}

/// Registry of installed methods, shared between the compiler and the
/// exception-dispatch hooks.
pub struct MethodRegistry {
	heap: Arc<dyn CodeHeap>,
	strict_wx: bool,
	methods: Mutex<Vec<Arc<CompiledMethod>>>,
	by_token: Mutex<IntMap<u32, Arc<CompiledMethod>>>,
}

impl MethodRegistry {
	pub fn new(heap: Arc<dyn CodeHeap>, strict_wx: bool) -> Self {
		Self {
			heap,
			strict_wx,
			methods: Mutex::new(Vec::new()),
			by_token: Mutex::new(IntMap::default()),
		}
	}

	/// Copy an artifact into the code heap, apply its relocations, seal
	/// the pages, and publish the record.
	pub fn install(&self, artifact: CompiledArtifact) -> Result<Arc<CompiledMethod>, CompileError> {
		let size = artifact.bytes.len();
		let base = self
			.heap
			.allocate(size, 16)
			.ok_or(CompileError::CodeOutOfRange { target: size })?;
		let code = base.as_ptr() as usize;

		unsafe {
			std::ptr::copy_nonoverlapping(artifact.bytes.as_ptr(), base.as_ptr(), size);
		}
		for reloc in &artifact.relocs {
			let disp = reloc.target as i64 - (code + reloc.pos + 4) as i64;
			let disp = i32::try_from(disp)
				.map_err(|_| CompileError::CodeOutOfRange { target: reloc.target })?;
			unsafe {
				std::ptr::copy_nonoverlapping(disp.to_le_bytes().as_ptr(), base.as_ptr().add(reloc.pos), 4);
			}
		}
		if self.strict_wx {
			self.heap.seal(base, size);
		}

		let method = Arc::new(CompiledMethod {
			token: artifact.token,
			code,
			code_end: code + artifact.parent_end,
			total_end: code + size,
			unwind: artifact.unwind.serialize(),
			funclets: artifact
				.funclets
				.iter()
				.map(|f| FuncletRecord {
					kind: f.kind,
					start: code + f.start,
					end: code + f.end,
					unwind: f.unwind.serialize(),
					clause_index: f.clause_index,
				})
				.collect(),
			clauses: artifact.clauses,
		});

		debug!(
			token = ?method.token,
			code = format_args!("{:#x}", method.code),
			size,
			funclets = method.funclets.len(),
			"installed method"
		);

		self.methods.lock().unwrap().push(method.clone());
		self.by_token.lock().unwrap().insert(method.token.raw(), method.clone());
		Ok(method)
	}

	pub fn find_by_token(&self, token: MetadataToken) -> Option<Arc<CompiledMethod>> {
		self.by_token.lock().unwrap().get(&token.raw()).cloned()
	}

	/// Resolve a code address (typically a return address) to its method
	/// and, when it lies inside a funclet, the funclet index.
	pub fn find_by_address(&self, address: usize) -> Option<(Arc<CompiledMethod>, Option<usize>)> {
		let methods = self.methods.lock().unwrap();
		for method in methods.iter() {
			if address >= method.code && address < method.total_end {
				return Some((method.clone(), method.funclet_at(address)));
			}
		}
		None
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::raw::token::MethodDefToken;

	fn artifact(token: usize, bytes: Vec<u8>) -> CompiledArtifact {
		CompiledArtifact {
			token: MethodDefToken(token).into(),
			bytes,
			relocs: vec![],
			parent_end: 1,
			unwind: UnwindInfo::for_frame(8, 16),
			funclets: vec![],
			clauses: vec![],
		}
	}

	#[test]
	fn installs_and_finds_methods() {
		let registry = MethodRegistry::new(Arc::new(BufferCodeHeap::new(0x1000)), true);
		let method = registry.install(artifact(1, vec![0xC3])).unwrap();

		assert_eq!(registry.find_by_token(MethodDefToken(1).into()).unwrap().code, method.code);
		let (found, funclet) = registry.find_by_address(method.code).unwrap();
		assert_eq!(found.code, method.code);
		assert!(funclet.is_none());
		assert!(registry.find_by_address(method.total_end).is_none());

		// The installed byte actually landed in the heap.
		assert_eq!(unsafe { *(method.code as *const u8) }, 0xC3);
	}

	#[test]
	fn applies_relocations_against_the_final_base() {
		let registry = MethodRegistry::new(Arc::new(BufferCodeHeap::new(0x1000)), false);
		let mut artifact = artifact(2, vec![0xE8, 0, 0, 0, 0]);
		artifact.parent_end = 5;

		// Pretend the call targets its own start.
		let heap_probe = registry.heap.allocate(0, 16).unwrap().as_ptr() as usize;
		artifact.relocs.push(Reloc { pos: 1, target: heap_probe });
		let method = registry.install(artifact).unwrap();

		let disp = unsafe { std::ptr::read((method.code + 1) as *const i32) };
		assert_eq!(method.code as i64 + 5 + disp as i64, heap_probe as i64);
	}

	#[test]
	fn funclet_lookup() {
		let registry = MethodRegistry::new(Arc::new(BufferCodeHeap::new(0x1000)), false);
		let mut art = artifact(3, vec![0xC3; 0x20]);
		art.parent_end = 0x10;
		art.funclets.push(FuncletSpan {
			kind: HandlerKind::Finally,
			start: 0x10,
			end: 0x20,
			unwind: UnwindInfo::for_funclet(4),
			clause_index: 0,
		});
		let method = registry.install(art).unwrap();

		let (_, funclet) = registry.find_by_address(method.code + 0x18).unwrap();
		assert_eq!(funclet, Some(0));
		let (_, funclet) = registry.find_by_address(method.code + 0x08).unwrap();
		assert!(funclet.is_none());
	}
}
