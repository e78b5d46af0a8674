//! Exception-handling runtime hooks: the helper table compiled code calls
//! into, and the two-pass dispatch algorithm that walks method records
//! during a throw.
//!
//! Frame walking itself belongs to the host unwinder; it hands this module
//! the frames, innermost first, and resumes execution at whatever catch
//! continuation the second pass produces.

use std::sync::Arc;

use tracing::{debug, trace};

use crate::raw::body::EhClauseKind;
use crate::registry::{CompiledMethod, MethodRegistry, NativeClause};

/// Native entry points of the runtime helpers emitted code depends on, plus
/// the software-interrupt vector of the overflow dispatch.
#[derive(Debug, Copy, Clone)]
pub struct EhRuntime {
	/// `fn(exception: *mut u8) -> !`
	pub throw: usize,
	/// `fn() -> !`
	pub rethrow: usize,
	/// `fn(type_descriptor: usize) -> *mut u8`
	pub allocate: usize,
	/// `fn(type_descriptor: usize, length: usize) -> *mut u8`
	pub allocate_array: usize,
	/// `fn(object: *mut u8, type_descriptor: usize) -> *mut u8`, faults on
	/// incompatible casts.
	pub cast_class: usize,
	/// `fn(object: *mut u8, type_descriptor: usize) -> *mut u8`, null on
	/// incompatible casts.
	pub is_instance: usize,
	/// `fn(receiver: *mut u8, iface_id: usize) -> usize` returning the
	/// dispatch target.
	pub interface_dispatch: usize,
	/// `fn(array: *mut u8, index: usize) -> !`, the bounds-failure path.
	pub range_fault: usize,
	/// Software-interrupt vector of the overflow dispatch stub.
	pub overflow_vector: u8,
}

/// Filter funclet: exception object, parent frame pointer; returns 1 to
/// accept the exception, 0 to continue the search.
pub type FilterFunclet = unsafe extern "win64" fn(*mut u8, *mut u8) -> i32;
/// Catch funclet: exception object, parent frame pointer; returns the
/// continuation address past the protected region.
pub type CatchFunclet = unsafe extern "win64" fn(*mut u8, *mut u8) -> usize;
/// Finally or fault funclet: parent frame pointer.
pub type FinallyFunclet = unsafe extern "win64" fn(*mut u8);

/// One host-walked frame, innermost first.
#[derive(Debug, Copy, Clone)]
pub struct DispatchFrame {
	/// Instruction pointer inside the frame's method (a return address for
	/// every frame but the faulting one).
	pub ip: usize,
	pub frame_pointer: usize,
}

/// Where the second pass landed: the host restores this frame pointer and
/// resumes at the continuation.
#[derive(Debug, Copy, Clone)]
pub struct Resolution {
	pub frame_pointer: usize,
	pub continuation: usize,
}

struct HandlerMatch {
	frame_index: usize,
	clause_index: usize,
	method: Arc<CompiledMethod>,
}

/// Dispatch a thrown exception over the given frames. Returns `None` when
/// no handler accepts it, in which case the caller invokes the host's
/// unhandled-exception policy.
///
/// # Safety
/// The frames must describe live stack frames of jitted code registered in
/// `registry`, and `exception` must point at a live exception object whose
/// first word is its type descriptor.
pub unsafe fn dispatch_exception(
	registry: &MethodRegistry,
	frames: &[DispatchFrame],
	exception: *mut u8,
	assignable: &dyn Fn(usize, usize) -> bool,
) -> Option<Resolution> {
	let handler = first_pass(registry, frames, exception, assignable)?;
	Some(second_pass(registry, frames, exception, handler))
}

/// First pass: find the frame and clause that will handle the exception.
unsafe fn first_pass(
	registry: &MethodRegistry,
	frames: &[DispatchFrame],
	exception: *mut u8,
	assignable: &dyn Fn(usize, usize) -> bool,
) -> Option<HandlerMatch> {
	let thrown_type = *(exception as *const usize);

	for (frame_index, frame) in frames.iter().enumerate() {
		let Some((method, funclet)) = registry.find_by_address(frame.ip) else {
			continue;
		};
		if funclet.is_some() {
			// An exception escaping a funclet is matched against the
			// parent's remaining clauses via the parent frame; handled by
			// the host walking the parent frame next.
			continue;
		}

		let offset = frame.ip - method.code;
		for (clause_index, clause) in method.clauses.iter().enumerate() {
			if !covers(clause, offset) {
				continue;
			}
			let accepted = match clause.kind {
				EhClauseKind::Typed => {
					assignable(thrown_type, clause.catch_type.unwrap_or(0))
				}
				EhClauseKind::Filter => {
					let filter = method.funclets[clause.filter_funclet.unwrap()].start;
					let filter: FilterFunclet = std::mem::transmute(filter);
					filter(exception, frame.frame_pointer as *mut u8) != 0
				}
				// Finally/fault never catch.
				_ => false,
			};
			if accepted {
				debug!(
					frame = frame_index,
					clause = clause_index,
					method = ?method.token,
					"exception search matched"
				);
				return Some(HandlerMatch { frame_index, clause_index, method });
			}
		}
	}

	debug!("exception search exhausted all frames");
	None
}

/// Second pass: run every finally/fault between the throw point and the
/// chosen handler, then enter the catch funclet.
unsafe fn second_pass(
	registry: &MethodRegistry,
	frames: &[DispatchFrame],
	exception: *mut u8,
	handler: HandlerMatch,
) -> Resolution {
	for (frame_index, frame) in frames.iter().enumerate().take(handler.frame_index + 1) {
		let Some((method, funclet)) = registry.find_by_address(frame.ip) else {
			continue;
		};
		if funclet.is_some() {
			continue;
		}
		let offset = frame.ip - method.code;
		let is_handler_frame = frame_index == handler.frame_index;

		for (clause_index, clause) in method.clauses.iter().enumerate() {
			if !matches!(clause.kind, EhClauseKind::Finally | EhClauseKind::Fault) {
				continue;
			}
			if !covers(clause, offset) {
				continue;
			}
			// In the handler's own frame, only finallys nested inside the
			// chosen clause run now; the rest run when the catch leaves.
			if is_handler_frame && clause_index >= handler.clause_index {
				continue;
			}
			trace!(frame = frame_index, clause = clause_index, "running finally funclet");
			let funclet = method.funclets[clause.handler_funclet].start;
			let funclet: FinallyFunclet = std::mem::transmute(funclet);
			funclet(frame.frame_pointer as *mut u8);
		}
	}

	let frame = frames[handler.frame_index];
	let clause = &handler.method.clauses[handler.clause_index];
	let catch = handler.method.funclets[clause.handler_funclet].start;
	let catch: CatchFunclet = std::mem::transmute(catch);
	let continuation = catch(exception, frame.frame_pointer as *mut u8);
	debug!(continuation = format_args!("{continuation:#x}"), "catch funclet returned");

	Resolution { frame_pointer: frame.frame_pointer, continuation }
}

#[inline]
fn covers(clause: &NativeClause, offset: usize) -> bool {
	offset >= clause.try_start && offset < clause.try_end
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn clause_cover_is_half_open() {
		let clause = NativeClause {
			kind: EhClauseKind::Finally,
			try_start: 0x10,
			try_end: 0x20,
			handler_funclet: 0,
			filter_funclet: None,
			catch_type: None,
		};
		assert!(!covers(&clause, 0x0F));
		assert!(covers(&clause, 0x10));
		assert!(covers(&clause, 0x1F));
		assert!(!covers(&clause, 0x20));
	}
}
