use std::fmt::{Debug, Formatter};
use std::io::{Cursor, Result};

use bitflags::bitflags;

use crate::raw::token::MetadataToken;
use crate::utilities::{read_bytes_slice_from_stream, FromByteStream};

macro_rules! debug_opcode {
	($name: ident, $f: expr, $self: expr, $ident: ident) => {
		if $name::$ident == *$self {
			return write!($f, "{}", stringify!($ident));
		}
	};
	($name: ident, $f: expr, $self: expr, $ident: ident ($ty: ty)) => {
		if let $name::$ident(v) = $self {
			return write!($f, "{} {:X?}", stringify!($ident), v);
		}
	};
}

macro_rules! define_opcodes {
	(
		enum $name: ident <$lifetime: lifetime> {
			$(
				$(#[$attr:meta])*
				$ident: ident $(($ty: ty))? = ($page: literal, $discriminant: literal)
			),*
		}
	) => {
		#[allow(non_camel_case_types)]
		#[derive(Copy, Clone, PartialEq)]
		pub enum $name<$lifetime> {
			$(
				$(#[$attr])*
				$ident $(($ty))?
			),*
		}

		impl<$lifetime> $name<$lifetime> {
			pub fn read(stream: &mut Cursor<&$lifetime [u8]>) -> Result<Self> {
				let first = u8::read(stream)?;
				let pair = match first {
					0xFE => (1u8, u8::read(stream)?),
					_ => (0u8, first),
				};

				match pair {
					$(($page, $discriminant) => Ok($name::$ident $((<$ty>::read(stream)?))?),)*
					_ => Err(std::io::ErrorKind::InvalidData.into()),
				}
			}
		}

		impl<$lifetime> Debug for $name<$lifetime> {
			fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
				$(debug_opcode! { $name, f, self, $ident $(($ty))? })*
				Ok(())
			}
		}
	};
}

define_opcodes! {
	enum OpCode<'l> {
		/// Do nothing.
		nop = (0, 0x00),
		/// Inform a debugger that a breakpoint has been reached.
		dbg_break = (0, 0x01),
		/// Load argument 0 onto the stack.
		ldarg_0 = (0, 0x02),
		/// Load argument 1 onto the stack.
		ldarg_1 = (0, 0x03),
		/// Load argument 2 onto the stack.
		ldarg_2 = (0, 0x04),
		/// Load argument 3 onto the stack.
		ldarg_3 = (0, 0x05),
		/// Load local variable 0 onto the stack.
		ldloc_0 = (0, 0x06),
		/// Load local variable 1 onto the stack.
		ldloc_1 = (0, 0x07),
		/// Load local variable 2 onto the stack.
		ldloc_2 = (0, 0x08),
		/// Load local variable 3 onto the stack.
		ldloc_3 = (0, 0x09),
		/// Pop a value from the stack into local variable 0.
		stloc_0 = (0, 0x0A),
		/// Pop a value from the stack into local variable 1.
		stloc_1 = (0, 0x0B),
		/// Pop a value from the stack into local variable 2.
		stloc_2 = (0, 0x0C),
		/// Pop a value from the stack into local variable 3.
		stloc_3 = (0, 0x0D),
		/// Load argument numbered num onto the stack, short form.
		ldarg_s(u8) = (0, 0x0E),
		/// Fetch the address of argument argNum, short form.
		ldarga_s(u8) = (0, 0x0F),
		/// Store a value to the argument numbered num, short form.
		starg_s(u8) = (0, 0x10),
		/// Load local variable of index indx onto the stack, short form.
		ldloc_s(u8) = (0, 0x11),
		/// Load the address of local variable with index indx, short form.
		ldloca_s(u8) = (0, 0x12),
		/// Pop a value from the stack into local variable indx, short form.
		stloc_s(u8) = (0, 0x13),
		/// Push a null reference on the stack.
		ldnull = (0, 0x14),
		/// Push -1 onto the stack as int32.
		ldc_i4_m1 = (0, 0x15),
		/// Push 0 onto the stack as int32.
		ldc_i4_0 = (0, 0x16),
		/// Push 1 onto the stack as int32.
		ldc_i4_1 = (0, 0x17),
		/// Push 2 onto the stack as int32.
		ldc_i4_2 = (0, 0x18),
		/// Push 3 onto the stack as int32.
		ldc_i4_3 = (0, 0x19),
		/// Push 4 onto the stack as int32.
		ldc_i4_4 = (0, 0x1A),
		/// Push 5 onto the stack as int32.
		ldc_i4_5 = (0, 0x1B),
		/// Push 6 onto the stack as int32.
		ldc_i4_6 = (0, 0x1C),
		/// Push 7 onto the stack as int32.
		ldc_i4_7 = (0, 0x1D),
		/// Push 8 onto the stack as int32.
		ldc_i4_8 = (0, 0x1E),
		/// Push num onto the stack as int32, short form.
		ldc_i4_s(i8) = (0, 0x1F),
		/// Push num of type int32 onto the stack as int32.
		ldc_i4(i32) = (0, 0x20),
		/// Push num of type int64 onto the stack as int64.
		ldc_i8(i64) = (0, 0x21),
		/// Push num of type float32 onto the stack as F.
		ldc_r4(f32) = (0, 0x22),
		/// Push num of type float64 onto the stack as F.
		ldc_r8(f64) = (0, 0x23),
		/// Duplicate the value on the top of the stack.
		dup = (0, 0x25),
		/// Pop a value from the stack.
		pop = (0, 0x26),
		/// Exit current method and jump to the specified method.
		jmp(MetadataToken) = (0, 0x27),
		/// Call the method described by method.
		call(MetadataToken) = (0, 0x28),
		/// Call the method indicated on the stack with arguments described by callsitedescr.
		calli(MetadataToken) = (0, 0x29),
		/// Return from method, possibly with a value.
		ret = (0, 0x2A),
		/// Branch to target, short form.
		br_s(i8) = (0, 0x2B),
		/// Branch to target if value is zero (false), short form.
		brfalse_s(i8) = (0, 0x2C),
		/// Branch to target if value is non-zero (true), short form.
		brtrue_s(i8) = (0, 0x2D),
		/// Branch to target if equal, short form.
		beq_s(i8) = (0, 0x2E),
		/// Branch to target if greater than or equal to, short form.
		bge_s(i8) = (0, 0x2F),
		/// Branch to target if greater than, short form.
		bgt_s(i8) = (0, 0x30),
		/// Branch to target if less than or equal to, short form.
		ble_s(i8) = (0, 0x31),
		/// Branch to target if less than, short form.
		blt_s(i8) = (0, 0x32),
		/// Branch to target if unequal or unordered, short form.
		bne_un_s(i8) = (0, 0x33),
		/// Branch to target if greater than or equal to (unsigned or unordered), short form.
		bge_un_s(i8) = (0, 0x34),
		/// Branch to target if greater than (unsigned or unordered), short form.
		bgt_un_s(i8) = (0, 0x35),
		/// Branch to target if less than or equal to (unsigned or unordered), short form.
		ble_un_s(i8) = (0, 0x36),
		/// Branch to target if less than (unsigned or unordered), short form.
		blt_un_s(i8) = (0, 0x37),
		/// Branch to target.
		br(i32) = (0, 0x38),
		/// Branch to target if value is zero (false).
		brfalse(i32) = (0, 0x39),
		/// Branch to target if value is non-zero (true).
		brtrue(i32) = (0, 0x3A),
		/// Branch to target if equal.
		beq(i32) = (0, 0x3B),
		/// Branch to target if greater than or equal to.
		bge(i32) = (0, 0x3C),
		/// Branch to target if greater than.
		bgt(i32) = (0, 0x3D),
		/// Branch to target if less than or equal to.
		ble(i32) = (0, 0x3E),
		/// Branch to target if less than.
		blt(i32) = (0, 0x3F),
		/// Branch to target if unequal or unordered.
		bne_un(i32) = (0, 0x40),
		/// Branch to target if greater than or equal to (unsigned or unordered).
		bge_un(i32) = (0, 0x41),
		/// Branch to target if greater than (unsigned or unordered).
		bgt_un(i32) = (0, 0x42),
		/// Branch to target if less than or equal to (unsigned or unordered).
		ble_un(i32) = (0, 0x43),
		/// Branch to target if less than (unsigned or unordered).
		blt_un(i32) = (0, 0x44),
		/// Jump to one of n targets.
		switch(SwitchTable<'l>) = (0, 0x45),
		/// Indirect load value of type int8 as int32 on the stack.
		ldind_i1 = (0, 0x46),
		/// Indirect load value of type unsigned int8 as int32 on the stack.
		ldind_u1 = (0, 0x47),
		/// Indirect load value of type int16 as int32 on the stack.
		ldind_i2 = (0, 0x48),
		/// Indirect load value of type unsigned int16 as int32 on the stack.
		ldind_u2 = (0, 0x49),
		/// Indirect load value of type int32 as int32 on the stack.
		ldind_i4 = (0, 0x4A),
		/// Indirect load value of type unsigned int32 as int32 on the stack.
		ldind_u4 = (0, 0x4B),
		/// Indirect load value of type int64 as int64 on the stack.
		ldind_i8 = (0, 0x4C),
		/// Indirect load value of type native int as native int on the stack.
		ldind_i = (0, 0x4D),
		/// Indirect load value of type float32 as F on the stack.
		ldind_r4 = (0, 0x4E),
		/// Indirect load value of type float64 as F on the stack.
		ldind_r8 = (0, 0x4F),
		/// Indirect load value of type object ref as O on the stack.
		ldind_ref = (0, 0x50),
		/// Store value of type object ref (type O) into memory at address.
		stind_ref = (0, 0x51),
		/// Store value of type int8 into memory at address.
		stind_i1 = (0, 0x52),
		/// Store value of type int16 into memory at address.
		stind_i2 = (0, 0x53),
		/// Store value of type int32 into memory at address.
		stind_i4 = (0, 0x54),
		/// Store value of type int64 into memory at address.
		stind_i8 = (0, 0x55),
		/// Store value of type float32 into memory at address.
		stind_r4 = (0, 0x56),
		/// Store value of type float64 into memory at address.
		stind_r8 = (0, 0x57),
		/// Add two values, returning a new value.
		add = (0, 0x58),
		/// Subtract value2 from value1, returning a new value.
		sub = (0, 0x59),
		/// Multiply values.
		mul = (0, 0x5A),
		/// Divide two values to return a quotient or floating-point result.
		div = (0, 0x5B),
		/// Divide two values, unsigned, returning a quotient.
		div_un = (0, 0x5C),
		/// Remainder when dividing one value by another.
		rem = (0, 0x5D),
		/// Remainder when dividing one unsigned value by another.
		rem_un = (0, 0x5E),
		/// Bitwise AND of two integral values, returns an integral value.
		and = (0, 0x5F),
		/// Bitwise OR of two integer values, returns an integer.
		or = (0, 0x60),
		/// Bitwise XOR of integer values, returns an integer.
		xor = (0, 0x61),
		/// Shift an integer left (shifting in zeros), return an integer.
		shl = (0, 0x62),
		/// Shift an integer right (shift in sign), return an integer.
		shr = (0, 0x63),
		/// Shift an integer right (shift in zero), return an integer.
		shr_un = (0, 0x64),
		/// Negate value.
		neg = (0, 0x65),
		/// Bitwise complement.
		not = (0, 0x66),
		/// Convert to int8, pushing int32 on the stack.
		conv_i1 = (0, 0x67),
		/// Convert to int16, pushing int32 on the stack.
		conv_i2 = (0, 0x68),
		/// Convert to int32, pushing int32 on the stack.
		conv_i4 = (0, 0x69),
		/// Convert to int64, pushing int64 on the stack.
		conv_i8 = (0, 0x6A),
		/// Convert to float32, pushing F on the stack.
		conv_r4 = (0, 0x6B),
		/// Convert to float64, pushing F on the stack.
		conv_r8 = (0, 0x6C),
		/// Convert to unsigned int32, pushing int32 on the stack.
		conv_u4 = (0, 0x6D),
		/// Convert to unsigned int64, pushing int64 on the stack.
		conv_u8 = (0, 0x6E),
		/// Call a method associated with an object.
		callvirt(MetadataToken) = (0, 0x6F),
		/// Copy a value type from src to dest.
		cpobj(MetadataToken) = (0, 0x70),
		/// Copy the value stored at address src to the stack.
		ldobj(MetadataToken) = (0, 0x71),
		/// Push a string object for the literal string.
		ldstr(MetadataToken) = (0, 0x72),
		/// Allocate an uninitialized object or value type and call ctor.
		newobj(MetadataToken) = (0, 0x73),
		/// Cast obj to class.
		castclass(MetadataToken) = (0, 0x74),
		/// Test if obj is an instance of class, returning null or an instance of that class or interface.
		isinst(MetadataToken) = (0, 0x75),
		/// Convert unsigned integer to floating-point, pushing F on the stack.
		conv_r_un = (0, 0x76),
		/// Extract a value type from its boxed representation, pushing a managed pointer to it.
		unbox(MetadataToken) = (0, 0x79),
		/// Throw an exception.
		throw = (0, 0x7A),
		/// Push the value of field of object (or value type) obj onto the stack.
		ldfld(MetadataToken) = (0, 0x7B),
		/// Push the address of field of object obj on the stack.
		ldflda(MetadataToken) = (0, 0x7C),
		/// Replace the value of field of the object obj with value.
		stfld(MetadataToken) = (0, 0x7D),
		/// Push the value of the static field on the stack.
		ldsfld(MetadataToken) = (0, 0x7E),
		/// Push the address of the static field on the stack.
		ldsflda(MetadataToken) = (0, 0x7F),
		/// Replace the value of the static field with val.
		stsfld(MetadataToken) = (0, 0x80),
		/// Store a value of type typeTok at an address.
		stobj(MetadataToken) = (0, 0x81),
		/// Convert unsigned to an int8 (on the stack as int32) and throw on overflow.
		conv_ovf_i1_un = (0, 0x82),
		/// Convert unsigned to an int16 (on the stack as int32) and throw on overflow.
		conv_ovf_i2_un = (0, 0x83),
		/// Convert unsigned to an int32 (on the stack as int32) and throw on overflow.
		conv_ovf_i4_un = (0, 0x84),
		/// Convert unsigned to an int64 (on the stack as int64) and throw on overflow.
		conv_ovf_i8_un = (0, 0x85),
		/// Convert unsigned to an unsigned int8 (on the stack as int32) and throw on overflow.
		conv_ovf_u1_un = (0, 0x86),
		/// Convert unsigned to an unsigned int16 (on the stack as int32) and throw on overflow.
		conv_ovf_u2_un = (0, 0x87),
		/// Convert unsigned to an unsigned int32 (on the stack as int32) and throw on overflow.
		conv_ovf_u4_un = (0, 0x88),
		/// Convert unsigned to an unsigned int64 (on the stack as int64) and throw on overflow.
		conv_ovf_u8_un = (0, 0x89),
		/// Convert unsigned to a native int (on the stack as native int) and throw on overflow.
		conv_ovf_i_un = (0, 0x8A),
		/// Convert unsigned to a native unsigned int (on the stack as native int) and throw on overflow.
		conv_ovf_u_un = (0, 0x8B),
		/// Convert a boxable value to its boxed form.
		box_val(MetadataToken) = (0, 0x8C),
		/// Create a new array with elements of type etype.
		newarr(MetadataToken) = (0, 0x8D),
		/// Push the length (of type native unsigned int) of array on the stack.
		ldlen = (0, 0x8E),
		/// Load the address of the element at index onto the top of the stack.
		ldelema(MetadataToken) = (0, 0x8F),
		/// Load the element with type int8 at index onto the top of the stack as an int32.
		ldelem_i1 = (0, 0x90),
		/// Load the element with type unsigned int8 at index onto the top of the stack as an int32.
		ldelem_u1 = (0, 0x91),
		/// Load the element with type int16 at index onto the top of the stack as an int32.
		ldelem_i2 = (0, 0x92),
		/// Load the element with type unsigned int16 at index onto the top of the stack as an int32.
		ldelem_u2 = (0, 0x93),
		/// Load the element with type int32 at index onto the top of the stack as an int32.
		ldelem_i4 = (0, 0x94),
		/// Load the element with type unsigned int32 at index onto the top of the stack as an int32.
		ldelem_u4 = (0, 0x95),
		/// Load the element with type int64 at index onto the top of the stack as an int64.
		ldelem_i8 = (0, 0x96),
		/// Load the element with type native int at index onto the top of the stack as a native int.
		ldelem_i = (0, 0x97),
		/// Load the element with type float32 at index onto the top of the stack as an F.
		ldelem_r4 = (0, 0x98),
		/// Load the element with type float64 at index onto the top of the stack as an F.
		ldelem_r8 = (0, 0x99),
		/// Load the element at index onto the top of the stack as an O.
		ldelem_ref = (0, 0x9A),
		/// Replace the array element at index with the native int value on the stack.
		stelem_i = (0, 0x9B),
		/// Replace the array element at index with the int8 value on the stack.
		stelem_i1 = (0, 0x9C),
		/// Replace the array element at index with the int16 value on the stack.
		stelem_i2 = (0, 0x9D),
		/// Replace the array element at index with the int32 value on the stack.
		stelem_i4 = (0, 0x9E),
		/// Replace the array element at index with the int64 value on the stack.
		stelem_i8 = (0, 0x9F),
		/// Replace the array element at index with the float32 value on the stack.
		stelem_r4 = (0, 0xA0),
		/// Replace the array element at index with the float64 value on the stack.
		stelem_r8 = (0, 0xA1),
		/// Replace the array element at index with the ref value on the stack.
		stelem_ref = (0, 0xA2),
		/// Load the element at index onto the top of the stack.
		ldelem(MetadataToken) = (0, 0xA3),
		/// Replace the array element at index with the value on the stack.
		stelem(MetadataToken) = (0, 0xA4),
		/// Extract a value type from its boxed representation and copy it to the top of the stack.
		unbox_any(MetadataToken) = (0, 0xA5),
		/// Convert to an int8 (on the stack as int32) and throw on overflow.
		conv_ovf_i1 = (0, 0xB3),
		/// Convert to an unsigned int8 (on the stack as int32) and throw on overflow.
		conv_ovf_u1 = (0, 0xB4),
		/// Convert to an int16 (on the stack as int32) and throw on overflow.
		conv_ovf_i2 = (0, 0xB5),
		/// Convert to an unsigned int16 (on the stack as int32) and throw on overflow.
		conv_ovf_u2 = (0, 0xB6),
		/// Convert to an int32 (on the stack as int32) and throw on overflow.
		conv_ovf_i4 = (0, 0xB7),
		/// Convert to an unsigned int32 (on the stack as int32) and throw on overflow.
		conv_ovf_u4 = (0, 0xB8),
		/// Convert to an int64 (on the stack as int64) and throw on overflow.
		conv_ovf_i8 = (0, 0xB9),
		/// Convert to an unsigned int64 (on the stack as int64) and throw on overflow.
		conv_ovf_u8 = (0, 0xBA),
		/// Push the address stored in a typed reference.
		refanyval(MetadataToken) = (0, 0xC2),
		/// Throw ArithmeticException if value is not a finite number.
		ckfinite = (0, 0xC3),
		/// Push a typed reference to ptr of type class onto the stack.
		mkrefany(MetadataToken) = (0, 0xC6),
		/// Convert metadata token to its runtime representation.
		ldtoken(MetadataToken) = (0, 0xD0),
		/// Convert to unsigned int16, pushing int32 on the stack.
		conv_u2 = (0, 0xD1),
		/// Convert to unsigned int8, pushing int32 on the stack.
		conv_u1 = (0, 0xD2),
		/// Convert to native int, pushing native int on the stack.
		conv_i = (0, 0xD3),
		/// Convert to a native int (on the stack as native int) and throw on overflow.
		conv_ovf_i = (0, 0xD4),
		/// Convert to a native unsigned int (on the stack as native int) and throw on overflow.
		conv_ovf_u = (0, 0xD5),
		/// Add signed integer values with overflow check.
		add_ovf = (0, 0xD6),
		/// Add unsigned integer values with overflow check.
		add_ovf_un = (0, 0xD7),
		/// Multiply signed integer values; the signed result shall fit in the same size.
		mul_ovf = (0, 0xD8),
		/// Multiply unsigned integer values; the unsigned result shall fit in the same size.
		mul_ovf_un = (0, 0xD9),
		/// Subtract a native int from a native int; the signed result shall fit in the same size.
		sub_ovf = (0, 0xDA),
		/// Subtract a native unsigned int from a native unsigned int; the unsigned result shall fit in the same size.
		sub_ovf_un = (0, 0xDB),
		/// End the finally or fault clause of an exception block.
		endfinally = (0, 0xDC),
		/// Exit a protected region of code.
		leave(i32) = (0, 0xDD),
		/// Exit a protected region of code, short form.
		leave_s(i8) = (0, 0xDE),
		/// Store value of type native int into memory at address.
		stind_i = (0, 0xDF),
		/// Convert to native unsigned int, pushing native int on the stack.
		conv_u = (0, 0xE0),

		/// Return the argument list handle for the current method.
		arglist = (1, 0x00),
		/// Push 1 (of type int32) if value1 equals value2, else push 0.
		ceq = (1, 0x01),
		/// Push 1 (of type int32) if value1 is greater than value2, else push 0.
		cgt = (1, 0x02),
		/// Push 1 (of type int32) if value1 is greater than value2, unsigned or unordered, else push 0.
		cgt_un = (1, 0x03),
		/// Push 1 (of type int32) if value1 is lower than value2, else push 0.
		clt = (1, 0x04),
		/// Push 1 (of type int32) if value1 is lower than value2, unsigned or unordered, else push 0.
		clt_un = (1, 0x05),
		/// Push a pointer to the method referenced by method on the stack.
		ldftn(MetadataToken) = (1, 0x06),
		/// Push the address of a virtual method on the stack.
		ldvirtftn(MetadataToken) = (1, 0x07),
		/// Load argument numbered num onto the stack.
		ldarg(u16) = (1, 0x09),
		/// Fetch the address of argument argNum.
		ldarga(u16) = (1, 0x0A),
		/// Store a value to the argument numbered num.
		starg(u16) = (1, 0x0B),
		/// Load local variable of index indx onto the stack.
		ldloc(u16) = (1, 0x0C),
		/// Load the address of local variable with index indx.
		ldloca(u16) = (1, 0x0D),
		/// Pop a value from the stack into local variable indx.
		stloc(u16) = (1, 0x0E),
		/// Allocate space from the local memory pool.
		localloc = (1, 0x0F),
		/// End an exception handling filter clause.
		endfilter = (1, 0x11),
		/// The subsequent pointer instruction might be unaligned.
		unaligned(u8) = (1, 0x12),
		/// The subsequent pointer reference is volatile.
		volatile = (1, 0x13),
		/// The subsequent call terminates the current method.
		tail = (1, 0x14),
		/// Initialize the value at address dest.
		initobj(MetadataToken) = (1, 0x15),
		/// Call a virtual method on a type constrained to be type T.
		constrained(MetadataToken) = (1, 0x16),
		/// Copy data from memory to memory.
		cpblk = (1, 0x17),
		/// Set all bytes in a block of memory to a given byte value.
		initblk = (1, 0x18),
		/// Skip the named fault checks normally performed by the subsequent instruction.
		no_chk(SkipFaultCheckFlags) = (1, 0x19),
		/// Rethrow the current exception.
		rethrow = (1, 0x1A),
		/// Push the size, in bytes, of a type as an unsigned int32.
		sizeof(MetadataToken) = (1, 0x1C),
		/// Push the type token stored in a typed reference.
		refanytype = (1, 0x1D),
		/// The subsequent array address operation performs no type check and returns a controlled-mutability pointer.
		readonly = (1, 0x1E)
	}
}

bitflags! {
	#[derive(Debug, Default, Copy, Clone, Eq, PartialEq, Hash)]
	pub struct SkipFaultCheckFlags: u8 {
		const TYPE_CHECK = 0x1;
		const RANGE_CHECK = 0x2;
		const NULL_CHECK = 0x4;
	}
}

impl FromByteStream for SkipFaultCheckFlags {
	fn read(stream: &mut Cursor<&[u8]>) -> Result<Self> {
		Ok(Self::from_bits_truncate(u8::read(stream)?))
	}
}

impl<'l> OpCode<'l> {
	/// Relative branch target as an absolute IL offset, given the offset of
	/// the instruction that follows this one. `None` for non-branches;
	/// `switch` targets are enumerated through its table instead.
	pub fn branch_target(&self, next_offset: u32) -> Option<u32> {
		use OpCode::*;
		let displacement = match *self {
			br_s(d) | brfalse_s(d) | brtrue_s(d) | beq_s(d) | bge_s(d) | bgt_s(d)
			| ble_s(d) | blt_s(d) | bne_un_s(d) | bge_un_s(d) | bgt_un_s(d)
			| ble_un_s(d) | blt_un_s(d) | leave_s(d) => d as i32,
			br(d) | brfalse(d) | brtrue(d) | beq(d) | bge(d) | bgt(d) | ble(d)
			| blt(d) | bne_un(d) | bge_un(d) | bgt_un(d) | ble_un(d) | leave(d) => d,
			_ => return None,
		};
		Some(next_offset.wrapping_add(displacement as u32))
	}

	/// True for the prefix opcodes that modify the following instruction.
	pub fn is_prefix(&self) -> bool {
		matches!(
			self,
			OpCode::unaligned(_) | OpCode::volatile | OpCode::tail
				| OpCode::constrained(_) | OpCode::no_chk(_) | OpCode::readonly
		)
	}
}

#[derive(Copy, Clone, PartialEq, Hash)]
pub struct SwitchTable<'l>(&'l [u8]);

impl Debug for SwitchTable<'_> {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		let mut dbg = f.debug_list();
		for target in self.displacements() {
			dbg.entry(&target);
		}
		dbg.finish()
	}
}

impl<'l> SwitchTable<'l> {
	pub fn read(stream: &mut Cursor<&'l [u8]>) -> Result<Self> {
		let len = u32::read(stream)?;
		let data = read_bytes_slice_from_stream(stream, len as usize * 4)?;
		Ok(Self(data))
	}

	pub fn len(&self) -> usize {
		self.0.len() / 4
	}

	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}

	#[inline]
	pub fn displacements(&self) -> impl Iterator<Item = i32> + '_ {
		(0..self.len()).map(move |i| {
			let slice = &self.0[i * 4..(i + 1) * 4];
			i32::from_le_bytes(slice.try_into().unwrap())
		})
	}

	/// Absolute IL offsets of every case, given the offset just past the
	/// whole switch instruction.
	pub fn targets(&self, next_offset: u32) -> impl Iterator<Item = u32> + '_ {
		self.displacements().map(move |d| next_offset.wrapping_add(d as u32))
	}
}

pub struct OpCodeIterator<'l> {
	cursor: Cursor<&'l [u8]>,
}

impl<'l> OpCodeIterator<'l> {
	pub fn new(bytes: &'l [u8]) -> Self {
		Self { cursor: Cursor::new(bytes) }
	}

	/// Offset of the next instruction to decode; after a `next()` call this
	/// is the end of the instruction just returned.
	#[inline]
	pub fn position(&self) -> u32 {
		self.cursor.position() as u32
	}
}

impl<'l> Iterator for OpCodeIterator<'l> {
	type Item = (u32, Result<OpCode<'l>>);
	fn next(&mut self) -> Option<Self::Item> {
		let position = self.cursor.position();
		match position == self.cursor.get_ref().len() as u64 {
			true => None,
			false => Some((position as u32, OpCode::read(&mut self.cursor))),
		}
	}
}

pub(crate) fn debug_opcodes(bytes: &[u8], fmt: &mut Formatter) -> std::result::Result<(), std::fmt::Error> {
	let mut dbg = fmt.debug_list();
	for (i, opcode) in OpCodeIterator::new(bytes) {
		match opcode {
			Ok(opcode) => dbg.entry(&format_args!("IL_{i:04X}\t{opcode:X?}")),
			Err(_) => dbg.entry(&format_args!("IL_{i:04X}\t<invalid>")),
		};
	}
	dbg.finish()
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn decodes_single_byte_page() {
		let code = [0x02u8, 0x17, 0x58, 0x2A];
		let ops: Vec<_> = OpCodeIterator::new(&code).map(|(_, op)| op.unwrap()).collect();
		assert_eq!(ops, [OpCode::ldarg_0, OpCode::ldc_i4_1, OpCode::add, OpCode::ret]);
	}

	#[test]
	fn decodes_compound_page() {
		let code = [0xFEu8, 0x01, 0xFE, 0x0C, 0x02, 0x00];
		let mut it = OpCodeIterator::new(&code);
		assert_eq!(it.next().unwrap().1.unwrap(), OpCode::ceq);
		assert_eq!(it.next().unwrap().1.unwrap(), OpCode::ldloc(2));
	}

	#[test]
	fn decodes_operands_and_offsets() {
		let code = [0x1Fu8, 0x2A, 0x20, 0xD2, 0x04, 0x00, 0x00];
		let mut it = OpCodeIterator::new(&code);
		let (off, op) = it.next().unwrap();
		assert_eq!((off, op.unwrap()), (0, OpCode::ldc_i4_s(42)));
		let (off, op) = it.next().unwrap();
		assert_eq!((off, op.unwrap()), (2, OpCode::ldc_i4(1234)));
	}

	#[test]
	fn branch_targets_are_relative_to_next() {
		let mut stream = Cursor::new([0x2Bu8, 0xFE].as_slice());
		let op = OpCode::read(&mut stream).unwrap();
		// br_s -2 at offset 0: next is 2, target is 0.
		assert_eq!(op.branch_target(2), Some(0));

		let mut stream = Cursor::new([0xDDu8, 0x10, 0x00, 0x00, 0x00].as_slice());
		let op = OpCode::read(&mut stream).unwrap();
		assert_eq!(op.branch_target(5), Some(0x15));
	}

	#[test]
	fn switch_table_targets() {
		// switch with 2 cases: +1, -6; next_offset = 13.
		let code = [0x45u8, 0x02, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0xFA, 0xFF, 0xFF, 0xFF];
		let mut stream = Cursor::new(code.as_slice());
		let OpCode::switch(table) = OpCode::read(&mut stream).unwrap() else { panic!() };
		assert_eq!(table.len(), 2);
		assert_eq!(table.targets(13).collect::<Vec<_>>(), [14, 7]);
	}

	#[test]
	fn rejects_invalid_encoding() {
		let mut stream = Cursor::new([0x24u8].as_slice());
		assert!(OpCode::read(&mut stream).is_err());
	}
}
