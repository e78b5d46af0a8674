pub mod containers;

pub use crate::raw::assembly::ffi::*;
pub use crate::raw::heaps::table::ffi::*;
pub use crate::raw::heaps::guid::ffi::*;
pub use crate::raw::heaps::blob::ffi::*;
pub use crate::raw::heaps::string::ffi::*;
pub use crate::raw::pe::ffi::*;

pub use crate::structured::ffi::*;
