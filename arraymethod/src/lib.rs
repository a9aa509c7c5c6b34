/*
 * Copyright (c) Microsoft Corporation.
 * Licensed under the MIT license.
 */
//! # arraymethod
//!
//! Type dispatch and inner loop selection for elementwise array operations.
//!
//! A [`MethodSpec`] describes an operation over `nin` inputs and `nout` outputs: the type
//! classes it is registered for, the casting it implies and up to four inner loops for the
//! aligned/unaligned and contiguous/strided memory layouts. [`ArrayMethod::from_spec`]
//! validates it and produces a [`BoundArrayMethod`], which
//!
//! * resolves the exact descriptors of a call ([`BoundArrayMethod::resolve_descriptors`]),
//! * selects an inner loop for a memory layout ([`LoopContext::get_strided_loop`]),
//!   optionally wrapped to skip masked elements ([`get_masked_strided_loop`]),
//! * runs directly over one-dimensional buffers ([`BoundArrayMethod::simple_strided_call`]).
//!
//! ```rust
//! use arraymethod::{ArrayMethod, AuxDataMut, LoopContext, LoopError, MethodSpec, Slot,
//!     StridedArg, StridedLoop};
//! use arraymethod_dtype::{Casting, DTypeRef};
//! # use arraymethod_dtype::{ByteOrder, DType, DTypeError, DescrRef, Descriptor};
//! # #[derive(Debug)]
//! # struct Int64;
//! # impl DType for Int64 {
//! #     fn name(&self) -> &str { "int64" }
//! #     fn default_descriptor(&self, this: &DTypeRef) -> Result<DescrRef, DTypeError> {
//! #         Ok(Descriptor::new(this.clone(), ByteOrder::NATIVE, 8, 8)?.into_ref())
//! #     }
//! # }
//!
//! /// # Safety
//! ///
//! /// Two arguments of `len` aligned `i64` elements.
//! unsafe fn negate(
//!     _context: &LoopContext<'_>,
//!     data: &[*mut u8],
//!     len: usize,
//!     strides: &[isize],
//!     _auxdata: AuxDataMut<'_>,
//! ) -> Result<(), LoopError> {
//!     for i in 0..len as isize {
//!         // SAFETY: Guaranteed by the caller.
//!         unsafe {
//!             let value = data[0].offset(i * strides[0]).cast::<i64>().read();
//!             data[1].offset(i * strides[1]).cast::<i64>().write(-value);
//!         }
//!     }
//!     Ok(())
//! }
//!
//! let int64 = DTypeRef::new(Int64);
//! let spec = MethodSpec::new("negative", 1, 1)
//!     .with_casting(Casting::No)
//!     .with_dtypes([Some(int64.clone()), Some(int64.clone())])
//!     .with_slot(Slot::strided_loop(StridedLoop::new(negate)));
//! let bound = ArrayMethod::from_spec(&spec).unwrap();
//!
//! let descr = int64.default_descriptor().unwrap();
//! let input = [1i64, -2, 3];
//! let mut output = [0i64; 3];
//! let args = [
//!     StridedArg::from_slice(descr.clone(), &input).unwrap(),
//!     StridedArg::from_mut_slice(descr, &mut output).unwrap(),
//! ];
//! bound.simple_strided_call(&args).unwrap();
//! drop(args);
//! assert_eq!(output, [-1, 2, -3]);
//! ```
#![cfg_attr(
    not(test),
    warn(
        clippy::panic,
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::undocumented_unsafe_blocks
    )
)]

mod call;
pub use call::{CallError, StridedArg};

mod error;
pub use error::{ErrorContext, InternalFault, MethodError, MethodErrorKind, MethodResult};

mod flags;
pub use flags::MethodFlags;

mod get_loop;
pub use get_loop::{is_contiguous, DefaultLoopSelector, GetStridedLoop, SelectedLoop};

mod masked;
pub use masked::{get_masked_strided_loop, masked_strided_loop, MaskedLoopData};

mod method;
pub use method::{ArrayMethod, BoundArrayMethod, LoopSelector, Resolver};

mod resolve;
pub use resolve::{DefaultResolver, Resolution, ResolveDescriptors};

pub mod spec;
pub use spec::{MethodSpec, RegistrationError, Slot, SlotFn, SlotId, MAX_ARGS};

mod strided_loop;
pub use strided_loop::{
    AuxData, AuxDataMut, LoopContext, LoopError, LoopKind, LoopPair, Loops, StridedLoop,
    StridedLoopFn,
};

#[cfg(test)]
mod test_util;
