/*
 * Copyright (c) Microsoft Corporation.
 * Licensed under the MIT license.
 */

//! Direct entry points of a [`BoundArrayMethod`].
//!
//! These work on exact instances of the bound classes and one-dimensional buffers only.
//! Everything involving iteration, broadcasting or casting happens in the caller.

use std::{marker::PhantomData, mem::size_of};

use arraymethod_dtype::{Casting, DTypeRef, DescrRef, Descriptor};
use thiserror::Error;
use tracing::warn;

use crate::{
    ArrayMethod, BoundArrayMethod, ErrorContext, InternalFault, MethodError, MethodResult,
    Resolution,
};

/// Invalid arguments to [`BoundArrayMethod::resolve_descriptors`] or
/// [`BoundArrayMethod::simple_strided_call`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum CallError {
    #[error("expected {expected} arguments, got {got} (method: {method})")]
    ArgumentCount {
        method: String,
        expected: usize,
        got: usize,
    },

    #[error("input {index} must be given (method: {method})")]
    MissingInput { method: String, index: usize },

    #[error(
        "argument {index} must be an instance of exactly {expected}, got {got} \
         (method: {method})"
    )]
    NotExactInstance {
        method: String,
        index: usize,
        expected: String,
        got: String,
    },

    #[error("argument {index} has length {got}, expected {expected} (method: {method})")]
    LengthMismatch {
        method: String,
        index: usize,
        expected: usize,
        got: usize,
    },

    #[error("output {index} must be writeable (method: {method})")]
    NotWriteable { method: String, index: usize },

    #[error("method does not support unaligned input (method: {method})")]
    UnalignedNotSupported { method: String },

    #[error("the method cannot operate on the given descriptors (method: {method})")]
    NoLoopForDTypes { method: String },

    #[error(
        "descriptor resolution adapted argument {index}; the direct call requires the \
         given descriptors to be used unchanged (method: {method})"
    )]
    DescriptorsAdapted { method: String, index: usize },

    #[error("element type of size {size} cannot hold instances of {dtype} with size {elsize}")]
    ElementSize {
        dtype: String,
        elsize: usize,
        size: usize,
    },
}

/// A one-dimensional argument of [`BoundArrayMethod::simple_strided_call`].
#[derive(Debug)]
pub struct StridedArg<'a> {
    descr: DescrRef,
    ptr: *mut u8,
    len: usize,
    stride: isize,
    writeable: bool,
    _marker: PhantomData<&'a mut [u8]>,
}

impl<'a> StridedArg<'a> {
    /// A read-only argument viewing `data`.
    pub fn from_slice<T>(descr: DescrRef, data: &'a [T]) -> Result<Self, CallError> {
        check_elsize::<T>(&descr)?;
        Ok(Self {
            descr,
            ptr: data.as_ptr().cast_mut().cast(),
            len: data.len(),
            stride: size_of::<T>() as isize,
            writeable: false,
            _marker: PhantomData,
        })
    }

    /// A writeable argument viewing `data`.
    pub fn from_mut_slice<T>(descr: DescrRef, data: &'a mut [T]) -> Result<Self, CallError> {
        check_elsize::<T>(&descr)?;
        Ok(Self {
            descr,
            ptr: data.as_mut_ptr().cast(),
            len: data.len(),
            stride: size_of::<T>() as isize,
            writeable: true,
            _marker: PhantomData,
        })
    }

    /// An argument with an arbitrary stride.
    ///
    /// # Safety
    ///
    /// `ptr` offset by `k * stride` bytes must point to an element of `descr` for all
    /// `k < len`, valid for reads and, if `writeable`, for writes for the lifetime `'a`.
    pub unsafe fn from_raw_parts(
        descr: DescrRef,
        ptr: *mut u8,
        len: usize,
        stride: isize,
        writeable: bool,
    ) -> Self {
        Self {
            descr,
            ptr,
            len,
            stride,
            writeable,
            _marker: PhantomData,
        }
    }

    pub fn descr(&self) -> &DescrRef {
        &self.descr
    }

    pub fn as_ptr(&self) -> *mut u8 {
        self.ptr
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The distance between consecutive elements in bytes.
    pub fn stride(&self) -> isize {
        self.stride
    }

    pub fn is_writeable(&self) -> bool {
        self.writeable
    }

    /// Return `true` if the data pointer and the stride are multiples of the alignment of
    /// the descriptor.
    pub fn is_aligned(&self) -> bool {
        let alignment = self.descr.alignment();
        (self.ptr as usize) % alignment == 0 && self.stride.unsigned_abs() % alignment == 0
    }
}

fn check_elsize<T>(descr: &Descriptor) -> Result<(), CallError> {
    if size_of::<T>() == descr.elsize() {
        Ok(())
    } else {
        Err(CallError::ElementSize {
            dtype: descr.to_string(),
            elsize: descr.elsize(),
            size: size_of::<T>(),
        })
    }
}

impl BoundArrayMethod {
    /// Resolve the descriptors of a call.
    ///
    /// `given` holds one entry per argument. Every given instance must belong exactly to
    /// the bound class and all inputs must be given. Returns `Ok(None)` if the method
    /// cannot operate on `given`.
    pub fn resolve_descriptors(
        &self,
        given: &[Option<DescrRef>],
    ) -> MethodResult<Option<Resolution>> {
        let method = self.method();
        check_argument_count(method, given.len())?;
        for (index, (dtype, given)) in std::iter::zip(self.dtypes(), given).enumerate() {
            match given {
                Some(given) => check_instance(method, index, dtype.as_ref(), given)?,
                None if index < method.nin() => {
                    return Err(MethodError::from(CallError::MissingInput {
                        method: method.name().to_owned(),
                        index,
                    }))
                }
                None => {}
            }
        }

        let resolution = method
            .resolve_descriptors(self.dtypes(), given)
            .with_context(|| format!("while resolving descriptors of {}", self))?;
        if let Some(resolution) = resolution.as_ref() {
            check_resolution(method, self.dtypes(), resolution)?;
        }
        Ok(resolution)
    }

    /// Run the method once over one-dimensional buffers.
    ///
    /// Every argument must be an exact instance of its bound class, all arguments must
    /// have the same length and outputs must be writeable. Resolution must reproduce the
    /// given descriptors unchanged, no casting is performed.
    pub fn simple_strided_call(&self, args: &[StridedArg<'_>]) -> MethodResult<()> {
        let method = self.method();
        check_argument_count(method, args.len())?;

        let len = args.first().map_or(0, StridedArg::len);
        for (index, (arg, dtype)) in std::iter::zip(args, self.dtypes()).enumerate() {
            check_instance(method, index, dtype.as_ref(), arg.descr())?;
            if arg.len() != len {
                return Err(MethodError::from(CallError::LengthMismatch {
                    method: method.name().to_owned(),
                    index,
                    expected: len,
                    got: arg.len(),
                }));
            }
            if index >= method.nin() && !arg.is_writeable() {
                return Err(MethodError::from(CallError::NotWriteable {
                    method: method.name().to_owned(),
                    index,
                }));
            }
        }

        let aligned = args.iter().all(StridedArg::is_aligned);
        if !aligned && !method.supports_unaligned() {
            return Err(MethodError::from(CallError::UnalignedNotSupported {
                method: method.name().to_owned(),
            }));
        }

        let given: Vec<Option<DescrRef>> =
            args.iter().map(|arg| Some(arg.descr().clone())).collect();
        let resolution = self
            .resolve_descriptors(&given)?
            .ok_or_else(|| CallError::NoLoopForDTypes {
                method: method.name().to_owned(),
            })?;
        let resolved = std::iter::zip(resolution.descriptors(), args);
        for (index, (resolved, arg)) in resolved.enumerate() {
            if !Descriptor::identical(resolved, arg.descr()) {
                return Err(MethodError::from(CallError::DescriptorsAdapted {
                    method: method.name().to_owned(),
                    index,
                }));
            }
        }

        let descriptors = resolution.into_descriptors();
        let context = method.context(&descriptors);
        let strides: Vec<isize> = args.iter().map(StridedArg::stride).collect();
        let data: Vec<*mut u8> = args.iter().map(StridedArg::as_ptr).collect();

        let mut selected = context
            .get_strided_loop(aligned, &strides)
            .with_context(|| format!("while selecting an inner loop of {}", self))?;
        // SAFETY: Every `StridedArg` describes `len` elements of its descriptor, which is
        // the resolved descriptor, and outputs were checked to be writeable.
        let result = unsafe { selected.call(&context, &data, len, &strides) };
        drop(selected);
        result.map_err(MethodError::from)
    }
}

fn check_argument_count(method: &ArrayMethod, got: usize) -> MethodResult<()> {
    if got == method.nargs() {
        Ok(())
    } else {
        Err(MethodError::from(CallError::ArgumentCount {
            method: method.name().to_owned(),
            expected: method.nargs(),
            got,
        }))
    }
}

fn check_instance(
    method: &ArrayMethod,
    index: usize,
    dtype: Option<&DTypeRef>,
    given: &Descriptor,
) -> MethodResult<()> {
    match dtype {
        Some(dtype) if given.is_instance_of(dtype) => Ok(()),
        _ => Err(MethodError::from(CallError::NotExactInstance {
            method: method.name().to_owned(),
            index,
            expected: dtype.map_or_else(|| "None".to_owned(), |dtype| dtype.name().to_owned()),
            got: given.to_string(),
        })),
    }
}

/// Check a resolution against the declaration of `method`.
///
/// A resolver may never report a less safe casting than declared. If no argument class
/// is deferred or parametric, the level must be exactly the declared one, except that a
/// declared `Equiv` may resolve to `No`. View flags are not compared.
fn check_resolution(
    method: &ArrayMethod,
    dtypes: &[Option<DTypeRef>],
    resolution: &Resolution,
) -> MethodResult<()> {
    if resolution.descriptors().len() != method.nargs() {
        return Err(MethodError::from(InternalFault::ArgumentCount {
            method: method.name().to_owned(),
            what: "resolved descriptors",
            expected: method.nargs(),
            got: resolution.descriptors().len(),
        }));
    }

    let Some(declared) = method.casting() else {
        return Ok(());
    };
    let declared = declared.without_view();
    let got = resolution.casting().without_view();

    if got.merge(declared) != declared {
        warn!(
            "{}: resolved casting {} is less safe than the declared {}",
            method.name(),
            got,
            declared
        );
        return Err(MethodError::from(InternalFault::CastingMismatch {
            method: method.name().to_owned(),
            declared,
            got,
        }));
    }

    let fixed = dtypes
        .iter()
        .all(|dtype| dtype.as_ref().is_some_and(|dtype| !dtype.is_parametric()));
    let equiv_to_no = declared.casting() == Casting::Equiv && got.casting() == Casting::No;
    if fixed && got != declared && !equiv_to_no {
        warn!(
            "{}: resolved casting {} differs from the declared {}",
            method.name(),
            got,
            declared
        );
        return Err(MethodError::from(InternalFault::NonParametricCastingChanged {
            method: method.name().to_owned(),
            declared,
            got,
        }));
    }
    Ok(())
}

///////////
// Tests //
///////////
