/*
 * Copyright (c) Microsoft Corporation.
 * Licensed under the MIT license.
 */

//! Inner loops and the tables they are registered in.
//!
//! An inner loop processes `len` elements of every argument. Argument `i` starts at
//! `data[i]` and consecutive elements are `strides[i]` bytes apart. Methods register up
//! to four variants of the same loop:
//!
//! ```text
//!                 | any stride         | stride == elsize
//!  ---------------+--------------------+----------------------
//!  aligned        | Strided (required) | Contiguous
//!  unaligned      | UnalignedStrided   | UnalignedContiguous
//! ```
//!
//! [`Loops`] encodes which combinations are legal: the aligned strided loop always
//! exists, and a contiguous variant can only be registered alongside the strided loop of
//! the same row.

use std::{any::Any, fmt, num::NonZeroI32};

use arraymethod_dtype::DescrRef;
use thiserror::Error;

use crate::ArrayMethod;

/// Loop-private state produced by loop selection.
///
/// The state is owned by the [`crate::SelectedLoop`] it was returned in and released when
/// that is dropped.
pub trait AuxData: Any + Send + fmt::Debug {
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T> AuxData for T
where
    T: Any + Send + fmt::Debug,
{
    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

impl dyn AuxData {
    /// Attempt to downcast to a concrete type.
    pub fn downcast_mut<T: Any>(&mut self) -> Option<&mut T> {
        self.as_any_mut().downcast_mut::<T>()
    }
}

/// The auxiliary data argument of an inner loop.
pub type AuxDataMut<'a> = Option<&'a mut (dyn AuxData + 'static)>;

/// The signature shared by all inner loops.
///
/// # Safety
///
/// For every argument `i`, `data[i]` offset by `k * strides[i]` bytes must be valid for
/// an element of the argument's resolved descriptor for all `k < len`. Outputs must be
/// writeable. `data` and `strides` hold one entry per argument.
pub type StridedLoopFn = unsafe fn(
    context: &LoopContext<'_>,
    data: &[*mut u8],
    len: usize,
    strides: &[isize],
    auxdata: AuxDataMut<'_>,
) -> Result<(), LoopError>;

/// An inner loop.
#[derive(Clone, Copy)]
pub struct StridedLoop(StridedLoopFn);

impl StridedLoop {
    pub const fn new(func: StridedLoopFn) -> Self {
        Self(func)
    }

    /// Invoke the loop.
    ///
    /// # Safety
    ///
    /// See [`StridedLoopFn`].
    #[inline]
    pub unsafe fn call(
        &self,
        context: &LoopContext<'_>,
        data: &[*mut u8],
        len: usize,
        strides: &[isize],
        auxdata: AuxDataMut<'_>,
    ) -> Result<(), LoopError> {
        // SAFETY: Forwarded to the caller.
        unsafe { (self.0)(context, data, len, strides, auxdata) }
    }

    /// The address of the loop. Two loops are the same function if their addresses are
    /// equal.
    pub fn addr(&self) -> usize {
        self.0 as usize
    }

    /// Return `true` if `self` and `other` are the same function.
    pub fn same(&self, other: &StridedLoop) -> bool {
        self.addr() == other.addr()
    }
}

impl fmt::Debug for StridedLoop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StridedLoop({:#x})", self.addr())
    }
}

/// The non-zero status returned by a failing inner loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("inner loop failed with code {0}")]
pub struct LoopError(NonZeroI32);

impl LoopError {
    /// Reported by wrapping loops that were invoked without their auxiliary data.
    pub const INVALID_AUXDATA: Self = Self(NonZeroI32::MIN);

    /// Reported by wrapping loops that were invoked with the wrong number of data pointers
    /// or strides.
    pub const ARGUMENT_COUNT: Self = match Self::from_code(i32::MIN + 1) {
        Some(err) => err,
        None => Self::INVALID_AUXDATA,
    };

    pub const fn new(code: NonZeroI32) -> Self {
        Self(code)
    }

    /// Convert a C-style status code. Returns `None` for `0` (success).
    pub const fn from_code(code: i32) -> Option<Self> {
        match NonZeroI32::new(code) {
            Some(code) => Some(Self(code)),
            None => None,
        }
    }

    pub const fn code(self) -> i32 {
        self.0.get()
    }
}

/// Call-time information handed to inner loops.
#[derive(Debug, Clone, Copy)]
pub struct LoopContext<'a> {
    method: &'a ArrayMethod,
    descriptors: &'a [DescrRef],
}

impl<'a> LoopContext<'a> {
    pub fn new(method: &'a ArrayMethod, descriptors: &'a [DescrRef]) -> Self {
        Self {
            method,
            descriptors,
        }
    }

    pub fn method(&self) -> &'a ArrayMethod {
        self.method
    }

    /// The resolved descriptors, one per argument.
    pub fn descriptors(&self) -> &'a [DescrRef] {
        self.descriptors
    }
}

/// The four loop variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LoopKind {
    Strided,
    Contiguous,
    UnalignedStrided,
    UnalignedContiguous,
}

impl LoopKind {
    /// The variant matching the given memory layout.
    pub const fn for_layout(aligned: bool, contiguous: bool) -> Self {
        match (aligned, contiguous) {
            (true, false) => LoopKind::Strided,
            (true, true) => LoopKind::Contiguous,
            (false, false) => LoopKind::UnalignedStrided,
            (false, true) => LoopKind::UnalignedContiguous,
        }
    }

    pub const fn is_aligned(self) -> bool {
        matches!(self, LoopKind::Strided | LoopKind::Contiguous)
    }

    pub const fn is_contiguous(self) -> bool {
        matches!(self, LoopKind::Contiguous | LoopKind::UnalignedContiguous)
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            LoopKind::Strided => "strided",
            LoopKind::Contiguous => "contiguous",
            LoopKind::UnalignedStrided => "unaligned strided",
            LoopKind::UnalignedContiguous => "unaligned contiguous",
        }
    }
}

impl fmt::Display for LoopKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A strided loop with an optional contiguous specialization.
#[derive(Debug, Clone, Copy)]
pub struct LoopPair {
    strided: StridedLoop,
    contiguous: Option<StridedLoop>,
}

impl LoopPair {
    pub const fn new(strided: StridedLoop) -> Self {
        Self {
            strided,
            contiguous: None,
        }
    }

    pub const fn with_contiguous(self, contiguous: StridedLoop) -> Self {
        Self {
            strided: self.strided,
            contiguous: Some(contiguous),
        }
    }

    pub fn strided(&self) -> StridedLoop {
        self.strided
    }

    /// The registered contiguous loop, if any.
    pub fn contiguous(&self) -> Option<StridedLoop> {
        self.contiguous
    }

    /// Return the contiguous loop if `contiguous` and one is registered, otherwise the
    /// strided loop. The flag returned indicates whether the contiguous loop was chosen.
    pub fn select(&self, contiguous: bool) -> (StridedLoop, bool) {
        match self.contiguous {
            Some(func) if contiguous => (func, true),
            _ => (self.strided, false),
        }
    }
}

/// The inner loops registered with a method.
#[derive(Debug, Clone, Copy)]
pub struct Loops {
    aligned: LoopPair,
    unaligned: Option<LoopPair>,
}

impl Loops {
    pub const fn new(aligned: LoopPair) -> Self {
        Self {
            aligned,
            unaligned: None,
        }
    }

    pub const fn with_unaligned(self, unaligned: LoopPair) -> Self {
        Self {
            aligned: self.aligned,
            unaligned: Some(unaligned),
        }
    }

    pub fn aligned(&self) -> &LoopPair {
        &self.aligned
    }

    pub fn unaligned(&self) -> Option<&LoopPair> {
        self.unaligned.as_ref()
    }

    /// The pair serving the given alignment.
    pub fn pair(&self, aligned: bool) -> Option<&LoopPair> {
        if aligned {
            Some(&self.aligned)
        } else {
            self.unaligned.as_ref()
        }
    }

    pub fn supports_unaligned(&self) -> bool {
        self.unaligned.is_some()
    }

    /// Return the loop registered for `kind`.
    ///
    /// Contiguous variants fall back to the strided loop of the same alignment.
    pub fn get(&self, kind: LoopKind) -> Option<StridedLoop> {
        self.pair(kind.is_aligned())
            .map(|pair| pair.select(kind.is_contiguous()).0)
    }
}

///////////
// Tests //
///////////
