/*
 * Copyright (c) Microsoft Corporation.
 * Licensed under the MIT license.
 */

use std::fmt::Debug;

use arraymethod_dtype::DescrRef;
use tracing::{trace, warn};

use crate::{
    AuxData, InternalFault, LoopContext, LoopError, LoopKind, MethodError, MethodFlags,
    MethodResult, StridedLoop,
};

/// An inner loop chosen for a specific memory layout, together with its private state.
#[derive(Debug)]
pub struct SelectedLoop {
    pub func: StridedLoop,
    /// Released when `self` is dropped.
    pub auxdata: Option<Box<dyn AuxData>>,
    /// Runtime flags the caller must act on. See [`MethodFlags::RUNTIME`].
    pub flags: MethodFlags,
}

impl SelectedLoop {
    pub fn new(func: StridedLoop) -> Self {
        Self {
            func,
            auxdata: None,
            flags: MethodFlags::empty(),
        }
    }

    pub fn with_auxdata(mut self, auxdata: Box<dyn AuxData>) -> Self {
        self.auxdata = Some(auxdata);
        self
    }

    pub fn with_flags(mut self, flags: MethodFlags) -> Self {
        self.flags = flags;
        self
    }

    /// Invoke the selected loop with its auxiliary data.
    ///
    /// # Safety
    ///
    /// See [`crate::StridedLoopFn`].
    pub unsafe fn call(
        &mut self,
        context: &LoopContext<'_>,
        data: &[*mut u8],
        len: usize,
        strides: &[isize],
    ) -> Result<(), LoopError> {
        // SAFETY: Forwarded to the caller.
        unsafe {
            self.func
                .call(context, data, len, strides, self.auxdata.as_deref_mut())
        }
    }
}

/// Selects the inner loop for a memory layout.
///
/// `aligned` is asserted by the caller: every data pointer and stride is a multiple of
/// the alignment of its descriptor. `strides` holds one entry per argument.
pub trait GetStridedLoop: Send + Sync + Debug {
    fn get_strided_loop(
        &self,
        context: &LoopContext<'_>,
        aligned: bool,
        strides: &[isize],
    ) -> MethodResult<SelectedLoop>;
}

impl LoopContext<'_> {
    /// Select an inner loop through the selector of [`Self::method`].
    ///
    /// The selected flags must be a subset of the method's runtime flags.
    pub fn get_strided_loop(
        &self,
        aligned: bool,
        strides: &[isize],
    ) -> MethodResult<SelectedLoop> {
        let method = self.method();
        let selected = method
            .selector()
            .as_dyn()
            .get_strided_loop(self, aligned, strides)?;

        let declared = method.flags().runtime();
        if !declared.contains(selected.flags) {
            warn!(
                "{}: selected loop reports flags {:?} outside of the declared {:?}",
                method.name(),
                selected.flags,
                declared
            );
            return Err(MethodError::from(InternalFault::FlagsMismatch {
                method: method.name().to_owned(),
                declared,
                got: selected.flags,
            }));
        }
        Ok(selected)
    }
}

/// Return `true` if every stride equals the element size of its descriptor.
pub fn is_contiguous(strides: &[isize], descriptors: &[DescrRef]) -> bool {
    strides.len() == descriptors.len()
        && std::iter::zip(strides, descriptors)
            .all(|(&stride, descr)| isize::try_from(descr.elsize()) == Ok(stride))
}

/// The selector used when a method does not register one.
///
/// Chooses between the registered [`crate::Loops`] of the method. The contiguous variant is
/// used only if all arguments are contiguous and one was registered. No auxiliary data is
/// produced.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultLoopSelector;

impl GetStridedLoop for DefaultLoopSelector {
    fn get_strided_loop(
        &self,
        context: &LoopContext<'_>,
        aligned: bool,
        strides: &[isize],
    ) -> MethodResult<SelectedLoop> {
        let method = context.method();
        let descriptors = context.descriptors();
        for (what, got) in [("strides", strides.len()), ("descriptors", descriptors.len())] {
            if got != method.nargs() {
                return Err(MethodError::from(InternalFault::ArgumentCount {
                    method: method.name().to_owned(),
                    what,
                    expected: method.nargs(),
                    got,
                }));
            }
        }

        let loops = method.loops().ok_or_else(|| InternalFault::MissingLoops {
            method: method.name().to_owned(),
        })?;
        let pair = loops
            .pair(aligned)
            .ok_or_else(|| InternalFault::UnalignedNotSupported {
                method: method.name().to_owned(),
            })?;

        let (func, contiguous) = pair.select(is_contiguous(strides, descriptors));
        trace!(
            "{}: selected {} inner loop",
            method.name(),
            LoopKind::for_layout(aligned, contiguous)
        );

        Ok(SelectedLoop::new(func).with_flags(method.flags().runtime()))
    }
}

///////////
// Tests //
///////////
