/*
 * Copyright (c) Microsoft Corporation.
 * Licensed under the MIT license.
 */

use bitflags::bitflags;

bitflags! {
    /// Capabilities and requirements of an [`crate::ArrayMethod`].
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct MethodFlags: u32 {
        /// The inner loop must be called while holding the host environment's API lock.
        const REQUIRES_HOST_API = 1 << 1;
        /// The inner loop never raises floating point errors, so callers may skip
        /// checking the floating point status after the call.
        const NO_FLOATINGPOINT_ERRORS = 1 << 2;
        /// Unaligned inner loops are registered.
        const SUPPORTS_UNALIGNED = 1 << 3;

        /// Flags reported by loop selection and acted upon by the caller.
        const RUNTIME = Self::REQUIRES_HOST_API.bits() | Self::NO_FLOATINGPOINT_ERRORS.bits();
    }
}

impl MethodFlags {
    /// The subset of `self` that is relevant at call time.
    pub fn runtime(self) -> Self {
        self & Self::RUNTIME
    }
}

///////////
// Tests //
///////////
