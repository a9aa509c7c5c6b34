/*
 * Copyright (c) Microsoft Corporation.
 * Licensed under the MIT license.
 */
//! # arraymethod-dtype
//!
//! The type vocabulary shared by array methods and the type system they dispatch over:
//!
//! * [`DType`] / [`DTypeRef`]: type classes, implemented outside of this crate.
//! * [`Descriptor`] / [`DescrRef`]: concrete (possibly parametrized) instances of a class.
//! * [`Casting`] / [`CastingLevel`]: the ordered safety classification of a conversion.
#![cfg_attr(
    not(test),
    warn(
        clippy::panic,
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::undocumented_unsafe_blocks
    )
)]

mod casting;
pub use casting::{Casting, CastingLevel, InvalidCasting, RawCasting};

mod descriptor;
pub use descriptor::{ByteOrder, DescrRef, Descriptor};

mod dtype;
pub use dtype::{common_dtype, common_dtype_of, DType, DTypeRef, WeakDTypeRef};

mod error;
pub use error::DTypeError;

#[cfg(any(test, feature = "testing"))]
pub mod testing;
