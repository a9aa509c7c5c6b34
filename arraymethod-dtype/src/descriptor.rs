/*
 * Copyright (c) Microsoft Corporation.
 * Licensed under the MIT license.
 */

//! Concrete type instances.

use std::{fmt, sync::Arc};

use crate::{DTypeError, DTypeRef};

/// Byte order of a type instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ByteOrder {
    Little,
    Big,
    /// Single byte or opaque data where byte order has no meaning.
    NotApplicable,
}

impl ByteOrder {
    #[cfg(target_endian = "little")]
    pub const NATIVE: ByteOrder = ByteOrder::Little;

    #[cfg(target_endian = "big")]
    pub const NATIVE: ByteOrder = ByteOrder::Big;

    /// The opposite of [`Self::NATIVE`].
    #[cfg(target_endian = "little")]
    pub const SWAPPED: ByteOrder = ByteOrder::Big;

    #[cfg(target_endian = "big")]
    pub const SWAPPED: ByteOrder = ByteOrder::Little;

    /// Whether data in this byte order can be used without swapping.
    pub const fn is_native(self) -> bool {
        matches!(
            (self, Self::NATIVE),
            (ByteOrder::NotApplicable, _)
                | (ByteOrder::Little, ByteOrder::Little)
                | (ByteOrder::Big, ByteOrder::Big)
        )
    }
}

/// A shared handle to an immutable [`Descriptor`].
///
/// Two handles are *identical* if they point to the same allocation (see
/// [`Descriptor::identical`]) and *equal* if the descriptors compare equal.
pub type DescrRef = Arc<Descriptor>;

/// A concrete instance of a type class.
///
/// ```text
///  Descriptor
///  +----------------------------+
///  | dtype     -> int32  (class)|
///  | byteorder    Big           |
///  | elsize       4             |
///  | alignment    4             |
///  | param        None          |
///  +----------------------------+
/// ```
///
/// `param` carries the class specific parameter of parametric classes (for example the
/// length of a fixed width string).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Descriptor {
    dtype: DTypeRef,
    byteorder: ByteOrder,
    elsize: usize,
    alignment: usize,
    param: Option<u64>,
}

impl Descriptor {
    /// Construct a new descriptor. `alignment` must be a power of two.
    pub fn new(
        dtype: DTypeRef,
        byteorder: ByteOrder,
        elsize: usize,
        alignment: usize,
    ) -> Result<Self, DTypeError> {
        if !alignment.is_power_of_two() {
            return Err(DTypeError::InvalidAlignment {
                dtype: dtype.name().to_owned(),
                alignment,
            });
        }
        Ok(Self {
            dtype,
            byteorder,
            elsize,
            alignment,
            param: None,
        })
    }

    /// Attach a class specific parameter.
    pub fn with_param(mut self, param: u64) -> Self {
        self.param = Some(param);
        self
    }

    /// Return a copy of `self` in the given byte order.
    pub fn with_byteorder(&self, byteorder: ByteOrder) -> Self {
        Self {
            byteorder,
            ..self.clone()
        }
    }

    /// Move `self` into a shared handle.
    pub fn into_ref(self) -> DescrRef {
        Arc::new(self)
    }

    pub fn dtype(&self) -> &DTypeRef {
        &self.dtype
    }

    pub fn byteorder(&self) -> ByteOrder {
        self.byteorder
    }

    /// The size of one element in bytes.
    pub fn elsize(&self) -> usize {
        self.elsize
    }

    /// The required alignment of one element in bytes.
    pub fn alignment(&self) -> usize {
        self.alignment
    }

    pub fn param(&self) -> Option<u64> {
        self.param
    }

    /// A descriptor is canonical if its data is in native byte order.
    pub fn is_canonical(&self) -> bool {
        self.byteorder.is_native()
    }

    /// Return `true` if `self` belongs exactly to the class `dtype`.
    pub fn is_instance_of(&self, dtype: &DTypeRef) -> bool {
        self.dtype.is(dtype)
    }

    /// Return the canonical version of `this`.
    ///
    /// If `this` is already canonical, the same handle is returned.
    pub fn ensure_canonical(this: &DescrRef) -> DescrRef {
        if this.is_canonical() {
            this.clone()
        } else {
            Arc::new(this.with_byteorder(ByteOrder::NATIVE))
        }
    }

    /// Return `true` if `a` and `b` are the same instance.
    #[inline]
    pub fn identical(a: &DescrRef, b: &DescrRef) -> bool {
        Arc::ptr_eq(a, b)
    }
}

impl fmt::Display for Descriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let order = match self.byteorder {
            ByteOrder::Little => "<",
            ByteOrder::Big => ">",
            ByteOrder::NotApplicable => "|",
        };
        match self.param {
            Some(param) => write!(f, "{}{}[{}]", order, self.dtype, param),
            None => write!(f, "{}{}", order, self.dtype),
        }
    }
}

///////////
// Tests //
///////////
