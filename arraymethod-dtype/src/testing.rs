/*
 * Copyright (c) Microsoft Corporation.
 * Licensed under the MIT license.
 */

//! A small type class zoo for tests.
//!
//! * `bool < int32 < float64` form a promotion ladder. Each class only knows the common
//!   class with classes below it, so common-class queries exercise both sides of
//!   [`crate::common_dtype`].
//! * `bytes` is parametric and has no default instance.
//! * `number` is abstract.

use std::sync::LazyLock;

use crate::{ByteOrder, DType, DTypeError, DTypeRef, DescrRef, Descriptor};

#[derive(Debug, Clone)]
pub struct TestDType {
    name: &'static str,
    elsize: usize,
    byteorder: ByteOrder,
    is_abstract: bool,
    is_parametric: bool,
}

impl TestDType {
    /// A concrete, non-parametric class with native byte order instances.
    pub const fn concrete(name: &'static str, elsize: usize) -> Self {
        Self {
            name,
            elsize,
            byteorder: if elsize == 1 {
                ByteOrder::NotApplicable
            } else {
                ByteOrder::NATIVE
            },
            is_abstract: false,
            is_parametric: false,
        }
    }

    pub fn into_ref(self) -> DTypeRef {
        DTypeRef::new(self)
    }
}

fn rank(dtype: &DTypeRef) -> Option<usize> {
    [boolean(), int32(), float64()]
        .iter()
        .position(|d| d.is(dtype))
}

impl DType for TestDType {
    fn name(&self) -> &str {
        self.name
    }

    fn is_abstract(&self) -> bool {
        self.is_abstract
    }

    fn is_parametric(&self) -> bool {
        self.is_parametric
    }

    fn default_descriptor(&self, this: &DTypeRef) -> Result<DescrRef, DTypeError> {
        if self.is_abstract {
            return Err(DTypeError::Abstract(self.name.to_owned()));
        }
        if self.is_parametric {
            return Err(DTypeError::Instantiation {
                dtype: self.name.to_owned(),
                reason: "a length is required".to_owned(),
            });
        }
        let alignment = self.elsize.next_power_of_two();
        Ok(Descriptor::new(this.clone(), self.byteorder, self.elsize, alignment)?.into_ref())
    }

    fn common_dtype(&self, this: &DTypeRef, other: &DTypeRef) -> Option<DTypeRef> {
        match (rank(this), rank(other)) {
            (Some(lhs), Some(rhs)) if rhs <= lhs => Some(this.clone()),
            _ => None,
        }
    }
}

static BOOLEAN: LazyLock<DTypeRef> = LazyLock::new(|| TestDType::concrete("bool", 1).into_ref());
static INT32: LazyLock<DTypeRef> = LazyLock::new(|| TestDType::concrete("int32", 4).into_ref());
static FLOAT64: LazyLock<DTypeRef> =
    LazyLock::new(|| TestDType::concrete("float64", 8).into_ref());
static BYTES: LazyLock<DTypeRef> = LazyLock::new(|| {
    TestDType {
        is_parametric: true,
        byteorder: ByteOrder::NotApplicable,
        ..TestDType::concrete("bytes", 0)
    }
    .into_ref()
});
static NUMBER: LazyLock<DTypeRef> = LazyLock::new(|| {
    TestDType {
        is_abstract: true,
        ..TestDType::concrete("number", 0)
    }
    .into_ref()
});

pub fn boolean() -> DTypeRef {
    BOOLEAN.clone()
}

pub fn int32() -> DTypeRef {
    INT32.clone()
}

pub fn float64() -> DTypeRef {
    FLOAT64.clone()
}

/// Parametric: instances carry their length.
pub fn bytes() -> DTypeRef {
    BYTES.clone()
}

/// Abstract.
pub fn number() -> DTypeRef {
    NUMBER.clone()
}

/// An instance of `bytes` with length `len`.
#[allow(clippy::expect_used)]
pub fn bytes_of(len: usize) -> DescrRef {
    Descriptor::new(bytes(), ByteOrder::NotApplicable, len, 1)
        .expect("1 is a power of two")
        .with_param(len as u64)
        .into_ref()
}

/// The default instance of `dtype` in non-native byte order.
///
/// # Panics
///
/// Panics if `dtype` has no default instance.
#[allow(clippy::expect_used)]
pub fn swapped(dtype: &DTypeRef) -> DescrRef {
    let descr = dtype
        .default_descriptor()
        .expect("a default descriptor is required");
    descr.with_byteorder(ByteOrder::SWAPPED).into_ref()
}
