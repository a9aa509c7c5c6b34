/*
 * Copyright (c) Microsoft Corporation.
 * Licensed under the MIT license.
 */

//! Type classes ("DTypes") as seen by array methods.
//!
//! A type class identifies a family of element types, for example "32-bit integer" or
//! "fixed length byte string". The class hierarchy itself lives outside of this crate:
//! implementors provide [`DType`] and hand out [`DTypeRef`]s. Class identity is the
//! identity of the shared allocation, so two handles compare equal only if they were
//! cloned from the same [`DTypeRef`].

use std::{
    fmt,
    sync::{Arc, Weak},
};

use crate::{DTypeError, DescrRef};

/// The interface a type class exposes to array methods.
pub trait DType: fmt::Debug + Send + Sync + 'static {
    /// A human readable name.
    fn name(&self) -> &str;

    /// Abstract classes cannot be instantiated.
    ///
    /// They may be used for method outputs to signal that the output class is determined
    /// by descriptor resolution.
    fn is_abstract(&self) -> bool {
        false
    }

    /// Instances of parametric classes carry parameters (such as a length) that the
    /// class alone does not determine.
    fn is_parametric(&self) -> bool {
        false
    }

    /// Return the canonical default instance of the class.
    ///
    /// `this` is the handle through which `self` was reached and must be the class of
    /// the returned descriptor.
    fn default_descriptor(&self, this: &DTypeRef) -> Result<DescrRef, DTypeError>;

    /// Return the least general class both `this` and `other` can be converted to.
    ///
    /// Return `None` if this class does not know the answer. The other class will then
    /// be asked (see [`common_dtype`]).
    fn common_dtype(&self, this: &DTypeRef, other: &DTypeRef) -> Option<DTypeRef> {
        let _ = (this, other);
        None
    }
}

/// A shared, owning handle to a type class.
#[derive(Clone)]
pub struct DTypeRef(Arc<dyn DType>);

impl DTypeRef {
    /// Wrap `dtype` in a new handle with a fresh identity.
    pub fn new<T: DType>(dtype: T) -> Self {
        Self(Arc::new(dtype))
    }

    pub fn name(&self) -> &str {
        self.0.name()
    }

    pub fn is_abstract(&self) -> bool {
        self.0.is_abstract()
    }

    pub fn is_parametric(&self) -> bool {
        self.0.is_parametric()
    }

    pub fn default_descriptor(&self) -> Result<DescrRef, DTypeError> {
        self.0.default_descriptor(self)
    }

    /// Return `true` if `self` and `other` are the same class.
    #[inline]
    pub fn is(&self, other: &DTypeRef) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// Create a non-owning handle.
    pub fn downgrade(&self) -> WeakDTypeRef {
        WeakDTypeRef(Arc::downgrade(&self.0))
    }

    /// The number of owning handles to this class.
    pub fn strong_count(&self) -> usize {
        Arc::strong_count(&self.0)
    }

    /// Access the underlying implementation.
    pub fn get(&self) -> &dyn DType {
        &*self.0
    }
}

impl PartialEq for DTypeRef {
    fn eq(&self, other: &Self) -> bool {
        self.is(other)
    }
}

impl Eq for DTypeRef {}

impl fmt::Debug for DTypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DTypeRef({})", self.name())
    }
}

impl fmt::Display for DTypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A non-owning handle to a type class.
///
/// Used for back-references from a class to objects that themselves own the class.
#[derive(Debug, Clone)]
pub struct WeakDTypeRef(Weak<dyn DType>);

impl WeakDTypeRef {
    /// Return an owning handle if the class is still alive.
    pub fn upgrade(&self) -> Option<DTypeRef> {
        self.0.upgrade().map(DTypeRef)
    }
}

/// Compute the common class of `first` and `second`.
///
/// Identical classes are their own common class. Otherwise `first` is asked, and if it
/// does not know the answer `second` is asked.
pub fn common_dtype(first: &DTypeRef, second: &DTypeRef) -> Result<DTypeRef, DTypeError> {
    if first.is(second) {
        return Ok(first.clone());
    }
    first
        .get()
        .common_dtype(first, second)
        .or_else(|| second.get().common_dtype(second, first))
        .ok_or_else(|| DTypeError::NoCommonDType {
            first: first.name().to_owned(),
            second: second.name().to_owned(),
        })
}

/// Fold [`common_dtype`] over `dtypes` from left to right.
pub fn common_dtype_of(dtypes: &[DTypeRef]) -> Result<DTypeRef, DTypeError> {
    let (head, tail) = dtypes.split_first().ok_or(DTypeError::EmptyCommonDType)?;
    tail.iter()
        .try_fold(head.clone(), |common, next| common_dtype(&common, next))
}

///////////
// Tests //
///////////
