/*
 * Copyright (c) Microsoft Corporation.
 * Licensed under the MIT license.
 */

use thiserror::Error;

/// Errors raised by type classes.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum DTypeError {
    /// Neither class knows a common class for the pair.
    #[error("the DTypes {first} and {second} do not have a common DType")]
    NoCommonDType { first: String, second: String },

    /// `common_dtype_of` was asked about an empty list.
    #[error("cannot compute the common DType of zero DTypes")]
    EmptyCommonDType,

    /// Abstract classes have no instances.
    #[error("cannot create an instance of the abstract DType {0}")]
    Abstract(String),

    /// Instance alignments are powers of two.
    #[error("alignment {alignment} of DType {dtype} is not a power of two")]
    InvalidAlignment { dtype: String, alignment: usize },

    /// The class could not produce an instance.
    #[error("failed to create an instance of DType {dtype}: {reason}")]
    Instantiation { dtype: String, reason: String },
}
