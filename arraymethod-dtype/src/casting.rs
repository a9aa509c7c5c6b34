/*
 * Copyright (c) Microsoft Corporation.
 * Licensed under the MIT license.
 */

//! Casting safety levels.

use std::fmt;

use thiserror::Error;

/// The safety of a conversion between two type instances.
///
/// Variants are ordered from most to least safe, so `a < b` means `a` is the safer cast.
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Casting {
    /// The instances are identical.
    No = 0,
    /// The instances differ only in representation (e.g. byte order).
    Equiv = 1,
    /// Every value of the source is representable in the destination.
    Safe = 2,
    /// The conversion stays within a kind (e.g. `float64` to `float32`).
    SameKind = 3,
    /// Anything goes.
    Unsafe = 4,
}

impl Casting {
    /// All casting values in increasing order of permissiveness.
    pub const ALL: [Casting; 5] = [
        Casting::No,
        Casting::Equiv,
        Casting::Safe,
        Casting::SameKind,
        Casting::Unsafe,
    ];

    /// Returns the string representation of the casting.
    pub const fn as_str(self) -> &'static str {
        match self {
            Casting::No => "no",
            Casting::Equiv => "equiv",
            Casting::Safe => "safe",
            Casting::SameKind => "same_kind",
            Casting::Unsafe => "unsafe",
        }
    }

    const fn from_raw(raw: i32) -> Option<Self> {
        match raw {
            0 => Some(Casting::No),
            1 => Some(Casting::Equiv),
            2 => Some(Casting::Safe),
            3 => Some(Casting::SameKind),
            4 => Some(Casting::Unsafe),
            _ => None,
        }
    }
}

impl fmt::Display for Casting {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A [`Casting`] together with the flag recording that the conversion is a pure view
/// (no data needs to be touched).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CastingLevel {
    casting: Casting,
    is_view: bool,
}

impl CastingLevel {
    /// Identity conversion.
    pub const NO: Self = Self::new(Casting::No);
    /// Representation change only.
    pub const EQUIV: Self = Self::new(Casting::Equiv);
    /// Value preserving.
    pub const SAFE: Self = Self::new(Casting::Safe);
    /// Within a kind.
    pub const SAME_KIND: Self = Self::new(Casting::SameKind);
    /// Unrestricted.
    pub const UNSAFE: Self = Self::new(Casting::Unsafe);

    /// Construct a level that is not a view.
    pub const fn new(casting: Casting) -> Self {
        Self {
            casting,
            is_view: false,
        }
    }

    /// Construct a level that is a view.
    pub const fn view(casting: Casting) -> Self {
        Self {
            casting,
            is_view: true,
        }
    }

    pub const fn casting(self) -> Casting {
        self.casting
    }

    pub const fn is_view(self) -> bool {
        self.is_view
    }

    /// Return the same level with the view flag cleared.
    pub const fn without_view(self) -> Self {
        Self::new(self.casting)
    }

    /// Conservatively combine two levels.
    ///
    /// The result carries the least safe casting of the two and is only a view if both
    /// sides are views. The operation is commutative and associative.
    pub fn merge(self, other: Self) -> Self {
        Self {
            casting: self.casting.max(other.casting),
            is_view: self.is_view && other.is_view,
        }
    }

    /// Encode `self` as a raw casting constant.
    pub const fn to_raw(self) -> RawCasting {
        let bits = self.casting as i32;
        if self.is_view {
            RawCasting(bits | RawCasting::CAST_IS_VIEW)
        } else {
            RawCasting(bits)
        }
    }
}

impl From<Casting> for CastingLevel {
    fn from(casting: Casting) -> Self {
        Self::new(casting)
    }
}

impl fmt::Display for CastingLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_view {
            write!(f, "{} (view)", self.casting)
        } else {
            write!(f, "{}", self.casting)
        }
    }
}

/// An untyped casting constant as found in method specifications.
///
/// The low bits hold a [`Casting`] discriminant, bit 16 is the view flag and `-1` means
/// the casting is determined for every call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct RawCasting(pub i32);

impl RawCasting {
    /// The view flag.
    pub const CAST_IS_VIEW: i32 = 1 << 16;

    /// No casting declared.
    pub const UNSPECIFIED: Self = Self(-1);

    pub const fn is_unspecified(self) -> bool {
        self.0 == Self::UNSPECIFIED.0
    }

    /// Decode into an optional level, `None` meaning [`Self::UNSPECIFIED`].
    pub fn decode(self) -> Result<Option<CastingLevel>, InvalidCasting> {
        if self.is_unspecified() {
            Ok(None)
        } else {
            CastingLevel::try_from(self).map(Some)
        }
    }
}

impl From<CastingLevel> for RawCasting {
    fn from(level: CastingLevel) -> Self {
        level.to_raw()
    }
}

impl From<Casting> for RawCasting {
    fn from(casting: Casting) -> Self {
        CastingLevel::new(casting).to_raw()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("invalid casting constant `{0}`")]
pub struct InvalidCasting(pub i32);

impl TryFrom<RawCasting> for CastingLevel {
    type Error = InvalidCasting;

    fn try_from(raw: RawCasting) -> Result<Self, Self::Error> {
        if raw.0 < 0 {
            return Err(InvalidCasting(raw.0));
        }
        let is_view = raw.0 & RawCasting::CAST_IS_VIEW != 0;
        match Casting::from_raw(raw.0 & !RawCasting::CAST_IS_VIEW) {
            Some(casting) => Ok(Self { casting, is_view }),
            None => Err(InvalidCasting(raw.0)),
        }
    }
}

///////////
// Tests //
///////////
