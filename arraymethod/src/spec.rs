/*
 * Copyright (c) Microsoft Corporation.
 * Licensed under the MIT license.
 */

//! Method specifications and their validation.
//!
//! A [`MethodSpec`] is the builder input for [`crate::ArrayMethod::from_spec`]. It lists
//! the arity, the type classes of every argument, the declared casting level and a table
//! of [`Slot`]s supplying the resolver, the loop selector and the inner loops. Slots that
//! are not supplied take the built-in defaults.

use std::{fmt, sync::Arc};

use arraymethod_dtype::{CastingLevel, DTypeRef, RawCasting};
use thiserror::Error;

use crate::{
    DefaultLoopSelector, DefaultResolver, GetStridedLoop, LoopPair, LoopSelector, Loops,
    MethodFlags, ResolveDescriptors, Resolver, StridedLoop,
};

/// The maximum number of arguments (inputs plus outputs) of a method.
pub const MAX_ARGS: usize = 32;

/// The name used for methods that were not given one.
pub const UNKNOWN_NAME: &str = "<unknown>";

/// Structural problems with a [`MethodSpec`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum RegistrationError {
    #[error(
        "method inputs and outputs must not exceed {max} in total, got {nin}+{nout} \
         (method: {method})"
    )]
    TooManyArguments {
        method: String,
        nin: usize,
        nout: usize,
        max: usize,
    },

    #[error("expected {expected} DTypes, got {got} (method: {method})")]
    DTypeCount {
        method: String,
        expected: usize,
        got: usize,
    },

    #[error("method has invalid casting `{raw}` (method: {method})")]
    InvalidCasting { method: String, raw: i32 },

    #[error(
        "method must have well defined input DTypes, input {index} is missing \
         (method: {method})"
    )]
    MissingInputDType { method: String, index: usize },

    #[error("abstract DType {dtype} is not allowed for input {index} (method: {method})")]
    AbstractInput {
        method: String,
        index: usize,
        dtype: String,
    },

    #[error("invalid slot number {slot} (method: {method})")]
    UnknownSlot { method: String, slot: u32 },

    #[error("slot {slot} was provided more than once (method: {method})")]
    DuplicateSlot { method: String, slot: SlotId },

    #[error("slot {slot} cannot hold a {found} (method: {method})")]
    SlotMismatch {
        method: String,
        slot: SlotId,
        found: &'static str,
    },

    #[error("slot {slot} may only be used by private methods (method: {method})")]
    PrivateSlot { method: String, slot: SlotId },

    #[error(
        "cannot leave casting unspecified when using the default `resolve_descriptors` \
         function (method: {method})"
    )]
    UnspecifiedCasting { method: String },

    #[error(
        "must specify output DTypes or use custom `resolve_descriptors` when there are \
         no inputs (method: {method})"
    )]
    UnresolvedOutputWithoutInputs { method: String },

    #[error(
        "must provide a `resolve_descriptors` function if any output DType is parametric, \
         output {index} is {dtype} (method: {method})"
    )]
    ParametricOutput {
        method: String,
        index: usize,
        dtype: String,
    },

    #[error("must provide a strided inner loop function (method: {method})")]
    MissingStridedLoop { method: String },

    #[error(
        "must provide an unaligned strided inner loop when providing an unaligned \
         contiguous one (method: {method})"
    )]
    MissingUnalignedStridedLoop { method: String },

    #[error(
        "an unaligned strided inner loop must be provided if and only if the method \
         supports unaligned data (supports unaligned: {supports_unaligned}, method: {method})"
    )]
    UnalignedFlagMismatch {
        method: String,
        supports_unaligned: bool,
    },
}

/// Identifies the purpose of a [`Slot`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SlotId(pub u32);

impl SlotId {
    /// A custom [`ResolveDescriptors`].
    pub const RESOLVE_DESCRIPTORS: Self = Self(1);
    /// A custom [`GetStridedLoop`]. Private.
    pub const GET_LOOP: Self = Self(2);
    pub const STRIDED_LOOP: Self = Self(3);
    pub const CONTIGUOUS_LOOP: Self = Self(4);
    pub const UNALIGNED_STRIDED_LOOP: Self = Self(5);
    pub const UNALIGNED_CONTIGUOUS_LOOP: Self = Self(6);

    /// The name of a known slot.
    pub const fn name(self) -> Option<&'static str> {
        match self.0 {
            1 => Some("resolve_descriptors"),
            2 => Some("get_loop"),
            3 => Some("strided_loop"),
            4 => Some("contiguous_loop"),
            5 => Some("unaligned_strided_loop"),
            6 => Some("unaligned_contiguous_loop"),
            _ => None,
        }
    }
}

impl fmt::Display for SlotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => write!(f, "`{}` ({})", name, self.0),
            None => write!(f, "{}", self.0),
        }
    }
}

/// The payload of a [`Slot`].
#[derive(Debug, Clone)]
pub enum SlotFn {
    Resolver(Arc<dyn ResolveDescriptors>),
    Selector(Arc<dyn GetStridedLoop>),
    Loop(StridedLoop),
}

impl SlotFn {
    fn describe(&self) -> &'static str {
        match self {
            SlotFn::Resolver(_) => "descriptor resolver",
            SlotFn::Selector(_) => "loop selector",
            SlotFn::Loop(_) => "inner loop",
        }
    }
}

/// One entry of the function table of a [`MethodSpec`].
#[derive(Debug, Clone)]
pub struct Slot {
    pub id: SlotId,
    pub func: SlotFn,
}

impl Slot {
    pub fn new(id: SlotId, func: SlotFn) -> Self {
        Self { id, func }
    }

    pub fn resolve_descriptors(resolver: Arc<dyn ResolveDescriptors>) -> Self {
        Self::new(SlotId::RESOLVE_DESCRIPTORS, SlotFn::Resolver(resolver))
    }

    pub fn get_loop(selector: Arc<dyn GetStridedLoop>) -> Self {
        Self::new(SlotId::GET_LOOP, SlotFn::Selector(selector))
    }

    pub fn strided_loop(func: StridedLoop) -> Self {
        Self::new(SlotId::STRIDED_LOOP, SlotFn::Loop(func))
    }

    pub fn contiguous_loop(func: StridedLoop) -> Self {
        Self::new(SlotId::CONTIGUOUS_LOOP, SlotFn::Loop(func))
    }

    pub fn unaligned_strided_loop(func: StridedLoop) -> Self {
        Self::new(SlotId::UNALIGNED_STRIDED_LOOP, SlotFn::Loop(func))
    }

    pub fn unaligned_contiguous_loop(func: StridedLoop) -> Self {
        Self::new(SlotId::UNALIGNED_CONTIGUOUS_LOOP, SlotFn::Loop(func))
    }
}

/// The specification of a method.
///
/// `dtypes` holds one entry per argument, inputs first. A `None` output leaves the output
/// class to descriptor resolution; inputs must always be given.
#[derive(Debug, Clone)]
pub struct MethodSpec {
    pub name: Option<String>,
    pub nin: usize,
    pub nout: usize,
    pub casting: RawCasting,
    pub flags: MethodFlags,
    pub dtypes: Vec<Option<DTypeRef>>,
    pub slots: Vec<Slot>,
}

impl MethodSpec {
    /// Start a specification with unspecified casting, no flags, no DTypes and no slots.
    pub fn new(name: impl Into<String>, nin: usize, nout: usize) -> Self {
        Self {
            name: Some(name.into()),
            nin,
            nout,
            casting: RawCasting::UNSPECIFIED,
            flags: MethodFlags::empty(),
            dtypes: Vec::new(),
            slots: Vec::new(),
        }
    }

    pub fn with_casting(mut self, casting: impl Into<RawCasting>) -> Self {
        self.casting = casting.into();
        self
    }

    pub fn with_flags(mut self, flags: MethodFlags) -> Self {
        self.flags = flags;
        self
    }

    pub fn with_dtypes<I>(mut self, dtypes: I) -> Self
    where
        I: IntoIterator<Item = Option<DTypeRef>>,
    {
        self.dtypes = dtypes.into_iter().collect();
        self
    }

    pub fn with_slot(mut self, slot: Slot) -> Self {
        self.slots.push(slot);
        self
    }

    /// The method name, or [`UNKNOWN_NAME`].
    pub fn name(&self) -> &str {
        match self.name.as_deref() {
            Some(name) if !name.is_empty() => name,
            _ => UNKNOWN_NAME,
        }
    }

    pub fn nargs(&self) -> usize {
        self.nin + self.nout
    }

    /// Run every check performed by [`crate::ArrayMethod::from_spec`] without building
    /// anything.
    pub fn validate(&self) -> Result<(), RegistrationError> {
        self.fill(true).map(|_| ())
    }

    /// Validate `self` and resolve its slots, filling in defaults.
    pub(crate) fn fill(&self, allow_private: bool) -> Result<Filled, RegistrationError> {
        let method = self.name();
        if self.nargs() > MAX_ARGS {
            return Err(RegistrationError::TooManyArguments {
                method: method.to_owned(),
                nin: self.nin,
                nout: self.nout,
                max: MAX_ARGS,
            });
        }
        let casting = self
            .casting
            .decode()
            .map_err(|err| RegistrationError::InvalidCasting {
                method: method.to_owned(),
                raw: err.0,
            })?;
        check_dtypes(method, self.nin, self.nout, &self.dtypes)?;

        let mut table = SlotTable::default();
        for slot in self.slots.iter() {
            table.insert(method, slot, allow_private)?;
        }

        let resolver = match table.resolver.take() {
            Some(resolver) => Resolver::Custom(resolver),
            None => {
                if casting.is_none() {
                    return Err(RegistrationError::UnspecifiedCasting {
                        method: method.to_owned(),
                    });
                }
                check_default_resolver_dtypes(method, self.nin, &self.dtypes)?;
                Resolver::Default(DefaultResolver)
            }
        };

        let (selector, loops) = match table.selector.take() {
            Some(selector) => {
                let loops = if table.has_loops() {
                    Some(table.loops(method)?)
                } else {
                    None
                };
                (LoopSelector::Custom(selector), loops)
            }
            None => {
                let loops = table.loops(method)?;
                let supports_unaligned = self.flags.contains(MethodFlags::SUPPORTS_UNALIGNED);
                if loops.supports_unaligned() != supports_unaligned {
                    return Err(RegistrationError::UnalignedFlagMismatch {
                        method: method.to_owned(),
                        supports_unaligned,
                    });
                }
                (LoopSelector::Default(DefaultLoopSelector), Some(loops))
            }
        };

        Ok(Filled {
            casting,
            resolver,
            selector,
            loops,
        })
    }
}

/// The result of [`MethodSpec::fill`].
#[derive(Debug)]
pub(crate) struct Filled {
    pub(crate) casting: Option<CastingLevel>,
    pub(crate) resolver: Resolver,
    pub(crate) selector: LoopSelector,
    pub(crate) loops: Option<Loops>,
}

#[derive(Default)]
struct SlotTable {
    seen: Vec<SlotId>,
    resolver: Option<Arc<dyn ResolveDescriptors>>,
    selector: Option<Arc<dyn GetStridedLoop>>,
    strided: Option<StridedLoop>,
    contiguous: Option<StridedLoop>,
    unaligned_strided: Option<StridedLoop>,
    unaligned_contiguous: Option<StridedLoop>,
}

impl SlotTable {
    fn insert(
        &mut self,
        method: &str,
        slot: &Slot,
        allow_private: bool,
    ) -> Result<(), RegistrationError> {
        if slot.id.name().is_none() {
            return Err(RegistrationError::UnknownSlot {
                method: method.to_owned(),
                slot: slot.id.0,
            });
        }
        if self.seen.contains(&slot.id) {
            return Err(RegistrationError::DuplicateSlot {
                method: method.to_owned(),
                slot: slot.id,
            });
        }
        self.seen.push(slot.id);

        match (slot.id, &slot.func) {
            (SlotId::RESOLVE_DESCRIPTORS, SlotFn::Resolver(resolver)) => {
                self.resolver = Some(resolver.clone());
            }
            (SlotId::GET_LOOP, SlotFn::Selector(selector)) => {
                if !allow_private {
                    return Err(RegistrationError::PrivateSlot {
                        method: method.to_owned(),
                        slot: slot.id,
                    });
                }
                self.selector = Some(selector.clone());
            }
            (SlotId::STRIDED_LOOP, SlotFn::Loop(func)) => self.strided = Some(*func),
            (SlotId::CONTIGUOUS_LOOP, SlotFn::Loop(func)) => self.contiguous = Some(*func),
            (SlotId::UNALIGNED_STRIDED_LOOP, SlotFn::Loop(func)) => {
                self.unaligned_strided = Some(*func)
            }
            (SlotId::UNALIGNED_CONTIGUOUS_LOOP, SlotFn::Loop(func)) => {
                self.unaligned_contiguous = Some(*func)
            }
            (id, func) => {
                return Err(RegistrationError::SlotMismatch {
                    method: method.to_owned(),
                    slot: id,
                    found: func.describe(),
                })
            }
        }
        Ok(())
    }

    fn has_loops(&self) -> bool {
        self.strided.is_some()
            || self.contiguous.is_some()
            || self.unaligned_strided.is_some()
            || self.unaligned_contiguous.is_some()
    }

    fn loops(&self, method: &str) -> Result<Loops, RegistrationError> {
        let strided = self
            .strided
            .ok_or_else(|| RegistrationError::MissingStridedLoop {
                method: method.to_owned(),
            })?;
        let mut aligned = LoopPair::new(strided);
        if let Some(contiguous) = self.contiguous {
            aligned = aligned.with_contiguous(contiguous);
        }
        let loops = Loops::new(aligned);

        match (self.unaligned_strided, self.unaligned_contiguous) {
            (None, None) => Ok(loops),
            (None, Some(_)) => Err(RegistrationError::MissingUnalignedStridedLoop {
                method: method.to_owned(),
            }),
            (Some(strided), None) => Ok(loops.with_unaligned(LoopPair::new(strided))),
            (Some(strided), Some(contiguous)) => {
                Ok(loops.with_unaligned(LoopPair::new(strided).with_contiguous(contiguous)))
            }
        }
    }
}

/// Check the DType tuple of a method with `nin` inputs and `nout` outputs.
pub(crate) fn check_dtypes(
    method: &str,
    nin: usize,
    nout: usize,
    dtypes: &[Option<DTypeRef>],
) -> Result<(), RegistrationError> {
    if dtypes.len() != nin + nout {
        return Err(RegistrationError::DTypeCount {
            method: method.to_owned(),
            expected: nin + nout,
            got: dtypes.len(),
        });
    }
    for (index, dtype) in dtypes.iter().take(nin).enumerate() {
        match dtype {
            None => {
                return Err(RegistrationError::MissingInputDType {
                    method: method.to_owned(),
                    index,
                })
            }
            Some(dtype) if dtype.is_abstract() => {
                return Err(RegistrationError::AbstractInput {
                    method: method.to_owned(),
                    index,
                    dtype: dtype.name().to_owned(),
                })
            }
            Some(_) => {}
        }
    }
    Ok(())
}

/// Additional DType requirements of the default resolver.
pub(crate) fn check_default_resolver_dtypes(
    method: &str,
    nin: usize,
    dtypes: &[Option<DTypeRef>],
) -> Result<(), RegistrationError> {
    for (index, dtype) in dtypes.iter().enumerate().skip(nin) {
        match dtype {
            None if nin == 0 => {
                return Err(RegistrationError::UnresolvedOutputWithoutInputs {
                    method: method.to_owned(),
                })
            }
            Some(dtype) if dtype.is_parametric() => {
                return Err(RegistrationError::ParametricOutput {
                    method: method.to_owned(),
                    index,
                    dtype: dtype.name().to_owned(),
                })
            }
            _ => {}
        }
    }
    Ok(())
}

///////////
// Tests //
///////////
