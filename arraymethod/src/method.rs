/*
 * Copyright (c) Microsoft Corporation.
 * Licensed under the MIT license.
 */

use std::{fmt, sync::Arc};

use arraymethod_dtype::{CastingLevel, DTypeRef, DescrRef};
use tracing::debug;

use crate::{
    spec::{check_default_resolver_dtypes, check_dtypes},
    DefaultLoopSelector, DefaultResolver, GetStridedLoop, LoopContext, Loops, MethodError,
    MethodFlags, MethodResult, MethodSpec, ResolveDescriptors,
};

/// The descriptor resolver of a method.
#[derive(Debug, Clone)]
pub enum Resolver {
    Default(DefaultResolver),
    Custom(Arc<dyn ResolveDescriptors>),
}

impl Resolver {
    pub fn as_dyn(&self) -> &dyn ResolveDescriptors {
        match self {
            Resolver::Default(resolver) => resolver,
            Resolver::Custom(resolver) => &**resolver,
        }
    }

    pub fn is_default(&self) -> bool {
        matches!(self, Resolver::Default(_))
    }
}

/// The loop selector of a method.
#[derive(Debug, Clone)]
pub enum LoopSelector {
    Default(DefaultLoopSelector),
    Custom(Arc<dyn GetStridedLoop>),
}

impl LoopSelector {
    pub fn as_dyn(&self) -> &dyn GetStridedLoop {
        match self {
            LoopSelector::Default(selector) => selector,
            LoopSelector::Custom(selector) => &**selector,
        }
    }

    pub fn is_default(&self) -> bool {
        matches!(self, LoopSelector::Default(_))
    }
}

/// A validated, immutable method.
///
/// An `ArrayMethod` holds no type classes. Those are owned by the [`BoundArrayMethod`]s
/// specializing it, so that type classes may refer back to their methods without creating
/// reference cycles.
#[derive(Debug)]
pub struct ArrayMethod {
    name: String,
    nin: usize,
    nout: usize,
    casting: Option<CastingLevel>,
    flags: MethodFlags,
    resolver: Resolver,
    selector: LoopSelector,
    loops: Option<Loops>,
}

impl ArrayMethod {
    /// Validate `spec` and build a method bound to its DTypes.
    ///
    /// All slots are accepted, including [`crate::SlotId::GET_LOOP`].
    pub fn from_spec(spec: &MethodSpec) -> MethodResult<BoundArrayMethod> {
        Self::build(spec, true)
    }

    /// Like [`Self::from_spec`], but rejects slots reserved for private methods.
    pub fn from_public_spec(spec: &MethodSpec) -> MethodResult<BoundArrayMethod> {
        Self::build(spec, false)
    }

    fn build(spec: &MethodSpec, allow_private: bool) -> MethodResult<BoundArrayMethod> {
        let filled = spec.fill(allow_private)?;
        let method = Arc::new(Self {
            name: spec.name().to_owned(),
            nin: spec.nin,
            nout: spec.nout,
            casting: filled.casting,
            flags: spec.flags,
            resolver: filled.resolver,
            selector: filled.selector,
            loops: filled.loops,
        });
        debug!(
            "built method {} ({} in, {} out, casting {})",
            method.name,
            method.nin,
            method.nout,
            display_casting(method.casting),
        );
        Ok(BoundArrayMethod {
            method,
            dtypes: spec.dtypes.clone(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn nin(&self) -> usize {
        self.nin
    }

    pub fn nout(&self) -> usize {
        self.nout
    }

    pub fn nargs(&self) -> usize {
        self.nin + self.nout
    }

    /// The declared casting level, `None` if it is determined per call.
    pub fn casting(&self) -> Option<CastingLevel> {
        self.casting
    }

    pub fn flags(&self) -> MethodFlags {
        self.flags
    }

    pub fn supports_unaligned(&self) -> bool {
        self.flags.contains(MethodFlags::SUPPORTS_UNALIGNED)
    }

    pub fn resolver(&self) -> &Resolver {
        &self.resolver
    }

    pub fn selector(&self) -> &LoopSelector {
        &self.selector
    }

    /// The registered inner loops. Always present with the default selector.
    pub fn loops(&self) -> Option<&Loops> {
        self.loops.as_ref()
    }

    /// Run the resolver of `self`. No consistency checks are performed.
    pub fn resolve_descriptors(
        &self,
        dtypes: &[Option<DTypeRef>],
        given: &[Option<DescrRef>],
    ) -> MethodResult<Option<crate::Resolution>> {
        self.resolver
            .as_dyn()
            .resolve_descriptors(self, dtypes, given)
    }

    pub fn context<'a>(&'a self, descriptors: &'a [DescrRef]) -> LoopContext<'a> {
        LoopContext::new(self, descriptors)
    }
}

fn display_casting(casting: Option<CastingLevel>) -> String {
    match casting {
        Some(casting) => casting.to_string(),
        None => "per call".to_owned(),
    }
}

/// An [`ArrayMethod`] specialized to a tuple of type classes.
///
/// A `None` entry is an output whose class is determined by descriptor resolution.
#[derive(Debug, Clone)]
pub struct BoundArrayMethod {
    method: Arc<ArrayMethod>,
    dtypes: Vec<Option<DTypeRef>>,
}

impl BoundArrayMethod {
    /// Bind `method` to a new tuple of type classes.
    ///
    /// `dtypes` is checked the same way it is checked when building a method.
    pub fn new(method: Arc<ArrayMethod>, dtypes: Vec<Option<DTypeRef>>) -> MethodResult<Self> {
        check_dtypes(method.name(), method.nin(), method.nout(), &dtypes)
            .map_err(MethodError::from)?;
        if method.resolver().is_default() {
            check_default_resolver_dtypes(method.name(), method.nin(), &dtypes)
                .map_err(MethodError::from)?;
        }
        let this = Self { method, dtypes };
        debug!("bound {}", this);
        Ok(this)
    }

    pub fn method(&self) -> &Arc<ArrayMethod> {
        &self.method
    }

    pub fn dtypes(&self) -> &[Option<DTypeRef>] {
        &self.dtypes
    }

    pub fn name(&self) -> &str {
        self.method.name()
    }

    pub fn supports_unaligned(&self) -> bool {
        self.method.supports_unaligned()
    }
}

impl fmt::Display for BoundArrayMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<BoundArrayMethod `{}` for dtypes (", self.name())?;
        for (i, dtype) in self.dtypes.iter().enumerate() {
            if i != 0 {
                f.write_str(", ")?;
            }
            match dtype {
                Some(dtype) => write!(f, "{}", dtype)?,
                None => f.write_str("None")?,
            }
        }
        f.write_str(")>")
    }
}

///////////
// Tests //
///////////
