/*
 * Copyright (c) Microsoft Corporation.
 * Licensed under the MIT license.
 */

use std::fmt::Debug;

use arraymethod_dtype::{common_dtype_of, CastingLevel, DTypeRef, DescrRef, Descriptor};

use crate::{ArrayMethod, InternalFault, MethodError, MethodResult};

/// The outcome of a successful descriptor resolution.
#[derive(Debug, Clone)]
pub struct Resolution {
    casting: CastingLevel,
    descriptors: Vec<DescrRef>,
}

impl Resolution {
    pub fn new(casting: CastingLevel, descriptors: Vec<DescrRef>) -> Self {
        Self {
            casting,
            descriptors,
        }
    }

    /// The casting level required to convert the given instances into
    /// [`Self::descriptors`].
    pub fn casting(&self) -> CastingLevel {
        self.casting
    }

    /// One resolved descriptor per argument.
    pub fn descriptors(&self) -> &[DescrRef] {
        &self.descriptors
    }

    pub fn into_descriptors(self) -> Vec<DescrRef> {
        self.descriptors
    }
}

/// Decides the exact descriptors a method operates on.
///
/// `dtypes` holds the bound classes of the method (`None` for outputs whose class is
/// deferred to resolution) and `given` the instances supplied by the caller (`None` for
/// outputs that should be allocated). Both have one entry per argument.
///
/// Return `Ok(None)` if the method cannot operate on the given instances. Errors are
/// reserved for failures of the type system and for invariant violations.
pub trait ResolveDescriptors: Send + Sync + Debug {
    fn resolve_descriptors(
        &self,
        method: &ArrayMethod,
        dtypes: &[Option<DTypeRef>],
        given: &[Option<DescrRef>],
    ) -> MethodResult<Option<Resolution>>;
}

/// The resolver used when a method does not register one.
///
/// Every argument with a known class uses the canonical form of the given instance if it
/// belongs to that class and the class's default instance otherwise. Outputs with a
/// deferred class take the common class of all inputs.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultResolver;

impl ResolveDescriptors for DefaultResolver {
    fn resolve_descriptors(
        &self,
        method: &ArrayMethod,
        dtypes: &[Option<DTypeRef>],
        given: &[Option<DescrRef>],
    ) -> MethodResult<Option<Resolution>> {
        let nin = method.nin();
        check_count(method, "DTypes", dtypes.len())?;
        check_count(method, "descriptors", given.len())?;

        let declared = method
            .casting()
            .ok_or_else(|| InternalFault::UndeclaredCasting {
                method: method.name().to_owned(),
            })?;

        let mut resolved = Vec::with_capacity(dtypes.len());
        for (dtype, given) in std::iter::zip(dtypes, given) {
            match dtype {
                Some(dtype) => resolved.push(Some(instance_of(dtype, given.as_ref())?)),
                None => resolved.push(None),
            }
        }

        if resolved.iter().all(Option::is_some) {
            let descriptors = resolved.into_iter().flatten().collect();
            return Ok(Some(Resolution::new(declared, descriptors)));
        }

        // Some output classes are deferred: they follow the common class of the inputs.
        let without_inputs = || InternalFault::DefaultResolverWithoutInputs {
            method: method.name().to_owned(),
        };
        if nin == 0 {
            return Err(MethodError::from(without_inputs()));
        }
        let inputs: Vec<DTypeRef> = dtypes[..nin]
            .iter()
            .cloned()
            .collect::<Option<_>>()
            .ok_or_else(without_inputs)?;
        let common = common_dtype_of(&inputs)?;

        let mut descriptors = Vec::with_capacity(resolved.len());
        for (resolved, given) in std::iter::zip(resolved, given) {
            match (resolved, given) {
                (Some(descr), _) => descriptors.push(descr),
                (None, Some(given)) if given.is_instance_of(&common) => {
                    descriptors.push(Descriptor::ensure_canonical(given))
                }
                // Parametric instances need a parameter only the caller can provide.
                (None, _) if common.is_parametric() => {
                    return Err(MethodError::from(InternalFault::ParametricDeferredOutput {
                        method: method.name().to_owned(),
                        dtype: common.name().to_owned(),
                    }));
                }
                (None, _) => descriptors.push(common.default_descriptor()?),
            }
        }

        let unchanged = std::iter::zip(&descriptors[..nin], &given[..nin]).all(|(descr, given)| {
            given
                .as_ref()
                .is_some_and(|given| Descriptor::identical(descr, given))
        });
        let identity_typed = inputs.iter().all(|dtype| dtype.is(&common));
        let casting = if unchanged && identity_typed {
            CastingLevel::NO
        } else {
            declared
        };

        Ok(Some(Resolution::new(casting, descriptors)))
    }
}

/// Canonicalize `given` if it is an instance of `dtype`, otherwise instantiate `dtype`.
fn instance_of(dtype: &DTypeRef, given: Option<&DescrRef>) -> MethodResult<DescrRef> {
    match given {
        Some(given) if given.is_instance_of(dtype) => Ok(Descriptor::ensure_canonical(given)),
        _ => Ok(dtype.default_descriptor()?),
    }
}

fn check_count(method: &ArrayMethod, what: &'static str, got: usize) -> MethodResult<()> {
    if got == method.nargs() {
        Ok(())
    } else {
        Err(MethodError::from(InternalFault::ArgumentCount {
            method: method.name().to_owned(),
            what,
            expected: method.nargs(),
            got,
        }))
    }
}

///////////
// Tests //
///////////
