//! Lifetime elision and callee summaries.
//!
//! Every reference parameter gets a universal region: one per distinct declared lifetime
//! name, and one per parameter whose lifetime is elided. A final universal stands for the
//! free (`'static`-like) region. The return slot picks one of them by declaration or by
//! the elision rules below.
//!
//!   - exactly one reference parameter: its region
//!   - a reference receiver plus other reference parameters: the receiver's region
//!   - several reference parameters without a receiver: ambiguous, must be declared
//!   - no reference parameter: the free region

use crate::compiler_frontend::hir::hir_datatypes::TypeContext;
use crate::compiler_frontend::hir::hir_nodes::{FunctionId, HirFunction, HirModule};
use crate::compiler_frontend::hir::hir_validation::STATIC_LIFETIME_NAME;
use crate::compiler_frontend::string_interning::{StringId, StringTable};
use rustc_hash::FxHashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum UniversalKind {
    Named(StringId),

    /// Elided lifetime of the parameter at this index.
    Elided(usize),

    Free,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct UniversalRegion {
    pub kind: UniversalKind,

    /// Indices of the parameters whose references carry this region.
    pub params: Vec<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ReturnRegion {
    NotReference,
    Universal(usize),
    Ambiguous,
}

/// The region shape of one function's declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct RegionSignature {
    /// The free region is always the last entry.
    pub universals: Vec<UniversalRegion>,
    pub param_universal: Vec<Option<usize>>,
    pub return_region: ReturnRegion,
}

impl RegionSignature {
    pub(crate) fn free_region(&self) -> usize {
        self.universals.len() - 1
    }

    pub(crate) fn is_ambiguous(&self) -> bool {
        self.return_region == ReturnRegion::Ambiguous
    }

    pub(crate) fn reference_param_count(&self) -> usize {
        self.param_universal.iter().flatten().count()
    }
}

pub(crate) fn region_signature(
    function: &HirFunction,
    types: &TypeContext,
    string_table: &StringTable,
) -> RegionSignature {
    let signature = &function.signature;
    let mut universals: Vec<UniversalRegion> = Vec::new();
    let mut named: FxHashMap<StringId, usize> = FxHashMap::default();
    let mut param_universal = Vec::with_capacity(signature.params.len());
    let mut static_params = Vec::new();

    for (param_index, param) in signature.params.iter().enumerate() {
        let carries_reference = function
            .local_type(param.local)
            .is_some_and(|ty| types.contains_reference(ty));

        if !carries_reference {
            param_universal.push(None);
            continue;
        }

        let universal = match param.lifetime {
            Some(name) if string_table.resolve(name) == STATIC_LIFETIME_NAME => {
                static_params.push(param_index);
                param_universal.push(None);
                continue;
            }
            Some(name) => {
                let index = *named.entry(name).or_insert_with(|| {
                    universals.push(UniversalRegion {
                        kind: UniversalKind::Named(name),
                        params: Vec::new(),
                    });
                    universals.len() - 1
                });
                universals[index].params.push(param_index);
                index
            }
            None => {
                universals.push(UniversalRegion {
                    kind: UniversalKind::Elided(param_index),
                    params: vec![param_index],
                });
                universals.len() - 1
            }
        };

        param_universal.push(Some(universal));
    }

    universals.push(UniversalRegion {
        kind: UniversalKind::Free,
        params: static_params.clone(),
    });
    let free = universals.len() - 1;

    for param_index in static_params {
        param_universal[param_index] = Some(free);
    }

    let return_region = if !types.contains_reference(signature.return_type) {
        ReturnRegion::NotReference
    } else if let Some(name) = signature.return_lifetime {
        if string_table.resolve(name) == STATIC_LIFETIME_NAME {
            ReturnRegion::Universal(free)
        } else {
            // Validation guarantees the name is declared on a parameter.
            match named.get(&name) {
                Some(index) => ReturnRegion::Universal(*index),
                None => ReturnRegion::Universal(free),
            }
        }
    } else {
        elide_return_region(signature.receiver, &param_universal, free)
    };

    RegionSignature {
        universals,
        param_universal,
        return_region,
    }
}

fn elide_return_region(
    receiver: bool,
    param_universal: &[Option<usize>],
    free: usize,
) -> ReturnRegion {
    let reference_params = param_universal.iter().flatten().collect::<Vec<_>>();

    match reference_params.as_slice() {
        [] => ReturnRegion::Universal(free),
        [only] => ReturnRegion::Universal(**only),
        _ => match (receiver, param_universal.first()) {
            (true, Some(Some(receiver_region))) => ReturnRegion::Universal(*receiver_region),
            _ => ReturnRegion::Ambiguous,
        },
    }
}

/// Which arguments a call's result may borrow from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum CallSummary {
    /// The result holds no borrow of any argument.
    Fresh,

    Args(Vec<usize>),

    /// Unknown or ambiguous callee. The result may borrow from any reference argument.
    AllReferenceArgs,
}

impl CallSummary {
    pub(crate) fn from_signature(signature: &RegionSignature) -> Self {
        match signature.return_region {
            ReturnRegion::NotReference => CallSummary::Fresh,
            ReturnRegion::Ambiguous => CallSummary::AllReferenceArgs,
            ReturnRegion::Universal(index) if index == signature.free_region() => {
                CallSummary::Fresh
            }
            ReturnRegion::Universal(index) => {
                CallSummary::Args(signature.universals[index].params.clone())
            }
        }
    }

    pub(crate) fn ties_argument(&self, arg_index: usize) -> bool {
        match self {
            CallSummary::Fresh => false,
            CallSummary::Args(indices) => indices.contains(&arg_index),
            CallSummary::AllReferenceArgs => true,
        }
    }
}

/// Callee summaries for a whole module.
///
/// Built once before any function is analyzed and only read afterwards,
/// so it is shared by every worker thread.
#[derive(Debug, Clone, Default)]
pub(crate) struct ModuleSummaries {
    by_function: FxHashMap<FunctionId, CallSummary>,
}

impl ModuleSummaries {
    pub(crate) fn build(module: &HirModule, string_table: &StringTable) -> Self {
        let by_function = module
            .functions
            .iter()
            .map(|function| {
                let signature = region_signature(function, &module.types, string_table);
                (function.id, CallSummary::from_signature(&signature))
            })
            .collect();

        Self { by_function }
    }

    pub(crate) fn summary_for(&self, callee: FunctionId) -> CallSummary {
        self.by_function
            .get(&callee)
            .cloned()
            .unwrap_or(CallSummary::AllReferenceArgs)
    }
}
