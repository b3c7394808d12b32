// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Dispatch engine: overload registry, resolution cache, tie-breaking.
//!
//! `DispatchEngine<N, R>` owns two concurrent tables. The overload registry
//! maps declared signatures to erased callables; the resolution cache maps
//! exact runtime-type signatures to a resolved method (callable plus one
//! cast path per argument). A cache hit replays the paths and returns, all
//! lock-free. A miss runs the upcast search, keeps the frontier of
//! undominated candidates, and caches the unique winner.
//!
//! Cache entries are write-once and permanent: once a runtime-type tuple
//! has been resolved, registering a more specific overload later does not
//! change what that tuple dispatches to. Dispatch stability is the
//! contract; late-binding is not.

use crate::error::{DispatchError, Result};
use crate::hierarchy::{ArgView, Hierarchy, TypeToken};
use crate::specificity::{self, Signature};
use crate::table::Table;
use crate::upcast::{self, Ancestor};
use std::any::Any;
use std::array;
use std::marker::PhantomData;
use std::sync::Arc;

/// Default pre-sizing for the overload registry table.
const DEFAULT_REGISTRY_CAPACITY: usize = 16;
/// Default pre-sizing for the resolution cache table.
const DEFAULT_CACHE_CAPACITY: usize = 64;

/// Erased overload callable: receives one upcast view per argument, each
/// already at the overload's declared parameter type.
pub type Callable<const N: usize, R> =
    Arc<dyn for<'a> Fn(&[ArgView<'a>; N]) -> R + Send + Sync>;

/// A completed resolution stored in the cache.
struct ResolvedMethod<const N: usize, R> {
    signature: Signature<N>,
    func: Callable<N, R>,
    /// Per-argument cast path from the exact runtime type to the declared
    /// parameter type. Empty for an exact match.
    paths: [Arc<[u16]>; N],
}

/// A resolved call, ready to invoke: the winning callable plus the argument
/// views upcast to its declared parameter types.
pub struct Dispatch<'a, const N: usize, R> {
    signature: Signature<N>,
    func: Callable<N, R>,
    views: [ArgView<'a>; N],
}

impl<'a, const N: usize, R> Dispatch<'a, N, R> {
    /// Invoke the resolved overload.
    pub fn invoke(&self) -> R {
        (self.func)(&self.views)
    }

    /// Declared signature of the overload this call resolved to.
    #[must_use]
    pub fn signature(&self) -> &Signature<N> {
        &self.signature
    }

    /// The upcast argument views handed to the callable.
    #[must_use]
    pub fn views(&self) -> &[ArgView<'a>; N] {
        &self.views
    }
}

/// Open multiple dispatch over `N`-argument calls returning `R`.
///
/// The engine is a passive structure: it spawns no threads and is safe to
/// share across any number of caller threads. `resolve` on a cached tuple
/// is lock-free; `register` and first-time resolutions serialize briefly on
/// the owning table's writer mutex.
pub struct DispatchEngine<const N: usize, R> {
    hierarchy: Arc<dyn Hierarchy>,
    registry: Table<Signature<N>, Callable<N, R>>,
    resolved: Table<Signature<N>, Arc<ResolvedMethod<N, R>>>,
}

/// Candidate kept on the undominated frontier during a search.
struct Candidate<const N: usize, R> {
    signature: Signature<N>,
    func: Callable<N, R>,
    picks: [usize; N],
}

impl<const N: usize, R: 'static> DispatchEngine<N, R> {
    /// Create an engine with default table capacities.
    #[must_use]
    pub fn new(hierarchy: Arc<dyn Hierarchy>) -> Self {
        Self::builder(hierarchy).build()
    }

    /// Create a builder for configuring table capacities.
    #[must_use]
    pub fn builder(hierarchy: Arc<dyn Hierarchy>) -> DispatchEngineBuilder<N, R> {
        DispatchEngineBuilder {
            hierarchy,
            registry_capacity: DEFAULT_REGISTRY_CAPACITY,
            cache_capacity: DEFAULT_CACHE_CAPACITY,
            _marker: PhantomData,
        }
    }

    /// The hierarchy provider this engine dispatches over.
    #[must_use]
    pub fn hierarchy(&self) -> &Arc<dyn Hierarchy> {
        &self.hierarchy
    }

    /// Register an overload under its declared signature.
    ///
    /// An identical signature registered twice is rejected; the first
    /// registration stays live.
    pub fn register(&self, signature: Signature<N>, func: Callable<N, R>) -> Result<()> {
        let (_, inserted) = self.registry.add(signature, func);
        if !inserted {
            return Err(DispatchError::DuplicateRegistration {
                signature: self.describe(&signature),
            });
        }
        log::debug!("[dispatch] registered overload {}", self.describe(&signature));
        Ok(())
    }

    /// Resolve a call against the registered overloads.
    ///
    /// Arguments are presented as their most-derived objects; each one's
    /// exact runtime type keys the resolution cache. The hit path is
    /// lock-free.
    pub fn resolve<'a>(&self, args: [&'a dyn Any; N]) -> Result<Dispatch<'a, N, R>> {
        let exact = self.exact_signature(&args)?;

        if let Some(hit) = self.resolved.find(&exact) {
            return self.rebuild(&hit, &exact, &args);
        }

        log::debug!("[dispatch] cache miss for {}", self.describe(&exact));
        let hier = self.hierarchy.as_ref();
        let chains: [Vec<Ancestor<'a>>; N] = array::from_fn(|i| {
            upcast::ancestors_of(hier, ArgView::root(exact.types()[i], args[i]))
        });

        let mut frontier: Vec<Candidate<N, R>> = Vec::new();
        upcast::for_each_tuple(&chains, &mut |picks| {
            let candidate = Signature::new(array::from_fn(|i| chains[i][picks[i]].view.ty()));
            let Some(func) = self.registry.find(&candidate) else {
                return;
            };
            // Frontier rule: drop the newcomer if anything kept is at least
            // as specific (this also absorbs re-visits of the same tuple),
            // otherwise evict everything the newcomer dominates.
            if frontier
                .iter()
                .any(|kept| specificity::at_least_as_specific(hier, &kept.signature, &candidate))
            {
                return;
            }
            frontier
                .retain(|kept| !specificity::at_least_as_specific(hier, &candidate, &kept.signature));
            frontier.push(Candidate {
                signature: candidate,
                func,
                picks: *picks,
            });
        });

        match frontier.len() {
            1 => {
                let winner = match frontier.pop() {
                    Some(w) => w,
                    None => unreachable!("frontier length checked above"),
                };
                let paths = array::from_fn(|i| chains[i][winner.picks[i]].path.clone());
                let method = Arc::new(ResolvedMethod {
                    signature: winner.signature,
                    func: winner.func,
                    paths,
                });
                // First writer wins: racing first-time resolutions for the
                // same tuple all end up using whichever entry landed.
                let (stored, inserted) = self.resolved.add(exact, method);
                if inserted {
                    log::debug!(
                        "[dispatch] resolved {} -> {}",
                        self.describe(&exact),
                        self.describe(&stored.signature)
                    );
                }
                self.rebuild(&stored, &exact, &args)
            }
            0 => Err(DispatchError::NoApplicableOverload {
                call: self.describe(&exact),
            }),
            _ => {
                let candidates: Vec<String> = frontier
                    .iter()
                    .map(|c| self.describe(&c.signature))
                    .collect();
                log::warn!(
                    "[dispatch] ambiguous call {}: candidates [{}]",
                    self.describe(&exact),
                    candidates.join(", ")
                );
                Err(DispatchError::AmbiguousDispatch {
                    call: self.describe(&exact),
                    candidates,
                })
            }
        }
    }

    /// Resolve and invoke in one step.
    pub fn call(&self, args: [&dyn Any; N]) -> Result<R> {
        Ok(self.resolve(args)?.invoke())
    }

    /// Number of registered overloads.
    #[must_use]
    pub fn overload_count(&self) -> usize {
        self.registry.len()
    }

    /// Number of runtime-type tuples resolved so far.
    #[must_use]
    pub fn resolved_count(&self) -> usize {
        self.resolved.len()
    }

    /// Formatted signatures of every registered overload, for diagnostics.
    #[must_use]
    pub fn overload_signatures(&self) -> Vec<String> {
        let mut out = Vec::with_capacity(self.registry.len());
        self.registry
            .for_each(|signature, _| out.push(self.describe(signature)));
        out
    }

    fn describe(&self, signature: &Signature<N>) -> String {
        specificity::describe(self.hierarchy.as_ref(), signature)
    }

    fn exact_signature(&self, args: &[&dyn Any; N]) -> Result<Signature<N>> {
        let mut types: [Option<TypeToken>; N] = [None; N];
        for (position, arg) in args.iter().enumerate() {
            match self.hierarchy.runtime_token(Any::type_id(*arg)) {
                Some(token) => types[position] = Some(token),
                None => return Err(DispatchError::UnregisteredType { position }),
            }
        }
        #[allow(clippy::expect_used)] // every slot filled by the loop above
        let types = types.map(|t| t.expect("token present"));
        Ok(Signature::new(types))
    }

    /// Materialize a cached resolution for a fresh set of instances by
    /// replaying the stored cast paths.
    fn rebuild<'a>(
        &self,
        method: &ResolvedMethod<N, R>,
        exact: &Signature<N>,
        args: &[&'a dyn Any; N],
    ) -> Result<Dispatch<'a, N, R>> {
        let hier = self.hierarchy.as_ref();
        let mut views: [Option<ArgView<'a>>; N] = [None; N];
        for position in 0..N {
            let root = ArgView::root(exact.types()[position], args[position]);
            match upcast::replay(hier, root, &method.paths[position]) {
                Some(view) => views[position] = Some(view),
                None => {
                    return Err(DispatchError::InvalidHierarchy(format!(
                        "cached cast path for argument {} of {} does not replay",
                        position,
                        self.describe(exact)
                    )))
                }
            }
        }
        #[allow(clippy::expect_used)] // every slot filled by the loop above
        let views = views.map(|v| v.expect("view present"));
        Ok(Dispatch {
            signature: method.signature,
            func: Arc::clone(&method.func),
            views,
        })
    }
}

// ============================================================================
// Typed registration sugar (arities 1-3)
// ============================================================================

impl<R: 'static> DispatchEngine<1, R> {
    /// Register a unary overload; the signature is derived from `A`.
    pub fn register_fn<A, F>(&self, func: F) -> Result<()>
    where
        A: Any,
        F: Fn(&A) -> R + Send + Sync + 'static,
    {
        let signature = Signature::new([self.param_token::<A>(0)?]);
        let callable: Callable<1, R> = Arc::new(move |views: &[ArgView<'_>; 1]| {
            func(declared_view::<A>(&views[0]))
        });
        self.register(signature, callable)
    }
}

impl<R: 'static> DispatchEngine<2, R> {
    /// Register a binary overload; the signature is derived from `A`, `B`.
    pub fn register_fn<A, B, F>(&self, func: F) -> Result<()>
    where
        A: Any,
        B: Any,
        F: Fn(&A, &B) -> R + Send + Sync + 'static,
    {
        let signature = Signature::new([self.param_token::<A>(0)?, self.param_token::<B>(1)?]);
        let callable: Callable<2, R> = Arc::new(move |views: &[ArgView<'_>; 2]| {
            func(
                declared_view::<A>(&views[0]),
                declared_view::<B>(&views[1]),
            )
        });
        self.register(signature, callable)
    }
}

impl<R: 'static> DispatchEngine<3, R> {
    /// Register a ternary overload; the signature is derived from `A`, `B`, `C`.
    pub fn register_fn<A, B, C, F>(&self, func: F) -> Result<()>
    where
        A: Any,
        B: Any,
        C: Any,
        F: Fn(&A, &B, &C) -> R + Send + Sync + 'static,
    {
        let signature = Signature::new([
            self.param_token::<A>(0)?,
            self.param_token::<B>(1)?,
            self.param_token::<C>(2)?,
        ]);
        let callable: Callable<3, R> = Arc::new(move |views: &[ArgView<'_>; 3]| {
            func(
                declared_view::<A>(&views[0]),
                declared_view::<B>(&views[1]),
                declared_view::<C>(&views[2]),
            )
        });
        self.register(signature, callable)
    }
}

impl<const N: usize, R: 'static> DispatchEngine<N, R> {
    fn param_token<T: Any>(&self, position: usize) -> Result<TypeToken> {
        self.hierarchy
            .runtime_token(std::any::TypeId::of::<T>())
            .ok_or(DispatchError::UnregisteredType { position })
    }
}

/// Downcast a view to the declared parameter type of an overload.
///
/// The engine only hands a callable views already upcast to its declared
/// signature, so a failure here means the application's casters project to
/// a type other than the one they were declared with.
fn declared_view<'a, T: Any>(view: &ArgView<'a>) -> &'a T {
    #[allow(clippy::expect_used)] // registration ties each view to its declared type
    let part = view
        .downcast_ref::<T>()
        .expect("upcast view matches the declared parameter type");
    part
}

// ============================================================================
// Builder
// ============================================================================

/// Builder for configuring and creating a [`DispatchEngine`].
pub struct DispatchEngineBuilder<const N: usize, R> {
    hierarchy: Arc<dyn Hierarchy>,
    registry_capacity: usize,
    cache_capacity: usize,
    _marker: PhantomData<fn() -> R>,
}

impl<const N: usize, R: 'static> DispatchEngineBuilder<N, R> {
    /// Pre-size the overload registry for roughly this many overloads.
    #[must_use]
    pub fn registry_capacity(mut self, capacity: usize) -> Self {
        self.registry_capacity = capacity;
        self
    }

    /// Pre-size the resolution cache for roughly this many distinct
    /// runtime-type tuples.
    #[must_use]
    pub fn cache_capacity(mut self, capacity: usize) -> Self {
        self.cache_capacity = capacity;
        self
    }

    /// Build the engine.
    #[must_use]
    pub fn build(self) -> DispatchEngine<N, R> {
        DispatchEngine {
            hierarchy: self.hierarchy,
            registry: Table::with_capacity(self.registry_capacity),
            resolved: Table::with_capacity(self.cache_capacity),
        }
    }
}
