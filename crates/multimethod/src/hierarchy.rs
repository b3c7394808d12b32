// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Type hierarchy provider: tokens, argument views, and the registry.
//!
//! The dispatch engine never inspects compiler metadata. Applications
//! declare their hierarchy once per type with [`HierarchyRegistry`]: every
//! type gets an opaque [`TypeToken`], every direct public base an upcast
//! function (a plain field projection, not pointer arithmetic), and every
//! shared ("virtual") base an accessor on the most-derived type that owns
//! its single copy. The engine consumes all of it through the [`Hierarchy`]
//! trait, which is the collaborator boundary: any other provider
//! implementation can be swapped in.
//!
//! Upcasting is expressed as [`ArgView`], a borrow of one argument seen as
//! one of its ancestor types. A view remembers the whole (most-derived)
//! object so shared-base edges can be resolved through the owner's
//! accessor, the way a virtual base offset is read from an instance's own
//! metadata rather than assumed constant.

use dashmap::DashMap;
use parking_lot::RwLock;
use std::any::{Any, TypeId};
use std::fmt;
use std::num::NonZeroU32;
use std::sync::Arc;

// ============================================================================
// Type tokens
// ============================================================================

/// Opaque identity of a registered type.
///
/// Equality is identity equality: two tokens are equal iff they were issued
/// for the same registration. `NonZeroU32` keeps `Option<TypeToken>`
/// pointer-width for free.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TypeToken(NonZeroU32);

impl TypeToken {
    fn from_index(index: usize) -> Self {
        // Registration is bounded by the records vector; u32 range is not
        // reachable in practice.
        Self(NonZeroU32::new(index as u32 + 1).unwrap_or(NonZeroU32::MIN))
    }

    pub(crate) fn index(self) -> usize {
        self.0.get() as usize - 1
    }
}

// ============================================================================
// Argument views
// ============================================================================

/// A borrow of one call argument seen as one of its ancestor types.
///
/// `part` is the sub-object for the current type; `whole` is the
/// most-derived object the caller presented. The two coincide for the root
/// view and for every type without shared bases.
#[derive(Clone, Copy)]
pub struct ArgView<'a> {
    ty: TypeToken,
    part: &'a dyn Any,
    whole: &'a dyn Any,
    whole_ty: TypeToken,
}

impl<'a> ArgView<'a> {
    /// Root view: the argument seen as its own exact runtime type.
    pub(crate) fn root(ty: TypeToken, whole: &'a dyn Any) -> Self {
        Self {
            ty,
            part: whole,
            whole,
            whole_ty: ty,
        }
    }

    /// Token of the type this view currently denotes.
    #[must_use]
    pub fn ty(&self) -> TypeToken {
        self.ty
    }

    /// Token of the most-derived type of the underlying object.
    #[must_use]
    pub fn whole_ty(&self) -> TypeToken {
        self.whole_ty
    }

    /// The most-derived object the caller presented.
    #[must_use]
    pub fn whole(&self) -> &'a dyn Any {
        self.whole
    }

    /// Downcast the current sub-object view to its concrete type.
    ///
    /// Succeeds exactly when `T` is the type this view was upcast to.
    #[must_use]
    pub fn downcast_ref<T: Any>(&self) -> Option<&'a T> {
        self.part.downcast_ref::<T>()
    }
}

impl fmt::Debug for ArgView<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArgView")
            .field("ty", &self.ty)
            .field("whole_ty", &self.whole_ty)
            .finish_non_exhaustive()
    }
}

/// Erased upcast function: projects a value to one of its base sub-objects.
type CastFn = Box<dyn Fn(&dyn Any) -> Option<&dyn Any> + Send + Sync>;

// ============================================================================
// Provider trait
// ============================================================================

/// Hierarchy provider consumed by the dispatch engine.
///
/// Implementations expose, per type, its direct public bases and the typed
/// conversions to view an instance as each of them. Private or otherwise
/// undeclared bases are simply invisible to dispatch.
pub trait Hierarchy: Send + Sync {
    /// Number of direct public bases of `ty`.
    fn base_count(&self, ty: TypeToken) -> usize;

    /// Token of the direct public base of `ty` at `index`.
    fn base_at(&self, ty: TypeToken, index: usize) -> Option<TypeToken>;

    /// Whether the base edge at `index` is a shared (virtual) base.
    fn is_virtual_base(&self, ty: TypeToken, index: usize) -> bool;

    /// View `view` as the base at `index` of its current type.
    ///
    /// Non-virtual edges project the current sub-object; virtual edges
    /// resolve through the most-derived type's shared-base accessor.
    /// Returns `None` when the edge cannot be resolved for this instance.
    fn upcast<'a>(&self, view: &ArgView<'a>, index: usize) -> Option<ArgView<'a>>;

    /// Token issued for the given Rust runtime type, if registered.
    fn runtime_token(&self, rust: TypeId) -> Option<TypeToken>;

    /// Registered name of `ty`, for diagnostics.
    fn type_name(&self, ty: TypeToken) -> Option<Arc<str>>;
}

// ============================================================================
// Registry
// ============================================================================

struct BaseEdge {
    base: TypeToken,
    is_virtual: bool,
    /// Projection to the base sub-object. `None` for virtual edges, which
    /// resolve through the whole type's shared-base accessor instead.
    cast: Option<CastFn>,
}

struct TypeRecord {
    name: Arc<str>,
    bases: Vec<BaseEdge>,
    /// Shared-base accessors declared by this type as most-derived owner.
    shared_bases: Vec<(TypeToken, CastFn)>,
}

/// Shipping [`Hierarchy`] implementation backed by explicit registration.
///
/// Registration is concurrency-safe and append-only: tokens and base-edge
/// indices stay stable forever, which is what lets the engine cache cast
/// paths permanently.
pub struct HierarchyRegistry {
    records: RwLock<Vec<TypeRecord>>,
    by_rust: DashMap<TypeId, TypeToken>,
}

impl HierarchyRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self {
            records: RwLock::new(Vec::new()),
            by_rust: DashMap::new(),
        }
    }

    /// Register a type under `name` and issue its token.
    pub fn register<T: Any>(&self, name: &str) -> Result<TypeToken, HierarchyError> {
        let rust = TypeId::of::<T>();
        let mut records = self.records.write();
        if self.by_rust.contains_key(&rust) {
            return Err(HierarchyError::DuplicateType { name: name.into() });
        }
        let token = TypeToken::from_index(records.len());
        records.push(TypeRecord {
            name: name.into(),
            bases: Vec::new(),
            shared_bases: Vec::new(),
        });
        self.by_rust.insert(rust, token);
        log::debug!("[hierarchy] registered type {}", name);
        Ok(token)
    }

    /// Declare `B` a direct public base of `D`, with the projection to the
    /// embedded base sub-object.
    pub fn add_base<D: Any, B: Any>(&self, cast: fn(&D) -> &B) -> Result<(), HierarchyError> {
        let erased: CastFn =
            Box::new(move |any: &dyn Any| any.downcast_ref::<D>().map(|d| cast(d) as &dyn Any));
        self.add_edge::<D, B>(Some(erased), false)
    }

    /// Declare `B` a shared (virtual) direct public base of `D`.
    ///
    /// The view is resolved at dispatch time through the most-derived
    /// type's accessor (see [`HierarchyRegistry::set_shared_base`]); every
    /// type reachable as a whole object over this edge must declare one.
    pub fn add_virtual_base<D: Any, B: Any>(&self) -> Result<(), HierarchyError> {
        self.add_edge::<D, B>(None, true)
    }

    /// Declare where the single shared `B` sub-object lives inside a `W`
    /// most-derived instance.
    pub fn set_shared_base<W: Any, B: Any>(&self, access: fn(&W) -> &B) -> Result<(), HierarchyError> {
        let w = self.require_token::<W>()?;
        let b = self.require_token::<B>()?;
        let mut records = self.records.write();
        let (w_name, b_name) = (records[w.index()].name.clone(), records[b.index()].name.clone());
        let record = &mut records[w.index()];
        if record.shared_bases.iter().any(|(base, _)| *base == b) {
            return Err(HierarchyError::DuplicateSharedBase {
                ty: w_name.to_string(),
                base: b_name.to_string(),
            });
        }
        let erased: CastFn =
            Box::new(move |any: &dyn Any| any.downcast_ref::<W>().map(|w| access(w) as &dyn Any));
        record.shared_bases.push((b, erased));
        log::debug!("[hierarchy] {} owns shared base {}", w_name, b_name);
        Ok(())
    }

    /// Token issued for `T`, if registered.
    #[must_use]
    pub fn token_of<T: Any>(&self) -> Option<TypeToken> {
        self.runtime_token(TypeId::of::<T>())
    }

    fn require_token<T: Any>(&self) -> Result<TypeToken, HierarchyError> {
        self.token_of::<T>().ok_or_else(|| HierarchyError::UnknownType {
            name: std::any::type_name::<T>().to_string(),
        })
    }

    fn add_edge<D: Any, B: Any>(
        &self,
        cast: Option<CastFn>,
        is_virtual: bool,
    ) -> Result<(), HierarchyError> {
        let d = self.require_token::<D>()?;
        let b = self.require_token::<B>()?;
        let mut records = self.records.write();
        let (d_name, b_name) = (records[d.index()].name.clone(), records[b.index()].name.clone());
        if d == b || derives_locked(&records, b, d) {
            return Err(HierarchyError::CyclicHierarchy {
                derived: d_name.to_string(),
                base: b_name.to_string(),
            });
        }
        if records[d.index()].bases.iter().any(|e| e.base == b) {
            return Err(HierarchyError::DuplicateEdge {
                derived: d_name.to_string(),
                base: b_name.to_string(),
            });
        }
        records[d.index()].bases.push(BaseEdge {
            base: b,
            is_virtual,
            cast,
        });
        log::debug!(
            "[hierarchy] {} derives {}{}",
            d_name,
            b_name,
            if is_virtual { " (shared)" } else { "" }
        );
        Ok(())
    }
}

impl Default for HierarchyRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Ancestor-or-self walk usable while the records lock is held.
fn derives_locked(records: &[TypeRecord], t: TypeToken, u: TypeToken) -> bool {
    if t == u {
        return true;
    }
    records[t.index()]
        .bases
        .iter()
        .any(|edge| derives_locked(records, edge.base, u))
}

impl Hierarchy for HierarchyRegistry {
    fn base_count(&self, ty: TypeToken) -> usize {
        self.records
            .read()
            .get(ty.index())
            .map_or(0, |r| r.bases.len())
    }

    fn base_at(&self, ty: TypeToken, index: usize) -> Option<TypeToken> {
        self.records
            .read()
            .get(ty.index())
            .and_then(|r| r.bases.get(index).map(|e| e.base))
    }

    fn is_virtual_base(&self, ty: TypeToken, index: usize) -> bool {
        self.records
            .read()
            .get(ty.index())
            .and_then(|r| r.bases.get(index).map(|e| e.is_virtual))
            .unwrap_or(false)
    }

    fn upcast<'a>(&self, view: &ArgView<'a>, index: usize) -> Option<ArgView<'a>> {
        let records = self.records.read();
        let record = records.get(view.ty.index())?;
        let edge = record.bases.get(index)?;
        let part: &'a dyn Any = if edge.is_virtual {
            let owner = records.get(view.whole_ty.index())?;
            match owner.shared_bases.iter().find(|(base, _)| *base == edge.base) {
                Some((_, access)) => access(view.whole)?,
                None => {
                    log::warn!(
                        "[hierarchy] {} has no shared-base accessor for {}; path skipped",
                        owner.name,
                        records.get(edge.base.index()).map_or("?", |r| r.name.as_ref()),
                    );
                    return None;
                }
            }
        } else {
            (edge.cast.as_ref()?)(view.part)?
        };
        Some(ArgView {
            ty: edge.base,
            part,
            whole: view.whole,
            whole_ty: view.whole_ty,
        })
    }

    fn runtime_token(&self, rust: TypeId) -> Option<TypeToken> {
        self.by_rust.get(&rust).map(|entry| *entry.value())
    }

    fn type_name(&self, ty: TypeToken) -> Option<Arc<str>> {
        self.records.read().get(ty.index()).map(|r| r.name.clone())
    }
}

// ============================================================================
// Error Types
// ============================================================================

/// Hierarchy registration errors.
#[derive(Debug, Clone)]
pub enum HierarchyError {
    /// The Rust type was already registered.
    DuplicateType { name: String },
    /// The Rust type was never registered.
    UnknownType { name: String },
    /// The edge would make the hierarchy cyclic.
    CyclicHierarchy { derived: String, base: String },
    /// The direct base was already declared for this type.
    DuplicateEdge { derived: String, base: String },
    /// A shared-base accessor was already declared for this pair.
    DuplicateSharedBase { ty: String, base: String },
}

impl fmt::Display for HierarchyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HierarchyError::DuplicateType { name } => {
                write!(f, "type already registered: {}", name)
            }
            HierarchyError::UnknownType { name } => write!(f, "type not registered: {}", name),
            HierarchyError::CyclicHierarchy { derived, base } => {
                write!(f, "cyclic hierarchy: {} cannot derive {}", derived, base)
            }
            HierarchyError::DuplicateEdge { derived, base } => {
                write!(f, "duplicate base: {} already derives {}", derived, base)
            }
            HierarchyError::DuplicateSharedBase { ty, base } => {
                write!(f, "duplicate shared base: {} already owns {}", ty, base)
            }
        }
    }
}

impl std::error::Error for HierarchyError {}
