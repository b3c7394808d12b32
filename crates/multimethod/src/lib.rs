// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! # multimethod - Open Multiple Dispatch for Rust
//!
//! Select, at call time, the most specific registered function for a tuple
//! of N arguments based on each argument's exact runtime type. This is the
//! "matrix addition" problem: `add(Diagonal, Matrix)` must resolve
//! differently from `add(Matrix, Diagonal)` and from `add(Matrix, Matrix)`,
//! with fallbacks along an explicit type hierarchy and ambiguity surfaced
//! as a typed error instead of picked arbitrarily.
//!
//! ## Quick Start
//!
//! ```rust
//! use multimethod::{DispatchEngine, HierarchyRegistry};
//! use std::sync::Arc;
//!
//! struct Matrix;
//! struct Diagonal { base: Matrix }
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Declare the hierarchy once per type.
//!     let hier = Arc::new(HierarchyRegistry::new());
//!     hier.register::<Matrix>("Matrix")?;
//!     hier.register::<Diagonal>("Diagonal")?;
//!     hier.add_base(|d: &Diagonal| &d.base)?;
//!
//!     // One engine per multimethod: two arguments, &'static str result.
//!     let add: DispatchEngine<2, &'static str> = DispatchEngine::new(hier);
//!     add.register_fn(|_: &Matrix, _: &Matrix| "dense + dense")?;
//!     add.register_fn(|_: &Diagonal, _: &Matrix| "diagonal + dense")?;
//!
//!     let (m, d) = (Matrix, Diagonal { base: Matrix });
//!     assert_eq!(add.call([&m, &m])?, "dense + dense");
//!     assert_eq!(add.call([&d, &m])?, "diagonal + dense");
//!     // No (Matrix, Diagonal) overload: the search falls back to the
//!     // most specific applicable signature, (Matrix, Matrix).
//!     assert_eq!(add.call([&m, &d])?, "dense + dense");
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! +----------------------------------------------------------------+
//! |                       Application Layer                        |
//! |    HierarchyRegistry (types, base edges) | overload functions  |
//! +----------------------------------------------------------------+
//! |                        Dispatch Engine                         |
//! |  resolve: cache probe -> upcast search -> frontier -> cache    |
//! +----------------------------------------------------------------+
//! |    Specificity Relation      |    Multi-Argument Upcast Search |
//! +----------------------------------------------------------------+
//! |          Concurrent Table (lock-free reads, snapshots)         |
//! +----------------------------------------------------------------+
//! ```
//!
//! ## Key Types
//!
//! | Type | Description |
//! |------|-------------|
//! | [`DispatchEngine`] | One multimethod: overload registry + resolution cache |
//! | [`HierarchyRegistry`] | Shipping [`Hierarchy`] provider, declared per type |
//! | [`Signature`] | Ordered tuple of type tokens keying an overload |
//! | [`ArgView`] | Borrow of an argument seen as one of its ancestor types |
//! | [`Table`] | Concurrent map with lock-free readers, used by the engine |
//! | [`DispatchError`] | Typed resolution failures (missing, ambiguous, ...) |
//!
//! ## Guarantees
//!
//! - Resolutions are **permanent**: once a runtime-type tuple is resolved,
//!   later registrations never change what it dispatches to.
//! - Cache hits are **lock-free** and race safely with registrations and
//!   first-time resolutions.
//! - Ambiguity (two incomparable maximal candidates) is a typed error
//!   naming the candidates, never an abort and never an arbitrary pick.

// Clippy: no blanket suppressions; inline #[allow] with justification only.

/// Dispatch engine (overload registry, resolution cache, tie-breaking).
pub mod engine;
/// Dispatch error taxonomy and `Result` alias.
pub mod error;
/// Type tokens, argument views, the `Hierarchy` trait and its registry.
pub mod hierarchy;
/// Specificity partial order over signatures.
pub mod specificity;
/// Concurrent open-addressing table with lock-free readers.
pub mod table;
/// Multi-argument upcast search (crate-internal).
mod upcast;

pub use engine::{Callable, Dispatch, DispatchEngine, DispatchEngineBuilder};
pub use error::{DispatchError, Result};
pub use hierarchy::{ArgView, Hierarchy, HierarchyError, HierarchyRegistry, TypeToken};
pub use specificity::Signature;
pub use table::Table;
