// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Dispatch error taxonomy.
//!
//! Every expected failure of `register`/`resolve` is a typed, local outcome.
//! Allocation failure is the single fatal condition and aborts the process
//! (Rust default); nothing here is used as control flow for expected misses.

use std::fmt;

/// Errors returned by dispatch engine operations.
///
/// Resolution failures carry the formatted runtime-type tuple (e.g.
/// `"(Diagonal, Matrix)"`) so a missing or ambiguous overload can be
/// diagnosed without a debugger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    /// The upcast search found no registered overload applicable to the
    /// runtime-type tuple of the call.
    NoApplicableOverload {
        /// Formatted runtime-type tuple of the failed call.
        call: String,
    },
    /// Two or more applicable overloads are maximal and pairwise
    /// incomparable under the specificity order.
    AmbiguousDispatch {
        /// Formatted runtime-type tuple of the failed call.
        call: String,
        /// Formatted signatures of the incomparable maximal candidates.
        candidates: Vec<String>,
    },
    /// An overload with an identical signature is already registered.
    DuplicateRegistration {
        /// Formatted signature of the rejected registration.
        signature: String,
    },
    /// An argument's Rust type was never registered with the hierarchy
    /// provider, so it has no type token.
    UnregisteredType {
        /// Zero-based argument position of the unknown type.
        position: usize,
    },
    /// The hierarchy provider is misconfigured (e.g. a virtual ancestor
    /// without a shared-base accessor surfaced during cast-path replay).
    InvalidHierarchy(String),
}

impl fmt::Display for DispatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DispatchError::NoApplicableOverload { call } => {
                write!(f, "no applicable overload for {}", call)
            }
            DispatchError::AmbiguousDispatch { call, candidates } => {
                write!(
                    f,
                    "ambiguous dispatch for {}: incomparable candidates [{}]",
                    call,
                    candidates.join(", ")
                )
            }
            DispatchError::DuplicateRegistration { signature } => {
                write!(f, "overload already registered for {}", signature)
            }
            DispatchError::UnregisteredType { position } => {
                write!(f, "unregistered type at argument position {}", position)
            }
            DispatchError::InvalidHierarchy(msg) => {
                write!(f, "invalid hierarchy: {}", msg)
            }
        }
    }
}

impl std::error::Error for DispatchError {}

/// Convenient alias for API results using the public [`DispatchError`] type.
pub type Result<T> = core::result::Result<T, DispatchError>;
