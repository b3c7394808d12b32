// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Matrix Addition Example
//!
//! The canonical multiple-dispatch scenario: `add` picks its implementation
//! from the exact runtime types of both operands, with fallback along the
//! hierarchy for combinations that were never specialized.
//!
//! Usage:
//!   cargo run --example matrix_add

use multimethod::{DispatchEngine, HierarchyRegistry};
use std::sync::Arc;

struct Matrix {
    rows: usize,
    cols: usize,
}

struct Sparse {
    base: Matrix,
}

struct Diagonal {
    base: Sparse,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("+==========================================================+");
    println!("|            multimethod - matrix addition demo            |");
    println!("+==========================================================+\n");

    // Declare the hierarchy once per type: Matrix <- Sparse <- Diagonal.
    let hier = Arc::new(HierarchyRegistry::new());
    hier.register::<Matrix>("Matrix")?;
    hier.register::<Sparse>("Sparse")?;
    hier.register::<Diagonal>("Diagonal")?;
    hier.add_base(|s: &Sparse| &s.base)?;
    hier.add_base(|d: &Diagonal| &d.base)?;

    // One engine for the binary `add` multimethod.
    let add: DispatchEngine<2, String> = DispatchEngine::new(hier);
    add.register_fn(|a: &Matrix, b: &Matrix| {
        format!("dense add over {}x{} + {}x{}", a.rows, a.cols, b.rows, b.cols)
    })?;
    add.register_fn(|_: &Diagonal, _: &Matrix| "diagonal-aware add (left)".to_string())?;
    add.register_fn(|_: &Matrix, _: &Diagonal| "diagonal-aware add (right)".to_string())?;
    add.register_fn(|_: &Diagonal, _: &Diagonal| "pure diagonal add".to_string())?;

    let m = Matrix { rows: 3, cols: 3 };
    let d = Diagonal {
        base: Sparse {
            base: Matrix { rows: 3, cols: 3 },
        },
    };
    let s = Sparse {
        base: Matrix { rows: 3, cols: 3 },
    };

    println!("add(Matrix,   Matrix)   -> {}", add.call([&m, &m])?);
    println!("add(Diagonal, Matrix)   -> {}", add.call([&d, &m])?);
    println!("add(Matrix,   Diagonal) -> {}", add.call([&m, &d])?);
    println!("add(Diagonal, Diagonal) -> {}", add.call([&d, &d])?);
    // Sparse was never specialized: both operands fall back to Matrix.
    println!("add(Sparse,   Sparse)   -> {}", add.call([&s, &s])?);
    // A half-specialized call still narrows the diagonal operand.
    println!("add(Sparse,   Diagonal) -> {}", add.call([&s, &d])?);

    println!(
        "\n{} overloads registered, {} tuples resolved",
        add.overload_count(),
        add.resolved_count()
    );
    Ok(())
}
