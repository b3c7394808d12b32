// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Multi-argument upcast search.
//!
//! Enumerates, per argument, every ancestor type reachable by walking the
//! declared public base edges upward from the exact runtime type, keeping
//! for each the typed view and the cast path (the edge indices that produce
//! it). The Cartesian product of the per-argument chains is then walked
//! depth-first, position by position, and every tuple is probed against the
//! overload registry by the engine.
//!
//! Enumeration order carries no specificity meaning; ranking the hits is
//! the engine's job.

use crate::hierarchy::{ArgView, Hierarchy};
use std::sync::Arc;

/// One ancestor of one argument: the view at that type plus the base-edge
/// indices that reach it from the exact runtime type.
///
/// The path is what the resolution cache stores; replaying it on a later
/// call's instance reproduces the view without re-running the search.
pub(crate) struct Ancestor<'a> {
    pub view: ArgView<'a>,
    pub path: Arc<[u16]>,
}

/// Enumerate every ancestor of `root`, depth-first, the exact type first.
///
/// Each ancestor type is recorded once (first path wins). For a shared base
/// reachable over several paths all of them resolve through the same
/// accessor on the most-derived type, so dropping the later paths loses
/// nothing. A path whose view cannot be resolved (misdeclared hierarchy) is
/// skipped; `Hierarchy::upcast` has already logged it.
pub(crate) fn ancestors_of<'a>(hier: &dyn Hierarchy, root: ArgView<'a>) -> Vec<Ancestor<'a>> {
    let mut out = Vec::new();
    let mut trail = Vec::new();
    walk(hier, root, &mut trail, &mut out);
    out
}

fn walk<'a>(
    hier: &dyn Hierarchy,
    view: ArgView<'a>,
    trail: &mut Vec<u16>,
    out: &mut Vec<Ancestor<'a>>,
) {
    if out.iter().any(|a| a.view.ty() == view.ty()) {
        return;
    }
    out.push(Ancestor {
        view,
        path: trail.as_slice().into(),
    });
    for index in 0..hier.base_count(view.ty()) {
        if let Some(base) = hier.upcast(&view, index) {
            trail.push(index as u16);
            walk(hier, base, trail, out);
            trail.pop();
        }
    }
}

/// Reapply a cached cast path to a fresh instance's root view.
pub(crate) fn replay<'a>(
    hier: &dyn Hierarchy,
    root: ArgView<'a>,
    path: &[u16],
) -> Option<ArgView<'a>> {
    let mut view = root;
    for &index in path {
        view = hier.upcast(&view, index as usize)?;
    }
    Some(view)
}

/// Walk the Cartesian product of the per-argument ancestor chains.
///
/// `visit` receives, for each tuple, the chosen chain index per position.
pub(crate) fn for_each_tuple<'a, const N: usize>(
    chains: &[Vec<Ancestor<'a>>; N],
    visit: &mut dyn FnMut(&[usize; N]),
) {
    let mut picks = [0usize; N];
    descend(chains, 0, &mut picks, visit);
}

fn descend<'a, const N: usize>(
    chains: &[Vec<Ancestor<'a>>; N],
    position: usize,
    picks: &mut [usize; N],
    visit: &mut dyn FnMut(&[usize; N]),
) {
    if position == N {
        visit(picks);
        return;
    }
    for choice in 0..chains[position].len() {
        picks[position] = choice;
        descend(chains, position + 1, picks, visit);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hierarchy::HierarchyRegistry;

    struct V {
        id: u32,
    }
    struct B {
        v: V,
    }
    struct C {
        v: V,
    }
    struct D {
        v: V,
        b: B,
        c: C,
    }

    /// Shared diamond: B and C both reach the single V owned by D.
    fn diamond() -> HierarchyRegistry {
        let hier = HierarchyRegistry::new();
        hier.register::<V>("V").expect("register V");
        hier.register::<B>("B").expect("register B");
        hier.register::<C>("C").expect("register C");
        hier.register::<D>("D").expect("register D");
        hier.add_virtual_base::<B, V>().expect("B -> V");
        hier.add_virtual_base::<C, V>().expect("C -> V");
        hier.set_shared_base(|b: &B| &b.v).expect("B owns V");
        hier.set_shared_base(|c: &C| &c.v).expect("C owns V");
        hier.add_base(|d: &D| &d.b).expect("D -> B");
        hier.add_base(|d: &D| &d.c).expect("D -> C");
        hier.set_shared_base(|d: &D| &d.v).expect("D owns V");
        hier
    }

    fn sample() -> D {
        D {
            v: V { id: 1 },
            b: B { v: V { id: 2 } },
            c: C { v: V { id: 3 } },
        }
    }

    #[test]
    fn test_ancestors_visit_each_type_once() {
        let hier = diamond();
        let value = sample();
        let d = hier.token_of::<D>().expect("token of D");
        let chain = ancestors_of(&hier, ArgView::root(d, &value));
        // D, B, V, C: the second path to V is deduplicated.
        assert_eq!(chain.len(), 4);
        assert_eq!(chain[0].view.ty(), d);
        assert!(chain[0].path.is_empty(), "exact type has the empty path");
        let v = hier.token_of::<V>().expect("token of V");
        let shared = chain
            .iter()
            .find(|a| a.view.ty() == v)
            .expect("V reachable");
        // Both diamond arms resolve to D's single V.
        assert_eq!(shared.view.downcast_ref::<V>().expect("V view").id, 1);
    }

    #[test]
    fn test_replay_reproduces_views() {
        let hier = diamond();
        let value = sample();
        let d = hier.token_of::<D>().expect("token of D");
        let root = ArgView::root(d, &value);
        for ancestor in ancestors_of(&hier, root) {
            let replayed = replay(&hier, root, &ancestor.path).expect("path replays");
            assert_eq!(replayed.ty(), ancestor.view.ty());
        }
    }

    #[test]
    fn test_replay_on_second_instance() {
        let hier = diamond();
        let d = hier.token_of::<D>().expect("token of D");
        let v = hier.token_of::<V>().expect("token of V");
        let first = sample();
        let path = ancestors_of(&hier, ArgView::root(d, &first))
            .into_iter()
            .find(|a| a.view.ty() == v)
            .expect("V reachable")
            .path;
        let second = D {
            v: V { id: 41 },
            b: B { v: V { id: 0 } },
            c: C { v: V { id: 0 } },
        };
        let replayed =
            replay(&hier, ArgView::root(d, &second), &path).expect("path replays on new instance");
        assert_eq!(replayed.downcast_ref::<V>().expect("V view").id, 41);
    }

    #[test]
    fn test_product_covers_all_combinations() {
        let hier = diamond();
        let left = sample();
        let right = sample();
        let d = hier.token_of::<D>().expect("token of D");
        let chains = [
            ancestors_of(&hier, ArgView::root(d, &left)),
            ancestors_of(&hier, ArgView::root(d, &right)),
        ];
        let mut tuples = 0;
        for_each_tuple(&chains, &mut |picks| {
            assert!(picks[0] < chains[0].len());
            assert!(picks[1] < chains[1].len());
            tuples += 1;
        });
        assert_eq!(tuples, 16, "4 ancestors per argument, squared");
    }
}
