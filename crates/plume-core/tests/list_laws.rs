//! Integration tests: list_laws.

use plume_core::{List, ListDefinitions};
use proptest::prelude::*;

/// Two definitions with overlapping labels and values.
fn definitions() -> ListDefinitions {
    let mut defs = ListDefinitions::new();
    defs.define(
        "Weather",
        [("sun", 1), ("rain", 2), ("snow", 3), ("fog", 4), ("hail", 5)],
    )
    .unwrap();
    defs.define("Mood", [("calm", 1), ("tense", 2), ("sun", 3)])
        .unwrap();
    defs
}

/// A list over both definitions chosen by bitmask, always carrying both
/// origins so every generated list shares the same universe.
fn list_from_mask(defs: &ListDefinitions, mask: u16) -> List {
    let all: Vec<_> = defs.iter().flat_map(|d| d.items()).collect();
    let items = all
        .into_iter()
        .enumerate()
        .filter(|(i, _)| mask & (1 << i) != 0)
        .map(|(_, item)| item);
    defs.iter()
        .fold(List::from_items(items), |list, d| list.with_origin(d.id()))
}

proptest! {
    #[test]
    fn union_contains_both_operands(a in 0u16..256, b in 0u16..256) {
        let defs = definitions();
        let (a, b) = (list_from_mask(&defs, a), list_from_mask(&defs, b));
        let union = a.union(&b);
        prop_assert!(union.contains(&a));
        prop_assert!(union.contains(&b));
    }

    #[test]
    fn difference_is_disjoint_from_subtrahend(a in 0u16..256, b in 0u16..256) {
        let defs = definitions();
        let (a, b) = (list_from_mask(&defs, a), list_from_mask(&defs, b));
        prop_assert!(a.difference(&b).intersect(&b).is_empty());
    }

    #[test]
    fn inverse_is_disjoint(a in 0u16..256) {
        let defs = definitions();
        let a = list_from_mask(&defs, a);
        prop_assert!(a.inverse(&defs).unwrap().intersect(&a).is_empty());
    }

    #[test]
    fn inverse_union_is_universe(a in 0u16..256) {
        let defs = definitions();
        let a = list_from_mask(&defs, a);
        let universe = a.all_possible_items(&defs).unwrap();
        prop_assert_eq!(a.inverse(&defs).unwrap().union(&a), universe);
    }

    #[test]
    fn shift_never_grows(a in 0u16..256, by in -6i64..6) {
        let defs = definitions();
        let a = list_from_mask(&defs, a);
        prop_assert!(a.shift(by, &defs).unwrap().len() <= a.len());
    }
}
