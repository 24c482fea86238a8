use std::collections::BTreeMap;

use super::*;
use shared::domain::{ItemId, Tier};

fn entry(name: &str) -> TieredItem {
    TieredItem {
        id: ItemId(name.bytes().map(i64::from).sum()),
        cover: CoverRef::new(name),
    }
}

fn flat(names: &[&str]) -> CollectionLayout {
    CollectionLayout::Flat(names.iter().map(|name| entry(name)).collect())
}

fn tiered(tiers: Vec<(u32, Vec<&str>)>) -> TieredCollection {
    TieredCollection {
        tiers: tiers
            .into_iter()
            .map(|(index, names)| {
                (
                    index,
                    Tier {
                        label: None,
                        items: names.iter().map(|name| entry(name)).collect(),
                    },
                )
            })
            .collect::<BTreeMap<_, _>>(),
    }
}

fn covers(preview: &Preview) -> Vec<&str> {
    preview
        .covers()
        .expect("preview covers")
        .iter()
        .map(CoverRef::as_str)
        .collect()
}

#[test]
fn flat_single_item_is_repeated() {
    assert_eq!(covers(&select_preview_covers(&flat(&["A"]))), ["A", "A", "A"]);
}

#[test]
fn flat_two_items_repeat_the_second() {
    assert_eq!(
        covers(&select_preview_covers(&flat(&["A", "B"]))),
        ["A", "B", "B"]
    );
}

#[test]
fn flat_takes_first_three() {
    assert_eq!(
        covers(&select_preview_covers(&flat(&["A", "B", "C", "D"]))),
        ["A", "B", "C"]
    );
}

#[test]
fn tiered_skips_unranked_tier() {
    let collection = tiered(vec![(0, vec!["X"]), (1, vec!["A"]), (2, vec!["B", "C"])]);
    let preview = select_preview_covers(&CollectionLayout::Tiered(collection));
    assert_eq!(covers(&preview), ["A", "B", "C"]);
}

#[test]
fn tiered_single_ranked_item_is_repeated() {
    let collection = tiered(vec![(0, vec!["X", "Y", "Z"]), (1, vec!["A"])]);
    let preview = select_preview_covers(&CollectionLayout::Tiered(collection));
    assert_eq!(covers(&preview), ["A", "A", "A"]);
}

#[test]
fn tiered_two_ranked_items_across_tiers() {
    let collection = tiered(vec![(2, vec!["A"]), (5, vec!["B"]), (0, vec!["X"])]);
    let preview = select_preview_covers(&CollectionLayout::Tiered(collection));
    assert_eq!(covers(&preview), ["A", "B", "B"]);
}

#[test]
fn tiered_favors_lowest_tiers_and_skips_empty_ones() {
    let collection = tiered(vec![(3, vec!["D", "E"]), (1, vec![]), (2, vec!["A", "B"])]);
    let preview = select_preview_covers(&CollectionLayout::Tiered(collection));
    assert_eq!(covers(&preview), ["A", "B", "D"]);
}

#[test]
fn empty_inputs_signal_no_preview() {
    assert_eq!(select_preview_covers(&flat(&[])), Preview::NoPreview);

    let only_unranked = tiered(vec![(0, vec!["X"]), (1, vec![])]);
    assert_eq!(
        select_preview_covers(&CollectionLayout::Tiered(only_unranked)),
        Preview::NoPreview
    );
}

#[test]
fn tier_map_with_only_unranked_tier_is_previewed_as_flat() {
    let collection = tiered(vec![(0, vec!["A", "B"])]);
    assert!(matches!(
        CollectionLayout::from_tiers(collection.clone()),
        CollectionLayout::Flat(_)
    ));
    assert_eq!(covers(&preview_for_tiers(collection)), ["A", "B", "B"]);
}

#[test]
fn selection_is_deterministic() {
    let layout =
        CollectionLayout::Tiered(tiered(vec![(1, vec!["A", "B"]), (2, vec!["C", "D"])]));
    assert_eq!(select_preview_covers(&layout), select_preview_covers(&layout));
}
