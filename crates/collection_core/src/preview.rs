use shared::domain::{CollectionLayout, CoverRef, Preview, TieredCollection, TieredItem};

/// Picks three covers summarizing a collection.
///
/// Flat lists use their first items. Tier lists are scanned from tier 1
/// upward, so the unranked tier 0 never shows up. With fewer than three
/// eligible items the last one is repeated: `[a, a, a]` or `[a, b, b]`.
/// Collections without eligible items yield [`Preview::NoPreview`].
pub fn select_preview_covers(layout: &CollectionLayout) -> Preview {
    match layout {
        CollectionLayout::Flat(items) => pad_to_three(items.iter()),
        CollectionLayout::Tiered(collection) => pad_to_three(collection.ranked_items()),
    }
}

pub fn preview_for_tiers(collection: TieredCollection) -> Preview {
    select_preview_covers(&CollectionLayout::from_tiers(collection))
}

fn pad_to_three<'a>(items: impl Iterator<Item = &'a TieredItem>) -> Preview {
    let mut covers = items.take(3).map(|item| item.cover.clone());
    let Some(first) = covers.next() else {
        return Preview::NoPreview;
    };
    let second: CoverRef = covers.next().unwrap_or_else(|| first.clone());
    let third = covers.next().unwrap_or_else(|| second.clone());
    Preview::Covers([first, second, third])
}

#[cfg(test)]
#[path = "tests/preview_tests.rs"]
mod tests;
