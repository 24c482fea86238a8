use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(pub i64);
    };
}

id_newtype!(OwnerId);
id_newtype!(ItemId);
id_newtype!(TierListId);

/// Tier index reserved for unranked items.
pub const UNRANKED_TIER: u32 = 0;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CoverRef(pub String);

impl CoverRef {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReleaseMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub release_date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub platforms: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedItem {
    pub id: ItemId,
    pub name: String,
    pub cover: CoverRef,
    /// 0..=100
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rating: Option<f32>,
    #[serde(default)]
    pub release: ReleaseMetadata,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderedCollection {
    pub owner_id: OwnerId,
    pub item_ids: Vec<ItemId>,
    pub version: u64,
}

impl OrderedCollection {
    pub fn len(&self) -> usize {
        self.item_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.item_ids.is_empty()
    }
}

/// Outcome of loading an owner's collection. An owner with no items is
/// reported as `Empty`, never as an empty `Loaded`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadedCollection {
    Empty { owner_id: OwnerId, version: u64 },
    Loaded(OrderedCollection),
}

impl LoadedCollection {
    pub fn from_stored(owner_id: OwnerId, item_ids: Vec<ItemId>, version: u64) -> Self {
        if item_ids.is_empty() {
            Self::Empty { owner_id, version }
        } else {
            Self::Loaded(OrderedCollection {
                owner_id,
                item_ids,
                version,
            })
        }
    }

    pub fn version(&self) -> u64 {
        match self {
            Self::Empty { version, .. } => *version,
            Self::Loaded(collection) => collection.version,
        }
    }

    pub fn item_ids(&self) -> &[ItemId] {
        match self {
            Self::Empty { .. } => &[],
            Self::Loaded(collection) => &collection.item_ids,
        }
    }
}

/// What a consuming view should currently show.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum CollectionView {
    #[default]
    Loading,
    Empty,
    Loaded(Vec<ResolvedItem>),
}

impl CollectionView {
    pub fn phase(&self) -> ViewPhase {
        match self {
            Self::Loading => ViewPhase::Loading,
            Self::Empty => ViewPhase::Empty,
            Self::Loaded(_) => ViewPhase::Loaded,
        }
    }

    pub fn items(&self) -> Option<&[ResolvedItem]> {
        match self {
            Self::Loaded(items) => Some(items),
            Self::Loading | Self::Empty => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViewPhase {
    Loading,
    Empty,
    Loaded,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TieredItem {
    pub id: ItemId,
    pub cover: CoverRef,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tier {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    pub items: Vec<TieredItem>,
}

/// Tier index to tier, iterated in ascending display order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TieredCollection {
    pub tiers: BTreeMap<u32, Tier>,
}

impl TieredCollection {
    pub fn ranked_items(&self) -> impl Iterator<Item = &TieredItem> {
        self.tiers
            .range(UNRANKED_TIER + 1..)
            .flat_map(|(_, tier)| tier.items.iter())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "items", rename_all = "snake_case")]
pub enum CollectionLayout {
    Flat(Vec<TieredItem>),
    Tiered(TieredCollection),
}

impl CollectionLayout {
    /// A collection holding only the unranked tier is a plain list.
    pub fn from_tiers(mut collection: TieredCollection) -> Self {
        let only_unranked = collection.tiers.len() == 1
            && collection.tiers.contains_key(&UNRANKED_TIER);
        if only_unranked {
            let items = collection
                .tiers
                .remove(&UNRANKED_TIER)
                .map(|tier| tier.items)
                .unwrap_or_default();
            return Self::Flat(items);
        }
        Self::Tiered(collection)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "covers", rename_all = "snake_case")]
pub enum Preview {
    Covers([CoverRef; 3]),
    NoPreview,
}

impl Preview {
    pub fn covers(&self) -> Option<&[CoverRef; 3]> {
        match self {
            Self::Covers(covers) => Some(covers),
            Self::NoPreview => None,
        }
    }
}
