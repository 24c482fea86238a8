use serde::{Deserialize, Serialize};

use crate::{
    domain::{ItemId, OwnerId, ViewPhase},
    error::ApiError,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SaveOutcome {
    Applied,
    /// A newer version was already stored; this write was ignored.
    Superseded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistAck {
    pub version: u64,
    pub outcome: SaveOutcome,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum CollectionEvent {
    ViewStateChanged {
        owner_id: OwnerId,
        phase: ViewPhase,
    },
    DisplayPending {
        owner_id: OwnerId,
    },
    OrderChanged {
        owner_id: OwnerId,
        item_ids: Vec<ItemId>,
    },
    Persisted {
        owner_id: OwnerId,
        ack: PersistAck,
    },
    PersistFailed {
        owner_id: OwnerId,
        version: u64,
        error: ApiError,
    },
}

impl CollectionEvent {
    pub fn owner_id(&self) -> OwnerId {
        match self {
            Self::ViewStateChanged { owner_id, .. }
            | Self::DisplayPending { owner_id }
            | Self::OrderChanged { owner_id, .. }
            | Self::Persisted { owner_id, .. }
            | Self::PersistFailed { owner_id, .. } => *owner_id,
        }
    }
}
