use std::{collections::HashSet, sync::Arc};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use shared::{
    domain::{CollectionView, ItemId, LoadedCollection, OwnerId, ResolvedItem, ViewPhase},
    error::{ApiError, CollectionError},
    protocol::{CollectionEvent, PersistAck, SaveOutcome},
};
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, info, warn};

pub mod drag;
pub mod preview;
pub mod resolution;
mod storage_gateway;

pub use drag::{attach_drag, DragInteractionState, MoveRequest};
pub use preview::{preview_for_tiers, select_preview_covers};
pub use resolution::{align_by_id, resolve_in_order, ViewLiveness, RESOLVE_CHUNK_SIZE};
pub use storage_gateway::StorageGateway;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredOrder {
    pub item_ids: Vec<ItemId>,
    pub version: u64,
}

/// Monotonic per-owner write version attached to every save.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct WriteToken {
    pub version: u64,
}

#[async_trait]
pub trait PersistenceGateway: Send + Sync {
    /// `None` when no owner record exists.
    async fn load(&self, owner_id: OwnerId) -> Result<Option<StoredOrder>>;
    async fn save(
        &self,
        owner_id: OwnerId,
        item_ids: &[ItemId],
        token: WriteToken,
    ) -> Result<SaveOutcome>;
}

#[async_trait]
pub trait ItemResolver: Send + Sync {
    /// Result order is unspecified; callers re-align by id.
    async fn resolve(&self, item_ids: &[ItemId]) -> Result<Vec<ResolvedItem>>;
}

pub trait AuthorizationContext: Send + Sync {
    fn session_owner(&self) -> Option<OwnerId>;

    fn can_edit(&self, owner_id: OwnerId) -> bool {
        self.session_owner() == Some(owner_id)
    }
}

pub struct MissingPersistenceGateway;

#[async_trait]
impl PersistenceGateway for MissingPersistenceGateway {
    async fn load(&self, _owner_id: OwnerId) -> Result<Option<StoredOrder>> {
        Err(anyhow!("persistence gateway is unavailable"))
    }

    async fn save(
        &self,
        _owner_id: OwnerId,
        _item_ids: &[ItemId],
        _token: WriteToken,
    ) -> Result<SaveOutcome> {
        Err(anyhow!("persistence gateway is unavailable"))
    }
}

pub struct MissingItemResolver;

#[async_trait]
impl ItemResolver for MissingItemResolver {
    async fn resolve(&self, _item_ids: &[ItemId]) -> Result<Vec<ResolvedItem>> {
        Err(anyhow!("item resolver is unavailable"))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionIdentity {
    pub owner_id: Option<OwnerId>,
}

impl SessionIdentity {
    pub fn signed_in(owner_id: OwnerId) -> Self {
        Self {
            owner_id: Some(owner_id),
        }
    }

    pub fn anonymous() -> Self {
        Self { owner_id: None }
    }
}

impl AuthorizationContext for SessionIdentity {
    fn session_owner(&self) -> Option<OwnerId> {
        self.owner_id
    }
}

/// Moves the element at `from` to `to`, shifting everything in between by
/// one position. Both indices must be in range; nothing is returned
/// otherwise.
pub fn reorder<T: Clone>(
    current: &[T],
    from: usize,
    to: usize,
) -> std::result::Result<Vec<T>, CollectionError> {
    let len = current.len();
    if from >= len || to >= len {
        return Err(CollectionError::InvalidIndex { from, to, len });
    }

    let mut next = current.to_vec();
    let moved = next.remove(from);
    next.insert(to, moved);
    Ok(next)
}

/// Writes `displayed` into the slots its ids hold in `order`. Ids of `order`
/// that are not displayed keep their positions; displayed ids unknown to
/// `order` are appended. The result never loses an id of `order`.
pub fn merge_display_order(order: &[ItemId], displayed: &[ItemId]) -> Vec<ItemId> {
    let known: HashSet<ItemId> = order.iter().copied().collect();
    let shown: HashSet<ItemId> = displayed.iter().copied().collect();
    let mut refill = displayed.iter().copied().filter(|id| known.contains(id));

    let mut merged: Vec<ItemId> = order
        .iter()
        .map(|id| {
            if shown.contains(id) {
                refill.next().unwrap_or(*id)
            } else {
                *id
            }
        })
        .collect();
    merged.extend(displayed.iter().copied().filter(|id| !known.contains(id)));
    merged
}

/// Keeps the local order for ids still stored and appends stored ids the
/// local order has never seen.
pub fn reconcile_with_stored(local: &[ItemId], stored: &[ItemId]) -> Vec<ItemId> {
    let stored_ids: HashSet<ItemId> = stored.iter().copied().collect();
    let local_ids: HashSet<ItemId> = local.iter().copied().collect();

    let mut reconciled: Vec<ItemId> = local
        .iter()
        .copied()
        .filter(|id| stored_ids.contains(id))
        .collect();
    reconciled.extend(stored.iter().copied().filter(|id| !local_ids.contains(id)));
    reconciled
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewUpdate {
    Applied(ViewPhase),
    /// The view was torn down before resolution finished.
    Discarded,
}

struct ControllerState {
    view: CollectionView,
    /// Full id sequence, including ids without a display record.
    order: Vec<ItemId>,
    write_version: u64,
    seeded: bool,
    applied_version: u64,
    failed_version: Option<u64>,
}

pub struct OrderedCollectionController {
    owner_id: OwnerId,
    gateway: Arc<dyn PersistenceGateway>,
    resolver: Arc<dyn ItemResolver>,
    inner: Mutex<ControllerState>,
    events: broadcast::Sender<CollectionEvent>,
}

impl OrderedCollectionController {
    pub fn new(
        owner_id: OwnerId,
        gateway: Arc<dyn PersistenceGateway>,
        resolver: Arc<dyn ItemResolver>,
    ) -> Arc<Self> {
        let (events, _) = broadcast::channel(256);
        Arc::new(Self {
            owner_id,
            gateway,
            resolver,
            inner: Mutex::new(ControllerState {
                view: CollectionView::Loading,
                order: Vec::new(),
                write_version: 0,
                seeded: false,
                applied_version: 0,
                failed_version: None,
            }),
            events,
        })
    }

    pub fn owner_id(&self) -> OwnerId {
        self.owner_id
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<CollectionEvent> {
        self.events.subscribe()
    }

    pub async fn view(&self) -> CollectionView {
        self.inner.lock().await.view.clone()
    }

    /// Every collected id in order, displayed or not.
    pub async fn item_ids(&self) -> Vec<ItemId> {
        self.inner.lock().await.order.clone()
    }

    pub async fn has_failed_write(&self) -> bool {
        self.inner.lock().await.failed_version.is_some()
    }

    pub async fn load(&self) -> std::result::Result<LoadedCollection, CollectionError> {
        let stored = self
            .gateway
            .load(self.owner_id)
            .await
            .map_err(|err| CollectionError::PersistenceFailure {
                owner_id: self.owner_id,
                message: format!("load failed: {err:#}"),
            })?
            .ok_or(CollectionError::NotFound {
                owner_id: self.owner_id,
            })?;

        {
            let mut guard = self.inner.lock().await;
            guard.write_version = guard.write_version.max(stored.version);
            guard.seeded = true;
        }

        Ok(LoadedCollection::from_stored(
            self.owner_id,
            stored.item_ids,
            stored.version,
        ))
    }

    /// Loads and resolves the collection into the view. Results arriving
    /// after `liveness` was torn down are dropped.
    pub async fn open(
        &self,
        liveness: &ViewLiveness,
    ) -> std::result::Result<ViewUpdate, CollectionError> {
        self.set_view(CollectionView::Loading).await;

        let loaded = self.load().await?;
        let view = match &loaded {
            LoadedCollection::Empty { .. } => CollectionView::Empty,
            LoadedCollection::Loaded(collection) => {
                let items = resolve_in_order(self.resolver.as_ref(), &collection.item_ids).await?;
                CollectionView::Loaded(items)
            }
        };

        if let Err(err) = liveness.ensure_live() {
            debug!(owner_id = self.owner_id.0, %err, "discarding collection resolution");
            return Ok(ViewUpdate::Discarded);
        }

        let phase = view.phase();
        self.inner.lock().await.order = loaded.item_ids().to_vec();
        self.set_view(view).await;
        info!(owner_id = self.owner_id.0, ?phase, "collection view opened");
        Ok(ViewUpdate::Applied(phase))
    }

    /// Applies a move to the loaded view without touching persistence.
    /// Indices address displayed items; ids without a display record keep
    /// their slots. The pending display state is only observable through
    /// [`Self::subscribe_events`], never through [`Self::view`].
    pub async fn apply_reorder(
        &self,
        from: usize,
        to: usize,
    ) -> std::result::Result<Vec<ResolvedItem>, CollectionError> {
        let mut guard = self.inner.lock().await;
        let current = guard.view.items().unwrap_or_default();
        let next = reorder(current, from, to)?;
        let displayed: Vec<ItemId> = next.iter().map(|item| item.id).collect();
        let order = merge_display_order(&guard.order, &displayed);

        guard.view = CollectionView::Loading;
        self.emit(CollectionEvent::DisplayPending {
            owner_id: self.owner_id,
        });
        self.emit(CollectionEvent::ViewStateChanged {
            owner_id: self.owner_id,
            phase: ViewPhase::Loading,
        });

        guard.view = CollectionView::Loaded(next.clone());
        guard.order = order.clone();
        self.emit(CollectionEvent::OrderChanged {
            owner_id: self.owner_id,
            item_ids: order,
        });
        self.emit(CollectionEvent::ViewStateChanged {
            owner_id: self.owner_id,
            phase: ViewPhase::Loaded,
        });
        debug!(owner_id = self.owner_id.0, from, to, "applied reorder");
        Ok(next)
    }

    /// Writes `new_order` merged into the full id sequence, so ids without
    /// a display record are never dropped from storage.
    pub async fn persist(
        &self,
        new_order: &[ResolvedItem],
    ) -> std::result::Result<PersistAck, CollectionError> {
        if !self.inner.lock().await.seeded {
            self.seed_from_store().await?;
        }

        let displayed: Vec<ItemId> = new_order.iter().map(|item| item.id).collect();
        let item_ids = {
            let mut guard = self.inner.lock().await;
            let merged = merge_display_order(&guard.order, &displayed);
            guard.order = merged.clone();
            merged
        };
        self.persist_ids(item_ids).await
    }

    /// Re-issues the current order after a failed write. The stored order
    /// is read again first so the token is fresh and ids collected
    /// elsewhere in the meantime are kept.
    pub async fn retry_persist(&self) -> std::result::Result<Option<PersistAck>, CollectionError> {
        if self.inner.lock().await.failed_version.is_none() {
            return Ok(None);
        }

        let stored = self.load().await?;
        let item_ids = {
            let mut guard = self.inner.lock().await;
            let reconciled = reconcile_with_stored(&guard.order, stored.item_ids());
            guard.order = reconciled.clone();
            reconciled
        };
        self.persist_ids(item_ids).await.map(Some)
    }

    /// Ends the gesture, resetting it to idle, and commits its move if any.
    pub async fn commit_gesture(
        &self,
        gesture: &mut DragInteractionState,
    ) -> std::result::Result<Option<PersistAck>, CollectionError> {
        let (idle, request) = std::mem::take(gesture).end();
        *gesture = idle;

        let Some(MoveRequest { source, target }) = request else {
            debug!(owner_id = self.owner_id.0, "gesture ended without a move");
            return Ok(None);
        };

        let new_order = self.apply_reorder(source, target).await?;
        self.persist(&new_order).await.map(Some)
    }

    async fn persist_ids(
        &self,
        item_ids: Vec<ItemId>,
    ) -> std::result::Result<PersistAck, CollectionError> {
        let token = {
            let mut guard = self.inner.lock().await;
            guard.write_version += 1;
            WriteToken {
                version: guard.write_version,
            }
        };

        let outcome = match self.gateway.save(self.owner_id, &item_ids, token).await {
            Ok(outcome) => outcome,
            Err(err) => {
                let err = CollectionError::PersistenceFailure {
                    owner_id: self.owner_id,
                    message: format!("{err:#}"),
                };
                return Err(self.record_failure(token, err).await);
            }
        };

        let ack = PersistAck {
            version: token.version,
            outcome,
        };
        match outcome {
            SaveOutcome::Applied => {
                let mut guard = self.inner.lock().await;
                guard.applied_version = guard.applied_version.max(token.version);
                if guard.failed_version.is_some_and(|failed| failed <= token.version) {
                    guard.failed_version = None;
                }
            }
            SaveOutcome::Superseded => {
                let newer_local_write = self.inner.lock().await.write_version > token.version;
                if !newer_local_write {
                    let err = CollectionError::PersistenceFailure {
                        owner_id: self.owner_id,
                        message: format!(
                            "write version {} is behind the stored order",
                            token.version
                        ),
                    };
                    return Err(self.record_failure(token, err).await);
                }
                debug!(
                    owner_id = self.owner_id.0,
                    version = token.version,
                    "collection write superseded by a newer local write"
                );
            }
        }

        self.emit(CollectionEvent::Persisted {
            owner_id: self.owner_id,
            ack,
        });
        Ok(ack)
    }

    /// Takes the write version and the full id sequence from storage when
    /// nothing was loaded yet.
    async fn seed_from_store(&self) -> std::result::Result<(), CollectionError> {
        let loaded = self.load().await?;
        let mut guard = self.inner.lock().await;
        if guard.order.is_empty() {
            guard.order = loaded.item_ids().to_vec();
        }
        Ok(())
    }

    /// Remembers a failed write for retry unless a newer write already
    /// landed, then reports it.
    async fn record_failure(&self, token: WriteToken, err: CollectionError) -> CollectionError {
        {
            let mut guard = self.inner.lock().await;
            if guard.applied_version > token.version {
                debug!(
                    owner_id = self.owner_id.0,
                    version = token.version,
                    applied = guard.applied_version,
                    "failed write already replaced by a newer one"
                );
            } else {
                guard.failed_version = Some(token.version);
            }
        }
        warn!(
            owner_id = self.owner_id.0,
            version = token.version,
            %err,
            "collection write failed; keeping local order"
        );
        self.emit(CollectionEvent::PersistFailed {
            owner_id: self.owner_id,
            version: token.version,
            error: ApiError::from(&err),
        });
        err
    }

    async fn set_view(&self, view: CollectionView) {
        let phase = view.phase();
        self.inner.lock().await.view = view;
        self.emit(CollectionEvent::ViewStateChanged {
            owner_id: self.owner_id,
            phase,
        });
    }

    fn emit(&self, event: CollectionEvent) {
        let _ = self.events.send(event);
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
