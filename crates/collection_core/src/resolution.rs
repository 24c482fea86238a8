//! Resolving bare item ids into display records, re-aligned to the stored order.

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use futures::future::try_join_all;
use shared::{
    domain::{ItemId, ResolvedItem},
    error::CollectionError,
};
use tracing::warn;

use crate::ItemResolver;

/// Largest id batch handed to the resolver in one call.
pub const RESOLVE_CHUNK_SIZE: usize = 10;

/// Shared flag telling late asynchronous results whether their view is
/// still around.
#[derive(Debug, Clone)]
pub struct ViewLiveness(Arc<AtomicBool>);

impl ViewLiveness {
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(true)))
    }

    pub fn is_live(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    pub fn tear_down(&self) {
        self.0.store(false, Ordering::Release);
    }

    pub fn ensure_live(&self) -> Result<(), CollectionError> {
        if self.is_live() {
            Ok(())
        } else {
            Err(CollectionError::StaleResolution)
        }
    }
}

impl Default for ViewLiveness {
    fn default() -> Self {
        Self::new()
    }
}

/// Projects resolved records back onto `order`. Ids without a record are
/// skipped.
pub fn align_by_id(
    order: &[ItemId],
    resolved: impl IntoIterator<Item = ResolvedItem>,
) -> Vec<ResolvedItem> {
    let mut by_id: HashMap<ItemId, ResolvedItem> = resolved
        .into_iter()
        .map(|item| (item.id, item))
        .collect();

    let mut aligned = Vec::with_capacity(order.len());
    for item_id in order {
        match by_id.remove(item_id) {
            Some(item) => aligned.push(item),
            None => warn!(item_id = item_id.0, "no display record for collected item"),
        }
    }
    aligned
}

/// Resolves `order` in concurrent chunks and returns the records in
/// `order`'s sequence, whatever order the chunks complete in.
pub async fn resolve_in_order(
    resolver: &dyn ItemResolver,
    order: &[ItemId],
) -> Result<Vec<ResolvedItem>, CollectionError> {
    if order.is_empty() {
        return Ok(Vec::new());
    }

    let chunks = try_join_all(
        order
            .chunks(RESOLVE_CHUNK_SIZE)
            .map(|chunk| resolver.resolve(chunk)),
    )
    .await
    .map_err(|err| CollectionError::Resolution(format!("{err:#}")))?;

    Ok(align_by_id(order, chunks.into_iter().flatten()))
}

#[cfg(test)]
#[path = "tests/resolution_tests.rs"]
mod tests;
