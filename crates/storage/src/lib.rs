use anyhow::{anyhow, Context, Result};
use chrono::NaiveDate;
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow},
    Pool, QueryBuilder, Row, Sqlite,
};
use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
    str::FromStr,
};
use tracing::{debug, info};

use shared::{
    domain::{
        CoverRef, ItemId, OwnerId, ReleaseMetadata, ResolvedItem, Tier, TierListId,
        TieredCollection, TieredItem,
    },
    protocol::SaveOutcome,
};

#[derive(Clone)]
pub struct Storage {
    pool: Pool<Sqlite>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredCollection {
    pub item_ids: Vec<ItemId>,
    pub version: u64,
}

#[derive(Debug, Clone)]
pub struct NewItem {
    pub name: String,
    pub cover: CoverRef,
    pub rating: Option<f32>,
    pub release_date: Option<NaiveDate>,
    pub platforms: Vec<String>,
}

impl NewItem {
    pub fn new(name: impl Into<String>, cover: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            cover: CoverRef::new(cover),
            rating: None,
            release_date: None,
            platforms: Vec::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct StoredTierList {
    pub tier_list_id: TierListId,
    pub owner_id: OwnerId,
    pub name: String,
    pub tiers: TieredCollection,
}

impl Storage {
    pub async fn new(database_url: &str) -> Result<Self> {
        ensure_sqlite_parent_dir_exists(database_url)?;

        let connect_options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(connect_options)
            .await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    pub async fn health_check(&self) -> Result<()> {
        let _: i64 = sqlx::query_scalar("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .context("sqlite ping failed")?;
        Ok(())
    }

    /// Creates the owner together with its empty collection at version 0.
    pub async fn create_owner(&self, handle: &str) -> Result<OwnerId> {
        let mut tx = self.pool.begin().await?;
        let rec = sqlx::query(
            "INSERT INTO owners (handle) VALUES (?)
             ON CONFLICT(handle) DO UPDATE SET handle=excluded.handle
             RETURNING id",
        )
        .bind(handle)
        .fetch_one(&mut *tx)
        .await?;
        let owner_id = OwnerId(rec.get::<i64, _>(0));

        sqlx::query("INSERT OR IGNORE INTO collection_versions (owner_id, version) VALUES (?, 0)")
            .bind(owner_id.0)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        info!(owner_id = owner_id.0, handle, "owner ready");
        Ok(owner_id)
    }

    pub async fn owner_by_handle(&self, handle: &str) -> Result<Option<OwnerId>> {
        let row = sqlx::query("SELECT id FROM owners WHERE handle = ?")
            .bind(handle)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| OwnerId(r.get::<i64, _>(0))))
    }

    pub async fn delete_owner(&self, owner_id: OwnerId) -> Result<bool> {
        let removed = sqlx::query("DELETE FROM owners WHERE id = ?")
            .bind(owner_id.0)
            .execute(&self.pool)
            .await?
            .rows_affected();
        Ok(removed > 0)
    }

    pub async fn insert_item(&self, item: &NewItem) -> Result<ItemId> {
        let platforms = serde_json::to_string(&item.platforms)?;
        let rec = sqlx::query(
            "INSERT INTO items (name, cover_ref, rating, release_date, platforms)
             VALUES (?, ?, ?, ?, ?)
             RETURNING id",
        )
        .bind(&item.name)
        .bind(item.cover.as_str())
        .bind(item.rating.map(f64::from))
        .bind(item.release_date)
        .bind(platforms)
        .fetch_one(&self.pool)
        .await
        .with_context(|| format!("failed to insert item '{}'", item.name))?;
        Ok(ItemId(rec.get::<i64, _>(0)))
    }

    /// Rows come back in storage order, not in the order of `item_ids`.
    pub async fn load_items(&self, item_ids: &[ItemId]) -> Result<Vec<ResolvedItem>> {
        if item_ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut query = QueryBuilder::<Sqlite>::new(
            "SELECT id, name, cover_ref, rating, release_date, platforms FROM items WHERE id IN (",
        );
        let mut separated = query.separated(", ");
        for item_id in item_ids {
            separated.push_bind(item_id.0);
        }
        separated.push_unseparated(")");

        let rows = query.build().fetch_all(&self.pool).await?;
        rows.iter().map(resolved_item_from_row).collect()
    }

    /// Appends an item to the end of the owner's collection and bumps its
    /// version. Returns false when the item is already collected.
    pub async fn append_to_collection(&self, owner_id: OwnerId, item_id: ItemId) -> Result<bool> {
        let mut tx = self.pool.begin().await?;
        let version = current_version(&mut *tx, owner_id)
            .await?
            .ok_or_else(|| anyhow!("unknown owner {}", owner_id.0))?;

        let inserted = sqlx::query(
            "INSERT OR IGNORE INTO collection_entries (owner_id, position, item_id)
             SELECT ?1, COALESCE(MAX(position) + 1, 0), ?2
             FROM collection_entries WHERE owner_id = ?1",
        )
        .bind(owner_id.0)
        .bind(item_id.0)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if inserted > 0 {
            bump_version(&mut *tx, owner_id, version + 1).await?;
        }
        tx.commit().await?;
        Ok(inserted > 0)
    }

    /// Returns `None` when the owner does not exist.
    pub async fn load_collection(&self, owner_id: OwnerId) -> Result<Option<StoredCollection>> {
        let mut conn = self.pool.acquire().await?;
        let Some(version) = current_version(&mut *conn, owner_id).await? else {
            return Ok(None);
        };

        let rows = sqlx::query(
            "SELECT item_id FROM collection_entries WHERE owner_id = ? ORDER BY position ASC",
        )
        .bind(owner_id.0)
        .fetch_all(&mut *conn)
        .await?;

        Ok(Some(StoredCollection {
            item_ids: rows
                .into_iter()
                .map(|row| ItemId(row.get::<i64, _>(0)))
                .collect(),
            version,
        }))
    }

    /// Replaces the stored order if `version` is newer than the stored one.
    /// Older or equal versions are ignored and reported as superseded.
    pub async fn save_collection_order(
        &self,
        owner_id: OwnerId,
        item_ids: &[ItemId],
        version: u64,
    ) -> Result<SaveOutcome> {
        let mut tx = self.pool.begin().await?;
        let stored_version = current_version(&mut *tx, owner_id)
            .await?
            .ok_or_else(|| anyhow!("unknown owner {}", owner_id.0))?;

        if version <= stored_version {
            debug!(
                owner_id = owner_id.0,
                version, stored_version, "ignoring superseded collection write"
            );
            return Ok(SaveOutcome::Superseded);
        }

        sqlx::query("DELETE FROM collection_entries WHERE owner_id = ?")
            .bind(owner_id.0)
            .execute(&mut *tx)
            .await?;

        for (position, item_id) in item_ids.iter().enumerate() {
            sqlx::query(
                "INSERT INTO collection_entries (owner_id, position, item_id) VALUES (?, ?, ?)",
            )
            .bind(owner_id.0)
            .bind(position as i64)
            .bind(item_id.0)
            .execute(&mut *tx)
            .await
            .with_context(|| {
                format!(
                    "failed to store item {} at position {position} for owner {}",
                    item_id.0, owner_id.0
                )
            })?;
        }

        bump_version(&mut *tx, owner_id, version).await?;
        tx.commit().await?;
        Ok(SaveOutcome::Applied)
    }

    pub async fn create_tier_list(&self, owner_id: OwnerId, name: &str) -> Result<TierListId> {
        let rec = sqlx::query("INSERT INTO tier_lists (owner_id, name) VALUES (?, ?) RETURNING id")
            .bind(owner_id.0)
            .bind(name)
            .fetch_one(&self.pool)
            .await?;
        Ok(TierListId(rec.get::<i64, _>(0)))
    }

    pub async fn label_tier(&self, tier_list_id: TierListId, tier: u32, label: &str) -> Result<()> {
        sqlx::query(
            "INSERT INTO tier_labels (tier_list_id, tier, label) VALUES (?, ?, ?)
             ON CONFLICT(tier_list_id, tier) DO UPDATE SET label=excluded.label",
        )
        .bind(tier_list_id.0)
        .bind(i64::from(tier))
        .bind(label)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Places the item at the end of `tier`, moving it out of any tier it
    /// was in before.
    pub async fn place_in_tier(
        &self,
        tier_list_id: TierListId,
        tier: u32,
        item_id: ItemId,
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM tier_list_entries WHERE tier_list_id = ? AND item_id = ?")
            .bind(tier_list_id.0)
            .bind(item_id.0)
            .execute(&mut *tx)
            .await?;
        sqlx::query(
            "INSERT INTO tier_list_entries (tier_list_id, tier, position, item_id)
             SELECT ?1, ?2, COALESCE(MAX(position) + 1, 0), ?3
             FROM tier_list_entries WHERE tier_list_id = ?1 AND tier = ?2",
        )
        .bind(tier_list_id.0)
        .bind(i64::from(tier))
        .bind(item_id.0)
        .execute(&mut *tx)
        .await
        .with_context(|| {
            format!(
                "failed to place item {} in tier {tier} of tier list {}",
                item_id.0, tier_list_id.0
            )
        })?;
        tx.commit().await?;
        Ok(())
    }

    pub async fn load_tier_list(&self, tier_list_id: TierListId) -> Result<Option<StoredTierList>> {
        let Some(header) = sqlx::query("SELECT owner_id, name FROM tier_lists WHERE id = ?")
            .bind(tier_list_id.0)
            .fetch_optional(&self.pool)
            .await?
        else {
            return Ok(None);
        };

        let mut tiers: BTreeMap<u32, Tier> = BTreeMap::new();

        let labels = sqlx::query("SELECT tier, label FROM tier_labels WHERE tier_list_id = ?")
            .bind(tier_list_id.0)
            .fetch_all(&self.pool)
            .await?;
        for row in labels {
            let tier = tier_index(row.try_get::<i64, _>("tier")?)?;
            tiers.entry(tier).or_default().label = Some(row.try_get("label")?);
        }

        let entries = sqlx::query(
            "SELECT e.tier, e.item_id, i.cover_ref
             FROM tier_list_entries e
             INNER JOIN items i ON i.id = e.item_id
             WHERE e.tier_list_id = ?
             ORDER BY e.tier ASC, e.position ASC",
        )
        .bind(tier_list_id.0)
        .fetch_all(&self.pool)
        .await?;
        for row in entries {
            let tier = tier_index(row.try_get::<i64, _>("tier")?)?;
            tiers.entry(tier).or_default().items.push(TieredItem {
                id: ItemId(row.try_get("item_id")?),
                cover: CoverRef(row.try_get("cover_ref")?),
            });
        }

        Ok(Some(StoredTierList {
            tier_list_id,
            owner_id: OwnerId(header.try_get("owner_id")?),
            name: header.try_get("name")?,
            tiers: TieredCollection { tiers },
        }))
    }
}

async fn current_version(
    conn: &mut sqlx::SqliteConnection,
    owner_id: OwnerId,
) -> Result<Option<u64>> {
    let version: Option<i64> =
        sqlx::query_scalar("SELECT version FROM collection_versions WHERE owner_id = ?")
            .bind(owner_id.0)
            .fetch_optional(&mut *conn)
            .await?;
    version
        .map(|v| u64::try_from(v).context("negative collection version"))
        .transpose()
}

async fn bump_version(
    conn: &mut sqlx::SqliteConnection,
    owner_id: OwnerId,
    version: u64,
) -> Result<()> {
    let version = i64::try_from(version).context("collection version overflow")?;
    sqlx::query(
        "UPDATE collection_versions SET version = ?, updated_at = CURRENT_TIMESTAMP WHERE owner_id = ?",
    )
    .bind(version)
    .bind(owner_id.0)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

fn tier_index(raw: i64) -> Result<u32> {
    u32::try_from(raw).with_context(|| format!("invalid tier index {raw}"))
}

fn resolved_item_from_row(row: &SqliteRow) -> Result<ResolvedItem> {
    let platforms: String = row.try_get("platforms")?;
    Ok(ResolvedItem {
        id: ItemId(row.try_get("id")?),
        name: row.try_get("name")?,
        cover: CoverRef(row.try_get("cover_ref")?),
        rating: row.try_get::<Option<f64>, _>("rating")?.map(|r| r as f32),
        release: ReleaseMetadata {
            release_date: row.try_get("release_date")?,
            platforms: serde_json::from_str(&platforms).context("malformed platforms column")?,
        },
    })
}

fn ensure_sqlite_parent_dir_exists(database_url: &str) -> Result<()> {
    let Some(path) = sqlite_path(database_url) else {
        return Ok(());
    };

    let Some(parent) = path.parent() else {
        return Ok(());
    };

    fs::create_dir_all(parent).with_context(|| {
        format!(
            "failed to create parent directory '{}' for database url '{database_url}'",
            parent.display()
        )
    })?;

    Ok(())
}

fn sqlite_path(database_url: &str) -> Option<PathBuf> {
    if database_url == "sqlite::memory:" || !database_url.starts_with("sqlite:") {
        return None;
    }

    let path = database_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:")
        .split('?')
        .next()
        .unwrap_or_default();

    if path.is_empty() {
        return None;
    }

    Some(Path::new(path).to_path_buf())
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
