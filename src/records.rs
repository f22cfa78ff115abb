//! CRUD for taggable records (tasks, papers, notes, journal entries).
//!
//! All four collections share one table shape. Tag lists are normalized
//! on write, and any new tag name is registered in the catalog so it shows
//! up in the tag list. Records may still carry names with no catalog row
//! (for example after a partially failed merge); reads tolerate that.

use anyhow::Result;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use crate::error::AtelierError;
use crate::models::{format_ts_iso, normalize_tags, Collection, NewRecord, Record, RecordPatch};
use crate::store::sqlite::{decode_tags, tag_array_sql};
use crate::store::{SqliteStore, TagStore};

const COLUMNS: &str = "id, title, body, tags_json, metadata_json, created_at, updated_at";

fn row_to_record(collection: Collection, row: &SqliteRow) -> Record {
    let metadata_json: String = row.get("metadata_json");
    Record {
        id: row.get("id"),
        collection,
        title: row.get("title"),
        body: row.get("body"),
        tags: decode_tags(row.get("tags_json")),
        metadata: serde_json::from_str(&metadata_json).unwrap_or(serde_json::json!({})),
        created_at: format_ts_iso(row.get("created_at")),
        updated_at: format_ts_iso(row.get("updated_at")),
    }
}

/// Register every name in the catalog. Existing rows are left alone.
pub async fn ensure_tags(store: &dyn TagStore, tags: &[String]) -> Result<()> {
    for tag in tags {
        store.create_tag(tag).await?;
    }
    Ok(())
}

pub async fn create_record(
    store: &SqliteStore,
    collection: Collection,
    new: NewRecord,
) -> Result<Record> {
    let title = new.title.trim();
    if title.is_empty() {
        return Err(AtelierError::InvalidInput("title must not be empty".to_string()).into());
    }

    let id = uuid::Uuid::new_v4().to_string();
    let now = chrono::Utc::now().timestamp();
    let tags = normalize_tags(&new.tags);
    let metadata = new.metadata.unwrap_or(serde_json::json!({}));

    sqlx::query(&format!(
        "INSERT INTO {} ({}) VALUES (?, ?, ?, ?, ?, ?, ?)",
        collection.table(),
        COLUMNS
    ))
    .bind(&id)
    .bind(title)
    .bind(&new.body)
    .bind(serde_json::to_string(&tags)?)
    .bind(serde_json::to_string(&metadata)?)
    .bind(now)
    .bind(now)
    .execute(store.pool())
    .await?;

    ensure_tags(store, &tags).await?;

    get_record(store, collection, &id)
        .await?
        .ok_or_else(|| anyhow::anyhow!("{} record not found after insert: {}", collection, id))
}

/// Records in `collection`, newest first, optionally only those carrying
/// the tag `tag`.
pub async fn list_records(
    store: &SqliteStore,
    collection: Collection,
    tag: Option<&str>,
) -> Result<Vec<Record>> {
    let table = collection.table();
    let rows = match tag {
        Some(tag) => {
            let tags = tag_array_sql(table);
            sqlx::query(&format!(
                "SELECT {COLUMNS} FROM {table} \
                 WHERE EXISTS (SELECT 1 FROM json_each({tags}) WHERE value = ?) \
                 ORDER BY updated_at DESC"
            ))
            .bind(tag)
            .fetch_all(store.pool())
            .await?
        }
        None => {
            sqlx::query(&format!(
                "SELECT {COLUMNS} FROM {table} ORDER BY updated_at DESC"
            ))
            .fetch_all(store.pool())
            .await?
        }
    };

    Ok(rows.iter().map(|r| row_to_record(collection, r)).collect())
}

pub async fn get_record(
    store: &SqliteStore,
    collection: Collection,
    id: &str,
) -> Result<Option<Record>> {
    let row = sqlx::query(&format!(
        "SELECT {} FROM {} WHERE id = ?",
        COLUMNS,
        collection.table()
    ))
    .bind(id)
    .fetch_optional(store.pool())
    .await?;

    Ok(row.map(|r| row_to_record(collection, &r)))
}

/// Apply a partial update. Returns `None` when the record does not exist.
pub async fn update_record(
    store: &SqliteStore,
    collection: Collection,
    id: &str,
    patch: RecordPatch,
) -> Result<Option<Record>> {
    let Some(current) = get_record(store, collection, id).await? else {
        return Ok(None);
    };

    let title = match patch.title {
        Some(t) if t.trim().is_empty() => {
            return Err(AtelierError::InvalidInput("title must not be empty".to_string()).into())
        }
        Some(t) => t.trim().to_string(),
        None => current.title,
    };
    let body = patch.body.unwrap_or(current.body);
    let tags = patch
        .tags
        .map(normalize_tags)
        .unwrap_or(current.tags);
    let metadata = patch.metadata.unwrap_or(current.metadata);

    sqlx::query(&format!(
        "UPDATE {} SET title = ?, body = ?, tags_json = ?, metadata_json = ?, updated_at = ? \
         WHERE id = ?",
        collection.table()
    ))
    .bind(&title)
    .bind(&body)
    .bind(serde_json::to_string(&tags)?)
    .bind(serde_json::to_string(&metadata)?)
    .bind(chrono::Utc::now().timestamp())
    .bind(id)
    .execute(store.pool())
    .await?;

    ensure_tags(store, &tags).await?;

    get_record(store, collection, id).await
}

/// Delete a record. Returns whether a row was removed.
pub async fn delete_record(store: &SqliteStore, collection: Collection, id: &str) -> Result<bool> {
    let result = sqlx::query(&format!("DELETE FROM {} WHERE id = ?", collection.table()))
        .bind(id)
        .execute(store.pool())
        .await?;
    Ok(result.rows_affected() > 0)
}
