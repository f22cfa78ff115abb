//! SQLite-backed [`TagStore`] implementation.
//!
//! Tag lists live in each collection's `tags_json` column as a JSON array
//! of strings. Membership queries use SQLite's `json_each` over
//! [`tag_array_sql`], which reads a NULL, malformed or non-array column as
//! an empty array, the same way [`decode_tags`] does.

use anyhow::Result;
use async_trait::async_trait;
use sqlx::{Row, SqlitePool};
use std::collections::HashMap;

use crate::error::AtelierError;
use crate::models::{Collection, Tag, TagSummary, TaggedRecord};

use super::TagStore;

/// SQLite implementation of the [`TagStore`] trait.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

/// Decode a `tags_json` column. NULL and unparseable values read as empty.
pub(crate) fn decode_tags(raw: Option<String>) -> Vec<String> {
    raw.and_then(|s| serde_json::from_str::<Vec<String>>(&s).ok())
        .unwrap_or_default()
}

/// SQL expression yielding `{table}.tags_json` when it holds a JSON array
/// and `'[]'` otherwise, safe to pass to `json_each`. CASE evaluates its
/// branches lazily, so `json_type` only ever sees valid JSON.
pub(crate) fn tag_array_sql(table: &str) -> String {
    format!(
        "CASE WHEN json_valid({table}.tags_json) \
         THEN CASE WHEN json_type({table}.tags_json) = 'array' THEN {table}.tags_json ELSE '[]' END \
         ELSE '[]' END"
    )
}

fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}

#[async_trait]
impl TagStore for SqliteStore {
    async fn find_tag_by_name(&self, name: &str) -> Result<Option<Tag>> {
        let row = sqlx::query("SELECT id, name FROM tags WHERE name = ?")
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(|r| Tag {
            id: r.get("id"),
            name: r.get("name"),
        }))
    }

    async fn create_tag(&self, name: &str) -> Result<Tag> {
        sqlx::query(
            "INSERT INTO tags (id, name, created_at) VALUES (?, ?, ?) ON CONFLICT(name) DO NOTHING",
        )
        .bind(uuid::Uuid::new_v4().to_string())
        .bind(name)
        .bind(chrono::Utc::now().timestamp())
        .execute(&self.pool)
        .await?;

        self.find_tag_by_name(name)
            .await?
            .ok_or_else(|| anyhow::anyhow!("tag vanished after insert: {}", name))
    }

    async fn get_tags(&self, ids: &[String]) -> Result<Vec<Tag>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let sql = format!(
            "SELECT id, name FROM tags WHERE id IN ({})",
            placeholders(ids.len())
        );
        let mut query = sqlx::query(&sql);
        for id in ids {
            query = query.bind(id);
        }

        let rows = query.fetch_all(&self.pool).await?;
        Ok(rows
            .iter()
            .map(|r| Tag {
                id: r.get("id"),
                name: r.get("name"),
            })
            .collect())
    }

    async fn delete_tags(&self, ids: &[String]) -> Result<u64> {
        if ids.is_empty() {
            return Ok(0);
        }

        let sql = format!("DELETE FROM tags WHERE id IN ({})", placeholders(ids.len()));
        let mut query = sqlx::query(&sql);
        for id in ids {
            query = query.bind(id);
        }

        let result = query.execute(&self.pool).await?;
        Ok(result.rows_affected())
    }

    async fn list_tags(&self) -> Result<Vec<TagSummary>> {
        let mut counts: HashMap<String, i64> = HashMap::new();
        for collection in Collection::ALL {
            let table = collection.table();
            let tags = tag_array_sql(table);
            let rows = sqlx::query(&format!(
                "SELECT j.value AS name, COUNT(*) AS uses \
                 FROM {table}, json_each({tags}) AS j \
                 WHERE j.type = 'text' \
                 GROUP BY j.value"
            ))
            .fetch_all(&self.pool)
            .await?;

            for row in rows {
                let name: String = row.get("name");
                let uses: i64 = row.get("uses");
                *counts.entry(name).or_default() += uses;
            }
        }

        let rows = sqlx::query("SELECT id, name FROM tags ORDER BY name ASC")
            .fetch_all(&self.pool)
            .await?;

        Ok(rows
            .iter()
            .map(|r| {
                let name: String = r.get("name");
                TagSummary {
                    id: r.get("id"),
                    usage_count: counts.get(&name).copied().unwrap_or(0),
                    name,
                }
            })
            .collect())
    }

    async fn records_with_tag(
        &self,
        collection: Collection,
        name: &str,
    ) -> Result<Vec<TaggedRecord>> {
        let table = collection.table();
        let tags = tag_array_sql(table);
        let rows = sqlx::query(&format!(
            "SELECT id, tags_json FROM {table} \
             WHERE EXISTS (SELECT 1 FROM json_each({tags}) WHERE value = ?)"
        ))
        .bind(name)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|r| TaggedRecord {
                id: r.get("id"),
                collection,
                tags: decode_tags(r.get("tags_json")),
            })
            .collect())
    }

    async fn set_record_tags(
        &self,
        collection: Collection,
        id: &str,
        tags: &[String],
    ) -> Result<()> {
        let result = sqlx::query(&format!(
            "UPDATE {} SET tags_json = ?, updated_at = ? WHERE id = ?",
            collection.table()
        ))
        .bind(serde_json::to_string(tags)?)
        .bind(chrono::Utc::now().timestamp())
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(
                AtelierError::NotFound(format!("{} record not found: {}", collection, id)).into(),
            );
        }
        Ok(())
    }
}
