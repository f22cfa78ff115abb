//! Tag consolidation.
//!
//! Collapses several catalog tags into one target name. Records store tag
//! names rather than ids, so the merge rewrites every affected record's
//! list one at a time and only then removes the retired catalog rows.
//!
//! # Failure policy
//!
//! A failed record write is logged and counted in `records_failed`, and
//! the merge moves on. A collection whose records could not be loaded for
//! one source name is counted once in `collections_failed`; its records
//! are not attempted, so they add nothing to `records_failed`.
//! Catalog deletion runs even if some record writes failed; only a failed
//! deletion is returned as an error. A record whose write failed can
//! therefore keep a name that no longer has a catalog row.
//!
//! # Concurrency
//!
//! There is no locking. Two merges touching overlapping names at the same
//! time may race and leave a record tagged with a retired name.

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::AtelierError;
use crate::models::{Collection, Tag};
use crate::store::TagStore;

/// Outcome of a successful [`merge_tags`] call.
#[derive(Debug, Clone, Serialize)]
pub struct MergeReport {
    pub target_id: String,
    pub target_name: String,
    /// Source names that were rewritten (target and unknown ids excluded).
    pub merged_names: Vec<String>,
    pub records_updated: usize,
    pub records_failed: usize,
    /// (source name, collection) lookups that failed before any record in
    /// that collection could be rewritten.
    pub collections_failed: usize,
    pub tags_deleted: u64,
}

/// Replace `name` with `target` in a tag list, never duplicating the
/// target. Returns `None` when `name` is absent and nothing changes.
pub fn rewrite_tags(tags: &[String], name: &str, target: &str) -> Option<Vec<String>> {
    if !tags.iter().any(|t| t == name) {
        return None;
    }
    let mut out: Vec<String> = tags.iter().filter(|t| *t != name).cloned().collect();
    if !out.iter().any(|t| t == target) {
        out.push(target.to_string());
    }
    Some(out)
}

/// Merge the catalog tags `source_ids` into `target_name`.
///
/// 1. Find or create the target catalog row.
/// 2. Resolve source ids to names, skipping the target itself.
/// 3. For each source name and each collection, rewrite every record
///    carrying the name.
/// 4. Delete the source catalog rows.
///
/// Passing fewer than two sources is allowed and simply does less work.
pub async fn merge_tags(
    store: &dyn TagStore,
    target_name: &str,
    source_ids: &[String],
) -> Result<MergeReport> {
    let target_name = target_name.trim();
    if target_name.is_empty() {
        return Err(AtelierError::InvalidInput("target name must not be empty".to_string()).into());
    }

    let target = match store.find_tag_by_name(target_name).await? {
        Some(tag) => tag,
        None => {
            debug!(target = target_name, "creating merge target tag");
            store.create_tag(target_name).await?
        }
    };

    let sources: Vec<Tag> = store
        .get_tags(source_ids)
        .await?
        .into_iter()
        .filter(|t| t.id != target.id)
        .collect();

    if sources.len() < source_ids.len() {
        debug!(
            requested = source_ids.len(),
            resolved = sources.len(),
            "some source ids were unknown or equal to the target"
        );
    }

    let mut records_updated = 0;
    let mut records_failed = 0;
    let mut collections_failed = 0;

    for source in &sources {
        // A source with the target's exact name has no records to rewrite.
        if source.name == target.name {
            continue;
        }

        for collection in Collection::ALL {
            let records = match store.records_with_tag(collection, &source.name).await {
                Ok(records) => records,
                Err(e) => {
                    warn!(
                        collection = %collection,
                        tag = %source.name,
                        error = %e,
                        "failed to load records for merge"
                    );
                    collections_failed += 1;
                    continue;
                }
            };

            for record in records {
                let Some(tags) = rewrite_tags(&record.tags, &source.name, &target.name) else {
                    continue;
                };
                match store.set_record_tags(collection, &record.id, &tags).await {
                    Ok(()) => records_updated += 1,
                    Err(e) => {
                        warn!(
                            collection = %collection,
                            record = %record.id,
                            tag = %source.name,
                            error = %e,
                            "failed to rewrite record tags"
                        );
                        records_failed += 1;
                    }
                }
            }
        }
    }

    let source_row_ids: Vec<String> = sources.iter().map(|t| t.id.clone()).collect();
    let tags_deleted = store
        .delete_tags(&source_row_ids)
        .await
        .context("failed to delete merged tags from the catalog")?;

    info!(
        target = %target.name,
        sources = sources.len(),
        records_updated,
        records_failed,
        collections_failed,
        tags_deleted,
        "tag merge complete"
    );

    Ok(MergeReport {
        target_id: target.id,
        target_name: target.name,
        merged_names: sources.into_iter().map(|t| t.name).collect(),
        records_updated,
        records_failed,
        collections_failed,
        tags_deleted,
    })
}
