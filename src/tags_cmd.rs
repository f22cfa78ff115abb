//! CLI commands for the tag catalog and record listing.

use anyhow::Result;

use crate::config::Config;
use crate::db;
use crate::merge::merge_tags;
use crate::migrate;
use crate::models::Collection;
use crate::records::list_records;
use crate::store::{SqliteStore, TagStore};

async fn open_store(config: &Config) -> Result<SqliteStore> {
    let pool = db::connect(config).await?;
    migrate::apply(&pool).await?;
    Ok(SqliteStore::new(pool))
}

pub async fn run_list_tags(config: &Config) -> Result<()> {
    let store = open_store(config).await?;
    let tags = store.list_tags().await?;

    if tags.is_empty() {
        println!("No tags.");
    } else {
        println!("{:<38} {:>6}  NAME", "ID", "USES");
        for tag in &tags {
            println!("{:<38} {:>6}  {}", tag.id, tag.usage_count, tag.name);
        }
    }

    store.pool().close().await;
    Ok(())
}

pub async fn run_create_tag(config: &Config, name: &str) -> Result<()> {
    let name = name.trim();
    if name.is_empty() {
        anyhow::bail!("tag name must not be empty");
    }
    let store = open_store(config).await?;
    let tag = store.create_tag(name).await?;
    println!("{}  {}", tag.id, tag.name);
    store.pool().close().await;
    Ok(())
}

pub async fn run_merge(config: &Config, target: &str, source_ids: &[String]) -> Result<()> {
    let store = open_store(config).await?;
    let result = merge_tags(&store, target, source_ids).await;
    store.pool().close().await;
    let report = result?;

    println!("merge into '{}' ({})", report.target_name, report.target_id);
    if report.merged_names.is_empty() {
        println!("  merged: (nothing to merge)");
    } else {
        println!("  merged: {}", report.merged_names.join(", "));
    }
    println!("  records updated: {}", report.records_updated);
    if report.records_failed > 0 {
        println!("  records failed: {}", report.records_failed);
    }
    if report.collections_failed > 0 {
        println!("  collections skipped: {}", report.collections_failed);
    }
    println!("  tags deleted: {}", report.tags_deleted);
    Ok(())
}

pub async fn run_list_records(
    config: &Config,
    collection: Collection,
    tag: Option<&str>,
) -> Result<()> {
    let store = open_store(config).await?;
    let records = list_records(&store, collection, tag).await?;

    if records.is_empty() {
        println!("No {}.", collection);
    } else {
        for record in &records {
            println!(
                "{}  {}  [{}]  {}",
                record.updated_at,
                record.id,
                record.tags.join(", "),
                record.title
            );
        }
    }

    store.pool().close().await;
    Ok(())
}
