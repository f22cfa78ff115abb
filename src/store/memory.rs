//! In-memory [`TagStore`] implementation for tests.
//!
//! Uses `BTreeMap` and `Vec` behind `std::sync::RwLock`. Write failures can
//! be injected per record or for catalog deletion, which lets callers
//! exercise the partial-failure paths of a merge without a real database.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;

use crate::models::{Collection, Tag, TagSummary, TaggedRecord};

use super::TagStore;

type RecordKey = (Collection, String);

/// In-memory store. Records hold `None` for an absent tag list.
#[derive(Default)]
pub struct InMemoryStore {
    tags: RwLock<Vec<Tag>>,
    records: RwLock<BTreeMap<RecordKey, Option<Vec<String>>>>,
    failing_records: RwLock<HashSet<String>>,
    failing_collections: RwLock<HashSet<Collection>>,
    fail_deletes: AtomicBool,
}

fn read<T>(lock: &RwLock<T>) -> Result<RwLockReadGuard<'_, T>> {
    lock.read().map_err(|_| anyhow!("in-memory store lock poisoned"))
}

fn write<T>(lock: &RwLock<T>) -> Result<RwLockWriteGuard<'_, T>> {
    lock.write().map_err(|_| anyhow!("in-memory store lock poisoned"))
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a catalog row with a caller-chosen id.
    pub fn insert_tag(&self, id: &str, name: &str) -> Result<()> {
        write(&self.tags)?.push(Tag {
            id: id.to_string(),
            name: name.to_string(),
        });
        Ok(())
    }

    /// Add or replace a record. `None` models a row whose tag list was
    /// never written.
    pub fn insert_record(
        &self,
        collection: Collection,
        id: &str,
        tags: Option<Vec<&str>>,
    ) -> Result<()> {
        let tags = tags.map(|t| t.into_iter().map(str::to_string).collect());
        write(&self.records)?.insert((collection, id.to_string()), tags);
        Ok(())
    }

    /// Current tag list of a record (`None` if the record or its list is
    /// missing).
    pub fn record_tags(&self, collection: Collection, id: &str) -> Option<Vec<String>> {
        read(&self.records)
            .ok()?
            .get(&(collection, id.to_string()))
            .cloned()
            .flatten()
    }

    /// Make every subsequent [`TagStore::set_record_tags`] for `id` fail.
    pub fn fail_updates_for(&self, id: &str) -> Result<()> {
        write(&self.failing_records)?.insert(id.to_string());
        Ok(())
    }

    /// Make every subsequent [`TagStore::records_with_tag`] on `collection`
    /// fail.
    pub fn fail_reads_for(&self, collection: Collection) -> Result<()> {
        write(&self.failing_collections)?.insert(collection);
        Ok(())
    }

    /// Make every subsequent [`TagStore::delete_tags`] fail.
    pub fn fail_tag_deletes(&self) {
        self.fail_deletes.store(true, Ordering::SeqCst);
    }

    pub fn tag_names(&self) -> Vec<String> {
        read(&self.tags)
            .map(|tags| tags.iter().map(|t| t.name.clone()).collect())
            .unwrap_or_default()
    }
}

#[async_trait]
impl TagStore for InMemoryStore {
    async fn find_tag_by_name(&self, name: &str) -> Result<Option<Tag>> {
        Ok(read(&self.tags)?.iter().find(|t| t.name == name).cloned())
    }

    async fn create_tag(&self, name: &str) -> Result<Tag> {
        let mut tags = write(&self.tags)?;
        if let Some(existing) = tags.iter().find(|t| t.name == name) {
            return Ok(existing.clone());
        }
        let tag = Tag {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.to_string(),
        };
        tags.push(tag.clone());
        Ok(tag)
    }

    async fn get_tags(&self, ids: &[String]) -> Result<Vec<Tag>> {
        Ok(read(&self.tags)?
            .iter()
            .filter(|t| ids.contains(&t.id))
            .cloned()
            .collect())
    }

    async fn delete_tags(&self, ids: &[String]) -> Result<u64> {
        if self.fail_deletes.load(Ordering::SeqCst) {
            bail!("simulated catalog delete failure");
        }
        let mut tags = write(&self.tags)?;
        let before = tags.len();
        tags.retain(|t| !ids.contains(&t.id));
        Ok((before - tags.len()) as u64)
    }

    async fn list_tags(&self) -> Result<Vec<TagSummary>> {
        let records = read(&self.records)?;
        let mut counts: HashMap<&str, i64> = HashMap::new();
        for tags in records.values().flatten() {
            for tag in tags {
                *counts.entry(tag.as_str()).or_default() += 1;
            }
        }
        let mut out: Vec<TagSummary> = read(&self.tags)?
            .iter()
            .map(|t| TagSummary {
                id: t.id.clone(),
                name: t.name.clone(),
                usage_count: counts.get(t.name.as_str()).copied().unwrap_or(0),
            })
            .collect();
        out.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(out)
    }

    async fn records_with_tag(
        &self,
        collection: Collection,
        name: &str,
    ) -> Result<Vec<TaggedRecord>> {
        if read(&self.failing_collections)?.contains(&collection) {
            bail!("simulated read failure for {}", collection);
        }
        Ok(read(&self.records)?
            .iter()
            .filter(|((c, _), _)| *c == collection)
            .filter_map(|((c, id), tags)| {
                let tags = tags.as_ref()?;
                tags.iter().any(|t| t == name).then(|| TaggedRecord {
                    id: id.clone(),
                    collection: *c,
                    tags: tags.clone(),
                })
            })
            .collect())
    }

    async fn set_record_tags(
        &self,
        collection: Collection,
        id: &str,
        tags: &[String],
    ) -> Result<()> {
        if read(&self.failing_records)?.contains(id) {
            bail!("simulated write failure for record {}", id);
        }
        let mut records = write(&self.records)?;
        match records.get_mut(&(collection, id.to_string())) {
            Some(slot) => {
                *slot = Some(tags.to_vec());
                Ok(())
            }
            None => bail!("{} record not found: {}", collection, id),
        }
    }
}
