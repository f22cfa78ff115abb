//! Tag storage abstraction.
//!
//! Records keep their tags as embedded name lists, so every change to
//! those lists goes through the [`TagStore`] trait. The merge routine and
//! the HTTP handlers only ever talk to this interface, which keeps the
//! rewrite rules in one place instead of spread across call sites.
//!
//! Two implementations exist:
//! - [`SqliteStore`]: the production backend over a `sqlx` pool.
//! - [`InMemoryStore`]: `BTreeMap`-backed, used by tests; supports
//!   injected write failures.

pub mod memory;
pub mod sqlite;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{Collection, Tag, TagSummary, TaggedRecord};

pub use memory::InMemoryStore;
pub use sqlite::SqliteStore;

/// Storage operations over the tag catalog and the tag lists embedded in
/// taggable records.
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`find_tag_by_name`](TagStore::find_tag_by_name) | Exact-name catalog lookup |
/// | [`create_tag`](TagStore::create_tag) | Insert a catalog row (idempotent by name) |
/// | [`get_tags`](TagStore::get_tags) | Load catalog rows by id |
/// | [`delete_tags`](TagStore::delete_tags) | Remove catalog rows by id |
/// | [`list_tags`](TagStore::list_tags) | Catalog with usage counts |
/// | [`records_with_tag`](TagStore::records_with_tag) | Records in a collection carrying a name |
/// | [`set_record_tags`](TagStore::set_record_tags) | Overwrite one record's tag list |
#[async_trait]
pub trait TagStore: Send + Sync {
    /// Look up a catalog row whose name equals `name` exactly.
    async fn find_tag_by_name(&self, name: &str) -> Result<Option<Tag>>;

    /// Insert a catalog row for `name`, or return the existing one.
    async fn create_tag(&self, name: &str) -> Result<Tag>;

    /// Load catalog rows for the given ids. Unknown ids are omitted.
    async fn get_tags(&self, ids: &[String]) -> Result<Vec<Tag>>;

    /// Delete catalog rows by id, returning how many were removed.
    async fn delete_tags(&self, ids: &[String]) -> Result<u64>;

    /// Every catalog row with the number of records referencing it,
    /// ordered by name.
    async fn list_tags(&self) -> Result<Vec<TagSummary>>;

    /// Records in `collection` whose tag list contains `name` exactly.
    /// Records with a missing tag list never match.
    async fn records_with_tag(&self, collection: Collection, name: &str)
        -> Result<Vec<TaggedRecord>>;

    /// Replace the tag list of one record.
    async fn set_record_tags(&self, collection: Collection, id: &str, tags: &[String])
        -> Result<()>;
}
