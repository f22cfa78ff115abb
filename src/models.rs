//! Core data models shared by the store, HTTP server and CLI.
//!
//! Records in every collection carry their tags as an embedded list of
//! names. Nothing ties those names to rows in the tag catalog: a name may
//! appear on records without a catalog row, and a catalog row may have
//! zero references.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A taggable record collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Collection {
    Tasks,
    Papers,
    Notes,
    Journal,
}

impl Collection {
    pub const ALL: [Collection; 4] = [
        Collection::Tasks,
        Collection::Papers,
        Collection::Notes,
        Collection::Journal,
    ];

    /// SQLite table backing this collection.
    pub fn table(self) -> &'static str {
        match self {
            Collection::Tasks => "tasks",
            Collection::Papers => "papers",
            Collection::Notes => "notes",
            Collection::Journal => "journal_entries",
        }
    }

    /// Name used in URLs and CLI output.
    pub fn as_str(self) -> &'static str {
        match self {
            Collection::Tasks => "tasks",
            Collection::Papers => "papers",
            Collection::Notes => "notes",
            Collection::Journal => "journal",
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Collection {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "tasks" => Ok(Collection::Tasks),
            "papers" => Ok(Collection::Papers),
            "notes" => Ok(Collection::Notes),
            "journal" => Ok(Collection::Journal),
            other => anyhow::bail!(
                "unknown collection: '{}'. Must be tasks, papers, notes, or journal.",
                other
            ),
        }
    }
}

/// A row in the tag catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Tag {
    pub id: String,
    pub name: String,
}

/// A catalog row together with how many records reference it.
#[derive(Debug, Clone, Serialize)]
pub struct TagSummary {
    pub id: String,
    pub name: String,
    pub usage_count: i64,
}

/// The tag-bearing view of a record, as the merge routine sees it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaggedRecord {
    pub id: String,
    pub collection: Collection,
    pub tags: Vec<String>,
}

/// A full record from any collection.
#[derive(Debug, Clone, Serialize)]
pub struct Record {
    pub id: String,
    pub collection: Collection,
    pub title: String,
    pub body: String,
    pub tags: Vec<String>,
    /// Collection-specific fields (task status, paper authors, journal
    /// mood and so on), stored as JSON.
    pub metadata: serde_json::Value,
    pub created_at: String,
    pub updated_at: String,
}

/// Input for creating a record.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewRecord {
    pub title: String,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
}

/// Partial update; absent fields are left unchanged.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RecordPatch {
    pub title: Option<String>,
    pub body: Option<String>,
    pub tags: Option<Vec<String>>,
    pub metadata: Option<serde_json::Value>,
}

/// Trim names, drop empties, and remove duplicates keeping first
/// occurrence order.
pub fn normalize_tags<I, S>(tags: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut out: Vec<String> = Vec::new();
    for tag in tags {
        let tag = tag.as_ref().trim();
        if !tag.is_empty() && !out.iter().any(|t| t == tag) {
            out.push(tag.to_string());
        }
    }
    out
}

pub(crate) fn format_ts_iso(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%dT%H:%M:%SZ").to_string())
        .unwrap_or_else(|| ts.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collection_round_trips_through_names() {
        for c in Collection::ALL {
            assert_eq!(c.as_str().parse::<Collection>().unwrap(), c);
        }
        assert!("journal_entries".parse::<Collection>().is_err());
    }

    #[test]
    fn normalize_tags_trims_and_dedups() {
        let tags = normalize_tags([" ml ", "nlp", "", "ml", "NLP"]);
        assert_eq!(tags, vec!["ml", "nlp", "NLP"]);
    }
}
