//! Trending papers across several feeds.
//!
//! The same paper often shows up in more than one feed (an arXiv listing,
//! an aggregator, a lab blog). Items are grouped by arXiv id when one can
//! be found in the link or id, otherwise by a normalized title. Each group
//! keeps its first-seen item and counts how many times it appeared; more
//! mentions rank higher.

use anyhow::Result;
use regex::Regex;
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::OnceLock;
use std::time::Duration;
use tracing::{info, warn};

use crate::config::FeedsConfig;
use crate::feed::{fetch_feed, FeedItem};

/// A de-duplicated paper with its mention count.
#[derive(Debug, Clone, Serialize)]
pub struct TrendingPaper {
    #[serde(flatten)]
    pub item: FeedItem,
    pub arxiv_id: Option<String>,
    pub mentions: usize,
}

fn arxiv_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)arxiv(?:\.org/(?:abs|pdf)/|:)(\d{4}\.\d{4,5})(?:v\d+)?")
            .expect("valid arxiv id regex")
    })
}

/// New-style arXiv identifier (`YYMM.NNNNN`) from a link or id, with any
/// version suffix dropped.
pub fn arxiv_id(item: &FeedItem) -> Option<String> {
    [&item.link, &item.id]
        .into_iter()
        .find_map(|s| arxiv_re().captures(s).map(|c| c[1].to_string()))
}

/// Lowercase alphanumerics only, so punctuation and spacing differences
/// between feeds do not split a paper into two entries.
pub fn normalize_title(title: &str) -> String {
    title
        .chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_lowercase)
        .collect()
}

fn dedup_key(item: &FeedItem, arxiv: Option<&str>) -> String {
    match arxiv {
        Some(id) => format!("arxiv:{}", id),
        None => {
            let title = normalize_title(&item.title);
            if title.is_empty() {
                format!("link:{}", item.link)
            } else {
                format!("title:{}", title)
            }
        }
    }
}

/// De-duplicate and rank. Order: mentions descending, then published
/// date descending (undated last), then title.
pub fn rank_trending(items: Vec<FeedItem>, limit: usize) -> Vec<TrendingPaper> {
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut papers: Vec<TrendingPaper> = Vec::new();

    for item in items {
        let arxiv = arxiv_id(&item);
        let key = dedup_key(&item, arxiv.as_deref());
        match index.get(&key) {
            Some(&i) => {
                let paper = &mut papers[i];
                paper.mentions += 1;
                if paper.item.published.is_none() {
                    paper.item.published = item.published;
                }
            }
            None => {
                index.insert(key, papers.len());
                papers.push(TrendingPaper {
                    item,
                    arxiv_id: arxiv,
                    mentions: 1,
                });
            }
        }
    }

    papers.sort_by(|a, b| {
        b.mentions
            .cmp(&a.mentions)
            .then_with(|| match (a.item.published, b.item.published) {
                (Some(x), Some(y)) => y.cmp(&x),
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (None, None) => Ordering::Equal,
            })
            .then_with(|| a.item.title.cmp(&b.item.title))
    });
    papers.truncate(limit);
    papers
}

/// Fetch every configured feed and rank the union. A feed that fails to
/// download or parse is logged and skipped.
pub async fn collect_trending(config: &FeedsConfig, limit: usize) -> Result<Vec<TrendingPaper>> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.timeout_secs))
        .build()?;

    let mut items = Vec::new();
    for url in &config.trending {
        match fetch_feed(&client, url).await {
            Ok(mut feed_items) => {
                info!(url = %url, count = feed_items.len(), "fetched feed");
                items.append(&mut feed_items);
            }
            Err(e) => warn!(url = %url, error = %e, "skipping feed"),
        }
    }

    Ok(rank_trending(items, limit))
}

/// CLI entry point.
pub async fn run_trending(config: &FeedsConfig, limit: usize) -> Result<()> {
    if config.trending.is_empty() {
        println!("No trending feeds configured. Add [feeds] trending = [...] to the config.");
        return Ok(());
    }

    let papers = collect_trending(config, limit).await?;
    for (rank, paper) in papers.iter().enumerate() {
        let id = paper.arxiv_id.as_deref().unwrap_or("-");
        println!(
            "{:>3}. [{}x] {:<12} {}",
            rank + 1,
            paper.mentions,
            id,
            paper.item.title
        );
    }
    Ok(())
}
