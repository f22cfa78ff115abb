//! RSS 2.0 and Atom feed normalization.
//!
//! [`parse_feed`] reads either format with `quick-xml` and returns a flat
//! list of [`FeedItem`]s with the same shape regardless of source:
//!
//! | Field | RSS | Atom |
//! |-------|-----|------|
//! | `id` | `guid` | `id` |
//! | `title` | `title` | `title` |
//! | `link` | `link` text | `link@href` (`rel="alternate"` preferred) |
//! | `summary` | `description`, `content:encoded` | `summary`, `content` |
//! | `authors` | `author`, `dc:creator` | `author/name` |
//! | `published` | `pubDate`, `dc:date` | `published`, `updated` |
//!
//! Titles and summaries have HTML tags removed and whitespace collapsed.
//! Summaries are cut to [`SUMMARY_MAX_CHARS`]. `id` falls back to the link
//! when the feed provides none. Items with neither title nor link are
//! dropped.

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use quick_xml::events::{BytesStart, Event};
use regex::Regex;
use serde::Serialize;
use std::sync::OnceLock;
use std::time::Duration;

use crate::config::FeedsConfig;

pub const SUMMARY_MAX_CHARS: usize = 500;

/// One normalized feed entry.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeedItem {
    pub id: String,
    pub title: String,
    pub link: String,
    pub summary: String,
    pub authors: Vec<String>,
    pub published: Option<DateTime<Utc>>,
}

#[derive(Default)]
struct ItemBuilder {
    title: String,
    link_text: String,
    link_href: Option<String>,
    alternate_href: Option<String>,
    guid: String,
    description: String,
    summary: String,
    content: String,
    author_buf: String,
    authors: Vec<String>,
    published: String,
    updated: String,
}

impl ItemBuilder {
    fn take_link_attrs(&mut self, e: &BytesStart<'_>) {
        let mut href = None;
        let mut rel = None;
        for attr in e.attributes().flatten() {
            let value = attr
                .unescape_value()
                .map(|v| v.into_owned())
                .unwrap_or_else(|_| String::from_utf8_lossy(&attr.value).into_owned());
            match attr.key.local_name().as_ref() {
                b"href" => href = Some(value),
                b"rel" => rel = Some(value),
                _ => {}
            }
        }
        let Some(href) = href else { return };
        match rel.as_deref() {
            None | Some("alternate") => {
                if self.alternate_href.is_none() {
                    self.alternate_href = Some(href);
                }
            }
            Some(_) => {
                if self.link_href.is_none() {
                    self.link_href = Some(href);
                }
            }
        }
    }

    fn push_text(&mut self, path: &[String], text: &str) {
        let Some(leaf) = path.last() else { return };
        let parent = path.len().checked_sub(2).map(|i| path[i].as_str());
        let top_level = path.len() == 2;

        match leaf.as_str() {
            "title" if top_level => self.title.push_str(text),
            "link" if top_level => self.link_text.push_str(text),
            "guid" | "id" if top_level => self.guid.push_str(text),
            "description" if top_level => self.description.push_str(text),
            "summary" if top_level => self.summary.push_str(text),
            "content" | "encoded" if top_level => self.content.push_str(text),
            "author" | "creator" if top_level => self.author_buf.push_str(text),
            "name" if parent == Some("author") => self.author_buf.push_str(text),
            "pubDate" | "published" | "date" if top_level => self.published.push_str(text),
            "updated" if top_level => self.updated.push_str(text),
            _ => {}
        }
    }

    fn end_element(&mut self, path: &[String]) {
        if path.len() == 2 && matches!(path[1].as_str(), "author" | "creator") {
            let name = collapse_whitespace(&self.author_buf);
            if !name.is_empty() && !self.authors.contains(&name) {
                self.authors.push(name);
            }
            self.author_buf.clear();
        }
    }

    fn finish(self) -> Option<FeedItem> {
        let title = clean_text(&self.title);
        // alternate href, then RSS <link> text, then any other href
        let link_text = self.link_text.trim().to_string();
        let link = self
            .alternate_href
            .or_else(|| (!link_text.is_empty()).then_some(link_text))
            .or(self.link_href)
            .unwrap_or_default();
        if title.is_empty() && link.is_empty() {
            return None;
        }

        let guid = self.guid.trim().to_string();
        let id = if guid.is_empty() { link.clone() } else { guid };

        let summary_src = [&self.description, &self.summary, &self.content]
            .into_iter()
            .find(|s| !s.trim().is_empty())
            .map(|s| s.as_str())
            .unwrap_or_default();

        let published = parse_date(&self.published).or_else(|| parse_date(&self.updated));

        Some(FeedItem {
            id,
            title,
            link,
            summary: truncate_chars(&clean_text(summary_src), SUMMARY_MAX_CHARS),
            authors: self.authors,
            published,
        })
    }
}

fn is_item(name: &str) -> bool {
    name == "item" || name == "entry"
}

fn local_name(e: &BytesStart<'_>) -> String {
    String::from_utf8_lossy(e.local_name().as_ref()).into_owned()
}

/// Parse an RSS 2.0 or Atom document into normalized items, in document
/// order.
pub fn parse_feed(xml: &str) -> Result<Vec<FeedItem>> {
    let mut reader = quick_xml::Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut items = Vec::new();
    let mut current: Option<ItemBuilder> = None;
    // Element names from the enclosing item/entry down to the current node.
    let mut path: Vec<String> = Vec::new();
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                let name = local_name(&e);
                if current.is_none() && is_item(&name) {
                    current = Some(ItemBuilder::default());
                    path.clear();
                }
                if let Some(item) = current.as_mut() {
                    path.push(name);
                    if path.len() == 2 && path[1] == "link" {
                        item.take_link_attrs(&e);
                    }
                }
            }
            Ok(Event::Empty(e)) => {
                if let Some(item) = current.as_mut() {
                    if path.len() == 1 && e.local_name().as_ref() == b"link" {
                        item.take_link_attrs(&e);
                    }
                }
            }
            Ok(Event::Text(te)) => {
                if let Some(item) = current.as_mut() {
                    let text = te
                        .unescape()
                        .map(|t| t.into_owned())
                        .unwrap_or_else(|_| String::from_utf8_lossy(&te).into_owned());
                    item.push_text(&path, &text);
                }
            }
            Ok(Event::CData(cd)) => {
                if let Some(item) = current.as_mut() {
                    item.push_text(&path, &String::from_utf8_lossy(&cd));
                }
            }
            Ok(Event::End(_)) => {
                if let Some(item) = current.as_mut() {
                    item.end_element(&path);
                    path.pop();
                    if path.is_empty() {
                        if let Some(done) = current.take().and_then(ItemBuilder::finish) {
                            items.push(done);
                        }
                    }
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(e).with_context(|| {
                    format!("malformed feed XML at byte {}", reader.buffer_position())
                })
            }
            _ => {}
        }
        buf.clear();
    }

    Ok(items)
}

/// Download and parse a feed.
pub async fn fetch_feed(client: &reqwest::Client, url: &str) -> Result<Vec<FeedItem>> {
    let body = client
        .get(url)
        .header("Accept", "application/rss+xml, application/atom+xml, text/xml;q=0.9")
        .send()
        .await?
        .error_for_status()?
        .text()
        .await?;
    parse_feed(&body).with_context(|| format!("failed to parse feed: {}", url))
}

/// CLI entry point: parse a feed from a local file or an http(s) URL and
/// print its items.
pub async fn run_feed(config: &FeedsConfig, source: &str) -> Result<()> {
    let items = if source.starts_with("http://") || source.starts_with("https://") {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        fetch_feed(&client, source).await?
    } else {
        let xml = std::fs::read_to_string(source)
            .with_context(|| format!("Failed to read feed file: {}", source))?;
        parse_feed(&xml)?
    };

    println!("{} items", items.len());
    for item in &items {
        let date = item
            .published
            .map(|d| d.format("%Y-%m-%d").to_string())
            .unwrap_or_else(|| "----------".to_string());
        println!("{}  {}", date, item.title);
        println!("            {}", item.link);
    }
    Ok(())
}

/// Parse an RFC 2822 (RSS), RFC 3339 (Atom) or bare `YYYY-MM-DD` date.
pub fn parse_date(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    DateTime::parse_from_rfc2822(raw)
        .or_else(|_| DateTime::parse_from_rfc3339(raw))
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
                .map(|dt| dt.and_utc())
        })
}

fn tag_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"<[^>]*>").expect("valid html tag regex"))
}

/// Remove HTML tags, decode the handful of entities that survive XML
/// unescaping, and collapse whitespace.
pub fn clean_text(raw: &str) -> String {
    let stripped = tag_re().replace_all(raw, " ");
    let decoded = stripped
        .replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&");
    collapse_whitespace(&decoded)
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn truncate_chars(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let mut out: String = s.chars().take(max).collect();
    out.push('…');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const RSS: &str = r#"<?xml version="1.0"?>
<rss version="2.0" xmlns:dc="http://purl.org/dc/elements/1.1/">
  <channel>
    <title>arXiv cs.LG</title>
    <link>https://arxiv.org</link>
    <item>
      <title>Sparse   Attention
        Revisited</title>
      <link>https://arxiv.org/abs/2401.01234</link>
      <description>&lt;p&gt;We study &lt;b&gt;sparse&lt;/b&gt; attention.&lt;/p&gt;</description>
      <dc:creator>Ada Lovelace</dc:creator>
      <pubDate>Mon, 08 Jan 2024 05:00:00 GMT</pubDate>
    </item>
    <item>
      <title><![CDATA[Graphs & <Things>]]></title>
      <guid>urn:paper:2</guid>
      <link>https://example.org/2</link>
    </item>
  </channel>
</rss>"#;

    const ATOM: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <title>Papers</title>
  <entry>
    <id>tag:example.org,2024:1</id>
    <title type="html">Diffusion &amp;amp; Friends</title>
    <link rel="related" href="https://example.org/related"/>
    <link rel="alternate" href="https://example.org/papers/1"/>
    <author><name>Grace Hopper</name></author>
    <author><name>Alan Turing</name></author>
    <updated>2024-02-01T10:00:00Z</updated>
    <summary>Short summary.</summary>
  </entry>
</feed>"#;

    #[test]
    fn parses_rss_items() {
        let items = parse_feed(RSS).unwrap();
        assert_eq!(items.len(), 2);

        let first = &items[0];
        assert_eq!(first.title, "Sparse Attention Revisited");
        assert_eq!(first.link, "https://arxiv.org/abs/2401.01234");
        assert_eq!(first.id, first.link);
        assert_eq!(first.summary, "We study sparse attention.");
        assert_eq!(first.authors, vec!["Ada Lovelace"]);
        assert_eq!(
            first.published.unwrap().to_rfc3339(),
            "2024-01-08T05:00:00+00:00"
        );

        let second = &items[1];
        // CDATA is taken literally, then markup-looking runs are stripped.
        assert_eq!(second.title, "Graphs &");
        assert_eq!(second.id, "urn:paper:2");
        assert!(second.published.is_none());
    }

    #[test]
    fn parses_atom_entries() {
        let items = parse_feed(ATOM).unwrap();
        assert_eq!(items.len(), 1);
        let entry = &items[0];
        assert_eq!(entry.id, "tag:example.org,2024:1");
        assert_eq!(entry.title, "Diffusion & Friends");
        assert_eq!(entry.link, "https://example.org/papers/1");
        assert_eq!(entry.authors, vec!["Grace Hopper", "Alan Turing"]);
        assert_eq!(entry.summary, "Short summary.");
        assert!(entry.published.is_some());
    }

    #[test]
    fn rss_link_text_beats_related_atom_link() {
        let xml = r#"<rss version="2.0" xmlns:atom="http://www.w3.org/2005/Atom">
  <channel>
    <item>
      <title>Mixed</title>
      <link>https://a.example/paper</link>
      <atom:link rel="related" href="https://b.example/other"/>
    </item>
    <item>
      <title>Related only</title>
      <atom:link rel="related" href="https://b.example/only"/>
    </item>
  </channel>
</rss>"#;
        let items = parse_feed(xml).unwrap();
        assert_eq!(items[0].link, "https://a.example/paper");
        assert_eq!(items[1].link, "https://b.example/only");
    }

    #[test]
    fn channel_fields_are_not_items() {
        let items = parse_feed(RSS).unwrap();
        assert!(items.iter().all(|i| i.title != "arXiv cs.LG"));
    }

    #[test]
    fn malformed_xml_is_an_error() {
        assert!(parse_feed("<rss><channel><item><title>x</item></rss>").is_err());
    }

    #[test]
    fn summary_is_truncated() {
        let long = "word ".repeat(200);
        let xml = format!(
            "<rss><channel><item><title>t</title><description>{}</description></item></channel></rss>",
            long
        );
        let items = parse_feed(&xml).unwrap();
        assert_eq!(items[0].summary.chars().count(), SUMMARY_MAX_CHARS + 1);
        assert!(items[0].summary.ends_with('…'));
    }

    #[test]
    fn date_formats() {
        assert!(parse_date("Tue, 09 Jan 2024 12:30:00 +0100").is_some());
        assert!(parse_date("2024-01-09T12:30:00Z").is_some());
        assert!(parse_date("2024-01-09").is_some());
        assert!(parse_date("last tuesday").is_none());
    }
}
