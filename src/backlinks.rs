//! Note backlinks.
//!
//! A note links to another either explicitly, with a `[[Title]]` wiki
//! link, or implicitly by mentioning the title in its body. Both forms
//! match case-insensitively.

use anyhow::Result;
use regex::Regex;
use serde::Serialize;
use std::sync::OnceLock;

use crate::error::AtelierError;
use crate::models::Collection;
use crate::records::{get_record, list_records};
use crate::store::SqliteStore;

const SNIPPET_RADIUS: usize = 60;

/// A note that refers to the target note.
#[derive(Debug, Clone, Serialize)]
pub struct Backlink {
    pub id: String,
    pub title: String,
    /// `true` for a `[[wiki link]]`, `false` for a plain mention.
    pub explicit: bool,
    pub snippet: String,
}

fn wikilink_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\[\[([^\[\]\n]+?)\]\]").expect("valid wikilink regex"))
}

/// Targets of `[[...]]` links in `body`, trimmed, in order of first
/// appearance, without duplicates. `[[Title|alias]]` yields `Title`.
pub fn extract_wikilinks(body: &str) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for cap in wikilink_re().captures_iter(body) {
        let target = cap[1].split('|').next().unwrap_or_default().trim();
        if !target.is_empty() && !out.iter().any(|t| t == target) {
            out.push(target.to_string());
        }
    }
    out
}

/// Classify how `body` refers to `title`, if at all. Returns whether the
/// reference is explicit and the byte offset of the first match.
pub fn find_reference(body: &str, title: &str) -> Option<(bool, usize)> {
    let title = title.trim();
    if title.is_empty() {
        return None;
    }

    let explicit = wikilink_re().captures_iter(body).find_map(|cap| {
        let target = cap[1].split('|').next().unwrap_or_default().trim();
        let m = cap.get(0)?;
        (target.to_lowercase() == title.to_lowercase()).then_some(m.start())
    });
    if let Some(pos) = explicit {
        return Some((true, pos));
    }

    // Word boundaries only make sense next to word characters.
    let is_word = |c: Option<char>| c.is_some_and(|c| c.is_alphanumeric() || c == '_');
    let lead = if is_word(title.chars().next()) { r"\b" } else { "" };
    let trail = if is_word(title.chars().last()) { r"\b" } else { "" };
    let pattern = format!(r"(?i){}{}{}", lead, regex::escape(title), trail);
    let re = Regex::new(&pattern).ok()?;
    re.find(body).map(|m| (false, m.start()))
}

/// A window of text around byte offset `pos`, widened to char boundaries
/// and with whitespace collapsed.
pub fn snippet_around(body: &str, pos: usize) -> String {
    let mut start = pos.saturating_sub(SNIPPET_RADIUS);
    while start > 0 && !body.is_char_boundary(start) {
        start -= 1;
    }
    let mut end = (pos + SNIPPET_RADIUS).min(body.len());
    while end < body.len() && !body.is_char_boundary(end) {
        end += 1;
    }

    let mut snippet = body[start..end]
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");
    if start > 0 {
        snippet.insert_str(0, "…");
    }
    if end < body.len() {
        snippet.push('…');
    }
    snippet
}

/// Notes other than `note_id` that reference its title. Explicit links
/// are listed before plain mentions. Errors if the note does not exist.
pub async fn find_backlinks(store: &SqliteStore, note_id: &str) -> Result<Vec<Backlink>> {
    let target = get_record(store, Collection::Notes, note_id)
        .await?
        .ok_or_else(|| AtelierError::NotFound(format!("note not found: {}", note_id)))?;

    let mut links: Vec<Backlink> = list_records(store, Collection::Notes, None)
        .await?
        .into_iter()
        .filter(|note| note.id != target.id)
        .filter_map(|note| {
            let (explicit, pos) = find_reference(&note.body, &target.title)?;
            Some(Backlink {
                snippet: snippet_around(&note.body, pos),
                id: note.id,
                title: note.title,
                explicit,
            })
        })
        .collect();

    // Stable: keeps newest-first order inside each group.
    links.sort_by_key(|l| !l.explicit);
    Ok(links)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_unique_wikilinks_with_aliases() {
        let body = "See [[Transformers]] and [[ Attention | the paper ]], again [[Transformers]].";
        assert_eq!(extract_wikilinks(body), vec!["Transformers", "Attention"]);
    }

    #[test]
    fn explicit_link_beats_plain_mention() {
        let body = "transformers are neat. Also [[Transformers]].";
        let (explicit, pos) = find_reference(body, "Transformers").unwrap();
        assert!(explicit);
        assert_eq!(pos, body.find("[[").unwrap());
    }

    #[test]
    fn plain_mention_requires_word_boundary() {
        assert_eq!(find_reference("I like RUST a lot", "rust"), Some((false, 7)));
        assert!(find_reference("rusty nails", "rust").is_none());
        assert!(find_reference("anything", "   ").is_none());
    }

    #[test]
    fn titles_with_regex_metacharacters_are_escaped() {
        assert!(find_reference("notes on c++ (draft) today", "c++ (draft)").is_some());
    }

    #[test]
    fn snippet_respects_char_boundaries() {
        let body = format!("{}target{}", "é".repeat(80), "ü".repeat(80));
        let pos = body.find("target").unwrap();
        let snippet = snippet_around(&body, pos);
        assert!(snippet.contains("target"));
        assert!(snippet.starts_with('…') && snippet.ends_with('…'));
    }
}
