use chrono::{DateTime, NaiveDate, NaiveTime, TimeZone, Utc};
use regex::Regex;
use std::sync::OnceLock;
use tracing::warn;

/// The fields of a feed entry this crate cares about, lifted out of the
/// feed-rs model so the extraction chains work over plain optionals.
#[derive(Debug, Clone, Default)]
pub struct EntryFields {
    pub id: Option<String>,
    pub link: Option<String>,
    pub title: Option<String>,
    pub summary: Option<String>,
    pub description: Option<String>,
    pub content: Option<String>,
    pub published: Option<DateTime<Utc>>,
    pub updated: Option<DateTime<Utc>>,
    pub published_raw: Option<String>,
    pub updated_raw: Option<String>,
}

impl EntryFields {
    pub fn from_feed(entry: feed_rs::model::Entry) -> Self {
        let id = if entry.id.is_empty() {
            None
        } else {
            Some(entry.id)
        };
        Self {
            id,
            link: entry.links.first().map(|l| l.href.clone()),
            title: entry.title.map(|t| t.content),
            summary: entry.summary.map(|s| s.content),
            description: entry
                .media
                .first()
                .and_then(|m| m.description.clone())
                .map(|t| t.content),
            content: entry.content.and_then(|c| c.body),
            published: entry.published.map(|dt| dt.with_timezone(&Utc)),
            updated: entry.updated.map(|dt| dt.with_timezone(&Utc)),
            published_raw: None,
            updated_raw: None,
        }
    }

    fn title_or_unknown(&self) -> &str {
        self.title.as_deref().unwrap_or("Unknown")
    }
}

fn doi_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"10\.\d{4,9}/[-\w.]+[-\w.:/]+[-\w.]+").expect("DOI regex")
    })
}

fn article_link_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"/articles/(10\.\d{4,9}/[^\s"'<>?#]+)"#).expect("article link regex")
    })
}

fn inline_doi_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?i)doi:\s*(10\.\d{4,9}/[^\s"'<>]+)"#).expect("inline DOI regex")
    })
}

fn strip_trailing_punctuation(doi: &str) -> &str {
    doi.trim_end_matches(['.', ',', ';', ')'])
}

/// Strip a resolver (`.../doi.org/`) or article-path (`.../articles/`)
/// prefix, keeping everything after it.
fn strip_known_prefix(value: &str) -> Option<String> {
    for marker in ["doi.org/", "/articles/"] {
        if let Some(pos) = value.find(marker) {
            let tail = value[pos + marker.len()..].trim();
            if !tail.is_empty() {
                return Some(strip_trailing_punctuation(tail).to_string());
            }
        }
    }
    None
}

/// Scan the embedded rich-content block for an article permalink, then
/// for an inline `doi:` annotation.
fn identifier_from_content(content: &str) -> Option<String> {
    if let Some(caps) = article_link_re().captures(content) {
        return Some(strip_trailing_punctuation(&caps[1]).to_string());
    }
    inline_doi_re()
        .captures(content)
        .map(|caps| strip_trailing_punctuation(&caps[1]).to_string())
}

/// Last-resort scan of every text-bearing field for anything DOI-shaped.
fn identifier_from_scan(fields: &EntryFields) -> Option<String> {
    for text in [&fields.id, &fields.link, &fields.summary]
        .into_iter()
        .flatten()
    {
        if let Some(m) = doi_re().find(text) {
            return Some(strip_trailing_punctuation(m.as_str()).to_string());
        }
    }
    None
}

fn canonicalize(doi: String) -> String {
    if doi.starts_with("10.") {
        doi
    } else {
        format!("10.{doi}")
    }
}

/// Extract the persistent identifier for an entry, walking a fixed
/// fallback chain: rich-content block, unique-id field, link field,
/// generic pattern scan, placeholder. Never fails; the placeholder is
/// unique only at second granularity, which is acceptable for feeds
/// that carry no identifier at all.
pub fn extract_identifier(fields: &EntryFields) -> String {
    if let Some(content) = &fields.content {
        if let Some(doi) = identifier_from_content(content) {
            return canonicalize(doi);
        }
    }
    if let Some(id) = &fields.id {
        if let Some(doi) = strip_known_prefix(id) {
            return canonicalize(doi);
        }
    }
    if let Some(link) = &fields.link {
        if let Some(doi) = strip_known_prefix(link) {
            return canonicalize(doi);
        }
    }
    if let Some(doi) = identifier_from_scan(fields) {
        return canonicalize(doi);
    }
    warn!(
        "no identifier found for entry: {}",
        fields.title_or_unknown()
    );
    format!("10.placeholder-{}", Utc::now().format("%Y%m%d%H%M%S"))
}

fn parse_date_string(value: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%z") {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        return Some(Utc.from_utc_datetime(&date.and_time(NaiveTime::MIN)));
    }
    None
}

/// Extract the publication timestamp: structured date fields in priority
/// order, then string fields against the two accepted formats, then the
/// current time with a warning. Every candidate ends up with a date.
pub fn extract_date(fields: &EntryFields) -> DateTime<Utc> {
    if let Some(dt) = fields.published.or(fields.updated) {
        return dt;
    }
    for raw in [&fields.published_raw, &fields.updated_raw]
        .into_iter()
        .flatten()
    {
        if let Some(dt) = parse_date_string(raw) {
            return dt;
        }
    }
    warn!("no date found for entry: {}", fields.title_or_unknown());
    Utc::now()
}

/// Pull the abstract out of the rich-content block. Journal feeds embed
/// it as the paragraph following the title anchor, so take the text
/// between the closing `</a></p>` marker and the next `</p>`.
fn abstract_from_content(content: &str) -> Option<String> {
    let pos = content.find("</a></p>")?;
    let rest = &content[pos + "</a></p>".len()..];
    let end = rest.find("</p>")?;
    let text = rest[..end].trim();
    let text = text.strip_prefix("<p>").unwrap_or(text).trim();
    if text.is_empty() {
        None
    } else {
        Some(text.to_string())
    }
}

/// Extract the abstract: rich-content block, then summary, then
/// description, else empty.
pub fn extract_abstract(fields: &EntryFields) -> String {
    if let Some(content) = &fields.content {
        if let Some(text) = abstract_from_content(content) {
            return text;
        }
    }
    if let Some(summary) = &fields.summary {
        if !summary.trim().is_empty() {
            return summary.trim().to_string();
        }
    }
    if let Some(description) = &fields.description {
        if !description.trim().is_empty() {
            return description.trim().to_string();
        }
    }
    String::new()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Datelike;

    fn fields() -> EntryFields {
        EntryFields::default()
    }

    #[test]
    fn identifier_from_content_permalink() {
        let f = EntryFields {
            content: Some(
                r#"<p><a href="https://www.nature.com/articles/10.1038/s41586-024-07000-1">Read</a></p>"#
                    .to_string(),
            ),
            ..fields()
        };
        assert_eq!(extract_identifier(&f), "10.1038/s41586-024-07000-1");
    }

    #[test]
    fn identifier_from_content_inline_doi() {
        let f = EntryFields {
            content: Some("New results (doi:10.1038/nbt.1234) are in.".to_string()),
            ..fields()
        };
        assert_eq!(extract_identifier(&f), "10.1038/nbt.1234");
    }

    #[test]
    fn identifier_from_id_resolver_prefix() {
        let f = EntryFields {
            id: Some("https://doi.org/10.1234/test".to_string()),
            ..fields()
        };
        assert_eq!(extract_identifier(&f), "10.1234/test");
    }

    #[test]
    fn identifier_from_link_article_prefix() {
        let f = EntryFields {
            link: Some("https://nature.com/articles/10.1038/s41586-024-00001-1".to_string()),
            ..fields()
        };
        assert_eq!(extract_identifier(&f), "10.1038/s41586-024-00001-1");
    }

    #[test]
    fn identifier_from_generic_scan() {
        let f = EntryFields {
            summary: Some("This paper (DOI 10.1038/nbt.1234) presents results.".to_string()),
            ..fields()
        };
        assert_eq!(extract_identifier(&f), "10.1038/nbt.1234");
    }

    #[test]
    fn identifier_scan_strips_trailing_punctuation() {
        let f = EntryFields {
            summary: Some("See 10.1038/s41586-024-00001-1).".to_string()),
            ..fields()
        };
        assert_eq!(extract_identifier(&f), "10.1038/s41586-024-00001-1");
    }

    #[test]
    fn identifier_placeholder_fallback() {
        let f = EntryFields {
            id: Some("https://example.com/article".to_string()),
            ..fields()
        };
        assert!(extract_identifier(&f).starts_with("10.placeholder-"));
    }

    #[test]
    fn identifier_canonicalizes_missing_registrant_prefix() {
        assert_eq!(canonicalize("1234/test".to_string()), "10.1234/test");
        assert_eq!(canonicalize("10.1234/test".to_string()), "10.1234/test");
    }

    #[test]
    fn identifier_same_entry_same_result() {
        let f = EntryFields {
            id: Some("https://doi.org/10.1038/nature12345".to_string()),
            ..fields()
        };
        assert_eq!(extract_identifier(&f), extract_identifier(&f));
    }

    #[test]
    fn date_from_structured_field() {
        let published = Utc.with_ymd_and_hms(2024, 3, 15, 12, 0, 0).unwrap();
        let f = EntryFields {
            published: Some(published),
            ..fields()
        };
        assert_eq!(extract_date(&f), published);
    }

    #[test]
    fn date_from_iso_string_with_offset() {
        let f = EntryFields {
            published_raw: Some("2024-03-15T12:00:00+02:00".to_string()),
            ..fields()
        };
        let dt = extract_date(&f);
        assert_eq!(dt.date_naive(), NaiveDate::from_ymd_opt(2024, 3, 15).unwrap());
        assert_eq!(dt.with_timezone(&Utc).format("%H").to_string(), "10");
    }

    #[test]
    fn date_from_plain_date_string() {
        let f = EntryFields {
            updated_raw: Some("2024-03-15".to_string()),
            ..fields()
        };
        assert_eq!(
            extract_date(&f).date_naive(),
            NaiveDate::from_ymd_opt(2024, 3, 15).unwrap()
        );
    }

    #[test]
    fn date_falls_back_to_now() {
        let f = EntryFields {
            published_raw: Some("not a date".to_string()),
            ..fields()
        };
        assert_eq!(extract_date(&f).year(), Utc::now().year());
    }

    #[test]
    fn abstract_from_rich_content_block() {
        let f = EntryFields {
            content: Some(
                r#"<p><a href="https://nature.com/articles/x">Title</a></p><p>The abstract text.</p>"#
                    .to_string(),
            ),
            ..fields()
        };
        assert_eq!(extract_abstract(&f), "The abstract text.");
    }

    #[test]
    fn abstract_prefers_summary_when_content_has_no_block() {
        let f = EntryFields {
            content: Some("plain text, no markers".to_string()),
            summary: Some("A summary.".to_string()),
            description: Some("A description.".to_string()),
            ..fields()
        };
        assert_eq!(extract_abstract(&f), "A summary.");
    }

    #[test]
    fn abstract_falls_back_to_description_then_empty() {
        let f = EntryFields {
            description: Some("A description.".to_string()),
            ..fields()
        };
        assert_eq!(extract_abstract(&f), "A description.");
        assert_eq!(extract_abstract(&fields()), "");
    }
}
