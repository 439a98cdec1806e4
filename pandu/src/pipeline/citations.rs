//! Citation formatting: deduplicate sources and make sure the response
//! carries inline `[n]` markers or a sources footer.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::state::SourceRef;

static MARKER_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\[\d+\]").expect("marker regex"));

/// Deduplicates sources by `(title, url, doc_id)`, renumbering ids in
/// first-mention order.
pub fn dedup_sources(sources: &[SourceRef]) -> Vec<SourceRef> {
    let mut seen = std::collections::HashSet::new();
    let mut out = Vec::new();
    for source in sources {
        let key = (source.title.clone(), source.url.clone(), source.doc_id.clone());
        if seen.insert(key) {
            let mut s = source.clone();
            s.id = (out.len() + 1) as u32;
            out.push(s);
        }
    }
    out
}

/// Ensures cited output: when the response has no inline markers and
/// sources exist, try to insert `[n]` after the first mention of each
/// source's title; anything unmentioned lands in a sources footer.
pub fn format_citations(response: &str, sources: &[SourceRef]) -> (String, Vec<SourceRef>) {
    let sources = dedup_sources(sources);
    if sources.is_empty() || MARKER_RE.is_match(response) {
        return (response.to_string(), sources);
    }

    let mut out = response.to_string();
    let mut footer_entries = Vec::new();

    for source in &sources {
        let marker = format!("[{}]", source.id);
        let title = source.title.trim();
        let inserted = !title.is_empty()
            && title != "Document"
            && match out.find(title) {
                Some(pos) => {
                    let end = pos + title.len();
                    out.insert_str(end, &format!(" {marker}"));
                    true
                }
                None => false,
            };
        if !inserted {
            footer_entries.push(format!("{marker} {} ({})", source.title, source.collection));
        }
    }

    if !footer_entries.is_empty() {
        out.push_str("\n\nSources:\n");
        out.push_str(&footer_entries.join("\n"));
    }
    (out, sources)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source(id: u32, title: &str, collection: &str) -> SourceRef {
        SourceRef {
            id,
            title: title.to_string(),
            url: String::new(),
            score: 0.9,
            collection: collection.to_string(),
            doc_id: title.to_lowercase().replace(' ', "-"),
        }
    }

    #[test]
    fn dedup_renumbers_in_order() {
        let sources = vec![
            source(1, "Company Law", "legal_unified"),
            source(2, "Company Law", "legal_unified"),
            source(3, "Visa Guide", "visa_oracle"),
        ];
        let deduped = dedup_sources(&sources);
        assert_eq!(deduped.len(), 2);
        assert_eq!(deduped[0].id, 1);
        assert_eq!(deduped[1].id, 2);
        assert_eq!(deduped[1].title, "Visa Guide");
    }

    #[test]
    fn inserts_marker_after_title_mention() {
        let (out, _) = format_citations(
            "According to the Company Law, capital is 10B IDR.",
            &[source(1, "Company Law", "legal_unified")],
        );
        assert!(out.contains("Company Law [1]"));
        assert!(!out.contains("Sources:"));
    }

    #[test]
    fn unmentioned_sources_go_to_footer() {
        let (out, _) = format_citations(
            "Capital is 10B IDR.",
            &[source(1, "Company Law", "legal_unified")],
        );
        assert!(out.contains("Sources:\n[1] Company Law (legal_unified)"));
    }

    #[test]
    fn existing_markers_left_alone() {
        let original = "Capital is 10B IDR [1].";
        let (out, _) = format_citations(original, &[source(1, "Company Law", "legal_unified")]);
        assert_eq!(out, original);
    }
}
