//! Heuristic entity extraction: visa codes, nationalities, budgets.
//! Intentionally cheap: no model calls on the hot path.

use std::collections::BTreeMap;

use once_cell::sync::Lazy;
use regex::Regex;

static VISA_CODE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(e\d{2}[a-z]?)\b").expect("visa code regex"));

static BUDGET_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?P<cur>\$|usd|idr|rp|€)\s*(?P<num>\d{1,3}(?:[.,]\d{3})*(?:[.,]\d+)?|\d+)\s*(?P<unit>k|m|million|billion|juta|miliar)?")
        .expect("budget regex")
});

const NATIONALITY_MAP: &[(&str, &str)] = &[
    ("italy", "Italy"),
    ("italian", "Italy"),
    ("italiano", "Italy"),
    ("italiana", "Italy"),
    ("ukraine", "Ukraine"),
    ("ukrainian", "Ukraine"),
    ("ucraina", "Ukraine"),
    ("russia", "Russia"),
    ("russian", "Russia"),
    ("russo", "Russia"),
    ("usa", "USA"),
    ("american", "USA"),
    ("german", "Germany"),
    ("germany", "Germany"),
    ("french", "France"),
    ("france", "France"),
    ("australian", "Australia"),
    ("british", "United Kingdom"),
];

/// Extracted entities as a flat string map (stable key order).
pub type Entities = BTreeMap<String, String>;

/// Extracts visa type, nationality and budget mentions from a query.
pub fn extract_entities(query: &str) -> Entities {
    let mut entities = Entities::new();
    if query.is_empty() {
        return entities;
    }
    let q = query.to_lowercase();

    let visa_type = if let Some(caps) = VISA_CODE_RE.captures(&q) {
        Some(caps[1].to_uppercase())
    } else if q.contains("kitas") {
        Some("KITAS".to_string())
    } else if q.contains("kitap") {
        Some("KITAP".to_string())
    } else if q.contains("voa") || q.contains("visa on arrival") {
        Some("VOA".to_string())
    } else {
        None
    };
    if let Some(v) = visa_type {
        entities.insert("visa_type".to_string(), v);
    }

    for (marker, normalized) in NATIONALITY_MAP {
        if q.contains(marker) {
            entities.insert("nationality".to_string(), (*normalized).to_string());
            break;
        }
    }

    if let Some(caps) = BUDGET_RE.captures(&q) {
        entities.insert(
            "budget".to_string(),
            caps.get(0).map(|m| m.as_str().trim().to_string()).unwrap_or_default(),
        );
    }

    entities
}
