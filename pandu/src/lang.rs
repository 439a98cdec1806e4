//! Language heuristics: script ranges plus small word lists.
//!
//! Detection is intentionally imprecise. Script evidence (kana, kanji,
//! Cyrillic, Arabic) beats word lists; when nothing matches, the caller is
//! told to mirror the user's language without naming one. Precision beyond
//! this belongs to an external service, not the core.

/// Coarse language classification of a query.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Lang {
    Indonesian,
    Italian,
    French,
    Spanish,
    German,
    Portuguese,
    Japanese,
    Chinese,
    Arabic,
    Russian,
    Ukrainian,
    English,
    /// No confident signal; respond in the user's language.
    Unknown,
}

impl Lang {
    /// Descriptive name used inside prompt instructions.
    pub fn display_name(&self) -> &'static str {
        match self {
            Lang::Indonesian => "INDONESIAN (Bahasa Indonesia)",
            Lang::Italian => "ITALIAN (Italiano)",
            Lang::French => "FRENCH (Français)",
            Lang::Spanish => "SPANISH (Español)",
            Lang::German => "GERMAN (Deutsch)",
            Lang::Portuguese => "PORTUGUESE (Português)",
            Lang::Japanese => "JAPANESE (日本語)",
            Lang::Chinese => "CHINESE (中文)",
            Lang::Arabic => "ARABIC (العربية)",
            Lang::Russian => "RUSSIAN (Русский)",
            Lang::Ukrainian => "UKRAINIAN (Українська)",
            Lang::English => "ENGLISH",
            Lang::Unknown => "the user's language",
        }
    }

    /// Short tag for cache keys.
    pub fn tag(&self) -> &'static str {
        match self {
            Lang::Indonesian => "id",
            Lang::Italian => "it",
            Lang::French => "fr",
            Lang::Spanish => "es",
            Lang::German => "de",
            Lang::Portuguese => "pt",
            Lang::Japanese => "ja",
            Lang::Chinese => "zh",
            Lang::Arabic => "ar",
            Lang::Russian => "ru",
            Lang::Ukrainian => "uk",
            Lang::English => "en",
            Lang::Unknown => "xx",
        }
    }
}

const INDONESIAN_MARKERS: &[&str] = &[
    "apa", "bagaimana", "siapa", "dimana", "kapan", "mengapa", "yang", "dengan", "untuk", "dari",
    "saya", "aku", "kamu", "anda", "bisa", "mau", "ingin", "perlu", "tolong", "halo", "selamat",
    "terima kasih", "gimana", "gue", "gw", "dong", "nih", "banget", "boleh",
];

const ITALIAN_MARKERS: &[&str] = &[
    "ciao", "come", "cosa", "voglio", "grazie", "posso", "perché", "buongiorno", "buonasera",
    "quanto costa",
];

const FRENCH_MARKERS: &[&str] = &[
    "bonjour", "comment", "pourquoi", "merci", "est-ce", "s'il vous", "je voudrais",
];

const SPANISH_MARKERS: &[&str] = &[
    "hola", "cómo", "gracias", "por qué", "buenos días", "buenas tardes", "quiero", "puedo",
];

const GERMAN_MARKERS: &[&str] = &[
    "guten tag", "guten morgen", "danke", "bitte", "warum", "ich möchte", "können", "hallo",
];

const PORTUGUESE_MARKERS: &[&str] = &[
    "olá", "bom dia", "boa tarde", "obrigado", "obrigada", "porque", "quero", "você",
];

const UKRAINIAN_MARKERS: &[&str] = &["привіт", "вітаю", "як", "справи", "дякую", "добрий"];

fn has_any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|n| haystack.contains(n))
}

fn in_range(query: &str, lo: char, hi: char) -> bool {
    query.chars().any(|c| (lo..=hi).contains(&c))
}

/// Detects the dominant language of a query. Mixed-script input resolves to
/// the dominant script; word lists only break ties within Latin script.
pub fn detect(query: &str) -> Lang {
    let trimmed = query.trim();
    if trimmed.len() < 2 {
        return Lang::Unknown;
    }
    let lower = trimmed.to_lowercase();

    // Script evidence first.
    let has_hiragana = in_range(trimmed, '\u{3040}', '\u{309f}');
    let has_katakana = in_range(trimmed, '\u{30a0}', '\u{30ff}');
    let has_kanji = in_range(trimmed, '\u{4e00}', '\u{9fff}');
    if has_hiragana || has_katakana {
        return Lang::Japanese;
    }
    if has_kanji {
        return Lang::Chinese;
    }
    if in_range(trimmed, '\u{0600}', '\u{06ff}') {
        return Lang::Arabic;
    }
    if in_range(trimmed, '\u{0400}', '\u{04ff}') {
        if has_any(&lower, UKRAINIAN_MARKERS) || lower.contains('ї') || lower.contains('є') {
            return Lang::Ukrainian;
        }
        return Lang::Russian;
    }

    // Latin script: word lists. Indonesian checked first so informal
    // Jakarta-slang queries keep their register.
    if has_any(&lower, INDONESIAN_MARKERS) {
        return Lang::Indonesian;
    }
    if has_any(&lower, ITALIAN_MARKERS) {
        return Lang::Italian;
    }
    if has_any(&lower, FRENCH_MARKERS) {
        return Lang::French;
    }
    if has_any(&lower, SPANISH_MARKERS) {
        return Lang::Spanish;
    }
    if has_any(&lower, GERMAN_MARKERS) {
        return Lang::German;
    }
    if has_any(&lower, PORTUGUESE_MARKERS) {
        return Lang::Portuguese;
    }
    Lang::Unknown
}
