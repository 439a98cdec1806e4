//! Pre-loop routing helpers: the language-wrapped initial prompt, team
//! query detection, and conversation-recall detection.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::lang::{self, Lang};

/// Tool preamble for Indonesian queries (informal register allowed).
const INDONESIAN_TOOL_PREAMBLE: &str = "TOOL USAGE:
Untuk pertanyaan faktual tentang visa, bisnis, pajak, harga, tim, atau regulasi:
-> SELALU gunakan vector_search DULU untuk mengambil informasi terverifikasi
-> Jangan jawab dari ingatan saja - cari di knowledge base
-> Kalau tanya harga resmi -> gunakan pricing_lookup
-> Kalau tanya tentang tim -> gunakan team_knowledge

Pertanyaan User:
";

/// Wraps the query with an explicit language instruction plus tool-usage
/// directions. With native function calling the model tends to ignore the
/// system prompt's language protocol, so the instruction rides on the
/// query itself.
pub fn wrap_query_with_language_instruction(query: &str) -> String {
    if query.trim().len() < 2 {
        return query.to_string();
    }

    let detected = lang::detect(query);
    if detected == Lang::Indonesian {
        return format!("{INDONESIAN_TOOL_PREAMBLE}{query}");
    }

    let lang_name = detected.display_name();
    format!(
        "LANGUAGE: {lang_name}
YOUR ENTIRE RESPONSE MUST BE IN {lang_name}
DO NOT USE SLANG OR INFORMAL LANGUAGE unless specifically requested.

TOOL USAGE INSTRUCTION:
-> ALWAYS use vector_search FIRST to retrieve verified documents from the knowledge base.
-> For relationship/prerequisite questions, use knowledge_graph_search AFTER vector_search (not instead of it).
-> Do NOT answer from memory alone - your evidence score depends on vector_search results.

User Query:
{query}"
    )
}

/// A detected team query: which lookup to run and with what term.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TeamQuery {
    pub query_type: &'static str,
    pub search_term: String,
}

static EMAIL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}").expect("email regex")
});

static NAME_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"\bchi\s*[eè]['’]?\s+(?P<term>[^?.,!;:\n]{1,64})",
        r"\bwho\s+is\s+(?P<term>[^?.,!;:\n]{1,64})",
        r"\btell\s+me\s+about\s+(?P<term>[^?.,!;:\n]{1,64})",
        r"\bparlami\s+di\s+(?P<term>[^?.,!;:\n]{1,64})",
        r"\bconosci\s+(?P<term>[^?.,!;:\n]{1,64})",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("name pattern"))
    .collect()
});

const LIST_ALL_MARKERS: &[&str] = &[
    "list all team",
    "list team",
    "team members",
    "membri del team",
    "lista team",
    "elenco team",
    "tutti i membri",
    "quanti dipendenti",
    "staff",
    "personale",
];

const TEAM_CONTEXT_MARKERS: &[&str] = &[
    "chi si occupa",
    "chi gestisce",
    "chi segue",
    "who handles",
    "who manages",
    "who is the",
    "who is your",
    "your team",
    "nel team",
    "del team",
    "in the team",
    "team member",
    "staff member",
    "avete qualcuno",
    "esperto di",
    "specialist",
    "manager",
    "responsabile",
];

const ROLE_MAP: &[(&str, &[&str])] = &[
    ("ceo", &["ceo", "chief executive", "amministratore delegato"]),
    ("founder", &["founder", "co-founder", "fondatore", "fondatrice"]),
    ("tax", &["tax", "tasse", "fiscale", "pajak"]),
    ("visa", &["visa", "visti", "immigrazione", "immigration"]),
    ("legal", &["legal", "legale", "law", "avvocato"]),
    ("marketing", &["marketing", "social", "content"]),
    ("support", &["support", "assistenza", "customer care"]),
];

fn strip_articles(term: &str) -> String {
    static ARTICLE_RE: Lazy<Regex> = Lazy::new(|| {
        Regex::new(r"(?i)^(il|lo|la|i|gli|le|the|a|an|un|uno|una)\s+").expect("article")
    });
    let cleaned = ARTICLE_RE.replace(term.trim(), "").to_string();
    let cleaned = cleaned.trim_matches(|c| c == '"' || c == '\'' || c == '“' || c == '”');
    // Keep a short, stable search term.
    cleaned.split_whitespace().take(3).collect::<Vec<_>>().join(" ")
}

/// Heuristically detects questions about the team and pre-routes them to
/// the `team_knowledge` tool ahead of the full ReAct loop.
pub fn detect_team_query(query: &str) -> Option<TeamQuery> {
    let q = query.trim();
    if q.is_empty() {
        return None;
    }
    let ql = q.to_lowercase();

    // 1) List-all requests.
    if LIST_ALL_MARKERS.iter().any(|m| ql.contains(m)) {
        return Some(TeamQuery {
            query_type: "list_all",
            search_term: String::new(),
        });
    }

    // 2) Email lookup.
    if let Some(m) = EMAIL_RE.find(q) {
        return Some(TeamQuery {
            query_type: "search_by_email",
            search_term: m.as_str().to_string(),
        });
    }

    // 3) Role lookup, only with explicit team context.
    if TEAM_CONTEXT_MARKERS.iter().any(|m| ql.contains(m)) {
        for (role, keywords) in ROLE_MAP {
            if keywords.iter().any(|k| ql.contains(k)) {
                return Some(TeamQuery {
                    query_type: "search_by_role",
                    search_term: (*role).to_string(),
                });
            }
        }
    }

    // 4) Name lookup ("who is X", "chi è X").
    for pattern in NAME_PATTERNS.iter() {
        if let Some(caps) = pattern.captures(q) {
            let term = strip_articles(&caps["term"]);
            if !term.is_empty() {
                return Some(TeamQuery {
                    query_type: "search_by_name",
                    search_term: term,
                });
            }
        }
    }

    None
}

const RECALL_TRIGGERS: &[&str] = &[
    "ti ricordi",
    "ricordi cosa",
    "ricordi di cosa",
    "abbiamo parlato",
    "do you remember",
    "what did we talk",
    "what did i say",
    "as i said earlier",
    "come ti dicevo",
    "di cosa abbiamo parlato",
    "tadi aku bilang",
    "yang tadi dibahas",
];

/// True when the user is asking to recall something from THIS
/// conversation; the answer lives in the history, not the knowledge base.
pub fn is_conversation_recall_query(query: &str) -> bool {
    let q = query.to_lowercase();
    RECALL_TRIGGERS.iter().any(|t| q.contains(t))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn indonesian_query_gets_indonesian_preamble() {
        let wrapped = wrap_query_with_language_instruction("Berapa harga KITAS dong?");
        assert!(wrapped.contains("SELALU gunakan vector_search"));
        assert!(wrapped.ends_with("Berapa harga KITAS dong?"));
    }

    #[test]
    fn italian_query_names_the_language() {
        let wrapped = wrap_query_with_language_instruction("Quanto costa un visto E33G?");
        assert!(wrapped.contains("ITALIAN"));
        assert!(wrapped.contains("vector_search FIRST"));
    }

    #[test]
    fn unknown_language_stays_generic() {
        let wrapped = wrap_query_with_language_instruction("What is a KITAS?");
        assert!(wrapped.contains("the user's language"));
    }

    #[test]
    fn tiny_queries_pass_through() {
        assert_eq!(wrap_query_with_language_instruction("?"), "?");
    }

    #[test]
    fn detects_list_all_and_email() {
        assert_eq!(
            detect_team_query("Can you list all team members?").unwrap().query_type,
            "list_all"
        );
        let q = detect_team_query("what does putu@nusaatlas.com do?").unwrap();
        assert_eq!(q.query_type, "search_by_email");
        assert_eq!(q.search_term, "putu@nusaatlas.com");
    }

    #[test]
    fn role_lookup_needs_team_context() {
        let q = detect_team_query("who is your tax specialist?").unwrap();
        assert_eq!(q.query_type, "search_by_role");
        assert_eq!(q.search_term, "tax");
        // A tax question without team context is not a team query.
        assert!(detect_team_query("how is income tax calculated?").is_none());
    }

    #[test]
    fn name_lookup_strips_articles_and_truncates() {
        let q = detect_team_query("who is the amazing Dewi Lestari exactly tell us").unwrap();
        assert_eq!(q.query_type, "search_by_name");
        assert_eq!(q.search_term, "amazing Dewi Lestari");
    }

    #[test]
    fn recall_triggers_match() {
        assert!(is_conversation_recall_query("Ti ricordi il cliente di cui abbiamo parlato?"));
        assert!(is_conversation_recall_query("do you remember my budget?"));
        assert!(!is_conversation_recall_query("Quanto costa un visto E31A?"));
    }
}
