//! Response cleaning: strip stub phrases, scaffolding leaks and
//! meta-statements, then normalize whitespace.

use once_cell::sync::Lazy;
use regex::Regex;

/// Full-answer stubs that mean the model produced nothing useful.
pub const STUB_PHRASES: &[&str] = &["no further action needed", "observation: none"];

/// True when the whole answer is a known stub.
pub fn is_stub_response(response: &str) -> bool {
    let lower = response.to_lowercase();
    STUB_PHRASES.iter().any(|s| lower.contains(s))
}

static SCAFFOLD_LINE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?mi)^\s*(thought|action|action input|observation)\s*:.*$").expect("scaffold")
});

static META_SENTENCE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(as an ai(?: language model| assistant)?|i am just an ai)[^.!?]*[.!?]\s*")
        .expect("meta")
});

static FINAL_ANSWER_PREFIX_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^\s*final answer:\s*").expect("final answer prefix"));

static BLANK_RUNS_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{3,}").expect("blank runs"));

/// Removes internal scaffolding and meta statements, normalizes whitespace.
/// Idempotent: cleaning a cleaned response is a no-op.
pub fn clean_response(response: &str) -> String {
    let mut out = FINAL_ANSWER_PREFIX_RE.replace(response, "").to_string();
    out = SCAFFOLD_LINE_RE.replace_all(&out, "").to_string();
    out = META_SENTENCE_RE.replace_all(&out, "").to_string();
    out = BLANK_RUNS_RE.replace_all(&out, "\n\n").to_string();

    out.lines()
        .map(str::trim_end)
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}
