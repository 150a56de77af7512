use once_cell::sync::Lazy;
use regex::Regex;

static THINK_TAG_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<think>[\s\S]*?</think>|<think\s*/>").unwrap());

static CITATION_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\[\d+(?:,\s*\d+)*\]").unwrap());

static TRAILING_SPACES_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"[ \t]+\n").unwrap());

static MULTIPLE_NEWLINES_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{3,}").unwrap());

/// Strips reasoning blocks and `[n]` citation markers from a model answer.
pub fn clean_llm_response(response: &str) -> String {
    let mut cleaned = THINK_TAG_PATTERN.replace_all(response, "").to_string();
    cleaned = CITATION_PATTERN.replace_all(&cleaned, "").to_string();
    cleaned = TRAILING_SPACES_PATTERN.replace_all(&cleaned, "\n").to_string();
    cleaned = cleaned.trim().to_string();
    MULTIPLE_NEWLINES_PATTERN
        .replace_all(&cleaned, "\n\n")
        .to_string()
}
