/// Span from the first `{` to the last `}` of a model answer, if any.
pub(crate) fn extract_json_object(output: &str) -> Option<&str> {
    let start = output.find('{')?;
    let end = output.rfind('}')?;
    if end > start {
        Some(&output[start..=end])
    } else {
        None
    }
}

pub(crate) fn parse_json_object<T: serde::de::DeserializeOwned>(output: &str) -> Option<T> {
    extract_json_object(output).and_then(|span| serde_json::from_str(span).ok())
}

pub(crate) fn normalize_language(value: &str) -> String {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        "English".to_string()
    } else {
        trimmed.to_string()
    }
}
