//! Text helpers for configuration values and server responses.

/// Longest server error excerpt carried into an error message
pub const ERROR_EXCERPT_CHARS: usize = 180;

/// Trimmed value, or `None` when absent or blank
pub fn non_blank(value: Option<String>) -> Option<String> {
    let value = value?;
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_string())
}

/// Whether a server URL names an http or https scheme (any case)
pub fn has_http_scheme(url: &str) -> bool {
    let lower = url.trim_start().to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

/// Single-line excerpt of a server response body for error messages
pub fn error_excerpt(body: &str) -> String {
    body.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .chars()
        .take(ERROR_EXCERPT_CHARS)
        .collect()
}
