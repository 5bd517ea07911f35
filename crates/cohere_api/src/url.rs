/// Default base URL for Cohere API requests.
pub const DEFAULT_COHERE_BASE_URL: &str = "https://api.cohere.com";

/// Normalize a base URL to the v2 chat endpoint.
///
/// Normalization rules:
/// 1) keep `/v2/chat` unchanged
/// 2) append `/chat` when path ends in `/v2`
/// 3) append `/v2/chat` otherwise
pub fn normalize_chat_url(input: &str) -> String {
    let base = if input.trim().is_empty() {
        DEFAULT_COHERE_BASE_URL
    } else {
        input.trim()
    };

    let trimmed = base.trim_end_matches('/');
    if trimmed.ends_with("/v2/chat") {
        return trimmed.to_string();
    }
    if trimmed.ends_with("/v2") {
        return format!("{trimmed}/chat");
    }
    format!("{trimmed}/v2/chat")
}
