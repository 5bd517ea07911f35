use cohere_api::normalize_chat_url;

#[test]
fn url_normalization_keeps_existing_chat_endpoint() {
    assert_eq!(
        normalize_chat_url("https://api.cohere.com/v2/chat"),
        "https://api.cohere.com/v2/chat"
    );
}

#[test]
fn url_normalization_appends_chat_to_versioned_base() {
    assert_eq!(
        normalize_chat_url("https://api.cohere.com/v2/"),
        "https://api.cohere.com/v2/chat"
    );
}

#[test]
fn url_normalization_appends_full_path_to_generic_base() {
    assert_eq!(
        normalize_chat_url("http://127.0.0.1:8080"),
        "http://127.0.0.1:8080/v2/chat"
    );
}

#[test]
fn url_normalization_defaults_empty_input() {
    assert_eq!(normalize_chat_url("   "), "https://api.cohere.com/v2/chat");
}
