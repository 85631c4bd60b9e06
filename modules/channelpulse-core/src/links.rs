//! URL handling: extraction of outbound links from message text and
//! canonicalization of source URLs.

use regex::Regex;
use std::sync::OnceLock;

/// Characters that are legal inside a URL but, when trailing, are almost
/// always sentence punctuation around the link rather than part of it.
const TRAILING_PUNCTUATION: &[char] = &['.', ',', ';', ':', '!', '?', ')', ']', '}', '\'', '"', '>'];

fn url_regex() -> &'static Regex {
    static URL_RE: OnceLock<Regex> = OnceLock::new();
    URL_RE.get_or_init(|| Regex::new(r#"https?://[^\s<>"']+"#).expect("valid URL regex"))
}

/// Extract outbound http(s) URLs from free text, in order of appearance,
/// deduplicated, with trailing punctuation stripped.
pub fn extract_urls(text: &str) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    let mut urls = Vec::new();
    for found in url_regex().find_iter(text) {
        let url = found.as_str().trim_end_matches(TRAILING_PUNCTUATION);
        if url.len() <= "https://".len() {
            continue;
        }
        if seen.insert(url.to_string()) {
            urls.push(url.to_string());
        }
    }
    urls
}

/// Canonicalize a source URL: scheme + lowercased host + path, query and
/// fragment dropped, no trailing slash. Non-URLs pass through trimmed so
/// bare channel handles survive.
pub fn canonicalize_source_url(raw: &str) -> String {
    let trimmed = raw.trim();
    match url::Url::parse(trimmed) {
        Ok(parsed) if parsed.has_host() => {
            let host = parsed.host_str().unwrap_or_default().to_lowercase();
            let path = parsed.path().trim_end_matches('/');
            format!("{}://{}{}", parsed.scheme(), host, path)
        }
        _ => trimmed.trim_end_matches('/').to_string(),
    }
}
