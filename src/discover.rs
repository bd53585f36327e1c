//! Audio link discovery on HTML pages.
//!
//! Fetches a page over HTTP, pulls every hyperlink target out of the
//! markup, and keeps the ones whose path ends in a known audio
//! extension. The result has set semantics: exact-string duplicates are
//! collapsed and callers must not rely on cross-run ordering.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use reqwest::Client;
use thiserror::Error;
use tracing::{debug, instrument};
use url::Url;

/// Audio file extensions recognized by the discoverer (lowercase).
const AUDIO_EXTENSIONS: &[&str] = &[".mp3", ".wav", ".ogg", ".flac", ".aac"];

/// Compiles a pattern known to be valid at build time.
fn compile_static_regex(pattern: &str) -> Regex {
    Regex::new(pattern).unwrap_or_else(|e| panic!("invalid static regex '{pattern}': {e}"))
}

static HREF_RE: LazyLock<Regex> =
    LazyLock::new(|| compile_static_regex(r#"(?is)<a\s+[^>]*href\s*=\s*["']([^"']+)["']"#));

/// Errors that can occur during link discovery.
///
/// Discovery failure is non-fatal to the batch: the orchestrator logs
/// it and continues with an empty result set.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    /// Network-level error reaching the page.
    #[error("network error fetching {url}: {source}")]
    Network {
        /// The page URL that could not be reached.
        url: String,
        /// The underlying network error.
        #[source]
        source: reqwest::Error,
    },

    /// The page responded with a non-success status.
    #[error("unable to fetch content from {url}: HTTP {status}")]
    HttpStatus {
        /// The page URL.
        url: String,
        /// The HTTP status code.
        status: u16,
    },

    /// The response body could not be read as text.
    #[error("unreadable response body from {url}: {source}")]
    Body {
        /// The page URL.
        url: String,
        /// The underlying read error.
        #[source]
        source: reqwest::Error,
    },
}

/// Fetches `page_url` and returns the unique audio links found on it.
///
/// Hyperlink targets are returned exactly as written in the markup
/// (relative links are not resolved against the page URL; the original
/// page in this system always carries absolute download links). The
/// extension check is case-insensitive on the URL path, but
/// deduplication compares exact strings afterwards, so `a.MP3` and
/// `a.mp3` count as two distinct links. First-seen order is preserved
/// for a given document, but callers must treat the result as a set.
///
/// # Errors
///
/// Returns [`DiscoveryError`] when the page is unreachable, responds
/// with a non-2xx status, or its body cannot be read.
#[instrument(skip(client), fields(url = %page_url))]
pub async fn discover_audio_links(
    client: &Client,
    page_url: &str,
) -> Result<Vec<String>, DiscoveryError> {
    let response = client
        .get(page_url)
        .send()
        .await
        .map_err(|source| DiscoveryError::Network {
            url: page_url.to_string(),
            source,
        })?;

    let status = response.status();
    if !status.is_success() {
        return Err(DiscoveryError::HttpStatus {
            url: page_url.to_string(),
            status: status.as_u16(),
        });
    }

    let body = response
        .text()
        .await
        .map_err(|source| DiscoveryError::Body {
            url: page_url.to_string(),
            source,
        })?;

    let links = extract_audio_links(&body);
    debug!(count = links.len(), "audio links discovered");
    Ok(links)
}

/// Extracts unique audio hrefs from an HTML document body.
#[must_use]
pub fn extract_audio_links(body: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut links = Vec::new();

    for caps in HREF_RE.captures_iter(body) {
        let Some(href) = caps.get(1).map(|m| m.as_str().trim()) else {
            continue;
        };
        if href.is_empty() || !has_audio_extension(href) {
            continue;
        }
        if seen.insert(href.to_string()) {
            links.push(href.to_string());
        }
    }

    links
}

/// Returns true if the href's path ends in a known audio extension,
/// case-insensitively. Query strings and fragments are not part of the
/// suffix check.
fn has_audio_extension(href: &str) -> bool {
    let path = href_path(href).to_ascii_lowercase();
    AUDIO_EXTENSIONS.iter().any(|ext| path.ends_with(ext))
}

/// Path portion of an href, for absolute and relative targets alike.
fn href_path(href: &str) -> String {
    if let Ok(url) = Url::parse(href) {
        return url.path().to_string();
    }
    // Relative href: strip query and fragment by hand.
    let end = href.find(['?', '#']).unwrap_or(href.len());
    href[..end].to_string()
}
