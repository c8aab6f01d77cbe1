//! Chord sheet fetcher
//!
//! Pulls chord/tab text from a song's stored chord link. Supports the
//! print view of common chord sites (a single `<pre>` block) with a
//! fallback to their regular page containers.

use std::sync::Arc;
use std::time::Duration;

use scraper::{Html, Selector};

use crate::error::AppError;

const FETCH_TIMEOUT: Duration = Duration::from_secs(15);

/// Chord hosts reject the default client user agent
const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
     AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

fn selector(css: &str) -> Result<Selector, AppError> {
    Selector::parse(css)
        .map_err(|e| AppError::Internal(anyhow::anyhow!("invalid selector {}: {:?}", css, e)))
}

/// Extract chord text from a fetched page
///
/// A `<pre>` element wins (print-view pages are one big `<pre>`);
/// otherwise the known chord container divs are tried in order. Pages
/// with neither yield an empty string rather than an error.
fn extract_chord_text(html: &str) -> Result<String, AppError> {
    let document = Html::parse_document(html);

    if let Some(pre) = document.select(&selector("pre")?).next() {
        return Ok(pre.text().collect());
    }

    for css in ["div.cifra_cnt", "div.cifra"] {
        if let Some(container) = document.select(&selector(css)?).next() {
            let lines: Vec<&str> = container.text().collect();
            return Ok(lines.join("\n"));
        }
    }

    Ok(String::new())
}

/// Chord sheet client
pub struct ChordClient {
    http_client: Arc<reqwest::Client>,
}

impl ChordClient {
    pub fn new(http_client: Arc<reqwest::Client>) -> Self {
        Self { http_client }
    }

    /// Fetch and extract the chord sheet behind one URL
    ///
    /// # Errors
    /// Returns `Upstream` when the host is unreachable, rejects the
    /// request, or serves an unreadable body
    pub async fn fetch_chord_sheet(&self, chord_url: &str) -> Result<String, AppError> {
        let response = self
            .http_client
            .get(chord_url)
            .header(reqwest::header::USER_AGENT, BROWSER_USER_AGENT)
            .timeout(FETCH_TIMEOUT)
            .send()
            .await
            .map_err(|e| AppError::Upstream(format!("Chord sheet request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AppError::Upstream(format!(
                "Chord sheet host rejected the request: HTTP {}",
                status
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|e| AppError::Upstream(format!("Chord sheet response unreadable: {}", e)))?;

        let content = extract_chord_text(&body)?;

        tracing::debug!(
            chord_url,
            content_chars = content.chars().count(),
            "Fetched chord sheet"
        );

        Ok(content)
    }
}
