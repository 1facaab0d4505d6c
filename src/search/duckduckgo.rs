use std::sync::OnceLock;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use tracing::debug;

use super::{SearchProvider, SearchResult};
use crate::error::{ConfigError, RetrievalError};

const DEFAULT_BASE_URL: &str = "https://html.duckduckgo.com";
const USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64; rv:128.0) Gecko/20100101 Firefox/128.0";

/// Marker DuckDuckGo serves instead of results when it suspects a bot.
const CHALLENGE_MARKER: &str = "anomaly-modal";

fn title_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?s)<a([^>]*class="result__a"[^>]*)>(.*?)</a>"#).expect("valid regex")
    })
}

fn snippet_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?s)<(a|div|td)[^>]*class="result__snippet"[^>]*>(.*?)</(?:a|div|td)>"#)
            .expect("valid regex")
    })
}

fn href_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"href="([^"]*)""#).expect("valid regex"))
}

fn bold_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"</?b>").expect("valid regex"))
}

/// Web search through DuckDuckGo's HTML endpoint.
pub struct DuckDuckGo {
    client: reqwest::Client,
    base_url: String,
    region: String,
}

impl DuckDuckGo {
    pub fn from_env(timeout: Duration) -> Result<Self, ConfigError> {
        let base_url =
            dotenv::var("SEARCH_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());
        let region = dotenv::var("SEARCH_REGION").unwrap_or_else(|_| "us-en".to_string());
        Self::new(base_url, region, timeout)
    }

    pub fn new(base_url: String, region: String, timeout: Duration) -> Result<Self, ConfigError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()?;
        Ok(Self {
            client,
            base_url,
            region,
        })
    }
}

#[async_trait]
impl SearchProvider for DuckDuckGo {
    async fn search(
        &self,
        query: &str,
        max_results: usize,
    ) -> Result<Vec<SearchResult>, RetrievalError> {
        let url = format!("{}/html/", self.base_url.trim_end_matches('/'));
        let resp = self
            .client
            .get(&url)
            .query(&[("q", query), ("kl", self.region.as_str())])
            .send()
            .await
            .map_err(|e| RetrievalError::Unreachable(e.to_string()))?;

        // 202 is DuckDuckGo's rate-limit response.
        let status = resp.status();
        if status != reqwest::StatusCode::OK {
            return Err(RetrievalError::Status(status.as_u16()));
        }

        let body = resp
            .text()
            .await
            .map_err(|e| RetrievalError::Malformed(format!("unreadable body: {}", e)))?;

        let results = parse_results(&body, max_results)?;
        debug!(query, results = results.len(), "DuckDuckGo search parsed");
        Ok(results)
    }
}

/// Extract results from a DuckDuckGo HTML page, skipping ads.
pub fn parse_results(html: &str, max_results: usize) -> Result<Vec<SearchResult>, RetrievalError> {
    if html.contains(CHALLENGE_MARKER) {
        return Err(RetrievalError::Malformed("bot challenge page".to_string()));
    }

    let titles: Vec<_> = title_re().captures_iter(html).collect();
    let mut results = Vec::new();

    for (i, caps) in titles.iter().enumerate() {
        let (Some(whole), Some(attrs), Some(inner)) = (caps.get(0), caps.get(1), caps.get(2)) else {
            continue;
        };
        let href = href_re()
            .captures(attrs.as_str())
            .and_then(|c| c.get(1))
            .map(|m| m.as_str())
            .ok_or_else(|| RetrievalError::Malformed("result link without href".to_string()))?;

        let url = resolve_href(href);
        if url.contains("duckduckgo.com/y.js") {
            continue;
        }

        // The snippet sits between this title and the next one.
        let region_end = titles
            .get(i + 1)
            .and_then(|c| c.get(0))
            .map(|m| m.start())
            .unwrap_or(html.len());
        let region = &html[whole.end()..region_end];
        let snippet = snippet_re()
            .captures(region)
            .and_then(|c| c.get(2))
            .map(|m| html_to_text(m.as_str()))
            .unwrap_or_default();

        results.push(SearchResult {
            title: html_to_text(inner.as_str()),
            snippet,
            url,
        });
        if results.len() >= max_results {
            break;
        }
    }

    Ok(results)
}

/// Unwrap DuckDuckGo's `/l/?uddg=<target>` redirect links.
fn resolve_href(href: &str) -> String {
    let href = href.replace("&amp;", "&");
    if let Some(pos) = href.find("uddg=") {
        let encoded = href[pos + "uddg=".len()..].split('&').next().unwrap_or("");
        if let Ok(decoded) = urlencoding::decode(encoded) {
            return decoded.into_owned();
        }
    }
    if let Some(rest) = href.strip_prefix("//") {
        return format!("https://{}", rest);
    }
    href
}

/// Render an HTML fragment as a single line of plain text.
fn html_to_text(fragment: &str) -> String {
    let unbolded = bold_re().replace_all(fragment, "");
    let text = html2text::from_read(unbolded.as_bytes(), 10_000)
        .unwrap_or_else(|_| unbolded.to_string());
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
