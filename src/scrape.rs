//! Web page fetching and review text extraction.
//!
//! Pages are fetched with browser-like headers, stripped of navigation and
//! boilerplate, and reduced to the text of the most likely content area.
//!
//! # Extraction rules
//!
//! 1. Noise elements (scripts, headers, footers, navs, sidebars, cookie
//!    banners, ads, menus, search bars) are skipped entirely.
//! 2. The first matching content candidate wins: `#productDescription`,
//!    `#feature-bullets`, `#centerCol`, `article`, `main`, `.post-content`,
//!    `.article-body`, `.entry-content`, `#content`, `.content`,
//!    `.main-content`.
//! 3. If no candidate matched, or its text is under 100 characters, the
//!    whole `<body>` is used instead.
//! 4. Lines are trimmed; lines of 3 characters or fewer are dropped.
//! 5. Fewer than `min_chars` characters left is an error; the result is
//!    truncated to `max_chars`.

use scraper::{ElementRef, Html, Node, Selector};
use std::time::Duration;
use thiserror::Error;

use crate::config::ScrapeConfig;

const NOISE_SELECTORS: &[&str] = &[
    "script",
    "style",
    "header",
    "footer",
    "nav",
    "noscript",
    "iframe",
    ".footer",
    "#footer",
    ".nav",
    "#nav",
    ".navigation",
    ".sidebar",
    "#sidebar",
    ".cookie-banner",
    ".ad-container",
    ".advertisement",
    ".menu",
    "#menu",
    ".search-bar",
];

const CONTENT_CANDIDATES: &[&str] = &[
    "#productDescription",
    "#feature-bullets",
    "#centerCol",
    "article",
    "main",
    ".post-content",
    ".article-body",
    ".entry-content",
    "#content",
    ".content",
    ".main-content",
];

/// Candidate text shorter than this falls back to the full body.
const MIN_CANDIDATE_CHARS: usize = 100;

/// Shortest line kept, exclusive.
const MIN_LINE_CHARS: usize = 3;

#[derive(Debug, Error)]
pub enum ScrapeError {
    #[error("failed to fetch {url}: {source}")]
    Fetch {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{url} returned HTTP {status}")]
    Status {
        url: String,
        status: reqwest::StatusCode,
    },
    #[error(
        "unable to extract meaningful content ({chars} chars, need {min}); the site might be blocking access"
    )]
    TooLittleContent { chars: usize, min: usize },
}

/// Fetch `url` and extract its review text.
pub async fn scrape_url(config: &ScrapeConfig, url: &str) -> Result<String, ScrapeError> {
    let fetch_err = |source| ScrapeError::Fetch {
        url: url.to_string(),
        source,
    };

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.timeout_secs))
        .user_agent(config.user_agent.as_str())
        .build()
        .map_err(fetch_err)?;

    tracing::debug!(url, "fetching page");
    let response = client
        .get(url)
        .header(
            "Accept",
            "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,*/*;q=0.8",
        )
        .header("Accept-Language", "en-US,en;q=0.5")
        .header("Referer", "https://www.google.com/")
        .header("Upgrade-Insecure-Requests", "1")
        .header("Cache-Control", "no-cache")
        .send()
        .await
        .map_err(fetch_err)?;

    let status = response.status();
    if !status.is_success() {
        return Err(ScrapeError::Status {
            url: url.to_string(),
            status,
        });
    }

    let body = response.text().await.map_err(fetch_err)?;
    extract_text(&body, config.min_chars, config.max_chars)
}

/// Extract review text from an HTML document.
pub fn extract_text(html: &str, min_chars: usize, max_chars: usize) -> Result<String, ScrapeError> {
    let doc = Html::parse_document(html);
    let noise = compile(NOISE_SELECTORS);

    let candidate = compile(CONTENT_CANDIDATES).iter().find_map(|sel| {
        doc.select(sel)
            .find(|el| !is_noise(el, &noise) && !has_noise_ancestor(el, &noise))
    });

    let mut text = candidate
        .map(|el| visible_text(el, &noise))
        .unwrap_or_default();

    if text.chars().count() < MIN_CANDIDATE_CHARS {
        let body = compile(&["body"])
            .first()
            .and_then(|sel| doc.select(sel).next())
            .unwrap_or_else(|| doc.root_element());
        text = visible_text(body, &noise);
    }

    let cleaned = text
        .lines()
        .map(str::trim)
        .filter(|line| line.chars().count() > MIN_LINE_CHARS)
        .collect::<Vec<_>>()
        .join("\n");

    let chars = cleaned.chars().count();
    if chars < min_chars {
        return Err(ScrapeError::TooLittleContent {
            chars,
            min: min_chars,
        });
    }

    Ok(cleaned.chars().take(max_chars).collect())
}

fn compile(selectors: &[&str]) -> Vec<Selector> {
    selectors
        .iter()
        .filter_map(|s| Selector::parse(s).ok())
        .collect()
}

fn is_noise(el: &ElementRef<'_>, noise: &[Selector]) -> bool {
    noise.iter().any(|sel| sel.matches(el))
}

fn has_noise_ancestor(el: &ElementRef<'_>, noise: &[Selector]) -> bool {
    el.ancestors()
        .filter_map(ElementRef::wrap)
        .any(|a| is_noise(&a, noise))
}

/// Text of `el` with one text node per line, skipping noise subtrees.
fn visible_text(el: ElementRef<'_>, noise: &[Selector]) -> String {
    let mut out = Vec::new();
    collect_text(el, noise, &mut out);
    out.join("\n")
}

fn collect_text<'a>(el: ElementRef<'a>, noise: &[Selector], out: &mut Vec<&'a str>) {
    for child in el.children() {
        match child.value() {
            Node::Text(text) => out.push(&**text),
            Node::Element(_) => {
                if let Some(child_el) = ElementRef::wrap(child) {
                    if !is_noise(&child_el, noise) {
                        collect_text(child_el, noise, out);
                    }
                }
            }
            _ => {}
        }
    }
}
