use std::sync::{Arc, OnceLock};
use std::time::Duration;

use regex::Regex;
use scraper::{Html, Selector};

use super::Droid;

const MAX_TEXT_CHARS: usize = 100_000;

/// Markers that a site served a bot wall instead of content.
const BLOCK_MARKERS: [&str; 4] = [
    "verify you are human",
    "are you a robot",
    "enable javascript and cookies to continue",
    "unusual traffic from your computer network",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchFailure {
    Timeout,
    HttpError,
    Blocked,
}

impl FetchFailure {
    pub fn as_str(&self) -> &'static str {
        match self {
            FetchFailure::Timeout => "timeout",
            FetchFailure::HttpError => "http_error",
            FetchFailure::Blocked => "blocked",
        }
    }
}

/// Visible text of one rendered page, plus the head metadata the extraction
/// fallback needs.
#[derive(Debug, Clone, PartialEq)]
pub struct PageText {
    pub body: String,
    pub meta_description: Option<String>,
}

/// Renders a page through the WebDriver pool and returns its visible text,
/// bounded by a load timeout and one retry on transient driver errors.
pub struct ContentFetcher {
    droid: Arc<Droid>,
    load_timeout: Duration,
}

impl ContentFetcher {
    pub fn new(droid: Arc<Droid>, load_timeout: Duration) -> Self {
        ContentFetcher {
            droid,
            load_timeout,
        }
    }

    pub async fn fetch(&self, url: &str) -> Result<PageText, FetchFailure> {
        let mut last_failure = FetchFailure::HttpError;

        for attempt in 0..2 {
            match self.fetch_once(url).await {
                Ok(page) => return Ok(page),
                Err(FetchFailure::Blocked) => return Err(FetchFailure::Blocked),
                Err(failure) => {
                    log::warn!(
                        "Fetch attempt {} failed for {}: {}",
                        attempt + 1,
                        url,
                        failure.as_str()
                    );
                    last_failure = failure;
                }
            }
        }

        Err(last_failure)
    }

    async fn fetch_once(&self, url: &str) -> Result<PageText, FetchFailure> {
        let driver = self.droid.pick();

        let load = tokio::time::timeout(self.load_timeout, driver.goto(url)).await;
        match load {
            Err(_) => return Err(FetchFailure::Timeout),
            Ok(Err(e)) => {
                log::warn!("WebDriver error on {}: {:?}", url, e);
                return Err(FetchFailure::HttpError);
            }
            Ok(Ok(())) => {}
        }

        // Give script-generated content a moment to settle.
        tokio::time::sleep(Duration::from_secs(2)).await;

        let source = match driver.source().await {
            Ok(source) => source,
            Err(e) => {
                log::warn!("Failed to read page source for {}: {:?}", url, e);
                return Err(FetchFailure::HttpError);
            }
        };

        let body = html_to_text(&source);
        let lowered = body.to_lowercase();
        if BLOCK_MARKERS.iter().any(|marker| lowered.contains(marker)) {
            return Err(FetchFailure::Blocked);
        }

        Ok(PageText {
            meta_description: meta_description(&source),
            body,
        })
    }
}

/// The `<meta name="description">` content. Head elements never survive the
/// text flattening, so this is read off the raw HTML.
pub fn meta_description(html: &str) -> Option<String> {
    let document = Html::parse_document(html);
    let selector = Selector::parse(r#"meta[name="description"]"#).unwrap();

    document
        .select(&selector)
        .find_map(|meta| meta.value().attr("content"))
        .map(str::trim)
        .filter(|content| !content.is_empty())
        .map(String::from)
}

fn script_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?is)<(script|style|noscript)\b.*?</(script|style|noscript)>").unwrap()
    })
}

/// Collapse rendered HTML to whitespace-normalized visible text, capped so a
/// single huge page cannot swallow the whole extraction budget.
pub fn html_to_text(html: &str) -> String {
    let stripped = script_re().replace_all(html, " ");

    let document = Html::parse_document(&stripped);
    let raw: String = document
        .root_element()
        .text()
        .collect::<Vec<_>>()
        .join(" ");

    let mut text = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    if text.len() > MAX_TEXT_CHARS {
        let mut cut = MAX_TEXT_CHARS;
        while !text.is_char_boundary(cut) {
            cut -= 1;
        }
        text.truncate(cut);
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn html_to_text_strips_scripts_and_collapses_whitespace() {
        let html = r#"<html><head><style>body { color: red; }</style></head>
            <body><h1>Acme  Corp</h1>
            <script>var tracking = "noise";</script>
            <p>Enterprise   software.</p></body></html>"#;
        let text = html_to_text(html);

        assert_eq!(text, "Acme Corp Enterprise software.");
        assert!(!text.contains("tracking"));
        assert!(!text.contains("color"));
    }

    #[test]
    fn meta_description_read_from_head() {
        let html = r#"<html><head>
            <meta charset="utf-8">
            <meta name="description" content=" Acme builds enterprise robots. ">
            </head><body>Welcome</body></html>"#;
        assert_eq!(
            meta_description(html),
            Some("Acme builds enterprise robots.".to_string())
        );
    }

    #[test]
    fn missing_or_empty_meta_description_is_none() {
        assert_eq!(meta_description("<html><body>Welcome</body></html>"), None);
        assert_eq!(
            meta_description(r#"<head><meta name="description" content="  "></head>"#),
            None
        );
    }

    #[test]
    fn html_to_text_caps_length() {
        let html = format!("<html><body>{}</body></html>", "word ".repeat(50_000));
        assert!(html_to_text(&html).len() <= MAX_TEXT_CHARS);
    }
}
