use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use url::Url;

use crate::domain::company::normalize_website;

use super::{Provider, RateLimiter};

/// Domains that a web search surfaces constantly but that are never a
/// company's own website.
const AGGREGATOR_DOMAINS: [&str; 10] = [
    "facebook.com",
    "linkedin.com",
    "twitter.com",
    "x.com",
    "instagram.com",
    "youtube.com",
    "yelp.com",
    "yellowpages.com",
    "wikipedia.org",
    "crunchbase.com",
];

const SIMILARITY_THRESHOLD: f64 = 0.8;

pub enum WebsiteResolution {
    Found(String),
    NotFound,
    QuotaExceeded,
}

#[derive(Deserialize)]
struct SearchResponse {
    items: Option<Vec<SearchItem>>,
}

#[derive(Deserialize)]
struct SearchItem {
    link: String,
}

/// Maps a company name (or an explicit `Name|domain` override) to a canonical
/// base URL via the Google Custom Search JSON API.
pub struct WebsiteResolver {
    client: reqwest::Client,
    api_key: String,
    cx: String,
    rate_limiter: Arc<RateLimiter>,
}

impl WebsiteResolver {
    pub fn new(api_key: String, cx: String, rate_limiter: Arc<RateLimiter>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .unwrap();
        WebsiteResolver {
            client,
            api_key,
            cx,
            rate_limiter,
        }
    }

    pub async fn resolve(
        &self,
        company_name: &str,
        explicit_override: Option<&str>,
    ) -> WebsiteResolution {
        // An explicit override is taken verbatim after normalization, no
        // search call and no quota debit.
        if let Some(domain) = explicit_override {
            return WebsiteResolution::Found(normalize_website(domain));
        }

        if self.rate_limiter.try_acquire(Provider::Search).is_err() {
            return WebsiteResolution::QuotaExceeded;
        }

        let query = format!("{} official website", company_name);
        let request = self
            .client
            .get("https://www.googleapis.com/customsearch/v1")
            .query(&[
                ("key", self.api_key.as_str()),
                ("cx", self.cx.as_str()),
                ("q", query.as_str()),
            ]);

        let response = match request.send().await {
            Ok(res) => res,
            Err(e) => {
                log::error!("Search request failed for {}: {:?}", company_name, e);
                return WebsiteResolution::NotFound;
            }
        };

        if response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return WebsiteResolution::QuotaExceeded;
        }
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            if body.to_lowercase().contains("quota") {
                return WebsiteResolution::QuotaExceeded;
            }
            log::error!(
                "Search API error for {}: {} - {}",
                company_name,
                status,
                body
            );
            return WebsiteResolution::NotFound;
        }

        let results = match response.json::<SearchResponse>().await {
            Ok(json) => json,
            Err(e) => {
                log::error!(
                    "Failed to parse search response for {}: {:?}",
                    company_name,
                    e
                );
                return WebsiteResolution::NotFound;
            }
        };

        for item in results.items.unwrap_or_default() {
            if is_plausible_company_site(&item.link, company_name) {
                return WebsiteResolution::Found(normalize_website(&item.link));
            }
        }

        log::warn!("No suitable website found for {}", company_name);
        WebsiteResolution::NotFound
    }
}

/// Basic sanity filter on a search hit: not a known aggregator, and the host
/// shares a token with the company name or is close to its compacted form.
pub fn is_plausible_company_site(url: &str, company_name: &str) -> bool {
    let host = match Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(String::from))
    {
        Some(h) => h.to_lowercase(),
        None => return false,
    };

    if AGGREGATOR_DOMAINS
        .iter()
        .any(|aggregator| host == *aggregator || host.ends_with(&format!(".{}", aggregator)))
    {
        return false;
    }

    let host_core = host
        .strip_prefix("www.")
        .unwrap_or(&host)
        .split('.')
        .next()
        .unwrap_or("")
        .to_string();

    let name_lower = company_name.to_lowercase();
    let tokens: Vec<&str> = name_lower
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.len() > 2)
        .collect();

    if tokens.iter().any(|token| host_core.contains(token)) {
        return true;
    }

    let compact_name: String = name_lower.chars().filter(|c| c.is_alphanumeric()).collect();
    strsim::jaro_winkler(&host_core, &compact_name) > SIMILARITY_THRESHOLD
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::rate_limiter::zero_quota;

    #[tokio::test]
    async fn explicit_override_bypasses_search_and_quota() {
        // Zero quota everywhere: any search attempt would come back
        // QuotaExceeded, so a Found result proves no call was made.
        let limiter = Arc::new(RateLimiter::from_settings(zero_quota()));
        let resolver = WebsiteResolver::new("key".to_string(), "cx".to_string(), limiter);

        match resolver.resolve("Tesla", Some("tesla.com/")).await {
            WebsiteResolution::Found(website) => assert_eq!(website, "https://tesla.com"),
            _ => panic!("override should resolve without a search call"),
        }
    }

    #[tokio::test]
    async fn exhausted_quota_is_distinct_from_not_found() {
        let limiter = Arc::new(RateLimiter::from_settings(zero_quota()));
        let resolver = WebsiteResolver::new("key".to_string(), "cx".to_string(), limiter);

        assert!(matches!(
            resolver.resolve("Tesla", None).await,
            WebsiteResolution::QuotaExceeded
        ));
    }

    #[test]
    fn aggregators_are_rejected() {
        assert!(!is_plausible_company_site(
            "https://www.linkedin.com/company/tesla",
            "Tesla"
        ));
        assert!(!is_plausible_company_site(
            "https://en.wikipedia.org/wiki/Tesla,_Inc.",
            "Tesla"
        ));
    }

    #[test]
    fn token_match_accepts_company_domain() {
        assert!(is_plausible_company_site("https://www.tesla.com/", "Tesla"));
        assert!(is_plausible_company_site(
            "https://acme-robotics.io/about",
            "Acme Robotics"
        ));
    }

    #[test]
    fn unrelated_domain_is_rejected() {
        assert!(!is_plausible_company_site(
            "https://www.example-shop.net/",
            "Tesla"
        ));
    }

    #[test]
    fn similar_compact_name_is_accepted() {
        assert!(is_plausible_company_site(
            "https://acmerobotic.com/",
            "Acme Robotics"
        ));
    }
}
