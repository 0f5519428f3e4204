use std::sync::Arc;
use std::time::Duration;

use itertools::Itertools;
use scraper::{Html, Selector};

use crate::domain::candidate_page::{sort_by_relevance, CandidatePage, PageSource};

use super::{OpenaiClient, Provider, RateLimiter};

pub const MAX_CANDIDATE_PAGES: usize = 15;
const MAX_SUB_SITEMAPS: usize = 3;

const SITEMAP_LOCATIONS: [&str; 5] = [
    "sitemap.xml",
    "sitemap_index.xml",
    "sitemap-index.xml",
    "sitemaps/sitemap.xml",
    "sitemap/sitemap.xml",
];

const DEFAULT_PATHS: [&str; 10] = [
    "about",
    "about-us",
    "company",
    "team",
    "contact",
    "investors",
    "leadership",
    "products",
    "customers",
    "careers",
];

/// Keywords that make a sitemap URL likely to carry profile content, used by
/// the deterministic fallback ranker.
const RELEVANT_KEYWORDS: [&str; 10] = [
    "about",
    "team",
    "company",
    "investor",
    "contact",
    "leadership",
    "career",
    "customer",
    "partner",
    "press",
];

/// Maps a base URL to a bounded, ranked set of candidate pages: sitemap-driven
/// when one exists, AI-ranked when the sitemap is large, fixed default paths
/// otherwise. Never returns an empty set for a non-null base URL.
pub struct PageDiscoverer {
    client: reqwest::Client,
    openai: Arc<OpenaiClient>,
    rate_limiter: Arc<RateLimiter>,
}

impl PageDiscoverer {
    pub fn new(openai: Arc<OpenaiClient>, rate_limiter: Arc<RateLimiter>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap();
        PageDiscoverer {
            client,
            openai,
            rate_limiter,
        }
    }

    pub async fn discover(&self, base_url: &str, company_name: &str) -> Vec<CandidatePage> {
        let sitemap_urls = self.collect_sitemap_urls(base_url).await;

        let mut pages = match sitemap_urls.is_empty() {
            true => {
                log::warn!("No sitemap found for {}, using default paths", base_url);
                default_candidate_pages(base_url)
            }
            false if sitemap_urls.len() <= MAX_CANDIDATE_PAGES => sitemap_urls
                .into_iter()
                .enumerate()
                .map(|(rank, url)| CandidatePage {
                    url,
                    relevance_rank: rank,
                    source: PageSource::Sitemap,
                })
                .collect(),
            false => self.rank_sitemap_urls(base_url, company_name, sitemap_urls).await,
        };

        pages.truncate(MAX_CANDIDATE_PAGES);
        sort_by_relevance(&mut pages);
        pages
    }

    async fn collect_sitemap_urls(&self, base_url: &str) -> Vec<String> {
        for location in SITEMAP_LOCATIONS {
            let sitemap_url = format!("{}/{}", base_url.trim_end_matches('/'), location);
            let body = match self.fetch_xml(&sitemap_url).await {
                Some(body) => body,
                None => continue,
            };

            let mut urls = parse_sitemap_locs(&body);
            if urls.is_empty() {
                continue;
            }

            // A sitemap index lists further sitemaps; chase a bounded number
            // of them one level deep.
            if urls.iter().all(|u| u.ends_with(".xml")) {
                let sub_sitemaps: Vec<String> =
                    urls.drain(..).take(MAX_SUB_SITEMAPS).collect();
                for sub in sub_sitemaps {
                    if let Some(sub_body) = self.fetch_xml(&sub).await {
                        urls.extend(parse_sitemap_locs(&sub_body));
                    }
                }
            }

            let urls: Vec<String> = urls.into_iter().unique().collect();
            if !urls.is_empty() {
                log::info!("Found {} URLs in sitemap at {}", urls.len(), sitemap_url);
                return urls;
            }
        }
        vec![]
    }

    async fn fetch_xml(&self, url: &str) -> Option<String> {
        match self.client.get(url).send().await {
            Ok(res) if res.status().is_success() => res.text().await.ok(),
            Ok(_) => None,
            Err(e) => {
                log::warn!("Error accessing sitemap at {}: {:?}", url, e);
                None
            }
        }
    }

    async fn rank_sitemap_urls(
        &self,
        base_url: &str,
        company_name: &str,
        urls: Vec<String>,
    ) -> Vec<CandidatePage> {
        if self.rate_limiter.try_acquire(Provider::Ai).is_ok() {
            match self
                .openai
                .rank_candidate_urls(company_name, base_url, &urls, MAX_CANDIDATE_PAGES)
                .await
            {
                Ok(ranked) => {
                    let pages = ai_ranked_pages(ranked, &urls);
                    match pages.is_empty() {
                        false => return pages,
                        true => log::warn!(
                            "AI ranking returned no sitemap URLs for {}",
                            company_name
                        ),
                    }
                }
                Err(e) => {
                    log::warn!("AI URL ranking failed for {}: {:?}", company_name, e);
                }
            }
        } else {
            log::warn!("AI quota exhausted, keyword-ranking sitemap for {}", company_name);
        }

        rank_by_keywords(urls)
    }
}

/// Keep only ranked URLs that actually appear in the sitemap; the model
/// sometimes rewrites or invents URLs. An empty survivor set means the
/// ranking was unusable and the caller must fall back.
fn ai_ranked_pages(ranked: Vec<String>, known: &[String]) -> Vec<CandidatePage> {
    ranked
        .into_iter()
        .filter(|url| known.iter().any(|k| k == url))
        .take(MAX_CANDIDATE_PAGES)
        .enumerate()
        .map(|(rank, url)| CandidatePage {
            url,
            relevance_rank: rank,
            source: PageSource::AiRanked,
        })
        .collect()
}

/// Deterministic fallback ranker: keyword hits in the URL path first, original
/// sitemap order within each group.
pub fn rank_by_keywords(urls: Vec<String>) -> Vec<CandidatePage> {
    let mut scored: Vec<(usize, String)> = urls
        .into_iter()
        .map(|url| {
            let path = url.to_lowercase();
            let hits = RELEVANT_KEYWORDS
                .iter()
                .filter(|keyword| path.contains(*keyword))
                .count();
            (hits, url)
        })
        .collect();

    // Stable sort keeps sitemap order among equally scored URLs.
    scored.sort_by(|a, b| b.0.cmp(&a.0));

    scored
        .into_iter()
        .take(MAX_CANDIDATE_PAGES)
        .enumerate()
        .map(|(rank, (_, url))| CandidatePage {
            url,
            relevance_rank: rank,
            source: PageSource::Sitemap,
        })
        .collect()
}

pub fn default_candidate_pages(base_url: &str) -> Vec<CandidatePage> {
    let base = base_url.trim_end_matches('/');
    DEFAULT_PATHS
        .iter()
        .enumerate()
        .map(|(rank, path)| CandidatePage {
            url: format!("{}/{}", base, path),
            relevance_rank: rank,
            source: PageSource::DefaultPattern,
        })
        .collect()
}

/// Extract `<loc>` entries from sitemap XML. The HTML parser handles the
/// unknown elements fine and tolerates the malformed feeds real sites serve.
pub fn parse_sitemap_locs(xml: &str) -> Vec<String> {
    let document = Html::parse_document(xml);
    let loc_selector = Selector::parse("loc").unwrap();

    document
        .select(&loc_selector)
        .map(|loc| loc.text().collect::<String>().trim().to_string())
        .filter(|url| url.starts_with("http"))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_sitemap_extracts_locs() {
        let xml = r#"<?xml version="1.0" encoding="UTF-8"?>
            <urlset xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">
              <url><loc>https://acme.com/about</loc></url>
              <url><loc> https://acme.com/products </loc></url>
            </urlset>"#;
        assert_eq!(
            parse_sitemap_locs(xml),
            vec!["https://acme.com/about", "https://acme.com/products"]
        );
    }

    #[test]
    fn parse_sitemap_garbage_is_empty() {
        assert!(parse_sitemap_locs("not xml at all").is_empty());
    }

    #[test]
    fn default_pages_are_non_empty_and_bounded() {
        let pages = default_candidate_pages("https://acme.com/");
        assert!(!pages.is_empty());
        assert!(pages.len() <= MAX_CANDIDATE_PAGES);
        assert_eq!(pages[0].url, "https://acme.com/about");
        assert!(pages.iter().all(|p| p.source == PageSource::DefaultPattern));
    }

    #[test]
    fn keyword_ranking_prefers_profile_paths() {
        let urls = vec![
            "https://acme.com/blog/post-1".to_string(),
            "https://acme.com/about/team".to_string(),
            "https://acme.com/shop".to_string(),
            "https://acme.com/investors".to_string(),
        ];
        let ranked = rank_by_keywords(urls);

        assert_eq!(ranked[0].url, "https://acme.com/about/team");
        assert_eq!(ranked[1].url, "https://acme.com/investors");
        assert_eq!(ranked[0].relevance_rank, 0);
    }

    #[test]
    fn ranking_keeps_only_known_sitemap_urls() {
        let known = vec![
            "https://acme.com/about".to_string(),
            "https://acme.com/team".to_string(),
        ];
        let ranked = vec![
            "https://acme.com/team".to_string(),
            "https://acme.com/abot".to_string(),
        ];
        let pages = ai_ranked_pages(ranked, &known);

        assert_eq!(pages.len(), 1);
        assert_eq!(pages[0].url, "https://acme.com/team");
        assert_eq!(pages[0].source, PageSource::AiRanked);
    }

    #[test]
    fn fully_rewritten_ranking_leaves_keyword_fallback() {
        let known: Vec<String> = (0..20)
            .map(|i| format!("https://acme.com/page-{}", i))
            .collect();
        let ranked = vec!["https://elsewhere.example/about".to_string()];

        assert!(ai_ranked_pages(ranked, &known).is_empty());
        assert!(!rank_by_keywords(known).is_empty());
    }

    #[test]
    fn keyword_ranking_bounds_output() {
        let urls: Vec<String> = (0..50)
            .map(|i| format!("https://acme.com/page-{}", i))
            .collect();
        let ranked = rank_by_keywords(urls);
        assert_eq!(ranked.len(), MAX_CANDIDATE_PAGES);
    }
}
