use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::domain::candidate_page::CandidatePage;
use crate::domain::company::{CompanyInput, CompanyRecord};

use super::{
    ContentFetcher, FinancialReconciler, PageDiscoverer, PageText, PersistenceGate,
    StructuredExtractor, UpsertOutcome, WebsiteResolution, WebsiteResolver,
};

/// What happened to one input company. Failures of individual stages degrade
/// the record; only a missing website ends the company early.
pub enum CompanyOutcome {
    Resolved {
        record: CompanyRecord,
        upsert: UpsertOutcome,
    },
    NoWebsite,
    SearchQuotaExceeded,
}

/// The per-company resolution sequence: website, candidate pages, rendered
/// content, structured extraction merged with financials, then the
/// persistence decision. Companies are processed one at a time; only content
/// fetches run concurrently, against independent target domains.
pub struct Pipeline {
    pub website_resolver: WebsiteResolver,
    pub page_discoverer: PageDiscoverer,
    pub content_fetcher: Arc<ContentFetcher>,
    pub structured_extractor: StructuredExtractor,
    pub financial_reconciler: FinancialReconciler,
    pub persistence_gate: PersistenceGate,
    pub fetch_concurrency: usize,
    pub company_budget: Duration,
}

impl Pipeline {
    pub async fn process(&self, input: &CompanyInput) -> CompanyOutcome {
        let name = input.name.as_str();
        log::info!("Processing company: {}", name);

        let website = match self
            .website_resolver
            .resolve(name, input.website_override.as_deref())
            .await
        {
            WebsiteResolution::Found(website) => website,
            WebsiteResolution::NotFound => {
                log::warn!("company={} stage=website_resolver reason=not_found", name);
                return CompanyOutcome::NoWebsite;
            }
            WebsiteResolution::QuotaExceeded => {
                log::error!(
                    "company={} stage=website_resolver reason=quota_exceeded",
                    name
                );
                return CompanyOutcome::SearchQuotaExceeded;
            }
        };
        log::info!("Found website for {}: {}", name, website);

        // A company we already hold is not re-scraped; only an empty stored
        // financial snapshot gets refreshed.
        match self.persistence_gate.find_existing(name, &website).await {
            Ok(Some(mut existing)) => {
                log::info!("Company {} already in store", name);
                if existing.financials.is_empty() {
                    let snapshot = self.financial_reconciler.reconcile(name, &website).await;
                    if !snapshot.is_empty() {
                        existing.financials = snapshot;
                        match self.persistence_gate.upsert(&existing).await {
                            Ok(upsert) => {
                                return CompanyOutcome::Resolved {
                                    record: existing,
                                    upsert,
                                }
                            }
                            Err(e) => log::error!(
                                "company={} stage=persistence_gate reason={:?}",
                                name,
                                e
                            ),
                        }
                    }
                }
                return CompanyOutcome::Resolved {
                    record: existing,
                    upsert: UpsertOutcome::Skipped,
                };
            }
            Ok(None) => {}
            Err(e) => log::error!("company={} stage=store_lookup reason={:?}", name, e),
        }

        let pages = self.page_discoverer.discover(&website, name).await;
        log::info!("Will scrape {} candidate pages for {}", pages.len(), name);

        // The whole fetch phase runs under the per-company wall-clock budget;
        // on expiry the company proceeds with whatever was gathered.
        let contents = match tokio::time::timeout(
            self.company_budget,
            self.fetch_candidates(name, pages),
        )
        .await
        {
            Ok(contents) => contents,
            Err(_) => {
                log::warn!("company={} stage=content_fetcher reason=budget_expired", name);
                vec![]
            }
        };

        let mut record = match contents.is_empty() {
            true => {
                log::warn!("No content scraped for {}", name);
                CompanyRecord::new(name, Some(website.clone()))
            }
            false => {
                self.structured_extractor
                    .extract(name, &website, &contents)
                    .await
            }
        };

        let snapshot = self.financial_reconciler.reconcile(name, &website).await;
        if !snapshot.is_empty() {
            record.financials = snapshot;
        }

        match self.persistence_gate.upsert(&record).await {
            Ok(upsert) => {
                log::info!("Successfully processed {}: {:?}", name, upsert);
                CompanyOutcome::Resolved { record, upsert }
            }
            Err(e) => {
                log::error!("company={} stage=persistence_gate reason={:?}", name, e);
                CompanyOutcome::Resolved {
                    record,
                    upsert: UpsertOutcome::Skipped,
                }
            }
        }
    }

    /// Fetch candidate pages with bounded concurrency, preserving relevance
    /// order in the result. A failed page is skipped, never fatal.
    async fn fetch_candidates(
        &self,
        name: &str,
        pages: Vec<CandidatePage>,
    ) -> Vec<(String, PageText)> {
        let semaphore = Arc::new(Semaphore::new(self.fetch_concurrency.max(1)));
        let mut tasks = JoinSet::new();

        for (index, page) in pages.into_iter().enumerate() {
            let fetcher = self.content_fetcher.clone();
            let semaphore = semaphore.clone();
            let company = name.to_string();
            tasks.spawn(async move {
                let _permit = semaphore.acquire().await.ok()?;
                match fetcher.fetch(&page.url).await {
                    Ok(text) if !text.body.is_empty() => Some((index, page.url, text)),
                    Ok(_) => None,
                    Err(failure) => {
                        log::warn!(
                            "company={} stage=content_fetcher url={} reason={}",
                            company,
                            page.url,
                            failure.as_str()
                        );
                        None
                    }
                }
            });
        }

        let mut fetched: Vec<(usize, String, PageText)> = vec![];
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Some(result)) => fetched.push(result),
                Ok(None) => {}
                Err(e) => log::warn!("company={} stage=content_fetcher reason={:?}", name, e),
            }
        }

        fetched.sort_by_key(|(index, _, _)| *index);
        fetched
            .into_iter()
            .map(|(_, url, text)| (url, text))
            .collect()
    }
}
