use std::sync::Arc;
use std::time::Duration;

use beacon::{
    configuration::get_configuration,
    dal::company_db,
    domain::company::parse_input_line,
    services::{
        exporter, CompanyOutcome, ContentFetcher, Droid, FinancialReconciler, OpenaiClient,
        PageDiscoverer, PersistenceGate, Pipeline, RateLimiter, StructuredExtractor,
        WebsiteResolver,
    },
};
use env_logger::Env;
use sqlx::postgres::PgPoolOptions;

const OUTPUT_CSV: &str = "company_data.csv";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let configuration = get_configuration().expect("Failed to read configuration.");

    let input_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "companies.txt".to_string());

    // An unreadable input list is the only process-terminating failure.
    let input = tokio::fs::read_to_string(&input_path).await?;
    let companies: Vec<_> = input.lines().filter_map(parse_input_line).collect();
    log::info!("Processing {} companies from {}", companies.len(), input_path);

    let pool_options = PgPoolOptions::new()
        .max_connections(10)
        .acquire_timeout(Duration::from_secs(10));
    let connection_pool = pool_options.connect_lazy_with(configuration.database.with_db());
    company_db::ensure_schema(&connection_pool).await?;

    let rate_limiter = Arc::new(RateLimiter::from_settings(configuration.quotas));
    let openai_client = Arc::new(OpenaiClient::new(configuration.api_keys.openai.clone()));
    let droid = Arc::new(
        Droid::new(
            &configuration.scraper.webdriver_url,
            configuration.scraper.driver_pool_size,
        )
        .await?,
    );

    let pipeline = Pipeline {
        website_resolver: WebsiteResolver::new(
            configuration.api_keys.google_search.clone(),
            configuration.api_keys.google_search_cx.clone(),
            rate_limiter.clone(),
        ),
        page_discoverer: PageDiscoverer::new(openai_client.clone(), rate_limiter.clone()),
        content_fetcher: Arc::new(ContentFetcher::new(
            droid.clone(),
            Duration::from_secs(configuration.scraper.page_load_timeout_secs),
        )),
        structured_extractor: StructuredExtractor::new(openai_client, rate_limiter.clone()),
        financial_reconciler: FinancialReconciler::new(
            configuration.api_keys.alpha_vantage.clone(),
            rate_limiter,
        ),
        persistence_gate: PersistenceGate::new(connection_pool),
        fetch_concurrency: configuration.scraper.fetch_concurrency,
        company_budget: Duration::from_secs(configuration.scraper.company_budget_secs),
    };

    let mut results = vec![];
    for company in &companies {
        match pipeline.process(company).await {
            CompanyOutcome::Resolved { record, upsert } => {
                log::info!("{}: {:?}", company.name, upsert);
                results.push(record);
            }
            CompanyOutcome::NoWebsite => {
                log::warn!("Could not find website for {}, skipping", company.name);
            }
            CompanyOutcome::SearchQuotaExceeded => {
                log::error!("Search quota exceeded at {}, continuing", company.name);
            }
        }
    }

    drop(pipeline);
    if let Ok(droid) = Arc::try_unwrap(droid) {
        droid.quit().await;
    }

    match results.is_empty() {
        true => log::warn!("No data to export"),
        false => exporter::export_csv(&results, OUTPUT_CSV)?,
    }

    log::info!("Process completed");
    Ok(())
}
