use std::sync::Arc;
use std::time::Duration;

use fake_user_agent::get_rua;
use serde_json::Value;

use crate::domain::financials::{FinancialSnapshot, FinancialSource};

use super::{Provider, RateLimiter};

const YAHOO_SEARCH_URL: &str = "https://query2.finance.yahoo.com/v1/finance/search";
const YAHOO_SUMMARY_URL: &str = "https://query2.finance.yahoo.com/v10/finance/quoteSummary";
const ALPHA_VANTAGE_URL: &str = "https://www.alphavantage.co/query";

/// Per-invocation state machine: resolve a ticker, try the primary provider,
/// fall back to the secondary under its quota, or end with no data.
enum ReconcileState {
    ResolveTicker,
    TryPrimaryProvider(String),
    TrySecondaryProvider(String),
    Done(FinancialSnapshot),
    NoData,
}

enum ProviderOutcome {
    Success {
        market_cap: Option<f64>,
        revenue: Option<f64>,
    },
    RateLimited,
    Error,
}

/// Maps (company name, website) to a FinancialSnapshot by querying ranked
/// providers. The secondary provider is never called once the primary
/// succeeds, so conflicting figures from the same run cannot arise.
pub struct FinancialReconciler {
    client: reqwest::Client,
    alpha_vantage_key: Option<String>,
    rate_limiter: Arc<RateLimiter>,
}

impl FinancialReconciler {
    pub fn new(alpha_vantage_key: Option<String>, rate_limiter: Arc<RateLimiter>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .unwrap();
        FinancialReconciler {
            client,
            alpha_vantage_key,
            rate_limiter,
        }
    }

    pub async fn reconcile(&self, company_name: &str, _website: &str) -> FinancialSnapshot {
        let mut state = ReconcileState::ResolveTicker;

        loop {
            state = match state {
                ReconcileState::ResolveTicker => match self.resolve_ticker(company_name).await {
                    Some(ticker) => ReconcileState::TryPrimaryProvider(ticker),
                    None => {
                        log::warn!("No ticker resolved for {}", company_name);
                        ReconcileState::NoData
                    }
                },
                ReconcileState::TryPrimaryProvider(ticker) => {
                    let outcome = self.query_yahoo(&ticker).await;
                    if !matches!(outcome, ProviderOutcome::Success { .. }) {
                        log::warn!(
                            "Primary financial provider failed for {}, trying secondary",
                            company_name
                        );
                    }
                    after_primary(ticker, outcome)
                }
                ReconcileState::TrySecondaryProvider(ticker) => {
                    let key = match &self.alpha_vantage_key {
                        Some(key) => key.clone(),
                        None => return FinancialSnapshot::none(),
                    };
                    // Quota is checked before the call; an exhausted window
                    // means no attempt at all.
                    if self.rate_limiter.try_acquire(Provider::AlphaVantage).is_err() {
                        log::warn!(
                            "Alpha Vantage quota exhausted, no financial data for {}",
                            company_name
                        );
                        return FinancialSnapshot::none();
                    }
                    let outcome = self.query_alpha_vantage(&ticker, &key).await;
                    after_secondary(ticker, outcome)
                }
                ReconcileState::Done(snapshot) => return snapshot,
                ReconcileState::NoData => return FinancialSnapshot::none(),
            };
        }
    }

    async fn resolve_ticker(&self, company_name: &str) -> Option<String> {
        if self.rate_limiter.try_acquire(Provider::YahooFinance).is_err() {
            log::warn!("Yahoo quota exhausted during ticker lookup for {}", company_name);
            return None;
        }

        let response = self
            .client
            .get(YAHOO_SEARCH_URL)
            .query(&[("q", company_name)])
            .header("User-Agent", get_rua())
            .send()
            .await;

        let body: Value = match response {
            Ok(res) if res.status().is_success() => res.json().await.ok()?,
            Ok(res) => {
                log::warn!(
                    "Ticker search returned {} for {}",
                    res.status(),
                    company_name
                );
                return None;
            }
            Err(e) => {
                log::warn!("Ticker search failed for {}: {:?}", company_name, e);
                return None;
            }
        };

        body.get("quotes")?
            .as_array()?
            .iter()
            .find(|quote| {
                quote
                    .get("isYahooFinance")
                    .and_then(Value::as_bool)
                    .unwrap_or(false)
            })
            .and_then(|quote| quote.get("symbol"))
            .and_then(Value::as_str)
            .map(String::from)
    }

    async fn query_yahoo(&self, ticker: &str) -> ProviderOutcome {
        if self.rate_limiter.try_acquire(Provider::YahooFinance).is_err() {
            return ProviderOutcome::RateLimited;
        }

        let url = format!("{}/{}", YAHOO_SUMMARY_URL, ticker);
        let response = self
            .client
            .get(url)
            .query(&[("modules", "price,financialData")])
            .header("User-Agent", get_rua())
            .send()
            .await;

        let body: Value = match response {
            Ok(res) if res.status() == reqwest::StatusCode::TOO_MANY_REQUESTS => {
                return ProviderOutcome::RateLimited;
            }
            Ok(res) if res.status().is_success() => match res.json().await {
                Ok(json) => json,
                Err(_) => return ProviderOutcome::Error,
            },
            Ok(res) => {
                log::warn!("Yahoo quoteSummary returned {} for {}", res.status(), ticker);
                return ProviderOutcome::Error;
            }
            Err(_) => return ProviderOutcome::Error,
        };

        let result = &body["quoteSummary"]["result"][0];
        let market_cap = raw_number(&result["price"]["marketCap"]);
        let revenue = raw_number(&result["financialData"]["totalRevenue"]);

        match market_cap.is_none() && revenue.is_none() {
            true => ProviderOutcome::Error,
            false => ProviderOutcome::Success {
                market_cap,
                revenue,
            },
        }
    }

    async fn query_alpha_vantage(&self, ticker: &str, api_key: &str) -> ProviderOutcome {
        let response = self
            .client
            .get(ALPHA_VANTAGE_URL)
            .query(&[
                ("function", "OVERVIEW"),
                ("symbol", ticker),
                ("apikey", api_key),
            ])
            .send()
            .await;

        let body: Value = match response {
            Ok(res) if res.status().is_success() => match res.json().await {
                Ok(json) => json,
                Err(_) => return ProviderOutcome::Error,
            },
            Ok(_) | Err(_) => return ProviderOutcome::Error,
        };

        // Alpha Vantage reports quota exhaustion inside a 200 body.
        if body.get("Note").is_some() || body.get("Information").is_some() {
            return ProviderOutcome::RateLimited;
        }

        let market_cap = string_number(&body["MarketCapitalization"]);
        let revenue = string_number(&body["RevenueTTM"]);

        match market_cap.is_none() && revenue.is_none() {
            true => ProviderOutcome::Error,
            false => ProviderOutcome::Success {
                market_cap,
                revenue,
            },
        }
    }
}

/// Where the machine goes after the primary provider answers: success ends
/// the run, anything else hands the ticker to the secondary.
fn after_primary(ticker: String, outcome: ProviderOutcome) -> ReconcileState {
    match outcome {
        ProviderOutcome::Success {
            market_cap,
            revenue,
        } => ReconcileState::Done(snapshot(
            ticker,
            FinancialSource::YahooFinance,
            market_cap,
            revenue,
        )),
        ProviderOutcome::RateLimited | ProviderOutcome::Error => {
            ReconcileState::TrySecondaryProvider(ticker)
        }
    }
}

/// The secondary provider is the last resort: success ends the run, anything
/// else is terminal no-data.
fn after_secondary(ticker: String, outcome: ProviderOutcome) -> ReconcileState {
    match outcome {
        ProviderOutcome::Success {
            market_cap,
            revenue,
        } => ReconcileState::Done(snapshot(
            ticker,
            FinancialSource::AlphaVantage,
            market_cap,
            revenue,
        )),
        ProviderOutcome::RateLimited | ProviderOutcome::Error => ReconcileState::NoData,
    }
}

fn snapshot(
    ticker: String,
    source: FinancialSource,
    market_cap: Option<f64>,
    revenue: Option<f64>,
) -> FinancialSnapshot {
    FinancialSnapshot {
        ticker: Some(ticker),
        market_cap,
        revenue,
        source,
        as_of: FinancialSnapshot::capture_time(),
    }
}

/// Yahoo wraps numerics as `{"raw": 500000000, "fmt": "$500M"}`; only the raw
/// value is ever kept.
fn raw_number(value: &Value) -> Option<f64> {
    value.get("raw").and_then(Value::as_f64).or_else(|| value.as_f64())
}

fn string_number(value: &Value) -> Option<f64> {
    match value {
        Value::String(s) => s.parse().ok(),
        other => other.as_f64(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn raw_number_unwraps_yahoo_shape() {
        assert_eq!(raw_number(&json!({"raw": 500000000, "fmt": "$500M"})), Some(500000000.0));
        assert_eq!(raw_number(&json!(123.5)), Some(123.5));
        assert_eq!(raw_number(&json!({"fmt": "$500M"})), None);
        assert_eq!(raw_number(&json!(null)), None);
    }

    #[test]
    fn rate_limited_primary_hands_off_to_secondary() {
        let state = after_primary("TSLA".to_string(), ProviderOutcome::RateLimited);
        assert!(matches!(
            state,
            ReconcileState::TrySecondaryProvider(ticker) if ticker == "TSLA"
        ));
    }

    #[test]
    fn secondary_success_keeps_its_source_and_raw_figures() {
        let state = after_secondary(
            "TSLA".to_string(),
            ProviderOutcome::Success {
                market_cap: Some(500_000_000.0),
                revenue: None,
            },
        );

        match state {
            ReconcileState::Done(snapshot) => {
                assert_eq!(snapshot.source, FinancialSource::AlphaVantage);
                assert_eq!(snapshot.ticker, Some("TSLA".to_string()));
                assert_eq!(snapshot.market_cap, Some(500_000_000.0));
                assert_eq!(snapshot.revenue, None);
            }
            _ => panic!("secondary success should end with a snapshot"),
        }
    }

    #[test]
    fn failed_secondary_is_terminal_no_data() {
        let state = after_secondary("TSLA".to_string(), ProviderOutcome::Error);
        assert!(matches!(state, ReconcileState::NoData));
    }

    #[tokio::test]
    async fn failed_ticker_resolution_yields_exactly_no_data() {
        use crate::services::rate_limiter::zero_quota;
        use crate::services::RateLimiter;
        use std::sync::Arc;

        // Zero quota makes the ticker lookup fail before any network call.
        let limiter = Arc::new(RateLimiter::from_settings(zero_quota()));
        let reconciler = FinancialReconciler::new(Some("key".to_string()), limiter);

        let snapshot = reconciler.reconcile("Acme", "https://acme.com").await;

        assert_eq!(snapshot.source, FinancialSource::None);
        assert_eq!(snapshot.ticker, None);
        assert_eq!(snapshot.market_cap, None);
        assert_eq!(snapshot.revenue, None);
    }

    #[test]
    fn string_number_parses_alpha_vantage_shape() {
        assert_eq!(string_number(&json!("500000000")), Some(500000000.0));
        assert_eq!(string_number(&json!("None")), None);
        assert_eq!(string_number(&json!(42)), Some(42.0));
    }
}
