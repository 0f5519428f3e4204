use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FinancialSource {
    YahooFinance,
    AlphaVantage,
    None,
}

impl FinancialSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            FinancialSource::YahooFinance => "yahoo_finance",
            FinancialSource::AlphaVantage => "alpha_vantage",
            FinancialSource::None => "none",
        }
    }

    pub fn from_str_or_none(value: &str) -> Self {
        match value {
            "yahoo_finance" => FinancialSource::YahooFinance,
            "alpha_vantage" => FinancialSource::AlphaVantage,
            _ => FinancialSource::None,
        }
    }
}

/// Raw numeric financial figures for one company. When `source` is `None`
/// every numeric field is null; a failed provider call never leaves a
/// partially filled snapshot behind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinancialSnapshot {
    pub ticker: Option<String>,
    pub market_cap: Option<f64>,
    pub revenue: Option<f64>,
    pub source: FinancialSource,
    pub as_of: DateTime<Utc>,
}

impl FinancialSnapshot {
    pub fn none() -> Self {
        FinancialSnapshot {
            ticker: None,
            market_cap: None,
            revenue: None,
            source: FinancialSource::None,
            as_of: Self::capture_time(),
        }
    }

    /// Capture timestamps truncated to microseconds, the precision of a
    /// `timestamptz` column, so a stored snapshot compares equal to the one
    /// that was written.
    pub fn capture_time() -> DateTime<Utc> {
        Utc::now().trunc_subsecs(6)
    }

    pub fn is_empty(&self) -> bool {
        self.source == FinancialSource::None
    }
}

/// Compact human-readable form of a raw figure, e.g. `$1.50B`. Presentation
/// only; the stored value stays numeric.
pub fn format_compact(amount: f64) -> String {
    let abs = amount.abs();
    if abs >= 1_000_000_000.0 {
        format!("${:.2}B", amount / 1_000_000_000.0)
    } else if abs >= 1_000_000.0 {
        format!("${:.2}M", amount / 1_000_000.0)
    } else if abs >= 1_000.0 {
        format!("${:.2}K", amount / 1_000.0)
    } else {
        format!("${:.0}", amount)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_snapshot_has_no_numerics() {
        let snapshot = FinancialSnapshot::none();
        assert!(snapshot.is_empty());
        assert_eq!(snapshot.ticker, None);
        assert_eq!(snapshot.market_cap, None);
        assert_eq!(snapshot.revenue, None);
    }

    #[test]
    fn capture_time_fits_database_precision() {
        let time = FinancialSnapshot::capture_time();
        assert_eq!(time.timestamp_subsec_nanos() % 1_000, 0);
    }

    #[test]
    fn format_compact_scales() {
        assert_eq!(format_compact(1_500_000_000.0), "$1.50B");
        assert_eq!(format_compact(500_000_000.0), "$500.00M");
        assert_eq!(format_compact(12_500.0), "$12.50K");
        assert_eq!(format_compact(950.0), "$950");
    }
}
