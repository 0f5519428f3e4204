use std::collections::HashMap;
use std::fmt;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::configuration::QuotaSettings;

const WINDOW: Duration = Duration::from_secs(60);
const DAY: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Provider {
    Search,
    Ai,
    YahooFinance,
    AlphaVantage,
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Provider::Search => "search",
            Provider::Ai => "ai",
            Provider::YahooFinance => "yahoo_finance",
            Provider::AlphaVantage => "alpha_vantage",
        };
        write!(f, "{}", name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuotaExceeded(pub Provider);

impl fmt::Display for QuotaExceeded {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "quota exceeded for provider {}", self.0)
    }
}

struct ProviderQuota {
    calls_made_in_window: u32,
    window_start: Instant,
    max_calls_per_window: u32,
    calls_made_today: u32,
    day_start: Instant,
    max_calls_per_day: u32,
}

impl ProviderQuota {
    fn new(max_calls_per_window: u32, max_calls_per_day: u32, now: Instant) -> Self {
        ProviderQuota {
            calls_made_in_window: 0,
            window_start: now,
            max_calls_per_window,
            calls_made_today: 0,
            day_start: now,
            max_calls_per_day,
        }
    }

    fn try_debit(&mut self, now: Instant) -> bool {
        if now.duration_since(self.window_start) >= WINDOW {
            self.window_start = now;
            self.calls_made_in_window = 0;
        }
        if now.duration_since(self.day_start) >= DAY {
            self.day_start = now;
            self.calls_made_today = 0;
        }

        if self.calls_made_in_window >= self.max_calls_per_window
            || self.calls_made_today >= self.max_calls_per_day
        {
            return false;
        }

        self.calls_made_in_window += 1;
        self.calls_made_today += 1;
        true
    }
}

/// Process-wide quota tracker. Every outbound provider call acquires a quota
/// unit before being attempted; quota replenishes when its time window
/// elapses, nothing is released explicitly. State is never persisted across
/// restarts. Injected into every provider-calling component so tests can
/// substitute a limiter with deterministic ceilings.
pub struct RateLimiter {
    quotas: Mutex<HashMap<Provider, ProviderQuota>>,
}

impl RateLimiter {
    pub fn from_settings(settings: QuotaSettings) -> Self {
        let now = Instant::now();
        let mut quotas = HashMap::new();
        quotas.insert(
            Provider::Search,
            ProviderQuota::new(settings.search_per_minute, settings.search_per_day, now),
        );
        quotas.insert(
            Provider::Ai,
            ProviderQuota::new(settings.ai_per_minute, settings.ai_per_day, now),
        );
        quotas.insert(
            Provider::YahooFinance,
            ProviderQuota::new(settings.yahoo_per_minute, settings.yahoo_per_day, now),
        );
        quotas.insert(
            Provider::AlphaVantage,
            ProviderQuota::new(
                settings.alpha_vantage_per_minute,
                settings.alpha_vantage_per_day,
                now,
            ),
        );
        RateLimiter {
            quotas: Mutex::new(quotas),
        }
    }

    pub fn try_acquire(&self, provider: Provider) -> Result<(), QuotaExceeded> {
        self.try_acquire_at(provider, Instant::now())
    }

    fn try_acquire_at(&self, provider: Provider, now: Instant) -> Result<(), QuotaExceeded> {
        let mut quotas = self.quotas.lock().unwrap();
        let quota = quotas.get_mut(&provider).ok_or(QuotaExceeded(provider))?;
        match quota.try_debit(now) {
            true => Ok(()),
            false => Err(QuotaExceeded(provider)),
        }
    }
}

#[cfg(test)]
pub fn zero_quota() -> QuotaSettings {
    QuotaSettings {
        search_per_minute: 0,
        search_per_day: 0,
        ai_per_minute: 0,
        ai_per_day: 0,
        yahoo_per_minute: 0,
        yahoo_per_day: 0,
        alpha_vantage_per_minute: 0,
        alpha_vantage_per_day: 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter(per_minute: u32, per_day: u32) -> RateLimiter {
        RateLimiter::from_settings(QuotaSettings {
            search_per_minute: per_minute,
            search_per_day: per_day,
            ai_per_minute: per_minute,
            ai_per_day: per_day,
            yahoo_per_minute: per_minute,
            yahoo_per_day: per_day,
            alpha_vantage_per_minute: per_minute,
            alpha_vantage_per_day: per_day,
        })
    }

    #[test]
    fn exhausted_window_rejects_until_it_rolls() {
        let limiter = limiter(2, 100);
        let start = Instant::now();

        assert!(limiter.try_acquire_at(Provider::AlphaVantage, start).is_ok());
        assert!(limiter.try_acquire_at(Provider::AlphaVantage, start).is_ok());
        assert_eq!(
            limiter.try_acquire_at(Provider::AlphaVantage, start),
            Err(QuotaExceeded(Provider::AlphaVantage))
        );

        let next_window = start + Duration::from_secs(61);
        assert!(limiter
            .try_acquire_at(Provider::AlphaVantage, next_window)
            .is_ok());
    }

    #[test]
    fn daily_ceiling_survives_window_rolls() {
        let limiter = limiter(10, 3);
        let start = Instant::now();

        for i in 0..3 {
            let now = start + Duration::from_secs(61 * i);
            assert!(limiter.try_acquire_at(Provider::Search, now).is_ok());
        }

        let later = start + Duration::from_secs(61 * 3);
        assert_eq!(
            limiter.try_acquire_at(Provider::Search, later),
            Err(QuotaExceeded(Provider::Search))
        );
    }

    #[test]
    fn providers_are_tracked_independently() {
        let limiter = limiter(1, 1);
        let now = Instant::now();

        assert!(limiter.try_acquire_at(Provider::Search, now).is_ok());
        assert!(limiter.try_acquire_at(Provider::Ai, now).is_ok());
        assert!(limiter.try_acquire_at(Provider::Search, now).is_err());
    }
}
