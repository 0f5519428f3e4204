use serde::Deserialize;
use serde_aux::field_attributes::deserialize_number_from_string;
use sqlx::postgres::{PgConnectOptions, PgSslMode};

#[derive(Deserialize, Clone)]
pub struct Settings {
    pub database: DatabaseSettings,
    pub api_keys: ApiKeySettings,
    pub scraper: ScraperSettings,
    pub quotas: QuotaSettings,
}

#[derive(Deserialize, Clone)]
pub struct DatabaseSettings {
    pub username: String,
    pub password: String,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub port: u16,
    pub host: String,
    pub database_name: String,
    pub require_ssl: bool,
}

impl DatabaseSettings {
    pub fn without_db(&self) -> PgConnectOptions {
        let ssl_mode = match self.require_ssl {
            true => PgSslMode::Require,
            false => PgSslMode::Prefer,
        };
        PgConnectOptions::new()
            .host(&self.host)
            .username(&self.username)
            .password(&self.password)
            .port(self.port)
            .ssl_mode(ssl_mode)
    }

    pub fn with_db(&self) -> PgConnectOptions {
        self.without_db().database(&self.database_name)
    }
}

#[derive(Deserialize, Clone)]
pub struct ApiKeySettings {
    pub openai: String,
    pub google_search: String,
    pub google_search_cx: String,
    pub alpha_vantage: Option<String>,
}

#[derive(Deserialize, Clone)]
pub struct ScraperSettings {
    pub webdriver_url: String,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub driver_pool_size: usize,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub page_load_timeout_secs: u64,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub fetch_concurrency: usize,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub company_budget_secs: u64,
}

/// Per-provider call ceilings, expressed as calls per rolling minute and per
/// day. Loaded once at startup into the process-wide rate limiter.
#[derive(Deserialize, Clone, Copy)]
pub struct QuotaSettings {
    pub search_per_minute: u32,
    pub search_per_day: u32,
    pub ai_per_minute: u32,
    pub ai_per_day: u32,
    pub yahoo_per_minute: u32,
    pub yahoo_per_day: u32,
    pub alpha_vantage_per_minute: u32,
    pub alpha_vantage_per_day: u32,
}

pub fn get_configuration() -> Result<Settings, config::ConfigError> {
    let base_path = std::env::current_dir().expect("Failed to determine the current directory");

    let settings = config::Config::builder()
        .add_source(config::File::from(base_path.join("configuration.yaml")))
        .add_source(
            config::Environment::with_prefix("APP")
                .prefix_separator("_")
                .separator("__"),
        )
        .build()?;

    settings.try_deserialize::<Settings>()
}
