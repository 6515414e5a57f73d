use std::env;
use std::str::FromStr;
use std::time::Duration;

const DEFAULT_COINGECKO_URL: &str = "https://api.coingecko.com/api/v3";
const DEFAULT_DEXSCREENER_URL: &str = "https://api.dexscreener.com";
const DEFAULT_ALCHEMY_URL_TEMPLATE: &str = "https://{network}.g.alchemy.com/v2/{key}";
const DEFAULT_ETHERSCAN_URL: &str = "https://api.etherscan.io/v2/api";

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    /// Bearer token required on `/api/*`. Auth is disabled when unset.
    pub api_token: Option<String>,

    // Price index + DEX fallback
    pub coingecko_api_url: String,
    pub coingecko_api_key: Option<String>,
    pub dexscreener_api_url: String,

    // Transfer history sources
    pub alchemy_api_key: Option<String>,
    pub alchemy_url_template: String,
    pub etherscan_api_url: String,
    pub etherscan_api_key: Option<String>,

    // Pricing
    pub price_cache_ttl_secs: u64,
    pub price_batch_size: usize,
    pub price_batch_delay_ms: u64,

    // Timeouts
    pub price_timeout_secs: u64,
    pub transfer_timeout_secs: u64,
    pub metadata_timeout_secs: u64,

    // Analysis
    pub max_concurrent_lookups: usize,
    pub default_days_back: u32,
    pub max_days_back: u32,
    pub assume_now_for_missing_timestamp: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 8080,
            api_token: None,
            coingecko_api_url: DEFAULT_COINGECKO_URL.into(),
            coingecko_api_key: None,
            dexscreener_api_url: DEFAULT_DEXSCREENER_URL.into(),
            alchemy_api_key: None,
            alchemy_url_template: DEFAULT_ALCHEMY_URL_TEMPLATE.into(),
            etherscan_api_url: DEFAULT_ETHERSCAN_URL.into(),
            etherscan_api_key: None,
            price_cache_ttl_secs: 300,
            price_batch_size: 10,
            price_batch_delay_ms: 1_100,
            price_timeout_secs: 10,
            transfer_timeout_secs: 15,
            metadata_timeout_secs: 5,
            max_concurrent_lookups: 4,
            default_days_back: 90,
            max_days_back: 365,
            assume_now_for_missing_timestamp: false,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let defaults = Self::default();

        let config = Self {
            host: env::var("HOST").unwrap_or(defaults.host),
            port: env::var("PORT")
                .unwrap_or_else(|_| "8080".into())
                .parse()?,
            api_token: non_empty_var("API_TOKEN"),

            coingecko_api_url: env::var("COINGECKO_API_URL").unwrap_or(defaults.coingecko_api_url),
            coingecko_api_key: non_empty_var("COINGECKO_API_KEY"),
            dexscreener_api_url: env::var("DEXSCREENER_API_URL")
                .unwrap_or(defaults.dexscreener_api_url),

            alchemy_api_key: non_empty_var("ALCHEMY_API_KEY"),
            alchemy_url_template: env::var("ALCHEMY_URL_TEMPLATE")
                .unwrap_or(defaults.alchemy_url_template),
            etherscan_api_url: env::var("ETHERSCAN_API_URL").unwrap_or(defaults.etherscan_api_url),
            etherscan_api_key: non_empty_var("ETHERSCAN_API_KEY"),

            price_cache_ttl_secs: parse_var("PRICE_CACHE_TTL_SECS", defaults.price_cache_ttl_secs),
            price_batch_size: parse_var("PRICE_BATCH_SIZE", defaults.price_batch_size).max(1),
            price_batch_delay_ms: parse_var("PRICE_BATCH_DELAY_MS", defaults.price_batch_delay_ms),

            price_timeout_secs: parse_var("PRICE_TIMEOUT_SECS", defaults.price_timeout_secs),
            transfer_timeout_secs: parse_var("TRANSFER_TIMEOUT_SECS", defaults.transfer_timeout_secs),
            metadata_timeout_secs: parse_var("METADATA_TIMEOUT_SECS", defaults.metadata_timeout_secs),

            max_concurrent_lookups: parse_var(
                "MAX_CONCURRENT_LOOKUPS",
                defaults.max_concurrent_lookups,
            )
            .max(1),
            default_days_back: parse_var("DEFAULT_DAYS_BACK", defaults.default_days_back),
            max_days_back: parse_var("MAX_DAYS_BACK", defaults.max_days_back).max(1),
            assume_now_for_missing_timestamp: parse_var(
                "ASSUME_NOW_FOR_MISSING_TIMESTAMP",
                defaults.assume_now_for_missing_timestamp,
            ),
        };

        Ok(config)
    }

    pub fn price_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.price_cache_ttl_secs)
    }

    pub fn price_batch_delay(&self) -> Duration {
        Duration::from_millis(self.price_batch_delay_ms)
    }

    pub fn price_timeout(&self) -> Duration {
        Duration::from_secs(self.price_timeout_secs)
    }

    pub fn transfer_timeout(&self) -> Duration {
        Duration::from_secs(self.transfer_timeout_secs)
    }

    pub fn metadata_timeout(&self) -> Duration {
        Duration::from_secs(self.metadata_timeout_secs)
    }

    /// Clamp a requested lookback to `1..=max_days_back`, using the default
    /// when none was given.
    pub fn clamp_days_back(&self, requested: Option<u32>) -> u32 {
        requested
            .unwrap_or(self.default_days_back)
            .clamp(1, self.max_days_back)
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parse_var<T: FromStr>(key: &str, default: T) -> T {
    match env::var(key) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            tracing::warn!(key, value = %raw, "Invalid config value, using default");
            default
        }),
        Err(_) => default,
    }
}
