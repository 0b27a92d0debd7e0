use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    pub logger: LoggerConfig,
    pub database: DatabaseConfig,
    pub exchanges: ExchangesConfig,
    pub engine: EngineConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggerConfig {
    pub level: String,
    pub prefix: String,
    /// Emit JSON lines instead of the human format.
    pub json: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Directory holding the store snapshot.
    pub path: PathBuf,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExchangesConfig {
    pub gdax: CoinbaseConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoinbaseConfig {
    pub ws_url: String,
    // Not needed by the public ticker channel
    pub key: Option<String>,
    pub secret: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    pub timeseries_capacity: usize, // points kept per instrument
    pub default_algorithm: String,  // used when a campaign names none
    pub ticker_buffer: usize,       // feed → pump channel depth
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            prefix: "cryptotrader".into(),
            json: false,
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("/var/lib/cryptotrader"),
        }
    }
}

impl Default for CoinbaseConfig {
    fn default() -> Self {
        Self {
            ws_url: "wss://ws-feed.exchange.coinbase.com".into(),
            key: None,
            secret: None,
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            timeseries_capacity: 5000,
            default_algorithm: "trend".into(),
            ticker_buffer: 1024,
        }
    }
}

fn env(name: &str) -> Option<String> {
    std::env::var(format!("CRYPTOTRADER_{name}"))
        .ok()
        .filter(|v| !v.is_empty())
}

/// Parse `CRYPTOTRADER_{name}` into `target`, noting unparsable values in `ignored`.
fn env_parse<T: std::str::FromStr>(name: &str, target: &mut T, ignored: &mut Vec<String>) {
    if let Some(raw) = env(name) {
        match raw.parse() {
            Ok(v) => *target = v,
            Err(_) => ignored.push(format!("Ignoring invalid CRYPTOTRADER_{name}={raw}")),
        }
    }
}

impl Config {
    /// Load configuration from environment variables (.env file) with defaults.
    ///
    /// Also returns one message per value that could not be parsed; those keep
    /// their default. Callers log them once tracing is installed.
    ///
    /// Env vars (all optional):
    ///   CRYPTOTRADER_LOGGER_LEVEL, CRYPTOTRADER_LOGGER_PREFIX, CRYPTOTRADER_LOGGER_JSON
    ///   CRYPTOTRADER_DATABASE_PATH (snapshot directory)
    ///   CRYPTOTRADER_EXCHANGES_GDAX_WS_URL, _KEY, _SECRET
    ///   CRYPTOTRADER_ENGINE_TIMESERIES_CAPACITY, _DEFAULT_ALGORITHM, _TICKER_BUFFER
    pub fn load_or_default() -> (Self, Vec<String>) {
        let _ = dotenv::dotenv();

        let mut config = Self::default();
        let mut ignored = Vec::new();

        if let Some(level) = env("LOGGER_LEVEL") {
            config.logger.level = level;
        }
        if let Some(prefix) = env("LOGGER_PREFIX") {
            config.logger.prefix = prefix;
        }
        if let Some(json) = env("LOGGER_JSON") {
            config.logger.json = json == "true" || json == "1";
        }

        if let Some(path) = env("DATABASE_PATH") {
            config.database.path = PathBuf::from(path);
        }

        if let Some(url) = env("EXCHANGES_GDAX_WS_URL") {
            config.exchanges.gdax.ws_url = url;
        }
        config.exchanges.gdax.key = env("EXCHANGES_GDAX_KEY");
        config.exchanges.gdax.secret = env("EXCHANGES_GDAX_SECRET");

        env_parse("ENGINE_TIMESERIES_CAPACITY", &mut config.engine.timeseries_capacity, &mut ignored);
        if let Some(name) = env("ENGINE_DEFAULT_ALGORITHM") {
            config.engine.default_algorithm = name;
        }
        env_parse("ENGINE_TICKER_BUFFER", &mut config.engine.ticker_buffer, &mut ignored);

        (config, ignored)
    }

    /// Snapshot file inside the database directory.
    pub fn store_file(&self) -> PathBuf {
        self.database.path.join("cryptotrader.json")
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(
            self.engine.timeseries_capacity > 0,
            "engine.timeseries_capacity must be positive"
        );
        anyhow::ensure!(self.engine.ticker_buffer > 0, "engine.ticker_buffer must be positive");
        anyhow::ensure!(
            !self.engine.default_algorithm.trim().is_empty(),
            "engine.default_algorithm must be set"
        );
        let ws = url::Url::parse(&self.exchanges.gdax.ws_url)?;
        anyhow::ensure!(
            matches!(ws.scheme(), "ws" | "wss"),
            "exchanges.gdax.ws_url must be a ws:// or wss:// url, got {ws}"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.engine.timeseries_capacity, 5000);
        assert_eq!(config.engine.default_algorithm, "trend");
        assert_eq!(config.logger.level, "info");
        assert_eq!(config.store_file(), PathBuf::from("/var/lib/cryptotrader/cryptotrader.json"));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = Config::default();
        config.engine.timeseries_capacity = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.exchanges.gdax.ws_url = "https://example.com".into();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.engine.default_algorithm = " ".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_env_values_are_reported() {
        std::env::set_var("CRYPTOTRADER_ENGINE_TICKER_BUFFER", "lots");
        std::env::set_var("CRYPTOTRADER_ENGINE_TIMESERIES_CAPACITY", "250");
        let (config, ignored) = Config::load_or_default();
        std::env::remove_var("CRYPTOTRADER_ENGINE_TICKER_BUFFER");
        std::env::remove_var("CRYPTOTRADER_ENGINE_TIMESERIES_CAPACITY");

        assert_eq!(config.engine.ticker_buffer, 1024);
        assert_eq!(config.engine.timeseries_capacity, 250);
        assert_eq!(ignored, vec!["Ignoring invalid CRYPTOTRADER_ENGINE_TICKER_BUFFER=lots".to_string()]);
    }
}
