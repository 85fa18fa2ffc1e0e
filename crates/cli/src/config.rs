use anyhow::{Context, Result};
use perpkit_brokers_common::{SimFixture, SimulatedExchange, SimulatedExchangeConfig};
use perpkit_brokers_crypto::{pair, AdapterSettings, Credentials};
use perpkit_data::csv_loader;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level `perpkit.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PerpkitConfig {
    pub credentials: Credentials,
    pub adapter: AdapterSettings,
    pub simulator: SimulatorConfig,
}

/// Seed data for the offline exchange.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulatorConfig {
    /// JSON fixture with markets, balances, positions and candles.
    pub fixture: Option<PathBuf>,
    /// Extra candle history loaded from CSV files.
    pub candles: Vec<CandleSource>,
    pub max_candles_per_request: usize,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            fixture: None,
            candles: Vec::new(),
            max_candles_per_request: 500,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandleSource {
    /// External pair (e.g. `BTC-USDT`).
    pub pair: String,
    pub file: PathBuf,
}

impl PerpkitConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("Invalid config {}", path.display()))
    }

    pub fn parse(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Command-line values win over the file.
    pub fn override_credentials(
        &mut self,
        api_key: Option<String>,
        secret: Option<String>,
        uid: Option<String>,
    ) {
        if api_key.is_some() {
            self.credentials.api_key = api_key;
        }
        if secret.is_some() {
            self.credentials.secret = secret;
        }
        if uid.is_some() {
            self.credentials.uid = uid;
        }
    }

    /// Build the simulated exchange described by the `[simulator]` table.
    pub fn build_simulator(&self) -> Result<SimulatedExchange> {
        let fixture = match &self.simulator.fixture {
            Some(path) => {
                let content = std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read fixture {}", path.display()))?;
                serde_json::from_str(&content)
                    .with_context(|| format!("Invalid fixture {}", path.display()))?
            }
            None => SimFixture::default(),
        };

        let mut exchange = SimulatedExchange::from_fixture(
            fixture,
            SimulatedExchangeConfig {
                max_candles_per_request: self.simulator.max_candles_per_request,
                ..Default::default()
            },
        );
        for source in &self.simulator.candles {
            let candles = csv_loader::load_candles_from_csv(&source.file)
                .with_context(|| format!("Failed to load {}", source.file.display()))?;
            let symbol = pair::ext_pair_to_pair(&source.pair, &self.adapter.settle_suffix);
            exchange = exchange.with_candles(&symbol, csv_loader::to_raw_candles(&candles));
        }
        Ok(exchange)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = PerpkitConfig::parse("").unwrap();
        assert_eq!(config.adapter, AdapterSettings::default());
        assert_eq!(config.credentials, Credentials::default());
        assert_eq!(config.simulator.max_candles_per_request, 500);
    }

    #[test]
    fn test_parse_full_config() {
        let config = PerpkitConfig::parse(
            r#"
            [credentials]
            api_key = "key"
            secret = "secret"

            [adapter]
            max_candles_per_request = 200

            [simulator]
            fixture = "config/sim_fixture.json"

            [[simulator.candles]]
            pair = "BTC-USDT"
            file = "data/BTC-USDT_1h.csv"
            "#,
        )
        .unwrap();
        assert_eq!(config.credentials.secret.as_deref(), Some("secret"));
        assert_eq!(config.credentials.uid, None);
        assert_eq!(config.adapter.max_candles_per_request, 200);
        assert_eq!(config.adapter.quote_currency, "USDT");
        assert_eq!(config.simulator.candles.len(), 1);
        assert_eq!(config.simulator.candles[0].pair, "BTC-USDT");
    }

    #[test]
    fn test_command_line_credentials_win() {
        let mut config = PerpkitConfig::parse("[credentials]\napi_key = \"file\"\nuid = \"u1\"").unwrap();
        config.override_credentials(Some("cli".to_string()), None, None);
        assert_eq!(config.credentials.api_key.as_deref(), Some("cli"));
        assert_eq!(config.credentials.uid.as_deref(), Some("u1"));
    }

    #[test]
    fn test_mistyped_adapter_value_is_rejected() {
        assert!(PerpkitConfig::parse("[adapter]\nmax_candles_per_request = \"many\"").is_err());
    }
}
