use async_trait::async_trait;
use chrono::Utc;
use futures_util::future::try_join_all;
use perpkit_core::*;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;
use tracing::{debug, info, warn};

use crate::normalize;
use crate::ohlcv::{candle_windows, merge_candles};
use crate::pair;

pub const EXCHANGE_NAME: &str = "bitmart";

const CANCEL_FAILED: &str = "Error or no orders to cancel";

/// API credentials. Without a secret the session is public (read-only).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub api_key: Option<String>,
    pub secret: Option<String>,
    pub uid: Option<String>,
}

/// Adapter tuning, loadable from the `[adapter]` table of a config file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdapterSettings {
    /// Currency balances are reported in.
    pub quote_currency: String,
    /// Suffix turning an external pair into the internal perpetual symbol.
    pub settle_suffix: String,
    /// Most candles the exchange returns for one request.
    pub max_candles_per_request: u32,
    /// Significant digits for size and price conversions.
    pub significant_digits: u32,
}

impl Default for AdapterSettings {
    fn default() -> Self {
        Self {
            quote_currency: "USDT".to_string(),
            settle_suffix: ":USDT".to_string(),
            max_candles_per_request: 500,
            significant_digits: 10,
        }
    }
}

/// BitMart USDT-margined perpetual futures adapter.
///
/// Sits on a `Connectivity` session and exposes the normalized
/// `PerpExchange` interface. Market metadata must be loaded with
/// [`BitmartPerp::load_markets`] before any operation that needs a contract
/// size.
pub struct BitmartPerp<C: Connectivity> {
    session: C,
    settings: AdapterSettings,
    ctx: DecimalContext,
    authenticated: bool,
    markets: Option<HashMap<String, Market>>,
}

impl<C: Connectivity> BitmartPerp<C> {
    /// Build the session options from `credentials` and open a session
    /// with `open`.
    pub fn new<F>(credentials: Credentials, settings: AdapterSettings, open: F) -> Self
    where
        F: FnOnce(SessionOptions) -> C,
    {
        let options = match credentials.secret {
            None => SessionOptions::public("swap"),
            Some(secret) => SessionOptions {
                api_key: credentials.api_key,
                secret: Some(secret),
                uid: credentials.uid,
                enable_rate_limit: true,
                default_type: "swap".to_string(),
            },
        };
        let authenticated = options.authenticated();
        if !authenticated {
            info!("No API secret configured, BitMart session is read-only");
        }

        Self {
            session: open(options),
            ctx: DecimalContext::new(settings.significant_digits),
            settings,
            authenticated,
            markets: None,
        }
    }

    pub fn session(&self) -> &C {
        &self.session
    }

    pub fn settings(&self) -> &AdapterSettings {
        &self.settings
    }

    pub fn is_authenticated(&self) -> bool {
        self.authenticated
    }

    /// Load pair metadata. Must be called once before pair-scoped calls.
    pub async fn load_markets(&mut self) -> Result<(), AdapterError> {
        let markets = self.session.load_markets().await?;
        info!(markets = markets.len(), "Loaded BitMart market metadata");
        self.markets = Some(markets);
        Ok(())
    }

    pub async fn close(&self) -> Result<(), AdapterError> {
        self.session.close().await?;
        info!("Closed BitMart session");
        Ok(())
    }

    pub fn ext_pair_to_pair(&self, ext_pair: &str) -> String {
        pair::ext_pair_to_pair(ext_pair, &self.settings.settle_suffix)
    }

    pub fn pair_to_ext_pair(&self, pair: &str) -> String {
        pair::pair_to_ext_pair(pair, &self.settings.settle_suffix)
    }

    /// Metadata for an external pair, `None` if the exchange does not list it.
    pub fn get_pair_info(&self, ext_pair: &str) -> Result<Option<&Market>, AdapterError> {
        let markets = self.markets.as_ref().ok_or(AdapterError::MarketsNotLoaded)?;
        Ok(markets.get(&self.ext_pair_to_pair(ext_pair)))
    }

    fn contract_size(&self, ext_pair: &str) -> Result<Decimal, AdapterError> {
        self.get_pair_info(ext_pair)?
            .map(|market| market.contract_size)
            .ok_or_else(|| AdapterError::UnknownPair(ext_pair.to_string()))
    }

    pub fn price_to_precision(&self, pair: &str, price: Decimal) -> Result<Decimal, AdapterError> {
        let symbol = self.ext_pair_to_pair(pair);
        Ok(self.session.price_to_precision(&symbol, price)?)
    }

    /// Convert an asset-unit size into a rounded contract amount.
    pub fn amount_to_precision(&self, pair: &str, size: Decimal) -> Result<Decimal, AdapterError> {
        let contracts = self.ctx.div(size, self.contract_size(pair)?)?;
        let symbol = self.ext_pair_to_pair(pair);
        Ok(self.session.amount_to_precision(&symbol, contracts)?)
    }

    /// Fetch the `limit` candles ending at `end_ms`.
    pub async fn get_ohlcv_until(
        &self,
        pair: &str,
        timeframe: Timeframe,
        limit: u32,
        end_ms: i64,
    ) -> Result<Vec<Candle>, AdapterError> {
        let symbol = self.ext_pair_to_pair(pair);
        let windows = candle_windows(
            end_ms,
            limit,
            timeframe,
            self.settings.max_candles_per_request,
        );
        debug!(
            %symbol,
            timeframe = %timeframe,
            limit,
            requests = windows.len(),
            "Fetching candles"
        );

        let requests = windows
            .iter()
            .map(|window| self.session.fetch_ohlcv(&symbol, timeframe, window.params()));
        let batches = try_join_all(requests).await?;
        merge_candles(batches)
    }

    async fn try_place_order(&self, request: &PlaceOrderRequest) -> Result<Order, AdapterError> {
        let amount = self.amount_to_precision(&request.pair, request.size)?;
        let symbol = self.ext_pair_to_pair(&request.pair);
        debug!(
            %symbol,
            side = request.side.as_str(),
            order_type = request.order_type.as_str(),
            %amount,
            "Placing order"
        );

        let created = self
            .session
            .create_order(NewOrder {
                symbol,
                order_type: request.order_type,
                side: request.side,
                amount,
                price: request.price,
                trigger_price: None,
                params: params(json!({
                    "reduceOnly": request.reduce,
                    "marginMode": request.margin_mode.as_str(),
                    "leverage": request.leverage,
                })),
            })
            .await?;

        // The creation response only carries the id; read the order back.
        let pair = self.pair_to_ext_pair(&created.symbol);
        self.get_order_by_id(&created.id, &pair).await
    }

    async fn try_place_trigger_order(
        &self,
        request: &PlaceTriggerOrderRequest,
    ) -> Result<Info, AdapterError> {
        let amount = self.amount_to_precision(&request.pair, request.size)?;
        let symbol = self.ext_pair_to_pair(&request.pair);
        debug!(
            %symbol,
            side = request.side.as_str(),
            trigger_price = %request.trigger_price,
            %amount,
            "Placing trigger order"
        );

        self.session
            .create_trigger_order(NewOrder {
                symbol,
                order_type: request.order_type,
                side: request.side,
                amount,
                price: request.price,
                trigger_price: Some(request.trigger_price),
                params: params(json!({
                    "reduceOnly": request.reduce,
                    "tradeSide": if request.reduce { "Close" } else { "Open" },
                    "marginMode": request.margin_mode.as_str(),
                })),
            })
            .await?;

        Ok(Info::ok("Trigger Order set up"))
    }

    async fn cancel_with(&self, pair: &str, ids: &[String], trigger: bool) -> Info {
        let symbol = self.ext_pair_to_pair(pair);
        let extra = if trigger {
            params(json!({"stop": true}))
        } else {
            Params::new()
        };

        match self.session.cancel_orders(ids, &symbol, extra).await {
            Ok(cancelled) if trigger => {
                Info::ok(format!("{} Trigger Orders cancelled", cancelled.len()))
            }
            Ok(cancelled) => Info::ok(format!("{} Orders cancelled", cancelled.len())),
            Err(e) => {
                warn!(%symbol, trigger, error = %e, "Order cancellation failed");
                Info::failed(CANCEL_FAILED)
            }
        }
    }
}

#[async_trait]
impl<C: Connectivity> PerpExchange for BitmartPerp<C> {
    fn name(&self) -> &str {
        EXCHANGE_NAME
    }

    async fn get_last_ohlcv(
        &self,
        pair: &str,
        timeframe: Timeframe,
        limit: u32,
    ) -> Result<Vec<Candle>, AdapterError> {
        let now = Utc::now().timestamp_millis();
        self.get_ohlcv_until(pair, timeframe, limit, now).await
    }

    async fn get_balance(&self) -> Result<Balance, AdapterError> {
        let raw = self
            .session
            .fetch_balance(params(json!({"defaultType": "swap"})))
            .await?;
        normalize::balance_from_raw(raw, &self.settings.quote_currency)
    }

    async fn set_margin_mode_and_leverage(
        &self,
        pair: &str,
        margin_mode: &str,
        leverage: u32,
    ) -> Result<Info, AdapterError> {
        let margin_mode: MarginMode = margin_mode.parse()?;
        let symbol = self.ext_pair_to_pair(pair);

        self.session
            .set_leverage(
                leverage,
                &symbol,
                params(json!({
                    "open_type": margin_mode.as_str(),
                    "marginMode": margin_mode.as_str(),
                })),
            )
            .await?;

        info!(%symbol, %margin_mode, leverage, "Updated margin mode and leverage");
        Ok(Info::ok(format!(
            "Margin mode and leverage set to {} and {}x",
            margin_mode, leverage
        )))
    }

    async fn get_open_positions(&self, pairs: &[String]) -> Result<Vec<Position>, AdapterError> {
        let symbols: Vec<String> = pairs.iter().map(|p| self.ext_pair_to_pair(p)).collect();
        let raw_positions = self.session.fetch_positions(&symbols).await?;

        raw_positions
            .into_iter()
            .map(|raw| {
                let pair = self.pair_to_ext_pair(&raw.symbol);
                normalize::position_from_raw(raw, pair, &self.ctx)
            })
            .collect()
    }

    async fn place_order(
        &self,
        request: PlaceOrderRequest,
        mode: ErrorMode,
    ) -> Result<Option<Order>, AdapterError> {
        match self.try_place_order(&request).await {
            Ok(order) => Ok(Some(order)),
            Err(e) if mode == ErrorMode::Lenient => {
                warn!(pair = %request.pair, error = %e, "Order placement failed");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    async fn place_trigger_order(
        &self,
        request: PlaceTriggerOrderRequest,
        mode: ErrorMode,
    ) -> Result<Option<Info>, AdapterError> {
        match self.try_place_trigger_order(&request).await {
            Ok(info) => Ok(Some(info)),
            Err(e) if mode == ErrorMode::Lenient => {
                warn!(pair = %request.pair, error = %e, "Trigger order placement failed");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    async fn get_order_by_id(&self, order_id: &str, pair: &str) -> Result<Order, AdapterError> {
        let contract_size = self.contract_size(pair)?;
        let symbol = self.ext_pair_to_pair(pair);
        let raw = self.session.fetch_order(order_id, &symbol).await?;
        let pair = self.pair_to_ext_pair(&raw.symbol);
        normalize::order_from_raw(raw, pair, contract_size, &self.ctx)
    }

    async fn get_open_orders(&self, pair: &str) -> Result<Vec<Order>, AdapterError> {
        let contract_size = self.contract_size(pair)?;
        let symbol = self.ext_pair_to_pair(pair);
        let raw_orders = self.session.fetch_open_orders(&symbol, Params::new()).await?;

        raw_orders
            .into_iter()
            .map(|raw| {
                let pair = self.pair_to_ext_pair(&raw.symbol);
                normalize::order_from_raw(raw, pair, contract_size, &self.ctx)
            })
            .collect()
    }

    async fn get_open_trigger_orders(&self, pair: &str) -> Result<Vec<TriggerOrder>, AdapterError> {
        let contract_size = self.contract_size(pair)?;
        let symbol = self.ext_pair_to_pair(pair);
        let raw_orders = self
            .session
            .fetch_open_orders(&symbol, params(json!({"stop": true})))
            .await?;

        raw_orders
            .into_iter()
            .map(|raw| {
                let pair = self.pair_to_ext_pair(&raw.symbol);
                normalize::trigger_order_from_raw(raw, pair, contract_size, &self.ctx)
            })
            .collect()
    }

    async fn cancel_orders(&self, pair: &str, ids: &[String]) -> Info {
        self.cancel_with(pair, ids, false).await
    }

    async fn cancel_trigger_orders(&self, pair: &str, ids: &[String]) -> Info {
        self.cancel_with(pair, ids, true).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use perpkit_brokers_common::{Operation, SimulatedExchange, SimulatedExchangeConfig};
    use rust_decimal_macros::dec;

    const PAIR: &str = "BTC-USDT";
    const SYMBOL: &str = "BTC-USDT:USDT";
    const HOUR: i64 = 3_600_000;

    fn btc_market() -> Market {
        Market {
            symbol: SYMBOL.to_string(),
            base: "BTC".to_string(),
            quote: "USDT".to_string(),
            contract_size: dec!(0.001),
            price_step: Some(dec!(0.1)),
            amount_step: Some(dec!(1)),
        }
    }

    fn simulator(config: SimulatedExchangeConfig) -> SimulatedExchange {
        SimulatedExchange::new(config)
            .with_market(btc_market())
            .with_balance(RawBalanceEntry {
                currency: "USDT".to_string(),
                equity: dec!(1500.5),
                available_balance: dec!(1200.25),
                position_deposit: dec!(300.25),
            })
            .with_position(RawPosition {
                symbol: SYMBOL.to_string(),
                side: Some("short".to_string()),
                contracts: Some(dec!(12)),
                contract_size: Some(dec!(0.001)),
                mark_price: Some(dec!(780)),
                entry_price: Some(dec!(66000)),
                unrealized_pnl: Some(dec!(12)),
                leverage: Some(dec!(5)),
                info: RawPositionInfo {
                    margin_type: "isolated".to_string(),
                    open_timestamp: 1_700_000_000_000,
                },
                ..Default::default()
            })
    }

    fn credentials() -> Credentials {
        Credentials {
            api_key: Some("key".to_string()),
            secret: Some("secret".to_string()),
            uid: Some("uid".to_string()),
        }
    }

    async fn connect(
        sim: &SimulatedExchange,
        credentials: Credentials,
    ) -> BitmartPerp<SimulatedExchange> {
        let mut adapter =
            BitmartPerp::new(credentials, AdapterSettings::default(), |opts| sim.open(&opts));
        adapter.load_markets().await.unwrap();
        adapter
    }

    #[tokio::test]
    async fn test_pair_info_requires_loaded_markets() {
        let sim = simulator(SimulatedExchangeConfig::default());
        let mut adapter =
            BitmartPerp::new(credentials(), AdapterSettings::default(), |opts| sim.open(&opts));

        assert!(matches!(
            adapter.get_pair_info(PAIR),
            Err(AdapterError::MarketsNotLoaded)
        ));

        adapter.load_markets().await.unwrap();
        let market = adapter.get_pair_info(PAIR).unwrap().unwrap();
        assert_eq!(market.contract_size, dec!(0.001));
        assert!(adapter.get_pair_info("XRP-USDT").unwrap().is_none());
    }

    #[tokio::test]
    async fn test_invalid_margin_mode_is_rejected_before_any_call() {
        let sim = simulator(SimulatedExchangeConfig::default());
        let adapter = connect(&sim, credentials()).await;

        match adapter.set_margin_mode_and_leverage(PAIR, "bogus", 5).await {
            Err(AdapterError::InvalidMarginMode(m)) => assert_eq!(m, "bogus"),
            other => panic!("Expected invalid margin mode, got {:?}", other),
        }
        assert!(sim.calls_to(Operation::SetLeverage).is_empty());
    }

    #[tokio::test]
    async fn test_set_margin_mode_and_leverage() {
        let sim = simulator(SimulatedExchangeConfig::default());
        let adapter = connect(&sim, credentials()).await;

        let info = adapter
            .set_margin_mode_and_leverage(PAIR, "isolated", 10)
            .await
            .unwrap();
        assert!(info.success);
        assert_eq!(info.message, "Margin mode and leverage set to isolated and 10x");
        assert_eq!(
            sim.leverage_for(SYMBOL),
            Some((10, "isolated".to_string()))
        );
    }

    #[tokio::test]
    async fn test_balance_and_positions() {
        let sim = simulator(SimulatedExchangeConfig::default());
        let adapter = connect(&sim, credentials()).await;

        let balance = adapter.get_balance().await.unwrap();
        assert_eq!(balance.total, dec!(1500.5));
        assert_eq!(balance.free, dec!(1200.25));
        assert_eq!(balance.used, dec!(300.25));

        let positions = adapter
            .get_open_positions(&[PAIR.to_string()])
            .await
            .unwrap();
        assert_eq!(positions.len(), 1);
        let position = &positions[0];
        assert_eq!(position.pair, PAIR);
        assert_eq!(position.side, PositionSide::Short);
        assert_eq!(position.size, dec!(0.012));
        assert_eq!(position.current_price, dec!(65000));
        assert_eq!(position.margin_mode, MarginMode::Isolated);
        assert_eq!(position.liquidation_price_or_zero(), Decimal::ZERO);
    }

    #[tokio::test]
    async fn test_public_session_cannot_reach_private_endpoints() {
        let sim = simulator(SimulatedExchangeConfig::default());
        let adapter = connect(&sim, Credentials::default()).await;
        assert!(!adapter.is_authenticated());

        match adapter.get_balance().await {
            Err(AdapterError::Connectivity(ConnectivityError::Authentication(_))) => {}
            other => panic!("Expected authentication error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_place_limit_order_reads_order_back() {
        let sim = simulator(SimulatedExchangeConfig::default());
        let adapter = connect(&sim, credentials()).await;

        let request = PlaceOrderRequest::limit(PAIR, Side::Buy, dec!(60000), dec!(0.005))
            .with_leverage(3);
        let order = adapter
            .place_order(request, ErrorMode::Strict)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(order.pair, PAIR);
        assert_eq!(order.size, dec!(0.005));
        assert_eq!(order.remaining, dec!(0.005));
        assert_eq!(order.filled, Decimal::ZERO);
        assert_eq!(order.price, Some(dec!(60000)));
        assert!(!order.reduce);

        let created = sim.calls_to(Operation::CreateOrder);
        assert_eq!(created.len(), 1);
        assert_eq!(created[0].symbol.as_deref(), Some(SYMBOL));
        assert_eq!(created[0].params["reduceOnly"], false);
        assert_eq!(created[0].params["marginMode"], "cross");
        assert_eq!(created[0].params["leverage"], 3);
        assert_eq!(sim.calls_to(Operation::FetchOrder).len(), 1);
    }

    #[tokio::test]
    async fn test_reduce_only_market_order() {
        let sim = simulator(SimulatedExchangeConfig::default());
        let adapter = connect(&sim, credentials()).await;

        let request = PlaceOrderRequest::market(PAIR, Side::Sell, dec!(0.003)).reduce_only();
        let order = adapter
            .place_order(request, ErrorMode::Strict)
            .await
            .unwrap()
            .unwrap();

        assert!(order.reduce);
        assert_eq!(order.order_type, OrderType::Market);
        assert_eq!(order.filled, dec!(0.003));
        assert_eq!(order.remaining, Decimal::ZERO);
    }

    #[tokio::test]
    async fn test_place_order_error_modes() {
        let sim = simulator(SimulatedExchangeConfig::default());
        let adapter = connect(&sim, credentials()).await;
        sim.fail(
            Operation::CreateOrder,
            ConnectivityError::Exchange("insufficient margin".to_string()),
        );
        let request = PlaceOrderRequest::market(PAIR, Side::Buy, dec!(0.001));

        match adapter.place_order(request.clone(), ErrorMode::Strict).await {
            Err(AdapterError::Connectivity(ConnectivityError::Exchange(m))) => {
                assert_eq!(m, "insufficient margin")
            }
            other => panic!("Expected exchange error, got {:?}", other),
        }
        assert!(adapter
            .place_order(request, ErrorMode::Lenient)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_unknown_pair_order() {
        let sim = simulator(SimulatedExchangeConfig::default());
        let adapter = connect(&sim, credentials()).await;
        let request = PlaceOrderRequest::market("XRP-USDT", Side::Buy, dec!(10));

        assert!(matches!(
            adapter.place_order(request.clone(), ErrorMode::Strict).await,
            Err(AdapterError::UnknownPair(_))
        ));
        assert!(adapter
            .place_order(request, ErrorMode::Lenient)
            .await
            .unwrap()
            .is_none());
        assert!(sim.calls_to(Operation::CreateOrder).is_empty());
    }

    #[tokio::test]
    async fn test_amount_to_precision_truncates_contracts() {
        let sim = simulator(SimulatedExchangeConfig::default());
        let adapter = connect(&sim, credentials()).await;
        assert_eq!(adapter.amount_to_precision(PAIR, dec!(0.0057)).unwrap(), dec!(5));
        assert_eq!(
            adapter.price_to_precision(PAIR, dec!(60000.04)).unwrap(),
            dec!(60000)
        );
    }

    #[tokio::test]
    async fn test_trigger_order_lifecycle() {
        let sim = simulator(SimulatedExchangeConfig::default());
        let adapter = connect(&sim, credentials()).await;

        let request =
            PlaceTriggerOrderRequest::market(PAIR, Side::Sell, dec!(58000), dec!(0.002)).reduce_only();
        let info = adapter
            .place_trigger_order(request, ErrorMode::Strict)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(info, Info::ok("Trigger Order set up"));
        let created = sim.calls_to(Operation::CreateTriggerOrder);
        assert_eq!(created[0].params["tradeSide"], "Close");
        assert_eq!(created[0].params["reduceOnly"], true);

        let triggers = adapter.get_open_trigger_orders(PAIR).await.unwrap();
        assert_eq!(triggers.len(), 1);
        assert_eq!(triggers[0].price, Decimal::ZERO);
        assert_eq!(triggers[0].trigger_price, dec!(58000));
        assert_eq!(triggers[0].size, dec!(0.002));
        assert!(triggers[0].reduce);
        assert!(adapter.get_open_orders(PAIR).await.unwrap().is_empty());

        let cancelled = adapter.cancel_trigger_orders(PAIR, &[]).await;
        assert_eq!(cancelled, Info::ok("1 Trigger Orders cancelled"));

        let again = adapter.cancel_trigger_orders(PAIR, &[]).await;
        assert!(!again.success);
        assert_eq!(again.message, "Error or no orders to cancel");
    }

    #[tokio::test]
    async fn test_cancel_selected_orders() {
        let sim = simulator(SimulatedExchangeConfig::default());
        let adapter = connect(&sim, credentials()).await;

        let mut ids = Vec::new();
        for price in [dec!(59000), dec!(59500)] {
            let request = PlaceOrderRequest::limit(PAIR, Side::Buy, price, dec!(0.001));
            let order = adapter
                .place_order(request, ErrorMode::Strict)
                .await
                .unwrap()
                .unwrap();
            ids.push(order.id);
        }

        let info = adapter.cancel_orders(PAIR, &ids[..1]).await;
        assert_eq!(info, Info::ok("1 Orders cancelled"));

        let open = adapter.get_open_orders(PAIR).await.unwrap();
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].id, ids[1]);
    }

    #[tokio::test]
    async fn test_candles_are_paginated_and_deduplicated() {
        let end = 472_223 * HOUR;
        let start = end - 1000 * HOUR;
        let candles = (0..=1000)
            .map(|i| {
                let ts = start + i * HOUR;
                RawCandle(ts, dec!(1), dec!(2), dec!(0.5), Decimal::from(i), dec!(10))
            })
            .collect();
        let sim = simulator(SimulatedExchangeConfig {
            max_candles_per_request: 1000,
            ..Default::default()
        })
        .with_candles(SYMBOL, candles);
        let adapter = connect(&sim, Credentials::default()).await;

        let result = adapter
            .get_ohlcv_until(PAIR, Timeframe::Hour1, 1000, end)
            .await
            .unwrap();

        assert_eq!(sim.calls_to(Operation::FetchOhlcv).len(), 2);
        assert_eq!(result.len(), 1001);
        assert_eq!(result.first().unwrap().timestamp.timestamp_millis(), start);
        assert_eq!(result.last().unwrap().timestamp.timestamp_millis(), end);
        assert!(result.windows(2).all(|w| w[0].timestamp < w[1].timestamp));
    }

    #[tokio::test]
    async fn test_close_session() {
        let sim = simulator(SimulatedExchangeConfig::default());
        let adapter = connect(&sim, credentials()).await;
        adapter.close().await.unwrap();
        assert!(sim.is_closed());
    }

    #[tokio::test]
    async fn test_one_failing_candle_window_fails_the_fetch() {
        let sim = simulator(SimulatedExchangeConfig::default());
        let adapter = connect(&sim, Credentials::default()).await;
        sim.fail(
            Operation::FetchOhlcv,
            ConnectivityError::Network("connection reset".to_string()),
        );

        match adapter
            .get_ohlcv_until(PAIR, Timeframe::Hour1, 1000, 472_223 * HOUR)
            .await
        {
            Err(AdapterError::Connectivity(ConnectivityError::Network(m))) => {
                assert_eq!(m, "connection reset")
            }
            other => panic!("Expected network error, got {:?}", other),
        }
        assert!(!sim.calls_to(Operation::FetchOhlcv).is_empty());
    }

    #[tokio::test]
    async fn test_place_trigger_order_error_modes() {
        let sim = simulator(SimulatedExchangeConfig::default());
        let adapter = connect(&sim, credentials()).await;
        sim.fail(
            Operation::CreateTriggerOrder,
            ConnectivityError::Exchange("trigger price too close".to_string()),
        );
        let request = PlaceTriggerOrderRequest::limit(
            PAIR,
            Side::Buy,
            dec!(61000),
            dec!(60900),
            dec!(0.001),
        );

        match adapter
            .place_trigger_order(request.clone(), ErrorMode::Strict)
            .await
        {
            Err(AdapterError::Connectivity(ConnectivityError::Exchange(m))) => {
                assert_eq!(m, "trigger price too close")
            }
            other => panic!("Expected exchange error, got {:?}", other),
        }
        assert!(adapter
            .place_trigger_order(request, ErrorMode::Lenient)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_cancel_transport_failure_is_reported() {
        let sim = simulator(SimulatedExchangeConfig::default());
        let adapter = connect(&sim, credentials()).await;
        let request = PlaceOrderRequest::limit(PAIR, Side::Sell, dec!(70000), dec!(0.001));
        let order = adapter
            .place_order(request, ErrorMode::Strict)
            .await
            .unwrap()
            .unwrap();
        sim.fail(
            Operation::CancelOrders,
            ConnectivityError::Network("timeout".to_string()),
        );

        let info = adapter.cancel_orders(PAIR, &[order.id]).await;
        assert_eq!(info, Info::failed("Error or no orders to cancel"));

        let info = adapter.cancel_trigger_orders(PAIR, &[]).await;
        assert_eq!(info, Info::failed("Error or no orders to cancel"));
        assert_eq!(adapter.get_open_orders(PAIR).await.unwrap().len(), 1);
    }
}
