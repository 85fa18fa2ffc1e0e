use crate::models::*;
use crate::raw::*;
use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// ---------------------------------------------------------------------------
// Connectivity Trait
// ---------------------------------------------------------------------------

/// Errors raised by a connectivity library (transport, auth, exchange).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConnectivityError {
    #[error("Network error: {0}")]
    Network(String),
    #[error("Authentication required: {0}")]
    Authentication(String),
    #[error("Bad symbol: {0}")]
    BadSymbol(String),
    #[error("Order not found: {0}")]
    OrderNotFound(String),
    #[error("Invalid order: {0}")]
    InvalidOrder(String),
    #[error("Exchange error: {0}")]
    Exchange(String),
}

/// Options used to open a connectivity session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionOptions {
    pub api_key: Option<String>,
    pub secret: Option<String>,
    pub uid: Option<String>,
    pub enable_rate_limit: bool,
    /// Market type requests default to (e.g. `swap`).
    pub default_type: String,
}

impl SessionOptions {
    /// An unauthenticated session for public endpoints only.
    pub fn public(default_type: &str) -> Self {
        Self {
            api_key: None,
            secret: None,
            uid: None,
            enable_rate_limit: true,
            default_type: default_type.to_string(),
        }
    }

    pub fn authenticated(&self) -> bool {
        self.secret.is_some()
    }
}

/// The exchange-connectivity collaborator the adapters sit on top of.
///
/// Implementations own HTTP sessions, request signing, rate limiting and
/// their own market-metadata cache. All symbols are internal
/// (`BTC-USDT:USDT`) and all amounts are in contracts.
#[async_trait]
pub trait Connectivity: Send + Sync {
    /// Load (and cache) market metadata keyed by internal symbol.
    async fn load_markets(&self) -> Result<HashMap<String, Market>, ConnectivityError>;

    /// Tear down the session.
    async fn close(&self) -> Result<(), ConnectivityError>;

    async fn fetch_ohlcv(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        params: Params,
    ) -> Result<Vec<RawCandle>, ConnectivityError>;

    async fn fetch_balance(&self, params: Params) -> Result<RawBalance, ConnectivityError>;

    async fn set_leverage(
        &self,
        leverage: u32,
        symbol: &str,
        params: Params,
    ) -> Result<(), ConnectivityError>;

    async fn fetch_positions(
        &self,
        symbols: &[String],
    ) -> Result<Vec<RawPosition>, ConnectivityError>;

    async fn create_order(&self, order: NewOrder) -> Result<RawOrder, ConnectivityError>;

    async fn create_trigger_order(&self, order: NewOrder) -> Result<RawOrder, ConnectivityError>;

    async fn fetch_order(&self, id: &str, symbol: &str) -> Result<RawOrder, ConnectivityError>;

    /// List working orders; `params` selects plain or trigger (`stop`) orders.
    async fn fetch_open_orders(
        &self,
        symbol: &str,
        params: Params,
    ) -> Result<Vec<RawOrder>, ConnectivityError>;

    /// Cancel the given orders; returns the ones actually cancelled.
    async fn cancel_orders(
        &self,
        ids: &[String],
        symbol: &str,
        params: Params,
    ) -> Result<Vec<RawOrder>, ConnectivityError>;

    /// Round a price to the market's price precision.
    fn price_to_precision(&self, symbol: &str, price: Decimal)
        -> Result<Decimal, ConnectivityError>;

    /// Round a contract amount to the market's amount precision.
    fn amount_to_precision(
        &self,
        symbol: &str,
        amount: Decimal,
    ) -> Result<Decimal, ConnectivityError>;
}

// ---------------------------------------------------------------------------
// Adapter Errors
// ---------------------------------------------------------------------------

/// Errors that can occur in an exchange adapter.
#[derive(Debug, thiserror::Error)]
pub enum AdapterError {
    #[error(transparent)]
    Connectivity(#[from] ConnectivityError),
    #[error("Markets not loaded; call load_markets first")]
    MarketsNotLoaded,
    #[error("Unknown pair: {0}")]
    UnknownPair(String),
    #[error("Margin mode must be either 'cross' or 'isolated', got '{0}'")]
    InvalidMarginMode(String),
    #[error("Unsupported timeframe: {0}")]
    UnsupportedTimeframe(String),
    #[error("No {0} entry in balance response")]
    MissingCurrency(String),
    #[error("Malformed response: {0}")]
    Malformed(String),
    #[error("Arithmetic error: {0}")]
    Arithmetic(String),
}

// ---------------------------------------------------------------------------
// Perp Exchange Trait
// ---------------------------------------------------------------------------

/// Normalized perpetual-futures interface a trading system codes against.
///
/// All pairs are external (`BTC-USDT`) and all sizes are in underlying-asset
/// units.
#[async_trait]
pub trait PerpExchange: Send + Sync {
    /// Exchange name (e.g. "bitmart").
    fn name(&self) -> &str;

    async fn get_last_ohlcv(
        &self,
        pair: &str,
        timeframe: Timeframe,
        limit: u32,
    ) -> Result<Vec<Candle>, AdapterError>;

    async fn get_balance(&self) -> Result<Balance, AdapterError>;

    async fn set_margin_mode_and_leverage(
        &self,
        pair: &str,
        margin_mode: &str,
        leverage: u32,
    ) -> Result<Info, AdapterError>;

    async fn get_open_positions(&self, pairs: &[String]) -> Result<Vec<Position>, AdapterError>;

    /// Place an order. Under `ErrorMode::Lenient` failures are logged and
    /// reported as `Ok(None)`.
    async fn place_order(
        &self,
        request: PlaceOrderRequest,
        mode: ErrorMode,
    ) -> Result<Option<Order>, AdapterError>;

    async fn place_trigger_order(
        &self,
        request: PlaceTriggerOrderRequest,
        mode: ErrorMode,
    ) -> Result<Option<Info>, AdapterError>;

    async fn get_order_by_id(&self, order_id: &str, pair: &str) -> Result<Order, AdapterError>;

    async fn get_open_orders(&self, pair: &str) -> Result<Vec<Order>, AdapterError>;

    async fn get_open_trigger_orders(&self, pair: &str) -> Result<Vec<TriggerOrder>, AdapterError>;

    /// Best effort: never fails, reports problems through `Info::success`.
    async fn cancel_orders(&self, pair: &str, ids: &[String]) -> Info;

    /// Best effort: never fails, reports problems through `Info::success`.
    async fn cancel_trigger_orders(&self, pair: &str, ids: &[String]) -> Info;
}
