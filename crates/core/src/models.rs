use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::traits::AdapterError;

// ---------------------------------------------------------------------------
// Enumerations
// ---------------------------------------------------------------------------

/// Order side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Buy => "buy",
            Side::Sell => "sell",
        }
    }
}

impl FromStr for Side {
    type Err = AdapterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "buy" => Ok(Side::Buy),
            "sell" => Ok(Side::Sell),
            other => Err(AdapterError::Malformed(format!("unknown order side '{}'", other))),
        }
    }
}

/// Side of an open position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PositionSide {
    Long,
    Short,
}

impl PositionSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            PositionSide::Long => "long",
            PositionSide::Short => "short",
        }
    }
}

impl FromStr for PositionSide {
    type Err = AdapterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "long" => Ok(PositionSide::Long),
            "short" => Ok(PositionSide::Short),
            other => Err(AdapterError::Malformed(format!(
                "unknown position side '{}'",
                other
            ))),
        }
    }
}

/// The type of order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderType {
    Market,
    Limit,
}

impl OrderType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderType::Market => "market",
            OrderType::Limit => "limit",
        }
    }
}

impl FromStr for OrderType {
    type Err = AdapterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "market" => Ok(OrderType::Market),
            "limit" => Ok(OrderType::Limit),
            other => Err(AdapterError::Malformed(format!("unknown order type '{}'", other))),
        }
    }
}

/// Collateral mode of a perpetual position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarginMode {
    Cross,
    Isolated,
}

impl MarginMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            MarginMode::Cross => "cross",
            MarginMode::Isolated => "isolated",
        }
    }
}

impl fmt::Display for MarginMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MarginMode {
    type Err = AdapterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cross" => Ok(MarginMode::Cross),
            "isolated" => Ok(MarginMode::Isolated),
            other => Err(AdapterError::InvalidMarginMode(other.to_string())),
        }
    }
}

/// Candle interval supported by the adapters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Timeframe {
    #[serde(rename = "1m")]
    Minute1,
    #[serde(rename = "5m")]
    Minute5,
    #[serde(rename = "15m")]
    Minute15,
    #[serde(rename = "1h")]
    Hour1,
    #[serde(rename = "2h")]
    Hour2,
    #[serde(rename = "4h")]
    Hour4,
    #[serde(rename = "1d")]
    Day1,
}

impl Timeframe {
    pub fn as_str(&self) -> &'static str {
        match self {
            Timeframe::Minute1 => "1m",
            Timeframe::Minute5 => "5m",
            Timeframe::Minute15 => "15m",
            Timeframe::Hour1 => "1h",
            Timeframe::Hour2 => "2h",
            Timeframe::Hour4 => "4h",
            Timeframe::Day1 => "1d",
        }
    }

    /// Candle duration in milliseconds.
    pub fn to_millis(&self) -> i64 {
        match self {
            Timeframe::Minute1 => 60 * 1000,
            Timeframe::Minute5 => 5 * 60 * 1000,
            Timeframe::Minute15 => 15 * 60 * 1000,
            Timeframe::Hour1 => 60 * 60 * 1000,
            Timeframe::Hour2 => 2 * 60 * 60 * 1000,
            Timeframe::Hour4 => 4 * 60 * 60 * 1000,
            Timeframe::Day1 => 24 * 60 * 60 * 1000,
        }
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Timeframe {
    type Err = AdapterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "1m" => Ok(Timeframe::Minute1),
            "5m" => Ok(Timeframe::Minute5),
            "15m" => Ok(Timeframe::Minute15),
            "1h" => Ok(Timeframe::Hour1),
            "2h" => Ok(Timeframe::Hour2),
            "4h" => Ok(Timeframe::Hour4),
            "1d" => Ok(Timeframe::Day1),
            other => Err(AdapterError::UnsupportedTimeframe(other.to_string())),
        }
    }
}

/// How an operation reports failures to its caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorMode {
    /// Failures are returned as `Err`.
    #[default]
    Strict,
    /// Failures are logged and reported as `Ok(None)`.
    Lenient,
}

// ---------------------------------------------------------------------------
// Market metadata
// ---------------------------------------------------------------------------

/// Pair metadata as cached by the connectivity layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Market {
    /// Internal symbol (e.g. `BTC-USDT:USDT`).
    pub symbol: String,
    pub base: String,
    pub quote: String,
    /// Underlying units per contract.
    pub contract_size: Decimal,
    /// Minimum price increment, if the exchange publishes one.
    #[serde(default)]
    pub price_step: Option<Decimal>,
    /// Minimum contract-amount increment.
    #[serde(default)]
    pub amount_step: Option<Decimal>,
}

// ---------------------------------------------------------------------------
// Market Data
// ---------------------------------------------------------------------------

/// A single OHLCV candle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candle {
    pub timestamp: DateTime<Utc>,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
}

// ---------------------------------------------------------------------------
// Account
// ---------------------------------------------------------------------------

/// Quote-currency balance snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Balance {
    pub total: Decimal,
    pub free: Decimal,
    pub used: Decimal,
}

/// A normalized open position.
///
/// Sizes are in underlying-asset units. Fields the exchange may leave empty
/// stay `None` here; use the `*_or_zero` helpers when a flat value is needed
/// for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    pub pair: String,
    pub side: PositionSide,
    pub size: Decimal,
    /// Notional value in USD, rounded to cents.
    pub usd_size: Decimal,
    pub entry_price: Decimal,
    pub current_price: Decimal,
    pub unrealized_pnl: Decimal,
    pub liquidation_price: Option<Decimal>,
    pub margin_mode: MarginMode,
    pub leverage: Decimal,
    pub hedge_mode: Option<bool>,
    /// Milliseconds since epoch.
    pub open_timestamp: i64,
    pub take_profit_price: Option<Decimal>,
    pub stop_loss_price: Option<Decimal>,
}

impl Position {
    pub fn liquidation_price_or_zero(&self) -> Decimal {
        self.liquidation_price.unwrap_or(Decimal::ZERO)
    }

    pub fn take_profit_price_or_zero(&self) -> Decimal {
        self.take_profit_price.unwrap_or(Decimal::ZERO)
    }

    pub fn stop_loss_price_or_zero(&self) -> Decimal {
        self.stop_loss_price.unwrap_or(Decimal::ZERO)
    }

    pub fn is_hedged(&self) -> bool {
        self.hedge_mode.unwrap_or(false)
    }
}

// ---------------------------------------------------------------------------
// Orders
// ---------------------------------------------------------------------------

/// A normalized order as reported by the exchange.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: String,
    pub pair: String,
    pub order_type: OrderType,
    pub side: Side,
    /// `None` for market orders that carry no limit price.
    pub price: Option<Decimal>,
    pub size: Decimal,
    pub reduce: bool,
    pub filled: Decimal,
    pub remaining: Decimal,
    /// Milliseconds since epoch.
    pub timestamp: i64,
}

/// A normalized working trigger (conditional) order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerOrder {
    pub id: String,
    pub pair: String,
    pub order_type: OrderType,
    pub side: Side,
    /// Zero when the trigger fires a market order.
    pub price: Decimal,
    pub trigger_price: Decimal,
    pub size: Decimal,
    pub reduce: bool,
    pub timestamp: i64,
}

/// Outcome of a fire-and-forget operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Info {
    pub success: bool,
    pub message: String,
}

impl Info {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
        }
    }
}

/// Parameters for placing a plain order. Sizes are in underlying-asset units.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaceOrderRequest {
    pub pair: String,
    pub side: Side,
    pub order_type: OrderType,
    pub price: Option<Decimal>,
    pub size: Decimal,
    pub reduce: bool,
    pub margin_mode: MarginMode,
    pub leverage: u32,
}

impl PlaceOrderRequest {
    /// Create a new limit order request (cross margin, 1x, opening).
    pub fn limit(pair: &str, side: Side, price: Decimal, size: Decimal) -> Self {
        Self {
            pair: pair.to_string(),
            side,
            order_type: OrderType::Limit,
            price: Some(price),
            size,
            reduce: false,
            margin_mode: MarginMode::Cross,
            leverage: 1,
        }
    }

    /// Create a new market order request (cross margin, 1x, opening).
    pub fn market(pair: &str, side: Side, size: Decimal) -> Self {
        Self {
            pair: pair.to_string(),
            side,
            order_type: OrderType::Market,
            price: None,
            size,
            reduce: false,
            margin_mode: MarginMode::Cross,
            leverage: 1,
        }
    }

    pub fn reduce_only(mut self) -> Self {
        self.reduce = true;
        self
    }

    pub fn with_margin_mode(mut self, margin_mode: MarginMode) -> Self {
        self.margin_mode = margin_mode;
        self
    }

    pub fn with_leverage(mut self, leverage: u32) -> Self {
        self.leverage = leverage;
        self
    }
}

/// Parameters for placing a trigger order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaceTriggerOrderRequest {
    pub pair: String,
    pub side: Side,
    pub order_type: OrderType,
    pub price: Option<Decimal>,
    pub trigger_price: Decimal,
    pub size: Decimal,
    pub reduce: bool,
    pub margin_mode: MarginMode,
}

impl PlaceTriggerOrderRequest {
    /// A trigger that fires a market order once `trigger_price` is crossed.
    pub fn market(pair: &str, side: Side, trigger_price: Decimal, size: Decimal) -> Self {
        Self {
            pair: pair.to_string(),
            side,
            order_type: OrderType::Market,
            price: None,
            trigger_price,
            size,
            reduce: false,
            margin_mode: MarginMode::Cross,
        }
    }

    /// A trigger that places a limit order at `price`.
    pub fn limit(
        pair: &str,
        side: Side,
        price: Decimal,
        trigger_price: Decimal,
        size: Decimal,
    ) -> Self {
        Self {
            price: Some(price),
            order_type: OrderType::Limit,
            ..Self::market(pair, side, trigger_price, size)
        }
    }

    pub fn reduce_only(mut self) -> Self {
        self.reduce = true;
        self
    }

    pub fn with_margin_mode(mut self, margin_mode: MarginMode) -> Self {
        self.margin_mode = margin_mode;
        self
    }
}
