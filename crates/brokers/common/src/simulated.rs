use async_trait::async_trait;
use chrono::Utc;
use perpkit_core::*;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::debug;

/// Configuration for the simulated exchange.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulatedExchangeConfig {
    /// Most candles returned by one `fetch_ohlcv` call.
    pub max_candles_per_request: usize,
    /// First order id handed out.
    pub first_order_id: u64,
}

impl Default for SimulatedExchangeConfig {
    fn default() -> Self {
        Self {
            max_candles_per_request: 500,
            first_order_id: 1000,
        }
    }
}

/// Seed data for a simulated exchange.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SimFixture {
    pub markets: Vec<Market>,
    pub balances: Vec<RawBalanceEntry>,
    pub positions: Vec<RawPosition>,
    /// Candles keyed by internal symbol.
    pub candles: HashMap<String, Vec<RawCandle>>,
}

/// Connectivity operations, used to record calls and inject failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    LoadMarkets,
    Close,
    FetchOhlcv,
    FetchBalance,
    SetLeverage,
    FetchPositions,
    CreateOrder,
    CreateTriggerOrder,
    FetchOrder,
    FetchOpenOrders,
    CancelOrders,
}

/// A recorded connectivity call.
#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    pub operation: Operation,
    pub symbol: Option<String>,
    pub params: Params,
}

#[derive(Debug, Clone)]
struct SimOrder {
    raw: RawOrder,
    trigger: bool,
    cancelled: bool,
}

impl SimOrder {
    fn is_open(&self) -> bool {
        !self.cancelled && self.raw.remaining.is_some_and(|r| r > Decimal::ZERO)
    }
}

#[derive(Debug, Default)]
struct SimState {
    markets: HashMap<String, Market>,
    candles: HashMap<String, Vec<RawCandle>>,
    balances: Vec<RawBalanceEntry>,
    positions: Vec<RawPosition>,
    orders: BTreeMap<u64, SimOrder>,
    next_order_id: u64,
    leverage: HashMap<String, (u32, String)>,
    calls: Vec<Call>,
    failures: HashMap<Operation, ConnectivityError>,
    closed: bool,
}

/// An in-memory exchange implementing `Connectivity`.
///
/// Holds markets, balances, positions, candles and an order book behind a
/// shared handle, so a test can keep one clone for inspection while an
/// adapter owns another. Private endpoints require an authenticated session.
#[derive(Debug, Clone)]
pub struct SimulatedExchange {
    config: SimulatedExchangeConfig,
    state: Arc<Mutex<SimState>>,
    authenticated: bool,
}

impl SimulatedExchange {
    pub fn new(config: SimulatedExchangeConfig) -> Self {
        let state = SimState {
            next_order_id: config.first_order_id,
            ..Default::default()
        };
        Self {
            config,
            state: Arc::new(Mutex::new(state)),
            authenticated: true,
        }
    }

    pub fn from_fixture(fixture: SimFixture, config: SimulatedExchangeConfig) -> Self {
        let exchange = Self::new(config);
        {
            let mut state = exchange.state();
            for market in fixture.markets {
                state.markets.insert(market.symbol.clone(), market);
            }
            state.balances = fixture.balances;
            state.positions = fixture.positions;
            for (symbol, candles) in fixture.candles {
                insert_candles(&mut state, symbol, candles);
            }
        }
        exchange
    }

    /// A session handle on the same exchange state, authenticated only if
    /// the options carry a secret.
    pub fn open(&self, options: &SessionOptions) -> Self {
        Self {
            config: self.config.clone(),
            state: Arc::clone(&self.state),
            authenticated: options.authenticated(),
        }
    }

    pub fn with_market(self, market: Market) -> Self {
        self.state().markets.insert(market.symbol.clone(), market);
        self
    }

    pub fn with_balance(self, entry: RawBalanceEntry) -> Self {
        self.state().balances.push(entry);
        self
    }

    pub fn with_position(self, position: RawPosition) -> Self {
        self.state().positions.push(position);
        self
    }

    pub fn with_candles(self, symbol: &str, candles: Vec<RawCandle>) -> Self {
        insert_candles(&mut self.state(), symbol.to_string(), candles);
        self
    }

    /// Make every subsequent call of `operation` fail with `error`.
    pub fn fail(&self, operation: Operation, error: ConnectivityError) {
        self.state().failures.insert(operation, error);
    }

    pub fn clear_failures(&self) {
        self.state().failures.clear();
    }

    /// All calls received so far, in order.
    pub fn calls(&self) -> Vec<Call> {
        self.state().calls.clone()
    }

    pub fn calls_to(&self, operation: Operation) -> Vec<Call> {
        self.state()
            .calls
            .iter()
            .filter(|c| c.operation == operation)
            .cloned()
            .collect()
    }

    /// Leverage and margin mode last set for an internal symbol.
    pub fn leverage_for(&self, symbol: &str) -> Option<(u32, String)> {
        self.state().leverage.get(symbol).cloned()
    }

    pub fn is_authenticated(&self) -> bool {
        self.authenticated
    }

    pub fn is_closed(&self) -> bool {
        self.state().closed
    }

    fn state(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record the call, then apply injected failures and auth checks.
    fn enter(
        &self,
        operation: Operation,
        symbol: Option<&str>,
        params: &Params,
        private: bool,
    ) -> Result<MutexGuard<'_, SimState>, ConnectivityError> {
        let mut state = self.state();
        state.calls.push(Call {
            operation,
            symbol: symbol.map(str::to_string),
            params: params.clone(),
        });
        if let Some(error) = state.failures.get(&operation) {
            return Err(error.clone());
        }
        if private && !self.authenticated {
            return Err(ConnectivityError::Authentication(
                "apiKey and secret credentials required".to_string(),
            ));
        }
        if state.closed {
            return Err(ConnectivityError::Network("session closed".to_string()));
        }
        Ok(state)
    }
}

impl Default for SimulatedExchange {
    fn default() -> Self {
        Self::new(SimulatedExchangeConfig::default())
    }
}

fn insert_candles(state: &mut SimState, symbol: String, mut candles: Vec<RawCandle>) {
    candles.sort_by_key(|c| c.timestamp());
    state.candles.insert(symbol, candles);
}

fn market<'a>(state: &'a SimState, symbol: &str) -> Result<&'a Market, ConnectivityError> {
    state
        .markets
        .get(symbol)
        .ok_or_else(|| ConnectivityError::BadSymbol(symbol.to_string()))
}

/// Read a seconds parameter sent as a string or a number.
fn param_seconds(params: &Params, key: &str) -> Option<i64> {
    match params.get(key)? {
        Value::String(s) => s.parse().ok(),
        Value::Number(n) => n.as_i64(),
        _ => None,
    }
}

fn param_flag(params: &Params, key: &str) -> bool {
    params.get(key).and_then(Value::as_bool).unwrap_or(false)
}

/// 1 open long, 2 close short, 3 close long, 4 open short.
fn side_code(side: Side, reduce: bool) -> i64 {
    match (side, reduce) {
        (Side::Buy, false) => 1,
        (Side::Buy, true) => 2,
        (Side::Sell, true) => 3,
        (Side::Sell, false) => 4,
    }
}

fn round_to_step(value: Decimal, step: Option<Decimal>, strategy: RoundingStrategy) -> Decimal {
    match step {
        Some(step) if !step.is_zero() => {
            ((value / step).round_dp_with_strategy(0, strategy) * step).normalize()
        }
        _ => value,
    }
}

impl SimulatedExchange {
    fn place(&self, order: NewOrder, operation: Operation) -> Result<RawOrder, ConnectivityError> {
        let mut state = self.enter(operation, Some(&order.symbol), &order.params, true)?;
        market(&state, &order.symbol)?;

        let trigger = operation == Operation::CreateTriggerOrder;
        if order.amount <= Decimal::ZERO {
            return Err(ConnectivityError::InvalidOrder(format!(
                "amount must be positive, got {}",
                order.amount
            )));
        }
        if order.order_type == OrderType::Limit && order.price.is_none() {
            return Err(ConnectivityError::InvalidOrder(
                "limit order requires a price".to_string(),
            ));
        }
        if trigger && order.trigger_price.is_none() {
            return Err(ConnectivityError::InvalidOrder(
                "trigger order requires a trigger price".to_string(),
            ));
        }

        let id = state.next_order_id;
        state.next_order_id += 1;

        // Plain market orders fill immediately; everything else rests.
        let filled = if order.order_type == OrderType::Market && !trigger {
            order.amount
        } else {
            Decimal::ZERO
        };
        let reduce = param_flag(&order.params, "reduceOnly");
        let raw = RawOrder {
            id: id.to_string(),
            symbol: order.symbol.clone(),
            order_type: Some(order.order_type.as_str().to_string()),
            side: Some(order.side.as_str().to_string()),
            price: order.price,
            amount: Some(order.amount),
            filled: Some(filled),
            remaining: Some(order.amount - filled),
            timestamp: Some(Utc::now().timestamp_millis()),
            trigger_price: order.trigger_price,
            info: RawOrderInfo {
                side: Some(Value::from(side_code(order.side, reduce))),
            },
        };
        debug!(id, symbol = %order.symbol, trigger, "Simulated order accepted");
        state.orders.insert(
            id,
            SimOrder {
                raw,
                trigger,
                cancelled: false,
            },
        );

        // Creation only acknowledges the id, like the real endpoint.
        Ok(RawOrder {
            id: id.to_string(),
            symbol: order.symbol,
            ..Default::default()
        })
    }
}

#[async_trait]
impl Connectivity for SimulatedExchange {
    async fn load_markets(&self) -> Result<HashMap<String, Market>, ConnectivityError> {
        let state = self.enter(Operation::LoadMarkets, None, &Params::new(), false)?;
        Ok(state.markets.clone())
    }

    async fn close(&self) -> Result<(), ConnectivityError> {
        let mut state = self.enter(Operation::Close, None, &Params::new(), false)?;
        state.closed = true;
        Ok(())
    }

    async fn fetch_ohlcv(
        &self,
        symbol: &str,
        _timeframe: Timeframe,
        params: Params,
    ) -> Result<Vec<RawCandle>, ConnectivityError> {
        let state = self.enter(Operation::FetchOhlcv, Some(symbol), &params, false)?;
        let candles = state
            .candles
            .get(symbol)
            .ok_or_else(|| ConnectivityError::BadSymbol(symbol.to_string()))?;

        let start = param_seconds(&params, "start_time").map(|s| s * 1000);
        let end = param_seconds(&params, "end_time").map(|s| s * 1000);
        let in_range = candles.iter().filter(|c| {
            start.map_or(true, |s| c.timestamp() >= s) && end.map_or(true, |e| c.timestamp() <= e)
        });

        if start.is_none() && end.is_none() {
            let all: Vec<RawCandle> = in_range.cloned().collect();
            let skip = all.len().saturating_sub(self.config.max_candles_per_request);
            return Ok(all.into_iter().skip(skip).collect());
        }
        Ok(in_range
            .take(self.config.max_candles_per_request)
            .cloned()
            .collect())
    }

    async fn fetch_balance(&self, params: Params) -> Result<RawBalance, ConnectivityError> {
        let state = self.enter(Operation::FetchBalance, None, &params, true)?;
        Ok(RawBalance {
            info: RawBalanceInfo {
                data: state.balances.clone(),
            },
        })
    }

    async fn set_leverage(
        &self,
        leverage: u32,
        symbol: &str,
        params: Params,
    ) -> Result<(), ConnectivityError> {
        let mut state = self.enter(Operation::SetLeverage, Some(symbol), &params, true)?;
        market(&state, symbol)?;
        if leverage == 0 {
            return Err(ConnectivityError::Exchange("leverage must be >= 1".to_string()));
        }
        let mode = params
            .get("marginMode")
            .and_then(Value::as_str)
            .unwrap_or("cross")
            .to_string();
        state.leverage.insert(symbol.to_string(), (leverage, mode));
        Ok(())
    }

    async fn fetch_positions(
        &self,
        symbols: &[String],
    ) -> Result<Vec<RawPosition>, ConnectivityError> {
        let state = self.enter(Operation::FetchPositions, None, &Params::new(), true)?;
        let wanted: HashSet<&str> = symbols.iter().map(String::as_str).collect();
        Ok(state
            .positions
            .iter()
            .filter(|p| wanted.is_empty() || wanted.contains(p.symbol.as_str()))
            .cloned()
            .collect())
    }

    async fn create_order(&self, order: NewOrder) -> Result<RawOrder, ConnectivityError> {
        self.place(order, Operation::CreateOrder)
    }

    async fn create_trigger_order(&self, order: NewOrder) -> Result<RawOrder, ConnectivityError> {
        self.place(order, Operation::CreateTriggerOrder)
    }

    async fn fetch_order(&self, id: &str, symbol: &str) -> Result<RawOrder, ConnectivityError> {
        let state = self.enter(Operation::FetchOrder, Some(symbol), &Params::new(), true)?;
        id.parse::<u64>()
            .ok()
            .and_then(|key| state.orders.get(&key))
            .filter(|o| o.raw.symbol == symbol)
            .map(|o| o.raw.clone())
            .ok_or_else(|| ConnectivityError::OrderNotFound(id.to_string()))
    }

    async fn fetch_open_orders(
        &self,
        symbol: &str,
        params: Params,
    ) -> Result<Vec<RawOrder>, ConnectivityError> {
        let state = self.enter(Operation::FetchOpenOrders, Some(symbol), &params, true)?;
        let trigger = param_flag(&params, "stop");
        Ok(state
            .orders
            .values()
            .filter(|o| o.raw.symbol == symbol && o.trigger == trigger && o.is_open())
            .map(|o| o.raw.clone())
            .collect())
    }

    async fn cancel_orders(
        &self,
        ids: &[String],
        symbol: &str,
        params: Params,
    ) -> Result<Vec<RawOrder>, ConnectivityError> {
        let mut state = self.enter(Operation::CancelOrders, Some(symbol), &params, true)?;
        let trigger = param_flag(&params, "stop");
        let wanted: HashSet<&str> = ids.iter().map(String::as_str).collect();

        let mut cancelled = Vec::new();
        for (id, order) in state.orders.iter_mut() {
            let selected = wanted.is_empty() || wanted.contains(id.to_string().as_str());
            if selected && order.raw.symbol == symbol && order.trigger == trigger && order.is_open()
            {
                order.cancelled = true;
                cancelled.push(order.raw.clone());
            }
        }

        if cancelled.is_empty() {
            return Err(ConnectivityError::OrderNotFound(format!(
                "no open orders to cancel on {}",
                symbol
            )));
        }
        Ok(cancelled)
    }

    fn price_to_precision(
        &self,
        symbol: &str,
        price: Decimal,
    ) -> Result<Decimal, ConnectivityError> {
        let state = self.state();
        let step = market(&state, symbol)?.price_step;
        Ok(round_to_step(price, step, RoundingStrategy::MidpointAwayFromZero))
    }

    fn amount_to_precision(
        &self,
        symbol: &str,
        amount: Decimal,
    ) -> Result<Decimal, ConnectivityError> {
        let state = self.state();
        let step = market(&state, symbol)?.amount_step;
        Ok(round_to_step(amount, step, RoundingStrategy::ToZero))
    }
}
