//! Raw payload shapes exchanged with the connectivity layer.
//!
//! These mirror the unified structures a connectivity library hands back,
//! including the exchange-specific `info` blocks the adapters read from.
//! Nothing here is normalized: symbols are internal, sizes are in contracts.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::models::{OrderType, Side};

/// Exchange-specific request parameters.
pub type Params = serde_json::Map<String, Value>;

/// Build a `Params` map from a `json!` object literal. Non-object values
/// yield an empty map.
pub fn params(value: Value) -> Params {
    match value {
        Value::Object(map) => map,
        _ => Params::new(),
    }
}

/// `[timestamp_ms, open, high, low, close, volume]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawCandle(
    pub i64,
    pub Decimal,
    pub Decimal,
    pub Decimal,
    pub Decimal,
    pub Decimal,
);

impl RawCandle {
    pub fn timestamp(&self) -> i64 {
        self.0
    }
}

// ---------------------------------------------------------------------------
// Balance
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawBalance {
    pub info: RawBalanceInfo,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawBalanceInfo {
    #[serde(default)]
    pub data: Vec<RawBalanceEntry>,
}

/// One currency row of the futures asset listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawBalanceEntry {
    pub currency: String,
    pub equity: Decimal,
    pub available_balance: Decimal,
    pub position_deposit: Decimal,
}

// ---------------------------------------------------------------------------
// Positions
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawPosition {
    pub symbol: String,
    #[serde(default)]
    pub side: Option<String>,
    #[serde(default)]
    pub contracts: Option<Decimal>,
    #[serde(default)]
    pub contract_size: Option<Decimal>,
    /// Mark value of the whole position on this exchange, not a unit price.
    #[serde(default)]
    pub mark_price: Option<Decimal>,
    #[serde(default)]
    pub entry_price: Option<Decimal>,
    #[serde(default)]
    pub unrealized_pnl: Option<Decimal>,
    #[serde(default)]
    pub liquidation_price: Option<Decimal>,
    #[serde(default)]
    pub leverage: Option<Decimal>,
    #[serde(default)]
    pub hedged: Option<bool>,
    #[serde(default)]
    pub take_profit_price: Option<Decimal>,
    #[serde(default)]
    pub stop_loss_price: Option<Decimal>,
    #[serde(default)]
    pub info: RawPositionInfo,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawPositionInfo {
    #[serde(default)]
    pub margin_type: String,
    #[serde(default)]
    pub open_timestamp: i64,
}

// ---------------------------------------------------------------------------
// Orders
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawOrder {
    pub id: String,
    pub symbol: String,
    #[serde(rename = "type", default)]
    pub order_type: Option<String>,
    #[serde(default)]
    pub side: Option<String>,
    #[serde(default)]
    pub price: Option<Decimal>,
    #[serde(default)]
    pub amount: Option<Decimal>,
    #[serde(default)]
    pub filled: Option<Decimal>,
    #[serde(default)]
    pub remaining: Option<Decimal>,
    #[serde(default)]
    pub timestamp: Option<i64>,
    #[serde(default)]
    pub trigger_price: Option<Decimal>,
    #[serde(default)]
    pub info: RawOrderInfo,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawOrderInfo {
    /// Exchange side code; sent as a number or a numeric string.
    #[serde(default)]
    pub side: Option<Value>,
}

impl RawOrderInfo {
    /// Numeric side code: 1 open long, 2 close short, 3 close long,
    /// 4 open short.
    pub fn side_code(&self) -> Option<i64> {
        match self.side.as_ref()? {
            Value::Number(n) => n.as_i64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }
}

/// An order creation request as handed to the connectivity layer.
/// `amount` is in contracts.
#[derive(Debug, Clone, PartialEq)]
pub struct NewOrder {
    pub symbol: String,
    pub order_type: OrderType,
    pub side: Side,
    pub amount: Decimal,
    pub price: Option<Decimal>,
    pub trigger_price: Option<Decimal>,
    pub params: Params,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use serde_json::json;

    #[test]
    fn test_balance_accepts_string_amounts() {
        let raw: RawBalance = serde_json::from_value(json!({
            "info": {"data": [{
                "currency": "USDT",
                "equity": "120.50",
                "available_balance": "100.25",
                "position_deposit": "20.25",
                "frozen_balance": "0"
            }]},
            "USDT": {"free": 100.25}
        }))
        .unwrap();
        assert_eq!(raw.info.data.len(), 1);
        assert_eq!(raw.info.data[0].equity, dec!(120.50));
    }

    #[test]
    fn test_candle_from_array() {
        let candle: RawCandle =
            serde_json::from_value(json!([1700000000000i64, 1.5, 2.0, 1.0, 1.75, 300])).unwrap();
        assert_eq!(candle.timestamp(), 1_700_000_000_000);
        assert_eq!(candle.4, dec!(1.75));
    }

    #[test]
    fn test_side_code_number_or_string() {
        let numeric: RawOrder = serde_json::from_value(json!({
            "id": "1", "symbol": "BTC-USDT:USDT", "info": {"side": 3}
        }))
        .unwrap();
        assert_eq!(numeric.info.side_code(), Some(3));

        let text: RawOrder = serde_json::from_value(json!({
            "id": "2", "symbol": "BTC-USDT:USDT", "info": {"side": "2"}
        }))
        .unwrap();
        assert_eq!(text.info.side_code(), Some(2));

        let missing: RawOrder =
            serde_json::from_value(json!({"id": "3", "symbol": "BTC-USDT:USDT"})).unwrap();
        assert_eq!(missing.info.side_code(), None);
    }

    #[test]
    fn test_params_from_object_only() {
        let p = params(json!({"stop": true}));
        assert_eq!(p.get("stop"), Some(&json!(true)));
        assert!(params(json!([1, 2])).is_empty());
    }
}
