//! Raw payload -> normalized record mapping.
//!
//! All functions are pure: the caller supplies the external pair, the
//! contract size and the arithmetic context.

use perpkit_core::*;
use rust_decimal::Decimal;

/// Side codes that close an existing position (close short, close long).
const REDUCE_SIDE_CODES: [i64; 2] = [2, 3];

fn required<T>(value: Option<T>, field: &str) -> Result<T, AdapterError> {
    value.ok_or_else(|| AdapterError::Malformed(format!("missing field '{}'", field)))
}

/// Absent and zero both mean "not set" for optional price fields.
fn non_zero(value: Option<Decimal>) -> Option<Decimal> {
    value.filter(|v| !v.is_zero())
}

pub fn is_reduce_side(side_code: Option<i64>) -> bool {
    side_code.is_some_and(|code| REDUCE_SIDE_CODES.contains(&code))
}

fn parse_margin_type(margin_type: &str) -> Result<MarginMode, AdapterError> {
    match margin_type.to_ascii_lowercase().as_str() {
        "cross" | "crossed" => Ok(MarginMode::Cross),
        "isolated" => Ok(MarginMode::Isolated),
        other => Err(AdapterError::Malformed(format!(
            "unknown margin type '{}'",
            other
        ))),
    }
}

/// Pick the `currency` row out of the futures asset listing.
pub fn balance_from_raw(raw: RawBalance, currency: &str) -> Result<Balance, AdapterError> {
    let entry = raw
        .info
        .data
        .into_iter()
        .find(|entry| entry.currency == currency)
        .ok_or_else(|| AdapterError::MissingCurrency(currency.to_string()))?;

    Ok(Balance {
        total: entry.equity,
        free: entry.available_balance,
        used: entry.position_deposit,
    })
}

/// Size is `contracts * contract_size`; the current price is derived from
/// the mark value so that price and size stay consistent.
pub fn position_from_raw(
    raw: RawPosition,
    pair: String,
    ctx: &DecimalContext,
) -> Result<Position, AdapterError> {
    let contracts = required(raw.contracts, "contracts")?;
    let contract_size = required(raw.contract_size, "contractSize")?;
    let mark_price = required(raw.mark_price, "markPrice")?;

    let size = ctx.mul(contracts, contract_size)?;
    let current_price = ctx.div(mark_price, size)?;

    let side = required(raw.side.as_deref(), "side")?.parse()?;

    Ok(Position {
        pair,
        side,
        size,
        usd_size: mark_price.round_dp(2),
        entry_price: required(raw.entry_price, "entryPrice")?,
        current_price,
        unrealized_pnl: required(raw.unrealized_pnl, "unrealizedPnl")?,
        liquidation_price: non_zero(raw.liquidation_price),
        margin_mode: parse_margin_type(&raw.info.margin_type)?,
        leverage: required(raw.leverage, "leverage")?,
        hedge_mode: raw.hedged,
        open_timestamp: raw.info.open_timestamp,
        take_profit_price: non_zero(raw.take_profit_price),
        stop_loss_price: non_zero(raw.stop_loss_price),
    })
}

/// Amounts come back in contracts and are rescaled to asset units.
pub fn order_from_raw(
    raw: RawOrder,
    pair: String,
    contract_size: Decimal,
    ctx: &DecimalContext,
) -> Result<Order, AdapterError> {
    let amount = required(raw.amount, "amount")?;
    let filled = raw.filled.unwrap_or(Decimal::ZERO);
    let remaining = raw.remaining.unwrap_or(amount - filled);

    Ok(Order {
        id: raw.id,
        pair,
        order_type: required(raw.order_type.as_deref(), "type")?.parse()?,
        side: required(raw.side.as_deref(), "side")?.parse()?,
        price: raw.price,
        size: ctx.mul(amount, contract_size)?,
        reduce: is_reduce_side(raw.info.side_code()),
        filled: ctx.mul(filled, contract_size)?,
        remaining: ctx.mul(remaining, contract_size)?,
        timestamp: required(raw.timestamp, "timestamp")?,
    })
}

pub fn trigger_order_from_raw(
    raw: RawOrder,
    pair: String,
    contract_size: Decimal,
    ctx: &DecimalContext,
) -> Result<TriggerOrder, AdapterError> {
    let amount = required(raw.amount, "amount")?;

    Ok(TriggerOrder {
        id: raw.id,
        pair,
        order_type: required(raw.order_type.as_deref(), "type")?.parse()?,
        side: required(raw.side.as_deref(), "side")?.parse()?,
        price: non_zero(raw.price).unwrap_or(Decimal::ZERO),
        trigger_price: required(raw.trigger_price, "triggerPrice")?,
        size: ctx.mul(amount, contract_size)?,
        reduce: is_reduce_side(raw.info.side_code()),
        timestamp: required(raw.timestamp, "timestamp")?,
    })
}
