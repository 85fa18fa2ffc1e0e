//! External <-> internal pair notation.
//!
//! Callers use `BTC-USDT`; the connectivity layer addresses the linear
//! perpetual as `BTC-USDT:USDT`.

/// `BTC-USDT` -> `BTC-USDT:USDT`
pub fn ext_pair_to_pair(ext_pair: &str, settle_suffix: &str) -> String {
    format!("{}{}", ext_pair, settle_suffix)
}

/// `BTC-USDT:USDT` -> `BTC-USDT`
pub fn pair_to_ext_pair(pair: &str, settle_suffix: &str) -> String {
    pair.replace(settle_suffix, "")
}
