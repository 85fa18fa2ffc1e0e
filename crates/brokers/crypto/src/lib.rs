//! Crypto exchange adapters.
//!
//! Each adapter translates the normalized `PerpExchange` interface into calls
//! on a `Connectivity` session: external pairs become internal symbols,
//! sizes are rescaled by contract size, and raw payloads are reshaped into
//! normalized records.

pub mod bitmart;
pub mod normalize;
pub mod ohlcv;
pub mod pair;

pub use bitmart::{AdapterSettings, BitmartPerp, Credentials};
