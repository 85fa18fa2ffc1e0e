pub mod simulated;

pub use simulated::{Call, Operation, SimFixture, SimulatedExchange, SimulatedExchangeConfig};
