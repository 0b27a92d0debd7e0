pub mod coinbase;
pub mod exchange;
pub mod simulated;

pub use coinbase::CoinbaseExchange;
pub use exchange::{ExchangeError, ExchangeProvider, ExchangeRegistry, TickerHandle};
pub use simulated::{SimulatedExchange, SimulatedFeed};
