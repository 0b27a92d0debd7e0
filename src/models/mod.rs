pub mod campaign;
pub mod order;
pub mod product;
pub mod ticker;

pub use campaign::{Campaign, CampaignState, SellLimitUnit};
pub use order::Order;
pub use product::{Product, ProductParseError};
pub use ticker::{Side, TickerEvent};
