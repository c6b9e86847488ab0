pub mod prices;
pub mod store;

pub use prices::*;
pub use store::*;
