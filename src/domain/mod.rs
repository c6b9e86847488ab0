pub mod indicators;
pub mod types;

pub use indicators::*;
pub use types::*;
