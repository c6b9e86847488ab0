pub mod adaptive;
pub mod q_learning;

pub use adaptive::*;
pub use q_learning::*;
