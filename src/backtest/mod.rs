pub mod engine;
pub mod portfolio;
pub mod runner;

pub use engine::*;
pub use portfolio::*;
pub use runner::*;
