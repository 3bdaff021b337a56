pub mod allocation;
pub mod backtest;
pub mod market;
pub mod parameters;
pub mod version;

pub use allocation::*;
pub use backtest::*;
pub use market::*;
pub use parameters::*;
pub use version::*;
