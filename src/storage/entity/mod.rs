pub mod backtest;
pub mod statistics;

pub use backtest::Entity as Backtest;
pub use statistics::Entity as Statistics;
