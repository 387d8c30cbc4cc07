pub mod backtest_repo;

pub use backtest_repo::BacktestRepository;
