use crate::backtest::model::{DailyAggregate, SummaryStatistics, TradeRecord};
use chrono::NaiveDate;
use std::collections::BTreeMap;

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum ReductionError {
    #[error("initial portfolio value must be positive and finite, got {0}")]
    InvalidInitialValue(f64),
    #[error("trade on {date} has non-finite profit/loss {value}")]
    NonFiniteProfit { date: NaiveDate, value: f64 },
}

/// Reduces raw trades into per-day aggregates and the summary row.
///
/// Conventions:
/// - the first day has no prior portfolio value, its percent change is 0
/// - a prior portfolio value of exactly 0 also yields a 0 percent change
/// - `std_deviation` is the sample deviation (n - 1) and 0 when n <= 1
/// - days with a 0 percent change count as neither positive nor negative
pub struct StatisticsEngine;

impl StatisticsEngine {
    pub fn reduce(
        trades: &[TradeRecord],
        initial_portfolio_value: f64,
    ) -> Result<(Vec<DailyAggregate>, SummaryStatistics), ReductionError> {
        if !initial_portfolio_value.is_finite() || initial_portfolio_value <= 0.0 {
            return Err(ReductionError::InvalidInitialValue(initial_portfolio_value));
        }

        let mut by_date: BTreeMap<NaiveDate, f64> = BTreeMap::new();
        for trade in trades {
            if !trade.profit_loss.is_finite() {
                return Err(ReductionError::NonFiniteProfit {
                    date: trade.current_date,
                    value: trade.profit_loss,
                });
            }
            *by_date.entry(trade.current_date).or_insert(0.0) += trade.profit_loss;
        }

        let daily = Self::daily_aggregates(&by_date, initial_portfolio_value);
        let summary = Self::summarize(&daily, initial_portfolio_value);
        Ok((daily, summary))
    }

    fn daily_aggregates(
        by_date: &BTreeMap<NaiveDate, f64>,
        initial_portfolio_value: f64,
    ) -> Vec<DailyAggregate> {
        let mut out = Vec::with_capacity(by_date.len());
        let mut portfolio = initial_portfolio_value;
        let mut prev: Option<f64> = None;

        for (&date, &daily_return) in by_date {
            portfolio += daily_return;
            let daily_return_percent = match prev {
                Some(p) if p != 0.0 => (portfolio - p) / p * 100.0,
                _ => 0.0,
            };
            out.push(DailyAggregate {
                date,
                daily_return,
                cumulative_portfolio_value: portfolio,
                daily_return_percent,
            });
            prev = Some(portfolio);
        }
        out
    }

    pub fn summarize(daily: &[DailyAggregate], initial_portfolio_value: f64) -> SummaryStatistics {
        let total_return: f64 = daily.iter().map(|d| d.daily_return).sum();
        let max_drawdown = Self::max_drawdown(daily);

        let pcts: Vec<f64> = daily.iter().map(|d| d.daily_return_percent).collect();
        let average_daily_return = mean(&pcts);

        SummaryStatistics {
            total_return,
            total_return_percentage: total_return / initial_portfolio_value * 100.0,
            max_drawdown,
            max_drawdown_percent: max_drawdown / initial_portfolio_value * 100.0,
            std_deviation: sample_std(&pcts, average_daily_return),
            positive_periods: pcts.iter().filter(|p| **p > 0.0).count() as i32,
            negative_periods: pcts.iter().filter(|p| **p < 0.0).count() as i32,
            average_daily_return,
        }
    }

    /// Largest fall of the cumulative return below its running maximum.
    /// The running maximum starts at the first day's cumulative return.
    pub fn max_drawdown(daily: &[DailyAggregate]) -> f64 {
        let mut cumulative = 0.0;
        let mut running_max = f64::NEG_INFINITY;
        let mut worst = 0.0_f64;

        for d in daily {
            cumulative += d.daily_return;
            running_max = running_max.max(cumulative);
            worst = worst.max(running_max - cumulative);
        }
        worst
    }

    /// Root mean square shortfall of the daily percent return below `mar`,
    /// averaged over every day (days at or above `mar` contribute 0).
    pub fn downside_deviation(daily: &[DailyAggregate], mar: f64) -> f64 {
        if daily.is_empty() {
            return 0.0;
        }
        let squares: Vec<f64> = daily
            .iter()
            .map(|d| {
                if d.daily_return_percent < mar {
                    (mar - d.daily_return_percent).powi(2)
                } else {
                    0.0
                }
            })
            .collect();
        mean(&squares).sqrt()
    }
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

fn sample_std(values: &[f64], mean: f64) -> f64 {
    if values.len() <= 1 {
        return 0.0;
    }
    let ss: f64 = values.iter().map(|v| (v - mean).powi(2)).sum();
    (ss / (values.len() - 1) as f64).sqrt()
}
