use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "statistics")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    #[sea_orm(unique)]
    pub backtest_id: Uuid, // one statistics row per completed backtest
    pub total_return_percentage: f64,
    pub total_return: f64,
    pub max_drawdown_percent: f64,
    pub max_drawdown: f64,
    pub std_deviation: f64,
    pub positive_periods: i32,
    pub negative_periods: i32,
    pub average_daily_return: f64,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::backtest::Entity",
        from = "Column::BacktestId",
        to = "super::backtest::Column::Id",
        on_delete = "Cascade"
    )]
    Backtest,
}

impl Related<super::backtest::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Backtest.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
