use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "backtests")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub task_id: String,
    pub submitted_at: DateTimeUtc,
    pub start_date: Date,
    pub end_date: Date,
    pub spread: i32,
    pub initial_portfolio_value: f64,
    pub strategy: String, // percent_under / desired_premium
    #[sea_orm(nullable)]
    pub strategy_unit: Option<f64>,
    pub status: String, // running / completed / error
    #[sea_orm(nullable)]
    pub bigquery_table: Option<String>, // raw trades
    #[sea_orm(nullable)]
    pub daily_table: Option<String>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_one = "super::statistics::Entity")]
    Statistics,
}

impl Related<super::statistics::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Statistics.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
