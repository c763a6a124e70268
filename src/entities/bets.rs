use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use sea_orm::{DeriveActiveEnum, EnumIter};
use serde::{Deserialize, Serialize};

#[derive(
    Debug,
    Clone,
    Copy,
    Serialize,
    Deserialize,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    DeriveActiveEnum,
    EnumIter,
)]
#[sea_orm(rs_type = "String", db_type = "String(Some(16))")]
#[serde(rename_all = "snake_case")]
pub enum BetType {
    /// 直选：三位数字完全一致才中奖
    #[sea_orm(string_value = "standard")]
    Standard,
    /// 组选：任意排列均中奖
    #[sea_orm(string_value = "rambolito")]
    Rambolito,
}

impl BetType {
    pub fn as_str(&self) -> &'static str {
        match self {
            BetType::Standard => "standard",
            BetType::Rambolito => "rambolito",
        }
    }
}

impl std::fmt::Display for BetType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for BetType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "standard" => Ok(BetType::Standard),
            "rambolito" => Ok(BetType::Rambolito),
            other => Err(other.to_string()),
        }
    }
}

/// 票上的单注
/// sequence: 同一张票内的序号 A, B, C ...
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(table_name = "bets")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub ticket_id: i64,
    pub bet_type: BetType,
    pub bet_combination: String,
    pub bet_amount: Decimal,
    pub sequence: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
