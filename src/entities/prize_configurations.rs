use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use super::BetType;

/// 奖金倍数配置
/// - multiplier: standard 直选倍数；rambolito 三个不同数字的倍数
/// - double_multiplier: rambolito 对子（两位相同）倍数，NULL 使用默认值
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(table_name = "prize_configurations")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub bet_type: BetType,
    pub multiplier: Decimal,
    pub double_multiplier: Option<Decimal>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
