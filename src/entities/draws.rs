use chrono::{DateTime, NaiveDate, Utc};
use sea_orm::entity::prelude::*;
use sea_orm::{DeriveActiveEnum, EnumIter};
use serde::{Deserialize, Serialize};

/// 每日固定开奖时段；截止时间为开奖前 5 分钟（营业时区）
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord, DeriveActiveEnum, EnumIter,
)]
#[sea_orm(rs_type = "String", db_type = "String(Some(16))")]
#[serde(rename_all = "snake_case")]
pub enum TimeSlot {
    #[sea_orm(string_value = "two_pm")]
    TwoPm,
    #[sea_orm(string_value = "five_pm")]
    FivePm,
    #[sea_orm(string_value = "nine_pm")]
    NinePm,
}

impl TimeSlot {
    pub const ALL: [TimeSlot; 3] = [TimeSlot::TwoPm, TimeSlot::FivePm, TimeSlot::NinePm];

    /// 开奖时间 (本地 时, 分)
    pub fn draw_time(&self) -> (u32, u32) {
        match self {
            TimeSlot::TwoPm => (14, 0),
            TimeSlot::FivePm => (17, 0),
            TimeSlot::NinePm => (21, 0),
        }
    }

    /// 投注截止时间 (本地 时, 分)
    pub fn cutoff_time(&self) -> (u32, u32) {
        match self {
            TimeSlot::TwoPm => (13, 55),
            TimeSlot::FivePm => (16, 55),
            TimeSlot::NinePm => (20, 55),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            TimeSlot::TwoPm => "2:00 PM",
            TimeSlot::FivePm => "5:00 PM",
            TimeSlot::NinePm => "9:00 PM",
        }
    }
}

impl std::fmt::Display for TimeSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TimeSlot::TwoPm => write!(f, "two_pm"),
            TimeSlot::FivePm => write!(f, "five_pm"),
            TimeSlot::NinePm => write!(f, "nine_pm"),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, DeriveActiveEnum, EnumIter)]
#[sea_orm(rs_type = "String", db_type = "String(Some(16))")]
#[serde(rename_all = "snake_case")]
pub enum DrawStatus {
    #[sea_orm(string_value = "open")]
    Open,
    #[sea_orm(string_value = "closed")]
    Closed,
    #[sea_orm(string_value = "settled")]
    Settled,
}

impl std::fmt::Display for DrawStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DrawStatus::Open => write!(f, "open"),
            DrawStatus::Closed => write!(f, "closed"),
            DrawStatus::Settled => write!(f, "settled"),
        }
    }
}

/// 开奖场次
/// 状态流转: open -> closed (截止) -> settled (录入官方结果)
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(table_name = "draws")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub draw_date: NaiveDate,
    pub time_slot: TimeSlot,
    pub status: DrawStatus,
    pub cutoff_at: DateTime<Utc>,
    pub winning_number: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
