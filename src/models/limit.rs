use rust_decimal::Decimal;
use serde::Serialize;

use crate::entities::BetType;

/// current_bet_totals 的唯一键
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BetTotalKey {
    pub draw_id: i64,
    pub bet_combination: String,
    pub bet_type: BetType,
}

impl BetTotalKey {
    pub fn new(draw_id: i64, bet_combination: &str, bet_type: BetType) -> Self {
        Self {
            draw_id,
            bet_combination: bet_combination.to_string(),
            bet_type,
        }
    }
}

/// 号码限额查询结果（只读，不加锁）
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LimitStatus {
    pub bet_combination: String,
    pub bet_type: BetType,
    pub current_amount: Decimal,
    pub limit_amount: Decimal,
    pub remaining_amount: Decimal,
    pub is_sold_out: bool,
}

impl LimitStatus {
    pub fn new(bet_combination: String, bet_type: BetType, current: Decimal, cap: Decimal) -> Self {
        let remaining = (cap - current).max(Decimal::ZERO);
        Self {
            bet_combination,
            bet_type,
            current_amount: current,
            limit_amount: cap,
            remaining_amount: remaining,
            is_sold_out: remaining.is_zero(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SoldOutEntry {
    pub bet_combination: String,
    pub bet_type: BetType,
    pub total_amount: Decimal,
    pub limit_amount: Decimal,
    pub ticket_count: i64,
}
