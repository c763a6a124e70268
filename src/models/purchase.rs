use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::entities::BetType;

/// 单注请求（未校验，按调用方原样传入）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BetRequest {
    /// standard | rambolito
    pub bet_type: String,
    /// 1-3 位数字，不足 3 位左补 0
    pub bet_combination: String,
    pub bet_amount: Decimal,
}

impl BetRequest {
    pub fn new(bet_type: &str, bet_combination: &str, bet_amount: Decimal) -> Self {
        Self {
            bet_type: bet_type.to_string(),
            bet_combination: bet_combination.to_string(),
            bet_amount,
        }
    }
}

/// 校验通过、规范化后的单注
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedBet {
    pub bet_type: BetType,
    pub bet_combination: String,
    pub bet_amount: Decimal,
}

/// 购票回执；幂等重放时原样返回
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TicketReceipt {
    pub ticket_id: i64,
    pub ticket_number: String,
    pub remaining_balance: Decimal,
}

/// 提交后的购票事件（发送给上级监听者）
#[derive(Debug, Clone, Serialize)]
pub struct TicketEvent {
    pub ticket_id: i64,
    pub ticket_number: String,
    pub user_id: i64,
    pub draw_id: i64,
    pub total_amount: Decimal,
    pub qr_payload: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewTicket {
    pub ticket_number: String,
    pub user_id: i64,
    pub draw_id: i64,
    pub total_amount: Decimal,
    pub idempotency_key: Option<String>,
    pub bets: Vec<NewBet>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewBet {
    pub bet_type: BetType,
    pub bet_combination: String,
    pub bet_amount: Decimal,
    /// A, B, C ...
    pub sequence: String,
}

/// 票内序号：0 -> A, 25 -> Z, 26 -> AA
pub fn bet_sequence(index: usize) -> String {
    let mut n = index + 1;
    let mut out = Vec::new();
    while n > 0 {
        let rem = (n - 1) % 26;
        out.push(char::from(b'A' + rem as u8));
        n = (n - 1) / 26;
    }
    out.iter().rev().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bet_sequence() {
        assert_eq!(bet_sequence(0), "A");
        assert_eq!(bet_sequence(2), "C");
        assert_eq!(bet_sequence(25), "Z");
        assert_eq!(bet_sequence(26), "AA");
    }
}
