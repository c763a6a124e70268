use rust_decimal::Decimal;
use serde::Serialize;

use crate::entities::BetType;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WinningBet {
    pub bet_type: BetType,
    pub bet_combination: String,
    pub bet_amount: Decimal,
    pub multiplier: Decimal,
    pub prize_amount: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WinnerSummary {
    pub ticket_id: i64,
    pub ticket_number: String,
    pub user_id: i64,
    pub winning_bets: Vec<WinningBet>,
    pub prize_amount: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SettlementResult {
    pub draw_id: i64,
    pub winning_number: String,
    pub winners_count: usize,
    pub losers_count: usize,
    pub total_prize_amount: Decimal,
    pub winners: Vec<WinnerSummary>,
}
