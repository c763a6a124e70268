use rust_decimal::Decimal;
use serde::Serialize;

use crate::entities::{TicketStatus, bet_entity, ticket_entity};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TicketWithBets {
    pub ticket: ticket_entity::Model,
    pub bets: Vec<bet_entity::Model>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RefundReceipt {
    pub ticket_id: i64,
    pub refunded_amount: Decimal,
    pub remaining_balance: Decimal,
    pub status: TicketStatus,
}
