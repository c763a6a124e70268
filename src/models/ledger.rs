use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::entities::{TransactionKind, TransactionStatus};

/// 追加一条流水（只增不改，reference_id 除外）
#[derive(Debug, Clone)]
pub struct NewBalanceTransaction {
    pub user_id: i64,
    /// 带符号：扣款为负
    pub amount: Decimal,
    pub kind: TransactionKind,
    pub description: String,
    pub reference_id: Option<i64>,
    pub status: TransactionStatus,
    pub balance_after: Decimal,
    pub created_at: DateTime<Utc>,
}
