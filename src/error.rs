use rust_decimal::Decimal;
use sea_orm::DbErr;
use thiserror::Error;

use crate::entities::{BetType, TicketStatus};

pub type AppResult<T> = Result<T, AppError>;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    DatabaseError(DbErr),

    /// 序列化冲突 / 死锁 / 锁等待超时：可整体重试
    #[error("Concurrent update conflict: {0}")]
    Conflict(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Config error: {0}")]
    ConfigError(String),

    #[error("Internal server error: {0}")]
    InternalError(String),

    #[error("Migration error: {0}")]
    MigrateError(String),
}

impl AppError {
    pub fn is_transient(&self) -> bool {
        matches!(self, AppError::Conflict(_))
    }
}

/// PostgreSQL 在并发下返回的可重试错误
/// 40001 serialization_failure, 40P01 deadlock_detected, 55P03 lock_not_available,
/// 23505 unique_violation（并发插入同一幂等键 / 票号碰撞，重试时会重新检查）
const TRANSIENT_MARKERS: [&str; 8] = [
    "40001",
    "40P01",
    "55P03",
    "23505",
    "could not serialize access",
    "deadlock detected",
    "could not obtain lock",
    "duplicate key value violates unique constraint",
];

impl From<DbErr> for AppError {
    fn from(err: DbErr) -> Self {
        let msg = err.to_string();
        if TRANSIENT_MARKERS.iter().any(|m| msg.contains(m)) {
            AppError::Conflict(msg)
        } else {
            AppError::DatabaseError(err)
        }
    }
}

/// 单注格式错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InvalidBet {
    #[error("Invalid bet digits \"{0}\": must be 1-3 digits")]
    Combination(String),

    #[error("Invalid bet type \"{0}\"")]
    BetType(String),

    #[error("Triple numbers ({0}) are not allowed for rambolito betting")]
    RambolitoTriple(String),

    #[error("Bet amount must be greater than zero")]
    NonPositiveAmount,

    #[error("Bet amount {amount} exceeds the maximum of {max}")]
    AmountTooLarge { amount: Decimal, max: Decimal },

    #[error("Bet amount {0} has more than two decimal places")]
    AmountPrecision(Decimal),
}

/// 购票错误；除 Busy / Store 外均为终态，调用方修正输入后可重新发起
#[derive(Error, Debug)]
pub enum PurchaseError {
    #[error("Bets list must not be empty")]
    EmptyBets,

    #[error("A ticket may carry at most {max} bets")]
    TooManyBets { max: usize },

    #[error("Bet at index {index}: {reason}")]
    InvalidBet { index: usize, reason: InvalidBet },

    #[error("Draw {0} not found")]
    DrawNotFound(i64),

    #[error("Draw {0} is not open for betting")]
    DrawNotOpen(i64),

    #[error("Betting cutoff for draw {0} has passed")]
    CutoffPassed(i64),

    #[error("Duplicate bet: {combination} ({bet_type}) is already placed for this draw")]
    DuplicateBet {
        combination: String,
        bet_type: BetType,
    },

    #[error("Balance account for user {0} not found")]
    AccountNotFound(i64),

    #[error("Insufficient balance. Required: {required}, available: {available}")]
    InsufficientFunds {
        required: Decimal,
        available: Decimal,
    },

    #[error("Bet limit exceeded for {combination} ({bet_type}), remaining: {remaining}")]
    LimitExceeded {
        combination: String,
        bet_type: BetType,
        remaining: Decimal,
    },

    #[error("Purchase aborted after {attempts} conflicting attempts")]
    Busy { attempts: u32 },

    #[error(transparent)]
    Store(#[from] AppError),
}

impl PurchaseError {
    /// 提供给上层路由的稳定错误码
    pub fn code(&self) -> &'static str {
        match self {
            PurchaseError::EmptyBets => "EMPTY_BETS",
            PurchaseError::TooManyBets { .. } => "TOO_MANY_BETS",
            PurchaseError::InvalidBet { .. } => "INVALID_BET",
            PurchaseError::DrawNotFound(_) => "DRAW_NOT_FOUND",
            PurchaseError::DrawNotOpen(_) => "DRAW_NOT_OPEN",
            PurchaseError::CutoffPassed(_) => "CUTOFF_PASSED",
            PurchaseError::DuplicateBet { .. } => "DUPLICATE_BET",
            PurchaseError::AccountNotFound(_) => "ACCOUNT_NOT_FOUND",
            PurchaseError::InsufficientFunds { .. } => "INSUFFICIENT_FUNDS",
            PurchaseError::LimitExceeded { .. } => "LIMIT_EXCEEDED",
            PurchaseError::Busy { .. } => "BUSY",
            PurchaseError::Store(_) => "STORE_ERROR",
        }
    }
}

#[derive(Error, Debug)]
pub enum SettlementError {
    #[error("Official number must be exactly 3 digits, got \"{0}\"")]
    InvalidNumber(String),

    #[error("Draw {0} not found")]
    DrawNotFound(i64),

    #[error("Draw {0} already settled")]
    AlreadySettled(i64),

    #[error(transparent)]
    Store(#[from] AppError),
}

#[derive(Error, Debug)]
pub enum RefundError {
    #[error("Ticket {0} not found")]
    TicketNotFound(i64),

    #[error("Ticket cannot be refunded in status {0}")]
    NotRefundable(TicketStatus),

    #[error("Draw {0} is already settled")]
    DrawSettled(i64),

    #[error(transparent)]
    Store(#[from] AppError),
}

#[derive(Error, Debug)]
pub enum VerifyError {
    #[error("Invalid QR code format")]
    MalformedPayload,

    #[error("Ticket {0} not found")]
    TicketNotFound(String),

    #[error("Ticket {0} failed verification")]
    HashMismatch(String),

    #[error(transparent)]
    Store(#[from] AppError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deadlock_is_transient() {
        let err: AppError = DbErr::Custom("deadlock detected".into()).into();
        assert!(err.is_transient());
    }

    #[test]
    fn test_other_db_errors_are_not_transient() {
        let err: AppError = DbErr::Custom("relation \"tickets\" does not exist".into()).into();
        assert!(!err.is_transient());
        assert!(matches!(err, AppError::DatabaseError(_)));
    }

    #[test]
    fn test_purchase_error_codes() {
        let err = PurchaseError::LimitExceeded {
            combination: "123".into(),
            bet_type: BetType::Standard,
            remaining: Decimal::from(500),
        };
        assert_eq!(err.code(), "LIMIT_EXCEEDED");
        assert!(err.to_string().contains("123"));
        assert_eq!(PurchaseError::EmptyBets.code(), "EMPTY_BETS");
    }
}
