//! Transactional storage contracts used by the purchase, settlement and refund flows.
//!
//! A [`LotteryStore`] hands out [`StoreTx`] units of work. Every read and write the services
//! perform goes through one open unit; dropping it without [`StoreTx::commit`] discards all
//! of its writes. Lock order inside a unit is always draw row, then ticket row, then account
//! balance, then bet totals in ascending `(combination, bet_type)` order.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::entities::{
    BetType, DrawStatus, TicketStatus, account_balance_entity as balance,
    balance_transaction_entity as balance_tx, bet_entity, current_bet_total_entity as bet_total,
    draw_entity, prize_configuration_entity as prize_cfg, ticket_entity,
    winning_ticket_entity as winning,
};
use crate::error::AppResult;
use crate::models::{BetTotalKey, NewBalanceTransaction, NewDraw, NewTicket, TicketWithBets};

pub mod memory;
pub mod sea_orm_store;

pub use memory::MemoryStore;
pub use sea_orm_store::SeaOrmStore;

#[async_trait]
pub trait LotteryStore: Clone + Send + Sync + 'static {
    type Tx: StoreTx;

    async fn begin(&self) -> AppResult<Self::Tx>;
}

#[async_trait]
pub trait StoreTx: LedgerStore + LimitStore + TicketStore + DrawStore + Send + Sized {
    async fn commit(self) -> AppResult<()>;

    async fn rollback(self) -> AppResult<()>;
}

/// 余额与流水
#[async_trait]
pub trait LedgerStore {
    /// 行锁读取余额（SELECT ... FOR UPDATE）
    async fn lock_balance(&mut self, user_id: i64) -> AppResult<Option<balance::Model>>;

    /// current_balance += delta, total_used -= delta
    async fn adjust_balance(
        &mut self,
        user_id: i64,
        delta: Decimal,
        now: DateTime<Utc>,
    ) -> AppResult<balance::Model>;

    async fn append_transaction(&mut self, entry: NewBalanceTransaction)
    -> AppResult<balance_tx::Model>;

    async fn set_transaction_reference(&mut self, transaction_id: i64, reference_id: i64)
    -> AppResult<()>;

    /// 某张票对应的购票扣款流水
    async fn purchase_transaction_for(&mut self, ticket_id: i64)
    -> AppResult<Option<balance_tx::Model>>;
}

/// 限额与号码累计
#[async_trait]
pub trait LimitStore {
    /// 生效限额：单场单号覆盖优先，否则取启用的全局限额；都没有返回 None
    async fn effective_cap(
        &mut self,
        draw_id: i64,
        bet_combination: &str,
        bet_type: BetType,
    ) -> AppResult<Option<Decimal>>;

    /// 不加锁读取
    async fn current_total(&mut self, key: &BetTotalKey) -> AppResult<Option<bet_total::Model>>;

    /// 不存在时以 0 创建，然后加行锁读取
    async fn lock_bet_total(
        &mut self,
        key: &BetTotalKey,
        now: DateTime<Utc>,
    ) -> AppResult<bet_total::Model>;

    async fn apply_bet_total(
        &mut self,
        key: &BetTotalKey,
        amount_delta: Decimal,
        count_delta: i64,
        now: DateTime<Utc>,
    ) -> AppResult<bet_total::Model>;

    async fn draw_totals(&mut self, draw_id: i64) -> AppResult<Vec<bet_total::Model>>;

    async fn prize_configurations(&mut self) -> AppResult<Vec<prize_cfg::Model>>;
}

#[async_trait]
pub trait TicketStore {
    async fn find_ticket_by_idempotency_key(
        &mut self,
        user_id: i64,
        idempotency_key: &str,
    ) -> AppResult<Option<ticket_entity::Model>>;

    /// 用户在该场次所有未取消票据上的投注
    async fn placed_bets(&mut self, user_id: i64, draw_id: i64) -> AppResult<Vec<bet_entity::Model>>;

    async fn insert_ticket(&mut self, ticket: NewTicket) -> AppResult<TicketWithBets>;

    /// 不加锁读取
    async fn find_ticket(&mut self, ticket_id: i64) -> AppResult<Option<ticket_entity::Model>>;

    async fn lock_ticket(&mut self, ticket_id: i64) -> AppResult<Option<TicketWithBets>>;

    async fn find_ticket_by_number(&mut self, ticket_number: &str)
    -> AppResult<Option<TicketWithBets>>;

    /// 加锁读取该场次全部 pending 票据
    async fn pending_tickets(&mut self, draw_id: i64) -> AppResult<Vec<TicketWithBets>>;

    async fn set_ticket_status(
        &mut self,
        ticket_id: i64,
        status: TicketStatus,
        now: DateTime<Utc>,
    ) -> AppResult<()>;

    async fn has_winning_record(&mut self, ticket_id: i64) -> AppResult<bool>;

    async fn insert_winning_ticket(
        &mut self,
        ticket_id: i64,
        draw_id: i64,
        prize_amount: Decimal,
        now: DateTime<Utc>,
    ) -> AppResult<winning::Model>;
}

#[async_trait]
pub trait DrawStore {
    async fn find_draw(&mut self, draw_id: i64) -> AppResult<Option<draw_entity::Model>>;

    /// 排他锁（SELECT ... FOR UPDATE），结算使用
    async fn lock_draw(&mut self, draw_id: i64) -> AppResult<Option<draw_entity::Model>>;

    /// 共享锁（SELECT ... FOR SHARE），购票与退票使用；与结算互斥，彼此不互斥
    async fn lock_draw_shared(&mut self, draw_id: i64) -> AppResult<Option<draw_entity::Model>>;

    /// 标记 settled、写入开奖号码并插入官方结果
    async fn record_result(
        &mut self,
        draw_id: i64,
        winning_number: &str,
        now: DateTime<Utc>,
    ) -> AppResult<()>;

    /// 已存在 (draw_date, time_slot) 时返回 None
    async fn insert_draw(&mut self, draw: NewDraw) -> AppResult<Option<draw_entity::Model>>;

    /// 状态仍为 open 但截止时间已到的场次
    async fn open_draws_due(&mut self, now: DateTime<Utc>) -> AppResult<Vec<draw_entity::Model>>;

    async fn set_draw_status(
        &mut self,
        draw_id: i64,
        status: DrawStatus,
        now: DateTime<Utc>,
    ) -> AppResult<()>;
}
