//! In-process store backed by a single async mutex.
//!
//! A unit of work holds the mutex for its whole lifetime and edits a private copy of the
//! state; commit publishes the copy, drop throws it away. That makes every unit fully
//! serializable, which is all the row locks of the PostgreSQL store promise.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use tokio::sync::{Mutex, OwnedMutexGuard};

use super::{DrawStore, LedgerStore, LimitStore, LotteryStore, StoreTx, TicketStore};
use crate::entities::{
    BetType, DrawStatus, TicketStatus, TimeSlot, TransactionKind, TransactionStatus,
    account_balance_entity as balance, balance_transaction_entity as balance_tx, bet_entity,
    bet_limit_entity as bet_limit, bet_limit_per_draw_entity as per_draw,
    current_bet_total_entity as bet_total, draw_entity, draw_result_entity as draw_result,
    prize_configuration_entity as prize_cfg, ticket_entity, winning_ticket_entity as winning,
};
use crate::error::{AppError, AppResult};
use crate::models::{BetTotalKey, NewBalanceTransaction, NewDraw, NewTicket, TicketWithBets};

#[derive(Debug, Clone, Default)]
struct MemoryState {
    next_id: i64,
    balances: BTreeMap<i64, balance::Model>,
    transactions: Vec<balance_tx::Model>,
    draws: BTreeMap<i64, draw_entity::Model>,
    draw_results: Vec<draw_result::Model>,
    bet_limits: BTreeMap<BetType, bet_limit::Model>,
    number_limits: BTreeMap<BetTotalKey, per_draw::Model>,
    prizes: BTreeMap<BetType, prize_cfg::Model>,
    totals: BTreeMap<BetTotalKey, bet_total::Model>,
    tickets: BTreeMap<i64, ticket_entity::Model>,
    bets: Vec<bet_entity::Model>,
    winning: Vec<winning::Model>,
}

impl MemoryState {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn with_bets(&self, ticket: &ticket_entity::Model) -> TicketWithBets {
        TicketWithBets {
            ticket: ticket.clone(),
            bets: self
                .bets
                .iter()
                .filter(|b| b.ticket_id == ticket.id)
                .cloned()
                .collect(),
        }
    }
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
    pending_conflicts: Arc<AtomicUsize>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 之后的 n 次 lock_balance 返回 Conflict（模拟死锁 / 序列化失败）
    pub fn inject_conflicts(&self, n: usize) {
        self.pending_conflicts.store(n, Ordering::SeqCst);
    }

    pub async fn seed_balance(&self, user_id: i64, amount: Decimal) -> balance::Model {
        let mut state = self.state.lock().await;
        let now = Utc::now();
        let id = state.next_id();
        let row = balance::Model {
            id,
            user_id,
            current_balance: amount,
            total_loaded: amount,
            total_used: Decimal::ZERO,
            created_at: now,
            updated_at: now,
        };
        state.balances.insert(user_id, row.clone());
        row
    }

    pub async fn seed_draw(
        &self,
        draw_date: NaiveDate,
        time_slot: TimeSlot,
        status: DrawStatus,
        cutoff_at: DateTime<Utc>,
    ) -> draw_entity::Model {
        let mut state = self.state.lock().await;
        let now = Utc::now();
        let id = state.next_id();
        let row = draw_entity::Model {
            id,
            draw_date,
            time_slot,
            status,
            cutoff_at,
            winning_number: None,
            created_at: now,
            updated_at: now,
        };
        state.draws.insert(id, row.clone());
        row
    }

    pub async fn set_bet_limit(&self, bet_type: BetType, limit_amount: Decimal) {
        let mut state = self.state.lock().await;
        let now = Utc::now();
        let id = state.next_id();
        state.bet_limits.insert(
            bet_type,
            bet_limit::Model {
                id,
                bet_type,
                limit_amount,
                is_active: true,
                created_at: now,
                updated_at: now,
            },
        );
    }

    pub async fn set_number_limit(
        &self,
        draw_id: i64,
        bet_combination: &str,
        bet_type: BetType,
        limit_amount: Decimal,
    ) {
        let mut state = self.state.lock().await;
        let now = Utc::now();
        let id = state.next_id();
        state.number_limits.insert(
            BetTotalKey::new(draw_id, bet_combination, bet_type),
            per_draw::Model {
                id,
                draw_id,
                bet_combination: bet_combination.to_string(),
                bet_type,
                limit_amount,
                created_at: now,
                updated_at: now,
            },
        );
    }

    pub async fn set_prize_configuration(
        &self,
        bet_type: BetType,
        multiplier: Decimal,
        double_multiplier: Option<Decimal>,
    ) {
        let mut state = self.state.lock().await;
        let now = Utc::now();
        let id = state.next_id();
        state.prizes.insert(
            bet_type,
            prize_cfg::Model {
                id,
                bet_type,
                multiplier,
                double_multiplier,
                is_active: true,
                created_at: now,
                updated_at: now,
            },
        );
    }

    pub async fn balance(&self, user_id: i64) -> Option<balance::Model> {
        self.state.lock().await.balances.get(&user_id).cloned()
    }

    pub async fn bet_total(
        &self,
        draw_id: i64,
        bet_combination: &str,
        bet_type: BetType,
    ) -> Option<bet_total::Model> {
        let key = BetTotalKey::new(draw_id, bet_combination, bet_type);
        self.state.lock().await.totals.get(&key).cloned()
    }

    pub async fn draw(&self, draw_id: i64) -> Option<draw_entity::Model> {
        self.state.lock().await.draws.get(&draw_id).cloned()
    }

    pub async fn draws(&self) -> Vec<draw_entity::Model> {
        self.state.lock().await.draws.values().cloned().collect()
    }

    pub async fn draw_results(&self) -> Vec<draw_result::Model> {
        self.state.lock().await.draw_results.clone()
    }

    pub async fn tickets(&self) -> Vec<TicketWithBets> {
        let state = self.state.lock().await;
        state.tickets.values().map(|t| state.with_bets(t)).collect()
    }

    pub async fn transactions(&self) -> Vec<balance_tx::Model> {
        self.state.lock().await.transactions.clone()
    }

    pub async fn winning_tickets(&self) -> Vec<winning::Model> {
        self.state.lock().await.winning.clone()
    }
}

#[async_trait]
impl LotteryStore for MemoryStore {
    type Tx = MemoryTx;

    async fn begin(&self) -> AppResult<MemoryTx> {
        let guard = self.state.clone().lock_owned().await;
        let work = (*guard).clone();
        Ok(MemoryTx {
            guard,
            work,
            pending_conflicts: self.pending_conflicts.clone(),
        })
    }
}

pub struct MemoryTx {
    guard: OwnedMutexGuard<MemoryState>,
    work: MemoryState,
    pending_conflicts: Arc<AtomicUsize>,
}

#[async_trait]
impl StoreTx for MemoryTx {
    async fn commit(self) -> AppResult<()> {
        let MemoryTx {
            mut guard, work, ..
        } = self;
        *guard = work;
        Ok(())
    }

    async fn rollback(self) -> AppResult<()> {
        Ok(())
    }
}

#[async_trait]
impl LedgerStore for MemoryTx {
    async fn lock_balance(&mut self, user_id: i64) -> AppResult<Option<balance::Model>> {
        let injected = self
            .pending_conflicts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            return Err(AppError::Conflict("deadlock detected (injected)".into()));
        }
        Ok(self.work.balances.get(&user_id).cloned())
    }

    async fn adjust_balance(
        &mut self,
        user_id: i64,
        delta: Decimal,
        now: DateTime<Utc>,
    ) -> AppResult<balance::Model> {
        let row = self
            .work
            .balances
            .get_mut(&user_id)
            .ok_or_else(|| AppError::NotFound(format!("balance account for user {user_id}")))?;
        let next = row.current_balance + delta;
        // 与 CHECK (current_balance >= 0) 一致
        if next < Decimal::ZERO {
            return Err(AppError::ValidationError(format!(
                "balance for user {user_id} would become negative"
            )));
        }
        row.current_balance = next;
        row.total_used -= delta;
        row.updated_at = now;
        Ok(row.clone())
    }

    async fn append_transaction(
        &mut self,
        entry: NewBalanceTransaction,
    ) -> AppResult<balance_tx::Model> {
        let id = self.work.next_id();
        let row = balance_tx::Model {
            id,
            user_id: entry.user_id,
            amount: entry.amount,
            kind: entry.kind,
            description: entry.description,
            reference_id: entry.reference_id,
            status: entry.status,
            balance_after: entry.balance_after,
            created_at: entry.created_at,
        };
        self.work.transactions.push(row.clone());
        Ok(row)
    }

    async fn set_transaction_reference(
        &mut self,
        transaction_id: i64,
        reference_id: i64,
    ) -> AppResult<()> {
        let row = self
            .work
            .transactions
            .iter_mut()
            .find(|t| t.id == transaction_id)
            .ok_or_else(|| AppError::NotFound(format!("balance transaction {transaction_id}")))?;
        row.reference_id = Some(reference_id);
        Ok(())
    }

    async fn purchase_transaction_for(
        &mut self,
        ticket_id: i64,
    ) -> AppResult<Option<balance_tx::Model>> {
        Ok(self
            .work
            .transactions
            .iter()
            .find(|t| {
                t.reference_id == Some(ticket_id)
                    && t.kind == TransactionKind::Purchase
                    && t.status == TransactionStatus::Completed
            })
            .cloned())
    }
}

#[async_trait]
impl LimitStore for MemoryTx {
    async fn effective_cap(
        &mut self,
        draw_id: i64,
        bet_combination: &str,
        bet_type: BetType,
    ) -> AppResult<Option<Decimal>> {
        let key = BetTotalKey::new(draw_id, bet_combination, bet_type);
        if let Some(row) = self.work.number_limits.get(&key) {
            return Ok(Some(row.limit_amount));
        }
        Ok(self
            .work
            .bet_limits
            .get(&bet_type)
            .filter(|row| row.is_active)
            .map(|row| row.limit_amount))
    }

    async fn current_total(&mut self, key: &BetTotalKey) -> AppResult<Option<bet_total::Model>> {
        Ok(self.work.totals.get(key).cloned())
    }

    async fn lock_bet_total(
        &mut self,
        key: &BetTotalKey,
        now: DateTime<Utc>,
    ) -> AppResult<bet_total::Model> {
        if let Some(row) = self.work.totals.get(key) {
            return Ok(row.clone());
        }
        let id = self.work.next_id();
        let row = bet_total::Model {
            id,
            draw_id: key.draw_id,
            bet_combination: key.bet_combination.clone(),
            bet_type: key.bet_type,
            total_amount: Decimal::ZERO,
            ticket_count: 0,
            updated_at: now,
        };
        self.work.totals.insert(key.clone(), row.clone());
        Ok(row)
    }

    async fn apply_bet_total(
        &mut self,
        key: &BetTotalKey,
        amount_delta: Decimal,
        count_delta: i64,
        now: DateTime<Utc>,
    ) -> AppResult<bet_total::Model> {
        let row = self.work.totals.get_mut(key).ok_or_else(|| {
            AppError::NotFound(format!(
                "bet total for draw {} {} {}",
                key.draw_id, key.bet_combination, key.bet_type
            ))
        })?;
        row.total_amount += amount_delta;
        row.ticket_count += count_delta;
        row.updated_at = now;
        Ok(row.clone())
    }

    async fn draw_totals(&mut self, draw_id: i64) -> AppResult<Vec<bet_total::Model>> {
        Ok(self
            .work
            .totals
            .values()
            .filter(|t| t.draw_id == draw_id)
            .cloned()
            .collect())
    }

    async fn prize_configurations(&mut self) -> AppResult<Vec<prize_cfg::Model>> {
        Ok(self.work.prizes.values().cloned().collect())
    }
}

#[async_trait]
impl TicketStore for MemoryTx {
    async fn find_ticket_by_idempotency_key(
        &mut self,
        user_id: i64,
        idempotency_key: &str,
    ) -> AppResult<Option<ticket_entity::Model>> {
        Ok(self
            .work
            .tickets
            .values()
            .find(|t| t.user_id == user_id && t.idempotency_key.as_deref() == Some(idempotency_key))
            .cloned())
    }

    async fn placed_bets(&mut self, user_id: i64, draw_id: i64) -> AppResult<Vec<bet_entity::Model>> {
        let state = &self.work;
        Ok(state
            .tickets
            .values()
            .filter(|t| {
                t.user_id == user_id && t.draw_id == draw_id && t.status != TicketStatus::Cancelled
            })
            .flat_map(|t| state.with_bets(t).bets)
            .collect())
    }

    async fn insert_ticket(&mut self, ticket: NewTicket) -> AppResult<TicketWithBets> {
        let state = &mut self.work;
        if state
            .tickets
            .values()
            .any(|t| t.ticket_number == ticket.ticket_number)
        {
            return Err(AppError::Conflict(format!(
                "duplicate key value violates unique constraint: ticket_number {}",
                ticket.ticket_number
            )));
        }
        if let Some(key) = ticket.idempotency_key.as_deref()
            && state
                .tickets
                .values()
                .any(|t| t.user_id == ticket.user_id && t.idempotency_key.as_deref() == Some(key))
        {
            return Err(AppError::Conflict(format!(
                "duplicate key value violates unique constraint: idempotency_key {key}"
            )));
        }

        let id = state.next_id();
        let saved = ticket_entity::Model {
            id,
            ticket_number: ticket.ticket_number,
            user_id: ticket.user_id,
            draw_id: ticket.draw_id,
            total_amount: ticket.total_amount,
            status: TicketStatus::Pending,
            idempotency_key: ticket.idempotency_key,
            created_at: ticket.created_at,
            updated_at: ticket.created_at,
        };
        state.tickets.insert(id, saved.clone());

        let mut bets = Vec::with_capacity(ticket.bets.len());
        for bet in ticket.bets {
            let bet_id = state.next_id();
            let row = bet_entity::Model {
                id: bet_id,
                ticket_id: id,
                bet_type: bet.bet_type,
                bet_combination: bet.bet_combination,
                bet_amount: bet.bet_amount,
                sequence: bet.sequence,
            };
            state.bets.push(row.clone());
            bets.push(row);
        }
        Ok(TicketWithBets { ticket: saved, bets })
    }

    async fn find_ticket(&mut self, ticket_id: i64) -> AppResult<Option<ticket_entity::Model>> {
        Ok(self.work.tickets.get(&ticket_id).cloned())
    }

    async fn lock_ticket(&mut self, ticket_id: i64) -> AppResult<Option<TicketWithBets>> {
        Ok(self
            .work
            .tickets
            .get(&ticket_id)
            .map(|t| self.work.with_bets(t)))
    }

    async fn find_ticket_by_number(
        &mut self,
        ticket_number: &str,
    ) -> AppResult<Option<TicketWithBets>> {
        let state = &self.work;
        Ok(state
            .tickets
            .values()
            .find(|t| t.ticket_number == ticket_number)
            .map(|t| state.with_bets(t)))
    }

    async fn pending_tickets(&mut self, draw_id: i64) -> AppResult<Vec<TicketWithBets>> {
        let state = &self.work;
        Ok(state
            .tickets
            .values()
            .filter(|t| t.draw_id == draw_id && t.status == TicketStatus::Pending)
            .map(|t| state.with_bets(t))
            .collect())
    }

    async fn set_ticket_status(
        &mut self,
        ticket_id: i64,
        status: TicketStatus,
        now: DateTime<Utc>,
    ) -> AppResult<()> {
        let row = self
            .work
            .tickets
            .get_mut(&ticket_id)
            .ok_or_else(|| AppError::NotFound(format!("ticket {ticket_id}")))?;
        row.status = status;
        row.updated_at = now;
        Ok(())
    }

    async fn has_winning_record(&mut self, ticket_id: i64) -> AppResult<bool> {
        Ok(self.work.winning.iter().any(|w| w.ticket_id == ticket_id))
    }

    async fn insert_winning_ticket(
        &mut self,
        ticket_id: i64,
        draw_id: i64,
        prize_amount: Decimal,
        now: DateTime<Utc>,
    ) -> AppResult<winning::Model> {
        if self.work.winning.iter().any(|w| w.ticket_id == ticket_id) {
            return Err(AppError::Conflict(format!(
                "duplicate key value violates unique constraint: winning ticket {ticket_id}"
            )));
        }
        let id = self.work.next_id();
        let row = winning::Model {
            id,
            ticket_id,
            draw_id,
            prize_amount,
            created_at: now,
        };
        self.work.winning.push(row.clone());
        Ok(row)
    }
}

#[async_trait]
impl DrawStore for MemoryTx {
    async fn find_draw(&mut self, draw_id: i64) -> AppResult<Option<draw_entity::Model>> {
        Ok(self.work.draws.get(&draw_id).cloned())
    }

    async fn lock_draw(&mut self, draw_id: i64) -> AppResult<Option<draw_entity::Model>> {
        Ok(self.work.draws.get(&draw_id).cloned())
    }

    async fn lock_draw_shared(&mut self, draw_id: i64) -> AppResult<Option<draw_entity::Model>> {
        Ok(self.work.draws.get(&draw_id).cloned())
    }

    async fn record_result(
        &mut self,
        draw_id: i64,
        winning_number: &str,
        now: DateTime<Utc>,
    ) -> AppResult<()> {
        if self.work.draw_results.iter().any(|r| r.draw_id == draw_id) {
            return Err(AppError::Conflict(format!(
                "duplicate key value violates unique constraint: draw result {draw_id}"
            )));
        }
        let draw = self
            .work
            .draws
            .get_mut(&draw_id)
            .ok_or_else(|| AppError::NotFound(format!("draw {draw_id}")))?;
        draw.status = DrawStatus::Settled;
        draw.winning_number = Some(winning_number.to_string());
        draw.updated_at = now;

        let id = self.work.next_id();
        self.work.draw_results.push(draw_result::Model {
            id,
            draw_id,
            winning_number: winning_number.to_string(),
            is_official: true,
            created_at: now,
        });
        Ok(())
    }

    async fn insert_draw(&mut self, draw: NewDraw) -> AppResult<Option<draw_entity::Model>> {
        let exists = self
            .work
            .draws
            .values()
            .any(|d| d.draw_date == draw.draw_date && d.time_slot == draw.time_slot);
        if exists {
            return Ok(None);
        }
        let id = self.work.next_id();
        let row = draw_entity::Model {
            id,
            draw_date: draw.draw_date,
            time_slot: draw.time_slot,
            status: DrawStatus::Open,
            cutoff_at: draw.cutoff_at,
            winning_number: None,
            created_at: draw.created_at,
            updated_at: draw.created_at,
        };
        self.work.draws.insert(id, row.clone());
        Ok(Some(row))
    }

    async fn open_draws_due(&mut self, now: DateTime<Utc>) -> AppResult<Vec<draw_entity::Model>> {
        let mut due: Vec<_> = self
            .work
            .draws
            .values()
            .filter(|d| d.status == DrawStatus::Open && d.cutoff_at <= now)
            .cloned()
            .collect();
        due.sort_by_key(|d| d.cutoff_at);
        Ok(due)
    }

    async fn set_draw_status(
        &mut self,
        draw_id: i64,
        status: DrawStatus,
        now: DateTime<Utc>,
    ) -> AppResult<()> {
        let draw = self
            .work
            .draws
            .get_mut(&draw_id)
            .ok_or_else(|| AppError::NotFound(format!("draw {draw_id}")))?;
        draw.status = status;
        draw.updated_at = now;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NewBet;
    use chrono::TimeZone;

    #[tokio::test]
    async fn test_uncommitted_unit_is_discarded() {
        let store = MemoryStore::new();
        store.seed_balance(1, Decimal::from(100)).await;

        let mut tx = store.begin().await.unwrap();
        tx.adjust_balance(1, Decimal::from(-40), Utc::now()).await.unwrap();
        drop(tx);
        assert_eq!(store.balance(1).await.unwrap().current_balance, Decimal::from(100));

        let mut tx = store.begin().await.unwrap();
        tx.adjust_balance(1, Decimal::from(-40), Utc::now()).await.unwrap();
        tx.commit().await.unwrap();
        let row = store.balance(1).await.unwrap();
        assert_eq!(row.current_balance, Decimal::from(60));
        assert_eq!(row.total_used, Decimal::from(40));
    }

    #[tokio::test]
    async fn test_ticket_and_draw_lookups() {
        let store = MemoryStore::new();
        let draw = store
            .seed_draw(
                NaiveDate::from_ymd_opt(2025, 9, 25).unwrap(),
                TimeSlot::TwoPm,
                DrawStatus::Open,
                Utc.with_ymd_and_hms(2025, 9, 25, 5, 55, 0).unwrap(),
            )
            .await;

        let mut tx = store.begin().await.unwrap();
        let saved = tx
            .insert_ticket(NewTicket {
                ticket_number: "17587764000001234".into(),
                user_id: 1,
                draw_id: draw.id,
                total_amount: Decimal::from(10),
                idempotency_key: None,
                bets: vec![NewBet {
                    bet_type: BetType::Standard,
                    bet_combination: "123".into(),
                    bet_amount: Decimal::from(10),
                    sequence: "A".into(),
                }],
                created_at: Utc::now(),
            })
            .await
            .unwrap();
        tx.commit().await.unwrap();

        let mut tx = store.begin().await.unwrap();
        let found = tx
            .find_ticket_by_number("17587764000001234")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.ticket.id, saved.ticket.id);
        assert_eq!(found.bets.len(), 1);
        assert!(tx.find_ticket_by_number("1").await.unwrap().is_none());
        assert_eq!(
            tx.find_ticket(saved.ticket.id).await.unwrap().unwrap().draw_id,
            draw.id
        );
        assert_eq!(
            tx.lock_draw_shared(draw.id).await.unwrap().unwrap().status,
            DrawStatus::Open
        );
        assert!(tx.lock_draw_shared(draw.id + 1).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_effective_cap_prefers_number_override() {
        let store = MemoryStore::new();
        store.set_bet_limit(BetType::Standard, Decimal::from(10_000)).await;
        store.set_number_limit(7, "123", BetType::Standard, Decimal::from(500)).await;

        let mut tx = store.begin().await.unwrap();
        assert_eq!(
            tx.effective_cap(7, "123", BetType::Standard).await.unwrap(),
            Some(Decimal::from(500))
        );
        assert_eq!(
            tx.effective_cap(7, "124", BetType::Standard).await.unwrap(),
            Some(Decimal::from(10_000))
        );
        assert_eq!(tx.effective_cap(7, "123", BetType::Rambolito).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_insert_draw_is_idempotent() {
        let store = MemoryStore::new();
        let date = NaiveDate::from_ymd_opt(2025, 9, 25).unwrap();
        let cutoff = Utc.with_ymd_and_hms(2025, 9, 25, 5, 55, 0).unwrap();
        let new_draw = NewDraw {
            draw_date: date,
            time_slot: TimeSlot::TwoPm,
            cutoff_at: cutoff,
            created_at: Utc::now(),
        };

        let mut tx = store.begin().await.unwrap();
        assert!(tx.insert_draw(new_draw.clone()).await.unwrap().is_some());
        assert!(tx.insert_draw(new_draw).await.unwrap().is_none());
        tx.commit().await.unwrap();
        assert_eq!(store.draws().await.len(), 1);
    }

    #[tokio::test]
    async fn test_injected_conflicts_are_consumed() {
        let store = MemoryStore::new();
        store.seed_balance(1, Decimal::from(100)).await;
        store.inject_conflicts(1);

        let mut tx = store.begin().await.unwrap();
        assert!(matches!(tx.lock_balance(1).await, Err(AppError::Conflict(_))));
        assert!(tx.lock_balance(1).await.unwrap().is_some());
    }
}
