use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::sea_query::{Expr, OnConflict};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DatabaseTransaction, DbErr, EntityTrait,
    IntoActiveModel, PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Set, TransactionTrait,
};

use super::{DrawStore, LedgerStore, LimitStore, LotteryStore, StoreTx, TicketStore};
use crate::entities::{
    BetType, DrawStatus, TicketStatus, TransactionKind, TransactionStatus,
    account_balance_entity as balance, balance_transaction_entity as balance_tx,
    bet_entity, bet_limit_entity as bet_limit, bet_limit_per_draw_entity as per_draw,
    current_bet_total_entity as bet_total, draw_entity, draw_result_entity as draw_result,
    prize_configuration_entity as prize_cfg, ticket_entity, winning_ticket_entity as winning,
};
use crate::error::{AppError, AppResult};
use crate::models::{BetTotalKey, NewBalanceTransaction, NewDraw, NewTicket, TicketWithBets};

/// PostgreSQL 实现（sea-orm 连接池）
#[derive(Clone)]
pub struct SeaOrmStore {
    pool: DatabaseConnection,
}

impl SeaOrmStore {
    pub fn new(pool: DatabaseConnection) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl LotteryStore for SeaOrmStore {
    type Tx = SeaOrmTx;

    async fn begin(&self) -> AppResult<SeaOrmTx> {
        let txn = self.pool.begin().await?;
        Ok(SeaOrmTx { txn })
    }
}

/// 未提交即 drop 时由 sea-orm 回滚
pub struct SeaOrmTx {
    txn: DatabaseTransaction,
}

impl SeaOrmTx {
    async fn attach_bets(&self, tickets: Vec<ticket_entity::Model>) -> AppResult<Vec<TicketWithBets>> {
        if tickets.is_empty() {
            return Ok(Vec::new());
        }
        let ids: Vec<i64> = tickets.iter().map(|t| t.id).collect();
        let rows = bet_entity::Entity::find()
            .filter(bet_entity::Column::TicketId.is_in(ids))
            .order_by_asc(bet_entity::Column::Id)
            .all(&self.txn)
            .await?;

        let mut by_ticket: HashMap<i64, Vec<bet_entity::Model>> = HashMap::new();
        for bet in rows {
            by_ticket.entry(bet.ticket_id).or_default().push(bet);
        }
        Ok(tickets
            .into_iter()
            .map(|ticket| {
                let bets = by_ticket.remove(&ticket.id).unwrap_or_default();
                TicketWithBets { ticket, bets }
            })
            .collect())
    }

    fn bet_total_query(key: &BetTotalKey) -> sea_orm::Select<bet_total::Entity> {
        bet_total::Entity::find()
            .filter(bet_total::Column::DrawId.eq(key.draw_id))
            .filter(bet_total::Column::BetCombination.eq(key.bet_combination.as_str()))
            .filter(bet_total::Column::BetType.eq(key.bet_type))
    }
}

#[async_trait]
impl StoreTx for SeaOrmTx {
    async fn commit(self) -> AppResult<()> {
        self.txn.commit().await?;
        Ok(())
    }

    async fn rollback(self) -> AppResult<()> {
        self.txn.rollback().await?;
        Ok(())
    }
}

#[async_trait]
impl LedgerStore for SeaOrmTx {
    async fn lock_balance(&mut self, user_id: i64) -> AppResult<Option<balance::Model>> {
        Ok(balance::Entity::find()
            .filter(balance::Column::UserId.eq(user_id))
            .lock_exclusive()
            .one(&self.txn)
            .await?)
    }

    async fn adjust_balance(
        &mut self,
        user_id: i64,
        delta: Decimal,
        now: DateTime<Utc>,
    ) -> AppResult<balance::Model> {
        let row = balance::Entity::find()
            .filter(balance::Column::UserId.eq(user_id))
            .one(&self.txn)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("balance account for user {user_id}")))?;

        let mut am = row.clone().into_active_model();
        am.current_balance = Set(row.current_balance + delta);
        am.total_used = Set(row.total_used - delta);
        am.updated_at = Set(now);
        Ok(am.update(&self.txn).await?)
    }

    async fn append_transaction(
        &mut self,
        entry: NewBalanceTransaction,
    ) -> AppResult<balance_tx::Model> {
        let model = balance_tx::ActiveModel {
            user_id: Set(entry.user_id),
            amount: Set(entry.amount),
            kind: Set(entry.kind),
            description: Set(entry.description),
            reference_id: Set(entry.reference_id),
            status: Set(entry.status),
            balance_after: Set(entry.balance_after),
            created_at: Set(entry.created_at),
            ..Default::default()
        }
        .insert(&self.txn)
        .await?;
        Ok(model)
    }

    async fn set_transaction_reference(
        &mut self,
        transaction_id: i64,
        reference_id: i64,
    ) -> AppResult<()> {
        let res = balance_tx::Entity::update_many()
            .col_expr(balance_tx::Column::ReferenceId, Expr::value(reference_id))
            .filter(balance_tx::Column::Id.eq(transaction_id))
            .exec(&self.txn)
            .await?;
        if res.rows_affected != 1 {
            return Err(AppError::NotFound(format!(
                "balance transaction {transaction_id}"
            )));
        }
        Ok(())
    }

    async fn purchase_transaction_for(
        &mut self,
        ticket_id: i64,
    ) -> AppResult<Option<balance_tx::Model>> {
        Ok(balance_tx::Entity::find()
            .filter(balance_tx::Column::ReferenceId.eq(ticket_id))
            .filter(balance_tx::Column::Kind.eq(TransactionKind::Purchase))
            .filter(balance_tx::Column::Status.eq(TransactionStatus::Completed))
            .one(&self.txn)
            .await?)
    }
}

#[async_trait]
impl LimitStore for SeaOrmTx {
    async fn effective_cap(
        &mut self,
        draw_id: i64,
        bet_combination: &str,
        bet_type: BetType,
    ) -> AppResult<Option<Decimal>> {
        let override_row = per_draw::Entity::find()
            .filter(per_draw::Column::DrawId.eq(draw_id))
            .filter(per_draw::Column::BetCombination.eq(bet_combination))
            .filter(per_draw::Column::BetType.eq(bet_type))
            .one(&self.txn)
            .await?;
        if let Some(row) = override_row {
            return Ok(Some(row.limit_amount));
        }

        let global = bet_limit::Entity::find()
            .filter(bet_limit::Column::BetType.eq(bet_type))
            .filter(bet_limit::Column::IsActive.eq(true))
            .one(&self.txn)
            .await?;
        Ok(global.map(|row| row.limit_amount))
    }

    async fn current_total(&mut self, key: &BetTotalKey) -> AppResult<Option<bet_total::Model>> {
        Ok(Self::bet_total_query(key).one(&self.txn).await?)
    }

    async fn lock_bet_total(
        &mut self,
        key: &BetTotalKey,
        now: DateTime<Utc>,
    ) -> AppResult<bet_total::Model> {
        let seed = bet_total::ActiveModel {
            draw_id: Set(key.draw_id),
            bet_combination: Set(key.bet_combination.clone()),
            bet_type: Set(key.bet_type),
            total_amount: Set(Decimal::ZERO),
            ticket_count: Set(0),
            updated_at: Set(now),
            ..Default::default()
        };
        // INSERT ... ON CONFLICT DO NOTHING，已存在时 sea-orm 返回 RecordNotInserted
        let inserted = bet_total::Entity::insert(seed)
            .on_conflict(
                OnConflict::columns([
                    bet_total::Column::DrawId,
                    bet_total::Column::BetCombination,
                    bet_total::Column::BetType,
                ])
                .do_nothing()
                .to_owned(),
            )
            .exec(&self.txn)
            .await;
        match inserted {
            Ok(_) | Err(DbErr::RecordNotInserted) => {}
            Err(e) => return Err(e.into()),
        }

        Self::bet_total_query(key)
            .lock_exclusive()
            .one(&self.txn)
            .await?
            .ok_or_else(|| {
                AppError::InternalError(format!(
                    "bet total row missing after upsert: draw {} {} {}",
                    key.draw_id, key.bet_combination, key.bet_type
                ))
            })
    }

    async fn apply_bet_total(
        &mut self,
        key: &BetTotalKey,
        amount_delta: Decimal,
        count_delta: i64,
        now: DateTime<Utc>,
    ) -> AppResult<bet_total::Model> {
        let row = Self::bet_total_query(key).one(&self.txn).await?.ok_or_else(|| {
            AppError::NotFound(format!(
                "bet total for draw {} {} {}",
                key.draw_id, key.bet_combination, key.bet_type
            ))
        })?;

        let mut am = row.clone().into_active_model();
        am.total_amount = Set(row.total_amount + amount_delta);
        am.ticket_count = Set(row.ticket_count + count_delta);
        am.updated_at = Set(now);
        Ok(am.update(&self.txn).await?)
    }

    async fn draw_totals(&mut self, draw_id: i64) -> AppResult<Vec<bet_total::Model>> {
        Ok(bet_total::Entity::find()
            .filter(bet_total::Column::DrawId.eq(draw_id))
            .order_by_asc(bet_total::Column::BetCombination)
            .order_by_asc(bet_total::Column::BetType)
            .all(&self.txn)
            .await?)
    }

    async fn prize_configurations(&mut self) -> AppResult<Vec<prize_cfg::Model>> {
        Ok(prize_cfg::Entity::find()
            .order_by_asc(prize_cfg::Column::Id)
            .all(&self.txn)
            .await?)
    }
}

#[async_trait]
impl TicketStore for SeaOrmTx {
    async fn find_ticket_by_idempotency_key(
        &mut self,
        user_id: i64,
        idempotency_key: &str,
    ) -> AppResult<Option<ticket_entity::Model>> {
        Ok(ticket_entity::Entity::find()
            .filter(ticket_entity::Column::UserId.eq(user_id))
            .filter(ticket_entity::Column::IdempotencyKey.eq(idempotency_key))
            .one(&self.txn)
            .await?)
    }

    async fn placed_bets(&mut self, user_id: i64, draw_id: i64) -> AppResult<Vec<bet_entity::Model>> {
        let tickets = ticket_entity::Entity::find()
            .filter(ticket_entity::Column::UserId.eq(user_id))
            .filter(ticket_entity::Column::DrawId.eq(draw_id))
            .filter(ticket_entity::Column::Status.ne(TicketStatus::Cancelled))
            .all(&self.txn)
            .await?;
        Ok(self
            .attach_bets(tickets)
            .await?
            .into_iter()
            .flat_map(|t| t.bets)
            .collect())
    }

    async fn insert_ticket(&mut self, ticket: NewTicket) -> AppResult<TicketWithBets> {
        let saved = ticket_entity::ActiveModel {
            ticket_number: Set(ticket.ticket_number),
            user_id: Set(ticket.user_id),
            draw_id: Set(ticket.draw_id),
            total_amount: Set(ticket.total_amount),
            status: Set(TicketStatus::Pending),
            idempotency_key: Set(ticket.idempotency_key),
            created_at: Set(ticket.created_at),
            updated_at: Set(ticket.created_at),
            ..Default::default()
        }
        .insert(&self.txn)
        .await?;

        let mut bets = Vec::with_capacity(ticket.bets.len());
        for bet in ticket.bets {
            let row = bet_entity::ActiveModel {
                ticket_id: Set(saved.id),
                bet_type: Set(bet.bet_type),
                bet_combination: Set(bet.bet_combination),
                bet_amount: Set(bet.bet_amount),
                sequence: Set(bet.sequence),
                ..Default::default()
            }
            .insert(&self.txn)
            .await?;
            bets.push(row);
        }
        Ok(TicketWithBets { ticket: saved, bets })
    }

    async fn find_ticket(&mut self, ticket_id: i64) -> AppResult<Option<ticket_entity::Model>> {
        Ok(ticket_entity::Entity::find_by_id(ticket_id).one(&self.txn).await?)
    }

    async fn lock_ticket(&mut self, ticket_id: i64) -> AppResult<Option<TicketWithBets>> {
        let ticket = ticket_entity::Entity::find_by_id(ticket_id)
            .lock_exclusive()
            .one(&self.txn)
            .await?;
        match ticket {
            Some(t) => Ok(self.attach_bets(vec![t]).await?.pop()),
            None => Ok(None),
        }
    }

    async fn find_ticket_by_number(
        &mut self,
        ticket_number: &str,
    ) -> AppResult<Option<TicketWithBets>> {
        let ticket = ticket_entity::Entity::find()
            .filter(ticket_entity::Column::TicketNumber.eq(ticket_number))
            .one(&self.txn)
            .await?;
        match ticket {
            Some(t) => Ok(self.attach_bets(vec![t]).await?.pop()),
            None => Ok(None),
        }
    }

    async fn pending_tickets(&mut self, draw_id: i64) -> AppResult<Vec<TicketWithBets>> {
        let tickets = ticket_entity::Entity::find()
            .filter(ticket_entity::Column::DrawId.eq(draw_id))
            .filter(ticket_entity::Column::Status.eq(TicketStatus::Pending))
            .order_by_asc(ticket_entity::Column::Id)
            .lock_exclusive()
            .all(&self.txn)
            .await?;
        self.attach_bets(tickets).await
    }

    async fn set_ticket_status(
        &mut self,
        ticket_id: i64,
        status: TicketStatus,
        now: DateTime<Utc>,
    ) -> AppResult<()> {
        ticket_entity::Entity::update_many()
            .col_expr(ticket_entity::Column::Status, Expr::value(status))
            .col_expr(ticket_entity::Column::UpdatedAt, Expr::value(now))
            .filter(ticket_entity::Column::Id.eq(ticket_id))
            .exec(&self.txn)
            .await?;
        Ok(())
    }

    async fn has_winning_record(&mut self, ticket_id: i64) -> AppResult<bool> {
        let count = winning::Entity::find()
            .filter(winning::Column::TicketId.eq(ticket_id))
            .count(&self.txn)
            .await?;
        Ok(count > 0)
    }

    async fn insert_winning_ticket(
        &mut self,
        ticket_id: i64,
        draw_id: i64,
        prize_amount: Decimal,
        now: DateTime<Utc>,
    ) -> AppResult<winning::Model> {
        Ok(winning::ActiveModel {
            ticket_id: Set(ticket_id),
            draw_id: Set(draw_id),
            prize_amount: Set(prize_amount),
            created_at: Set(now),
            ..Default::default()
        }
        .insert(&self.txn)
        .await?)
    }
}

#[async_trait]
impl DrawStore for SeaOrmTx {
    async fn find_draw(&mut self, draw_id: i64) -> AppResult<Option<draw_entity::Model>> {
        Ok(draw_entity::Entity::find_by_id(draw_id).one(&self.txn).await?)
    }

    async fn lock_draw(&mut self, draw_id: i64) -> AppResult<Option<draw_entity::Model>> {
        Ok(draw_entity::Entity::find_by_id(draw_id)
            .lock_exclusive()
            .one(&self.txn)
            .await?)
    }

    async fn lock_draw_shared(&mut self, draw_id: i64) -> AppResult<Option<draw_entity::Model>> {
        Ok(draw_entity::Entity::find_by_id(draw_id)
            .lock_shared()
            .one(&self.txn)
            .await?)
    }

    async fn record_result(
        &mut self,
        draw_id: i64,
        winning_number: &str,
        now: DateTime<Utc>,
    ) -> AppResult<()> {
        let draw = draw_entity::Entity::find_by_id(draw_id)
            .one(&self.txn)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("draw {draw_id}")))?;

        let mut am = draw.into_active_model();
        am.status = Set(DrawStatus::Settled);
        am.winning_number = Set(Some(winning_number.to_string()));
        am.updated_at = Set(now);
        am.update(&self.txn).await?;

        draw_result::ActiveModel {
            draw_id: Set(draw_id),
            winning_number: Set(winning_number.to_string()),
            is_official: Set(true),
            created_at: Set(now),
            ..Default::default()
        }
        .insert(&self.txn)
        .await?;
        Ok(())
    }

    async fn insert_draw(&mut self, draw: NewDraw) -> AppResult<Option<draw_entity::Model>> {
        let row = draw_entity::ActiveModel {
            draw_date: Set(draw.draw_date),
            time_slot: Set(draw.time_slot),
            status: Set(DrawStatus::Open),
            cutoff_at: Set(draw.cutoff_at),
            winning_number: Set(None),
            created_at: Set(draw.created_at),
            updated_at: Set(draw.created_at),
            ..Default::default()
        };
        let inserted = draw_entity::Entity::insert(row)
            .on_conflict(
                OnConflict::columns([draw_entity::Column::DrawDate, draw_entity::Column::TimeSlot])
                    .do_nothing()
                    .to_owned(),
            )
            .exec(&self.txn)
            .await;
        match inserted {
            Ok(res) => Ok(draw_entity::Entity::find_by_id(res.last_insert_id)
                .one(&self.txn)
                .await?),
            Err(DbErr::RecordNotInserted) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn open_draws_due(&mut self, now: DateTime<Utc>) -> AppResult<Vec<draw_entity::Model>> {
        Ok(draw_entity::Entity::find()
            .filter(draw_entity::Column::Status.eq(DrawStatus::Open))
            .filter(draw_entity::Column::CutoffAt.lte(now))
            .order_by_asc(draw_entity::Column::CutoffAt)
            .all(&self.txn)
            .await?)
    }

    async fn set_draw_status(
        &mut self,
        draw_id: i64,
        status: DrawStatus,
        now: DateTime<Utc>,
    ) -> AppResult<()> {
        draw_entity::Entity::update_many()
            .col_expr(draw_entity::Column::Status, Expr::value(status))
            .col_expr(draw_entity::Column::UpdatedAt, Expr::value(now))
            .filter(draw_entity::Column::Id.eq(draw_id))
            .exec(&self.txn)
            .await?;
        Ok(())
    }
}
