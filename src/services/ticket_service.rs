use std::sync::Arc;

use rust_decimal::Decimal;

use crate::entities::{DrawStatus, TicketStatus, TransactionKind, TransactionStatus};
use crate::error::{AppError, AppResult, RefundError, VerifyError};
use crate::models::{BetTotalKey, NewBalanceTransaction, RefundReceipt, TicketWithBets};
use crate::store::{DrawStore, LedgerStore, LimitStore, LotteryStore, StoreTx, TicketStore};
use crate::utils::{Clock, qr_payload};

#[derive(Clone)]
pub struct TicketService<S: LotteryStore> {
    store: S,
    clock: Arc<dyn Clock>,
}

impl<S: LotteryStore> TicketService<S> {
    pub fn new(store: S, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// 退票：仅限未开奖场次的 pending 票
    /// 退回余额、记一笔 refund 流水，并释放该票占用的号码额度
    pub async fn refund_ticket(
        &self,
        ticket_id: i64,
        reason: &str,
    ) -> Result<RefundReceipt, RefundError> {
        let now = self.clock.now();
        let mut tx = self.store.begin().await?;

        // 先共享锁场次再锁票，与结算的加锁顺序一致
        let draw_id = tx
            .find_ticket(ticket_id)
            .await?
            .ok_or(RefundError::TicketNotFound(ticket_id))?
            .draw_id;
        let draw = tx
            .lock_draw_shared(draw_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("draw {draw_id}")))?;

        let entry = tx
            .lock_ticket(ticket_id)
            .await?
            .ok_or(RefundError::TicketNotFound(ticket_id))?;
        let ticket = entry.ticket;
        if ticket.status != TicketStatus::Pending {
            return Err(RefundError::NotRefundable(ticket.status));
        }
        if draw.status == DrawStatus::Settled {
            return Err(RefundError::DrawSettled(draw.id));
        }

        tx.lock_balance(ticket.user_id)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(format!("balance account for user {}", ticket.user_id))
            })?;

        let mut releases: Vec<(BetTotalKey, Decimal)> = entry
            .bets
            .iter()
            .map(|b| {
                (
                    BetTotalKey::new(ticket.draw_id, &b.bet_combination, b.bet_type),
                    b.bet_amount,
                )
            })
            .collect();
        releases.sort_by(|a, b| a.0.cmp(&b.0));
        for (key, amount) in &releases {
            tx.lock_bet_total(key, now).await?;
            tx.apply_bet_total(key, -*amount, -1, now).await?;
        }

        let account = tx
            .adjust_balance(ticket.user_id, ticket.total_amount, now)
            .await?;
        tx.append_transaction(NewBalanceTransaction {
            user_id: ticket.user_id,
            amount: ticket.total_amount,
            kind: TransactionKind::Refund,
            description: format!("Refund for ticket {}: {reason}", ticket.ticket_number),
            reference_id: Some(ticket.id),
            status: TransactionStatus::Completed,
            balance_after: account.current_balance,
            created_at: now,
        })
        .await?;
        tx.set_ticket_status(ticket.id, TicketStatus::Cancelled, now)
            .await?;
        tx.commit().await?;

        log::info!(
            "Ticket {} refunded ({reason}): {} returned to user {}",
            ticket.ticket_number,
            ticket.total_amount,
            ticket.user_id
        );
        Ok(RefundReceipt {
            ticket_id: ticket.id,
            refunded_amount: ticket.total_amount,
            remaining_balance: account.current_balance,
            status: TicketStatus::Cancelled,
        })
    }

    /// 按票号查询
    pub async fn search_ticket(&self, ticket_number: &str) -> AppResult<Option<TicketWithBets>> {
        let mut tx = self.store.begin().await?;
        let found = tx.find_ticket_by_number(ticket_number.trim()).await?;
        tx.rollback().await?;
        Ok(found)
    }

    /// 校验票面二维码 `票号|校验串`：按票号取票，重算校验串后比对
    pub async fn verify_qr(&self, payload: &str) -> Result<TicketWithBets, VerifyError> {
        let (number, check) = payload
            .trim()
            .split_once('|')
            .filter(|(n, c)| !n.is_empty() && !c.is_empty())
            .ok_or(VerifyError::MalformedPayload)?;

        let entry = self
            .search_ticket(number)
            .await?
            .ok_or_else(|| VerifyError::TicketNotFound(number.to_string()))?;
        let t = &entry.ticket;
        let expected = qr_payload(
            &t.ticket_number,
            t.total_amount,
            t.draw_id,
            t.user_id,
            t.created_at,
        );
        if expected.split_once('|').map(|(_, c)| c) != Some(check) {
            log::warn!("QR check failed for ticket {number}");
            return Err(VerifyError::HashMismatch(number.to_string()));
        }
        Ok(entry)
    }
}
