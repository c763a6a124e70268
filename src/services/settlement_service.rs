use std::sync::Arc;

use rust_decimal::Decimal;

use crate::entities::{DrawStatus, TicketStatus};
use crate::error::{AppError, SettlementError};
use crate::models::{SettlementResult, WinnerSummary, WinningBet};
use crate::store::{DrawStore, LimitStore, LotteryStore, StoreTx, TicketStore};
use crate::utils::{COMBINATION_LEN, Clock, PrizeTable, is_winner};

/// 开奖结算
///
/// 整个结算在一个事务内完成，并以场次行锁保证同一场次只有一个结算者；
/// 中途失败会整体回滚，可直接重跑。
#[derive(Clone)]
pub struct SettlementService<S: LotteryStore> {
    store: S,
    clock: Arc<dyn Clock>,
}

impl<S: LotteryStore> SettlementService<S> {
    pub fn new(store: S, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    pub async fn settle(
        &self,
        draw_id: i64,
        official_number: &str,
    ) -> Result<SettlementResult, SettlementError> {
        let number = official_number.trim();
        if number.len() != COMBINATION_LEN || !number.chars().all(|c| c.is_ascii_digit()) {
            return Err(SettlementError::InvalidNumber(official_number.to_string()));
        }

        let now = self.clock.now();
        let mut tx = self.store.begin().await?;

        let draw = tx
            .lock_draw(draw_id)
            .await?
            .ok_or(SettlementError::DrawNotFound(draw_id))?;
        if draw.status == DrawStatus::Settled {
            return Err(SettlementError::AlreadySettled(draw_id));
        }

        let prizes = PrizeTable::from_configurations(&tx.prize_configurations().await?);
        tx.record_result(draw_id, number, now).await?;

        let mut winners = Vec::new();
        let mut losers_count = 0usize;
        for entry in tx.pending_tickets(draw_id).await? {
            let ticket = entry.ticket;
            if tx.has_winning_record(ticket.id).await? {
                continue;
            }

            let mut winning_bets = Vec::new();
            let mut prize_amount = Decimal::ZERO;
            for b in entry
                .bets
                .iter()
                .filter(|b| is_winner(b.bet_type, &b.bet_combination, number))
            {
                let multiplier = prizes.multiplier(b.bet_type, &b.bet_combination);
                let prize = b
                    .bet_amount
                    .checked_mul(multiplier)
                    .ok_or_else(|| prize_overflow(ticket.id))?;
                prize_amount = prize_amount
                    .checked_add(prize)
                    .ok_or_else(|| prize_overflow(ticket.id))?;
                winning_bets.push(WinningBet {
                    bet_type: b.bet_type,
                    bet_combination: b.bet_combination.clone(),
                    bet_amount: b.bet_amount,
                    multiplier,
                    prize_amount: prize,
                });
            }

            if prize_amount > Decimal::ZERO {
                tx.insert_winning_ticket(ticket.id, draw_id, prize_amount, now)
                    .await?;
                tx.set_ticket_status(ticket.id, TicketStatus::Won, now).await?;
                winners.push(WinnerSummary {
                    ticket_id: ticket.id,
                    ticket_number: ticket.ticket_number,
                    user_id: ticket.user_id,
                    winning_bets,
                    prize_amount,
                });
            } else {
                tx.set_ticket_status(ticket.id, TicketStatus::Lost, now).await?;
                losers_count += 1;
            }
        }

        tx.commit().await?;

        let total_prize_amount = winners
            .iter()
            .try_fold(Decimal::ZERO, |acc, w| acc.checked_add(w.prize_amount))
            .ok_or_else(|| AppError::InternalError(format!("draw {draw_id} prize total overflowed")))?;
        log::info!(
            "Draw {draw_id} settled with {number}: {} winners, {losers_count} losers, total prize {total_prize_amount}",
            winners.len()
        );
        Ok(SettlementResult {
            draw_id,
            winning_number: number.to_string(),
            winners_count: winners.len(),
            losers_count,
            total_prize_amount,
            winners,
        })
    }
}

fn prize_overflow(ticket_id: i64) -> SettlementError {
    AppError::InternalError(format!("prize for ticket {ticket_id} overflowed")).into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::{BetType, TimeSlot};
    use crate::models::{NewBet, NewTicket, bet_sequence};
    use crate::store::MemoryStore;
    use crate::utils::SystemClock;
    use chrono::{NaiveDate, TimeZone, Utc};

    async fn seed_draw(store: &MemoryStore) -> i64 {
        store
            .seed_draw(
                NaiveDate::from_ymd_opt(2025, 9, 25).unwrap(),
                TimeSlot::TwoPm,
                DrawStatus::Closed,
                Utc.with_ymd_and_hms(2025, 9, 25, 5, 55, 0).unwrap(),
            )
            .await
            .id
    }

    async fn seed_ticket(
        store: &MemoryStore,
        user_id: i64,
        draw_id: i64,
        number: &str,
        bets: &[(BetType, &str, i64)],
    ) -> i64 {
        let mut tx = store.begin().await.unwrap();
        let ticket = tx
            .insert_ticket(NewTicket {
                ticket_number: number.to_string(),
                user_id,
                draw_id,
                total_amount: bets.iter().map(|b| Decimal::from(b.2)).sum(),
                idempotency_key: None,
                bets: bets
                    .iter()
                    .enumerate()
                    .map(|(i, (bet_type, combo, amount))| NewBet {
                        bet_type: *bet_type,
                        bet_combination: combo.to_string(),
                        bet_amount: Decimal::from(*amount),
                        sequence: bet_sequence(i),
                    })
                    .collect(),
                created_at: Utc::now(),
            })
            .await
            .unwrap();
        tx.commit().await.unwrap();
        ticket.ticket.id
    }

    fn service(store: &MemoryStore) -> SettlementService<MemoryStore> {
        SettlementService::new(store.clone(), Arc::new(SystemClock))
    }

    #[tokio::test]
    async fn test_settle_pays_standard_and_rambolito() {
        let store = MemoryStore::new();
        let draw_id = seed_draw(&store).await;
        let straight = seed_ticket(&store, 1, draw_id, "1", &[(BetType::Standard, "443", 10)]).await;
        let boxed = seed_ticket(
            &store,
            2,
            draw_id,
            "2",
            &[(BetType::Rambolito, "344", 10), (BetType::Standard, "344", 5)],
        )
        .await;
        let loser = seed_ticket(&store, 3, draw_id, "3", &[(BetType::Standard, "123", 50)]).await;

        let result = service(&store).settle(draw_id, "443").await.unwrap();
        assert_eq!(result.winners_count, 2);
        assert_eq!(result.losers_count, 1);
        // 10 * 450 + 10 * 150
        assert_eq!(result.total_prize_amount, Decimal::from(6_000));

        let boxed_summary = result.winners.iter().find(|w| w.ticket_id == boxed).unwrap();
        assert_eq!(boxed_summary.winning_bets.len(), 1);
        assert_eq!(boxed_summary.prize_amount, Decimal::from(1_500));

        let tickets = store.tickets().await;
        let status = |id: i64| tickets.iter().find(|t| t.ticket.id == id).unwrap().ticket.status;
        assert_eq!(status(straight), TicketStatus::Won);
        assert_eq!(status(boxed), TicketStatus::Won);
        assert_eq!(status(loser), TicketStatus::Lost);

        assert_eq!(store.winning_tickets().await.len(), 2);
        let draw = store.draw(draw_id).await.unwrap();
        assert_eq!(draw.status, DrawStatus::Settled);
        assert_eq!(draw.winning_number.as_deref(), Some("443"));
        let results = store.draw_results().await;
        assert_eq!(results.len(), 1);
        assert!(results[0].is_official);
    }

    #[tokio::test]
    async fn test_three_distinct_rambolito_and_configured_prizes() {
        let store = MemoryStore::new();
        store
            .set_prize_configuration(BetType::Standard, Decimal::from(500), None)
            .await;
        let draw_id = seed_draw(&store).await;
        seed_ticket(
            &store,
            1,
            draw_id,
            "1",
            &[(BetType::Rambolito, "123", 4), (BetType::Standard, "321", 2)],
        )
        .await;

        let result = service(&store).settle(draw_id, "321").await.unwrap();
        // 4 * 75 + 2 * 500
        assert_eq!(result.total_prize_amount, Decimal::from(1_300));
    }

    #[tokio::test]
    async fn test_settle_twice_is_rejected() {
        let store = MemoryStore::new();
        let draw_id = seed_draw(&store).await;
        seed_ticket(&store, 1, draw_id, "1", &[(BetType::Standard, "001", 10)]).await;

        let svc = service(&store);
        svc.settle(draw_id, "001").await.unwrap();
        assert!(matches!(
            svc.settle(draw_id, "001").await,
            Err(SettlementError::AlreadySettled(id)) if id == draw_id
        ));
        assert_eq!(store.winning_tickets().await.len(), 1);
        assert_eq!(store.draw_results().await.len(), 1);
    }

    #[tokio::test]
    async fn test_settle_input_errors() {
        let store = MemoryStore::new();
        let svc = service(&store);
        for bad in ["12", "1234", "12a", ""] {
            assert!(matches!(
                svc.settle(1, bad).await,
                Err(SettlementError::InvalidNumber(_))
            ));
        }
        assert!(matches!(
            svc.settle(42, "123").await,
            Err(SettlementError::DrawNotFound(42))
        ));
    }

    #[tokio::test]
    async fn test_prize_overflow_rolls_back() {
        let store = MemoryStore::new();
        let draw_id = seed_draw(&store).await;
        let mut tx = store.begin().await.unwrap();
        tx.insert_ticket(NewTicket {
            ticket_number: "1".into(),
            user_id: 1,
            draw_id,
            total_amount: Decimal::MAX,
            idempotency_key: None,
            bets: vec![NewBet {
                bet_type: BetType::Standard,
                bet_combination: "443".into(),
                bet_amount: Decimal::MAX,
                sequence: bet_sequence(0),
            }],
            created_at: Utc::now(),
        })
        .await
        .unwrap();
        tx.commit().await.unwrap();

        let err = service(&store).settle(draw_id, "443").await.unwrap_err();
        assert!(matches!(err, SettlementError::Store(AppError::InternalError(_))));
        assert_eq!(store.draw(draw_id).await.unwrap().status, DrawStatus::Closed);
        assert!(store.winning_tickets().await.is_empty());
        assert_eq!(store.tickets().await[0].ticket.status, TicketStatus::Pending);
    }

    #[tokio::test]
    async fn test_cancelled_tickets_are_left_alone() {
        let store = MemoryStore::new();
        let draw_id = seed_draw(&store).await;
        let id = seed_ticket(&store, 1, draw_id, "1", &[(BetType::Standard, "555", 10)]).await;
        {
            let mut tx = store.begin().await.unwrap();
            tx.set_ticket_status(id, TicketStatus::Cancelled, Utc::now())
                .await
                .unwrap();
            tx.commit().await.unwrap();
        }

        let result = service(&store).settle(draw_id, "555").await.unwrap();
        assert_eq!(result.winners_count, 0);
        assert_eq!(result.losers_count, 0);
        assert_eq!(store.tickets().await[0].ticket.status, TicketStatus::Cancelled);
    }
}
