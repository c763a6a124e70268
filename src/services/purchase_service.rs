use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use rust_decimal::Decimal;
use tokio::sync::broadcast;

use crate::config::{MAX_STORED_UNITS, PurchaseConfig};
use crate::entities::{
    BetType, DrawStatus, TransactionKind, TransactionStatus, bet_entity, draw_entity,
    ticket_entity,
};
use crate::error::{AppError, InvalidBet, PurchaseError};
use crate::models::{
    BetRequest, BetTotalKey, NewBalanceTransaction, NewBet, NewTicket, TicketEvent,
    TicketReceipt, TicketWithBets, ValidatedBet, bet_sequence,
};
use crate::store::{DrawStore, LedgerStore, LimitStore, LotteryStore, StoreTx, TicketStore};
use crate::utils::{BusinessCalendar, Clock, generate_ticket_number, qr_payload, validate_bet_shape};

/// 购票事件通道容量；慢订阅者会丢弃最旧的事件
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// 原子阶段的结果
enum Committed {
    Created {
        ticket: TicketWithBets,
        remaining_balance: Decimal,
    },
    /// 加锁后发现同一幂等键已成功下单
    Replayed(TicketReceipt),
}

/// 购票协调器
///
/// 一次购票 = 扣余额 + 校验并占用号码限额 + 重复投注检测 + 写票据，全部在同一个
/// 存储事务内完成：要么全部生效，要么全部不生效。
#[derive(Clone)]
pub struct PurchaseService<S: LotteryStore> {
    store: S,
    clock: Arc<dyn Clock>,
    calendar: BusinessCalendar,
    config: PurchaseConfig,
    events: broadcast::Sender<TicketEvent>,
}

impl<S: LotteryStore> PurchaseService<S> {
    pub fn new(
        store: S,
        clock: Arc<dyn Clock>,
        calendar: BusinessCalendar,
        config: PurchaseConfig,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            store,
            clock,
            calendar,
            config,
            events,
        }
    }

    /// 订阅提交后的购票事件（上级代理 / 协调员实时看板）
    pub fn subscribe(&self) -> broadcast::Receiver<TicketEvent> {
        self.events.subscribe()
    }

    pub async fn purchase(
        &self,
        user_id: i64,
        draw_id: i64,
        bets: Vec<BetRequest>,
        idempotency_key: Option<String>,
    ) -> Result<TicketReceipt, PurchaseError> {
        let key = idempotency_key
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty());

        let result = self.purchase_inner(user_id, draw_id, &bets, key.as_deref()).await;
        match &result {
            Ok(receipt) => log::info!(
                "Ticket {} purchased: user={user_id} draw={draw_id} bets={} remaining={}",
                receipt.ticket_number,
                bets.len(),
                receipt.remaining_balance
            ),
            Err(e @ PurchaseError::Store(_)) => {
                log::error!("Purchase failed: user={user_id} draw={draw_id}: {e}")
            }
            Err(e) => log::warn!(
                "Purchase rejected [{}]: user={user_id} draw={draw_id}: {e}",
                e.code()
            ),
        }
        result
    }

    async fn purchase_inner(
        &self,
        user_id: i64,
        draw_id: i64,
        bets: &[BetRequest],
        key: Option<&str>,
    ) -> Result<TicketReceipt, PurchaseError> {
        // 幂等重放：不加锁，直接返回已保存的回执
        if let Some(key) = key
            && let Some(receipt) = self.replay(user_id, key).await?
        {
            log::debug!("Idempotent replay for user {user_id} key {key}");
            return Ok(receipt);
        }

        let validated = self.validate_bets(bets)?;

        // 只读检查
        {
            let mut tx = self.store.begin().await?;
            self.check_draw(&mut tx, draw_id).await?;
            let placed = tx.placed_bets(user_id, draw_id).await?;
            tx.rollback().await?;
            ensure_no_duplicates(&placed, &validated)?;
        }

        let mut attempt: u32 = 0;
        let committed = loop {
            attempt += 1;
            match self.commit_ticket(user_id, draw_id, &validated, key).await {
                Ok(c) => break c,
                Err(PurchaseError::Store(e)) if e.is_transient() => {
                    if attempt >= self.config.max_attempts {
                        log::warn!(
                            "Purchase for user {user_id} gave up after {attempt} attempts: {e}"
                        );
                        return Err(PurchaseError::Busy { attempts: attempt });
                    }
                    log::warn!("Purchase attempt {attempt} for user {user_id} conflicted: {e}");
                    let backoff = self.config.retry_backoff_ms * u64::from(attempt);
                    tokio::time::sleep(Duration::from_millis(backoff)).await;
                }
                Err(e) => return Err(e),
            }
        };

        match committed {
            Committed::Replayed(receipt) => Ok(receipt),
            Committed::Created {
                ticket,
                remaining_balance,
            } => {
                self.publish(&ticket);
                Ok(TicketReceipt {
                    ticket_id: ticket.ticket.id,
                    ticket_number: ticket.ticket.ticket_number,
                    remaining_balance,
                })
            }
        }
    }

    fn validate_bets(&self, bets: &[BetRequest]) -> Result<Vec<ValidatedBet>, PurchaseError> {
        if bets.is_empty() {
            return Err(PurchaseError::EmptyBets);
        }
        if bets.len() > self.config.max_bets_per_ticket {
            return Err(PurchaseError::TooManyBets {
                max: self.config.max_bets_per_ticket,
            });
        }

        let max_amount = Decimal::from(self.config.max_bet_amount);
        let ceiling = Decimal::from(MAX_STORED_UNITS);
        let mut total = Decimal::ZERO;
        let mut seen: HashSet<(String, BetType)> = HashSet::with_capacity(bets.len());
        let mut validated = Vec::with_capacity(bets.len());
        for (index, bet) in bets.iter().enumerate() {
            let (bet_type, bet_combination) = validate_bet_shape(&bet.bet_type, &bet.bet_combination)
                .map_err(|reason| PurchaseError::InvalidBet { index, reason })?;
            let amount = bet.bet_amount;
            let reason = if amount <= Decimal::ZERO {
                Some(InvalidBet::NonPositiveAmount)
            } else if amount > max_amount {
                Some(InvalidBet::AmountTooLarge {
                    amount,
                    max: max_amount,
                })
            } else if amount.normalize().scale() > 2 {
                Some(InvalidBet::AmountPrecision(amount))
            } else {
                None
            };
            if let Some(reason) = reason {
                return Err(PurchaseError::InvalidBet { index, reason });
            }
            // 整张票总额同样受金额列精度约束
            total = match total.checked_add(amount).filter(|t| *t <= ceiling) {
                Some(t) => t,
                None => {
                    return Err(PurchaseError::InvalidBet {
                        index,
                        reason: InvalidBet::AmountTooLarge {
                            amount,
                            max: ceiling,
                        },
                    });
                }
            };
            if !seen.insert((bet_combination.clone(), bet_type)) {
                return Err(PurchaseError::DuplicateBet {
                    combination: bet_combination,
                    bet_type,
                });
            }
            validated.push(ValidatedBet {
                bet_type,
                bet_combination,
                bet_amount: bet.bet_amount,
            });
        }
        Ok(validated)
    }

    async fn check_draw(&self, tx: &mut S::Tx, draw_id: i64) -> Result<(), PurchaseError> {
        let draw = tx
            .find_draw(draw_id)
            .await?
            .ok_or(PurchaseError::DrawNotFound(draw_id))?;
        self.ensure_accepting(&draw)
    }

    fn ensure_accepting(&self, draw: &draw_entity::Model) -> Result<(), PurchaseError> {
        if draw.status != DrawStatus::Open {
            return Err(PurchaseError::DrawNotOpen(draw.id));
        }
        if !self
            .calendar
            .accepts_bets(draw.draw_date, draw.time_slot, self.clock.now())
        {
            return Err(PurchaseError::CutoffPassed(draw.id));
        }
        Ok(())
    }

    async fn replay(
        &self,
        user_id: i64,
        key: &str,
    ) -> Result<Option<TicketReceipt>, PurchaseError> {
        let mut tx = self.store.begin().await?;
        let receipt = match tx.find_ticket_by_idempotency_key(user_id, key).await? {
            Some(ticket) => Some(stored_receipt(&mut tx, ticket).await?),
            None => None,
        };
        tx.rollback().await?;
        Ok(receipt)
    }

    /// 原子阶段；锁顺序：场次（共享锁）-> 余额 -> 号码累计（按 (号码, 类型) 升序）
    ///
    /// 场次共享锁与结算的排他锁互斥：结算提交前购票会等待，提交后重新读到 settled。
    async fn commit_ticket(
        &self,
        user_id: i64,
        draw_id: i64,
        bets: &[ValidatedBet],
        key: Option<&str>,
    ) -> Result<Committed, PurchaseError> {
        let now = self.clock.now();
        let mut tx = self.store.begin().await?;

        let draw = tx
            .lock_draw_shared(draw_id)
            .await?
            .ok_or(PurchaseError::DrawNotFound(draw_id))?;
        let account = tx
            .lock_balance(user_id)
            .await?
            .ok_or(PurchaseError::AccountNotFound(user_id))?;

        // 持有余额锁后复查，防止同一用户的并发请求同时通过
        if let Some(key) = key
            && let Some(existing) = tx.find_ticket_by_idempotency_key(user_id, key).await?
        {
            let receipt = stored_receipt(&mut tx, existing).await?;
            tx.rollback().await?;
            return Ok(Committed::Replayed(receipt));
        }
        self.ensure_accepting(&draw)?;
        ensure_no_duplicates(&tx.placed_bets(user_id, draw_id).await?, bets)?;

        let total = ticket_total(bets)?;
        if account.current_balance < total {
            return Err(PurchaseError::InsufficientFunds {
                required: total,
                available: account.current_balance,
            });
        }

        let mut reservations: Vec<(BetTotalKey, Decimal)> = bets
            .iter()
            .map(|b| {
                (
                    BetTotalKey::new(draw_id, &b.bet_combination, b.bet_type),
                    b.bet_amount,
                )
            })
            .collect();
        reservations.sort_by(|a, b| a.0.cmp(&b.0));

        // 先全部校验，再统一写入：任何一注超限整张票拒绝
        for (key, amount) in &reservations {
            let current = tx.lock_bet_total(key, now).await?;
            let cap = tx
                .effective_cap(draw_id, &key.bet_combination, key.bet_type)
                .await?;
            let remaining = cap
                .map(|cap| (cap - current.total_amount).max(Decimal::ZERO))
                .unwrap_or(Decimal::ZERO);
            if cap.is_none() || *amount > remaining {
                return Err(PurchaseError::LimitExceeded {
                    combination: key.bet_combination.clone(),
                    bet_type: key.bet_type,
                    remaining,
                });
            }
        }
        for (key, amount) in &reservations {
            tx.apply_bet_total(key, *amount, 1, now).await?;
        }

        let account = tx.adjust_balance(user_id, -total, now).await?;
        let entry = tx
            .append_transaction(NewBalanceTransaction {
                user_id,
                amount: -total,
                kind: TransactionKind::Purchase,
                description: format!("Ticket purchase for draw {draw_id}"),
                reference_id: None,
                status: TransactionStatus::Completed,
                balance_after: account.current_balance,
                created_at: now,
            })
            .await?;

        let ticket = tx
            .insert_ticket(NewTicket {
                ticket_number: generate_ticket_number(now),
                user_id,
                draw_id,
                total_amount: total,
                idempotency_key: key.map(str::to_string),
                bets: bets
                    .iter()
                    .enumerate()
                    .map(|(i, b)| NewBet {
                        bet_type: b.bet_type,
                        bet_combination: b.bet_combination.clone(),
                        bet_amount: b.bet_amount,
                        sequence: bet_sequence(i),
                    })
                    .collect(),
                created_at: now,
            })
            .await?;
        tx.set_transaction_reference(entry.id, ticket.ticket.id).await?;

        tx.commit().await?;
        Ok(Committed::Created {
            ticket,
            remaining_balance: account.current_balance,
        })
    }

    /// 提交后的附带动作，失败只记录日志
    fn publish(&self, ticket: &TicketWithBets) {
        let t = &ticket.ticket;
        let event = TicketEvent {
            ticket_id: t.id,
            ticket_number: t.ticket_number.clone(),
            user_id: t.user_id,
            draw_id: t.draw_id,
            total_amount: t.total_amount,
            qr_payload: qr_payload(
                &t.ticket_number,
                t.total_amount,
                t.draw_id,
                t.user_id,
                t.created_at,
            ),
            created_at: t.created_at,
        };
        if let Err(e) = self.events.send(event) {
            log::debug!("Ticket event for {} not delivered: {e}", t.ticket_number);
        }
    }
}

fn ensure_no_duplicates(
    placed: &[bet_entity::Model],
    bets: &[ValidatedBet],
) -> Result<(), PurchaseError> {
    let taken: HashSet<(&str, BetType)> = placed
        .iter()
        .map(|b| (b.bet_combination.as_str(), b.bet_type))
        .collect();
    match bets
        .iter()
        .find(|b| taken.contains(&(b.bet_combination.as_str(), b.bet_type)))
    {
        Some(dup) => Err(PurchaseError::DuplicateBet {
            combination: dup.bet_combination.clone(),
            bet_type: dup.bet_type,
        }),
        None => Ok(()),
    }
}

fn ticket_total(bets: &[ValidatedBet]) -> Result<Decimal, PurchaseError> {
    bets.iter()
        .try_fold(Decimal::ZERO, |acc, b| acc.checked_add(b.bet_amount))
        .ok_or_else(|| AppError::InternalError("ticket total overflowed".into()).into())
}

async fn stored_receipt<T: StoreTx>(
    tx: &mut T,
    ticket: ticket_entity::Model,
) -> Result<TicketReceipt, PurchaseError> {
    let remaining_balance = tx
        .purchase_transaction_for(ticket.id)
        .await?
        .map(|entry| entry.balance_after)
        .ok_or_else(|| {
            AppError::InternalError(format!(
                "ticket {} has no purchase transaction",
                ticket.id
            ))
        })?;
    Ok(TicketReceipt {
        ticket_id: ticket.id,
        ticket_number: ticket.ticket_number,
        remaining_balance,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BusinessConfig;
    use crate::entities::TimeSlot;
    use crate::store::MemoryStore;
    use crate::utils::FixedClock;
    use chrono::{Duration as ChronoDuration, NaiveDate, TimeZone, Utc};

    const USER: i64 = 1;

    struct Fixture {
        store: MemoryStore,
        service: PurchaseService<MemoryStore>,
        clock: Arc<FixedClock>,
        draw_id: i64,
    }

    fn dec(n: i64) -> Decimal {
        Decimal::from(n)
    }

    fn bet(bet_type: &str, combination: &str, amount: i64) -> BetRequest {
        BetRequest::new(bet_type, combination, dec(amount))
    }

    async fn fixture(balance: i64) -> Fixture {
        let store = MemoryStore::new();
        store.seed_balance(USER, dec(balance)).await;
        store.set_bet_limit(BetType::Standard, dec(10_000)).await;
        store.set_bet_limit(BetType::Rambolito, dec(10_000)).await;

        let calendar = BusinessCalendar::from_config(&BusinessConfig::default()).unwrap();
        let date = NaiveDate::from_ymd_opt(2025, 9, 25).unwrap();
        let draw = store
            .seed_draw(
                date,
                TimeSlot::TwoPm,
                DrawStatus::Open,
                calendar.cutoff_for(date, TimeSlot::TwoPm),
            )
            .await;

        // 11:00 Manila，距 13:55 截止还早
        let clock = Arc::new(FixedClock::new(
            Utc.with_ymd_and_hms(2025, 9, 25, 3, 0, 0).unwrap(),
        ));
        let service = PurchaseService::new(
            store.clone(),
            clock.clone(),
            calendar,
            PurchaseConfig {
                retry_backoff_ms: 1,
                ..PurchaseConfig::default()
            },
        );
        Fixture {
            store,
            service,
            clock,
            draw_id: draw.id,
        }
    }

    #[tokio::test]
    async fn test_purchase_debits_balance_and_records_everything() {
        let f = fixture(1_000).await;
        let receipt = f
            .service
            .purchase(
                USER,
                f.draw_id,
                vec![bet("standard", "123", 100), bet("rambolito", "45", 50)],
                None,
            )
            .await
            .unwrap();

        assert_eq!(receipt.remaining_balance, dec(850));
        assert_eq!(receipt.ticket_number.len(), 17);

        let account = f.store.balance(USER).await.unwrap();
        assert_eq!(account.current_balance, dec(850));
        assert_eq!(account.total_used, dec(150));

        let txs = f.store.transactions().await;
        assert_eq!(txs.len(), 1);
        assert_eq!(txs[0].amount, dec(-150));
        assert_eq!(txs[0].kind, TransactionKind::Purchase);
        assert_eq!(txs[0].status, TransactionStatus::Completed);
        assert_eq!(txs[0].reference_id, Some(receipt.ticket_id));
        assert_eq!(txs[0].balance_after, dec(850));

        let tickets = f.store.tickets().await;
        assert_eq!(tickets.len(), 1);
        let ticket = &tickets[0];
        assert_eq!(ticket.ticket.total_amount, dec(150));
        let seqs: Vec<_> = ticket.bets.iter().map(|b| b.sequence.as_str()).collect();
        assert_eq!(seqs, vec!["A", "B"]);
        // 短号码补零
        assert_eq!(ticket.bets[1].bet_combination, "045");

        let total = f
            .store
            .bet_total(f.draw_id, "123", BetType::Standard)
            .await
            .unwrap();
        assert_eq!(total.total_amount, dec(100));
        assert_eq!(total.ticket_count, 1);
    }

    #[tokio::test]
    async fn test_insufficient_funds_has_no_side_effects() {
        let f = fixture(50).await;
        let err = f
            .service
            .purchase(USER, f.draw_id, vec![bet("standard", "123", 100)], None)
            .await
            .unwrap_err();
        match err {
            PurchaseError::InsufficientFunds {
                required,
                available,
            } => {
                assert_eq!(required, dec(100));
                assert_eq!(available, dec(50));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(f.store.balance(USER).await.unwrap().current_balance, dec(50));
        assert!(f.store.tickets().await.is_empty());
        assert!(f.store.transactions().await.is_empty());
        assert!(
            f.store
                .bet_total(f.draw_id, "123", BetType::Standard)
                .await
                .is_none()
        );
    }

    #[tokio::test]
    async fn test_cap_scenario_rejects_700_accepts_400() {
        let f = fixture(5_000).await;
        f.store.seed_balance(2, dec(20_000)).await;

        f.service
            .purchase(2, f.draw_id, vec![bet("standard", "123", 9_500)], None)
            .await
            .unwrap();

        let err = f
            .service
            .purchase(USER, f.draw_id, vec![bet("standard", "123", 700)], None)
            .await
            .unwrap_err();
        match err {
            PurchaseError::LimitExceeded {
                combination,
                bet_type,
                remaining,
            } => {
                assert_eq!(combination, "123");
                assert_eq!(bet_type, BetType::Standard);
                assert_eq!(remaining, dec(500));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        let total = f
            .store
            .bet_total(f.draw_id, "123", BetType::Standard)
            .await
            .unwrap();
        assert_eq!(total.total_amount, dec(9_500));
        assert_eq!(total.ticket_count, 1);
        assert_eq!(f.store.balance(USER).await.unwrap().current_balance, dec(5_000));

        f.service
            .purchase(USER, f.draw_id, vec![bet("standard", "123", 400)], None)
            .await
            .unwrap();
        let total = f
            .store
            .bet_total(f.draw_id, "123", BetType::Standard)
            .await
            .unwrap();
        assert_eq!(total.total_amount, dec(9_900));
        assert_eq!(total.ticket_count, 2);
    }

    #[tokio::test]
    async fn test_one_bet_over_limit_rejects_whole_ticket() {
        let f = fixture(5_000).await;
        f.store
            .set_number_limit(f.draw_id, "999", BetType::Standard, dec(100))
            .await;

        let err = f
            .service
            .purchase(
                USER,
                f.draw_id,
                vec![bet("standard", "111", 50), bet("standard", "999", 150)],
                None,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, PurchaseError::LimitExceeded { remaining, .. } if remaining == dec(100)));
        assert!(
            f.store
                .bet_total(f.draw_id, "111", BetType::Standard)
                .await
                .is_none()
        );
        assert_eq!(f.store.balance(USER).await.unwrap().current_balance, dec(5_000));
    }

    #[tokio::test]
    async fn test_unconfigured_cap_is_rejected() {
        let f = fixture(5_000).await;
        let other_draw = f
            .store
            .seed_draw(
                NaiveDate::from_ymd_opt(2025, 9, 25).unwrap(),
                TimeSlot::NinePm,
                DrawStatus::Open,
                Utc.with_ymd_and_hms(2025, 9, 25, 12, 55, 0).unwrap(),
            )
            .await;
        // 单号覆盖为 0：该号码停售
        f.store
            .set_number_limit(other_draw.id, "777", BetType::Standard, Decimal::ZERO)
            .await;
        let err = f
            .service
            .purchase(USER, other_draw.id, vec![bet("standard", "777", 10)], None)
            .await
            .unwrap_err();
        assert!(matches!(err, PurchaseError::LimitExceeded { remaining, .. } if remaining.is_zero()));

        let bare = MemoryStore::new();
        bare.seed_balance(USER, dec(100)).await;
        let draw = bare
            .seed_draw(
                NaiveDate::from_ymd_opt(2025, 9, 25).unwrap(),
                TimeSlot::TwoPm,
                DrawStatus::Open,
                Utc.with_ymd_and_hms(2025, 9, 25, 5, 55, 0).unwrap(),
            )
            .await;
        let service = PurchaseService::new(
            bare.clone(),
            f.clock.clone(),
            BusinessCalendar::from_config(&BusinessConfig::default()).unwrap(),
            PurchaseConfig::default(),
        );
        let err = service
            .purchase(USER, draw.id, vec![bet("rambolito", "123", 10)], None)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "LIMIT_EXCEEDED");
    }

    #[tokio::test]
    async fn test_idempotent_replay_returns_stored_receipt() {
        let f = fixture(1_000).await;
        let key = Some("req-42".to_string());
        let first = f
            .service
            .purchase(USER, f.draw_id, vec![bet("standard", "321", 100)], key.clone())
            .await
            .unwrap();
        // 再次购买其它号码，余额继续变化
        f.service
            .purchase(USER, f.draw_id, vec![bet("standard", "322", 100)], None)
            .await
            .unwrap();

        let replay = f
            .service
            .purchase(USER, f.draw_id, vec![bet("standard", "321", 100)], key)
            .await
            .unwrap();
        assert_eq!(replay, first);
        assert_eq!(f.store.tickets().await.len(), 2);
        assert_eq!(f.store.balance(USER).await.unwrap().current_balance, dec(800));
    }

    #[tokio::test]
    async fn test_duplicate_bets_are_rejected() {
        let f = fixture(1_000).await;
        f.service
            .purchase(USER, f.draw_id, vec![bet("standard", "23", 10)], None)
            .await
            .unwrap();

        let err = f
            .service
            .purchase(USER, f.draw_id, vec![bet("standard", "023", 10)], None)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            PurchaseError::DuplicateBet { ref combination, bet_type: BetType::Standard } if combination == "023"
        ));

        // 同号码不同玩法不算重复
        f.service
            .purchase(USER, f.draw_id, vec![bet("rambolito", "023", 10)], None)
            .await
            .unwrap();

        let err = f
            .service
            .purchase(
                USER,
                f.draw_id,
                vec![bet("standard", "555", 10), bet("standard", "555", 20)],
                None,
            )
            .await
            .unwrap_err();
        assert_eq!(err.code(), "DUPLICATE_BET");
    }

    #[tokio::test]
    async fn test_input_validation() {
        let f = fixture(1_000).await;
        let err = f.service.purchase(USER, f.draw_id, vec![], None).await.unwrap_err();
        assert!(matches!(err, PurchaseError::EmptyBets));

        let many: Vec<_> = (0..11).map(|i| bet("standard", &format!("{i:03}"), 1)).collect();
        let err = f.service.purchase(USER, f.draw_id, many, None).await.unwrap_err();
        assert!(matches!(err, PurchaseError::TooManyBets { max: 10 }));

        let err = f
            .service
            .purchase(
                USER,
                f.draw_id,
                vec![bet("standard", "123", 1), bet("rambolito", "888", 1)],
                None,
            )
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            PurchaseError::InvalidBet { index: 1, reason: InvalidBet::RambolitoTriple(_) }
        ));

        let err = f
            .service
            .purchase(USER, f.draw_id, vec![bet("standard", "123", 0)], None)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            PurchaseError::InvalidBet { index: 0, reason: InvalidBet::NonPositiveAmount }
        ));
        assert!(f.store.transactions().await.is_empty());
    }

    #[tokio::test]
    async fn test_oversized_amounts_are_rejected() {
        let f = fixture(1_000).await;
        let err = f
            .service
            .purchase(
                USER,
                f.draw_id,
                vec![
                    BetRequest::new("standard", "123", Decimal::MAX),
                    BetRequest::new("standard", "124", Decimal::MAX),
                ],
                None,
            )
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            PurchaseError::InvalidBet { index: 0, reason: InvalidBet::AmountTooLarge { max, .. } }
                if max == dec(1_000_000)
        ));

        let err = f
            .service
            .purchase(USER, f.draw_id, vec![bet("standard", "123", 1_000_001)], None)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "INVALID_BET");

        // 单注上限放到列宽时，整张票总额仍不能超过 numeric(14,2)
        let ceiling = Decimal::from(MAX_STORED_UNITS);
        let service = PurchaseService::new(
            f.store.clone(),
            f.clock.clone(),
            BusinessCalendar::from_config(&BusinessConfig::default()).unwrap(),
            PurchaseConfig {
                max_bet_amount: MAX_STORED_UNITS,
                ..PurchaseConfig::default()
            },
        );
        let err = service
            .purchase(
                USER,
                f.draw_id,
                vec![
                    BetRequest::new("standard", "123", ceiling),
                    BetRequest::new("standard", "124", ceiling),
                ],
                None,
            )
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            PurchaseError::InvalidBet { index: 1, reason: InvalidBet::AmountTooLarge { max, .. } }
                if max == ceiling
        ));

        assert!(f.store.tickets().await.is_empty());
        assert_eq!(f.store.balance(USER).await.unwrap().current_balance, dec(1_000));
    }

    #[tokio::test]
    async fn test_amounts_beyond_cents_are_rejected() {
        let f = fixture(100).await;
        let err = f
            .service
            .purchase(
                USER,
                f.draw_id,
                vec![BetRequest::new("standard", "123", Decimal::new(5, 3))],
                None,
            )
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            PurchaseError::InvalidBet { index: 0, reason: InvalidBet::AmountPrecision(_) }
        ));
        assert_eq!(f.store.balance(USER).await.unwrap().current_balance, dec(100));
        assert!(f.store.transactions().await.is_empty());

        // 尾随零不算额外精度：1.500 == 1.5
        let receipt = f
            .service
            .purchase(
                USER,
                f.draw_id,
                vec![
                    BetRequest::new("standard", "123", Decimal::new(50, 2)),
                    BetRequest::new("standard", "124", Decimal::new(1_500, 3)),
                ],
                None,
            )
            .await
            .unwrap();
        assert_eq!(receipt.remaining_balance, dec(98));
    }

    #[tokio::test]
    async fn test_settled_draw_rejects_purchase() {
        let f = fixture(1_000).await;
        // 截止时间未到，但已结算
        let settled = f
            .store
            .seed_draw(
                NaiveDate::from_ymd_opt(2025, 9, 25).unwrap(),
                TimeSlot::NinePm,
                DrawStatus::Settled,
                Utc.with_ymd_and_hms(2025, 9, 25, 12, 55, 0).unwrap(),
            )
            .await;
        let err = f
            .service
            .purchase(USER, settled.id, vec![bet("standard", "123", 10)], None)
            .await
            .unwrap_err();
        assert!(matches!(err, PurchaseError::DrawNotOpen(id) if id == settled.id));
        assert!(f.store.tickets().await.is_empty());
        assert_eq!(f.store.balance(USER).await.unwrap().current_balance, dec(1_000));
    }

    #[tokio::test]
    async fn test_draw_state_checks() {
        let f = fixture(1_000).await;
        let err = f
            .service
            .purchase(USER, 9_999, vec![bet("standard", "123", 1)], None)
            .await
            .unwrap_err();
        assert!(matches!(err, PurchaseError::DrawNotFound(9_999)));

        let closed = f
            .store
            .seed_draw(
                NaiveDate::from_ymd_opt(2025, 9, 25).unwrap(),
                TimeSlot::FivePm,
                DrawStatus::Closed,
                Utc.with_ymd_and_hms(2025, 9, 25, 8, 55, 0).unwrap(),
            )
            .await;
        let err = f
            .service
            .purchase(USER, closed.id, vec![bet("standard", "123", 1)], None)
            .await
            .unwrap_err();
        assert!(matches!(err, PurchaseError::DrawNotOpen(_)));

        // 13:55 Manila 整点即截止
        f.clock.set(Utc.with_ymd_and_hms(2025, 9, 25, 5, 55, 0).unwrap());
        let err = f
            .service
            .purchase(USER, f.draw_id, vec![bet("standard", "123", 1)], None)
            .await
            .unwrap_err();
        assert!(matches!(err, PurchaseError::CutoffPassed(_)));

        f.clock.advance(ChronoDuration::seconds(-1));
        assert!(
            f.service
                .purchase(USER, f.draw_id, vec![bet("standard", "123", 1)], None)
                .await
                .is_ok()
        );
    }

    #[tokio::test]
    async fn test_missing_account() {
        let f = fixture(1_000).await;
        let err = f
            .service
            .purchase(404, f.draw_id, vec![bet("standard", "123", 1)], None)
            .await
            .unwrap_err();
        assert!(matches!(err, PurchaseError::AccountNotFound(404)));
    }

    #[tokio::test]
    async fn test_transient_conflicts_are_retried() {
        let f = fixture(1_000).await;
        f.store.inject_conflicts(2);
        f.service
            .purchase(USER, f.draw_id, vec![bet("standard", "123", 100)], None)
            .await
            .unwrap();
        assert_eq!(f.store.balance(USER).await.unwrap().current_balance, dec(900));

        f.store.inject_conflicts(3);
        let err = f
            .service
            .purchase(USER, f.draw_id, vec![bet("standard", "124", 100)], None)
            .await
            .unwrap_err();
        assert!(matches!(err, PurchaseError::Busy { attempts: 3 }));
        assert_eq!(f.store.balance(USER).await.unwrap().current_balance, dec(900));
        assert_eq!(f.store.tickets().await.len(), 1);
    }

    // MemoryStore 以一把全局锁串行化整个事务，这里验证的是结果不变量
    // （只有一单成交、累计不超限），行级加锁顺序只能在 PostgreSQL 上体现。
    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_full_cap_purchases_have_one_winner() {
        let f = fixture(10_000).await;
        for user in 2..=8 {
            f.store.seed_balance(user, dec(10_000)).await;
        }

        let handles: Vec<_> = (1..=8)
            .map(|user| {
                let service = f.service.clone();
                let draw_id = f.draw_id;
                tokio::spawn(async move {
                    service
                        .purchase(user, draw_id, vec![bet("standard", "777", 10_000)], None)
                        .await
                })
            })
            .collect();

        let results: Vec<_> = futures_util::future::join_all(handles)
            .await
            .into_iter()
            .map(|r| r.unwrap())
            .collect();
        let ok = results.iter().filter(|r| r.is_ok()).count();
        let limited = results
            .iter()
            .filter(|r| matches!(r, Err(PurchaseError::LimitExceeded { .. })))
            .count();
        assert_eq!(ok, 1);
        assert_eq!(limited, 7);

        let total = f
            .store
            .bet_total(f.draw_id, "777", BetType::Standard)
            .await
            .unwrap();
        assert_eq!(total.total_amount, dec(10_000));
        assert_eq!(total.ticket_count, 1);
        assert_eq!(f.store.transactions().await.len(), 1);
    }

    #[tokio::test]
    async fn test_purchase_publishes_event() {
        let f = fixture(1_000).await;
        let mut rx = f.service.subscribe();
        let receipt = f
            .service
            .purchase(USER, f.draw_id, vec![bet("standard", "123", 100)], None)
            .await
            .unwrap();
        let event = rx.recv().await.unwrap();
        assert_eq!(event.ticket_id, receipt.ticket_id);
        assert!(event.qr_payload.starts_with(&format!("{}|", receipt.ticket_number)));
    }
}
