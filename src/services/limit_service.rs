use rust_decimal::Decimal;

use crate::entities::BetType;
use crate::error::{AppError, AppResult};
use crate::models::{BetTotalKey, LimitStatus, SoldOutEntry};
use crate::store::{LimitStore, LotteryStore, StoreTx};
use crate::utils::normalize_combination;

/// 号码限额只读查询（不加锁，结果仅供展示）
#[derive(Clone)]
pub struct LimitService<S: LotteryStore> {
    store: S,
}

impl<S: LotteryStore> LimitService<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub async fn check_limit(
        &self,
        draw_id: i64,
        bet_combination: &str,
        bet_type: &str,
    ) -> AppResult<LimitStatus> {
        let combination = normalize_combination(bet_combination)
            .map_err(|e| AppError::ValidationError(e.to_string()))?;
        let bet_type: BetType = bet_type
            .parse()
            .map_err(|t| AppError::ValidationError(format!("Invalid bet type \"{t}\"")))?;

        let mut tx = self.store.begin().await?;
        let cap = tx.effective_cap(draw_id, &combination, bet_type).await?;
        let current = tx
            .current_total(&BetTotalKey::new(draw_id, &combination, bet_type))
            .await?
            .map(|row| row.total_amount)
            .unwrap_or(Decimal::ZERO);
        tx.rollback().await?;

        let cap = cap.ok_or_else(|| {
            AppError::NotFound(format!("No bet limit configured for {bet_type}"))
        })?;
        Ok(LimitStatus::new(combination, bet_type, current, cap))
    }

    /// 已达上限的号码
    pub async fn sold_out(&self, draw_id: i64) -> AppResult<Vec<SoldOutEntry>> {
        let mut tx = self.store.begin().await?;
        let totals = tx.draw_totals(draw_id).await?;

        let mut entries = Vec::new();
        for row in totals {
            let cap = tx
                .effective_cap(draw_id, &row.bet_combination, row.bet_type)
                .await?;
            if let Some(cap) = cap
                && row.total_amount >= cap
            {
                entries.push(SoldOutEntry {
                    bet_combination: row.bet_combination,
                    bet_type: row.bet_type,
                    total_amount: row.total_amount,
                    limit_amount: cap,
                    ticket_count: row.ticket_count,
                });
            }
        }
        tx.rollback().await?;
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use chrono::Utc;

    async fn store_with_totals() -> MemoryStore {
        let store = MemoryStore::new();
        store.set_bet_limit(BetType::Standard, Decimal::from(10_000)).await;
        store
            .set_number_limit(1, "777", BetType::Standard, Decimal::from(500))
            .await;

        let mut tx = store.begin().await.unwrap();
        let now = Utc::now();
        for (combo, amount) in [("123", 9_500), ("777", 500), ("456", 10_000)] {
            let key = BetTotalKey::new(1, combo, BetType::Standard);
            tx.lock_bet_total(&key, now).await.unwrap();
            tx.apply_bet_total(&key, Decimal::from(amount), 1, now)
                .await
                .unwrap();
        }
        tx.commit().await.unwrap();
        store
    }

    #[tokio::test]
    async fn test_check_limit_reports_remaining() {
        let service = LimitService::new(store_with_totals().await);

        let status = service.check_limit(1, "123", "standard").await.unwrap();
        assert_eq!(status.current_amount, Decimal::from(9_500));
        assert_eq!(status.limit_amount, Decimal::from(10_000));
        assert_eq!(status.remaining_amount, Decimal::from(500));
        assert!(!status.is_sold_out);

        // 单号覆盖
        let status = service.check_limit(1, "777", "standard").await.unwrap();
        assert_eq!(status.limit_amount, Decimal::from(500));
        assert!(status.is_sold_out);

        // 没有任何投注的号码
        let status = service.check_limit(1, "8", "standard").await.unwrap();
        assert_eq!(status.bet_combination, "008");
        assert_eq!(status.current_amount, Decimal::ZERO);
        assert_eq!(status.remaining_amount, Decimal::from(10_000));
    }

    #[tokio::test]
    async fn test_check_limit_errors() {
        let service = LimitService::new(store_with_totals().await);
        assert!(matches!(
            service.check_limit(1, "12x", "standard").await,
            Err(AppError::ValidationError(_))
        ));
        assert!(matches!(
            service.check_limit(1, "123", "pick3").await,
            Err(AppError::ValidationError(_))
        ));
        assert!(matches!(
            service.check_limit(1, "123", "rambolito").await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_sold_out_lists_capped_numbers() {
        let service = LimitService::new(store_with_totals().await);
        let mut sold: Vec<_> = service
            .sold_out(1)
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.bet_combination)
            .collect();
        sold.sort();
        assert_eq!(sold, vec!["456".to_string(), "777".to_string()]);
        assert!(service.sold_out(2).await.unwrap().is_empty());
    }
}
