use std::sync::Arc;

use chrono::Days;

use crate::entities::{DrawStatus, TimeSlot};
use crate::error::{AppError, AppResult};
use crate::models::NewDraw;
use crate::store::{DrawStore, LotteryStore, StoreTx};
use crate::utils::{BusinessCalendar, Clock};

/// 场次维护：预建未来场次、到点截止
#[derive(Clone)]
pub struct DrawService<S: LotteryStore> {
    store: S,
    clock: Arc<dyn Clock>,
    calendar: BusinessCalendar,
}

impl<S: LotteryStore> DrawService<S> {
    pub fn new(store: S, clock: Arc<dyn Clock>, calendar: BusinessCalendar) -> Self {
        Self {
            store,
            clock,
            calendar,
        }
    }

    /// 创建今天起 `days` 天内每天三个时段的场次，已存在的跳过；返回新建数量
    pub async fn ensure_draws(&self, days: u32) -> AppResult<usize> {
        let now = self.clock.now();
        let today = self.calendar.local_date(now);
        let mut tx = self.store.begin().await?;

        let mut created = 0;
        for offset in 0..days {
            let date = today
                .checked_add_days(Days::new(u64::from(offset)))
                .ok_or_else(|| AppError::InternalError(format!("date overflow: {today} + {offset}")))?;
            for slot in TimeSlot::ALL {
                let inserted = tx
                    .insert_draw(NewDraw {
                        draw_date: date,
                        time_slot: slot,
                        cutoff_at: self.calendar.cutoff_for(date, slot),
                        created_at: now,
                    })
                    .await?;
                if inserted.is_some() {
                    created += 1;
                }
            }
        }
        tx.commit().await?;
        Ok(created)
    }

    /// 截止时间已到的 open 场次置为 closed
    pub async fn close_expired_draws(&self) -> AppResult<usize> {
        let now = self.clock.now();
        let mut tx = self.store.begin().await?;
        let due = tx.open_draws_due(now).await?;
        for draw in &due {
            tx.set_draw_status(draw.id, DrawStatus::Closed, now).await?;
            log::info!(
                "Draw {} ({} {}) closed for betting",
                draw.id,
                draw.draw_date,
                draw.time_slot.label()
            );
        }
        tx.commit().await?;
        Ok(due.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BusinessConfig;
    use crate::store::MemoryStore;
    use crate::utils::FixedClock;
    use chrono::{Duration, NaiveDate, TimeZone, Utc};

    fn service(store: &MemoryStore, clock: Arc<FixedClock>) -> DrawService<MemoryStore> {
        DrawService::new(
            store.clone(),
            clock,
            BusinessCalendar::from_config(&BusinessConfig::default()).unwrap(),
        )
    }

    #[tokio::test]
    async fn test_ensure_draws_is_idempotent() {
        let store = MemoryStore::new();
        // 2025-09-25 17:00 UTC = 9 月 26 日 01:00 Manila
        let clock = Arc::new(FixedClock::new(
            Utc.with_ymd_and_hms(2025, 9, 25, 17, 0, 0).unwrap(),
        ));
        let svc = service(&store, clock);

        assert_eq!(svc.ensure_draws(2).await.unwrap(), 6);
        assert_eq!(svc.ensure_draws(3).await.unwrap(), 3);

        let draws = store.draws().await;
        assert_eq!(draws.len(), 9);
        let first = NaiveDate::from_ymd_opt(2025, 9, 26).unwrap();
        assert!(draws.iter().all(|d| d.draw_date >= first));
        assert!(draws.iter().all(|d| d.status == DrawStatus::Open));

        let two_pm = draws
            .iter()
            .find(|d| d.draw_date == first && d.time_slot == TimeSlot::TwoPm)
            .unwrap();
        assert_eq!(
            two_pm.cutoff_at,
            Utc.with_ymd_and_hms(2025, 9, 26, 5, 55, 0).unwrap()
        );
    }

    #[tokio::test]
    async fn test_close_expired_draws() {
        let store = MemoryStore::new();
        let clock = Arc::new(FixedClock::new(
            Utc.with_ymd_and_hms(2025, 9, 25, 0, 0, 0).unwrap(),
        ));
        let svc = service(&store, clock.clone());
        svc.ensure_draws(1).await.unwrap();
        assert_eq!(svc.close_expired_draws().await.unwrap(), 0);

        // 过了 16:55 Manila：2PM、5PM 两场截止
        clock.set(Utc.with_ymd_and_hms(2025, 9, 25, 8, 55, 0).unwrap());
        assert_eq!(svc.close_expired_draws().await.unwrap(), 2);
        clock.advance(Duration::minutes(1));
        assert_eq!(svc.close_expired_draws().await.unwrap(), 0);

        let open: Vec<_> = store
            .draws()
            .await
            .into_iter()
            .filter(|d| d.status == DrawStatus::Open)
            .collect();
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].time_slot, TimeSlot::NinePm);
    }
}
