//! Business clock and draw calendar.
//!
//! Cutoffs are a business-calendar concept: a fixed local clock time per time slot on the
//! draw's date, evaluated in the configured business zone (Asia/Manila, UTC+8, by default).

use std::sync::atomic::{AtomicI64, Ordering};

use chrono::{DateTime, Duration, FixedOffset, NaiveDate, NaiveTime, TimeZone, Utc};

use crate::config::BusinessConfig;
use crate::entities::TimeSlot;
use crate::error::{AppError, AppResult};

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// 手动推进的时钟（测试 / 回放用）
#[derive(Debug)]
pub struct FixedClock {
    millis: AtomicI64,
}

impl FixedClock {
    pub fn new(at: DateTime<Utc>) -> Self {
        Self {
            millis: AtomicI64::new(at.timestamp_millis()),
        }
    }

    pub fn set(&self, at: DateTime<Utc>) {
        self.millis.store(at.timestamp_millis(), Ordering::SeqCst);
    }

    pub fn advance(&self, by: Duration) {
        self.millis.fetch_add(by.num_milliseconds(), Ordering::SeqCst);
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        let millis = self.millis.load(Ordering::SeqCst);
        Utc.timestamp_millis_opt(millis)
            .single()
            .unwrap_or_else(Utc::now)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct BusinessCalendar {
    offset: FixedOffset,
}

impl BusinessCalendar {
    pub fn new(offset: FixedOffset) -> Self {
        Self { offset }
    }

    pub fn from_config(config: &BusinessConfig) -> AppResult<Self> {
        FixedOffset::east_opt(config.utc_offset_hours * 3600)
            .map(Self::new)
            .ok_or_else(|| {
                AppError::ConfigError(format!(
                    "Invalid business UTC offset: {}",
                    config.utc_offset_hours
                ))
            })
    }

    pub fn offset(&self) -> FixedOffset {
        self.offset
    }

    /// 营业时区下的当前日期
    pub fn local_date(&self, now: DateTime<Utc>) -> NaiveDate {
        now.with_timezone(&self.offset).date_naive()
    }

    /// 本地 (日期, 时, 分) 对应的 UTC 时刻
    fn local_instant(&self, date: NaiveDate, (hour, minute): (u32, u32)) -> DateTime<Utc> {
        let local = date.and_time(NaiveTime::MIN)
            + Duration::minutes(i64::from(hour) * 60 + i64::from(minute));
        let utc = local - Duration::seconds(i64::from(self.offset.local_minus_utc()));
        Utc.from_utc_datetime(&utc)
    }

    pub fn cutoff_for(&self, date: NaiveDate, slot: TimeSlot) -> DateTime<Utc> {
        self.local_instant(date, slot.cutoff_time())
    }

    pub fn draw_time_for(&self, date: NaiveDate, slot: TimeSlot) -> DateTime<Utc> {
        self.local_instant(date, slot.draw_time())
    }

    /// 仍可投注：当前时刻严格早于截止时间
    pub fn accepts_bets(&self, date: NaiveDate, slot: TimeSlot, now: DateTime<Utc>) -> bool {
        now < self.cutoff_for(date, slot)
    }
}
