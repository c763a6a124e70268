use chrono::{DateTime, NaiveDate, Utc};

use crate::entities::TimeSlot;

#[derive(Debug, Clone)]
pub struct NewDraw {
    pub draw_date: NaiveDate,
    pub time_slot: TimeSlot,
    pub cutoff_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}
