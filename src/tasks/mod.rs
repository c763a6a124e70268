//! Background scheduled tasks.
//!
//! Draw maintenance runs on a fixed interval: make sure upcoming draws exist and close the
//! ones whose betting cutoff has passed. Call `spawn_all` once during startup.

use std::time::Duration;

use crate::config::SchedulerConfig;
use crate::services::DrawService;
use crate::store::LotteryStore;

/// Spawn all background tasks.
///
/// Each pass is idempotent; the loop detaches via `tokio::spawn` and does not block.
pub fn spawn_all<S: LotteryStore>(draw_service: DrawService<S>, scheduler: SchedulerConfig) {
    let svc = draw_service.clone();
    tokio::spawn(async move {
        loop {
            match svc.ensure_draws(scheduler.days_ahead).await {
                Ok(n) if n > 0 => log::info!("Draws created: {n}"),
                Ok(_) => {}
                Err(e) => log::error!("Failed to create upcoming draws: {e:?}"),
            }
            match svc.close_expired_draws().await {
                Ok(n) if n > 0 => log::info!("Draws closed at cutoff: {n}"),
                Ok(_) => {}
                Err(e) => log::error!("Failed to close expired draws: {e:?}"),
            }
            tokio::time::sleep(Duration::from_secs(scheduler.interval_secs)).await;
        }
    });
}
