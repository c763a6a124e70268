use chrono::{DateTime, Utc};
use rand::Rng;
use rust_decimal::Decimal;
use sha2::{Digest, Sha256};

/// 票号长度：13 位毫秒时间戳 + 4 位随机数
pub const TICKET_NUMBER_LEN: usize = 17;

/// 生成 17 位纯数字票号
/// 唯一性最终由 tickets.ticket_number 唯一索引保证，冲突时整笔交易重试
pub fn generate_ticket_number(now: DateTime<Utc>) -> String {
    let mut rng = rand::thread_rng();
    let millis = now.timestamp_millis().clamp(0, 9_999_999_999_999);
    format!("{:013}{:04}", millis, rng.gen_range(0..10_000))
}

/// 票面二维码内容：`票号|校验串`
/// 校验串取 sha256("{票号}:{总额}:{场次}:{用户}:{创建毫秒}") 的前 16 位十六进制
pub fn qr_payload(
    ticket_number: &str,
    total_amount: Decimal,
    draw_id: i64,
    user_id: i64,
    created_at: DateTime<Utc>,
) -> String {
    let mut hasher = Sha256::new();
    hasher.update(format!(
        "{}:{}:{}:{}:{}",
        ticket_number,
        total_amount.normalize(),
        draw_id,
        user_id,
        created_at.timestamp_millis()
    ));
    let digest = format!("{:x}", hasher.finalize());
    format!("{}|{}", ticket_number, &digest[..16])
}
