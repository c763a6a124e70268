use serde::{Deserialize, Serialize};
use std::env;

use crate::error::{AppError, AppResult};

/// numeric(14,2) 能容纳的最大整数部分
pub const MAX_STORED_UNITS: u64 = 999_999_999_999;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    #[serde(default)]
    pub business: BusinessConfig,
    #[serde(default)]
    pub purchase: PurchaseConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

/// 营业时区（开奖截止时间按本地时钟计算）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusinessConfig {
    /// UTC 偏移小时数，默认 +8 (Asia/Manila，无夏令时)
    pub utc_offset_hours: i32,
}

impl Default for BusinessConfig {
    fn default() -> Self {
        Self { utc_offset_hours: 8 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PurchaseConfig {
    /// 每张票最多注数
    pub max_bets_per_ticket: usize,
    /// 原子阶段遇到并发冲突时的最多尝试次数
    pub max_attempts: u32,
    /// 重试退避（毫秒，按尝试次数线性递增）
    pub retry_backoff_ms: u64,
    /// 单注最高金额（整数货币单位）
    #[serde(default = "default_max_bet_amount")]
    pub max_bet_amount: u64,
}

fn default_max_bet_amount() -> u64 {
    1_000_000
}

impl Default for PurchaseConfig {
    fn default() -> Self {
        Self {
            max_bets_per_ticket: 10,
            max_attempts: 3,
            retry_backoff_ms: 25,
            max_bet_amount: default_max_bet_amount(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// 预先创建未来多少天的场次
    pub days_ahead: u32,
    /// 状态检查间隔（秒）
    pub interval_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            days_ahead: 14,
            interval_secs: 60,
        }
    }
}

impl Config {
    pub fn from_toml() -> AppResult<Self> {
        let config_path = env::var("CONFIG_PATH").unwrap_or_else(|_| "config.toml".to_string());
        use std::io::ErrorKind;

        // 尝试读取配置文件，如果不存在则完全依赖环境变量
        let config_result = std::fs::read_to_string(&config_path);

        let mut config: Config = match config_result {
            Ok(config_str) => toml::from_str(&config_str)
                .map_err(|e| AppError::ConfigError(format!("Failed to parse {config_path}: {e}")))?,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                fn get_env_parse<T: std::str::FromStr>(name: &str, default: T) -> T {
                    env::var(name)
                        .ok()
                        .and_then(|v| v.parse::<T>().ok())
                        .unwrap_or(default)
                }

                // 数据库 URL 在无配置文件时必须提供
                let database_url = env::var("DATABASE_URL").map_err(|_| {
                    AppError::ConfigError(
                        "DATABASE_URL is not set and config.toml was not found".to_string(),
                    )
                })?;

                Config {
                    database: DatabaseConfig {
                        url: database_url,
                        max_connections: get_env_parse("DB_MAX_CONNECTIONS", 10u32),
                    },
                    business: BusinessConfig::default(),
                    purchase: PurchaseConfig::default(),
                    scheduler: SchedulerConfig::default(),
                }
            }
            Err(e) => {
                return Err(AppError::ConfigError(format!(
                    "Cannot read config file {config_path}: {e}"
                )));
            }
        };

        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// 环境变量覆盖（即便文件存在时也覆盖）
    fn apply_env_overrides(&mut self) {
        if let Ok(v) = env::var("DATABASE_URL") {
            self.database.url = v;
        }
        if let Ok(v) = env::var("DB_MAX_CONNECTIONS")
            && let Ok(mc) = v.parse()
        {
            self.database.max_connections = mc;
        }
        if let Ok(v) = env::var("BUSINESS_UTC_OFFSET_HOURS")
            && let Ok(h) = v.parse()
        {
            self.business.utc_offset_hours = h;
        }
        if let Ok(v) = env::var("PURCHASE_MAX_BETS")
            && let Ok(n) = v.parse()
        {
            self.purchase.max_bets_per_ticket = n;
        }
        if let Ok(v) = env::var("PURCHASE_MAX_ATTEMPTS")
            && let Ok(n) = v.parse()
        {
            self.purchase.max_attempts = n;
        }
        if let Ok(v) = env::var("PURCHASE_RETRY_BACKOFF_MS")
            && let Ok(n) = v.parse()
        {
            self.purchase.retry_backoff_ms = n;
        }
        if let Ok(v) = env::var("PURCHASE_MAX_BET_AMOUNT")
            && let Ok(n) = v.parse()
        {
            self.purchase.max_bet_amount = n;
        }
        if let Ok(v) = env::var("SCHEDULER_DAYS_AHEAD")
            && let Ok(n) = v.parse()
        {
            self.scheduler.days_ahead = n;
        }
        if let Ok(v) = env::var("SCHEDULER_INTERVAL_SECS")
            && let Ok(n) = v.parse()
        {
            self.scheduler.interval_secs = n;
        }
    }

    pub fn validate(&self) -> AppResult<()> {
        if !(-12..=14).contains(&self.business.utc_offset_hours) {
            return Err(AppError::ConfigError(format!(
                "utc_offset_hours out of range: {}",
                self.business.utc_offset_hours
            )));
        }
        if self.purchase.max_bets_per_ticket == 0 {
            return Err(AppError::ConfigError(
                "max_bets_per_ticket must be at least 1".into(),
            ));
        }
        if self.purchase.max_attempts == 0 {
            return Err(AppError::ConfigError(
                "max_attempts must be at least 1".into(),
            ));
        }
        // 金额列为 numeric(14,2)
        if !(1..=MAX_STORED_UNITS).contains(&self.purchase.max_bet_amount) {
            return Err(AppError::ConfigError(format!(
                "max_bet_amount must be between 1 and {MAX_STORED_UNITS}, got {}",
                self.purchase.max_bet_amount
            )));
        }
        if self.scheduler.interval_secs == 0 {
            return Err(AppError::ConfigError(
                "scheduler interval_secs must be at least 1".into(),
            ));
        }
        Ok(())
    }
}
