pub mod config;
pub mod database;
pub mod entities;
pub mod error;
pub mod models;
pub mod services;
pub mod store;
pub mod tasks;
pub mod utils;

pub use config::Config;
pub use error::{AppError, AppResult, PurchaseError, RefundError, SettlementError, VerifyError};
