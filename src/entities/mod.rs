pub mod account_balances;
pub mod balance_transactions;
pub mod bet_limits;
pub mod bet_limits_per_draw;
pub mod bets;
pub mod current_bet_totals;
pub mod draw_results;
pub mod draws;
pub mod prize_configurations;
pub mod tickets;
pub mod winning_tickets;

pub use account_balances as account_balance_entity;
pub use balance_transactions as balance_transaction_entity;
pub use bet_limits as bet_limit_entity;
pub use bet_limits_per_draw as bet_limit_per_draw_entity;
pub use bets as bet_entity;
pub use current_bet_totals as current_bet_total_entity;
pub use draw_results as draw_result_entity;
pub use draws as draw_entity;
pub use prize_configurations as prize_configuration_entity;
pub use tickets as ticket_entity;
pub use winning_tickets as winning_ticket_entity;

pub use balance_transactions::{TransactionKind, TransactionStatus};
pub use bets::BetType;
pub use draws::{DrawStatus, TimeSlot};
pub use tickets::TicketStatus;
