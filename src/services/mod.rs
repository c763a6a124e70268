pub mod draw_service;
pub mod limit_service;
pub mod purchase_service;
pub mod settlement_service;
pub mod ticket_service;

pub use draw_service::*;
pub use limit_service::*;
pub use purchase_service::*;
pub use settlement_service::*;
pub use ticket_service::*;
