pub mod draw;
pub mod ledger;
pub mod limit;
pub mod purchase;
pub mod settlement;
pub mod ticket;

pub use draw::*;
pub use ledger::*;
pub use limit::*;
pub use purchase::*;
pub use settlement::*;
pub use ticket::*;
