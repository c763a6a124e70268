pub mod betting_rules;
pub mod clock;
pub mod ticket_number;

pub use betting_rules::*;
pub use clock::{BusinessCalendar, Clock, FixedClock, SystemClock};
pub use ticket_number::{generate_ticket_number, qr_payload};
