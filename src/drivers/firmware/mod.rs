//! VideoCore firmware services
//!
//! Typed requests layered on the property mailbox:
//! - `board`: board revision and model gating
//! - `clock`: ARM clock rate queries and the rate-set primitive
//!
//! Every call here performs a blocking mailbox round trip.

pub mod board;
pub mod clock;

pub use board::BoardModel;
pub use clock::{ClockId, ClockRange, RateQuery};
