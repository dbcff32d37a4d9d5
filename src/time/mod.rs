//! Fire-time computation: user input to instants, yearly recurrence, and
//! the clock the service reads "now" from.

pub mod builder;
pub mod clock;
pub mod recurrence;
