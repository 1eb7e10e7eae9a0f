//! Large message fragmentation and re-assembly.
//!
//! Messages whose body exceeds the frame limit travel as an ordered run of
//! parts. [`CompositeSender`] cuts one message into parts and
//! [`CompositeReceiver`] stitches an inbound run back together. Parts carry no
//! index: the last part is the only one with `is_part() == false`, so both
//! sides rely on arrival order alone.

pub mod error;
pub mod receiver;
pub mod sender;

pub use error::{CompositeError, CompositeStatus};
pub use receiver::CompositeReceiver;
pub use sender::CompositeSender;

#[cfg(test)]
mod tests;
