//! Infrastructure: concrete queue backends.

pub mod queue;
pub use queue::{DefaultQueue, FixedSizeQueue};
