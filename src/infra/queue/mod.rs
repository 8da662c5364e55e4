//! Queue implementations.

pub mod buffered;
pub mod default;
pub mod fixed;

pub use buffered::{Buffer, BufferedQueue};
pub use default::DefaultQueue;
pub use fixed::{FixedSizeQueue, RingBuffer};
