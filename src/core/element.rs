//! Queue element contract.

/// An opaque unit of work carried through a queue.
///
/// The only structure imposed on an element is a type tag that downstream
/// handlers use to route it. Queues themselves accept any `Send` value; the
/// tag matters where elements are dispatched by kind (see
/// [`CommandManager`](crate::core::CommandManager)).
pub trait QueueElement: Send + Sync {
    /// Discriminator used for dispatch.
    fn type_tag(&self) -> u64;
}
