//! Errors raised while sizing or allocating queue storage.
use thiserror::Error;

/// Result alias for queue operations.
pub type Result<T> = std::result::Result<T, Error>;

/// The only ways a queue operation can fail.
///
/// Both variants leave the queue exactly as it was before the failing call.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
pub enum Error {
    /// The allocator could not satisfy a request of `size` bytes.
    #[error("out of memory, alloc({size})")]
    OutOfMemory { size: usize },

    /// The requested capacity would leave no room for a further doubling.
    #[error("max capacity has been exceeded, cap({capacity})")]
    CapacityOverflow { capacity: usize },
}
