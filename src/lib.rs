//! Growable circular queues stored in a single allocation.
//!
//! Each queue keeps its capacity and head and tail indices in a header placed directly in front of the element array,
//! so the whole queue is one block of memory. Queues that have not stored anything yet share one immutable empty
//! header and own no allocation. When an insertion finds the queue full, the block is reallocated at twice the size
//! and any elements wrapped around the end of the old array are moved back into a single run.
//!
//! [`Queue`] is the typed front-end for `Copy` elements. [`RawQueue`] moves untyped elements of a fixed layout.
//! Allocation and error reporting go through a [`QueueAlloc`] implementation, [`Global`] by default.
mod arrays;

pub mod alloc;
pub mod error;
pub mod queue;
pub mod raw;

pub use crate::alloc::{Global, QueueAlloc};
pub use crate::error::{Error, Result};
pub use crate::queue::{Builder, Iter, Queue};
pub use crate::raw::{RawQueue, MIN_CAPACITY};

/// A growable byte queue.
pub type ByteQueue = Queue<u8>;
