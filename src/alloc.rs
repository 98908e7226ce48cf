//! Pluggable allocation backend for queue storage.
use std::alloc::{self, Layout};
use std::fmt;
use std::ptr::NonNull;

/// Memory provider and error sink used by a queue.
///
/// # Safety
///
/// Implementations must behave like the global allocator: `allocate` returns a block fitting `layout` or `None`,
/// `reallocate` either returns a block holding the first `layout.size()` bytes of the old one (which is then no longer
/// valid) or returns `None` and leaves the old block untouched, and `deallocate` accepts any block previously handed
/// out by the same allocator.
pub unsafe trait QueueAlloc {
    /// Allocate a block of memory fitting `layout`.
    fn allocate(&self, layout: Layout) -> Option<NonNull<u8>>;

    /// Resize a block previously returned by this allocator.
    ///
    /// # Safety
    ///
    /// `ptr` must be live and have been allocated with `layout`, and `new_size` must be non-zero.
    unsafe fn reallocate(&self, ptr: NonNull<u8>, layout: Layout, new_size: usize) -> Option<NonNull<u8>>;

    /// Release a block previously returned by this allocator.
    ///
    /// # Safety
    ///
    /// `ptr` must be live and have been allocated with `layout`.
    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout);

    /// Largest allocation size in bytes this allocator is willing to serve.
    ///
    /// Queues refuse any capacity whose allocation could not be doubled within this bound.
    fn max_alloc_size(&self) -> usize {
        isize::MAX as usize
    }

    /// Called exactly once for every failed allocation or capacity check, before the error is returned.
    fn on_error(&self, message: fmt::Arguments<'_>) {
        tracing::error!("{}", message);
    }
}

/// The global allocator registered with the standard library.
#[derive(Clone, Copy, Debug, Default)]
pub struct Global;

unsafe impl QueueAlloc for Global {
    #[inline]
    fn allocate(&self, layout: Layout) -> Option<NonNull<u8>> {
        NonNull::new(unsafe { alloc::alloc(layout) })
    }

    #[inline]
    unsafe fn reallocate(&self, ptr: NonNull<u8>, layout: Layout, new_size: usize) -> Option<NonNull<u8>> {
        NonNull::new(alloc::realloc(ptr.as_ptr(), layout, new_size))
    }

    #[inline]
    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) {
        alloc::dealloc(ptr.as_ptr(), layout)
    }
}

unsafe impl<A: QueueAlloc + ?Sized> QueueAlloc for &A {
    fn allocate(&self, layout: Layout) -> Option<NonNull<u8>> {
        (**self).allocate(layout)
    }

    unsafe fn reallocate(&self, ptr: NonNull<u8>, layout: Layout, new_size: usize) -> Option<NonNull<u8>> {
        (**self).reallocate(ptr, layout, new_size)
    }

    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) {
        (**self).deallocate(ptr, layout)
    }

    fn max_alloc_size(&self) -> usize {
        (**self).max_alloc_size()
    }

    fn on_error(&self, message: fmt::Arguments<'_>) {
        (**self).on_error(message)
    }
}
