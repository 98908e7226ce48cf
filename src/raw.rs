//! Untyped queue storage.
//!
//! A queue owns at most one allocation: a small header holding the capacity and the head and tail indices,
//! immediately followed by the element array. Queues that have never allocated share a single immutable header
//! instead, so declaring a queue costs nothing until the first element is inserted.
use crate::alloc::{Global, QueueAlloc};
use crate::arrays;
use crate::error::{Error, Result};
use std::alloc::Layout;
use std::fmt;
use std::mem;
use std::ops::Range;
use std::ptr::{self, NonNull};
use std::slice;
use tracing::trace;

/// Capacity of the first real allocation.
pub const MIN_CAPACITY: usize = 4;

/// Metadata stored at the start of every allocation.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct Header {
    /// Number of slots in the element array. Always a power of two.
    cap: usize,

    /// Slot of the oldest element.
    head: usize,

    /// Slot the next element pushed to the back will occupy.
    tail: usize,
}

impl Header {
    #[inline]
    fn mask(&self) -> usize {
        self.cap - 1
    }

    #[inline]
    fn len(&self) -> usize {
        self.tail.wrapping_sub(self.head) & self.mask()
    }

    #[inline]
    fn is_full(&self) -> bool {
        (self.tail + 1) & self.mask() == self.head
    }
}

/// Header shared by every queue that has not allocated yet.
///
/// Its single slot is the one that is always kept free, so the queue it describes is both empty and full.
static EMPTY: Header = Header {
    cap: 1,
    head: 0,
    tail: 0,
};

/// An allocation holding a header and its element array.
#[derive(Clone, Copy)]
struct Heap {
    header: NonNull<Header>,
    layout: Layout,

    /// Byte offset of slot 0 from the start of the allocation.
    offset: usize,
}

enum Block {
    Empty,
    Heap(Heap),
}

/// The outcome of sizing a requested capacity.
struct Sizing {
    cap: usize,
    layout: Layout,
    offset: usize,
}

/// A growable circular queue of fixed-layout elements, stored as raw bytes.
///
/// Elements are copied in and out as byte slices of exactly `elem.size()` bytes. The queue never interprets them and
/// never runs destructors.
pub struct RawQueue<A: QueueAlloc = Global> {
    block: Block,
    elem: Layout,
    alloc: A,
}

unsafe impl<A: QueueAlloc + Send> Send for RawQueue<A> {}

impl RawQueue {
    /// Create a queue for elements of the given layout using the global allocator.
    ///
    /// A capacity of zero does not allocate.
    pub fn new(elem: Layout, capacity: usize) -> Result<Self> {
        Self::new_in(elem, capacity, Global)
    }
}

impl<A: QueueAlloc> RawQueue<A> {
    /// Create a queue that has not allocated any storage yet.
    pub fn empty_in(elem: Layout, alloc: A) -> Self {
        Self {
            block: Block::Empty,
            elem,
            alloc,
        }
    }

    /// Create a queue with room for at least `capacity` slots, rounded up to a power of two no smaller than
    /// [`MIN_CAPACITY`].
    ///
    /// A capacity of zero does not allocate.
    pub fn new_in(elem: Layout, capacity: usize, alloc: A) -> Result<Self> {
        let mut queue = Self::empty_in(elem, alloc);

        if capacity > 0 {
            queue.allocate(capacity)?;
        }

        Ok(queue)
    }

    /// Layout of a single element.
    #[inline]
    pub fn elem_layout(&self) -> Layout {
        self.elem
    }

    /// Returns a reference to the allocator backing this queue.
    #[inline]
    pub fn allocator(&self) -> &A {
        &self.alloc
    }

    /// Number of slots in the element array. One slot is always kept free.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.header().cap
    }

    #[inline]
    pub fn head(&self) -> usize {
        self.header().head
    }

    #[inline]
    pub fn tail(&self) -> usize {
        self.header().tail
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.header().len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        let header = self.header();
        header.head == header.tail
    }

    /// Returns `true` if the next insertion has to grow the queue first.
    #[inline]
    pub fn is_full(&self) -> bool {
        self.header().is_full()
    }

    /// Returns `true` if the queue is bound to the shared empty header and owns no allocation.
    #[inline]
    pub fn is_unallocated(&self) -> bool {
        ptr::eq(self.header(), &EMPTY)
    }

    /// Remove all elements without releasing storage.
    pub fn clear(&mut self) {
        if let Some(header) = self.header_mut() {
            header.head = 0;
            header.tail = 0;
        }
    }

    /// Double the capacity if the queue is full.
    ///
    /// Does nothing if there is still a free slot. Otherwise the storage is reallocated and the elements are moved so
    /// that they start at slot 0 in their original order. On failure the queue is left untouched.
    pub fn grow(&mut self) -> Result<()> {
        if !self.is_full() {
            return Ok(());
        }

        match self.block {
            Block::Empty => self.allocate(MIN_CAPACITY),
            Block::Heap(_) => self.resize(self.capacity().saturating_mul(2)),
        }
    }

    /// Make room for at least `additional` more elements.
    pub fn reserve(&mut self, additional: usize) -> Result<()> {
        let required = match self.len().checked_add(additional).and_then(|n| n.checked_add(1)) {
            Some(required) => required,
            None => {
                return Err(self.report(Error::CapacityOverflow {
                    capacity: usize::MAX,
                }))
            }
        };

        if required <= self.capacity() {
            return Ok(());
        }

        self.resize(required)
    }

    /// Release the storage and return to the unallocated state.
    ///
    /// Calling this on an unallocated queue does nothing.
    pub fn release(&mut self) {
        if let Block::Heap(heap) = mem::replace(&mut self.block, Block::Empty) {
            unsafe {
                self.alloc.deallocate(heap.header.cast(), heap.layout);
            }

            trace!(bytes = heap.layout.size(), "released queue storage");
        }
    }

    /// Copy an element to the back of the queue, growing it first if needed.
    ///
    /// # Panics
    ///
    /// Panics if `elem` is not exactly one element long.
    pub fn push_back(&mut self, elem: &[u8]) -> Result<()> {
        self.check_elem_len(elem.len());
        let slot = self.push_back_slot()?;

        unsafe {
            ptr::copy_nonoverlapping(elem.as_ptr(), slot, elem.len());
        }

        Ok(())
    }

    /// Copy an element to the front of the queue, growing it first if needed.
    ///
    /// # Panics
    ///
    /// Panics if `elem` is not exactly one element long.
    pub fn push_front(&mut self, elem: &[u8]) -> Result<()> {
        self.check_elem_len(elem.len());
        let slot = self.push_front_slot()?;

        unsafe {
            ptr::copy_nonoverlapping(elem.as_ptr(), slot, elem.len());
        }

        Ok(())
    }

    /// Remove the oldest element, copying it into `dest`.
    ///
    /// Returns `false` if the queue is empty.
    ///
    /// # Panics
    ///
    /// Panics if `dest` is not exactly one element long.
    pub fn pop_front(&mut self, dest: &mut [u8]) -> bool {
        self.check_elem_len(dest.len());

        match self.pop_front_slot() {
            Some(slot) => {
                unsafe {
                    ptr::copy_nonoverlapping(slot, dest.as_mut_ptr(), dest.len());
                }
                true
            }
            None => false,
        }
    }

    /// Remove the newest element, copying it into `dest`.
    ///
    /// Returns `false` if the queue is empty.
    ///
    /// # Panics
    ///
    /// Panics if `dest` is not exactly one element long.
    pub fn pop_back(&mut self, dest: &mut [u8]) -> bool {
        self.check_elem_len(dest.len());

        match self.pop_back_slot() {
            Some(slot) => {
                unsafe {
                    ptr::copy_nonoverlapping(slot, dest.as_mut_ptr(), dest.len());
                }
                true
            }
            None => false,
        }
    }

    /// Discard up to `count` elements from the front.
    ///
    /// Returns the number of elements discarded.
    pub fn consume(&mut self, count: usize) -> usize {
        let count = count.min(self.len());

        if let Some(header) = self.header_mut() {
            header.head = (header.head + count) & header.mask();
        }

        count
    }

    /// Bytes of the `index`-th element counting from the front.
    pub fn get(&self, index: usize) -> Option<&[u8]> {
        self.get_slot(index)
            .map(|slot| unsafe { slice::from_raw_parts(slot, self.elem.size()) })
    }

    pub fn front(&self) -> Option<&[u8]> {
        self.get(0)
    }

    pub fn back(&self) -> Option<&[u8]> {
        self.len().checked_sub(1).and_then(|last| self.get(last))
    }

    /// Claim the slot after the newest element and return a pointer to it.
    pub(crate) fn push_back_slot(&mut self) -> Result<*mut u8> {
        self.grow()?;

        let heap = self.allocated();
        let header = unsafe { &mut *heap.header.as_ptr() };
        let index = header.tail;
        header.tail = (index + 1) & header.mask();

        Ok(self.slot(heap, index))
    }

    /// Claim the slot before the oldest element and return a pointer to it.
    pub(crate) fn push_front_slot(&mut self) -> Result<*mut u8> {
        self.grow()?;

        let heap = self.allocated();
        let header = unsafe { &mut *heap.header.as_ptr() };
        header.head = header.head.wrapping_sub(1) & header.mask();
        let index = header.head;

        Ok(self.slot(heap, index))
    }

    /// Release the oldest slot and return a pointer to it. The slot stays readable until the next mutation.
    pub(crate) fn pop_front_slot(&mut self) -> Option<*const u8> {
        if self.is_empty() {
            return None;
        }

        let heap = self.allocated();
        let header = unsafe { &mut *heap.header.as_ptr() };
        let index = header.head;
        header.head = (index + 1) & header.mask();

        Some(self.slot(heap, index) as *const u8)
    }

    /// Release the newest slot and return a pointer to it. The slot stays readable until the next mutation.
    pub(crate) fn pop_back_slot(&mut self) -> Option<*const u8> {
        if self.is_empty() {
            return None;
        }

        let heap = self.allocated();
        let header = unsafe { &mut *heap.header.as_ptr() };
        header.tail = header.tail.wrapping_sub(1) & header.mask();
        let index = header.tail;

        Some(self.slot(heap, index) as *const u8)
    }

    /// Pointer to the `index`-th occupied slot counting from the front.
    pub(crate) fn get_slot(&self, index: usize) -> Option<*mut u8> {
        if index >= self.len() {
            return None;
        }

        let heap = self.allocated();
        let header = self.header();

        Some(self.slot(heap, (header.head + index) & header.mask()))
    }

    /// Occupied slots as up to two linear runs of slot indices.
    pub(crate) fn ranges(&self) -> [Range<usize>; 2] {
        let header = self.header();
        arrays::wrapping_ranges(header.head, header.tail, header.cap)
    }

    /// Pointer to slot 0, or a dangling pointer suitably aligned for an element if nothing is allocated.
    pub(crate) fn base(&self) -> *mut u8 {
        match self.block {
            Block::Heap(heap) => self.slot(heap, 0),
            Block::Empty => self.elem.align() as *mut u8,
        }
    }

    #[inline]
    fn header(&self) -> &Header {
        match self.block {
            Block::Empty => &EMPTY,
            Block::Heap(heap) => unsafe { &*heap.header.as_ptr() },
        }
    }

    #[inline]
    fn header_mut(&mut self) -> Option<&mut Header> {
        match self.block {
            Block::Empty => None,
            Block::Heap(heap) => Some(unsafe { &mut *heap.header.as_ptr() }),
        }
    }

    #[inline]
    fn allocated(&self) -> Heap {
        match self.block {
            Block::Heap(heap) => heap,
            Block::Empty => unreachable!("an empty queue has no slots"),
        }
    }

    #[inline]
    fn slot(&self, heap: Heap, index: usize) -> *mut u8 {
        debug_assert!(index < self.capacity());
        unsafe {
            heap.header
                .as_ptr()
                .cast::<u8>()
                .add(heap.offset + index * self.elem.size())
        }
    }

    #[inline]
    fn check_elem_len(&self, len: usize) {
        assert_eq!(len, self.elem.size(), "element must be exactly {} bytes", self.elem.size());
    }

    /// Round `requested` up to a power of two no smaller than [`MIN_CAPACITY`] and compute the allocation layout.
    ///
    /// The resulting allocation must still fit within the allocator's limit after one more doubling.
    fn sizing(&self, requested: usize) -> Result<Sizing> {
        let overflow = Error::CapacityOverflow {
            capacity: requested,
        };

        let cap = requested
            .max(MIN_CAPACITY)
            .checked_next_power_of_two()
            .ok_or(overflow)?;

        let array = self
            .elem
            .size()
            .checked_mul(cap)
            .and_then(|size| Layout::from_size_align(size, self.elem.align()).ok())
            .ok_or(overflow)?;

        let (layout, offset) = Layout::new::<Header>().extend(array).map_err(|_| overflow)?;
        let layout = layout.pad_to_align();

        match layout.size().checked_mul(2) {
            Some(doubled) if doubled <= self.alloc.max_alloc_size() => Ok(Sizing {
                cap,
                layout,
                offset,
            }),
            _ => Err(overflow),
        }
    }

    fn allocate(&mut self, capacity: usize) -> Result<()> {
        let sizing = self.sizing(capacity).map_err(|e| self.report(e))?;

        let ptr = match self.alloc.allocate(sizing.layout) {
            Some(ptr) => ptr,
            None => {
                return Err(self.report(Error::OutOfMemory {
                    size: sizing.layout.size(),
                }))
            }
        };

        let header = ptr.cast::<Header>();

        unsafe {
            header.as_ptr().write(Header {
                cap: sizing.cap,
                head: 0,
                tail: 0,
            });
        }

        trace!(capacity = sizing.cap, bytes = sizing.layout.size(), "allocated queue storage");

        self.block = Block::Heap(Heap {
            header,
            layout: sizing.layout,
            offset: sizing.offset,
        });

        Ok(())
    }

    /// Move to a larger allocation of at least `capacity` slots, leaving the elements at the start of the array.
    fn resize(&mut self, capacity: usize) -> Result<()> {
        let heap = match self.block {
            Block::Heap(heap) => heap,
            Block::Empty => return self.allocate(capacity),
        };

        let sizing = self.sizing(capacity).map_err(|e| self.report(e))?;
        let old = *self.header();
        debug_assert!(sizing.cap >= old.cap * 2);

        let ptr = match unsafe { self.alloc.reallocate(heap.header.cast(), heap.layout, sizing.layout.size()) } {
            Some(ptr) => ptr,
            None => {
                return Err(self.report(Error::OutOfMemory {
                    size: sizing.layout.size(),
                }))
            }
        };

        let header = ptr.cast::<Header>();

        let len = unsafe {
            let base = ptr.as_ptr().add(sizing.offset);
            let len = arrays::relinearize(base, self.elem.size(), old.cap, old.head, old.tail);

            header.as_ptr().write(Header {
                cap: sizing.cap,
                head: 0,
                tail: len,
            });

            len
        };

        trace!(from = old.cap, to = sizing.cap, len, "grew queue storage");

        self.block = Block::Heap(Heap {
            header,
            layout: sizing.layout,
            offset: sizing.offset,
        });

        Ok(())
    }

    /// Pass an error to the allocator's error hook and hand it back.
    fn report(&self, error: Error) -> Error {
        self.alloc.on_error(format_args!("{}", error));
        error
    }
}

impl<A: QueueAlloc> Drop for RawQueue<A> {
    fn drop(&mut self) {
        self.release();
    }
}

impl<A: QueueAlloc> fmt::Debug for RawQueue<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let header = self.header();

        f.debug_struct("RawQueue")
            .field("elem_size", &self.elem.size())
            .field("capacity", &header.cap)
            .field("head", &header.head)
            .field("tail", &header.tail)
            .field("len", &header.len())
            .finish()
    }
}
