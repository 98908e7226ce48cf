use crate::alloc::{Global, QueueAlloc};
use crate::arrays;
use crate::error::Result;
use crate::raw::RawQueue;
use std::alloc::Layout;
use std::fmt;
use std::io::{self, Read, Write};
use std::iter::FusedIterator;
use std::marker::PhantomData;
use std::ptr;
use std::slice;

/// Growable double-ended ring queue.
///
/// Elements live in a single power-of-two sized array that is doubled whenever an insertion finds it full. A queue
/// that has never held an element does not allocate.
pub struct Queue<T, A: QueueAlloc = Global> {
    raw: RawQueue<A>,
    marker: PhantomData<T>,
}

impl<T: Copy> Default for Queue<T> {
    fn default() -> Queue<T> {
        Queue::new()
    }
}

impl<T: Copy> Queue<T> {
    /// Create a new queue without allocating.
    pub fn new() -> Self {
        Self::new_in(Global)
    }

    /// Create a new queue with room for at least `capacity` slots pre-allocated.
    pub fn with_capacity(capacity: usize) -> Result<Self> {
        Self::with_capacity_in(capacity, Global)
    }
}

impl<T: Copy, A: QueueAlloc> Queue<T, A> {
    pub fn new_in(alloc: A) -> Self {
        Self {
            raw: RawQueue::empty_in(Layout::new::<T>(), alloc),
            marker: PhantomData,
        }
    }

    pub fn with_capacity_in(capacity: usize, alloc: A) -> Result<Self> {
        Ok(Self {
            raw: RawQueue::new_in(Layout::new::<T>(), capacity, alloc)?,
            marker: PhantomData,
        })
    }

    #[inline]
    pub fn allocator(&self) -> &A {
        self.raw.allocator()
    }

    /// Returns the number of elements in the queue.
    #[inline]
    pub fn len(&self) -> usize {
        self.raw.len()
    }

    /// Returns `true` if the queue is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.raw.is_empty()
    }

    /// Returns `true` if the next insertion will grow the queue.
    #[inline]
    pub fn is_full(&self) -> bool {
        self.raw.is_full()
    }

    /// Returns the number of slots in the backing array. The queue holds at most one element less than this.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.raw.capacity()
    }

    /// Returns `true` if the queue owns no allocation.
    #[inline]
    pub fn is_unallocated(&self) -> bool {
        self.raw.is_unallocated()
    }

    /// Double the capacity if the queue is full, otherwise do nothing.
    pub fn grow(&mut self) -> Result<()> {
        self.raw.grow()
    }

    /// Make room for at least `additional` more elements.
    pub fn reserve(&mut self, additional: usize) -> Result<()> {
        self.raw.reserve(additional)
    }

    /// Free the backing array, discarding all elements.
    pub fn release(&mut self) {
        self.raw.release()
    }

    /// Remove all elements from the queue.
    pub fn clear(&mut self) {
        self.raw.clear()
    }

    /// Insert an element at the back of the queue.
    pub fn push_back(&mut self, value: T) -> Result<()> {
        let slot = self.raw.push_back_slot()?;

        unsafe {
            ptr::write(slot as *mut T, value);
        }

        Ok(())
    }

    /// Insert an element at the front of the queue.
    pub fn push_front(&mut self, value: T) -> Result<()> {
        let slot = self.raw.push_front_slot()?;

        unsafe {
            ptr::write(slot as *mut T, value);
        }

        Ok(())
    }

    /// Remove and return the oldest element.
    pub fn pop_front(&mut self) -> Option<T> {
        self.raw
            .pop_front_slot()
            .map(|slot| unsafe { ptr::read(slot as *const T) })
    }

    /// Remove and return the newest element.
    pub fn pop_back(&mut self) -> Option<T> {
        self.raw
            .pop_back_slot()
            .map(|slot| unsafe { ptr::read(slot as *const T) })
    }

    /// Returns the `index`-th element counting from the front.
    pub fn get(&self, index: usize) -> Option<&T> {
        self.raw.get_slot(index).map(|slot| unsafe { &*(slot as *const T) })
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut T> {
        self.raw.get_slot(index).map(|slot| unsafe { &mut *(slot as *mut T) })
    }

    pub fn front(&self) -> Option<&T> {
        self.get(0)
    }

    pub fn back(&self) -> Option<&T> {
        self.len().checked_sub(1).and_then(|last| self.get(last))
    }

    /// Returns the elements as a pair of slices which, in order, contain the contents of the queue.
    ///
    /// The second slice is empty unless the elements wrap around the end of the backing array.
    pub fn as_slices(&self) -> (&[T], &[T]) {
        let [first, second] = self.raw.ranges();
        let base = self.raw.base() as *const T;

        unsafe {
            (
                slice::from_raw_parts(base.add(first.start), first.len()),
                slice::from_raw_parts(base.add(second.start), second.len()),
            )
        }
    }

    /// Returns a front-to-back iterator.
    pub fn iter(&self) -> Iter<'_, T> {
        let (first, second) = self.as_slices();

        Iter {
            first: first.iter(),
            second: second.iter(),
        }
    }

    /// Copy the given elements and insert them into the back of the queue.
    ///
    /// Either all elements are pushed or, if the queue cannot grow, none are. Returns the number of elements pushed.
    pub fn push(&mut self, src: &[T]) -> Result<usize> {
        self.raw.reserve(src.len())?;

        for value in src {
            self.push_back(*value)?;
        }

        Ok(src.len())
    }

    /// Pull elements from the front of the queue into the given location, up to the length of the destination.
    ///
    /// Returns the number of elements pulled.
    pub fn pull(&mut self, dest: &mut [T]) -> usize {
        let count = self.copy_to(dest);
        self.consume(count)
    }

    /// Copy elements from the front of the queue into the given slice.
    ///
    /// Returns the number of elements copied. If there are less elements in the queue than the length of `dest`, then
    /// only part of `dest` will be written to.
    pub fn copy_to(&self, dest: &mut [T]) -> usize {
        let (first, second) = self.as_slices();
        arrays::copy_from_seq(&[first, second], dest)
    }

    /// Consume up to `count` elements from the front of the queue and discards them.
    ///
    /// Returns the number of elements consumed, which may be less than `count` if `count` was greater than the number
    /// of elements in the queue.
    ///
    /// This operation has a runtime cost of `O(1)`.
    pub fn consume(&mut self, count: usize) -> usize {
        self.raw.consume(count)
    }
}

impl<T: Copy + fmt::Debug, A: QueueAlloc> fmt::Debug for Queue<T, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

impl<'a, T: Copy, A: QueueAlloc> IntoIterator for &'a Queue<T, A> {
    type Item = &'a T;
    type IntoIter = Iter<'a, T>;

    fn into_iter(self) -> Iter<'a, T> {
        self.iter()
    }
}

impl<A: QueueAlloc> Read for Queue<u8, A> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        Ok(self.pull(buf))
    }
}

impl<A: QueueAlloc> Write for Queue<u8, A> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.push(buf).map_err(|e| io::Error::new(io::ErrorKind::Other, e))
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Front-to-back iterator over the elements of a [`Queue`].
#[derive(Clone, Debug)]
pub struct Iter<'a, T> {
    first: slice::Iter<'a, T>,
    second: slice::Iter<'a, T>,
}

impl<'a, T> Iterator for Iter<'a, T> {
    type Item = &'a T;

    fn next(&mut self) -> Option<&'a T> {
        self.first.next().or_else(|| self.second.next())
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let len = self.len();
        (len, Some(len))
    }
}

impl<'a, T> DoubleEndedIterator for Iter<'a, T> {
    fn next_back(&mut self) -> Option<&'a T> {
        self.second.next_back().or_else(|| self.first.next_back())
    }
}

impl<'a, T> ExactSizeIterator for Iter<'a, T> {
    fn len(&self) -> usize {
        self.first.len() + self.second.len()
    }
}

impl<'a, T> FusedIterator for Iter<'a, T> {}

/// Creates new queues with configurable properties.
#[derive(Clone, Debug, Default)]
pub struct Builder {
    capacity: usize,
}

impl Builder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the number of slots to pre-allocate. Zero, the default, defers allocation until the first insertion.
    pub fn capacity(&mut self, capacity: usize) -> &mut Self {
        self.capacity = capacity;
        self
    }

    /// Create a new queue using the current settings and the global allocator.
    pub fn build<T: Copy>(&self) -> Result<Queue<T>> {
        self.build_in(Global)
    }

    /// Create a new queue using the current settings and the given allocator.
    pub fn build_in<T: Copy, A: QueueAlloc>(&self, alloc: A) -> Result<Queue<T, A>> {
        Queue::with_capacity_in(self.capacity, alloc)
    }

    /// Create a new untyped queue for elements of the given layout.
    pub fn build_raw(&self, elem: Layout) -> Result<RawQueue> {
        RawQueue::new(elem, self.capacity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::raw::tests::Flaky;

    #[test]
    fn test_capacity() {
        let queue = Queue::<u8>::with_capacity(16).unwrap();
        assert_eq!(queue.capacity(), 16);
    }

    #[test]
    fn test_default_does_not_allocate() {
        let queue = Queue::<u64>::default();

        assert!(queue.is_unallocated());
        assert!(queue.is_empty());
        assert_eq!(queue.as_slices(), (&[][..], &[][..]));
        assert_eq!(queue.iter().next(), None);
    }

    #[test]
    fn test_push() {
        let mut queue = Queue::new();

        assert!(queue.is_empty());

        let bytes = b"hello world";
        assert_eq!(queue.push(bytes).unwrap(), bytes.len());

        assert!(!queue.is_empty());
        assert_eq!(queue.len(), bytes.len());
    }

    #[test]
    fn test_push_and_consume() {
        let mut queue = Queue::with_capacity(12).unwrap();

        assert_eq!(queue.push(b"hello world").unwrap(), 11);

        assert_eq!(queue.consume(6), 6);
        assert_eq!(queue.len(), 5);

        assert_eq!(queue.push(b" hello").unwrap(), 6);

        assert_eq!(queue.len(), 11);

        let mut dest = [0; 11];
        assert_eq!(queue.copy_to(&mut dest), 11);
        assert_eq!(&dest, b"world hello");
    }

    #[test]
    fn test_push_a_lot() {
        let mut queue = Queue::new();
        let bytes = "heavyweight;".repeat(1000).into_bytes();

        assert_eq!(queue.len(), 0);
        assert_eq!(queue.push(&bytes).unwrap(), bytes.len());
        assert_eq!(queue.len(), bytes.len());
        assert_eq!(queue.consume(bytes.len()), bytes.len());
        assert_eq!(queue.len(), 0);
    }

    #[test]
    fn test_pull_more_than_queue() {
        let mut queue = Queue::new();
        let bytes = b"hello world";
        queue.push(bytes).unwrap();

        let mut dst = [0; 1024];
        assert_eq!(queue.pull(&mut dst), bytes.len());
        assert_eq!(&dst[0..bytes.len()], bytes);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_pull_less_than_queue() {
        let mut queue = Queue::new();
        let bytes = b"hello world";
        queue.push(bytes).unwrap();

        let mut dst = [0; 4];
        assert_eq!(queue.pull(&mut dst), dst.len());
        assert_eq!(&dst, &bytes[0..4]);
        assert!(!queue.is_empty());
        assert_eq!(queue.len(), bytes.len() - dst.len());
    }

    #[test]
    fn test_force_resize() {
        let mut queue = Queue::with_capacity(8).unwrap();

        queue.push(b"hello").unwrap();
        assert_eq!(queue.capacity(), 8);

        queue.push(b" world").unwrap();
        assert!(queue.capacity() > 8);

        let mut out = [0; 11];
        queue.copy_to(&mut out);
        assert_eq!(&out, b"hello world");
    }

    #[test]
    fn test_failed_push_keeps_contents() {
        let alloc = Flaky::default();
        let mut queue = Queue::with_capacity_in(4, &alloc).unwrap();
        queue.push(&[1u16, 2, 3]).unwrap();

        alloc.fail.set(true);

        assert!(matches!(queue.push(&[4, 5]), Err(Error::OutOfMemory { .. })));
        assert!(matches!(queue.push_back(4), Err(Error::OutOfMemory { .. })));
        assert!(matches!(queue.push_front(0), Err(Error::OutOfMemory { .. })));
        assert_eq!(queue.iter().copied().collect::<Vec<_>>(), vec![1, 2, 3]);
        assert_eq!(alloc.errors.borrow().len(), 3);
    }

    #[test]
    fn test_deque_operations() {
        let mut queue = Queue::new();

        queue.push_back(2).unwrap();
        queue.push_back(3).unwrap();
        queue.push_front(1).unwrap();
        queue.push_front(0).unwrap();

        assert_eq!(queue.len(), 4);
        assert_eq!(queue.front(), Some(&0));
        assert_eq!(queue.back(), Some(&3));
        assert_eq!(queue.get(2), Some(&2));
        assert_eq!(queue.get(4), None);

        *queue.get_mut(1).unwrap() = 10;

        assert_eq!(queue.pop_front(), Some(0));
        assert_eq!(queue.pop_back(), Some(3));
        assert_eq!(queue.pop_front(), Some(10));
        assert_eq!(queue.pop_back(), Some(2));
        assert_eq!(queue.pop_back(), None);
        assert_eq!(queue.front(), None);
    }

    #[test]
    fn test_fifo_across_growth() {
        let mut queue = Queue::with_capacity(4).unwrap();
        let mut next = 0;
        let mut expected = 0;

        for round in 1..50 {
            for _ in 0..round {
                queue.push_back(next).unwrap();
                next += 1;
            }

            for _ in 0..round / 2 {
                assert_eq!(queue.pop_front(), Some(expected));
                expected += 1;
            }
        }

        while let Some(value) = queue.pop_front() {
            assert_eq!(value, expected);
            expected += 1;
        }

        assert_eq!(expected, next);
    }

    #[test]
    fn test_as_slices_wraps() {
        let mut queue = Queue::with_capacity(8).unwrap();

        queue.push(&[0, 1, 2, 3, 4, 5]).unwrap();
        queue.consume(5);
        queue.push(&[6, 7, 8]).unwrap();

        assert_eq!(queue.capacity(), 8);
        assert_eq!(queue.as_slices(), (&[5, 6, 7][..], &[8][..]));
        assert_eq!(queue.iter().rev().copied().collect::<Vec<_>>(), vec![8, 7, 6, 5]);
        assert_eq!(queue.iter().len(), 4);
    }

    #[test]
    fn test_overaligned_elements() {
        let mut queue = Queue::new();

        for i in 0..20u128 {
            queue.push_back(i << 64).unwrap();
        }

        for (i, value) in queue.iter().enumerate() {
            assert_eq!(*value, (i as u128) << 64);
        }
    }

    #[test]
    fn test_read_write() {
        let mut queue = Queue::<u8>::new();

        queue.write_all(b"hello world").unwrap();

        let mut dest = String::new();
        queue.read_to_string(&mut dest).unwrap();

        assert_eq!(dest, "hello world");
        assert!(queue.is_empty());
    }

    #[test]
    fn test_write_error_surfaces() {
        let alloc = Flaky::default();
        alloc.fail.set(true);

        let mut queue: Queue<u8, _> = Queue::new_in(&alloc);
        let error = queue.write(b"hello").unwrap_err();

        assert_eq!(error.kind(), io::ErrorKind::Other);
        assert!(queue.is_unallocated());
    }

    #[test]
    fn test_builder() {
        let queue: Queue<u32> = Builder::new().capacity(100).build().unwrap();
        assert_eq!(queue.capacity(), 128);

        let queue: Queue<u32> = Builder::new().build().unwrap();
        assert!(queue.is_unallocated());

        let raw = Builder::new().capacity(3).build_raw(Layout::new::<u64>()).unwrap();
        assert_eq!(raw.capacity(), 4);
        assert_eq!(raw.elem_layout(), Layout::new::<u64>());
    }

    #[test]
    fn test_debug() {
        let mut queue = Queue::new();
        queue.push(&[1, 2, 3]).unwrap();

        assert_eq!(format!("{:?}", queue), "[1, 2, 3]");
    }
}
