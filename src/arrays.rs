//! Provides functions for circular array manipulation.
use std::ops::Range;
use std::ptr;

/// Copy as many elements as possible from one slice to another.
///
/// Returns the number of elements copied.
#[inline]
pub fn copy<T: Copy>(src: &[T], dest: &mut [T]) -> usize {
    let len = src.len().min(dest.len());
    dest[..len].copy_from_slice(&src[..len]);
    len
}

/// Copy as many elements as possible from a slice of slices to another.
///
/// Returns the number of elements copied.
pub fn copy_from_seq<T: Copy>(seq: &[&[T]], dest: &mut [T]) -> usize {
    let mut copied = 0;

    for slice in seq {
        if copied < dest.len() {
            copied += copy(slice, &mut dest[copied..]);
        } else {
            break;
        }
    }

    copied
}

/// Split the occupied run `from..to` of a circular array of length `len` into at most two linear ranges.
///
/// The second range is empty unless the run wraps past the end of the array. `from == to` is an empty run.
pub fn wrapping_ranges(from: usize, to: usize, len: usize) -> [Range<usize>; 2] {
    if from <= to {
        [from..to, 0..0]
    } else {
        [from..len, 0..to]
    }
}

/// Move the occupied run `head..tail` of a circular array so that it starts at slot 0.
///
/// `base` points to slot 0 of an array of `elem_size`-byte slots that was `old_cap` slots long and has since been
/// enlarged to at least `2 * old_cap` slots. When the run wraps, the slots past `old_cap` are used as staging space:
///
/// ```text
///          tail      head
///            |       |
/// before : | 2 | 3 | - | 1 | - | - | - | - |
/// stage  : | 2 | 3 | - | 1 | 1 | - | - | - |
/// slide  : | 2 | 2 | 3 | 1 | 1 | - | - | - |
/// restore: | 1 | 2 | 3 | 1 | 1 | - | - | - |
/// ```
///
/// Returns the number of elements in the run, which is the new tail.
///
/// # Safety
///
/// `base` must be valid for reads and writes of `2 * old_cap * elem_size` bytes, and `head` and `tail` must be less
/// than `old_cap`.
pub unsafe fn relinearize(base: *mut u8, elem_size: usize, old_cap: usize, head: usize, tail: usize) -> usize {
    debug_assert!(head < old_cap && tail < old_cap);

    let at = |slot: usize| base.add(slot * elem_size);

    if head <= tail {
        let count = tail - head;

        if head > 0 {
            ptr::copy(at(head), at(0), count * elem_size);
        }

        return count;
    }

    let wrapped = old_cap - head;

    ptr::copy_nonoverlapping(at(head), at(old_cap), wrapped * elem_size);
    ptr::copy(at(0), at(wrapped), tail * elem_size);
    ptr::copy_nonoverlapping(at(old_cap), at(0), wrapped * elem_size);

    wrapped + tail
}
