use std::{mem, ptr};

use crate::{
    block::{HEADER_SIZE, Header},
    kernel,
    utils::align,
};

/// Unit of heap growth. Every arena mapping requested from the kernel is a
/// multiple of this, and it also bounds the smallest arena.
pub(crate) const GRANULE: usize = 128 * 1024;

/// Overhead in bytes introduced by the [`Arena`] header.
pub(crate) const ARENA_HEADER_SIZE: usize = mem::size_of::<Arena>();

/// Metadata of one arena: a contiguous mapping obtained from the kernel and
/// owned by the heap from then on. The header sits at the very start of the
/// mapping and the arena's blocks fill the rest:
///
/// ```text
///   /--- arena metadata
///   |       /--- header of the first block
///   v       v
///   +-------+--------+---------------------------------+
///   | Arena | Header | ............................... |
///   +-------+--------+---------------------------------+
///
///   |------------------- Arena.size -------------------|
/// ```
///
/// Arenas form a singly linked list in insertion order. The list is never
/// reordered and arenas are never dropped from it while the heap lives;
/// only [`crate::Heap`]'s teardown returns the mappings to the kernel.
#[repr(C)]
pub(crate) struct Arena {
    /// Next arena in insertion order.
    pub next: *mut Arena,
    /// Total mapping length in bytes, this header included.
    pub size: usize,
}

impl Arena {
    /// Maps a new arena able to hold at least `requested_payload` bytes of
    /// payload in a single block, and carves that block: one free,
    /// self-linked header spanning all the usable space.
    ///
    /// The mapping length is `requested_payload` plus one block header plus
    /// the arena header, rounded up to the next [`GRANULE`] multiple. A
    /// length that already is an exact multiple is used as-is.
    ///
    /// Returns null if the kernel refuses the mapping, or if the rounded
    /// length would not leave room behind the two headers (cannot happen
    /// with the rounding above, checked anyway).
    pub unsafe fn allocate(requested_payload: usize) -> *mut Arena {
        let total = align(
            requested_payload + HEADER_SIZE + ARENA_HEADER_SIZE,
            GRANULE,
        );

        if total <= ARENA_HEADER_SIZE + HEADER_SIZE {
            return ptr::null_mut();
        }

        unsafe {
            let Some(addr) = kernel::request_memory(total) else {
                return ptr::null_mut();
            };

            let arena = addr.as_ptr() as *mut Arena;
            (*arena).next = ptr::null_mut();
            (*arena).size = total;

            // The whole usable space becomes a single free block forming a
            // one-element cycle.
            let first = Arena::first_block(arena);
            Header::init(first, total - ARENA_HEADER_SIZE - HEADER_SIZE);
            (*first).next = first;

            arena
        }
    }

    /// Links `arena` at the tail of the list starting at `first`. Walks to
    /// the tail every time; arena counts stay small enough that a tail
    /// pointer is not worth carrying.
    pub unsafe fn append(first: *mut Arena, arena: *mut Arena) {
        unsafe {
            let mut last = first;

            while !(*last).next.is_null() {
                last = (*last).next;
            }

            (*last).next = arena;
        }
    }

    /// The block header right after the arena metadata: entry point of this
    /// arena's cycle.
    #[inline]
    pub unsafe fn first_block(arena: *mut Arena) -> *mut Header {
        unsafe { arena.add(1) as *mut Header }
    }

    /// Whether `addr` falls inside this arena's mapping.
    pub unsafe fn contains(arena: *mut Arena, addr: *mut u8) -> bool {
        let start = arena as usize;
        unsafe { (addr as usize) >= start && (addr as usize) < start + (*arena).size }
    }
}
