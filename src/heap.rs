use std::{mem, ptr, ptr::NonNull};

use crate::{
    arena::{Arena, GRANULE},
    block::Header,
    error::{AllocError, Result},
    kernel,
    utils::align,
};

/// A heap: an ordered list of arenas obtained from the kernel, each carved
/// into a cycle of blocks.
///
/// ```text
/// +-------------------------------------------+      +-----------------------------+
/// |       | +-------+   +-------+   +------+  |      |       | +----------------+  |
/// | Arena | | Block |-->| Block |-->| Block |  | ---> | Arena | |     Block      |  |
/// |       | +-------+   +-------+   +------+  |      |       | +----------------+  |
/// |           ^__________________________/    |      |            ^_________/      |
/// +-------------------------------------------+      +-----------------------------+
/// ```
///
/// The heap is an explicit object: construct one with [`Heap::new`] and call
/// every operation on it. Nothing here is global, so independent heaps can
/// coexist (the [`crate::MemAlloc`] wrapper owns one behind a lock to serve
/// as the process allocator).
///
/// A single `Heap` is strictly single threaded. Headers and links are
/// mutated in place with no atomicity, and a half-updated cycle is never a
/// valid state to observe, so concurrent callers must serialize every call
/// externally.
///
/// Two invariants hold whenever a public operation is not running:
/// no two free blocks of the same arena are ever address-adjacent (frees
/// coalesce eagerly), and no header ever describes an empty payload.
pub struct Heap {
    /// First arena, in insertion order. Null until the first allocation.
    first_arena: *mut Arena,
}

// A heap exclusively owns its mappings, so moving it to another thread
// moves the whole structure with it.
unsafe impl Send for Heap {}

impl Heap {
    /// Creates a heap that owns no memory yet. The first arena is mapped on
    /// the first allocation.
    pub const fn new() -> Self {
        Self {
            first_arena: ptr::null_mut(),
        }
    }

    /// Allocates `size` bytes and returns the address of the payload, which
    /// stays valid until it is passed to [`Heap::free`].
    ///
    /// The payload is aligned to the word size but no further; callers that
    /// need stricter alignment must arrange it themselves.
    ///
    /// Fails on `size == 0` and when the kernel cannot supply a new arena;
    /// a failed call leaves the heap exactly as it was.
    pub fn allocate(&mut self, size: usize) -> Result<NonNull<u8>> {
        if size == 0 {
            return Err(AllocError::ZeroSize);
        }

        // The word rounding below and the granule rounding in
        // `Arena::allocate` must not wrap. No mapping anywhere near this
        // size can exist, so refuse before touching the arithmetic.
        if size > isize::MAX as usize - GRANULE {
            return Err(AllocError::OutOfMemory { requested: size });
        }

        // Placement works on word multiples so that every header written
        // after this payload stays naturally aligned. `asize` keeps the
        // caller's exact request.
        let fit = align(size, mem::size_of::<usize>());

        unsafe {
            if self.first_arena.is_null() {
                let arena = Arena::allocate(fit);
                if arena.is_null() {
                    return Err(AllocError::OutOfMemory { requested: size });
                }
                self.first_arena = arena;
            }

            let mut block = self.best_fit(fit);

            if block.is_null() {
                // No arena can serve the request: grow by exactly one arena
                // sized for it and search again.
                let arena = Arena::allocate(fit);
                if arena.is_null() {
                    return Err(AllocError::OutOfMemory { requested: size });
                }
                Arena::append(self.first_arena, arena);

                block = self.best_fit(fit);
                debug_assert!(!block.is_null(), "fresh arena cannot miss");
            }

            let right = Header::split(block, fit);

            // A split remainder sitting next to a free successor would
            // break the coalescing invariant once `block` is marked used,
            // so absorb it before finalizing. On a well-formed heap the
            // chosen block never has a free adjacent successor, so this
            // only fires if split arithmetic regresses.
            if Header::can_merge(right, (*right).next) {
                Header::merge(right, (*right).next);
            }

            (*block).asize = size;

            Ok(NonNull::new_unchecked(Header::payload(block)))
        }
    }

    /// Frees an allocation, merging it with whichever of its neighbors are
    /// free so that no two adjacent free blocks remain.
    ///
    /// # Safety
    ///
    /// `payload` must come from a call to [`Heap::allocate`] (or the other
    /// allocating operations) on this same heap and must not have been
    /// freed already. Anything else rewrites memory the heap does not
    /// manage, or corrupts the block cycle.
    pub unsafe fn free(&mut self, payload: NonNull<u8>) {
        debug_assert!(
            self.owns(payload.as_ptr()),
            "pointer does not belong to this heap"
        );

        unsafe {
            let header = Header::from_payload(payload.as_ptr());

            (*header).asize = 0;

            if Header::can_merge(header, (*header).next) {
                Header::merge(header, (*header).next);
            }

            // Links are forward-only: the predecessor takes a scan of the
            // cycle. The address check in `can_merge` keeps the singleton
            // and wrap-around cases out.
            let prev = Header::prev(header);
            if Header::can_merge(prev, header) {
                Header::merge(prev, header);
            }
        }
    }

    /// Moves an allocation to `new_size` bytes: allocates anew, copies
    /// `min(old request, new_size)` bytes, frees the old payload.
    ///
    /// On failure the old allocation is untouched and stays valid; in
    /// particular `new_size == 0` fails with [`AllocError::ZeroSize`]
    /// rather than acting as a free.
    ///
    /// # Safety
    ///
    /// Same contract as [`Heap::free`] for `payload`.
    pub unsafe fn reallocate(
        &mut self,
        payload: NonNull<u8>,
        new_size: usize,
    ) -> Result<NonNull<u8>> {
        unsafe {
            let header = Header::from_payload(payload.as_ptr());
            let old_size = (*header).asize;

            let new_payload = self.allocate(new_size)?;

            ptr::copy_nonoverlapping(
                payload.as_ptr(),
                new_payload.as_ptr(),
                old_size.min(new_size),
            );

            self.free(payload);

            Ok(new_payload)
        }
    }

    /// Allocates `size` bytes of zeroed memory. Fresh arenas come zeroed
    /// from the kernel but recycled blocks carry whatever the previous
    /// owner wrote, so the payload is always filled explicitly.
    pub fn allocate_zeroed(&mut self, size: usize) -> Result<NonNull<u8>> {
        let payload = self.allocate(size)?;

        unsafe {
            ptr::write_bytes(payload.as_ptr(), 0, size);
        }

        Ok(payload)
    }

    /// Whether `addr` lies inside one of this heap's arenas. Debug aid for
    /// the [`Heap::free`] precondition; it cannot catch a double free.
    fn owns(&self, addr: *mut u8) -> bool {
        unsafe {
            let mut arena = self.first_arena;

            while !arena.is_null() {
                if Arena::contains(arena, addr) {
                    return true;
                }
                arena = (*arena).next;
            }
        }

        false
    }

    /// Best-fit search over every block of every arena.
    ///
    /// Arenas are scanned in insertion order. Within an arena the cycle is
    /// walked exactly once, starting just past the first block and ending
    /// with the wrap-around visit of the first block itself. A free block
    /// whose payload equals `size` wins immediately; otherwise the smallest
    /// free block strictly larger than `size` wins. Returns null on a miss,
    /// leaving growth to the caller.
    ///
    /// Cost is linear in the total number of blocks; there are no size
    /// classes.
    unsafe fn best_fit(&self, size: usize) -> *mut Header {
        let mut best: *mut Header = ptr::null_mut();

        unsafe {
            let mut arena = self.first_arena;

            while !arena.is_null() {
                let first = Arena::first_block(arena);
                let mut current = (*first).next;

                loop {
                    if (*current).is_free() {
                        if (*current).size == size {
                            return current;
                        }

                        if (*current).size > size
                            && (best.is_null() || (*current).size < (*best).size)
                        {
                            best = current;
                        }
                    }

                    if current == first {
                        break;
                    }
                    current = (*current).next;
                }

                arena = (*arena).next;
            }
        }

        best
    }
}

impl Default for Heap {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Heap {
    /// Returns every arena mapping to the kernel. The running allocator
    /// never unmaps anything; this is the only teardown path.
    fn drop(&mut self) {
        unsafe {
            let mut arena = self.first_arena;

            while !arena.is_null() {
                let next = (*arena).next;
                kernel::return_memory(arena as *mut u8, (*arena).size);
                arena = next;
            }
        }
    }
}
