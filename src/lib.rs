//! A user-space memory allocator built on anonymous kernel mappings.
//!
//! The heap grows in fixed 128 KiB arenas requested from the kernel and
//! never returns them while it lives. Each arena is carved into blocks; a
//! block's header precedes its payload and the blocks of one arena chain
//! into a closed cycle:
//!
//! ```text
//! +--------------------------------------------+      +------------------------------+
//! |       | +-------+   +-------+   +-------+  |      |       | +----------------+   |
//! | Arena | | Block |-->| Block |-->| Block |  | ---> | Arena | |     Block      |   |
//! |       | +-------+   +-------+   +-------+  |      |       | +----------------+   |
//! |           ^___________________________/    |      |            ^__________/      |
//! +--------------------------------------------+      +------------------------------+
//! ```
//!
//! Allocation is best-fit: the smallest free block that fits wins, an exact
//! fit wins on the spot, and the chosen block is split so only the
//! requested span is handed out. Freeing eagerly merges the block with its
//! free neighbors, so two adjacent free blocks never coexist.
//!
//! Use a [`Heap`] directly when you control who calls it:
//!
//! ```
//! use mmalloc::Heap;
//!
//! let mut heap = Heap::new();
//! let payload = heap.allocate(64).unwrap();
//!
//! unsafe {
//!     payload.as_ptr().write(42);
//!     assert_eq!(42, *payload.as_ptr());
//!     heap.free(payload);
//! }
//! ```
//!
//! Or install [`MemAlloc`], which serializes a shared heap behind a spin
//! lock, as the process allocator:
//!
//! ```
//! use mmalloc::MemAlloc;
//!
//! #[global_allocator]
//! static ALLOCATOR: MemAlloc = MemAlloc::new();
//! ```

mod arena;
mod block;
mod error;
mod heap;
mod kernel;
mod utils;

pub use error::{AllocError, Result};
pub use heap::Heap;

use std::{
    alloc::{GlobalAlloc, Layout},
    mem,
    ptr::{self, NonNull},
};

use spin::Mutex;

use crate::block::Header;

/// A [`Heap`] behind a spin lock, usable as the process allocator via
/// `#[global_allocator]`.
///
/// The heap itself is single threaded; the lock is the external
/// serialization it requires. A spin lock is used instead of
/// [`std::sync::Mutex`] because the latter may allocate on some platforms,
/// which would recurse straight back into this allocator.
///
/// Payloads are aligned to the word size and no further, so `alloc` refuses
/// layouts with a stricter alignment by returning null.
pub struct MemAlloc {
    heap: Mutex<Heap>,
}

impl MemAlloc {
    /// Creates the wrapper around an empty heap. `const` so it can sit in
    /// a `static`.
    pub const fn new() -> Self {
        Self {
            heap: Mutex::new(Heap::new()),
        }
    }
}

impl Default for MemAlloc {
    fn default() -> Self {
        Self::new()
    }
}

unsafe impl GlobalAlloc for MemAlloc {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        if layout.align() > mem::align_of::<Header>() {
            return ptr::null_mut();
        }

        match self.heap.lock().allocate(layout.size()) {
            Ok(payload) => payload.as_ptr(),
            Err(_) => ptr::null_mut(),
        }
    }

    unsafe fn dealloc(&self, ptr: *mut u8, _layout: Layout) {
        if let Some(payload) = NonNull::new(ptr) {
            unsafe { self.heap.lock().free(payload) };
        }
    }

    unsafe fn alloc_zeroed(&self, layout: Layout) -> *mut u8 {
        if layout.align() > mem::align_of::<Header>() {
            return ptr::null_mut();
        }

        match self.heap.lock().allocate_zeroed(layout.size()) {
            Ok(payload) => payload.as_ptr(),
            Err(_) => ptr::null_mut(),
        }
    }

    unsafe fn realloc(&self, ptr: *mut u8, layout: Layout, new_size: usize) -> *mut u8 {
        if layout.align() > mem::align_of::<Header>() {
            return ptr::null_mut();
        }

        let Some(payload) = NonNull::new(ptr) else {
            return ptr::null_mut();
        };

        match unsafe { self.heap.lock().reallocate(payload, new_size) } {
            Ok(moved) => moved.as_ptr(),
            Err(_) => ptr::null_mut(),
        }
    }
}
