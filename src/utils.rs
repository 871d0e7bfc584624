//! Helper functions for the allocator. These don't particularly belong to
//! any concrete module of the program.

/// It aligns `to_be_aligned` using `alignment`, rounding up.
///
/// This is used in two places: arena sizes are rounded to a multiple of
/// [`crate::arena::GRANULE`] before asking the kernel for memory, and
/// requested payload sizes are rounded to the computer's word size so that
/// every [`crate::block::Header`] lands on a naturally aligned address.
///
/// `alignment` must be a power of two. A value that is already a multiple
/// of `alignment` is returned unchanged.
pub(crate) fn align(to_be_aligned: usize, alignment: usize) -> usize {
    (to_be_aligned + alignment - 1) & !(alignment - 1)
}
