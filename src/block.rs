use std::{mem, ptr};

/// Overhead in bytes introduced by a block [`Header`].
pub(crate) const HEADER_SIZE: usize = mem::size_of::<Header>();

/// Metadata of a single block. The header precedes the payload it describes
/// and the next block's header starts right after that payload, so an arena
/// is wall to wall headers and payloads with no gaps in between:
///
/// ```text
/// +--------+----------------------+--------+-----------+
/// | Header | DDD used DD ..free.. | Header | ......... |
/// +--------+----------------------+--------+-----------+
///          |--- asize ---|
///          |------ size ----------|
/// ```
///
/// `size` is the payload capacity, `asize` is what the caller actually asked
/// for. `asize == 0` marks the block free.
///
/// Blocks of one arena form a closed cycle through `next`: following the
/// links from any block visits every block of that arena exactly once and
/// comes back around. A brand new arena holds a single block whose `next`
/// points to itself. There is no link between blocks of different arenas.
#[repr(C)]
pub(crate) struct Header {
    /// Next block in this arena's cycle.
    pub next: *mut Header,
    /// Payload capacity in bytes.
    pub size: usize,
    /// Bytes requested by the caller. `0` means the block is free.
    pub asize: usize,
}

impl Header {
    /// Whether the block is currently free.
    #[inline]
    pub fn is_free(&self) -> bool {
        self.asize == 0
    }

    /// Address of the payload: the byte right after the header.
    #[inline]
    pub unsafe fn payload(header: *mut Header) -> *mut u8 {
        unsafe { (header as *mut u8).add(HEADER_SIZE) }
    }

    /// Recovers the header from a payload address previously produced by
    /// [`Header::payload`].
    #[inline]
    pub unsafe fn from_payload(payload: *mut u8) -> *mut Header {
        unsafe { payload.sub(HEADER_SIZE) as *mut Header }
    }

    /// Writes a free block header at `header`: payload capacity set to
    /// `size`, `asize` zeroed, link cleared. The caller splices the block
    /// into a cycle afterwards.
    ///
    /// `size` must be greater than zero; a header describing an empty
    /// payload is never valid.
    pub unsafe fn init(header: *mut Header, size: usize) {
        debug_assert!(size > 0, "block with empty payload");

        unsafe {
            (*header).size = size;
            (*header).asize = 0;
            (*header).next = ptr::null_mut();
        }
    }

    /// Checks if carving `size` bytes out of this free block would leave
    /// strictly positive payload for a second block, i.e. whether
    /// [`Header::split`] will actually split.
    ///
    /// The comparison is written addition-first so an exact fit
    /// (`size == (*header).size`) cannot underflow. No minimum is enforced
    /// on the leftover beyond "strictly positive", so very small fragments
    /// are possible.
    pub unsafe fn should_split(header: *mut Header, size: usize) -> bool {
        debug_assert!(size > 0);

        unsafe { (*header).size > size + HEADER_SIZE }
    }

    /// Splits one block in two.
    ///
    /// ```text
    /// Before:          |---------- size ----------|
    ///
    ///     -----+--------+--------------------------+-----
    ///      ... | Header | ........................ |
    ///     -----+--------+--------------------------+-----
    ///              \------next--------------------------^
    ///
    /// After:           |- size' -|
    ///
    ///     -----+--------+---------+--------+-------+-----
    ///      ... | Header | ....... | Header | ..... |
    ///     -----+--------+---------+--------+-------+-----
    ///              \------next-----^  \------next-------^
    /// ```
    ///
    /// If [`Header::should_split`] says no, the block is returned unchanged
    /// and the whole of it becomes the allocation. Otherwise a new free
    /// block is written right after the first `size` payload bytes, spliced
    /// into the cycle after `header`, and `header` shrinks to `size`.
    /// Returns the new (right) block, or `header` itself when no split
    /// happened.
    pub unsafe fn split(header: *mut Header, size: usize) -> *mut Header {
        unsafe {
            if !Header::should_split(header, size) {
                return header;
            }

            let right = Header::payload(header).add(size) as *mut Header;

            Header::init(right, (*header).size - HEADER_SIZE - size);
            (*right).next = (*header).next;
            (*header).next = right;
            (*header).size = size;

            right
        }
    }

    /// Detects if two blocks can become one: `right` must be `left`'s
    /// successor in the cycle, a distinct block at a higher address, and
    /// both must be free.
    ///
    /// The address check is what keeps a merge from crossing the cycle's
    /// wrap-around edge, where the last block links back to the first,
    /// lower-addressed one.
    pub unsafe fn can_merge(left: *mut Header, right: *mut Header) -> bool {
        unsafe {
            (*left).next == right
                && left != right
                && (left as usize) < (right as usize)
                && (*left).is_free()
                && (*right).is_free()
        }
    }

    /// Merges two adjacent free blocks. `left` absorbs `right`'s header and
    /// payload; `right`'s link is cleared and its header must never be
    /// traversed again.
    pub unsafe fn merge(left: *mut Header, right: *mut Header) {
        unsafe {
            debug_assert!(Header::can_merge(left, right));

            (*left).size += HEADER_SIZE + (*right).size;
            (*left).next = (*right).next;
            (*right).next = ptr::null_mut();
        }
    }

    /// Finds the predecessor of `header` in its cycle: the block whose link
    /// points at it. Returns `header` itself for a self-linked singleton.
    ///
    /// Links are forward-only, so this walks the whole cycle in the worst
    /// case. Starting from `header` itself (rather than from the arena's
    /// first block) gives the same O(blocks) cost without needing to know
    /// which arena the block lives in.
    pub unsafe fn prev(header: *mut Header) -> *mut Header {
        unsafe {
            let mut current = header;

            while (*current).next != header {
                current = (*current).next;
            }

            current
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Word-aligned scratch space big enough for a handful of blocks.
    fn scratch() -> Vec<usize> {
        vec![0usize; 1024]
    }

    /// Writes a self-linked free block covering `size` payload bytes at the
    /// start of `buf`, the way a fresh arena does.
    unsafe fn singleton(buf: &mut [usize], size: usize) -> *mut Header {
        let header = buf.as_mut_ptr() as *mut Header;
        unsafe {
            Header::init(header, size);
            (*header).next = header;
        }
        header
    }

    #[test]
    fn init_marks_block_free() {
        let mut buf = scratch();
        let header = buf.as_mut_ptr() as *mut Header;

        unsafe {
            Header::init(header, 256);

            assert_eq!(256, (*header).size);
            assert_eq!(0, (*header).asize);
            assert!((*header).next.is_null());
            assert!((*header).is_free());
        }
    }

    #[test]
    fn payload_round_trips_to_header() {
        let mut buf = scratch();
        let header = buf.as_mut_ptr() as *mut Header;

        unsafe {
            let payload = Header::payload(header);

            assert_eq!(HEADER_SIZE, payload as usize - header as usize);
            assert_eq!(header, Header::from_payload(payload));
        }
    }

    #[test]
    fn exact_fit_does_not_split() {
        let mut buf = scratch();

        unsafe {
            let header = singleton(&mut buf, 256);

            assert!(!Header::should_split(header, 256));

            let right = Header::split(header, 256);

            // No remainder: same block, same size, cycle untouched.
            assert_eq!(header, right);
            assert_eq!(256, (*header).size);
            assert_eq!(header, (*header).next);
        }
    }

    #[test]
    fn no_zero_fragment_at_the_boundary() {
        let mut buf = scratch();

        unsafe {
            // Leftover would be exactly zero: must not split.
            let header = singleton(&mut buf, 256 + HEADER_SIZE);
            assert!(!Header::should_split(header, 256));

            // One byte of leftover payload is enough.
            let header = singleton(&mut buf, 256 + HEADER_SIZE + 1);
            assert!(Header::should_split(header, 256));
        }
    }

    #[test]
    fn split_carves_the_right_block() {
        let mut buf = scratch();

        unsafe {
            let header = singleton(&mut buf, 1024);
            let right = Header::split(header, 256);

            assert_ne!(header, right);

            // The right header starts right after the left payload.
            assert_eq!(Header::payload(header).add(256) as *mut Header, right);

            assert_eq!(256, (*header).size);
            assert_eq!(1024 - 256 - HEADER_SIZE, (*right).size);
            assert!((*right).is_free());

            // Cycle: header -> right -> header.
            assert_eq!(right, (*header).next);
            assert_eq!(header, (*right).next);
        }
    }

    #[test]
    fn merge_undoes_split() {
        let mut buf = scratch();

        unsafe {
            let header = singleton(&mut buf, 1024);
            let right = Header::split(header, 256);

            assert!(Header::can_merge(header, right));
            Header::merge(header, right);

            assert_eq!(1024, (*header).size);
            assert_eq!(header, (*header).next);
            assert!((*right).next.is_null());
        }
    }

    #[test]
    fn merge_refused_across_the_wrap_around_edge() {
        let mut buf = scratch();

        unsafe {
            let header = singleton(&mut buf, 1024);
            let right = Header::split(header, 256);

            // right -> header crosses from the high address back to the
            // low one; both free, still not mergeable.
            assert!((*right).is_free() && (*header).is_free());
            assert!(!Header::can_merge(right, header));
        }
    }

    #[test]
    fn merge_refused_when_either_side_is_used() {
        let mut buf = scratch();

        unsafe {
            let header = singleton(&mut buf, 1024);
            let right = Header::split(header, 256);

            (*header).asize = 100;
            assert!(!Header::can_merge(header, right));

            (*header).asize = 0;
            (*right).asize = 1;
            assert!(!Header::can_merge(header, right));
        }
    }

    #[test]
    fn prev_walks_the_cycle() {
        let mut buf = scratch();

        unsafe {
            let first = singleton(&mut buf, 2048);
            let second = Header::split(first, 256);
            let third = Header::split(second, 256);

            assert_eq!(second, Header::prev(third));
            assert_eq!(first, Header::prev(second));
            assert_eq!(third, Header::prev(first));
        }
    }

    #[test]
    fn prev_of_a_singleton_is_itself() {
        let mut buf = scratch();

        unsafe {
            let header = singleton(&mut buf, 256);
            assert_eq!(header, Header::prev(header));
        }
    }
}
