//! Error types for the allocator.

use thiserror::Error;

/// Errors that can occur when requesting memory from a [`crate::Heap`].
///
/// Every failure is terminal for the call that produced it; the allocator
/// never retries and a failed call never modifies heap state that a later
/// call could observe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AllocError {
    /// The caller asked for zero bytes. Defined, non-fatal failure.
    #[error("cannot allocate zero bytes")]
    ZeroSize,

    /// The kernel could not supply a new mapping for an arena of the
    /// given size.
    #[error("kernel refused a mapping for {requested} bytes")]
    OutOfMemory {
        /// Bytes of payload the caller requested.
        requested: usize,
    },
}

/// Result type for allocator operations.
pub type Result<T> = std::result::Result<T, AllocError>;
