//! Error types for queue construction.

use thiserror::Error;

/// Errors returned when a queue configuration is rejected.
///
/// Construction is the only fallible operation. A full queue on `reserve`
/// or an empty queue on `read` is reported as a zero count, and contract
/// violations (double commit, concurrent reads) are assertions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// Capacity must hold at least two slots.
    #[error("capacity must be greater than 1 (got {capacity})")]
    CapacityTooSmall {
        /// The rejected capacity.
        capacity: usize,
    },
    /// Capacity must be a power of two so indices can wrap with a mask.
    #[error("capacity must be a power of two (got {capacity})")]
    CapacityNotPowerOfTwo {
        /// The rejected capacity.
        capacity: usize,
    },
}
