//! Debug assertion macros for the queue cursors.
//!
//! Active only in debug builds, so the hot path pays nothing in release.
//! The cursor relation checked throughout is
//! `reader_tail <= writer_tail <= writer_head <= reader_tail + capacity`.

// =============================================================================
// Cursor ordering
// =============================================================================

/// Assert the full cursor relation on a snapshot.
///
/// Used in: `read()` before handing slots to the callback
macro_rules! debug_assert_cursor_order {
    ($reader_tail:expr, $writer_tail:expr, $writer_head:expr, $capacity:expr) => {
        debug_assert!(
            $reader_tail <= $writer_tail
                && $writer_tail <= $writer_head
                && $writer_head - $reader_tail <= $capacity as u64,
            "cursor order violated: reader_tail {} writer_tail {} writer_head {} capacity {}",
            $reader_tail,
            $writer_tail,
            $writer_head,
            $capacity
        )
    };
}

/// Assert that a reservation never extends past free capacity.
///
/// Used in: `reserve()` before the CAS
macro_rules! debug_assert_bounded_grant {
    ($new_head:expr, $reader_tail:expr, $capacity:expr) => {
        debug_assert!(
            $new_head - $reader_tail <= $capacity as u64,
            "reservation overruns capacity: writer_head {} reader_tail {} capacity {}",
            $new_head,
            $reader_tail,
            $capacity
        )
    };
}

// =============================================================================
// Monotonic progress
// =============================================================================

/// Assert that a cursor only moves forward.
///
/// Used in: `commit()` for `writer_tail`, `read()` for `reader_tail`
macro_rules! debug_assert_monotonic {
    ($name:literal, $old:expr, $new:expr) => {
        debug_assert!(
            $new >= $old,
            "{} decreased from {} to {}",
            $name,
            $old,
            $new
        )
    };
}

// =============================================================================
// Commit preconditions
// =============================================================================

/// Assert that a committed ticket is non-empty and stays within reserved space.
///
/// Used in: `commit()` once the ticket's turn has come
macro_rules! debug_assert_valid_commit {
    ($seq:expr, $count:expr, $writer_head:expr) => {
        debug_assert!(
            $count > 0 && $seq + $count as u64 <= $writer_head,
            "invalid commit: ticket [{}, +{}) with writer_head {}",
            $seq,
            $count,
            $writer_head
        )
    };
}

// =============================================================================
// Consumer range
// =============================================================================

/// Assert that the consumer reads only committed, unread slots.
///
/// Used in: `read()` before handing each slot to the callback
macro_rules! debug_assert_committed_read {
    ($pos:expr, $reader_tail:expr, $writer_tail:expr) => {
        debug_assert!(
            $pos >= $reader_tail && $pos < $writer_tail,
            "reading slot at seq {} outside committed range [{}, {})",
            $pos,
            $reader_tail,
            $writer_tail
        )
    };
}

pub(crate) use debug_assert_bounded_grant;
pub(crate) use debug_assert_committed_read;
pub(crate) use debug_assert_cursor_order;
pub(crate) use debug_assert_monotonic;
pub(crate) use debug_assert_valid_commit;
