use crate::Queue;
use std::fmt;
use std::ops::Range;

/// Exclusive claim on a contiguous run of logical slots, returned by
/// [`Queue::reserve`].
///
/// The producer writes into the granted slots through [`slot_mut`],
/// [`write`], [`as_mut_slices`] or [`iter_mut`], then calls [`commit`] to
/// publish them. Committing consumes the ticket, so a ticket can never be
/// committed twice.
///
/// **Important:** A ticket may grant fewer slots than requested, including
/// zero when the queue is full. Always check [`len`] before writing. An
/// empty ticket needs no commit and may simply be dropped.
///
/// Dropping a *non-empty* ticket without committing leaves a permanent gap:
/// every later commit waits on it forever. This is the price of ordered
/// publication without locks.
///
/// [`slot_mut`]: Ticket::slot_mut
/// [`write`]: Ticket::write
/// [`as_mut_slices`]: Ticket::as_mut_slices
/// [`iter_mut`]: Ticket::iter_mut
/// [`commit`]: Ticket::commit
/// [`len`]: Ticket::len
#[must_use = "a non-empty ticket must be committed, otherwise later commits wait forever"]
pub struct Ticket<'q, T> {
    pub(crate) queue: &'q Queue<T>,
    pub(crate) sequence_number: u64,
    pub(crate) count: usize,
}

impl<'q, T> Ticket<'q, T> {
    pub(crate) fn new(queue: &'q Queue<T>, sequence_number: u64, count: usize) -> Self {
        Self {
            queue,
            sequence_number,
            count,
        }
    }

    /// Logical index of the first granted slot.
    #[inline]
    pub fn sequence_number(&self) -> u64 {
        self.sequence_number
    }

    /// Number of granted slots.
    #[inline]
    pub fn len(&self) -> usize {
        self.count
    }

    /// Returns true if nothing was granted (the queue was full).
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// The granted logical range `[sequence_number, sequence_number + len)`.
    #[inline]
    pub fn range(&self) -> Range<u64> {
        self.sequence_number..self.sequence_number + self.count as u64
    }

    /// Mutable access to the slot at `offset` within this ticket.
    ///
    /// # Panics
    ///
    /// Panics if `offset >= self.len()`.
    #[inline]
    pub fn slot_mut(&mut self, offset: usize) -> &mut T {
        assert!(
            offset < self.count,
            "offset {offset} out of range for ticket of {} slots",
            self.count
        );
        // SAFETY: [sequence_number, sequence_number + count) was granted to
        // this ticket by a successful CAS on writer_head. No other producer
        // owns these slots and the consumer stops at writer_tail, which cannot
        // pass sequence_number until this ticket commits. The &mut self borrow
        // keeps the reference unique on the producer side.
        unsafe { self.queue.get(self.sequence_number + offset as u64) }
    }

    /// Overwrites the slot at `offset` with `value`.
    ///
    /// # Panics
    ///
    /// Panics if `offset >= self.len()`.
    #[inline]
    pub fn write(&mut self, offset: usize, value: T) {
        *self.slot_mut(offset) = value;
    }

    /// The granted slots as up to two contiguous slices.
    ///
    /// The second slice is non-empty only when the range wraps past the end
    /// of the backing array.
    pub fn as_mut_slices(&mut self) -> (&mut [T], &mut [T]) {
        // SAFETY: same ownership argument as `slot_mut`; the two slices cover
        // exactly the granted range and never overlap each other.
        unsafe { self.queue.slices_mut(self.sequence_number, self.count) }
    }

    /// Iterates over the granted slots in logical order.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut T> + '_ {
        let (front, back) = self.as_mut_slices();
        front.iter_mut().chain(back.iter_mut())
    }

    /// Publishes the granted slots to the consumer.
    ///
    /// Waits until every earlier ticket has committed. See [`Queue::commit`].
    pub fn commit(self) {
        let queue = self.queue;
        queue.commit(self);
    }
}

impl<T> fmt::Debug for Ticket<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Ticket")
            .field("sequence_number", &self.sequence_number)
            .field("count", &self.count)
            .finish()
    }
}
