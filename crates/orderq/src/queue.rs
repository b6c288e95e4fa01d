use crate::invariants::{
    debug_assert_bounded_grant, debug_assert_committed_read, debug_assert_cursor_order,
    debug_assert_monotonic, debug_assert_valid_commit,
};
use crate::metrics::{Metrics, MetricsSnapshot};
use crate::trace::{debug, trace};
use crate::{Backoff, Config, ConfigError, Ticket};
use crossbeam_utils::CachePadded;
use std::cell::UnsafeCell;
use std::fmt;
use std::mem;
use std::ptr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

// =============================================================================
// CURSORS & SYNCHRONIZATION
// =============================================================================
//
// Three unbounded u64 cursors split the logical index space:
//
//   [reader_tail, writer_tail)   committed, waiting for the consumer
//   [writer_tail, writer_head)   reserved, producers still writing
//   [writer_head, reader_tail + capacity)   free
//
// A logical index maps to a slot with `index & mask`. At 10 billion items per
// second a u64 cursor needs ~58 years to wrap, so plain subtraction is used.
//
// **Reserve (any producer):**
// 1. Load `writer_head` and `reader_tail` with Acquire. The Acquire on
//    `reader_tail` pairs with the consumer's Release store, so slots it has
//    finished reading may be overwritten.
// 2. CAS `writer_head` forward by the grant. Success makes the range ours.
//
// **Commit (any producer):**
// 1. Wait until `writer_tail == sequence_number` (Acquire), i.e. every earlier
//    ticket has been published.
// 2. Store `writer_tail = sequence_number + count` with Release. Only the
//    holder of the ticket at `writer_tail` can be past step 1, so a plain
//    store suffices.
//
// **Read (single consumer):**
// 1. Load `writer_tail` with Acquire (pairs with the commit Release; the
//    chain of Acquire/Release commits makes every earlier ticket's writes
//    visible too).
// 2. Hand slots in `[reader_tail, reader_tail + n)` to the callback.
// 3. Store `reader_tail + n` with Release.
//
// =============================================================================

/// Bounded lock-free multi-producer single-consumer queue.
///
/// Producers claim slots with [`reserve`](Self::reserve), write into them in
/// parallel and publish them with [`commit`](Self::commit). Commits take
/// effect strictly in reservation order, so the consumer sees one ordered
/// stream regardless of which producer finished writing first.
///
/// Storage is pre-filled with `T::default()`, so every slot always holds a
/// valid value; reading a slot never moves it out unless the consumer asks
/// to (see [`read_owned`](Self::read_owned)).
pub struct Queue<T> {
    /// Next logical index the consumer will read
    reader_tail: CachePadded<AtomicU64>,
    /// Next logical index not yet reserved
    writer_head: CachePadded<AtomicU64>,
    /// Next logical index not yet committed
    writer_tail: CachePadded<AtomicU64>,
    /// Set while a `read` is in progress
    reading: AtomicBool,
    mask: usize,
    config: Config,
    metrics: Metrics,
    storage: Box<[UnsafeCell<T>]>,
}

// SAFETY: slots are only touched by the producer holding the ticket that
// covers them or by the consumer inside `read`; the cursor protocol above
// keeps those ranges disjoint. Values cross threads, hence `T: Send`.
unsafe impl<T: Send> Sync for Queue<T> {}

/// Snapshot of the three cursors, for monitoring and tests.
///
/// Loaded in the order reader, writer tail, writer head, so
/// `reader_tail <= writer_tail <= writer_head` always holds on the snapshot.
/// `writer_head - reader_tail <= capacity` holds whenever the queue is
/// quiescent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cursors {
    /// Next logical index the consumer will read.
    pub reader_tail: u64,
    /// End of the committed prefix; everything below it is readable.
    pub writer_tail: u64,
    /// Next logical index not yet handed to a producer.
    pub writer_head: u64,
}

impl<T: Default> Queue<T> {
    /// Creates a queue with `capacity` slots.
    ///
    /// # Panics
    ///
    /// Panics unless `capacity` is a power of two greater than 1. Use
    /// [`try_new`](Self::try_new) to get the error instead.
    pub fn new(capacity: usize) -> Self {
        match Self::try_new(capacity) {
            Ok(queue) => queue,
            Err(err) => panic!("{err}"),
        }
    }

    /// Creates a queue with `capacity` slots, rejecting invalid capacities.
    pub fn try_new(capacity: usize) -> Result<Self, ConfigError> {
        Self::with_config(Config::default().with_capacity(capacity))
    }

    /// Creates a queue from a full configuration.
    pub fn with_config(config: Config) -> Result<Self, ConfigError> {
        config.validate()?;

        let storage = (0..config.capacity)
            .map(|_| UnsafeCell::new(T::default()))
            .collect::<Vec<_>>()
            .into_boxed_slice();

        debug!(
            capacity = config.capacity,
            metrics = config.enable_metrics,
            "queue created"
        );

        Ok(Self {
            reader_tail: CachePadded::new(AtomicU64::new(0)),
            writer_head: CachePadded::new(AtomicU64::new(0)),
            writer_tail: CachePadded::new(AtomicU64::new(0)),
            reading: AtomicBool::new(false),
            mask: config.mask(),
            config,
            metrics: Metrics::new(),
            storage,
        })
    }
}

impl<T> Queue<T> {
    // ---------------------------------------------------------------------
    // STORAGE & INDEXING
    // ---------------------------------------------------------------------

    /// Maps a logical index to its slot in the backing array.
    #[inline]
    pub fn physical_index(&self, logical_index: u64) -> usize {
        (logical_index as usize) & self.mask
    }

    #[inline]
    fn slot_ptr(&self, logical_index: u64) -> *mut T {
        let idx = self.physical_index(logical_index);
        // SAFETY: idx <= mask < storage.len(). The pointer is derived from the
        // whole slice so it may be extended into a run of neighbouring slots.
        unsafe { UnsafeCell::raw_get(self.storage.as_ptr().add(idx)) }
    }

    /// Mutable reference to the slot at `index`.
    ///
    /// Producers normally go through [`Ticket`]'s accessors instead.
    ///
    /// # Safety
    ///
    /// The caller must own `index`: either it lies inside an uncommitted
    /// ticket held by the caller, or the caller is the consumer and `index`
    /// lies in `[reader_tail, writer_tail)`. No other reference to the slot
    /// may be alive.
    #[inline]
    #[allow(clippy::mut_from_ref)]
    pub unsafe fn get(&self, index: u64) -> &mut T {
        &mut *self.slot_ptr(index)
    }

    /// The slots of `[seq, seq + count)` as at most two contiguous slices.
    ///
    /// # Safety
    ///
    /// Same ownership rule as [`get`](Self::get), for the whole range.
    #[allow(clippy::mut_from_ref)]
    pub(crate) unsafe fn slices_mut(&self, seq: u64, count: usize) -> (&mut [T], &mut [T]) {
        let idx = self.physical_index(seq);
        let front = count.min(self.capacity() - idx);
        (
            std::slice::from_raw_parts_mut(self.slot_ptr(seq), front),
            std::slice::from_raw_parts_mut(self.slot_ptr(seq + front as u64), count - front),
        )
    }

    // ---------------------------------------------------------------------
    // OBSERVERS
    // ---------------------------------------------------------------------

    /// Returns the fixed number of slots.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.config.capacity
    }

    /// Committed items not yet read.
    ///
    /// A snapshot: producers and the consumer may move on between the two
    /// cursor loads.
    #[inline]
    pub fn size(&self) -> usize {
        // reader first: writer_tail loaded afterwards can only be larger
        let reader = self.reader_tail.load(Ordering::Acquire);
        let writer = self.writer_tail.load(Ordering::Acquire);
        (writer - reader) as usize
    }

    /// Returns true if nothing committed is waiting for the consumer.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    /// Returns true if every slot is reserved or unread, so `reserve` would
    /// currently grant nothing.
    #[inline]
    pub fn is_full(&self) -> bool {
        let reader = self.reader_tail.load(Ordering::Acquire);
        let head = self.writer_head.load(Ordering::Acquire);
        (head - reader) as usize >= self.capacity()
    }

    /// Returns a snapshot of the three cursors.
    pub fn cursors(&self) -> Cursors {
        let reader_tail = self.reader_tail.load(Ordering::Acquire);
        let writer_tail = self.writer_tail.load(Ordering::Acquire);
        let writer_head = self.writer_head.load(Ordering::Acquire);
        Cursors {
            reader_tail,
            writer_tail,
            writer_head,
        }
    }

    /// Returns the configuration the queue was built with.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Get a snapshot of metrics if enabled.
    pub fn metrics(&self) -> MetricsSnapshot {
        if self.config.enable_metrics {
            self.metrics.snapshot()
        } else {
            MetricsSnapshot::default()
        }
    }

    // ---------------------------------------------------------------------
    // PRODUCER API
    // ---------------------------------------------------------------------

    /// Reserves up to `count` contiguous logical slots.
    ///
    /// The ticket grants `min(count, free slots)`; zero means the queue is
    /// full (backpressure, not an error). Lock-free: a failed CAS only means
    /// another producer got its reservation in first.
    pub fn reserve(&self, count: usize) -> Ticket<'_, T> {
        if count == 0 {
            return Ticket::new(self, self.writer_head.load(Ordering::Acquire), 0);
        }

        self.reserve_from(self.writer_head.load(Ordering::Acquire), count)
    }

    /// CAS loop of [`reserve`](Self::reserve), starting from a previously
    /// loaded `head`. The snapshot may be arbitrarily old.
    fn reserve_from(&self, mut head: u64, count: usize) -> Ticket<'_, T> {
        let capacity = self.capacity() as u64;
        let mut retries = 0u64;

        let ticket = loop {
            let reader = self.reader_tail.load(Ordering::Acquire);
            if reader > head {
                // Stale head: the consumer passed it after we loaded it.
                head = self.writer_head.load(Ordering::Acquire);
                continue;
            }

            let used = head - reader;
            if used >= capacity {
                if self.config.enable_metrics {
                    self.metrics.add_full_rejection();
                }
                trace!(writer_head = head, reader_tail = reader, "queue full");
                break Ticket::new(self, head, 0);
            }

            let grant = (capacity - used).min(count as u64);
            let new_head = head + grant;
            debug_assert_bounded_grant!(new_head, reader, self.capacity());

            match self.writer_head.compare_exchange_weak(
                head,
                new_head,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => {
                    if self.config.enable_metrics {
                        self.metrics.add_reservation(grant);
                    }
                    break Ticket::new(self, head, grant as usize);
                }
                Err(actual) => {
                    head = actual;
                    retries += 1;
                }
            }
        };

        if self.config.enable_metrics && retries > 0 {
            self.metrics.add_reserve_retries(retries);
        }
        ticket
    }

    /// Reserve with adaptive backoff. Spins, yields, then gives up.
    ///
    /// Returns `None` if the queue stayed full for the whole backoff or if
    /// `count` is zero.
    pub fn reserve_with_backoff(&self, count: usize) -> Option<Ticket<'_, T>> {
        if count == 0 {
            return None;
        }
        let mut backoff = Backoff::new();
        loop {
            let ticket = self.reserve(count);
            if !ticket.is_empty() {
                return Some(ticket);
            }
            if backoff.is_completed() {
                return None;
            }
            backoff.snooze();
        }
    }

    /// Publishes a ticket's slots to the consumer.
    ///
    /// Waits (spin, then yield) until every ticket with a smaller sequence
    /// number has committed, then advances `writer_tail` past this one. If a
    /// producer never commits an earlier ticket, this never returns.
    ///
    /// # Panics
    ///
    /// Panics if the ticket was issued by a different queue. Committing an
    /// empty ticket is a contract violation caught by a debug assertion; in
    /// release builds it does nothing.
    pub fn commit(&self, ticket: Ticket<'_, T>) {
        assert!(
            ptr::eq(ticket.queue, self),
            "ticket committed to a queue that did not issue it"
        );
        let seq = ticket.sequence_number;
        let count = ticket.count;
        debug_assert!(count > 0, "commit of an empty ticket at seq {seq}");
        if count == 0 {
            return;
        }

        let mut backoff = Backoff::new();
        let mut waits = 0u64;
        loop {
            let tail = self.writer_tail.load(Ordering::Acquire);
            if tail == seq {
                break;
            }
            debug_assert!(tail < seq, "ticket at seq {seq} already passed by writer_tail {tail}");
            backoff.snooze();
            waits += 1;
        }

        let new_tail = seq + count as u64;
        debug_assert_valid_commit!(seq, count, self.writer_head.load(Ordering::Relaxed));
        debug_assert_monotonic!("writer_tail", seq, new_tail);

        self.writer_tail.store(new_tail, Ordering::Release);

        if waits > 0 {
            trace!(seq, count, waits, "commit waited on earlier tickets");
        }
        if self.config.enable_metrics {
            self.metrics.add_committed(count as u64, waits);
        }
    }

    /// Enqueue a single item (convenience).
    ///
    /// Returns the item back if the queue is full.
    pub fn push(&self, item: T) -> Result<(), T> {
        let mut ticket = self.reserve(1);
        if ticket.is_empty() {
            return Err(item);
        }
        ticket.write(0, item);
        ticket.commit();
        Ok(())
    }

    /// Batch enqueue (convenience). Clones as many leading items as fit.
    ///
    /// Returns the number of items enqueued.
    pub fn send(&self, items: &[T]) -> usize
    where
        T: Clone,
    {
        if items.is_empty() {
            return 0;
        }
        let mut ticket = self.reserve(items.len());
        let n = ticket.len();
        if n == 0 {
            return 0;
        }
        for (slot, item) in ticket.iter_mut().zip(items) {
            slot.clone_from(item);
        }
        ticket.commit();
        n
    }

    // ---------------------------------------------------------------------
    // CONSUMER API
    // ---------------------------------------------------------------------

    /// Hands up to `max_count` committed items to `consume`, oldest first.
    ///
    /// Returns the number of items read; zero if nothing was committed. The
    /// queue has a single consumer: a `read` overlapping another `read` (from
    /// another thread or from inside `consume`) panics.
    ///
    /// A panic in `consume` propagates. `reader_tail` is then left where it
    /// was, so the same items are offered again by the next `read`.
    pub fn read<F>(&self, max_count: usize, mut consume: F) -> usize
    where
        F: FnMut(&mut T),
    {
        let _reader = ReaderGuard::acquire(&self.reading);

        let reader_tail = self.reader_tail.load(Ordering::Relaxed);
        let writer_tail = self.writer_tail.load(Ordering::Acquire);
        debug_assert_cursor_order!(
            reader_tail,
            writer_tail,
            self.writer_head.load(Ordering::Acquire),
            self.capacity()
        );

        let n = (writer_tail - reader_tail).min(max_count as u64);
        let end = reader_tail + n;

        for pos in reader_tail..end {
            debug_assert_committed_read!(pos, reader_tail, writer_tail);
            // SAFETY: pos is in [reader_tail, writer_tail): committed, so no
            // producer holds it, and the reading flag rules out another reader.
            let slot = unsafe { &mut *self.slot_ptr(pos) };
            consume(slot);
        }

        if n > 0 {
            debug_assert_monotonic!("reader_tail", reader_tail, end);
            self.reader_tail.store(end, Ordering::Release);
        }

        if self.config.enable_metrics {
            self.metrics.add_read(n);
        }

        n as usize
    }

    /// Reads everything committed so far.
    pub fn read_all<F>(&self, consume: F) -> usize
    where
        F: FnMut(&mut T),
    {
        self.read(usize::MAX, consume)
    }

    /// Like [`read`](Self::read), but moves each item out of its slot,
    /// leaving `T::default()` behind.
    pub fn read_owned<F>(&self, max_count: usize, mut consume: F) -> usize
    where
        T: Default,
        F: FnMut(T),
    {
        self.read(max_count, |slot| consume(mem::take(slot)))
    }
}

impl<T> fmt::Debug for Queue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Queue")
            .field("capacity", &self.capacity())
            .field("cursors", &self.cursors())
            .finish_non_exhaustive()
    }
}

/// Marks a `read` in progress; released on drop, including during unwinding.
struct ReaderGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> ReaderGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Self {
        let busy = flag.swap(true, Ordering::Acquire);
        assert!(!busy, "concurrent read: the queue supports a single consumer");
        Self { flag }
    }
}

impl Drop for ReaderGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::panic::{self, AssertUnwindSafe};
    use std::sync::{Arc, Barrier};
    use std::thread;

    fn drain(queue: &Queue<u64>) -> Vec<u64> {
        let mut out = Vec::new();
        queue.read_all(|v| out.push(*v));
        out
    }

    #[test]
    fn test_queue_basic_reserve_commit() {
        let queue = Queue::<u64>::new(16);

        let mut ticket = queue.reserve(4);
        assert_eq!(ticket.len(), 4);
        for (i, slot) in ticket.iter_mut().enumerate() {
            *slot = (i as u64 + 1) * 100;
        }
        ticket.commit();

        assert_eq!(queue.size(), 4);
        assert_eq!(drain(&queue), vec![100, 200, 300, 400]);
        assert!(queue.is_empty());
    }

    #[test]
    #[should_panic(expected = "power of two")]
    fn test_new_rejects_non_power_of_two() {
        let _ = Queue::<u64>::new(6);
    }

    #[test]
    #[should_panic(expected = "greater than 1")]
    fn test_new_rejects_single_slot() {
        let _ = Queue::<u64>::new(1);
    }

    #[test]
    fn test_try_new_reports_error() {
        assert_eq!(
            Queue::<u64>::try_new(12).unwrap_err(),
            ConfigError::CapacityNotPowerOfTwo { capacity: 12 }
        );
        assert!(Queue::<u64>::try_new(2).is_ok());
    }

    #[test]
    fn test_physical_index_wraps() {
        let queue = Queue::<u64>::new(8);
        assert_eq!(queue.physical_index(0), 0);
        assert_eq!(queue.physical_index(7), 7);
        assert_eq!(queue.physical_index(8), 0);
        assert_eq!(queue.physical_index(21), 5);
    }

    #[test]
    fn test_empty_read_returns_zero() {
        let queue = Queue::<u64>::new(8);
        for n in [1, 8, 100] {
            assert_eq!(queue.read(n, |_| panic!("nothing to read")), 0);
        }
    }

    #[test]
    fn test_full_queue_rejects_reservation() {
        let queue = Queue::<u64>::new(8);
        queue.reserve(8).commit();
        assert!(queue.is_full());

        let ticket = queue.reserve(1);
        assert!(ticket.is_empty());
        assert_eq!(ticket.sequence_number(), 8);
        assert_eq!(queue.push(7), Err(7));
    }

    #[test]
    fn test_partial_reservation() {
        let queue = Queue::<u64>::new(8);
        queue.reserve(2).commit();

        let ticket = queue.reserve(10);
        assert_eq!(ticket.sequence_number(), 2);
        assert_eq!(ticket.len(), 6);
        ticket.commit();
        assert_eq!(queue.size(), 8);
    }

    #[test]
    fn test_reserved_but_uncommitted_is_invisible() {
        let queue = Queue::<u64>::new(8);
        let mut ticket = queue.reserve(2);
        ticket.write(0, 1);
        ticket.write(1, 2);

        assert_eq!(queue.size(), 0);
        assert_eq!(queue.read(8, |_| {}), 0);
        assert_eq!(
            queue.cursors(),
            Cursors {
                reader_tail: 0,
                writer_tail: 0,
                writer_head: 2
            }
        );

        ticket.commit();
        assert_eq!(drain(&queue), vec![1, 2]);
    }

    #[test]
    fn test_read_respects_max_count() {
        let queue = Queue::<u64>::new(16);
        assert_eq!(queue.send(&[1, 2, 3, 4, 5]), 5);

        let mut seen = Vec::new();
        assert_eq!(queue.read(2, |v| seen.push(*v)), 2);
        assert_eq!(queue.read(2, |v| seen.push(*v)), 2);
        assert_eq!(queue.read(2, |v| seen.push(*v)), 1);
        assert_eq!(seen, vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_wrap_around_many_rounds() {
        let queue = Queue::<u64>::new(4);
        let mut next = 0u64;
        let mut expected = 0u64;
        for _ in 0..50 {
            let mut ticket = queue.reserve(3);
            for slot in ticket.iter_mut() {
                *slot = next;
                next += 1;
            }
            ticket.commit();
            queue.read_all(|v| {
                assert_eq!(*v, expected);
                expected += 1;
            });
        }
        assert_eq!(expected, 150);
        assert_eq!(queue.cursors().reader_tail, 150);
    }

    #[test]
    fn test_send_fills_only_free_space() {
        let queue = Queue::<u64>::new(4);
        assert_eq!(queue.send(&[1, 2, 3]), 3);
        assert_eq!(queue.send(&[4, 5, 6]), 1);
        assert_eq!(queue.send(&[7]), 0);
        assert_eq!(queue.send(&[]), 0);
        assert_eq!(drain(&queue), vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_read_owned_moves_items_out() {
        let queue = Queue::<String>::new(4);
        assert!(queue.push("a".to_string()).is_ok());
        assert!(queue.push("b".to_string()).is_ok());

        let mut out = Vec::new();
        assert_eq!(queue.read_owned(4, |s| out.push(s)), 2);
        assert_eq!(out, vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn test_reserve_with_backoff_gives_up_when_full() {
        let queue = Queue::<u64>::new(2);
        queue.reserve(2).commit();
        assert!(queue.reserve_with_backoff(1).is_none());
        assert!(queue.reserve_with_backoff(0).is_none());

        queue.read(1, |_| {});
        let ticket = queue.reserve_with_backoff(1).expect("one slot free");
        assert_eq!(ticket.len(), 1);
        ticket.commit();
    }

    #[test]
    fn test_zero_count_reserve_grants_nothing() {
        let queue = Queue::<u64>::new(4);
        let ticket = queue.reserve(0);
        assert!(ticket.is_empty());
        assert_eq!(queue.cursors().writer_head, 0);
    }

    #[test]
    fn test_reserve_from_head_behind_reader_reloads() {
        let queue = Queue::<u64>::new(4);
        assert_eq!(queue.send(&[1, 2, 3]), 3);
        assert_eq!(queue.read_all(|_| {}), 3);

        // A head loaded before the consumer drained is now behind reader_tail
        let ticket = queue.reserve_from(0, 2);
        assert_eq!(ticket.sequence_number(), 3);
        assert_eq!(ticket.len(), 2);
        ticket.commit();

        let cursors = queue.cursors();
        assert_eq!(cursors.writer_head, 5);
        assert_eq!(cursors.writer_tail, 5);
        assert_eq!(cursors.reader_tail, 3);
    }

    #[test]
    fn test_reserve_from_stale_head_grants_free_space() {
        let queue = Queue::<u64>::with_config(Config::new(4, true)).unwrap();
        for round in 0..3u64 {
            assert!(queue.push(round).is_ok());
            assert_eq!(queue.read_all(|_| {}), 1);
        }

        // Queue is empty at 3; a stale head of 1 must not be taken as full
        let mut ticket = queue.reserve_from(1, 8);
        assert_eq!(ticket.range(), 3..7);
        for (i, slot) in ticket.iter_mut().enumerate() {
            *slot = 10 + i as u64;
        }
        ticket.commit();

        let mut seen = Vec::new();
        queue.read_all(|v| seen.push(*v));
        assert_eq!(seen, vec![10, 11, 12, 13]);
        assert_eq!(queue.metrics().full_rejections, 0);
    }

    #[test]
    fn test_out_of_order_commit_waits_for_earlier_ticket() {
        let queue = Arc::new(Queue::<u64>::new(8));
        let mut first = queue.reserve(2);
        let second_seq = {
            let q = Arc::clone(&queue);
            let handle = thread::spawn(move || {
                let mut second = q.reserve(2);
                let seq = second.sequence_number();
                second.write(0, 3);
                second.write(1, 4);
                second.commit();
                seq
            });

            // The second commit cannot complete before the first.
            thread::sleep(std::time::Duration::from_millis(20));
            assert_eq!(queue.size(), 0);

            first.write(0, 1);
            first.write(1, 2);
            first.commit();
            handle.join().unwrap()
        };

        assert_eq!(second_seq, 2);
        assert_eq!(drain(&queue), vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_two_producers_race_for_capacity_four() {
        let queue = Arc::new(Queue::<u64>::new(4));
        let barrier = Arc::new(Barrier::new(2));

        let handles: Vec<_> = (0..2)
            .map(|_| {
                let q = Arc::clone(&queue);
                let b = Arc::clone(&barrier);
                thread::spawn(move || {
                    b.wait();
                    let mut ticket = q.reserve(3);
                    let grant = (ticket.sequence_number(), ticket.len());
                    let seq = ticket.sequence_number();
                    for (i, slot) in ticket.iter_mut().enumerate() {
                        *slot = seq + i as u64;
                    }
                    ticket.commit();
                    grant
                })
            })
            .collect();

        let mut grants: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        grants.sort_unstable();
        assert_eq!(grants, vec![(0, 3), (3, 1)]);

        let mut seen = Vec::new();
        assert_eq!(queue.read(4, |v| seen.push(*v)), 4);
        assert_eq!(seen, vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_panicking_consumer_leaves_items_unread() {
        let queue = Queue::<u64>::new(8);
        queue.send(&[1, 2, 3]);

        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            queue.read(3, |v| {
                if *v == 2 {
                    panic!("consumer failed");
                }
            })
        }));
        assert!(result.is_err());
        assert_eq!(queue.size(), 3);

        // The reader flag was released, so reading works again.
        assert_eq!(drain(&queue), vec![1, 2, 3]);
    }

    #[test]
    #[should_panic(expected = "single consumer")]
    fn test_nested_read_panics() {
        let queue = Queue::<u64>::new(8);
        queue.send(&[1]);
        queue.read(1, |_| {
            queue.read(1, |_| {});
        });
    }

    #[test]
    #[should_panic(expected = "did not issue it")]
    fn test_commit_foreign_ticket_panics() {
        let a = Queue::<u64>::new(4);
        let b = Queue::<u64>::new(4);
        let ticket = a.reserve(1);
        b.commit(ticket);
    }

    #[test]
    fn test_metrics_disabled_by_default() {
        let queue = Queue::<u64>::new(4);
        queue.send(&[1, 2]);
        queue.read_all(|_| {});
        assert_eq!(queue.metrics(), MetricsSnapshot::default());
    }

    #[test]
    fn test_metrics_track_operations() {
        let queue = Queue::<u64>::with_config(Config::new(4, true)).unwrap();
        queue.send(&[1, 2, 3]);
        let partial = queue.reserve(2);
        assert_eq!(partial.len(), 1);
        partial.commit();
        assert!(queue.reserve(1).is_empty());
        queue.read(2, |_| {});
        queue.read(2, |_| {});
        queue.read(2, |_| {});

        let m = queue.metrics();
        assert_eq!(m.reservations, 2);
        assert_eq!(m.items_reserved, 4);
        assert_eq!(m.full_rejections, 1);
        assert_eq!(m.items_committed, 4);
        assert_eq!(m.commit_waits, 0);
        assert_eq!(m.items_read, 4);
        assert_eq!(m.empty_reads, 1);
        assert_eq!(m.backlog(), 0);
    }

    #[test]
    fn test_debug_output() {
        let queue = Queue::<u64>::new(4);
        let text = format!("{queue:?}");
        assert!(text.contains("capacity: 4"));
        assert!(text.contains("reader_tail: 0"));
    }
}
