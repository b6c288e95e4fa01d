//! orderq - Bounded Lock-Free Multi-Producer Single-Consumer Queue
//!
//! Many producers share one power-of-two ring. Each producer claims a
//! contiguous run of slots with a CAS on a shared head cursor, writes into
//! it with no coordination, then commits. Commits are applied strictly in the
//! order slots were reserved, so the single consumer reads one ordered
//! stream even though producers finished writing in any order.
//!
//! # Key Features
//!
//! - Lock-free reservation (one CAS per successful `reserve`)
//! - Parallel writes into disjoint slots, ordered publication on commit
//! - Partial grants and zero-count tickets as backpressure, never errors
//! - Batch consumption with a single cursor update per `read`
//! - Cache-padded cursors, optional metrics, optional `tracing` events
//!
//! # Example
//!
//! ```
//! use orderq::Queue;
//!
//! let queue = Queue::<u64>::new(1024);
//!
//! // Simple API: push() for single items
//! queue.push(42).unwrap();
//!
//! // Two-phase API: reserve, write, commit
//! let mut ticket = queue.reserve(3);
//! for (i, slot) in ticket.iter_mut().enumerate() {
//!     *slot = 100 + i as u64;
//! }
//! ticket.commit();
//!
//! // Batch consume
//! let mut received = Vec::new();
//! let n = queue.read(16, |item| received.push(*item));
//! assert_eq!(n, 4);
//! assert_eq!(received, vec![42, 100, 101, 102]);
//! ```
//!
//! # Limitations
//!
//! A producer that reserves slots and never commits them blocks every later
//! commit forever. There is no timeout; callers that need one must keep
//! their critical section between `reserve` and `commit` short and
//! infallible.

mod backoff;
mod config;
mod error;
mod invariants;
mod metrics;
mod queue;
mod ticket;
mod trace;

pub use backoff::Backoff;
pub use config::{Config, HIGH_THROUGHPUT_CONFIG, LOW_LATENCY_CONFIG};
pub use error::ConfigError;
pub use metrics::MetricsSnapshot;
pub use queue::{Cursors, Queue};
pub use ticket::Ticket;
pub use trace::init_tracing;
