use orderq::{Config, Queue};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// A record tagged with the producer that wrote it.
#[derive(Debug, Clone, Copy, Default)]
struct Record {
    producer: usize,
    value: u64,
}

fn main() {
    println!("orderq Ordered Commit Example");
    println!("=============================\n");

    let config = Config::new(
        1 << 12, // 4K slots
        true,    // metrics on, to show commit waits
    );
    let queue = Arc::new(Queue::<Record>::with_config(config).expect("valid config"));

    const N_PRODUCERS: usize = 4;
    const BATCHES: usize = 2_000;
    const BATCH_SIZE: usize = 32;

    println!("Configuration:");
    println!("  Capacity: {} slots", queue.capacity());
    println!("  Producers: {N_PRODUCERS}");
    println!("  Batches per producer: {BATCHES}");
    println!("  Batch size: {BATCH_SIZE}");
    println!("  Total items: {}\n", N_PRODUCERS * BATCHES * BATCH_SIZE);

    let start = Instant::now();

    let handles: Vec<_> = (0..N_PRODUCERS)
        .map(|producer| {
            let q = Arc::clone(&queue);
            thread::spawn(move || {
                let mut sent = 0u64;
                for batch in 0..BATCHES {
                    let mut batch_sent = 0;
                    while batch_sent < BATCH_SIZE {
                        let mut ticket = q.reserve(BATCH_SIZE - batch_sent);
                        if ticket.is_empty() {
                            thread::yield_now();
                            continue;
                        }
                        for slot in ticket.iter_mut() {
                            *slot = Record { producer, value: sent };
                            sent += 1;
                        }
                        // Producer 0 is slow now and then: later tickets finish
                        // writing first but still publish after it.
                        if producer == 0 && batch % 500 == 0 {
                            thread::sleep(Duration::from_micros(200));
                        }
                        batch_sent += ticket.len();
                        ticket.commit();
                    }
                }
            })
        })
        .collect();

    // Single consumer: per-producer values must arrive in send order
    let total = N_PRODUCERS * BATCHES * BATCH_SIZE;
    let mut next = [0u64; N_PRODUCERS];
    let mut received = 0;
    while received < total {
        let n = queue.read(256, |r| {
            assert_eq!(r.value, next[r.producer], "FIFO violation for producer {}", r.producer);
            next[r.producer] += 1;
        });
        if n == 0 {
            thread::yield_now();
        }
        received += n;
    }

    for h in handles {
        h.join().unwrap();
    }

    let elapsed = start.elapsed();
    let m = queue.metrics();
    println!("Received {received} items in {elapsed:?}");
    println!("Commit waits on earlier tickets: {}", m.commit_waits);
    println!("Reserve CAS retries: {}", m.reserve_retries);
    println!("Full-queue rejections: {}", m.full_rejections);
}
