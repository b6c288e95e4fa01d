//! Throughput driver: one reader and 1..=3 writers hammering a single queue.
//!
//! Each writer makes a fixed number of `reserve(16)` attempts, the reader the
//! same number of `read(32)` attempts. A monitor thread prints occupancy
//! every 200ms. Set `ORDERQ_ITERATIONS` to change the attempt count,
//! `ORDERQ_METRICS=1` to print queue counters, and build with
//! `--features affinity` to pin threads to CPUs (Linux).

use orderq::{Queue, HIGH_THROUGHPUT_CONFIG};
use std::hint::black_box;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

const DEFAULT_ITERATIONS: u64 = 20_000_000;
const RESERVE_BATCH: usize = 16;
const READ_BATCH: usize = 32;
const MONITOR_INTERVAL: Duration = Duration::from_millis(200);

#[derive(Default)]
struct Totals {
    writes: AtomicU64,
    failed_writes: AtomicU64,
    reads: AtomicU64,
    failed_reads: AtomicU64,
}

#[cfg(all(feature = "affinity", target_os = "linux"))]
fn pin_to_cpu(cpu: usize) {
    // SAFETY: cpu_set_t is plain data; sched_setaffinity only reads `set`.
    let rc = unsafe {
        use libc::{cpu_set_t, sched_setaffinity, CPU_SET, CPU_ZERO};
        let mut set = std::mem::zeroed::<cpu_set_t>();
        CPU_ZERO(&mut set);
        CPU_SET(cpu, &mut set);
        sched_setaffinity(0, std::mem::size_of::<cpu_set_t>(), &set)
    };
    if rc == 0 {
        println!("Pinned {:?} to CPU {cpu}", thread::current().name().unwrap_or("thread"));
    } else {
        eprintln!("sched_setaffinity to CPU {cpu} failed: {}", std::io::Error::last_os_error());
    }
}

#[cfg(not(all(feature = "affinity", target_os = "linux")))]
fn pin_to_cpu(_cpu: usize) {}

fn writer(queue: &Queue<u64>, totals: &Totals, iterations: u64, cpu: usize) {
    pin_to_cpu(cpu);
    let mut written = 0u64;
    let mut failed = 0u64;
    for i in 0..iterations {
        let mut ticket = queue.reserve(RESERVE_BATCH);
        if ticket.is_empty() {
            failed += 1;
            continue;
        }
        for slot in ticket.iter_mut() {
            *slot = i;
        }
        written += ticket.len() as u64;
        ticket.commit();
    }
    totals.writes.fetch_add(written, Ordering::Relaxed);
    totals.failed_writes.fetch_add(failed, Ordering::Relaxed);
}

fn reader(queue: &Queue<u64>, totals: &Totals, iterations: u64, cpu: usize) {
    pin_to_cpu(cpu);
    let mut read = 0u64;
    let mut failed = 0u64;
    for _ in 0..iterations {
        let n = queue.read(READ_BATCH, |item| {
            black_box(*item);
        });
        if n == 0 {
            failed += 1;
        }
        read += n as u64;
    }
    totals.reads.fetch_add(read, Ordering::Relaxed);
    totals.failed_reads.fetch_add(failed, Ordering::Relaxed);
}

fn monitor(queue: &Queue<u64>, stop: &AtomicBool) {
    let capacity = queue.capacity();
    while !stop.load(Ordering::Acquire) {
        let size = queue.size();
        println!("filled size {size} ({}%) of {capacity}", size * 100 / capacity);
        thread::sleep(MONITOR_INTERVAL);
    }
}

fn run(writers: usize, iterations: u64, metrics: bool) {
    println!("\nStarting test with {writers} writer(s)");

    let config = HIGH_THROUGHPUT_CONFIG.with_metrics(metrics);
    let queue = match Queue::<u64>::with_config(config) {
        Ok(queue) => Arc::new(queue),
        Err(err) => {
            eprintln!("invalid queue configuration: {err}");
            return;
        }
    };
    let totals = Arc::new(Totals::default());
    let stop = Arc::new(AtomicBool::new(false));

    let monitor_handle = {
        let q = Arc::clone(&queue);
        let stop = Arc::clone(&stop);
        thread::Builder::new()
            .name("monitor".into())
            .spawn(move || monitor(&q, &stop))
            .expect("failed to spawn monitor thread")
    };

    let start = Instant::now();

    let mut handles = Vec::with_capacity(writers + 1);
    {
        let q = Arc::clone(&queue);
        let t = Arc::clone(&totals);
        handles.push(
            thread::Builder::new()
                .name("reader".into())
                .spawn(move || reader(&q, &t, iterations, 0))
                .expect("failed to spawn reader thread"),
        );
    }
    for id in 0..writers {
        let q = Arc::clone(&queue);
        let t = Arc::clone(&totals);
        handles.push(
            thread::Builder::new()
                .name(format!("writer-{id}"))
                .spawn(move || writer(&q, &t, iterations, id + 1))
                .expect("failed to spawn writer thread"),
        );
    }
    for handle in handles {
        handle.join().expect("worker thread panicked");
    }

    let elapsed = start.elapsed();
    stop.store(true, Ordering::Release);
    monitor_handle.join().expect("monitor thread panicked");

    let millis = elapsed.as_millis().max(1) as u64;
    let writes = totals.writes.load(Ordering::Relaxed);
    let reads = totals.reads.load(Ordering::Relaxed);

    println!("Duration {millis} ms");
    println!(
        "total writes: {writes}, {} items/s, failed writes {}",
        writes * 1000 / millis,
        totals.failed_writes.load(Ordering::Relaxed)
    );
    println!(
        "total reads: {reads}, {} items/s, failed reads {}",
        reads * 1000 / millis,
        totals.failed_reads.load(Ordering::Relaxed)
    );

    if metrics {
        println!("metrics: {:?}", queue.metrics());
    }
}

fn main() {
    orderq::init_tracing();

    let iterations = std::env::var("ORDERQ_ITERATIONS")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(DEFAULT_ITERATIONS);

    let metrics = std::env::var_os("ORDERQ_METRICS").is_some();

    println!("orderq throughput driver: {iterations} attempts per thread");
    for writers in 1..=3 {
        run(writers, iterations, metrics);
    }
}
