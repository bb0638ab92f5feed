//! Measures lock contention under the same shape as `changeset-core`'s
//! `exclusion_under_concurrency` test, but at a scale meant to be run by
//! hand rather than asserted on in CI: N threads race to lock one change
//! directory, the winner holds it briefly, then releases and the race
//! repeats. Reports acquisitions/sec and how often a thread had to wait
//! out someone else's hold instead of winning outright.

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use changeset_core::lock::{atomic_lock, release};

const THREADS: usize = 16;
const ROUNDS_PER_THREAD: usize = 200;
const HOLD: Duration = Duration::from_micros(200);
const TTL_SECS: i64 = 3600;

fn main() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let lock_path = dir.path().join(".lock");

    let wins = Arc::new(AtomicUsize::new(0));
    let contended = Arc::new(AtomicUsize::new(0));

    let started = Instant::now();
    let handles: Vec<_> = (0..THREADS)
        .map(|i| {
            let lock_path = lock_path.clone();
            let wins = Arc::clone(&wins);
            let contended = Arc::clone(&contended);
            thread::spawn(move || run_worker(i, &lock_path, ROUNDS_PER_THREAD, &wins, &contended))
        })
        .collect();

    for h in handles {
        h.join().map_err(|_| anyhow::anyhow!("worker thread panicked"))?;
    }
    let elapsed = started.elapsed();

    let total_wins = wins.load(Ordering::SeqCst);
    let total_contended = contended.load(Ordering::SeqCst);
    let report = serde_json::json!({
        "threads": THREADS,
        "roundsPerThread": ROUNDS_PER_THREAD,
        "totalAcquisitions": total_wins,
        "totalContendedAttempts": total_contended,
        "elapsedMs": elapsed.as_millis(),
        "acquisitionsPerSec": total_wins as f64 / elapsed.as_secs_f64(),
    });
    println!("{}", serde_json::to_string_pretty(&report)?);

    Ok(())
}

fn run_worker(
    id: usize,
    lock_path: &Path,
    rounds: usize,
    wins: &AtomicUsize,
    contended: &AtomicUsize,
) {
    let owner = format!("bench-worker-{id}");
    for _ in 0..rounds {
        match atomic_lock(lock_path, &owner, TTL_SECS) {
            Ok(_) => {
                wins.fetch_add(1, Ordering::SeqCst);
                thread::sleep(HOLD);
                let _ = release(lock_path, &owner);
            }
            Err(_) => {
                contended.fetch_add(1, Ordering::SeqCst);
            }
        }
    }
}
