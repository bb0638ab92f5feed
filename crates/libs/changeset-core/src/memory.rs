//! Memory pressure monitor (spec §4.6, §9's "priority-ordered cleanup"),
//! shared by every transport: concurrent readers, single writer (the
//! sampler task). A background task periodically samples the number of
//! in-flight streaming reads and derives a `MemoryPressure` level the
//! streaming reader throttles against; readers take an atomic snapshot with
//! no locking.
//!
//! Beyond the pressure level, the monitor keeps a small registry of active
//! streams tagged with a `ResourcePriority`. When a sample lands on
//! `MemoryPressure::Critical`, it runs `streaming::cleanup_order` over that
//! registry and flags the streams it selects (deferred and low priority
//! first, then half of normal) for early release — the stream's own loop
//! checks the flag each chunk and aborts rather than the monitor reaching
//! in and cancelling it directly.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::streaming::{MemoryPressure, ResourcePriority, cleanup_order};

const SAMPLE_INTERVAL: Duration = Duration::from_secs(2);

/// Default concurrency thresholds both transports construct their monitor
/// with, matching the teacher's own default pool-sizing constants.
pub const DEFAULT_WARNING_THRESHOLD: usize = 8;
pub const DEFAULT_CRITICAL_THRESHOLD: usize = 32;

struct StreamEntry {
    priority: ResourcePriority,
    abort: Arc<AtomicBool>,
}

#[derive(Debug)]
pub struct MemoryMonitor {
    active_streams: AtomicUsize,
    level: AtomicU8,
    warning_threshold: usize,
    critical_threshold: usize,
    next_id: AtomicU64,
    streams: Mutex<HashMap<u64, StreamEntry>>,
}

impl MemoryMonitor {
    pub fn new(warning_threshold: usize, critical_threshold: usize) -> Arc<Self> {
        Arc::new(Self {
            active_streams: AtomicUsize::new(0),
            level: AtomicU8::new(pressure_to_u8(MemoryPressure::Normal)),
            warning_threshold,
            critical_threshold,
            next_id: AtomicU64::new(0),
            streams: Mutex::new(HashMap::new()),
        })
    }

    pub fn stream_started(&self) {
        self.active_streams.fetch_add(1, Ordering::SeqCst);
    }

    pub fn stream_finished(&self) {
        self.active_streams.fetch_sub(1, Ordering::SeqCst);
    }

    pub fn snapshot(&self) -> MemoryPressure {
        u8_to_pressure(self.level.load(Ordering::SeqCst))
    }

    pub fn active_stream_count(&self) -> usize {
        self.active_streams.load(Ordering::SeqCst)
    }

    /// Fraction of the critical concurrency threshold currently in use,
    /// standing in for `backpressure_score`'s `heap_used_pct` input — this
    /// monitor has no OS heap instrumentation, so stream concurrency is the
    /// proxy available here.
    pub fn heap_used_pct(&self) -> f64 {
        (self.active_stream_count() as f64 / self.critical_threshold.max(1) as f64).min(1.0)
    }

    /// Register one in-flight stream at `priority`. The returned guard
    /// decrements the active count and deregisters on drop; call
    /// `should_abort` each chunk to see whether a critical sample has
    /// flagged this stream for early release.
    pub fn register_stream(self: &Arc<Self>, priority: ResourcePriority) -> StreamGuard {
        self.stream_started();
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let abort = Arc::new(AtomicBool::new(false));
        self.streams
            .lock()
            .expect("memory monitor mutex poisoned")
            .insert(id, StreamEntry { priority, abort: Arc::clone(&abort) });
        StreamGuard { monitor: Arc::clone(self), id, abort }
    }

    fn sample(&self) {
        let streams = self.active_streams.load(Ordering::SeqCst);
        let pressure = if streams >= self.critical_threshold {
            MemoryPressure::Critical
        } else if streams >= self.warning_threshold {
            MemoryPressure::Warning
        } else {
            MemoryPressure::Normal
        };
        self.level.store(pressure_to_u8(pressure), Ordering::SeqCst);

        if pressure == MemoryPressure::Critical {
            self.flag_for_release();
        }
    }

    fn flag_for_release(&self) {
        let registry = self.streams.lock().expect("memory monitor mutex poisoned");
        let ids: Vec<u64> = registry.keys().copied().collect();
        let priorities: Vec<ResourcePriority> =
            ids.iter().map(|id| registry.get(id).expect("id from own keys").priority).collect();
        for idx in cleanup_order(&priorities, true) {
            registry.get(&ids[idx]).expect("id from own keys").abort.store(true, Ordering::SeqCst);
        }
    }

    /// Spawns the sampler task; returns the handle so callers can abort it on shutdown.
    pub fn spawn_sampler(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let monitor = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(SAMPLE_INTERVAL);
            loop {
                ticker.tick().await;
                monitor.sample();
            }
        })
    }
}

/// RAII handle for one registered stream; see `MemoryMonitor::register_stream`.
pub struct StreamGuard {
    monitor: Arc<MemoryMonitor>,
    id: u64,
    abort: Arc<AtomicBool>,
}

impl StreamGuard {
    pub fn should_abort(&self) -> bool {
        self.abort.load(Ordering::SeqCst)
    }
}

impl Drop for StreamGuard {
    fn drop(&mut self) {
        self.monitor.streams.lock().expect("memory monitor mutex poisoned").remove(&self.id);
        self.monitor.stream_finished();
    }
}

fn pressure_to_u8(p: MemoryPressure) -> u8 {
    match p {
        MemoryPressure::Normal => 0,
        MemoryPressure::Warning => 1,
        MemoryPressure::Critical => 2,
    }
}

fn u8_to_pressure(v: u8) -> MemoryPressure {
    match v {
        0 => MemoryPressure::Normal,
        1 => MemoryPressure::Warning,
        _ => MemoryPressure::Critical,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escalates_with_active_stream_count() {
        let monitor = MemoryMonitor::new(2, 4);
        assert_eq!(monitor.snapshot(), MemoryPressure::Normal);

        for _ in 0..2 {
            monitor.stream_started();
        }
        monitor.sample();
        assert_eq!(monitor.snapshot(), MemoryPressure::Warning);

        for _ in 0..2 {
            monitor.stream_started();
        }
        monitor.sample();
        assert_eq!(monitor.snapshot(), MemoryPressure::Critical);
    }

    #[test]
    fn critical_sample_flags_low_priority_streams_first() {
        let monitor = MemoryMonitor::new(1, 2);
        let low = monitor.register_stream(ResourcePriority::Low);
        let immediate = monitor.register_stream(ResourcePriority::Immediate);
        monitor.sample();
        assert!(low.should_abort());
        assert!(!immediate.should_abort());
    }

    #[test]
    fn guard_drop_deregisters_and_decrements() {
        let monitor = MemoryMonitor::new(5, 10);
        let guard = monitor.register_stream(ResourcePriority::Normal);
        assert_eq!(monitor.active_stream_count(), 1);
        drop(guard);
        assert_eq!(monitor.active_stream_count(), 0);
    }
}
