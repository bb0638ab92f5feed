//! Streaming reader (spec §4.6): a memory-bounded, backpressure-aware,
//! resumable read of one artifact file, expressed as a lazy sequence of
//! chunks rather than a callback — the transport pulls, applies
//! backpressure, and flushes (spec §9's "Streaming as a lazy sequence").

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use sha2::{Digest, Sha256};
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt, SeekFrom};

use crate::error::{ErrorCode, Result, WorkflowError};

pub const STREAMING_THRESHOLD: u64 = 1024 * 1024;
const CRITICAL_PRESSURE_FLOOR: u64 = 256 * 1024;
const WARNING_PRESSURE_FLOOR: u64 = 512 * 1024;

const CHUNK_MIN: usize = 4 * 1024;
const CHUNK_MAX: usize = 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryPressure {
    Normal,
    Warning,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum BackpressureLevel {
    None,
    Light,
    Moderate,
    Heavy,
    Critical,
}

impl BackpressureLevel {
    pub fn from_score(score: u32) -> Self {
        match score {
            0..=19 => Self::None,
            20..=39 => Self::Light,
            40..=59 => Self::Moderate,
            60..=79 => Self::Heavy,
            _ => Self::Critical,
        }
    }

    /// Inter-chunk delay this band imposes, per spec's ranges (midpoint used
    /// as the deterministic value rather than sampling a range).
    pub fn inter_chunk_delay(self) -> Duration {
        match self {
            Self::None => Duration::ZERO,
            Self::Light => Duration::from_millis(20),
            Self::Moderate => Duration::from_millis(75),
            Self::Heavy => Duration::from_millis(150),
            Self::Critical => Duration::ZERO, // suspended entirely; caller fails the stream
        }
    }

    pub fn max_concurrent_streams(self) -> Option<usize> {
        if self == Self::Heavy { Some(1) } else { None }
    }
}

/// Backpressure score (0-100): heap-used % (0-40) + active stream count
/// scaled (0-30) + average last-5-chunk processing time scaled (0-30).
pub fn backpressure_score(heap_used_pct: f64, active_streams: usize, avg_chunk_ms: f64) -> u32 {
    let heap_component = (heap_used_pct.clamp(0.0, 1.0) * 40.0) as u32;
    let stream_component = ((active_streams as f64 / 20.0).clamp(0.0, 1.0) * 30.0) as u32;
    let latency_component = ((avg_chunk_ms / 500.0).clamp(0.0, 1.0) * 30.0) as u32;
    (heap_component + stream_component + latency_component).min(100)
}

/// Decide whether a read of `size` bytes should stream, per spec's decision
/// rule: size at/above threshold, or any non-normal pressure above the
/// pressure-specific floor.
pub fn should_stream(size: u64, pressure: MemoryPressure) -> bool {
    if size >= STREAMING_THRESHOLD {
        return true;
    }
    match pressure {
        MemoryPressure::Normal => false,
        MemoryPressure::Warning => size >= WARNING_PRESSURE_FLOOR,
        MemoryPressure::Critical => size >= CRITICAL_PRESSURE_FLOOR,
    }
}

/// Base chunk size for a file of this size, per spec's table.
pub fn base_chunk_size(file_size: u64) -> usize {
    const MIB: u64 = 1024 * 1024;
    if file_size < MIB {
        32 * 1024
    } else if file_size < 10 * MIB {
        64 * 1024
    } else if file_size < 100 * MIB {
        128 * 1024
    } else {
        256 * 1024
    }
}

/// Adapt the base chunk size for memory pressure and observed throughput,
/// clamped to `[4 KiB, 1 MiB]`.
pub fn adapt_chunk_size(base: usize, pressure: MemoryPressure, throughput_mib_s: f64) -> usize {
    let mut size = base as f64;
    size *= match pressure {
        MemoryPressure::Critical => 0.5,
        MemoryPressure::Warning => 0.75,
        MemoryPressure::Normal => 1.0,
    };
    if pressure == MemoryPressure::Normal && throughput_mib_s < 5.0 {
        size *= 1.2;
    }
    (size as usize).clamp(CHUNK_MIN, CHUNK_MAX)
}

#[derive(Debug, Clone)]
pub struct StreamCheckpoint {
    pub path: PathBuf,
    pub file_size: u64,
    pub mtime: SystemTime,
    pub bytes_delivered: u64,
    pub chunk_index: u64,
    pub rolling_hash: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct Chunk {
    pub index: u64,
    pub bytes: Vec<u8>,
    pub is_last: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    Io,
    Memory,
    Permission,
    FileChanged,
    Validation,
}

impl ErrorClass {
    pub fn is_retryable(self) -> bool {
        matches!(self, Self::Io | Self::Memory)
    }

    /// Classify a workflow error code into one of the streaming retry
    /// classes (spec §4.6's "uniform taxonomy of failures").
    pub fn from_error_code(code: ErrorCode) -> Self {
        match code {
            ErrorCode::EIo => Self::Io,
            ErrorCode::EBadSlug
            | ErrorCode::EPathEscape
            | ErrorCode::InvalidFormat
            | ErrorCode::InvalidScheme => Self::Validation,
            ErrorCode::AuthenticationFailed => Self::Permission,
            _ => Self::Io,
        }
    }
}

/// A resumable, checkpointing reader over one artifact file.
pub struct StreamingReader {
    path: PathBuf,
    file: File,
    file_size: u64,
    mtime: SystemTime,
    bytes_delivered: u64,
    chunk_index: u64,
    hasher: Sha256,
    pressure: MemoryPressure,
    checkpoint: Option<StreamCheckpoint>,
}

const CHECKPOINT_INTERVAL: u64 = 5;

impl StreamingReader {
    pub async fn open(path: &Path, pressure: MemoryPressure) -> Result<Self> {
        let file = File::open(path).await.map_err(WorkflowError::io)?;
        let metadata = file.metadata().await.map_err(WorkflowError::io)?;
        Ok(Self {
            path: path.to_path_buf(),
            file,
            file_size: metadata.len(),
            mtime: metadata.modified().map_err(WorkflowError::io)?,
            bytes_delivered: 0,
            chunk_index: 0,
            hasher: Sha256::new(),
            pressure,
            checkpoint: None,
        })
    }

    pub fn file_size(&self) -> u64 {
        self.file_size
    }

    pub fn should_stream(&self) -> bool {
        should_stream(self.file_size, self.pressure)
    }

    /// Pull the next chunk, or `Ok(None)` at EOF. Records a checkpoint every
    /// `CHECKPOINT_INTERVAL` chunks.
    pub async fn next_chunk(&mut self, throughput_mib_s: f64) -> Result<Option<Chunk>> {
        if self.bytes_delivered >= self.file_size {
            return Ok(None);
        }

        let base = base_chunk_size(self.file_size);
        let size = adapt_chunk_size(base, self.pressure, throughput_mib_s);
        let remaining = (self.file_size - self.bytes_delivered) as usize;
        let want = size.min(remaining);

        let mut buf = vec![0u8; want];
        let mut read_total = 0;
        while read_total < want {
            let n = self
                .file
                .read(&mut buf[read_total..])
                .await
                .map_err(WorkflowError::io)?;
            if n == 0 {
                break;
            }
            read_total += n;
        }
        buf.truncate(read_total);

        self.hasher.update(&buf);
        self.bytes_delivered += read_total as u64;
        let index = self.chunk_index;
        self.chunk_index += 1;
        let is_last = self.bytes_delivered >= self.file_size;

        if self.chunk_index % CHECKPOINT_INTERVAL == 0 || is_last {
            self.checkpoint = Some(StreamCheckpoint {
                path: self.path.clone(),
                file_size: self.file_size,
                mtime: self.mtime,
                bytes_delivered: self.bytes_delivered,
                chunk_index: self.chunk_index,
                rolling_hash: self.hasher.clone().finalize().to_vec(),
            });
        }

        Ok(Some(Chunk { index, bytes: buf, is_last }))
    }

    pub fn checkpoint(&self) -> Option<&StreamCheckpoint> {
        self.checkpoint.as_ref()
    }

    /// Attempt to resume a stream from `checkpoint`. Succeeds only if the
    /// file's size and mtime are unchanged and the recorded content hash
    /// matches re-reading the prefix.
    pub async fn resume(checkpoint: &StreamCheckpoint, pressure: MemoryPressure) -> Result<Self> {
        let mut file = File::open(&checkpoint.path).await.map_err(WorkflowError::io)?;
        let metadata = file.metadata().await.map_err(WorkflowError::io)?;
        let mtime = metadata.modified().map_err(WorkflowError::io)?;

        if metadata.len() != checkpoint.file_size || mtime != checkpoint.mtime {
            return Err(WorkflowError::new(
                ErrorCode::EIo,
                "file changed since checkpoint; resumption refused",
            ));
        }

        let mut prefix = vec![0u8; checkpoint.bytes_delivered as usize];
        file.read_exact(&mut prefix).await.map_err(WorkflowError::io)?;
        let mut hasher = Sha256::new();
        hasher.update(&prefix);
        if hasher.clone().finalize().to_vec() != checkpoint.rolling_hash {
            return Err(WorkflowError::new(
                ErrorCode::EIo,
                "content hash mismatch; resumption refused",
            ));
        }

        file.seek(SeekFrom::Start(checkpoint.bytes_delivered))
            .await
            .map_err(WorkflowError::io)?;

        Ok(Self {
            path: checkpoint.path.clone(),
            file,
            file_size: checkpoint.file_size,
            mtime,
            bytes_delivered: checkpoint.bytes_delivered,
            chunk_index: checkpoint.chunk_index,
            hasher,
            pressure,
            checkpoint: Some(checkpoint.clone()),
        })
    }
}

/// Buffered (non-streaming) read, used below the streaming threshold.
pub async fn read_buffered(path: &Path) -> Result<Vec<u8>> {
    tokio::fs::read(path).await.map_err(WorkflowError::io)
}

#[derive(Debug, Clone, Copy)]
pub enum ResourcePriority {
    Immediate,
    High,
    Normal,
    Low,
    Deferred,
}

/// Priority-ordered cleanup sweep: on a critical memory signal, deferred and
/// low-priority entries go first, then half of normal-priority. Returns the
/// indices to release, preserving relative order within a priority band.
pub fn cleanup_order(priorities: &[ResourcePriority], critical: bool) -> Vec<usize> {
    let mut out = Vec::new();
    let band = |p: &ResourcePriority| match p {
        ResourcePriority::Immediate => 0,
        ResourcePriority::High => 1,
        ResourcePriority::Normal => 2,
        ResourcePriority::Low => 3,
        ResourcePriority::Deferred => 4,
    };
    let mut indices: Vec<usize> = (0..priorities.len()).collect();
    indices.sort_by_key(|&i| std::cmp::Reverse(band(&priorities[i])));

    if critical {
        let normal_indices: Vec<usize> =
            indices.iter().copied().filter(|&i| band(&priorities[i]) == 2).collect();
        let half = normal_indices.len() / 2;
        for &i in &indices {
            let b = band(&priorities[i]);
            if b == 4 || b == 3 {
                out.push(i);
            }
        }
        out.extend(normal_indices.into_iter().take(half));
    } else {
        out.extend(indices);
    }
    out
}
