//! Download counters.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Bytes downloaded and requests completed since the last (re)configuration.
#[derive(Debug, Default)]
pub struct Memory {
    bytes: AtomicU64,
    visits: AtomicU64,
    limit_mb: AtomicU64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MemoryStats {
    pub bytes: u64,
    pub visits: u64,
    pub limit_mb: u64,
    pub size: String,
}

impl Memory {
    pub fn new(limit_mb: u64) -> Self {
        Self { limit_mb: AtomicU64::new(limit_mb), ..Default::default() }
    }

    pub fn reset(&self, limit_mb: u64) {
        self.bytes.store(0, Ordering::Relaxed);
        self.visits.store(0, Ordering::Relaxed);
        self.limit_mb.store(limit_mb, Ordering::Relaxed);
    }

    pub fn record(&self, bytes: u64) {
        self.bytes.fetch_add(bytes, Ordering::Relaxed);
        self.visits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn bytes(&self) -> u64 {
        self.bytes.load(Ordering::Relaxed)
    }

    pub fn visits(&self) -> u64 {
        self.visits.load(Ordering::Relaxed)
    }

    pub fn stats(&self) -> MemoryStats {
        let bytes = self.bytes();
        MemoryStats { bytes, visits: self.visits(), limit_mb: self.limit_mb.load(Ordering::Relaxed), size: size(bytes) }
    }
}

/// Human readable byte count, e.g. `1.5 KB`.
pub fn size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes < KB {
        format!("{bytes} B")
    } else if bytes < MB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else if bytes < GB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else {
        format!("{:.1} GB", bytes as f64 / GB as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_size_units() {
        assert_eq!(size(0), "0 B");
        assert_eq!(size(1023), "1023 B");
        assert_eq!(size(1536), "1.5 KB");
        assert_eq!(size(5 * 1024 * 1024), "5.0 MB");
        assert_eq!(size(3 * 1024 * 1024 * 1024), "3.0 GB");
    }

    #[test]
    fn test_record_and_reset() {
        let memory = Memory::new(50);
        memory.record(2048);
        memory.record(1024);
        let stats = memory.stats();
        assert_eq!(stats.bytes, 3072);
        assert_eq!(stats.visits, 2);
        assert_eq!(stats.size, "3.0 KB");

        memory.reset(10);
        let stats = memory.stats();
        assert_eq!(stats.bytes, 0);
        assert_eq!(stats.visits, 0);
        assert_eq!(stats.limit_mb, 10);
    }
}
