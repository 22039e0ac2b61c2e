//! Lock-free ring buffer between bus reader and link writer
//!
//! Each transport owns one of these exclusively: the fill side pulls frames
//! from its (read-only) bus and the drain side feeds the device link. The
//! ring absorbs wireless jitter; its fill level is the transport's local
//! backpressure signal. Nothing is shared between the two transports.
//!
//! Single-producer single-consumer, mono f32 samples.

use ringbuf::{traits::*, HeapCons, HeapProd, HeapRb};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Default capacity in frames (~743ms @ 44.1kHz), enough to ride out
/// multi-hundred-millisecond wireless stalls.
pub const DEFAULT_CAPACITY: usize = 32_768;

/// Jitter buffer for one transport.
pub struct BusRingBuffer {
    buffer: HeapRb<f32>,
    starved: Arc<AtomicU64>,
    saturated: Arc<AtomicU64>,
}

impl BusRingBuffer {
    pub fn new(capacity: usize) -> Self {
        debug!("Creating bus ring buffer: {} frames", capacity);
        Self {
            buffer: HeapRb::new(capacity.max(64)),
            starved: Arc::new(AtomicU64::new(0)),
            saturated: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Split into fill and drain halves, movable to separate tasks.
    pub fn split(self) -> (BusFiller, BusDrainer) {
        let (prod, cons) = self.buffer.split();
        (
            BusFiller {
                producer: prod,
                saturated: Arc::clone(&self.saturated),
            },
            BusDrainer {
                consumer: cons,
                starved: Arc::clone(&self.starved),
            },
        )
    }
}

/// Fill half: pulls frames from the bus into the ring.
pub struct BusFiller {
    producer: HeapProd<f32>,
    saturated: Arc<AtomicU64>,
}

impl BusFiller {
    /// Push as many samples as fit, returning how many were accepted.
    ///
    /// A short write means the ring is full — the sink has not drained yet,
    /// and the caller should hold before offering the remainder again.
    pub fn push(&mut self, samples: &[f32]) -> usize {
        let pushed = self.producer.push_slice(samples);
        if pushed < samples.len() {
            self.saturated.fetch_add(1, Ordering::Relaxed);
        }
        pushed
    }

    pub fn free_len(&self) -> usize {
        self.producer.vacant_len()
    }

    pub fn occupied_len(&self) -> usize {
        self.producer.occupied_len()
    }

    pub fn capacity(&self) -> usize {
        self.producer.capacity().into()
    }
}

/// Drain half: pops frames to hand to the device link.
pub struct BusDrainer {
    consumer: HeapCons<f32>,
    starved: Arc<AtomicU64>,
}

impl BusDrainer {
    /// Pop up to `out.len()` samples, returning how many were written.
    ///
    /// Zero with the session still running means the filler is behind; the
    /// caller holds rather than skipping ahead.
    pub fn pop(&mut self, out: &mut [f32]) -> usize {
        let popped = self.consumer.pop_slice(out);
        if popped == 0 {
            self.starved.fetch_add(1, Ordering::Relaxed);
        }
        popped
    }

    pub fn occupied_len(&self) -> usize {
        self.consumer.occupied_len()
    }

    pub fn is_empty(&self) -> bool {
        self.consumer.is_empty()
    }

    /// Times the drain side found the ring empty.
    pub fn starved_count(&self) -> u64 {
        self.starved.load(Ordering::Relaxed)
    }
}
