use crate::error::{Result, SpectrogramError};
use atomic_float::AtomicF32;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

/// Euclidean remainder: always in `[0, divisor)`, also for negative dividends.
///
/// `euclid_mod(-1, 5) == 4`, where `%` would give `-1`.
pub fn euclid_mod(dividend: i64, divisor: usize) -> Result<usize> {
    if divisor == 0 {
        return Err(SpectrogramError::Domain(
            "modulo with zero divisor (buffer capacity or transform length is zero)".into(),
        ));
    }
    Ok(dividend.rem_euclid(divisor as i64) as usize)
}

/// Fixed-capacity circular store of the most recent captured samples.
///
/// There is exactly one writer (the capture thread or driver callback) and
/// any number of non-destructive readers (the display tick). No lock guards
/// the samples: every cell is a relaxed atomic, so a concurrent read is
/// memory-safe but may be torn.
///
/// The writer stores a batch and then publishes the cursor with `Release`;
/// readers load it with `Acquire`. Every sample behind the cursor a reader
/// sees is therefore the one the writer stored, and the newest end of a
/// window is always intact. A tear can only come from the writer lapping the
/// reader: cells at the oldest end of the window may already hold samples of
/// the in-flight batch. That is bounded by one write batch, and only happens
/// when the window reaches within one batch of a full wrap.
pub struct SampleRingBuffer {
    // Sample cells, written by the single producer
    samples: Box<[AtomicF32]>,

    // Next write position, always < capacity
    cursor: AtomicUsize,

    // Monotonic count of samples ever written
    written: AtomicU64,
}

impl SampleRingBuffer {
    pub fn new(capacity: usize) -> Result<Self> {
        // Zero capacity would make every index computation a zero-divisor modulo
        euclid_mod(0, capacity)?;

        let samples = (0..capacity)
            .map(|_| AtomicF32::new(0.0))
            .collect::<Vec<_>>()
            .into_boxed_slice();

        Ok(Self {
            samples,
            cursor: AtomicUsize::new(0),
            written: AtomicU64::new(0),
        })
    }

    pub fn capacity(&self) -> usize {
        self.samples.len()
    }

    pub fn cursor(&self) -> usize {
        self.cursor.load(Ordering::Acquire)
    }

    /// Total samples written since creation (not reduced modulo capacity)
    pub fn total_written(&self) -> u64 {
        self.written.load(Ordering::Acquire)
    }

    // Capacity is non-zero by construction, so this cannot hit the domain error
    fn wrap(&self, index: i64) -> usize {
        index.rem_euclid(self.capacity() as i64) as usize
    }

    /// Append a batch at the cursor, overwriting the oldest samples.
    /// Called from the capture thread - no allocations, no locks.
    pub fn write(&self, samples: &[f32]) {
        let capacity = self.capacity();
        let cursor = self.cursor();

        // Only the last `capacity` values of an oversized batch survive
        let skipped = samples.len().saturating_sub(capacity);
        let start = cursor as i64 + skipped as i64;
        for (i, &sample) in samples[skipped..].iter().enumerate() {
            let index = self.wrap(start + i as i64);
            self.samples[index].store(sample, Ordering::Relaxed);
        }

        let next = self.wrap(cursor as i64 + samples.len() as i64);
        self.cursor.store(next, Ordering::Release);
        self.written
            .fetch_add(samples.len() as u64, Ordering::Release);
    }

    /// Setup-time check that a window of `length` samples can be read
    pub fn check_window(&self, length: usize) -> Result<()> {
        if length > self.capacity() {
            return Err(SpectrogramError::config(format!(
                "window of {} samples exceeds ring capacity {}",
                length,
                self.capacity()
            )));
        }
        Ok(())
    }

    /// Copy the `out.len()` most recent samples, oldest first, ending just
    /// before the cursor.
    pub fn read_window_into(&self, out: &mut [f32]) -> Result<()> {
        self.check_window(out.len())?;

        let end = self.cursor() as i64;
        let start = end - out.len() as i64;
        for (i, slot) in out.iter_mut().enumerate() {
            *slot = self.samples[self.wrap(start + i as i64)].load(Ordering::Relaxed);
        }
        Ok(())
    }

    /// Allocating form of [`Self::read_window_into`]
    pub fn read_window(&self, length: usize) -> Result<Vec<f32>> {
        let mut out = vec![0.0; length];
        self.read_window_into(&mut out)?;
        Ok(out)
    }

    /// Up to `lookback` most recent samples for the oscilloscope view,
    /// clamped to capacity
    pub fn recent(&self, lookback: usize) -> Vec<f32> {
        let length = lookback.min(self.capacity());
        let mut out = vec![0.0; length];
        // Length is clamped, so the capacity check always passes
        let _ = self.read_window_into(&mut out);
        out
    }
}

/// The single write handle for a ring buffer, moved into the capture backend
pub struct SampleWriter {
    ring: Arc<SampleRingBuffer>,
}

impl SampleWriter {
    pub(crate) fn new(ring: Arc<SampleRingBuffer>) -> Self {
        Self { ring }
    }

    pub fn write(&self, samples: &[f32]) {
        self.ring.write(samples);
    }

    pub fn ring(&self) -> &SampleRingBuffer {
        &self.ring
    }
}
