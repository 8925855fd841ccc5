//! Lock-free single-producer/single-consumer byte ring buffer.
//!
//! Sits between the audio sink's resampler (producer) and the audio device
//! callback (consumer). Capacity must be a power of two; violating the
//! single-producer/single-consumer contract breaks the synchronization.

use std::sync::atomic::{AtomicUsize, Ordering};

pub const MIN_CAPACITY: usize = 16 * 1024;
pub const MAX_CAPACITY: usize = 1024 * 1024;
pub const DEFAULT_CAPACITY: usize = 128 * 1024;

fn round_to_power_of_2(n: usize) -> usize {
    if n.is_power_of_two() {
        n
    } else {
        n.next_power_of_two()
    }
}

/// Computes a sensible ring buffer size for the given audio format,
/// targeting roughly `target_ms` milliseconds of buffering.
pub fn calculate_audio_buffer_size(sample_rate: u32, channels: u16, bytes_per_sample: u16, target_ms: u32) -> usize {
    let bytes_per_ms = sample_rate as u64 * channels as u64 * bytes_per_sample as u64 / 1000;
    let wanted = (bytes_per_ms * target_ms as u64) as usize;
    round_to_power_of_2(wanted.clamp(MIN_CAPACITY, MAX_CAPACITY))
}

/// A lock-free SPSC ring buffer over a fixed byte capacity.
pub struct RingBuffer {
    buf: Box<[u8]>,
    mask: usize,
    write_pos: CachePadded<AtomicUsize>,
    read_pos: CachePadded<AtomicUsize>,
}

/// Pads its contents to a cache line so producer and consumer positions
/// never false-share.
#[repr(align(64))]
struct CachePadded<T>(T);

impl RingBuffer {
    pub fn new(capacity: usize) -> Self {
        let capacity = round_to_power_of_2(capacity.clamp(MIN_CAPACITY, MAX_CAPACITY));
        RingBuffer {
            buf: vec![0u8; capacity].into_boxed_slice(),
            mask: capacity - 1,
            write_pos: CachePadded(AtomicUsize::new(0)),
            read_pos: CachePadded(AtomicUsize::new(0)),
        }
    }

    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    pub fn available_read(&self) -> usize {
        let w = self.write_pos.0.load(Ordering::Acquire);
        let r = self.read_pos.0.load(Ordering::Relaxed);
        w.wrapping_sub(r)
    }

    pub fn available_write(&self) -> usize {
        self.capacity() - self.available_read()
    }

    pub fn fill_ratio(&self) -> f32 {
        self.available_read() as f32 / self.capacity() as f32
    }

    /// Write up to `data.len()` bytes, returning the number actually written.
    /// Producer-only.
    pub fn write(&self, data: &[u8]) -> usize {
        let r = self.read_pos.0.load(Ordering::Acquire);
        let w = self.write_pos.0.load(Ordering::Relaxed);
        let free = self.capacity() - (w.wrapping_sub(r));
        let to_write = data.len().min(free);
        if to_write == 0 {
            return 0;
        }

        let start = w & self.mask;
        let first_chunk = to_write.min(self.capacity() - start);
        // SAFETY: single producer, disjoint region from the consumer's read range.
        let buf_ptr = self.buf.as_ptr() as *mut u8;
        unsafe {
            std::ptr::copy_nonoverlapping(data.as_ptr(), buf_ptr.add(start), first_chunk);
            if first_chunk < to_write {
                let remainder = to_write - first_chunk;
                std::ptr::copy_nonoverlapping(data.as_ptr().add(first_chunk), buf_ptr, remainder);
            }
        }
        self.write_pos.0.store(w.wrapping_add(to_write), Ordering::Release);
        to_write
    }

    /// Read up to `out.len()` bytes, returning the number actually read.
    /// Consumer-only.
    pub fn read(&self, out: &mut [u8]) -> usize {
        let w = self.write_pos.0.load(Ordering::Acquire);
        let r = self.read_pos.0.load(Ordering::Relaxed);
        let available = w.wrapping_sub(r);
        let to_read = out.len().min(available);
        if to_read == 0 {
            return 0;
        }

        let start = r & self.mask;
        let first_chunk = to_read.min(self.capacity() - start);
        let buf_ptr = self.buf.as_ptr();
        unsafe {
            std::ptr::copy_nonoverlapping(buf_ptr.add(start), out.as_mut_ptr(), first_chunk);
            if first_chunk < to_read {
                let remainder = to_read - first_chunk;
                std::ptr::copy_nonoverlapping(buf_ptr, out.as_mut_ptr().add(first_chunk), remainder);
            }
        }
        self.read_pos.0.store(r.wrapping_add(to_read), Ordering::Release);
        to_read
    }

    /// Read into `out`, filling any shortfall with silence (zero bytes).
    /// Used by the audio device callback, which must never block or starve.
    pub fn read_or_silence(&self, out: &mut [u8]) -> usize {
        let read = self.read(out);
        if read < out.len() {
            out[read..].fill(0);
        }
        read
    }

    /// Discard all buffered data. Producer-side only; the caller must
    /// ensure the consumer is not concurrently reading.
    pub fn clear(&self) {
        let w = self.write_pos.0.load(Ordering::Relaxed);
        self.read_pos.0.store(w, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rounds_capacity_to_power_of_two() {
        let rb = RingBuffer::new(20_000);
        assert_eq!(rb.capacity(), 32_768);
    }

    #[test]
    fn clamps_to_bounds() {
        assert_eq!(RingBuffer::new(1).capacity(), MIN_CAPACITY);
        assert_eq!(RingBuffer::new(10_000_000).capacity(), MAX_CAPACITY);
    }

    #[test]
    fn write_then_read_round_trips() {
        let rb = RingBuffer::new(MIN_CAPACITY);
        let data: Vec<u8> = (0..100).collect();
        assert_eq!(rb.write(&data), 100);
        let mut out = vec![0u8; 100];
        assert_eq!(rb.read(&mut out), 100);
        assert_eq!(out, data);
    }

    #[test]
    fn wraps_around_correctly() {
        let rb = RingBuffer::new(MIN_CAPACITY);
        let cap = rb.capacity();
        let chunk = vec![0xABu8; cap - 16];
        assert_eq!(rb.write(&chunk), chunk.len());
        let mut drain = vec![0u8; chunk.len()];
        rb.read(&mut drain);

        // Now write_pos/read_pos both sit near the end; next write wraps.
        let second: Vec<u8> = (0..64u8).collect();
        assert_eq!(rb.write(&second), 64);
        let mut out = vec![0u8; 64];
        assert_eq!(rb.read(&mut out), 64);
        assert_eq!(out, second);
    }

    #[test]
    fn available_read_write_sum_to_capacity() {
        let rb = RingBuffer::new(MIN_CAPACITY);
        rb.write(&[1u8; 1000]);
        assert_eq!(rb.available_read() + rb.available_write(), rb.capacity());
    }

    #[test]
    fn read_or_silence_pads_underrun() {
        let rb = RingBuffer::new(MIN_CAPACITY);
        rb.write(&[7u8; 10]);
        let mut out = vec![0xFFu8; 20];
        rb.read_or_silence(&mut out);
        assert_eq!(&out[..10], &[7u8; 10]);
        assert_eq!(&out[10..], &[0u8; 10]);
    }

    #[test]
    fn write_saturates_at_capacity() {
        let rb = RingBuffer::new(MIN_CAPACITY);
        let data = vec![1u8; MIN_CAPACITY + 100];
        let written = rb.write(&data);
        assert_eq!(written, MIN_CAPACITY);
    }

    #[test]
    fn clear_drops_buffered_data() {
        let rb = RingBuffer::new(MIN_CAPACITY);
        rb.write(&[1u8; 100]);
        rb.clear();
        assert_eq!(rb.available_read(), 0);
    }

    #[test]
    fn calculate_audio_buffer_size_targets_duration() {
        let size = calculate_audio_buffer_size(48_000, 2, 2, 680);
        assert_eq!(size, DEFAULT_CAPACITY);
    }
}
