//! Audio sink node: resamples decoded audio to the device's target format
//! and writes it into the lock-free ring buffer the device callback reads
//! from. The callback itself lives with the audio device implementation —
//! this node's worker thread is the only writer to the ring buffer.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration as StdDuration;

use parking_lot::Mutex;

use crate::config::EngineConfig;
use crate::external::AudioResampler;
use crate::frame::AudioFrame;
use crate::node::Node;
use crate::pin::{Pin, PopResult};
use crate::ring_buffer::RingBuffer;

const FILL_RETRY_SLEEP: StdDuration = StdDuration::from_millis(2);

type ReadyCallback = Box<dyn Fn() + Send>;

pub struct AudioSinkNode {
    input: Arc<Pin<AudioFrame>>,
    resampler: Arc<Mutex<Box<dyn AudioResampler>>>,
    ring_buffer: Arc<RingBuffer>,
    current_serial: Arc<AtomicU64>,
    running: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
    on_ready: Arc<Mutex<Option<ReadyCallback>>>,
    pop_timeout: StdDuration,
    max_consecutive_errors: u32,
}

impl AudioSinkNode {
    pub fn new(input: Arc<Pin<AudioFrame>>, resampler: Box<dyn AudioResampler>, ring_buffer: Arc<RingBuffer>, current_serial: Arc<AtomicU64>, config: &EngineConfig) -> Self {
        AudioSinkNode {
            input,
            resampler: Arc::new(Mutex::new(resampler)),
            ring_buffer,
            current_serial,
            running: Arc::new(AtomicBool::new(false)),
            worker: None,
            on_ready: Arc::new(Mutex::new(None)),
            pop_timeout: StdDuration::from_millis(config.pin_timeout_ms),
            max_consecutive_errors: config.max_consecutive_decoder_errors,
        }
    }

    pub fn set_ready_callback(&self, cb: impl Fn() + Send + 'static) {
        *self.on_ready.lock() = Some(Box::new(cb));
    }
}

impl Node for AudioSinkNode {
    fn start(&mut self) {
        if self.running.swap(true, Ordering::AcqRel) {
            return;
        }
        self.input.reset();

        let input = self.input.clone();
        let resampler = self.resampler.clone();
        let ring_buffer = self.ring_buffer.clone();
        let current_serial = self.current_serial.clone();
        let running = self.running.clone();
        let on_ready = self.on_ready.clone();
        let pop_timeout = self.pop_timeout;
        let max_consecutive_errors = self.max_consecutive_errors;

        self.worker = Some(std::thread::spawn(move || {
            log::debug!("[AudioSink] worker started");
            let mut first_frame = true;
            let mut consecutive_errors = 0u32;

            while running.load(Ordering::Acquire) {
                let frame = match input.pop(pop_timeout) {
                    PopResult::Terminated => break,
                    PopResult::Timeout => continue,
                    PopResult::Ready(f) => f,
                };
                if !running.load(Ordering::Acquire) {
                    break;
                }

                if frame.is_eof() || frame.is_error() {
                    continue;
                }

                let expected_serial = current_serial.load(Ordering::Acquire);
                if frame.serial != expected_serial {
                    continue;
                }

                let bytes = match resampler.lock().convert(&frame) {
                    Ok(b) => {
                        consecutive_errors = 0;
                        b
                    }
                    Err(e) => {
                        consecutive_errors += 1;
                        log::warn!("[AudioSink] resample failed (consecutive: {consecutive_errors}): {e}");
                        continue;
                    }
                };

                if first_frame {
                    first_frame = false;
                    if let Some(cb) = on_ready.lock().as_ref() {
                        cb();
                    }
                }

                let mut written = 0;
                while written < bytes.len() && running.load(Ordering::Acquire) {
                    written += ring_buffer.write(&bytes[written..]);
                    if written < bytes.len() {
                        std::thread::sleep(FILL_RETRY_SLEEP);
                    }
                }

                if consecutive_errors >= max_consecutive_errors {
                    log::warn!("[AudioSink] too many consecutive resample failures, continuing video-only");
                }
            }
            log::debug!("[AudioSink] worker exited");
        }));
    }

    fn stop(&mut self) {
        if !self.running.swap(false, Ordering::AcqRel) {
            return;
        }
        self.input.stop();
        if let Some(handle) = self.worker.take() {
            let _ = handle.join();
        }
    }

    fn flush(&mut self) {
        self.input.flush();
        self.ring_buffer.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::Timestamp;

    struct IdentityResampler;
    impl AudioResampler for IdentityResampler {
        fn convert(&mut self, _frame: &AudioFrame) -> crate::error::EngineResult<Vec<u8>> {
            Ok(vec![1u8; 256])
        }
    }

    fn data_frame(serial: u64) -> AudioFrame {
        AudioFrame {
            kind: crate::frame::ItemKind::Data(vec![]),
            sample_rate: 48_000,
            channels: 2,
            samples_per_channel: 128,
            sample_format: crate::frame::SampleFormat::I16Interleaved,
            pts: Timestamp(0),
            duration: crate::time::Duration::ZERO,
            serial,
        }
    }

    #[test]
    fn writes_resampled_bytes_to_ring_buffer_and_fires_ready() {
        let input = Arc::new(Pin::new(4));
        let ring = Arc::new(RingBuffer::new(crate::ring_buffer::MIN_CAPACITY));
        let serial = Arc::new(AtomicU64::new(0));

        let mut sink = AudioSinkNode::new(input.clone(), Box::new(IdentityResampler), ring.clone(), serial, &EngineConfig::default());
        let ready = Arc::new(AtomicBool::new(false));
        let ready2 = ready.clone();
        sink.set_ready_callback(move || ready2.store(true, Ordering::SeqCst));
        sink.start();

        input.push(data_frame(0), StdDuration::from_secs(1));
        std::thread::sleep(StdDuration::from_millis(100));

        assert!(ready.load(Ordering::SeqCst));
        assert_eq!(ring.available_read(), 256);

        sink.stop();
    }

    #[test]
    fn drops_stale_serial_frames() {
        let input = Arc::new(Pin::new(4));
        let ring = Arc::new(RingBuffer::new(crate::ring_buffer::MIN_CAPACITY));
        let serial = Arc::new(AtomicU64::new(5));

        let mut sink = AudioSinkNode::new(input.clone(), Box::new(IdentityResampler), ring.clone(), serial, &EngineConfig::default());
        sink.start();

        input.push(data_frame(1), StdDuration::from_secs(1));
        std::thread::sleep(StdDuration::from_millis(100));

        assert_eq!(ring.available_read(), 0);

        sink.stop();
    }
}
