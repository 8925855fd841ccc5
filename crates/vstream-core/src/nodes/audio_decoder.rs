//! Audio decoder node: mirrors [`VideoDecoderNode`](super::video_decoder)
//! but produces `AudioFrame`s.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration as StdDuration;

use crate::config::EngineConfig;
use crate::external::AudioPacketDecoder;
use crate::frame::{AudioFrame, Packet};
use crate::node::Node;
use crate::pin::{Pin, PopResult, PushResult};

pub struct AudioDecoderNode {
    decoder: Box<dyn AudioPacketDecoder>,
    input: Arc<Pin<Packet>>,
    output: Arc<Pin<AudioFrame>>,
    running: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
    pop_timeout: StdDuration,
    push_timeout: StdDuration,
    max_consecutive_errors: u32,
    iteration_cap: u32,
}

impl AudioDecoderNode {
    pub fn new(decoder: Box<dyn AudioPacketDecoder>, input: Arc<Pin<Packet>>, output: Arc<Pin<AudioFrame>>, config: &EngineConfig) -> Self {
        AudioDecoderNode {
            decoder,
            input,
            output,
            running: Arc::new(AtomicBool::new(false)),
            worker: None,
            pop_timeout: StdDuration::from_millis(config.pin_timeout_ms),
            push_timeout: StdDuration::from_millis(config.pin_timeout_ms),
            max_consecutive_errors: config.max_consecutive_decoder_errors,
            iteration_cap: config.decode_iteration_cap,
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn drain_frames(decoder: &mut dyn AudioPacketDecoder, output: &Pin<AudioFrame>, consecutive_errors: &mut u32, max_consecutive_errors: u32, iteration_cap: u32, push_timeout: StdDuration) -> bool {
        for _ in 0..iteration_cap {
            match decoder.receive_frame() {
                Ok(Some(frame)) => {
                    *consecutive_errors = 0;
                    if let PushResult::Terminated = output.push(frame, push_timeout) {
                        return false;
                    }
                }
                Ok(None) => return false,
                Err(e) => {
                    log::warn!("[AudioDecoder] receive_frame error: {e}");
                    *consecutive_errors += 1;
                    if *consecutive_errors >= max_consecutive_errors {
                        return true;
                    }
                }
            }
        }
        false
    }
}

impl Node for AudioDecoderNode {
    fn start(&mut self) {
        if self.running.swap(true, Ordering::AcqRel) {
            return;
        }
        let mut decoder = std::mem::replace(&mut self.decoder, Box::new(NullAudioDecoder));
        let input = self.input.clone();
        let output = self.output.clone();
        let running = self.running.clone();
        let pop_timeout = self.pop_timeout;
        let push_timeout = self.push_timeout;
        let max_consecutive_errors = self.max_consecutive_errors;
        let iteration_cap = self.iteration_cap;

        self.worker = Some(std::thread::spawn(move || {
            log::debug!("[AudioDecoder] worker started");
            let mut consecutive_errors = 0u32;

            while running.load(Ordering::Acquire) {
                match input.pop(pop_timeout) {
                    PopResult::Terminated => break,
                    PopResult::Timeout => continue,
                    PopResult::Ready(packet) => {
                        if packet.is_eof() {
                            Self::drain_frames(decoder.as_mut(), &output, &mut consecutive_errors, max_consecutive_errors, iteration_cap, push_timeout);
                            let _ = output.push(AudioFrame::eof(packet.serial), push_timeout);
                            continue;
                        }

                        if let Err(e) = decoder.send_packet(&packet) {
                            log::warn!("[AudioDecoder] send_packet error: {e}");
                            consecutive_errors += 1;
                            if consecutive_errors >= max_consecutive_errors {
                                let _ = output.push(AudioFrame::error(e, packet.serial), push_timeout);
                                decoder.flush();
                                consecutive_errors = 0;
                            }
                            continue;
                        }

                        let should_error = Self::drain_frames(decoder.as_mut(), &output, &mut consecutive_errors, max_consecutive_errors, iteration_cap, push_timeout);
                        if should_error {
                            let _ = output.push(
                                AudioFrame::error(crate::error::EngineError::decoder_error("too many consecutive decode errors"), packet.serial),
                                push_timeout,
                            );
                            decoder.flush();
                            consecutive_errors = 0;
                        }
                    }
                }
            }
            log::debug!("[AudioDecoder] worker exited");
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
        self.output.flush();
    }
}

struct NullAudioDecoder;
impl AudioPacketDecoder for NullAudioDecoder {
    fn send_packet(&mut self, _packet: &Packet) -> crate::error::EngineResult<()> {
        Ok(())
    }
    fn receive_frame(&mut self) -> crate::error::EngineResult<Option<AudioFrame>> {
        Ok(None)
    }
    fn flush(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::MediaKind;
    use crate::time::{Duration, Timestamp};
    use std::sync::Mutex;

    struct FakeDecoder {
        pending: Mutex<Vec<AudioFrame>>,
    }

    impl AudioPacketDecoder for FakeDecoder {
        fn send_packet(&mut self, packet: &Packet) -> crate::error::EngineResult<()> {
            self.pending.lock().unwrap().push(AudioFrame {
                kind: crate::frame::ItemKind::Data(vec![]),
                sample_rate: 48_000,
                channels: 2,
                samples_per_channel: 1024,
                sample_format: crate::frame::SampleFormat::F32Planar,
                pts: packet.pts,
                duration: Duration::ZERO,
                serial: packet.serial,
            });
            Ok(())
        }
        fn receive_frame(&mut self) -> crate::error::EngineResult<Option<AudioFrame>> {
            Ok(self.pending.lock().unwrap().pop())
        }
        fn flush(&mut self) {
            self.pending.lock().unwrap().clear();
        }
    }

    const TEST_TIMEOUT: StdDuration = StdDuration::from_millis(100);

    fn packet(pts: i64, serial: u64) -> Packet {
        Packet::data(Arc::from(vec![0u8; 2].into_boxed_slice()), Timestamp(pts), Timestamp(pts), Duration::ZERO, 0, true, MediaKind::Audio, serial)
    }

    #[test]
    fn decodes_one_frame_per_packet() {
        let input = Arc::new(Pin::new(4));
        let output = Arc::new(Pin::new(4));
        let decoder = FakeDecoder { pending: Mutex::new(vec![]) };
        let mut node = AudioDecoderNode::new(Box::new(decoder), input.clone(), output.clone(), &EngineConfig::default());
        node.start();

        input.push(packet(2000, 0), TEST_TIMEOUT);
        let frame = output.pop(StdDuration::from_secs(2));
        assert!(matches!(frame, PopResult::Ready(f) if f.pts == Timestamp(2000)));

        node.stop();
    }
}
