//! Video decoder node: classic send-packet/receive-frame loop over packets
//! pulled from its input pin, emitting decoded frames to its output pin.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration as StdDuration;

use crate::config::EngineConfig;
use crate::external::VideoPacketDecoder;
use crate::frame::{Packet, VideoFrame};
use crate::node::Node;
use crate::pin::{Pin, PopResult, PushResult};

pub struct VideoDecoderNode {
    decoder: Box<dyn VideoPacketDecoder>,
    input: Arc<Pin<Packet>>,
    output: Arc<Pin<VideoFrame>>,
    running: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
    pop_timeout: StdDuration,
    push_timeout: StdDuration,
    max_consecutive_errors: u32,
    iteration_cap: u32,
}

impl VideoDecoderNode {
    pub fn new(decoder: Box<dyn VideoPacketDecoder>, input: Arc<Pin<Packet>>, output: Arc<Pin<VideoFrame>>, config: &EngineConfig) -> Self {
        VideoDecoderNode {
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
    fn drain_frames(decoder: &mut dyn VideoPacketDecoder, output: &Pin<VideoFrame>, consecutive_errors: &mut u32, max_consecutive_errors: u32, iteration_cap: u32, push_timeout: StdDuration) -> bool {
        // Returns true if the caller should emit an error-frame sentinel and reset.
        for _ in 0..iteration_cap {
            match decoder.receive_frame() {
                Ok(Some(frame)) => {
                    *consecutive_errors = 0;
                    if let PushResult::Terminated = output.push(frame, push_timeout) {
                        return false;
                    }
                }
                Ok(None) => return false, // EAGAIN: need another packet
                Err(e) => {
                    log::warn!("[VideoDecoder] receive_frame error: {e}");
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

impl Node for VideoDecoderNode {
    fn start(&mut self) {
        if self.running.swap(true, Ordering::AcqRel) {
            return;
        }
        let mut decoder = std::mem::replace(&mut self.decoder, Box::new(NullVideoDecoder));
        let input = self.input.clone();
        let output = self.output.clone();
        let running = self.running.clone();
        let pop_timeout = self.pop_timeout;
        let push_timeout = self.push_timeout;
        let max_consecutive_errors = self.max_consecutive_errors;
        let iteration_cap = self.iteration_cap;

        self.worker = Some(std::thread::spawn(move || {
            log::debug!("[VideoDecoder] worker started");
            let mut consecutive_errors = 0u32;

            while running.load(Ordering::Acquire) {
                match input.pop(pop_timeout) {
                    PopResult::Terminated => break,
                    PopResult::Timeout => continue,
                    PopResult::Ready(packet) => {
                        if packet.is_eof() {
                            // Drain remaining buffered frames, then propagate EOF.
                            Self::drain_frames(decoder.as_mut(), &output, &mut consecutive_errors, max_consecutive_errors, iteration_cap, push_timeout);
                            let _ = output.push(VideoFrame::eof(packet.serial), push_timeout);
                            continue;
                        }

                        if let Err(e) = decoder.send_packet(&packet) {
                            log::warn!("[VideoDecoder] send_packet error: {e}");
                            consecutive_errors += 1;
                            if consecutive_errors >= max_consecutive_errors {
                                let _ = output.push(VideoFrame::error(e, packet.serial), push_timeout);
                                decoder.flush();
                                consecutive_errors = 0;
                            }
                            continue;
                        }

                        let should_error = Self::drain_frames(decoder.as_mut(), &output, &mut consecutive_errors, max_consecutive_errors, iteration_cap, push_timeout);
                        if should_error {
                            let _ = output.push(
                                VideoFrame::error(crate::error::EngineError::decoder_error("too many consecutive decode errors"), packet.serial),
                                push_timeout,
                            );
                            decoder.flush();
                            consecutive_errors = 0;
                        }
                    }
                }
            }
            log::debug!("[VideoDecoder] worker exited");
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

struct NullVideoDecoder;
impl VideoPacketDecoder for NullVideoDecoder {
    fn send_packet(&mut self, _packet: &Packet) -> crate::error::EngineResult<()> {
        Ok(())
    }
    fn receive_frame(&mut self) -> crate::error::EngineResult<Option<VideoFrame>> {
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
        pending: Mutex<Vec<VideoFrame>>,
    }

    impl VideoPacketDecoder for FakeDecoder {
        fn send_packet(&mut self, packet: &Packet) -> crate::error::EngineResult<()> {
            self.pending.lock().unwrap().push(VideoFrame::data(
                4,
                4,
                crate::frame::PixelFormat::Rgba8,
                crate::frame::FramePayload::Software { planes: vec![], strides: vec![] },
                packet.pts,
                Duration::ZERO,
                packet.serial,
            ));
            Ok(())
        }
        fn receive_frame(&mut self) -> crate::error::EngineResult<Option<VideoFrame>> {
            Ok(self.pending.lock().unwrap().pop())
        }
        fn flush(&mut self) {
            self.pending.lock().unwrap().clear();
        }
    }

    const TEST_TIMEOUT: StdDuration = StdDuration::from_millis(100);

    fn packet(pts: i64, serial: u64) -> Packet {
        Packet::data(Arc::from(vec![0u8; 2].into_boxed_slice()), Timestamp(pts), Timestamp(pts), Duration::ZERO, 0, true, MediaKind::Video, serial)
    }

    #[test]
    fn decodes_one_frame_per_packet() {
        let input = Arc::new(Pin::new(4));
        let output = Arc::new(Pin::new(4));
        let decoder = FakeDecoder { pending: Mutex::new(vec![]) };
        let mut node = VideoDecoderNode::new(Box::new(decoder), input.clone(), output.clone(), &EngineConfig::default());
        node.start();

        input.push(packet(1000, 0), TEST_TIMEOUT);
        let frame = output.pop(StdDuration::from_secs(2));
        assert!(matches!(frame, PopResult::Ready(f) if f.pts == Timestamp(1000)));

        node.stop();
    }

    #[test]
    fn eof_packet_drains_and_forwards_eof() {
        let input = Arc::new(Pin::new(4));
        let output = Arc::new(Pin::new(4));
        let decoder = FakeDecoder { pending: Mutex::new(vec![]) };
        let mut node = VideoDecoderNode::new(Box::new(decoder), input.clone(), output.clone(), &EngineConfig::default());
        node.start();

        input.push(Packet::eof(MediaKind::Video, 0), TEST_TIMEOUT);
        let eof = output.pop(StdDuration::from_secs(2));
        assert!(matches!(eof, PopResult::Ready(f) if f.is_eof()));

        node.stop();
    }
}
