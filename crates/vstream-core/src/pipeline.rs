//! Pipeline controller: owns every node in the graph, wires their pins
//! together, and drives the state machine (start order, stop order, seek
//! protocol, pre-roll) that the individual nodes know nothing about.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration as StdDuration;

use parking_lot::Mutex;

use crate::clock::MasterClock;
use crate::config::EngineConfig;
use crate::error::EngineResult;
use crate::external::{AudioResampler, Demuxer, Renderer, VideoPacketDecoder};
use crate::external::AudioPacketDecoder;
use crate::frame::{AudioFrame, Packet, VideoFrame};
use crate::node::Node;
use crate::nodes::{AudioDecoderNode, AudioSinkNode, SourceNode, VideoDecoderNode, VideoSinkNode};
use crate::pin::Pin;
use crate::ring_buffer::RingBuffer;
use crate::time::Timestamp;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Stopped,
    Buffering,
    Playing,
    Paused,
    Seeking,
    Error,
}

type EofCallback = Box<dyn Fn() + Send>;
type ErrorCallback = Box<dyn Fn(&str) + Send>;

/// Owns the whole graph for one media source: a [`SourceNode`] feeding two
/// decoders, each feeding a sink. The five nodes never talk to each other
/// directly — only this controller knows the topology.
pub struct Pipeline {
    config: EngineConfig,
    clock: Arc<MasterClock>,
    serial: Arc<AtomicU64>,
    state: Mutex<PipelineState>,

    source: SourceNode,
    video_decoder: VideoDecoderNode,
    audio_decoder: AudioDecoderNode,
    video_sink: VideoSinkNode,
    audio_sink: AudioSinkNode,

    video_packets: Arc<Pin<Packet>>,
    audio_packets: Arc<Pin<Packet>>,
    video_frames: Arc<Pin<VideoFrame>>,
    audio_frames: Arc<Pin<AudioFrame>>,

    video_ready: Arc<AtomicBool>,
    audio_ready: Arc<AtomicBool>,
    video_eof: Arc<AtomicBool>,
    preroll_worker: Option<JoinHandle<()>>,

    on_eof: Arc<Mutex<Option<EofCallback>>>,
    on_error: Arc<Mutex<Option<ErrorCallback>>>,
}

impl Pipeline {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        demuxer: Box<dyn Demuxer>,
        video_decoder: Box<dyn VideoPacketDecoder>,
        audio_decoder: Box<dyn AudioPacketDecoder>,
        renderer: Box<dyn Renderer>,
        resampler: Box<dyn AudioResampler>,
        ring_buffer: Arc<RingBuffer>,
        config: EngineConfig,
    ) -> Self {
        let clock = Arc::new(MasterClock::with_thresholds(
            crate::time::Duration(config.sync_wait_threshold_us),
            crate::time::Duration(config.sync_drop_threshold_us),
            crate::time::Duration(config.sync_rush_threshold_us),
        ));
        let serial = Arc::new(AtomicU64::new(0));

        let video_packets = Arc::new(Pin::new(config.packet_queue_capacity));
        let audio_packets = Arc::new(Pin::new(config.packet_queue_capacity));
        let video_frames = Arc::new(Pin::new(config.video_queue_capacity));
        let audio_frames = Arc::new(Pin::new(config.audio_queue_capacity));

        let source = SourceNode::new(demuxer, video_packets.clone(), audio_packets.clone(), serial.clone(), &config);
        let video_decoder_node = VideoDecoderNode::new(video_decoder, video_packets.clone(), video_frames.clone(), &config);
        let audio_decoder_node = AudioDecoderNode::new(audio_decoder, audio_packets.clone(), audio_frames.clone(), &config);
        let video_sink = VideoSinkNode::new(video_frames.clone(), renderer, clock.clone(), serial.clone(), &config);
        let audio_sink = AudioSinkNode::new(audio_frames.clone(), resampler, ring_buffer, serial.clone(), &config);

        let video_ready = Arc::new(AtomicBool::new(false));
        let audio_ready = Arc::new(AtomicBool::new(false));
        let video_eof = Arc::new(AtomicBool::new(false));

        {
            let flag = video_ready.clone();
            video_sink.set_ready_callback(move || flag.store(true, Ordering::Release));
        }
        {
            let flag = audio_ready.clone();
            audio_sink.set_ready_callback(move || flag.store(true, Ordering::Release));
        }
        {
            let flag = video_eof.clone();
            video_sink.set_eof_callback(move || flag.store(true, Ordering::Release));
        }

        Pipeline {
            config,
            clock,
            serial,
            state: Mutex::new(PipelineState::Stopped),
            source,
            video_decoder: video_decoder_node,
            audio_decoder: audio_decoder_node,
            video_sink,
            audio_sink,
            video_packets,
            audio_packets,
            video_frames,
            audio_frames,
            video_ready,
            audio_ready,
            video_eof,
            preroll_worker: None,
            on_eof: Arc::new(Mutex::new(None)),
            on_error: Arc::new(Mutex::new(None)),
        }
    }

    pub fn state(&self) -> PipelineState {
        *self.state.lock()
    }

    pub fn clock(&self) -> Arc<MasterClock> {
        self.clock.clone()
    }

    pub fn set_eof_callback(&self, cb: impl Fn() + Send + 'static) {
        *self.on_eof.lock() = Some(Box::new(cb));
    }

    pub fn set_error_callback(&self, cb: impl Fn(&str) + Send + 'static) {
        *self.on_error.lock() = Some(Box::new(cb));
    }

    /// Brings up every node (sinks, then decoders, then the source — a
    /// consumer is always ready before its producer starts pushing) and
    /// kicks off pre-roll.
    pub fn start(&mut self, has_audio: bool) {
        *self.state.lock() = PipelineState::Buffering;
        self.clock.set_has_audio_source(has_audio);
        self.video_ready.store(false, Ordering::Release);
        self.audio_ready.store(false, Ordering::Release);
        self.video_eof.store(false, Ordering::Release);

        self.video_sink.start();
        self.audio_sink.start();
        self.video_decoder.start();
        self.audio_decoder.start();
        self.source.start();

        self.begin_preroll(has_audio);
    }

    /// Tears every node down in the reverse order they were started: the
    /// source first (so it stops producing), then decoders, then sinks.
    pub fn stop(&mut self) {
        self.source.stop();
        self.video_decoder.stop();
        self.audio_decoder.stop();
        self.video_sink.stop();
        self.audio_sink.stop();
        if let Some(handle) = self.preroll_worker.take() {
            let _ = handle.join();
        }
        *self.state.lock() = PipelineState::Stopped;
    }

    pub fn pause(&mut self) {
        self.clock.pause();
        self.source.pause_reading();
        *self.state.lock() = PipelineState::Paused;
    }

    pub fn resume(&mut self) {
        self.clock.resume();
        self.source.resume_reading();
        *self.state.lock() = PipelineState::Playing;
    }

    /// Seven-step seek protocol: bump the serial so in-flight items are
    /// recognized as stale downstream, pause the clock, flush every pin,
    /// reposition the demuxer and the clock, then re-run pre-roll before
    /// resuming playback.
    pub fn seek(&mut self, target: Timestamp, has_audio: bool) -> EngineResult<()> {
        *self.state.lock() = PipelineState::Seeking;
        self.serial.fetch_add(1, Ordering::AcqRel);
        self.clock.pause();

        self.video_packets.flush();
        self.audio_packets.flush();
        self.video_frames.flush();
        self.audio_frames.flush();

        self.source.seek_to(target).map_err(|e| e.logged())?;
        self.clock.seek(target);

        self.video_ready.store(false, Ordering::Release);
        self.audio_ready.store(false, Ordering::Release);
        self.video_eof.store(false, Ordering::Release);
        self.begin_preroll(has_audio);
        Ok(())
    }

    /// Blocks on a background thread until both required streams have
    /// produced their first in-serial frame, or `preroll_timeout_ms`
    /// elapses — at which point playback falls back to wall-clock mode
    /// rather than waiting on a stream that may never arrive.
    fn begin_preroll(&mut self, has_audio: bool) {
        let video_ready = self.video_ready.clone();
        let audio_ready = self.audio_ready.clone();
        let clock = self.clock.clone();
        let timeout = StdDuration::from_millis(self.config.preroll_timeout_ms);

        if let Some(handle) = self.preroll_worker.take() {
            let _ = handle.join();
        }

        self.preroll_worker = Some(std::thread::spawn(move || {
            let deadline = std::time::Instant::now() + timeout;
            loop {
                let video_done = video_ready.load(Ordering::Acquire);
                let audio_done = !has_audio || audio_ready.load(Ordering::Acquire);
                if video_done && audio_done {
                    clock.set_wall_clock_mode(false);
                    clock.resume();
                    return;
                }
                if std::time::Instant::now() >= deadline {
                    log::warn!("[Pipeline] pre-roll timed out after {}ms, falling back to wall-clock mode", timeout.as_millis());
                    clock.set_wall_clock_mode(true);
                    clock.resume();
                    return;
                }
                std::thread::sleep(StdDuration::from_millis(10));
            }
        }));

        *self.state.lock() = PipelineState::Buffering;
    }

    /// Should be polled (or driven by the sinks' own callbacks) to notice
    /// that both streams reached end of file and fire the EOF callback once.
    pub fn poll_eof(&self) {
        if self.video_eof.load(Ordering::Acquire) {
            *self.state.lock() = PipelineState::Stopped;
            if let Some(cb) = self.on_eof.lock().as_ref() {
                cb();
            }
        }
    }

    pub fn report_error(&self, message: &str) {
        *self.state.lock() = PipelineState::Error;
        if let Some(cb) = self.on_error.lock().as_ref() {
            cb(message);
        }
    }

    pub fn video_frames_rendered(&self) -> u64 {
        self.video_sink.frames_rendered()
    }

    pub fn video_frames_dropped(&self) -> u64 {
        self.video_sink.frames_dropped()
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline").field("state", &self.state()).finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::external::MediaProperties;
    use crate::frame::{FramePayload, PixelFormat};
    use crate::time::Duration;
    use std::sync::Mutex as StdMutex;

    struct EmptyDemuxer;
    impl Demuxer for EmptyDemuxer {
        fn properties(&self) -> MediaProperties {
            MediaProperties::default()
        }
        fn read_packet(&mut self) -> EngineResult<Option<Packet>> {
            Ok(None)
        }
        fn seek(&mut self, _pts: Timestamp) -> EngineResult<()> {
            Ok(())
        }
    }

    struct OneFrameVideoDecoder {
        emitted: StdMutex<bool>,
    }
    impl VideoPacketDecoder for OneFrameVideoDecoder {
        fn send_packet(&mut self, _packet: &Packet) -> EngineResult<()> {
            Ok(())
        }
        fn receive_frame(&mut self) -> EngineResult<Option<VideoFrame>> {
            let mut emitted = self.emitted.lock().unwrap();
            if *emitted {
                return Ok(None);
            }
            *emitted = true;
            Ok(Some(VideoFrame::data(4, 4, PixelFormat::Rgba8, FramePayload::Software { planes: vec![], strides: vec![] }, Timestamp(0), Duration::ZERO, 0)))
        }
        fn flush(&mut self) {}
    }

    struct NullAudioDecoder;
    impl AudioPacketDecoder for NullAudioDecoder {
        fn send_packet(&mut self, _packet: &Packet) -> EngineResult<()> {
            Ok(())
        }
        fn receive_frame(&mut self) -> EngineResult<Option<AudioFrame>> {
            Ok(None)
        }
        fn flush(&mut self) {}
    }

    struct NullRenderer;
    impl Renderer for NullRenderer {
        fn init(&mut self, _w: u32, _h: u32, _title: &str) -> EngineResult<()> {
            Ok(())
        }
        fn draw(&mut self, _frame: &VideoFrame) -> EngineResult<()> {
            Ok(())
        }
        fn present(&mut self) -> EngineResult<()> {
            Ok(())
        }
        fn resize(&mut self, _w: u32, _h: u32) -> EngineResult<()> {
            Ok(())
        }
        fn shutdown(&mut self) {}
    }

    struct NullResampler;
    impl AudioResampler for NullResampler {
        fn convert(&mut self, _frame: &AudioFrame) -> EngineResult<Vec<u8>> {
            Ok(vec![])
        }
    }

    fn build_pipeline() -> Pipeline {
        let mut config = EngineConfig::default();
        config.preroll_timeout_ms = 200;
        let ring_buffer = Arc::new(RingBuffer::new(config.ring_buffer_capacity));
        Pipeline::new(
            Box::new(EmptyDemuxer),
            Box::new(OneFrameVideoDecoder { emitted: StdMutex::new(false) }),
            Box::new(NullAudioDecoder),
            Box::new(NullRenderer),
            Box::new(NullResampler),
            ring_buffer,
            config,
        )
    }

    #[test]
    fn starts_in_buffering_then_falls_back_to_wall_clock_after_preroll_timeout() {
        let mut p = build_pipeline();
        p.start(false);
        assert_eq!(p.state(), PipelineState::Buffering);
        std::thread::sleep(StdDuration::from_millis(400));
        assert!(p.clock().is_wall_clock_mode());
        assert!(!p.clock().is_paused());
        p.stop();
        assert_eq!(p.state(), PipelineState::Stopped);
    }

    #[test]
    fn pause_then_resume_round_trips_clock_state() {
        let mut p = build_pipeline();
        p.start(false);
        std::thread::sleep(StdDuration::from_millis(50));
        p.pause();
        assert_eq!(p.state(), PipelineState::Paused);
        assert!(p.clock().is_paused());
        p.resume();
        assert_eq!(p.state(), PipelineState::Playing);
        assert!(!p.clock().is_paused());
        p.stop();
    }

    #[test]
    fn seek_bumps_serial_and_reenters_buffering() {
        let mut p = build_pipeline();
        p.start(false);
        std::thread::sleep(StdDuration::from_millis(50));
        let serial_before = p.serial.load(Ordering::Acquire);
        p.seek(Timestamp(1_000_000), false).unwrap();
        assert_eq!(p.serial.load(Ordering::Acquire), serial_before + 1);
        assert_eq!(p.clock().now(), Timestamp(1_000_000));
        p.stop();
    }

    #[test]
    fn eof_callback_fires_once_video_reaches_eof() {
        let mut p = build_pipeline();
        let fired = Arc::new(AtomicBool::new(false));
        let fired2 = fired.clone();
        p.set_eof_callback(move || fired2.store(true, Ordering::SeqCst));
        p.start(false);
        std::thread::sleep(StdDuration::from_millis(100));
        p.poll_eof();
        assert!(fired.load(Ordering::SeqCst));
        p.stop();
    }
}
