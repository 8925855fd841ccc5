//! External interfaces consumed by the core: a decoder abstraction, a
//! display surface, and an audio device. Concrete implementations (ffmpeg,
//! cpal, a software framebuffer) live in a sibling crate so the core stays
//! free of codec and hardware dependencies and can be unit tested against a
//! fake.

use crate::error::EngineResult;
use crate::frame::{AudioFrame, Packet, VideoFrame};
use crate::time::{Rational, Timestamp};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccelPreference {
    SoftwareOnly,
    PreferHardware,
}

#[derive(Debug, Clone)]
pub struct OpenOptions {
    pub accel: AccelPreference,
    pub thread_count: usize,
}

impl Default for OpenOptions {
    fn default() -> Self {
        OpenOptions {
            accel: AccelPreference::SoftwareOnly,
            thread_count: 1,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct MediaProperties {
    pub duration: Timestamp,
    pub width: u32,
    pub height: u32,
    pub frame_rate: Option<Rational>,
    pub sample_rate: Option<u32>,
    pub channels: Option<u16>,
}

/// Single-shot "open a path, fetch frames on demand" interface for offline
/// decode work (prefetch into the frame cache, scrubbing) — distinct from
/// the Source/Decoder *nodes*, which are driven by [`Demuxer`] and the
/// packet-decoder traits below on the live playback thread. An embedding
/// application pairs this with [`crate::frame_cache::FrameCache`] to feed
/// prefetched frames in; implemented by `vstream-media`'s ffmpeg-backed
/// adapter.
pub trait Decoder: Send {
    fn properties(&self) -> MediaProperties;
    fn seek(&mut self, pts: Timestamp) -> EngineResult<()>;
    fn decode_next_video_frame(&mut self) -> EngineResult<Option<VideoFrame>>;
    fn decode_next_audio_frame(&mut self) -> EngineResult<Option<AudioFrame>>;
    fn close(&mut self);
}

/// Display surface the video sink draws into.
pub trait Renderer: Send {
    fn init(&mut self, width: u32, height: u32, title: &str) -> EngineResult<()>;
    fn draw(&mut self, frame: &VideoFrame) -> EngineResult<()>;
    fn present(&mut self) -> EngineResult<()>;
    fn resize(&mut self, width: u32, height: u32) -> EngineResult<()>;
    fn shutdown(&mut self);
}

/// Audio output device the audio sink writes resampled bytes to.
pub trait AudioDevice: Send {
    fn open(&mut self, sample_rate: u32, channels: u16, buffer_samples: usize) -> EngineResult<()>;
    fn pause(&mut self, paused: bool);
    fn close(&mut self);
}

/// Demuxer driving the Source node: opens a container and reads packets for
/// its best video/audio streams. Distinct from [`Decoder`] above, which is
/// the higher-level "open a path, get frames" interface used for offline
/// frame fetching (prefetch, scrubbing) — see this project's resolved
/// design notes on the two decoder stacks.
pub trait Demuxer: Send {
    fn properties(&self) -> MediaProperties;
    /// Read the next packet from either stream, or `None` once both streams
    /// have reached end of file.
    fn read_packet(&mut self) -> EngineResult<Option<Packet>>;
    /// Backward-flag seek; does not flush downstream queues (the pipeline does).
    fn seek(&mut self, pts: Timestamp) -> EngineResult<()>;
}

/// Consumes video packets, produces video frames, classic send/receive loop.
pub trait VideoPacketDecoder: Send {
    fn send_packet(&mut self, packet: &Packet) -> EngineResult<()>;
    /// `Ok(None)` means EAGAIN — the caller should read another packet.
    fn receive_frame(&mut self) -> EngineResult<Option<VideoFrame>>;
    fn flush(&mut self);
}

/// Consumes audio packets, produces audio frames, classic send/receive loop.
pub trait AudioPacketDecoder: Send {
    fn send_packet(&mut self, packet: &Packet) -> EngineResult<()>;
    fn receive_frame(&mut self) -> EngineResult<Option<AudioFrame>>;
    fn flush(&mut self);
}

/// Converts a decoded audio frame to the device's target format (typically
/// interleaved signed-16 stereo at 48 kHz), producing raw bytes ready for
/// the ring buffer.
pub trait AudioResampler: Send {
    fn convert(&mut self, frame: &AudioFrame) -> EngineResult<Vec<u8>>;
}
