//! Packet and frame data model flowing through the graph.
//!
//! Decoded payloads are `Arc`-backed: cloning a frame clones a handle, not
//! the pixels. Every item carries the pipeline `serial` it was produced
//! under, and EOF/error conditions are sentinel variants rather than
//! exceptions — the only control-flow signal that crosses a pin boundary.

use std::sync::Arc;

use crate::error::EngineError;
use crate::time::{Duration, Timestamp};

pub type Serial = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Video,
    Audio,
}

/// Discriminates a normal data item from the two sentinel conditions a
/// stage may emit in its place.
#[derive(Debug, Clone)]
pub enum ItemKind<T> {
    Data(T),
    Eof,
    Error(EngineError),
}

impl<T> ItemKind<T> {
    pub fn is_eof(&self) -> bool {
        matches!(self, ItemKind::Eof)
    }

    pub fn is_error(&self) -> bool {
        matches!(self, ItemKind::Error(_))
    }

    pub fn data(&self) -> Option<&T> {
        match self {
            ItemKind::Data(d) => Some(d),
            _ => None,
        }
    }
}

/// Compressed-data unit read by the source, consumed by a decoder.
#[derive(Debug, Clone)]
pub struct Packet {
    pub kind: ItemKind<Arc<[u8]>>,
    pub pts: Timestamp,
    pub dts: Timestamp,
    pub duration: Duration,
    pub stream_index: usize,
    pub key_frame: bool,
    pub media_kind: MediaKind,
    pub serial: Serial,
}

impl Packet {
    pub fn data(
        bytes: Arc<[u8]>,
        pts: Timestamp,
        dts: Timestamp,
        duration: Duration,
        stream_index: usize,
        key_frame: bool,
        media_kind: MediaKind,
        serial: Serial,
    ) -> Self {
        Packet {
            kind: ItemKind::Data(bytes),
            pts,
            dts,
            duration,
            stream_index,
            key_frame,
            media_kind,
            serial,
        }
    }

    pub fn eof(media_kind: MediaKind, serial: Serial) -> Self {
        Packet {
            kind: ItemKind::Eof,
            pts: Timestamp::NONE,
            dts: Timestamp::NONE,
            duration: Duration::ZERO,
            stream_index: 0,
            key_frame: false,
            media_kind,
            serial,
        }
    }

    pub fn is_eof(&self) -> bool {
        self.kind.is_eof()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    Rgba8,
    Yuv420p,
}

/// Either CPU-resident planes or an opaque hardware-accelerated handle.
#[derive(Debug, Clone)]
pub enum FramePayload {
    Software {
        planes: Vec<Arc<[u8]>>,
        strides: Vec<usize>,
    },
    Hardware {
        accel_kind: &'static str,
        handle: Arc<dyn std::any::Any + Send + Sync>,
    },
}

#[derive(Debug, Clone)]
pub struct VideoFrame {
    pub kind: ItemKind<FramePayload>,
    pub width: u32,
    pub height: u32,
    pub pixel_format: PixelFormat,
    pub pts: Timestamp,
    pub duration: Duration,
    pub serial: Serial,
}

impl VideoFrame {
    pub fn data(width: u32, height: u32, pixel_format: PixelFormat, payload: FramePayload, pts: Timestamp, duration: Duration, serial: Serial) -> Self {
        VideoFrame {
            kind: ItemKind::Data(payload),
            width,
            height,
            pixel_format,
            pts,
            duration,
            serial,
        }
    }

    pub fn eof(serial: Serial) -> Self {
        VideoFrame {
            kind: ItemKind::Eof,
            width: 0,
            height: 0,
            pixel_format: PixelFormat::Rgba8,
            pts: Timestamp::NONE,
            duration: Duration::ZERO,
            serial,
        }
    }

    pub fn error(err: EngineError, serial: Serial) -> Self {
        VideoFrame {
            kind: ItemKind::Error(err),
            width: 0,
            height: 0,
            pixel_format: PixelFormat::Rgba8,
            pts: Timestamp::NONE,
            duration: Duration::ZERO,
            serial,
        }
    }

    pub fn is_eof(&self) -> bool {
        self.kind.is_eof()
    }

    pub fn is_error(&self) -> bool {
        self.kind.is_error()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleFormat {
    I16Interleaved,
    I16Planar,
    F32Interleaved,
    F32Planar,
}

#[derive(Debug, Clone)]
pub struct AudioFrame {
    pub kind: ItemKind<Vec<Arc<[u8]>>>,
    pub sample_rate: u32,
    pub channels: u16,
    pub samples_per_channel: usize,
    pub sample_format: SampleFormat,
    pub pts: Timestamp,
    pub duration: Duration,
    pub serial: Serial,
}

impl AudioFrame {
    pub fn eof(serial: Serial) -> Self {
        AudioFrame {
            kind: ItemKind::Eof,
            sample_rate: 0,
            channels: 0,
            samples_per_channel: 0,
            sample_format: SampleFormat::I16Interleaved,
            pts: Timestamp::NONE,
            duration: Duration::ZERO,
            serial,
        }
    }

    pub fn error(err: EngineError, serial: Serial) -> Self {
        AudioFrame {
            kind: ItemKind::Error(err),
            sample_rate: 0,
            channels: 0,
            samples_per_channel: 0,
            sample_format: SampleFormat::I16Interleaved,
            pts: Timestamp::NONE,
            duration: Duration::ZERO,
            serial,
        }
    }

    pub fn is_eof(&self) -> bool {
        self.kind.is_eof()
    }

    pub fn is_error(&self) -> bool {
        self.kind.is_error()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn packet_eof_carries_no_payload() {
        let p = Packet::eof(MediaKind::Video, 3);
        assert!(p.is_eof());
        assert_eq!(p.serial, 3);
    }

    #[test]
    fn video_frame_error_sentinel_round_trips() {
        let f = VideoFrame::error(EngineError::decoder_error("bad nal"), 1);
        assert!(f.is_error());
        assert!(!f.is_eof());
    }

    #[test]
    fn item_kind_data_accessor() {
        let item: ItemKind<i32> = ItemKind::Data(42);
        assert_eq!(item.data(), Some(&42));
        let eof: ItemKind<i32> = ItemKind::Eof;
        assert_eq!(eof.data(), None);
    }
}
