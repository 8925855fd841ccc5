//! `FfmpegDemuxer`: opens a container, identifies its best video/audio
//! streams, and feeds the graph's Source node one packet at a time.

use std::path::Path;
use std::sync::Arc;

use ffmpeg_the_third as ffmpeg;
use ffmpeg::media::Type as MediaType;

use vstream_core::external::{Demuxer, MediaProperties};
use vstream_core::frame::{MediaKind, Packet};
use vstream_core::time::{rescale, Rational, Timestamp};
use vstream_core::{EngineError, EngineResult};

use crate::seek::seek_backward;

pub struct FfmpegDemuxer {
    ictx: ffmpeg::format::context::Input,
    video_stream: Option<usize>,
    audio_stream: Option<usize>,
    video_time_base: Rational,
    audio_time_base: Rational,
    properties: MediaProperties,
}

const ENGINE_TIME_BASE: Rational = Rational::new(1, 1_000_000);

impl FfmpegDemuxer {
    pub fn open(path: impl AsRef<Path>) -> EngineResult<Self> {
        let path = path.as_ref();
        let ictx = ffmpeg::format::input(&path).map_err(|e| EngineError::not_found_with_source(format!("{}: {e}", path.display()), e))?;

        let video_stream = ictx.streams().best(MediaType::Video).map(|s| s.index());
        let audio_stream = ictx.streams().best(MediaType::Audio).map(|s| s.index());

        if video_stream.is_none() && audio_stream.is_none() {
            return Err(EngineError::InvalidData(format!("{}: no video or audio stream", path.display())));
        }

        let mut video_time_base = Rational::new(1, 1);
        let mut width = 0u32;
        let mut height = 0u32;
        let mut frame_rate = None;
        if let Some(idx) = video_stream {
            let stream = ictx.stream(idx).expect("index came from this context");
            let tb = stream.time_base();
            video_time_base = Rational::new(tb.numerator(), tb.denominator());
            let params = stream.parameters();
            // SAFETY: `parameters()` exposes the raw AVCodecParameters pointer;
            // width/height live at a fixed offset regardless of codec.
            unsafe {
                let p = params.as_ptr();
                width = (*p).width.max(0) as u32;
                height = (*p).height.max(0) as u32;
            }
            let r = stream.rate();
            if r.numerator() > 0 {
                frame_rate = Some(Rational::new(r.numerator(), r.denominator()));
            }
        }

        let mut audio_time_base = Rational::new(1, 1);
        let mut sample_rate = None;
        let mut channels = None;
        if let Some(idx) = audio_stream {
            let stream = ictx.stream(idx).expect("index came from this context");
            let tb = stream.time_base();
            audio_time_base = Rational::new(tb.numerator(), tb.denominator());
            if let Ok(codec_ctx) = ffmpeg::codec::context::Context::from_parameters(stream.parameters()) {
                if let Ok(decoder) = codec_ctx.decoder().audio() {
                    sample_rate = Some(decoder.rate());
                    channels = Some(decoder.channels());
                }
            }
        }

        let duration_us = ictx.duration().max(0) * 1_000_000 / i64::from(ffmpeg::ffi::AV_TIME_BASE);

        let properties = MediaProperties {
            duration: Timestamp(duration_us),
            width,
            height,
            frame_rate,
            sample_rate,
            channels,
        };

        Ok(FfmpegDemuxer {
            ictx,
            video_stream,
            audio_stream,
            video_time_base,
            audio_time_base,
            properties,
        })
    }
}

impl Demuxer for FfmpegDemuxer {
    fn properties(&self) -> MediaProperties {
        self.properties
    }

    fn read_packet(&mut self) -> EngineResult<Option<Packet>> {
        loop {
            let next = self.ictx.packets().next();
            let Some((stream, packet)) = next else {
                return Ok(None);
            };

            let (media_kind, time_base) = if Some(stream.index()) == self.video_stream {
                (MediaKind::Video, self.video_time_base)
            } else if Some(stream.index()) == self.audio_stream {
                (MediaKind::Audio, self.audio_time_base)
            } else {
                continue;
            };

            let Some(data) = packet.data() else {
                continue;
            };

            let pts = packet.pts().map(|p| rescale(p, time_base, ENGINE_TIME_BASE)).unwrap_or(Timestamp::NONE.0);
            let dts = packet.dts().map(|d| rescale(d, time_base, ENGINE_TIME_BASE)).unwrap_or(Timestamp::NONE.0);
            let duration = rescale(packet.duration(), time_base, ENGINE_TIME_BASE);

            return Ok(Some(Packet::data(
                Arc::from(data.to_vec().into_boxed_slice()),
                Timestamp(pts),
                Timestamp(dts),
                vstream_core::time::Duration(duration),
                stream.index(),
                packet.is_key(),
                media_kind,
                0,
            )));
        }
    }

    fn seek(&mut self, pts: Timestamp) -> EngineResult<()> {
        let Some(stream_index) = self.video_stream.or(self.audio_stream) else {
            return Ok(());
        };
        let time_base = if Some(stream_index) == self.video_stream { self.video_time_base } else { self.audio_time_base };
        let target = rescale(pts.0, ENGINE_TIME_BASE, time_base);
        seek_backward(&mut self.ictx, stream_index, target)
    }
}
