//! `FfmpegDecoder`: the single-shot `Decoder` used for offline frame
//! fetching (prefetch, scrubbing) — as opposed to the graph's
//! packet-decoder nodes, which are driven by the Source node on the
//! playback thread. Both wrap the same ffmpeg send-packet/receive-frame
//! idiom; this one owns its own demuxer context so scrub requests never
//! contend with the live pipeline's.

use std::path::Path;

use ffmpeg_the_third as ffmpeg;
use ffmpeg::media::Type as MediaType;

use vstream_core::external::{AccelPreference, AudioPacketDecoder, Decoder, MediaProperties, OpenOptions, VideoPacketDecoder};
use vstream_core::frame::{AudioFrame, MediaKind, Packet, VideoFrame};
use vstream_core::time::{rescale, Rational, Timestamp};
use vstream_core::{EngineError, EngineResult};

use crate::audio_decoder::FfmpegAudioDecoder;
use crate::seek::seek_backward;
use crate::video_decoder::FfmpegVideoDecoder;

const ENGINE_TIME_BASE: Rational = Rational::new(1, 1_000_000);

pub struct FfmpegDecoder {
    ictx: ffmpeg::format::context::Input,
    video_stream: Option<usize>,
    audio_stream: Option<usize>,
    video_time_base: Rational,
    audio_time_base: Rational,
    video_decoder: Option<FfmpegVideoDecoder>,
    audio_decoder: Option<FfmpegAudioDecoder>,
    properties: MediaProperties,
    at_eof: bool,
}

impl FfmpegDecoder {
    pub fn open(path: impl AsRef<Path>, options: &OpenOptions) -> EngineResult<Self> {
        if options.accel == AccelPreference::PreferHardware {
            log::debug!("[FfmpegDecoder] hardware acceleration requested but this build only offers software decode; continuing on CPU");
        }
        log::debug!("[FfmpegDecoder] opening {} with thread_count hint {}", path.as_ref().display(), options.thread_count);

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
        let mut video_decoder = None;
        if let Some(idx) = video_stream {
            let stream = ictx.stream(idx).expect("index came from this context");
            let tb = stream.time_base();
            video_time_base = Rational::new(tb.numerator(), tb.denominator());
            // SAFETY: see FfmpegDemuxer::open — same fixed-offset width/height read.
            unsafe {
                let p = stream.parameters().as_ptr();
                width = (*p).width.max(0) as u32;
                height = (*p).height.max(0) as u32;
            }
            let r = stream.rate();
            if r.numerator() > 0 {
                frame_rate = Some(Rational::new(r.numerator(), r.denominator()));
            }
            video_decoder = Some(FfmpegVideoDecoder::new(stream.parameters(), video_time_base)?);
        }

        let mut audio_time_base = Rational::new(1, 1);
        let mut sample_rate = None;
        let mut channels = None;
        let mut audio_decoder = None;
        if let Some(idx) = audio_stream {
            let stream = ictx.stream(idx).expect("index came from this context");
            let tb = stream.time_base();
            audio_time_base = Rational::new(tb.numerator(), tb.denominator());
            let decoder = FfmpegAudioDecoder::new(stream.parameters(), audio_time_base)?;
            if let Ok(codec_ctx) = ffmpeg::codec::context::Context::from_parameters(stream.parameters()) {
                if let Ok(probe) = codec_ctx.decoder().audio() {
                    sample_rate = Some(probe.rate());
                    channels = Some(probe.channels());
                }
            }
            audio_decoder = Some(decoder);
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

        Ok(FfmpegDecoder {
            ictx,
            video_stream,
            audio_stream,
            video_time_base,
            audio_time_base,
            video_decoder,
            audio_decoder,
            properties,
            at_eof: false,
        })
    }

    fn next_packet_for(&mut self, wanted: MediaKind) -> EngineResult<Option<Packet>> {
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
            if media_kind != wanted {
                continue;
            }

            let Some(data) = packet.data() else {
                continue;
            };
            let pts = packet.pts().map(|p| rescale(p, time_base, ENGINE_TIME_BASE)).unwrap_or(Timestamp::NONE.0);
            let dts = packet.dts().map(|d| rescale(d, time_base, ENGINE_TIME_BASE)).unwrap_or(Timestamp::NONE.0);
            let duration = rescale(packet.duration(), time_base, ENGINE_TIME_BASE);

            return Ok(Some(Packet::data(
                std::sync::Arc::from(data.to_vec().into_boxed_slice()),
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
}

impl Decoder for FfmpegDecoder {
    fn properties(&self) -> MediaProperties {
        self.properties
    }

    fn seek(&mut self, pts: Timestamp) -> EngineResult<()> {
        let Some(stream_index) = self.video_stream.or(self.audio_stream) else {
            return Ok(());
        };
        let time_base = if Some(stream_index) == self.video_stream { self.video_time_base } else { self.audio_time_base };
        let target = rescale(pts.0, ENGINE_TIME_BASE, time_base);
        self.at_eof = false;
        if let Some(d) = &mut self.video_decoder {
            d.flush();
        }
        if let Some(d) = &mut self.audio_decoder {
            d.flush();
        }
        seek_backward(&mut self.ictx, stream_index, target)
    }

    fn decode_next_video_frame(&mut self) -> EngineResult<Option<VideoFrame>> {
        let Some(decoder) = &mut self.video_decoder else {
            return Ok(None);
        };
        if let Some(frame) = decoder.receive_frame()? {
            return Ok(Some(frame));
        }
        loop {
            match self.next_packet_for(MediaKind::Video)? {
                Some(packet) => {
                    self.video_decoder.as_mut().expect("checked above").send_packet(&packet)?;
                    if let Some(frame) = self.video_decoder.as_mut().expect("checked above").receive_frame()? {
                        return Ok(Some(frame));
                    }
                }
                None => {
                    self.at_eof = true;
                    return self.video_decoder.as_mut().expect("checked above").receive_frame();
                }
            }
        }
    }

    fn decode_next_audio_frame(&mut self) -> EngineResult<Option<AudioFrame>> {
        let Some(decoder) = &mut self.audio_decoder else {
            return Ok(None);
        };
        if let Some(frame) = decoder.receive_frame()? {
            return Ok(Some(frame));
        }
        loop {
            match self.next_packet_for(MediaKind::Audio)? {
                Some(packet) => {
                    self.audio_decoder.as_mut().expect("checked above").send_packet(&packet)?;
                    if let Some(frame) = self.audio_decoder.as_mut().expect("checked above").receive_frame()? {
                        return Ok(Some(frame));
                    }
                }
                None => {
                    self.at_eof = true;
                    return self.audio_decoder.as_mut().expect("checked above").receive_frame();
                }
            }
        }
    }

    fn close(&mut self) {
        if let Some(d) = &mut self.video_decoder {
            d.flush();
        }
        if let Some(d) = &mut self.audio_decoder {
            d.flush();
        }
    }
}
