//! `FfmpegVideoDecoder`: classic send-packet/receive-frame loop over an
//! ffmpeg video codec context, scaling every decoded frame to packed RGBA8
//! so the rest of the graph never has to reason about a codec's native
//! pixel format.

use std::sync::Arc;

use ffmpeg_the_third as ffmpeg;
use ffmpeg::format::Pixel;
use ffmpeg::software::scaling::{context::Context as SwsContext, flag::Flags};

use vstream_core::external::VideoPacketDecoder;
use vstream_core::frame::{FramePayload, ItemKind, Packet, PixelFormat, Serial, VideoFrame};
use vstream_core::time::{rescale, Duration, Rational, Timestamp};
use vstream_core::{EngineError, EngineResult};

const ENGINE_TIME_BASE: Rational = Rational::new(1, 1_000_000);

pub struct FfmpegVideoDecoder {
    decoder: ffmpeg::decoder::Video,
    scaler: SwsContext,
    time_base: Rational,
    width: u32,
    height: u32,
    last_serial: Serial,
}

impl FfmpegVideoDecoder {
    pub fn new(params: ffmpeg::codec::parameters::Parameters, time_base: Rational) -> EngineResult<Self> {
        let codec_ctx = ffmpeg::codec::context::Context::from_parameters(params).map_err(|e| EngineError::CodecNotFound(e.to_string()))?;
        let decoder = codec_ctx.decoder().video().map_err(|e| EngineError::CodecNotFound(e.to_string()))?;
        let width = decoder.width();
        let height = decoder.height();
        let scaler = SwsContext::get(decoder.format(), width, height, Pixel::RGBA, width, height, Flags::BILINEAR).map_err(|e| EngineError::decoder_error_with_source(e.to_string(), e))?;
        Ok(FfmpegVideoDecoder { decoder, scaler, time_base, width, height, last_serial: 0 })
    }
}

impl VideoPacketDecoder for FfmpegVideoDecoder {
    fn send_packet(&mut self, packet: &Packet) -> EngineResult<()> {
        let ItemKind::Data(bytes) = &packet.kind else {
            return Ok(());
        };
        self.last_serial = packet.serial;
        let av_packet = ffmpeg::codec::packet::Packet::copy(bytes);
        self.decoder.send_packet(&av_packet).map_err(|e| EngineError::decoder_error_with_source(e.to_string(), e))
    }

    fn receive_frame(&mut self) -> EngineResult<Option<VideoFrame>> {
        let mut decoded = ffmpeg::util::frame::video::Video::empty();
        // Any error here (including EAGAIN) means "nothing ready yet" — the
        // caller reads another packet and tries again.
        if self.decoder.receive_frame(&mut decoded).is_err() {
            return Ok(None);
        }

        let mut scaled = ffmpeg::util::frame::video::Video::empty();
        self.scaler.run(&decoded, &mut scaled).map_err(|e| EngineError::decoder_error_with_source(e.to_string(), e))?;

        let stride = scaled.stride(0);
        let raw = scaled.data(0);
        let row_bytes = self.width as usize * 4;
        let mut data = Vec::with_capacity(row_bytes * self.height as usize);
        for row in 0..self.height as usize {
            let start = row * stride;
            data.extend_from_slice(&raw[start..start + row_bytes]);
        }

        let pts = decoded.pts().map(|p| rescale(p, self.time_base, ENGINE_TIME_BASE)).unwrap_or(Timestamp::NONE.0);

        Ok(Some(VideoFrame::data(
            self.width,
            self.height,
            PixelFormat::Rgba8,
            FramePayload::Software { planes: vec![Arc::from(data.into_boxed_slice())], strides: vec![row_bytes] },
            Timestamp(pts),
            Duration::ZERO,
            self.last_serial,
        )))
    }

    fn flush(&mut self) {
        self.decoder.flush();
    }
}
