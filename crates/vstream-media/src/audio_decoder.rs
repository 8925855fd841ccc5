//! `FfmpegAudioDecoder`: the audio counterpart of
//! [`crate::video_decoder::FfmpegVideoDecoder`] — send-packet/receive-frame
//! over the codec's native PCM layout. Format conversion to the output
//! device's layout is a separate concern, handled downstream by
//! [`crate::resampler::FfmpegResampler`].

use std::sync::Arc;

use ffmpeg_the_third as ffmpeg;
use ffmpeg::util::format::sample::{Sample, Type as SampleType};

use vstream_core::external::AudioPacketDecoder;
use vstream_core::frame::{AudioFrame, ItemKind, Packet, SampleFormat, Serial};
use vstream_core::time::{rescale, Duration, Rational, Timestamp};
use vstream_core::{EngineError, EngineResult};

const ENGINE_TIME_BASE: Rational = Rational::new(1, 1_000_000);

pub struct FfmpegAudioDecoder {
    decoder: ffmpeg::decoder::Audio,
    time_base: Rational,
    last_serial: Serial,
}

impl FfmpegAudioDecoder {
    pub fn new(params: ffmpeg::codec::parameters::Parameters, time_base: Rational) -> EngineResult<Self> {
        let codec_ctx = ffmpeg::codec::context::Context::from_parameters(params).map_err(|e| EngineError::CodecNotFound(e.to_string()))?;
        let decoder = codec_ctx.decoder().audio().map_err(|e| EngineError::CodecNotFound(e.to_string()))?;
        Ok(FfmpegAudioDecoder { decoder, time_base, last_serial: 0 })
    }
}

fn map_sample_format(format: Sample) -> SampleFormat {
    match format {
        Sample::I16(SampleType::Packed) => SampleFormat::I16Interleaved,
        Sample::I16(SampleType::Planar) => SampleFormat::I16Planar,
        Sample::F32(SampleType::Packed) => SampleFormat::F32Interleaved,
        Sample::F32(SampleType::Planar) => SampleFormat::F32Planar,
        // Any other native layout (u8, s32, f64, ...) is uncommon for the
        // codecs this graph targets; fold it to interleaved f32, the widest
        // format the resampler downstream accepts as input.
        _ => SampleFormat::F32Interleaved,
    }
}

impl AudioPacketDecoder for FfmpegAudioDecoder {
    fn send_packet(&mut self, packet: &Packet) -> EngineResult<()> {
        let ItemKind::Data(bytes) = &packet.kind else {
            return Ok(());
        };
        self.last_serial = packet.serial;
        let av_packet = ffmpeg::codec::packet::Packet::copy(bytes);
        self.decoder.send_packet(&av_packet).map_err(|e| EngineError::decoder_error_with_source(e.to_string(), e))
    }

    fn receive_frame(&mut self) -> EngineResult<Option<AudioFrame>> {
        let mut decoded = ffmpeg::util::frame::audio::Audio::empty();
        if self.decoder.receive_frame(&mut decoded).is_err() {
            return Ok(None);
        }

        let sample_format = map_sample_format(decoded.format());
        let channels = decoded.ch_layout().channels() as u16;
        let samples_per_channel = decoded.samples();
        let is_planar = matches!(sample_format, SampleFormat::I16Planar | SampleFormat::F32Planar);
        let plane_count = if is_planar { channels as usize } else { 1 };

        let mut planes = Vec::with_capacity(plane_count);
        for i in 0..plane_count {
            planes.push(Arc::from(decoded.data(i).to_vec().into_boxed_slice()));
        }

        let pts = decoded.pts().map(|p| rescale(p, self.time_base, ENGINE_TIME_BASE)).unwrap_or(Timestamp::NONE.0);
        let duration = Duration::from_secs_f64(samples_per_channel as f64 / decoded.rate().max(1) as f64);

        Ok(Some(AudioFrame {
            kind: ItemKind::Data(planes),
            sample_rate: decoded.rate(),
            channels,
            samples_per_channel,
            sample_format,
            pts: Timestamp(pts),
            duration,
            serial: self.last_serial,
        }))
    }

    fn flush(&mut self) {
        self.decoder.flush();
    }
}
