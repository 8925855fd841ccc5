//! `FfmpegResampler`: wraps ffmpeg's software resampling context to convert
//! a decoded [`AudioFrame`] into packed signed-16 bytes at the audio
//! device's configured rate/channel count, ready for the ring buffer.

use ffmpeg_the_third as ffmpeg;
use ffmpeg::software::resampling::context::Context as SwrContext;
use ffmpeg::util::channel_layout::ChannelLayout;
use ffmpeg::util::format::sample::{Sample, Type as SampleType};

use vstream_core::external::AudioResampler;
use vstream_core::frame::{AudioFrame, ItemKind, SampleFormat};
use vstream_core::EngineResult;
use vstream_core::EngineError;

fn to_ffmpeg_sample(format: SampleFormat) -> Sample {
    match format {
        SampleFormat::I16Interleaved => Sample::I16(SampleType::Packed),
        SampleFormat::I16Planar => Sample::I16(SampleType::Planar),
        SampleFormat::F32Interleaved => Sample::F32(SampleType::Packed),
        SampleFormat::F32Planar => Sample::F32(SampleType::Planar),
    }
}

fn channel_layout_for(channels: u16) -> ChannelLayout {
    match channels {
        1 => ChannelLayout::MONO,
        2 => ChannelLayout::STEREO,
        n => ChannelLayout::default(n as i32),
    }
}

pub struct FfmpegResampler {
    target_sample_rate: u32,
    target_channels: u16,
    ctx: Option<SwrContext>,
    src_sample_rate: u32,
    src_channels: u16,
    src_format: SampleFormat,
}

impl FfmpegResampler {
    /// `target_sample_rate`/`target_channels` describe the audio device's
    /// opened format; output bytes are always packed signed-16, the format
    /// `cpal`'s `I16` sample type and most output devices want.
    pub fn new(target_sample_rate: u32, target_channels: u16) -> Self {
        FfmpegResampler {
            target_sample_rate,
            target_channels,
            ctx: None,
            src_sample_rate: 0,
            src_channels: 0,
            src_format: SampleFormat::I16Interleaved,
        }
    }

    fn ensure_context(&mut self, frame: &AudioFrame) -> EngineResult<()> {
        let needs_rebuild = self.ctx.is_none() || self.src_sample_rate != frame.sample_rate || self.src_channels != frame.channels || self.src_format != frame.sample_format;
        if !needs_rebuild {
            return Ok(());
        }

        let src_format = to_ffmpeg_sample(frame.sample_format);
        let src_layout = channel_layout_for(frame.channels);
        let dst_layout = channel_layout_for(self.target_channels);

        let ctx = SwrContext::get(src_format, src_layout, frame.sample_rate, Sample::I16(SampleType::Packed), dst_layout, self.target_sample_rate)
            .map_err(|e| EngineError::device_error_with_source(format!("building audio resampler: {e}"), e))?;

        self.ctx = Some(ctx);
        self.src_sample_rate = frame.sample_rate;
        self.src_channels = frame.channels;
        self.src_format = frame.sample_format;
        Ok(())
    }

    /// Builds an owned ffmpeg frame from our engine-native planes so swr has
    /// something to read from; the planes are copied once here rather than
    /// held by reference since swr's input frame must own contiguous,
    /// correctly-strided ffmpeg buffers.
    fn build_source_frame(frame: &AudioFrame) -> EngineResult<ffmpeg::util::frame::audio::Audio> {
        let ItemKind::Data(planes) = &frame.kind else {
            return Err(EngineError::InvalidData("resampler given a non-data audio frame".into()));
        };

        let format = to_ffmpeg_sample(frame.sample_format);
        let layout = channel_layout_for(frame.channels);
        let mut src = ffmpeg::util::frame::audio::Audio::new(format, frame.samples_per_channel, layout);
        src.set_rate(frame.sample_rate);

        // SAFETY: `Audio::new` allocates planes sized for `format`/`samples`/
        // `layout`; we copy exactly the bytes our decoder produced for each
        // plane into the frame's own buffer before handing it to swr.
        unsafe {
            let raw = src.as_mut_ptr();
            for (i, plane) in planes.iter().enumerate() {
                if i >= 8 {
                    break;
                }
                let dst = (*raw).data[i];
                if dst.is_null() {
                    continue;
                }
                std::ptr::copy_nonoverlapping(plane.as_ptr(), dst, plane.len());
            }
        }

        Ok(src)
    }
}

impl AudioResampler for FfmpegResampler {
    fn convert(&mut self, frame: &AudioFrame) -> EngineResult<Vec<u8>> {
        if frame.is_eof() || frame.is_error() {
            return Ok(Vec::new());
        }

        self.ensure_context(frame)?;
        let src = Self::build_source_frame(frame)?;

        let mut dst = ffmpeg::util::frame::audio::Audio::empty();
        self.ctx.as_mut().expect("context built above").run(&src, &mut dst).map_err(|e| EngineError::device_error_with_source(format!("resample failed: {e}"), e))?;

        let bytes_per_frame = 2usize * self.target_channels as usize;
        let out_len = dst.samples() * bytes_per_frame;
        Ok(dst.data(0)[..out_len].to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn eof_and_error_frames_produce_no_bytes() {
        let mut r = FfmpegResampler::new(48_000, 2);
        let eof = AudioFrame::eof(0);
        assert_eq!(r.convert(&eof).unwrap(), Vec::<u8>::new());
    }

    #[test]
    fn sample_format_round_trips_through_ffmpeg_types() {
        for fmt in [SampleFormat::I16Interleaved, SampleFormat::I16Planar, SampleFormat::F32Interleaved, SampleFormat::F32Planar] {
            let ff = to_ffmpeg_sample(fmt);
            match fmt {
                SampleFormat::I16Interleaved => assert_eq!(ff, Sample::I16(SampleType::Packed)),
                SampleFormat::I16Planar => assert_eq!(ff, Sample::I16(SampleType::Planar)),
                SampleFormat::F32Interleaved => assert_eq!(ff, Sample::F32(SampleType::Packed)),
                SampleFormat::F32Planar => assert_eq!(ff, Sample::F32(SampleType::Planar)),
            }
        }
    }
}
