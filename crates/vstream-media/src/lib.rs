//! Concrete adapters implementing `vstream-core`'s `external` traits:
//! ffmpeg-the-third for demuxing/decoding/resampling, cpal for audio
//! output, and a CPU-only software renderer for display/export.

pub mod audio_decoder;
pub mod audio_device;
pub mod decoder;
pub mod demuxer;
pub mod renderer;
pub mod resampler;
pub mod seek;
pub mod video_decoder;

pub use audio_decoder::FfmpegAudioDecoder;
pub use audio_device::CpalAudioDevice;
pub use decoder::FfmpegDecoder;
pub use demuxer::FfmpegDemuxer;
pub use renderer::SoftwareRenderer;
pub use resampler::FfmpegResampler;
pub use video_decoder::FfmpegVideoDecoder;
