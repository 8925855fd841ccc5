pub mod audio_decoder;
pub mod audio_sink;
pub mod source;
pub mod video_decoder;
pub mod video_sink;

pub use audio_decoder::AudioDecoderNode;
pub use audio_sink::AudioSinkNode;
pub use source::SourceNode;
pub use video_decoder::VideoDecoderNode;
pub use video_sink::VideoSinkNode;
