//! `CpalAudioDevice`: the real output stream the audio sink's ring buffer
//! feeds. The stream callback's only collaborator is the ring buffer — no
//! decoding, resampling, or locking happens on the real-time thread.

use std::sync::Arc;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{BufferSize, SampleRate, StreamConfig};

use vstream_core::external::AudioDevice;
use vstream_core::ring_buffer::RingBuffer;
use vstream_core::{EngineError, EngineResult};

pub struct CpalAudioDevice {
    ring_buffer: Arc<RingBuffer>,
    stream: Option<cpal::Stream>,
}

impl CpalAudioDevice {
    pub fn new(ring_buffer: Arc<RingBuffer>) -> Self {
        CpalAudioDevice { ring_buffer, stream: None }
    }
}

impl AudioDevice for CpalAudioDevice {
    fn open(&mut self, sample_rate: u32, channels: u16, buffer_samples: usize) -> EngineResult<()> {
        let host = cpal::default_host();
        let device = host.default_output_device().ok_or_else(|| EngineError::device_error("no default audio output device"))?;

        let config = StreamConfig {
            channels,
            sample_rate: SampleRate(sample_rate),
            buffer_size: BufferSize::Fixed(buffer_samples as u32),
        };

        let ring = self.ring_buffer.clone();
        // Scratch buffer lives in the closure's captures, sized once up
        // front; the callback never allocates on the audio thread.
        let mut scratch = vec![0u8; buffer_samples * channels as usize * 2];
        let stream = device
            .build_output_stream(
                &config,
                move |data: &mut [i16], _info: &cpal::OutputCallbackInfo| {
                    let needed = data.len() * 2;
                    if needed > scratch.len() {
                        scratch.resize(needed, 0);
                    }
                    let bytes = &mut scratch[..needed];
                    ring.read_or_silence(bytes);
                    for (sample, chunk) in data.iter_mut().zip(bytes.chunks_exact(2)) {
                        *sample = i16::from_le_bytes([chunk[0], chunk[1]]);
                    }
                },
                |err| log::error!("[CpalAudioDevice] stream error: {err}"),
                None,
            )
            .map_err(|e| EngineError::device_error_with_source(e.to_string(), e))?;

        stream.play().map_err(|e| EngineError::device_error_with_source(e.to_string(), e))?;
        self.stream = Some(stream);
        Ok(())
    }

    fn pause(&mut self, paused: bool) {
        let Some(stream) = &self.stream else {
            return;
        };
        let result = if paused { stream.pause() } else { stream.play() };
        if let Err(e) = result {
            log::warn!("[CpalAudioDevice] pause({paused}) failed: {e}");
        }
    }

    fn close(&mut self) {
        self.stream = None;
    }
}
