//! Bridges per-clip [`Decoder`]s to the compositor's `fetch` callback,
//! caching decoded frames through a [`FrameCache`] so revisiting the same
//! instant (scrubbing, looped playback) doesn't re-decode.
//!
//! This is the data-flow `PlaybackEngine::tick` documents but does not
//! itself own: the engine composites from whatever `fetch` closure it is
//! given, and a [`ClipFrameProvider`] is the one built from a real decoder
//! stack rather than a test double.

use std::collections::HashMap;

use parking_lot::Mutex;
use uuid::Uuid;

use crate::compositor::{BlendMode, Layer, LayerRequest};
use crate::external::Decoder;
use crate::frame::{FramePayload, PixelFormat, VideoFrame};
use crate::frame_cache::FrameCache;
use crate::time::Timestamp;

struct ClipEntry {
    decoder: Box<dyn Decoder>,
    /// Source time of the frame the decoder last produced, so repeated
    /// requests for the same instant don't re-seek before decoding.
    last_decoded: Option<Timestamp>,
}

/// Owns one decoder per clip and the shared frame cache they feed.
/// Registered clips are looked up by `LayerRequest::clip_id`.
pub struct ClipFrameProvider {
    clips: Mutex<HashMap<Uuid, ClipEntry>>,
    cache: Mutex<FrameCache>,
}

impl ClipFrameProvider {
    pub fn new(max_frames: usize, max_memory_mb: usize) -> Self {
        ClipFrameProvider {
            clips: Mutex::new(HashMap::new()),
            cache: Mutex::new(FrameCache::new(max_frames, max_memory_mb)),
        }
    }

    /// Builds a provider sized from an [`EngineConfig`](crate::config::EngineConfig)'s
    /// `frame_cache_max_frames`/`frame_cache_max_memory_mb`.
    pub fn from_config(config: &crate::config::EngineConfig) -> Self {
        ClipFrameProvider::new(config.frame_cache_max_frames, config.frame_cache_max_memory_mb)
    }

    /// Registers (or replaces) the decoder backing `clip_id`. A previous
    /// decoder's cached frames are dropped — they were decoded from a
    /// different source.
    pub fn register_clip(&self, clip_id: Uuid, decoder: Box<dyn Decoder>) {
        self.clips.lock().insert(clip_id, ClipEntry { decoder, last_decoded: None });
        self.cache.lock().remove_clip(clip_id);
    }

    pub fn unregister_clip(&self, clip_id: Uuid) {
        self.clips.lock().remove(&clip_id);
        self.cache.lock().remove_clip(clip_id);
    }

    pub fn cache_stats(&self) -> crate::frame_cache::FrameCacheStats {
        self.cache.lock().stats()
    }

    /// The `fetch` callback [`crate::compositor::composite`] expects. A
    /// cache hit skips the decoder entirely; a miss seeks the clip's
    /// decoder to `source_time`, decodes one frame, and caches it before
    /// returning.
    pub fn fetch(&self, request: LayerRequest) -> Option<Layer> {
        if let Some(frame) = self.cache.lock().get(request.clip_id, request.source_time) {
            return frame_to_layer(&frame);
        }

        let mut clips = self.clips.lock();
        let entry = clips.get_mut(&request.clip_id)?;

        if entry.last_decoded != Some(request.source_time) {
            if let Err(e) = entry.decoder.seek(request.source_time) {
                log::warn!("[ClipFrameProvider] seek failed for clip {}: {e}", request.clip_id);
                return None;
            }
        }

        let frame = match entry.decoder.decode_next_video_frame() {
            Ok(Some(frame)) => frame,
            Ok(None) => return None,
            Err(e) => {
                log::warn!("[ClipFrameProvider] decode failed for clip {}: {e}", request.clip_id);
                return None;
            }
        };
        entry.last_decoded = Some(frame.pts);
        drop(clips);

        self.cache.lock().put(request.clip_id, request.source_time, frame.clone());
        frame_to_layer(&frame)
    }
}

fn frame_to_layer(frame: &VideoFrame) -> Option<Layer> {
    let data = frame.kind.data()?;
    let FramePayload::Software { planes, .. } = data else {
        log::warn!("[ClipFrameProvider] hardware frames are not yet supported by the compositor path");
        return None;
    };
    if frame.pixel_format != PixelFormat::Rgba8 {
        log::warn!("[ClipFrameProvider] compositor only accepts Rgba8 frames, got {:?}", frame.pixel_format);
        return None;
    }
    let plane = planes.first()?;

    let rgba = plane.chunks_exact(4).map(|px| [px[0] as f32 / 255.0, px[1] as f32 / 255.0, px[2] as f32 / 255.0, px[3] as f32 / 255.0]).collect();

    Some(Layer { rgba, width: frame.width, height: frame.height, opacity: 1.0, blend: BlendMode::Normal })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EngineResult;
    use crate::external::MediaProperties;
    use crate::time::Duration;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct OneFrameDecoder {
        decodes: Arc<AtomicUsize>,
    }

    impl Decoder for OneFrameDecoder {
        fn properties(&self) -> MediaProperties {
            MediaProperties::default()
        }
        fn seek(&mut self, _pts: Timestamp) -> EngineResult<()> {
            Ok(())
        }
        fn decode_next_video_frame(&mut self) -> EngineResult<Option<VideoFrame>> {
            self.decodes.fetch_add(1, Ordering::SeqCst);
            Ok(Some(VideoFrame::data(
                2,
                1,
                PixelFormat::Rgba8,
                FramePayload::Software { planes: vec![Arc::from(vec![255u8, 0, 0, 255, 0, 255, 0, 255].into_boxed_slice())], strides: vec![8] },
                Timestamp(0),
                Duration::ZERO,
                0,
            )))
        }
        fn decode_next_audio_frame(&mut self) -> EngineResult<Option<crate::frame::AudioFrame>> {
            Ok(None)
        }
        fn close(&mut self) {}
    }

    #[test]
    fn fetch_decodes_once_then_serves_from_cache() {
        let provider = ClipFrameProvider::new(10, 64);
        let clip_id = Uuid::new_v4();
        let decodes = Arc::new(AtomicUsize::new(0));
        provider.register_clip(clip_id, Box::new(OneFrameDecoder { decodes: decodes.clone() }));

        let request = LayerRequest { clip_id, media_id: Uuid::new_v4(), source_time: Timestamp(0), track_index: 0 };
        let first = provider.fetch(request).expect("decoder should produce a frame");
        assert_eq!(first.width, 2);
        assert_eq!(decodes.load(Ordering::SeqCst), 1);

        let second = provider.fetch(request).expect("second fetch should hit the cache");
        assert_eq!(second.rgba, first.rgba);
        assert_eq!(decodes.load(Ordering::SeqCst), 1, "cache hit must not re-decode");
    }

    #[test]
    fn fetch_returns_none_for_unregistered_clip() {
        let provider = ClipFrameProvider::new(10, 64);
        let request = LayerRequest { clip_id: Uuid::new_v4(), media_id: Uuid::new_v4(), source_time: Timestamp(0), track_index: 0 };
        assert!(provider.fetch(request).is_none());
    }

    #[test]
    fn unregister_clip_drops_its_cached_frames() {
        let provider = ClipFrameProvider::new(10, 64);
        let clip_id = Uuid::new_v4();
        provider.register_clip(clip_id, Box::new(OneFrameDecoder { decodes: Arc::new(AtomicUsize::new(0)) }));
        let request = LayerRequest { clip_id, media_id: Uuid::new_v4(), source_time: Timestamp(0), track_index: 0 };
        provider.fetch(request);
        provider.unregister_clip(clip_id);
        assert!(provider.fetch(request).is_none());
    }
}
