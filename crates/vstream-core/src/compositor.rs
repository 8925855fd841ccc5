//! Multi-layer compositor: folds the video frame active on each track at a
//! single timeline instant into one RGBA frame, bottom track first.

use crate::time::Timestamp;
use crate::timeline::Sequence;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlendMode {
    Normal,
    Add,
    Multiply,
    Screen,
    Overlay,
    Difference,
}

/// One flattened layer ready for the fold: already fetched from the decode
/// callback, carrying the clip's opacity and the track's blend mode.
#[derive(Debug, Clone)]
pub struct Layer {
    pub rgba: Vec<[f32; 4]>,
    pub width: u32,
    pub height: u32,
    pub opacity: f32,
    pub blend: BlendMode,
}

/// A request for the frame a decode callback must supply for one layer.
#[derive(Debug, Clone, Copy)]
pub struct LayerRequest {
    pub clip_id: uuid::Uuid,
    pub media_id: uuid::Uuid,
    pub source_time: Timestamp,
    pub track_index: usize,
}

pub struct CompositeFrame {
    pub width: u32,
    pub height: u32,
    /// Straight-alpha RGBA, 8 bits per channel, row-major.
    pub pixels: Vec<u8>,
}

/// Composites a sequence at instant `t`, pulling each visible layer's pixels
/// through `fetch`. `fetch` returns `None` if the frame isn't available yet
/// (e.g. still decoding), in which case that layer is skipped for this
/// composite rather than blocking.
pub fn composite(sequence: &Sequence, t: Timestamp, width: u32, height: u32, background: [u8; 4], fetch: impl Fn(LayerRequest) -> Option<Layer>) -> CompositeFrame {
    let mut layers = Vec::new();

    for track in sequence.video_tracks() {
        if track.hidden || track.muted || track.locked {
            continue;
        }
        let Some(clip) = track.clip_at(t) else {
            continue;
        };
        if clip.disabled {
            continue;
        }
        let source_time = clip.map_to_source(t);
        let request = LayerRequest {
            clip_id: clip.clip_id,
            media_id: clip.media_id,
            source_time,
            track_index: clip.track_index,
        };
        if let Some(mut layer) = fetch(request) {
            layer.opacity *= clip.opacity;
            layers.push(layer);
        }
    }

    if layers.is_empty() {
        return CompositeFrame { width, height, pixels: fill_background(width, height, background) };
    }

    if layers.len() == 1 && layers[0].opacity >= 0.999 && layers[0].blend == BlendMode::Normal {
        let only = layers.into_iter().next().unwrap();
        return CompositeFrame { width: only.width, height: only.height, pixels: to_u8(&only.rgba) };
    }

    let mut accum = background_linear(width, height, background);
    for layer in &layers {
        fold_layer(&mut accum, layer, width, height);
    }

    CompositeFrame { width, height, pixels: to_u8(&accum) }
}

fn fill_background(width: u32, height: u32, color: [u8; 4]) -> Vec<u8> {
    let mut out = Vec::with_capacity(width as usize * height as usize * 4);
    for _ in 0..(width as usize * height as usize) {
        out.extend_from_slice(&color);
    }
    out
}

fn background_linear(width: u32, height: u32, color: [u8; 4]) -> Vec<[f32; 4]> {
    let px = [color[0] as f32 / 255.0, color[1] as f32 / 255.0, color[2] as f32 / 255.0, color[3] as f32 / 255.0];
    vec![px; width as usize * height as usize]
}

fn to_u8(pixels: &[[f32; 4]]) -> Vec<u8> {
    let mut out = Vec::with_capacity(pixels.len() * 4);
    for p in pixels {
        for c in p {
            out.push((c.clamp(0.0, 1.0) * 255.0).round() as u8);
        }
    }
    out
}

/// Folds `layer` onto `accum` in place. Layers smaller than the canvas are
/// assumed already resized by the caller; mismatched sizes are skipped.
fn fold_layer(accum: &mut [[f32; 4]], layer: &Layer, width: u32, height: u32) {
    if layer.width != width || layer.height != height {
        log::warn!("[Compositor] skipping layer with mismatched dimensions {}x{} against canvas {}x{}", layer.width, layer.height, width, height);
        return;
    }
    for (dst, src) in accum.iter_mut().zip(layer.rgba.iter()) {
        *dst = blend_pixel(*src, *dst, layer.opacity, layer.blend);
    }
}

fn blend_pixel(src: [f32; 4], dst: [f32; 4], layer_opacity: f32, mode: BlendMode) -> [f32; 4] {
    let s_a = (src[3] * layer_opacity).clamp(0.0, 1.0);
    let d_a = dst[3];
    let mut out = [0.0f32; 4];

    for c in 0..3 {
        let s = src[c];
        let d = dst[c];
        let blended = match mode {
            BlendMode::Normal => s,
            BlendMode::Add => (s + d).min(1.0),
            BlendMode::Multiply => s * d,
            BlendMode::Screen => 1.0 - (1.0 - s) * (1.0 - d),
            BlendMode::Overlay => {
                if d < 0.5 {
                    2.0 * s * d
                } else {
                    1.0 - 2.0 * (1.0 - s) * (1.0 - d)
                }
            }
            BlendMode::Difference => (s - d).abs(),
        };
        out[c] = match mode {
            BlendMode::Add => blended,
            _ => blended * s_a + d * (1.0 - s_a),
        };
    }
    out[3] = s_a + d_a * (1.0 - s_a);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timeline::clip::Clip;
    use crate::timeline::track::{Track, TrackKind};
    use uuid::Uuid;

    fn one_track_sequence() -> (Sequence, Uuid) {
        let mut seq = Sequence::new(Uuid::new_v4(), "s");
        let mut track = Track::new(Uuid::new_v4(), TrackKind::Video, "V1");
        let clip = Clip::new(Uuid::new_v4(), Uuid::new_v4(), Timestamp(0), Timestamp(1_000_000), Timestamp(0), Timestamp(1_000_000), 1.0, false, 0);
        let clip_id = clip.clip_id;
        track.add_clip(clip).unwrap();
        seq.add_track(track);
        (seq, clip_id)
    }

    #[test]
    fn empty_sequence_returns_background() {
        let seq = Sequence::new(Uuid::new_v4(), "s");
        let frame = composite(&seq, Timestamp(0), 2, 1, [10, 20, 30, 255], |_| None);
        assert_eq!(frame.pixels, vec![10, 20, 30, 255, 10, 20, 30, 255]);
    }

    #[test]
    fn single_opaque_normal_layer_passes_through() {
        let (seq, _clip_id) = one_track_sequence();
        let layer = Layer { rgba: vec![[1.0, 0.0, 0.0, 1.0]], width: 1, height: 1, opacity: 1.0, blend: BlendMode::Normal };
        let frame = composite(&seq, Timestamp(0), 1, 1, [0, 0, 0, 255], move |_| Some(layer.clone()));
        assert_eq!(frame.pixels, vec![255, 0, 0, 255]);
    }

    #[test]
    fn multiply_blend_darkens_against_background() {
        let (seq, _clip_id) = one_track_sequence();
        let layer = Layer { rgba: vec![[0.5, 0.5, 0.5, 1.0]], width: 1, height: 1, opacity: 1.0, blend: BlendMode::Multiply };
        let frame = composite(&seq, Timestamp(0), 1, 1, [255, 255, 255, 255], move |_| Some(layer.clone()));
        assert_eq!(frame.pixels, vec![128, 128, 128, 255]);
    }

    #[test]
    fn missing_frame_from_fetch_skips_the_layer() {
        let (seq, _clip_id) = one_track_sequence();
        let frame = composite(&seq, Timestamp(0), 1, 1, [9, 9, 9, 255], |_| None);
        assert_eq!(frame.pixels, vec![9, 9, 9, 255]);
    }

    #[test]
    fn hidden_track_is_skipped() {
        let mut track = Track::new(Uuid::new_v4(), TrackKind::Video, "hidden");
        track.hidden = true;
        let clip = Clip::new(Uuid::new_v4(), Uuid::new_v4(), Timestamp(0), Timestamp(1_000_000), Timestamp(0), Timestamp(1_000_000), 1.0, false, 0);
        track.add_clip(clip).unwrap();
        let mut seq = Sequence::new(Uuid::new_v4(), "s");
        seq.add_track(track);
        let frame = composite(&seq, Timestamp(0), 1, 1, [7, 7, 7, 255], |_| panic!("fetch should not be called for a hidden track"));
        assert_eq!(frame.pixels, vec![7, 7, 7, 255]);
    }
}
