//! Timeline playback: drives the compositor from its own monotonic timer
//! instead of a decoder-fed pipeline, for sequences with more than one
//! clip in play at once.

use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;

use crate::clip_source::ClipFrameProvider;
use crate::clock::MasterClock;
use crate::compositor::{composite, CompositeFrame, Layer, LayerRequest};
use crate::time::{Duration, Rational, Timestamp};
use crate::timeline::Sequence;

const MIN_SPEED: f64 = 0.1;
const MAX_SPEED: f64 = 8.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    Stopped,
    Playing,
    Paused,
    Seeking,
}

type FrameReadyCallback = Box<dyn Fn(&CompositeFrame) + Send>;

pub struct PlaybackEngine {
    sequence: Sequence,
    clock: Arc<MasterClock>,
    state: Mutex<PlaybackState>,
    frame_rate: Rational,
    speed: Mutex<f64>,
    looping: Mutex<bool>,
    in_point: Mutex<Timestamp>,
    out_point: Mutex<Timestamp>,
    last_tick: Mutex<Instant>,
    /// Leftover sub-frame microseconds carried from the previous tick, so
    /// playback advances in whole frame-duration steps rather than drifting
    /// continuously.
    accumulator_us: Mutex<i64>,
    width: u32,
    height: u32,
    background: [u8; 4],
    on_frame: Mutex<Option<FrameReadyCallback>>,
}

impl PlaybackEngine {
    /// Reads frame rate and output resolution from `sequence.settings`
    /// rather than taking them as separate arguments, so a sequence's
    /// output format is defined in one place (§4.10/§4.15).
    pub fn new(sequence: Sequence) -> Self {
        let duration = sequence.duration();
        let settings = sequence.settings;
        PlaybackEngine {
            sequence,
            clock: Arc::new(MasterClock::new()),
            state: Mutex::new(PlaybackState::Stopped),
            frame_rate: settings.frame_rate,
            speed: Mutex::new(1.0),
            looping: Mutex::new(false),
            in_point: Mutex::new(Timestamp(0)),
            out_point: Mutex::new(Timestamp(duration)),
            last_tick: Mutex::new(Instant::now()),
            accumulator_us: Mutex::new(0),
            width: settings.width,
            height: settings.height,
            background: [0, 0, 0, 255],
            on_frame: Mutex::new(None),
        }
    }

    pub fn set_frame_ready_callback(&self, cb: impl Fn(&CompositeFrame) + Send + 'static) {
        *self.on_frame.lock() = Some(Box::new(cb));
    }

    pub fn state(&self) -> PlaybackState {
        *self.state.lock()
    }

    pub fn clock(&self) -> Arc<MasterClock> {
        self.clock.clone()
    }

    pub fn set_speed(&self, speed: f64) {
        *self.speed.lock() = speed.clamp(MIN_SPEED, MAX_SPEED);
    }

    pub fn speed(&self) -> f64 {
        *self.speed.lock()
    }

    pub fn set_looping(&self, looping: bool) {
        *self.looping.lock() = looping;
    }

    pub fn set_in_out_points(&self, in_point: Timestamp, out_point: Timestamp) {
        *self.in_point.lock() = in_point;
        *self.out_point.lock() = out_point;
    }

    pub fn play(&self) {
        self.clock.resume();
        *self.last_tick.lock() = Instant::now();
        *self.state.lock() = PlaybackState::Playing;
    }

    pub fn pause(&self) {
        self.clock.pause();
        *self.state.lock() = PlaybackState::Paused;
    }

    pub fn seek(&self, t: Timestamp) {
        *self.state.lock() = PlaybackState::Seeking;
        self.clock.seek(t);
        *self.last_tick.lock() = Instant::now();
        *self.state.lock() = if self.clock.is_paused() { PlaybackState::Paused } else { PlaybackState::Playing };
    }

    pub fn step(&self, frames: i64) {
        let frame_duration = self.frame_rate.frame_duration_us();
        let was_paused = self.clock.is_paused();
        let target = self.clock.now().checked_add(Duration(frame_duration * frames));
        self.clock.pause();
        self.clock.seek(target);
        if !was_paused {
            self.clock.resume();
        }
        *self.state.lock() = if self.clock.is_paused() { PlaybackState::Paused } else { PlaybackState::Playing };
    }

    pub fn stop(&self) {
        self.clock.pause();
        self.clock.seek(*self.in_point.lock());
        *self.state.lock() = PlaybackState::Stopped;
    }

    /// Advances playback by whatever wall-clock time elapsed since the
    /// previous tick, scaled by the current speed, then composes and
    /// delivers a frame if a new frame boundary was crossed. Call this
    /// from a dedicated timer thread or the embedding application's own
    /// render loop.
    pub fn tick(&self, fetch: impl Fn(LayerRequest) -> Option<Layer>) {
        if *self.state.lock() != PlaybackState::Playing {
            return;
        }

        let now = Instant::now();
        let mut last_tick = self.last_tick.lock();
        let elapsed = now.duration_since(*last_tick);
        *last_tick = now;
        drop(last_tick);

        let frame_duration_us = self.frame_rate.frame_duration_us();
        let scaled_elapsed_us = (elapsed.as_micros() as f64 * self.speed()) as i64;

        let mut acc = self.accumulator_us.lock();
        *acc += scaled_elapsed_us;
        let due_frames = *acc / frame_duration_us;
        *acc -= due_frames * frame_duration_us;
        drop(acc);

        if due_frames == 0 {
            return;
        }

        let advanced = self.clock.now().checked_add(Duration(frame_duration_us * due_frames));
        let out_point = *self.out_point.lock();
        let in_point = *self.in_point.lock();

        if advanced.0 >= out_point.0 {
            if *self.looping.lock() {
                self.clock.seek(in_point);
            } else {
                self.clock.update(out_point);
                self.stop();
                return;
            }
        } else {
            self.clock.update(advanced);
        }

        let current = self.clock.now();
        let frame = composite(&self.sequence, current, self.width, self.height, self.background, fetch);
        if let Some(cb) = self.on_frame.lock().as_ref() {
            cb(&frame);
        }
    }

    /// As [`PlaybackEngine::tick`], but pulls layers through a
    /// [`ClipFrameProvider`] instead of a caller-supplied closure — the
    /// per-clip decoder and frame cache wiring an embedding application
    /// would otherwise have to reassemble itself.
    pub fn tick_with_provider(&self, provider: &ClipFrameProvider) {
        self.tick(|request| provider.fetch(request));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn engine() -> PlaybackEngine {
        let settings = crate::timeline::SequenceSettings {
            width: 4,
            height: 4,
            frame_rate: Rational::new(30, 1),
            sample_rate: 48_000,
            channels: 2,
        };
        let seq = Sequence::with_settings(Uuid::new_v4(), "s", settings);
        PlaybackEngine::new(seq)
    }

    #[test]
    fn starts_stopped() {
        let e = engine();
        assert_eq!(e.state(), PlaybackState::Stopped);
    }

    #[test]
    fn play_then_pause_round_trips_clock() {
        let e = engine();
        e.play();
        assert_eq!(e.state(), PlaybackState::Playing);
        assert!(!e.clock().is_paused());
        e.pause();
        assert_eq!(e.state(), PlaybackState::Paused);
        assert!(e.clock().is_paused());
    }

    #[test]
    fn speed_is_clamped_to_documented_range() {
        let e = engine();
        e.set_speed(100.0);
        assert_eq!(e.speed(), MAX_SPEED);
        e.set_speed(0.001);
        assert_eq!(e.speed(), MIN_SPEED);
    }

    #[test]
    fn seek_repositions_clock() {
        let e = engine();
        e.seek(Timestamp(2_000_000));
        assert_eq!(e.clock().now(), Timestamp(2_000_000));
    }

    #[test]
    fn step_forward_advances_by_one_frame_duration() {
        let e = engine();
        e.seek(Timestamp(0));
        let before = e.clock().now();
        e.step(1);
        let after = e.clock().now();
        assert_eq!(after.0 - before.0, Rational::new(30, 1).frame_duration_us());
    }

    #[test]
    fn tick_does_nothing_while_not_playing() {
        let e = engine();
        let before = e.clock().now();
        e.tick(|_| None);
        assert_eq!(e.clock().now(), before);
    }

    #[test]
    fn stop_returns_to_in_point() {
        let e = engine();
        e.set_in_out_points(Timestamp(500_000), Timestamp(2_000_000));
        e.seek(Timestamp(1_000_000));
        e.stop();
        assert_eq!(e.state(), PlaybackState::Stopped);
        assert_eq!(e.clock().now(), Timestamp(500_000));
    }

    #[test]
    fn tick_with_provider_composites_a_registered_clip() {
        use crate::error::EngineResult;
        use crate::external::{Decoder, MediaProperties};
        use crate::frame::{FramePayload, PixelFormat, VideoFrame};
        use crate::timeline::{Clip, Track, TrackKind};
        use std::sync::Arc;

        struct SolidColorDecoder;
        impl Decoder for SolidColorDecoder {
            fn properties(&self) -> MediaProperties {
                MediaProperties::default()
            }
            fn seek(&mut self, _pts: Timestamp) -> EngineResult<()> {
                Ok(())
            }
            fn decode_next_video_frame(&mut self) -> EngineResult<Option<VideoFrame>> {
                Ok(Some(VideoFrame::data(
                    4,
                    4,
                    PixelFormat::Rgba8,
                    FramePayload::Software { planes: vec![Arc::from(vec![200u8; 4 * 4 * 4].into_boxed_slice())], strides: vec![16] },
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

        let settings = crate::timeline::SequenceSettings { width: 4, height: 4, frame_rate: Rational::new(30, 1), sample_rate: 48_000, channels: 2 };
        let mut seq = Sequence::with_settings(Uuid::new_v4(), "s", settings);
        let clip = Clip::new(Uuid::new_v4(), Uuid::new_v4(), Timestamp(0), Timestamp(1_000_000), Timestamp(0), Timestamp(1_000_000), 1.0, false, 0);
        let clip_id = clip.clip_id;
        let mut track = Track::new(Uuid::new_v4(), TrackKind::Video, "V1");
        track.add_clip(clip).unwrap();
        seq.add_track(track);

        let e = PlaybackEngine::new(seq);
        let provider = ClipFrameProvider::new(10, 64);
        provider.register_clip(clip_id, Box::new(SolidColorDecoder));

        let composited = Arc::new(Mutex::new(None));
        let composited2 = composited.clone();
        e.set_frame_ready_callback(move |frame: &CompositeFrame| {
            *composited2.lock() = Some(frame.pixels.clone());
        });

        e.play();
        e.seek(Timestamp(0));
        std::thread::sleep(std::time::Duration::from_millis(50));
        e.tick_with_provider(&provider);

        let pixels = composited.lock().as_ref().cloned().expect("compositing a registered clip should fire the frame callback");
        assert_eq!(pixels[0], 200);
    }
}
