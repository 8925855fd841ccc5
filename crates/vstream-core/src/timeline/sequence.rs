//! A sequence is a stack of tracks, video tracks composited top-to-bottom
//! and audio tracks mixed, sharing a single timebase.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::time::{Duration, Rational};
use crate::timeline::clip::Clip;
use crate::timeline::track::{Track, TrackKind};

/// Output settings a sequence renders/exports at: resolution, frame rate,
/// and the audio format its tracks are mixed down to.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SequenceSettings {
    pub width: u32,
    pub height: u32,
    pub frame_rate: Rational,
    pub sample_rate: u32,
    pub channels: u16,
}

impl SequenceSettings {
    pub fn frame_duration(&self) -> Duration {
        Duration(self.frame_rate.frame_duration_us())
    }
}

impl Default for SequenceSettings {
    fn default() -> Self {
        SequenceSettings {
            width: 1920,
            height: 1080,
            frame_rate: Rational::new(30_000, 1001),
            sample_rate: 48_000,
            channels: 2,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sequence {
    pub sequence_id: Uuid,
    pub name: String,
    pub settings: SequenceSettings,
    tracks: Vec<Track>,
}

impl Sequence {
    pub fn new(sequence_id: Uuid, name: impl Into<String>) -> Self {
        Sequence {
            sequence_id,
            name: name.into(),
            settings: SequenceSettings::default(),
            tracks: Vec::new(),
        }
    }

    pub fn with_settings(sequence_id: Uuid, name: impl Into<String>, settings: SequenceSettings) -> Self {
        Sequence {
            sequence_id,
            name: name.into(),
            settings,
            tracks: Vec::new(),
        }
    }

    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    pub fn add_track(&mut self, track: Track) {
        self.tracks.push(track);
    }

    pub fn track_mut(&mut self, track_id: Uuid) -> Option<&mut Track> {
        self.tracks.iter_mut().find(|t| t.track_id == track_id)
    }

    /// Video tracks ordered bottom-to-top (index 0 is the backmost layer),
    /// the order the compositor expects for its blend pass.
    pub fn video_tracks(&self) -> impl Iterator<Item = &Track> {
        self.tracks.iter().filter(|t| t.kind == TrackKind::Video)
    }

    pub fn audio_tracks(&self) -> impl Iterator<Item = &Track> {
        self.tracks.iter().filter(|t| t.kind == TrackKind::Audio)
    }

    /// Duration of the sequence is the furthest clip end across every track.
    pub fn duration(&self) -> i64 {
        self.tracks.iter().map(|t| t.duration()).max().unwrap_or(0)
    }

    /// All clips whose timeline range covers `t`, ordered by track (the
    /// compositor's input for a single instant).
    pub fn clips_at(&self, t: crate::time::Timestamp) -> Vec<&Clip> {
        self.tracks.iter().filter_map(|track| track.clip_at(t)).collect()
    }
}
