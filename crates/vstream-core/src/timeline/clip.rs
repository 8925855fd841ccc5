//! A clip is a time-mapped window onto source media placed on a track.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::time::Timestamp;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Clip {
    pub clip_id: Uuid,
    pub media_id: Uuid,
    pub timeline_in: Timestamp,
    pub timeline_out: Timestamp,
    pub source_in: Timestamp,
    pub source_out: Timestamp,
    pub speed: f64,
    pub reversed: bool,
    pub opacity: f32,
    pub volume: f32,
    pub muted: bool,
    pub disabled: bool,
    pub track_index: usize,
}

impl Clip {
    /// Constructs a clip with the invariants from §3 checked.
    ///
    /// # Panics
    /// Panics if `timeline_out <= timeline_in`, `source_out <= source_in`,
    /// or `speed <= 0` — these are data-entry bugs in the caller, not
    /// recoverable runtime conditions.
    pub fn new(clip_id: Uuid, media_id: Uuid, timeline_in: Timestamp, timeline_out: Timestamp, source_in: Timestamp, source_out: Timestamp, speed: f64, reversed: bool, track_index: usize) -> Self {
        assert!(timeline_out.0 > timeline_in.0, "timeline_out must exceed timeline_in");
        assert!(source_out.0 > source_in.0, "source_out must exceed source_in");
        assert!(speed > 0.0, "speed must be positive");
        Clip {
            clip_id,
            media_id,
            timeline_in,
            timeline_out,
            source_in,
            source_out,
            speed,
            reversed,
            opacity: 1.0,
            volume: 1.0,
            muted: false,
            disabled: false,
            track_index,
        }
    }

    pub fn duration(&self) -> i64 {
        self.timeline_out.0 - self.timeline_in.0
    }

    pub fn contains(&self, t: Timestamp) -> bool {
        t.0 >= self.timeline_in.0 && t.0 < self.timeline_out.0
    }

    pub fn overlaps(&self, other: &Clip) -> bool {
        !(self.timeline_out.0 <= other.timeline_in.0 || other.timeline_out.0 <= self.timeline_in.0)
    }

    /// Map a timeline instant to the corresponding source-media timestamp,
    /// clamped to the clip's source range.
    ///
    /// `src = source_in + (t - timeline_in) * speed`, or the reversed
    /// mirror `source_out - (t - timeline_in) * speed`, as in §3.
    pub fn map_to_source(&self, t: Timestamp) -> Timestamp {
        let clamped_t = t.0.clamp(self.timeline_in.0, self.timeline_out.0);
        let offset = (clamped_t - self.timeline_in.0) as f64 * self.speed;
        if self.reversed {
            Timestamp((self.source_out.0 as f64 - offset).round() as i64)
        } else {
            Timestamp((self.source_in.0 as f64 + offset).round() as i64)
        }
    }
}
