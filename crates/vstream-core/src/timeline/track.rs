//! A track is an ordered, non-overlapping sequence of clips stacked at a
//! single layer of the composite.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{EngineError, EngineResult};
use crate::time::Timestamp;
use crate::timeline::clip::Clip;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrackKind {
    Video,
    Audio,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Track {
    pub track_id: Uuid,
    pub kind: TrackKind,
    pub name: String,
    pub muted: bool,
    pub hidden: bool,
    pub locked: bool,
    pub solo: bool,
    clips: Vec<Clip>,
}

impl Track {
    pub fn new(track_id: Uuid, kind: TrackKind, name: impl Into<String>) -> Self {
        Track {
            track_id,
            kind,
            name: name.into(),
            muted: false,
            hidden: false,
            locked: false,
            solo: false,
            clips: Vec::new(),
        }
    }

    pub fn clips(&self) -> &[Clip] {
        &self.clips
    }

    /// Inserts a clip, keeping the track sorted by `timeline_in`. Rejects
    /// the insertion if the clip overlaps an existing one — tracks never
    /// hold overlapping clips (§4.10).
    pub fn add_clip(&mut self, clip: Clip) -> EngineResult<()> {
        if self.clips.iter().any(|c| c.overlaps(&clip)) {
            return Err(EngineError::InvalidTimelineEdit("clip overlaps an existing clip on this track".into()));
        }
        let pos = self.clips.partition_point(|c| c.timeline_in.0 < clip.timeline_in.0);
        self.clips.insert(pos, clip);
        Ok(())
    }

    pub fn remove_clip(&mut self, clip_id: Uuid) -> Option<Clip> {
        let pos = self.clips.iter().position(|c| c.clip_id == clip_id)?;
        Some(self.clips.remove(pos))
    }

    /// Moves a clip to a new timeline position, rejecting the move if it
    /// would overlap a different clip.
    pub fn move_clip(&mut self, clip_id: Uuid, new_timeline_in: Timestamp) -> EngineResult<()> {
        let pos = self
            .clips
            .iter()
            .position(|c| c.clip_id == clip_id)
            .ok_or_else(|| EngineError::InvalidTimelineEdit("no such clip on this track".into()))?;

        let mut moved = self.clips[pos].clone();
        let delta = new_timeline_in.0 - moved.timeline_in.0;
        moved.timeline_in.0 += delta;
        moved.timeline_out.0 += delta;

        if self.clips.iter().enumerate().any(|(i, c)| i != pos && c.overlaps(&moved)) {
            return Err(EngineError::InvalidTimelineEdit("move would overlap another clip".into()));
        }

        self.clips.remove(pos);
        let new_pos = self.clips.partition_point(|c| c.timeline_in.0 < moved.timeline_in.0);
        self.clips.insert(new_pos, moved);
        Ok(())
    }

    pub fn clip_at(&self, t: Timestamp) -> Option<&Clip> {
        self.clips.iter().find(|c| c.contains(t))
    }

    /// The first gap of at least `min_duration` at or after `from`, or
    /// `None` if no such gap exists before the end of the track.
    pub fn find_gap(&self, from: Timestamp, min_duration: i64) -> Option<Timestamp> {
        let mut cursor = from.0;
        for c in &self.clips {
            if c.timeline_in.0 > cursor && c.timeline_in.0 - cursor >= min_duration {
                return Some(Timestamp(cursor));
            }
            cursor = cursor.max(c.timeline_out.0);
        }
        Some(Timestamp(cursor))
    }

    pub fn duration(&self) -> i64 {
        self.clips.iter().map(|c| c.timeline_out.0).max().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clip_at(start: i64, end: i64) -> Clip {
        Clip::new(Uuid::new_v4(), Uuid::new_v4(), Timestamp(start), Timestamp(end), Timestamp(0), Timestamp(end - start), 1.0, false, 0)
    }

    #[test]
    fn add_clip_rejects_overlap() {
        let mut t = Track::new(Uuid::new_v4(), TrackKind::Video, "V1");
        t.add_clip(clip_at(0, 1000)).unwrap();
        let err = t.add_clip(clip_at(500, 1500)).unwrap_err();
        assert!(matches!(err, EngineError::InvalidTimelineEdit(_)));
        assert_eq!(t.clips().len(), 1);
    }

    #[test]
    fn add_clip_keeps_sorted_order() {
        let mut t = Track::new(Uuid::new_v4(), TrackKind::Video, "V1");
        let second = clip_at(1000, 2000);
        let first = clip_at(0, 1000);
        t.add_clip(second.clone()).unwrap();
        t.add_clip(first.clone()).unwrap();
        assert_eq!(t.clips()[0].clip_id, first.clip_id);
        assert_eq!(t.clips()[1].clip_id, second.clip_id);
    }

    #[test]
    fn move_clip_rejects_new_overlap() {
        let mut t = Track::new(Uuid::new_v4(), TrackKind::Video, "V1");
        let a = clip_at(0, 1000);
        let b = clip_at(2000, 3000);
        t.add_clip(a.clone()).unwrap();
        t.add_clip(b.clone()).unwrap();
        let err = t.move_clip(b.clip_id, Timestamp(500)).unwrap_err();
        assert!(matches!(err, EngineError::InvalidTimelineEdit(_)));
    }

    #[test]
    fn find_gap_between_clips() {
        let mut t = Track::new(Uuid::new_v4(), TrackKind::Video, "V1");
        t.add_clip(clip_at(0, 1000)).unwrap();
        t.add_clip(clip_at(2000, 3000)).unwrap();
        assert_eq!(t.find_gap(Timestamp(0), 500), Some(Timestamp(1000)));
        assert_eq!(t.find_gap(Timestamp(0), 2000), Some(Timestamp(3000)));
    }

    #[test]
    fn clip_at_finds_containing_clip() {
        let mut t = Track::new(Uuid::new_v4(), TrackKind::Video, "V1");
        let a = clip_at(0, 1000);
        t.add_clip(a.clone()).unwrap();
        assert_eq!(t.clip_at(Timestamp(500)).unwrap().clip_id, a.clip_id);
        assert!(t.clip_at(Timestamp(1500)).is_none());
    }
}
