//! LRU cache of decoded video frames keyed by (clip, media time), used by
//! the playback engine and by scrubbing/prefetch to avoid re-decoding
//! frames the embedding application has already paid for.

use std::collections::{HashMap, VecDeque};

use uuid::Uuid;

use crate::frame::VideoFrame;
use crate::time::{Duration, Timestamp};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct CacheKey {
    clip_id: Uuid,
    media_time: Timestamp,
}

struct CachedFrame {
    frame: VideoFrame,
    access_count: u64,
    size_bytes: usize,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct FrameCacheStats {
    pub hits: u64,
    pub misses: u64,
    pub current_size: usize,
    pub max_size_seen: usize,
    pub memory_usage: usize,
}

impl FrameCacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Bounded by frame count and by estimated memory footprint, whichever is
/// reached first. Eviction is least-recently-used.
pub struct FrameCache {
    max_frames: usize,
    max_memory_bytes: usize,
    memory_usage: usize,
    entries: HashMap<CacheKey, CachedFrame>,
    /// Most-recently-used key at the back.
    lru_order: VecDeque<CacheKey>,
    stats: FrameCacheStats,
}

fn estimate_frame_size(frame: &VideoFrame) -> usize {
    frame.width as usize * frame.height as usize * 4
}

impl FrameCache {
    pub fn new(max_frames: usize, max_memory_mb: usize) -> Self {
        FrameCache {
            max_frames,
            max_memory_bytes: max_memory_mb * 1024 * 1024,
            memory_usage: 0,
            entries: HashMap::new(),
            lru_order: VecDeque::new(),
            stats: FrameCacheStats::default(),
        }
    }

    fn touch(&mut self, key: &CacheKey) {
        if let Some(pos) = self.lru_order.iter().position(|k| k == key) {
            self.lru_order.remove(pos);
        }
        self.lru_order.push_back(*key);
    }

    pub fn get(&mut self, clip_id: Uuid, media_time: Timestamp) -> Option<VideoFrame> {
        let key = CacheKey { clip_id, media_time };
        if let Some(entry) = self.entries.get_mut(&key) {
            entry.access_count += 1;
            let frame = entry.frame.clone();
            self.touch(&key);
            self.stats.hits += 1;
            Some(frame)
        } else {
            self.stats.misses += 1;
            None
        }
    }

    pub fn contains(&self, clip_id: Uuid, media_time: Timestamp) -> bool {
        self.entries.contains_key(&CacheKey { clip_id, media_time })
    }

    pub fn put(&mut self, clip_id: Uuid, media_time: Timestamp, frame: VideoFrame) {
        let key = CacheKey { clip_id, media_time };
        let size = estimate_frame_size(&frame);

        if let Some(existing) = self.entries.get_mut(&key) {
            self.memory_usage -= existing.size_bytes;
            existing.frame = frame;
            existing.size_bytes = size;
            self.memory_usage += size;
            self.touch(&key);
            return;
        }

        while self.entries.len() >= self.max_frames || (self.max_memory_bytes > 0 && self.memory_usage + size > self.max_memory_bytes) {
            if !self.evict_one() {
                break;
            }
        }

        self.entries.insert(key, CachedFrame { frame, access_count: 0, size_bytes: size });
        self.lru_order.push_back(key);
        self.memory_usage += size;

        self.stats.current_size = self.entries.len();
        self.stats.max_size_seen = self.stats.max_size_seen.max(self.entries.len());
        self.stats.memory_usage = self.memory_usage;
    }

    pub fn remove(&mut self, clip_id: Uuid, media_time: Timestamp) {
        let key = CacheKey { clip_id, media_time };
        if let Some(entry) = self.entries.remove(&key) {
            self.memory_usage -= entry.size_bytes;
            if let Some(pos) = self.lru_order.iter().position(|k| *k == key) {
                self.lru_order.remove(pos);
            }
        }
    }

    /// Drops every cached frame belonging to a clip, e.g. when the clip is
    /// removed from the timeline or its source media is replaced.
    pub fn remove_clip(&mut self, clip_id: Uuid) {
        let doomed: Vec<CacheKey> = self.entries.keys().filter(|k| k.clip_id == clip_id).copied().collect();
        for key in doomed {
            if let Some(entry) = self.entries.remove(&key) {
                self.memory_usage -= entry.size_bytes;
            }
            if let Some(pos) = self.lru_order.iter().position(|k| *k == key) {
                self.lru_order.remove(pos);
            }
        }
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.lru_order.clear();
        self.memory_usage = 0;
    }

    fn evict_one(&mut self) -> bool {
        let Some(key) = self.lru_order.pop_front() else {
            return false;
        };
        if let Some(entry) = self.entries.remove(&key) {
            self.memory_usage -= entry.size_bytes;
        }
        true
    }

    /// Media times within `clip_id` not yet cached, starting at
    /// `current_time` and stepping by `frame_duration`, the candidates the
    /// prefetch worker should decode next.
    pub fn prefetch_range(&self, clip_id: Uuid, current_time: Timestamp, frame_duration: Duration, count: usize) -> Vec<Timestamp> {
        let mut result = Vec::with_capacity(count);
        for i in 0..count {
            let t = current_time.checked_add(frame_duration * i as f64);
            if !self.contains(clip_id, t) {
                result.push(t);
            }
        }
        result
    }

    pub fn stats(&self) -> FrameCacheStats {
        self.stats
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn memory_usage(&self) -> usize {
        self.memory_usage
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{FramePayload, PixelFormat};

    fn frame(w: u32, h: u32, pts: i64) -> VideoFrame {
        VideoFrame::data(w, h, PixelFormat::Rgba8, FramePayload::Software { planes: vec![], strides: vec![] }, Timestamp(pts), Duration::ZERO, 0)
    }

    #[test]
    fn put_then_get_is_a_hit() {
        let mut cache = FrameCache::new(10, 512);
        let clip = Uuid::new_v4();
        cache.put(clip, Timestamp(0), frame(1920, 1080, 0));
        assert!(cache.get(clip, Timestamp(0)).is_some());
        assert_eq!(cache.stats().hits, 1);
    }

    #[test]
    fn miss_on_absent_key() {
        let mut cache = FrameCache::new(10, 512);
        assert!(cache.get(Uuid::new_v4(), Timestamp(0)).is_none());
        assert_eq!(cache.stats().misses, 1);
    }

    #[test]
    fn evicts_least_recently_used_when_frame_count_exceeded() {
        let mut cache = FrameCache::new(2, 512);
        let clip = Uuid::new_v4();
        cache.put(clip, Timestamp(0), frame(64, 64, 0));
        cache.put(clip, Timestamp(1), frame(64, 64, 1));
        cache.get(clip, Timestamp(0)); // touch 0, making 1 the LRU
        cache.put(clip, Timestamp(2), frame(64, 64, 2));

        assert!(cache.contains(clip, Timestamp(0)));
        assert!(!cache.contains(clip, Timestamp(1)));
        assert!(cache.contains(clip, Timestamp(2)));
    }

    #[test]
    fn evicts_when_memory_bound_exceeded() {
        // Each 1920x1080 RGBA frame is ~8MB; a 10MB budget holds only one.
        let mut cache = FrameCache::new(100, 10);
        let clip = Uuid::new_v4();
        cache.put(clip, Timestamp(0), frame(1920, 1080, 0));
        cache.put(clip, Timestamp(1), frame(1920, 1080, 1));
        assert_eq!(cache.len(), 1);
        assert!(cache.contains(clip, Timestamp(1)));
    }

    #[test]
    fn remove_clip_drops_every_frame_for_that_clip() {
        let mut cache = FrameCache::new(10, 512);
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        cache.put(a, Timestamp(0), frame(64, 64, 0));
        cache.put(a, Timestamp(1), frame(64, 64, 1));
        cache.put(b, Timestamp(0), frame(64, 64, 0));
        cache.remove_clip(a);
        assert_eq!(cache.len(), 1);
        assert!(cache.contains(b, Timestamp(0)));
    }

    #[test]
    fn prefetch_range_skips_cached_times() {
        let mut cache = FrameCache::new(10, 512);
        let clip = Uuid::new_v4();
        cache.put(clip, Timestamp(0), frame(64, 64, 0));
        let missing = cache.prefetch_range(clip, Timestamp(0), Duration(1000), 3);
        assert_eq!(missing, vec![Timestamp(1000), Timestamp(2000)]);
    }
}
