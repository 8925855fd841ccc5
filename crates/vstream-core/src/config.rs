//! Tunable constants an embedding application may override instead of
//! recompiling the engine. Defaults match the numbers fixed in this
//! project's design document.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EngineConfig {
    pub video_queue_capacity: usize,
    pub audio_queue_capacity: usize,
    pub packet_queue_capacity: usize,
    pub ring_buffer_capacity: usize,
    pub preroll_timeout_ms: u64,
    pub pin_timeout_ms: u64,
    pub sync_wait_threshold_us: i64,
    pub sync_drop_threshold_us: i64,
    pub sync_rush_threshold_us: i64,
    pub frame_cache_max_frames: usize,
    pub frame_cache_max_memory_mb: usize,
    pub max_consecutive_decoder_errors: u32,
    pub decode_iteration_cap: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            video_queue_capacity: 30,
            audio_queue_capacity: 100,
            packet_queue_capacity: 200,
            ring_buffer_capacity: crate::ring_buffer::DEFAULT_CAPACITY,
            preroll_timeout_ms: 1_500,
            pin_timeout_ms: 100,
            sync_wait_threshold_us: 500_000,
            sync_drop_threshold_us: -100_000,
            sync_rush_threshold_us: -10_000,
            frame_cache_max_frames: 100,
            frame_cache_max_memory_mb: 512,
            max_consecutive_decoder_errors: 10,
            decode_iteration_cap: 1_024,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_matches_documented_values() {
        let cfg = EngineConfig::default();
        assert_eq!(cfg.video_queue_capacity, 30);
        assert_eq!(cfg.audio_queue_capacity, 100);
        assert_eq!(cfg.preroll_timeout_ms, 1_500);
        assert_eq!(cfg.max_consecutive_decoder_errors, 10);
    }

    #[test]
    fn round_trips_through_json() {
        let cfg = EngineConfig::default();
        let json = serde_json::to_string(&cfg).unwrap();
        let back: EngineConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(cfg, back);
    }

    #[test]
    fn partial_json_fills_remaining_defaults() {
        let partial: EngineConfig = serde_json::from_str(r#"{"preroll_timeout_ms": 2000}"#).unwrap();
        assert_eq!(partial.preroll_timeout_ms, 2_000);
        assert_eq!(partial.video_queue_capacity, 30);
    }
}
