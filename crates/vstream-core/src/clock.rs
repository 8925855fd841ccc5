//! Master clock: a SeqLock-protected monotonic media-time source.
//!
//! One writer thread (the audio device callback when audio is present, or a
//! timer otherwise) calls `update`/`seek`/`pause`/`resume`. Any number of
//! reader threads call `now()` without ever blocking the writer.

use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::time::Instant;

use crate::time::{Duration, Timestamp};

pub const SYNC_WAIT_THRESHOLD: Duration = Duration(500_000);
pub const SYNC_DROP_THRESHOLD: Duration = Duration(-100_000);
pub const SYNC_RUSH_THRESHOLD: Duration = Duration(-10_000);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncAction {
    Present,
    Wait,
    Drop,
}

/// Lock-free monotonic clock. Readers never block the writer and vice versa.
pub struct MasterClock {
    seq: AtomicU64,
    base_media_time_us: AtomicI64,
    base_real_time_us: AtomicI64,
    paused: AtomicBool,
    paused_media_time_us: AtomicI64,
    has_audio_source: AtomicBool,
    wall_clock_mode: AtomicBool,
    epoch: Instant,
    wait_threshold: Duration,
    drop_threshold: Duration,
    rush_threshold: Duration,
}

impl MasterClock {
    pub fn new() -> Self {
        MasterClock {
            seq: AtomicU64::new(0),
            base_media_time_us: AtomicI64::new(0),
            base_real_time_us: AtomicI64::new(0),
            paused: AtomicBool::new(true),
            paused_media_time_us: AtomicI64::new(0),
            has_audio_source: AtomicBool::new(false),
            wall_clock_mode: AtomicBool::new(false),
            epoch: Instant::now(),
            wait_threshold: SYNC_WAIT_THRESHOLD,
            drop_threshold: SYNC_DROP_THRESHOLD,
            rush_threshold: SYNC_RUSH_THRESHOLD,
        }
    }

    /// As [`MasterClock::new`], but with the A/V sync thresholds an
    /// embedding application configured via `EngineConfig` rather than this
    /// module's defaults.
    pub fn with_thresholds(wait_threshold: Duration, drop_threshold: Duration, rush_threshold: Duration) -> Self {
        MasterClock {
            wait_threshold,
            drop_threshold,
            rush_threshold,
            ..Self::new()
        }
    }

    fn real_time_us(&self) -> i64 {
        self.epoch.elapsed().as_micros() as i64
    }

    fn write_base(&self, media_time_us: i64, real_time_us: i64) {
        // Writer protocol: odd -> mutate -> even. A reader observing an odd
        // sequence, or two different sequence snapshots, must retry.
        let s = self.seq.load(Ordering::Relaxed);
        self.seq.store(s.wrapping_add(1), Ordering::Release);
        self.base_media_time_us.store(media_time_us, Ordering::Relaxed);
        self.base_real_time_us.store(real_time_us, Ordering::Relaxed);
        self.seq.store(s.wrapping_add(2), Ordering::Release);
    }

    /// Writer: publish a fresh (media_time, real_time) pair. Called from the
    /// audio callback or a timer, never concurrently with itself.
    pub fn update(&self, media_time: Timestamp) {
        self.write_base(media_time.0, self.real_time_us());
    }

    /// Writer: reposition the clock after a seek.
    pub fn seek(&self, target: Timestamp) {
        self.paused_media_time_us.store(target.0, Ordering::Relaxed);
        self.write_base(target.0, self.real_time_us());
    }

    pub fn pause(&self) {
        let media_now = self.now();
        self.paused_media_time_us.store(media_now.0, Ordering::Relaxed);
        self.paused.store(true, Ordering::Release);
    }

    pub fn resume(&self) {
        let t = self.paused_media_time_us.load(Ordering::Relaxed);
        self.write_base(t, self.real_time_us());
        self.paused.store(false, Ordering::Release);
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Acquire)
    }

    pub fn set_has_audio_source(&self, has: bool) {
        self.has_audio_source.store(has, Ordering::Relaxed);
    }

    pub fn has_audio_source(&self) -> bool {
        self.has_audio_source.load(Ordering::Relaxed)
    }

    pub fn set_wall_clock_mode(&self, on: bool) {
        self.wall_clock_mode.store(on, Ordering::Relaxed);
    }

    pub fn is_wall_clock_mode(&self) -> bool {
        self.wall_clock_mode.load(Ordering::Relaxed)
    }

    /// Reader: interpolate the current media time. Lock-free, retries on a
    /// writer collision.
    pub fn now(&self) -> Timestamp {
        if self.is_paused() {
            return Timestamp(self.paused_media_time_us.load(Ordering::Relaxed));
        }

        loop {
            let s1 = self.seq.load(Ordering::Acquire);
            if s1 % 2 != 0 {
                std::hint::spin_loop();
                continue;
            }
            let base_media = self.base_media_time_us.load(Ordering::Relaxed);
            let base_real = self.base_real_time_us.load(Ordering::Relaxed);
            let s2 = self.seq.load(Ordering::Acquire);
            if s1 != s2 {
                std::hint::spin_loop();
                continue;
            }
            let elapsed = self.real_time_us() - base_real;
            return Timestamp(base_media + elapsed);
        }
    }

    pub fn wait_threshold(&self) -> Duration {
        self.wait_threshold
    }

    /// Duration from now until `pts` should be presented (positive = future).
    pub fn until_present(&self, pts: Timestamp) -> Duration {
        pts.checked_sub(self.now())
    }

    /// A/V sync verdict for a video frame with presentation timestamp `pts`.
    pub fn should_present(&self, pts: Timestamp) -> SyncAction {
        if !pts.is_some() {
            return SyncAction::Present;
        }
        let delay = self.until_present(pts);
        if delay > self.wait_threshold {
            SyncAction::Wait
        } else if delay < self.drop_threshold {
            SyncAction::Drop
        } else if delay < self.rush_threshold {
            SyncAction::Present
        } else if delay.0 > 0 {
            SyncAction::Wait
        } else {
            SyncAction::Present
        }
    }
}

impl Default for MasterClock {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn starts_paused_at_zero() {
        let c = MasterClock::new();
        assert!(c.is_paused());
        assert_eq!(c.now(), Timestamp(0));
    }

    #[test]
    fn resume_advances_monotonically() {
        let c = MasterClock::new();
        c.seek(Timestamp(0));
        c.resume();
        let t0 = c.now();
        thread::sleep(std::time::Duration::from_millis(5));
        let t1 = c.now();
        assert!(t1 >= t0);
    }

    #[test]
    fn pause_resume_preserves_base() {
        let c = MasterClock::new();
        c.seek(Timestamp(1_000_000));
        c.resume();
        thread::sleep(std::time::Duration::from_millis(5));
        c.pause();
        let paused_at = c.now();
        // Time must not move while paused.
        thread::sleep(std::time::Duration::from_millis(5));
        assert_eq!(c.now(), paused_at);
        c.resume();
        assert!(c.now() >= paused_at);
    }

    #[test]
    fn seek_reports_target_immediately_while_paused() {
        let c = MasterClock::new();
        c.seek(Timestamp(5_000_000));
        assert_eq!(c.now(), Timestamp(5_000_000));
    }

    #[test]
    fn should_present_thresholds() {
        let c = MasterClock::new();
        c.seek(Timestamp(0));
        c.resume();
        assert_eq!(c.should_present(Timestamp(600_000)), SyncAction::Wait);
        assert_eq!(c.should_present(Timestamp(-200_000)), SyncAction::Drop);
        assert_eq!(c.should_present(Timestamp(-50_000)), SyncAction::Present);
        assert_eq!(c.should_present(Timestamp::NONE), SyncAction::Present);
    }

    #[test]
    fn concurrent_reads_during_writes_never_tear() {
        let c = std::sync::Arc::new(MasterClock::new());
        c.seek(Timestamp(0));
        c.resume();
        let writer = {
            let c = c.clone();
            thread::spawn(move || {
                for i in 0..2000 {
                    c.update(Timestamp(i * 1000));
                }
            })
        };
        let reader = {
            let c = c.clone();
            thread::spawn(move || {
                let mut last = i64::MIN;
                for _ in 0..2000 {
                    let t = c.now().0;
                    assert!(t >= last || last == i64::MIN);
                    last = t;
                }
            })
        };
        writer.join().unwrap();
        reader.join().unwrap();
    }
}
