//! Backward-seek-with-soft-fail helper shared by the demuxer and the
//! offline decoder: ffmpeg containers reject a zero-range seek on some
//! platforms, and landing on the nearest preceding keyframe (rather than
//! the nearest frame in either direction) is what the send/receive loops
//! above expect.

use ffmpeg_the_third as ffmpeg;

use vstream_core::EngineResult;

/// Seeks `ictx` to `target_pts` (in the stream's own time base), backward
/// only. A seek to a non-positive target is skipped entirely rather than
/// issued — some containers return EPERM for a zero-range seek — and is
/// treated as a no-op success since the decoder is already positioned at
/// or before the start.
pub fn seek_backward(ictx: &mut ffmpeg::format::context::Input, stream_index: usize, target_pts: i64) -> EngineResult<()> {
    if target_pts <= 0 {
        log::debug!("[vstream-media] skipping seek at or before t=0");
        return Ok(());
    }
    match ictx.seek(target_pts, ..=target_pts) {
        Ok(()) => Ok(()),
        Err(e) => {
            log::warn!("[vstream-media] seek to pts {target_pts} on stream {stream_index} failed, continuing from current position: {e}");
            Ok(())
        }
    }
}
