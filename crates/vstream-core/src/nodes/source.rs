//! Source (demuxer) node: reads packets on its own worker thread and routes
//! them to per-kind packet pins, tagging each with the pipeline's current
//! serial.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration as StdDuration;

use crate::config::EngineConfig;
use crate::error::EngineResult;
use crate::external::Demuxer;
use crate::frame::{MediaKind, Packet};
use crate::node::Node;
use crate::pin::{Pin, PushResult};
use crate::time::Timestamp;

pub struct SourceNode {
    demuxer: Box<dyn Demuxer>,
    video_out: Arc<Pin<Packet>>,
    audio_out: Arc<Pin<Packet>>,
    serial: Arc<AtomicU64>,
    running: Arc<AtomicBool>,
    reading: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
    push_timeout: StdDuration,
}

impl SourceNode {
    pub fn new(
        demuxer: Box<dyn Demuxer>,
        video_out: Arc<Pin<Packet>>,
        audio_out: Arc<Pin<Packet>>,
        serial: Arc<AtomicU64>,
        config: &EngineConfig,
    ) -> Self {
        SourceNode {
            demuxer,
            video_out,
            audio_out,
            serial,
            running: Arc::new(AtomicBool::new(false)),
            reading: Arc::new(AtomicBool::new(true)),
            worker: None,
            push_timeout: StdDuration::from_millis(config.pin_timeout_ms),
        }
    }

    /// Stop reading new packets without tearing down the worker thread.
    pub fn pause_reading(&self) {
        self.reading.store(false, Ordering::Release);
    }

    pub fn resume_reading(&self) {
        self.reading.store(true, Ordering::Release);
    }

    /// Backward-flag seek at the container. Does not flush downstream
    /// queues — the pipeline controller does that as part of its seek
    /// protocol (§4.9).
    pub fn seek_to(&mut self, pts: Timestamp) -> EngineResult<()> {
        self.demuxer.seek(pts)
    }
}

impl Node for SourceNode {
    fn start(&mut self) {
        if self.running.swap(true, Ordering::AcqRel) {
            return;
        }
        self.reading.store(true, Ordering::Release);

        // The worker owns the demuxer exclusively for its lifetime; we take
        // it out of `self` so the thread can own it directly.
        let mut demuxer = std::mem::replace(&mut self.demuxer, Box::new(NullDemuxer));
        let video_out = self.video_out.clone();
        let audio_out = self.audio_out.clone();
        let serial = self.serial.clone();
        let running = self.running.clone();
        let reading = self.reading.clone();
        let push_timeout = self.push_timeout;

        self.worker = Some(std::thread::spawn(move || {
            log::debug!("[Source] worker started");
            let mut video_eof_sent = false;
            let mut audio_eof_sent = false;

            while running.load(Ordering::Acquire) {
                if !reading.load(Ordering::Acquire) {
                    std::thread::sleep(StdDuration::from_millis(10));
                    continue;
                }

                match demuxer.read_packet() {
                    Ok(Some(mut packet)) => {
                        packet.serial = serial.load(Ordering::Acquire);
                        let out = match packet.media_kind {
                            MediaKind::Video => &video_out,
                            MediaKind::Audio => &audio_out,
                        };
                        if let PushResult::Terminated = out.push(packet, push_timeout) {
                            break;
                        }
                    }
                    Ok(None) => {
                        let s = serial.load(Ordering::Acquire);
                        if !video_eof_sent {
                            let _ = video_out.push(Packet::eof(MediaKind::Video, s), push_timeout);
                            video_eof_sent = true;
                        }
                        if !audio_eof_sent {
                            let _ = audio_out.push(Packet::eof(MediaKind::Audio, s), push_timeout);
                            audio_eof_sent = true;
                        }
                        log::info!("[Source] reached end of file");
                        break;
                    }
                    Err(e) => {
                        log::warn!("[Source] read error, emitting EOF: {e}");
                        let s = serial.load(Ordering::Acquire);
                        let _ = video_out.push(Packet::eof(MediaKind::Video, s), push_timeout);
                        let _ = audio_out.push(Packet::eof(MediaKind::Audio, s), push_timeout);
                        break;
                    }
                }
            }
            log::debug!("[Source] worker exited");
        }));
    }

    fn stop(&mut self) {
        if !self.running.swap(false, Ordering::AcqRel) {
            return;
        }
        self.video_out.stop();
        self.audio_out.stop();
        if let Some(handle) = self.worker.take() {
            let _ = handle.join();
        }
    }

    fn flush(&mut self) {
        self.video_out.flush();
        self.audio_out.flush();
    }
}

/// Placeholder left behind in `self.demuxer` once the real demuxer has been
/// handed off to the worker thread. Never read from.
struct NullDemuxer;

impl Demuxer for NullDemuxer {
    fn properties(&self) -> crate::external::MediaProperties {
        crate::external::MediaProperties::default()
    }
    fn read_packet(&mut self) -> EngineResult<Option<Packet>> {
        Ok(None)
    }
    fn seek(&mut self, _pts: Timestamp) -> EngineResult<()> {
        Ok(())
    }
}
