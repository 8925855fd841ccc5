//! Video sink node: pulls frames on its own worker thread, filters stale
//! serials, fires pre-roll on the first in-serial frame, and asks the
//! master clock for a drop/wait/present verdict on every subsequent one.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration as StdDuration;

use parking_lot::Mutex;

use crate::clock::{MasterClock, SyncAction};
use crate::config::EngineConfig;
use crate::external::Renderer;
use crate::frame::VideoFrame;
use crate::node::Node;
use crate::pin::{Pin, PopResult};

type ReadyCallback = Box<dyn Fn() + Send>;
type EofCallback = Box<dyn Fn() + Send>;
type ErrorCallback = Box<dyn Fn(&str) + Send>;

pub struct VideoSinkNode {
    input: Arc<Pin<VideoFrame>>,
    renderer: Arc<Mutex<Box<dyn Renderer>>>,
    clock: Arc<MasterClock>,
    current_serial: Arc<AtomicU64>,
    running: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
    frames_rendered: Arc<AtomicU64>,
    frames_dropped: Arc<AtomicU64>,
    on_ready: Arc<Mutex<Option<ReadyCallback>>>,
    on_eof: Arc<Mutex<Option<EofCallback>>>,
    on_error: Arc<Mutex<Option<ErrorCallback>>>,
    pop_timeout: StdDuration,
    max_consecutive_errors: u32,
}

impl VideoSinkNode {
    pub fn new(input: Arc<Pin<VideoFrame>>, renderer: Box<dyn Renderer>, clock: Arc<MasterClock>, current_serial: Arc<AtomicU64>, config: &EngineConfig) -> Self {
        VideoSinkNode {
            input,
            renderer: Arc::new(Mutex::new(renderer)),
            clock,
            current_serial,
            running: Arc::new(AtomicBool::new(false)),
            worker: None,
            frames_rendered: Arc::new(AtomicU64::new(0)),
            frames_dropped: Arc::new(AtomicU64::new(0)),
            on_ready: Arc::new(Mutex::new(None)),
            on_eof: Arc::new(Mutex::new(None)),
            on_error: Arc::new(Mutex::new(None)),
            pop_timeout: StdDuration::from_millis(config.pin_timeout_ms),
            max_consecutive_errors: config.max_consecutive_decoder_errors,
        }
    }

    pub fn set_ready_callback(&self, cb: impl Fn() + Send + 'static) {
        *self.on_ready.lock() = Some(Box::new(cb));
    }

    pub fn set_eof_callback(&self, cb: impl Fn() + Send + 'static) {
        *self.on_eof.lock() = Some(Box::new(cb));
    }

    pub fn set_error_callback(&self, cb: impl Fn(&str) + Send + 'static) {
        *self.on_error.lock() = Some(Box::new(cb));
    }

    pub fn frames_rendered(&self) -> u64 {
        self.frames_rendered.load(Ordering::Relaxed)
    }

    pub fn frames_dropped(&self) -> u64 {
        self.frames_dropped.load(Ordering::Relaxed)
    }
}

impl Node for VideoSinkNode {
    fn start(&mut self) {
        if self.running.swap(true, Ordering::AcqRel) {
            return;
        }
        self.input.reset();

        let input = self.input.clone();
        let renderer = self.renderer.clone();
        let clock = self.clock.clone();
        let current_serial = self.current_serial.clone();
        let running = self.running.clone();
        let frames_rendered = self.frames_rendered.clone();
        let frames_dropped = self.frames_dropped.clone();
        let on_ready = self.on_ready.clone();
        let on_eof = self.on_eof.clone();
        let on_error = self.on_error.clone();
        let pop_timeout = self.pop_timeout;
        let max_consecutive_errors = self.max_consecutive_errors;

        self.worker = Some(std::thread::spawn(move || {
            log::debug!("[VideoSink] worker started");
            let mut first_frame = true;
            let mut consecutive_errors = 0u32;

            while running.load(Ordering::Acquire) {
                let frame = match input.pop(pop_timeout) {
                    PopResult::Terminated => break,
                    PopResult::Timeout => continue,
                    PopResult::Ready(f) => f,
                };
                if !running.load(Ordering::Acquire) {
                    break;
                }

                if frame.is_eof() {
                    log::info!("[VideoSink] received EOF");
                    if let Some(cb) = on_eof.lock().as_ref() {
                        cb();
                    }
                    continue;
                }

                if frame.is_error() {
                    consecutive_errors += 1;
                    log::error!("[VideoSink] received error frame (consecutive: {consecutive_errors})");
                    if consecutive_errors >= max_consecutive_errors {
                        if let Some(cb) = on_error.lock().as_ref() {
                            cb("too many consecutive decode errors");
                        }
                    }
                    continue;
                }
                consecutive_errors = 0;

                let expected_serial = current_serial.load(Ordering::Acquire);
                if frame.serial != expected_serial {
                    frames_dropped.fetch_add(1, Ordering::Relaxed);
                    continue;
                }

                if first_frame {
                    first_frame = false;
                    log::debug!("[VideoSink] first frame received, pts={:?}", frame.pts);
                    if let Some(cb) = on_ready.lock().as_ref() {
                        cb();
                    }
                }

                match clock.should_present(frame.pts) {
                    SyncAction::Drop => {
                        frames_dropped.fetch_add(1, Ordering::Relaxed);
                        continue;
                    }
                    SyncAction::Wait => {
                        let delay = clock.until_present(frame.pts);
                        if delay.0 > 0 && delay < clock.wait_threshold() {
                            let sleep_us = (delay.0 - 1000).max(0) as u64;
                            std::thread::sleep(StdDuration::from_micros(sleep_us));
                        }
                    }
                    SyncAction::Present => {}
                }

                let mut r = renderer.lock();
                match r.draw(&frame).and_then(|_| r.present()) {
                    Ok(()) => {
                        frames_rendered.fetch_add(1, Ordering::Relaxed);
                    }
                    Err(e) => {
                        log::warn!("[VideoSink] render failed: {e}");
                    }
                }
            }
            log::debug!("[VideoSink] worker exited. rendered={} dropped={}", frames_rendered.load(Ordering::Relaxed), frames_dropped.load(Ordering::Relaxed));
        }));
    }

    fn stop(&mut self) {
        if !self.running.swap(false, Ordering::AcqRel) {
            return;
        }
        self.input.stop();
        if let Some(handle) = self.worker.take() {
            let _ = handle.join();
        }
    }

    fn flush(&mut self) {
        self.input.flush();
    }
}
