//! `AsyncQueueNode<T>` — the sole source of thread boundaries in the graph.
//!
//! Every other node is pulled by whoever holds its input pin; this one owns
//! a worker thread that pumps items from an input pin to an output pin.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration as StdDuration;

use crate::config::EngineConfig;
use crate::pin::{Pin, PopResult, PushResult};

pub struct AsyncQueueNode<T> {
    input: Arc<Pin<T>>,
    output: Arc<Pin<T>>,
    running: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
    name: String,
    pop_timeout: StdDuration,
}

impl<T: Send + 'static> AsyncQueueNode<T> {
    pub fn new(name: impl Into<String>, input: Arc<Pin<T>>, output: Arc<Pin<T>>, config: &EngineConfig) -> Self {
        AsyncQueueNode {
            input,
            output,
            running: Arc::new(AtomicBool::new(false)),
            worker: None,
            name: name.into(),
            pop_timeout: StdDuration::from_millis(config.pin_timeout_ms),
        }
    }

    pub fn start(&mut self) {
        if self.running.swap(true, Ordering::AcqRel) {
            return;
        }
        let input = self.input.clone();
        let output = self.output.clone();
        let running = self.running.clone();
        let name = self.name.clone();
        let pop_timeout = self.pop_timeout;
        self.worker = Some(std::thread::spawn(move || {
            log::debug!("[{name}] worker started");
            while running.load(Ordering::Acquire) {
                match input.pop(pop_timeout) {
                    PopResult::Terminated => break,
                    PopResult::Timeout => continue,
                    PopResult::Ready(item) => {
                        if !running.load(Ordering::Acquire) {
                            break;
                        }
                        match output.push(item, pop_timeout) {
                            PushResult::Ok => {}
                            PushResult::Terminated => break,
                            PushResult::Timeout => continue,
                        }
                    }
                }
            }
            log::debug!("[{name}] worker exited");
        }));
    }

    pub fn stop(&mut self) {
        if !self.running.swap(false, Ordering::AcqRel) {
            return;
        }
        self.input.stop();
        if let Some(handle) = self.worker.take() {
            let _ = handle.join();
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }
}

impl<T> Drop for AsyncQueueNode<T> {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Release);
        self.input.stop();
        if let Some(handle) = self.worker.take() {
            let _ = handle.join();
        }
    }
}
