//! Cold-path multi-subscriber events (clip added/removed/moved, pipeline
//! state changes). Never used from the audio callback or a decoder's
//! per-frame loop — emission clones `Args` and calls each subscriber
//! synchronously on the caller's thread.

use parking_lot::Mutex;

pub type SubscriptionId = u64;

struct Subscriber<Args> {
    id: SubscriptionId,
    callback: Box<dyn Fn(&Args) + Send + 'static>,
}

pub struct Signal<Args> {
    subscribers: Mutex<Vec<Subscriber<Args>>>,
    next_id: Mutex<SubscriptionId>,
}

impl<Args> Signal<Args> {
    pub fn new() -> Self {
        Signal {
            subscribers: Mutex::new(Vec::new()),
            next_id: Mutex::new(0),
        }
    }

    pub fn connect(&self, callback: impl Fn(&Args) + Send + 'static) -> SubscriptionId {
        let mut next_id = self.next_id.lock();
        let id = *next_id;
        *next_id += 1;
        self.subscribers.lock().push(Subscriber {
            id,
            callback: Box::new(callback),
        });
        id
    }

    pub fn disconnect(&self, id: SubscriptionId) {
        self.subscribers.lock().retain(|s| s.id != id);
    }

    pub fn emit(&self, args: &Args) {
        for sub in self.subscribers.lock().iter() {
            (sub.callback)(args);
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }
}

impl<Args> Default for Signal<Args> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn emits_to_all_subscribers() {
        let signal: Signal<i32> = Signal::new();
        let sum = Arc::new(AtomicUsize::new(0));

        let s1 = sum.clone();
        signal.connect(move |v| {
            s1.fetch_add(*v as usize, Ordering::SeqCst);
        });
        let s2 = sum.clone();
        signal.connect(move |v| {
            s2.fetch_add(*v as usize, Ordering::SeqCst);
        });

        signal.emit(&5);
        assert_eq!(sum.load(Ordering::SeqCst), 10);
    }

    #[test]
    fn disconnect_stops_delivery() {
        let signal: Signal<i32> = Signal::new();
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        let id = signal.connect(move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        });

        signal.emit(&1);
        signal.disconnect(id);
        signal.emit(&1);

        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}
