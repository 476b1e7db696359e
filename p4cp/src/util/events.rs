//! A small synchronous event emitter.
//!
//! Listeners are invoked in registration order. A panicking listener is
//! logged and does not stop delivery to the remaining listeners.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Mutex;

type Listener<P> = Box<dyn Fn(&P) + Send + Sync>;

pub struct Emitter<K, P> {
    listeners: Mutex<Vec<(K, Listener<P>)>>,
}

impl<K: PartialEq + std::fmt::Debug, P> Emitter<K, P> {
    pub fn new() -> Self {
        Emitter {
            listeners: Mutex::new(Vec::new()),
        }
    }

    /// Register a listener for `event`.
    pub fn on(&self, event: K, listener: impl Fn(&P) + Send + Sync + 'static) {
        self.listeners
            .lock()
            .unwrap()
            .push((event, Box::new(listener)));
    }

    /// Deliver `payload` to every listener registered for `event`.
    pub fn emit(&self, event: &K, payload: &P) {
        let listeners = self.listeners.lock().unwrap();
        for (key, listener) in listeners.iter() {
            if key != event {
                continue;
            }
            if catch_unwind(AssertUnwindSafe(|| listener(payload))).is_err() {
                log::error!("listener for {:?} panicked", event);
            }
        }
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.lock().unwrap().len()
    }
}

impl<K: PartialEq + std::fmt::Debug, P> Default for Emitter<K, P> {
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
    fn listeners_run_in_registration_order() {
        let emitter: Emitter<&str, Mutex<Vec<u32>>> = Emitter::new();
        emitter.on("up", |seen| seen.lock().unwrap().push(1));
        emitter.on("up", |seen| seen.lock().unwrap().push(2));
        emitter.on("down", |seen| seen.lock().unwrap().push(3));

        let seen = Mutex::new(Vec::new());
        emitter.emit(&"up", &seen);
        assert_eq!(*seen.lock().unwrap(), vec![1, 2]);
    }

    #[test]
    fn panicking_listener_does_not_stop_delivery() {
        let emitter: Emitter<&str, ()> = Emitter::new();
        let count = Arc::new(AtomicUsize::new(0));

        emitter.on("tick", |_| panic!("listener bug"));
        let count2 = count.clone();
        emitter.on("tick", move |_| {
            count2.fetch_add(1, Ordering::SeqCst);
        });

        emitter.emit(&"tick", &());
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}
