//! Bounded queue with a drop-oldest overflow policy.
//!
//! Stream consumers (packet-in, digest lists, idle timeouts) read through
//! these queues; a slow consumer loses the oldest messages rather than
//! stalling the stream reader, and the drop count is reported so the switch
//! can surface it.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use tokio::sync::Notify;

struct Shared<T> {
    state: Mutex<State<T>>,
    notify: Notify,
}

struct State<T> {
    items: VecDeque<T>,
    capacity: usize,
    dropped: u64,
    closed: bool,
}

/// Producer half; cheap to clone.
pub struct QueueSender<T> {
    shared: Arc<Shared<T>>,
}

/// Consumer half.
pub struct QueueReceiver<T> {
    shared: Arc<Shared<T>>,
}

pub fn bounded<T>(capacity: usize) -> (QueueSender<T>, QueueReceiver<T>) {
    assert!(capacity > 0);
    let shared = Arc::new(Shared {
        state: Mutex::new(State {
            items: VecDeque::with_capacity(capacity),
            capacity,
            dropped: 0,
            closed: false,
        }),
        notify: Notify::new(),
    });
    (
        QueueSender {
            shared: shared.clone(),
        },
        QueueReceiver { shared },
    )
}

impl<T> Clone for QueueSender<T> {
    fn clone(&self) -> Self {
        QueueSender {
            shared: self.shared.clone(),
        }
    }
}

impl<T> QueueSender<T> {
    /// Enqueue an item, evicting the oldest one on overflow. Returns the
    /// total number of items dropped so far (0 while the consumer keeps up).
    pub fn push(&self, item: T) -> u64 {
        let mut state = self.shared.state.lock().unwrap();
        if state.closed {
            return state.dropped;
        }
        if state.items.len() == state.capacity {
            state.items.pop_front();
            state.dropped += 1;
        }
        state.items.push_back(item);
        let dropped = state.dropped;
        drop(state);
        self.shared.notify.notify_one();
        dropped
    }

    /// True once the receiver side has gone away.
    pub fn is_closed(&self) -> bool {
        self.shared.state.lock().unwrap().closed
    }
}

impl<T> QueueReceiver<T> {
    /// Wait for the next item. Returns None after `close` with an empty queue.
    pub async fn pop(&self) -> Option<T> {
        loop {
            let notified = self.shared.notify.notified();
            {
                let mut state = self.shared.state.lock().unwrap();
                if let Some(item) = state.items.pop_front() {
                    return Some(item);
                }
                if state.closed {
                    return None;
                }
            }
            notified.await;
        }
    }

    pub fn dropped(&self) -> u64 {
        self.shared.state.lock().unwrap().dropped
    }

    pub fn close(&self) {
        self.shared.state.lock().unwrap().closed = true;
        // A permit-storing wake, so a pop that registers late still sees it.
        self.shared.notify.notify_one();
    }
}

impl<T> Drop for QueueReceiver<T> {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fifo_order() {
        let (tx, rx) = bounded(4);
        tx.push(1);
        tx.push(2);
        tx.push(3);
        assert_eq!(rx.pop().await, Some(1));
        assert_eq!(rx.pop().await, Some(2));
        assert_eq!(rx.pop().await, Some(3));
    }

    #[tokio::test]
    async fn overflow_drops_oldest() {
        let (tx, rx) = bounded(2);
        tx.push(1);
        tx.push(2);
        let dropped = tx.push(3);
        assert_eq!(dropped, 1);
        assert_eq!(rx.pop().await, Some(2));
        assert_eq!(rx.pop().await, Some(3));
        assert_eq!(rx.dropped(), 1);
    }

    #[tokio::test]
    async fn close_wakes_waiter() {
        let (_tx, rx) = bounded::<u32>(2);
        let rx = Arc::new(rx);
        let rx2 = rx.clone();
        let waiter = tokio::spawn(async move { rx2.pop().await });
        tokio::task::yield_now().await;
        rx.close();
        assert_eq!(waiter.await.unwrap(), None);
    }
}
