//! Scoped task group for the switch lifecycle.
//!
//! All work started while a switch is READY runs inside one group. Leaving
//! READY (stream loss, role change, shutdown) cancels the group; a failing
//! task cancels its siblings and records the first error for the supervisor.
//! Foreground tasks (the ready handler and its children) are additionally
//! cancelled on a primary/backup role change, background tasks are not.

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Weak};

use tokio::sync::Notify;
use tokio::task::JoinHandle;

use crate::errors::Error;

struct Shared {
    active: AtomicUsize,
    done: Notify,
    first_error: Mutex<Option<Error>>,
}

struct ActiveGuard(Arc<Shared>);

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        if self.0.active.fetch_sub(1, Ordering::AcqRel) == 1 {
            // notify_one stores a permit, so a waiter that registers after
            // this call still wakes up.
            self.0.done.notify_one();
        }
    }
}

struct TaskSlot {
    name: String,
    background: bool,
    handle: JoinHandle<()>,
}

pub struct TaskGroup {
    shared: Arc<Shared>,
    tasks: Mutex<Vec<TaskSlot>>,
}

impl TaskGroup {
    pub fn new() -> Arc<Self> {
        Arc::new(TaskGroup {
            shared: Arc::new(Shared {
                active: AtomicUsize::new(0),
                done: Notify::new(),
                first_error: Mutex::new(None),
            }),
            tasks: Mutex::new(Vec::new()),
        })
    }

    /// Spawn a task owned by this group. The future's error, if any, cancels
    /// the whole group and is kept for [`TaskGroup::take_error`].
    pub fn spawn<F>(self: &Arc<Self>, name: &str, background: bool, future: F)
    where
        F: Future<Output = Result<(), Error>> + Send + 'static,
    {
        let shared = self.shared.clone();
        let group = Arc::downgrade(self);
        let task_name = name.to_string();

        shared.active.fetch_add(1, Ordering::AcqRel);
        let guard = ActiveGuard(shared.clone());

        let handle = tokio::spawn(async move {
            let _guard = guard;
            match future.await {
                Ok(()) => {}
                Err(Error::Cancelled) => {
                    log::debug!("task {:?} cancelled", task_name);
                }
                Err(err) => {
                    if err.is_transient() {
                        log::debug!("task {:?} failed: {}", task_name, err);
                    } else {
                        log::error!("task {:?} failed: {}", task_name, err);
                    }
                    let mut first = shared.first_error.lock().unwrap();
                    if first.is_none() {
                        *first = Some(err);
                    }
                    drop(first);
                    if let Some(group) = group.upgrade() {
                        group.cancel_all();
                    }
                }
            }
        });

        self.tasks.lock().unwrap().push(TaskSlot {
            name: name.to_string(),
            background,
            handle,
        });
    }

    /// Abort every task in the group.
    pub fn cancel_all(&self) {
        for slot in self.tasks.lock().unwrap().iter() {
            slot.handle.abort();
        }
    }

    /// Abort foreground tasks only; used on primary/backup role changes.
    pub fn cancel_foreground(&self) {
        for slot in self.tasks.lock().unwrap().iter() {
            if !slot.background {
                log::debug!("cancelling foreground task {:?}", slot.name);
                slot.handle.abort();
            }
        }
    }

    /// Wait until every task has finished (normally or by abort).
    pub async fn wait(&self) {
        loop {
            let notified = self.shared.done.notified();
            if self.shared.active.load(Ordering::Acquire) == 0 {
                return;
            }
            notified.await;
        }
    }

    pub fn active(&self) -> usize {
        self.shared.active.load(Ordering::Acquire)
    }

    /// The first non-cancellation error any task reported, if one did.
    pub fn take_error(&self) -> Option<Error> {
        self.shared.first_error.lock().unwrap().take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::{sleep, timeout};

    #[tokio::test]
    async fn wait_returns_when_tasks_finish() {
        let group = TaskGroup::new();
        group.spawn("a", false, async { Ok(()) });
        group.spawn("b", false, async {
            sleep(Duration::from_millis(5)).await;
            Ok(())
        });
        timeout(Duration::from_secs(1), group.wait()).await.unwrap();
        assert_eq!(group.active(), 0);
    }

    #[tokio::test]
    async fn cancel_all_stops_runaway_tasks() {
        let group = TaskGroup::new();
        group.spawn("spin", false, async {
            loop {
                sleep(Duration::from_secs(60)).await;
            }
        });
        group.spawn("spin2", true, async {
            loop {
                sleep(Duration::from_secs(60)).await;
            }
        });
        group.cancel_all();
        timeout(Duration::from_secs(1), group.wait()).await.unwrap();
    }

    #[tokio::test]
    async fn failing_task_cancels_siblings() {
        let group = TaskGroup::new();
        group.spawn("sibling", false, async {
            loop {
                sleep(Duration::from_secs(60)).await;
            }
        });
        group.spawn("bad", false, async {
            Err(Error::Pipeline("verify failed".to_string()))
        });
        timeout(Duration::from_secs(1), group.wait()).await.unwrap();
        let err = group.take_error().unwrap();
        assert!(matches!(err, Error::Pipeline(_)));
    }

    #[tokio::test]
    async fn role_change_keeps_background_tasks() {
        let group = TaskGroup::new();
        group.spawn("fg", false, async {
            loop {
                sleep(Duration::from_secs(60)).await;
            }
        });
        group.spawn("bg", true, async {
            sleep(Duration::from_millis(20)).await;
            Ok(())
        });
        group.cancel_foreground();
        sleep(Duration::from_millis(5)).await;
        assert_eq!(group.active(), 1); // only the background task remains
        timeout(Duration::from_secs(1), group.wait()).await.unwrap();
    }
}
