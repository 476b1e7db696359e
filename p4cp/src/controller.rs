//! Supervisor for a set of switches.
//!
//! Each switch runs under its own supervisor task; failures never
//! cross-cancel siblings. Switches can be added and removed while the
//! controller runs, and code running under the controller can reach it via
//! [`Controller::current`].
/*
Copyright (c) 2021 VMware, Inc.
SPDX-License-Identifier: MIT
Permission is hereby granted, free of charge, to any person obtaining a copy
of this software and associated documentation files (the "Software"), to deal
in the Software without restriction, including without limitation the rights
to use, copy, modify, merge, publish, distribute, sublicense, and/or sell
copies of the Software, and to permit persons to whom the Software is
furnished to do so, subject to the following conditions:
The above copyright notice and this permission notice shall be included in all
copies or substantial portions of the Software.
THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS OR
IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY,
FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE
AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER
LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING FROM,
OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS IN THE
SOFTWARE.
*/

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;

use crate::errors::{Error, Result};
use crate::switch::{EventData, Switch, SwitchEvent};

tokio::task_local! {
    static CURRENT: Controller;
}

struct Slot {
    switch: Switch,
    handle: Option<JoinHandle<()>>,
    done: watch::Sender<bool>,
}

struct ControllerInner {
    name: String,
    switches: Mutex<BTreeMap<String, Slot>>,
    running: AtomicBool,
    active: AtomicUsize,
    active_changed: Arc<Notify>,
    stop: watch::Sender<bool>,
}

/// A named collection of switches run concurrently.
#[derive(Clone)]
pub struct Controller {
    inner: Arc<ControllerInner>,
}

impl Controller {
    pub fn new(name: &str) -> Controller {
        let (stop, _) = watch::channel(false);
        Controller {
            inner: Arc::new(ControllerInner {
                name: name.to_string(),
                switches: Mutex::new(BTreeMap::new()),
                running: AtomicBool::new(false),
                active: AtomicUsize::new(0),
                active_changed: Arc::new(Notify::new()),
                stop,
            }),
        }
    }

    /// Build a controller from an initial switch set.
    pub fn with_switches(
        name: &str,
        switches: impl IntoIterator<Item = Switch>,
    ) -> Result<Controller> {
        let controller = Controller::new(name);
        for switch in switches {
            controller.add(switch)?;
        }
        Ok(controller)
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::Acquire)
    }

    pub fn len(&self) -> usize {
        self.inner.switches.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.switches.lock().unwrap().is_empty()
    }

    pub fn get(&self, name: &str) -> Option<Switch> {
        self.inner
            .switches
            .lock()
            .unwrap()
            .get(name)
            .map(|slot| slot.switch.clone())
    }

    pub fn switches(&self) -> Vec<Switch> {
        self.inner
            .switches
            .lock()
            .unwrap()
            .values()
            .map(|slot| slot.switch.clone())
            .collect()
    }

    /// Add a switch. Names must be unique; a running controller starts the
    /// switch immediately.
    pub fn add(&self, switch: Switch) -> Result<()> {
        let name = switch.name().to_string();
        let mut switches = self.inner.switches.lock().unwrap();
        if switches.contains_key(&name) {
            return Err(Error::config(format!(
                "switch named {:?} already exists",
                name
            )));
        }
        let (done, _) = watch::channel(false);
        let mut slot = Slot {
            switch,
            handle: None,
            done,
        };
        if self.is_running() {
            self.start_slot(&mut slot);
        }
        switches.insert(name, slot);
        Ok(())
    }

    /// Remove a switch by name, stopping it if running. The returned event
    /// completes when the switch has fully stopped.
    pub fn remove(&self, name: &str) -> Result<StopEvent> {
        let slot = self
            .inner
            .switches
            .lock()
            .unwrap()
            .remove(name)
            .ok_or_else(|| Error::config(format!("switch named {:?} not found", name)))?;

        let rx = slot.done.subscribe();
        match slot.handle {
            Some(_) => slot.switch.stop(),
            None => {
                // Never started; it is already as stopped as it gets.
                let _ = slot.done.send(true);
            }
        }
        Ok(StopEvent { rx })
    }

    /// Run every switch until [`Controller::stop`] is called or all
    /// supervisors finish. Not re-entrant.
    pub async fn run(&self) -> Result<()> {
        if self.inner.running.swap(true, Ordering::AcqRel) {
            return Err(Error::config("controller is already running"));
        }
        let _ = self.inner.stop.send(false);
        log::debug!("controller {:?}: starting", self.name());

        let controller = self.clone();
        CURRENT
            .scope(controller, async {
                // Start everything present at launch.
                {
                    let mut switches = self.inner.switches.lock().unwrap();
                    for slot in switches.values_mut() {
                        if slot.handle.is_none() {
                            self.start_slot(slot);
                        }
                    }
                }

                // Wait for a stop request, or for the whole fleet to finish.
                let mut stop_rx = self.inner.stop.subscribe();
                loop {
                    if *stop_rx.borrow() {
                        break;
                    }
                    if self.inner.active.load(Ordering::Acquire) == 0 {
                        break;
                    }
                    let changed = self.inner.active_changed.notified();
                    tokio::select! {
                        _ = stop_rx.changed() => {}
                        _ = changed => {}
                    }
                }

                // Ask every switch to close, then wait for the supervisors.
                let handles: Vec<JoinHandle<()>> = {
                    let mut switches = self.inner.switches.lock().unwrap();
                    for slot in switches.values() {
                        slot.switch.stop();
                    }
                    switches
                        .values_mut()
                        .filter_map(|slot| slot.handle.take())
                        .collect()
                };
                for handle in handles {
                    let _ = handle.await;
                }
            })
            .await;

        self.inner.running.store(false, Ordering::Release);
        log::debug!("controller {:?}: stopped", self.name());
        Ok(())
    }

    /// Request shutdown; `run` returns after every switch closes.
    pub fn stop(&self) {
        let _ = self.inner.stop.send(true);
    }

    fn start_slot(&self, slot: &mut Slot) {
        let switch = slot.switch.clone();
        let done = slot.done.clone();
        let controller = self.clone();

        log::debug!(
            "controller {:?}: starting switch {:?}",
            self.name(),
            switch.name()
        );
        switch.emit(SwitchEvent::ControllerEnter, EventData::None);
        self.inner.active.fetch_add(1, Ordering::AcqRel);

        let inner = self.inner.clone();
        slot.handle = Some(tokio::spawn(CURRENT.scope(controller, async move {
            if let Err(err) = switch.run().await {
                // Independent supervisors: a failed switch never takes its
                // siblings down.
                log::error!("switch {:?} failed: {}", switch.name(), err);
            }
            switch.emit(SwitchEvent::ControllerLeave, EventData::None);
            let _ = done.send(true);
            inner.active.fetch_sub(1, Ordering::AcqRel);
            // notify_one stores a permit, so a waiter that registers after
            // this call still wakes up.
            inner.active_changed.notify_one();
        })));
    }

    /// The controller the current task runs under, if any.
    pub fn try_current() -> Option<Controller> {
        CURRENT.try_with(|controller| controller.clone()).ok()
    }

    /// The controller the current task runs under; panics outside one.
    pub fn current() -> Controller {
        Self::try_current().expect("no controller in the current task")
    }

    /// Run `future` with this controller set as the task's current one.
    pub fn scope<F>(&self, future: F) -> impl Future<Output = F::Output>
    where
        F: Future,
    {
        CURRENT.scope(self.clone(), future)
    }
}

impl std::fmt::Debug for Controller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Controller")
            .field("name", &self.inner.name)
            .field("switches", &self.len())
            .finish()
    }
}

/// Completion marker returned by [`Controller::remove`].
pub struct StopEvent {
    rx: watch::Receiver<bool>,
}

impl StopEvent {
    /// Wait until the removed switch has fully stopped.
    pub async fn wait(mut self) {
        while !*self.rx.borrow() {
            if self.rx.changed().await.is_err() {
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::switch::SwitchOptions;
    use std::time::Duration;
    use tokio::time::timeout;

    fn switch(name: &str) -> Switch {
        Switch::new(name, "127.0.0.1:50001", SwitchOptions::new()).unwrap()
    }

    #[test]
    fn duplicate_names_rejected() {
        let controller = Controller::new("test");
        controller.add(switch("s1")).unwrap();
        assert!(controller.add(switch("s1")).is_err());
        controller.add(switch("s2")).unwrap();
        assert_eq!(controller.len(), 2);
    }

    #[test]
    fn get_and_remove() {
        let controller = Controller::new("test");
        controller.add(switch("s1")).unwrap();
        assert!(controller.get("s1").is_some());
        assert!(controller.get("nope").is_none());

        controller.remove("s1").unwrap();
        assert!(controller.get("s1").is_none());
        assert!(controller.remove("s1").is_err());
    }

    #[tokio::test]
    async fn remove_before_start_completes_immediately() {
        let controller = Controller::new("test");
        controller.add(switch("s1")).unwrap();
        let stopped = controller.remove("s1").unwrap();
        timeout(Duration::from_secs(1), stopped.wait())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn current_is_scoped() {
        assert!(Controller::try_current().is_none());
        let controller = Controller::new("test");
        let seen = controller
            .scope(async { Controller::current().name().to_string() })
            .await;
        assert_eq!(seen, "test");
        assert!(Controller::try_current().is_none());
    }

    #[tokio::test]
    async fn run_stops_on_request() {
        let controller = Controller::new("test");
        // No switches: run blocks until stop() (active==0 but stop flag is
        // what we exercise; an empty fleet exits immediately).
        let ctrl = controller.clone();
        let run = tokio::spawn(async move { ctrl.run().await });
        timeout(Duration::from_secs(1), run).await.unwrap().unwrap().unwrap();
        assert!(!controller.is_running());
    }
}
