//! Switch port table driven by gNMI interface state.
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
use std::sync::{Arc, Mutex};

use crate::errors::Result;
use crate::gnmiclient::{GnmiClient, GnmiSubscription, GnmiUpdate};
use crate::gnmipath::GnmiPath;

/// gNMI values for interface oper-status.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OperStatus {
    Up,
    Down,
    Testing,
    Unknown,
    Dormant,
    NotPresent,
    LowerLayerDown,
}

impl OperStatus {
    fn parse(value: &str) -> OperStatus {
        match value {
            "UP" => OperStatus::Up,
            "DOWN" => OperStatus::Down,
            "TESTING" => OperStatus::Testing,
            "DORMANT" => OperStatus::Dormant,
            "NOT_PRESENT" => OperStatus::NotPresent,
            "LOWER_LAYER_DOWN" => OperStatus::LowerLayerDown,
            _ => OperStatus::Unknown,
        }
    }
}

/// One switch interface.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Port {
    pub id: u64,
    pub name: String,
    pub oper_status: OperStatus,
}

impl Port {
    pub fn is_up(&self) -> bool {
        self.oper_status == OperStatus::Up
    }
}

/// Port state change reported to the switch.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PortEvent {
    Up(Port),
    Down(Port),
}

fn if_index_path() -> GnmiPath {
    GnmiPath::new("interfaces/interface[name=*]/state/ifindex").expect("static path")
}

fn oper_status_path() -> GnmiPath {
    GnmiPath::new("interfaces/interface[name=*]/state/oper-status").expect("static path")
}

/// The set of device ports, kept current by a gNMI subscription.
#[derive(Clone, Default)]
pub struct PortList {
    ports: Arc<Mutex<BTreeMap<String, Port>>>,
}

impl PortList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<Port> {
        self.ports.lock().unwrap().get(name).cloned()
    }

    pub fn len(&self) -> usize {
        self.ports.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.ports.lock().unwrap().is_empty()
    }

    pub fn snapshot(&self) -> Vec<Port> {
        self.ports.lock().unwrap().values().cloned().collect()
    }

    pub fn clear(&self) {
        self.ports.lock().unwrap().clear();
    }

    /// Fetch the port inventory, subscribe to oper-status changes and
    /// consume the initial sync. Returns the live subscription.
    pub async fn subscribe(&self, client: &GnmiClient) -> Result<GnmiSubscription> {
        let mut ports = BTreeMap::new();
        for update in client.get(&[if_index_path()]).await? {
            let Some(name) = update.path.key("name").map(str::to_string) else {
                continue;
            };
            let id = update.uint_value().unwrap_or(0);
            ports.insert(
                name.clone(),
                Port {
                    id,
                    name,
                    oper_status: OperStatus::Unknown,
                },
            );
        }
        *self.ports.lock().unwrap() = ports;

        let mut subscription = client.subscribe();
        subscription.on_change(&[oper_status_path()]);
        for update in subscription.synchronize().await? {
            self.apply(&update);
        }
        Ok(subscription)
    }

    /// Apply one oper-status update; the returned event marks an up/down
    /// transition.
    pub fn apply(&self, update: &GnmiUpdate) -> Option<PortEvent> {
        if update.path.last() != Some("oper-status") {
            log::warn!("ports: unexpected gNMI path: {}", update.path);
            return None;
        }
        let name = update.path.key("name")?;
        let status = OperStatus::parse(update.string_value()?);

        let mut ports = self.ports.lock().unwrap();
        let port = ports.get_mut(name)?;
        let was_up = port.is_up();
        port.oper_status = status;
        let is_up = port.is_up();

        if was_up == is_up {
            None
        } else if is_up {
            Some(PortEvent::Up(port.clone()))
        } else {
            Some(PortEvent::Down(port.clone()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proto::gnmi;

    fn status_update(name: &str, status: &str) -> GnmiUpdate {
        let path = GnmiPath::new(&format!(
            "interfaces/interface[name={}]/state/oper-status",
            name
        ))
        .unwrap();
        GnmiUpdate {
            timestamp: 1,
            path,
            value: Some(gnmi::TypedValue {
                value: Some(gnmi::typed_value::Value::StringVal(status.to_string())),
            }),
        }
    }

    fn seeded() -> PortList {
        let list = PortList::new();
        list.ports.lock().unwrap().insert(
            "s1-eth1".to_string(),
            Port {
                id: 1,
                name: "s1-eth1".to_string(),
                oper_status: OperStatus::Unknown,
            },
        );
        list
    }

    #[test]
    fn transitions_produce_events() {
        let list = seeded();

        let event = list.apply(&status_update("s1-eth1", "UP")).unwrap();
        assert!(matches!(event, PortEvent::Up(_)));

        // Same state again: no event.
        assert!(list.apply(&status_update("s1-eth1", "UP")).is_none());

        let event = list.apply(&status_update("s1-eth1", "DOWN")).unwrap();
        assert!(matches!(event, PortEvent::Down(_)));
    }

    #[test]
    fn unknown_port_is_ignored() {
        let list = seeded();
        assert!(list.apply(&status_update("s1-eth9", "UP")).is_none());
    }
}
