//! gNMI client: Capabilities, Get, Set and the Subscribe driver.
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

use std::collections::VecDeque;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use grpcio::{CallOption, Channel, ChannelBuilder, WriteFlags};

use proto::gnmi;
use proto::gnmi_grpc::GNmiClient as GNmiStub;

use crate::errors::{Error, P4Error, Result};
use crate::gnmipath::GnmiPath;
use crate::p4client::grpc_env;
use crate::pbuf;
use crate::tls::TlsCredentials;

const DEFAULT_RPC_TIMEOUT: Duration = Duration::from_secs(10);

/// A single update (or delete) from a notification.
#[derive(Clone, Debug, PartialEq)]
pub struct GnmiUpdate {
    pub timestamp: i64,
    pub path: GnmiPath,
    /// None marks a delete.
    pub value: Option<gnmi::TypedValue>,
}

impl GnmiUpdate {
    /// The update's value as a string, when it carries one.
    pub fn string_value(&self) -> Option<&str> {
        match self.value.as_ref()?.value.as_ref()? {
            gnmi::typed_value::Value::StringVal(s) => Some(s),
            gnmi::typed_value::Value::AsciiVal(s) => Some(s),
            _ => None,
        }
    }

    /// The update's value as an unsigned integer, when it carries one.
    pub fn uint_value(&self) -> Option<u64> {
        match self.value.as_ref()?.value.as_ref()? {
            gnmi::typed_value::Value::UintVal(v) => Some(*v),
            gnmi::typed_value::Value::IntVal(v) if *v >= 0 => Some(*v as u64),
            _ => None,
        }
    }
}

/// Value for a Set operation.
#[derive(Clone, Debug, PartialEq)]
pub enum GnmiValue {
    Bool(bool),
    Int(i64),
    Uint(u64),
    Double(f64),
    Str(String),
    Bytes(Vec<u8>),
    JsonIetf(Vec<u8>),
    Typed(gnmi::TypedValue),
}

impl GnmiValue {
    fn typed(self) -> gnmi::TypedValue {
        use gnmi::typed_value::Value;
        let value = match self {
            GnmiValue::Bool(v) => Value::BoolVal(v),
            GnmiValue::Int(v) => Value::IntVal(v),
            GnmiValue::Uint(v) => Value::UintVal(v),
            GnmiValue::Double(v) => Value::DoubleVal(v),
            GnmiValue::Str(v) => Value::StringVal(v),
            GnmiValue::Bytes(v) => Value::BytesVal(v),
            GnmiValue::JsonIetf(v) => Value::JsonIetfVal(v),
            GnmiValue::Typed(v) => return v,
        };
        gnmi::TypedValue { value: Some(value) }
    }
}

/// One operation in a Set request; applied in update/replace/delete order
/// within a single atomic request.
#[derive(Clone, Debug, PartialEq)]
pub enum GnmiSetOp {
    Update(GnmiPath, GnmiValue),
    Replace(GnmiPath, GnmiValue),
    Delete(GnmiPath),
}

pub struct GnmiClient {
    address: String,
    stub: GNmiStub,
    rpc_timeout: Duration,
}

impl GnmiClient {
    /// Open a dedicated channel toward `address`.
    pub fn connect(address: &str, credentials: Option<&TlsCredentials>) -> Result<GnmiClient> {
        let mut builder = ChannelBuilder::new(grpc_env());
        let channel = if let Some(creds) = credentials {
            if let Some(target) = &creds.target_name_override {
                builder = builder.override_ssl_target(target.clone());
            }
            builder.secure_connect(address, creds.channel_credentials()?)
        } else {
            builder.connect(address)
        };
        Ok(Self::from_channel(address, channel))
    }

    /// Reuse an existing channel (the P4Runtime channel to the same device).
    pub fn from_channel(address: &str, channel: Channel) -> GnmiClient {
        GnmiClient {
            address: address.to_string(),
            stub: GNmiStub::new(channel),
            rpc_timeout: DEFAULT_RPC_TIMEOUT,
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    fn call_opt(&self) -> CallOption {
        CallOption::default().timeout(self.rpc_timeout)
    }

    pub async fn capabilities(
        &self,
    ) -> std::result::Result<gnmi::CapabilityResponse, P4Error> {
        let receiver = self
            .stub
            .capabilities_async_opt(&gnmi::CapabilityRequest {}, self.call_opt())
            .map_err(|err| P4Error::new("gNMI Capabilities", err))?;
        receiver
            .await
            .map_err(|err| P4Error::new("gNMI Capabilities", err))
    }

    /// Get the values at `paths` with PROTO encoding.
    pub async fn get(&self, paths: &[GnmiPath]) -> Result<Vec<GnmiUpdate>> {
        let request = gnmi::GetRequest {
            path: paths.iter().map(|p| p.proto().clone()).collect(),
            encoding: gnmi::Encoding::Proto as i32,
            ..Default::default()
        };
        pbuf::log_msg("GnmiClient", "Get", &request);

        let receiver = self
            .stub
            .get_async_opt(&request, self.call_opt())
            .map_err(|err| Error::Rpc(P4Error::new("gNMI Get", err)))?;
        let reply = receiver
            .await
            .map_err(|err| Error::Rpc(P4Error::new("gNMI Get", err)))?;
        pbuf::log_msg("GnmiClient", "Get reply", &reply);

        let mut result = Vec::new();
        for notification in &reply.notification {
            read_updates(notification, &mut result);
        }
        Ok(result)
    }

    /// Apply the given operations as one SetRequest. The response carries a
    /// per-op result and the device timestamp.
    pub async fn set(&self, ops: Vec<GnmiSetOp>) -> Result<gnmi::SetResponse> {
        let mut request = gnmi::SetRequest::default();
        for op in ops {
            match op {
                GnmiSetOp::Update(path, value) => request.update.push(gnmi::Update {
                    path: Some(path.into_proto()),
                    val: Some(value.typed()),
                    duplicates: 0,
                }),
                GnmiSetOp::Replace(path, value) => request.replace.push(gnmi::Update {
                    path: Some(path.into_proto()),
                    val: Some(value.typed()),
                    duplicates: 0,
                }),
                GnmiSetOp::Delete(path) => request.delete.push(path.into_proto()),
            }
        }
        pbuf::log_msg("GnmiClient", "Set", &request);

        let receiver = self
            .stub
            .set_async_opt(&request, self.call_opt())
            .map_err(|err| Error::Rpc(P4Error::new("gNMI Set", err)))?;
        let reply = receiver
            .await
            .map_err(|err| Error::Rpc(P4Error::new("gNMI Set", err)))?;
        pbuf::log_msg("GnmiClient", "Set reply", &reply);
        Ok(reply)
    }

    /// Start building a subscription.
    pub fn subscribe(&self) -> GnmiSubscription {
        GnmiSubscription {
            stub: self.stub.clone(),
            sublist: gnmi::SubscriptionList {
                mode: gnmi::subscription_list::Mode::Stream as i32,
                ..Default::default()
            },
            stream: None,
            pending: VecDeque::new(),
        }
    }
}

fn read_updates(notification: &gnmi::Notification, out: &mut Vec<GnmiUpdate>) {
    for update in &notification.update {
        out.push(GnmiUpdate {
            timestamp: notification.timestamp,
            path: GnmiPath::from_proto(update.path.clone().unwrap_or_default()),
            value: update.val.clone(),
        });
    }
    for delete in &notification.delete {
        out.push(GnmiUpdate {
            timestamp: notification.timestamp,
            path: GnmiPath::from_proto(delete.clone()),
            value: None,
        });
    }
}

struct SubscribeStream {
    sink: grpcio::ClientDuplexSender<gnmi::SubscribeRequest>,
    receiver: grpcio::ClientDuplexReceiver<gnmi::SubscribeResponse>,
}

/// A configured subscription and its stream state.
///
/// Register paths with [`once`](Self::once), [`on_change`](Self::on_change),
/// [`sample`](Self::sample) or [`target_defined`](Self::target_defined),
/// then call [`synchronize`](Self::synchronize) to collect initial state up
/// to the device's sync_response, and [`next_update`](Self::next_update) for
/// the stream beyond it.
pub struct GnmiSubscription {
    stub: GNmiStub,
    sublist: gnmi::SubscriptionList,
    stream: Option<SubscribeStream>,
    pending: VecDeque<GnmiUpdate>,
}

impl GnmiSubscription {
    /// Subscribe in ONCE mode.
    pub fn once(&mut self, paths: &[GnmiPath]) -> &mut Self {
        self.sublist.mode = gnmi::subscription_list::Mode::Once as i32;
        for path in paths {
            self.push(path, gnmi::SubscriptionMode::TargetDefined, 0, false, 0);
        }
        self
    }

    /// Subscribe to change notifications.
    pub fn on_change(&mut self, paths: &[GnmiPath]) -> &mut Self {
        for path in paths {
            self.push(path, gnmi::SubscriptionMode::OnChange, 0, false, 0);
        }
        self
    }

    /// Subscribe with periodic samples.
    pub fn sample(
        &mut self,
        paths: &[GnmiPath],
        sample_interval: Duration,
        suppress_redundant: bool,
        heartbeat_interval: Duration,
    ) -> &mut Self {
        for path in paths {
            self.push(
                path,
                gnmi::SubscriptionMode::Sample,
                sample_interval.as_nanos() as u64,
                suppress_redundant,
                heartbeat_interval.as_nanos() as u64,
            );
        }
        self
    }

    /// Let the target pick the mode.
    pub fn target_defined(&mut self, paths: &[GnmiPath]) -> &mut Self {
        for path in paths {
            self.push(path, gnmi::SubscriptionMode::TargetDefined, 0, false, 0);
        }
        self
    }

    fn push(
        &mut self,
        path: &GnmiPath,
        mode: gnmi::SubscriptionMode,
        sample_interval: u64,
        suppress_redundant: bool,
        heartbeat_interval: u64,
    ) {
        self.sublist.subscription.push(gnmi::Subscription {
            path: Some(path.proto().clone()),
            mode: mode as i32,
            sample_interval,
            suppress_redundant,
            heartbeat_interval,
        });
    }

    fn is_once(&self) -> bool {
        self.sublist.mode == gnmi::subscription_list::Mode::Once as i32
    }

    async fn open(&mut self) -> Result<()> {
        if self.stream.is_some() {
            return Ok(());
        }
        let (mut sink, receiver) = self
            .stub
            .subscribe()
            .map_err(|err| Error::Rpc(P4Error::new("gNMI Subscribe", err)))?;

        let request = gnmi::SubscribeRequest {
            request: Some(gnmi::subscribe_request::Request::Subscribe(
                self.sublist.clone(),
            )),
        };
        pbuf::log_msg("GnmiClient", "Subscribe", &request);
        sink.send((request, WriteFlags::default()))
            .await
            .map_err(|err| Error::Rpc(P4Error::new("gNMI Subscribe", err)))?;

        self.stream = Some(SubscribeStream { sink, receiver });
        Ok(())
    }

    /// Send the subscription (if not yet sent) and collect every update up
    /// to the next sync_response. May be called again after a re-subscribe.
    pub async fn synchronize(&mut self) -> Result<Vec<GnmiUpdate>> {
        self.open().await?;
        let mut result = Vec::new();
        // Buffered updates (received before this call) come first.
        result.extend(self.pending.drain(..));

        loop {
            let stream = self.stream.as_mut().expect("stream is open");
            let msg = match stream.receiver.next().await {
                None => {
                    log::warn!("gNMI subscribe: unexpected EOF");
                    self.cancel();
                    return Ok(result);
                }
                Some(Err(err)) => return Err(Error::Rpc(P4Error::new("gNMI Subscribe", err))),
                Some(Ok(msg)) => msg,
            };
            match msg.response {
                Some(gnmi::subscribe_response::Response::Update(notification)) => {
                    read_updates(&notification, &mut result);
                }
                Some(gnmi::subscribe_response::Response::SyncResponse(_)) => {
                    if self.is_once() {
                        // ONCE subscriptions end at the sync marker.
                        self.cancel();
                    }
                    return Ok(result);
                }
                None => log::warn!("gNMI subscribe: empty response"),
            }
        }
    }

    /// The next update past the sync point. Returns None at end of stream.
    pub async fn next_update(&mut self) -> Result<Option<GnmiUpdate>> {
        self.open().await?;
        loop {
            if let Some(update) = self.pending.pop_front() {
                return Ok(Some(update));
            }
            let stream = self.stream.as_mut().expect("stream is open");
            let msg = match stream.receiver.next().await {
                None => return Ok(None),
                Some(Err(err)) => return Err(Error::Rpc(P4Error::new("gNMI Subscribe", err))),
                Some(Ok(msg)) => msg,
            };
            match msg.response {
                Some(gnmi::subscribe_response::Response::Update(notification)) => {
                    let mut batch = Vec::new();
                    read_updates(&notification, &mut batch);
                    self.pending.extend(batch);
                }
                Some(gnmi::subscribe_response::Response::SyncResponse(_)) => {
                    log::debug!("gNMI subscribe: ignored sync_response");
                }
                None => log::warn!("gNMI subscribe: empty response"),
            }
        }
    }

    /// Drop the stream. A fresh SubscribeRequest is sent on the next
    /// synchronize/next_update call.
    pub fn cancel(&mut self) {
        self.stream = None;
        self.pending.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path(s: &str) -> GnmiPath {
        GnmiPath::new(s).unwrap()
    }

    fn string_update(path: &GnmiPath, value: &str) -> gnmi::Update {
        gnmi::Update {
            path: Some(path.proto().clone()),
            val: Some(gnmi::TypedValue {
                value: Some(gnmi::typed_value::Value::StringVal(value.to_string())),
            }),
            duplicates: 0,
        }
    }

    // A client whose channel never connects; enough to build subscriptions.
    fn lazy_client() -> GnmiClient {
        GnmiClient::connect("127.0.0.1:0", None).unwrap()
    }

    #[test]
    fn read_updates_flattens_updates_and_deletes() {
        let oper_status = path("interfaces/interface[name=s1-eth1]/state/oper-status");
        let mtu = path("interfaces/interface[name=s1-eth1]/state/mtu");
        let gone = path("interfaces/interface[name=s1-eth2]");

        let notification = gnmi::Notification {
            timestamp: 42,
            update: vec![
                string_update(&oper_status, "UP"),
                gnmi::Update {
                    path: Some(mtu.proto().clone()),
                    val: Some(gnmi::TypedValue {
                        value: Some(gnmi::typed_value::Value::UintVal(1500)),
                    }),
                    duplicates: 0,
                },
            ],
            delete: vec![gone.proto().clone()],
            ..Default::default()
        };

        let mut out = Vec::new();
        read_updates(&notification, &mut out);

        assert_eq!(out.len(), 3);
        assert_eq!(out[0].timestamp, 42);
        assert_eq!(out[0].path, oper_status);
        assert_eq!(out[0].string_value(), Some("UP"));
        assert_eq!(out[1].uint_value(), Some(1500));
        // A delete carries no value.
        assert_eq!(out[2].path, gone);
        assert!(out[2].value.is_none());
        assert_eq!(out[2].string_value(), None);
    }

    #[test]
    fn on_change_registers_stream_subscriptions() {
        let mut sub = lazy_client().subscribe();
        sub.on_change(&[path("interfaces/interface[name=s1-eth1]/state/oper-status")]);

        assert_eq!(
            sub.sublist.mode,
            gnmi::subscription_list::Mode::Stream as i32
        );
        assert_eq!(sub.sublist.subscription.len(), 1);
        let entry = &sub.sublist.subscription[0];
        assert_eq!(entry.mode, gnmi::SubscriptionMode::OnChange as i32);
        assert_eq!(entry.sample_interval, 0);
        assert!(!sub.is_once());
    }

    #[test]
    fn sample_carries_intervals() {
        let mut sub = lazy_client().subscribe();
        sub.sample(
            &[path("interfaces/interface/state/counters")],
            Duration::from_secs(1),
            true,
            Duration::from_secs(30),
        );

        let entry = &sub.sublist.subscription[0];
        assert_eq!(entry.mode, gnmi::SubscriptionMode::Sample as i32);
        assert_eq!(entry.sample_interval, 1_000_000_000);
        assert!(entry.suppress_redundant);
        assert_eq!(entry.heartbeat_interval, 30_000_000_000);
    }

    #[test]
    fn target_defined_lets_the_device_choose() {
        let mut sub = lazy_client().subscribe();
        sub.target_defined(&[path("components/component")]);

        let entry = &sub.sublist.subscription[0];
        assert_eq!(entry.mode, gnmi::SubscriptionMode::TargetDefined as i32);
        assert_eq!(
            sub.sublist.mode,
            gnmi::subscription_list::Mode::Stream as i32
        );
    }

    #[test]
    fn once_switches_the_list_mode() {
        let mut sub = lazy_client().subscribe();
        sub.once(&[path("interfaces/interface"), path("components/component")]);

        assert!(sub.is_once());
        assert_eq!(sub.sublist.mode, gnmi::subscription_list::Mode::Once as i32);
        assert_eq!(sub.sublist.subscription.len(), 2);
    }

    #[test]
    fn cancel_discards_stream_state() {
        let mut sub = lazy_client().subscribe();
        sub.on_change(&[path("interfaces/interface/state/oper-status")]);
        sub.pending.push_back(GnmiUpdate {
            timestamp: 1,
            path: path("interfaces/interface[name=s1-eth1]/state/oper-status"),
            value: None,
        });

        sub.cancel();
        assert!(sub.stream.is_none());
        assert!(sub.pending.is_empty());
        // The registered paths survive; a later call re-subscribes.
        assert_eq!(sub.sublist.subscription.len(), 1);
    }
}
