//! Low-level P4Runtime client: one gRPC channel, one StreamChannel.
//!
//! The duplex stream is split into two actors. A single writer task owns the
//! sink and drains a bounded queue, so every caller enqueues instead of
//! touching the stream; a single reader task forwards responses (or the
//! terminal error) to the owner. Unary RPCs are plain async wrappers over
//! the generated stubs.
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

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use grpcio::{
    CallOption, Channel, ChannelBuilder, ClientSStreamReceiver, Environment, WriteFlags,
};
use tokio::sync::mpsc;

use proto::p4runtime as p4r;
use proto::p4runtime_grpc::P4RuntimeClient;

use crate::errors::{Error, P4Error, Result};
use crate::pbuf;
use crate::tls::TlsCredentials;

const DEFAULT_RPC_TIMEOUT: Duration = Duration::from_secs(10);

/// Outbound stream queue depth. Senders block (cooperatively) when the
/// device stops draining packet-outs.
const SEND_QUEUE_SIZE: usize = 64;

/// Shared grpcio environment; one completion-queue pool per process.
pub fn grpc_env() -> Arc<Environment> {
    static ENV: OnceLock<Arc<Environment>> = OnceLock::new();
    ENV.get_or_init(|| Arc::new(Environment::new(2))).clone()
}

pub struct P4Client {
    address: String,
    channel: Channel,
    stub: P4RuntimeClient,
    rpc_timeout: Duration,
}

impl P4Client {
    /// Open a channel toward `address`. The channel connects lazily; use
    /// [`P4Client::wait_for_ready`] to block until it is usable.
    pub fn connect(address: &str, credentials: Option<&TlsCredentials>) -> Result<P4Client> {
        let mut builder = ChannelBuilder::new(grpc_env());
        if let Some(creds) = credentials {
            if let Some(target) = &creds.target_name_override {
                builder = builder.override_ssl_target(target.clone());
            }
            log::debug!("P4Client: create secure channel {:?}", address);
            let channel = builder.secure_connect(address, creds.channel_credentials()?);
            Ok(Self::from_channel(address, channel))
        } else {
            log::debug!("P4Client: create insecure channel {:?}", address);
            let channel = builder.connect(address);
            Ok(Self::from_channel(address, channel))
        }
    }

    fn from_channel(address: &str, channel: Channel) -> P4Client {
        let stub = P4RuntimeClient::new(channel.clone());
        P4Client {
            address: address.to_string(),
            channel,
            stub,
            rpc_timeout: DEFAULT_RPC_TIMEOUT,
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn channel(&self) -> &Channel {
        &self.channel
    }

    pub fn set_rpc_timeout(&mut self, timeout: Duration) {
        self.rpc_timeout = timeout;
    }

    /// Wait until the channel reaches READY, or `timeout` elapses.
    pub async fn wait_for_ready(&self, timeout: Duration) -> bool {
        self.channel.wait_for_connected(timeout).await
    }

    fn call_opt(&self) -> CallOption {
        CallOption::default().timeout(self.rpc_timeout)
    }

    pub async fn write(
        &self,
        request: &p4r::WriteRequest,
    ) -> std::result::Result<p4r::WriteResponse, P4Error> {
        pbuf::log_msg("P4Client", "Write", request);
        let receiver = self
            .stub
            .write_async_opt(request, self.call_opt())
            .map_err(|err| P4Error::new("Write", err))?;
        let reply = receiver.await.map_err(|err| P4Error::new("Write", err))?;
        pbuf::log_msg("P4Client", "Write reply", &reply);
        Ok(reply)
    }

    /// Server-streaming read; the caller drains the receiver lazily.
    pub fn read(
        &self,
        request: &p4r::ReadRequest,
    ) -> std::result::Result<ClientSStreamReceiver<p4r::ReadResponse>, P4Error> {
        pbuf::log_msg("P4Client", "Read", request);
        self.stub
            .read_opt(request, self.call_opt())
            .map_err(|err| P4Error::new("Read", err))
    }

    pub async fn set_forwarding_pipeline_config(
        &self,
        request: &p4r::SetForwardingPipelineConfigRequest,
    ) -> std::result::Result<p4r::SetForwardingPipelineConfigResponse, P4Error> {
        if pbuf::message_log_enabled() {
            let cookie = request
                .config
                .as_ref()
                .map(pbuf::format_pipeline_config)
                .unwrap_or_default();
            log::debug!("P4Client: SetForwardingPipelineConfig {}", cookie);
        }
        let receiver = self
            .stub
            .set_forwarding_pipeline_config_async_opt(request, self.call_opt())
            .map_err(|err| P4Error::new("SetForwardingPipelineConfig", err))?;
        receiver
            .await
            .map_err(|err| P4Error::new("SetForwardingPipelineConfig", err))
    }

    pub async fn get_forwarding_pipeline_config(
        &self,
        request: &p4r::GetForwardingPipelineConfigRequest,
    ) -> std::result::Result<p4r::GetForwardingPipelineConfigResponse, P4Error> {
        pbuf::log_msg("P4Client", "GetForwardingPipelineConfig", request);
        let receiver = self
            .stub
            .get_forwarding_pipeline_config_async_opt(request, self.call_opt())
            .map_err(|err| P4Error::new("GetForwardingPipelineConfig", err))?;
        receiver
            .await
            .map_err(|err| P4Error::new("GetForwardingPipelineConfig", err))
    }

    pub async fn capabilities(
        &self,
    ) -> std::result::Result<p4r::CapabilitiesResponse, P4Error> {
        let receiver = self
            .stub
            .capabilities_async_opt(&p4r::CapabilitiesRequest {}, self.call_opt())
            .map_err(|err| P4Error::new("Capabilities", err))?;
        receiver
            .await
            .map_err(|err| P4Error::new("Capabilities", err))
    }

    /// Open the bidirectional StreamChannel and start its writer/reader
    /// actors. Dropping the returned stream tears both down.
    pub fn open_stream(&self) -> Result<P4Stream> {
        let (sink, receiver) = self
            .stub
            .stream_channel()
            .map_err(|err| Error::Rpc(P4Error::new("StreamChannel", err)))?;

        let (out_tx, out_rx) = mpsc::channel::<p4r::StreamMessageRequest>(SEND_QUEUE_SIZE);
        let (in_tx, in_rx) =
            mpsc::channel::<std::result::Result<p4r::StreamMessageResponse, P4Error>>(
                SEND_QUEUE_SIZE,
            );

        tokio::spawn(stream_writer(sink, out_rx));
        tokio::spawn(stream_reader(receiver, in_tx));

        Ok(P4Stream {
            sender: P4StreamSender { tx: out_tx },
            rx: in_rx,
        })
    }
}

/// The writer actor: the only task allowed to touch the sink.
async fn stream_writer(
    mut sink: grpcio::ClientDuplexSender<p4r::StreamMessageRequest>,
    mut out_rx: mpsc::Receiver<p4r::StreamMessageRequest>,
) {
    while let Some(msg) = out_rx.recv().await {
        pbuf::log_msg("P4Client", "send", &msg);
        if let Err(err) = sink.send((msg, WriteFlags::default())).await {
            log::debug!("stream writer finished: {}", err);
            return;
        }
    }
    // Sender handles dropped: half-close so the server sees a clean EOF.
    let _ = sink.close().await;
}

/// The reader actor: forwards responses in arrival order, then the terminal
/// error (if any), then hangs up.
async fn stream_reader(
    mut receiver: grpcio::ClientDuplexReceiver<p4r::StreamMessageResponse>,
    in_tx: mpsc::Sender<std::result::Result<p4r::StreamMessageResponse, P4Error>>,
) {
    while let Some(result) = receiver.next().await {
        match result {
            Ok(msg) => {
                pbuf::log_msg("P4Client", "recv", &msg);
                if in_tx.send(Ok(msg)).await.is_err() {
                    return; // owner went away
                }
            }
            Err(err) => {
                let _ = in_tx.send(Err(P4Error::new("StreamChannel", err))).await;
                return;
            }
        }
    }
}

/// Cloneable handle for enqueueing outbound stream messages.
#[derive(Clone)]
pub struct P4StreamSender {
    tx: mpsc::Sender<p4r::StreamMessageRequest>,
}

impl P4StreamSender {
    pub async fn send(&self, msg: p4r::StreamMessageRequest) -> Result<()> {
        self.tx
            .send(msg)
            .await
            .map_err(|_| Error::Stream("stream closed".to_string()))
    }
}

/// An open StreamChannel. `recv` is owned by one task (the switch's run
/// loop); senders clone [`P4StreamSender`].
pub struct P4Stream {
    sender: P4StreamSender,
    rx: mpsc::Receiver<std::result::Result<p4r::StreamMessageResponse, P4Error>>,
}

/// Build a stream backed by plain channels instead of a live call, so state
/// machines layered on [`P4Stream`] can be driven with canned responses.
/// Returns (stream, response injector, request drain).
#[cfg(test)]
pub(crate) fn stream_for_tests() -> (
    P4Stream,
    mpsc::Sender<std::result::Result<p4r::StreamMessageResponse, P4Error>>,
    mpsc::Receiver<p4r::StreamMessageRequest>,
) {
    let (out_tx, out_rx) = mpsc::channel(SEND_QUEUE_SIZE);
    let (in_tx, in_rx) = mpsc::channel(SEND_QUEUE_SIZE);
    (
        P4Stream {
            sender: P4StreamSender { tx: out_tx },
            rx: in_rx,
        },
        in_tx,
        out_rx,
    )
}

impl P4Stream {
    pub fn sender(&self) -> P4StreamSender {
        self.sender.clone()
    }

    pub async fn send(&self, msg: p4r::StreamMessageRequest) -> Result<()> {
        self.sender.send(msg).await
    }

    /// Receive the next message; a transport loss surfaces as `Error::Rpc`
    /// and EOF as `Error::Stream`.
    pub async fn recv(&mut self) -> Result<p4r::StreamMessageResponse> {
        match self.rx.recv().await {
            Some(Ok(msg)) => Ok(msg),
            Some(Err(err)) => Err(Error::Rpc(err)),
            None => Err(Error::Stream("stream reached EOF".to_string())),
        }
    }
}
