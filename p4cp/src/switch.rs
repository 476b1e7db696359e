//! The per-device control machine.
//!
//! A [`Switch`] drives one device through connect, arbitration handshake,
//! pipeline check and READY, keeps it there, and recovers from failures with
//! capped exponential backoff. User code runs in the ready handler, whose
//! tasks are scoped to the current READY epoch: leaving READY (stream loss,
//! role change, shutdown) cancels them.
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

use std::any::Any;
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::future::Future;
use std::str::FromStr;
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant};

use futures::future::BoxFuture;
use futures::StreamExt;
use tokio::sync::watch;

use proto::p4runtime as p4r;
use proto::u128 as u128util;

use crate::arbitrator::{Arbitrator, RoleChange};
use crate::controller;
use crate::errors::{Error, P4Error, P4Status, Result};
use crate::gnmiclient::GnmiClient;
use crate::p4client::{P4Client, P4Stream, P4StreamSender};
use crate::p4entity::{
    decode_entity, P4ActionProfileGroup, P4ActionProfileMember, P4CloneSessionEntry,
    P4DigestEntry, P4DigestList, P4DigestListAck, P4Entity, P4IdleTimeoutNotification,
    P4MulticastGroupEntry, P4PacketIn, P4PacketOut, P4TableEntry, P4Update, P4UpdateType,
    P4ValueSetEntry, P4WriteOp,
};
use crate::p4schema::{
    P4Atomicity, P4Blob, P4ConfigAction, P4ConfigResponseType, P4InfoSource, P4Schema,
};
use crate::ports::{Port, PortEvent, PortList};
use crate::tls::TlsCredentials;
use crate::util::backoff::Backoff;
use crate::util::events::Emitter;
use crate::util::queue::{self, QueueReceiver, QueueSender};
use crate::util::tasks::TaskGroup;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const RECONNECT_BASE: Duration = Duration::from_millis(500);
const RECONNECT_CAP: Duration = Duration::from_secs(15);

/// A run shorter than this counts as an immediate failure and keeps the
/// backoff growing; longer runs reset it.
const MIN_HEALTHY_RUN: Duration = Duration::from_secs(2);

const DEFAULT_QUEUE_SIZE: usize = 50;

/// Connection state of a switch.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    Down,
    Connecting,
    Connected,
    Ready,
    Failed,
    Closed,
}

/// Lifecycle events observable via [`Switch::on_event`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SwitchEvent {
    ControllerEnter,
    ControllerLeave,
    SwitchStart,
    SwitchStop,
    ChannelUp,
    ChannelDown,
    ChannelReady,
    PipelineReady,
    BecomePrimary,
    BecomeBackup,
    PortUp,
    PortDown,
    StreamError,
}

/// Payload delivered with an event.
#[derive(Clone, Debug)]
pub enum EventData {
    None,
    Port(Port),
    StreamError {
        canonical_code: i32,
        message: String,
    },
    /// A slow consumer lost messages; total drops so far.
    QueueOverflow {
        queue: &'static str,
        dropped: u64,
    },
}

pub type EventPayload = (Switch, EventData);

/// Async callback invoked each time the switch reaches READY.
pub type ReadyHandler = Arc<dyn Fn(Switch) -> BoxFuture<'static, Result<()>> + Send + Sync>;

/// Reconnect behavior for [`Switch::run`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum RetryPolicy {
    /// Keep reconnecting with backoff (supervised mode).
    #[default]
    Reconnect,
    /// One connection attempt; every error surfaces (single-shot mode).
    FailFast,
}

/// Immutable switch configuration. Builder methods consume and return the
/// options, so a shared base can be specialized per switch.
#[derive(Clone, Default)]
pub struct SwitchOptions {
    pub p4info: Option<P4InfoSource>,
    pub p4blob: Option<P4Blob>,
    /// Reinstall the pipeline even when the device cookie matches.
    pub p4force: bool,
    pub device_id: u64,
    pub initial_election_id: u128,
    pub credentials: Option<TlsCredentials>,
    /// "" is the default full-pipeline role.
    pub role_name: String,
    pub role_config: Option<prost_types::Any>,
    pub ready_handler: Option<ReadyHandler>,
    /// Propagate non-transient errors out of the supervisor.
    pub fail_fast: bool,
    pub retry: RetryPolicy,
    /// Application configuration handed through to the ready handler.
    pub config: Option<Arc<dyn Any + Send + Sync>>,
}

impl SwitchOptions {
    pub fn new() -> Self {
        SwitchOptions {
            device_id: 1,
            initial_election_id: 10,
            ..Default::default()
        }
    }

    pub fn with_p4info(mut self, p4info: impl Into<P4InfoSource>) -> Self {
        self.p4info = Some(p4info.into());
        self
    }

    pub fn with_p4blob(mut self, p4blob: P4Blob) -> Self {
        self.p4blob = Some(p4blob);
        self
    }

    pub fn with_p4force(mut self, p4force: bool) -> Self {
        self.p4force = p4force;
        self
    }

    pub fn with_device_id(mut self, device_id: u64) -> Self {
        self.device_id = device_id;
        self
    }

    pub fn with_initial_election_id(mut self, election_id: u128) -> Self {
        self.initial_election_id = election_id;
        self
    }

    pub fn with_credentials(mut self, credentials: TlsCredentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    pub fn with_role(mut self, name: impl Into<String>, config: Option<prost_types::Any>) -> Self {
        self.role_name = name.into();
        self.role_config = config;
        self
    }

    pub fn with_fail_fast(mut self, fail_fast: bool) -> Self {
        self.fail_fast = fail_fast;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_ready_handler<F, Fut>(mut self, handler: F) -> Self
    where
        F: Fn(Switch) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        self.ready_handler = Some(Arc::new(move |switch| Box::pin(handler(switch))));
        self
    }

    pub fn with_config<T: Any + Send + Sync>(mut self, config: T) -> Self {
        self.config = Some(Arc::new(config));
        self
    }
}

/// P4Runtime API version reported by the device.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ApiVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
    pub extra: String,
}

impl Default for ApiVersion {
    fn default() -> Self {
        ApiVersion {
            major: 1,
            minor: 0,
            patch: 0,
            extra: String::new(),
        }
    }
}

impl FromStr for ApiVersion {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let mut parts = s.splitn(3, '.');
        let major = parts.next().unwrap_or_default();
        let minor = parts.next().unwrap_or_default();
        let rest = parts.next().unwrap_or_default();
        let digits = rest.len() - rest.trim_start_matches(|c: char| c.is_ascii_digit()).len();
        let (patch, extra) = rest.split_at(digits);

        let parse = |v: &str| {
            v.parse::<u32>()
                .map_err(|_| Error::encoding(format!("unexpected version string: {:?}", s)))
        };
        Ok(ApiVersion {
            major: parse(major)?,
            minor: parse(minor)?,
            patch: parse(patch)?,
            extra: extra.to_string(),
        })
    }
}

impl fmt::Display for ApiVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}{}", self.major, self.minor, self.patch, self.extra)
    }
}

/// Per-consumer eth_type filter for packet readers.
type PacketFilter = Option<Vec<[u8; 2]>>;

#[derive(Default)]
struct Demux {
    next_id: u64,
    packets: Vec<(u64, PacketFilter, QueueSender<P4PacketIn>)>,
    digests: HashMap<String, QueueSender<P4DigestList>>,
    idle_timeouts: Option<QueueSender<P4IdleTimeoutNotification>>,
}

struct RunState {
    connection: ConnectionState,
    is_primary: bool,
    election_id: u128,
    primary_id: u128,
    api_version: ApiVersion,
    client: Option<Arc<P4Client>>,
    stream_sender: Option<P4StreamSender>,
    tasks: Option<Arc<TaskGroup>>,
    gnmi: Option<Arc<GnmiClient>>,
}

struct SwitchInner {
    name: String,
    address: String,
    options: SwitchOptions,
    schema: RwLock<Arc<P4Schema>>,
    state: Mutex<RunState>,
    demux: Mutex<Demux>,
    emitter: Emitter<SwitchEvent, EventPayload>,
    ports: PortList,
    stash: Mutex<HashMap<String, Arc<dyn Any + Send + Sync>>>,
    stop: watch::Sender<bool>,
}

/// Handle to one managed device. Cheap to clone; all clones share state.
#[derive(Clone)]
pub struct Switch {
    inner: Arc<SwitchInner>,
}

impl Switch {
    /// Create a switch. The P4Info (if configured) loads eagerly so bad
    /// options fail here, not mid-connection.
    pub fn new(name: &str, address: &str, options: SwitchOptions) -> Result<Switch> {
        let schema = P4Schema::load(options.p4info.as_ref(), options.p4blob.as_ref())?;
        let (stop, _) = watch::channel(false);
        Ok(Switch {
            inner: Arc::new(SwitchInner {
                name: name.to_string(),
                address: address.to_string(),
                options,
                schema: RwLock::new(Arc::new(schema)),
                state: Mutex::new(RunState {
                    connection: ConnectionState::Down,
                    is_primary: false,
                    election_id: 0,
                    primary_id: 0,
                    api_version: ApiVersion::default(),
                    client: None,
                    stream_sender: None,
                    tasks: None,
                    gnmi: None,
                }),
                demux: Mutex::new(Demux::default()),
                emitter: Emitter::new(),
                ports: PortList::new(),
                stash: Mutex::new(HashMap::new()),
                stop,
            }),
        })
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn address(&self) -> &str {
        &self.inner.address
    }

    pub fn options(&self) -> &SwitchOptions {
        &self.inner.options
    }

    /// The typed application configuration from the options, if any.
    pub fn config<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        self.inner.options.config.clone()?.downcast().ok()
    }

    pub fn device_id(&self) -> u64 {
        self.inner.options.device_id
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.inner.state.lock().unwrap().connection
    }

    pub fn is_primary(&self) -> bool {
        self.inner.state.lock().unwrap().is_primary
    }

    pub fn election_id(&self) -> u128 {
        self.inner.state.lock().unwrap().election_id
    }

    pub fn primary_id(&self) -> u128 {
        self.inner.state.lock().unwrap().primary_id
    }

    pub fn api_version(&self) -> ApiVersion {
        self.inner.state.lock().unwrap().api_version.clone()
    }

    /// The active pipeline schema.
    pub fn schema(&self) -> Arc<P4Schema> {
        self.inner.schema.read().unwrap().clone()
    }

    pub fn ports(&self) -> &PortList {
        &self.inner.ports
    }

    pub fn gnmi_client(&self) -> Option<Arc<GnmiClient>> {
        self.inner.state.lock().unwrap().gnmi.clone()
    }

    /// Register an event listener.
    pub fn on_event(
        &self,
        event: SwitchEvent,
        listener: impl Fn(&EventPayload) + Send + Sync + 'static,
    ) {
        self.inner.emitter.on(event, listener);
    }

    /// Store an arbitrary value in the per-switch stash.
    pub fn stash_insert<T: Any + Send + Sync>(&self, key: impl Into<String>, value: T) {
        self.inner
            .stash
            .lock()
            .unwrap()
            .insert(key.into(), Arc::new(value));
    }

    /// Retrieve a typed value from the stash.
    pub fn stash_get<T: Any + Send + Sync>(&self, key: &str) -> Option<Arc<T>> {
        let value = self.inner.stash.lock().unwrap().get(key)?.clone();
        value.downcast().ok()
    }

    /// Ask the switch to close; `run` returns once teardown finishes.
    pub fn stop(&self) {
        let _ = self.inner.stop.send(true);
    }

    pub(crate) fn emit(&self, event: SwitchEvent, data: EventData) {
        self.inner.emitter.emit(&event, &(self.clone(), data));
    }

    fn set_connection_state(&self, connection: ConnectionState) {
        self.inner.state.lock().unwrap().connection = connection;
    }

    fn client(&self) -> Result<Arc<P4Client>> {
        self.inner
            .state
            .lock()
            .unwrap()
            .client
            .clone()
            .ok_or_else(|| Error::config("switch is not connected"))
    }

    fn stream_sender(&self) -> Result<P4StreamSender> {
        self.inner
            .state
            .lock()
            .unwrap()
            .stream_sender
            .clone()
            .ok_or_else(|| Error::config("switch is not connected"))
    }

    fn tasks(&self) -> Result<Arc<TaskGroup>> {
        self.inner
            .state
            .lock()
            .unwrap()
            .tasks
            .clone()
            .ok_or_else(|| Error::config("switch is not ready"))
    }

    // ~~~~~~~~~~~~~~~~~
    // L i f e c y c l e
    // ~~~~~~~~~~~~~~~~~

    /// Run the switch under its retry policy until stopped.
    pub async fn run(&self) -> Result<()> {
        match self.inner.options.retry {
            RetryPolicy::FailFast => self.run_single_shot().await,
            RetryPolicy::Reconnect => self.run_supervised().await,
        }
    }

    async fn run_single_shot(&self) -> Result<()> {
        log::info!(
            "Switch start (name={:?}, address={:?}, device_id={})",
            self.name(),
            self.address(),
            self.device_id()
        );
        self.emit(SwitchEvent::SwitchStart, EventData::None);
        let result = self.run_cycle(false).await;
        self.set_connection_state(ConnectionState::Closed);
        log::info!("Switch stop (name={:?})", self.name());
        self.emit(SwitchEvent::SwitchStop, EventData::None);
        match result {
            Err(Error::Cancelled) => Ok(()),
            other => other,
        }
    }

    async fn run_supervised(&self) -> Result<()> {
        log::info!(
            "Switch start (name={:?}, address={:?}, device_id={}, initial_election_id={})",
            self.name(),
            self.address(),
            self.device_id(),
            self.inner.options.initial_election_id
        );
        self.emit(SwitchEvent::SwitchStart, EventData::None);

        let mut backoff = Backoff::new(RECONNECT_BASE, RECONNECT_CAP);
        let mut stop_rx = self.inner.stop.subscribe();
        let result = loop {
            if *stop_rx.borrow() {
                break Ok(());
            }

            let started = Instant::now();
            match self.run_cycle(true).await {
                Ok(()) => {}
                Err(Error::Cancelled) => break Ok(()),
                Err(err) if err.is_transient() => {
                    log::debug!("switch {:?}: transient failure: {}", self.name(), err);
                }
                Err(err) => {
                    log::error!("switch {:?}: {}", self.name(), err);
                    if self.inner.options.fail_fast {
                        self.set_connection_state(ConnectionState::Failed);
                        break Err(err);
                    }
                }
            }

            if started.elapsed() >= MIN_HEALTHY_RUN {
                backoff.reset();
            }
            let delay = backoff.next_delay();
            log::debug!("switch {:?}: reconnecting in {:?}", self.name(), delay);
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = stop_rx.changed() => break Ok(()),
            }
        };

        if self.connection_state() != ConnectionState::Failed {
            self.set_connection_state(ConnectionState::Closed);
        }
        log::info!("Switch stop (name={:?})", self.name());
        self.emit(SwitchEvent::SwitchStop, EventData::None);
        result
    }

    /// One connection lifecycle: connect, handshake, run until the stream
    /// (or the switch) terminates, tear down.
    async fn run_cycle(&self, wait_for_ready: bool) -> Result<()> {
        self.set_connection_state(ConnectionState::Connecting);

        let client = Arc::new(P4Client::connect(
            &self.inner.address,
            self.inner.options.credentials.as_ref(),
        )?);

        let mut stop_rx = self.inner.stop.subscribe();
        loop {
            let connected = tokio::select! {
                connected = client.wait_for_ready(CONNECT_TIMEOUT) => connected,
                _ = stop_rx.changed() => return Err(Error::Cancelled),
            };
            if connected {
                break;
            }
            if !wait_for_ready {
                return Err(Error::Rpc(P4Error {
                    operation: "connect",
                    status: P4Status::new(
                        proto::rpc::Code::Unavailable,
                        format!("cannot connect to {}", self.inner.address),
                    ),
                }));
            }
            log::debug!("switch {:?}: waiting for channel", self.name());
        }

        let mut stream = client.open_stream()?;
        let mut arbitrator = Arbitrator::new(
            self.inner.options.initial_election_id,
            self.inner.options.role_name.clone(),
            self.inner.options.role_config.clone(),
        );
        self.set_connection_state(ConnectionState::Connected);

        let result = self.start_session(&client, &mut stream, &mut arbitrator).await;
        let tasks = self.inner.state.lock().unwrap().tasks.clone();

        if result.is_ok() {
            if let Some(tasks) = &tasks {
                // The stream (and its receive loop) now lives inside the task
                // group; everything runs until the group drains, the stream
                // dies, or the switch is stopped.
                let group = tasks.clone();
                let switch = self.clone();
                tasks.spawn("stream", true, async move {
                    switch.receive_loop(&mut stream, &mut arbitrator, &group).await
                });

                // stop_rx dates from before the handshake, so a stop that
                // raced the bring-up still lands here.
                if *stop_rx.borrow() {
                    tasks.cancel_all();
                }
                tokio::select! {
                    _ = tasks.wait() => {}
                    _ = stop_rx.changed() => {
                        tasks.cancel_all();
                        tasks.wait().await;
                    }
                }
            }
        }

        // Orderly teardown: cancel the READY-epoch tasks, release the stream
        // sender and the client.
        {
            let mut state = self.inner.state.lock().unwrap();
            state.client = None;
            state.stream_sender = None;
            state.gnmi = None;
            state.is_primary = false;
            state.tasks = None;
        }
        if let Some(tasks) = &tasks {
            tasks.cancel_all();
            tasks.wait().await;
        }
        self.inner.ports.clear();
        self.set_connection_state(ConnectionState::Down);
        log::info!("Channel down (name={:?})", self.name());
        self.emit(SwitchEvent::ChannelDown, EventData::None);

        result?;
        // A task failure (stream loss, ready handler error) surfaces here.
        if let Some(err) = tasks.and_then(|tasks| tasks.take_error()) {
            return Err(err);
        }
        Ok(())
    }

    /// Handshake and bring-up, through CHANNEL_UP and the first ready task.
    async fn start_session(
        &self,
        client: &Arc<P4Client>,
        stream: &mut P4Stream,
        arbitrator: &mut Arbitrator,
    ) -> Result<()> {
        arbitrator
            .handshake(stream, self.device_id(), false)
            .await?;

        let tasks = TaskGroup::new();
        {
            let mut state = self.inner.state.lock().unwrap();
            state.client = Some(client.clone());
            state.stream_sender = Some(stream.sender());
            state.is_primary = arbitrator.is_primary;
            state.election_id = arbitrator.election_id;
            state.primary_id = arbitrator.primary_id;
            state.tasks = Some(tasks.clone());
        }

        self.fetch_capabilities(client).await?;
        self.start_gnmi(client, &tasks).await?;

        log::info!(
            "Channel up (name={:?}, is_primary={}, election_id={}, primary_id={}, p4r={})",
            self.name(),
            arbitrator.is_primary,
            arbitrator.election_id,
            arbitrator.primary_id,
            self.api_version()
        );
        self.emit(SwitchEvent::ChannelUp, EventData::None);

        self.spawn_ready_task(&tasks);
        Ok(())
    }

    async fn receive_loop(
        &self,
        stream: &mut P4Stream,
        arbitrator: &mut Arbitrator,
        tasks: &Arc<TaskGroup>,
    ) -> Result<()> {
        let mut stop_rx = self.inner.stop.subscribe();
        loop {
            let msg = tokio::select! {
                msg = stream.recv() => msg,
                _ = stop_rx.changed() => return Err(Error::Cancelled),
            };

            let msg = match msg {
                Ok(msg) => msg,
                Err(Error::Rpc(err)) if err.status.is_election_id_used() => {
                    // Another client holds our id; renegotiate one lower.
                    arbitrator
                        .handshake(stream, self.device_id(), true)
                        .await?;
                    self.sync_arbitration_state(arbitrator);
                    continue;
                }
                Err(err) => return Err(err),
            };

            use p4r::stream_message_response::Update;
            match msg.update {
                Some(Update::Arbitration(arbitration)) => {
                    let change = arbitrator
                        .update(stream, self.device_id(), &arbitration)
                        .await?;
                    self.sync_arbitration_state(arbitrator);
                    match change {
                        Some(RoleChange::BecamePrimary) => {
                            log::info!("switch {:?}: became primary", self.name());
                            tasks.cancel_foreground();
                            self.spawn_ready_task(tasks);
                            self.emit(SwitchEvent::BecomePrimary, EventData::None);
                        }
                        Some(RoleChange::BecameBackup) => {
                            log::info!("switch {:?}: became backup", self.name());
                            tasks.cancel_foreground();
                            self.spawn_ready_task(tasks);
                            self.emit(SwitchEvent::BecomeBackup, EventData::None);
                        }
                        None => {}
                    }
                }
                Some(Update::Packet(packet)) => self.dispatch_packet(&packet),
                Some(Update::Digest(digest)) => self.dispatch_digest(&digest),
                Some(Update::IdleTimeoutNotification(notification)) => {
                    self.dispatch_idle_timeout(&notification)
                }
                Some(Update::Error(stream_error)) => {
                    log::error!(
                        "switch {:?}: stream error: {:?}",
                        self.name(),
                        stream_error
                    );
                    self.emit(
                        SwitchEvent::StreamError,
                        EventData::StreamError {
                            canonical_code: stream_error.canonical_code,
                            message: stream_error.message.clone(),
                        },
                    );
                }
                Some(Update::Other(other)) => {
                    log::warn!("switch {:?}: unhandled stream message: {:?}", self.name(), other)
                }
                None => log::warn!("switch {:?}: empty stream message", self.name()),
            }
        }
    }

    fn sync_arbitration_state(&self, arbitrator: &Arbitrator) {
        let mut state = self.inner.state.lock().unwrap();
        state.is_primary = arbitrator.is_primary;
        state.election_id = arbitrator.election_id;
        state.primary_id = arbitrator.primary_id;
    }

    /// Spawn the pipeline check + ready handler as a foreground task of the
    /// current epoch. Re-spawned on every role change.
    fn spawn_ready_task(&self, tasks: &Arc<TaskGroup>) {
        let switch = self.clone();
        let task = async move {
            switch.pipeline_check().await?;
            switch.set_connection_state(ConnectionState::Ready);
            log::info!(
                "Channel ready (name={:?}, is_primary={}): {}",
                switch.name(),
                switch.is_primary(),
                switch.schema().pipeline_info()
            );
            switch.emit(SwitchEvent::ChannelReady, EventData::None);

            if let Some(handler) = switch.inner.options.ready_handler.clone() {
                handler(switch.clone()).await?;
            }
            Ok(())
        };

        match controller::Controller::try_current() {
            Some(ctrl) => tasks.spawn("ready", false, ctrl.scope(task)),
            None => tasks.spawn("ready", false, task),
        }
    }

    // ~~~~~~~~~~~~~~~~~~~~~
    // P i p e l i n e
    // ~~~~~~~~~~~~~~~~~~~~~

    async fn pipeline_check(&self) -> Result<()> {
        if self.is_primary() && self.schema().is_configured() {
            self.set_pipeline().await?;
        } else {
            // Backup, or primary with no configured pipeline: adopt the
            // device's schema.
            self.get_pipeline().await?;
        }
        self.emit(SwitchEvent::PipelineReady, EventData::None);
        Ok(())
    }

    /// Fetch the device cookie; absent when no pipeline is installed yet.
    async fn fetch_cookie(&self) -> Result<Option<u64>> {
        let client = self.client()?;
        let request = p4r::GetForwardingPipelineConfigRequest {
            device_id: self.device_id(),
            response_type: P4ConfigResponseType::CookieOnly as i32,
        };
        match client.get_forwarding_pipeline_config(&request).await {
            Ok(reply) => Ok(reply
                .config
                .and_then(|config| config.cookie)
                .map(|cookie| cookie.cookie)),
            Err(err) if err.status.is_no_pipeline_configured() => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    async fn set_pipeline(&self) -> Result<()> {
        let schema = self.schema();
        let device_cookie = self.fetch_cookie().await?;

        if device_cookie == Some(schema.cookie()) && !self.inner.options.p4force {
            log::debug!(
                "switch {:?}: pipeline cookie {:#x} matches, skipping install",
                self.name(),
                schema.cookie()
            );
            return Ok(());
        }

        // With a stale pipeline present and no force flag, reconcile to keep
        // whatever state the target can preserve.
        let action = if !self.inner.options.p4force && device_cookie.is_some() {
            P4ConfigAction::ReconcileAndCommit
        } else {
            P4ConfigAction::VerifyAndCommit
        };

        let mut request = p4r::SetForwardingPipelineConfigRequest {
            device_id: self.device_id(),
            action: action as i32,
            config: Some(schema.pipeline_config()?),
            ..Default::default()
        };
        request.role = self.inner.options.role_name.clone();
        request.election_id = Some(u128util::encode(self.election_id()));

        let client = self.client()?;
        client
            .set_forwarding_pipeline_config(&request)
            .await
            .map_err(|err| {
                if err.is_transient() {
                    Error::Rpc(err)
                } else {
                    Error::Pipeline(err.to_string())
                }
            })?;
        log::info!(
            "Pipeline installed (name={:?}): {}",
            self.name(),
            schema.pipeline_info()
        );
        Ok(())
    }

    async fn get_pipeline(&self) -> Result<()> {
        let client = self.client()?;
        let request = p4r::GetForwardingPipelineConfigRequest {
            device_id: self.device_id(),
            response_type: P4ConfigResponseType::P4infoAndCookie as i32,
        };
        let reply = match client.get_forwarding_pipeline_config(&request).await {
            Ok(reply) => reply,
            Err(err) if err.status.is_no_pipeline_configured() => {
                log::warn!("switch {:?}: device has no pipeline installed", self.name());
                return Ok(());
            }
            Err(err) => return Err(err.into()),
        };

        let Some(config) = reply.config else {
            return Ok(());
        };
        let Some(p4info) = config.p4info else {
            return Ok(());
        };

        let local = self.schema();
        let device_cookie = config.cookie.map(|c| c.cookie);
        if local.is_configured() && device_cookie != Some(local.cookie()) {
            log::warn!(
                "switch {:?}: device pipeline differs from configured one (device={:?}, local={:#x})",
                self.name(),
                device_cookie,
                local.cookie()
            );
        }

        let schema = P4Schema::from_p4info(p4info, Vec::new())?;
        *self.inner.schema.write().unwrap() = Arc::new(schema);
        Ok(())
    }

    async fn fetch_capabilities(&self, client: &Arc<P4Client>) -> Result<()> {
        match client.capabilities().await {
            Ok(reply) => {
                match reply.p4runtime_api_version.parse::<ApiVersion>() {
                    Ok(version) => {
                        self.inner.state.lock().unwrap().api_version = version;
                    }
                    Err(err) => log::warn!("switch {:?}: {}", self.name(), err),
                }
                Ok(())
            }
            Err(err) if err.is_unimplemented() => {
                log::warn!("switch {:?}: Capabilities is not implemented", self.name());
                Ok(())
            }
            Err(err) => Err(err.into()),
        }
    }

    // ~~~~~~~~~~~~~
    // g N M I
    // ~~~~~~~~~~~~~

    async fn start_gnmi(&self, client: &Arc<P4Client>, tasks: &Arc<TaskGroup>) -> Result<()> {
        // gNMI shares the P4Runtime channel; devices serve both on one port.
        let gnmi = Arc::new(GnmiClient::from_channel(
            &self.inner.address,
            client.channel().clone(),
        ));

        let mut subscription = match self.inner.ports.subscribe(&gnmi).await {
            Ok(subscription) => subscription,
            Err(Error::Rpc(err)) if err.is_unimplemented() => {
                log::warn!("switch {:?}: gNMI is not implemented", self.name());
                return Ok(());
            }
            Err(err) => return Err(err),
        };

        self.inner.state.lock().unwrap().gnmi = Some(gnmi);

        let switch = self.clone();
        tasks.spawn("ports", true, async move {
            loop {
                match subscription.next_update().await? {
                    Some(update) => {
                        if let Some(event) = switch.inner.ports.apply(&update) {
                            match event {
                                PortEvent::Up(port) => {
                                    log::info!(
                                        "switch {:?}: port {} up",
                                        switch.name(),
                                        port.name
                                    );
                                    switch.emit(SwitchEvent::PortUp, EventData::Port(port));
                                }
                                PortEvent::Down(port) => {
                                    log::info!(
                                        "switch {:?}: port {} down",
                                        switch.name(),
                                        port.name
                                    );
                                    switch.emit(SwitchEvent::PortDown, EventData::Port(port));
                                }
                            }
                        }
                    }
                    None => return Ok(()),
                }
            }
        });
        Ok(())
    }

    // ~~~~~~~~~~~~~~~~~~~~~~~~~~~
    // T a s k s
    // ~~~~~~~~~~~~~~~~~~~~~~~~~~~

    /// Spawn a task scoped to the current READY epoch. It is cancelled when
    /// the switch leaves READY; background tasks additionally survive
    /// primary/backup role changes.
    pub fn create_task<F>(&self, name: &str, future: F) -> Result<()>
    where
        F: Future<Output = Result<()>> + Send + 'static,
    {
        self.create_task_opt(name, false, future)
    }

    pub fn create_task_opt<F>(&self, name: &str, background: bool, future: F) -> Result<()>
    where
        F: Future<Output = Result<()>> + Send + 'static,
    {
        let tasks = self.tasks()?;
        match controller::Controller::try_current() {
            Some(ctrl) => tasks.spawn(name, background, ctrl.scope(future)),
            None => tasks.spawn(name, background, future),
        }
        Ok(())
    }

    // ~~~~~~~~~~~~~~~~~~~~~~~~~~~
    // R e a d   a n d   w r i t e
    // ~~~~~~~~~~~~~~~~~~~~~~~~~~~

    /// Issue a Read for the given (possibly wildcard) entities; results
    /// stream back lazily.
    pub async fn read(
        &self,
        entities: impl IntoIterator<Item = impl Into<P4Entity>>,
    ) -> Result<EntityReader> {
        let schema = self.schema();
        let mut request = p4r::ReadRequest {
            device_id: self.device_id(),
            ..Default::default()
        };
        request.role = self.inner.options.role_name.clone();
        for entity in entities {
            request.entities.push(entity.into().encode(&schema)?);
        }

        let client = self.client()?;
        let receiver = client.read(&request)?;
        Ok(EntityReader {
            receiver,
            buffer: VecDeque::new(),
            schema,
        })
    }

    /// Write a mixed batch: stream messages (packet-out, digest ack) flush
    /// first in order, then the remaining updates go in one WriteRequest.
    pub async fn write(&self, ops: impl IntoIterator<Item = P4WriteOp>) -> Result<()> {
        self.write_opt(ops, WriteOptions::default()).await
    }

    pub async fn write_opt(
        &self,
        ops: impl IntoIterator<Item = P4WriteOp>,
        options: WriteOptions,
    ) -> Result<()> {
        let schema = self.schema();
        let mut updates = Vec::new();

        for op in ops {
            match op {
                P4WriteOp::PacketOut(packet) => {
                    let msg = packet.encode(&schema)?;
                    self.stream_sender()?.send(msg).await?;
                }
                P4WriteOp::DigestAck(ack) => {
                    let msg = ack.encode(&schema)?;
                    self.stream_sender()?.send(msg).await?;
                }
                P4WriteOp::Update(update) => {
                    update.entity.check_op(update.op, &schema)?;
                    updates.push(update.encode(&schema)?);
                }
            }
        }

        if updates.is_empty() {
            return Ok(());
        }
        self.write_request(updates, options).await
    }

    async fn write_request(
        &self,
        updates: Vec<p4r::Update>,
        options: WriteOptions,
    ) -> Result<()> {
        let mut request = p4r::WriteRequest {
            device_id: self.device_id(),
            updates,
            atomicity: options.atomicity as i32,
            ..Default::default()
        };
        request.role = self.inner.options.role_name.clone();
        request.election_id = Some(u128util::encode(self.election_id()));

        let client = self.client()?;
        match client.write(&request).await {
            Ok(_) => Ok(()),
            Err(err) => {
                if !options.strict && err.status.is_not_found_only() {
                    log::debug!(
                        "switch {:?}: ignored NOT_FOUND in non-strict write",
                        self.name()
                    );
                    return Ok(());
                }
                if options.warn_only {
                    log::warn!("switch {:?}: write failed (warn_only): {}", self.name(), err);
                    return Ok(());
                }
                Err(err.into())
            }
        }
    }

    /// INSERT all entities.
    pub async fn insert(
        &self,
        entities: impl IntoIterator<Item = impl Into<P4Entity>>,
    ) -> Result<()> {
        self.write_uniform(entities, P4UpdateType::Insert, WriteOptions::default())
            .await
    }

    /// MODIFY all entities.
    pub async fn modify(
        &self,
        entities: impl IntoIterator<Item = impl Into<P4Entity>>,
    ) -> Result<()> {
        self.write_uniform(entities, P4UpdateType::Modify, WriteOptions::default())
            .await
    }

    /// DELETE all entities.
    pub async fn delete(
        &self,
        entities: impl IntoIterator<Item = impl Into<P4Entity>>,
    ) -> Result<()> {
        self.write_uniform(entities, P4UpdateType::Delete, WriteOptions::default())
            .await
    }

    pub async fn write_uniform(
        &self,
        entities: impl IntoIterator<Item = impl Into<P4Entity>>,
        op: P4UpdateType,
        options: WriteOptions,
    ) -> Result<()> {
        let schema = self.schema();
        let mut updates = Vec::new();
        for entity in entities {
            let update = P4Update {
                op,
                entity: entity.into(),
            };
            update.entity.check_op(op, &schema)?;
            updates.push(update.encode(&schema)?);
        }
        if updates.is_empty() {
            return Ok(());
        }
        self.write_request(updates, options).await
    }

    /// Delete every writable entity: table entries (const tables skipped),
    /// action profile groups and members, multicast groups, clone sessions;
    /// reset mutable default actions; clear value sets; remove digest
    /// configs.
    pub async fn delete_all(&self) -> Result<()> {
        let schema = self.schema();

        // Wildcard-read-then-delete the deletable kinds. Table entries go
        // first (they may point at profile members), then groups before the
        // members they reference.
        self.wildcard_delete(P4TableEntry::wildcard(), &schema)
            .await?;
        self.wildcard_delete(P4ActionProfileGroup::default(), &schema)
            .await?;
        self.wildcard_delete(P4ActionProfileMember::default(), &schema)
            .await?;
        self.wildcard_delete(P4MulticastGroupEntry::default(), &schema)
            .await?;
        self.wildcard_delete(P4CloneSessionEntry::default(), &schema)
            .await?;

        // Reset default actions on tables where they are mutable.
        let default_entries: Vec<P4Entity> = schema
            .tables()
            .iter()
            .filter(|table| {
                table.const_default_action.is_none() && table.action_profile.is_none()
            })
            .map(|table| P4TableEntry::new(&table.alias).default_action().into())
            .collect();
        if !default_entries.is_empty() {
            self.modify(default_entries).await?;
        }

        // Value sets are modify-only: clear their members.
        let value_sets: Vec<P4Entity> = schema
            .value_sets()
            .iter()
            .map(|value_set| {
                P4ValueSetEntry {
                    value_set_id: value_set.alias.clone(),
                    members: Vec::new(),
                }
                .into()
            })
            .collect();
        if !value_sets.is_empty() {
            self.modify(value_sets).await?;
        }

        // Digest configs do not support wildcard reads; delete one by one,
        // tolerating entries that were never inserted.
        let digests: Vec<P4Entity> = schema
            .digests()
            .iter()
            .map(|digest| P4DigestEntry::new(&digest.alias).into())
            .collect();
        if !digests.is_empty() {
            self.write_uniform(
                digests,
                P4UpdateType::Delete,
                WriteOptions {
                    strict: false,
                    ..Default::default()
                },
            )
            .await?;
        }
        Ok(())
    }

    async fn wildcard_delete(
        &self,
        wildcard: impl Into<P4Entity>,
        schema: &Arc<P4Schema>,
    ) -> Result<()> {
        let mut reader = self.read([wildcard.into()]).await?;
        let mut doomed = Vec::new();
        while let Some(entity) = reader.next().await {
            let entity = entity?;
            if let P4Entity::TableEntry(entry) = &entity {
                // Entries of const tables cannot be deleted.
                if !entry.table_id.is_empty()
                    && schema
                        .tables()
                        .get_name(&entry.table_id)
                        .is_some_and(|table| table.is_const)
                {
                    continue;
                }
                // Default actions are reset, not deleted.
                if entry.is_default_action {
                    continue;
                }
            }
            doomed.push(entity);
        }
        if !doomed.is_empty() {
            self.delete(doomed).await?;
        }
        Ok(())
    }

    // ~~~~~~~~~~~~~~~~~~~~~~~~~~~
    // S t r e a m   c o n s u m e r s
    // ~~~~~~~~~~~~~~~~~~~~~~~~~~~

    /// Send one packet-out on the stream.
    pub async fn send_packet(&self, packet: P4PacketOut) -> Result<()> {
        let msg = packet.encode(&self.schema())?;
        self.stream_sender()?.send(msg).await
    }

    /// Acknowledge a digest list.
    pub async fn ack_digest(&self, ack: P4DigestListAck) -> Result<()> {
        let msg = ack.encode(&self.schema())?;
        self.stream_sender()?.send(msg).await
    }

    /// Subscribe to incoming packets, optionally filtered to the given
    /// Ethernet types (payload bytes 12..14).
    pub fn read_packets(&self, eth_types: Option<&[u16]>) -> PacketReader {
        let filter: PacketFilter = eth_types.map(|types| {
            types.iter().map(|eth_type| eth_type.to_be_bytes()).collect()
        });
        let (tx, rx) = queue::bounded(DEFAULT_QUEUE_SIZE);
        let id = {
            let mut demux = self.inner.demux.lock().unwrap();
            demux.next_id += 1;
            let id = demux.next_id;
            demux.packets.push((id, filter, tx));
            id
        };
        PacketReader {
            rx,
            switch: self.clone(),
            id,
        }
    }

    /// Subscribe to the digest lists of one named digest.
    pub fn read_digests(&self, digest_name: &str) -> Result<DigestReader> {
        let schema = self.schema();
        let digest = schema.digests().require_name(digest_name)?;
        let alias = digest.alias.clone();

        let mut demux = self.inner.demux.lock().unwrap();
        if demux
            .digests
            .get(&alias)
            .is_some_and(|sender| !sender.is_closed())
        {
            return Err(Error::config(format!(
                "digest reader {:?} is already open",
                alias
            )));
        }
        let (tx, rx) = queue::bounded(DEFAULT_QUEUE_SIZE);
        demux.digests.insert(alias.clone(), tx);
        Ok(DigestReader {
            rx,
            switch: self.clone(),
            name: alias,
        })
    }

    /// Subscribe to idle-timeout notifications.
    pub fn read_idle_timeouts(&self) -> Result<IdleTimeoutReader> {
        let mut demux = self.inner.demux.lock().unwrap();
        if demux
            .idle_timeouts
            .as_ref()
            .is_some_and(|sender| !sender.is_closed())
        {
            return Err(Error::config("idle timeout reader is already open"));
        }
        let (tx, rx) = queue::bounded(DEFAULT_QUEUE_SIZE);
        demux.idle_timeouts = Some(tx);
        Ok(IdleTimeoutReader {
            rx,
            switch: self.clone(),
        })
    }

    fn dispatch_packet(&self, packet: &p4r::PacketIn) {
        let decoded = match P4PacketIn::decode(packet, &self.schema()) {
            Ok(decoded) => decoded,
            Err(err) => {
                log::warn!("switch {:?}: bad packet-in: {}", self.name(), err);
                return;
            }
        };

        let mut delivered = false;
        let mut overflow = None;
        {
            let mut demux = self.inner.demux.lock().unwrap();
            demux.packets.retain(|(_, _, sender)| !sender.is_closed());
            for (_, filter, sender) in &demux.packets {
                let matches = match filter {
                    None => true,
                    Some(types) => {
                        decoded.payload.len() >= 14
                            && types
                                .iter()
                                .any(|t| t.as_slice() == &decoded.payload[12..14])
                    }
                };
                if matches {
                    let dropped = sender.push(decoded.clone());
                    if dropped > 0 {
                        overflow = Some(dropped);
                    }
                    delivered = true;
                }
            }
        }
        if let Some(dropped) = overflow {
            self.emit(
                SwitchEvent::StreamError,
                EventData::QueueOverflow {
                    queue: "packets",
                    dropped,
                },
            );
        }
        if !delivered {
            log::warn!("switch {:?}: packet ignored", self.name());
        }
    }

    fn dispatch_digest(&self, digest: &p4r::DigestList) {
        let decoded = match P4DigestList::decode(digest, &self.schema()) {
            Ok(decoded) => decoded,
            Err(err) => {
                log::warn!("switch {:?}: bad digest list: {}", self.name(), err);
                return;
            }
        };
        let overflow = {
            let demux = self.inner.demux.lock().unwrap();
            match demux.digests.get(&decoded.digest_id) {
                Some(sender) if !sender.is_closed() => {
                    let dropped = sender.push(decoded);
                    (dropped > 0).then_some(dropped)
                }
                _ => {
                    log::debug!(
                        "switch {:?}: digest {:?} has no reader",
                        self.name(),
                        decoded.digest_id
                    );
                    None
                }
            }
        };
        if let Some(dropped) = overflow {
            self.emit(
                SwitchEvent::StreamError,
                EventData::QueueOverflow {
                    queue: "digests",
                    dropped,
                },
            );
        }
    }

    fn dispatch_idle_timeout(&self, notification: &p4r::IdleTimeoutNotification) {
        let decoded = match P4IdleTimeoutNotification::decode(notification, &self.schema()) {
            Ok(decoded) => decoded,
            Err(err) => {
                log::warn!("switch {:?}: bad idle timeout: {}", self.name(), err);
                return;
            }
        };
        let overflow = {
            let demux = self.inner.demux.lock().unwrap();
            match &demux.idle_timeouts {
                Some(sender) if !sender.is_closed() => {
                    let dropped = sender.push(decoded);
                    (dropped > 0).then_some(dropped)
                }
                _ => None,
            }
        };
        if let Some(dropped) = overflow {
            self.emit(
                SwitchEvent::StreamError,
                EventData::QueueOverflow {
                    queue: "idle_timeouts",
                    dropped,
                },
            );
        }
    }
}

impl fmt::Debug for Switch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Switch")
            .field("name", &self.inner.name)
            .field("address", &self.inner.address)
            .finish()
    }
}

/// Options for [`Switch::write_opt`].
#[derive(Clone, Copy, Debug)]
pub struct WriteOptions {
    pub atomicity: P4Atomicity,
    /// When false, NOT_FOUND on DELETE/MODIFY is swallowed.
    pub strict: bool,
    /// When true, failures are logged instead of raised.
    pub warn_only: bool,
}

impl Default for WriteOptions {
    fn default() -> Self {
        WriteOptions {
            atomicity: P4Atomicity::ContinueOnError,
            strict: true,
            warn_only: false,
        }
    }
}

/// Lazily decoded results of a Read request, in server order.
pub struct EntityReader {
    receiver: grpcio::ClientSStreamReceiver<p4r::ReadResponse>,
    buffer: VecDeque<p4r::Entity>,
    schema: Arc<P4Schema>,
}

impl EntityReader {
    pub async fn next(&mut self) -> Option<Result<P4Entity>> {
        loop {
            if let Some(entity) = self.buffer.pop_front() {
                return Some(decode_entity(&entity, &self.schema));
            }
            match self.receiver.next().await {
                None => return None,
                Some(Ok(reply)) => self.buffer.extend(reply.entities),
                Some(Err(err)) => {
                    return Some(Err(Error::Rpc(P4Error::new("Read", err))))
                }
            }
        }
    }

    /// Drain the remaining entities into a vector.
    pub async fn collect(mut self) -> Result<Vec<P4Entity>> {
        let mut result = Vec::new();
        while let Some(entity) = self.next().await {
            result.push(entity?);
        }
        Ok(result)
    }
}

/// Async iterator over incoming packets. Dropping it unregisters the
/// consumer; other consumers keep their own queues.
pub struct PacketReader {
    rx: QueueReceiver<P4PacketIn>,
    switch: Switch,
    id: u64,
}

impl PacketReader {
    pub async fn next(&mut self) -> Option<P4PacketIn> {
        self.rx.pop().await
    }

    pub fn dropped(&self) -> u64 {
        self.rx.dropped()
    }
}

impl Drop for PacketReader {
    fn drop(&mut self) {
        let mut demux = self.switch.inner.demux.lock().unwrap();
        demux.packets.retain(|(id, _, _)| *id != self.id);
    }
}

/// Async iterator over the digest lists of one digest.
pub struct DigestReader {
    rx: QueueReceiver<P4DigestList>,
    switch: Switch,
    name: String,
}

impl DigestReader {
    pub async fn next(&mut self) -> Option<P4DigestList> {
        self.rx.pop().await
    }

    pub fn dropped(&self) -> u64 {
        self.rx.dropped()
    }
}

impl Drop for DigestReader {
    fn drop(&mut self) {
        let mut demux = self.switch.inner.demux.lock().unwrap();
        demux.digests.remove(&self.name);
    }
}

/// Async iterator over idle-timeout notifications.
pub struct IdleTimeoutReader {
    rx: QueueReceiver<P4IdleTimeoutNotification>,
    switch: Switch,
}

impl IdleTimeoutReader {
    pub async fn next(&mut self) -> Option<P4IdleTimeoutNotification> {
        self.rx.pop().await
    }
}

impl Drop for IdleTimeoutReader {
    fn drop(&mut self) {
        self.switch.inner.demux.lock().unwrap().idle_timeouts = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testlib;

    fn options() -> SwitchOptions {
        SwitchOptions::new()
    }

    #[test]
    fn api_version_parsing() {
        let version: ApiVersion = "1.4.0".parse().unwrap();
        assert_eq!((version.major, version.minor, version.patch), (1, 4, 0));
        assert_eq!(version.extra, "");

        let version: ApiVersion = "1.3.0-r2".parse().unwrap();
        assert_eq!(version.patch, 0);
        assert_eq!(version.extra, "-r2");
        assert_eq!(version.to_string(), "1.3.0-r2");

        assert!("not-a-version".parse::<ApiVersion>().is_err());
        assert!("1.2".parse::<ApiVersion>().is_err());
    }

    #[test]
    fn options_builder_is_immutable_style() {
        let base = options().with_device_id(5);
        let derived = base.clone().with_device_id(6).with_p4force(true);
        assert_eq!(base.device_id, 5);
        assert!(!base.p4force);
        assert_eq!(derived.device_id, 6);
        assert!(derived.p4force);
    }

    #[tokio::test]
    async fn switch_construction_and_stash() {
        let switch = Switch::new("s1", "127.0.0.1:50001", options()).unwrap();
        assert_eq!(switch.name(), "s1");
        assert_eq!(switch.connection_state(), ConnectionState::Down);
        assert!(!switch.is_primary());

        switch.stash_insert("config", 42u32);
        assert_eq!(switch.stash_get::<u32>("config").as_deref(), Some(&42));
        assert!(switch.stash_get::<String>("config").is_none());
        assert!(switch.stash_get::<u32>("missing").is_none());
    }

    #[test]
    fn bad_p4info_fails_at_construction() {
        let options = options().with_p4info(P4InfoSource::Bytes(b"tables {".to_vec()));
        assert!(Switch::new("s1", "127.0.0.1:50001", options).is_err());
    }

    #[tokio::test]
    async fn operations_require_connection() {
        let switch = Switch::new("s1", "127.0.0.1:50001", options()).unwrap();
        assert!(switch.client().is_err());
        assert!(switch
            .send_packet(P4PacketOut::new(b"x".to_vec()))
            .await
            .is_err());
        assert!(switch.create_task("t", async { Ok(()) }).is_err());
    }

    #[tokio::test]
    async fn packet_reader_filters_by_eth_type() {
        let mut p4info = testlib::p4info();
        p4info.controller_packet_metadata.clear(); // payload-only packets
        let schema = P4Schema::from_p4info(p4info, Vec::new()).unwrap();

        let switch = Switch::new("s1", "127.0.0.1:50001", options()).unwrap();
        *switch.inner.schema.write().unwrap() = Arc::new(schema);

        let mut all = switch.read_packets(None);
        let mut arp_only = switch.read_packets(Some(&[0x0806]));

        let mut arp = vec![0u8; 14];
        arp[12..14].copy_from_slice(&[0x08, 0x06]);
        let mut ipv4 = vec![0u8; 14];
        ipv4[12..14].copy_from_slice(&[0x08, 0x00]);

        switch.dispatch_packet(&p4r::PacketIn {
            payload: arp.clone(),
            metadata: Vec::new(),
        });
        switch.dispatch_packet(&p4r::PacketIn {
            payload: ipv4.clone(),
            metadata: Vec::new(),
        });

        assert_eq!(all.next().await.unwrap().payload, arp);
        assert_eq!(all.next().await.unwrap().payload, ipv4);
        assert_eq!(arp_only.next().await.unwrap().payload, arp);
        assert_eq!(arp_only.dropped(), 0);
    }

    #[tokio::test]
    async fn digest_reader_is_exclusive_per_digest() {
        let switch = Switch::new("s1", "127.0.0.1:50001", options()).unwrap();
        *switch.inner.schema.write().unwrap() = Arc::new(testlib::schema());

        let reader = switch.read_digests("digest_t").unwrap();
        assert!(switch.read_digests("digest_t").is_err());
        drop(reader);
        assert!(switch.read_digests("digest_t").is_ok());

        assert!(switch.read_digests("nope").is_err());
    }

    #[tokio::test]
    async fn packet_queue_overflow_drops_oldest() {
        let switch = Switch::new("s1", "127.0.0.1:50001", options()).unwrap();
        let mut p4info = testlib::p4info();
        p4info.controller_packet_metadata.clear();
        *switch.inner.schema.write().unwrap() =
            Arc::new(P4Schema::from_p4info(p4info, Vec::new()).unwrap());

        let mut reader = switch.read_packets(None);
        for i in 0..(DEFAULT_QUEUE_SIZE + 3) {
            let mut payload = vec![0u8; 14];
            payload[0] = i as u8;
            switch.dispatch_packet(&p4r::PacketIn {
                payload,
                metadata: Vec::new(),
            });
        }
        assert_eq!(reader.dropped(), 3);
        // The oldest packets were evicted; the first one left is #3.
        assert_eq!(reader.next().await.unwrap().payload[0], 3);
    }
}
