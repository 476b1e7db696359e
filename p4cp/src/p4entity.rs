//! Typed P4Runtime entities and their wire codecs.
//!
//! Every entity kind has a typed struct with named matches and action
//! arguments; the schema drives encoding, so unknown table/action/field
//! names fail at encode time rather than at the device. Updates are an
//! explicit `(op, entity)` pair built with [`insert`], [`modify`] and
//! [`delete`].
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

use proto::p4runtime as p4r;

use crate::errors::{Error, Result};
use crate::p4schema::{P4Action, P4Schema, P4Table};
use crate::p4values::{self, P4Value};

/// Operation tag for a write.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum P4UpdateType {
    Insert,
    Modify,
    Delete,
}

impl P4UpdateType {
    pub fn wire(self) -> i32 {
        match self {
            P4UpdateType::Insert => p4r::update::Type::Insert as i32,
            P4UpdateType::Modify => p4r::update::Type::Modify as i32,
            P4UpdateType::Delete => p4r::update::Type::Delete as i32,
        }
    }
}

/// Tag `entity` for insertion.
pub fn insert(entity: impl Into<P4Entity>) -> P4Update {
    P4Update {
        op: P4UpdateType::Insert,
        entity: entity.into(),
    }
}

/// Tag `entity` for modification.
pub fn modify(entity: impl Into<P4Entity>) -> P4Update {
    P4Update {
        op: P4UpdateType::Modify,
        entity: entity.into(),
    }
}

/// Tag `entity` for deletion.
pub fn delete(entity: impl Into<P4Entity>) -> P4Update {
    P4Update {
        op: P4UpdateType::Delete,
        entity: entity.into(),
    }
}

/// An (op, entity) pair ready for a WriteRequest.
#[derive(Clone, Debug, PartialEq)]
pub struct P4Update {
    pub op: P4UpdateType,
    pub entity: P4Entity,
}

impl P4Update {
    pub fn encode(&self, schema: &P4Schema) -> Result<p4r::Update> {
        if self.entity.is_modify_only() && self.op != P4UpdateType::Modify {
            return Err(Error::encoding(format!(
                "{} supports MODIFY only",
                self.entity.kind()
            )));
        }
        Ok(p4r::Update {
            r#type: self.op.wire(),
            entity: Some(self.entity.encode(schema)?),
        })
    }
}

// ~~~~~~~~~~~~~~~~~~~
// M a t c h   &   a c t i o n
// ~~~~~~~~~~~~~~~~~~~

/// Named match-key values. Wildcarded fields are simply omitted.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct P4TableMatch(pub BTreeMap<String, P4Value>);

impl P4TableMatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one field; builder style.
    pub fn field(mut self, name: impl Into<String>, value: impl Into<P4Value>) -> Self {
        self.0.insert(name.into(), value.into());
        self
    }

    pub fn get(&self, name: &str) -> Option<&P4Value> {
        self.0.get(name)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn encode(&self, table: &P4Table) -> Result<Vec<p4r::FieldMatch>> {
        let mut result = Vec::with_capacity(self.0.len());
        for (name, value) in &self.0 {
            let field = table.match_fields.require_name(name).map_err(|err| {
                Error::schema(format!("{:?}: {}", table.alias, err))
            })?;
            if let Some(encoded) = field.encode_field(value).map_err(|err| {
                Error::encoding(format!("{:?}: match field {:?}: {}", table.alias, name, err))
            })? {
                result.push(encoded);
            }
        }
        // Field order on the wire follows field id, not insertion order.
        result.sort_by_key(|field| field.field_id);
        Ok(result)
    }

    pub fn decode(fields: &[p4r::FieldMatch], table: &P4Table) -> Result<Self> {
        let mut result = BTreeMap::new();
        for field in fields {
            let spec = table.match_fields.require_id(field.field_id)?;
            result.insert(spec.alias.clone(), spec.decode_field(field)?);
        }
        Ok(P4TableMatch(result))
    }

    /// Human-readable form: `field=value, field=value`.
    pub fn format(&self, table: &P4Table) -> String {
        let mut parts = Vec::new();
        for field in table.match_fields.iter() {
            if let Some(value) = self.0.get(&field.alias) {
                parts.push(format!("{}={}", field.alias, field.format_field(value)));
            }
        }
        parts.join(", ")
    }
}

/// A direct action reference: name plus named arguments.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct P4TableAction {
    pub name: String,
    pub args: BTreeMap<String, P4Value>,
}

impl P4TableAction {
    pub fn new(name: impl Into<String>) -> Self {
        P4TableAction {
            name: name.into(),
            args: BTreeMap::new(),
        }
    }

    /// Bind one parameter; builder style.
    pub fn param(mut self, name: impl Into<String>, value: impl Into<P4Value>) -> Self {
        self.args.insert(name.into(), value.into());
        self
    }

    /// Make a weighted action for a one-shot action set.
    pub fn weight(self, weight: i32) -> P4WeightedAction {
        P4WeightedAction::new(weight, self)
    }

    pub fn encode_action(&self, action: &P4Action) -> Result<p4r::Action> {
        let mut params = Vec::with_capacity(self.args.len());
        for (name, value) in &self.args {
            let param = action.params.require_name(name).map_err(|err| {
                Error::schema(format!("{:?}: {}", action.alias, err))
            })?;
            params.push(param.encode_param(value).map_err(|err| {
                Error::encoding(format!("{:?}: parameter {:?}: {}", action.alias, name, err))
            })?);
        }
        params.sort_by_key(|param| param.param_id);

        // A zero-argument reference is a wildcard (reads); otherwise every
        // declared parameter must be bound.
        if !self.args.is_empty() && params.len() != action.params.len() {
            let missing: Vec<&str> = action
                .params
                .iter()
                .filter(|param| !self.args.contains_key(&param.name))
                .map(|param| param.name.as_str())
                .collect();
            return Err(Error::schema(format!(
                "action {:?}: missing parameters {:?}",
                action.alias, missing
            )));
        }

        Ok(p4r::Action {
            action_id: action.id,
            params,
        })
    }

    fn encode_table_action(&self, table: &P4Table) -> Result<p4r::TableAction> {
        let action_ref = table.actions.require_name(&self.name).map_err(|err| {
            Error::schema(format!("{:?}: {}", table.alias, err))
        })?;
        let action = self.encode_action(&action_ref.action)?;

        // Indirect tables take a one-shot action set; promote a plain action
        // to a single member with weight 1.
        if table.action_profile.is_some() {
            return Ok(p4r::TableAction {
                r#type: Some(p4r::table_action::Type::ActionProfileActionSet(
                    p4r::ActionProfileActionSet {
                        action_profile_actions: vec![p4r::ActionProfileAction {
                            action: Some(action),
                            weight: 1,
                            watch_kind: None,
                        }],
                    },
                )),
            });
        }

        Ok(p4r::TableAction {
            r#type: Some(p4r::table_action::Type::Action(action)),
        })
    }

    pub fn decode_action(msg: &p4r::Action, schema: &P4Schema) -> Result<Self> {
        let action = schema.actions().require_id(msg.action_id)?;
        Self::decode_action_params(msg, action)
    }

    fn decode_action_params(msg: &p4r::Action, action: &P4Action) -> Result<Self> {
        let mut args = BTreeMap::new();
        for param in &msg.params {
            let spec = action.params.require_id(param.param_id)?;
            args.insert(spec.name.clone(), spec.decode_param(param)?);
        }
        Ok(P4TableAction {
            name: action.alias.clone(),
            args,
        })
    }

    pub fn format(&self, table: &P4Table) -> String {
        let args: Vec<String> = match table.actions.get_name(&self.name) {
            Some(action_ref) => self
                .args
                .iter()
                .map(|(name, value)| {
                    let formatted = action_ref
                        .action
                        .params
                        .get_name(name)
                        .map(|p| p.format_param(value))
                        .unwrap_or_else(|| format!("{:?}", value));
                    format!("{}={}", name, formatted)
                })
                .collect(),
            None => self.args.keys().map(|k| k.to_string()).collect(),
        };
        format!("{}({})", self.name, args.join(", "))
    }
}

/// One member of a one-shot action set.
#[derive(Clone, Debug, PartialEq)]
pub struct P4WeightedAction {
    pub weight: i32,
    pub watch_port: Option<u32>,
    pub action: P4TableAction,
}

impl P4WeightedAction {
    pub fn new(weight: i32, action: P4TableAction) -> Self {
        P4WeightedAction {
            weight,
            watch_port: None,
            action,
        }
    }

    /// Tie this member's liveness to a watch port.
    pub fn with_watch_port(mut self, port: u32) -> Self {
        self.watch_port = Some(port);
        self
    }
}

fn encode_watch_port(port: u32) -> Result<Vec<u8>> {
    p4values::encode_exact(&P4Value::Int(port as u128), 32)
}

fn decode_watch_port(data: &[u8]) -> Result<u32> {
    match p4values::decode_exact(data, 32, crate::p4values::DecodeFormat::empty())? {
        P4Value::Int(v) => Ok(v as u32),
        _ => Err(Error::encoding("invalid watch_port")),
    }
}

/// Indirect action: a profile member, a profile group, or an inline
/// one-shot action set.
#[derive(Clone, Debug, PartialEq)]
pub enum P4IndirectAction {
    Member(u32),
    Group(u32),
    ActionSet(Vec<P4WeightedAction>),
}

impl P4IndirectAction {
    fn encode_table_action(&self, table: &P4Table) -> Result<p4r::TableAction> {
        let action_type = match self {
            P4IndirectAction::Member(member_id) => {
                p4r::table_action::Type::ActionProfileMemberId(*member_id)
            }
            P4IndirectAction::Group(group_id) => {
                p4r::table_action::Type::ActionProfileGroupId(*group_id)
            }
            P4IndirectAction::ActionSet(members) => {
                let mut actions = Vec::with_capacity(members.len());
                for member in members {
                    let action_ref =
                        table.actions.require_name(&member.action.name).map_err(|err| {
                            Error::schema(format!("{:?}: {}", table.alias, err))
                        })?;
                    if member.weight <= 0 {
                        return Err(Error::encoding(format!(
                            "invalid action weight: {}",
                            member.weight
                        )));
                    }
                    let watch_kind = member
                        .watch_port
                        .map(|port| {
                            Ok::<_, Error>(p4r::action_profile_action::WatchKind::WatchPort(
                                encode_watch_port(port)?,
                            ))
                        })
                        .transpose()?;
                    actions.push(p4r::ActionProfileAction {
                        action: Some(member.action.encode_action(&action_ref.action)?),
                        weight: member.weight,
                        watch_kind,
                    });
                }
                p4r::table_action::Type::ActionProfileActionSet(p4r::ActionProfileActionSet {
                    action_profile_actions: actions,
                })
            }
        };
        Ok(p4r::TableAction {
            r#type: Some(action_type),
        })
    }

    fn decode_action_set(
        msg: &p4r::ActionProfileActionSet,
        schema: &P4Schema,
    ) -> Result<Self> {
        let mut members = Vec::with_capacity(msg.action_profile_actions.len());
        for profile_action in &msg.action_profile_actions {
            let action = profile_action
                .action
                .as_ref()
                .ok_or_else(|| Error::encoding("action set member without action"))?;
            let watch_port = match &profile_action.watch_kind {
                Some(p4r::action_profile_action::WatchKind::WatchPort(port)) => {
                    Some(decode_watch_port(port)?)
                }
                Some(p4r::action_profile_action::WatchKind::Watch(_)) => {
                    return Err(Error::encoding("deprecated watch field is not supported"))
                }
                None => None,
            };
            members.push(P4WeightedAction {
                weight: profile_action.weight,
                watch_port,
                action: P4TableAction::decode_action(action, schema)?,
            });
        }
        Ok(P4IndirectAction::ActionSet(members))
    }
}

/// Action slot of a table entry.
#[derive(Clone, Debug, PartialEq)]
pub enum P4EntryAction {
    Direct(P4TableAction),
    Indirect(P4IndirectAction),
}

impl P4EntryAction {
    fn encode(&self, table: &P4Table) -> Result<p4r::TableAction> {
        match self {
            P4EntryAction::Direct(action) => action.encode_table_action(table),
            P4EntryAction::Indirect(action) => action.encode_table_action(table),
        }
    }

    fn decode(msg: &p4r::TableAction, schema: &P4Schema) -> Result<Self> {
        match msg
            .r#type
            .as_ref()
            .ok_or_else(|| Error::encoding("empty table action"))?
        {
            p4r::table_action::Type::Action(action) => Ok(P4EntryAction::Direct(
                P4TableAction::decode_action(action, schema)?,
            )),
            p4r::table_action::Type::ActionProfileMemberId(member_id) => {
                Ok(P4EntryAction::Indirect(P4IndirectAction::Member(*member_id)))
            }
            p4r::table_action::Type::ActionProfileGroupId(group_id) => {
                Ok(P4EntryAction::Indirect(P4IndirectAction::Group(*group_id)))
            }
            p4r::table_action::Type::ActionProfileActionSet(set) => Ok(P4EntryAction::Indirect(
                P4IndirectAction::decode_action_set(set, schema)?,
            )),
        }
    }
}

impl From<P4TableAction> for P4EntryAction {
    fn from(action: P4TableAction) -> Self {
        P4EntryAction::Direct(action)
    }
}

impl From<P4IndirectAction> for P4EntryAction {
    fn from(action: P4IndirectAction) -> Self {
        P4EntryAction::Indirect(action)
    }
}

// ~~~~~~~~~~~~~~~~~~~~~~~~~~~
// C o u n t e r / m e t e r   d a t a
// ~~~~~~~~~~~~~~~~~~~~~~~~~~~

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct P4MeterConfig {
    pub cir: i64,
    pub cburst: i64,
    pub pir: i64,
    pub pburst: i64,
}

impl P4MeterConfig {
    fn encode(&self) -> p4r::MeterConfig {
        p4r::MeterConfig {
            cir: self.cir,
            cburst: self.cburst,
            pir: self.pir,
            pburst: self.pburst,
        }
    }

    fn decode(msg: &p4r::MeterConfig) -> Self {
        P4MeterConfig {
            cir: msg.cir,
            cburst: msg.cburst,
            pir: msg.pir,
            pburst: msg.pburst,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct P4CounterData {
    pub byte_count: i64,
    pub packet_count: i64,
}

impl P4CounterData {
    fn encode(&self) -> p4r::CounterData {
        p4r::CounterData {
            byte_count: self.byte_count,
            packet_count: self.packet_count,
        }
    }

    fn decode(msg: &p4r::CounterData) -> Self {
        P4CounterData {
            byte_count: msg.byte_count,
            packet_count: msg.packet_count,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct P4MeterCounterData {
    pub green: P4CounterData,
    pub yellow: P4CounterData,
    pub red: P4CounterData,
}

impl P4MeterCounterData {
    fn encode(&self) -> p4r::MeterCounterData {
        p4r::MeterCounterData {
            green: Some(self.green.encode()),
            yellow: Some(self.yellow.encode()),
            red: Some(self.red.encode()),
        }
    }

    fn decode(msg: &p4r::MeterCounterData) -> Self {
        P4MeterCounterData {
            green: msg.green.as_ref().map(P4CounterData::decode).unwrap_or_default(),
            yellow: msg.yellow.as_ref().map(P4CounterData::decode).unwrap_or_default(),
            red: msg.red.as_ref().map(P4CounterData::decode).unwrap_or_default(),
        }
    }
}

// ~~~~~~~~~~~~~~~~~
// T a b l e   e n t r y
// ~~~~~~~~~~~~~~~~~

/// A table entry. An empty `table_id` reads across all tables.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct P4TableEntry {
    pub table_id: String,
    pub r#match: Option<P4TableMatch>,
    pub action: Option<P4EntryAction>,
    pub priority: i32,
    pub meter_config: Option<P4MeterConfig>,
    pub counter_data: Option<P4CounterData>,
    pub meter_counter_data: Option<P4MeterCounterData>,
    pub is_default_action: bool,
    pub idle_timeout_ns: i64,
    /// Some(elapsed_ns) on decode; Some(0) on a read requests it.
    pub time_since_last_hit: Option<i64>,
    pub metadata: Vec<u8>,
}

impl P4TableEntry {
    pub fn new(table_id: impl Into<String>) -> Self {
        P4TableEntry {
            table_id: table_id.into(),
            ..Default::default()
        }
    }

    /// Wildcard entry matching every table (reads only).
    pub fn wildcard() -> Self {
        Self::default()
    }

    pub fn with_match(mut self, r#match: P4TableMatch) -> Self {
        self.r#match = Some(r#match);
        self
    }

    pub fn with_action(mut self, action: impl Into<P4EntryAction>) -> Self {
        self.action = Some(action.into());
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn default_action(mut self) -> Self {
        self.is_default_action = true;
        self
    }

    pub fn with_idle_timeout_ns(mut self, idle_timeout_ns: i64) -> Self {
        self.idle_timeout_ns = idle_timeout_ns;
        self
    }

    pub fn encode_entry(&self, schema: &P4Schema) -> Result<p4r::TableEntry> {
        if self.table_id.is_empty() {
            // Wildcard read across all tables.
            return Ok(p4r::TableEntry {
                counter_data: self.counter_data.as_ref().map(|c| c.encode()),
                time_since_last_hit: self
                    .time_since_last_hit
                    .map(|elapsed_ns| p4r::table_entry::IdleTimeout { elapsed_ns }),
                ..Default::default()
            });
        }

        let table = schema.tables().require_name(&self.table_id)?;

        if self.is_default_action && self.r#match.as_ref().is_some_and(|m| !m.is_empty()) {
            return Err(Error::encoding(format!(
                "{:?}: default action entry cannot have a match",
                table.alias
            )));
        }

        let r#match = match &self.r#match {
            Some(m) => m.encode(table)?,
            None => Vec::new(),
        };
        let action = match &self.action {
            Some(a) => Some(a.encode(table)?),
            None => None,
        };

        Ok(p4r::TableEntry {
            table_id: table.id,
            r#match,
            action,
            priority: self.priority,
            meter_config: self.meter_config.as_ref().map(|m| m.encode()),
            counter_data: self.counter_data.as_ref().map(|c| c.encode()),
            meter_counter_data: self.meter_counter_data.as_ref().map(|m| m.encode()),
            is_default_action: self.is_default_action,
            idle_timeout_ns: self.idle_timeout_ns,
            time_since_last_hit: self
                .time_since_last_hit
                .map(|elapsed_ns| p4r::table_entry::IdleTimeout { elapsed_ns }),
            metadata: self.metadata.clone(),
            ..Default::default()
        })
    }

    /// Validate the priority rule before an insert: tables with ternary,
    /// range or optional keys require a non-zero priority.
    fn check_insert(&self, schema: &P4Schema) -> Result<()> {
        if self.table_id.is_empty() || self.is_default_action {
            return Ok(());
        }
        let table = schema.tables().require_name(&self.table_id)?;
        let has_keys = self.r#match.as_ref().is_some_and(|m| !m.is_empty());
        if has_keys && table.requires_priority() && self.priority == 0 {
            return Err(Error::encoding(format!(
                "{:?}: entries in this table require a priority",
                table.alias
            )));
        }
        Ok(())
    }

    pub fn decode_entry(entry: &p4r::TableEntry, schema: &P4Schema) -> Result<Self> {
        if entry.table_id == 0 {
            return Ok(Self::wildcard());
        }
        let table = schema.tables().require_id(entry.table_id)?;

        let r#match = if entry.r#match.is_empty() {
            None
        } else {
            Some(P4TableMatch::decode(&entry.r#match, table)?)
        };
        let action = match &entry.action {
            Some(action) => Some(P4EntryAction::decode(action, schema)?),
            None => None,
        };

        Ok(P4TableEntry {
            table_id: table.alias.clone(),
            r#match,
            action,
            priority: entry.priority,
            meter_config: entry.meter_config.as_ref().map(P4MeterConfig::decode),
            counter_data: entry.counter_data.as_ref().map(P4CounterData::decode),
            meter_counter_data: entry
                .meter_counter_data
                .as_ref()
                .map(P4MeterCounterData::decode),
            is_default_action: entry.is_default_action,
            idle_timeout_ns: entry.idle_timeout_ns,
            time_since_last_hit: entry.time_since_last_hit.as_ref().map(|t| t.elapsed_ns),
            metadata: entry.metadata.clone(),
        })
    }
}

// ~~~~~~~~~~~~~~~~~~~~~~~~~
// R e p l i c a t i o n
// ~~~~~~~~~~~~~~~~~~~~~~~~~

/// A (port, instance) pair for multicast and clone replication.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct P4Replica {
    pub egress_port: u32,
    pub instance: u32,
}

impl P4Replica {
    pub fn new(egress_port: u32) -> Self {
        P4Replica {
            egress_port,
            instance: 0,
        }
    }

    pub fn with_instance(mut self, instance: u32) -> Self {
        self.instance = instance;
        self
    }

    fn encode(&self) -> p4r::Replica {
        p4r::Replica {
            egress_port: self.egress_port,
            instance: self.instance,
        }
    }

    fn decode(msg: &p4r::Replica) -> Self {
        P4Replica {
            egress_port: msg.egress_port,
            instance: msg.instance,
        }
    }
}

impl From<u32> for P4Replica {
    fn from(egress_port: u32) -> Self {
        P4Replica::new(egress_port)
    }
}

impl From<(u32, u32)> for P4Replica {
    fn from((egress_port, instance): (u32, u32)) -> Self {
        P4Replica {
            egress_port,
            instance,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct P4MulticastGroupEntry {
    pub multicast_group_id: u32,
    pub replicas: Vec<P4Replica>,
}

impl P4MulticastGroupEntry {
    pub fn new(multicast_group_id: u32, replicas: impl IntoIterator<Item = impl Into<P4Replica>>) -> Self {
        P4MulticastGroupEntry {
            multicast_group_id,
            replicas: replicas.into_iter().map(Into::into).collect(),
        }
    }

    fn encode(&self) -> p4r::Entity {
        p4r::Entity {
            entity: Some(p4r::entity::Entity::PacketReplicationEngineEntry(
                p4r::PacketReplicationEngineEntry {
                    r#type: Some(
                        p4r::packet_replication_engine_entry::Type::MulticastGroupEntry(
                            p4r::MulticastGroupEntry {
                                multicast_group_id: self.multicast_group_id,
                                replicas: self.replicas.iter().map(|r| r.encode()).collect(),
                            },
                        ),
                    ),
                },
            )),
        }
    }

    fn decode(entry: &p4r::MulticastGroupEntry) -> Self {
        P4MulticastGroupEntry {
            multicast_group_id: entry.multicast_group_id,
            replicas: entry.replicas.iter().map(P4Replica::decode).collect(),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct P4CloneSessionEntry {
    pub session_id: u32,
    pub class_of_service: u32,
    pub packet_length_bytes: i32,
    pub replicas: Vec<P4Replica>,
}

impl P4CloneSessionEntry {
    pub fn new(session_id: u32, replicas: impl IntoIterator<Item = impl Into<P4Replica>>) -> Self {
        P4CloneSessionEntry {
            session_id,
            class_of_service: 0,
            packet_length_bytes: 0,
            replicas: replicas.into_iter().map(Into::into).collect(),
        }
    }

    fn encode(&self) -> p4r::Entity {
        p4r::Entity {
            entity: Some(p4r::entity::Entity::PacketReplicationEngineEntry(
                p4r::PacketReplicationEngineEntry {
                    r#type: Some(p4r::packet_replication_engine_entry::Type::CloneSessionEntry(
                        p4r::CloneSessionEntry {
                            session_id: self.session_id,
                            replicas: self.replicas.iter().map(|r| r.encode()).collect(),
                            class_of_service: self.class_of_service,
                            packet_length_bytes: self.packet_length_bytes,
                        },
                    )),
                },
            )),
        }
    }

    fn decode(entry: &p4r::CloneSessionEntry) -> Self {
        P4CloneSessionEntry {
            session_id: entry.session_id,
            class_of_service: entry.class_of_service,
            packet_length_bytes: entry.packet_length_bytes,
            replicas: entry.replicas.iter().map(P4Replica::decode).collect(),
        }
    }
}

// ~~~~~~~~~~~~~~~~~~~~~~~~~
// P r o f i l e   e n t i t i e s
// ~~~~~~~~~~~~~~~~~~~~~~~~~

#[derive(Clone, Debug, Default, PartialEq)]
pub struct P4ActionProfileMember {
    pub action_profile_id: String,
    pub member_id: u32,
    pub action: Option<P4TableAction>,
}

impl P4ActionProfileMember {
    fn encode(&self, schema: &P4Schema) -> Result<p4r::Entity> {
        let entry = if self.action_profile_id.is_empty() {
            p4r::ActionProfileMember::default()
        } else {
            let profile = schema.action_profiles().require_name(&self.action_profile_id)?;
            let action = match &self.action {
                Some(action) => {
                    let spec = schema.actions().require_name(&action.name)?;
                    Some(action.encode_action(spec)?)
                }
                None => None,
            };
            p4r::ActionProfileMember {
                action_profile_id: profile.id,
                member_id: self.member_id,
                action,
            }
        };
        Ok(p4r::Entity {
            entity: Some(p4r::entity::Entity::ActionProfileMember(entry)),
        })
    }

    fn decode(entry: &p4r::ActionProfileMember, schema: &P4Schema) -> Result<Self> {
        if entry.action_profile_id == 0 {
            return Ok(Self::default());
        }
        let profile = schema.action_profiles().require_id(entry.action_profile_id)?;
        let action = match &entry.action {
            Some(action) => Some(P4TableAction::decode_action(action, schema)?),
            None => None,
        };
        Ok(P4ActionProfileMember {
            action_profile_id: profile.alias.clone(),
            member_id: entry.member_id,
            action,
        })
    }
}

/// Group member reference with weight and optional watch port.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct P4Member {
    pub member_id: u32,
    pub weight: i32,
    pub watch_port: Option<u32>,
}

impl P4Member {
    pub fn new(member_id: u32, weight: i32) -> Self {
        P4Member {
            member_id,
            weight,
            watch_port: None,
        }
    }

    pub fn with_watch_port(mut self, port: u32) -> Self {
        self.watch_port = Some(port);
        self
    }

    fn encode(&self) -> Result<p4r::action_profile_group::Member> {
        let watch_kind = self
            .watch_port
            .map(|port| {
                Ok::<_, Error>(p4r::action_profile_group::member::WatchKind::WatchPort(
                    encode_watch_port(port)?,
                ))
            })
            .transpose()?;
        Ok(p4r::action_profile_group::Member {
            member_id: self.member_id,
            weight: self.weight,
            watch_kind,
        })
    }

    fn decode(msg: &p4r::action_profile_group::Member) -> Result<Self> {
        let watch_port = match &msg.watch_kind {
            Some(p4r::action_profile_group::member::WatchKind::WatchPort(port)) => {
                Some(decode_watch_port(port)?)
            }
            Some(p4r::action_profile_group::member::WatchKind::Watch(_)) => {
                return Err(Error::encoding("deprecated watch field is not supported"))
            }
            None => None,
        };
        Ok(P4Member {
            member_id: msg.member_id,
            weight: msg.weight,
            watch_port,
        })
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct P4ActionProfileGroup {
    pub action_profile_id: String,
    pub group_id: u32,
    pub max_size: i32,
    pub members: Vec<P4Member>,
}

impl P4ActionProfileGroup {
    fn encode(&self, schema: &P4Schema) -> Result<p4r::Entity> {
        let entry = if self.action_profile_id.is_empty() {
            p4r::ActionProfileGroup::default()
        } else {
            let profile = schema.action_profiles().require_name(&self.action_profile_id)?;
            p4r::ActionProfileGroup {
                action_profile_id: profile.id,
                group_id: self.group_id,
                members: self
                    .members
                    .iter()
                    .map(|member| member.encode())
                    .collect::<Result<Vec<_>>>()?,
                max_size: self.max_size,
            }
        };
        Ok(p4r::Entity {
            entity: Some(p4r::entity::Entity::ActionProfileGroup(entry)),
        })
    }

    fn decode(entry: &p4r::ActionProfileGroup, schema: &P4Schema) -> Result<Self> {
        if entry.action_profile_id == 0 {
            return Ok(Self::default());
        }
        let profile = schema.action_profiles().require_id(entry.action_profile_id)?;
        Ok(P4ActionProfileGroup {
            action_profile_id: profile.alias.clone(),
            group_id: entry.group_id,
            max_size: entry.max_size,
            members: entry
                .members
                .iter()
                .map(P4Member::decode)
                .collect::<Result<Vec<_>>>()?,
        })
    }
}

// ~~~~~~~~~~~~~~~~~~~~~~~~~
// R e s o u r c e   e n t i t i e s
// ~~~~~~~~~~~~~~~~~~~~~~~~~

#[derive(Clone, Debug, Default, PartialEq)]
pub struct P4DigestEntry {
    pub digest_id: String,
    pub max_list_size: i32,
    pub max_timeout_ns: i64,
    pub ack_timeout_ns: i64,
}

impl P4DigestEntry {
    pub fn new(digest_id: impl Into<String>) -> Self {
        P4DigestEntry {
            digest_id: digest_id.into(),
            ..Default::default()
        }
    }

    fn encode(&self, schema: &P4Schema) -> Result<p4r::Entity> {
        let entry = if self.digest_id.is_empty() {
            p4r::DigestEntry::default()
        } else {
            let digest = schema.digests().require_name(&self.digest_id)?;
            let config = if self.max_list_size == 0
                && self.max_timeout_ns == 0
                && self.ack_timeout_ns == 0
            {
                None
            } else {
                Some(p4r::digest_entry::Config {
                    max_timeout_ns: self.max_timeout_ns,
                    max_list_size: self.max_list_size,
                    ack_timeout_ns: self.ack_timeout_ns,
                })
            };
            p4r::DigestEntry {
                digest_id: digest.id,
                config,
            }
        };
        Ok(p4r::Entity {
            entity: Some(p4r::entity::Entity::DigestEntry(entry)),
        })
    }

    fn decode(entry: &p4r::DigestEntry, schema: &P4Schema) -> Result<Self> {
        if entry.digest_id == 0 {
            return Ok(Self::default());
        }
        let digest = schema.digests().require_id(entry.digest_id)?;
        let config = entry.config.unwrap_or_default();
        Ok(P4DigestEntry {
            digest_id: digest.alias.clone(),
            max_list_size: config.max_list_size,
            max_timeout_ns: config.max_timeout_ns,
            ack_timeout_ns: config.ack_timeout_ns,
        })
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct P4RegisterEntry {
    pub register_id: String,
    pub index: Option<i64>,
    pub data: Option<P4Value>,
}

impl P4RegisterEntry {
    fn encode(&self, schema: &P4Schema) -> Result<p4r::Entity> {
        let entry = if self.register_id.is_empty() {
            p4r::RegisterEntry::default()
        } else {
            let register = schema.registers().require_name(&self.register_id)?;
            let data = match &self.data {
                Some(value) => Some(register.type_spec.encode_data(value)?),
                None => None,
            };
            p4r::RegisterEntry {
                register_id: register.id,
                index: self.index.map(|index| p4r::Index { index }),
                data,
            }
        };
        Ok(p4r::Entity {
            entity: Some(p4r::entity::Entity::RegisterEntry(entry)),
        })
    }

    fn decode(entry: &p4r::RegisterEntry, schema: &P4Schema) -> Result<Self> {
        if entry.register_id == 0 {
            return Ok(Self::default());
        }
        let register = schema.registers().require_id(entry.register_id)?;
        let data = match &entry.data {
            Some(data) => Some(register.type_spec.decode_data(data)?),
            None => None,
        };
        Ok(P4RegisterEntry {
            register_id: register.alias.clone(),
            index: entry.index.as_ref().map(|i| i.index),
            data,
        })
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct P4CounterEntry {
    pub counter_id: String,
    pub index: Option<i64>,
    pub data: Option<P4CounterData>,
}

impl P4CounterEntry {
    fn encode(&self, schema: &P4Schema) -> Result<p4r::Entity> {
        let entry = if self.counter_id.is_empty() {
            p4r::CounterEntry::default()
        } else {
            let counter = schema.counters().require_name(&self.counter_id)?;
            p4r::CounterEntry {
                counter_id: counter.id,
                index: self.index.map(|index| p4r::Index { index }),
                data: self.data.as_ref().map(|d| d.encode()),
            }
        };
        Ok(p4r::Entity {
            entity: Some(p4r::entity::Entity::CounterEntry(entry)),
        })
    }

    fn decode(entry: &p4r::CounterEntry, schema: &P4Schema) -> Result<Self> {
        if entry.counter_id == 0 {
            return Ok(Self::default());
        }
        let counter = schema.counters().require_id(entry.counter_id)?;
        Ok(P4CounterEntry {
            counter_id: counter.alias.clone(),
            index: entry.index.as_ref().map(|i| i.index),
            data: entry.data.as_ref().map(P4CounterData::decode),
        })
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct P4DirectCounterEntry {
    pub counter_id: String,
    pub table_entry: Option<P4TableEntry>,
    pub data: Option<P4CounterData>,
}

impl P4DirectCounterEntry {
    fn encode(&self, schema: &P4Schema) -> Result<p4r::Entity> {
        // Without an explicit table entry, derive one from the counter's
        // direct table so `counter_id` alone reads the whole table.
        let table_entry = match &self.table_entry {
            Some(entry) => entry.clone(),
            None if !self.counter_id.is_empty() => {
                let counter = schema.direct_counters().require_name(&self.counter_id)?;
                P4TableEntry::new(counter.direct_table_name())
            }
            None => P4TableEntry::wildcard(),
        };
        Ok(p4r::Entity {
            entity: Some(p4r::entity::Entity::DirectCounterEntry(
                p4r::DirectCounterEntry {
                    table_entry: Some(table_entry.encode_entry(schema)?),
                    data: self.data.as_ref().map(|d| d.encode()),
                },
            )),
        })
    }

    fn decode(entry: &p4r::DirectCounterEntry, schema: &P4Schema) -> Result<Self> {
        let table_entry = match &entry.table_entry {
            Some(entry) => Some(P4TableEntry::decode_entry(entry, schema)?),
            None => None,
        };
        let counter_id = match &table_entry {
            Some(entry) if !entry.table_id.is_empty() => schema
                .tables()
                .require_name(&entry.table_id)?
                .direct_counter
                .as_ref()
                .map(|counter| counter.alias.clone())
                .unwrap_or_default(),
            _ => String::new(),
        };
        Ok(P4DirectCounterEntry {
            counter_id,
            table_entry,
            data: entry.data.as_ref().map(P4CounterData::decode),
        })
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct P4MeterEntry {
    pub meter_id: String,
    pub index: Option<i64>,
    pub config: Option<P4MeterConfig>,
    pub counter_data: Option<P4MeterCounterData>,
}

impl P4MeterEntry {
    fn encode(&self, schema: &P4Schema) -> Result<p4r::Entity> {
        let entry = if self.meter_id.is_empty() {
            p4r::MeterEntry::default()
        } else {
            let meter = schema.meters().require_name(&self.meter_id)?;
            p4r::MeterEntry {
                meter_id: meter.id,
                index: self.index.map(|index| p4r::Index { index }),
                config: self.config.as_ref().map(|c| c.encode()),
                counter_data: self.counter_data.as_ref().map(|c| c.encode()),
            }
        };
        Ok(p4r::Entity {
            entity: Some(p4r::entity::Entity::MeterEntry(entry)),
        })
    }

    fn decode(entry: &p4r::MeterEntry, schema: &P4Schema) -> Result<Self> {
        if entry.meter_id == 0 {
            return Ok(Self::default());
        }
        let meter = schema.meters().require_id(entry.meter_id)?;
        Ok(P4MeterEntry {
            meter_id: meter.alias.clone(),
            index: entry.index.as_ref().map(|i| i.index),
            config: entry.config.as_ref().map(P4MeterConfig::decode),
            counter_data: entry.counter_data.as_ref().map(P4MeterCounterData::decode),
        })
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct P4DirectMeterEntry {
    pub table_entry: Option<P4TableEntry>,
    pub config: Option<P4MeterConfig>,
    pub counter_data: Option<P4MeterCounterData>,
}

impl P4DirectMeterEntry {
    fn encode(&self, schema: &P4Schema) -> Result<p4r::Entity> {
        let table_entry = match &self.table_entry {
            Some(entry) => Some(entry.encode_entry(schema)?),
            None => None,
        };
        Ok(p4r::Entity {
            entity: Some(p4r::entity::Entity::DirectMeterEntry(p4r::DirectMeterEntry {
                table_entry,
                config: self.config.as_ref().map(|c| c.encode()),
                counter_data: self.counter_data.as_ref().map(|c| c.encode()),
            })),
        })
    }

    fn decode(entry: &p4r::DirectMeterEntry, schema: &P4Schema) -> Result<Self> {
        let table_entry = match &entry.table_entry {
            Some(entry) => Some(P4TableEntry::decode_entry(entry, schema)?),
            None => None,
        };
        Ok(P4DirectMeterEntry {
            table_entry,
            config: entry.config.as_ref().map(P4MeterConfig::decode),
            counter_data: entry.counter_data.as_ref().map(P4MeterCounterData::decode),
        })
    }
}

/// One member of a value set: named field values like a table match.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct P4ValueSetMember(pub BTreeMap<String, P4Value>);

impl P4ValueSetMember {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn field(mut self, name: impl Into<String>, value: impl Into<P4Value>) -> Self {
        self.0.insert(name.into(), value.into());
        self
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct P4ValueSetEntry {
    pub value_set_id: String,
    pub members: Vec<P4ValueSetMember>,
}

impl P4ValueSetEntry {
    fn encode(&self, schema: &P4Schema) -> Result<p4r::Entity> {
        let value_set = schema.value_sets().require_name(&self.value_set_id)?;
        let mut members = Vec::with_capacity(self.members.len());
        for member in &self.members {
            let mut fields = Vec::with_capacity(member.0.len());
            for (name, value) in &member.0 {
                let spec = value_set.r#match.require_name(name).map_err(|err| {
                    Error::schema(format!("{:?}: {}", value_set.alias, err))
                })?;
                if let Some(encoded) = spec.encode_field(value)? {
                    fields.push(encoded);
                }
            }
            fields.sort_by_key(|field| field.field_id);
            members.push(p4r::ValueSetMember { r#match: fields });
        }
        Ok(p4r::Entity {
            entity: Some(p4r::entity::Entity::ValueSetEntry(p4r::ValueSetEntry {
                value_set_id: value_set.id,
                members,
            })),
        })
    }

    fn decode(entry: &p4r::ValueSetEntry, schema: &P4Schema) -> Result<Self> {
        let value_set = schema.value_sets().require_id(entry.value_set_id)?;
        let mut members = Vec::with_capacity(entry.members.len());
        for member in &entry.members {
            let mut fields = BTreeMap::new();
            for field in &member.r#match {
                let spec = value_set.r#match.require_id(field.field_id)?;
                fields.insert(spec.alias.clone(), spec.decode_field(field)?);
            }
            members.push(P4ValueSetMember(fields));
        }
        Ok(P4ValueSetEntry {
            value_set_id: value_set.alias.clone(),
            members,
        })
    }
}

/// An architecture-specific extern entry; the payload stays opaque.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct P4ExternEntry {
    pub extern_type_id: u32,
    pub extern_id: u32,
    pub entry: Option<prost_types::Any>,
}

impl P4ExternEntry {
    fn encode(&self) -> p4r::Entity {
        p4r::Entity {
            entity: Some(p4r::entity::Entity::ExternEntry(p4r::ExternEntry {
                extern_type_id: self.extern_type_id,
                extern_id: self.extern_id,
                entry: self.entry.clone(),
            })),
        }
    }

    fn decode(entry: &p4r::ExternEntry) -> Self {
        P4ExternEntry {
            extern_type_id: entry.extern_type_id,
            extern_id: entry.extern_id,
            entry: entry.entry.clone(),
        }
    }
}

// ~~~~~~~~~~~~~
// E n t i t y
// ~~~~~~~~~~~~~

/// Any read/write entity.
#[derive(Clone, Debug, PartialEq)]
pub enum P4Entity {
    TableEntry(P4TableEntry),
    ActionProfileMember(P4ActionProfileMember),
    ActionProfileGroup(P4ActionProfileGroup),
    MulticastGroupEntry(P4MulticastGroupEntry),
    CloneSessionEntry(P4CloneSessionEntry),
    DigestEntry(P4DigestEntry),
    RegisterEntry(P4RegisterEntry),
    CounterEntry(P4CounterEntry),
    DirectCounterEntry(P4DirectCounterEntry),
    MeterEntry(P4MeterEntry),
    DirectMeterEntry(P4DirectMeterEntry),
    ValueSetEntry(P4ValueSetEntry),
    ExternEntry(P4ExternEntry),
}

macro_rules! entity_from {
    ($variant:ident, $type:ty) => {
        impl From<$type> for P4Entity {
            fn from(entity: $type) -> Self {
                P4Entity::$variant(entity)
            }
        }
    };
}

entity_from!(TableEntry, P4TableEntry);
entity_from!(ActionProfileMember, P4ActionProfileMember);
entity_from!(ActionProfileGroup, P4ActionProfileGroup);
entity_from!(MulticastGroupEntry, P4MulticastGroupEntry);
entity_from!(CloneSessionEntry, P4CloneSessionEntry);
entity_from!(DigestEntry, P4DigestEntry);
entity_from!(RegisterEntry, P4RegisterEntry);
entity_from!(CounterEntry, P4CounterEntry);
entity_from!(DirectCounterEntry, P4DirectCounterEntry);
entity_from!(MeterEntry, P4MeterEntry);
entity_from!(DirectMeterEntry, P4DirectMeterEntry);
entity_from!(ValueSetEntry, P4ValueSetEntry);
entity_from!(ExternEntry, P4ExternEntry);

impl P4Entity {
    pub fn kind(&self) -> &'static str {
        match self {
            P4Entity::TableEntry(_) => "table entry",
            P4Entity::ActionProfileMember(_) => "action profile member",
            P4Entity::ActionProfileGroup(_) => "action profile group",
            P4Entity::MulticastGroupEntry(_) => "multicast group entry",
            P4Entity::CloneSessionEntry(_) => "clone session entry",
            P4Entity::DigestEntry(_) => "digest entry",
            P4Entity::RegisterEntry(_) => "register entry",
            P4Entity::CounterEntry(_) => "counter entry",
            P4Entity::DirectCounterEntry(_) => "direct counter entry",
            P4Entity::MeterEntry(_) => "meter entry",
            P4Entity::DirectMeterEntry(_) => "direct meter entry",
            P4Entity::ValueSetEntry(_) => "value set entry",
            P4Entity::ExternEntry(_) => "extern entry",
        }
    }

    /// Entities whose wire semantics only admit MODIFY.
    pub fn is_modify_only(&self) -> bool {
        matches!(
            self,
            P4Entity::RegisterEntry(_)
                | P4Entity::CounterEntry(_)
                | P4Entity::DirectCounterEntry(_)
                | P4Entity::MeterEntry(_)
                | P4Entity::DirectMeterEntry(_)
                | P4Entity::ValueSetEntry(_)
                | P4Entity::ExternEntry(_)
        )
    }

    pub fn encode(&self, schema: &P4Schema) -> Result<p4r::Entity> {
        match self {
            P4Entity::TableEntry(entry) => Ok(p4r::Entity {
                entity: Some(p4r::entity::Entity::TableEntry(entry.encode_entry(schema)?)),
            }),
            P4Entity::ActionProfileMember(entry) => entry.encode(schema),
            P4Entity::ActionProfileGroup(entry) => entry.encode(schema),
            P4Entity::MulticastGroupEntry(entry) => Ok(entry.encode()),
            P4Entity::CloneSessionEntry(entry) => Ok(entry.encode()),
            P4Entity::DigestEntry(entry) => entry.encode(schema),
            P4Entity::RegisterEntry(entry) => entry.encode(schema),
            P4Entity::CounterEntry(entry) => entry.encode(schema),
            P4Entity::DirectCounterEntry(entry) => entry.encode(schema),
            P4Entity::MeterEntry(entry) => entry.encode(schema),
            P4Entity::DirectMeterEntry(entry) => entry.encode(schema),
            P4Entity::ValueSetEntry(entry) => entry.encode(schema),
            P4Entity::ExternEntry(entry) => Ok(entry.encode()),
        }
    }

    /// Pre-write validation that depends on the op (e.g. priority on insert).
    pub fn check_op(&self, op: P4UpdateType, schema: &P4Schema) -> Result<()> {
        if let (P4UpdateType::Insert, P4Entity::TableEntry(entry)) = (op, self) {
            entry.check_insert(schema)?;
        }
        Ok(())
    }
}

/// Decode a wire entity into its typed form.
pub fn decode_entity(msg: &p4r::Entity, schema: &P4Schema) -> Result<P4Entity> {
    use p4r::entity::Entity as Wire;

    match msg
        .entity
        .as_ref()
        .ok_or_else(|| Error::encoding("missing entity"))?
    {
        Wire::TableEntry(entry) => Ok(P4Entity::TableEntry(P4TableEntry::decode_entry(
            entry, schema,
        )?)),
        Wire::ActionProfileMember(entry) => Ok(P4Entity::ActionProfileMember(
            P4ActionProfileMember::decode(entry, schema)?,
        )),
        Wire::ActionProfileGroup(entry) => Ok(P4Entity::ActionProfileGroup(
            P4ActionProfileGroup::decode(entry, schema)?,
        )),
        Wire::PacketReplicationEngineEntry(entry) => match entry
            .r#type
            .as_ref()
            .ok_or_else(|| Error::encoding("missing packet replication type"))?
        {
            p4r::packet_replication_engine_entry::Type::MulticastGroupEntry(entry) => Ok(
                P4Entity::MulticastGroupEntry(P4MulticastGroupEntry::decode(entry)),
            ),
            p4r::packet_replication_engine_entry::Type::CloneSessionEntry(entry) => Ok(
                P4Entity::CloneSessionEntry(P4CloneSessionEntry::decode(entry)),
            ),
        },
        Wire::DigestEntry(entry) => Ok(P4Entity::DigestEntry(P4DigestEntry::decode(
            entry, schema,
        )?)),
        Wire::RegisterEntry(entry) => Ok(P4Entity::RegisterEntry(P4RegisterEntry::decode(
            entry, schema,
        )?)),
        Wire::CounterEntry(entry) => Ok(P4Entity::CounterEntry(P4CounterEntry::decode(
            entry, schema,
        )?)),
        Wire::DirectCounterEntry(entry) => Ok(P4Entity::DirectCounterEntry(
            P4DirectCounterEntry::decode(entry, schema)?,
        )),
        Wire::MeterEntry(entry) => Ok(P4Entity::MeterEntry(P4MeterEntry::decode(entry, schema)?)),
        Wire::DirectMeterEntry(entry) => Ok(P4Entity::DirectMeterEntry(
            P4DirectMeterEntry::decode(entry, schema)?,
        )),
        Wire::ValueSetEntry(entry) => Ok(P4Entity::ValueSetEntry(P4ValueSetEntry::decode(
            entry, schema,
        )?)),
        Wire::ExternEntry(entry) => Ok(P4Entity::ExternEntry(P4ExternEntry::decode(entry))),
    }
}

// ~~~~~~~~~~~~~~~~~~~
// S t r e a m   I / O
// ~~~~~~~~~~~~~~~~~~~

/// Packet received from the device.
#[derive(Clone, Debug, PartialEq)]
pub struct P4PacketIn {
    pub payload: Vec<u8>,
    pub metadata: BTreeMap<String, P4Value>,
}

impl P4PacketIn {
    pub fn decode(packet: &p4r::PacketIn, schema: &P4Schema) -> Result<Self> {
        let metadata = match schema.controller_packet_metadata().get_name("packet_in") {
            Some(cpm) => cpm.decode(&packet.metadata)?,
            None => {
                if !packet.metadata.is_empty() {
                    log::warn!("packet-in carries metadata but schema has no packet_in");
                }
                BTreeMap::new()
            }
        };
        Ok(P4PacketIn {
            payload: packet.payload.clone(),
            metadata,
        })
    }

    pub fn get(&self, name: &str) -> Option<&P4Value> {
        self.metadata.get(name)
    }
}

/// Packet to send to the device.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct P4PacketOut {
    pub payload: Vec<u8>,
    pub metadata: BTreeMap<String, P4Value>,
}

impl P4PacketOut {
    pub fn new(payload: impl Into<Vec<u8>>) -> Self {
        P4PacketOut {
            payload: payload.into(),
            metadata: BTreeMap::new(),
        }
    }

    pub fn metadata(mut self, name: impl Into<String>, value: impl Into<P4Value>) -> Self {
        self.metadata.insert(name.into(), value.into());
        self
    }

    pub fn encode(&self, schema: &P4Schema) -> Result<p4r::StreamMessageRequest> {
        let cpm = schema
            .controller_packet_metadata()
            .require_name("packet_out")?;
        Ok(p4r::StreamMessageRequest {
            update: Some(p4r::stream_message_request::Update::Packet(p4r::PacketOut {
                payload: self.payload.clone(),
                metadata: cpm.encode(&self.metadata)?,
            })),
        })
    }
}

/// Digest list received from the device; items decode against the digest's
/// declared struct type.
#[derive(Clone, Debug, PartialEq)]
pub struct P4DigestList {
    pub digest_id: String,
    pub list_id: u64,
    pub timestamp: i64,
    pub data: Vec<P4Value>,
}

impl P4DigestList {
    pub fn decode(list: &p4r::DigestList, schema: &P4Schema) -> Result<Self> {
        let digest = schema.digests().require_id(list.digest_id)?;
        Ok(P4DigestList {
            digest_id: digest.alias.clone(),
            list_id: list.list_id,
            timestamp: list.timestamp,
            data: list
                .data
                .iter()
                .map(|item| digest.type_spec.decode_data(item))
                .collect::<Result<Vec<_>>>()?,
        })
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &P4Value> {
        self.data.iter()
    }

    /// The matching acknowledgment message.
    pub fn ack(&self) -> P4DigestListAck {
        P4DigestListAck {
            digest_id: self.digest_id.clone(),
            list_id: self.list_id,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct P4DigestListAck {
    pub digest_id: String,
    pub list_id: u64,
}

impl P4DigestListAck {
    pub fn encode(&self, schema: &P4Schema) -> Result<p4r::StreamMessageRequest> {
        let digest = schema.digests().require_name(&self.digest_id)?;
        Ok(p4r::StreamMessageRequest {
            update: Some(p4r::stream_message_request::Update::DigestAck(
                p4r::DigestListAck {
                    digest_id: digest.id,
                    list_id: self.list_id,
                },
            )),
        })
    }
}

/// Notification that table entries idled out.
#[derive(Clone, Debug, PartialEq)]
pub struct P4IdleTimeoutNotification {
    pub timestamp: i64,
    pub table_entries: Vec<P4TableEntry>,
}

impl P4IdleTimeoutNotification {
    pub fn decode(msg: &p4r::IdleTimeoutNotification, schema: &P4Schema) -> Result<Self> {
        Ok(P4IdleTimeoutNotification {
            timestamp: msg.timestamp,
            table_entries: msg
                .table_entry
                .iter()
                .map(|entry| P4TableEntry::decode_entry(entry, schema))
                .collect::<Result<Vec<_>>>()?,
        })
    }

    pub fn len(&self) -> usize {
        self.table_entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table_entries.is_empty()
    }
}

/// One item the switch can carry in a Write call: a real update or an
/// auxiliary stream message flushed before the WriteRequest.
#[derive(Clone, Debug, PartialEq)]
pub enum P4WriteOp {
    Update(P4Update),
    PacketOut(P4PacketOut),
    DigestAck(P4DigestListAck),
}

impl From<P4Update> for P4WriteOp {
    fn from(update: P4Update) -> Self {
        P4WriteOp::Update(update)
    }
}

impl From<P4PacketOut> for P4WriteOp {
    fn from(packet: P4PacketOut) -> Self {
        P4WriteOp::PacketOut(packet)
    }
}

impl From<P4DigestListAck> for P4WriteOp {
    fn from(ack: P4DigestListAck) -> Self {
        P4WriteOp::DigestAck(ack)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testlib;

    fn schema() -> P4Schema {
        testlib::schema()
    }

    #[test]
    fn single_insert_literal_wire_form() {
        // l2_exact_table: dst_addr=00:00:00:00:00:01 -> set_egress_port(1)
        let schema = schema();
        let entry = P4TableEntry::new("l2_exact_table")
            .with_match(P4TableMatch::new().field("dst_addr", "00:00:00:00:00:01"))
            .with_action(P4TableAction::new("set_egress_port").param("port_num", 1u32));

        let update = insert(entry).encode(&schema).unwrap();
        assert_eq!(update.r#type, p4r::update::Type::Insert as i32);

        let Some(p4r::entity::Entity::TableEntry(wire)) =
            update.entity.as_ref().unwrap().entity.as_ref()
        else {
            panic!("expected table entry");
        };
        assert_eq!(wire.table_id, testlib::L2_EXACT_TABLE_ID);
        assert_eq!(wire.r#match.len(), 1);
        assert_eq!(wire.r#match[0].field_id, 1);
        assert_eq!(
            wire.r#match[0].field_match_type,
            Some(p4r::field_match::FieldMatchType::Exact(
                p4r::field_match::Exact { value: vec![0x01] }
            ))
        );

        let Some(p4r::table_action::Type::Action(action)) =
            wire.action.as_ref().unwrap().r#type.as_ref()
        else {
            panic!("expected direct action");
        };
        assert_eq!(action.action_id, testlib::SET_EGRESS_PORT_ID);
        assert_eq!(action.params.len(), 1);
        assert_eq!(action.params[0].param_id, 1);
        assert_eq!(action.params[0].value, vec![0x01]);
    }

    #[test]
    fn indirect_one_shot_literal_wire_form() {
        // routing_v6_table: 2000:1234::/64 -> [1*set_next_hop(...01),
        // 2*set_next_hop(...02)]
        let schema = schema();
        let entry = P4TableEntry::new("routing_v6_table")
            .with_match(P4TableMatch::new().field("dst_addr", "2000:1234::/64"))
            .with_action(P4IndirectAction::ActionSet(vec![
                P4TableAction::new("set_next_hop")
                    .param("dmac", "00:00:00:00:00:01")
                    .weight(1),
                P4TableAction::new("set_next_hop")
                    .param("dmac", "00:00:00:00:00:02")
                    .weight(2),
            ]));

        let wire = entry.encode_entry(&schema).unwrap();
        let Some(p4r::field_match::FieldMatchType::Lpm(lpm)) =
            wire.r#match[0].field_match_type.as_ref()
        else {
            panic!("expected LPM match");
        };
        assert_eq!(lpm.prefix_len, 64);
        assert_eq!(
            lpm.value,
            vec![0x20, 0x00, 0x12, 0x34, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0x01]
        );

        let Some(p4r::table_action::Type::ActionProfileActionSet(set)) =
            wire.action.as_ref().unwrap().r#type.as_ref()
        else {
            panic!("expected one-shot action set");
        };
        assert_eq!(set.action_profile_actions.len(), 2);
        assert_eq!(set.action_profile_actions[0].weight, 1);
        assert_eq!(set.action_profile_actions[1].weight, 2);
    }

    #[test]
    fn plain_action_promotes_to_one_shot_on_indirect_table() {
        let schema = schema();
        let direct = P4TableEntry::new("routing_v6_table")
            .with_match(P4TableMatch::new().field("dst_addr", "2000:1234::/64"))
            .with_action(
                P4TableAction::new("set_next_hop").param("dmac", "00:00:00:00:00:01"),
            )
            .encode_entry(&schema)
            .unwrap();

        let explicit = P4TableEntry::new("routing_v6_table")
            .with_match(P4TableMatch::new().field("dst_addr", "2000:1234::/64"))
            .with_action(P4IndirectAction::ActionSet(vec![P4TableAction::new(
                "set_next_hop",
            )
            .param("dmac", "00:00:00:00:00:01")
            .weight(1)]))
            .encode_entry(&schema)
            .unwrap();

        assert_eq!(direct, explicit);
    }

    #[test]
    fn one_shot_with_watch_port() {
        let schema = schema();
        let entry = P4TableEntry::new("routing_v6_table")
            .with_match(P4TableMatch::new().field("dst_addr", "2000:1234::/64"))
            .with_action(P4IndirectAction::ActionSet(vec![P4TableAction::new(
                "set_next_hop",
            )
            .param("dmac", 2u64)
            .weight(3)
            .with_watch_port(7)]));

        let wire = entry.encode_entry(&schema).unwrap();
        let Some(p4r::table_action::Type::ActionProfileActionSet(set)) =
            wire.action.as_ref().unwrap().r#type.as_ref()
        else {
            panic!("expected action set");
        };
        assert_eq!(
            set.action_profile_actions[0].watch_kind,
            Some(p4r::action_profile_action::WatchKind::WatchPort(vec![0x07]))
        );
    }

    #[test]
    fn multicast_replicas_literal_scenario() {
        let schema = schema();
        let entry = P4MulticastGroupEntry::new(1, [(2u32, 1u32), (2, 2), (2, 3)]);
        let update = modify(entry).encode(&schema).unwrap();
        assert_eq!(update.r#type, p4r::update::Type::Modify as i32);

        let Some(p4r::entity::Entity::PacketReplicationEngineEntry(pre)) =
            update.entity.as_ref().unwrap().entity.as_ref()
        else {
            panic!("expected PRE entry");
        };
        let Some(p4r::packet_replication_engine_entry::Type::MulticastGroupEntry(group)) =
            pre.r#type.as_ref()
        else {
            panic!("expected multicast entry");
        };
        assert_eq!(group.multicast_group_id, 1);
        let replicas: Vec<(u32, u32)> = group
            .replicas
            .iter()
            .map(|r| (r.egress_port, r.instance))
            .collect();
        assert_eq!(replicas, vec![(2, 1), (2, 2), (2, 3)]);
    }

    #[test]
    fn replica_instance_defaults_to_zero() {
        let schema = schema();
        let entry = P4MulticastGroupEntry::new(1, [5u32]);
        let wire = modify(entry).encode(&schema).unwrap();
        let Some(p4r::entity::Entity::PacketReplicationEngineEntry(pre)) =
            wire.entity.as_ref().unwrap().entity.as_ref()
        else {
            panic!();
        };
        let Some(p4r::packet_replication_engine_entry::Type::MulticastGroupEntry(group)) =
            pre.r#type.as_ref()
        else {
            panic!();
        };
        assert_eq!(group.replicas[0].instance, 0);
    }

    #[test]
    fn packet_out_missing_metadata() {
        let schema = schema();
        let err = P4PacketOut::new(b"abc".to_vec())
            .metadata("egress_port", 1u32)
            .encode(&schema)
            .unwrap_err();
        assert!(
            err.to_string().contains("missing parameter 'magic_val'"),
            "unexpected message: {}",
            err
        );
    }

    #[test]
    fn packet_out_round_trip() {
        let schema = schema();
        let msg = P4PacketOut::new(b"abc".to_vec())
            .metadata("magic_val", 0xcafeu32)
            .metadata("egress_port", 1u32)
            .encode(&schema)
            .unwrap();
        let Some(p4r::stream_message_request::Update::Packet(packet)) = msg.update else {
            panic!("expected packet");
        };
        assert_eq!(packet.payload, b"abc");
        // Declared order: magic_val (id 1) then egress_port (id 2).
        assert_eq!(packet.metadata[0].metadata_id, 1);
        assert_eq!(packet.metadata[0].value, vec![0xca, 0xfe]);
        assert_eq!(packet.metadata[1].metadata_id, 2);
    }

    #[test]
    fn update_tagging_laws() {
        let schema = schema();
        let entity = P4TableEntry::new("l2_exact_table")
            .with_match(P4TableMatch::new().field("dst_addr", 1u64))
            .with_action(P4TableAction::new("set_egress_port").param("port_num", 1u32));

        let base = P4Entity::from(entity.clone()).encode(&schema).unwrap();
        for (update, wire_op) in [
            (insert(entity.clone()), p4r::update::Type::Insert),
            (modify(entity.clone()), p4r::update::Type::Modify),
            (delete(entity.clone()), p4r::update::Type::Delete),
        ] {
            let wire = update.encode(&schema).unwrap();
            assert_eq!(wire.r#type, wire_op as i32);
            assert_eq!(wire.entity, Some(base.clone()));
        }
    }

    #[test]
    fn modify_only_entities_reject_insert_and_delete() {
        let schema = schema();
        let entry = P4RegisterEntry {
            register_id: "mode_reg".to_string(),
            index: Some(0),
            data: Some(P4Value::Str("MODE_A".to_string())),
        };
        assert!(insert(entry.clone()).encode(&schema).is_err());
        assert!(delete(entry.clone()).encode(&schema).is_err());
        assert!(modify(entry).encode(&schema).is_ok());
    }

    #[test]
    fn unknown_names_fail_at_encode_time() {
        let schema = schema();
        let entry = P4TableEntry::new("no_such_table");
        assert!(entry.encode_entry(&schema).is_err());

        let entry = P4TableEntry::new("l2_exact_table")
            .with_match(P4TableMatch::new().field("no_such_field", 1u64));
        assert!(entry.encode_entry(&schema).is_err());

        let entry = P4TableEntry::new("l2_exact_table")
            .with_action(P4TableAction::new("set_egress_port").param("bogus", 1u64));
        assert!(entry.encode_entry(&schema).is_err());
    }

    #[test]
    fn missing_action_parameters_are_reported() {
        let schema = schema();
        let err = P4TableEntry::new("acl_table")
            .with_match(P4TableMatch::new().field("ipv4_src", "10.0.0.0/8"))
            .with_priority(10)
            .with_action(P4TableAction::new("acl_mirror").param("port", 1u32))
            .encode_entry(&schema)
            .unwrap_err();
        assert!(err.to_string().contains("missing parameters"));
        assert!(err.to_string().contains("session_id"));
    }

    #[test]
    fn zero_argument_action_is_a_wildcard() {
        let schema = schema();
        // acl_mirror takes parameters; with no args bound this is a
        // wildcard reference used by read requests.
        let entry = P4TableEntry::new("acl_table")
            .with_action(P4TableAction::new("acl_mirror"))
            .encode_entry(&schema)
            .unwrap();
        let Some(p4r::table_action::Type::Action(action)) =
            entry.action.as_ref().unwrap().r#type.as_ref()
        else {
            panic!();
        };
        assert!(action.params.is_empty());
    }

    #[test]
    fn priority_required_for_ternary_tables() {
        let schema = schema();
        let entry = P4TableEntry::new("acl_table")
            .with_match(P4TableMatch::new().field("ipv4_src", "10.0.0.0/8"))
            .with_action(
                P4TableAction::new("acl_mirror")
                    .param("port", 1u32)
                    .param("session_id", 7u32),
            );
        let err = insert(entry.clone()).encode(&schema).unwrap_err();
        assert!(err.to_string().contains("priority"));
        assert!(insert(entry.with_priority(10)).encode(&schema).is_ok());
    }

    #[test]
    fn entity_round_trips() {
        let schema = schema();
        let entities: Vec<P4Entity> = vec![
            P4TableEntry::new("l2_exact_table")
                .with_match(P4TableMatch::new().field("dst_addr", 0x0a_0b_0cu64))
                .with_action(P4TableAction::new("set_egress_port").param("port_num", 5u32))
                .into(),
            P4MulticastGroupEntry::new(7, [(1u32, 1u32), (2, 1)]).into(),
            P4CloneSessionEntry::new(9, [3u32]).into(),
            P4DigestEntry {
                digest_id: "digest_t".to_string(),
                max_list_size: 10,
                max_timeout_ns: 1_000,
                ack_timeout_ns: 2_000,
            }
            .into(),
            P4RegisterEntry {
                register_id: "mode_reg".to_string(),
                index: Some(3),
                data: Some(P4Value::Str("MODE_B".to_string())),
            }
            .into(),
            P4CounterEntry {
                counter_id: "pkt_counter".to_string(),
                index: Some(1),
                data: Some(P4CounterData {
                    byte_count: 100,
                    packet_count: 2,
                }),
            }
            .into(),
            P4MeterEntry {
                meter_id: "rate_meter".to_string(),
                index: Some(0),
                config: Some(P4MeterConfig {
                    cir: 1,
                    cburst: 2,
                    pir: 3,
                    pburst: 4,
                }),
                counter_data: None,
            }
            .into(),
            P4ActionProfileMember {
                action_profile_id: "next_hop_profile".to_string(),
                member_id: 11,
                action: Some(P4TableAction::new("set_next_hop").param("dmac", 0xbeefu64)),
            }
            .into(),
            P4ActionProfileGroup {
                action_profile_id: "next_hop_profile".to_string(),
                group_id: 4,
                max_size: 16,
                members: vec![
                    P4Member::new(11, 1),
                    P4Member::new(12, 2).with_watch_port(3),
                ],
            }
            .into(),
            P4ValueSetEntry {
                value_set_id: "pvs".to_string(),
                members: vec![P4ValueSetMember::new().field("", 0x0800u32)],
            }
            .into(),
        ];

        for entity in entities {
            let wire = entity.encode(&schema).unwrap();
            let decoded = decode_entity(&wire, &schema).unwrap();
            let rewire = decoded.encode(&schema).unwrap();
            assert_eq!(wire, rewire, "round trip failed for {}", entity.kind());
        }
    }

    #[test]
    fn digest_list_decode_and_ack() {
        let schema = schema();
        let digest = schema.digests().require_name("digest_t").unwrap();

        let item = digest
            .type_spec
            .encode_data(&P4Value::map([
                ("addr", P4Value::Int(0x112233445566)),
                ("port", P4Value::Int(3)),
            ]))
            .unwrap();
        let wire = p4r::DigestList {
            digest_id: digest.id,
            list_id: 77,
            data: vec![item],
            timestamp: 123_456,
        };

        let list = P4DigestList::decode(&wire, &schema).unwrap();
        assert_eq!(list.digest_id, "digest_t");
        assert_eq!(list.len(), 1);
        let P4Value::Map(fields) = &list.data[0] else {
            panic!("digest items decode as structs");
        };
        assert_eq!(fields["port"], P4Value::Int(3));

        let ack = list.ack().encode(&schema).unwrap();
        let Some(p4r::stream_message_request::Update::DigestAck(ack)) = ack.update else {
            panic!("expected digest ack");
        };
        assert_eq!(ack.digest_id, digest.id);
        assert_eq!(ack.list_id, 77);
    }

    #[test]
    fn direct_counter_entry_from_counter_id() {
        let schema = schema();
        let entry = P4DirectCounterEntry {
            counter_id: "l2_counter".to_string(),
            table_entry: None,
            data: None,
        };
        let wire = entry.encode(&schema).unwrap();
        let Some(p4r::entity::Entity::DirectCounterEntry(wire)) = wire.entity.as_ref() else {
            panic!();
        };
        // The synthesized table entry names the counter's direct table.
        assert_eq!(
            wire.table_entry.as_ref().unwrap().table_id,
            testlib::L2_EXACT_TABLE_ID
        );
    }
}
