//! Indexed view of a P4Info pipeline schema.
//!
//! A [`P4Schema`] loads one P4Info document (text or binary protobuf),
//! indexes every named object by id, name and alias, resolves `type_info`
//! references into concrete encoders, and computes the pipeline cookie used
//! to decide whether the running pipeline matches the configured one.
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

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

use itertools::Itertools;
use prost::Message;
use sha2::{Digest, Sha256};

use proto::p4data as p4d;
use proto::p4info as p4i;
use proto::p4runtime as p4r;
use proto::p4types as p4t;
use proto::textpb;

use crate::errors::{Error, Result};
use crate::p4values::{self, DecodeFormat, P4Value};

// Wire enums reused directly from the bindings.
pub use proto::p4runtime::get_forwarding_pipeline_config_request::ResponseType as P4ConfigResponseType;
pub use proto::p4runtime::set_forwarding_pipeline_config_request::Action as P4ConfigAction;
pub use proto::p4runtime::write_request::Atomicity as P4Atomicity;

/// Match behavior declared for a table key field.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum P4MatchType {
    Unspecified,
    Exact,
    Lpm,
    Ternary,
    Range,
    Optional,
    /// Architecture-specific match type.
    Other(String),
}

impl fmt::Display for P4MatchType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            P4MatchType::Unspecified => "unspecified",
            P4MatchType::Exact => "exact",
            P4MatchType::Lpm => "LPM",
            P4MatchType::Ternary => "ternary",
            P4MatchType::Range => "range",
            P4MatchType::Optional => "optional",
            P4MatchType::Other(s) => s,
        };
        write!(f, "{}", s)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum P4IdleTimeoutBehavior {
    NoTimeout,
    NotifyControl,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum P4ActionScope {
    TableAndDefault,
    TableOnly,
    DefaultOnly,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum P4CounterUnit {
    Unspecified,
    Bytes,
    Packets,
    Both,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum P4MeterUnit {
    Unspecified,
    Bytes,
    Packets,
}

// ~~~~~~~~~~~~~~~~~~~~~
// A n n o t a t i o n s
// ~~~~~~~~~~~~~~~~~~~~~

/// Value inside a structured annotation expression.
#[derive(Clone, Debug, PartialEq)]
pub enum P4ExpressionValue {
    Str(String),
    Int(i64),
    Bool(bool),
}

/// Body of a parsed annotation.
#[derive(Clone, Debug, PartialEq)]
pub enum P4AnnotationBody {
    /// `@name` with no body.
    Empty,
    /// `@name(free-form body)`, newlines and escapes preserved.
    Unstructured(String),
    /// Structured expression list.
    Expressions(Vec<P4ExpressionValue>),
    /// Structured key/value list.
    KeyValues(Vec<(String, P4ExpressionValue)>),
}

#[derive(Clone, Debug, PartialEq)]
pub struct P4Annotation {
    pub name: String,
    pub body: P4AnnotationBody,
}

/// Parse one unstructured annotation: `@name` or `@name(body)`. The body may
/// span multiple lines and contain arbitrary characters; everything between
/// the first `(` and the final `)` is kept verbatim.
fn parse_unstructured_annotation(annotation: &str) -> Result<P4Annotation> {
    let rest = annotation
        .strip_prefix('@')
        .ok_or_else(|| Error::schema(format!("unsupported annotation: {:?}", annotation)))?;

    match rest.find('(') {
        None => {
            if rest.is_empty() || !rest.chars().all(|c| c.is_alphanumeric() || c == '_') {
                return Err(Error::schema(format!(
                    "unsupported annotation: {:?}",
                    annotation
                )));
            }
            Ok(P4Annotation {
                name: rest.to_string(),
                body: P4AnnotationBody::Empty,
            })
        }
        Some(open) => {
            let name = &rest[..open];
            let body = rest[open + 1..].strip_suffix(')').ok_or_else(|| {
                Error::schema(format!("unsupported annotation: {:?}", annotation))
            })?;
            Ok(P4Annotation {
                name: name.to_string(),
                body: P4AnnotationBody::Unstructured(body.to_string()),
            })
        }
    }
}

fn expression_value(expr: &p4t::Expression) -> Option<P4ExpressionValue> {
    match expr.value.as_ref()? {
        p4t::expression::Value::StringValue(s) => Some(P4ExpressionValue::Str(s.clone())),
        p4t::expression::Value::Int64Value(i) => Some(P4ExpressionValue::Int(*i)),
        p4t::expression::Value::BoolValue(b) => Some(P4ExpressionValue::Bool(*b)),
    }
}

fn parse_structured_annotation(annotation: &p4t::StructuredAnnotation) -> P4Annotation {
    let body = match &annotation.body {
        Some(p4t::structured_annotation::Body::ExpressionList(list)) => {
            P4AnnotationBody::Expressions(
                list.expressions.iter().filter_map(expression_value).collect(),
            )
        }
        Some(p4t::structured_annotation::Body::KvPairList(list)) => P4AnnotationBody::KeyValues(
            list.kv_pairs
                .iter()
                .filter_map(|kv| {
                    Some((kv.key.clone(), expression_value(kv.value.as_ref()?)?))
                })
                .collect(),
        ),
        None => P4AnnotationBody::Empty,
    };
    P4Annotation {
        name: annotation.name.clone(),
        body,
    }
}

fn parse_annotations(
    annotations: &[String],
    structured: &[p4t::StructuredAnnotation],
) -> Result<Vec<P4Annotation>> {
    let mut result = Vec::with_capacity(annotations.len() + structured.len());
    for annotation in annotations {
        result.push(parse_unstructured_annotation(annotation)?);
    }
    for annotation in structured {
        result.push(parse_structured_annotation(annotation));
    }
    Ok(result)
}

// ~~~~~~~~~~~~~~~~~~~~~
// O b j e c t   m a p s
// ~~~~~~~~~~~~~~~~~~~~~

/// Objects that live in a [`P4ObjectMap`].
pub trait P4Object {
    fn id(&self) -> u32;
    fn name(&self) -> &str;
    fn alias(&self) -> &str {
        self.name()
    }
}

/// Maps ids, names and aliases to schema objects. Collisions within one map
/// are fatal at load time.
pub struct P4ObjectMap<T> {
    entry_type: &'static str,
    items: Vec<Arc<T>>,
    by_id: HashMap<u32, usize>,
    by_name: HashMap<String, usize>,
}

impl<T: P4Object> P4ObjectMap<T> {
    fn new(entry_type: &'static str) -> Self {
        P4ObjectMap {
            entry_type,
            items: Vec::new(),
            by_id: HashMap::new(),
            by_name: HashMap::new(),
        }
    }

    fn add(&mut self, item: Arc<T>, split_suffix: bool) -> Result<()> {
        let index = self.items.len();

        if self.by_id.insert(item.id(), index).is_some() {
            return Err(Error::schema(format!(
                "{} id already exists: {}",
                self.entry_type,
                item.id()
            )));
        }

        let name = item.name().to_string();
        let alias = item.alias().to_string();
        self.add_name(name.clone(), index)?;
        if alias != name {
            self.add_name(alias, index)?;
        } else if split_suffix {
            if let Some((_, suffix)) = alias.rsplit_once('.') {
                self.add_name(suffix.to_string(), index)?;
            }
        }

        self.items.push(item);
        Ok(())
    }

    fn add_name(&mut self, name: String, index: usize) -> Result<()> {
        if self.by_name.insert(name.clone(), index).is_some() {
            return Err(Error::schema(format!(
                "{} name already exists: {:?}",
                self.entry_type, name
            )));
        }
        Ok(())
    }

    pub fn get_name(&self, name: &str) -> Option<&Arc<T>> {
        self.by_name.get(name).map(|&i| &self.items[i])
    }

    pub fn get_id(&self, id: u32) -> Option<&Arc<T>> {
        self.by_id.get(&id).map(|&i| &self.items[i])
    }

    pub fn require_name(&self, name: &str) -> Result<&Arc<T>> {
        self.get_name(name).ok_or_else(|| self.name_error(name))
    }

    pub fn require_id(&self, id: u32) -> Result<&Arc<T>> {
        self.get_id(id)
            .ok_or_else(|| Error::schema(format!("no {} with id={}", self.entry_type, id)))
    }

    fn name_error(&self, name: &str) -> Error {
        if self.by_name.is_empty() {
            return Error::schema(format!(
                "no {}s present; you asked for {:?}?",
                self.entry_type, name
            ));
        }
        let wanted = format!(".{}", name);
        let mut suggest: Vec<&str> = self
            .by_name
            .keys()
            .filter(|key| key.ends_with(&wanted))
            .map(|key| key.as_str())
            .collect();
        suggest.sort_unstable();
        if suggest.is_empty() {
            Error::schema(format!("no {} named {:?}", self.entry_type, name))
        } else {
            Error::schema(format!(
                "no {} named {:?}. Did you mean {:?}?",
                self.entry_type, name, suggest
            ))
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<T>> {
        self.items.iter()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

fn make_alias(preamble_alias: &str, name: &str) -> String {
    if !preamble_alias.is_empty() {
        preamble_alias.to_string()
    } else {
        name.rsplit('.').next().unwrap_or(name).to_string()
    }
}

// ~~~~~~~~~~~~~
// T y p e s
// ~~~~~~~~~~~~~

/// Bitstring-like type: `bit<W>`, `int<W>` or `varbit<W>`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct P4BitsType {
    pub bitwidth: u32,
    pub signed: bool,
    pub varbit: bool,
}

impl P4BitsType {
    pub fn type_name(&self) -> String {
        if self.varbit {
            format!("varbit<{}>", self.bitwidth)
        } else if self.signed {
            format!("s{}", self.bitwidth)
        } else {
            format!("u{}", self.bitwidth)
        }
    }

    pub fn encode_bytes(&self, value: &P4Value) -> Result<Vec<u8>> {
        if self.varbit {
            return Err(Error::encoding("varbit requires an explicit bit width"));
        }
        if self.signed {
            let ival = match value {
                P4Value::SignedInt(v) => *v,
                P4Value::Int(v) if *v <= i128::MAX as u128 => *v as i128,
                other => {
                    return Err(Error::encoding(format!(
                        "invalid signed value: {:?}",
                        other
                    )))
                }
            };
            return p4values::encode_exact_signed(ival, self.bitwidth);
        }
        p4values::encode_exact(value, self.bitwidth)
    }

    pub fn decode_bytes(&self, data: &[u8]) -> Result<P4Value> {
        if self.signed {
            return Ok(P4Value::SignedInt(p4values::decode_exact_signed(
                data,
                self.bitwidth,
            )?));
        }
        p4values::decode_exact(data, self.bitwidth, DecodeFormat::empty())
    }
}

/// Resolved `type_info` type. New types are flattened transitively: a chain
/// of `type` declarations ends in a bitstring, enum or SDN translation.
#[derive(Debug)]
pub enum P4Type {
    Bits(P4BitsType),
    Bool,
    Tuple(Vec<Arc<P4Type>>),
    Struct {
        name: String,
        members: Vec<(String, Arc<P4Type>)>,
    },
    Header {
        name: String,
        members: Vec<(String, P4BitsType)>,
    },
    HeaderUnion {
        name: String,
        members: Vec<(String, Arc<P4Type>)>,
    },
    HeaderStack {
        header: Arc<P4Type>,
        size: usize,
    },
    HeaderUnionStack {
        header_union: Arc<P4Type>,
        size: usize,
    },
    Enum {
        name: String,
    },
    Error,
    SerializableEnum {
        name: String,
        bitwidth: u32,
        members: Vec<(String, Vec<u8>)>,
    },
    /// New type translated at runtime to a string.
    SdnString {
        uri: String,
    },
}

impl P4Type {
    pub fn type_name(&self) -> String {
        match self {
            P4Type::Bits(bits) => bits.type_name(),
            P4Type::Bool => "bool".to_string(),
            P4Type::Tuple(members) => {
                let inner: Vec<String> = members.iter().map(|m| m.type_name()).collect();
                format!("tuple[{}]", inner.join(", "))
            }
            P4Type::Struct { name, .. }
            | P4Type::Header { name, .. }
            | P4Type::HeaderUnion { name, .. }
            | P4Type::Enum { name }
            | P4Type::SerializableEnum { name, .. } => name.clone(),
            P4Type::HeaderStack { header, size } => {
                format!("{}[{}]", header.type_name(), size)
            }
            P4Type::HeaderUnionStack { header_union, size } => {
                format!("{}[{}]", header_union.type_name(), size)
            }
            P4Type::Error => "error".to_string(),
            P4Type::SdnString { .. } => "string".to_string(),
        }
    }

    /// Bit width when the type boils down to a plain bitstring.
    pub fn bitwidth(&self) -> Option<u32> {
        match self {
            P4Type::Bits(bits) => Some(bits.bitwidth),
            P4Type::SerializableEnum { bitwidth, .. } => Some(*bitwidth),
            _ => None,
        }
    }

    /// Encode a value destined for a byte-string slot (match field, action
    /// parameter, packet metadata).
    pub fn encode_bytes(&self, value: &P4Value) -> Result<Vec<u8>> {
        match self {
            P4Type::Bits(bits) => bits.encode_bytes(value),
            P4Type::SerializableEnum {
                name,
                bitwidth,
                members,
            } => match value {
                P4Value::Str(member) => members
                    .iter()
                    .find(|(n, _)| n == member)
                    .map(|(_, bytes)| bytes.clone())
                    .ok_or_else(|| {
                        Error::schema(format!("{}: unknown enum member {:?}", name, member))
                    }),
                other => p4values::encode_exact(other, *bitwidth),
            },
            P4Type::SdnString { .. } => match value {
                P4Value::Str(s) => Ok(s.as_bytes().to_vec()),
                P4Value::Bytes(b) => Ok(b.clone()),
                other => Err(Error::encoding(format!("invalid SDN string: {:?}", other))),
            },
            other => Err(Error::encoding(format!(
                "type {} cannot encode to a byte string",
                other.type_name()
            ))),
        }
    }

    pub fn decode_bytes(&self, data: &[u8]) -> Result<P4Value> {
        match self {
            P4Type::Bits(bits) => bits.decode_bytes(data),
            P4Type::SerializableEnum { members, bitwidth, .. } => {
                let canonical = p4values::p4r_truncate(data);
                for (name, bytes) in members {
                    if p4values::p4r_truncate(bytes) == canonical {
                        return Ok(P4Value::Str(name.clone()));
                    }
                }
                p4values::decode_exact(data, *bitwidth, DecodeFormat::empty())
            }
            P4Type::SdnString { .. } => Ok(P4Value::Str(
                String::from_utf8(data.to_vec())
                    .map_err(|_| Error::encoding("SDN string is not valid UTF-8"))?,
            )),
            other => Err(Error::encoding(format!(
                "type {} cannot decode from a byte string",
                other.type_name()
            ))),
        }
    }

    /// Encode a structured `P4Data` value (registers, digests).
    pub fn encode_data(&self, value: &P4Value) -> Result<p4d::P4Data> {
        use p4d::p4_data::Data;

        let data = match self {
            P4Type::Bits(bits) if bits.varbit => match value {
                // A varbit value carries its own width: (value, bitwidth).
                P4Value::Lpm(inner, width) => {
                    if *width > bits.bitwidth {
                        return Err(Error::encoding(format!(
                            "varbit width {} exceeds max {}",
                            width, bits.bitwidth
                        )));
                    }
                    Data::Varbit(p4d::P4Varbit {
                        bitstring: p4values::encode_exact(inner, *width)?,
                        bitwidth: *width as i32,
                    })
                }
                other => {
                    return Err(Error::encoding(format!(
                        "varbit value must carry a width: {:?}",
                        other
                    )))
                }
            },
            P4Type::Bits(_) | P4Type::SerializableEnum { .. } | P4Type::SdnString { .. } => {
                match self {
                    P4Type::SerializableEnum { .. } => Data::EnumValue(self.encode_bytes(value)?),
                    _ => Data::Bitstring(self.encode_bytes(value)?),
                }
            }
            P4Type::Bool => match value {
                P4Value::Bool(b) => Data::Bool(*b),
                other => return Err(Error::encoding(format!("expected bool: {:?}", other))),
            },
            P4Type::Tuple(members) => {
                let P4Value::List(items) = value else {
                    return Err(Error::encoding(format!("expected tuple: {:?}", value)));
                };
                if items.len() != members.len() {
                    return Err(Error::encoding(format!(
                        "tuple expects {} items, got {}",
                        members.len(),
                        items.len()
                    )));
                }
                let encoded = members
                    .iter()
                    .zip(items)
                    .map(|(member, item)| member.encode_data(item))
                    .collect::<Result<Vec<_>>>()?;
                Data::Tuple(p4d::P4StructLike { members: encoded })
            }
            P4Type::Struct { name, members } => {
                let P4Value::Map(map) = value else {
                    return Err(Error::encoding(format!("{}: expected struct", name)));
                };
                let mut encoded = Vec::with_capacity(members.len());
                for (member_name, member_type) in members {
                    let item = map.get(member_name).ok_or_else(|| {
                        Error::encoding(format!("{}: missing field {:?}", name, member_name))
                    })?;
                    encoded.push(member_type.encode_data(item)?);
                }
                if map.len() > members.len() {
                    let extra: Vec<&String> = map
                        .keys()
                        .filter(|key| !members.iter().any(|(n, _)| &n == key))
                        .collect();
                    return Err(Error::encoding(format!(
                        "{}: extra fields {:?}",
                        name, extra
                    )));
                }
                Data::Struct(p4d::P4StructLike { members: encoded })
            }
            P4Type::Header { .. } => Data::Header(self.encode_header(value)?),
            P4Type::HeaderUnion { .. } => Data::HeaderUnion(self.encode_union(value)?),
            P4Type::HeaderStack { header, size } => {
                let P4Value::List(items) = value else {
                    return Err(Error::encoding(format!("expected header stack: {:?}", value)));
                };
                if items.len() != *size {
                    return Err(Error::encoding(format!(
                        "header stack expects {} entries, got {}",
                        size,
                        items.len()
                    )));
                }
                let entries = items
                    .iter()
                    .map(|item| header.encode_header(item))
                    .collect::<Result<Vec<_>>>()?;
                Data::HeaderStack(p4d::P4HeaderStack { entries })
            }
            P4Type::HeaderUnionStack { header_union, size } => {
                let P4Value::List(items) = value else {
                    return Err(Error::encoding(format!(
                        "expected header union stack: {:?}",
                        value
                    )));
                };
                if items.len() != *size {
                    return Err(Error::encoding(format!(
                        "header union stack expects {} entries, got {}",
                        size,
                        items.len()
                    )));
                }
                let entries = items
                    .iter()
                    .map(|item| header_union.encode_union(item))
                    .collect::<Result<Vec<_>>>()?;
                Data::HeaderUnionStack(p4d::P4HeaderUnionStack { entries })
            }
            P4Type::Enum { name } => match value {
                P4Value::Str(member) => Data::Enum(member.clone()),
                other => {
                    return Err(Error::encoding(format!(
                        "{}: expected enum member name, got {:?}",
                        name, other
                    )))
                }
            },
            P4Type::Error => match value {
                P4Value::Str(member) => Data::Error(member.clone()),
                other => {
                    return Err(Error::encoding(format!(
                        "expected error member name, got {:?}",
                        other
                    )))
                }
            },
        };
        Ok(p4d::P4Data { data: Some(data) })
    }

    pub fn decode_data(&self, data: &p4d::P4Data) -> Result<P4Value> {
        use p4d::p4_data::Data;

        let data = data
            .data
            .as_ref()
            .ok_or_else(|| Error::encoding("empty P4Data"))?;

        match (self, data) {
            (P4Type::Bits(bits), Data::Varbit(varbit)) if bits.varbit => Ok(P4Value::Lpm(
                Box::new(p4values::decode_exact(
                    &varbit.bitstring,
                    varbit.bitwidth as u32,
                    DecodeFormat::empty(),
                )?),
                varbit.bitwidth as u32,
            )),
            (P4Type::Bits(_), Data::Bitstring(bytes)) => self.decode_bytes(bytes),
            (P4Type::SdnString { .. }, Data::Bitstring(bytes)) => self.decode_bytes(bytes),
            (P4Type::SerializableEnum { .. }, Data::EnumValue(bytes)) => {
                self.decode_bytes(bytes)
            }
            (P4Type::Bool, Data::Bool(b)) => Ok(P4Value::Bool(*b)),
            (P4Type::Tuple(members), Data::Tuple(items)) => {
                if items.members.len() != members.len() {
                    return Err(Error::encoding("tuple arity mismatch"));
                }
                Ok(P4Value::List(
                    members
                        .iter()
                        .zip(&items.members)
                        .map(|(member, item)| member.decode_data(item))
                        .collect::<Result<Vec<_>>>()?,
                ))
            }
            (P4Type::Struct { name, members }, Data::Struct(items)) => {
                if items.members.len() != members.len() {
                    return Err(Error::encoding(format!("{}: struct size mismatch", name)));
                }
                let mut map = BTreeMap::new();
                for ((member_name, member_type), item) in members.iter().zip(&items.members) {
                    map.insert(member_name.clone(), member_type.decode_data(item)?);
                }
                Ok(P4Value::Map(map))
            }
            (P4Type::Header { .. }, Data::Header(header)) => self.decode_header(header),
            (P4Type::HeaderUnion { .. }, Data::HeaderUnion(union)) => self.decode_union(union),
            (P4Type::HeaderStack { header, .. }, Data::HeaderStack(stack)) => {
                Ok(P4Value::List(
                    stack
                        .entries
                        .iter()
                        .map(|entry| header.decode_header(entry))
                        .collect::<Result<Vec<_>>>()?,
                ))
            }
            (P4Type::HeaderUnionStack { header_union, .. }, Data::HeaderUnionStack(stack)) => {
                Ok(P4Value::List(
                    stack
                        .entries
                        .iter()
                        .map(|entry| header_union.decode_union(entry))
                        .collect::<Result<Vec<_>>>()?,
                ))
            }
            (P4Type::Enum { .. }, Data::Enum(member)) => Ok(P4Value::Str(member.clone())),
            (P4Type::Error, Data::Error(member)) => Ok(P4Value::Str(member.clone())),
            (expected, _) => Err(Error::encoding(format!(
                "P4Data does not match type {}",
                expected.type_name()
            ))),
        }
    }

    fn encode_header(&self, value: &P4Value) -> Result<p4d::P4Header> {
        let P4Type::Header { name, members } = self else {
            return Err(Error::encoding(format!(
                "expected header type, got {}",
                self.type_name()
            )));
        };
        let P4Value::Map(map) = value else {
            return Err(Error::encoding(format!("{}: expected header", name)));
        };

        // An empty map means an invalid (not present) header.
        if map.is_empty() {
            return Ok(p4d::P4Header {
                is_valid: false,
                bitstrings: Vec::new(),
            });
        }

        let mut bitstrings = Vec::with_capacity(members.len());
        for (member_name, member_type) in members {
            let item = map.get(member_name).ok_or_else(|| {
                Error::encoding(format!("{}: missing field {:?}", name, member_name))
            })?;
            bitstrings.push(member_type.encode_bytes(item)?);
        }
        if map.len() > members.len() {
            return Err(Error::encoding(format!("{}: extra fields", name)));
        }
        Ok(p4d::P4Header {
            is_valid: true,
            bitstrings,
        })
    }

    fn decode_header(&self, header: &p4d::P4Header) -> Result<P4Value> {
        let P4Type::Header { name, members } = self else {
            return Err(Error::encoding(format!(
                "expected header type, got {}",
                self.type_name()
            )));
        };
        if !header.is_valid {
            if !header.bitstrings.is_empty() {
                return Err(Error::encoding(format!(
                    "{}: invalid header with bitstrings",
                    name
                )));
            }
            return Ok(P4Value::Map(BTreeMap::new()));
        }
        if header.bitstrings.len() != members.len() {
            return Err(Error::encoding(format!("{}: header size mismatch", name)));
        }
        let mut map = BTreeMap::new();
        for ((member_name, member_type), bytes) in members.iter().zip(&header.bitstrings) {
            map.insert(member_name.clone(), member_type.decode_bytes(bytes)?);
        }
        Ok(P4Value::Map(map))
    }

    fn encode_union(&self, value: &P4Value) -> Result<p4d::P4HeaderUnion> {
        let P4Type::HeaderUnion { name, members } = self else {
            return Err(Error::encoding(format!(
                "expected header union type, got {}",
                self.type_name()
            )));
        };
        let P4Value::Map(map) = value else {
            return Err(Error::encoding(format!("{}: expected header union", name)));
        };
        if map.len() > 1 {
            return Err(Error::encoding(format!("{}: too many valid headers", name)));
        }
        let Some((header_name, header_value)) = map.iter().next() else {
            return Ok(p4d::P4HeaderUnion::default());
        };
        let header_type = members
            .iter()
            .find(|(n, _)| n == header_name)
            .map(|(_, t)| t)
            .ok_or_else(|| {
                Error::encoding(format!("{}: wrong header {:?}", name, header_name))
            })?;
        Ok(p4d::P4HeaderUnion {
            valid_header_name: header_name.clone(),
            valid_header: Some(header_type.encode_header(header_value)?),
        })
    }

    fn decode_union(&self, union: &p4d::P4HeaderUnion) -> Result<P4Value> {
        let P4Type::HeaderUnion { members, .. } = self else {
            return Err(Error::encoding(format!(
                "expected header union type, got {}",
                self.type_name()
            )));
        };
        if union.valid_header_name.is_empty() {
            return Ok(P4Value::Map(BTreeMap::new()));
        }
        let header_type = members
            .iter()
            .find(|(n, _)| n == &union.valid_header_name)
            .map(|(_, t)| t)
            .ok_or_else(|| {
                Error::encoding(format!("unknown union header {:?}", union.valid_header_name))
            })?;
        let header = union
            .valid_header
            .as_ref()
            .ok_or_else(|| Error::encoding("union header missing body"))?;
        let mut map = BTreeMap::new();
        map.insert(
            union.valid_header_name.clone(),
            header_type.decode_header(header)?,
        );
        Ok(P4Value::Map(map))
    }
}

/// Resolves `type_info` references with transitive new_type flattening and
/// cycle detection. Resolved types are cached and shared.
struct TypeResolver<'a> {
    info: Option<&'a p4t::P4TypeInfo>,
    cache: HashMap<(&'static str, String), Arc<P4Type>>,
    visiting: HashSet<(&'static str, String)>,
}

impl<'a> TypeResolver<'a> {
    fn new(info: Option<&'a p4t::P4TypeInfo>) -> Self {
        TypeResolver {
            info,
            cache: HashMap::new(),
            visiting: HashSet::new(),
        }
    }

    fn info(&self) -> Result<&'a p4t::P4TypeInfo> {
        self.info
            .ok_or_else(|| Error::schema("P4Info has no type_info section"))
    }

    fn resolve_named(&mut self, kind: &'static str, name: &str) -> Result<Arc<P4Type>> {
        let key = (kind, name.to_string());
        if let Some(resolved) = self.cache.get(&key) {
            return Ok(resolved.clone());
        }
        if !self.visiting.insert(key.clone()) {
            return Err(Error::schema(format!(
                "type {:?} refers to itself (directly or through a new_type chain)",
                name
            )));
        }

        let resolved = self.resolve_named_uncached(kind, name);
        self.visiting.remove(&key);
        let resolved = resolved?;
        self.cache.insert(key, resolved.clone());
        Ok(resolved)
    }

    fn resolve_named_uncached(&mut self, kind: &'static str, name: &str) -> Result<Arc<P4Type>> {
        let info = self.info()?;
        let missing = || Error::schema(format!("unknown {} type {:?}", kind, name));

        match kind {
            "struct" => {
                let spec = info.structs.get(name).ok_or_else(missing)?.clone();
                let members = spec
                    .members
                    .iter()
                    .map(|member| {
                        let member_type = self.resolve_spec(
                            member.type_spec.as_ref().ok_or_else(|| {
                                Error::schema(format!("{}: member without type", name))
                            })?,
                        )?;
                        Ok((member.name.clone(), member_type))
                    })
                    .collect::<Result<Vec<_>>>()?;
                Ok(Arc::new(P4Type::Struct {
                    name: name.to_string(),
                    members,
                }))
            }
            "header" => {
                let spec = info.headers.get(name).ok_or_else(missing)?;
                let members = spec
                    .members
                    .iter()
                    .map(|member| {
                        let bits = bits_type(member.type_spec.as_ref().ok_or_else(|| {
                            Error::schema(format!("{}: member without type", name))
                        })?)?;
                        Ok((member.name.clone(), bits))
                    })
                    .collect::<Result<Vec<_>>>()?;
                Ok(Arc::new(P4Type::Header {
                    name: name.to_string(),
                    members,
                }))
            }
            "header_union" => {
                let spec = info.header_unions.get(name).ok_or_else(missing)?.clone();
                let members = spec
                    .members
                    .iter()
                    .map(|member| {
                        let header = member
                            .header
                            .as_ref()
                            .ok_or_else(|| Error::schema(format!("{}: member without header", name)))?;
                        Ok((member.name.clone(), self.resolve_named("header", &header.name)?))
                    })
                    .collect::<Result<Vec<_>>>()?;
                Ok(Arc::new(P4Type::HeaderUnion {
                    name: name.to_string(),
                    members,
                }))
            }
            "enum" => {
                info.enums.get(name).ok_or_else(missing)?;
                Ok(Arc::new(P4Type::Enum {
                    name: name.to_string(),
                }))
            }
            "serializable_enum" => {
                let spec = info.serializable_enums.get(name).ok_or_else(missing)?;
                let bitwidth = spec
                    .underlying_type
                    .as_ref()
                    .map(|t| t.bitwidth as u32)
                    .unwrap_or(0);
                Ok(Arc::new(P4Type::SerializableEnum {
                    name: name.to_string(),
                    bitwidth,
                    members: spec
                        .members
                        .iter()
                        .map(|member| (member.name.clone(), member.value.clone()))
                        .collect(),
                }))
            }
            "new_type" => {
                let spec = info.new_types.get(name).ok_or_else(missing)?.clone();
                match spec.representation.as_ref().ok_or_else(|| {
                    Error::schema(format!("new_type {:?} has no representation", name))
                })? {
                    p4t::p4_new_type_spec::Representation::OriginalType(original) => {
                        self.resolve_spec(original)
                    }
                    p4t::p4_new_type_spec::Representation::TranslatedType(translation) => {
                        match translation.sdn_type.as_ref().ok_or_else(|| {
                            Error::schema(format!("new_type {:?} has no sdn_type", name))
                        })? {
                            p4t::p4_new_type_translation::SdnType::SdnBitwidth(bitwidth) => {
                                Ok(Arc::new(P4Type::Bits(P4BitsType {
                                    bitwidth: *bitwidth as u32,
                                    signed: false,
                                    varbit: false,
                                })))
                            }
                            p4t::p4_new_type_translation::SdnType::SdnString(_) => {
                                Ok(Arc::new(P4Type::SdnString {
                                    uri: translation.uri.clone(),
                                }))
                            }
                        }
                    }
                }
            }
            _ => Err(missing()),
        }
    }

    fn resolve_spec(&mut self, spec: &p4t::P4DataTypeSpec) -> Result<Arc<P4Type>> {
        use p4t::p4_data_type_spec::TypeSpec;

        match spec
            .type_spec
            .as_ref()
            .ok_or_else(|| Error::schema("empty type_spec"))?
        {
            TypeSpec::Bitstring(bits) => Ok(Arc::new(P4Type::Bits(bits_type(bits)?))),
            TypeSpec::Bool(_) => Ok(Arc::new(P4Type::Bool)),
            TypeSpec::Tuple(tuple) => {
                let members = tuple
                    .members
                    .iter()
                    .map(|member| self.resolve_spec(member))
                    .collect::<Result<Vec<_>>>()?;
                Ok(Arc::new(P4Type::Tuple(members)))
            }
            TypeSpec::Struct(named) => self.resolve_named("struct", &named.name),
            TypeSpec::Header(named) => self.resolve_named("header", &named.name),
            TypeSpec::HeaderUnion(named) => self.resolve_named("header_union", &named.name),
            TypeSpec::HeaderStack(stack) => {
                let header = stack
                    .header
                    .as_ref()
                    .ok_or_else(|| Error::schema("header_stack without header"))?;
                Ok(Arc::new(P4Type::HeaderStack {
                    header: self.resolve_named("header", &header.name)?,
                    size: stack.size as usize,
                }))
            }
            TypeSpec::HeaderUnionStack(stack) => {
                let union = stack
                    .header_union
                    .as_ref()
                    .ok_or_else(|| Error::schema("header_union_stack without union"))?;
                Ok(Arc::new(P4Type::HeaderUnionStack {
                    header_union: self.resolve_named("header_union", &union.name)?,
                    size: stack.size as usize,
                }))
            }
            TypeSpec::Enum(named) => self.resolve_named("enum", &named.name),
            TypeSpec::Error(_) => Ok(Arc::new(P4Type::Error)),
            TypeSpec::SerializableEnum(named) => {
                self.resolve_named("serializable_enum", &named.name)
            }
            TypeSpec::NewType(named) => self.resolve_named("new_type", &named.name),
        }
    }

    fn resolve_name(&mut self, name: &str) -> Result<Arc<P4Type>> {
        // Match fields and action params name either a new_type or a struct.
        if let Ok(info) = self.info() {
            if info.new_types.contains_key(name) {
                return self.resolve_named("new_type", name);
            }
            if info.structs.contains_key(name) {
                return self.resolve_named("struct", name);
            }
            if info.serializable_enums.contains_key(name) {
                return self.resolve_named("serializable_enum", name);
            }
            if info.enums.contains_key(name) {
                return self.resolve_named("enum", name);
            }
        }
        Err(Error::schema(format!("unknown type {:?}", name)))
    }
}

fn bits_type(spec: &p4t::P4BitstringLikeTypeSpec) -> Result<P4BitsType> {
    use p4t::p4_bitstring_like_type_spec::TypeSpec;
    match spec
        .type_spec
        .as_ref()
        .ok_or_else(|| Error::schema("empty bitstring type_spec"))?
    {
        TypeSpec::Bit(bit) => Ok(P4BitsType {
            bitwidth: bit.bitwidth as u32,
            signed: false,
            varbit: false,
        }),
        TypeSpec::Int(int) => Ok(P4BitsType {
            bitwidth: int.bitwidth as u32,
            signed: true,
            varbit: false,
        }),
        TypeSpec::Varbit(varbit) => Ok(P4BitsType {
            bitwidth: varbit.max_bitwidth as u32,
            signed: false,
            varbit: true,
        }),
    }
}

// ~~~~~~~~~~~~~~~~~~~~~~~
// S c h e m a   o b j e c t s
// ~~~~~~~~~~~~~~~~~~~~~~~

/// A table key field with its schema-directed codec.
pub struct P4MatchField {
    pub id: u32,
    pub name: String,
    pub alias: String,
    pub bitwidth: u32,
    pub match_type: P4MatchType,
    pub type_spec: Option<Arc<P4Type>>,
    pub annotations: Vec<P4Annotation>,
}

impl P4Object for P4MatchField {
    fn id(&self) -> u32 {
        self.id
    }
    fn name(&self) -> &str {
        &self.name
    }
    fn alias(&self) -> &str {
        &self.alias
    }
}

impl P4MatchField {
    fn from_proto(field: &p4i::MatchField, resolver: &mut TypeResolver<'_>) -> Result<Self> {
        let match_type = match &field.r#match {
            Some(p4i::match_field::Match::MatchType(value)) => {
                match p4i::match_field::MatchType::from_i32(*value) {
                    Some(p4i::match_field::MatchType::Exact) => P4MatchType::Exact,
                    Some(p4i::match_field::MatchType::Lpm) => P4MatchType::Lpm,
                    Some(p4i::match_field::MatchType::Ternary) => P4MatchType::Ternary,
                    Some(p4i::match_field::MatchType::Range) => P4MatchType::Range,
                    Some(p4i::match_field::MatchType::Optional) => P4MatchType::Optional,
                    _ => P4MatchType::Unspecified,
                }
            }
            Some(p4i::match_field::Match::OtherMatchType(other)) => {
                P4MatchType::Other(other.clone())
            }
            None => P4MatchType::Unspecified,
        };

        let type_spec = match &field.type_name {
            Some(named) => Some(resolver.resolve_name(&named.name)?),
            None => None,
        };

        Ok(P4MatchField {
            id: field.id,
            name: field.name.clone(),
            alias: make_alias("", &field.name),
            bitwidth: field.bitwidth as u32,
            match_type,
            type_spec,
            annotations: parse_annotations(&field.annotations, &field.structured_annotations)?,
        })
    }

    /// Encode a value for this field. Returns `None` for "don't care" forms
    /// (LPM prefix 0, all-zero ternary mask), which are expressed on the wire
    /// by omitting the field.
    pub fn encode_field(&self, value: &P4Value) -> Result<Option<p4r::FieldMatch>> {
        use p4r::field_match;

        let field_match_type = match &self.match_type {
            P4MatchType::Exact => field_match::FieldMatchType::Exact(field_match::Exact {
                value: p4values::encode_exact(value, self.bitwidth)?,
            }),
            P4MatchType::Lpm => {
                let (data, prefix_len) = p4values::encode_lpm(value, self.bitwidth)?;
                if prefix_len == 0 {
                    return Ok(None);
                }
                field_match::FieldMatchType::Lpm(field_match::Lpm {
                    value: data,
                    prefix_len: prefix_len as i32,
                })
            }
            P4MatchType::Ternary => {
                let (data, mask) = p4values::encode_ternary(value, self.bitwidth)?;
                if mask == [0] {
                    return Ok(None);
                }
                field_match::FieldMatchType::Ternary(field_match::Ternary { value: data, mask })
            }
            P4MatchType::Range => {
                let (low, high) = p4values::encode_range(value, self.bitwidth)?;
                field_match::FieldMatchType::Range(field_match::Range { low, high })
            }
            P4MatchType::Optional => {
                field_match::FieldMatchType::Optional(field_match::Optional {
                    value: p4values::encode_exact(value, self.bitwidth)?,
                })
            }
            other => {
                return Err(Error::schema(format!(
                    "{}: unsupported match type {}",
                    self.name, other
                )))
            }
        };

        Ok(Some(p4r::FieldMatch {
            field_id: self.id,
            field_match_type: Some(field_match_type),
        }))
    }

    pub fn decode_field(&self, field: &p4r::FieldMatch) -> Result<P4Value> {
        use p4r::field_match::FieldMatchType;

        let format = DecodeFormat::empty();
        match field
            .field_match_type
            .as_ref()
            .ok_or_else(|| Error::encoding(format!("{}: empty field match", self.name)))?
        {
            FieldMatchType::Exact(exact) => {
                p4values::decode_exact(&exact.value, self.bitwidth, format)
            }
            FieldMatchType::Lpm(lpm) => {
                p4values::decode_lpm(&lpm.value, lpm.prefix_len as u32, self.bitwidth, format)
            }
            FieldMatchType::Ternary(ternary) => {
                p4values::decode_ternary(&ternary.value, &ternary.mask, self.bitwidth, format)
            }
            FieldMatchType::Range(range) => {
                p4values::decode_range(&range.low, &range.high, self.bitwidth, format)
            }
            FieldMatchType::Optional(optional) => {
                p4values::decode_exact(&optional.value, self.bitwidth, format)
            }
        }
    }

    pub fn format_field(&self, value: &P4Value) -> String {
        let format = DecodeFormat::STRING | DecodeFormat::ADDRESS;
        let result = match self.match_type {
            P4MatchType::Lpm => p4values::encode_lpm(value, self.bitwidth).and_then(
                |(data, prefix)| p4values::decode_lpm(&data, prefix, self.bitwidth, format),
            ),
            P4MatchType::Ternary => p4values::encode_ternary(value, self.bitwidth).and_then(
                |(data, mask)| p4values::decode_ternary(&data, &mask, self.bitwidth, format),
            ),
            P4MatchType::Range => p4values::encode_range(value, self.bitwidth).and_then(
                |(low, high)| p4values::decode_range(&low, &high, self.bitwidth, format),
            ),
            _ => p4values::format_exact(value, self.bitwidth, format).map(P4Value::Str),
        };
        match result {
            Ok(P4Value::Str(s)) => s,
            Ok(other) => format!("{:?}", other),
            Err(_) => format!("{:?}", value),
        }
    }
}

impl fmt::Display for P4MatchField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "field {}: bit<{}> {}-match",
            self.alias, self.bitwidth, self.match_type
        )
    }
}

/// An action parameter with its codec.
pub struct P4ActionParam {
    pub id: u32,
    pub name: String,
    pub bitwidth: u32,
    pub type_spec: Option<Arc<P4Type>>,
}

impl P4Object for P4ActionParam {
    fn id(&self) -> u32 {
        self.id
    }
    fn name(&self) -> &str {
        &self.name
    }
}

impl P4ActionParam {
    pub fn encode_param(&self, value: &P4Value) -> Result<p4r::action::Param> {
        let data = match &self.type_spec {
            Some(type_spec) if type_spec.bitwidth().is_none() => type_spec.encode_bytes(value)?,
            _ => p4values::encode_exact(value, self.bitwidth)?,
        };
        Ok(p4r::action::Param {
            param_id: self.id,
            value: data,
        })
    }

    pub fn decode_param(&self, param: &p4r::action::Param) -> Result<P4Value> {
        match &self.type_spec {
            Some(type_spec) if type_spec.bitwidth().is_none() => {
                type_spec.decode_bytes(&param.value)
            }
            _ => p4values::decode_exact(&param.value, self.bitwidth, DecodeFormat::empty()),
        }
    }

    pub fn format_param(&self, value: &P4Value) -> String {
        p4values::format_exact(value, self.bitwidth, DecodeFormat::STRING | DecodeFormat::ADDRESS)
            .unwrap_or_else(|_| format!("{:?}", value))
    }
}

impl fmt::Display for P4ActionParam {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: bit<{}>", self.name, self.bitwidth)
    }
}

pub struct P4Action {
    pub id: u32,
    pub name: String,
    pub alias: String,
    pub params: P4ObjectMap<P4ActionParam>,
    pub annotations: Vec<P4Annotation>,
}

impl P4Object for P4Action {
    fn id(&self) -> u32 {
        self.id
    }
    fn name(&self) -> &str {
        &self.name
    }
    fn alias(&self) -> &str {
        &self.alias
    }
}

impl fmt::Display for P4Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let params: Vec<String> = self.params.iter().map(|p| p.to_string()).collect();
        write!(f, "action {}({})", self.alias, params.join(", "))
    }
}

/// Reference from a table to one of its admissible actions.
pub struct P4ActionRef {
    pub action: Arc<P4Action>,
    pub scope: P4ActionScope,
}

impl P4Object for P4ActionRef {
    fn id(&self) -> u32 {
        self.action.id
    }
    fn name(&self) -> &str {
        &self.action.name
    }
    fn alias(&self) -> &str {
        &self.action.alias
    }
}

pub struct P4ActionProfile {
    pub id: u32,
    pub name: String,
    pub alias: String,
    pub table_ids: Vec<u32>,
    pub with_selector: bool,
    pub size: i64,
    pub max_group_size: i32,
    pub max_member_weight: Option<i32>,
    table_names: OnceLock<Vec<String>>,
}

impl P4Object for P4ActionProfile {
    fn id(&self) -> u32 {
        self.id
    }
    fn name(&self) -> &str {
        &self.name
    }
    fn alias(&self) -> &str {
        &self.alias
    }
}

impl P4ActionProfile {
    /// Aliases of the tables backed by this profile, sorted.
    pub fn table_names(&self) -> &[String] {
        self.table_names.get().map(|v| v.as_slice()).unwrap_or(&[])
    }
}

impl fmt::Display for P4ActionProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = if self.with_selector { "selector" } else { "profile" };
        write!(
            f,
            "action_profile {}[{}] type={} tables={}",
            self.alias,
            self.size,
            kind,
            self.table_names().join(",")
        )
    }
}

pub struct P4Table {
    pub id: u32,
    pub name: String,
    pub alias: String,
    pub size: i64,
    pub is_const: bool,
    pub has_initial_entries: bool,
    pub idle_timeout_behavior: P4IdleTimeoutBehavior,
    pub match_fields: P4ObjectMap<P4MatchField>,
    pub actions: P4ObjectMap<P4ActionRef>,
    pub const_default_action: Option<Arc<P4Action>>,
    pub action_profile: Option<Arc<P4ActionProfile>>,
    pub direct_counter: Option<Arc<P4DirectCounter>>,
    pub direct_meter: Option<Arc<P4DirectMeter>>,
}

impl P4Object for P4Table {
    fn id(&self) -> u32 {
        self.id
    }
    fn name(&self) -> &str {
        &self.name
    }
    fn alias(&self) -> &str {
        &self.alias
    }
}

impl P4Table {
    /// A table entry needs a priority iff it has a ternary, range or
    /// optional key field.
    pub fn requires_priority(&self) -> bool {
        self.match_fields.iter().any(|field| {
            matches!(
                field.match_type,
                P4MatchType::Ternary | P4MatchType::Range | P4MatchType::Optional
            )
        })
    }
}

impl fmt::Display for P4Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "table {}[{}]:", self.alias, self.size)?;
        if self.is_const {
            write!(f, " const")?;
        }
        for field in self.match_fields.iter() {
            write!(f, "\n\t{}", field)?;
        }
        for action in self.actions.iter() {
            let scope = match action.scope {
                P4ActionScope::TableOnly => "table-only ",
                P4ActionScope::DefaultOnly => "default-only ",
                P4ActionScope::TableAndDefault => "",
            };
            write!(f, "\n\t{}{}", scope, action.action)?;
        }
        if let Some(profile) = &self.action_profile {
            write!(f, "\n\t-> {}", profile.alias)?;
        }
        if self.idle_timeout_behavior == P4IdleTimeoutBehavior::NotifyControl {
            write!(f, "\n\tidle notify")?;
        }
        Ok(())
    }
}

pub struct P4Counter {
    pub id: u32,
    pub name: String,
    pub alias: String,
    pub size: i64,
    pub unit: P4CounterUnit,
}

impl P4Object for P4Counter {
    fn id(&self) -> u32 {
        self.id
    }
    fn name(&self) -> &str {
        &self.name
    }
    fn alias(&self) -> &str {
        &self.alias
    }
}

pub struct P4DirectCounter {
    pub id: u32,
    pub name: String,
    pub alias: String,
    pub unit: P4CounterUnit,
    pub direct_table_id: u32,
    direct_table_name: OnceLock<String>,
}

impl P4Object for P4DirectCounter {
    fn id(&self) -> u32 {
        self.id
    }
    fn name(&self) -> &str {
        &self.name
    }
    fn alias(&self) -> &str {
        &self.alias
    }
}

impl P4DirectCounter {
    pub fn direct_table_name(&self) -> &str {
        self.direct_table_name.get().map(String::as_str).unwrap_or("")
    }
}

pub struct P4Meter {
    pub id: u32,
    pub name: String,
    pub alias: String,
    pub size: i64,
    pub unit: P4MeterUnit,
}

impl P4Object for P4Meter {
    fn id(&self) -> u32 {
        self.id
    }
    fn name(&self) -> &str {
        &self.name
    }
    fn alias(&self) -> &str {
        &self.alias
    }
}

pub struct P4DirectMeter {
    pub id: u32,
    pub name: String,
    pub alias: String,
    pub unit: P4MeterUnit,
    pub direct_table_id: u32,
}

impl P4Object for P4DirectMeter {
    fn id(&self) -> u32 {
        self.id
    }
    fn name(&self) -> &str {
        &self.name
    }
    fn alias(&self) -> &str {
        &self.alias
    }
}

pub struct P4Register {
    pub id: u32,
    pub name: String,
    pub alias: String,
    pub size: i32,
    pub type_spec: Arc<P4Type>,
}

impl P4Object for P4Register {
    fn id(&self) -> u32 {
        self.id
    }
    fn name(&self) -> &str {
        &self.name
    }
    fn alias(&self) -> &str {
        &self.alias
    }
}

pub struct P4Digest {
    pub id: u32,
    pub name: String,
    pub alias: String,
    pub type_spec: Arc<P4Type>,
}

impl P4Object for P4Digest {
    fn id(&self) -> u32 {
        self.id
    }
    fn name(&self) -> &str {
        &self.name
    }
    fn alias(&self) -> &str {
        &self.alias
    }
}

pub struct P4ValueSet {
    pub id: u32,
    pub name: String,
    pub alias: String,
    pub size: i32,
    pub r#match: P4ObjectMap<P4MatchField>,
}

impl P4Object for P4ValueSet {
    fn id(&self) -> u32 {
        self.id
    }
    fn name(&self) -> &str {
        &self.name
    }
    fn alias(&self) -> &str {
        &self.alias
    }
}

pub struct P4Extern {
    pub extern_type_id: u32,
    pub extern_type_name: String,
    pub instances: P4ObjectMap<P4ExternInstance>,
}

pub struct P4ExternInstance {
    pub id: u32,
    pub name: String,
    pub alias: String,
    pub info: Option<prost_types::Any>,
}

impl P4Object for P4ExternInstance {
    fn id(&self) -> u32 {
        self.id
    }
    fn name(&self) -> &str {
        &self.name
    }
    fn alias(&self) -> &str {
        &self.alias
    }
}

/// Controller packet metadata ("packet_in" / "packet_out") codec.
pub struct P4ControllerPacketMetadata {
    pub id: u32,
    pub name: String,
    pub alias: String,
    pub metadata: P4ObjectMap<P4CPMetadata>,
}

impl P4Object for P4ControllerPacketMetadata {
    fn id(&self) -> u32 {
        self.id
    }
    fn name(&self) -> &str {
        &self.name
    }
    fn alias(&self) -> &str {
        &self.alias
    }
}

impl P4ControllerPacketMetadata {
    /// Encode named metadata values in declaration order. Every declared
    /// field must be present; unknown names are rejected.
    pub fn encode(&self, metadata: &BTreeMap<String, P4Value>) -> Result<Vec<p4r::PacketMetadata>> {
        let mut result = Vec::with_capacity(self.metadata.len());
        for field in self.metadata.iter() {
            let value = metadata.get(&field.name).ok_or_else(|| {
                Error::encoding(format!(
                    "{:?}: missing parameter '{}'",
                    self.alias, field.name
                ))
            })?;
            result.push(field.encode(value)?);
        }
        if metadata.len() > result.len() {
            let extra: Vec<&String> = metadata
                .keys()
                .filter(|key| self.metadata.get_name(key).is_none())
                .collect();
            return Err(Error::encoding(format!(
                "{:?}: extra parameters {:?}",
                self.alias, extra
            )));
        }
        Ok(result)
    }

    pub fn decode(
        &self,
        metadata: &[p4r::PacketMetadata],
    ) -> Result<BTreeMap<String, P4Value>> {
        let mut result = BTreeMap::new();
        for field in metadata {
            let spec = self.metadata.require_id(field.metadata_id)?;
            result.insert(spec.name.clone(), spec.decode(field)?);
        }
        Ok(result)
    }
}

pub struct P4CPMetadata {
    pub id: u32,
    pub name: String,
    pub bitwidth: u32,
    pub type_spec: Option<Arc<P4Type>>,
}

impl P4Object for P4CPMetadata {
    fn id(&self) -> u32 {
        self.id
    }
    fn name(&self) -> &str {
        &self.name
    }
}

impl P4CPMetadata {
    pub fn encode(&self, value: &P4Value) -> Result<p4r::PacketMetadata> {
        Ok(p4r::PacketMetadata {
            metadata_id: self.id,
            value: p4values::encode_exact(value, self.bitwidth)?,
        })
    }

    pub fn decode(&self, data: &p4r::PacketMetadata) -> Result<P4Value> {
        p4values::decode_exact(&data.value, self.bitwidth, DecodeFormat::empty())
    }
}

// ~~~~~~~~~~~~~
// S c h e m a
// ~~~~~~~~~~~~~

/// Source for the P4Info document.
#[derive(Clone, Debug)]
pub enum P4InfoSource {
    /// File path; text vs binary chosen by suffix, then content sniff.
    Path(PathBuf),
    Bytes(Vec<u8>),
}

impl From<PathBuf> for P4InfoSource {
    fn from(path: PathBuf) -> Self {
        P4InfoSource::Path(path)
    }
}

impl From<&Path> for P4InfoSource {
    fn from(path: &Path) -> Self {
        P4InfoSource::Path(path.to_path_buf())
    }
}

/// Source for the target device config blob ("p4blob"). Opaque: the library
/// only hashes and forwards it.
#[derive(Clone, Debug)]
pub enum P4Blob {
    Path(PathBuf),
    Bytes(Vec<u8>),
}

impl P4Blob {
    fn load(&self) -> Result<Vec<u8>> {
        match self {
            P4Blob::Path(path) => std::fs::read(path).map_err(|err| {
                Error::config(format!("cannot read {}: {}", path.display(), err))
            }),
            P4Blob::Bytes(bytes) => Ok(bytes.clone()),
        }
    }
}

fn load_p4info(source: &P4InfoSource) -> Result<p4i::P4Info> {
    let (bytes, is_text) = match source {
        P4InfoSource::Path(path) => {
            let bytes = std::fs::read(path).map_err(|err| {
                Error::config(format!("cannot read {}: {}", path.display(), err))
            })?;
            let is_text = match path.extension().and_then(|ext| ext.to_str()) {
                Some("txtpb") | Some("pbtxt") | Some("txt") => Some(true),
                Some("bin") | Some("pb") => Some(false),
                _ => None,
            };
            (bytes, is_text)
        }
        P4InfoSource::Bytes(bytes) => (bytes.clone(), None),
    };

    let is_text = is_text.unwrap_or_else(|| sniff_text(&bytes));
    if is_text {
        let text = String::from_utf8(bytes)
            .map_err(|_| Error::config("text P4Info is not valid UTF-8"))?;
        textpb::parse_p4info(&text).map_err(|err| Error::config(format!("bad P4Info: {}", err)))
    } else {
        p4i::P4Info::decode(bytes.as_slice())
            .map_err(|err| Error::config(format!("bad P4Info: {}", err)))
    }
}

/// Guess whether a P4Info byte blob is text or binary protobuf. Binary
/// framing starts with a field tag byte (e.g. 0x0a) and embeds lengths; text
/// is printable ASCII throughout.
fn sniff_text(bytes: &[u8]) -> bool {
    bytes
        .iter()
        .take(256)
        .all(|&b| b == b'\n' || b == b'\r' || b == b'\t' || (0x20..0x7f).contains(&b))
}

/// All indexed objects for one P4Info document.
pub struct P4Defs {
    pub tables: P4ObjectMap<P4Table>,
    pub actions: P4ObjectMap<P4Action>,
    pub action_profiles: P4ObjectMap<P4ActionProfile>,
    pub controller_packet_metadata: P4ObjectMap<P4ControllerPacketMetadata>,
    pub counters: P4ObjectMap<P4Counter>,
    pub direct_counters: P4ObjectMap<P4DirectCounter>,
    pub meters: P4ObjectMap<P4Meter>,
    pub direct_meters: P4ObjectMap<P4DirectMeter>,
    pub registers: P4ObjectMap<P4Register>,
    pub digests: P4ObjectMap<P4Digest>,
    pub value_sets: P4ObjectMap<P4ValueSet>,
    pub externs: Vec<P4Extern>,
}

impl P4Defs {
    fn empty() -> Self {
        P4Defs {
            tables: P4ObjectMap::new("table"),
            actions: P4ObjectMap::new("action"),
            action_profiles: P4ObjectMap::new("action profile"),
            controller_packet_metadata: P4ObjectMap::new("controller packet metadata"),
            counters: P4ObjectMap::new("counter"),
            direct_counters: P4ObjectMap::new("direct counter"),
            meters: P4ObjectMap::new("meter"),
            direct_meters: P4ObjectMap::new("direct meter"),
            registers: P4ObjectMap::new("register"),
            digests: P4ObjectMap::new("digest"),
            value_sets: P4ObjectMap::new("value set"),
            externs: Vec::new(),
        }
    }

    fn build(p4info: &p4i::P4Info) -> Result<Self> {
        let mut defs = P4Defs::empty();
        let mut resolver = TypeResolver::new(p4info.type_info.as_ref());

        for action in &p4info.actions {
            let preamble = require_preamble(&action.preamble, "action")?;
            let mut params = P4ObjectMap::new("action parameter");
            for param in &action.params {
                let type_spec = match &param.type_name {
                    Some(named) => Some(resolver.resolve_name(&named.name)?),
                    None => None,
                };
                params.add(
                    Arc::new(P4ActionParam {
                        id: param.id,
                        name: param.name.clone(),
                        bitwidth: param.bitwidth as u32,
                        type_spec,
                    }),
                    false,
                )?;
            }
            defs.actions.add(
                Arc::new(P4Action {
                    id: preamble.id,
                    name: preamble.name.clone(),
                    alias: make_alias(&preamble.alias, &preamble.name),
                    params,
                    annotations: parse_annotations(
                        &preamble.annotations,
                        &preamble.structured_annotations,
                    )?,
                }),
                false,
            )?;
        }

        for profile in &p4info.action_profiles {
            let preamble = require_preamble(&profile.preamble, "action profile")?;
            let max_member_weight = match &profile.selector_size_semantics {
                Some(p4i::action_profile::SelectorSizeSemantics::SumOfMembers(m)) => {
                    Some(m.max_member_weight)
                }
                _ => None,
            };
            defs.action_profiles.add(
                Arc::new(P4ActionProfile {
                    id: preamble.id,
                    name: preamble.name.clone(),
                    alias: make_alias(&preamble.alias, &preamble.name),
                    table_ids: profile.table_ids.clone(),
                    with_selector: profile.with_selector,
                    size: profile.size,
                    max_group_size: profile.max_group_size,
                    max_member_weight,
                    table_names: OnceLock::new(),
                }),
                false,
            )?;
        }

        for counter in &p4info.counters {
            let preamble = require_preamble(&counter.preamble, "counter")?;
            defs.counters.add(
                Arc::new(P4Counter {
                    id: preamble.id,
                    name: preamble.name.clone(),
                    alias: make_alias(&preamble.alias, &preamble.name),
                    size: counter.size,
                    unit: counter_unit(&counter.spec),
                }),
                false,
            )?;
        }

        for counter in &p4info.direct_counters {
            let preamble = require_preamble(&counter.preamble, "direct counter")?;
            defs.direct_counters.add(
                Arc::new(P4DirectCounter {
                    id: preamble.id,
                    name: preamble.name.clone(),
                    alias: make_alias(&preamble.alias, &preamble.name),
                    unit: counter_unit(&counter.spec),
                    direct_table_id: counter.direct_table_id,
                    direct_table_name: OnceLock::new(),
                }),
                false,
            )?;
        }

        for meter in &p4info.meters {
            let preamble = require_preamble(&meter.preamble, "meter")?;
            defs.meters.add(
                Arc::new(P4Meter {
                    id: preamble.id,
                    name: preamble.name.clone(),
                    alias: make_alias(&preamble.alias, &preamble.name),
                    size: meter.size,
                    unit: meter_unit(&meter.spec),
                }),
                false,
            )?;
        }

        for meter in &p4info.direct_meters {
            let preamble = require_preamble(&meter.preamble, "direct meter")?;
            defs.direct_meters.add(
                Arc::new(P4DirectMeter {
                    id: preamble.id,
                    name: preamble.name.clone(),
                    alias: make_alias(&preamble.alias, &preamble.name),
                    unit: meter_unit(&meter.spec),
                    direct_table_id: meter.direct_table_id,
                }),
                false,
            )?;
        }

        for cpm in &p4info.controller_packet_metadata {
            let preamble = require_preamble(&cpm.preamble, "controller packet metadata")?;
            let mut metadata = P4ObjectMap::new("packet metadata field");
            for field in &cpm.metadata {
                let type_spec = match &field.type_name {
                    Some(named) => Some(resolver.resolve_name(&named.name)?),
                    None => None,
                };
                metadata.add(
                    Arc::new(P4CPMetadata {
                        id: field.id,
                        name: field.name.clone(),
                        bitwidth: field.bitwidth as u32,
                        type_spec,
                    }),
                    false,
                )?;
            }
            defs.controller_packet_metadata.add(
                Arc::new(P4ControllerPacketMetadata {
                    id: preamble.id,
                    name: preamble.name.clone(),
                    alias: make_alias(&preamble.alias, &preamble.name),
                    metadata,
                }),
                false,
            )?;
        }

        for register in &p4info.registers {
            let preamble = require_preamble(&register.preamble, "register")?;
            let type_spec = register
                .type_spec
                .as_ref()
                .ok_or_else(|| Error::schema(format!("{}: register without type", preamble.name)))?;
            defs.registers.add(
                Arc::new(P4Register {
                    id: preamble.id,
                    name: preamble.name.clone(),
                    alias: make_alias(&preamble.alias, &preamble.name),
                    size: register.size,
                    type_spec: resolver.resolve_spec(type_spec)?,
                }),
                false,
            )?;
        }

        for digest in &p4info.digests {
            let preamble = require_preamble(&digest.preamble, "digest")?;
            let type_spec = digest
                .type_spec
                .as_ref()
                .ok_or_else(|| Error::schema(format!("{}: digest without type", preamble.name)))?;
            defs.digests.add(
                Arc::new(P4Digest {
                    id: preamble.id,
                    name: preamble.name.clone(),
                    alias: make_alias(&preamble.alias, &preamble.name),
                    type_spec: resolver.resolve_spec(type_spec)?,
                }),
                false,
            )?;
        }

        for value_set in &p4info.value_sets {
            let preamble = require_preamble(&value_set.preamble, "value set")?;
            let mut fields = P4ObjectMap::new("match field");
            for field in &value_set.r#match {
                fields.add(Arc::new(P4MatchField::from_proto(field, &mut resolver)?), false)?;
            }
            defs.value_sets.add(
                Arc::new(P4ValueSet {
                    id: preamble.id,
                    name: preamble.name.clone(),
                    alias: make_alias(&preamble.alias, &preamble.name),
                    size: value_set.size,
                    r#match: fields,
                }),
                false,
            )?;
        }

        for ext in &p4info.externs {
            let mut instances = P4ObjectMap::new("extern instance");
            for instance in &ext.instances {
                let preamble = require_preamble(&instance.preamble, "extern instance")?;
                instances.add(
                    Arc::new(P4ExternInstance {
                        id: preamble.id,
                        name: preamble.name.clone(),
                        alias: make_alias(&preamble.alias, &preamble.name),
                        info: instance.info.clone(),
                    }),
                    false,
                )?;
            }
            defs.externs.push(P4Extern {
                extern_type_id: ext.extern_type_id,
                extern_type_name: ext.extern_type_name.clone(),
                instances,
            });
        }

        for table in &p4info.tables {
            let preamble = require_preamble(&table.preamble, "table")?;

            let mut match_fields = P4ObjectMap::new("match field");
            for field in &table.match_fields {
                match_fields
                    .add(Arc::new(P4MatchField::from_proto(field, &mut resolver)?), false)?;
            }

            let mut actions = P4ObjectMap::new("table action");
            for action_ref in &table.action_refs {
                let action = defs.actions.require_id(action_ref.id)?.clone();
                let scope = match p4i::action_ref::Scope::from_i32(action_ref.scope) {
                    Some(p4i::action_ref::Scope::TableOnly) => P4ActionScope::TableOnly,
                    Some(p4i::action_ref::Scope::DefaultOnly) => P4ActionScope::DefaultOnly,
                    _ => P4ActionScope::TableAndDefault,
                };
                actions.add(Arc::new(P4ActionRef { action, scope }), true)?;
            }

            let const_default_action = if table.const_default_action_id != 0 {
                Some(
                    defs.actions
                        .require_id(table.const_default_action_id)?
                        .clone(),
                )
            } else {
                None
            };

            let action_profile = if table.implementation_id != 0 {
                Some(
                    defs.action_profiles
                        .require_id(table.implementation_id)?
                        .clone(),
                )
            } else {
                None
            };

            let mut direct_counter = None;
            let mut direct_meter = None;
            for resource_id in &table.direct_resource_ids {
                if let Some(counter) = defs.direct_counters.get_id(*resource_id) {
                    direct_counter = Some(counter.clone());
                } else if let Some(meter) = defs.direct_meters.get_id(*resource_id) {
                    direct_meter = Some(meter.clone());
                } else {
                    return Err(Error::schema(format!(
                        "{}: unknown direct resource id {}",
                        preamble.name, resource_id
                    )));
                }
            }

            let idle_timeout_behavior =
                match p4i::table::IdleTimeoutBehavior::from_i32(table.idle_timeout_behavior) {
                    Some(p4i::table::IdleTimeoutBehavior::NotifyControl) => {
                        P4IdleTimeoutBehavior::NotifyControl
                    }
                    _ => P4IdleTimeoutBehavior::NoTimeout,
                };

            defs.tables.add(
                Arc::new(P4Table {
                    id: preamble.id,
                    name: preamble.name.clone(),
                    alias: make_alias(&preamble.alias, &preamble.name),
                    size: table.size,
                    is_const: table.is_const_table,
                    has_initial_entries: table.has_initial_entries,
                    idle_timeout_behavior,
                    match_fields,
                    actions,
                    const_default_action,
                    action_profile,
                    direct_counter,
                    direct_meter,
                }),
                false,
            )?;
        }

        // Back-fill cross references now that tables exist.
        for profile in defs.action_profiles.iter() {
            let mut names: Vec<String> = profile
                .table_ids
                .iter()
                .filter_map(|id| defs.tables.get_id(*id).map(|t| t.alias.clone()))
                .collect();
            names.sort();
            let _ = profile.table_names.set(names);
        }
        for counter in defs.direct_counters.iter() {
            if let Some(table) = defs.tables.get_id(counter.direct_table_id) {
                let _ = counter.direct_table_name.set(table.name.clone());
            } else {
                log::warn!(
                    "direct counter {:?} names unknown table id {}",
                    counter.name,
                    counter.direct_table_id
                );
            }
        }

        Ok(defs)
    }
}

fn require_preamble<'m>(
    preamble: &'m Option<p4i::Preamble>,
    kind: &str,
) -> Result<&'m p4i::Preamble> {
    preamble
        .as_ref()
        .ok_or_else(|| Error::schema(format!("{} without preamble", kind)))
}

fn counter_unit(spec: &Option<p4i::CounterSpec>) -> P4CounterUnit {
    match spec
        .as_ref()
        .and_then(|s| p4i::counter_spec::Unit::from_i32(s.unit))
    {
        Some(p4i::counter_spec::Unit::Bytes) => P4CounterUnit::Bytes,
        Some(p4i::counter_spec::Unit::Packets) => P4CounterUnit::Packets,
        Some(p4i::counter_spec::Unit::Both) => P4CounterUnit::Both,
        _ => P4CounterUnit::Unspecified,
    }
}

fn meter_unit(spec: &Option<p4i::MeterSpec>) -> P4MeterUnit {
    match spec
        .as_ref()
        .and_then(|s| p4i::meter_spec::Unit::from_i32(s.unit))
    {
        Some(p4i::meter_spec::Unit::Bytes) => P4MeterUnit::Bytes,
        Some(p4i::meter_spec::Unit::Packets) => P4MeterUnit::Packets,
        _ => P4MeterUnit::Unspecified,
    }
}

/// One loaded pipeline schema plus the device config blob and their cookie.
pub struct P4Schema {
    p4info: Option<p4i::P4Info>,
    device_config: Vec<u8>,
    defs: P4Defs,
    cookie: u64,
}

impl P4Schema {
    /// An unconfigured schema (no P4Info yet).
    pub fn empty() -> Self {
        P4Schema {
            p4info: None,
            device_config: Vec::new(),
            defs: P4Defs::empty(),
            cookie: 0,
        }
    }

    pub fn load(p4info: Option<&P4InfoSource>, p4blob: Option<&P4Blob>) -> Result<Self> {
        let p4info = p4info.map(load_p4info).transpose()?;
        let device_config = p4blob.map(|blob| blob.load()).transpose()?.unwrap_or_default();
        match p4info {
            Some(p4info) => Self::from_p4info(p4info, device_config),
            None => {
                if !device_config.is_empty() {
                    return Err(Error::config("p4blob configured without p4info"));
                }
                Ok(Self::empty())
            }
        }
    }

    pub fn from_p4info(p4info: p4i::P4Info, device_config: Vec<u8>) -> Result<Self> {
        let defs = P4Defs::build(&p4info)?;
        let cookie = compute_cookie(&p4info, &device_config);
        Ok(P4Schema {
            p4info: Some(p4info),
            device_config,
            defs,
            cookie,
        })
    }

    /// Adopt the P4Info returned by the device (backup role, or discovery).
    pub fn set_p4info(&mut self, p4info: p4i::P4Info) -> Result<()> {
        *self = Self::from_p4info(p4info, std::mem::take(&mut self.device_config))?;
        Ok(())
    }

    pub fn is_configured(&self) -> bool {
        self.p4info.is_some()
    }

    pub fn p4info(&self) -> Result<&p4i::P4Info> {
        self.p4info
            .as_ref()
            .ok_or_else(|| Error::config("no P4Info configured"))
    }

    pub fn cookie(&self) -> u64 {
        self.cookie
    }

    pub fn device_config(&self) -> &[u8] {
        &self.device_config
    }

    /// The full ForwardingPipelineConfig for SetForwardingPipelineConfig.
    pub fn pipeline_config(&self) -> Result<p4r::ForwardingPipelineConfig> {
        Ok(p4r::ForwardingPipelineConfig {
            p4info: Some(self.p4info()?.clone()),
            p4_device_config: self.device_config.clone(),
            cookie: Some(p4r::forwarding_pipeline_config::Cookie {
                cookie: self.cookie,
            }),
        })
    }

    /// Concise pipeline description for logging.
    pub fn pipeline_info(&self) -> String {
        if self.is_configured() {
            format!(
                "pipeline={:?} version={:?} arch={:?}",
                self.name(),
                self.version(),
                self.arch()
            )
        } else {
            "<no pipeline configured>".to_string()
        }
    }

    pub fn name(&self) -> &str {
        self.pkg_info().map(|p| p.name.as_str()).unwrap_or("")
    }

    pub fn version(&self) -> &str {
        self.pkg_info().map(|p| p.version.as_str()).unwrap_or("")
    }

    pub fn arch(&self) -> &str {
        self.pkg_info().map(|p| p.arch.as_str()).unwrap_or("")
    }

    fn pkg_info(&self) -> Option<&p4i::PkgInfo> {
        self.p4info.as_ref().and_then(|info| info.pkg_info.as_ref())
    }

    pub fn tables(&self) -> &P4ObjectMap<P4Table> {
        &self.defs.tables
    }

    pub fn actions(&self) -> &P4ObjectMap<P4Action> {
        &self.defs.actions
    }

    pub fn action_profiles(&self) -> &P4ObjectMap<P4ActionProfile> {
        &self.defs.action_profiles
    }

    pub fn controller_packet_metadata(&self) -> &P4ObjectMap<P4ControllerPacketMetadata> {
        &self.defs.controller_packet_metadata
    }

    pub fn counters(&self) -> &P4ObjectMap<P4Counter> {
        &self.defs.counters
    }

    pub fn direct_counters(&self) -> &P4ObjectMap<P4DirectCounter> {
        &self.defs.direct_counters
    }

    pub fn meters(&self) -> &P4ObjectMap<P4Meter> {
        &self.defs.meters
    }

    pub fn direct_meters(&self) -> &P4ObjectMap<P4DirectMeter> {
        &self.defs.direct_meters
    }

    pub fn registers(&self) -> &P4ObjectMap<P4Register> {
        &self.defs.registers
    }

    pub fn digests(&self) -> &P4ObjectMap<P4Digest> {
        &self.defs.digests
    }

    pub fn value_sets(&self) -> &P4ObjectMap<P4ValueSet> {
        &self.defs.value_sets
    }

    pub fn externs(&self) -> &[P4Extern] {
        &self.defs.externs
    }
}

fn compute_cookie(p4info: &p4i::P4Info, device_config: &[u8]) -> u64 {
    let mut hasher = Sha256::new();
    hasher.update(p4info.encode_to_vec());
    hasher.update(device_config);
    let digest = hasher.finalize();
    u64::from_be_bytes(digest[0..8].try_into().unwrap())
}

impl fmt::Display for P4Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.is_configured() {
            return write!(f, "<no pipeline configured>");
        }
        writeln!(
            f,
            "{} (version={}, arch={})",
            if self.name().is_empty() { "<unnamed>" } else { self.name() },
            self.version(),
            self.arch()
        )?;
        for table in self.tables().iter() {
            writeln!(f, "{}", table)?;
        }
        for profile in self.action_profiles().iter() {
            writeln!(f, "{}", profile)?;
        }
        for cpm in self.controller_packet_metadata().iter() {
            let fields = cpm
                .metadata
                .iter()
                .map(|m| format!("{}:{}", m.name, m.bitwidth))
                .join(" ");
            writeln!(f, "packet_metadata {}: {}", cpm.alias, fields)?;
        }
        for digest in self.digests().iter() {
            writeln!(f, "digest {}: {}", digest.alias, digest.type_spec.type_name())?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testlib;

    #[test]
    fn schema_indexes_names_ids_and_aliases() {
        let schema = testlib::schema();

        let table = schema.tables().require_name("l2_exact_table").unwrap();
        assert_eq!(table.id, testlib::L2_EXACT_TABLE_ID);
        assert_eq!(table.name, "ingress.l2_exact_table");
        assert!(Arc::ptr_eq(
            table,
            schema.tables().require_name("ingress.l2_exact_table").unwrap()
        ));
        assert!(Arc::ptr_eq(
            table,
            schema.tables().require_id(testlib::L2_EXACT_TABLE_ID).unwrap()
        ));

        let action = schema.actions().require_name("set_egress_port").unwrap();
        assert_eq!(action.id, testlib::SET_EGRESS_PORT_ID);
        assert_eq!(action.params.require_name("port_num").unwrap().bitwidth, 9);
    }

    #[test]
    fn unknown_names_suggest_suffix_matches() {
        let schema = testlib::schema();
        let err = schema.tables().require_name("l2_exact").unwrap_err();
        assert!(err.to_string().contains("no table named"));

        let err = schema
            .actions()
            .require_name("set_egress_portx")
            .unwrap_err();
        assert!(err.to_string().contains("no action named"));
    }

    #[test]
    fn duplicate_ids_are_fatal() {
        let mut p4info = testlib::p4info();
        let duplicate = p4info.tables[0].clone();
        p4info.tables.push(duplicate);
        assert!(P4Schema::from_p4info(p4info, Vec::new()).is_err());
    }

    #[test]
    fn requires_priority_flags_non_exact_tables() {
        let schema = testlib::schema();
        assert!(!schema
            .tables()
            .require_name("l2_exact_table")
            .unwrap()
            .requires_priority());
        assert!(schema
            .tables()
            .require_name("acl_table")
            .unwrap()
            .requires_priority());
    }

    #[test]
    fn annotation_parsing() {
        let annotation = parse_unstructured_annotation("@format(MAC_ADDRESS)").unwrap();
        assert_eq!(annotation.name, "format");
        assert_eq!(
            annotation.body,
            P4AnnotationBody::Unstructured("MAC_ADDRESS".to_string())
        );

        let annotation = parse_unstructured_annotation("@hidden").unwrap();
        assert_eq!(annotation.body, P4AnnotationBody::Empty);

        // Bodies may span lines and contain nested parens.
        let annotation =
            parse_unstructured_annotation("@doc(first line\nsecond (nested) line)").unwrap();
        assert_eq!(
            annotation.body,
            P4AnnotationBody::Unstructured("first line\nsecond (nested) line".to_string())
        );

        assert!(parse_unstructured_annotation("format").is_err());
        assert!(parse_unstructured_annotation("@bad(unclosed").is_err());
    }

    #[test]
    fn new_type_resolution_is_transitive() {
        let schema = testlib::schema();
        let digest = schema.digests().require_name("digest_t").unwrap();
        let P4Type::Struct { members, .. } = digest.type_spec.as_ref() else {
            panic!("digest type should resolve to a struct");
        };
        // port member is declared through the PortId_t new_type chain and
        // must resolve to a 32-bit bitstring.
        let (_, port_type) = members.iter().find(|(n, _)| n == "port").unwrap();
        assert_eq!(port_type.bitwidth(), Some(32));
    }

    #[test]
    fn cookie_is_stable_and_blob_sensitive() {
        let a = P4Schema::from_p4info(testlib::p4info(), Vec::new()).unwrap();
        let b = P4Schema::from_p4info(testlib::p4info(), Vec::new()).unwrap();
        assert_eq!(a.cookie(), b.cookie());
        assert_ne!(a.cookie(), 0);

        let c = P4Schema::from_p4info(testlib::p4info(), b"blob".to_vec()).unwrap();
        assert_ne!(a.cookie(), c.cookie());
    }

    #[test]
    fn match_field_dont_care_normalization() {
        let schema = testlib::schema();
        let table = schema.tables().require_name("acl_table").unwrap();
        let field = table.match_fields.require_name("ipv4_src").unwrap();

        // All-zero ternary mask means "field absent".
        let wildcard = P4Value::Masked(Box::new(P4Value::Int(0)), Box::new(P4Value::Int(0)));
        assert!(field.encode_field(&wildcard).unwrap().is_none());

        let lpm_table = schema.tables().require_name("routing_v6_table").unwrap();
        let lpm_field = lpm_table.match_fields.require_name("dst_addr").unwrap();
        let wildcard = P4Value::Lpm(Box::new(P4Value::Int(0)), 0);
        assert!(lpm_field.encode_field(&wildcard).unwrap().is_none());
    }

    #[test]
    fn serializable_enum_round_trip() {
        let schema = testlib::schema();
        let register = schema.registers().require_name("mode_reg").unwrap();
        let data = register
            .type_spec
            .encode_data(&P4Value::Str("MODE_B".to_string()))
            .unwrap();
        assert_eq!(
            register.type_spec.decode_data(&data).unwrap(),
            P4Value::Str("MODE_B".to_string())
        );
    }

    #[test]
    fn text_and_binary_p4info_load_identically() {
        let text = testlib::p4info_text();
        let from_text = load_p4info(&P4InfoSource::Bytes(text.into_bytes())).unwrap();
        assert_eq!(from_text.tables.len(), 1);
        assert_eq!(
            from_text.tables[0].preamble.as_ref().unwrap().name,
            "ingress.l2_exact_table"
        );

        let binary = from_text.encode_to_vec();
        let from_binary = load_p4info(&P4InfoSource::Bytes(binary)).unwrap();
        assert_eq!(from_text, from_binary);
    }
}
