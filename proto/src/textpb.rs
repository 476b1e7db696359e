//! Reader for P4Info documents in protobuf text format.
//!
//! p4c emits the pipeline schema as `*.p4info.txtpb`. prost has no text
//! format support, so this module parses the text grammar into a generic
//! field tree and binds the tree onto the `p4info`/`p4types` structs.
//!
//! The reader accepts the full scalar syntax (signed/hex integers, string
//! literals with octal/hex/unicode escapes and adjacent-literal
//! concatenation, enum values by name or number), `{}`/`<>` message bodies,
//! `[...]` lists, optional `:` before message bodies, `,`/`;` separators and
//! `#` comments. Fields that the binder does not know are skipped, so a
//! schema produced by a newer p4c still loads.

use std::collections::BTreeMap;
use std::fmt;

use crate::p4info;
use crate::p4types;

/// Error raised for malformed text input.
#[derive(Debug)]
pub struct TextError {
    message: String,
    line: usize,
}

impl TextError {
    fn new(message: impl Into<String>, line: usize) -> Self {
        TextError {
            message: message.into(),
            line,
        }
    }
}

impl fmt::Display for TextError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}: {}", self.line, self.message)
    }
}

impl std::error::Error for TextError {}

type Result<T> = std::result::Result<T, TextError>;

// ~~~~~~~~~~~~~
// L e x e r
// ~~~~~~~~~~~~~

#[derive(Clone, Debug, PartialEq)]
enum Token {
    Ident(String),
    Int(i128),
    /// String literal, unescaped to raw bytes.
    Str(Vec<u8>),
    Punct(char),
}

struct Lexer<'a> {
    input: &'a [u8],
    pos: usize,
    line: usize,
}

impl<'a> Lexer<'a> {
    fn new(input: &'a str) -> Self {
        Lexer {
            input: input.as_bytes(),
            pos: 0,
            line: 1,
        }
    }

    fn err(&self, message: impl Into<String>) -> TextError {
        TextError::new(message, self.line)
    }

    fn peek_byte(&self) -> Option<u8> {
        self.input.get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<u8> {
        let b = self.peek_byte()?;
        self.pos += 1;
        if b == b'\n' {
            self.line += 1;
        }
        Some(b)
    }

    fn skip_ws(&mut self) {
        while let Some(b) = self.peek_byte() {
            match b {
                b' ' | b'\t' | b'\r' | b'\n' => {
                    self.bump();
                }
                b'#' => {
                    while let Some(c) = self.bump() {
                        if c == b'\n' {
                            break;
                        }
                    }
                }
                _ => return,
            }
        }
    }

    fn next_token(&mut self) -> Result<Option<Token>> {
        self.skip_ws();
        let Some(b) = self.peek_byte() else {
            return Ok(None);
        };

        match b {
            b'{' | b'}' | b'<' | b'>' | b'[' | b']' | b':' | b';' | b',' => {
                self.bump();
                Ok(Some(Token::Punct(b as char)))
            }
            b'"' | b'\'' => self.string_literal().map(Some),
            b'-' | b'0'..=b'9' => self.number().map(Some),
            b'_' | b'a'..=b'z' | b'A'..=b'Z' => Ok(Some(self.ident())),
            other => Err(self.err(format!("unexpected character {:?}", other as char))),
        }
    }

    fn ident(&mut self) -> Token {
        let start = self.pos;
        while let Some(b) = self.peek_byte() {
            if b == b'_' || b == b'.' || b.is_ascii_alphanumeric() {
                self.bump();
            } else {
                break;
            }
        }
        Token::Ident(String::from_utf8_lossy(&self.input[start..self.pos]).into_owned())
    }

    fn number(&mut self) -> Result<Token> {
        let start = self.pos;
        let negative = self.peek_byte() == Some(b'-');
        if negative {
            self.bump();
        }

        let hex = self.input[self.pos..].starts_with(b"0x")
            || self.input[self.pos..].starts_with(b"0X");
        if hex {
            self.bump();
            self.bump();
        }

        while let Some(b) = self.peek_byte() {
            if b.is_ascii_hexdigit() && (hex || b.is_ascii_digit()) {
                self.bump();
            } else {
                break;
            }
        }

        let text = std::str::from_utf8(&self.input[start..self.pos])
            .map_err(|_| self.err("invalid number"))?;
        let value = if hex {
            let digits = text.trim_start_matches('-');
            let magnitude = i128::from_str_radix(&digits[2..], 16)
                .map_err(|_| self.err(format!("invalid number {:?}", text)))?;
            if negative {
                -magnitude
            } else {
                magnitude
            }
        } else {
            text.parse::<i128>()
                .map_err(|_| self.err(format!("invalid number {:?}", text)))?
        };
        Ok(Token::Int(value))
    }

    fn string_literal(&mut self) -> Result<Token> {
        let mut out = Vec::new();
        loop {
            let quote = match self.peek_byte() {
                Some(q @ (b'"' | b'\'')) => q,
                _ => break, // no adjacent literal follows
            };
            self.bump();
            loop {
                let b = self.bump().ok_or_else(|| self.err("unterminated string"))?;
                if b == quote {
                    break;
                }
                if b != b'\\' {
                    out.push(b);
                    continue;
                }
                let esc = self.bump().ok_or_else(|| self.err("unterminated escape"))?;
                match esc {
                    b'n' => out.push(b'\n'),
                    b'r' => out.push(b'\r'),
                    b't' => out.push(b'\t'),
                    b'a' => out.push(0x07),
                    b'b' => out.push(0x08),
                    b'f' => out.push(0x0c),
                    b'v' => out.push(0x0b),
                    b'?' => out.push(b'?'),
                    b'\\' | b'\'' | b'"' | b'/' => out.push(esc),
                    b'x' | b'X' => {
                        let value = self.hex_digits(2)?;
                        out.push(value as u8);
                    }
                    b'u' => {
                        let value = self.hex_digits(4)?;
                        self.push_char(&mut out, value)?;
                    }
                    b'U' => {
                        let value = self.hex_digits(8)?;
                        self.push_char(&mut out, value)?;
                    }
                    b'0'..=b'7' => {
                        let mut value = (esc - b'0') as u32;
                        for _ in 0..2 {
                            match self.peek_byte() {
                                Some(d @ b'0'..=b'7') => {
                                    self.bump();
                                    value = value * 8 + (d - b'0') as u32;
                                }
                                _ => break,
                            }
                        }
                        out.push(value as u8);
                    }
                    other => {
                        return Err(
                            self.err(format!("invalid escape \\{}", other as char))
                        )
                    }
                }
            }
            self.skip_ws();
        }
        Ok(Token::Str(out))
    }

    fn hex_digits(&mut self, count: usize) -> Result<u32> {
        let mut value = 0u32;
        for _ in 0..count {
            let b = self.bump().ok_or_else(|| self.err("truncated escape"))?;
            let digit = (b as char)
                .to_digit(16)
                .ok_or_else(|| self.err("invalid hex escape"))?;
            value = value * 16 + digit;
        }
        Ok(value)
    }

    fn push_char(&self, out: &mut Vec<u8>, value: u32) -> Result<()> {
        let ch = char::from_u32(value).ok_or_else(|| self.err("invalid unicode escape"))?;
        let mut buf = [0u8; 4];
        out.extend_from_slice(ch.encode_utf8(&mut buf).as_bytes());
        Ok(())
    }
}

// ~~~~~~~~~~~~~~~~~~~~~~~
// G e n e r i c   t r e e
// ~~~~~~~~~~~~~~~~~~~~~~~

#[derive(Clone, Debug)]
enum Value {
    Message(Message),
    Int(i128),
    Ident(String),
    Bytes(Vec<u8>),
}

#[derive(Clone, Debug, Default)]
struct Message {
    fields: Vec<(String, Value)>,
    line: usize,
}

struct Parser<'a> {
    lexer: Lexer<'a>,
    lookahead: Option<Token>,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str) -> Result<Self> {
        let mut lexer = Lexer::new(input);
        let lookahead = lexer.next_token()?;
        Ok(Parser { lexer, lookahead })
    }

    fn advance(&mut self) -> Result<Option<Token>> {
        let next = self.lexer.next_token()?;
        Ok(std::mem::replace(&mut self.lookahead, next))
    }

    fn eat_punct(&mut self, c: char) -> Result<bool> {
        if self.lookahead == Some(Token::Punct(c)) {
            self.advance()?;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    fn err(&self, message: impl Into<String>) -> TextError {
        self.lexer.err(message)
    }

    /// Parse the top-level document: a message body without braces.
    fn document(&mut self) -> Result<Message> {
        let msg = self.fields(None)?;
        if self.lookahead.is_some() {
            return Err(self.err("trailing input"));
        }
        Ok(msg)
    }

    fn fields(&mut self, close: Option<char>) -> Result<Message> {
        let mut msg = Message {
            fields: Vec::new(),
            line: self.lexer.line,
        };
        loop {
            // Optional separators between fields.
            while self.eat_punct(';')? || self.eat_punct(',')? {}

            match &self.lookahead {
                None => {
                    if close.is_some() {
                        return Err(self.err("unterminated message"));
                    }
                    return Ok(msg);
                }
                Some(Token::Punct(c)) if Some(*c) == close => {
                    self.advance()?;
                    return Ok(msg);
                }
                Some(Token::Ident(_)) => {
                    let (name, value) = self.field()?;
                    msg.fields.push((name, value));
                }
                Some(other) => {
                    return Err(self.err(format!("expected field name, got {:?}", other)))
                }
            }
        }
    }

    fn field(&mut self) -> Result<(String, Value)> {
        let name = match self.advance()? {
            Some(Token::Ident(name)) => name,
            _ => unreachable!("caller checked for an identifier"),
        };

        if self.eat_punct(':')? {
            // Scalar, list, or message (colon before a body is legal).
            match self.lookahead.clone() {
                Some(Token::Punct('{')) | Some(Token::Punct('<')) => {
                    Ok((name, self.message_body()?))
                }
                Some(Token::Punct('[')) => {
                    // Lists desugar to repeated single fields.
                    self.advance()?;
                    let mut values = Vec::new();
                    if !self.eat_punct(']')? {
                        loop {
                            let item = match self.lookahead {
                                Some(Token::Punct('{')) | Some(Token::Punct('<')) => {
                                    self.message_body()?
                                }
                                _ => self.scalar()?,
                            };
                            values.push(item);
                            if self.eat_punct(']')? {
                                break;
                            }
                            if !self.eat_punct(',')? {
                                return Err(self.err("expected ',' or ']' in list"));
                            }
                        }
                    }
                    Ok((name, Value::Message(list_message(name.clone(), values))))
                }
                _ => Ok((name, self.scalar()?)),
            }
        } else {
            Ok((name, self.message_body()?))
        }
    }

    fn message_body(&mut self) -> Result<Value> {
        match self.advance()? {
            Some(Token::Punct('{')) => Ok(Value::Message(self.fields(Some('}'))?)),
            Some(Token::Punct('<')) => Ok(Value::Message(self.fields(Some('>'))?)),
            other => Err(self.err(format!("expected message body, got {:?}", other))),
        }
    }

    fn scalar(&mut self) -> Result<Value> {
        match self.advance()? {
            Some(Token::Int(v)) => Ok(Value::Int(v)),
            Some(Token::Ident(v)) => Ok(Value::Ident(v)),
            Some(Token::Str(v)) => Ok(Value::Bytes(v)),
            other => Err(self.err(format!("expected value, got {:?}", other))),
        }
    }
}

/// Wrap `[a, b, c]` as a message whose repeated field `name` holds the items,
/// so the binder sees the same shape as repeated `name: a name: b` fields.
fn list_message(name: String, values: Vec<Value>) -> Message {
    Message {
        fields: values.into_iter().map(|v| (name.clone(), v)).collect(),
        line: 0,
    }
}

// ~~~~~~~~~~~~~~~~~~~
// T r e e   a c c e s s
// ~~~~~~~~~~~~~~~~~~~

impl Message {
    fn err(&self, message: impl Into<String>) -> TextError {
        TextError::new(message, self.line)
    }

    fn get(&self, name: &str) -> Option<&Value> {
        self.fields.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    fn each<'m>(&'m self, name: &'m str) -> impl Iterator<Item = &'m Value> {
        // A repeated field appears either as N single fields or as one
        // bracketed list (see `list_message`).
        self.fields
            .iter()
            .filter(move |(n, _)| n == name)
            .flat_map(|(n, v)| match v {
                Value::Message(m) if m.line == 0 && m.fields.iter().all(|(fi, _)| fi == n) => {
                    list_values(m)
                }
                other => vec![other],
            })
    }

    fn messages<'m>(&'m self, name: &'m str) -> impl Iterator<Item = Result<&'m Message>> {
        let line = self.line;
        self.each(name).map(move |v| match v {
            Value::Message(m) => Ok(m),
            _ => Err(TextError::new(format!("field {:?} is not a message", name), line)),
        })
    }

    fn message(&self, name: &str) -> Result<Option<&Message>> {
        match self.get(name) {
            None => Ok(None),
            Some(Value::Message(m)) => Ok(Some(m)),
            Some(_) => Err(self.err(format!("field {:?} is not a message", name))),
        }
    }

    fn int(&self, name: &str) -> Result<i128> {
        match self.get(name) {
            None => Ok(0),
            Some(Value::Int(v)) => Ok(*v),
            Some(_) => Err(self.err(format!("field {:?} is not an integer", name))),
        }
    }

    fn uint32(&self, name: &str) -> Result<u32> {
        u32::try_from(self.int(name)?)
            .map_err(|_| self.err(format!("field {:?} out of range", name)))
    }

    fn int32(&self, name: &str) -> Result<i32> {
        i32::try_from(self.int(name)?)
            .map_err(|_| self.err(format!("field {:?} out of range", name)))
    }

    fn int64(&self, name: &str) -> Result<i64> {
        i64::try_from(self.int(name)?)
            .map_err(|_| self.err(format!("field {:?} out of range", name)))
    }

    fn boolean(&self, name: &str) -> Result<bool> {
        match self.get(name) {
            None => Ok(false),
            Some(Value::Ident(v)) if v == "true" => Ok(true),
            Some(Value::Ident(v)) if v == "false" => Ok(false),
            Some(Value::Int(v)) => Ok(*v != 0),
            Some(_) => Err(self.err(format!("field {:?} is not a bool", name))),
        }
    }

    fn string(&self, name: &str) -> Result<String> {
        match self.get(name) {
            None => Ok(String::new()),
            Some(v) => value_string(v)
                .ok_or_else(|| self.err(format!("field {:?} is not a string", name))),
        }
    }

    fn strings(&self, name: &str) -> Result<Vec<String>> {
        self.each(name)
            .map(|v| {
                value_string(v)
                    .ok_or_else(|| self.err(format!("field {:?} is not a string", name)))
            })
            .collect()
    }

    fn bytes(&self, name: &str) -> Result<Vec<u8>> {
        match self.get(name) {
            None => Ok(Vec::new()),
            Some(Value::Bytes(v)) => Ok(v.clone()),
            Some(_) => Err(self.err(format!("field {:?} is not bytes", name))),
        }
    }

    fn enum_value(&self, name: &str, values: &[(&str, i32)]) -> Result<i32> {
        match self.get(name) {
            None => Ok(0),
            Some(Value::Int(v)) => i32::try_from(*v)
                .map_err(|_| self.err(format!("field {:?} out of range", name))),
            Some(Value::Ident(id)) => values
                .iter()
                .find(|(n, _)| n == id)
                .map(|(_, v)| *v)
                .ok_or_else(|| self.err(format!("unknown enum value {:?} for {:?}", id, name))),
            Some(_) => Err(self.err(format!("field {:?} is not an enum", name))),
        }
    }
}

fn list_values(m: &Message) -> Vec<&Value> {
    m.fields.iter().map(|(_, v)| v).collect()
}

fn value_string(v: &Value) -> Option<String> {
    match v {
        Value::Bytes(b) => String::from_utf8(b.clone()).ok(),
        Value::Ident(s) => Some(s.clone()),
        _ => None,
    }
}

// ~~~~~~~~~~~~~
// B i n d e r
// ~~~~~~~~~~~~~

const MATCH_TYPES: &[(&str, i32)] = &[
    ("UNSPECIFIED", 0),
    ("EXACT", 2),
    ("LPM", 3),
    ("TERNARY", 4),
    ("RANGE", 5),
    ("OPTIONAL", 6),
];

const IDLE_TIMEOUT_BEHAVIORS: &[(&str, i32)] = &[("NO_TIMEOUT", 0), ("NOTIFY_CONTROL", 1)];

const ACTION_SCOPES: &[(&str, i32)] =
    &[("TABLE_AND_DEFAULT", 0), ("TABLE_ONLY", 1), ("DEFAULT_ONLY", 2)];

const COUNTER_UNITS: &[(&str, i32)] =
    &[("UNSPECIFIED", 0), ("BYTES", 1), ("PACKETS", 2), ("BOTH", 3)];

const METER_UNITS: &[(&str, i32)] = &[("UNSPECIFIED", 0), ("BYTES", 1), ("PACKETS", 2)];

/// Parse a P4Info document from protobuf text format.
pub fn parse_p4info(input: &str) -> std::result::Result<p4info::P4Info, TextError> {
    let doc = Parser::new(input)?.document()?;
    bind_p4info(&doc)
}

fn bind_p4info(msg: &Message) -> Result<p4info::P4Info> {
    Ok(p4info::P4Info {
        pkg_info: bind_opt(msg, "pkg_info", bind_pkg_info)?,
        tables: bind_all(msg, "tables", bind_table)?,
        actions: bind_all(msg, "actions", bind_action)?,
        action_profiles: bind_all(msg, "action_profiles", bind_action_profile)?,
        counters: bind_all(msg, "counters", bind_counter)?,
        direct_counters: bind_all(msg, "direct_counters", bind_direct_counter)?,
        meters: bind_all(msg, "meters", bind_meter)?,
        direct_meters: bind_all(msg, "direct_meters", bind_direct_meter)?,
        controller_packet_metadata: bind_all(
            msg,
            "controller_packet_metadata",
            bind_controller_packet_metadata,
        )?,
        value_sets: bind_all(msg, "value_sets", bind_value_set)?,
        registers: bind_all(msg, "registers", bind_register)?,
        digests: bind_all(msg, "digests", bind_digest)?,
        externs: Vec::new(), // extern instances carry Any payloads; not read from text
        type_info: bind_opt(msg, "type_info", bind_type_info)?,
    })
}

fn bind_all<T>(msg: &Message, name: &str, f: fn(&Message) -> Result<T>) -> Result<Vec<T>> {
    msg.messages(name).map(|m| f(m?)).collect()
}

fn bind_opt<T>(msg: &Message, name: &str, f: fn(&Message) -> Result<T>) -> Result<Option<T>> {
    msg.message(name)?.map(f).transpose()
}

fn bind_doc(msg: &Message) -> Result<p4info::Documentation> {
    Ok(p4info::Documentation {
        brief: msg.string("brief")?,
        description: msg.string("description")?,
    })
}

fn bind_pkg_info(msg: &Message) -> Result<p4info::PkgInfo> {
    Ok(p4info::PkgInfo {
        name: msg.string("name")?,
        version: msg.string("version")?,
        doc: bind_opt(msg, "doc", bind_doc)?,
        annotations: msg.strings("annotations")?,
        arch: msg.string("arch")?,
        organization: msg.string("organization")?,
        contact: msg.string("contact")?,
        url: msg.string("url")?,
        structured_annotations: bind_all(
            msg,
            "structured_annotations",
            bind_structured_annotation,
        )?,
    })
}

fn bind_preamble(msg: &Message) -> Result<p4info::Preamble> {
    Ok(p4info::Preamble {
        id: msg.uint32("id")?,
        name: msg.string("name")?,
        alias: msg.string("alias")?,
        annotations: msg.strings("annotations")?,
        doc: bind_opt(msg, "doc", bind_doc)?,
        structured_annotations: bind_all(
            msg,
            "structured_annotations",
            bind_structured_annotation,
        )?,
        annotation_locations: Vec::new(),
    })
}

fn bind_named_type(msg: &Message) -> Result<p4types::P4NamedType> {
    Ok(p4types::P4NamedType {
        name: msg.string("name")?,
    })
}

fn bind_match_field(msg: &Message) -> Result<p4info::MatchField> {
    let r#match = if msg.get("other_match_type").is_some() {
        Some(p4info::match_field::Match::OtherMatchType(
            msg.string("other_match_type")?,
        ))
    } else if msg.get("match_type").is_some() {
        Some(p4info::match_field::Match::MatchType(
            msg.enum_value("match_type", MATCH_TYPES)?,
        ))
    } else {
        None
    };

    Ok(p4info::MatchField {
        id: msg.uint32("id")?,
        name: msg.string("name")?,
        annotations: msg.strings("annotations")?,
        bitwidth: msg.int32("bitwidth")?,
        doc: bind_opt(msg, "doc", bind_doc)?,
        type_name: bind_opt(msg, "type_name", bind_named_type)?,
        structured_annotations: bind_all(
            msg,
            "structured_annotations",
            bind_structured_annotation,
        )?,
        r#match,
    })
}

fn bind_table(msg: &Message) -> Result<p4info::Table> {
    Ok(p4info::Table {
        preamble: bind_opt(msg, "preamble", bind_preamble)?,
        match_fields: bind_all(msg, "match_fields", bind_match_field)?,
        action_refs: bind_all(msg, "action_refs", bind_action_ref)?,
        const_default_action_id: msg.uint32("const_default_action_id")?,
        implementation_id: msg.uint32("implementation_id")?,
        direct_resource_ids: msg
            .each("direct_resource_ids")
            .map(|v| match v {
                Value::Int(i) => u32::try_from(*i)
                    .map_err(|_| msg.err("direct_resource_ids out of range")),
                _ => Err(msg.err("direct_resource_ids is not an integer")),
            })
            .collect::<Result<_>>()?,
        size: msg.int64("size")?,
        idle_timeout_behavior: msg.enum_value("idle_timeout_behavior", IDLE_TIMEOUT_BEHAVIORS)?,
        is_const_table: msg.boolean("is_const_table")?,
        has_initial_entries: msg.boolean("has_initial_entries")?,
    })
}

fn bind_action_ref(msg: &Message) -> Result<p4info::ActionRef> {
    Ok(p4info::ActionRef {
        id: msg.uint32("id")?,
        annotations: msg.strings("annotations")?,
        scope: msg.enum_value("scope", ACTION_SCOPES)?,
        structured_annotations: bind_all(
            msg,
            "structured_annotations",
            bind_structured_annotation,
        )?,
        annotation_locations: Vec::new(),
    })
}

fn bind_action(msg: &Message) -> Result<p4info::Action> {
    Ok(p4info::Action {
        preamble: bind_opt(msg, "preamble", bind_preamble)?,
        params: bind_all(msg, "params", bind_action_param)?,
    })
}

fn bind_action_param(msg: &Message) -> Result<p4info::action::Param> {
    Ok(p4info::action::Param {
        id: msg.uint32("id")?,
        name: msg.string("name")?,
        annotations: msg.strings("annotations")?,
        bitwidth: msg.int32("bitwidth")?,
        doc: bind_opt(msg, "doc", bind_doc)?,
        type_name: bind_opt(msg, "type_name", bind_named_type)?,
        structured_annotations: bind_all(
            msg,
            "structured_annotations",
            bind_structured_annotation,
        )?,
    })
}

fn bind_action_profile(msg: &Message) -> Result<p4info::ActionProfile> {
    let selector_size_semantics = if let Some(m) = msg.message("sum_of_members")? {
        Some(p4info::action_profile::SelectorSizeSemantics::SumOfMembers(
            p4info::action_profile::SumOfMembers {
                max_member_weight: m.int32("max_member_weight")?,
            },
        ))
    } else if msg.message("sum_of_weights")?.is_some() {
        Some(p4info::action_profile::SelectorSizeSemantics::SumOfWeights(
            p4info::action_profile::SumOfWeights {},
        ))
    } else {
        None
    };

    Ok(p4info::ActionProfile {
        preamble: bind_opt(msg, "preamble", bind_preamble)?,
        table_ids: msg
            .each("table_ids")
            .map(|v| match v {
                Value::Int(i) => {
                    u32::try_from(*i).map_err(|_| msg.err("table_ids out of range"))
                }
                _ => Err(msg.err("table_ids is not an integer")),
            })
            .collect::<Result<_>>()?,
        with_selector: msg.boolean("with_selector")?,
        size: msg.int64("size")?,
        max_group_size: msg.int32("max_group_size")?,
        selector_size_semantics,
    })
}

fn bind_counter_spec(msg: &Message) -> Result<p4info::CounterSpec> {
    Ok(p4info::CounterSpec {
        unit: msg.enum_value("unit", COUNTER_UNITS)?,
    })
}

fn bind_counter(msg: &Message) -> Result<p4info::Counter> {
    Ok(p4info::Counter {
        preamble: bind_opt(msg, "preamble", bind_preamble)?,
        spec: bind_opt(msg, "spec", bind_counter_spec)?,
        size: msg.int64("size")?,
        index_type_name: bind_opt(msg, "index_type_name", bind_named_type)?,
    })
}

fn bind_direct_counter(msg: &Message) -> Result<p4info::DirectCounter> {
    Ok(p4info::DirectCounter {
        preamble: bind_opt(msg, "preamble", bind_preamble)?,
        spec: bind_opt(msg, "spec", bind_counter_spec)?,
        direct_table_id: msg.uint32("direct_table_id")?,
    })
}

fn bind_meter_spec(msg: &Message) -> Result<p4info::MeterSpec> {
    Ok(p4info::MeterSpec {
        unit: msg.enum_value("unit", METER_UNITS)?,
    })
}

fn bind_meter(msg: &Message) -> Result<p4info::Meter> {
    Ok(p4info::Meter {
        preamble: bind_opt(msg, "preamble", bind_preamble)?,
        spec: bind_opt(msg, "spec", bind_meter_spec)?,
        size: msg.int64("size")?,
        index_type_name: bind_opt(msg, "index_type_name", bind_named_type)?,
    })
}

fn bind_direct_meter(msg: &Message) -> Result<p4info::DirectMeter> {
    Ok(p4info::DirectMeter {
        preamble: bind_opt(msg, "preamble", bind_preamble)?,
        spec: bind_opt(msg, "spec", bind_meter_spec)?,
        direct_table_id: msg.uint32("direct_table_id")?,
    })
}

fn bind_controller_packet_metadata(msg: &Message) -> Result<p4info::ControllerPacketMetadata> {
    Ok(p4info::ControllerPacketMetadata {
        preamble: bind_opt(msg, "preamble", bind_preamble)?,
        metadata: bind_all(msg, "metadata", bind_cpm_metadata)?,
    })
}

fn bind_cpm_metadata(
    msg: &Message,
) -> Result<p4info::controller_packet_metadata::Metadata> {
    Ok(p4info::controller_packet_metadata::Metadata {
        id: msg.uint32("id")?,
        name: msg.string("name")?,
        annotations: msg.strings("annotations")?,
        bitwidth: msg.int32("bitwidth")?,
        structured_annotations: bind_all(
            msg,
            "structured_annotations",
            bind_structured_annotation,
        )?,
        type_name: bind_opt(msg, "type_name", bind_named_type)?,
    })
}

fn bind_value_set(msg: &Message) -> Result<p4info::ValueSet> {
    Ok(p4info::ValueSet {
        preamble: bind_opt(msg, "preamble", bind_preamble)?,
        r#match: bind_all(msg, "match", bind_match_field)?,
        size: msg.int32("size")?,
    })
}

fn bind_register(msg: &Message) -> Result<p4info::Register> {
    Ok(p4info::Register {
        preamble: bind_opt(msg, "preamble", bind_preamble)?,
        type_spec: bind_opt(msg, "type_spec", bind_data_type_spec)?,
        size: msg.int32("size")?,
        index_type_name: bind_opt(msg, "index_type_name", bind_named_type)?,
    })
}

fn bind_digest(msg: &Message) -> Result<p4info::Digest> {
    Ok(p4info::Digest {
        preamble: bind_opt(msg, "preamble", bind_preamble)?,
        type_spec: bind_opt(msg, "type_spec", bind_data_type_spec)?,
    })
}

// ~~~~~~~~~~~~~~~~~~~~~~~~~
// p4types binder
// ~~~~~~~~~~~~~~~~~~~~~~~~~

fn bind_structured_annotation(msg: &Message) -> Result<p4types::StructuredAnnotation> {
    let body = if let Some(m) = msg.message("expression_list")? {
        Some(p4types::structured_annotation::Body::ExpressionList(
            p4types::ExpressionList {
                expressions: bind_all(m, "expressions", bind_expression)?,
            },
        ))
    } else if let Some(m) = msg.message("kv_pair_list")? {
        Some(p4types::structured_annotation::Body::KvPairList(
            p4types::KeyValuePairList {
                kv_pairs: bind_all(m, "kv_pairs", bind_kv_pair)?,
            },
        ))
    } else {
        None
    };

    Ok(p4types::StructuredAnnotation {
        name: msg.string("name")?,
        source_location: None,
        body,
    })
}

fn bind_expression(msg: &Message) -> Result<p4types::Expression> {
    let value = if msg.get("string_value").is_some() {
        Some(p4types::expression::Value::StringValue(
            msg.string("string_value")?,
        ))
    } else if msg.get("int64_value").is_some() {
        Some(p4types::expression::Value::Int64Value(
            msg.int64("int64_value")?,
        ))
    } else if msg.get("bool_value").is_some() {
        Some(p4types::expression::Value::BoolValue(
            msg.boolean("bool_value")?,
        ))
    } else {
        None
    };
    Ok(p4types::Expression { value })
}

fn bind_kv_pair(msg: &Message) -> Result<p4types::KeyValuePair> {
    Ok(p4types::KeyValuePair {
        key: msg.string("key")?,
        value: bind_opt(msg, "value", bind_expression)?,
    })
}

fn bind_type_info(msg: &Message) -> Result<p4types::P4TypeInfo> {
    Ok(p4types::P4TypeInfo {
        structs: bind_map(msg, "structs", bind_struct_type)?,
        headers: bind_map(msg, "headers", bind_header_type)?,
        header_unions: bind_map(msg, "header_unions", bind_header_union_type)?,
        enums: bind_map(msg, "enums", bind_enum_type)?,
        error: bind_opt(msg, "error", bind_error_type)?,
        serializable_enums: bind_map(msg, "serializable_enums", bind_serializable_enum)?,
        new_types: bind_map(msg, "new_types", bind_new_type)?,
    })
}

/// Text format writes a map field as repeated `field { key: ... value {...} }`.
fn bind_map<T>(
    msg: &Message,
    name: &str,
    f: fn(&Message) -> Result<T>,
) -> Result<BTreeMap<String, T>> {
    let mut out = BTreeMap::new();
    for entry in msg.messages(name) {
        let entry = entry?;
        let key = entry.string("key")?;
        let value = entry
            .message("value")?
            .ok_or_else(|| entry.err(format!("map {:?} entry missing value", name)))?;
        out.insert(key, f(value)?);
    }
    Ok(out)
}

fn bind_bitstring_like(msg: &Message) -> Result<p4types::P4BitstringLikeTypeSpec> {
    let type_spec = if let Some(m) = msg.message("bit")? {
        Some(p4types::p4_bitstring_like_type_spec::TypeSpec::Bit(
            p4types::P4BitTypeSpec {
                bitwidth: m.int32("bitwidth")?,
            },
        ))
    } else if let Some(m) = msg.message("int")? {
        Some(p4types::p4_bitstring_like_type_spec::TypeSpec::Int(
            p4types::P4IntTypeSpec {
                bitwidth: m.int32("bitwidth")?,
            },
        ))
    } else if let Some(m) = msg.message("varbit")? {
        Some(p4types::p4_bitstring_like_type_spec::TypeSpec::Varbit(
            p4types::P4VarbitTypeSpec {
                max_bitwidth: m.int32("max_bitwidth")?,
            },
        ))
    } else {
        None
    };
    Ok(p4types::P4BitstringLikeTypeSpec {
        annotations: Vec::new(),
        type_spec,
    })
}

fn bind_data_type_spec(msg: &Message) -> Result<p4types::P4DataTypeSpec> {
    use p4types::p4_data_type_spec::TypeSpec;

    let type_spec = if let Some(m) = msg.message("bitstring")? {
        Some(TypeSpec::Bitstring(bind_bitstring_like(m)?))
    } else if msg.get("bool").is_some() {
        Some(TypeSpec::Bool(p4types::P4BoolType {}))
    } else if let Some(m) = msg.message("tuple")? {
        Some(TypeSpec::Tuple(p4types::P4TupleTypeSpec {
            members: bind_all(m, "members", bind_data_type_spec)?,
        }))
    } else if let Some(m) = msg.message("struct")? {
        Some(TypeSpec::Struct(bind_named_type(m)?))
    } else if let Some(m) = msg.message("header")? {
        Some(TypeSpec::Header(bind_named_type(m)?))
    } else if let Some(m) = msg.message("header_union")? {
        Some(TypeSpec::HeaderUnion(bind_named_type(m)?))
    } else if let Some(m) = msg.message("header_stack")? {
        Some(TypeSpec::HeaderStack(p4types::P4HeaderStackTypeSpec {
            header: bind_opt(m, "header", bind_named_type)?,
            size: m.int32("size")?,
        }))
    } else if let Some(m) = msg.message("header_union_stack")? {
        Some(TypeSpec::HeaderUnionStack(
            p4types::P4HeaderUnionStackTypeSpec {
                header_union: bind_opt(m, "header_union", bind_named_type)?,
                size: m.int32("size")?,
            },
        ))
    } else if let Some(m) = msg.message("enum")? {
        Some(TypeSpec::Enum(bind_named_type(m)?))
    } else if msg.get("error").is_some() {
        Some(TypeSpec::Error(p4types::P4ErrorType {}))
    } else if let Some(m) = msg.message("serializable_enum")? {
        Some(TypeSpec::SerializableEnum(bind_named_type(m)?))
    } else if let Some(m) = msg.message("new_type")? {
        Some(TypeSpec::NewType(bind_named_type(m)?))
    } else {
        None
    };
    Ok(p4types::P4DataTypeSpec { type_spec })
}

fn bind_struct_type(msg: &Message) -> Result<p4types::P4StructTypeSpec> {
    let mut members = Vec::new();
    for member in msg.messages("members") {
        let member = member?;
        members.push(p4types::p4_struct_type_spec::Member {
            name: member.string("name")?,
            type_spec: bind_opt(member, "type_spec", bind_data_type_spec)?,
        });
    }
    Ok(p4types::P4StructTypeSpec {
        members,
        annotations: Vec::new(),
    })
}

fn bind_header_type(msg: &Message) -> Result<p4types::P4HeaderTypeSpec> {
    let mut members = Vec::new();
    for member in msg.messages("members") {
        let member = member?;
        members.push(p4types::p4_header_type_spec::Member {
            name: member.string("name")?,
            type_spec: bind_opt(member, "type_spec", bind_bitstring_like)?,
        });
    }
    Ok(p4types::P4HeaderTypeSpec {
        members,
        annotations: Vec::new(),
    })
}

fn bind_header_union_type(msg: &Message) -> Result<p4types::P4HeaderUnionTypeSpec> {
    let mut members = Vec::new();
    for member in msg.messages("members") {
        let member = member?;
        members.push(p4types::p4_header_union_type_spec::Member {
            name: member.string("name")?,
            header: bind_opt(member, "header", bind_named_type)?,
        });
    }
    Ok(p4types::P4HeaderUnionTypeSpec {
        members,
        annotations: Vec::new(),
    })
}

fn bind_enum_type(msg: &Message) -> Result<p4types::P4EnumTypeSpec> {
    let mut members = Vec::new();
    for member in msg.messages("members") {
        let member = member?;
        members.push(p4types::p4_enum_type_spec::Member {
            name: member.string("name")?,
        });
    }
    Ok(p4types::P4EnumTypeSpec {
        members,
        annotations: Vec::new(),
    })
}

fn bind_error_type(msg: &Message) -> Result<p4types::P4ErrorTypeSpec> {
    let mut members = Vec::new();
    for member in msg.messages("members") {
        let member = member?;
        members.push(p4types::p4_enum_type_spec::Member {
            name: member.string("name")?,
        });
    }
    Ok(p4types::P4ErrorTypeSpec { members })
}

fn bind_serializable_enum(msg: &Message) -> Result<p4types::P4SerializableEnumTypeSpec> {
    let underlying_type = match msg.message("underlying_type")? {
        Some(m) => Some(p4types::P4BitTypeSpec {
            bitwidth: m.int32("bitwidth")?,
        }),
        None => None,
    };
    let mut members = Vec::new();
    for member in msg.messages("members") {
        let member = member?;
        members.push(p4types::p4_serializable_enum_type_spec::Member {
            name: member.string("name")?,
            value: member.bytes("value")?,
        });
    }
    Ok(p4types::P4SerializableEnumTypeSpec {
        underlying_type,
        members,
        annotations: Vec::new(),
    })
}

fn bind_new_type(msg: &Message) -> Result<p4types::P4NewTypeSpec> {
    let representation = if let Some(m) = msg.message("original_type")? {
        Some(p4types::p4_new_type_spec::Representation::OriginalType(
            bind_data_type_spec(m)?,
        ))
    } else if let Some(m) = msg.message("translated_type")? {
        let sdn_type = if m.get("sdn_bitwidth").is_some() {
            Some(p4types::p4_new_type_translation::SdnType::SdnBitwidth(
                m.int32("sdn_bitwidth")?,
            ))
        } else if m.get("sdn_string").is_some() {
            Some(p4types::p4_new_type_translation::SdnType::SdnString(
                p4types::p4_new_type_translation::SdnString {},
            ))
        } else {
            None
        };
        Some(p4types::p4_new_type_spec::Representation::TranslatedType(
            p4types::P4NewTypeTranslation {
                uri: m.string("uri")?,
                sdn_type,
            },
        ))
    } else {
        None
    };
    Ok(p4types::P4NewTypeSpec { representation })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::p4info::match_field::{Match, MatchType};

    #[test]
    fn parse_minimal_table() {
        let text = r#"
            pkg_info {
              name: "demo"
              arch: "v1model"
            }
            tables {
              preamble { id: 34391805 name: "ingress.l2_exact_table" alias: "l2_exact_table" }
              match_fields {
                id: 1
                name: "hdr.ethernet.dst_addr"
                bitwidth: 48
                match_type: EXACT
                annotations: "@format(MAC_ADDRESS)"
              }
              action_refs { id: 24677122 }
              size: 1024
            }
        "#;

        let p4info = parse_p4info(text).unwrap();
        assert_eq!(p4info.pkg_info.as_ref().unwrap().name, "demo");
        assert_eq!(p4info.tables.len(), 1);

        let table = &p4info.tables[0];
        assert_eq!(table.preamble.as_ref().unwrap().id, 34391805);
        assert_eq!(table.size, 1024);

        let field = &table.match_fields[0];
        assert_eq!(field.bitwidth, 48);
        assert_eq!(field.r#match, Some(Match::MatchType(MatchType::Exact as i32)));
        assert_eq!(field.annotations, vec!["@format(MAC_ADDRESS)"]);
    }

    #[test]
    fn string_escapes_and_concatenation() {
        let text = r#"pkg_info { name: "a\tb\x41" "\102" version: 'one' }"#;
        let p4info = parse_p4info(text).unwrap();
        let pkg = p4info.pkg_info.unwrap();
        assert_eq!(pkg.name, "a\tbAB");
        assert_eq!(pkg.version, "one");
    }

    #[test]
    fn multiline_annotation_body() {
        let text = "actions {\n  preamble {\n    id: 1\n    name: \"a\"\n    annotations: \"@doc(line one\\nline two)\"\n  }\n}\n";
        let p4info = parse_p4info(text).unwrap();
        let preamble = p4info.actions[0].preamble.as_ref().unwrap();
        assert_eq!(preamble.annotations[0], "@doc(line one\nline two)");
    }

    #[test]
    fn unknown_fields_are_skipped() {
        let text = r#"
            tables {
              preamble { id: 1 name: "t" future_field { nested: 3 } }
              some_new_thing: 77
            }
        "#;
        let p4info = parse_p4info(text).unwrap();
        assert_eq!(p4info.tables[0].preamble.as_ref().unwrap().id, 1);
    }

    #[test]
    fn map_entries_and_new_types() {
        let text = r#"
            type_info {
              new_types {
                key: "PortId_t"
                value { translated_type { uri: "p4.org/psa/v1/PortId_t" sdn_bitwidth: 32 } }
              }
              structs {
                key: "digest_t"
                value {
                  members { name: "addr" type_spec { bitstring { bit { bitwidth: 48 } } } }
                  members { name: "port" type_spec { new_type { name: "PortId_t" } } }
                }
              }
            }
        "#;
        let p4info = parse_p4info(text).unwrap();
        let info = p4info.type_info.unwrap();
        assert!(info.new_types.contains_key("PortId_t"));
        assert_eq!(info.structs["digest_t"].members.len(), 2);
    }

    #[test]
    fn bracketed_lists() {
        let text = r#"
            action_profiles {
              preamble { id: 5 name: "ap" }
              table_ids: [1, 2, 3]
              with_selector: true
            }
        "#;
        let p4info = parse_p4info(text).unwrap();
        assert_eq!(p4info.action_profiles[0].table_ids, vec![1, 2, 3]);
        assert!(p4info.action_profiles[0].with_selector);
    }

    #[test]
    fn reject_garbage() {
        assert!(parse_p4info("tables { preamble }").is_err());
        assert!(parse_p4info("tables { id: }").is_err());
        assert!(parse_p4info("{}").is_err());
    }
}
