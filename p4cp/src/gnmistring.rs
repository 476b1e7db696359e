//! String form of `gnmi.Path`.
//!
//! Implements the canonical path-with-keys grammar from the gNMI path
//! conventions: '/'-separated elements, each with optional `[key=value]`
//! pairs, backslash escapes for the delimiter characters and `\n`, `\r`,
//! `\t`, `\xHH`, `\uHHHH`, `\UHHHHHHHH` sequences. The `origin` and `target`
//! properties are not part of the string form.
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
use std::iter::Peekable;
use std::str::Chars;

use proto::gnmi;

use crate::errors::{Error, Result};

/// Parse the canonical string form into a `gnmi.Path`.
pub fn parse(value: &str) -> Result<gnmi::Path> {
    if value.is_empty() || value == "/" {
        return Ok(gnmi::Path::default());
    }

    let mut chars = value.chars().peekable();
    let mut elems = Vec::new();

    // A single leading slash is allowed and ignored.
    if chars.peek() == Some(&'/') {
        chars.next();
    }

    loop {
        let name = ident(&mut chars, value, &['/', '[', ']', '='])?;
        if name.is_empty() {
            return Err(parse_error(value, "empty element name"));
        }

        let mut key = BTreeMap::new();
        while chars.peek() == Some(&'[') {
            chars.next();
            let k = ident(&mut chars, value, &['[', ']', '='])?;
            if chars.next() != Some('=') {
                return Err(parse_error(value, "expected '=' in key"));
            }
            let v = ident(&mut chars, value, &[']'])?;
            if chars.next() != Some(']') {
                return Err(parse_error(value, "expected ']' after key value"));
            }
            key.insert(k, v);
        }

        elems.push(gnmi::PathElem { name, key });

        match chars.next() {
            None => break,
            Some('/') => {
                // A single trailing slash is allowed and ignored.
                if chars.peek().is_none() {
                    break;
                }
            }
            Some(other) => {
                return Err(parse_error(value, format!("unexpected {:?}", other)))
            }
        }
    }

    Ok(gnmi::Path {
        elem: elems,
        ..Default::default()
    })
}

fn parse_error(value: &str, detail: impl std::fmt::Display) -> Error {
    Error::encoding(format!("invalid gNMI path {:?}: {}", value, detail))
}

/// Consume characters until one of `stop` (unescaped) or end of input,
/// applying escape sequences.
fn ident(chars: &mut Peekable<Chars<'_>>, value: &str, stop: &[char]) -> Result<String> {
    let mut out = String::new();
    while let Some(&c) = chars.peek() {
        if stop.contains(&c) {
            break;
        }
        chars.next();
        if c != '\\' {
            out.push(c);
            continue;
        }
        let esc = chars
            .next()
            .ok_or_else(|| parse_error(value, "trailing backslash"))?;
        match esc {
            '\\' | '/' | '[' | ']' | '=' => out.push(esc),
            'n' => out.push('\n'),
            'r' => out.push('\r'),
            't' => out.push('\t'),
            'x' => out.push(hex_escape(chars, value, 2)?),
            'u' => out.push(hex_escape(chars, value, 4)?),
            'U' => out.push(hex_escape(chars, value, 8)?),
            other => return Err(parse_error(value, format!("bad escape \\{}", other))),
        }
    }
    Ok(out)
}

fn hex_escape(chars: &mut Peekable<Chars<'_>>, value: &str, count: usize) -> Result<char> {
    let mut code = 0u32;
    for _ in 0..count {
        let c = chars
            .next()
            .ok_or_else(|| parse_error(value, "truncated escape"))?;
        let digit = c
            .to_digit(16)
            .ok_or_else(|| parse_error(value, "bad hex escape"))?;
        code = code * 16 + digit;
    }
    char::from_u32(code).ok_or_else(|| parse_error(value, "escape is not a character"))
}

/// Render a `gnmi.Path` in canonical string form.
pub fn to_str(path: &gnmi::Path) -> String {
    if path.elem.is_empty() {
        return "/".to_string();
    }
    path.elem
        .iter()
        .map(elem_str)
        .collect::<Vec<_>>()
        .join("/")
}

fn elem_str(elem: &gnmi::PathElem) -> String {
    let mut out = escape(&elem.name, &['/', '[', ']']);
    // BTreeMap keys iterate sorted, giving a canonical rendering.
    for (key, value) in &elem.key {
        out.push('[');
        out.push_str(&escape(key, &['[', ']', '=']));
        out.push('=');
        out.push_str(&escape(value, &[']']));
        out.push(']');
    }
    out
}

fn escape(value: &str, special: &[char]) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\u0009"),
            c if special.contains(&c) => {
                out.push('\\');
                out.push(c);
            }
            c if (c as u32) < 0x20 => {
                out.push_str(&format!("\\u{:04x}", c as u32));
            }
            c => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(s: &str) -> String {
        to_str(&parse(s).unwrap())
    }

    #[test]
    fn simple_paths() {
        assert_eq!(roundtrip("interfaces/interface/state"), "interfaces/interface/state");
        assert_eq!(roundtrip("/interfaces/interface/"), "interfaces/interface");
        assert_eq!(roundtrip("/"), "/");
        assert_eq!(roundtrip(""), "/");
    }

    #[test]
    fn keyed_elements() {
        let path = parse("interfaces/interface[name=s1-eth1]/state/oper-status").unwrap();
        assert_eq!(path.elem.len(), 4);
        assert_eq!(path.elem[1].name, "interface");
        assert_eq!(path.elem[1].key["name"], "s1-eth1");
    }

    #[test]
    fn multiple_keys_sorted_in_output() {
        // '/' needs no escape inside a key value.
        let out = roundtrip("net/route[prefix=10.0.0.0/8][nexthop=1.2.3.4]");
        assert_eq!(out, "net/route[nexthop=1.2.3.4][prefix=10.0.0.0/8]");
    }

    #[test]
    fn escapes() {
        let path = parse(r"a\/b/c[k\=1=v\]2]").unwrap();
        assert_eq!(path.elem[0].name, "a/b");
        assert_eq!(path.elem[1].key["k=1"], "v]2");

        let path = parse(r"xAy\x42").unwrap();
        assert_eq!(path.elem[0].name, "xAyB");
    }

    #[test]
    fn rejects_malformed() {
        assert!(parse("a[name]").is_err());
        assert!(parse("a[name=v").is_err());
        assert!(parse("a//b").is_err());
        assert!(parse("a\\q").is_err());
    }
}
