//! Immutable wrapper around `gnmi.Path`.
//!
//! The canonical string form is the source of truth; accessors address
//! elements by index or name and keys by name, and every "mutating" method
//! returns a new path.
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

use std::fmt;
use std::ops::Range;
use std::str::FromStr;

use proto::gnmi;

use crate::errors::{Error, Result};
use crate::gnmistring;

/// An immutable gNMI path.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct GnmiPath {
    path: gnmi::Path,
}

impl GnmiPath {
    /// Parse from the canonical string form.
    pub fn new(path: &str) -> Result<Self> {
        Ok(GnmiPath {
            path: gnmistring::parse(path)?,
        })
    }

    pub fn from_proto(path: gnmi::Path) -> Self {
        GnmiPath { path }
    }

    /// The wrapped wire representation.
    pub fn proto(&self) -> &gnmi::Path {
        &self.path
    }

    pub fn into_proto(self) -> gnmi::Path {
        self.path
    }

    pub fn len(&self) -> usize {
        self.path.elem.len()
    }

    pub fn is_empty(&self) -> bool {
        self.path.elem.is_empty()
    }

    pub fn origin(&self) -> &str {
        &self.path.origin
    }

    pub fn target(&self) -> &str {
        &self.path.target
    }

    pub fn with_origin(&self, origin: &str) -> Self {
        let mut path = self.path.clone();
        path.origin = origin.to_string();
        GnmiPath { path }
    }

    pub fn with_target(&self, target: &str) -> Self {
        let mut path = self.path.clone();
        path.target = target.to_string();
        GnmiPath { path }
    }

    /// Name of the element at `index`.
    pub fn elem(&self, index: usize) -> Option<&str> {
        self.path.elem.get(index).map(|e| e.name.as_str())
    }

    pub fn first(&self) -> Option<&str> {
        self.elem(0)
    }

    pub fn last(&self) -> Option<&str> {
        self.path.elem.last().map(|e| e.name.as_str())
    }

    pub fn contains_elem(&self, name: &str) -> bool {
        self.path.elem.iter().any(|e| e.name == name)
    }

    /// Key value on the element at `index`.
    pub fn key_at(&self, index: usize, key: &str) -> Option<&str> {
        self.path
            .elem
            .get(index)
            .and_then(|e| e.key.get(key))
            .map(String::as_str)
    }

    /// Key value on the named element.
    pub fn key_of(&self, elem: &str, key: &str) -> Option<&str> {
        self.path
            .elem
            .iter()
            .find(|e| e.name == elem)
            .and_then(|e| e.key.get(key))
            .map(String::as_str)
    }

    /// Single-key shorthand: the first element carrying `key`.
    pub fn key(&self, key: &str) -> Option<&str> {
        self.path
            .elem
            .iter()
            .find_map(|e| e.key.get(key))
            .map(String::as_str)
    }

    /// Sub-path over an element range.
    pub fn slice(&self, range: Range<usize>) -> Self {
        let elem = self
            .path
            .elem
            .get(range)
            .map(|elems| elems.to_vec())
            .unwrap_or_default();
        GnmiPath {
            path: gnmi::Path {
                elem,
                ..Default::default()
            },
        }
    }

    /// Concatenate with another path (or a valid path string).
    pub fn join(&self, rhs: impl IntoGnmiPath) -> Result<Self> {
        let rhs = rhs.into_gnmi_path()?;
        let mut path = self.path.clone();
        path.elem.extend(rhs.path.elem);
        Ok(GnmiPath { path })
    }

    /// A copy with the keys of the named element replaced.
    pub fn with_key(&self, elem: &str, key: &str, value: impl fmt::Display) -> Result<Self> {
        let mut path = self.path.clone();
        let elem = path
            .elem
            .iter_mut()
            .find(|e| e.name == elem)
            .ok_or_else(|| Error::encoding(format!("no element named {:?}", elem)))?;
        elem.key.insert(key.to_string(), value.to_string());
        Ok(GnmiPath { path })
    }
}

impl fmt::Display for GnmiPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", gnmistring::to_str(&self.path))
    }
}

impl FromStr for GnmiPath {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        GnmiPath::new(s)
    }
}

/// Values that convert to a [`GnmiPath`], possibly by parsing.
pub trait IntoGnmiPath {
    fn into_gnmi_path(self) -> Result<GnmiPath>;
}

impl IntoGnmiPath for GnmiPath {
    fn into_gnmi_path(self) -> Result<GnmiPath> {
        Ok(self)
    }
}

impl IntoGnmiPath for &GnmiPath {
    fn into_gnmi_path(self) -> Result<GnmiPath> {
        Ok(self.clone())
    }
}

impl IntoGnmiPath for &str {
    fn into_gnmi_path(self) -> Result<GnmiPath> {
        GnmiPath::new(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path(s: &str) -> GnmiPath {
        GnmiPath::new(s).unwrap()
    }

    #[test]
    fn accessors() {
        let p = path("interfaces/interface[name=eth1]/state/oper-status");
        assert_eq!(p.len(), 4);
        assert_eq!(p.first(), Some("interfaces"));
        assert_eq!(p.last(), Some("oper-status"));
        assert_eq!(p.elem(1), Some("interface"));
        assert_eq!(p.key_at(1, "name"), Some("eth1"));
        assert_eq!(p.key_of("interface", "name"), Some("eth1"));
        assert_eq!(p.key("name"), Some("eth1"));
        assert!(p.contains_elem("state"));
        assert!(!p.contains_elem("config"));
    }

    #[test]
    fn slice_and_join() {
        let p = path("interfaces/interface[name=eth1]/state/oper-status");
        let sub = p.slice(0..2);
        assert_eq!(sub.to_string(), "interfaces/interface[name=eth1]");

        let joined = sub.join("state/counters").unwrap();
        assert_eq!(joined.to_string(), "interfaces/interface[name=eth1]/state/counters");

        // The original is untouched.
        assert_eq!(p.len(), 4);
    }

    #[test]
    fn with_key_returns_new_path() {
        let template = path("interfaces/interface/state/oper-status");
        let p = template.with_key("interface", "name", "s1-eth1").unwrap();
        assert_eq!(p.key("name"), Some("s1-eth1"));
        assert_eq!(template.key("name"), None);

        assert!(template.with_key("nope", "name", "x").is_err());
    }

    #[test]
    fn display_is_canonical() {
        let p = path("/interfaces/interface[name=eth1]/");
        assert_eq!(p.to_string(), "interfaces/interface[name=eth1]");
        assert_eq!(path("/").to_string(), "/");
    }
}
