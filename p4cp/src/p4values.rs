//! Value conversion between typed values and P4Runtime byte strings.
//!
//! P4Runtime carries every match key, action parameter and packet metadata
//! field as a big-endian byte string in canonical form: minimum length, no
//! leading zero byte, except that zero itself is a single zero byte
//! (P4Runtime spec section 8.4). This module implements the canonical codec
//! for exact, LPM, ternary and range encodings over [`P4Value`].
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
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::str::FromStr;

use bitflags::bitflags;

use crate::errors::{Error, Result};

bitflags! {
    /// Preferred output forms for decoded values when several are valid.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct DecodeFormat: u32 {
        /// Render as a string instead of an integer.
        const STRING = 1;
        /// Prefer address types for 32/48/128-bit fields.
        const ADDRESS = 2;
    }
}

/// A 48-bit Ethernet address.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MacAddr(pub [u8; 6]);

impl MacAddr {
    pub fn to_u64(self) -> u64 {
        let mut value = 0u64;
        for b in self.0 {
            value = (value << 8) | b as u64;
        }
        value
    }

    pub fn from_u64(value: u64) -> Self {
        let mut octets = [0u8; 6];
        for (i, octet) in octets.iter_mut().enumerate() {
            *octet = (value >> (40 - 8 * i)) as u8;
        }
        MacAddr(octets)
    }
}

impl fmt::Display for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let o = self.0;
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            o[0], o[1], o[2], o[3], o[4], o[5]
        )
    }
}

impl FromStr for MacAddr {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let sep = if s.contains(':') { ':' } else { '-' };
        let mut octets = [0u8; 6];
        let mut count = 0;
        for part in s.split(sep) {
            if count == 6 {
                return Err(Error::encoding(format!("invalid MAC address: {:?}", s)));
            }
            octets[count] = u8::from_str_radix(part, 16)
                .map_err(|_| Error::encoding(format!("invalid MAC address: {:?}", s)))?;
            count += 1;
        }
        if count != 6 {
            return Err(Error::encoding(format!("invalid MAC address: {:?}", s)));
        }
        Ok(MacAddr(octets))
    }
}

/// A dynamically typed value used for match keys, action parameters and
/// P4Data items. Schema-directed encoders pick the interpretation.
#[derive(Clone, Debug, PartialEq)]
pub enum P4Value {
    /// Non-negative integer up to 128 bits.
    Int(u128),
    /// Signed integer, for fields declared `int<W>`.
    SignedInt(i128),
    Bool(bool),
    /// String forms: decimal/hex integers, addresses, "value/prefix",
    /// "value/&mask", "lo...hi", or an SDN string for bitwidth 0.
    Str(String),
    Bytes(Vec<u8>),
    Mac(MacAddr),
    Ip(IpAddr),
    /// LPM value with an explicit prefix length.
    Lpm(Box<P4Value>, u32),
    /// Ternary value with an explicit mask.
    Masked(Box<P4Value>, Box<P4Value>),
    /// Range with inclusive low/high bounds.
    Range(Box<P4Value>, Box<P4Value>),
    /// Ordered members for tuples, header stacks and digest lists.
    List(Vec<P4Value>),
    /// Named members for structs, headers and header unions.
    Map(BTreeMap<String, P4Value>),
}

impl P4Value {
    /// Build a map value from (name, value) pairs.
    pub fn map<I, K, V>(items: I) -> P4Value
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<P4Value>,
    {
        P4Value::Map(
            items
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    pub fn as_u128(&self) -> Option<u128> {
        match self {
            P4Value::Int(v) => Some(*v),
            P4Value::Bool(true) => Some(1),
            P4Value::Bool(false) => Some(0),
            P4Value::Mac(mac) => Some(mac.to_u64() as u128),
            P4Value::Ip(IpAddr::V4(ip)) => Some(u32::from(*ip) as u128),
            P4Value::Ip(IpAddr::V6(ip)) => Some(u128::from(*ip)),
            _ => None,
        }
    }
}

impl From<u128> for P4Value {
    fn from(v: u128) -> Self {
        P4Value::Int(v)
    }
}

impl From<u64> for P4Value {
    fn from(v: u64) -> Self {
        P4Value::Int(v as u128)
    }
}

impl From<u32> for P4Value {
    fn from(v: u32) -> Self {
        P4Value::Int(v as u128)
    }
}

impl From<u16> for P4Value {
    fn from(v: u16) -> Self {
        P4Value::Int(v as u128)
    }
}

impl From<u8> for P4Value {
    fn from(v: u8) -> Self {
        P4Value::Int(v as u128)
    }
}

impl From<i32> for P4Value {
    fn from(v: i32) -> Self {
        if v >= 0 {
            P4Value::Int(v as u128)
        } else {
            P4Value::SignedInt(v as i128)
        }
    }
}

impl From<i64> for P4Value {
    fn from(v: i64) -> Self {
        if v >= 0 {
            P4Value::Int(v as u128)
        } else {
            P4Value::SignedInt(v as i128)
        }
    }
}

impl From<bool> for P4Value {
    fn from(v: bool) -> Self {
        P4Value::Bool(v)
    }
}

impl From<&str> for P4Value {
    fn from(v: &str) -> Self {
        P4Value::Str(v.to_string())
    }
}

impl From<String> for P4Value {
    fn from(v: String) -> Self {
        P4Value::Str(v)
    }
}

impl From<MacAddr> for P4Value {
    fn from(v: MacAddr) -> Self {
        P4Value::Mac(v)
    }
}

impl From<IpAddr> for P4Value {
    fn from(v: IpAddr) -> Self {
        P4Value::Ip(v)
    }
}

impl From<Ipv4Addr> for P4Value {
    fn from(v: Ipv4Addr) -> Self {
        P4Value::Ip(IpAddr::V4(v))
    }
}

impl From<Ipv6Addr> for P4Value {
    fn from(v: Ipv6Addr) -> Self {
        P4Value::Ip(IpAddr::V6(v))
    }
}

impl<V: Into<P4Value>> From<(V, u32)> for P4Value {
    fn from(v: (V, u32)) -> Self {
        P4Value::Lpm(Box::new(v.0.into()), v.1)
    }
}

/// Minimum byte-string size for a bitwidth (P4Runtime section 8.4).
pub fn p4r_minimum_string_size(bitwidth: u32) -> Result<usize> {
    if bitwidth == 0 || bitwidth > 128 {
        return Err(Error::encoding(format!("invalid bitwidth: {}", bitwidth)));
    }
    Ok(((bitwidth + 7) / 8) as usize)
}

/// Strip leading zero bytes, keeping at least one byte.
pub fn p4r_truncate(value: &[u8]) -> Vec<u8> {
    let first = value.iter().position(|&b| b != 0);
    match first {
        Some(index) => value[index..].to_vec(),
        None => vec![0],
    }
}

/// Return an integer with `bitwidth` low bits set.
pub fn all_ones(bitwidth: u32) -> u128 {
    if bitwidth >= 128 {
        u128::MAX
    } else {
        (1u128 << bitwidth) - 1
    }
}

/// Convert a contiguous mask to a prefix length; None if discontiguous.
pub fn mask_to_prefix(mask: u128, bitwidth: u32) -> Option<u32> {
    let inverted = !mask & all_ones(bitwidth);
    if inverted & inverted.wrapping_add(1) != 0 {
        return None;
    }
    Some(bitwidth - (128 - inverted.leading_zeros()))
}

fn out_of_range(kind: &str, bitwidth: u32, value: &dyn fmt::Debug) -> Error {
    if kind == "exact" {
        Error::encoding(format!("invalid value for bitwidth {}: {:?}", bitwidth, value))
    } else {
        Error::encoding(format!(
            "invalid {} value for bitwidth {}: {:?}",
            kind.to_ascii_uppercase(),
            bitwidth,
            value
        ))
    }
}

fn parse_exact_str(value: &str, bitwidth: u32) -> Result<u128> {
    let value = value.trim();

    if bitwidth == 32 && value.contains('.') {
        let ip: Ipv4Addr = value
            .parse()
            .map_err(|_| out_of_range("exact", bitwidth, &value))?;
        return Ok(u32::from(ip) as u128);
    }
    if bitwidth == 128 && value.contains(':') {
        let ip: Ipv6Addr = value
            .parse()
            .map_err(|_| out_of_range("exact", bitwidth, &value))?;
        return Ok(u128::from(ip));
    }
    if bitwidth == 48 && (value.contains(':') || (value.len() > 1 && value[1..].contains('-'))) {
        let mac: MacAddr = value.parse()?;
        return Ok(mac.to_u64() as u128);
    }

    let (digits, radix) = if let Some(hex) = value.strip_prefix("0x").or_else(|| value.strip_prefix("0X")) {
        (hex, 16)
    } else if let Some(bin) = value.strip_prefix("0b").or_else(|| value.strip_prefix("0B")) {
        (bin, 2)
    } else {
        (value, 10)
    };
    u128::from_str_radix(digits, radix).map_err(|_| out_of_range("exact", bitwidth, &value))
}

fn to_u128(value: &P4Value, bitwidth: u32) -> Result<u128> {
    match value {
        P4Value::Int(v) => Ok(*v),
        P4Value::Bool(b) => Ok(*b as u128),
        P4Value::Str(s) => parse_exact_str(s, bitwidth),
        P4Value::Mac(mac) if bitwidth == 48 => Ok(mac.to_u64() as u128),
        P4Value::Ip(IpAddr::V4(ip)) if bitwidth == 32 => Ok(u32::from(*ip) as u128),
        P4Value::Ip(IpAddr::V6(ip)) if bitwidth == 128 => Ok(u128::from(*ip)),
        other => Err(out_of_range("exact", bitwidth, other)),
    }
}

fn encode_u128(ival: u128, bitwidth: u32) -> Result<Vec<u8>> {
    if bitwidth < 128 && ival >= (1u128 << bitwidth) {
        return Err(Error::encoding(format!(
            "value out of range for bitwidth {}: {:#x}",
            bitwidth, ival
        )));
    }
    let size = p4r_minimum_string_size(bitwidth)?;
    let bytes = ival.to_be_bytes();
    Ok(p4r_truncate(&bytes[16 - size..]))
}

/// Encode an exact value. A bitwidth of 0 means the value is an SDN string.
pub fn encode_exact(value: &P4Value, bitwidth: u32) -> Result<Vec<u8>> {
    if bitwidth == 0 {
        return match value {
            P4Value::Str(s) => Ok(s.as_bytes().to_vec()),
            P4Value::Bytes(b) => Ok(b.clone()),
            other => Err(Error::encoding(format!("invalid SDN string: {:?}", other))),
        };
    }
    encode_u128(to_u128(value, bitwidth)?, bitwidth)
}

/// Encode a signed value (`int<W>`) in two's complement canonical form:
/// minimum length that still preserves the sign bit.
pub fn encode_exact_signed(value: i128, bitwidth: u32) -> Result<Vec<u8>> {
    if bitwidth == 0 || bitwidth > 128 {
        return Err(Error::encoding(format!("invalid bitwidth: {}", bitwidth)));
    }
    if bitwidth < 128 {
        let limit = 1i128 << (bitwidth - 1);
        if value >= limit || value < -limit {
            return Err(Error::encoding(format!(
                "value out of range for int<{}>: {}",
                bitwidth, value
            )));
        }
    }
    let bytes = value.to_be_bytes();
    let mut start = 0;
    while start < 15 {
        let b = bytes[start];
        let next_high = bytes[start + 1] & 0x80 != 0;
        if (b == 0x00 && !next_high) || (b == 0xff && next_high) {
            start += 1;
        } else {
            break;
        }
    }
    Ok(bytes[start..].to_vec())
}

/// Decode a signed byte string by sign-extending to 128 bits.
pub fn decode_exact_signed(data: &[u8], bitwidth: u32) -> Result<i128> {
    if data.is_empty() || data.len() > 16 {
        return Err(out_of_range("exact", bitwidth, &data));
    }
    let negative = data[0] & 0x80 != 0;
    let mut bytes = if negative { [0xffu8; 16] } else { [0u8; 16] };
    bytes[16 - data.len()..].copy_from_slice(data);
    Ok(i128::from_be_bytes(bytes))
}

fn decode_addr(ival: u128, bitwidth: u32, format: DecodeFormat) -> P4Value {
    debug_assert!(format.contains(DecodeFormat::ADDRESS));
    let addr = match bitwidth {
        32 => P4Value::Ip(IpAddr::V4(Ipv4Addr::from(ival as u32))),
        48 => P4Value::Mac(MacAddr::from_u64(ival as u64)),
        128 => P4Value::Ip(IpAddr::V6(Ipv6Addr::from(ival))),
        _ => {
            return if format.contains(DecodeFormat::STRING) {
                P4Value::Str(format!("{:#x}", ival))
            } else {
                P4Value::Int(ival)
            }
        }
    };
    if format.contains(DecodeFormat::STRING) {
        let text = match &addr {
            P4Value::Ip(ip) => ip.to_string(),
            P4Value::Mac(mac) => mac.to_string(),
            _ => unreachable!(),
        };
        P4Value::Str(text)
    } else {
        addr
    }
}

/// Decode an exact byte string. A bitwidth of 0 means an SDN string.
pub fn decode_exact(data: &[u8], bitwidth: u32, format: DecodeFormat) -> Result<P4Value> {
    if bitwidth == 0 {
        return Ok(P4Value::Str(
            String::from_utf8(data.to_vec())
                .map_err(|_| Error::encoding("SDN string is not valid UTF-8"))?,
        ));
    }
    if data.is_empty() || data.len() > 16 {
        return Err(out_of_range("exact", bitwidth, &data));
    }

    let mut bytes = [0u8; 16];
    bytes[16 - data.len()..].copy_from_slice(data);
    let ival = u128::from_be_bytes(bytes);
    if bitwidth < 128 && ival >= (1u128 << bitwidth) {
        return Err(out_of_range("exact", bitwidth, &data));
    }

    if format.contains(DecodeFormat::ADDRESS) {
        return Ok(decode_addr(ival, bitwidth, format));
    }
    if format.contains(DecodeFormat::STRING) {
        return Ok(P4Value::Str(format!("{:#x}", ival)));
    }
    Ok(P4Value::Int(ival))
}

fn parse_lpm_prefix(value: &str, bitwidth: u32) -> Result<u32> {
    // A prefix may be written as a count or as a netmask in address form.
    let mask = if bitwidth == 32 && value.contains('.') {
        let ip: Ipv4Addr = value
            .parse()
            .map_err(|_| out_of_range("lpm", bitwidth, &value))?;
        Some(u32::from(ip) as u128)
    } else if bitwidth == 128 && value.contains(':') {
        let ip: Ipv6Addr = value
            .parse()
            .map_err(|_| out_of_range("lpm", bitwidth, &value))?;
        Some(u128::from(ip))
    } else {
        None
    };

    match mask {
        Some(mask) => {
            mask_to_prefix(mask, bitwidth).ok_or_else(|| out_of_range("lpm", bitwidth, &value))
        }
        None => value
            .parse::<u32>()
            .map_err(|_| out_of_range("lpm", bitwidth, &value)),
    }
}

/// Encode an LPM value as (canonical value bytes, prefix length). The value's
/// host bits are cleared so the wire form is canonical.
pub fn encode_lpm(value: &P4Value, bitwidth: u32) -> Result<(Vec<u8>, u32)> {
    if bitwidth == 0 {
        return Err(out_of_range("lpm", bitwidth, value));
    }

    let (ival, prefix) = match value {
        P4Value::Str(s) if s.contains('/') => {
            let (val, prefix_str) = s.split_once('/').unwrap();
            let prefix = parse_lpm_prefix(prefix_str.trim(), bitwidth)?;
            (parse_exact_str(val, bitwidth)?, prefix)
        }
        P4Value::Lpm(val, prefix) => (to_u128(val, bitwidth)?, *prefix),
        other => (to_u128(other, bitwidth)?, bitwidth),
    };

    if prefix > bitwidth {
        return Err(out_of_range("lpm", bitwidth, value));
    }

    let mask = !all_ones(bitwidth - prefix) & all_ones(bitwidth);
    let data = encode_u128(ival & mask, bitwidth)?;
    Ok((data, prefix))
}

/// Decode an LPM match into `P4Value::Lpm` (or a "value/prefix" string).
pub fn decode_lpm(
    data: &[u8],
    prefix_len: u32,
    bitwidth: u32,
    format: DecodeFormat,
) -> Result<P4Value> {
    let value = decode_exact(data, bitwidth, format)?;
    match value {
        P4Value::Str(s) => Ok(P4Value::Str(format!("{}/{}", s, prefix_len))),
        other => Ok(P4Value::Lpm(Box::new(other), prefix_len)),
    }
}

/// Encode a ternary value as (value bytes, mask bytes). Any value bit set
/// outside the mask is rejected.
pub fn encode_ternary(value: &P4Value, bitwidth: u32) -> Result<(Vec<u8>, Vec<u8>)> {
    let (ival, mask) = match value {
        P4Value::Str(s) if s.contains("/&") => {
            let (val, mask) = s.split_once("/&").unwrap();
            (
                parse_exact_str(val, bitwidth)?,
                parse_exact_str(mask.trim(), bitwidth)?,
            )
        }
        P4Value::Str(s) if s.contains('/') => {
            let (data, prefix) = encode_lpm(value, bitwidth)?;
            let mask = !all_ones(bitwidth - prefix) & all_ones(bitwidth);
            return Ok((data, encode_u128(mask, bitwidth)?));
        }
        P4Value::Masked(val, mask) => (to_u128(val, bitwidth)?, to_u128(mask, bitwidth)?),
        P4Value::Lpm(val, prefix) => {
            let mask = !all_ones(bitwidth - prefix) & all_ones(bitwidth);
            (to_u128(val, bitwidth)?, mask)
        }
        other => (to_u128(other, bitwidth)?, all_ones(bitwidth)),
    };

    if ival & !mask != 0 {
        return Err(Error::encoding(format!(
            "ternary value {:#x} has bits set outside mask {:#x}",
            ival, mask
        )));
    }

    Ok((encode_u128(ival, bitwidth)?, encode_u128(mask, bitwidth)?))
}

/// Decode a ternary match into `P4Value::Masked` (or "value/&mask" string).
pub fn decode_ternary(
    data: &[u8],
    mask: &[u8],
    bitwidth: u32,
    format: DecodeFormat,
) -> Result<P4Value> {
    let value = decode_exact(data, bitwidth, format)?;
    let mask = decode_exact(mask, bitwidth, format)?;
    match (&value, &mask) {
        (P4Value::Str(v), P4Value::Str(m)) => Ok(P4Value::Str(format!("{}/&{}", v, m))),
        _ => Ok(P4Value::Masked(Box::new(value), Box::new(mask))),
    }
}

/// Encode a range value as (low bytes, high bytes).
pub fn encode_range(value: &P4Value, bitwidth: u32) -> Result<(Vec<u8>, Vec<u8>)> {
    let (low, high) = match value {
        P4Value::Str(s) if s.contains("...") => {
            let (lo, hi) = s.split_once("...").unwrap();
            (
                parse_exact_str(lo, bitwidth)?,
                parse_exact_str(hi, bitwidth)?,
            )
        }
        P4Value::Range(lo, hi) => (to_u128(lo, bitwidth)?, to_u128(hi, bitwidth)?),
        other => return Err(out_of_range("range", bitwidth, other)),
    };
    Ok((encode_u128(low, bitwidth)?, encode_u128(high, bitwidth)?))
}

/// Decode a range match into `P4Value::Range` (or "lo...hi" string).
pub fn decode_range(
    low: &[u8],
    high: &[u8],
    bitwidth: u32,
    format: DecodeFormat,
) -> Result<P4Value> {
    let low = decode_exact(low, bitwidth, format)?;
    let high = decode_exact(high, bitwidth, format)?;
    match (&low, &high) {
        (P4Value::Str(lo), P4Value::Str(hi)) => Ok(P4Value::Str(format!("{}...{}", lo, hi))),
        _ => Ok(P4Value::Range(Box::new(low), Box::new(high))),
    }
}

/// Format a value as a human-readable string via encode-then-decode.
pub fn format_exact(value: &P4Value, bitwidth: u32, format: DecodeFormat) -> Result<String> {
    let data = encode_exact(value, bitwidth)?;
    match decode_exact(&data, bitwidth, format | DecodeFormat::STRING)? {
        P4Value::Str(s) => Ok(s),
        _ => unreachable!("STRING format always yields a string"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exact(value: impl Into<P4Value>, bitwidth: u32) -> Vec<u8> {
        encode_exact(&value.into(), bitwidth).unwrap()
    }

    #[test]
    fn exact_canonical_form() {
        assert_eq!(exact(0u32, 32), vec![0]);
        assert_eq!(exact(1u32, 9), vec![1]);
        assert_eq!(exact(255u32, 9), vec![255]);
        assert_eq!(exact(256u32, 9), vec![1, 0]);
        assert_eq!(exact(511u32, 9), vec![1, 255]);
        assert_eq!(exact(u128::MAX, 128), vec![0xff; 16]);
    }

    #[test]
    fn exact_limits() {
        // 2^w - 1 fits, 2^w does not.
        for width in [1u32, 8, 9, 16, 48, 127] {
            assert!(encode_exact(&P4Value::Int(all_ones(width)), width).is_ok());
            assert!(encode_exact(&P4Value::Int(all_ones(width) + 1), width).is_err());
        }
        assert!(encode_exact(&P4Value::Int(512), 9).is_err());
    }

    #[test]
    fn exact_round_trip() {
        for (value, width) in [(0u128, 8), (1, 1), (0x1234, 16), (0xdead_beef, 32)] {
            let data = encode_exact(&P4Value::Int(value), width).unwrap();
            assert_eq!(
                decode_exact(&data, width, DecodeFormat::empty()).unwrap(),
                P4Value::Int(value)
            );
        }
    }

    #[test]
    fn exact_address_forms() {
        assert_eq!(exact("10.0.0.1", 32), vec![10, 0, 0, 1]);
        assert_eq!(exact("00:00:00:00:00:01", 48), vec![1]);
        assert_eq!(
            exact(Ipv6Addr::new(0x2000, 0x1234, 0, 0, 0, 0, 0, 1), 128),
            vec![0x20, 0, 0x12, 0x34, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 1]
        );
        // Address forms require the matching width.
        assert!(encode_exact(&"10.0.0.1".into(), 16).is_err());
    }

    #[test]
    fn exact_decode_formats() {
        let data = exact("10.0.0.1", 32);
        assert_eq!(
            decode_exact(&data, 32, DecodeFormat::empty()).unwrap(),
            P4Value::Int(0x0a00_0001)
        );
        assert_eq!(
            decode_exact(&data, 32, DecodeFormat::ADDRESS).unwrap(),
            P4Value::Ip(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1)))
        );
        assert_eq!(
            decode_exact(&data, 32, DecodeFormat::ADDRESS | DecodeFormat::STRING).unwrap(),
            P4Value::Str("10.0.0.1".to_string())
        );
        assert_eq!(
            decode_exact(&data, 32, DecodeFormat::STRING).unwrap(),
            P4Value::Str("0xa000001".to_string())
        );
    }

    #[test]
    fn exact_sdn_string() {
        assert_eq!(exact("vlan-tag", 0), b"vlan-tag".to_vec());
        assert_eq!(
            decode_exact(b"vlan-tag", 0, DecodeFormat::empty()).unwrap(),
            P4Value::Str("vlan-tag".to_string())
        );
    }

    #[test]
    fn signed_canonical_form() {
        assert_eq!(encode_exact_signed(0, 16).unwrap(), vec![0]);
        assert_eq!(encode_exact_signed(1, 16).unwrap(), vec![1]);
        assert_eq!(encode_exact_signed(-1, 16).unwrap(), vec![0xff]);
        assert_eq!(encode_exact_signed(127, 16).unwrap(), vec![0x7f]);
        assert_eq!(encode_exact_signed(128, 16).unwrap(), vec![0x00, 0x80]);
        assert_eq!(encode_exact_signed(-128, 16).unwrap(), vec![0x80]);
        assert_eq!(encode_exact_signed(-129, 16).unwrap(), vec![0xff, 0x7f]);
        assert!(encode_exact_signed(128, 8).is_err());
        assert!(encode_exact_signed(-129, 8).is_err());

        for value in [-300i128, -2, -1, 0, 1, 2, 300] {
            let data = encode_exact_signed(value, 24).unwrap();
            assert_eq!(decode_exact_signed(&data, 24).unwrap(), value);
        }
    }

    #[test]
    fn lpm_host_bits_cleared() {
        let (data, prefix) = encode_lpm(&"10.0.0.1/24".into(), 32).unwrap();
        assert_eq!(prefix, 24);
        assert_eq!(data, vec![10, 0, 0]); // trailing zero byte trimmed

        let (data, prefix) =
            encode_lpm(&P4Value::Lpm(Box::new(P4Value::Int(0xff)), 4), 8).unwrap();
        assert_eq!(prefix, 4);
        assert_eq!(data, vec![0xf0]);
    }

    #[test]
    fn lpm_forms() {
        // Bare value means a full-width prefix.
        let (_, prefix) = encode_lpm(&P4Value::Int(7), 16).unwrap();
        assert_eq!(prefix, 16);

        // Netmask notation.
        let (_, prefix) = encode_lpm(&"10.1.0.0/255.255.0.0".into(), 32).unwrap();
        assert_eq!(prefix, 16);

        assert!(encode_lpm(&"10.0.0.0/33".into(), 32).is_err());
        assert!(encode_lpm(&P4Value::Lpm(Box::new(P4Value::Int(1)), 130), 128).is_err());
    }

    #[test]
    fn lpm_decode() {
        assert_eq!(
            decode_lpm(&[10, 0, 0], 24, 32, DecodeFormat::empty()).unwrap(),
            P4Value::Lpm(Box::new(P4Value::Int(0x0a00_0000)), 24)
        );
        assert_eq!(
            decode_lpm(&[10, 0, 0], 24, 32, DecodeFormat::ADDRESS | DecodeFormat::STRING)
                .unwrap(),
            P4Value::Str("10.0.0.0/24".to_string())
        );
    }

    #[test]
    fn ternary_masks() {
        let (value, mask) = encode_ternary(&P4Value::Int(0x12), 16).unwrap();
        assert_eq!(value, vec![0x12]);
        assert_eq!(mask, vec![0xff, 0xff]);

        let (value, mask) = encode_ternary(
            &P4Value::Masked(Box::new(P4Value::Int(0x1200)), Box::new(P4Value::Int(0xff00))),
            16,
        )
        .unwrap();
        assert_eq!(value, vec![0x12, 0x00]);
        assert_eq!(mask, vec![0xff, 0x00]);
    }

    #[test]
    fn ternary_value_outside_mask_rejected() {
        let result = encode_ternary(
            &P4Value::Masked(Box::new(P4Value::Int(0x0f)), Box::new(P4Value::Int(0xf0))),
            8,
        );
        assert!(result.is_err());
    }

    #[test]
    fn ternary_slash_notation() {
        let (value, mask) = encode_ternary(&"10.0.0.0/8".into(), 32).unwrap();
        assert_eq!(value, vec![10]);
        assert_eq!(mask, vec![0xff, 0, 0, 0]);

        let (value, mask) = encode_ternary(&"0x12/&0xff".into(), 16).unwrap();
        assert_eq!(value, vec![0x12]);
        assert_eq!(mask, vec![0xff]);
    }

    #[test]
    fn range_forms() {
        let (low, high) = encode_range(
            &P4Value::Range(Box::new(P4Value::Int(5)), Box::new(P4Value::Int(300))),
            16,
        )
        .unwrap();
        assert_eq!(low, vec![5]);
        assert_eq!(high, vec![1, 44]);

        let (low, high) = encode_range(&"1...10".into(), 8).unwrap();
        assert_eq!(low, vec![1]);
        assert_eq!(high, vec![10]);

        assert!(encode_range(&P4Value::Int(1), 8).is_err());
    }

    #[test]
    fn mask_to_prefix_contiguous() {
        assert_eq!(mask_to_prefix(0xffff_ff00, 32), Some(24));
        assert_eq!(mask_to_prefix(0, 32), Some(0));
        assert_eq!(mask_to_prefix(0xffff_ffff, 32), Some(32));
        assert_eq!(mask_to_prefix(0xff00_ff00, 32), None);
    }

    #[test]
    fn mac_addr_parsing() {
        let mac: MacAddr = "00:00:00:00:00:01".parse().unwrap();
        assert_eq!(mac.to_u64(), 1);
        assert_eq!(mac.to_string(), "00:00:00:00:00:01");
        let mac: MacAddr = "aa-bb-cc-dd-ee-ff".parse().unwrap();
        assert_eq!(mac.to_u64(), 0xaabb_ccdd_eeff);
        assert!("aa:bb".parse::<MacAddr>().is_err());
    }
}
