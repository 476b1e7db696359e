//! Conversion between `p4.v1.Uint128` and Rust's `u128`.
//!
//! P4Runtime carries election ids as a pair of 64-bit words; the rest of this
//! workspace treats them as plain `u128` values.

use crate::p4runtime::Uint128;

/// Encode a `u128` as the wire representation.
pub fn encode(value: u128) -> Uint128 {
    Uint128 {
        high: (value >> 64) as u64,
        low: value as u64,
    }
}

/// Decode the wire representation into a `u128`.
pub fn decode(value: &Uint128) -> u128 {
    ((value.high as u128) << 64) | value.low as u128
}

/// Decode an optional wire value; absent means 0 ("no primary").
pub fn decode_opt(value: Option<&Uint128>) -> u128 {
    value.map(decode).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip() {
        for value in [0u128, 1, 10, u64::MAX as u128, (u64::MAX as u128) + 5, u128::MAX] {
            assert_eq!(decode(&encode(value)), value);
        }
    }

    #[test]
    fn split_words() {
        let wire = encode(0x0123_4567_89ab_cdef_0000_0000_0000_0001);
        assert_eq!(wire.high, 0x0123_4567_89ab_cdef);
        assert_eq!(wire.low, 1);
    }
}
