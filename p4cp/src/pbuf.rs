//! Short-form message logging.
//!
//! Message-level logging is off by default; set `P4CP_DEBUG=1` (or `true`)
//! to log every request/response at debug level. Verbose payloads are
//! compacted: packets render as hex, byte strings are truncated.

use std::fmt;
use std::sync::OnceLock;

use proto::p4runtime as p4r;

/// True when `P4CP_DEBUG` requests message-level logging.
pub fn message_log_enabled() -> bool {
    static ENABLED: OnceLock<bool> = OnceLock::new();
    *ENABLED.get_or_init(|| {
        matches!(
            std::env::var("P4CP_DEBUG").as_deref(),
            Ok("1") | Ok("true")
        )
    })
}

/// Log a message with its direction tag (`send`, `recv`, rpc name).
pub fn log_msg(client: &str, direction: &str, msg: &dyn fmt::Debug) {
    if message_log_enabled() {
        log::debug!("{}: {} {:?}", client, direction, msg);
    }
}

/// Hex form of a byte string, truncated for logs.
pub fn hex_bytes(data: &[u8]) -> String {
    const LIMIT: usize = 40;
    if data.len() > LIMIT {
        format!("{}...({} bytes)", hex::encode(&data[..LIMIT]), data.len())
    } else {
        hex::encode(data)
    }
}

/// One-line rendering of a packet with its metadata fields.
pub fn format_packet(payload: &[u8], metadata: &[p4r::PacketMetadata]) -> String {
    let mut out = hex_bytes(payload);
    for field in metadata {
        out.push_str(&format!(
            " meta[{}]={}",
            field.metadata_id,
            hex::encode(&field.value)
        ));
    }
    out
}

/// One-line rendering of a pipeline config: just the cookie, never the blob.
pub fn format_pipeline_config(config: &p4r::ForwardingPipelineConfig) -> String {
    match &config.cookie {
        Some(cookie) => format!("p4cookie={:#x}", cookie.cookie),
        None => "p4cookie=<none>".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_truncation() {
        assert_eq!(hex_bytes(&[0xab, 0xcd]), "abcd");
        let long = vec![0u8; 100];
        let out = hex_bytes(&long);
        assert!(out.ends_with("...(100 bytes)"));
    }

    #[test]
    fn packet_rendering() {
        let meta = vec![p4r::PacketMetadata {
            metadata_id: 1,
            value: vec![0x09],
        }];
        assert_eq!(format_packet(&[0xde, 0xad], &meta), "dead meta[1]=09");
    }
}
