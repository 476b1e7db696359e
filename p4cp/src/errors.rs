//! Error types shared across the library.
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

use grpcio::RpcStatusCode;
use prost::Message;
use proto::p4runtime as p4r;
use thiserror::Error;

pub use proto::rpc::Code;

/// Library-wide error type.
///
/// The supervisor treats `Rpc` errors whose status is a transport condition
/// (UNAVAILABLE, DEADLINE_EXCEEDED, connection resets) as transient and
/// reconnects; the remaining variants are programming or device errors and
/// surface to the caller.
#[derive(Debug, Error)]
pub enum Error {
    /// Bad switch options or an unreadable pipeline artifact.
    #[error("configuration error: {0}")]
    Config(String),

    /// Unknown name/id, value out of range, or type mismatch against P4Info.
    #[error("schema error: {0}")]
    Schema(String),

    /// Invalid match/action composition at the wire-encoding layer.
    #[error("encoding error: {0}")]
    Encoding(String),

    /// A gRPC operation failed; carries decoded per-update details for Write.
    #[error(transparent)]
    Rpc(#[from] P4Error),

    /// SetForwardingPipelineConfig failed verification.
    #[error("pipeline error: {0}")]
    Pipeline(String),

    /// Stream-level error response or transport disconnect while READY.
    #[error("stream error: {0}")]
    Stream(String),

    /// The supervisor cancelled the task; benign terminator.
    #[error("cancelled")]
    Cancelled,
}

impl Error {
    pub fn config(msg: impl fmt::Display) -> Self {
        Error::Config(msg.to_string())
    }

    pub fn schema(msg: impl fmt::Display) -> Self {
        Error::Schema(msg.to_string())
    }

    pub fn encoding(msg: impl fmt::Display) -> Self {
        Error::Encoding(msg.to_string())
    }

    /// True for conditions the supervisor absorbs by reconnecting.
    pub fn is_transient(&self) -> bool {
        match self {
            Error::Rpc(err) => err.is_transient(),
            Error::Stream(_) => true,
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// One failed update inside a Write, decoded from `p4.v1.Error`.
#[derive(Clone, Debug)]
pub struct P4SubError {
    pub canonical_code: Code,
    pub message: String,
    pub space: String,
    pub code: i32,
}

impl fmt::Display for P4SubError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.canonical_code, self.message)?;
        if !self.space.is_empty() {
            write!(f, " (space={} code={})", self.space, self.code)?;
        }
        Ok(())
    }
}

/// Decoded `google.rpc.Status`, including the per-update detail list that
/// P4Runtime attaches to failed WriteRequests.
#[derive(Clone, Debug)]
pub struct P4Status {
    pub code: Code,
    pub message: String,
    /// Failed updates keyed by their index in the request.
    pub details: BTreeMap<usize, P4SubError>,
}

impl P4Status {
    pub fn new(code: Code, message: impl Into<String>) -> Self {
        P4Status {
            code,
            message: message.into(),
            details: BTreeMap::new(),
        }
    }

    /// Decode from the `grpc-status-details-bin` payload.
    pub fn from_bytes(data: &[u8]) -> Option<Self> {
        let status = proto::rpc::Status::decode(data).ok()?;
        Some(Self::from_status(&status))
    }

    pub fn from_status(status: &proto::rpc::Status) -> Self {
        let mut details = BTreeMap::new();
        for (index, any) in status.details.iter().enumerate() {
            if !any.type_url.ends_with("p4.v1.Error") {
                continue;
            }
            let Ok(err) = p4r::Error::decode(any.value.as_slice()) else {
                continue;
            };
            if err.canonical_code != Code::Ok as i32 {
                details.insert(
                    index,
                    P4SubError {
                        canonical_code: code_from_i32(err.canonical_code),
                        message: err.message,
                        space: err.space,
                        code: err.code,
                    },
                );
            }
        }
        P4Status {
            code: code_from_i32(status.code),
            message: status.message.clone(),
            details,
        }
    }

    /// True if every sub-error is NOT_FOUND (the whole status reads UNKNOWN).
    pub fn is_not_found_only(&self) -> bool {
        if self.code != Code::Unknown || self.details.is_empty() {
            return false;
        }
        self.details
            .values()
            .all(|err| err.canonical_code == Code::NotFound)
    }

    /// True if the device rejected our election id as already in use.
    pub fn is_election_id_used(&self) -> bool {
        // simple_switch_grpc: "Election id already exists"
        // stratum_bmv2: "Election ID is already used by another connection..."
        if self.code != Code::InvalidArgument {
            return false;
        }
        let message = self.message.to_ascii_lowercase();
        message.contains("election id") && (message.contains("exist") || message.contains("used"))
    }

    /// True if the device reports that no forwarding pipeline is installed.
    pub fn is_no_pipeline_configured(&self) -> bool {
        self.code == Code::FailedPrecondition
            && self
                .message
                .to_ascii_lowercase()
                .contains("forwarding pipeline config")
    }
}

impl fmt::Display for P4Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "code={:?} message={:?}", self.code, self.message)?;
        for (index, err) in &self.details {
            write!(f, "\n  [details.{}] {}", index, err)?;
        }
        Ok(())
    }
}

/// A failed gRPC operation against the device.
#[derive(Debug, Error)]
#[error("{operation} failed: {status}")]
pub struct P4Error {
    pub operation: &'static str,
    pub status: P4Status,
}

impl P4Error {
    pub fn new(operation: &'static str, error: grpcio::Error) -> Self {
        let status = match &error {
            grpcio::Error::RpcFailure(rpc) => {
                // Prefer the full google.rpc.Status carried in the trailers.
                P4Status::from_bytes(rpc.details()).unwrap_or_else(|| {
                    P4Status::new(code_from_rpc(rpc.code()), rpc.message())
                })
            }
            grpcio::Error::RpcFinished(Some(rpc)) => {
                P4Status::new(code_from_rpc(rpc.code()), rpc.message())
            }
            other => P4Status::new(Code::Unavailable, other.to_string()),
        };
        let err = P4Error { operation, status };
        log::debug!("{} failed: {}", operation, err.status);
        err
    }

    pub fn code(&self) -> Code {
        self.status.code
    }

    pub fn is_unimplemented(&self) -> bool {
        self.code() == Code::Unimplemented
    }

    pub fn is_unavailable(&self) -> bool {
        self.code() == Code::Unavailable
    }

    /// Transport-level conditions the supervisor absorbs by reconnecting.
    pub fn is_transient(&self) -> bool {
        matches!(self.code(), Code::Unavailable | Code::DeadlineExceeded)
    }
}

fn code_from_i32(code: i32) -> Code {
    Code::from_i32(code).unwrap_or(Code::Unknown)
}

fn code_from_rpc(code: RpcStatusCode) -> Code {
    if code == RpcStatusCode::OK {
        Code::Ok
    } else if code == RpcStatusCode::CANCELLED {
        Code::Cancelled
    } else if code == RpcStatusCode::INVALID_ARGUMENT {
        Code::InvalidArgument
    } else if code == RpcStatusCode::DEADLINE_EXCEEDED {
        Code::DeadlineExceeded
    } else if code == RpcStatusCode::NOT_FOUND {
        Code::NotFound
    } else if code == RpcStatusCode::ALREADY_EXISTS {
        Code::AlreadyExists
    } else if code == RpcStatusCode::PERMISSION_DENIED {
        Code::PermissionDenied
    } else if code == RpcStatusCode::UNAUTHENTICATED {
        Code::Unauthenticated
    } else if code == RpcStatusCode::RESOURCE_EXHAUSTED {
        Code::ResourceExhausted
    } else if code == RpcStatusCode::FAILED_PRECONDITION {
        Code::FailedPrecondition
    } else if code == RpcStatusCode::ABORTED {
        Code::Aborted
    } else if code == RpcStatusCode::OUT_OF_RANGE {
        Code::OutOfRange
    } else if code == RpcStatusCode::UNIMPLEMENTED {
        Code::Unimplemented
    } else if code == RpcStatusCode::INTERNAL {
        Code::Internal
    } else if code == RpcStatusCode::UNAVAILABLE {
        Code::Unavailable
    } else if code == RpcStatusCode::DATA_LOSS {
        Code::DataLoss
    } else {
        Code::Unknown
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prost::Message;

    fn status_with_details(code: Code, sub: &[(Code, &str)]) -> P4Status {
        let details = sub
            .iter()
            .map(|(c, m)| {
                let err = p4r::Error {
                    canonical_code: *c as i32,
                    message: m.to_string(),
                    ..Default::default()
                };
                prost_types::Any {
                    type_url: "type.googleapis.com/p4.v1.Error".to_string(),
                    value: err.encode_to_vec(),
                }
            })
            .collect();
        P4Status::from_status(&proto::rpc::Status {
            code: code as i32,
            message: "write failed".to_string(),
            details,
        })
    }

    #[test]
    fn not_found_only() {
        let status = status_with_details(
            Code::Unknown,
            &[(Code::NotFound, "gone"), (Code::Ok, ""), (Code::NotFound, "gone")],
        );
        assert!(status.is_not_found_only());

        let status = status_with_details(
            Code::Unknown,
            &[(Code::NotFound, "gone"), (Code::InvalidArgument, "bad")],
        );
        assert!(!status.is_not_found_only());
    }

    #[test]
    fn detail_indexes_match_update_positions() {
        let status = status_with_details(
            Code::Unknown,
            &[(Code::Ok, ""), (Code::AlreadyExists, "dup"), (Code::Ok, "")],
        );
        assert_eq!(status.details.len(), 1);
        assert_eq!(status.details[&1].canonical_code, Code::AlreadyExists);
    }

    #[test]
    fn election_id_in_use() {
        let mut status = P4Status::new(
            Code::InvalidArgument,
            "Election ID is already used by another connection with the same role",
        );
        assert!(status.is_election_id_used());
        status.code = Code::FailedPrecondition;
        assert!(!status.is_election_id_used());
    }

    #[test]
    fn no_pipeline_configured() {
        let status = P4Status::new(
            Code::FailedPrecondition,
            "No forwarding pipeline config set for this device.",
        );
        assert!(status.is_no_pipeline_configured());
    }
}
