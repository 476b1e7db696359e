//! Client arbitration: primary/backup election over the StreamChannel.
//!
//! A client opens the stream and bids with its election id. The device
//! answers OK (we are primary) or ALREADY_EXISTS (a higher bid holds the
//! role); if the id itself is taken by another live connection the bid is
//! lowered and resent. Later arbitration updates move the role at runtime.
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

use proto::p4runtime as p4r;
use proto::rpc::Code;
use proto::u128 as u128util;

use crate::errors::{Error, P4Status, Result};
use crate::p4client::P4Stream;

/// Election id value reserved for "no primary".
const NO_PRIMARY: u128 = 0;

/// How often to lower the bid when the device keeps rejecting it as in use.
const MAX_BID_ATTEMPTS: u32 = 5;

/// Role change the switch must react to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RoleChange {
    BecamePrimary,
    BecameBackup,
}

pub struct Arbitrator {
    initial_election_id: u128,
    pub election_id: u128,
    pub is_primary: bool,
    /// Election id of the current primary; 0 while unknown.
    pub primary_id: u128,
    pub role_name: String,
    pub role_config: Option<prost_types::Any>,
}

impl Arbitrator {
    pub fn new(
        initial_election_id: u128,
        role_name: String,
        role_config: Option<prost_types::Any>,
    ) -> Self {
        Arbitrator {
            initial_election_id,
            election_id: initial_election_id,
            is_primary: false,
            primary_id: NO_PRIMARY,
            role_name,
            role_config,
        }
    }

    fn role(&self) -> Option<p4r::Role> {
        if self.role_name.is_empty() && self.role_config.is_none() {
            return None;
        }
        Some(p4r::Role {
            name: self.role_name.clone(),
            config: self.role_config.clone(),
            ..Default::default()
        })
    }

    /// Run the arbitration handshake after the stream opens. With `conflict`
    /// set, the previous id collided with a live connection and the bid
    /// starts one lower.
    pub async fn handshake(
        &mut self,
        stream: &mut P4Stream,
        device_id: u64,
        conflict: bool,
    ) -> Result<()> {
        debug_assert!(!self.is_primary);

        if conflict {
            self.bid_lower()?;
        }

        let mut response = self.arbitration_request(stream, device_id).await?;
        let mut status = arbitration_status(&response);
        let mut primary_id = u128util::decode_opt(response.election_id.as_ref());

        // NOT_FOUND: there is no primary at all. Bid exactly the advertised
        // value so the device promotes us.
        while status.code == Code::NotFound {
            if primary_id != NO_PRIMARY {
                self.election_id = primary_id;
            }
            response = self.arbitration_request(stream, device_id).await?;
            status = arbitration_status(&response);
            primary_id = u128util::decode_opt(response.election_id.as_ref());
        }

        match status.code {
            Code::Ok | Code::AlreadyExists => {
                self.primary_id = primary_id;
                self.is_primary = status.code == Code::Ok;
                self.check_invariant();
                Ok(())
            }
            _ => Err(Error::Stream(format!(
                "arbitration failed: {}",
                status
            ))),
        }
    }

    /// Handle a mid-session arbitration update. Returns the role change the
    /// switch must act on, if any.
    pub async fn update(
        &mut self,
        stream: &P4Stream,
        device_id: u64,
        msg: &p4r::MasterArbitrationUpdate,
    ) -> Result<Option<RoleChange>> {
        let mut code = arbitration_status(msg).code;
        let new_primary_id = u128util::decode_opt(msg.election_id.as_ref());

        if new_primary_id >= self.primary_id {
            self.primary_id = new_primary_id;
        } else {
            // Some targets announce a decreased election_id with status OK
            // when they want the next backup to claim the primary role.
            log::warn!("election_id decreased to {}", new_primary_id);
            if code == Code::Ok && !self.is_primary && new_primary_id == self.election_id {
                code = Code::NotFound;
            }
        }

        match code {
            Code::Ok => {
                if !self.is_primary {
                    self.is_primary = true;
                    return Ok(Some(RoleChange::BecamePrimary));
                }
                Ok(None)
            }
            Code::AlreadyExists => {
                if self.is_primary {
                    self.is_primary = false;
                    return Ok(Some(RoleChange::BecameBackup));
                }
                Ok(None)
            }
            Code::NotFound => {
                // The primary is gone; claim its id.
                let was_primary = self.is_primary;
                self.is_primary = false;
                if self.primary_id != NO_PRIMARY {
                    self.election_id = self.primary_id;
                }
                self.send(stream, device_id).await?;
                if was_primary {
                    return Ok(Some(RoleChange::BecameBackup));
                }
                Ok(None)
            }
            other => Err(Error::Stream(format!(
                "unexpected arbitration status: {:?}",
                other
            ))),
        }
    }

    /// Called when the stream disconnects.
    pub fn reset(&mut self) {
        self.election_id = self.initial_election_id;
        self.is_primary = false;
        self.primary_id = NO_PRIMARY;
    }

    /// Fill in role and election id on a mutating request.
    pub fn complete_write(&self, request: &mut p4r::WriteRequest) {
        request.role = self.role_name.clone();
        request.election_id = Some(u128util::encode(self.election_id));
    }

    pub fn complete_read(&self, request: &mut p4r::ReadRequest) {
        request.role = self.role_name.clone();
    }

    pub fn complete_set_pipeline(&self, request: &mut p4r::SetForwardingPipelineConfigRequest) {
        request.role = self.role_name.clone();
        request.election_id = Some(u128util::encode(self.election_id));
    }

    fn bid_lower(&mut self) -> Result<()> {
        if self.election_id <= 1 {
            return Err(Error::Stream("no compatible election_id".to_string()));
        }
        self.election_id -= 1;
        Ok(())
    }

    /// Send one arbitration bid and wait for the matching response. An
    /// "election id in use" rejection lowers the bid and retries.
    async fn arbitration_request(
        &mut self,
        stream: &mut P4Stream,
        device_id: u64,
    ) -> Result<p4r::MasterArbitrationUpdate> {
        for _ in 0..MAX_BID_ATTEMPTS {
            self.send(stream, device_id).await?;

            match stream.recv().await {
                Ok(response) => match response.update {
                    Some(p4r::stream_message_response::Update::Arbitration(arbitration)) => {
                        return Ok(arbitration)
                    }
                    other => {
                        // Not an arbitration message; a target may emit other
                        // traffic first. Log and keep waiting.
                        log::warn!("unexpected response during arbitration: {:?}", other);
                        continue;
                    }
                },
                Err(Error::Rpc(err)) if err.status.is_election_id_used() => {
                    self.bid_lower()?;
                }
                Err(err) => return Err(err),
            }
        }
        Err(Error::Stream("no compatible election_id".to_string()))
    }

    async fn send(&self, stream: &P4Stream, device_id: u64) -> Result<()> {
        debug_assert!(self.election_id != NO_PRIMARY);
        stream
            .send(p4r::StreamMessageRequest {
                update: Some(p4r::stream_message_request::Update::Arbitration(
                    p4r::MasterArbitrationUpdate {
                        device_id,
                        role: self.role(),
                        election_id: Some(u128util::encode(self.election_id)),
                        status: None,
                    },
                )),
            })
            .await
    }

    fn check_invariant(&self) {
        if self.is_primary {
            debug_assert_eq!(self.election_id, self.primary_id);
        } else {
            debug_assert!(self.election_id < self.primary_id || self.primary_id == NO_PRIMARY);
        }
    }
}

fn arbitration_status(msg: &p4r::MasterArbitrationUpdate) -> P4Status {
    match &msg.status {
        Some(status) => P4Status::from_status(status),
        None => P4Status::new(Code::Ok, ""),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::P4Error;
    use crate::p4client::stream_for_tests;

    fn arbitration_response(code: Code, election_id: u128) -> p4r::StreamMessageResponse {
        p4r::StreamMessageResponse {
            update: Some(p4r::stream_message_response::Update::Arbitration(
                p4r::MasterArbitrationUpdate {
                    device_id: 1,
                    role: None,
                    election_id: Some(u128util::encode(election_id)),
                    status: Some(proto::rpc::Status {
                        code: code as i32,
                        ..Default::default()
                    }),
                },
            )),
        }
    }

    fn arbitration_update(code: Code, election_id: u128) -> p4r::MasterArbitrationUpdate {
        p4r::MasterArbitrationUpdate {
            device_id: 1,
            role: None,
            election_id: Some(u128util::encode(election_id)),
            status: Some(proto::rpc::Status {
                code: code as i32,
                ..Default::default()
            }),
        }
    }

    fn sent_election_id(msg: p4r::StreamMessageRequest) -> u128 {
        match msg.update {
            Some(p4r::stream_message_request::Update::Arbitration(arbitration)) => {
                u128util::decode_opt(arbitration.election_id.as_ref())
            }
            other => panic!("expected an arbitration bid, got {:?}", other),
        }
    }

    #[test]
    fn roles_only_sent_when_named() {
        let arbitrator = Arbitrator::new(10, String::new(), None);
        assert!(arbitrator.role().is_none());

        let arbitrator = Arbitrator::new(10, "read-only".to_string(), None);
        assert_eq!(arbitrator.role().unwrap().name, "read-only");
    }

    #[tokio::test]
    async fn handshake_wins_primary_on_ok() {
        let (mut stream, responses, mut requests) = stream_for_tests();
        let mut arbitrator = Arbitrator::new(10, String::new(), None);

        responses
            .send(Ok(arbitration_response(Code::Ok, 10)))
            .await
            .unwrap();
        arbitrator.handshake(&mut stream, 1, false).await.unwrap();

        assert!(arbitrator.is_primary);
        assert_eq!(arbitrator.election_id, 10);
        assert_eq!(arbitrator.primary_id, 10);
        assert_eq!(sent_election_id(requests.recv().await.unwrap()), 10);
    }

    #[tokio::test]
    async fn handshake_becomes_backup_on_already_exists() {
        // Starting at 10 with a primary holding 12: the switch stays
        // connected as a backup, no error.
        let (mut stream, responses, mut requests) = stream_for_tests();
        let mut arbitrator = Arbitrator::new(10, String::new(), None);

        responses
            .send(Ok(arbitration_response(Code::AlreadyExists, 12)))
            .await
            .unwrap();
        arbitrator.handshake(&mut stream, 1, false).await.unwrap();

        assert!(!arbitrator.is_primary);
        assert_eq!(arbitrator.election_id, 10);
        assert_eq!(arbitrator.primary_id, 12);
        assert_eq!(sent_election_id(requests.recv().await.unwrap()), 10);
    }

    #[tokio::test]
    async fn handshake_rebids_at_advertised_id_on_not_found() {
        // NOT_FOUND means no primary exists; the client re-bids exactly the
        // advertised id and wins.
        let (mut stream, responses, mut requests) = stream_for_tests();
        let mut arbitrator = Arbitrator::new(10, String::new(), None);

        responses
            .send(Ok(arbitration_response(Code::NotFound, 12)))
            .await
            .unwrap();
        responses
            .send(Ok(arbitration_response(Code::Ok, 12)))
            .await
            .unwrap();
        arbitrator.handshake(&mut stream, 1, false).await.unwrap();

        assert!(arbitrator.is_primary);
        assert_eq!(arbitrator.election_id, 12);
        assert_eq!(arbitrator.primary_id, 12);
        assert_eq!(sent_election_id(requests.recv().await.unwrap()), 10);
        assert_eq!(sent_election_id(requests.recv().await.unwrap()), 12);
    }

    #[tokio::test]
    async fn handshake_conflict_starts_one_lower() {
        let (mut stream, responses, mut requests) = stream_for_tests();
        let mut arbitrator = Arbitrator::new(10, String::new(), None);

        responses
            .send(Ok(arbitration_response(Code::AlreadyExists, 12)))
            .await
            .unwrap();
        arbitrator.handshake(&mut stream, 1, true).await.unwrap();

        assert!(!arbitrator.is_primary);
        assert_eq!(arbitrator.election_id, 9);
        assert_eq!(sent_election_id(requests.recv().await.unwrap()), 9);
    }

    #[tokio::test]
    async fn handshake_lowers_bid_when_id_in_use() {
        // An "election id in use" rejection lowers the bid and retries.
        let (mut stream, responses, mut requests) = stream_for_tests();
        let mut arbitrator = Arbitrator::new(10, String::new(), None);

        responses
            .send(Err(P4Error {
                operation: "StreamChannel",
                status: crate::errors::P4Status::new(
                    Code::InvalidArgument,
                    "Election id already exists",
                ),
            }))
            .await
            .unwrap();
        responses
            .send(Ok(arbitration_response(Code::AlreadyExists, 12)))
            .await
            .unwrap();
        arbitrator.handshake(&mut stream, 1, false).await.unwrap();

        assert!(!arbitrator.is_primary);
        assert_eq!(arbitrator.election_id, 9);
        assert_eq!(sent_election_id(requests.recv().await.unwrap()), 10);
        assert_eq!(sent_election_id(requests.recv().await.unwrap()), 9);
    }

    #[tokio::test]
    async fn update_promotes_backup_to_primary() {
        let (stream, _responses, _requests) = stream_for_tests();
        let mut arbitrator = Arbitrator::new(10, String::new(), None);
        arbitrator.primary_id = 12;

        let change = arbitrator
            .update(&stream, 1, &arbitration_update(Code::Ok, 12))
            .await
            .unwrap();
        assert_eq!(change, Some(RoleChange::BecamePrimary));
        assert!(arbitrator.is_primary);
    }

    #[tokio::test]
    async fn update_demotes_primary_on_already_exists() {
        let (stream, _responses, _requests) = stream_for_tests();
        let mut arbitrator = Arbitrator::new(10, String::new(), None);
        arbitrator.is_primary = true;
        arbitrator.election_id = 10;
        arbitrator.primary_id = 10;

        let change = arbitrator
            .update(&stream, 1, &arbitration_update(Code::AlreadyExists, 12))
            .await
            .unwrap();
        assert_eq!(change, Some(RoleChange::BecameBackup));
        assert!(!arbitrator.is_primary);
        assert_eq!(arbitrator.primary_id, 12);
    }

    #[tokio::test]
    async fn update_claims_departed_primary_id() {
        // NOT_FOUND mid-session: the primary left; the backup bids its id.
        let (stream, _responses, mut requests) = stream_for_tests();
        let mut arbitrator = Arbitrator::new(9, String::new(), None);
        arbitrator.primary_id = 12;

        let change = arbitrator
            .update(&stream, 1, &arbitration_update(Code::NotFound, 12))
            .await
            .unwrap();
        // Promotion arrives as a later OK update; for now we just bid.
        assert_eq!(change, None);
        assert!(!arbitrator.is_primary);
        assert_eq!(arbitrator.election_id, 12);
        assert_eq!(sent_election_id(requests.recv().await.unwrap()), 12);
    }

    #[test]
    fn reset_restores_initial_bid() {
        let mut arbitrator = Arbitrator::new(10, String::new(), None);
        arbitrator.election_id = 4;
        arbitrator.is_primary = true;
        arbitrator.primary_id = 4;
        arbitrator.reset();
        assert_eq!(arbitrator.election_id, 10);
        assert!(!arbitrator.is_primary);
        assert_eq!(arbitrator.primary_id, 0);
    }

    #[test]
    fn complete_write_attaches_role_and_election_id() {
        let mut arbitrator = Arbitrator::new(10, "role1".to_string(), None);
        arbitrator.election_id = 7;
        let mut request = p4r::WriteRequest::default();
        arbitrator.complete_write(&mut request);
        assert_eq!(request.role, "role1");
        assert_eq!(request.election_id, Some(u128util::encode(7)));
    }

    #[test]
    fn bid_lower_stops_at_one() {
        let mut arbitrator = Arbitrator::new(2, String::new(), None);
        arbitrator.bid_lower().unwrap();
        assert_eq!(arbitrator.election_id, 1);
        assert!(arbitrator.bid_lower().is_err());
    }
}
