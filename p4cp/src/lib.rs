/*!
P4Runtime/gNMI control-plane library.

p4cp drives P4-programmable switches: it opens the P4Runtime StreamChannel,
negotiates primary/backup arbitration, installs the forwarding pipeline,
reads and writes typed pipeline entities, exchanges packet I/O and digests,
and speaks gNMI for device state. A [`Controller`] supervises any number of
[`Switch`]es; user code runs in a ready handler invoked whenever a switch's
control channel reaches READY.

```no_run
use p4cp::{Controller, Switch, SwitchOptions, P4TableEntry, P4TableMatch, P4TableAction};
use p4cp::p4entity::insert;
use std::path::PathBuf;

# async fn example() -> p4cp::Result<()> {
let options = SwitchOptions::new()
    .with_p4info(PathBuf::from("pipeline.p4info.txtpb"))
    .with_ready_handler(|switch: Switch| async move {
        switch
            .write([insert(
                P4TableEntry::new("l2_exact_table")
                    .with_match(P4TableMatch::new().field("dst_addr", "00:00:00:00:00:01"))
                    .with_action(P4TableAction::new("set_egress_port").param("port_num", 1u32)),
            )
            .into()])
            .await
    });

let controller = Controller::with_switches(
    "demo",
    [Switch::new("s1", "127.0.0.1:50001", options)?],
)?;
controller.run().await
# }
```

Set `P4CP_DEBUG=1` to log every P4Runtime/gNMI message at debug level;
`GRPC_TRACE`/`GRPC_VERBOSITY` pass through to the gRPC core.
*/
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

pub mod arbitrator;
pub mod controller;
pub mod errors;
pub mod gnmiclient;
pub mod gnmipath;
pub mod gnmistring;
pub mod p4client;
pub mod p4entity;
pub mod p4schema;
pub mod p4values;
pub mod pbuf;
pub mod ports;
pub mod switch;
#[doc(hidden)]
pub mod testlib;
pub mod tls;
pub mod util;

pub use controller::{Controller, StopEvent};
pub use errors::{Code, Error, P4Error, P4Status, P4SubError, Result};
pub use gnmiclient::{GnmiClient, GnmiSetOp, GnmiSubscription, GnmiUpdate, GnmiValue};
pub use gnmipath::GnmiPath;
pub use p4entity::{
    delete, insert, modify, P4ActionProfileGroup, P4ActionProfileMember, P4CloneSessionEntry,
    P4CounterData, P4CounterEntry, P4DigestEntry, P4DigestList, P4DigestListAck,
    P4DirectCounterEntry, P4DirectMeterEntry, P4Entity, P4EntryAction, P4IdleTimeoutNotification,
    P4IndirectAction, P4Member, P4MeterConfig, P4MeterCounterData, P4MeterEntry,
    P4MulticastGroupEntry, P4PacketIn, P4PacketOut, P4RegisterEntry, P4Replica, P4TableAction,
    P4TableEntry, P4TableMatch, P4Update, P4UpdateType, P4ValueSetEntry, P4ValueSetMember,
    P4WeightedAction, P4WriteOp,
};
pub use p4schema::{P4Blob, P4InfoSource, P4Schema};
pub use p4values::{DecodeFormat, MacAddr, P4Value};
pub use ports::{OperStatus, Port, PortEvent, PortList};
pub use switch::{
    ApiVersion, ConnectionState, EventData, RetryPolicy, Switch, SwitchEvent, SwitchOptions,
    WriteOptions,
};
pub use tls::{Pem, TlsCredentials};
