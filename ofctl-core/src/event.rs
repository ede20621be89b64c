//
// Copyright (c) The Ofctl Core Contributors
//
// SPDX-License-Identifier: MIT
//

//! Event translator (spec.md §4.3). Converts the raw messages a switch
//! connection hands the controller into the high-level network events the
//! application actually reacts to.

use std::sync::Mutex;

use ofctl_utils::ids::{PortId, SwitchId, XId};

use crate::barrier::BarrierRegistry;
use crate::debug::Debug;
use crate::error::Error;
use crate::packetin::{self, PacketCodec};
use crate::session::SessionTable;
use crate::southbound::{
    PacketInRaw, PortDesc, PortStatusReason, RawEvent, SwitchConn, SwitchFeatures,
};
use crate::topology::TopologyView;

/// A network event, the unit of work the application's handler reacts to.
#[derive(Clone, Debug, PartialEq)]
pub enum NetworkEvent {
    SwitchUp(SwitchId),
    SwitchDown(SwitchId),
    PortUp(SwitchId, PortId),
    PortDown(SwitchId, PortId),
    PacketIn {
        pipe: String,
        sw: SwitchId,
        port: PortId,
        payload: crate::southbound::PacketPayload,
        total_len: u16,
    },
}

/// Translates one raw event from `sw` into zero or more network events.
/// Mutates `sessions` (session lifecycle) and `barriers` (barrier
/// resolution) the same way the production driver would as a side effect of
/// translation. `conn` is used only for the `PacketIn` case, to emit
/// packet-outs for physically-routed results (spec.md §4.4).
#[allow(clippy::too_many_arguments)]
pub fn translate(
    sw: SwitchId,
    raw: RawEvent,
    sessions: &mut SessionTable,
    topology: &dyn TopologyView,
    barriers: &Mutex<BarrierRegistry>,
    codec: &dyn PacketCodec,
    conn: &dyn SwitchConn,
) -> Vec<NetworkEvent> {
    match raw {
        RawEvent::Connect(feats) => on_connect(sw, feats, sessions),
        RawEvent::Disconnect => on_disconnect(sw, sessions, topology, barriers),
        RawEvent::PacketIn(packet_in) => {
            on_packet_in(sw, packet_in, sessions, codec, conn)
        }
        RawEvent::PortStatus(reason, desc) => on_port_status(sw, reason, desc),
        RawEvent::BarrierReply(xid) => {
            on_barrier_reply(xid, barriers);
            Vec::new()
        }
        RawEvent::Other => {
            Debug::UnhandledMessage.log();
            Vec::new()
        }
    }
}

fn on_connect(
    sw: SwitchId,
    feats: SwitchFeatures,
    sessions: &mut SessionTable,
) -> Vec<NetworkEvent> {
    sessions.create(sw);
    Debug::SwitchUp(&sw).log();

    let mut events = vec![NetworkEvent::SwitchUp(sw)];
    for port in feats.ports {
        if port.is_usable() {
            events.push(NetworkEvent::PortUp(sw, port.port));
        }
    }
    events
}

fn on_disconnect(
    sw: SwitchId,
    sessions: &mut SessionTable,
    topology: &dyn TopologyView,
    barriers: &Mutex<BarrierRegistry>,
) -> Vec<NetworkEvent> {
    let mut events: Vec<NetworkEvent> = topology
        .ports_of(sw)
        .into_iter()
        .map(|port| NetworkEvent::PortDown(sw, port))
        .collect();
    events.push(NetworkEvent::SwitchDown(sw));

    sessions.remove(sw);
    barriers.lock().unwrap().abandon_switch(sw);
    Debug::SwitchDown(&sw).log();

    events
}

fn on_packet_in(
    sw: SwitchId,
    packet_in: PacketInRaw,
    sessions: &mut SessionTable,
    codec: &dyn PacketCodec,
    conn: &dyn SwitchConn,
) -> Vec<NetworkEvent> {
    let Some(session) = sessions.get(sw) else {
        Debug::PacketInDroppedNoPolicy(&sw).log();
        return Vec::new();
    };
    let Some(policy) = &session.compiled_local else {
        Debug::PacketInDroppedNoPolicy(&sw).log();
        return Vec::new();
    };

    packetin::evaluate(&packet_in, policy.as_ref(), codec, conn)
        .into_iter()
        .map(|delivery| NetworkEvent::PacketIn {
            pipe: delivery.pipe,
            sw,
            port: packet_in.in_port,
            payload: delivery.payload,
            total_len: delivery.total_len,
        })
        .collect()
}

fn on_port_status(
    sw: SwitchId,
    reason: PortStatusReason,
    desc: PortDesc,
) -> Vec<NetworkEvent> {
    let event = match reason {
        PortStatusReason::Add | PortStatusReason::Modify if desc.is_usable() => {
            Some(NetworkEvent::PortUp(sw, desc.port))
        }
        PortStatusReason::Delete => Some(NetworkEvent::PortDown(sw, desc.port)),
        PortStatusReason::Modify => Some(NetworkEvent::PortDown(sw, desc.port)),
        PortStatusReason::Add => None,
    };
    event.into_iter().collect()
}

fn on_barrier_reply(xid: XId, barriers: &Mutex<BarrierRegistry>) {
    if barriers.lock().unwrap().resolve(xid) {
        Debug::BarrierResolved(&xid).log();
    } else {
        Error::BarrierUnknownXid(xid).log();
    }
}
