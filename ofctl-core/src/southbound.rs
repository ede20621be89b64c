//
// Copyright (c) The Ofctl Core Contributors
//
// SPDX-License-Identifier: MIT
//

//! The narrow boundary between the core and an externally supplied
//! OpenFlow 1.0 wire codec/transport (spec.md §1, §6). Nothing in this
//! module parses or serializes bytes on the wire; it only names the
//! messages the core produces and consumes.

use bytes::Bytes;
use enum_as_inner::EnumAsInner;
use ofctl_utils::ids::{PortId, Priority, SwitchId, XId};

use crate::error::Error;
use crate::policy::{Action, FlowEntry, Pattern};

/// A port as reported in `SwitchFeatures`/`PortStatus`.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PortDesc {
    pub port: PortId,
    pub config_down: bool,
    pub state_down: bool,
}

impl PortDesc {
    pub fn is_usable(&self) -> bool {
        !self.config_down && !self.state_down && self.port.is_usable()
    }
}

/// `SwitchFeatures`, sent by a switch right after the TCP connection is
/// established.
#[derive(Clone, Debug)]
pub struct SwitchFeatures {
    pub switch_id: SwitchId,
    pub ports: Vec<PortDesc>,
}

/// Reason code carried by `PortStatus`.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PortStatusReason {
    Add,
    Delete,
    Modify,
}

/// The raw payload of a `PacketIn` message, before header parsing.
#[derive(Clone, Debug, EnumAsInner)]
pub enum PacketPayload {
    /// The switch buffered the packet and only sent a header snapshot; a
    /// `PacketOutMsg` referencing `buffer_id` replays the buffered bytes.
    Buffered { buffer_id: u32, header: Bytes },
    /// The switch sent the packet in full (no buffer retained).
    NotBuffered(Bytes),
}

/// A raw `PacketIn` message.
#[derive(Clone, Debug)]
pub struct PacketInRaw {
    pub in_port: PortId,
    pub total_len: u16,
    pub payload: PacketPayload,
}

/// Everything a switch connection can hand to [`crate::event::translate`]
/// (spec.md §4.3).
#[derive(Clone, Debug, EnumAsInner)]
pub enum RawEvent {
    Connect(SwitchFeatures),
    Disconnect,
    PacketIn(PacketInRaw),
    PortStatus(PortStatusReason, PortDesc),
    BarrierReply(XId),
    /// Any other OpenFlow message the core has no use for.
    Other,
}

/// The payload of a `PacketOutMsg`: either "replay what you buffered" or
/// "here are the full bytes".
#[derive(Clone, Debug)]
pub enum PacketOutPayload {
    Buffered(u32),
    NotBuffered(Bytes),
}

/// A `PacketOutMsg`: send `payload` out, applying `actions`. `in_port` is
/// the packet's original ingress port (or `None` for controller-originated
/// traffic), used by the switch to avoid reflecting the packet back out
/// the port it arrived on when an action says so.
#[derive(Clone, Debug)]
pub struct PacketOutMsg {
    pub payload: PacketOutPayload,
    pub in_port: Option<PortId>,
    pub actions: Vec<Action>,
}

/// `FlowModMsg` variants the core issues (spec.md §6).
#[derive(Clone, Debug)]
pub enum FlowModMsg {
    Add {
        entry: FlowEntry,
        priority: Priority,
    },
    /// Non-strict delete: removes every entry whose pattern is a superset
    /// match of `pattern`, regardless of priority. Used for the Phase III
    /// garbage collection pass (spec.md §4.6).
    DeleteFlow { pattern: Pattern },
    /// Strict delete: removes only the entry with an exact
    /// (pattern, priority) match.
    DeleteStrictFlow { pattern: Pattern, priority: Priority },
    DeleteAllFlows,
}

/// Every message the core can send down to a switch.
#[derive(Clone, Debug, EnumAsInner)]
pub enum OfMsg {
    FlowMod(FlowModMsg),
    BarrierRequest(XId),
    PacketOut(PacketOutMsg),
}

/// A live connection to one switch. Implemented by the daemon on top of an
/// externally supplied wire codec; fakeable in tests.
pub trait SwitchConn: Send + Sync {
    fn send(&self, msg: OfMsg) -> Result<(), Error>;
}
