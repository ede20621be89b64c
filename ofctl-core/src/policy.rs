//
// Copyright (c) The Ofctl Core Contributors
//
// SPDX-License-Identifier: MIT
//

//! The flow-table data model (spec.md §3) and the narrow boundary to the
//! external policy compiler. The compiler itself (a NetKAT-style language
//! that turns a [`Policy`] into per-switch [`FlowTable`]s) is out of scope
//! for this crate; only the interface it must satisfy lives here.

use std::net::Ipv4Addr;

use enum_as_inner::EnumAsInner;
use ofctl_utils::ids::{PortId, Priority, SwitchId, VlanVersion};

/// A 48-bit Ethernet address.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct MacAddr(pub [u8; 6]);

/// A compiled flow table: an ordered sequence of (priority, entry) pairs,
/// sorted in strictly decreasing priority.
pub type FlowTable = Vec<(FlowEntry, Priority)>;

/// A single flow-table rule.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FlowEntry {
    pub pattern: Pattern,
    pub actions: Vec<Action>,
    pub cookie: u64,
    pub idle_timeout: u16,
    pub hard_timeout: u16,
}

/// Match fields. `None` means "don't care".
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Pattern {
    pub in_port: Option<PortId>,
    pub vlan: Option<VlanVersion>,
    pub vlan_pcp: Option<u8>,
    pub eth_src: Option<MacAddr>,
    pub eth_dst: Option<MacAddr>,
    pub eth_type: Option<u16>,
    pub ip_src: Option<Ipv4Addr>,
    pub ip_dst: Option<Ipv4Addr>,
    pub ip_proto: Option<u8>,
    pub tcp_src: Option<u16>,
    pub tcp_dst: Option<u16>,
    pub udp_src: Option<u16>,
    pub udp_dst: Option<u16>,
}

/// Where a packet's processing terminates: a physical switch port, the
/// controller (packet-in, with a max-len snapshot size), or a named pipe
/// handed to the application.
#[derive(Clone, Debug, Eq, EnumAsInner, PartialEq)]
pub enum Location {
    Physical(PortId),
    Controller(u16),
    Pipe(String),
}

/// A single action in a flow entry's action list.
#[derive(Clone, Debug, EnumAsInner, PartialEq)]
pub enum Action {
    Output(Location),
    Modify(Modification),
}

/// A single header field rewrite.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Modification {
    SetEthSrc(MacAddr),
    SetEthDst(MacAddr),
    SetVlan(Option<VlanVersion>),
    SetVlanPcp(u8),
    SetEthType(u16),
    SetIpSrc(Ipv4Addr),
    SetIpDst(Ipv4Addr),
    SetIpProto(u8),
    SetTcpSrcPort(u16),
    SetTcpDstPort(u16),
    SetUdpSrcPort(u16),
    SetUdpDstPort(u16),
}

/// The concrete field values carried by one packet as it is evaluated
/// against a policy (spec.md §4.4). Mirrors [`Pattern`] but every field is
/// a concrete value rather than an optional match.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct HeaderValues {
    pub in_port: PortId,
    pub vlan: Option<VlanVersion>,
    pub vlan_pcp: u8,
    pub eth_src: MacAddr,
    pub eth_dst: MacAddr,
    pub eth_type: u16,
    pub ip_src: Ipv4Addr,
    pub ip_dst: Ipv4Addr,
    pub ip_proto: u8,
    pub tcp_src: u16,
    pub tcp_dst: u16,
    pub udp_src: u16,
    pub udp_dst: u16,
}

/// One outcome of evaluating a packet against a compiled policy: the
/// packet's (possibly modified) header values paired with where its
/// processing terminated.
#[derive(Clone, Debug, PartialEq)]
pub struct PacketResult {
    pub headers: HeaderValues,
    pub location: Location,
}

/// A compiled, per-switch view of a [`Policy`]. Produced by the external
/// policy compiler; consumed by the updaters (to build flow tables) and by
/// the packet-in evaluator (to resolve individual packets). Opaque to this
/// crate beyond this interface (spec.md §3).
pub trait CompiledPolicy: Send + Sync {
    /// Compiles this policy into the flow table to install on the switch.
    fn flow_table(&self) -> FlowTable;

    /// Evaluates a single packet, returning every terminal location its
    /// processing reaches (a policy can fork a packet to multiple
    /// destinations).
    fn eval(&self, headers: &HeaderValues) -> Vec<PacketResult>;
}

/// A named, switch-independent network policy. Compiling it for a specific
/// switch (taking that switch's identity and local topology into account)
/// yields a [`CompiledPolicy`].
pub trait Policy: Send + Sync {
    fn compile_for(&self, switch: SwitchId) -> Box<dyn CompiledPolicy>;
}
