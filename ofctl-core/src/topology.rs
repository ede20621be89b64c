//
// Copyright (c) The Ofctl Core Contributors
//
// SPDX-License-Identifier: MIT
//

//! Topology view (spec.md §3, §9 "Cyclic ownership"). The real graph is
//! built by an external LLDP-based discovery component; the core only ever
//! asks it the two questions defined here. Stored as an adjacency map keyed
//! by switch id, not as a pointer-based graph, so ownership stays simple
//! and the view can be swapped for a fake one in tests.

use std::collections::HashMap;

use ofctl_utils::ids::{PortId, SwitchId};

/// What sits on the other end of a switch port.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Peer {
    Switch(SwitchId),
    Host,
    Unknown,
}

/// The two read-only queries the core needs from topology discovery.
pub trait TopologyView: Send + Sync {
    /// Every port currently known on `sw`.
    fn ports_of(&self, sw: SwitchId) -> Vec<PortId>;

    /// What's attached to `port` on `sw`.
    fn peer_of(&self, sw: SwitchId, port: PortId) -> Peer;

    /// A port is internal when its peer is another known switch; every
    /// other port (host, unknown, or absent) is an edge port.
    fn is_internal(&self, sw: SwitchId, port: PortId) -> bool {
        matches!(self.peer_of(sw, port), Peer::Switch(_))
    }
}

/// In-memory adjacency-map implementation of [`TopologyView`]. Built and
/// updated by whatever external discovery component owns the TCP/LLDP side
/// of topology discovery; also used directly in unit and integration tests.
#[derive(Clone, Debug, Default)]
pub struct InMemoryTopology {
    links: HashMap<(SwitchId, PortId), Peer>,
    ports: HashMap<SwitchId, Vec<PortId>>,
}

impl InMemoryTopology {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `port` on `sw` without necessarily pairing it with a peer
    /// (e.g. an edge port facing a host).
    pub fn add_port(&mut self, sw: SwitchId, port: PortId) {
        let ports = self.ports.entry(sw).or_default();
        if !ports.contains(&port) {
            ports.push(port);
        }
        self.links.entry((sw, port)).or_insert(Peer::Unknown);
    }

    /// Registers a bidirectional internal link between two switch ports.
    pub fn add_link(
        &mut self,
        sw_a: SwitchId,
        port_a: PortId,
        sw_b: SwitchId,
        port_b: PortId,
    ) {
        self.add_port(sw_a, port_a);
        self.add_port(sw_b, port_b);
        self.links.insert((sw_a, port_a), Peer::Switch(sw_b));
        self.links.insert((sw_b, port_b), Peer::Switch(sw_a));
    }

    /// Registers an edge port with a host attached.
    pub fn add_host_port(&mut self, sw: SwitchId, port: PortId) {
        self.add_port(sw, port);
        self.links.insert((sw, port), Peer::Host);
    }

    pub fn remove_switch(&mut self, sw: SwitchId) {
        if let Some(ports) = self.ports.remove(&sw) {
            for port in ports {
                self.links.remove(&(sw, port));
            }
        }
    }
}

impl TopologyView for InMemoryTopology {
    fn ports_of(&self, sw: SwitchId) -> Vec<PortId> {
        self.ports.get(&sw).cloned().unwrap_or_default()
    }

    fn peer_of(&self, sw: SwitchId, port: PortId) -> Peer {
        self.links.get(&(sw, port)).copied().unwrap_or(Peer::Unknown)
    }
}
