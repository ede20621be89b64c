//
// Copyright (c) The Ofctl Core Contributors
//
// SPDX-License-Identifier: MIT
//

//! Per-switch session state (spec.md §3). A session is created on
//! `SwitchUp` and destroyed on `SwitchDown`; between those two events it
//! remembers exactly what's installed on the switch so the differ and the
//! consistent updater have something to diff against.

use std::collections::HashMap;
use std::sync::Arc;

use ofctl_utils::ids::SwitchId;

use crate::policy::{CompiledPolicy, FlowTable};

/// State the controller keeps for one attached switch.
pub struct SwitchSession {
    pub id: SwitchId,
    /// The compiled policy last seen for this switch, if any. `None` until
    /// the first successful update reaches this switch; a `PacketIn`
    /// arriving before that point is dropped (spec.md §4.3).
    pub compiled_local: Option<Arc<dyn CompiledPolicy>>,
    /// What the switch holds after the last successful barrier, sorted in
    /// descending priority. Invariant: priorities within it are strictly
    /// decreasing.
    pub installed_edge: FlowTable,
}

impl SwitchSession {
    pub fn new(id: SwitchId) -> Self {
        SwitchSession {
            id,
            compiled_local: None,
            installed_edge: FlowTable::new(),
        }
    }
}

/// The live set of switch sessions, keyed by datapath id.
#[derive(Default)]
pub struct SessionTable(HashMap<SwitchId, SwitchSession>);

impl SessionTable {
    pub fn new() -> Self {
        SessionTable::default()
    }

    /// Creates a session for a newly connected switch (`SwitchUp`).
    pub fn create(&mut self, sw: SwitchId) {
        self.0.entry(sw).or_insert_with(|| SwitchSession::new(sw));
    }

    /// Destroys a session on `SwitchDown`, returning it if it existed.
    pub fn remove(&mut self, sw: SwitchId) -> Option<SwitchSession> {
        self.0.remove(&sw)
    }

    pub fn get(&self, sw: SwitchId) -> Option<&SwitchSession> {
        self.0.get(&sw)
    }

    pub fn get_mut(&mut self, sw: SwitchId) -> Option<&mut SwitchSession> {
        self.0.get_mut(&sw)
    }

    pub fn contains(&self, sw: SwitchId) -> bool {
        self.0.contains_key(&sw)
    }

    pub fn ids(&self) -> impl Iterator<Item = SwitchId> + '_ {
        self.0.keys().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = &SwitchSession> {
        self.0.values()
    }
}
