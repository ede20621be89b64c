//
// Copyright (c) The Ofctl Core Contributors
//
// SPDX-License-Identifier: MIT
//

//! A minimal default application (spec.md §8 scenario 5's "drop" policy),
//! shipped so the binary does something coherent out of the box: every
//! newly connected switch gets a single catch-all drop rule installed.
//! A real deployment supplies its own [`ofctl_core::App`] in place of this
//! one.

use ofctl_core::policy::{CompiledPolicy, FlowEntry, FlowTable, HeaderValues, PacketResult, Policy};
use ofctl_core::topology::TopologyView;
use ofctl_core::{App, NetworkEvent};
use ofctl_utils::ids::{Priority, SwitchId};

/// A single flow entry matching everything, with no actions — i.e. drop.
struct DropTable;

impl CompiledPolicy for DropTable {
    fn flow_table(&self) -> FlowTable {
        vec![(FlowEntry::default(), Priority::MIN)]
    }

    fn eval(&self, _headers: &HeaderValues) -> Vec<PacketResult> {
        Vec::new()
    }
}

/// The policy behind [`DefaultApp`]'s drop rule: identical for every switch.
struct DropPolicy;

impl Policy for DropPolicy {
    fn compile_for(&self, _sw: SwitchId) -> Box<dyn CompiledPolicy> {
        Box::new(DropTable)
    }
}

/// Installs [`DropPolicy`] on every switch as it comes up and never reacts
/// to anything else.
pub struct DefaultApp;

impl App for DefaultApp {
    fn handle(
        &mut self,
        event: &NetworkEvent,
        _topology: &dyn TopologyView,
    ) -> Option<Box<dyn Policy>> {
        match event {
            NetworkEvent::SwitchUp(_) => Some(Box::new(DropPolicy)),
            _ => None,
        }
    }
}
