//
// Copyright (c) The Ofctl Core Contributors
//
// SPDX-License-Identifier: MIT
//

use ofctl_utils::ids::{SwitchId, VlanVersion, XId};
use tracing::{debug, debug_span};

// Debug messages, logged at the `debug` level and tagged with a span named
// after the component involved (spec.md §6 "Logging").
#[derive(Debug)]
pub enum Debug<'a> {
    SwitchUp(&'a SwitchId),
    SwitchDown(&'a SwitchId),
    BarrierSent(&'a SwitchId, &'a XId),
    BarrierResolved(&'a XId),
    PacketInDroppedNoPolicy(&'a SwitchId),
    UpdateStarted(&'a VlanVersion, &'a VlanVersion),
    UpdateVersionAdvanced(&'a VlanVersion),
    UnhandledMessage,
}

// ===== impl Debug =====

impl<'a> Debug<'a> {
    pub fn log(&self) {
        match self {
            Debug::SwitchUp(sw) | Debug::SwitchDown(sw) => {
                debug_span!("switch", %sw).in_scope(|| {
                    debug!("{}", self);
                });
            }
            Debug::BarrierSent(sw, xid) => {
                debug_span!("barrier", %sw, %xid).in_scope(|| {
                    debug!("{}", self);
                });
            }
            Debug::BarrierResolved(xid) => {
                debug_span!("barrier", %xid).in_scope(|| {
                    debug!("{}", self);
                });
            }
            Debug::PacketInDroppedNoPolicy(sw) => {
                debug_span!("packet-in", %sw).in_scope(|| {
                    debug!("{}", self);
                });
            }
            Debug::UpdateStarted(from, to) => {
                debug_span!("updater", %from, %to).in_scope(|| {
                    debug!("{}", self);
                });
            }
            Debug::UpdateVersionAdvanced(ver) => {
                debug_span!("updater", %ver).in_scope(|| {
                    debug!("{}", self);
                });
            }
            Debug::UnhandledMessage => {
                debug!("{}", self);
            }
        }
    }
}

impl<'a> std::fmt::Display for Debug<'a> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Debug::SwitchUp(..) => write!(f, "switch connected"),
            Debug::SwitchDown(..) => write!(f, "switch disconnected"),
            Debug::BarrierSent(..) => write!(f, "barrier request sent"),
            Debug::BarrierResolved(..) => write!(f, "barrier reply resolved"),
            Debug::PacketInDroppedNoPolicy(..) => {
                write!(f, "packet-in dropped: no compiled policy yet")
            }
            Debug::UpdateStarted(..) => write!(f, "update started"),
            Debug::UpdateVersionAdvanced(..) => {
                write!(f, "version counter advanced")
            }
            Debug::UnhandledMessage => write!(f, "unhandled message dropped"),
        }
    }
}
