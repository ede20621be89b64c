//
// Copyright (c) The Ofctl Core Contributors
//
// SPDX-License-Identifier: MIT
//

//! The two update strategies (spec.md §4.5, §4.6) and the pure action
//! rewriter they share.

pub mod best_effort;
pub mod consistent;

use std::collections::HashSet;

use ofctl_utils::ids::{PortId, VlanVersion};

use crate::error::Error;
use crate::policy::{Action, Location, Modification};

/// Which of the two update strategies the controller was configured with
/// (spec.md §6 `update_mode`).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum UpdateMode {
    BestEffort,
    PerPacketConsistent,
}

/// Rewrites a flow entry's action list for the consistent updater (spec.md
/// §9 "Consistent-update action rewriting"): pure, no I/O, unit-testable on
/// its own. Every `Output(Physical p)` is preceded by a VLAN set — stripped
/// to "untagged" when `p` is an edge port (the packet is leaving the
/// network) or stamped with `version` when `p` is internal (the packet
/// continues on the new generation). Every `Output(Controller n)` is
/// preceded by a strip, since packets delivered to the controller never
/// carry the internal tag. Any other output kind reaching this point is a
/// bug in the upstream policy compiler (spec.md §4.6).
pub fn rewrite_actions(
    internal_ports: &HashSet<PortId>,
    version: VlanVersion,
    actions: &[Action],
) -> Result<Vec<Action>, Error> {
    let mut out = Vec::with_capacity(actions.len() + 1);

    for action in actions {
        match action {
            Action::Modify(_) => out.push(action.clone()),
            Action::Output(Location::Physical(port)) => {
                let tag = internal_ports.contains(port).then_some(version);
                out.push(Action::Modify(Modification::SetVlan(tag)));
                out.push(action.clone());
            }
            Action::Output(Location::Controller(_)) => {
                out.push(Action::Modify(Modification::SetVlan(None)));
                out.push(action.clone());
            }
            Action::Output(Location::Pipe(_)) => {
                return Err(Error::AssertionFailed(
                    "pipe output in a consistent-update flow entry",
                ));
            }
        }
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::MacAddr;

    #[test]
    fn physical_output_to_internal_port_carries_the_tag_forward() {
        let mut internal = HashSet::new();
        internal.insert(PortId(1));
        let actions = vec![Action::Output(Location::Physical(PortId(1)))];

        let rewritten = rewrite_actions(&internal, VlanVersion(2), &actions).unwrap();
        assert_eq!(
            rewritten,
            vec![
                Action::Modify(Modification::SetVlan(Some(VlanVersion(2)))),
                Action::Output(Location::Physical(PortId(1))),
            ]
        );
    }

    #[test]
    fn physical_output_to_edge_port_strips_the_tag() {
        let internal = HashSet::new();
        let actions = vec![Action::Output(Location::Physical(PortId(2)))];

        let rewritten = rewrite_actions(&internal, VlanVersion(2), &actions).unwrap();
        assert_eq!(
            rewritten,
            vec![
                Action::Modify(Modification::SetVlan(None)),
                Action::Output(Location::Physical(PortId(2))),
            ]
        );
    }

    #[test]
    fn controller_output_strips_the_tag() {
        let internal = HashSet::new();
        let actions = vec![Action::Output(Location::Controller(128))];

        let rewritten = rewrite_actions(&internal, VlanVersion(2), &actions).unwrap();
        assert_eq!(
            rewritten,
            vec![
                Action::Modify(Modification::SetVlan(None)),
                Action::Output(Location::Controller(128)),
            ]
        );
    }

    #[test]
    fn existing_modifications_are_preserved_ahead_of_the_vlan_set() {
        let internal = HashSet::new();
        let actions = vec![
            Action::Modify(Modification::SetEthDst(MacAddr([0; 6]))),
            Action::Output(Location::Physical(PortId(2))),
        ];

        let rewritten = rewrite_actions(&internal, VlanVersion(2), &actions).unwrap();
        assert_eq!(
            rewritten,
            vec![
                Action::Modify(Modification::SetEthDst(MacAddr([0; 6]))),
                Action::Modify(Modification::SetVlan(None)),
                Action::Output(Location::Physical(PortId(2))),
            ]
        );
    }

    #[test]
    fn pipe_output_is_an_assertion_failure() {
        let internal = HashSet::new();
        let actions = vec![Action::Output(Location::Pipe("learning".to_string()))];
        assert!(rewrite_actions(&internal, VlanVersion(2), &actions).is_err());
    }
}
