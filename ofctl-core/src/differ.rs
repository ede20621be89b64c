//
// Copyright (c) The Ofctl Core Contributors
//
// SPDX-License-Identifier: MIT
//

//! Flow-table differ (spec.md §4.1). A pure function: given the flow table
//! currently installed on a switch and the flow table that should replace
//! it, compute the rule deletions needed to go from one to the other.

use ofctl_utils::ids::Priority;

use crate::policy::{FlowEntry, FlowTable};

/// Computes the deletions needed to turn `old` into `new`.
///
/// Both tables must be sorted in strictly decreasing priority. Two entries
/// are considered "the same rule" when their priority and pattern match
/// (actions are ignored: an action-only change is realized purely by
/// installing the new entry, relying on the switch's priority tie-break
/// only for the instant between the new entry landing and the old one being
/// torn down, which is safe because priorities are unique within a table).
///
/// The result lists the entries present in `old` but absent from `new`, in
/// ascending priority order — the lowest-priority (most general) rules are
/// deleted first, so a switch is never left, even momentarily, without its
/// replacement for a low-priority catch-all before that catch-all's
/// deletion is reached.
pub fn diff(old: &FlowTable, new: &FlowTable) -> Vec<(FlowEntry, Priority)> {
    let mut deletions = Vec::new();
    let mut oi = 0;
    let mut ni = 0;

    while oi < old.len() {
        let (old_entry, old_prio) = &old[oi];

        match new.get(ni) {
            Some((new_entry, new_prio)) => {
                if old_prio.0 > new_prio.0 {
                    deletions.push((old_entry.clone(), *old_prio));
                    oi += 1;
                } else if old_prio.0 == new_prio.0 {
                    if old_entry.pattern == new_entry.pattern {
                        // Same rule, kept.
                    } else {
                        // Priority collision with an unrelated rule: not
                        // representable as "kept", so the old entry must go
                        // and the new one will be installed fresh.
                        deletions.push((old_entry.clone(), *old_prio));
                    }
                    oi += 1;
                    ni += 1;
                } else {
                    // new_prio > old_prio: `new` has an addition ahead of
                    // where we are in `old`; it requires no diff output.
                    ni += 1;
                }
            }
            None => {
                // `new` is exhausted; every remaining `old` entry is a
                // deletion.
                deletions.push((old_entry.clone(), *old_prio));
                oi += 1;
            }
        }
    }

    deletions.reverse();
    deletions
}

#[cfg(test)]
mod tests {
    use ofctl_utils::ids::PortId;

    use super::*;
    use crate::policy::Pattern;

    fn entry(in_port: u32) -> FlowEntry {
        FlowEntry {
            pattern: Pattern {
                in_port: Some(PortId(in_port)),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[test]
    fn scenario_diff_drops_unmatched_low_priority_entry() {
        // spec.md §8 scenario 2.
        let pattern_a = entry(1);
        let pattern_b = entry(2);
        let pattern_c = entry(3);

        let old = vec![
            (pattern_a.clone(), Priority(5)),
            (pattern_b.clone(), Priority(3)),
        ];
        let new = vec![
            (pattern_a.clone(), Priority(5)),
            (pattern_c, Priority(4)),
        ];

        let deletions = diff(&old, &new);
        assert_eq!(deletions, vec![(pattern_b, Priority(3))]);
    }

    #[test]
    fn identical_tables_produce_no_deletions() {
        let table = vec![(entry(1), Priority(10)), (entry(2), Priority(5))];
        assert!(diff(&table, &table).is_empty());
    }

    #[test]
    fn empty_new_table_deletes_everything_ascending() {
        let old = vec![
            (entry(1), Priority(10)),
            (entry(2), Priority(5)),
            (entry(3), Priority(1)),
        ];
        let deletions = diff(&old, &FlowTable::new());
        assert_eq!(
            deletions.iter().map(|(_, p)| p.0).collect::<Vec<_>>(),
            vec![1, 5, 10]
        );
    }

    #[test]
    fn deletions_always_ascending_priority() {
        let old = vec![
            (entry(1), Priority(10)),
            (entry(2), Priority(8)),
            (entry(3), Priority(6)),
            (entry(4), Priority(4)),
        ];
        let new = vec![(entry(5), Priority(9))];
        let deletions = diff(&old, &new);
        let prios: Vec<u16> = deletions.iter().map(|(_, p)| p.0).collect();
        let mut sorted = prios.clone();
        sorted.sort_unstable();
        assert_eq!(prios, sorted);
    }

    /// spec.md §8 property 1: applying the diff as deletions to `old` and
    /// then adding every entry from `new` yields exactly `new` (as a set of
    /// (priority, pattern, actions)).
    #[test]
    fn property_diff_then_install_equals_new() {
        let old = vec![
            (entry(1), Priority(10)),
            (entry(2), Priority(8)),
            (entry(3), Priority(6)),
        ];
        let new = vec![
            (entry(1), Priority(10)),
            (entry(4), Priority(7)),
            (entry(3), Priority(6)),
        ];

        let deletions = diff(&old, &new);

        let mut simulated: Vec<(FlowEntry, Priority)> = old
            .iter()
            .filter(|old_pair| {
                !deletions.iter().any(|del| {
                    del.1 == old_pair.1 && del.0.pattern == old_pair.0.pattern
                })
            })
            .cloned()
            .collect();
        for (entry, prio) in &new {
            if !simulated
                .iter()
                .any(|(e, p)| p.0 == prio.0 && e.pattern == entry.pattern)
            {
                simulated.push((entry.clone(), *prio));
            }
        }
        simulated.sort_by(|a, b| b.1.0.cmp(&a.1.0));

        let mut expected = new.clone();
        expected.sort_by(|a, b| b.1.0.cmp(&a.1.0));

        let simulated_set: Vec<(u16, Pattern)> = simulated
            .iter()
            .map(|(e, p)| (p.0, e.pattern.clone()))
            .collect();
        let expected_set: Vec<(u16, Pattern)> = expected
            .iter()
            .map(|(e, p)| (p.0, e.pattern.clone()))
            .collect();
        assert_eq!(simulated_set, expected_set);
    }
}
