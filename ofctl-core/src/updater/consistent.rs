//
// Copyright (c) The Ofctl Core Contributors
//
// SPDX-License-Identifier: MIT
//

//! Per-packet consistent updater (spec.md §4.6) — the heart of the core.
//! A Reitblatt-style two-phase update, tagged with a monotonically
//! increasing version carried in the VLAN field, followed by a garbage
//! collection pass. Every phase runs fleet-wide as a join-all: phase N+1
//! begins only once every switch's phase N has resolved, whether that
//! resolution was success, an error, or a barrier timeout.

use std::collections::HashSet;
use std::sync::Mutex;

use futures::future::join_all;
use ofctl_utils::ids::{Priority, SwitchId, VlanVersion, XIdGenerator};
use tokio::sync::oneshot;

use crate::barrier::{self, BarrierRegistry};
use crate::debug::Debug;
use crate::differ;
use crate::error::Error;
use crate::policy::{FlowEntry, FlowTable, Pattern, Policy};
use crate::session::SessionTable;
use crate::southbound::{FlowModMsg, OfMsg, SwitchConn};
use crate::topology::TopologyView;
use crate::updater::rewrite_actions;

/// One switch's membership in a fleet-wide update: its identity and its
/// live connection.
pub struct Member<'a> {
    pub sw: SwitchId,
    pub conn: &'a dyn SwitchConn,
}

/// Per-switch outcome of the whole three-phase update.
pub type UpdateReport = Vec<(SwitchId, Result<(), Error>)>;

/// Runs a full version bump across `members`: Phase I (internal tables),
/// Phase II (edge tables), Phase III (garbage collection), then advances
/// `*version`. `*version` is the version the fleet is currently running;
/// the new generation installed by this call is `version.next()`.
///
/// A switch whose internal or edge phase fails is logged and still carried
/// through the remaining phases (spec.md §4.6 step 1); the version counter
/// advances regardless of any per-switch failure (spec.md §9 Open Question
/// #1 — liveness over consistency on persistent failure).
pub async fn update(
    policy: &dyn Policy,
    members: &[Member<'_>],
    topology: &dyn TopologyView,
    sessions: &mut SessionTable,
    registry: &Mutex<BarrierRegistry>,
    xid_gen: &Mutex<XIdGenerator>,
    version: &mut VlanVersion,
) -> UpdateReport {
    let old_version = *version;
    let new_version = version.next();
    Debug::UpdateStarted(&old_version, &new_version).log();

    let phase1 = phase_internal(policy, members, topology, registry, xid_gen, new_version).await;
    let phase2 =
        phase_edge(policy, members, topology, sessions, registry, xid_gen, new_version).await;
    phase_gc(members, old_version);

    *version = new_version;
    Debug::UpdateVersionAdvanced(&*version).log();

    let mut report = Vec::with_capacity(members.len());
    for member in members {
        let result = phase1
            .iter()
            .find(|(sw, _)| *sw == member.sw)
            .map(|(_, r)| r.clone())
            .unwrap_or(Ok(()))
            .and(
                phase2
                    .iter()
                    .find(|(sw, _)| *sw == member.sw)
                    .map(|(_, r)| r.clone())
                    .unwrap_or(Ok(())),
            );
        report.push((member.sw, result));
    }
    report
}

fn internal_ports(topology: &dyn TopologyView, sw: SwitchId) -> HashSet<ofctl_utils::ids::PortId> {
    topology
        .ports_of(sw)
        .into_iter()
        .filter(|p| topology.is_internal(sw, *p))
        .collect()
}

async fn phase_internal(
    policy: &dyn Policy,
    members: &[Member<'_>],
    topology: &dyn TopologyView,
    registry: &Mutex<BarrierRegistry>,
    xid_gen: &Mutex<XIdGenerator>,
    new_version: VlanVersion,
) -> Vec<(SwitchId, Result<(), Error>)> {
    let mut waiters: Vec<(SwitchId, Result<oneshot::Receiver<()>, Error>)> = Vec::new();

    for member in members {
        let result = (|| -> Result<oneshot::Receiver<()>, Error> {
            let compiled = policy.compile_for(member.sw);
            let internal = internal_ports(topology, member.sw);

            let mut priority = Priority::MAX;
            for (entry, _) in compiled.flow_table() {
                let stamped = stamp_internal(entry, &internal, new_version)?;
                member
                    .conn
                    .send(OfMsg::FlowMod(FlowModMsg::Add { entry: stamped, priority }))?;
                priority = priority.dec();
            }

            barrier::start_barrier(registry, xid_gen, member.sw, member.conn)
        })();
        waiters.push((member.sw, result));
    }

    resolve_waiters(waiters).await
}

fn stamp_internal(
    mut entry: FlowEntry,
    internal: &HashSet<ofctl_utils::ids::PortId>,
    new_version: VlanVersion,
) -> Result<FlowEntry, Error> {
    entry.pattern.vlan = Some(new_version);
    entry.actions = rewrite_actions(internal, new_version, &entry.actions)?;
    Ok(entry)
}

async fn phase_edge(
    policy: &dyn Policy,
    members: &[Member<'_>],
    topology: &dyn TopologyView,
    sessions: &mut SessionTable,
    registry: &Mutex<BarrierRegistry>,
    xid_gen: &Mutex<XIdGenerator>,
    new_version: VlanVersion,
) -> Vec<(SwitchId, Result<(), Error>)> {
    let mut waiters: Vec<(SwitchId, Result<oneshot::Receiver<()>, Error>)> = Vec::new();
    let mut new_edges: Vec<(SwitchId, FlowTable)> = Vec::new();

    for member in members {
        let internal = internal_ports(topology, member.sw);
        let result = (|| -> Result<oneshot::Receiver<()>, Error> {
            let compiled = policy.compile_for(member.sw);
            let mut new_edge = FlowTable::new();
            let mut priority = Priority::MAX;
            for (entry, _) in compiled.flow_table() {
                if let Some(port) = entry.pattern.in_port {
                    if internal.contains(&port) {
                        continue;
                    }
                }
                let stamped = stamp_edge(entry, &internal, new_version)?;
                new_edge.push((stamped, priority));
                priority = priority.dec();
            }

            for (entry, prio) in &new_edge {
                member.conn.send(OfMsg::FlowMod(FlowModMsg::Add {
                    entry: entry.clone(),
                    priority: *prio,
                }))?;
            }

            let old_edge = sessions
                .get(member.sw)
                .map(|s| s.installed_edge.clone())
                .unwrap_or_default();
            for (entry, prio) in differ::diff(&old_edge, &new_edge) {
                member.conn.send(OfMsg::FlowMod(FlowModMsg::DeleteStrictFlow {
                    pattern: entry.pattern,
                    priority: prio,
                }))?;
            }

            new_edges.push((member.sw, new_edge.clone()));
            barrier::start_barrier(registry, xid_gen, member.sw, member.conn)
        })();
        waiters.push((member.sw, result));
    }

    let report = resolve_waiters(waiters).await;

    // Only a switch whose Phase II barrier actually resolved has the new
    // edge table installed; a timed-out or errored switch keeps whatever it
    // held before, so the next update's diff is computed against what it
    // really has (spec.md §3).
    for (sw, result) in &report {
        if result.is_ok() {
            if let Some(table) = new_edges.iter().find(|(s, _)| s == sw).map(|(_, t)| t.clone()) {
                if let Some(session) = sessions.get_mut(*sw) {
                    session.installed_edge = table;
                }
            }
        }
    }

    report
}

fn stamp_edge(
    mut entry: FlowEntry,
    internal: &HashSet<ofctl_utils::ids::PortId>,
    new_version: VlanVersion,
) -> Result<FlowEntry, Error> {
    entry.pattern.vlan = Some(VlanVersion::UNTAGGED);
    entry.actions = rewrite_actions(internal, new_version, &entry.actions)?;
    Ok(entry)
}

fn phase_gc(members: &[Member<'_>], old_version: VlanVersion) {
    for member in members {
        let pattern = Pattern {
            vlan: Some(old_version),
            ..Default::default()
        };
        if let Err(error) = member
            .conn
            .send(OfMsg::FlowMod(FlowModMsg::DeleteFlow { pattern }))
        {
            error.log();
        }
    }
}

/// Awaits every registered barrier concurrently (join-all), turning a
/// pre-barrier failure (compile/send error) into an immediate result
/// without ever registering a waiter for it.
async fn resolve_waiters(
    waiters: Vec<(SwitchId, Result<oneshot::Receiver<()>, Error>)>,
) -> Vec<(SwitchId, Result<(), Error>)> {
    let mut ids = Vec::with_capacity(waiters.len());
    let mut futs = Vec::with_capacity(waiters.len());

    for (sw, result) in waiters {
        match result {
            Ok(rx) => {
                ids.push(sw);
                futs.push(Either::Barrier(Box::pin(barrier::await_barrier_timeout(
                    sw, rx,
                ))));
            }
            Err(error) => {
                error.log();
                ids.push(sw);
                futs.push(Either::Failed(error));
            }
        }
    }

    let results = join_all(futs.into_iter().map(|e| e.resolve())).await;
    ids.into_iter().zip(results).collect()
}

/// Either an in-flight barrier wait or an error already known before the
/// barrier was ever sent (so nothing to await).
enum Either {
    Barrier(std::pin::Pin<Box<dyn std::future::Future<Output = Result<(), Error>> + Send>>),
    Failed(Error),
}

impl Either {
    async fn resolve(self) -> Result<(), Error> {
        match self {
            Either::Barrier(fut) => fut.await,
            Either::Failed(error) => Err(error),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use ofctl_utils::ids::PortId;

    use super::*;
    use crate::policy::{Action, CompiledPolicy, HeaderValues, Location, PacketResult};
    use crate::topology::InMemoryTopology;

    struct DropAllThenForward {
        in_port: PortId,
        out_port: PortId,
    }

    impl CompiledPolicy for DropAllThenForward {
        fn flow_table(&self) -> FlowTable {
            vec![(
                FlowEntry {
                    pattern: Pattern {
                        in_port: Some(self.in_port),
                        ..Default::default()
                    },
                    actions: vec![Action::Output(Location::Physical(self.out_port))],
                    ..Default::default()
                },
                Priority::MAX,
            )]
        }

        fn eval(&self, _headers: &HeaderValues) -> Vec<PacketResult> {
            Vec::new()
        }
    }

    struct ForwardPolicy {
        a_to_b: PortId,
        a_internal: PortId,
        b_to_a: PortId,
        b_internal: PortId,
        sw_a: SwitchId,
    }

    impl Policy for ForwardPolicy {
        fn compile_for(&self, sw: SwitchId) -> Box<dyn CompiledPolicy> {
            if sw == self.sw_a {
                Box::new(DropAllThenForward {
                    in_port: self.a_to_b,
                    out_port: self.a_internal,
                })
            } else {
                Box::new(DropAllThenForward {
                    in_port: self.b_internal,
                    out_port: self.b_to_a,
                })
            }
        }
    }

    #[derive(Default)]
    struct RecordingConn {
        sent: Mutex<Vec<OfMsg>>,
    }

    impl SwitchConn for RecordingConn {
        fn send(&self, msg: OfMsg) -> Result<(), Error> {
            self.sent.lock().unwrap().push(msg);
            Ok(())
        }
    }

    #[tokio::test]
    async fn scenario_two_switch_linear_update_tags_internal_and_edge() {
        // spec.md §8 scenario 1 (simplified to one direction, A -> B).
        let sw_a = SwitchId(1);
        let sw_b = SwitchId(2);
        let p1 = PortId(1); // edge port on A, host-facing.
        let a_internal = PortId(2); // internal port on A, facing B.
        let b_internal = PortId(1); // internal port on B, facing A.
        let p2 = PortId(2); // edge port on B, host-facing.

        let mut topo = InMemoryTopology::new();
        topo.add_link(sw_a, a_internal, sw_b, b_internal);
        topo.add_host_port(sw_a, p1);
        topo.add_host_port(sw_b, p2);

        let policy = ForwardPolicy {
            a_to_b: p1,
            a_internal,
            b_to_a: p2,
            b_internal,
            sw_a,
        };

        let conn_a = RecordingConn::default();
        let conn_b = RecordingConn::default();
        let members = vec![
            Member { sw: sw_a, conn: &conn_a },
            Member { sw: sw_b, conn: &conn_b },
        ];

        let mut sessions = SessionTable::new();
        sessions.create(sw_a);
        sessions.create(sw_b);
        let registry = Mutex::new(BarrierRegistry::new());
        let xid_gen = Mutex::new(XIdGenerator::default());
        let mut version = VlanVersion(1);

        let update_fut = update(
            &policy,
            &members,
            &topo,
            &mut sessions,
            &registry,
            &xid_gen,
            &mut version,
        );
        tokio::pin!(update_fut);

        // Drain every barrier request as soon as it is sent, so the update
        // runs to completion without hitting the 15s timeout.
        loop {
            match futures::poll!(&mut update_fut) {
                std::task::Poll::Ready(report) => {
                    for (_, result) in &report {
                        assert!(result.is_ok());
                    }
                    break;
                }
                std::task::Poll::Pending => {
                    let mut registry = registry.lock().unwrap();
                    for xid in registry.pending_xids() {
                        registry.resolve(xid);
                    }
                }
            }
        }

        assert_eq!(version, VlanVersion(2));

        // Switch A's internal table should forward packets tagged v2 out the
        // internal port, re-stamped v2 to continue toward B.
        let sent_a = conn_a.sent.into_inner().unwrap();
        let internal_add = sent_a.iter().find_map(|msg| match msg {
            OfMsg::FlowMod(FlowModMsg::Add { entry, .. })
                if entry.pattern.vlan == Some(VlanVersion(2)) =>
            {
                Some(entry.clone())
            }
            _ => None,
        });
        assert!(internal_add.is_some());
        let internal_add = internal_add.unwrap();
        assert!(internal_add.actions.contains(&Action::Modify(
            crate::policy::Modification::SetVlan(Some(VlanVersion(2)))
        )));

        // Switch A's edge table matches untagged packets on p1.
        let edge_add = sent_a.iter().find_map(|msg| match msg {
            OfMsg::FlowMod(FlowModMsg::Add { entry, .. })
                if entry.pattern.vlan == Some(VlanVersion::UNTAGGED) =>
            {
                Some(entry.clone())
            }
            _ => None,
        });
        assert!(edge_add.is_some());

        // No rule should still reference the old version (1) after GC.
        let gc_sent = sent_a.iter().any(|msg| {
            matches!(
                msg,
                OfMsg::FlowMod(FlowModMsg::DeleteFlow { pattern })
                    if pattern.vlan == Some(VlanVersion(1))
            )
        });
        assert!(gc_sent);

        assert_eq!(
            sessions.get(sw_a).unwrap().installed_edge.len(),
            1,
            "edge table should hold exactly the one host-facing rule"
        );
    }
}
