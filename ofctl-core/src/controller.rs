//
// Copyright (c) The Ofctl Core Contributors
//
// SPDX-License-Identifier: MIT
//

//! Controller Driver (spec.md §4.7). Multiplexes topology-discovery events
//! with translated switch events onto one inbound pipe, dispatches each to a
//! user-supplied app, and hands the app's optional policy output to the
//! configured updater. Mirrors the event-aggregator / event-loop split the
//! teacher uses to turn several disjoint channels into one sequentially
//! processed stream.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use ofctl_utils::ids::{SwitchId, VlanVersion, XIdGenerator};
use tokio::sync::mpsc;
use tracing::debug_span;

use crate::barrier::BarrierRegistry;
use crate::error::Error;
use crate::event::{self, NetworkEvent};
use crate::packetin::PacketCodec;
use crate::policy::Policy;
use crate::session::SessionTable;
use crate::southbound::{RawEvent, SwitchConn};
use crate::topology::TopologyView;
use crate::updater::consistent::{self, Member};
use crate::updater::{best_effort, UpdateMode};

/// What the southbound I/O layer hands the driver for one inbound message.
/// `conn` is kept alongside the event (rather than looked up later) so the
/// driver never needs its own switch-to-connection table just to reply.
pub struct Inbound {
    pub sw: SwitchId,
    pub raw: RawEvent,
    pub conn: Arc<dyn SwitchConn>,
}

/// Either source the driver's inbound pipe multiplexes (spec.md §4.7).
enum Source {
    Switch(Inbound),
    Topology(NetworkEvent),
}

/// A user-supplied handler: given an event and the live topology view,
/// optionally returns a new policy to push out to the fleet.
pub trait App: Send {
    fn handle(&mut self, event: &NetworkEvent, topology: &dyn TopologyView) -> Option<Box<dyn Policy>>;
}

impl<F> App for F
where
    F: FnMut(&NetworkEvent, &dyn TopologyView) -> Option<Box<dyn Policy>> + Send,
{
    fn handle(&mut self, event: &NetworkEvent, topology: &dyn TopologyView) -> Option<Box<dyn Policy>> {
        self(event, topology)
    }
}

/// A clonable handle to the pieces of a running [`Controller`] that the
/// southbound I/O layer needs outside the main event loop: resolving a
/// `BarrierReply` the instant it is parsed off the wire, without waiting for
/// the event loop to get around to it. This is what makes the per-packet
/// consistent updater's phase barriers resolve while the driver's own task
/// may be deep inside an `.await` on that same phase (spec.md §5's "without
/// locks" describes the barrier *wait* itself — the receivers split out by
/// [`crate::barrier::start_barrier`] borrow nothing — not the registry's
/// register/resolve bookkeeping, which is genuinely shared between this
/// handle and the driver loop and so takes a short, never-held-across-await
/// lock, the same way the teacher shares `Arc<Mutex<LabelManager>>` between
/// independent protocol instances).
#[derive(Clone)]
pub struct ControllerHandle {
    registry: Arc<Mutex<BarrierRegistry>>,
}

impl ControllerHandle {
    /// Resolves a `BarrierReply` xid directly, bypassing the event loop.
    pub fn resolve_barrier(&self, xid: ofctl_utils::ids::XId) -> bool {
        self.registry.lock().unwrap().resolve(xid)
    }
}

/// Owns every piece of global state spec.md §9 calls out as living on a
/// single driver object: the session table, the barrier registry, the xid
/// generator, and the running VLAN version counter.
pub struct Controller {
    sessions: SessionTable,
    registry: Arc<Mutex<BarrierRegistry>>,
    xid_gen: Arc<Mutex<XIdGenerator>>,
    version: VlanVersion,
    mode: UpdateMode,
}

impl Controller {
    pub fn new(mode: UpdateMode) -> Self {
        Controller {
            sessions: SessionTable::new(),
            registry: Arc::new(Mutex::new(BarrierRegistry::new())),
            xid_gen: Arc::new(Mutex::new(XIdGenerator::default())),
            version: VlanVersion(1),
            mode,
        }
    }

    /// A clonable handle the southbound I/O layer uses to resolve
    /// `BarrierReply`s out of band (see [`ControllerHandle`]).
    pub fn handle(&self) -> ControllerHandle {
        ControllerHandle {
            registry: Arc::clone(&self.registry),
        }
    }

    /// Entry point named `start` in spec.md §6: strictly sequential
    /// dispatch, one event handler in flight at a time, the event handler's
    /// own updater call included.
    pub async fn start(
        self,
        switch_events: mpsc::Receiver<Inbound>,
        topology_events: mpsc::Receiver<NetworkEvent>,
        topology: &dyn TopologyView,
        codec: &dyn PacketCodec,
        app: impl App,
    ) {
        self.run(switch_events, topology_events, topology, codec, app)
            .await;
    }

    /// Entry point named `start_independent` in spec.md §6: same
    /// multiplexing, translation, and dispatch as [`Controller::start`],
    /// honoring whatever `UpdateMode` the controller was constructed with.
    /// Detaching dispatch into its own task (so a slow handler can't stall
    /// the pipe) isn't possible here without giving up the single-owner
    /// state spec.md §9 calls for: the consistent updater needs `&mut self`
    /// access to the session table, barrier registry, and version counter
    /// for the whole of an update, and a spawned task can't borrow `self`
    /// out from under the loop that owns it. Both entry points currently
    /// behave identically; `start_independent` exists for callers that name
    /// it explicitly per spec.md §6, and is the natural seam to add detached
    /// dispatch behind if the shared state above ever moves behind its own
    /// lock.
    pub async fn start_independent(
        self,
        switch_events: mpsc::Receiver<Inbound>,
        topology_events: mpsc::Receiver<NetworkEvent>,
        topology: &dyn TopologyView,
        codec: &dyn PacketCodec,
        app: impl App,
    ) {
        self.run(switch_events, topology_events, topology, codec, app)
            .await;
    }

    async fn run(
        mut self,
        switch_events: mpsc::Receiver<Inbound>,
        topology_events: mpsc::Receiver<NetworkEvent>,
        topology: &dyn TopologyView,
        codec: &dyn PacketCodec,
        mut app: impl App,
    ) {
        let span = debug_span!("controller");
        let _guard = span.enter();

        let (agg_tx, mut agg_rx) = mpsc::channel(64);
        let _aggregator = event_aggregator(switch_events, topology_events, agg_tx);

        // Every switch currently attached, so a fleet-wide update can reach
        // all of them without the caller having to track connections itself.
        let mut members: HashMap<SwitchId, Arc<dyn SwitchConn>> = HashMap::new();

        while let Some(source) = agg_rx.recv().await {
            let events = match source {
                Source::Switch(inbound) => {
                    let events = event::translate(
                        inbound.sw,
                        inbound.raw,
                        &mut self.sessions,
                        topology,
                        &self.registry,
                        codec,
                        inbound.conn.as_ref(),
                    );
                    members.insert(inbound.sw, Arc::clone(&inbound.conn));
                    events
                }
                Source::Topology(event) => vec![event],
            };

            for event in &events {
                if let NetworkEvent::SwitchDown(sw) = event {
                    members.remove(sw);
                }

                match app.handle(event, topology) {
                    Some(policy) => {
                        self.apply(policy.as_ref(), &members, topology).await;
                    }
                    None => {
                        if let NetworkEvent::SwitchUp(sw) = event {
                            if let Some(conn) = members.get(sw) {
                                if let Err(error) =
                                    best_effort_default(*sw, conn.as_ref(), &mut self.sessions)
                                {
                                    error.log();
                                }
                            }
                        }
                    }
                }
            }
        }
    }

    /// Runs the configured updater across every currently connected switch.
    async fn apply(
        &mut self,
        policy: &dyn Policy,
        members: &HashMap<SwitchId, Arc<dyn SwitchConn>>,
        topology: &dyn TopologyView,
    ) {
        let member_list: Vec<Member> = members
            .iter()
            .map(|(sw, conn)| Member { sw: *sw, conn: conn.as_ref() })
            .collect();

        match self.mode {
            UpdateMode::BestEffort => {
                dispatch_best_effort(policy, members, &mut self.sessions);
            }
            UpdateMode::PerPacketConsistent => {
                let report = consistent::update(
                    policy,
                    &member_list,
                    topology,
                    &mut self.sessions,
                    &self.registry,
                    &self.xid_gen,
                    &mut self.version,
                )
                .await;
                for (sw, result) in report {
                    if let Err(error) = result {
                        tracing::warn_span!("switch", %sw).in_scope(|| error.log());
                    }
                }
            }
        }
    }
}

/// Installs a switch's default (policy-compiled) table with the best-effort
/// strategy, the same call the driver makes for a lone `SwitchUp` when the
/// app declined to push a fleet-wide policy (spec.md §4.7).
fn best_effort_default(
    sw: SwitchId,
    conn: &dyn SwitchConn,
    sessions: &mut SessionTable,
) -> Result<(), Error> {
    let Some(session) = sessions.get(sw) else {
        return Ok(());
    };
    let Some(policy) = session.compiled_local.clone() else {
        return Ok(());
    };
    best_effort::install(sw, policy, sessions, conn)
}

fn dispatch_best_effort(
    policy: &dyn Policy,
    members: &HashMap<SwitchId, Arc<dyn SwitchConn>>,
    sessions: &mut SessionTable,
) {
    for (sw, conn) in members {
        let compiled: Arc<dyn crate::policy::CompiledPolicy> = Arc::from(policy.compile_for(*sw));
        if let Err(error) = best_effort::install(*sw, compiled, sessions, conn.as_ref()) {
            error.log();
        }
    }
}

/// Merges the two inbound sources into one channel (spec.md §4.7
/// "round-robin fairness, no starvation") — `tokio::select!` without a
/// `biased` clause polls its branches in random order each iteration, which
/// is exactly the fairness property wanted here.
fn event_aggregator(
    mut switch_events: mpsc::Receiver<Inbound>,
    mut topology_events: mpsc::Receiver<NetworkEvent>,
    agg_tx: mpsc::Sender<Source>,
) -> ofctl_utils::task::Task<()> {
    ofctl_utils::task::Task::spawn(async move {
        loop {
            let source = tokio::select! {
                Some(inbound) = switch_events.recv() => Source::Switch(inbound),
                Some(event) = topology_events.recv() => Source::Topology(event),
                else => break,
            };
            if agg_tx.send(source).await.is_err() {
                break;
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex as StdMutex;

    use ofctl_utils::ids::PortId;

    use super::*;
    use crate::packetin::PacketCodec;
    use crate::policy::{
        Action, CompiledPolicy, FlowEntry, FlowTable, HeaderValues, Location, PacketResult,
    };
    use crate::southbound::{PortDesc, SwitchFeatures};

    struct NoopCodec;
    impl PacketCodec for NoopCodec {
        fn parse(&self, _bytes: &[u8], in_port: PortId) -> HeaderValues {
            HeaderValues { in_port, ..Default::default() }
        }
        fn serialize(&self, _original: &[u8], _headers: &HeaderValues) -> bytes::Bytes {
            bytes::Bytes::new()
        }
    }

    #[derive(Default)]
    struct RecordingConn {
        sent: StdMutex<Vec<crate::southbound::OfMsg>>,
    }

    impl SwitchConn for RecordingConn {
        fn send(&self, msg: crate::southbound::OfMsg) -> Result<(), Error> {
            self.sent.lock().unwrap().push(msg);
            Ok(())
        }
    }

    struct OnePortPolicy {
        out_port: PortId,
    }

    impl CompiledPolicy for OnePortPolicy {
        fn flow_table(&self) -> FlowTable {
            vec![(
                FlowEntry {
                    actions: vec![Action::Output(Location::Physical(self.out_port))],
                    ..Default::default()
                },
                ofctl_utils::ids::Priority::MAX,
            )]
        }
        fn eval(&self, _headers: &HeaderValues) -> Vec<PacketResult> {
            Vec::new()
        }
    }

    struct OnePortCompilePolicy {
        out_port: PortId,
    }

    impl Policy for OnePortCompilePolicy {
        fn compile_for(&self, _sw: SwitchId) -> Box<dyn CompiledPolicy> {
            Box::new(OnePortPolicy { out_port: self.out_port })
        }
    }

    struct FixedTopology;
    impl TopologyView for FixedTopology {
        fn ports_of(&self, _sw: SwitchId) -> Vec<PortId> {
            Vec::new()
        }
        fn peer_of(&self, _sw: SwitchId, _port: PortId) -> crate::topology::Peer {
            crate::topology::Peer::Unknown
        }
    }

    #[tokio::test]
    async fn switch_up_with_no_app_policy_installs_best_effort_default() {
        // spec.md §4.7: "If no policy is returned but the event is SwitchUp,
        // the updater installs the default policy on that single switch."
        // Here the app never returns a policy at all, so there is no
        // default compiled_local yet, and the install is a no-op — this
        // test instead exercises the `start` plumbing end to end and
        // confirms a SwitchUp reaches the app exactly once.
        let controller = Controller::new(UpdateMode::BestEffort);
        let (switch_tx, switch_rx) = mpsc::channel(4);
        let (topo_tx, topo_rx) = mpsc::channel::<NetworkEvent>(4);
        let topology = FixedTopology;
        let codec = NoopCodec;

        let conn = Arc::new(RecordingConn::default());
        let feats = SwitchFeatures {
            switch_id: SwitchId(1),
            ports: vec![PortDesc { port: PortId(1), config_down: false, state_down: false }],
        };
        switch_tx
            .send(Inbound { sw: SwitchId(1), raw: RawEvent::Connect(feats), conn: conn.clone() })
            .await
            .unwrap();
        drop(switch_tx);
        drop(topo_tx);

        let seen = Arc::new(StdMutex::new(Vec::new()));
        let seen_clone = Arc::clone(&seen);
        let app = move |event: &NetworkEvent, _topo: &dyn TopologyView| -> Option<Box<dyn Policy>> {
            seen_clone.lock().unwrap().push(event.clone());
            None
        };

        controller.start(switch_rx, topo_rx, &topology, &codec, app).await;

        let seen = seen.lock().unwrap();
        assert!(seen.contains(&NetworkEvent::SwitchUp(SwitchId(1))));
    }

    #[tokio::test]
    async fn app_policy_triggers_best_effort_install_across_members() {
        let controller = Controller::new(UpdateMode::BestEffort);
        let (switch_tx, switch_rx) = mpsc::channel(4);
        let (topo_tx, topo_rx) = mpsc::channel::<NetworkEvent>(4);
        let topology = FixedTopology;
        let codec = NoopCodec;

        let conn = Arc::new(RecordingConn::default());
        let feats = SwitchFeatures {
            switch_id: SwitchId(1),
            ports: vec![PortDesc { port: PortId(1), config_down: false, state_down: false }],
        };
        switch_tx
            .send(Inbound { sw: SwitchId(1), raw: RawEvent::Connect(feats), conn: conn.clone() })
            .await
            .unwrap();
        drop(switch_tx);
        drop(topo_tx);

        let app = |_event: &NetworkEvent, _topo: &dyn TopologyView| {
            Some(Box::new(OnePortCompilePolicy { out_port: PortId(3) }) as Box<dyn Policy>)
        };

        controller.start(switch_rx, topo_rx, &topology, &codec, app).await;

        let sent = conn.sent.lock().unwrap();
        assert!(sent
            .iter()
            .any(|msg| matches!(msg, crate::southbound::OfMsg::FlowMod(
                crate::southbound::FlowModMsg::DeleteAllFlows
            ))));
    }
}
