//
// Copyright (c) The Ofctl Core Contributors
//
// SPDX-License-Identifier: MIT
//

//! Barrier registry and send helpers (spec.md §4.2). The registry is a
//! process-wide map from outstanding barrier transaction ids to a one-shot
//! completion signal, owned by the single [`crate::controller::Controller`]
//! driver object rather than exposed as a module global (spec.md §9 "Global
//! state").

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use ofctl_utils::ids::{SwitchId, XId, XIdGenerator};
use tokio::sync::oneshot;

use crate::debug::Debug;
use crate::error::Error;
use crate::southbound::{OfMsg, SwitchConn};

/// Hard deadline for a barrier reply (spec.md §4.2).
pub const BARRIER_TIMEOUT: Duration = Duration::from_secs(15);

/// Outstanding `BarrierRequest`s, keyed by transaction id. Invariant: every
/// inserted xid corresponds to an in-flight request; an entry is removed
/// when its `BarrierReply` arrives or its switch disconnects. A timed-out
/// waiter is *not* removed here — if the reply eventually arrives it simply
/// finds no one listening on the other end of the channel.
#[derive(Default)]
pub struct BarrierRegistry {
    waiters: HashMap<XId, (SwitchId, oneshot::Sender<()>)>,
}

impl BarrierRegistry {
    pub fn new() -> Self {
        BarrierRegistry::default()
    }

    fn register(&mut self, xid: XId, sw: SwitchId) -> oneshot::Receiver<()> {
        let (tx, rx) = oneshot::channel();
        self.waiters.insert(xid, (sw, tx));
        rx
    }

    /// Resolves the waiter for `xid`, e.g. in response to a `BarrierReply`.
    /// Returns `false` if no entry was registered for it (an unknown xid is
    /// logged at error level by the caller, per spec.md §4.3).
    pub fn resolve(&mut self, xid: XId) -> bool {
        match self.waiters.remove(&xid) {
            Some((_, tx)) => {
                let _ = tx.send(());
                true
            }
            None => false,
        }
    }

    /// Drops every pending waiter for `sw` (spec.md §5 "On SwitchDown,
    /// pending waiters for that switch are abandoned with an error"). The
    /// dropped sender resolves the corresponding receiver with an error,
    /// which the awaiting task surfaces as [`Error::SwitchDisconnect`].
    pub fn abandon_switch(&mut self, sw: SwitchId) {
        self.waiters.retain(|_, (owner, _)| *owner != sw);
    }

    pub fn pending_len(&self) -> usize {
        self.waiters.len()
    }

    /// Every transaction id currently awaiting a reply. Mainly useful for
    /// tests that need to drive a fake switch connection's barrier replies
    /// without a real event loop in the loop.
    pub fn pending_xids(&self) -> Vec<XId> {
        self.waiters.keys().copied().collect()
    }
}

/// Sends a `BarrierRequest` to `sw` and registers its waiter, returning the
/// receiver half so the caller can await it independently of `registry`.
/// Split out from [`send_barrier`]/[`send_barrier_timeout`] so the fleet-wide
/// updaters (spec.md §4.6) can register every switch's barrier up front and
/// only then `join_all` the resulting receivers. `registry` and `xid_gen` are
/// locked only for the instant it takes to allocate an xid and insert the
/// waiter; the lock is never held across an `.await`, so the subsequent wait
/// itself — the part spec.md §5 requires to run "without locks" — takes none.
pub fn start_barrier(
    registry: &Mutex<BarrierRegistry>,
    xid_gen: &Mutex<XIdGenerator>,
    sw: SwitchId,
    conn: &dyn SwitchConn,
) -> Result<oneshot::Receiver<()>, Error> {
    let xid = xid_gen.lock().unwrap().next();
    let rx = registry.lock().unwrap().register(xid, sw);
    conn.send(OfMsg::BarrierRequest(xid))?;
    Debug::BarrierSent(&sw, &xid).log();
    Ok(rx)
}

/// Awaits a receiver obtained from [`start_barrier`] with no bound on how
/// long that takes. Most callers should prefer [`await_barrier_timeout`].
pub async fn await_barrier(sw: SwitchId, rx: oneshot::Receiver<()>) -> Result<(), Error> {
    match rx.await {
        Ok(()) => Ok(()),
        Err(_) => Err(Error::SwitchDisconnect(sw)),
    }
}

/// Same as [`await_barrier`], but bounds the wait at [`BARRIER_TIMEOUT`]. On
/// timeout the registry entry is left in place (it will be reclaimed by
/// [`BarrierRegistry::resolve`] if the reply eventually shows up, or by
/// [`BarrierRegistry::abandon_switch`] on disconnect) and the caller gets a
/// logged [`Error::BarrierTimeout`]; the enclosing update continues.
pub async fn await_barrier_timeout(
    sw: SwitchId,
    rx: oneshot::Receiver<()>,
) -> Result<(), Error> {
    match tokio::time::timeout(BARRIER_TIMEOUT, rx).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(_)) => Err(Error::SwitchDisconnect(sw)),
        Err(_) => {
            let err = Error::BarrierTimeout(sw);
            err.log();
            Err(err)
        }
    }
}

/// Sends a `BarrierRequest` to `sw` and waits for its reply with no bound on
/// how long that takes. Most callers should prefer [`send_barrier_timeout`].
pub async fn send_barrier(
    registry: &Mutex<BarrierRegistry>,
    xid_gen: &Mutex<XIdGenerator>,
    sw: SwitchId,
    conn: &dyn SwitchConn,
) -> Result<(), Error> {
    let rx = start_barrier(registry, xid_gen, sw, conn)?;
    await_barrier(sw, rx).await
}

/// Same as [`send_barrier`], but bounds the wait at [`BARRIER_TIMEOUT`].
pub async fn send_barrier_timeout(
    registry: &Mutex<BarrierRegistry>,
    xid_gen: &Mutex<XIdGenerator>,
    sw: SwitchId,
    conn: &dyn SwitchConn,
) -> Result<(), Error> {
    let rx = start_barrier(registry, xid_gen, sw, conn)?;
    await_barrier_timeout(sw, rx).await
}
