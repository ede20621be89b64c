//
// Copyright (c) The Ofctl Core Contributors
//
// SPDX-License-Identifier: MIT
//

//! Best-effort updater (spec.md §4.5): delete everything, then install the
//! new table top-down. No barrier is sent — packets in flight may
//! momentarily see an empty table, which is the whole point of calling this
//! "best effort" rather than consistent.

use std::sync::Arc;

use ofctl_utils::ids::{Priority, SwitchId};

use crate::error::Error;
use crate::policy::CompiledPolicy;
use crate::session::SessionTable;
use crate::southbound::{FlowModMsg, OfMsg, SwitchConn};

/// Replaces `sw`'s flow table with the one `policy` compiles to. An empty
/// compiled table indicates a bug upstream and is rejected outright (spec.md
/// §4.5).
pub fn install(
    sw: SwitchId,
    policy: Arc<dyn CompiledPolicy>,
    sessions: &mut SessionTable,
    conn: &dyn SwitchConn,
) -> Result<(), Error> {
    let table = policy.flow_table();
    if table.is_empty() {
        return Err(Error::AssertionFailed("compiled flow table is empty"));
    }

    conn.send(OfMsg::FlowMod(FlowModMsg::DeleteAllFlows))?;

    let mut priority = Priority::MAX;
    for (entry, _) in &table {
        conn.send(OfMsg::FlowMod(FlowModMsg::Add {
            entry: entry.clone(),
            priority,
        }))?;
        priority = priority.dec();
    }

    if let Some(session) = sessions.get_mut(sw) {
        session.compiled_local = Some(policy);
    }

    Ok(())
}
