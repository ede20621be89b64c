//
// Copyright (c) The Ofctl Core Contributors
//
// SPDX-License-Identifier: MIT
//

//! The OpenFlow 1.0 controller core: a per-packet-consistent two-phase
//! update engine, a best-effort updater, a flow-table differ, a barrier
//! registry, an event translator, a packet-in evaluator, and the driver
//! that ties them together. Transport, wire codec, and packet parsing live
//! outside this crate; everything here speaks in terms of the narrow
//! boundary traits [`southbound::SwitchConn`], [`packetin::PacketCodec`]
//! and [`policy::Policy`]/[`policy::CompiledPolicy`].

pub mod barrier;
pub mod controller;
pub mod debug;
pub mod differ;
pub mod error;
pub mod event;
pub mod packetin;
pub mod policy;
pub mod session;
pub mod southbound;
pub mod topology;
pub mod updater;

pub use controller::{App, Controller, ControllerHandle, Inbound};
pub use error::Error;
pub use event::NetworkEvent;
pub use updater::UpdateMode;
