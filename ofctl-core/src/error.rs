//
// Copyright (c) The Ofctl Core Contributors
//
// SPDX-License-Identifier: MIT
//

use ofctl_utils::ids::SwitchId;
use tracing::{error, warn, warn_span};

// Core errors (spec.md §7).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Error {
    // I/O errors.
    IoError(IoError),
    // An internal invariant was violated. Fatal to the enclosing update
    // attempt only.
    AssertionFailed(&'static str),
    // A header modification the core cannot re-serialize onto a packet-out
    // (only vlan, vlanPcp, ethType and ipProto are affected).
    UnsupportedMod(&'static str),
    // A `send_barrier_timeout` call waited 15s with no reply.
    BarrierTimeout(SwitchId),
    // The session for `SwitchId` was torn down while an operation against
    // it was in flight.
    SwitchDisconnect(SwitchId),
    // A `BarrierReply` arrived for an xid the registry has no record of.
    BarrierUnknownXid(ofctl_utils::ids::XId),
}

// I/O-flavored errors, kept distinct from protocol/logic errors the same
// way every other crate in this workspace separates them.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum IoError {
    SendDropped(SwitchId),
}

// ===== impl Error =====

impl Error {
    pub fn log(&self) {
        match self {
            Error::IoError(error) => error.log(),
            Error::AssertionFailed(what) => {
                error!(%what, "{}", self);
            }
            Error::UnsupportedMod(field) => {
                warn!(%field, "{}", self);
            }
            Error::BarrierTimeout(sw) => {
                warn_span!("switch", %sw).in_scope(|| {
                    warn!("{}", self);
                });
            }
            Error::SwitchDisconnect(sw) => {
                warn_span!("switch", %sw).in_scope(|| {
                    warn!("{}", self);
                });
            }
            Error::BarrierUnknownXid(xid) => {
                error!(%xid, "{}", self);
            }
        }
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::IoError(error) => error.fmt(f),
            Error::AssertionFailed(..) => {
                write!(f, "internal invariant violated")
            }
            Error::UnsupportedMod(..) => {
                write!(f, "unsupported header modification")
            }
            Error::BarrierTimeout(..) => {
                write!(f, "barrier reply timed out")
            }
            Error::SwitchDisconnect(..) => {
                write!(f, "switch disconnected mid-operation")
            }
            Error::BarrierUnknownXid(..) => {
                write!(f, "barrier reply for unknown transaction id")
            }
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::IoError(error) => Some(error),
            _ => None,
        }
    }
}

impl From<IoError> for Error {
    fn from(error: IoError) -> Error {
        Error::IoError(error)
    }
}

// ===== impl IoError =====

impl IoError {
    pub fn log(&self) {
        match self {
            IoError::SendDropped(sw) => {
                warn_span!("switch", %sw).in_scope(|| {
                    warn!("{}", self);
                });
            }
        }
    }
}

impl std::fmt::Display for IoError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IoError::SendDropped(..) => {
                write!(f, "switch connection refused the send")
            }
        }
    }
}

impl std::error::Error for IoError {}
