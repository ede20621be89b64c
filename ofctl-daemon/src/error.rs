//
// Copyright (c) The Ofctl Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::net::SocketAddr;

use tracing::{error, warn, warn_span};

// Daemon-level errors: everything below `ofctl-core`'s narrow interfaces,
// i.e. binding the listen socket and accepting connections.
#[derive(Debug)]
pub enum Error {
    BindFailed(SocketAddr, std::io::Error),
    AcceptFailed(std::io::Error),
}

impl Error {
    pub fn log(&self) {
        match self {
            Error::BindFailed(addr, error) => {
                error!(%addr, %error, "{}", self);
            }
            Error::AcceptFailed(error) => {
                warn_span!("southbound").in_scope(|| {
                    warn!(%error, "{}", self);
                });
            }
        }
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::BindFailed(..) => write!(f, "failed to bind southbound listen socket"),
            Error::AcceptFailed(..) => write!(f, "failed to accept a switch connection"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::BindFailed(_, error) | Error::AcceptFailed(error) => Some(error),
        }
    }
}
