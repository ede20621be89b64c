//
// Copyright (c) The Ofctl Core Contributors
//
// SPDX-License-Identifier: MIT
//

//! Minimal TCP-backed southbound transport (SPEC_FULL.md §4 "[EXPANSION]
//! Southbound session shell"). Accepts switch connections up to the
//! configured backlog, hands each one a per-switch unbounded outbound
//! queue (spec.md §9 Open Question #2 — so one switch's packet-out burst
//! can never block another switch's barrier reply), and feeds the bytes it
//! reads to an injected [`Codec`]. Everything above this — the message
//! semantics, the event translation, the updaters — lives in
//! `ofctl-core` and never sees a raw socket.

use std::net::SocketAddr;
use std::sync::Arc;

use bytes::BytesMut;
use ofctl_core::controller::{ControllerHandle, Inbound};
use ofctl_core::error::Error as CoreError;
use ofctl_core::southbound::{OfMsg, RawEvent, SwitchConn};
use ofctl_utils::ids::SwitchId;
use socket2::{Domain, Socket, Type};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tracing::{debug, debug_span, warn};

use crate::codec::Codec;
use crate::error::Error;

const READ_CHUNK: usize = 4096;

/// Binds the southbound listen socket with `backlog` as the pending accept
/// queue depth (spec.md §6 "Maximum pending accept queue: 64").
pub fn bind(addr: SocketAddr, backlog: u32) -> Result<TcpListener, Error> {
    let socket = Socket::new(Domain::for_address(addr), Type::STREAM, None)
        .map_err(|error| Error::BindFailed(addr, error))?;
    socket
        .set_reuse_address(true)
        .map_err(|error| Error::BindFailed(addr, error))?;
    socket
        .bind(&addr.into())
        .map_err(|error| Error::BindFailed(addr, error))?;
    socket
        .listen(backlog as i32)
        .map_err(|error| Error::BindFailed(addr, error))?;
    socket
        .set_nonblocking(true)
        .map_err(|error| Error::BindFailed(addr, error))?;
    TcpListener::from_std(socket.into()).map_err(|error| Error::BindFailed(addr, error))
}

/// Accept loop: one task per switch connection, run for as long as the
/// daemon lives. A failed `accept` is logged and retried; it never tears
/// down the listener (spec.md §7 "per-switch errors never abort the
/// controller").
pub async fn run(
    listener: TcpListener,
    codec: Arc<dyn Codec>,
    inbound_tx: mpsc::Sender<Inbound>,
    handle: ControllerHandle,
) {
    loop {
        match listener.accept().await {
            Ok((stream, peer)) => {
                debug_span!("southbound").in_scope(|| debug!(%peer, "switch connection accepted"));
                let codec = Arc::clone(&codec);
                let inbound_tx = inbound_tx.clone();
                let handle = handle.clone();
                ofctl_utils::task::Task::spawn(handle_connection(
                    stream, peer, codec, inbound_tx, handle,
                ))
                .detach();
            }
            Err(error) => Error::AcceptFailed(error).log(),
        }
    }
}

/// Implements [`SwitchConn`] over a connection's per-switch unbounded
/// channel; the writer task owns the actual socket half.
struct TcpSwitchConn {
    sw: SwitchId,
    tx: mpsc::UnboundedSender<OfMsg>,
}

impl SwitchConn for TcpSwitchConn {
    fn send(&self, msg: OfMsg) -> Result<(), CoreError> {
        self.tx.send(msg).map_err(|_| {
            CoreError::IoError(ofctl_core::error::IoError::SendDropped(self.sw))
        })
    }
}

async fn handle_connection(
    stream: TcpStream,
    peer: SocketAddr,
    codec: Arc<dyn Codec>,
    inbound_tx: mpsc::Sender<Inbound>,
    handle: ControllerHandle,
) {
    let (mut read_half, mut write_half) = stream.into_split();
    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<OfMsg>();

    let write_codec = Arc::clone(&codec);
    let writer = ofctl_utils::task::Task::spawn(async move {
        while let Some(msg) = out_rx.recv().await {
            let bytes = write_codec.encode(&msg);
            if !bytes.is_empty() {
                if let Err(error) = write_half.write_all(&bytes).await {
                    warn!(%peer, %error, "failed to write to switch connection");
                    break;
                }
            }
        }
    });

    let mut sw: Option<SwitchId> = None;
    let mut buf = BytesMut::with_capacity(READ_CHUNK);
    let mut read_buf = [0u8; READ_CHUNK];

    'read: loop {
        match read_half.read(&mut read_buf).await {
            Ok(0) => break,
            Ok(n) => buf.extend_from_slice(&read_buf[..n]),
            Err(error) => {
                warn!(%peer, %error, "failed to read from switch connection");
                break;
            }
        }

        while let Some(event) = codec.decode(&mut buf) {
            if let RawEvent::BarrierReply(xid) = event {
                if !handle.resolve_barrier(xid) {
                    CoreError::BarrierUnknownXid(xid).log();
                }
                continue;
            }

            let this_sw = match (&event, sw) {
                (RawEvent::Connect(feats), _) => {
                    sw = Some(feats.switch_id);
                    feats.switch_id
                }
                (_, Some(known)) => known,
                (_, None) => {
                    warn!(%peer, "dropping message received before a Connect handshake");
                    continue;
                }
            };

            let conn: Arc<dyn SwitchConn> = Arc::new(TcpSwitchConn {
                sw: this_sw,
                tx: out_tx.clone(),
            });
            if inbound_tx
                .send(Inbound { sw: this_sw, raw: event, conn })
                .await
                .is_err()
            {
                break 'read;
            }
        }
    }

    if let Some(sw) = sw {
        let conn: Arc<dyn SwitchConn> = Arc::new(TcpSwitchConn { sw, tx: out_tx.clone() });
        let _ = inbound_tx
            .send(Inbound { sw, raw: RawEvent::Disconnect, conn })
            .await;
    }

    drop(out_tx);
    let _ = writer.await;
}
