//
// Copyright (c) The Ofctl Core Contributors
//
// SPDX-License-Identifier: MIT
//

//! The narrow boundary to an externally supplied OpenFlow 1.0 wire codec
//! (SPEC_FULL.md §4 "[EXPANSION] Southbound session shell"). Parsing and
//! serializing the actual OF 1.0 byte format is out of scope for this
//! workspace (spec.md §1); [`Codec`] is the seam a real implementation
//! plugs into, the same way [`ofctl_core::packetin::PacketCodec`] is the
//! seam for header parse/serialize.

use bytes::{Bytes, BytesMut};
use ofctl_core::packetin::PacketCodec;
use ofctl_core::policy::HeaderValues;
use ofctl_core::southbound::{OfMsg, RawEvent};
use ofctl_utils::ids::PortId;

/// Decodes/encodes the OpenFlow 1.0 wire format. `decode` is handed
/// whatever bytes have accumulated on the socket so far and must leave
/// unconsumed bytes in `buf` for the next call (stream framing); it returns
/// `Ok(None)` when the buffer doesn't yet hold a complete message.
pub trait Codec: Send + Sync {
    fn decode(&self, buf: &mut BytesMut) -> Option<RawEvent>;
    fn encode(&self, msg: &OfMsg) -> Bytes;
}

/// Placeholder [`Codec`] shipped with this binary so it links and runs
/// without a real OF 1.0 parser wired in. It drains whatever bytes a switch
/// sends as a single [`RawEvent::Other`] per read and emits empty frames
/// for every outbound message; a production deployment replaces this with
/// a real wire codec crate (spec.md §1 lists the codec as out of scope for
/// the core itself).
#[derive(Clone, Copy, Debug, Default)]
pub struct PlaceholderCodec;

impl Codec for PlaceholderCodec {
    fn decode(&self, buf: &mut BytesMut) -> Option<RawEvent> {
        if buf.is_empty() {
            return None;
        }
        buf.clear();
        Some(RawEvent::Other)
    }

    fn encode(&self, _msg: &OfMsg) -> Bytes {
        Bytes::new()
    }
}

/// Placeholder implementation of [`ofctl_core::packetin::PacketCodec`] —
/// the separate header parse/serialize boundary the packet-in evaluator
/// depends on (spec.md §1 "packet parse/serialize" is out of scope for the
/// core). Until a real L2-L4 parser is wired in, every packet decodes to
/// its zeroed default header values (carrying only the ingress port) and
/// re-serializes to its original bytes untouched.
#[derive(Clone, Copy, Debug, Default)]
pub struct PlaceholderPacketCodec;

impl PacketCodec for PlaceholderPacketCodec {
    fn parse(&self, _bytes: &[u8], in_port: PortId) -> HeaderValues {
        HeaderValues {
            in_port,
            ..Default::default()
        }
    }

    fn serialize(&self, original: &[u8], _headers: &HeaderValues) -> Bytes {
        Bytes::copy_from_slice(original)
    }
}
