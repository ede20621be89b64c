//
// Copyright (c) The Ofctl Core Contributors
//
// SPDX-License-Identifier: MIT
//

//! Packet-in evaluator (spec.md §4.4). Given a raw `PacketIn` and the
//! compiled policy for the switch it arrived on, splits the resulting
//! actions into packets forwarded immediately back to the switch
//! (packet-out) and packets handed to the application through a named pipe.
//!
//! Header parsing and re-serialization are themselves out of scope (spec.md
//! §1 "packet parse/serialize"); this module only defines the narrow
//! [`PacketCodec`] boundary to that external component, the same way
//! [`crate::southbound::SwitchConn`] is the boundary to the wire transport.

use bytes::Bytes;
use ofctl_utils::ids::PortId;

use crate::error::Error;
use crate::policy::{Action, CompiledPolicy, HeaderValues, Location, Modification};
use crate::southbound::{OfMsg, PacketInRaw, PacketOutMsg, PacketOutPayload, PacketPayload, SwitchConn};

/// The narrow boundary to an externally supplied packet codec. `parse`
/// turns the bytes a switch handed to the controller into concrete header
/// values; `serialize` rewrites a subset of those fields back onto the
/// original bytes.
///
/// Only MAC addresses, IP addresses and TCP/UDP ports can be rewritten in
/// place; `vlan`, `vlan_pcp`, `eth_type` and `ip_proto` changes require
/// re-framing the packet, which this boundary does not support (spec.md §9
/// "Packet modification re-serialization").
pub trait PacketCodec: Send + Sync {
    fn parse(&self, bytes: &[u8], in_port: PortId) -> HeaderValues;
    fn serialize(&self, original: &[u8], headers: &HeaderValues) -> Bytes;
}

/// Fields this crate refuses to re-serialize onto a modified packet
/// (spec.md §4.4 step 5, §7 `UnsupportedMod`).
fn unsupported_change(orig: &HeaderValues, modified: &HeaderValues) -> Option<&'static str> {
    if orig.vlan != modified.vlan {
        Some("vlan")
    } else if orig.vlan_pcp != modified.vlan_pcp {
        Some("vlanPcp")
    } else if orig.eth_type != modified.eth_type {
        Some("ethType")
    } else if orig.ip_proto != modified.ip_proto {
        Some("ipProto")
    } else {
        None
    }
}

/// Builds the action list a packet-out needs to realize `modified` starting
/// from `orig` (spec.md §4.4 step 3): one `Modify` per changed field,
/// followed by `Output(Physical(port))`.
fn diff_actions(orig: &HeaderValues, modified: &HeaderValues, port: PortId) -> Vec<Action> {
    let mut actions = Vec::new();

    if orig.eth_src != modified.eth_src {
        actions.push(Action::Modify(Modification::SetEthSrc(modified.eth_src)));
    }
    if orig.eth_dst != modified.eth_dst {
        actions.push(Action::Modify(Modification::SetEthDst(modified.eth_dst)));
    }
    if orig.ip_src != modified.ip_src {
        actions.push(Action::Modify(Modification::SetIpSrc(modified.ip_src)));
    }
    if orig.ip_dst != modified.ip_dst {
        actions.push(Action::Modify(Modification::SetIpDst(modified.ip_dst)));
    }
    if orig.tcp_src != modified.tcp_src {
        actions.push(Action::Modify(Modification::SetTcpSrcPort(modified.tcp_src)));
    }
    if orig.tcp_dst != modified.tcp_dst {
        actions.push(Action::Modify(Modification::SetTcpDstPort(modified.tcp_dst)));
    }
    if orig.udp_src != modified.udp_src {
        actions.push(Action::Modify(Modification::SetUdpSrcPort(modified.udp_src)));
    }
    if orig.udp_dst != modified.udp_dst {
        actions.push(Action::Modify(Modification::SetUdpDstPort(modified.udp_dst)));
    }

    actions.push(Action::Output(Location::Physical(port)));
    actions
}

/// One packet handed to the application through a named pipe: the pipe
/// name plus its (possibly modified) header values and re-serialized
/// bytes.
pub struct PipeDelivery {
    pub pipe: String,
    pub payload: PacketPayload,
    pub total_len: u16,
}

/// Evaluates `raw` against `policy`, sending every physical-port result out
/// on `conn` as a packet-out and returning every pipe-routed result for the
/// caller to turn into `NetworkEvent::PacketIn`s. A failure on one packet
/// (an unsupported re-serialization) is logged and that packet alone is
/// dropped; the rest are still processed (spec.md §7).
pub fn evaluate(
    raw: &PacketInRaw,
    policy: &dyn CompiledPolicy,
    codec: &dyn PacketCodec,
    conn: &dyn SwitchConn,
) -> Vec<PipeDelivery> {
    let original_bytes: &[u8] = match &raw.payload {
        PacketPayload::Buffered { header, .. } => header,
        PacketPayload::NotBuffered(bytes) => bytes,
    };
    let orig = codec.parse(original_bytes, raw.in_port);

    let results = policy.eval(&orig);
    let mut pipes = Vec::new();

    for result in results {
        match &result.location {
            Location::Physical(port) => {
                if let Err(error) = send_phys(raw, &orig, &result.headers, *port, conn) {
                    error.log();
                }
            }
            Location::Controller(_) => {
                // Controller-destined output from the policy is realized
                // by simply not forwarding the packet; nothing to send.
            }
            Location::Pipe(name) => {
                match build_pipe_delivery(raw, &orig, &result.headers, name, codec) {
                    Ok(delivery) => pipes.push(delivery),
                    Err(error) => error.log(),
                }
            }
        }
    }

    pipes
}

fn send_phys(
    raw: &PacketInRaw,
    orig: &HeaderValues,
    modified: &HeaderValues,
    port: PortId,
    conn: &dyn SwitchConn,
) -> Result<(), Error> {
    let actions = diff_actions(orig, modified, port);

    let payload = match &raw.payload {
        PacketPayload::Buffered { buffer_id, .. } => PacketOutPayload::Buffered(*buffer_id),
        PacketPayload::NotBuffered(bytes) => PacketOutPayload::NotBuffered(bytes.clone()),
    };

    conn.send(OfMsg::PacketOut(PacketOutMsg {
        payload,
        in_port: Some(raw.in_port),
        actions,
    }))
}

fn build_pipe_delivery(
    raw: &PacketInRaw,
    orig: &HeaderValues,
    modified: &HeaderValues,
    pipe: &str,
    codec: &dyn PacketCodec,
) -> Result<PipeDelivery, Error> {
    if let Some(field) = unsupported_change(orig, modified) {
        return Err(Error::UnsupportedMod(field));
    }

    let modified_at_all = orig != modified;
    let payload = if !modified_at_all {
        raw.payload.clone()
    } else {
        let original_bytes: &[u8] = match &raw.payload {
            PacketPayload::Buffered { header, .. } => header,
            PacketPayload::NotBuffered(bytes) => bytes,
        };
        let bytes = codec.serialize(original_bytes, modified);
        // A buffer on the switch holds the unmodified packet; once the
        // headers have changed, that buffer no longer matches what should
        // be delivered, so it's invalidated in favor of the fresh bytes.
        PacketPayload::NotBuffered(bytes)
    };

    Ok(PipeDelivery {
        pipe: pipe.to_string(),
        payload,
        total_len: raw.total_len,
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use ofctl_utils::ids::PortId;

    use super::*;
    use crate::policy::{MacAddr, PacketResult};

    struct IdentityCodec;

    impl PacketCodec for IdentityCodec {
        fn parse(&self, bytes: &[u8], in_port: PortId) -> HeaderValues {
            let mut h = HeaderValues::default();
            h.in_port = in_port;
            if let Some(&last) = bytes.last() {
                h.eth_dst = MacAddr([0, 0, 0, 0, 0, last]);
            }
            h
        }

        fn serialize(&self, _original: &[u8], headers: &HeaderValues) -> Bytes {
            Bytes::from(vec![headers.eth_dst.0[5]])
        }
    }

    struct SetEthDstPolicy {
        new_mac: MacAddr,
        out_port: PortId,
    }

    impl CompiledPolicy for SetEthDstPolicy {
        fn flow_table(&self) -> crate::policy::FlowTable {
            Vec::new()
        }

        fn eval(&self, headers: &HeaderValues) -> Vec<PacketResult> {
            let mut modified = headers.clone();
            modified.eth_dst = self.new_mac;
            vec![PacketResult {
                headers: modified,
                location: Location::Physical(self.out_port),
            }]
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

    #[test]
    fn scenario_packet_in_emits_one_packet_out_with_set_and_output() {
        // spec.md §8 scenario 3.
        let raw = PacketInRaw {
            in_port: PortId(1),
            total_len: 64,
            payload: PacketPayload::NotBuffered(Bytes::from_static(&[0xAA])),
        };
        let policy = SetEthDstPolicy {
            new_mac: MacAddr([0, 0, 0, 0, 0, 2]),
            out_port: PortId(2),
        };
        let codec = IdentityCodec;
        let conn = RecordingConn::default();

        let pipes = evaluate(&raw, &policy, &codec, &conn);
        assert!(pipes.is_empty());

        let sent = conn.sent.into_inner().unwrap();
        assert_eq!(sent.len(), 1);
        let OfMsg::PacketOut(out) = &sent[0] else {
            panic!("expected a packet-out");
        };
        assert_eq!(
            out.actions,
            vec![
                Action::Modify(Modification::SetEthDst(MacAddr([0, 0, 0, 0, 0, 2]))),
                Action::Output(Location::Physical(PortId(2))),
            ]
        );
    }

    struct PipePolicy;

    impl CompiledPolicy for PipePolicy {
        fn flow_table(&self) -> crate::policy::FlowTable {
            Vec::new()
        }

        fn eval(&self, headers: &HeaderValues) -> Vec<PacketResult> {
            vec![PacketResult {
                headers: headers.clone(),
                location: Location::Pipe("learning".to_string()),
            }]
        }
    }

    #[test]
    fn unmodified_pipe_delivery_preserves_buffering() {
        let raw = PacketInRaw {
            in_port: PortId(1),
            total_len: 64,
            payload: PacketPayload::Buffered {
                buffer_id: 7,
                header: Bytes::from_static(&[0x01]),
            },
        };
        let conn = RecordingConn::default();
        let pipes = evaluate(&raw, &PipePolicy, &IdentityCodec, &conn);

        assert_eq!(pipes.len(), 1);
        assert_eq!(pipes[0].pipe, "learning");
        assert!(matches!(pipes[0].payload, PacketPayload::Buffered { buffer_id: 7, .. }));
    }

    struct VlanRewritePolicy;

    impl CompiledPolicy for VlanRewritePolicy {
        fn flow_table(&self) -> crate::policy::FlowTable {
            Vec::new()
        }

        fn eval(&self, headers: &HeaderValues) -> Vec<PacketResult> {
            let mut modified = headers.clone();
            modified.vlan = Some(ofctl_utils::ids::VlanVersion(3));
            vec![PacketResult {
                headers: modified,
                location: Location::Pipe("learning".to_string()),
            }]
        }
    }

    #[test]
    fn unsupported_vlan_modification_drops_only_that_packet() {
        let raw = PacketInRaw {
            in_port: PortId(1),
            total_len: 64,
            payload: PacketPayload::NotBuffered(Bytes::from_static(&[0x01])),
        };
        let conn = RecordingConn::default();
        let pipes = evaluate(&raw, &VlanRewritePolicy, &IdentityCodec, &conn);
        assert!(pipes.is_empty());
    }
}
