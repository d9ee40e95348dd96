//! Link-layer frames carried by the bridging fabric and the radio.

use crate::{FlowId, MacAddress, SimTime};

/// An Ethernet-style frame. The payload is opaque to every forwarding element;
/// only `src`, `dst` and the size matter for delivery.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub src: MacAddress,
    pub dst: MacAddress,
    pub size_bytes: u32,
    pub kind: FrameKind,
}

/// What the frame carries.
#[derive(Debug, Clone, PartialEq)]
pub enum FrameKind {
    /// One datagram of a traffic flow.
    Data {
        flow: FlowId,
        /// Destination port of the datagram.
        port: u16,
        /// Per-flow sequence number starting at 0.
        seq: u64,
        /// When the source emitted it.
        sent_at: SimTime,
    },
    /// Layer-2 update announcing a station behind a new AP. Sent to broadcast
    /// with the station's address as source so every bridge relearns it.
    L2Update,
}

impl Frame {
    /// Size of the L2 update frame (XID frame, 802.11F).
    pub const L2_UPDATE_SIZE: u32 = 60;

    pub fn data(
        src: MacAddress,
        dst: MacAddress,
        size_bytes: u32,
        flow: FlowId,
        port: u16,
        seq: u64,
        sent_at: SimTime,
    ) -> Self {
        Frame {
            src,
            dst,
            size_bytes,
            kind: FrameKind::Data {
                flow,
                port,
                seq,
                sent_at,
            },
        }
    }

    pub fn l2_update(station: MacAddress) -> Self {
        Frame {
            src: station,
            dst: MacAddress::BROADCAST,
            size_bytes: Self::L2_UPDATE_SIZE,
            kind: FrameKind::L2Update,
        }
    }

    pub fn is_l2_update(&self) -> bool {
        matches!(self.kind, FrameKind::L2Update)
    }

    /// Whether a host with address `mac` should accept this frame.
    pub fn is_for(&self, mac: MacAddress) -> bool {
        self.dst == mac || self.dst.is_broadcast()
    }
}
