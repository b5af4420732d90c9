use etherparse::{SlicedPacket, TransportSlice};

/// Link-layer framing of captured frames, by libpcap DLT number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkKind {
    Ethernet,
    /// BSD loopback: 4-byte host-order address family, then IP.
    Null,
    /// OpenBSD loopback: 4-byte network-order address family, then IP.
    Loop,
    RawIp,
    Unsupported(i32),
}

impl LinkKind {
    pub fn from_dlt(dlt: i32) -> Self {
        match dlt {
            0 => Self::Null,
            1 => Self::Ethernet,
            12 | 14 | 101 | 228 | 229 => Self::RawIp,
            108 => Self::Loop,
            other => Self::Unsupported(other),
        }
    }
}

/// TCP payload of a frame, if it carries a non-empty one.
///
/// Anything that fails to decode is treated as "not interesting".
pub fn tcp_payload(link: LinkKind, frame: &[u8]) -> Option<&[u8]> {
    let sliced = match link {
        LinkKind::Ethernet => SlicedPacket::from_ethernet(frame).ok()?,
        LinkKind::Null | LinkKind::Loop => SlicedPacket::from_ip(frame.get(4..)?).ok()?,
        LinkKind::RawIp => SlicedPacket::from_ip(frame).ok()?,
        LinkKind::Unsupported(_) => return None,
    };

    match sliced.transport? {
        TransportSlice::Tcp(tcp) => {
            let payload = tcp.payload();
            (!payload.is_empty()).then_some(payload)
        }
        _ => None,
    }
}
