//! GOP (Group of Pictures) packet buffer
//!
//! An ordered, resettable run of RTP packets starting at a keyframe. The
//! buffer itself has no opinion about what a keyframe is; the cache decides
//! when to reset and what to push.
//!
//! No size limit is enforced. Whether to buffer a GOP at all is set on the
//! cache.

use crate::rtp::RtpPacket;

/// Resettable append-only packet buffer
#[derive(Debug, Default)]
pub struct GopBuffer {
    /// Packets in arrival order
    packets: Vec<RtpPacket>,
    /// Sum of `size()` over `packets`
    size: usize,
}

impl GopBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop all packets, keeping the allocation for the next GOP
    pub fn reset(&mut self) {
        self.packets.clear();
        self.size = 0;
    }

    /// Append a packet
    pub fn push(&mut self, packet: RtpPacket) {
        self.size += packet.size();
        self.packets.push(packet);
    }

    pub fn len(&self) -> usize {
        self.packets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packets.is_empty()
    }

    /// Total bytes buffered
    pub fn size(&self) -> usize {
        self.size
    }

    /// The packet that opened this GOP
    pub fn first(&self) -> Option<&RtpPacket> {
        self.packets.first()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, RtpPacket> {
        self.packets.iter()
    }

    /// Copy out every packet in order
    ///
    /// Packets share their bytes with the buffer, so this only bumps
    /// reference counts.
    pub fn elems(&self) -> Vec<RtpPacket> {
        self.packets.clone()
    }
}
