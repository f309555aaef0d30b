//! RTP transport packets
//!
//! RTP fixed header (RFC 3550):
//! ```text
//!  0                   1                   2                   3
//!  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |V=2|P|X|  CC   |M|     PT      |       sequence number         |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                           timestamp                           |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |           synchronization source (SSRC) identifier            |
//! +=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+
//! |            contributing source (CSRC) identifiers             |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! ```
//!
//! Packets keep the full datagram in a `Bytes` so the cache and every
//! subscriber queue share one allocation.

use bytes::{Buf, Bytes};

use crate::error::{Result, RtpError};

/// Fixed RTP header size
pub const RTP_HEADER_SIZE: usize = 12;

/// Only RTP version 2 is accepted
pub const RTP_VERSION: u8 = 2;

/// Logical channel of an interleaved RTSP session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    /// Video RTP
    Video = 0,
    /// Video RTCP
    VideoControl = 1,
    /// Audio RTP
    Audio = 2,
    /// Audio RTCP
    AudioControl = 3,
}

impl Channel {
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            0 => Some(Channel::Video),
            1 => Some(Channel::VideoControl),
            2 => Some(Channel::Audio),
            3 => Some(Channel::AudioControl),
            _ => None,
        }
    }

    pub fn as_byte(self) -> u8 {
        self as u8
    }

    pub fn is_video(self) -> bool {
        self == Channel::Video
    }
}

/// Parsed RTP fixed header fields
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RtpHeader {
    pub marker: bool,
    pub payload_type: u8,
    pub sequence_number: u16,
    pub timestamp: u32,
    pub ssrc: u32,
}

/// An RTP packet tagged with its logical channel
///
/// Cloning is cheap: the packet bytes are reference counted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RtpPacket {
    channel: Channel,
    data: Bytes,
    payload_offset: usize,
    payload_len: usize,
    header: Option<RtpHeader>,
}

impl RtpPacket {
    /// Parse a full RTP datagram
    ///
    /// Skips the CSRC list and header extension and strips padding, so
    /// `payload()` starts at the first byte of the codec payload.
    pub fn parse(channel: Channel, data: Bytes) -> Result<Self> {
        let len = data.len();
        if len < RTP_HEADER_SIZE {
            return Err(RtpError::TooShort(len).into());
        }

        let mut buf = &data[..RTP_HEADER_SIZE];
        let b0 = buf.get_u8();
        let b1 = buf.get_u8();

        let version = b0 >> 6;
        if version != RTP_VERSION {
            return Err(RtpError::UnsupportedVersion(version).into());
        }
        let has_padding = (b0 >> 5) & 1 == 1;
        let has_extension = (b0 >> 4) & 1 == 1;
        let csrc_count = b0 & 0x0F;

        let header = RtpHeader {
            marker: (b1 >> 7) & 1 == 1,
            payload_type: b1 & 0x7F,
            sequence_number: buf.get_u16(),
            timestamp: buf.get_u32(),
            ssrc: buf.get_u32(),
        };

        let mut offset = RTP_HEADER_SIZE + csrc_count as usize * 4;
        if offset > len {
            return Err(RtpError::TruncatedCsrc {
                count: csrc_count,
                len,
            }
            .into());
        }

        if has_extension {
            if offset + 4 > len {
                return Err(RtpError::TruncatedExtension {
                    needed: offset + 4,
                    len,
                }
                .into());
            }
            let words = u16::from_be_bytes([data[offset + 2], data[offset + 3]]) as usize;
            let needed = offset + 4 + words * 4;
            if needed > len {
                return Err(RtpError::TruncatedExtension { needed, len }.into());
            }
            offset = needed;
        }

        let mut end = len;
        if has_padding {
            let pad = data[len - 1];
            if pad == 0 || offset + pad as usize > len {
                return Err(RtpError::InvalidPadding(pad).into());
            }
            end -= pad as usize;
        }

        Ok(Self {
            channel,
            data,
            payload_offset: offset,
            payload_len: end - offset,
            header: Some(header),
        })
    }

    /// Wrap an already depacketized payload
    ///
    /// The whole buffer is the payload and no header fields are available.
    pub fn from_payload(channel: Channel, payload: Bytes) -> Self {
        let payload_len = payload.len();
        Self {
            channel,
            data: payload,
            payload_offset: 0,
            payload_len,
            header: None,
        }
    }

    pub fn channel(&self) -> Channel {
        self.channel
    }

    pub fn is_video(&self) -> bool {
        self.channel.is_video()
    }

    /// Codec payload (after header, CSRCs and extension, before padding)
    pub fn payload(&self) -> &[u8] {
        &self.data[self.payload_offset..self.payload_offset + self.payload_len]
    }

    /// The full packet as received
    pub fn data(&self) -> &Bytes {
        &self.data
    }

    /// Size in bytes of the full packet
    pub fn size(&self) -> usize {
        self.data.len()
    }

    pub fn header(&self) -> Option<&RtpHeader> {
        self.header.as_ref()
    }

    pub fn sequence_number(&self) -> Option<u16> {
        self.header.map(|h| h.sequence_number)
    }

    pub fn timestamp(&self) -> Option<u32> {
        self.header.map(|h| h.timestamp)
    }

    pub fn ssrc(&self) -> Option<u32> {
        self.header.map(|h| h.ssrc)
    }

    pub fn payload_type(&self) -> Option<u8> {
        self.header.map(|h| h.payload_type)
    }

    pub fn marker(&self) -> bool {
        self.header.map(|h| h.marker).unwrap_or(false)
    }
}
