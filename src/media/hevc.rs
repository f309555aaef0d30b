//! H.265/HEVC NAL unit classification for RTP payloads
//!
//! HEVC NAL unit header (2 bytes):
//! ```text
//! +---------------+---------------+
//! |0|1|2|3|4|5|6|7|0|1|2|3|4|5|6|7|
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |F|   Type    |  LayerId  | TID |
//! +-------------+-----------------+
//! ```
//!
//! RTP payload shapes (RFC 7798):
//! - Single NAL unit: the payload is one NAL unit.
//! - Aggregation packet (type 48): payload header, then repeated
//!   `{ size (2, big-endian) | NAL unit }`.
//! - Fragmentation unit (type 49): payload header, then an FU header
//!   `|S|E|FuType|`, then a fragment of one NAL unit.

use tracing::trace;

/// BLA_W_LP, first keyframe-class slice type
pub const NAL_BLA_W_LP: u8 = 16;
/// CRA_NUT, last keyframe-class slice type
pub const NAL_CRA_NUT: u8 = 21;
/// Video parameter set
pub const NAL_VPS: u8 = 32;
/// Sequence parameter set
pub const NAL_SPS: u8 = 33;
/// Picture parameter set
pub const NAL_PPS: u8 = 34;
/// Aggregation packet
pub const NAL_AP: u8 = 48;
/// Fragmentation unit
pub const NAL_FU: u8 = 49;

/// Payload header size shared by single units, APs and FUs
const PAYLOAD_HEADER_SIZE: usize = 2;
/// Shortest payload that can be classified (payload header + one more byte)
const MIN_PAYLOAD_SIZE: usize = 3;

/// NAL unit type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NalUnitType {
    TrailN = 0,
    TrailR = 1,
    TsaN = 2,
    TsaR = 3,
    StsaN = 4,
    StsaR = 5,
    RadlN = 6,
    RadlR = 7,
    RaslN = 8,
    RaslR = 9,
    BlaWLp = 16,
    BlaWRadl = 17,
    BlaNLp = 18,
    IdrWRadl = 19,
    IdrNLp = 20,
    CraNut = 21,
    Vps = 32,
    Sps = 33,
    Pps = 34,
    /// Access unit delimiter
    Aud = 35,
    /// End of sequence
    Eos = 36,
    /// End of bitstream
    Eob = 37,
    /// Filler data
    Fd = 38,
    PrefixSei = 39,
    SuffixSei = 40,
    /// Aggregation packet (RTP only)
    Ap = 48,
    /// Fragmentation unit (RTP only)
    Fu = 49,
    /// PACI packet (RTP only)
    Paci = 50,
}

impl NalUnitType {
    /// Extract the type from the first NAL header byte
    pub fn from_header_byte(b: u8) -> Option<Self> {
        Self::from_type((b >> 1) & 0x3F)
    }

    pub fn from_type(t: u8) -> Option<Self> {
        let ty = match t {
            0 => NalUnitType::TrailN,
            1 => NalUnitType::TrailR,
            2 => NalUnitType::TsaN,
            3 => NalUnitType::TsaR,
            4 => NalUnitType::StsaN,
            5 => NalUnitType::StsaR,
            6 => NalUnitType::RadlN,
            7 => NalUnitType::RadlR,
            8 => NalUnitType::RaslN,
            9 => NalUnitType::RaslR,
            16 => NalUnitType::BlaWLp,
            17 => NalUnitType::BlaWRadl,
            18 => NalUnitType::BlaNLp,
            19 => NalUnitType::IdrWRadl,
            20 => NalUnitType::IdrNLp,
            21 => NalUnitType::CraNut,
            32 => NalUnitType::Vps,
            33 => NalUnitType::Sps,
            34 => NalUnitType::Pps,
            35 => NalUnitType::Aud,
            36 => NalUnitType::Eos,
            37 => NalUnitType::Eob,
            38 => NalUnitType::Fd,
            39 => NalUnitType::PrefixSei,
            40 => NalUnitType::SuffixSei,
            48 => NalUnitType::Ap,
            49 => NalUnitType::Fu,
            50 => NalUnitType::Paci,
            _ => return None,
        };
        Some(ty)
    }

    /// IRAP picture (BLA, IDR or CRA)
    pub fn is_keyframe(&self) -> bool {
        is_keyframe_type(*self as u8)
    }

    pub fn is_parameter_set(&self) -> bool {
        matches!(self, NalUnitType::Vps | NalUnitType::Sps | NalUnitType::Pps)
    }

    /// Video coding layer unit (types 0-31)
    pub fn is_vcl(&self) -> bool {
        (*self as u8) < 32
    }
}

/// Whether a raw type code is in the keyframe-class range
#[inline]
pub fn is_keyframe_type(t: u8) -> bool {
    (NAL_BLA_W_LP..=NAL_CRA_NUT).contains(&t)
}

/// What a payload carries, as far as the GOP cache is concerned
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PayloadKind {
    pub vps: bool,
    pub sps: bool,
    pub pps: bool,
    pub keyframe: bool,
}

impl PayloadKind {
    /// Classify an RTP payload
    ///
    /// Never fails: short or malformed payloads report whatever was found
    /// before the damage, possibly nothing.
    pub fn classify(payload: &[u8]) -> Self {
        let mut kind = PayloadKind::default();
        if payload.len() < MIN_PAYLOAD_SIZE {
            return kind;
        }

        match (payload[0] >> 1) & 0x3F {
            NAL_AP => kind.scan_aggregation(payload),
            NAL_FU => {
                let fu_header = payload[2];
                // Continuation fragments belong to a unit already seen
                if (fu_header >> 7) & 1 == 1 {
                    kind.mark(fu_header & 0x3F);
                }
            }
            t => kind.mark(t),
        }
        kind
    }

    fn scan_aggregation(&mut self, payload: &[u8]) {
        let mut offset = PAYLOAD_HEADER_SIZE;
        loop {
            if offset + 2 > payload.len() {
                trace!(offset, len = payload.len(), "AP size field truncated");
                return;
            }
            let size = u16::from_be_bytes([payload[offset], payload[offset + 1]]) as usize;
            if size == 0 {
                trace!(offset, "AP unit with zero size");
                return;
            }
            offset += 2;
            if offset >= payload.len() {
                trace!(offset, len = payload.len(), "AP unit header out of bounds");
                return;
            }

            self.mark((payload[offset] >> 1) & 0x3F);
            offset += size;

            if offset >= payload.len() {
                return;
            }
        }
    }

    fn mark(&mut self, nal_type: u8) {
        if is_keyframe_type(nal_type) {
            self.keyframe = true;
            return;
        }
        match nal_type {
            NAL_VPS => self.vps = true,
            NAL_SPS => self.sps = true,
            NAL_PPS => self.pps = true,
            _ => {}
        }
    }

    pub fn is_parameter_set(&self) -> bool {
        self.vps || self.sps || self.pps
    }

    /// Nothing the cache cares about was found
    pub fn is_empty(&self) -> bool {
        *self == PayloadKind::default()
    }
}
