//! Media handling for RTP video
//!
//! This module provides:
//! - H.265/HEVC NAL unit classification for RTP payloads
//! - GOP packet buffering for late-joiner support

pub mod gop;
pub mod hevc;

pub use gop::GopBuffer;
pub use hevc::{NalUnitType, PayloadKind};
