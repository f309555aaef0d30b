//! RTP transport types
//!
//! This module provides:
//! - RTP packet parsing with channel tagging
//! - Subscriber send queues

pub mod packet;
pub mod queue;

pub use packet::{Channel, RtpHeader, RtpPacket};
pub use queue::{PacketSink, SyncQueue};
