//! Subscriber send queues
//!
//! The cache replays into anything implementing [`PacketSink`]. [`SyncQueue`]
//! is the queue a subscriber's sender task drains.

use std::collections::VecDeque;
use std::sync::Mutex;

use tokio::sync::Notify;

use super::packet::RtpPacket;

/// Destination for packets handed to a subscriber
pub trait PacketSink: Send + Sync {
    /// Enqueue one packet
    fn push(&self, packet: RtpPacket);

    /// Enqueue packets in order
    fn push_many(&self, packets: Vec<RtpPacket>);

    /// Number of queued packets
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Thread-safe FIFO of packets with async wakeup for the consumer
#[derive(Debug, Default)]
pub struct SyncQueue {
    items: Mutex<VecDeque<RtpPacket>>,
    notify: Notify,
}

impl SyncQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, VecDeque<RtpPacket>> {
        // No guarded section can panic between deque updates.
        self.items.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Pop the oldest packet, if any
    pub fn try_pop(&self) -> Option<RtpPacket> {
        self.lock().pop_front()
    }

    /// Wait for the next packet
    pub async fn recv(&self) -> RtpPacket {
        loop {
            let notified = self.notify.notified();
            if let Some(packet) = self.try_pop() {
                return packet;
            }
            notified.await;
        }
    }

    /// Take every queued packet
    pub fn drain(&self) -> Vec<RtpPacket> {
        self.lock().drain(..).collect()
    }
}

impl PacketSink for SyncQueue {
    fn push(&self, packet: RtpPacket) {
        self.lock().push_back(packet);
        self.notify.notify_one();
    }

    fn push_many(&self, packets: Vec<RtpPacket>) {
        if packets.is_empty() {
            return;
        }
        self.lock().extend(packets);
        self.notify.notify_one();
    }

    fn len(&self) -> usize {
        self.lock().len()
    }
}
