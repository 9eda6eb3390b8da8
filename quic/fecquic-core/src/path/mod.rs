// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Per-destination path state: challenge validation, receive-rate
//! estimation and per-space packet-number tracking.

use crate::{
    connection::ConnectionId,
    packet::number::{PacketNumber, PacketNumberSpace, SlidingWindow},
    time::Timestamp,
};
use core::time::Duration;
use std::net::SocketAddr;

/// Index of a path within its connection
pub type Id = usize;

/// Minimum interval the receive-rate estimator samples over when the
/// smoothed RTT is smaller
pub const BANDWIDTH_TIME_INTERVAL_MIN: Duration = Duration::from_millis(100);

/// Datagrams carrying a client Initial must be at least this large
pub const ENFORCED_INITIAL_MTU: usize = 1200;

/// Retransmit timer before any RTT samples exist
pub const INITIAL_RETRANSMIT_TIMER: Duration = Duration::from_millis(250);

/// Packet-number tracking for one space on one path.
///
/// The sliding window provides the at-most-once guarantee; its right edge is
/// the end of the SACK range.
#[derive(Debug, Default)]
pub struct PacketContext {
    pub(crate) window: SlidingWindow,
    /// An acknowledgement should be scheduled for this space
    pub ack_needed: bool,
}

impl PacketContext {
    /// The highest packet number accepted so far
    #[inline]
    pub fn largest(&self) -> Option<PacketNumber> {
        self.window.right_edge()
    }
}

/// One network path of a connection
#[derive(Debug)]
pub struct Path {
    pub peer_address: SocketAddr,
    pub local_address: SocketAddr,
    pub if_index: u32,
    pub local_connection_id: ConnectionId,
    pub remote_connection_id: Option<ConnectionId>,

    contexts: [PacketContext; PacketNumberSpace::COUNT],

    /// Outstanding path challenge; at most one while unverified
    pub challenge: Option<u64>,
    pub challenge_verified: bool,
    pub challenge_time: Option<Timestamp>,
    pub challenge_repeat_count: u8,

    received: u64,
    received_prior: u64,
    receive_rate_epoch: Timestamp,
    receive_rate_estimate: u64,
    receive_rate_max: u64,

    pub smoothed_rtt: Duration,
    pub retransmit_timer: Duration,
}

impl Path {
    pub fn new(
        peer_address: SocketAddr,
        local_address: SocketAddr,
        if_index: u32,
        local_connection_id: ConnectionId,
    ) -> Self {
        Self {
            peer_address,
            local_address,
            if_index,
            local_connection_id,
            remote_connection_id: None,
            contexts: Default::default(),
            challenge: None,
            challenge_verified: false,
            challenge_time: None,
            challenge_repeat_count: 0,
            received: 0,
            received_prior: 0,
            receive_rate_epoch: Timestamp::ZERO,
            receive_rate_estimate: 0,
            receive_rate_max: 0,
            smoothed_rtt: Duration::ZERO,
            retransmit_timer: INITIAL_RETRANSMIT_TIMER,
        }
    }

    #[inline]
    pub fn context(&self, space: PacketNumberSpace) -> &PacketContext {
        &self.contexts[space.as_index()]
    }

    #[inline]
    pub fn context_mut(&mut self, space: PacketNumberSpace) -> &mut PacketContext {
        &mut self.contexts[space.as_index()]
    }

    /// Adopts a new peer address and re-arms path validation with a fresh
    /// challenge. The previous challenge, if any, is abandoned so exactly
    /// one is outstanding while the path is unverified.
    pub(crate) fn on_peer_address_changed(
        &mut self,
        peer_address: SocketAddr,
        challenge: u64,
        now: Timestamp,
    ) {
        self.peer_address = peer_address;
        self.challenge = Some(challenge);
        self.challenge_verified = false;
        self.challenge_time = Some(now + self.retransmit_timer);
        self.challenge_repeat_count = 0;
    }

    /// Accumulates `len` received bytes and refreshes the receive-rate
    /// estimate once the sampling interval has elapsed
    pub(crate) fn update_receive_rate(&mut self, len: usize, now: Timestamp) {
        self.received += len as u64;

        if self.receive_rate_epoch.is_zero() {
            self.received_prior = self.received;
            self.receive_rate_epoch = now;
            return;
        }

        let interval = self.smoothed_rtt.max(BANDWIDTH_TIME_INTERVAL_MIN);
        let elapsed = now.saturating_duration_since(self.receive_rate_epoch);
        if elapsed > interval {
            let delta = elapsed.as_micros() as u64;
            let estimate = (self.received - self.received_prior) * 1_000_000 / delta;
            self.receive_rate_estimate = estimate;
            if estimate > self.receive_rate_max {
                self.receive_rate_max = estimate;
            }
            self.received_prior = self.received;
            self.receive_rate_epoch = now;
        }
    }

    #[inline]
    pub fn received_bytes(&self) -> u64 {
        self.received
    }

    #[inline]
    pub fn receive_rate_estimate(&self) -> u64 {
        self.receive_rate_estimate
    }

    #[inline]
    pub fn receive_rate_max(&self) -> u64 {
        self.receive_rate_max
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_path() -> Path {
        Path::new(
            "198.51.100.7:4433".parse().unwrap(),
            "192.0.2.2:4433".parse().unwrap(),
            0,
            ConnectionId::try_from_bytes(&[1, 2, 3, 4]).unwrap(),
        )
    }

    #[test]
    fn challenge_rearm_test() {
        let mut path = test_path();
        let now = Timestamp::from_micros(1_000_000);

        path.on_peer_address_changed("203.0.113.9:5555".parse().unwrap(), 0x1234, now);

        assert_eq!(path.peer_address, "203.0.113.9:5555".parse().unwrap());
        assert_eq!(path.challenge, Some(0x1234));
        assert!(!path.challenge_verified);
        assert_eq!(path.challenge_time, Some(now + path.retransmit_timer));
        assert_eq!(path.challenge_repeat_count, 0);
    }

    #[test]
    fn receive_rate_test() {
        let mut path = test_path();

        // anchor
        path.update_receive_rate(1200, Timestamp::from_micros(1_000_000));
        assert_eq!(path.receive_rate_estimate(), 0);

        // within the interval: accumulate only
        path.update_receive_rate(1200, Timestamp::from_micros(1_050_000));
        assert_eq!(path.receive_rate_estimate(), 0);

        // past the interval: 2400 bytes over 200ms = 12000 bytes/sec
        path.update_receive_rate(1200, Timestamp::from_micros(1_200_000));
        assert_eq!(path.receive_rate_estimate(), 12_000);
        assert_eq!(path.receive_rate_max(), 12_000);
    }
}
