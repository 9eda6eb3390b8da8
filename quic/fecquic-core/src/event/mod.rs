// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Typed observer for endpoint and connection events.
//!
//! The pipeline publishes every observable transition through the
//! [`Subscriber`] trait; implementations override the events they care
//! about. The set of events is closed: new observations are added as new
//! methods, not late-bound hooks.

pub mod tracing;

use crate::crypto::Epoch;
use std::net::SocketAddr;

/// The kind of packet an event refers to
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PacketKind {
    Initial,
    ZeroRtt,
    Handshake,
    Retry,
    VersionNegotiation,
    OneRtt,
}

#[derive(Clone, Copy, Debug)]
pub struct HeaderParsed {
    pub packet_kind: PacketKind,
    /// Bytes the segment consumed from the datagram
    pub consumed: usize,
}

#[derive(Clone, Copy, Debug)]
pub struct PacketReceived {
    pub packet_kind: PacketKind,
    pub packet_number: u64,
    pub epoch: Epoch,
    pub path: crate::path::Id,
}

#[derive(Clone, Copy, Debug)]
pub struct PacketDropped {
    pub reason: &'static str,
    pub len: usize,
}

#[derive(Clone, Copy, Debug)]
pub struct PeerAddressChanged {
    pub path: crate::path::Id,
    pub peer_address: SocketAddr,
}

#[derive(Clone, Copy, Debug)]
pub struct ConnectionReady {}

#[derive(Clone, Copy, Debug)]
pub struct StatelessReset {}

#[derive(Clone, Copy, Debug)]
pub struct VersionNegotiationSent {
    pub peer_address: SocketAddr,
}

#[derive(Clone, Copy, Debug)]
pub struct RetrySent {
    pub peer_address: SocketAddr,
}

#[derive(Clone, Copy, Debug)]
pub struct StatelessResetSent {
    pub peer_address: SocketAddr,
}

#[derive(Clone, Copy, Debug)]
pub struct TransportParametersProcessed {}

#[derive(Clone, Copy, Debug)]
pub struct FecSymbolRecovered {
    pub packet_number: u64,
    pub data_len: usize,
}

#[derive(Clone, Copy, Debug)]
pub struct FecBlockEvicted {
    pub block_number: u32,
}

pub trait Subscriber: 'static {
    fn on_header_parsed(&mut self, event: &HeaderParsed) {
        let _ = event;
    }

    fn on_packet_received(&mut self, event: &PacketReceived) {
        let _ = event;
    }

    fn on_packet_dropped(&mut self, event: &PacketDropped) {
        let _ = event;
    }

    fn on_peer_address_changed(&mut self, event: &PeerAddressChanged) {
        let _ = event;
    }

    fn on_connection_ready(&mut self, event: &ConnectionReady) {
        let _ = event;
    }

    fn on_stateless_reset(&mut self, event: &StatelessReset) {
        let _ = event;
    }

    fn on_version_negotiation_sent(&mut self, event: &VersionNegotiationSent) {
        let _ = event;
    }

    fn on_retry_sent(&mut self, event: &RetrySent) {
        let _ = event;
    }

    fn on_stateless_reset_sent(&mut self, event: &StatelessResetSent) {
        let _ = event;
    }

    fn on_transport_parameters_processed(&mut self, event: &TransportParametersProcessed) {
        let _ = event;
    }

    fn on_fec_symbol_recovered(&mut self, event: &FecSymbolRecovered) {
        let _ = event;
    }

    fn on_fec_block_evicted(&mut self, event: &FecBlockEvicted) {
        let _ = event;
    }
}

/// Discards every event
#[derive(Debug, Default)]
pub struct NoopSubscriber;

impl Subscriber for NoopSubscriber {}

#[cfg(any(test, feature = "testing"))]
pub mod testing {
    use super::*;

    /// Owned copy of any published event, in publication order
    #[derive(Clone, Copy, Debug)]
    pub enum Event {
        HeaderParsed(HeaderParsed),
        PacketReceived(PacketReceived),
        PacketDropped(PacketDropped),
        PeerAddressChanged(PeerAddressChanged),
        ConnectionReady(ConnectionReady),
        StatelessReset(StatelessReset),
        VersionNegotiationSent(VersionNegotiationSent),
        RetrySent(RetrySent),
        StatelessResetSent(StatelessResetSent),
        TransportParametersProcessed(TransportParametersProcessed),
        FecSymbolRecovered(FecSymbolRecovered),
        FecBlockEvicted(FecBlockEvicted),
    }

    /// Records every event for assertions
    #[derive(Debug, Default)]
    pub struct Subscriber {
        pub events: Vec<Event>,
    }

    impl Subscriber {
        pub fn count<F: Fn(&Event) -> bool>(&self, filter: F) -> usize {
            self.events.iter().filter(|event| filter(event)).count()
        }

        pub fn ready_count(&self) -> usize {
            self.count(|event| matches!(event, Event::ConnectionReady(_)))
        }

        pub fn stateless_reset_count(&self) -> usize {
            self.count(|event| matches!(event, Event::StatelessReset(_)))
        }

        pub fn peer_address_changes(&self) -> Vec<PeerAddressChanged> {
            self.events
                .iter()
                .filter_map(|event| match event {
                    Event::PeerAddressChanged(event) => Some(*event),
                    _ => None,
                })
                .collect()
        }
    }

    impl super::Subscriber for Subscriber {
        fn on_header_parsed(&mut self, event: &HeaderParsed) {
            self.events.push(Event::HeaderParsed(*event));
        }

        fn on_packet_received(&mut self, event: &PacketReceived) {
            self.events.push(Event::PacketReceived(*event));
        }

        fn on_packet_dropped(&mut self, event: &PacketDropped) {
            self.events.push(Event::PacketDropped(*event));
        }

        fn on_peer_address_changed(&mut self, event: &PeerAddressChanged) {
            self.events.push(Event::PeerAddressChanged(*event));
        }

        fn on_connection_ready(&mut self, event: &ConnectionReady) {
            self.events.push(Event::ConnectionReady(*event));
        }

        fn on_stateless_reset(&mut self, event: &StatelessReset) {
            self.events.push(Event::StatelessReset(*event));
        }

        fn on_version_negotiation_sent(&mut self, event: &VersionNegotiationSent) {
            self.events.push(Event::VersionNegotiationSent(*event));
        }

        fn on_retry_sent(&mut self, event: &RetrySent) {
            self.events.push(Event::RetrySent(*event));
        }

        fn on_stateless_reset_sent(&mut self, event: &StatelessResetSent) {
            self.events.push(Event::StatelessResetSent(*event));
        }

        fn on_transport_parameters_processed(&mut self, event: &TransportParametersProcessed) {
            self.events.push(Event::TransportParametersProcessed(*event));
        }

        fn on_fec_symbol_recovered(&mut self, event: &FecSymbolRecovered) {
            self.events.push(Event::FecSymbolRecovered(*event));
        }

        fn on_fec_block_evicted(&mut self, event: &FecBlockEvicted) {
            self.events.push(Event::FecBlockEvicted(*event));
        }
    }
}
