// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Emits every event as a `tracing` span-less log record

use super::*;

/// A [`Subscriber`](super::Subscriber) that logs each event through
/// `tracing`
#[derive(Clone, Debug, Default)]
pub struct Subscriber;

impl super::Subscriber for Subscriber {
    fn on_header_parsed(&mut self, event: &HeaderParsed) {
        ::tracing::trace!(packet_kind = ?event.packet_kind, consumed = event.consumed, "header parsed");
    }

    fn on_packet_received(&mut self, event: &PacketReceived) {
        ::tracing::trace!(
            packet_kind = ?event.packet_kind,
            packet_number = event.packet_number,
            path = event.path,
            "packet received"
        );
    }

    fn on_packet_dropped(&mut self, event: &PacketDropped) {
        ::tracing::debug!(reason = event.reason, len = event.len, "packet dropped");
    }

    fn on_peer_address_changed(&mut self, event: &PeerAddressChanged) {
        ::tracing::info!(path = event.path, peer = %event.peer_address, "peer address changed");
    }

    fn on_connection_ready(&mut self, _event: &ConnectionReady) {
        ::tracing::info!("connection ready");
    }

    fn on_stateless_reset(&mut self, _event: &StatelessReset) {
        ::tracing::info!("stateless reset received");
    }

    fn on_version_negotiation_sent(&mut self, event: &VersionNegotiationSent) {
        ::tracing::debug!(peer = %event.peer_address, "version negotiation sent");
    }

    fn on_retry_sent(&mut self, event: &RetrySent) {
        ::tracing::debug!(peer = %event.peer_address, "retry sent");
    }

    fn on_stateless_reset_sent(&mut self, event: &StatelessResetSent) {
        ::tracing::debug!(peer = %event.peer_address, "stateless reset sent");
    }

    fn on_transport_parameters_processed(&mut self, _event: &TransportParametersProcessed) {
        ::tracing::debug!("transport parameters processed");
    }

    fn on_fec_symbol_recovered(&mut self, event: &FecSymbolRecovered) {
        ::tracing::debug!(
            packet_number = event.packet_number,
            len = event.data_len,
            "fec symbol recovered"
        );
    }

    fn on_fec_block_evicted(&mut self, event: &FecBlockEvicted) {
        ::tracing::debug!(block = event.block_number, "fec block evicted");
    }
}
