// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Per-packet-type handlers, dispatched once a segment has been decrypted
//! and resolved to a connection.

use crate::{
    connection::{Connection, ConnectionId, ProcessingError, State},
    crypto::Epoch,
    endpoint::{Config, Context, SegmentContext, StatelessPacket},
    event::{self, Subscriber as _},
    fec,
    frame::Processor as _,
    packet::{
        handshake::CleartextHandshake,
        initial::CleartextInitial,
        number::{PacketNumber, PacketNumberSpace},
        retry::{ProtectedRetry, Retry},
        short::CleartextShort,
        version_negotiation::ProtectedVersionNegotiation,
        zero_rtt::CleartextZeroRtt,
    },
    path,
    random::{self, Generator as _},
    token::Format as _,
    crypto::tls::Session as _,
};
use fecquic_codec::EncoderValue;
use std::collections::VecDeque;

/// A Version Negotiation is only read by a client that just sent its first
/// flight; it restarts the handshake under one of the offered versions
pub(super) fn on_version_negotiation<Cx: Context>(
    config: &Config,
    connection: &mut Connection,
    cx: &mut Cx,
    packet: &ProtectedVersionNegotiation<'_>,
) -> Result<(), ProcessingError> {
    if !connection.is_client() || connection.state() != State::ClientInitSent {
        return Err(ProcessingError::UnexpectedPacket);
    }

    if !connection.matches_local_id(packet.destination_connection_id()) {
        return Err(ProcessingError::CnxidCheck);
    }

    let chosen = packet
        .iter()
        .find(|offered| config.version_index(*offered).is_some())
        .ok_or(ProcessingError::UnexpectedPacket)?;

    // restart the Initial flight under the negotiated version
    connection.set_version(chosen);
    let initial_crypto = cx.initial_crypto(chosen, connection.initial_id().as_bytes());
    connection.set_crypto(Epoch::Initial, initial_crypto);

    Ok(())
}

pub(super) fn on_initial<Cx: Context>(
    config: &Config,
    connection: &mut Connection,
    pending_stateless: &mut VecDeque<StatelessPacket>,
    cx: &mut Cx,
    packet: &CleartextInitial<'_>,
    segment: &SegmentContext,
) -> Result<(), ProcessingError> {
    if !connection.matches_local_id(packet.destination_connection_id()) {
        return Err(ProcessingError::CnxidCheck);
    }

    // the first response establishes the peer's connection ID; afterwards
    // it must not change
    connection.establish_remote_id(packet.source_connection_id())?;

    if !connection.is_client()
        && config.enforce_retry_tokens
        && !cx
            .token()
            .validate_retry_token(&segment.remote_address, packet.token())
    {
        queue_retry(connection, pending_stateless, cx, packet, segment)?;
        return Err(ProcessingError::Retry);
    }

    let payload = packet.payload.as_less_safe_slice();
    cx.frames()
        .decode(connection, payload, Epoch::Initial, segment.now, 0)?;
    cx.tls().stream_process(connection)?;

    match connection.state() {
        State::ServerInit => connection.set_state(State::ServerHandshake),
        State::ClientInitSent | State::ClientInitResent => {
            connection.set_state(State::ClientHandshakeStart)
        }
        _ => {}
    }

    Ok(())
}

/// Builds and queues the Retry carrying the token the client must echo
fn queue_retry<Cx: Context>(
    connection: &Connection,
    pending_stateless: &mut VecDeque<StatelessPacket>,
    cx: &mut Cx,
    packet: &CleartextInitial<'_>,
    segment: &SegmentContext,
) -> Result<(), ProcessingError> {
    let mut token = [0u8; crate::token::TOKEN_LEN];
    let token_len = cx
        .token()
        .generate_retry_token(&segment.remote_address, &mut token)
        .ok_or(ProcessingError::FrameBufferTooSmall)?;

    let mut unused = [0u8; 1];
    cx.random().public_random_fill(&mut unused);

    let retry = Retry {
        tag: unused[0] & 0x0f,
        version: connection.version(),
        destination_connection_id: packet.source_connection_id(),
        source_connection_id: connection.local_id().as_bytes(),
        odcil_unused: unused[0] >> 4,
        original_destination_connection_id: packet.destination_connection_id(),
        retry_token: &token[..token_len],
    };

    pending_stateless.push_back(StatelessPacket {
        remote_address: segment.remote_address,
        payload: retry.encode_to_vec(),
    });
    cx.events().on_retry_sent(&event::RetrySent {
        peer_address: segment.remote_address,
    });
    Ok(())
}

/// A client observing a valid Retry adopts its token and restarts the
/// Initial keyed on the server's connection ID; the packet is never
/// acknowledged
pub(super) fn on_retry<Cx: Context>(
    connection: &mut Connection,
    cx: &mut Cx,
    packet: &ProtectedRetry<'_>,
) -> Result<(), ProcessingError> {
    if !connection.is_client()
        || !matches!(
            connection.state(),
            State::ClientInitSent | State::ClientInitResent
        )
    {
        return Err(ProcessingError::UnexpectedPacket);
    }

    if packet.version != connection.version() {
        return Err(ProcessingError::UnexpectedPacket);
    }

    if *connection.initial_id() != *packet.original_destination_connection_id {
        return Err(ProcessingError::UnexpectedPacket);
    }

    let new_initial_id = ConnectionId::try_from_bytes(packet.source_connection_id())
        .ok_or(ProcessingError::CnxidCheck)?;

    connection.set_retry_token(packet.retry_token());
    connection.set_initial_id(new_initial_id);
    let initial_crypto = cx.initial_crypto(connection.version(), new_initial_id.as_bytes());
    connection.set_crypto(Epoch::Initial, initial_crypto);
    connection.set_state(State::ClientInitResent);

    Err(ProcessingError::Retry)
}

pub(super) fn on_handshake<Cx: Context>(
    connection: &mut Connection,
    cx: &mut Cx,
    packet: &CleartextHandshake<'_>,
    segment: &SegmentContext,
) -> Result<(), ProcessingError> {
    let payload = packet.payload.as_less_safe_slice();

    if connection.is_client() {
        // server cleartext: the first Handshake ends the Initial phase
        if matches!(
            connection.state(),
            State::ClientInitSent | State::ClientInitResent
        ) {
            connection.set_state(State::ClientHandshakeStart);
        }

        connection.establish_remote_id(packet.source_connection_id())?;

        cx.frames()
            .decode(connection, payload, Epoch::Handshake, segment.now, 0)?;
        cx.tls().stream_process(connection)?;

        // handshake keys imply the server consumed the Initial flight
        if connection.crypto(Epoch::Handshake).is_some() {
            connection.implicit_ack(PacketNumberSpace::Initial);
        }
    } else {
        // client cleartext
        connection.establish_remote_id(packet.source_connection_id())?;

        cx.frames()
            .decode(connection, payload, Epoch::Handshake, segment.now, 0)?;
        cx.tls().stream_process(connection)?;

        if cx.tls().is_handshake_complete(connection) && !connection.handshake_done() {
            connection.set_handshake_done();
            connection.implicit_ack(PacketNumberSpace::Initial);
            connection.implicit_ack(PacketNumberSpace::Handshake);
            connection.set_state(State::ServerReady);
            cx.events().on_connection_ready(&event::ConnectionReady {});
        }
    }

    Ok(())
}

pub(super) fn on_zero_rtt<Cx: Context>(
    connection: &mut Connection,
    cx: &mut Cx,
    packet: &CleartextZeroRtt<'_>,
    segment: &SegmentContext,
) -> Result<(), ProcessingError> {
    if !matches!(
        connection.state(),
        State::ServerAlmostReady | State::ServerReady
    ) {
        return Err(ProcessingError::UnexpectedPacket);
    }

    if !connection.matches_local_id(packet.destination_connection_id()) {
        return Err(ProcessingError::CnxidCheck);
    }

    connection.verify_remote_id(packet.source_connection_id())?;

    if packet.version != connection.version() {
        return Err(ProcessingError::ProtocolViolation("0-rtt version mismatch"));
    }

    let payload = packet.payload.as_less_safe_slice();
    cx.frames()
        .decode(connection, payload, Epoch::ZeroRtt, segment.now, 0)?;
    cx.tls().stream_process(connection)?;

    Ok(())
}

/// 1-RTT ingress: spin observation, closing handling, path migration,
/// receive-rate accounting, then frames, FEC bookkeeping and TLS
pub(super) fn incoming_encrypted<Cx: Context>(
    connection: &mut Connection,
    cx: &mut Cx,
    packet: &CleartextShort<'_>,
    path_id: path::Id,
    packet_number: PacketNumber,
    pn_advanced: bool,
    segment: &SegmentContext,
) -> Result<(), ProcessingError> {
    if !connection.state().may_receive_encrypted() {
        return Err(ProcessingError::UnexpectedPacket);
    }

    // the spin bit is only observed on packets that advance the highest
    // packet number
    if pn_advanced {
        connection.update_spin(packet.spin_bit.as_bool(), segment.now);
    }

    let payload = packet.payload.as_less_safe_slice();

    if connection.state().is_closing() {
        if connection.state() == State::Closing {
            let closing_received = cx.frames().decode_closing(connection, payload)?;
            if closing_received {
                let next = if connection.is_client() {
                    State::Disconnected
                } else {
                    State::Draining
                };
                connection.set_state(next);
            }
        } else if let Some(path) = connection.path_mut(path_id) {
            path.context_mut(PacketNumberSpace::ApplicationData).ack_needed = true;
        }
        return Ok(());
    }

    let path = connection
        .path_mut(path_id)
        .ok_or(ProcessingError::UnexpectedPacket)?;

    if path.peer_address != segment.remote_address && !segment.remote_address.ip().is_unspecified()
    {
        let mut challenge = random::public_random_u64(cx.random());
        if challenge == 0 {
            challenge = 1;
        }
        path.on_peer_address_changed(segment.remote_address, challenge, segment.now);
        cx.events()
            .on_peer_address_changed(&event::PeerAddressChanged {
                path: path_id,
                peer_address: segment.remote_address,
            });
    }

    path.update_receive_rate(segment.segment_len, segment.now);

    cx.frames()
        .decode(connection, payload, Epoch::OneRtt, segment.now, path_id)?;
    fec_post_decode(connection, cx, packet_number.as_u64(), payload, segment, path_id)?;
    cx.tls().stream_process(connection)?;

    Ok(())
}

/// Completes the FEC bookkeeping for a decoded 1-RTT payload: store the
/// packet as a source symbol when it announced an FPID, then re-inject any
/// payloads recovery produced before the dispatcher returns
fn fec_post_decode<Cx: Context>(
    connection: &mut Connection,
    cx: &mut Cx,
    packet_number: u64,
    payload: &[u8],
    segment: &SegmentContext,
    path_id: path::Id,
) -> Result<(), ProcessingError> {
    {
        let Some(state) = connection.fec_mut() else {
            return Ok(());
        };
        if let Some(source_id) = state.take_pending_source_id() {
            let symbol = fec::SourceSymbol::from_packet(source_id, packet_number, payload);
            state.receiver.receive_source_symbol(symbol);
        }
    }

    loop {
        let (evicted, recovered) = {
            let Some(state) = connection.fec_mut() else {
                return Ok(());
            };
            let mut evicted = Vec::new();
            while let Some(block) = state.receiver.take_evicted_block() {
                evicted.push(block);
            }
            (evicted, state.receiver.take_recovered())
        };

        for block_number in evicted {
            cx.events()
                .on_fec_block_evicted(&event::FecBlockEvicted { block_number });
        }

        let Some(recovered) = recovered else {
            break;
        };

        cx.events()
            .on_fec_symbol_recovered(&event::FecSymbolRecovered {
                packet_number: recovered.packet_number,
                data_len: recovered.payload.len(),
            });

        cx.frames().decode(
            connection,
            &recovered.payload,
            Epoch::OneRtt,
            segment.now,
            path_id,
        )?;

        // a recovered payload announcing its own FPID is already a symbol
        // the receiver holds; don't wrap it again
        if let Some(state) = connection.fec_mut() {
            state.take_pending_source_id();
        }
    }

    Ok(())
}
