// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use crate::{
    connection::{Connection, ConnectionId, ProcessingError, State},
    crypto::{testing as crypto_testing, Epoch},
    endpoint::{
        testing::{TestContext, TEST_TOKEN_KEY},
        Config, Endpoint, Outcome, Type,
    },
    event::testing::Event,
    fec,
    packet::{
        long::VERSION_DRAFT_29, number::PacketNumberSpace, short::SpinBit,
        stateless_reset::RESET_PACKET_MIN_SIZE, testing::*, KeyPhase,
    },
    stateless_reset::Token,
    time::Timestamp,
    token::{Format as _, KeyedFormat},
};
use fecquic_codec::EncoderValue;
use std::net::SocketAddr;

const DCID: &[u8] = &[1, 2, 3, 4, 5, 6, 7, 8];
const SCID: &[u8] = &[0xaa, 0xbb];
const ONE_RTT_SEED: u64 = 0x1717;

fn client_addr() -> SocketAddr {
    "192.0.2.5:4433".parse().unwrap()
}

fn server_addr() -> SocketAddr {
    "198.51.100.1:443".parse().unwrap()
}

fn now() -> Timestamp {
    Timestamp::from_micros(1_000_000)
}

fn process(
    endpoint: &mut Endpoint,
    cx: &mut TestContext,
    mut datagram: Vec<u8>,
    from: SocketAddr,
) -> Outcome {
    endpoint.incoming_packet(cx, &mut datagram, from, server_addr(), 0, now())
}

fn server_endpoint() -> Endpoint {
    Endpoint::new(
        Config::builder(Type::Server)
            .with_reset_secret([7; 16])
            .build(),
    )
}

/// Installs a server connection that already completed its handshake
fn ready_server(
    endpoint: &mut Endpoint,
    local_id: &[u8],
    fec: Option<fec::State>,
) -> crate::connection::Handle {
    let id = ConnectionId::try_from_bytes(local_id).unwrap();
    let mut connection = Connection::new_server(
        id,
        id,
        ConnectionId::try_from_bytes(SCID).unwrap(),
        client_addr(),
        server_addr(),
        0,
        VERSION_DRAFT_29,
        crypto_testing::initial_context(VERSION_DRAFT_29, local_id),
        fec,
    );
    connection.set_state(State::ServerReady);
    connection.set_crypto(Epoch::OneRtt, crypto_testing::new_context(ONE_RTT_SEED));
    endpoint.add_connection(connection)
}

fn padding(len: usize) -> Vec<u8> {
    vec![0u8; len]
}

#[test]
fn version_negotiation_scenario_test() {
    let mut endpoint = server_endpoint();
    let mut cx = TestContext::new();

    let dcid = [0x00, 0x01, 0x02, 0x03];
    let scid = [0x10, 0x11];
    let context = crypto_testing::initial_context(0xCAFE_BABE, &dcid);
    let packet = build_initial(
        &context,
        0xCAFE_BABE,
        &dcid,
        &scid,
        &[],
        0,
        &padding(1300),
    );

    let outcome = process(&mut endpoint, &mut cx, packet, client_addr());
    assert!(outcome.result.is_ok());
    assert!(!outcome.new_connection);
    assert!(endpoint.connections().is_empty());

    let response = endpoint.poll_stateless_packet().unwrap();
    assert_eq!(response.remote_address, client_addr());

    let bytes = &response.payload;
    // random first byte with bit 7 forced, zero version
    assert_eq!(bytes[0] & 0x80, 0x80);
    assert_eq!(&bytes[1..5], &[0, 0, 0, 0]);
    // connection IDs are swapped relative to the incoming packet
    assert_eq!(bytes[5] as usize, scid.len());
    assert_eq!(&bytes[6..8], &scid);
    assert_eq!(bytes[8] as usize, dcid.len());
    assert_eq!(&bytes[9..13], &dcid);
    // payload lists every supported version as 4 big-endian bytes
    let versions = &endpoint.config().supported_versions;
    assert_eq!(bytes.len(), 13 + 4 * versions.len());
    for (index, version) in versions.iter().enumerate() {
        let offset = 13 + 4 * index;
        assert_eq!(&bytes[offset..offset + 4], &version.to_be_bytes());
    }
}

#[test]
fn retry_token_enforcement_test() {
    let mut endpoint = Endpoint::new(
        Config::builder(Type::Server)
            .with_retry_tokens(true)
            .build(),
    );
    let mut cx = TestContext::new();
    let context = crypto_testing::initial_context(VERSION_DRAFT_29, DCID);

    // an Initial without a token is answered with a Retry
    let packet = build_initial(
        &context,
        VERSION_DRAFT_29,
        DCID,
        SCID,
        &[],
        0,
        &padding(1300),
    );
    let outcome = process(&mut endpoint, &mut cx, packet, client_addr());
    assert_eq!(outcome.result, Err(ProcessingError::Retry));

    let handle = endpoint.connections().by_id(DCID).unwrap();
    assert_eq!(
        endpoint.connections().get(handle).unwrap().state(),
        State::ServerInit
    );

    let response = endpoint.poll_stateless_packet().unwrap();
    assert_eq!(response.payload[0] >> 4, 0b1111);

    let mut expected = [0u8; 16];
    KeyedFormat::new(TEST_TOKEN_KEY)
        .generate_retry_token(&client_addr(), &mut expected)
        .unwrap();
    let token = &response.payload[response.payload.len() - 16..];
    assert_eq!(token, &expected);

    // resending the Initial with that exact token advances the handshake
    let packet = build_initial(
        &context,
        VERSION_DRAFT_29,
        DCID,
        SCID,
        &expected,
        1,
        &padding(1300),
    );
    let outcome = process(&mut endpoint, &mut cx, packet, client_addr());
    assert!(outcome.result.is_ok());
    assert_eq!(
        endpoint.connections().get(handle).unwrap().state(),
        State::ServerHandshake
    );
}

#[test]
fn duplicate_packet_test() {
    let mut endpoint = server_endpoint();
    let mut cx = TestContext::new();
    let handle = ready_server(&mut endpoint, DCID, None);

    let context = crypto_testing::new_context(ONE_RTT_SEED);
    let packet = build_short(
        &context,
        DCID,
        SpinBit::Zero,
        KeyPhase::Zero,
        42,
        0,
        b"stream frame payload with enough bytes for the sample.............",
    );

    let outcome = process(&mut endpoint, &mut cx, packet.clone(), client_addr());
    assert!(outcome.result.is_ok());
    assert_eq!(cx.frames.decoded.len(), 1);

    // clear the flag so the replay observably re-arms it
    let connection = endpoint.connections_mut().get_mut(handle).unwrap();
    connection
        .path_mut(0)
        .unwrap()
        .context_mut(PacketNumberSpace::ApplicationData)
        .ack_needed = false;

    let outcome = process(&mut endpoint, &mut cx, packet, client_addr());
    assert_eq!(outcome.result, Err(ProcessingError::Duplicate));

    let connection = endpoint.connections().get(handle).unwrap();
    let context_state = connection
        .path(0)
        .unwrap()
        .context(PacketNumberSpace::ApplicationData);
    assert!(context_state.ack_needed);
    assert_eq!(context_state.largest().unwrap().as_u64(), 42);

    // the frame decoder never saw the replay
    assert_eq!(cx.frames.decoded.len(), 1);
}

#[test]
fn stateless_reset_detection_test() {
    let mut endpoint = server_endpoint();
    let mut cx = TestContext::new();
    let handle = ready_server(&mut endpoint, DCID, None);

    let token = Token::new([0xaa; 16]);
    endpoint
        .connections_mut()
        .get_mut(handle)
        .unwrap()
        .set_reset_token(token);

    // a 1-RTT-looking packet that fails decryption but ends in the token
    let mut packet = vec![0x5e; 64];
    packet[0] = 0x41;
    packet[1..9].copy_from_slice(DCID);
    packet[64 - 16..].copy_from_slice(token.as_ref());

    let outcome = process(&mut endpoint, &mut cx, packet, client_addr());
    assert_eq!(outcome.result, Err(ProcessingError::StatelessReset));

    let connection = endpoint.connections().get(handle).unwrap();
    assert_eq!(connection.state(), State::Disconnected);
    assert_eq!(cx.events.stateless_reset_count(), 1);
}

#[test]
fn peer_address_migration_test() {
    let mut endpoint = server_endpoint();
    let mut cx = TestContext::new();
    let handle = ready_server(&mut endpoint, DCID, None);
    let context = crypto_testing::new_context(ONE_RTT_SEED);

    let packet = build_short(
        &context,
        DCID,
        SpinBit::Zero,
        KeyPhase::Zero,
        1,
        0,
        b"payload from the original path....................................",
    );
    assert!(process(&mut endpoint, &mut cx, packet, client_addr())
        .result
        .is_ok());
    assert!(cx.events.peer_address_changes().is_empty());

    let migrated: SocketAddr = "203.0.113.9:5555".parse().unwrap();
    let packet = build_short(
        &context,
        DCID,
        SpinBit::Zero,
        KeyPhase::Zero,
        2,
        0,
        b"payload from the migrated path....................................",
    );
    assert!(process(&mut endpoint, &mut cx, packet, migrated)
        .result
        .is_ok());

    let connection = endpoint.connections().get(handle).unwrap();
    let path = connection.path(0).unwrap();
    assert_eq!(path.peer_address, migrated);
    assert!(!path.challenge_verified);
    assert!(path.challenge.unwrap() != 0);
    assert_eq!(path.challenge_time, Some(now() + path.retransmit_timer));
    assert_eq!(path.challenge_repeat_count, 0);

    let changes = cx.events.peer_address_changes();
    assert_eq!(changes.len(), 1);
    assert_eq!(changes[0].peer_address, migrated);
}

#[test]
fn fec_recovery_test() {
    let fec_config = fec::Config {
        scheme: fec::SchemeKind::Block,
        code: fec::code::Kind::ReedSolomon,
        source_count: 5,
        repair_count: 2,
    };

    let mut endpoint = server_endpoint();
    let mut cx = TestContext::new();
    let handle = ready_server(&mut endpoint, DCID, Some(fec::State::new(&fec_config)));

    let context = crypto_testing::new_context(ONE_RTT_SEED);
    let mut fec_sender = fec::Sender::new(&fec_config);

    // five protected packets, each announcing its source FPID
    let mut packets = Vec::new();
    let mut payloads = Vec::new();
    for packet_number in 1..=5u64 {
        let frame = fec_sender.begin_packet().unwrap();
        fec_sender.mark_source_frame_written();

        let mut payload = frame.encode_to_vec();
        payload.extend_from_slice(&[packet_number as u8; 100]);
        fec_sender.finalize_and_protect_packet(packet_number, &payload);

        packets.push(build_short(
            &context,
            DCID,
            SpinBit::Zero,
            KeyPhase::Zero,
            packet_number,
            0,
            &payload,
        ));
        payloads.push(payload);
    }

    // deliver S0, S2 and S4; S1 and S3 are lost
    for index in [0, 2, 4] {
        let outcome = process(&mut endpoint, &mut cx, packets[index].clone(), client_addr());
        assert!(outcome.result.is_ok());
    }
    assert_eq!(cx.frames.decoded.len(), 3);

    // both repair symbols arrive in their own packets
    for packet_number in [6u64, 7] {
        let (symbol, nss, nrs) = fec_sender.next_repair().unwrap();
        let payload = fec::frame::RepairFrame::for_symbol(&symbol, nss, nrs).encode_to_vec();
        let packet = build_short(
            &context,
            DCID,
            SpinBit::Zero,
            KeyPhase::Zero,
            packet_number,
            0,
            &payload,
        );
        let outcome = process(&mut endpoint, &mut cx, packet, client_addr());
        assert!(outcome.result.is_ok());
    }

    // the two missing payloads were re-injected through the frame decoder,
    // bit-exact, in the same dispatch step as the second repair
    let decoded = &cx.frames.decoded;
    assert_eq!(decoded.len(), 7);
    assert_eq!(decoded[5].payload, payloads[1]);
    assert_eq!(decoded[6].payload, payloads[3]);

    let recovered_events = cx
        .events
        .count(|event| matches!(event, Event::FecSymbolRecovered(_)));
    assert_eq!(recovered_events, 2);

    let connection = endpoint.connections().get(handle).unwrap();
    assert_eq!(connection.fec().unwrap().receiver.recovered_count(), 2);
}

#[test]
fn initial_too_short_test() {
    let mut endpoint = server_endpoint();
    let mut cx = TestContext::new();
    let context = crypto_testing::initial_context(VERSION_DRAFT_29, DCID);

    let packet = build_initial(
        &context,
        VERSION_DRAFT_29,
        DCID,
        SCID,
        &[],
        0,
        &padding(100),
    );
    let outcome = process(&mut endpoint, &mut cx, packet, client_addr());

    assert_eq!(outcome.result, Err(ProcessingError::InitialTooShort));
    assert!(endpoint.connections().is_empty());
}

#[test]
fn initial_creates_connection_test() {
    let mut endpoint = server_endpoint();
    let mut cx = TestContext::new();
    cx.frames.receive_transport_parameters = true;
    let context = crypto_testing::initial_context(VERSION_DRAFT_29, DCID);

    let packet = build_initial(
        &context,
        VERSION_DRAFT_29,
        DCID,
        SCID,
        &[],
        0,
        &padding(1300),
    );
    let outcome = process(&mut endpoint, &mut cx, packet, client_addr());

    assert!(outcome.result.is_ok());
    assert!(outcome.new_connection);
    assert_eq!(cx.tls.process_calls, 1);

    let handle = endpoint.connections().by_id(DCID).unwrap();
    let connection = endpoint.connections().get(handle).unwrap();
    assert_eq!(connection.state(), State::ServerHandshake);
    assert_eq!(connection.remote_id().unwrap().as_bytes(), SCID);
    // the server minted a local ID distinct from the client's choice
    assert_ne!(connection.local_id().as_bytes(), DCID);

    // the transport-parameter hook runs exactly once
    fn hook_runs(cx: &TestContext) -> usize {
        cx.events
            .count(|event| matches!(event, Event::TransportParametersProcessed(_)))
    }
    assert_eq!(hook_runs(&cx), 1);

    let packet = build_initial(
        &context,
        VERSION_DRAFT_29,
        DCID,
        SCID,
        &[],
        1,
        &padding(1300),
    );
    assert!(process(&mut endpoint, &mut cx, packet, client_addr())
        .result
        .is_ok());
    assert_eq!(hook_runs(&cx), 1);
}

#[test]
fn handshake_completes_connection_test() {
    let mut endpoint = server_endpoint();
    let mut cx = TestContext::new();
    let context = crypto_testing::initial_context(VERSION_DRAFT_29, DCID);

    let packet = build_initial(
        &context,
        VERSION_DRAFT_29,
        DCID,
        SCID,
        &[],
        0,
        &padding(1300),
    );
    assert!(process(&mut endpoint, &mut cx, packet, client_addr())
        .result
        .is_ok());

    let handle = endpoint.connections().by_id(DCID).unwrap();
    let handshake_context = crypto_testing::new_context(0x4242);
    endpoint
        .connections_mut()
        .get_mut(handle)
        .unwrap()
        .set_crypto(Epoch::Handshake, handshake_context);
    cx.tls.handshake_complete = true;

    let handshake_context = crypto_testing::new_context(0x4242);
    let packet = build_handshake(
        &handshake_context,
        VERSION_DRAFT_29,
        DCID,
        SCID,
        0,
        b"finished frame....................................................",
    );
    let outcome = process(&mut endpoint, &mut cx, packet, client_addr());
    assert!(outcome.result.is_ok());

    let connection = endpoint.connections().get(handle).unwrap();
    assert!(connection.handshake_done());
    assert_eq!(connection.state(), State::ServerReady);
    assert_eq!(cx.events.ready_count(), 1);
}

#[test]
fn spin_bit_saturation_test() {
    let mut endpoint = server_endpoint();
    let mut cx = TestContext::new();
    let handle = ready_server(&mut endpoint, DCID, None);
    let context = crypto_testing::new_context(ONE_RTT_SEED);

    let spins = [
        SpinBit::One,
        SpinBit::Zero,
        SpinBit::One,
        SpinBit::Zero,
        SpinBit::One,
    ];
    let mut previous = 0;
    for (index, spin) in spins.iter().enumerate() {
        let packet = build_short(
            &context,
            DCID,
            *spin,
            KeyPhase::Zero,
            index as u64 + 1,
            0,
            b"payload driving the spin bit edge detector........................",
        );
        assert!(process(&mut endpoint, &mut cx, packet, client_addr())
            .result
            .is_ok());

        let spin_vec = endpoint.connections().get(handle).unwrap().spin_vec();
        assert!(spin_vec >= previous);
        previous = spin_vec;
    }

    // five edges observed, saturated at 3
    assert_eq!(previous, 3);
}

#[test]
fn closing_state_test() {
    let mut endpoint = server_endpoint();
    let mut cx = TestContext::new();
    let handle = ready_server(&mut endpoint, DCID, None);
    let context = crypto_testing::new_context(ONE_RTT_SEED);

    endpoint
        .connections_mut()
        .get_mut(handle)
        .unwrap()
        .set_state(State::Closing);
    cx.frames.closing_received = true;

    let packet = build_short(
        &context,
        DCID,
        SpinBit::Zero,
        KeyPhase::Zero,
        9,
        0,
        b"connection close frame............................................",
    );
    assert!(process(&mut endpoint, &mut cx, packet, client_addr())
        .result
        .is_ok());

    assert_eq!(cx.frames.closing_decoded, 1);
    // only closing frames were read
    assert!(cx.frames.decoded.is_empty());
    // a server receiving the peer's close drains
    assert_eq!(
        endpoint.connections().get(handle).unwrap().state(),
        State::Draining
    );
}

#[test]
fn multipath_coalescing_test() {
    let mut endpoint = server_endpoint();
    let mut cx = TestContext::new();

    let other_dcid: &[u8] = &[9, 9, 9, 9, 9, 9, 9, 9];
    let first = ready_server(&mut endpoint, DCID, None);
    let second = ready_server(&mut endpoint, other_dcid, None);

    let context = crypto_testing::new_context(ONE_RTT_SEED);
    let handshake_context = crypto_testing::new_context(0x4242);
    {
        let connection = endpoint.connections_mut().get_mut(first).unwrap();
        connection.set_crypto(Epoch::Handshake, crypto_testing::new_context(0x4242));
    }

    // segments of one datagram may carry differing destination IDs
    let mut datagram = build_handshake(
        &handshake_context,
        VERSION_DRAFT_29,
        DCID,
        SCID,
        0,
        b"handshake bytes...................................................",
    );
    datagram.extend_from_slice(&build_short(
        &context,
        other_dcid,
        SpinBit::Zero,
        KeyPhase::Zero,
        1,
        0,
        b"short packet for the other connection.............................",
    ));

    let outcome = process(&mut endpoint, &mut cx, datagram, client_addr());
    assert!(outcome.result.is_ok());
    assert_eq!(cx.frames.decoded.len(), 2);

    let first_largest = endpoint
        .connections()
        .get(first)
        .unwrap()
        .path(0)
        .unwrap()
        .context(PacketNumberSpace::Handshake)
        .largest();
    assert!(first_largest.is_some());

    let second_largest = endpoint
        .connections()
        .get(second)
        .unwrap()
        .path(0)
        .unwrap()
        .context(PacketNumberSpace::ApplicationData)
        .largest();
    assert!(second_largest.is_some());
}

#[test]
fn unmatched_short_triggers_reset_test() {
    let mut endpoint = server_endpoint();
    let mut cx = TestContext::new();

    let mut packet = vec![0x33u8; RESET_PACKET_MIN_SIZE + 30];
    packet[0] = 0x41;
    packet[1..9].copy_from_slice(DCID);

    let outcome = process(&mut endpoint, &mut cx, packet.clone(), client_addr());
    assert!(outcome.result.is_ok());

    let response = endpoint.poll_stateless_packet().unwrap();
    // short-header shape, never larger than the trigger
    assert_eq!(response.payload[0] & 0xb0, 0x30 & 0xb0);
    assert!(response.payload.len() <= packet.len());

    // the token is derived deterministically from the destination ID
    let expected = Token::derive(&endpoint.config().reset_secret, DCID);
    let tail = &response.payload[response.payload.len() - 16..];
    assert_eq!(tail, expected.as_ref());
}

#[test]
fn zero_rtt_test() {
    let mut endpoint = server_endpoint();
    let mut cx = TestContext::new();
    let handle = ready_server(&mut endpoint, DCID, None);

    let zero_rtt_context = crypto_testing::new_context(0x0e77);
    endpoint
        .connections_mut()
        .get_mut(handle)
        .unwrap()
        .set_crypto(Epoch::ZeroRtt, crypto_testing::new_context(0x0e77));

    let packet = build_zero_rtt(
        &zero_rtt_context,
        VERSION_DRAFT_29,
        DCID,
        SCID,
        0,
        b"early data frames.................................................",
    );
    let outcome = process(&mut endpoint, &mut cx, packet, client_addr());
    assert!(outcome.result.is_ok());
    assert_eq!(cx.frames.decoded.len(), 1);
    assert_eq!(cx.frames.decoded[0].epoch, Epoch::ZeroRtt);

    // 0-RTT under the wrong version is a protocol violation
    let wrong_version = 0x5a5a_5a5a;
    let packet = build_zero_rtt(
        &zero_rtt_context,
        wrong_version,
        DCID,
        SCID,
        1,
        b"early data frames.................................................",
    );
    let outcome = process(&mut endpoint, &mut cx, packet, client_addr());
    assert_eq!(
        outcome.result,
        Err(ProcessingError::ProtocolViolation("0-rtt version mismatch"))
    );
}

#[test]
fn client_version_negotiation_test() {
    use crate::packet::version_negotiation::{SupportedVersions, VersionNegotiation};

    let mut endpoint = Endpoint::new(Config::builder(Type::Client).build());
    let mut cx = TestContext::new();

    let local_id = [8u8, 7, 6, 5, 4, 3, 2, 1];
    let initial_id = [1u8, 2, 3, 4, 5, 6, 7, 8];
    let attempted_version = 0x5a5a_5a5a;

    let mut connection = Connection::new_client(
        ConnectionId::try_from_bytes(&initial_id).unwrap(),
        ConnectionId::try_from_bytes(&local_id).unwrap(),
        server_addr(),
        client_addr(),
        0,
        attempted_version,
        crypto_testing::initial_context(attempted_version, &initial_id),
        None,
    );
    connection.set_state(State::ClientInitSent);
    let handle = endpoint.add_connection(connection);

    let response = VersionNegotiation {
        tag: 0x2c,
        destination_connection_id: &local_id,
        source_connection_id: &initial_id,
        supported_versions: SupportedVersions(&[0x1a2a_3a4a, VERSION_DRAFT_29]),
    };
    let outcome = process(&mut endpoint, &mut cx, response.encode_to_vec(), server_addr());
    assert!(outcome.result.is_ok());

    // the connection restarts under the first offered version it supports
    let connection = endpoint.connections().get(handle).unwrap();
    assert_eq!(connection.version(), VERSION_DRAFT_29);
    assert_eq!(connection.state(), State::ClientInitSent);
}

#[test]
fn client_retry_test() {
    use crate::packet::retry::Retry;

    let mut endpoint = Endpoint::new(Config::builder(Type::Client).build());
    let mut cx = TestContext::new();

    let local_id = [8u8, 7, 6, 5, 4, 3, 2, 1];
    let initial_id = [1u8, 2, 3, 4, 5, 6, 7, 8];
    let server_id = [0x55u8; 8];

    let mut connection = Connection::new_client(
        ConnectionId::try_from_bytes(&initial_id).unwrap(),
        ConnectionId::try_from_bytes(&local_id).unwrap(),
        server_addr(),
        client_addr(),
        0,
        VERSION_DRAFT_29,
        crypto_testing::initial_context(VERSION_DRAFT_29, &initial_id),
        None,
    );
    connection.set_state(State::ClientInitSent);
    let handle = endpoint.add_connection(connection);

    let retry = Retry {
        tag: 0x03,
        version: VERSION_DRAFT_29,
        destination_connection_id: &local_id,
        source_connection_id: &server_id,
        odcil_unused: 0x0c,
        original_destination_connection_id: &initial_id,
        retry_token: b"fresh token bytes",
    };
    let outcome = process(&mut endpoint, &mut cx, retry.encode_to_vec(), server_addr());

    // a valid retry is signaled so the packet is never acknowledged
    assert_eq!(outcome.result, Err(ProcessingError::Retry));

    let connection = endpoint.connections().get(handle).unwrap();
    assert_eq!(connection.retry_token(), b"fresh token bytes");
    assert_eq!(connection.initial_id().as_bytes(), &server_id);
    assert_eq!(connection.state(), State::ClientInitResent);

    // a retry for a mismatched original ID is rejected
    let retry = Retry {
        tag: 0x03,
        version: VERSION_DRAFT_29,
        destination_connection_id: &local_id,
        source_connection_id: &server_id,
        odcil_unused: 0x0c,
        original_destination_connection_id: &[0xddu8; 8],
        retry_token: b"other token",
    };
    let outcome = process(&mut endpoint, &mut cx, retry.encode_to_vec(), server_addr());
    assert_eq!(outcome.result, Err(ProcessingError::UnexpectedPacket));
    let connection = endpoint.connections().get(handle).unwrap();
    assert_eq!(connection.retry_token(), b"fresh token bytes");
}

#[test]
fn monotone_largest_test() {
    let mut endpoint = server_endpoint();
    let mut cx = TestContext::new();
    let handle = ready_server(&mut endpoint, DCID, None);
    let context = crypto_testing::new_context(ONE_RTT_SEED);

    let mut previous = 0;
    for packet_number in [3u64, 1, 7, 2, 9] {
        let packet = build_short(
            &context,
            DCID,
            SpinBit::Zero,
            KeyPhase::Zero,
            packet_number,
            0,
            b"reordered payload.................................................",
        );
        let _ = process(&mut endpoint, &mut cx, packet, client_addr());

        let largest = endpoint
            .connections()
            .get(handle)
            .unwrap()
            .path(0)
            .unwrap()
            .context(PacketNumberSpace::ApplicationData)
            .largest()
            .unwrap()
            .as_u64();
        assert!(largest >= previous);
        previous = largest;
    }
    assert_eq!(previous, 9);
}
