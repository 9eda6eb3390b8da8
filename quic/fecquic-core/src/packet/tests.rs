// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use crate::{
    connection::id::ConnectionInfo,
    crypto::testing as crypto_testing,
    packet::{
        long::VERSION_DRAFT_29, number::PacketNumberSpace, retry::Retry, short::SpinBit,
        testing::*, KeyPhase, ProtectedPacket,
    },
    varint::VarInt,
};
use fecquic_codec::{DecoderBufferMut, EncoderValue};
use std::net::SocketAddr;

const DCID: &[u8] = &[0xde, 0xad, 0xbe, 0xef, 1, 2, 3, 4];
const SCID: &[u8] = &[0xca, 0xfe, 5, 6];

fn remote() -> SocketAddr {
    "192.0.2.5:4433".parse().unwrap()
}

fn decode<'a>(
    bytes: &'a mut [u8],
    local_id_len: usize,
) -> (ProtectedPacket<'a>, DecoderBufferMut<'a>) {
    let remote = remote();
    let info = ConnectionInfo::new(&remote);
    ProtectedPacket::decode(DecoderBufferMut::new(bytes), &info, &local_id_len).unwrap()
}

#[test]
fn initial_round_trip_test() {
    let context = crypto_testing::initial_context(VERSION_DRAFT_29, DCID);
    let payload = b"crypto frame bytes and some padding to sample from...............";
    let mut bytes = build_initial(
        &context,
        VERSION_DRAFT_29,
        DCID,
        SCID,
        b"token",
        7,
        payload,
    );

    let (packet, remaining) = decode(&mut bytes, DCID.len());
    assert!(remaining.is_empty());

    let ProtectedPacket::Initial(packet) = packet else {
        panic!("expected an initial packet");
    };
    assert_eq!(packet.version, VERSION_DRAFT_29);
    assert_eq!(packet.destination_connection_id(), DCID);
    assert_eq!(packet.source_connection_id(), SCID);
    assert_eq!(packet.token(), b"token");

    let largest = PacketNumberSpace::Initial.new_packet_number(VarInt::ZERO);
    let encrypted = packet.unprotect(&*context.header_key, largest).unwrap();
    assert_eq!(encrypted.packet_number.as_u64(), 7);

    let cleartext = encrypted.decrypt(&*context.key).unwrap();
    assert_eq!(cleartext.destination_connection_id(), DCID);
    assert_eq!(cleartext.payload.as_less_safe_slice(), payload);
}

#[test]
fn handshake_round_trip_test() {
    let context = crypto_testing::new_context(11);
    let payload = b"handshake crypto frames..........................................";
    let mut bytes = build_handshake(&context, VERSION_DRAFT_29, DCID, SCID, 3, payload);

    let (packet, remaining) = decode(&mut bytes, DCID.len());
    assert!(remaining.is_empty());

    let ProtectedPacket::Handshake(packet) = packet else {
        panic!("expected a handshake packet");
    };
    assert_eq!(packet.destination_connection_id(), DCID);

    let largest = PacketNumberSpace::Handshake.new_packet_number(VarInt::ZERO);
    let encrypted = packet.unprotect(&*context.header_key, largest).unwrap();
    let cleartext = encrypted.decrypt(&*context.key).unwrap();
    assert_eq!(cleartext.payload.as_less_safe_slice(), payload);
}

#[test]
fn short_round_trip_test() {
    let context = crypto_testing::new_context(42);
    let payload = b"one rtt frames with enough bytes for the protection sample.......";
    let mut bytes = build_short(
        &context,
        DCID,
        SpinBit::One,
        KeyPhase::Zero,
        42,
        0,
        payload,
    );

    let (packet, remaining) = decode(&mut bytes, DCID.len());
    assert!(remaining.is_empty());

    let ProtectedPacket::Short(packet) = packet else {
        panic!("expected a short packet");
    };
    assert_eq!(packet.destination_connection_id(), DCID);
    assert_eq!(packet.spin_bit, SpinBit::One);

    let largest = PacketNumberSpace::ApplicationData.new_packet_number(VarInt::ZERO);
    let encrypted = packet.unprotect(&*context.header_key, largest).unwrap();
    assert_eq!(encrypted.packet_number.as_u64(), 42);
    assert_eq!(encrypted.key_phase(), KeyPhase::Zero);

    let cleartext = encrypted.decrypt(&*context.key).unwrap();
    assert_eq!(cleartext.payload.as_less_safe_slice(), payload);
}

#[test]
fn coalesced_segments_test() {
    let context = crypto_testing::initial_context(VERSION_DRAFT_29, DCID);
    let short_context = crypto_testing::new_context(42);

    let mut datagram = build_initial(
        &context,
        VERSION_DRAFT_29,
        DCID,
        SCID,
        &[],
        0,
        b"first segment payload.............................................",
    );
    datagram.extend_from_slice(&build_short(
        &short_context,
        DCID,
        SpinBit::Zero,
        KeyPhase::Zero,
        1,
        0,
        b"second segment payload............................................",
    ));

    let (packet, remaining) = decode(&mut datagram, DCID.len());
    assert!(matches!(packet, ProtectedPacket::Initial(_)));
    assert!(!remaining.is_empty());

    let remote = remote();
    let info = ConnectionInfo::new(&remote);
    let (packet, remaining) = ProtectedPacket::decode(remaining, &info, &DCID.len()).unwrap();
    assert!(matches!(packet, ProtectedPacket::Short(_)));
    assert!(remaining.is_empty());
}

#[test]
fn retry_round_trip_test() {
    let retry = Retry {
        tag: 0x05,
        version: VERSION_DRAFT_29,
        destination_connection_id: SCID,
        source_connection_id: &[9, 9, 9, 9, 9, 9, 9, 9],
        odcil_unused: 0x0a,
        original_destination_connection_id: DCID,
        retry_token: b"sixteen byte tok",
    };
    let mut bytes = retry.encode_to_vec();

    let (packet, remaining) = decode(&mut bytes, 0);
    assert!(remaining.is_empty());

    let ProtectedPacket::Retry(packet) = packet else {
        panic!("expected a retry packet");
    };
    assert_eq!(packet.destination_connection_id(), SCID);
    assert_eq!(packet.source_connection_id(), &[9u8; 8][..]);
    assert_eq!(packet.original_destination_connection_id, DCID);
    assert_eq!(packet.retry_token(), b"sixteen byte tok");
}

#[test]
fn version_negotiation_round_trip_test() {
    use crate::packet::version_negotiation::{SupportedVersions, VersionNegotiation};

    let versions = [VERSION_DRAFT_29, 0x0000_0001];
    let response = VersionNegotiation {
        tag: 0x35,
        destination_connection_id: SCID,
        source_connection_id: DCID,
        supported_versions: SupportedVersions(&versions),
    };
    let mut bytes = response.encode_to_vec();

    // bit 7 is forced on so the packet always reads as a long header
    assert_eq!(bytes[0] & 0x80, 0x80);
    assert_eq!(&bytes[1..5], &[0, 0, 0, 0]);

    let (packet, remaining) = decode(&mut bytes, 0);
    assert!(remaining.is_empty());

    let ProtectedPacket::VersionNegotiation(packet) = packet else {
        panic!("expected a version negotiation packet");
    };
    assert_eq!(packet.destination_connection_id(), SCID);
    assert_eq!(packet.source_connection_id(), DCID);
    assert_eq!(packet.iter().collect::<Vec<_>>(), versions);
}

#[test]
fn invalid_header_test() {
    // bit 6 clear and bit 7 clear is neither a short nor a long header
    let mut bytes = [0x00u8; 32];
    let remote = remote();
    let info = ConnectionInfo::new(&remote);
    assert!(ProtectedPacket::decode(DecoderBufferMut::new(&mut bytes), &info, &8usize).is_err());
}

#[test]
fn tampered_packet_fails_decryption_test() {
    let context = crypto_testing::new_context(42);
    let mut bytes = build_short(
        &context,
        DCID,
        SpinBit::Zero,
        KeyPhase::Zero,
        9,
        0,
        b"payload covered by the authentication tag.........................",
    );

    let len = bytes.len();
    bytes[len - 20] ^= 0x80;

    let (packet, _) = decode(&mut bytes, DCID.len());
    let ProtectedPacket::Short(packet) = packet else {
        panic!("expected a short packet");
    };

    let largest = PacketNumberSpace::ApplicationData.new_packet_number(VarInt::ZERO);
    let encrypted = packet.unprotect(&*context.header_key, largest).unwrap();
    assert!(encrypted.decrypt(&*context.key).is_err());
}

#[test]
fn packet_kind_metadata_test() {
    let context = crypto_testing::initial_context(VERSION_DRAFT_29, DCID);
    let mut bytes = build_initial(
        &context,
        VERSION_DRAFT_29,
        DCID,
        SCID,
        &[],
        0,
        b"payload...........................................................",
    );

    let (packet, _) = decode(&mut bytes, DCID.len());
    assert_eq!(packet.version(), Some(VERSION_DRAFT_29));
    assert_eq!(packet.epoch(), Some(crate::crypto::Epoch::Initial));
    assert_eq!(packet.source_connection_id(), Some(SCID));
}
