// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Builders producing fully protected wire packets for tests

use crate::{
    crypto::{self, CryptoContext, EncryptedPayload},
    packet::{
        initial::Initial,
        number::{PacketNumber, PacketNumberLen, PacketNumberSpace, TruncatedPacketNumber},
        short::{Short, SpinBit},
        zero_rtt::ZeroRtt,
        handshake::Handshake,
        KeyPhase,
    },
    varint::VarInt,
};
use fecquic_codec::EncoderValue;

/// Applies AEAD protection and header protection in place, the inverse of
/// the receive path
pub fn seal_in_place(
    context: &CryptoContext,
    packet_number: PacketNumber,
    header_len: usize,
    packet_number_len: PacketNumberLen,
    packet: &mut [u8],
) {
    let header_with_pn = header_len + packet_number_len.bytesize();
    let (header, body) = packet.split_at_mut(header_with_pn);
    context
        .key
        .encrypt(packet_number.as_crypto_nonce(), header, body)
        .unwrap();

    let payload = EncryptedPayload::new(header_len, packet_number_len, packet);
    crypto::protect(&*context.header_key, payload).unwrap();
}

fn truncated(space: PacketNumberSpace, packet_number: u64) -> (PacketNumber, TruncatedPacketNumber) {
    let packet_number = space.new_packet_number(VarInt::new(packet_number).unwrap());
    let truncated = packet_number
        .truncate(space.new_packet_number(VarInt::ZERO))
        .unwrap();
    (packet_number, truncated)
}

fn with_tag_space(context: &CryptoContext, payload: &[u8]) -> Vec<u8> {
    let mut body = payload.to_vec();
    body.resize(payload.len() + context.key.tag_len(), 0);
    body
}

pub fn build_initial(
    context: &CryptoContext,
    version: u32,
    destination_connection_id: &[u8],
    source_connection_id: &[u8],
    token: &[u8],
    packet_number: u64,
    payload: &[u8],
) -> Vec<u8> {
    let space = PacketNumberSpace::Initial;
    let (packet_number, truncated) = truncated(space, packet_number);
    let body = with_tag_space(context, payload);

    let packet = Initial {
        version,
        destination_connection_id,
        source_connection_id,
        token,
        packet_number: truncated,
        payload: &body[..],
    };

    let mut bytes = packet.encode_to_vec();
    let header_len = bytes.len() - body.len() - truncated.len().bytesize();
    seal_in_place(context, packet_number, header_len, truncated.len(), &mut bytes);
    bytes
}

pub fn build_handshake(
    context: &CryptoContext,
    version: u32,
    destination_connection_id: &[u8],
    source_connection_id: &[u8],
    packet_number: u64,
    payload: &[u8],
) -> Vec<u8> {
    let space = PacketNumberSpace::Handshake;
    let (packet_number, truncated) = truncated(space, packet_number);
    let body = with_tag_space(context, payload);

    let packet = Handshake {
        version,
        destination_connection_id,
        source_connection_id,
        packet_number: truncated,
        payload: &body[..],
    };

    let mut bytes = packet.encode_to_vec();
    let header_len = bytes.len() - body.len() - truncated.len().bytesize();
    seal_in_place(context, packet_number, header_len, truncated.len(), &mut bytes);
    bytes
}

pub fn build_zero_rtt(
    context: &CryptoContext,
    version: u32,
    destination_connection_id: &[u8],
    source_connection_id: &[u8],
    packet_number: u64,
    payload: &[u8],
) -> Vec<u8> {
    let space = PacketNumberSpace::ApplicationData;
    let (packet_number, truncated) = truncated(space, packet_number);
    let body = with_tag_space(context, payload);

    let packet = ZeroRtt {
        version,
        destination_connection_id,
        source_connection_id,
        packet_number: truncated,
        payload: &body[..],
    };

    let mut bytes = packet.encode_to_vec();
    let header_len = bytes.len() - body.len() - truncated.len().bytesize();
    seal_in_place(context, packet_number, header_len, truncated.len(), &mut bytes);
    bytes
}

pub fn build_short(
    context: &CryptoContext,
    destination_connection_id: &[u8],
    spin_bit: SpinBit,
    key_phase: KeyPhase,
    packet_number: u64,
    largest_acknowledged: u64,
    payload: &[u8],
) -> Vec<u8> {
    let space = PacketNumberSpace::ApplicationData;
    let full = space.new_packet_number(VarInt::new(packet_number).unwrap());
    let truncated = full
        .truncate(space.new_packet_number(VarInt::new(largest_acknowledged).unwrap()))
        .unwrap();
    let body = with_tag_space(context, payload);

    let packet = Short {
        spin_bit,
        key_phase,
        destination_connection_id,
        packet_number: truncated,
        payload: &body[..],
    };

    let mut bytes = packet.encode_to_vec();
    let header_len = 1 + destination_connection_id.len();
    seal_in_place(context, full, header_len, truncated.len(), &mut bytes);
    bytes
}
