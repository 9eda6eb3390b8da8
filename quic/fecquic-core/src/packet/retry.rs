// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use crate::packet::{
    initial::ProtectedInitial,
    long::{
        validate_destination_connection_id_len, validate_source_connection_id_len,
        DestinationConnectionIdLen, SourceConnectionIdLen, Version,
    },
    Tag,
};
use core::mem::size_of;
use fecquic_codec::{DecoderBufferMut, DecoderBufferMutResult, Encoder, EncoderValue};

//= https://www.rfc-editor.org/rfc/rfc9000#section-17.2.5
//# a Retry packet uses a long packet header with a type value of 0x03.
macro_rules! retry_tag {
    () => {
        0b1111u8
    };
}

const ENCODING_TAG: u8 = 0b1111_0000;

// Retry Packet {
//   Header Form (1) = 1,
//   Fixed Bit (1) = 1,
//   Long Packet Type (2) = 3,
//   Unused (4),
//   Version (32),
//   Destination Connection ID Length (8),
//   Destination Connection ID (0..160),
//   Source Connection ID Length (8),
//   Source Connection ID (0..160),
//   Unused (4) | ODCID Length (4),
//   Original Destination Connection ID (0..120),
//   Retry Token (..),
// }
//
// The low nibble of the byte following the source connection ID carries the
// original destination connection ID length; the remainder of the segment is
// the retry token. A Retry carries no length field and no packet number, so
// it always ends the datagram.

const ODCIL_MASK: u8 = 0x0f;

#[derive(Debug)]
pub struct Retry<'a> {
    pub tag: Tag,
    pub version: Version,
    pub destination_connection_id: &'a [u8],
    pub source_connection_id: &'a [u8],
    /// High nibble of the odcil byte, random on emission
    pub odcil_unused: u8,
    pub original_destination_connection_id: &'a [u8],
    pub retry_token: &'a [u8],
}

pub type ProtectedRetry<'a> = Retry<'a>;
pub type EncryptedRetry<'a> = Retry<'a>;
pub type CleartextRetry<'a> = Retry<'a>;

impl<'a> Retry<'a> {
    #[inline]
    pub(crate) fn decode(
        tag: Tag,
        version: Version,
        buffer: DecoderBufferMut<'a>,
    ) -> DecoderBufferMutResult<'a, Retry<'a>> {
        let buffer = buffer
            .skip(size_of::<Tag>() + size_of::<Version>())
            .expect("tag and version already verified");

        let (destination_connection_id, buffer) =
            buffer.decode_slice_with_len_prefix::<DestinationConnectionIdLen>()?;
        let destination_connection_id = destination_connection_id.into_less_safe_slice();
        validate_destination_connection_id_len(destination_connection_id.len())?;

        let (source_connection_id, buffer) =
            buffer.decode_slice_with_len_prefix::<SourceConnectionIdLen>()?;
        let source_connection_id = source_connection_id.into_less_safe_slice();
        validate_source_connection_id_len(source_connection_id.len())?;

        let (odcil_byte, buffer) = buffer.decode::<u8>()?;
        let odcil = (odcil_byte & ODCIL_MASK) as usize;

        let (original_destination_connection_id, buffer) = buffer.decode_slice(odcil)?;
        let original_destination_connection_id =
            original_destination_connection_id.into_less_safe_slice();

        // the rest of the segment is the token
        let (retry_token, buffer) = buffer.decode::<DecoderBufferMut>()?;
        let retry_token = retry_token.into_less_safe_slice();

        let packet = Retry {
            tag,
            version,
            destination_connection_id,
            source_connection_id,
            odcil_unused: odcil_byte >> 4,
            original_destination_connection_id,
            retry_token,
        };

        Ok((packet, buffer))
    }

    /// Builds the Retry sent in response to a client Initial.
    ///
    /// The destination and source connection IDs are flipped because this
    /// packet is being sent back to the client; the server supplies a fresh
    /// local connection ID of its own.
    pub fn from_initial(
        initial_packet: &'a ProtectedInitial,
        local_connection_id: &'a [u8],
        retry_token: &'a [u8],
        unused_bits: u8,
    ) -> Self {
        Self {
            tag: unused_bits & ODCIL_MASK,
            version: initial_packet.version,
            destination_connection_id: initial_packet.source_connection_id(),
            source_connection_id: local_connection_id,
            odcil_unused: unused_bits >> 4,
            original_destination_connection_id: initial_packet.destination_connection_id(),
            retry_token,
        }
    }

    #[inline]
    pub fn destination_connection_id(&self) -> &[u8] {
        self.destination_connection_id
    }

    #[inline]
    pub fn source_connection_id(&self) -> &[u8] {
        self.source_connection_id
    }

    #[inline]
    pub fn retry_token(&self) -> &[u8] {
        self.retry_token
    }
}

impl EncoderValue for Retry<'_> {
    fn encode<E: Encoder>(&self, encoder: &mut E) {
        ((self.tag & ODCIL_MASK) | ENCODING_TAG).encode(encoder);
        self.version.encode(encoder);
        self.destination_connection_id
            .encode_with_len_prefix::<DestinationConnectionIdLen, _>(encoder);
        self.source_connection_id
            .encode_with_len_prefix::<SourceConnectionIdLen, _>(encoder);

        let odcil = self.original_destination_connection_id.len() as u8 & ODCIL_MASK;
        ((self.odcil_unused << 4) | odcil).encode(encoder);
        self.original_destination_connection_id.encode(encoder);
        self.retry_token.encode(encoder);
    }
}
