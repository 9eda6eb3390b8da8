// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Wire frames of the FEC sublayer.
//!
//! Both frames live in 1-RTT packets alongside regular QUIC frames. A
//! repair symbol always travels whole; splitting one across several repair
//! frames is not supported.

use crate::{
    fec::symbol::{RepairFpid, RepairSymbol, SourceFpid},
    varint::VarInt,
};
use fecquic_codec::{
    decoder_invariant, DecoderBuffer, DecoderBufferResult, Encoder, EncoderValue,
};

/// Frame type carrying the source FPID of the enclosing packet
pub const SOURCE_FPID_TYPE: u8 = 0x29;

/// Frame type carrying one repair symbol
pub const REPAIR_TYPE: u8 = 0x2a;

/// Encoded size of a source FPID frame: the type byte plus the 32-bit FPID
pub const SOURCE_FPID_FRAME_LEN: usize = 5;

// Source FPID Frame {
//   Type (8) = 0x29,
//   Source FEC Payload ID (32),
// }

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SourceFpidFrame {
    pub source_id: SourceFpid,
}

impl SourceFpidFrame {
    pub fn decode(buffer: DecoderBuffer<'_>) -> DecoderBufferResult<'_, Self> {
        let (frame_type, buffer) = buffer.decode::<u8>()?;
        decoder_invariant!(frame_type == SOURCE_FPID_TYPE, "invalid source fpid frame");

        let (source_id, buffer) = buffer.decode::<u32>()?;

        Ok((
            Self {
                source_id: source_id.into(),
            },
            buffer,
        ))
    }
}

impl EncoderValue for SourceFpidFrame {
    fn encode<E: Encoder>(&self, encoder: &mut E) {
        SOURCE_FPID_TYPE.encode(encoder);
        self.source_id.0.encode(encoder);
    }
}

// Repair Frame {
//   Type (8) = 0x2a,
//   Repair FEC Payload ID (32),
//   Source Symbol Count (8),
//   Repair Symbol Count (8),
//   Data Length (i),
//   Data (..),
// }

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RepairFrame<'a> {
    pub repair_id: RepairFpid,
    /// Total source symbols in the covered block (nss)
    pub source_count: u8,
    /// Total repair symbols generated for it (nrs)
    pub repair_count: u8,
    pub data: &'a [u8],
}

impl<'a> RepairFrame<'a> {
    pub fn for_symbol(symbol: &'a RepairSymbol, source_count: u8, repair_count: u8) -> Self {
        Self {
            repair_id: symbol.id(),
            source_count,
            repair_count,
            data: symbol.data(),
        }
    }

    pub fn decode(buffer: DecoderBuffer<'a>) -> DecoderBufferResult<'a, Self> {
        let (frame_type, buffer) = buffer.decode::<u8>()?;
        decoder_invariant!(frame_type == REPAIR_TYPE, "invalid repair frame");

        let (repair_id, buffer) = buffer.decode::<u32>()?;
        let (source_count, buffer) = buffer.decode::<u8>()?;
        let (repair_count, buffer) = buffer.decode::<u8>()?;
        let (data, buffer) = buffer.decode_slice_with_len_prefix::<VarInt>()?;
        let data = data.into_less_safe_slice();

        decoder_invariant!(source_count > 0, "repair frame covers no source symbols");

        Ok((
            Self {
                repair_id: repair_id.into(),
                source_count,
                repair_count,
                data,
            },
            buffer,
        ))
    }
}

impl EncoderValue for RepairFrame<'_> {
    fn encode<E: Encoder>(&self, encoder: &mut E) {
        REPAIR_TYPE.encode(encoder);
        self.repair_id.0.encode(encoder);
        self.source_count.encode(encoder);
        self.repair_count.encode(encoder);
        self.data.encode_with_len_prefix::<VarInt, E>(encoder);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fecquic_codec::u24;

    #[test]
    fn source_fpid_round_trip_test() {
        let frame = SourceFpidFrame {
            source_id: SourceFpid::new(u24::new_truncated(7), 3),
        };

        let bytes = frame.encode_to_vec();
        assert_eq!(bytes.len(), SOURCE_FPID_FRAME_LEN);

        let (decoded, remaining) = SourceFpidFrame::decode(DecoderBuffer::new(&bytes)).unwrap();
        assert!(remaining.is_empty());
        assert_eq!(decoded, frame);
    }

    #[test]
    fn repair_round_trip_test() {
        let symbol = RepairSymbol::new(
            RepairFpid::new(u24::new_truncated(7), 0),
            bytes::Bytes::from_static(b"repair data bytes"),
        );
        let frame = RepairFrame::for_symbol(&symbol, 5, 2);

        let bytes = frame.encode_to_vec();
        let (decoded, remaining) = RepairFrame::decode(DecoderBuffer::new(&bytes)).unwrap();

        assert!(remaining.is_empty());
        assert_eq!(decoded.repair_id, symbol.id());
        assert_eq!(decoded.source_count, 5);
        assert_eq!(decoded.repair_count, 2);
        assert_eq!(decoded.data, symbol.data());
    }

    #[test]
    fn reject_wrong_type_test() {
        let bytes = [0xff, 0, 0, 0, 0];
        assert!(SourceFpidFrame::decode(DecoderBuffer::new(&bytes)).is_err());
        assert!(RepairFrame::decode(DecoderBuffer::new(&bytes)).is_err());
    }
}
