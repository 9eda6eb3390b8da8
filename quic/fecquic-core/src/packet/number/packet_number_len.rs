// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use crate::{
    packet::number::{
        packet_number_space::PacketNumberSpace, truncated_packet_number::TruncatedPacketNumber,
        PACKET_NUMBER_LEN_MASK,
    },
    varint::VarInt,
};
use fecquic_codec::{u24, DecoderBuffer, DecoderBufferResult};

//= https://www.rfc-editor.org/rfc/rfc9000#section-17.1
//# Packet numbers are integers in the range 0 to 2^62-1 (Section 12.3).
//# When present in long or short packet headers, they are encoded in 1
//# to 4 bytes.

/// The on-wire length of a truncated packet number, 1 to 4 bytes
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PacketNumberLen {
    pub(crate) space: PacketNumberSpace,
    pub(crate) value: PacketNumberLenValue,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub(crate) enum PacketNumberLenValue {
    U8,
    U16,
    U24,
    U32,
}

impl PacketNumberLen {
    pub const MAX_LEN: usize = 4;

    /// Derives the length from the low two bits of an unprotected packet tag
    #[inline]
    pub fn from_packet_tag(tag: u8, space: PacketNumberSpace) -> Self {
        let value = match tag & PACKET_NUMBER_LEN_MASK {
            0 => PacketNumberLenValue::U8,
            1 => PacketNumberLenValue::U16,
            2 => PacketNumberLenValue::U24,
            _ => PacketNumberLenValue::U32,
        };
        Self { space, value }
    }

    /// Returns the smallest length able to represent `value`, if any
    #[inline]
    pub(crate) fn from_varint(value: VarInt, space: PacketNumberSpace) -> Option<Self> {
        let value = value.as_u64();
        let value = if value <= u8::MAX as u64 {
            PacketNumberLenValue::U8
        } else if value <= u16::MAX as u64 {
            PacketNumberLenValue::U16
        } else if value <= u24::MAX.into_inner() as u64 {
            PacketNumberLenValue::U24
        } else if value <= u32::MAX as u64 {
            PacketNumberLenValue::U32
        } else {
            return None;
        };
        Some(Self { space, value })
    }

    /// Mask for the low two bits of the packet tag
    #[inline]
    pub fn into_packet_tag_mask(self) -> u8 {
        match self.value {
            PacketNumberLenValue::U8 => 0,
            PacketNumberLenValue::U16 => 1,
            PacketNumberLenValue::U24 => 2,
            PacketNumberLenValue::U32 => 3,
        }
    }

    #[inline]
    pub fn bytesize(self) -> usize {
        match self.value {
            PacketNumberLenValue::U8 => 1,
            PacketNumberLenValue::U16 => 2,
            PacketNumberLenValue::U24 => 3,
            PacketNumberLenValue::U32 => 4,
        }
    }

    #[inline]
    pub fn bitsize(self) -> usize {
        self.bytesize() * 8
    }

    #[inline]
    pub fn max_value(self) -> u64 {
        match self.value {
            PacketNumberLenValue::U8 => u8::MAX as u64,
            PacketNumberLenValue::U16 => u16::MAX as u64,
            PacketNumberLenValue::U24 => u24::MAX.into_inner() as u64,
            PacketNumberLenValue::U32 => u32::MAX as u64,
        }
    }

    /// Truncates `value` to this length
    #[inline]
    pub(crate) fn truncate_packet_number(self, value: VarInt) -> TruncatedPacketNumber {
        let value = value.as_u64();
        match self.value {
            PacketNumberLenValue::U8 => TruncatedPacketNumber::new(value as u8, self.space),
            PacketNumberLenValue::U16 => TruncatedPacketNumber::new(value as u16, self.space),
            PacketNumberLenValue::U24 => {
                TruncatedPacketNumber::new(u24::new_truncated(value as u32), self.space)
            }
            PacketNumberLenValue::U32 => TruncatedPacketNumber::new(value as u32, self.space),
        }
    }

    /// Decodes a truncated packet number of this length from `buffer`
    #[inline]
    pub fn decode_truncated_packet_number<'a>(
        self,
        buffer: DecoderBuffer<'a>,
    ) -> DecoderBufferResult<'a, TruncatedPacketNumber> {
        match self.value {
            PacketNumberLenValue::U8 => TruncatedPacketNumber::decode::<u8>(buffer, self.space),
            PacketNumberLenValue::U16 => TruncatedPacketNumber::decode::<u16>(buffer, self.space),
            PacketNumberLenValue::U24 => TruncatedPacketNumber::decode::<u24>(buffer, self.space),
            PacketNumberLenValue::U32 => TruncatedPacketNumber::decode::<u32>(buffer, self.space),
        }
    }
}
