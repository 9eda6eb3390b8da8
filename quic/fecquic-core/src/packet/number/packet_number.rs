// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use crate::{
    packet::number::{
        derive_truncation_range, packet_number_space::PacketNumberSpace,
        truncated_packet_number::TruncatedPacketNumber,
    },
    varint::VarInt,
};
use core::cmp::Ordering;

//= https://www.rfc-editor.org/rfc/rfc9000#section-12.3
//# The packet number is an integer in the range 0 to 2^62-1.  This
//# number is used in determining the cryptographic nonce for packet
//# protection.

/// A fully expanded packet number, tagged with its packet space
#[derive(Clone, Copy, Debug, Eq)]
pub struct PacketNumber {
    space: PacketNumberSpace,
    value: VarInt,
}

impl PacketNumber {
    #[inline]
    pub(crate) const fn from_varint(value: VarInt, space: PacketNumberSpace) -> Self {
        Self { space, value }
    }

    /// Returns the space for the given `PacketNumber`
    #[inline]
    pub const fn space(self) -> PacketNumberSpace {
        self.space
    }

    #[inline]
    pub const fn as_u64(self) -> u64 {
        self.value.as_u64()
    }

    /// Truncates the `PacketNumber` into a `TruncatedPacketNumber` based on
    /// the largest acknowledged packet number
    #[inline]
    pub fn truncate(
        self,
        largest_acknowledged_packet_number: PacketNumber,
    ) -> Option<TruncatedPacketNumber> {
        let len = derive_truncation_range(largest_acknowledged_packet_number, self)?;
        Some(len.truncate_packet_number(self.value))
    }

    /// Returns the next packet number in the space, unless it would exceed
    /// the maximum value
    #[inline]
    pub fn next(self) -> Option<Self> {
        let value = self.value.checked_add(VarInt::from_u8(1))?;
        Some(Self::from_varint(value, self.space))
    }

    /// Returns `self - other` when `self >= other`
    #[inline]
    pub fn checked_distance(self, other: Self) -> Option<u64> {
        self.space.assert_eq(other.space);
        self.as_u64().checked_sub(other.as_u64())
    }

    /// Derives the AEAD nonce for this packet number
    #[inline]
    pub fn as_crypto_nonce(self) -> [u8; 12] {
        let mut nonce = [0u8; 12];
        nonce[4..].copy_from_slice(&self.as_u64().to_be_bytes());
        nonce
    }
}

impl PartialEq for PacketNumber {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        self.space.assert_eq(other.space);
        self.value.eq(&other.value)
    }
}

impl PartialOrd for PacketNumber {
    #[inline]
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PacketNumber {
    #[inline]
    fn cmp(&self, other: &Self) -> Ordering {
        self.space.assert_eq(other.space);
        self.value.cmp(&other.value)
    }
}

impl core::hash::Hash for PacketNumber {
    #[inline]
    fn hash<H: core::hash::Hasher>(&self, state: &mut H) {
        self.value.hash(state);
    }
}
