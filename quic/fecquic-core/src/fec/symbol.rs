// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use bytes::{BufMut, Bytes, BytesMut};
use fecquic_codec::u24;

/// Tag marking a symbol as a wrapped protected packet
pub const SYMBOL_TYPE_TAG: u8 = 0x01;

/// Bytes prepended to the packet payload inside a source symbol: the type
/// tag plus the 64-bit packet number
pub const SYMBOL_OVERHEAD: usize = 1 + 8;

macro_rules! fpid {
    ($name:ident) => {
        /// FEC payload identifier. The high 24 bits address a block (or
        /// window start), the low 8 bits the symbol's offset within it.
        #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name(pub u32);

        impl $name {
            #[inline]
            pub fn new(block_number: u24, symbol_offset: u8) -> Self {
                Self((u32::from(block_number) << 8) | symbol_offset as u32)
            }

            #[inline]
            pub fn block_number(self) -> u24 {
                u24::new_truncated(self.0 >> 8)
            }

            #[inline]
            pub fn symbol_offset(self) -> u8 {
                self.0 as u8
            }
        }

        impl From<u32> for $name {
            #[inline]
            fn from(raw: u32) -> Self {
                Self(raw)
            }
        }
    };
}

fpid!(SourceFpid);
fpid!(RepairFpid);

/// One protected packet, wrapped for FEC protection
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SourceSymbol {
    id: SourceFpid,
    data: Bytes,
}

impl SourceSymbol {
    pub fn new(id: SourceFpid, data: Bytes) -> Self {
        Self { id, data }
    }

    /// Wraps a finalized packet payload: type tag, big-endian packet
    /// number, then the payload bytes
    pub fn from_packet(id: SourceFpid, packet_number: u64, payload: &[u8]) -> Self {
        let mut data = BytesMut::with_capacity(SYMBOL_OVERHEAD + payload.len());
        data.put_u8(SYMBOL_TYPE_TAG);
        data.put_u64(packet_number);
        data.put_slice(payload);
        Self {
            id,
            data: data.freeze(),
        }
    }

    #[inline]
    pub fn id(&self) -> SourceFpid {
        self.id
    }

    #[inline]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// The packet number recorded after the type tag
    pub fn packet_number(&self) -> Option<u64> {
        let bytes = self.data.get(1..SYMBOL_OVERHEAD)?;
        let mut value = [0u8; 8];
        value.copy_from_slice(bytes);
        Some(u64::from_be_bytes(value))
    }

    /// The wrapped packet payload, past the symbol prefix
    pub fn packet_payload(&self) -> &[u8] {
        self.data.get(SYMBOL_OVERHEAD..).unwrap_or(&[])
    }
}

/// Redundancy produced by the erasure code over a block's source symbols
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RepairSymbol {
    id: RepairFpid,
    data: Bytes,
}

impl RepairSymbol {
    pub fn new(id: RepairFpid, data: Bytes) -> Self {
        Self { id, data }
    }

    #[inline]
    pub fn id(&self) -> RepairFpid {
        self.id
    }

    #[inline]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fpid_split_test() {
        let id = SourceFpid::new(u24::new_truncated(0x00abcd), 0x42);
        assert_eq!(id.0, 0x00ab_cd42);
        assert_eq!(id.block_number(), u24::new_truncated(0x00abcd));
        assert_eq!(id.symbol_offset(), 0x42);
    }

    #[test]
    fn from_packet_test() {
        let id = SourceFpid::new(u24::new_truncated(3), 1);
        let symbol = SourceSymbol::from_packet(id, 0x0102_0304_0506_0708, b"payload");

        assert_eq!(symbol.len(), SYMBOL_OVERHEAD + 7);
        assert_eq!(symbol.data()[0], SYMBOL_TYPE_TAG);
        assert_eq!(symbol.packet_number(), Some(0x0102_0304_0506_0708));
        assert_eq!(symbol.packet_payload(), b"payload");
    }
}
