// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use core::{fmt, ops::Deref};
use fecquic_codec::{decoder_value, Encoder, EncoderValue};

//= https://www.rfc-editor.org/rfc/rfc9000#section-16
//# QUIC packets and frames commonly use a variable-length encoding for
//# non-negative integer values.  This encoding ensures that smaller
//# integer values need fewer bytes to encode.
//#
//# The QUIC variable-length integer encoding reserves the two most
//# significant bits of the first byte to encode the base-2 logarithm of
//# the integer encoding length in bytes.  The integer value is encoded
//# on the remaining bits, in network byte order.

pub const MAX_VARINT_VALUE: u64 = 4_611_686_018_427_387_903;

const TWO_BIT_MAX: u64 = (1 << 6) - 1;
const FOUR_BIT_MAX: u64 = (1 << 14) - 1;
const EIGHT_BIT_MAX: u64 = (1 << 30) - 1;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct VarIntError;

impl fmt::Display for VarIntError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "varint range exceeded")
    }
}

impl std::error::Error for VarIntError {}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, PartialOrd, Ord, Hash)]
pub struct VarInt(u64);

impl fmt::Display for VarInt {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl VarInt {
    pub const MAX: Self = Self(MAX_VARINT_VALUE);

    pub const ZERO: Self = Self(0);

    #[inline]
    pub fn new(value: u64) -> Result<Self, VarIntError> {
        if value > MAX_VARINT_VALUE {
            return Err(VarIntError);
        }
        Ok(Self(value))
    }

    #[inline]
    pub const fn from_u8(value: u8) -> Self {
        Self(value as u64)
    }

    #[inline]
    pub const fn from_u16(value: u16) -> Self {
        Self(value as u64)
    }

    #[inline]
    pub const fn from_u32(value: u32) -> Self {
        Self(value as u64)
    }

    #[inline]
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    #[inline]
    pub fn checked_add(self, value: Self) -> Option<Self> {
        Self::new(self.0.checked_add(value.0)?).ok()
    }

    #[inline]
    pub fn checked_add_usize(self, value: usize) -> Option<Self> {
        let value = Self::try_from(value).ok()?;
        self.checked_add(value)
    }

    #[inline]
    pub fn saturating_add(self, value: Self) -> Self {
        Self::new(self.0.saturating_add(value.0)).unwrap_or(Self::MAX)
    }

    #[inline]
    pub fn checked_sub(self, value: Self) -> Option<Self> {
        Some(Self(self.0.checked_sub(value.0)?))
    }

    #[inline]
    pub fn saturating_sub(self, value: Self) -> Self {
        Self(self.0.saturating_sub(value.0))
    }

    /// Number of bytes the value occupies on the wire
    #[inline]
    pub fn encoding_len(self) -> usize {
        if self.0 <= TWO_BIT_MAX {
            1
        } else if self.0 <= FOUR_BIT_MAX {
            2
        } else if self.0 <= EIGHT_BIT_MAX {
            4
        } else {
            8
        }
    }
}

//= https://www.rfc-editor.org/rfc/rfc9000#section-16
//# +======+========+=============+=======================+
//# | 2MSB | Length | Usable Bits | Range                 |
//# +======+========+=============+=======================+
//# | 00   | 1      | 6           | 0-63                  |
//# | 01   | 2      | 14          | 0-16383               |
//# | 10   | 4      | 30          | 0-1073741823          |
//# | 11   | 8      | 62          | 0-4611686018427387903 |
//# +======+========+=============+=======================+

decoder_value!(
    impl<'a> VarInt {
        fn decode(buffer: Buffer) -> Result<Self> {
            let (first, buffer) = buffer.decode::<u8>()?;

            let value = match first >> 6 {
                0b00 => (first & 0b0011_1111) as u64,
                0b01 => {
                    let (second, buffer) = buffer.decode::<u8>()?;
                    let value = (((first & 0b0011_1111) as u64) << 8) | second as u64;
                    return Ok((VarInt(value), buffer));
                }
                0b10 => {
                    let (rest, buffer) = buffer.decode_slice(3)?;
                    let rest = rest.as_less_safe_slice();
                    let value = (((first & 0b0011_1111) as u64) << 24)
                        | ((rest[0] as u64) << 16)
                        | ((rest[1] as u64) << 8)
                        | rest[2] as u64;
                    return Ok((VarInt(value), buffer));
                }
                0b11 => {
                    let (rest, buffer) = buffer.decode_slice(7)?;
                    let rest = rest.as_less_safe_slice();
                    let mut value = (first & 0b0011_1111) as u64;
                    for byte in rest {
                        value = (value << 8) | *byte as u64;
                    }
                    return Ok((VarInt(value), buffer));
                }
                _ => unreachable!(),
            };

            Ok((VarInt(value), buffer))
        }
    }
);

impl EncoderValue for VarInt {
    #[inline]
    fn encode<E: Encoder>(&self, encoder: &mut E) {
        let value = self.0;
        if value <= TWO_BIT_MAX {
            encoder.write_slice(&[value as u8]);
        } else if value <= FOUR_BIT_MAX {
            encoder.write_slice(&[(value >> 8) as u8 | 0b0100_0000, value as u8]);
        } else if value <= EIGHT_BIT_MAX {
            encoder.write_slice(&[
                (value >> 24) as u8 | 0b1000_0000,
                (value >> 16) as u8,
                (value >> 8) as u8,
                value as u8,
            ]);
        } else {
            encoder.write_slice(&[
                (value >> 56) as u8 | 0b1100_0000,
                (value >> 48) as u8,
                (value >> 40) as u8,
                (value >> 32) as u8,
                (value >> 24) as u8,
                (value >> 16) as u8,
                (value >> 8) as u8,
                value as u8,
            ]);
        }
    }
}

#[cfg(any(test, feature = "generator"))]
impl bolero_generator::TypeGenerator for VarInt {
    fn generate<D: bolero_generator::Driver>(driver: &mut D) -> Option<Self> {
        let value: u64 = driver.produce()?;
        Some(Self(value & MAX_VARINT_VALUE))
    }
}

impl Deref for VarInt {
    type Target = u64;

    #[inline]
    fn deref(&self) -> &u64 {
        &self.0
    }
}

impl AsRef<u64> for VarInt {
    #[inline]
    fn as_ref(&self) -> &u64 {
        &self.0
    }
}

macro_rules! convert_from {
    ($ty:ty) => {
        impl From<$ty> for VarInt {
            #[inline]
            fn from(value: $ty) -> Self {
                Self(value as u64)
            }
        }
    };
}

convert_from!(u8);
convert_from!(u16);
convert_from!(u32);

impl From<VarInt> for u64 {
    #[inline]
    fn from(value: VarInt) -> Self {
        value.0
    }
}

impl TryFrom<u64> for VarInt {
    type Error = VarIntError;

    #[inline]
    fn try_from(value: u64) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl TryFrom<usize> for VarInt {
    type Error = VarIntError;

    #[inline]
    fn try_from(value: usize) -> Result<Self, Self::Error> {
        Self::new(value as u64)
    }
}

impl TryFrom<VarInt> for usize {
    type Error = VarIntError;

    #[inline]
    fn try_from(value: VarInt) -> Result<Self, Self::Error> {
        usize::try_from(value.0).map_err(|_| VarIntError)
    }
}

impl PartialEq<u64> for VarInt {
    #[inline]
    fn eq(&self, other: &u64) -> bool {
        self.0.eq(other)
    }
}

impl PartialOrd<u64> for VarInt {
    #[inline]
    fn partial_cmp(&self, other: &u64) -> Option<core::cmp::Ordering> {
        self.0.partial_cmp(other)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bolero::check;
    use fecquic_codec::{DecoderBuffer, EncoderBuffer};

    fn round_trip(value: VarInt) -> VarInt {
        let mut bytes = [0u8; 8];
        let len = {
            let mut encoder = EncoderBuffer::new(&mut bytes);
            value.encode(&mut encoder);
            encoder.len()
        };
        assert_eq!(len, value.encoding_len());
        let (decoded, _) = DecoderBuffer::new(&bytes[..len]).decode::<VarInt>().unwrap();
        decoded
    }

    //= https://www.rfc-editor.org/rfc/rfc9000#appendix-A.1
    //= type=test
    //# For example, the eight-byte sequence 0xc2197c5eff14e88c decodes to
    //# the decimal value 151,288,809,941,952,652; the four-byte sequence
    //# 0x9d7f3e7d decodes to 494,878,333; the two-byte sequence 0x7bbd
    //# decodes to 15,293; and the single byte 0x25 decodes to 37
    #[test]
    fn rfc_example_test() {
        macro_rules! example {
            ($bytes:expr, $value:expr) => {{
                let buffer = DecoderBuffer::new(&$bytes[..]);
                let (actual, remaining) = buffer.decode::<VarInt>().unwrap();
                assert!(remaining.is_empty());
                assert_eq!(actual.as_u64(), $value);
                assert_eq!(round_trip(actual), actual);
            }};
        }

        example!(
            hex_literal::hex!("c2197c5eff14e88c"),
            151_288_809_941_952_652
        );
        example!(hex_literal::hex!("9d7f3e7d"), 494_878_333);
        example!(hex_literal::hex!("7bbd"), 15_293);
        example!(hex_literal::hex!("25"), 37);
    }

    #[test]
    fn round_trip_test() {
        check!().with_type::<VarInt>().cloned().for_each(|value| {
            assert_eq!(round_trip(value), value);
        });
    }

    #[test]
    fn range_test() {
        assert!(VarInt::new(MAX_VARINT_VALUE).is_ok());
        assert!(VarInt::new(MAX_VARINT_VALUE + 1).is_err());
    }
}
