// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use crate::{
    encoder::{estimator::LenEstimator, Encoder},
    unaligned::u24,
};
use byteorder::{ByteOrder, NetworkEndian};
use core::{convert::TryFrom, mem::size_of};

pub trait EncoderValue: Sized {
    /// Encodes the value into the encoder
    fn encode<E: Encoder>(&self, encoder: &mut E);

    /// Encodes the value into the encoder, while potentially mutating the value itself
    #[inline]
    fn encode_mut<E: Encoder>(&mut self, encoder: &mut E) {
        self.encode(encoder)
    }

    /// Returns the encoding size with no buffer constraints
    #[inline]
    fn encoding_size(&self) -> usize {
        let mut estimator = LenEstimator::default();
        self.encode(&mut estimator);
        estimator.len()
    }

    /// Encodes the value into the encoder with a length prefix of type `Len`
    #[inline]
    fn encode_with_len_prefix<Len: TryFrom<usize> + EncoderValue, E: Encoder>(&self, encoder: &mut E)
    where
        Len::Error: core::fmt::Debug,
    {
        let len = self.encoding_size();
        let len = Len::try_from(len).expect("length prefix overflow");
        len.encode(encoder);
        self.encode(encoder);
    }

    /// Encodes the value into a freshly allocated `Vec`
    #[cfg(feature = "alloc")]
    #[inline]
    fn encode_to_vec(&self) -> alloc::vec::Vec<u8> {
        let mut bytes = alloc::vec![0u8; self.encoding_size()];
        let mut encoder = crate::EncoderBuffer::new(&mut bytes);
        self.encode(&mut encoder);
        bytes
    }
}

impl EncoderValue for u8 {
    #[inline]
    fn encode<E: Encoder>(&self, encoder: &mut E) {
        encoder.write_slice(&[*self])
    }
}

macro_rules! encoder_value_network_endian {
    ($call:ident, $ty:ty) => {
        impl EncoderValue for $ty {
            #[inline]
            fn encode<E: Encoder>(&self, encoder: &mut E) {
                encoder.write_sized(size_of::<Self>(), |dest| NetworkEndian::$call(dest, *self))
            }
        }
    };
}

encoder_value_network_endian!(write_u16, u16);
encoder_value_network_endian!(write_u32, u32);
encoder_value_network_endian!(write_u64, u64);

impl EncoderValue for u24 {
    #[inline]
    fn encode<E: Encoder>(&self, encoder: &mut E) {
        encoder.write_sized(3, |dest| NetworkEndian::write_u24(dest, (*self).into()))
    }
}

impl EncoderValue for &[u8] {
    #[inline]
    fn encode<E: Encoder>(&self, encoder: &mut E) {
        encoder.write_slice(self)
    }
}

impl<const N: usize> EncoderValue for [u8; N] {
    #[inline]
    fn encode<E: Encoder>(&self, encoder: &mut E) {
        encoder.write_slice(&self[..])
    }
}

impl EncoderValue for () {
    #[inline]
    fn encode<E: Encoder>(&self, _encoder: &mut E) {}
}

impl<T: EncoderValue> EncoderValue for &T {
    #[inline]
    fn encode<E: Encoder>(&self, encoder: &mut E) {
        T::encode(self, encoder)
    }
}
