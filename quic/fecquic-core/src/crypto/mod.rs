// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Packet protection seams and helpers.
//!
//! The lifecycle of an incoming payload is `ProtectedPayload` →
//! [`unprotect`] → `EncryptedPayload` (+ truncated packet number) →
//! [`decrypt`] → cleartext. Outgoing payloads run the inverse through
//! [`encrypt`] and [`protect`]. Key material is provided per epoch by the
//! external TLS driver through the [`HeaderKey`] and [`Key`] traits.

pub mod header_crypto;
pub mod key;
pub mod packet_protection;
pub mod payload;
pub mod tls;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use header_crypto::*;
pub use key::*;
pub use payload::*;

use crate::packet::number::{PacketNumber, PacketNumberSpace, TruncatedPacketNumber};
use fecquic_codec::{DecoderBufferMut, DecoderError};

/// Key-schedule level of a packet
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum Epoch {
    Initial = 0,
    ZeroRtt = 1,
    Handshake = 2,
    OneRtt = 3,
}

impl Epoch {
    pub const COUNT: usize = 4;

    /// The packet number space the epoch's packets are tracked in
    #[inline]
    pub fn space(self) -> PacketNumberSpace {
        match self {
            Epoch::Initial => PacketNumberSpace::Initial,
            Epoch::Handshake => PacketNumberSpace::Handshake,
            Epoch::ZeroRtt | Epoch::OneRtt => PacketNumberSpace::ApplicationData,
        }
    }

    /// Index for per-epoch state arrays
    #[inline]
    pub const fn as_index(self) -> usize {
        self as usize
    }
}

/// The pair of keys protecting one epoch
pub struct CryptoContext {
    pub header_key: Box<dyn HeaderKey>,
    pub key: Box<dyn Key>,
}

impl core::fmt::Debug for CryptoContext {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("CryptoContext").finish_non_exhaustive()
    }
}

/// Protects an `EncryptedPayload` into a `ProtectedPayload`
#[inline]
pub fn protect<'a, K: HeaderKey + ?Sized>(
    crypto: &K,
    payload: EncryptedPayload<'a>,
) -> Result<ProtectedPayload<'a>, DecoderError> {
    let sample = payload.header_protection_sample(crypto.sealing_sample_len())?;
    let mask = crypto.sealing_header_protection_mask(sample);

    Ok(apply_header_protection(mask, payload))
}

/// Removes header protection from a `ProtectedPayload`, producing the
/// truncated packet number and an `EncryptedPayload`
#[inline]
pub fn unprotect<'a, K: HeaderKey + ?Sized>(
    crypto: &K,
    space: PacketNumberSpace,
    payload: ProtectedPayload<'a>,
) -> Result<(TruncatedPacketNumber, EncryptedPayload<'a>), DecoderError> {
    let sample = payload.header_protection_sample(crypto.opening_sample_len())?;
    let mask = crypto.opening_header_protection_mask(sample);

    remove_header_protection(space, mask, payload)
}

/// Decrypts an `EncryptedPayload` into cleartext header and payload buffers
#[inline]
pub fn decrypt<'a, K: Key + ?Sized>(
    key: &K,
    packet_number: PacketNumber,
    payload: EncryptedPayload<'a>,
) -> Result<(DecoderBufferMut<'a>, DecoderBufferMut<'a>), packet_protection::Error> {
    let (header, payload) = payload.split_mut();

    if payload.len() < key.tag_len() {
        return Err(packet_protection::Error::AEAD_FAILURE);
    }

    key.decrypt(packet_number.as_crypto_nonce(), header, payload)?;

    // remove the key tag from the payload
    let payload_len = payload.len() - key.tag_len();
    let payload = &mut payload[0..payload_len];

    Ok((header.into(), payload.into()))
}
