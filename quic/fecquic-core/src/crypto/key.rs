// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use crate::crypto::packet_protection;

/// AEAD nonce derived from the expanded packet number
pub type Nonce = [u8; 12];

/// A payload protection key for a single epoch.
///
/// The trait is object safe so a connection can hold one boxed key per epoch;
/// implementations are provided by the TLS/crypto provider.
pub trait Key: 'static + Send {
    /// Decrypts `payload` in place, authenticating it against `header` and
    /// the trailing tag. The payload includes the tag bytes.
    fn decrypt(
        &self,
        nonce: Nonce,
        header: &[u8],
        payload: &mut [u8],
    ) -> Result<(), packet_protection::Error>;

    /// Encrypts `payload` in place and writes the tag over its final
    /// `tag_len` bytes, authenticating against `header`.
    fn encrypt(
        &self,
        nonce: Nonce,
        header: &[u8],
        payload: &mut [u8],
    ) -> Result<(), packet_protection::Error>;

    /// Returns the length of the authentication tag
    fn tag_len(&self) -> usize;
}
