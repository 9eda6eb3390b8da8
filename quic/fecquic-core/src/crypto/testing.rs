// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Deterministic packet-protection keys for tests.
//!
//! The keys exercise the full unprotect → decrypt path without a TLS stack:
//! the header-protection mask is a keyed function of the ciphertext sample,
//! the payload cipher is a keyed XOR stream, and the 16-byte tag is a keyed
//! hash over the associated data, ciphertext and nonce.

use crate::{
    crypto::{
        self, key::Nonce, packet_protection, CryptoContext, HeaderProtectionMask,
        HEADER_PROTECTION_MASK_LEN,
    },
    hash,
};
use subtle::ConstantTimeEq;

const SAMPLE_LEN: usize = 16;
const TAG_LEN: usize = 16;

#[derive(Clone, Copy, Debug)]
pub struct HeaderKey {
    seed: u64,
}

impl crypto::HeaderKey for HeaderKey {
    fn opening_header_protection_mask(&self, ciphertext_sample: &[u8]) -> HeaderProtectionMask {
        let digest = hash::fnv1a_64(self.seed, &[ciphertext_sample]).to_be_bytes();
        let mut mask = [0u8; HEADER_PROTECTION_MASK_LEN];
        mask.copy_from_slice(&digest[..HEADER_PROTECTION_MASK_LEN]);
        mask
    }

    fn opening_sample_len(&self) -> usize {
        SAMPLE_LEN
    }

    fn sealing_header_protection_mask(&self, ciphertext_sample: &[u8]) -> HeaderProtectionMask {
        self.opening_header_protection_mask(ciphertext_sample)
    }

    fn sealing_sample_len(&self) -> usize {
        SAMPLE_LEN
    }
}

#[derive(Clone, Copy, Debug)]
pub struct Key {
    seed: u64,
}

impl Key {
    fn keystream(&self, nonce: Nonce) -> [u8; 8] {
        hash::fnv1a_64(self.seed, &[&nonce]).to_be_bytes()
    }

    fn tag(&self, nonce: Nonce, header: &[u8], ciphertext: &[u8]) -> [u8; TAG_LEN] {
        hash::fnv1a_128(&self.seed.to_be_bytes(), &[header, ciphertext, &nonce])
    }

    fn apply_keystream(&self, nonce: Nonce, payload: &mut [u8]) {
        let pad = self.keystream(nonce);
        for (index, byte) in payload.iter_mut().enumerate() {
            *byte ^= pad[index % pad.len()];
        }
    }
}

impl crypto::Key for Key {
    fn decrypt(
        &self,
        nonce: Nonce,
        header: &[u8],
        payload: &mut [u8],
    ) -> Result<(), packet_protection::Error> {
        if payload.len() < TAG_LEN {
            return Err(packet_protection::Error::AEAD_FAILURE);
        }
        let split = payload.len() - TAG_LEN;
        let (ciphertext, tag) = payload.split_at_mut(split);

        let expected = self.tag(nonce, header, ciphertext);
        if expected.ct_eq(tag).unwrap_u8() == 0 {
            return Err(packet_protection::Error::AEAD_FAILURE);
        }

        self.apply_keystream(nonce, ciphertext);
        Ok(())
    }

    fn encrypt(
        &self,
        nonce: Nonce,
        header: &[u8],
        payload: &mut [u8],
    ) -> Result<(), packet_protection::Error> {
        if payload.len() < TAG_LEN {
            return Err(packet_protection::Error::AEAD_FAILURE);
        }
        let split = payload.len() - TAG_LEN;
        let (ciphertext, tag) = payload.split_at_mut(split);

        self.apply_keystream(nonce, ciphertext);
        tag.copy_from_slice(&self.tag(nonce, header, ciphertext));
        Ok(())
    }

    fn tag_len(&self) -> usize {
        TAG_LEN
    }
}

/// Creates a crypto context from an arbitrary seed
pub fn new_context(seed: u64) -> CryptoContext {
    CryptoContext {
        header_key: Box::new(HeaderKey { seed }),
        key: Box::new(Key { seed: seed.rotate_left(17) }),
    }
}

/// Derives the context protecting Initial packets for a connection, keyed on
/// the client's destination connection ID as the real key schedule would be
pub fn initial_context(version: u32, destination_connection_id: &[u8]) -> CryptoContext {
    let seed = hash::fnv1a_64(version as u64, &[destination_connection_id]);
    new_context(seed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::Key as _;

    #[test]
    fn round_trip_test() {
        let context = new_context(42);
        let nonce = [7u8; 12];
        let header = [1u8, 2, 3];

        let mut payload = Vec::from(&b"some protected payload"[..]);
        payload.extend_from_slice(&[0u8; TAG_LEN]);

        context.key.encrypt(nonce, &header, &mut payload).unwrap();
        assert_ne!(&payload[..22], b"some protected payload".as_slice());

        context.key.decrypt(nonce, &header, &mut payload).unwrap();
        assert_eq!(&payload[..22], b"some protected payload".as_slice());
    }

    #[test]
    fn tamper_test() {
        let context = new_context(42);
        let nonce = [7u8; 12];

        let mut payload = vec![0u8; 64];
        context.key.encrypt(nonce, &[], &mut payload).unwrap();

        payload[3] ^= 0x40;
        assert!(context.key.decrypt(nonce, &[], &mut payload).is_err());
    }
}
