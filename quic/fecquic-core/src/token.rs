// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Retry-token formats.
//!
//! A server that enforces address validation derives a token from the
//! client's IP address; an Initial carrying the matching token proves the
//! address was reachable. The format is a seam so deployments can supply
//! their own MAC-based construction.

use crate::hash;
use std::net::SocketAddr;
use subtle::ConstantTimeEq;

/// The length of tokens produced by the built-in format
pub const TOKEN_LEN: usize = 16;

pub trait Format: 'static {
    /// The length of tokens this format produces
    fn token_len(&self) -> usize;

    /// Writes the retry token for `peer_address` into `output`; returns
    /// `None` when `output` is too small
    fn generate_retry_token(&mut self, peer_address: &SocketAddr, output: &mut [u8])
        -> Option<usize>;

    /// Returns `true` when `token` is valid for `peer_address`
    fn validate_retry_token(&mut self, peer_address: &SocketAddr, token: &[u8]) -> bool;
}

/// Built-in keyed format over the peer IP bytes (4 for IPv4, 16 for IPv6)
#[derive(Clone, Debug)]
pub struct KeyedFormat {
    key: [u8; 16],
}

impl KeyedFormat {
    pub fn new(key: [u8; 16]) -> Self {
        Self { key }
    }

    fn derive(&self, peer_address: &SocketAddr) -> [u8; TOKEN_LEN] {
        match peer_address.ip() {
            std::net::IpAddr::V4(ip) => hash::fnv1a_128(&self.key, &[&ip.octets()]),
            std::net::IpAddr::V6(ip) => hash::fnv1a_128(&self.key, &[&ip.octets()]),
        }
    }
}

impl Format for KeyedFormat {
    fn token_len(&self) -> usize {
        TOKEN_LEN
    }

    fn generate_retry_token(
        &mut self,
        peer_address: &SocketAddr,
        output: &mut [u8],
    ) -> Option<usize> {
        let token = self.derive(peer_address);
        output.get_mut(..TOKEN_LEN)?.copy_from_slice(&token);
        Some(TOKEN_LEN)
    }

    fn validate_retry_token(&mut self, peer_address: &SocketAddr, token: &[u8]) -> bool {
        let expected = self.derive(peer_address);
        if token.len() != TOKEN_LEN {
            return false;
        }
        expected.ct_eq(token).unwrap_u8() == 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_test() {
        let mut format = KeyedFormat::new([7; 16]);
        let peer: SocketAddr = "192.0.2.5:443".parse().unwrap();
        let other: SocketAddr = "192.0.2.6:443".parse().unwrap();
        let same_ip_other_port: SocketAddr = "192.0.2.5:9000".parse().unwrap();

        let mut token = [0u8; TOKEN_LEN];
        assert_eq!(format.generate_retry_token(&peer, &mut token), Some(TOKEN_LEN));

        assert!(format.validate_retry_token(&peer, &token));
        // the token covers only the IP, so a port change still validates
        assert!(format.validate_retry_token(&same_ip_other_port, &token));
        assert!(!format.validate_retry_token(&other, &token));
        assert!(!format.validate_retry_token(&peer, &token[..8]));
    }

    #[test]
    fn short_output_test() {
        let mut format = KeyedFormat::new([7; 16]);
        let peer: SocketAddr = "192.0.2.5:443".parse().unwrap();
        let mut small = [0u8; 4];
        assert_eq!(format.generate_retry_token(&peer, &mut small), None);
    }
}
