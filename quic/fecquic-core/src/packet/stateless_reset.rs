// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use crate::{random, stateless_reset};

// Stateless Reset {
//   Fixed Bits (2) = 1,
//   Unpredictable Bits (38..),
//   Stateless Reset Token (128),
// }
//
// The first byte carries the short-header shape (0x30 or 0x70, following the
// fixed bit of the packet that triggered the reset), at least 20 bytes are
// uniformly random, and the final 16 bytes are the reset token derived from
// the triggering packet's destination connection ID.

const TAG: u8 = 0x30;
const TAG_PHASE_MASK: u8 = 0x40;

/// The smallest randomized prefix that keeps the reset indistinguishable
/// from a real short-header packet
const MIN_UNPREDICTABLE_BITS: usize = 20;

/// The minimum length of an incoming packet that can trigger a reset:
/// a 17-byte randomized prefix plus the 16-byte token
pub const RESET_PACKET_MIN_SIZE: usize = 17 + stateless_reset::token::LEN;

/// The smallest reset this endpoint emits: tag byte, minimum unpredictable
/// prefix, token
pub const MIN_EMITTED_LEN: usize = 1 + MIN_UNPREDICTABLE_BITS + stateless_reset::token::LEN;

/// Encodes a stateless reset packet into `packet_buf`, returning its length.
///
/// Returns `None` when the triggering packet is too small; above the
/// minimum emitted size the reply never exceeds the triggering packet,
/// bounding amplification.
pub fn encode_packet(
    token: stateless_reset::Token,
    triggering_first_byte: u8,
    triggering_packet_len: usize,
    random_generator: &mut dyn random::Generator,
    packet_buf: &mut [u8],
) -> Option<usize> {
    if triggering_packet_len < RESET_PACKET_MIN_SIZE || packet_buf.len() < MIN_EMITTED_LEN {
        return None;
    }

    let max_unpredictable = triggering_packet_len
        .saturating_sub(1 + stateless_reset::token::LEN)
        .max(MIN_UNPREDICTABLE_BITS)
        .min(packet_buf.len() - 1 - stateless_reset::token::LEN);
    let unpredictable_len = random::gen_range_biased(
        random_generator,
        MIN_UNPREDICTABLE_BITS..=max_unpredictable,
    );

    random_generator.public_random_fill(&mut packet_buf[1..1 + unpredictable_len]);
    packet_buf[0] = TAG | (triggering_first_byte & TAG_PHASE_MASK);

    let packet_len = 1 + unpredictable_len + stateless_reset::token::LEN;
    packet_buf[1 + unpredictable_len..packet_len].copy_from_slice(token.as_ref());

    Some(packet_len)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stateless_reset::testing::TEST_TOKEN_1;

    #[test]
    fn encode_packet_test() {
        let mut generator = random::testing::Generator(123);
        let mut buffer = [0; 1500];

        let packet_len =
            encode_packet(TEST_TOKEN_1, 0x40, 600, &mut generator, &mut buffer).unwrap();

        // short-header shape with at least the minimum unpredictable prefix
        assert_eq!(buffer[0] & 0xb0, 0x30 & 0xb0);
        assert!(packet_len >= 1 + MIN_UNPREDICTABLE_BITS + stateless_reset::token::LEN);
        assert!(packet_len <= 600);

        assert_eq!(
            TEST_TOKEN_1.into_inner(),
            buffer[packet_len - stateless_reset::token::LEN..packet_len]
        );
    }

    #[test]
    fn phase_bit_test() {
        let mut generator = random::testing::Generator(123);
        let mut buffer = [0; 1500];

        encode_packet(TEST_TOKEN_1, 0x40, 600, &mut generator, &mut buffer).unwrap();
        assert_eq!(buffer[0], 0x70);

        encode_packet(TEST_TOKEN_1, 0x00, 600, &mut generator, &mut buffer).unwrap();
        assert_eq!(buffer[0], 0x30);
    }

    #[test]
    fn min_packet_test() {
        let mut generator = random::testing::Generator(123);
        let mut buffer = [0; 1500];

        assert!(encode_packet(
            TEST_TOKEN_1,
            0x40,
            RESET_PACKET_MIN_SIZE - 1,
            &mut generator,
            &mut buffer
        )
        .is_none());

        assert!(encode_packet(
            TEST_TOKEN_1,
            0x40,
            RESET_PACKET_MIN_SIZE,
            &mut generator,
            &mut buffer
        )
        .is_some());
    }

    #[test]
    fn token_always_last_test() {
        let mut generator = random::testing::Generator(7);
        let mut buffer = [0; 1500];

        for triggering_len in RESET_PACKET_MIN_SIZE..128 {
            let packet_len =
                encode_packet(TEST_TOKEN_1, 0, triggering_len, &mut generator, &mut buffer)
                    .unwrap();
            assert_eq!(
                TEST_TOKEN_1.into_inner(),
                buffer[packet_len - stateless_reset::token::LEN..packet_len]
            );
        }
    }
}
