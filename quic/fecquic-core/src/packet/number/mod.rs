// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use crate::varint::VarInt;

mod packet_number;
mod packet_number_len;
mod packet_number_space;
mod protected_packet_number;
mod sliding_window;
mod truncated_packet_number;

pub use packet_number::PacketNumber;
pub use packet_number_len::PacketNumberLen;
pub use packet_number_space::PacketNumberSpace;
pub use protected_packet_number::ProtectedPacketNumber;
pub use sliding_window::{SlidingWindow, SlidingWindowError};
pub use truncated_packet_number::TruncatedPacketNumber;

/// The packet number len is the two least significant bits of the packet tag
pub(crate) const PACKET_NUMBER_LEN_MASK: u8 = 0b11;

//= https://www.rfc-editor.org/rfc/rfc9000#section-17.1
//# the sender MUST use a packet number size able to represent more than
//# twice as large a range than the difference between the largest
//# acknowledged packet and packet number being sent.

fn derive_truncation_range(
    largest_acknowledged_packet_number: PacketNumber,
    packet_number: PacketNumber,
) -> Option<PacketNumberLen> {
    let space = packet_number.space();
    space.assert_eq(largest_acknowledged_packet_number.space());
    packet_number
        .as_u64()
        .checked_sub(largest_acknowledged_packet_number.as_u64())
        .and_then(|value| value.checked_mul(2))
        .and_then(|value| VarInt::new(value).ok())
        .and_then(|value| PacketNumberLen::from_varint(value, space))
}

//= https://www.rfc-editor.org/rfc/rfc9000#appendix-A.3
//# DecodePacketNumber(largest_pn, truncated_pn, pn_nbits):
//#    expected_pn  = largest_pn + 1
//#    pn_win       = 1 << pn_nbits
//#    pn_hwin      = pn_win / 2
//#    pn_mask      = pn_win - 1
//#    // The incoming packet number should be greater than
//#    // expected_pn - pn_hwin and less than or equal to
//#    // expected_pn + pn_hwin
//#    //
//#    // This means we cannot just strip the trailing bits from
//#    // expected_pn and add the truncated_pn because that might
//#    // yield a value outside the window.
//#    //
//#    // The following code calculates a candidate value and
//#    // makes sure it's within the packet number window.
//#    // Note the extra checks to prevent overflow and underflow.
//#    candidate_pn = (expected_pn & ~pn_mask) | truncated_pn
//#    if candidate_pn <= expected_pn - pn_hwin and
//#       candidate_pn < (1 << 62) - pn_win:
//#       return candidate_pn + pn_win
//#    if candidate_pn > expected_pn + pn_hwin and
//#       candidate_pn >= pn_win:
//#       return candidate_pn - pn_win
//#    return candidate_pn

fn decode_packet_number(
    largest_pn: PacketNumber,
    truncated_pn: TruncatedPacketNumber,
) -> PacketNumber {
    let space = largest_pn.space();
    space.assert_eq(truncated_pn.space());

    let pn_nbits = truncated_pn.bitsize();
    // deref to u64 so we have enough room
    let expected_pn = largest_pn.as_u64() + 1;
    let pn_win = 1u64 << pn_nbits;
    let pn_hwin = pn_win / 2;
    let pn_mask = pn_win - 1;

    let candidate_pn = (expected_pn & !pn_mask) | truncated_pn.into_u64();

    let candidate_pn = if expected_pn
        .checked_sub(pn_hwin)
        .is_some_and(|lower| candidate_pn <= lower)
        && candidate_pn < VarInt::MAX.as_u64() + 1 - pn_win
    {
        candidate_pn + pn_win
    } else if candidate_pn > expected_pn + pn_hwin && candidate_pn >= pn_win {
        candidate_pn - pn_win
    } else {
        candidate_pn
    };

    let candidate_pn = candidate_pn.min(VarInt::MAX.as_u64());
    // the candidate is clamped into range above
    let candidate_pn = VarInt::new(candidate_pn).unwrap_or(VarInt::MAX);

    PacketNumber::from_varint(candidate_pn, space)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bolero::check;

    fn new(value: VarInt) -> PacketNumber {
        PacketNumberSpace::Initial.new_packet_number(value)
    }

    //= https://www.rfc-editor.org/rfc/rfc9000#section-17.1
    //= type=test
    //# For example, if an endpoint has received an acknowledgment for packet
    //# 0xabe8b3, sending a packet with a number of 0xac5c02 requires a
    //# packet number encoding with 16 bits or more
    #[test]
    fn packet_number_len_example_test() {
        let largest = new(VarInt::from_u32(0x00ab_e8bc));

        assert_eq!(
            new(VarInt::from_u32(0x00ac_5c02))
                .truncate(largest)
                .unwrap()
                .bitsize(),
            16,
        );

        assert_eq!(
            new(VarInt::from_u32(0x00ac_e8fe))
                .truncate(largest)
                .unwrap()
                .bitsize(),
            24,
        );
    }

    //= https://www.rfc-editor.org/rfc/rfc9000#section-17.1
    //= type=test
    //# if the highest successfully
    //# authenticated packet had a packet number of 0xa82f30ea, then a packet
    //# containing a 16-bit value of 0x9b32 will be decoded as 0xa82f9b32.
    #[test]
    fn packet_decoding_example_test() {
        let space = PacketNumberSpace::Initial;
        let largest = space.new_packet_number(VarInt::from_u32(0xa82f_30ea));
        let truncated = TruncatedPacketNumber::new(0x9b32u16, space);
        let expected = space.new_packet_number(VarInt::from_u32(0xa82f_9b32));

        assert_eq!(truncated.expand(largest), expected);
        assert_eq!(expected.truncate(largest).unwrap(), truncated);
    }

    #[test]
    fn truncate_expand_test() {
        check!()
            .with_type::<(VarInt, VarInt)>()
            .cloned()
            .for_each(|(largest_pn, expected_pn)| {
                let largest_pn = new(largest_pn);
                let expected_pn = new(expected_pn);
                if let Some(truncated_pn) = expected_pn.truncate(largest_pn) {
                    assert_eq!(expected_pn, truncated_pn.expand(largest_pn));
                }
            });
    }

    /// This implementation tries to closely follow the RFC pseudo code so
    /// it's easier to ensure the production decoder matches.
    fn rfc_decoder(largest_pn: u64, truncated_pn: u64, pn_nbits: usize) -> u64 {
        use std::panic::catch_unwind as catch;

        let expected_pn = largest_pn + 1;
        let pn_win = 1u64 << pn_nbits;
        let pn_hwin = pn_win / 2;
        let pn_mask = pn_win - 1;

        let candidate_pn = (expected_pn & !pn_mask) | truncated_pn;
        if catch(|| {
            candidate_pn <= expected_pn.checked_sub(pn_hwin).unwrap()
                && candidate_pn < (1u64 << 62).checked_sub(pn_win).unwrap()
        })
        .unwrap_or_default()
        {
            return candidate_pn + pn_win;
        }

        if catch(|| {
            candidate_pn > expected_pn.checked_add(pn_hwin).unwrap() && candidate_pn >= pn_win
        })
        .unwrap_or_default()
        {
            return candidate_pn - pn_win;
        }

        candidate_pn
    }

    #[test]
    fn rfc_differential_test() {
        check!()
            .with_type::<(VarInt, VarInt)>()
            .cloned()
            .for_each(|(largest_pn, truncated_pn)| {
                let largest_pn = new(largest_pn);
                let space = largest_pn.space();
                let truncated_pn =
                    TruncatedPacketNumber::new(truncated_pn.as_u64() as u16, space);
                let rfc_value = rfc_decoder(
                    largest_pn.as_u64(),
                    truncated_pn.into_u64(),
                    truncated_pn.bitsize(),
                )
                .min(VarInt::MAX.as_u64());
                let actual_value = truncated_pn.expand(largest_pn).as_u64();

                assert_eq!(actual_value, rfc_value);
            });
    }
}
