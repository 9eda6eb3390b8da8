// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use crate::packet::number::PacketNumber;
use core::mem;

/// Duplicate-packet detection over the most recent packet numbers
#[derive(Default, Debug)]
pub struct SlidingWindow {
    /// Bitfield representing each packet number less than
    /// the right edge up to the window width.
    window: Window,
    /// The highest packet number seen so far, which is the
    /// right edge of the window.
    right_edge: Option<PacketNumber>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SlidingWindowError {
    Duplicate,
    TooOld,
}

/// 128-bit wide window allowing for 128 packets, plus the highest
/// packet representing the right edge to be tracked.
type Window = u128;

/// The total width of the window = the size of the 128-bit bitfield + 1 more
/// bit representing the right edge, which is always set.
const WINDOW_WIDTH: u64 = 1 + mem::size_of::<Window>() as u64 * 8;

enum WindowPosition {
    /// Left of the window, assumed to be a duplicate.
    Left,
    /// Right of the window, the value is the offset from the right edge.
    Right(u64),
    /// Equal to the highest value tracked by the window.
    RightEdge,
    /// Within the window, the value is the offset from the right edge.
    Within(u64),
    /// The window is empty.
    Empty,
}

impl SlidingWindow {
    /// Inserts `packet_number`, returning `Duplicate` if it was already
    /// inserted or `TooOld` if it fell off the left edge and can no longer
    /// be distinguished from a duplicate.
    pub fn insert(&mut self, packet_number: PacketNumber) -> Result<(), SlidingWindowError> {
        match self.window_position(packet_number) {
            WindowPosition::Left => Err(SlidingWindowError::TooOld),
            WindowPosition::RightEdge => Err(SlidingWindowError::Duplicate),
            WindowPosition::Right(delta) => {
                if delta < WINDOW_WIDTH {
                    // Make room for the current right edge
                    self.window <<= 1;
                    // Set the bit for the current right edge
                    self.window |= 1;
                    // Shift by delta while taking account of the right edge
                    self.window <<= delta - 1;
                } else {
                    // The delta is too large, reset the window
                    self.window = Window::default();
                }
                self.right_edge = Some(packet_number);
                Ok(())
            }
            WindowPosition::Within(delta) => {
                let mask = 1 << (delta - 1); // Shift by the delta - 1 to account for the right edge
                let duplicate = self.window & mask != 0;
                self.window |= mask;
                if duplicate {
                    Err(SlidingWindowError::Duplicate)
                } else {
                    Ok(())
                }
            }
            WindowPosition::Empty => {
                self.right_edge = Some(packet_number);
                Ok(())
            }
        }
    }

    /// Determines if the given packet number has already been inserted or
    /// is too old to determine if it has already been inserted.
    pub fn check(&self, packet_number: PacketNumber) -> Result<(), SlidingWindowError> {
        match self.window_position(packet_number) {
            WindowPosition::Left => Err(SlidingWindowError::TooOld),
            WindowPosition::RightEdge => Err(SlidingWindowError::Duplicate),
            WindowPosition::Right(_) | WindowPosition::Empty => Ok(()),
            WindowPosition::Within(delta) => {
                let mask = 1 << (delta - 1);
                if self.window & mask != 0 {
                    Err(SlidingWindowError::Duplicate)
                } else {
                    Ok(())
                }
            }
        }
    }

    /// The highest packet number inserted so far
    #[inline]
    pub fn right_edge(&self) -> Option<PacketNumber> {
        self.right_edge
    }

    /// Gets the position of the `packet_number` relative to the window.
    fn window_position(&self, packet_number: PacketNumber) -> WindowPosition {
        if let Some(right_edge) = self.right_edge {
            match right_edge.checked_distance(packet_number) {
                Some(0) => WindowPosition::RightEdge,
                Some(delta) if delta >= WINDOW_WIDTH => WindowPosition::Left,
                Some(delta) => WindowPosition::Within(delta),
                None => match packet_number.checked_distance(right_edge) {
                    Some(delta) => WindowPosition::Right(delta),
                    None => WindowPosition::RightEdge,
                },
            }
        } else {
            WindowPosition::Empty
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{packet::number::PacketNumberSpace, varint::VarInt};
    use bolero::check;
    use SlidingWindowError::*;

    /// Asserts that inserting the given packet number produces the expected
    /// outcome, window contents and right edge.
    macro_rules! assert_window {
        ($window:expr, $to_insert:expr, $outcome:expr, $expected_window:expr, $right_edge:expr) => {{
            assert_eq!($window.check($to_insert), $outcome);
            assert_eq!($window.insert($to_insert), $outcome);
            assert_eq!(
                $window.window, $expected_window,
                "Expected: {:b}, Actual: {:b}",
                $expected_window, $window.window
            );
            assert_eq!($window.right_edge.unwrap(), $right_edge);
        }};
    }

    #[test]
    fn insert() {
        let space = PacketNumberSpace::ApplicationData;
        let mut window = SlidingWindow::default();

        let pn = |value: u8| space.new_packet_number(VarInt::from_u8(value));
        let large = space.new_packet_number(VarInt::MAX);

        assert_eq!(window.window, Window::default());
        assert_eq!(window.right_edge, None);

        assert_window!(window, pn(0), Ok(()), Window::default(), pn(0));
        assert_window!(window, pn(0), Err(Duplicate), Window::default(), pn(0));
        assert_window!(window, pn(1), Ok(()), 0b1, pn(1));
        assert_window!(window, pn(2), Ok(()), 0b11, pn(2));
        assert_window!(window, pn(5), Ok(()), 0b11100, pn(5));
        assert_window!(window, pn(8), Ok(()), 0b1110_0100, pn(8));
        assert_window!(window, pn(7), Ok(()), 0b1110_0101, pn(8));
        assert_window!(window, pn(3), Ok(()), 0b1111_0101, pn(8));
        assert_window!(window, pn(6), Ok(()), 0b1111_0111, pn(8));
        assert_window!(window, pn(4), Ok(()), 0b1111_1111, pn(8));
        assert_window!(window, pn(7), Err(Duplicate), 0b1111_1111, pn(8));
        assert_window!(window, pn(2), Err(Duplicate), 0b1111_1111, pn(8));
        assert_window!(window, large, Ok(()), Window::default(), large);
        assert_window!(window, pn(5), Err(TooOld), Window::default(), large);
    }

    #[test]
    fn insert_at_edge() {
        let mut window = SlidingWindow::default();
        let space = PacketNumberSpace::ApplicationData;
        let zero = space.new_packet_number(VarInt::ZERO);
        let width_minus_1 = space.new_packet_number(VarInt::new(WINDOW_WIDTH - 1).unwrap());
        let width = width_minus_1.next().unwrap();

        assert_window!(window, zero, Ok(()), Window::default(), zero);
        assert_window!(window, width_minus_1, Ok(()), 1_u128 << 127, width_minus_1);
        assert_window!(
            window,
            width_minus_1,
            Err(Duplicate),
            1_u128 << 127,
            width_minus_1
        );
        assert_window!(window, width, Ok(()), 0b1, width);
    }

    #[test]
    fn insert_test() {
        check!()
            .with_type::<(VarInt, VarInt)>()
            .cloned()
            .for_each(|(pn, other_pn)| {
                if pn == other_pn {
                    return;
                }
                let mut window = SlidingWindow::default();
                let space = PacketNumberSpace::ApplicationData;
                let packet_number = space.new_packet_number(pn);
                let other_packet_number = space.new_packet_number(other_pn);
                assert!(window.insert(packet_number).is_ok());
                assert_eq!(Err(Duplicate), window.check(packet_number));
                assert_ne!(Err(Duplicate), window.check(other_packet_number));
            });
    }
}
