// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Sender-side symbol bookkeeping.
//!
//! While a packet is being built, exactly one of a source FPID frame or a
//! repair frame may be written into it; the reservation lives from
//! [`Sender::begin_packet`] to [`Sender::finalize_and_protect_packet`],
//! which wraps the finished payload into a source symbol and hands it to
//! the coding scheme.

use crate::fec::{
    code::ErasureCode,
    frame::SourceFpidFrame,
    symbol::{RepairFpid, RepairSymbol, SourceFpid, SourceSymbol},
    Config, SchemeKind, RECEIVE_BUFFER_MAX_LENGTH,
};
use fecquic_codec::u24;
use std::collections::VecDeque;

pub struct Sender {
    code: ErasureCode,
    source_count: u8,
    repair_count: u8,
    scheme: SchemeSender,
    pending_repairs: VecDeque<(RepairSymbol, u8, u8)>,

    current_source_id: Option<SourceFpid>,
    contains_source_frame: bool,
    contains_repair_frame: bool,
    source_id_reserved: bool,
}

enum SchemeSender {
    Block {
        block_number: u24,
        symbols: Vec<SourceSymbol>,
    },
    Window {
        next_id: u24,
        window: VecDeque<SourceSymbol>,
    },
}

impl Sender {
    pub fn new(config: &Config) -> Self {
        let scheme = match config.scheme {
            SchemeKind::Block => SchemeSender::Block {
                block_number: u24::ZERO,
                symbols: Vec::new(),
            },
            SchemeKind::Window => SchemeSender::Window {
                next_id: u24::ZERO,
                window: VecDeque::new(),
            },
        };

        Self {
            code: ErasureCode::new(config.code),
            source_count: config.source_count.max(1),
            repair_count: config.repair_count,
            scheme,
            pending_repairs: VecDeque::new(),
            current_source_id: None,
            contains_source_frame: false,
            contains_repair_frame: false,
            source_id_reserved: false,
        }
    }

    /// The FPID the next protected packet will carry; monotone in send
    /// order within the current block or window
    pub fn source_fpid(&self) -> SourceFpid {
        match &self.scheme {
            SchemeSender::Block {
                block_number,
                symbols,
            } => SourceFpid::new(*block_number, symbols.len() as u8),
            SchemeSender::Window { next_id, .. } => SourceFpid(u32::from(*next_id)),
        }
    }

    /// Reserves the source FPID frame for the packet being built
    pub fn begin_packet(&mut self) -> Option<SourceFpidFrame> {
        if self.source_id_reserved {
            return None;
        }
        let source_id = self.source_fpid();
        self.source_id_reserved = true;
        self.current_source_id = Some(source_id);
        Some(SourceFpidFrame { source_id })
    }

    /// Records that the reserved source FPID frame was written. Fails when
    /// the packet already carries a repair frame: a packet is either
    /// protected or carries redundancy, never both.
    pub fn mark_source_frame_written(&mut self) -> bool {
        if self.contains_repair_frame {
            return false;
        }
        self.contains_source_frame = true;
        true
    }

    /// Records that a repair frame was written into the packet
    pub fn mark_repair_frame_written(&mut self) -> bool {
        if self.contains_source_frame {
            return false;
        }
        self.contains_repair_frame = true;
        true
    }

    #[inline]
    pub fn packet_contains_source_frame(&self) -> bool {
        self.contains_source_frame
    }

    #[inline]
    pub fn packet_contains_repair_frame(&self) -> bool {
        self.contains_repair_frame
    }

    #[inline]
    pub fn source_id_reserved(&self) -> bool {
        self.source_id_reserved
    }

    /// Finalizes the packet under construction. When it carried the source
    /// FPID frame, the payload is wrapped into a source symbol and
    /// protected; the reservation and frame flags are always cleared.
    pub fn finalize_and_protect_packet(
        &mut self,
        packet_number: u64,
        payload: &[u8],
    ) -> Option<SourceFpid> {
        let source_id = self.current_source_id.take();

        let protected = if self.contains_source_frame {
            source_id.map(|source_id| {
                let symbol = SourceSymbol::from_packet(source_id, packet_number, payload);
                self.protect_source_symbol(symbol);
                source_id
            })
        } else {
            None
        };

        self.source_id_reserved = false;
        self.contains_source_frame = false;
        self.contains_repair_frame = false;

        protected
    }

    /// Records a source symbol in the active block or window, generating
    /// repair symbols when the block fills
    pub fn protect_source_symbol(&mut self, symbol: SourceSymbol) {
        let source_count = self.source_count as usize;
        let close = match &mut self.scheme {
            SchemeSender::Block { symbols, .. } => {
                symbols.push(symbol);
                symbols.len() >= source_count
            }
            SchemeSender::Window { next_id, window } => {
                window.push_back(symbol);
                *next_id = next_id.wrapping_next();
                while window.len() > RECEIVE_BUFFER_MAX_LENGTH {
                    window.pop_front();
                }
                false
            }
        };

        if close {
            self.close_block();
        }
    }

    /// The peer acknowledged everything up to `source_id`; the window no
    /// longer protects those symbols
    pub fn acknowledge(&mut self, source_id: SourceFpid) {
        if let SchemeSender::Window { window, .. } = &mut self.scheme {
            while window
                .front()
                .is_some_and(|symbol| symbol.id() <= source_id)
            {
                window.pop_front();
            }
        }
    }

    /// Forces emission of repair symbols covering the open block or the
    /// current window
    pub fn flush_repair_symbols(&mut self) {
        if matches!(&self.scheme, SchemeSender::Block { .. }) {
            self.close_block();
            return;
        }

        let SchemeSender::Window { window, .. } = &self.scheme else {
            return;
        };
        if window.is_empty() {
            return;
        }

        let start = window
            .front()
            .map(|symbol| symbol.id().0)
            .unwrap_or_default();
        let count = window.len() as u8;
        let repair_count =
            (self.repair_count as usize).min(self.code.max_repair_symbols(window.len()));

        let symbol_size = window.iter().map(|s| s.len()).max().unwrap_or(0);
        let padded: Vec<Vec<u8>> = window
            .iter()
            .map(|symbol| pad(symbol.data(), symbol_size))
            .collect();
        let padded_refs: Vec<&[u8]> = padded.iter().map(|data| data.as_slice()).collect();

        for (offset, data) in self
            .code
            .generate(&padded_refs, repair_count)
            .into_iter()
            .enumerate()
        {
            let id = RepairFpid::new(u24::new_truncated(start), offset as u8);
            self.pending_repairs.push_back((
                RepairSymbol::new(id, data.into()),
                count,
                repair_count as u8,
            ));
        }
    }

    /// The next repair symbol waiting to be written into a repair frame,
    /// along with its block totals
    pub fn next_repair(&mut self) -> Option<(RepairSymbol, u8, u8)> {
        self.pending_repairs.pop_front()
    }

    #[inline]
    pub fn has_pending_repairs(&self) -> bool {
        !self.pending_repairs.is_empty()
    }

    fn close_block(&mut self) {
        let SchemeSender::Block {
            block_number,
            symbols,
        } = &mut self.scheme
        else {
            return;
        };

        let count = symbols.len();
        if count == 0 {
            return;
        }

        let repair_count = (self.repair_count as usize)
            .min(count)
            .min(self.code.max_repair_symbols(count));

        let symbol_size = symbols.iter().map(|s| s.len()).max().unwrap_or(0);
        let padded: Vec<Vec<u8>> = symbols
            .iter()
            .map(|symbol| pad(symbol.data(), symbol_size))
            .collect();
        let padded_refs: Vec<&[u8]> = padded.iter().map(|data| data.as_slice()).collect();

        for (offset, data) in self
            .code
            .generate(&padded_refs, repair_count)
            .into_iter()
            .enumerate()
        {
            let id = RepairFpid::new(*block_number, offset as u8);
            self.pending_repairs.push_back((
                RepairSymbol::new(id, data.into()),
                count as u8,
                repair_count as u8,
            ));
        }

        *block_number = block_number.wrapping_next();
        symbols.clear();
    }
}

fn pad(data: &[u8], size: usize) -> Vec<u8> {
    let mut padded = vec![0u8; size];
    padded[..data.len()].copy_from_slice(data);
    padded
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fec::code;

    fn block_sender(k: u8, r: u8) -> Sender {
        Sender::new(&Config {
            scheme: SchemeKind::Block,
            code: code::Kind::ReedSolomon,
            source_count: k,
            repair_count: r,
        })
    }

    #[test]
    fn fpid_monotone_test() {
        let mut sender = block_sender(3, 1);

        let mut previous = sender.source_fpid();
        for packet_number in 0..10u64 {
            sender.begin_packet().unwrap();
            assert!(sender.mark_source_frame_written());
            sender.finalize_and_protect_packet(packet_number, b"some payload");

            let next = sender.source_fpid();
            assert!(next.0 > previous.0 || next.symbol_offset() == 0);
            previous = next;
        }
    }

    #[test]
    fn frame_exclusion_test() {
        let mut sender = block_sender(3, 1);

        sender.begin_packet().unwrap();
        // only one reservation per packet
        assert!(sender.begin_packet().is_none());

        assert!(sender.mark_source_frame_written());
        assert!(!sender.mark_repair_frame_written());

        sender.finalize_and_protect_packet(1, b"payload");
        assert!(!sender.source_id_reserved());
        assert!(!sender.packet_contains_source_frame());
        assert!(!sender.packet_contains_repair_frame());

        // the other order is refused as well
        sender.begin_packet().unwrap();
        assert!(sender.mark_repair_frame_written());
        assert!(!sender.mark_source_frame_written());
        assert_eq!(sender.finalize_and_protect_packet(2, b"payload"), None);
    }

    #[test]
    fn block_close_generates_repairs_test() {
        let mut sender = block_sender(3, 2);

        for packet_number in 0..3u64 {
            sender.begin_packet().unwrap();
            sender.mark_source_frame_written();
            sender.finalize_and_protect_packet(packet_number, b"packet payload bytes");
        }

        let (repair, nss, nrs) = sender.next_repair().unwrap();
        assert_eq!(nss, 3);
        assert_eq!(nrs, 2);
        assert_eq!(repair.id().symbol_offset(), 0);

        let (repair, _, _) = sender.next_repair().unwrap();
        assert_eq!(repair.id().symbol_offset(), 1);
        assert!(sender.next_repair().is_none());

        // the next block starts at offset zero
        assert_eq!(sender.source_fpid().symbol_offset(), 0);
        assert_eq!(u32::from(sender.source_fpid().block_number()), 1);
    }

    #[test]
    fn flush_closes_partial_block_test() {
        let mut sender = block_sender(5, 2);

        for packet_number in 0..2u64 {
            sender.begin_packet().unwrap();
            sender.mark_source_frame_written();
            sender.finalize_and_protect_packet(packet_number, b"partial block");
        }
        assert!(!sender.has_pending_repairs());

        sender.flush_repair_symbols();
        let (_, nss, nrs) = sender.next_repair().unwrap();
        // repair count is bounded by the symbols actually present
        assert_eq!(nss, 2);
        assert_eq!(nrs, 2);
    }

    #[test]
    fn window_acknowledge_test() {
        let mut sender = Sender::new(&Config {
            scheme: SchemeKind::Window,
            code: code::Kind::ReedSolomon,
            source_count: 4,
            repair_count: 1,
        });

        for packet_number in 0..6u64 {
            sender.begin_packet().unwrap();
            sender.mark_source_frame_written();
            sender.finalize_and_protect_packet(packet_number, b"window payload");
        }

        sender.acknowledge(SourceFpid(3));
        sender.flush_repair_symbols();

        let (repair, nss, _) = sender.next_repair().unwrap();
        // only the unacknowledged tail is covered
        assert_eq!(nss, 2);
        assert_eq!(u32::from(repair.id().block_number()), 4);
    }
}
