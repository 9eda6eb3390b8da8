// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Receive-side symbol bookkeeping and recovery scheduling.
//!
//! Source and repair symbols accumulate per block (or per window range)
//! until the block becomes decodable; the erasure code then materializes
//! the missing symbols, whose packet payloads are queued for re-injection
//! through the frame decoder.

use crate::fec::{
    block::Ring,
    code::ErasureCode,
    symbol::{RepairSymbol, SourceSymbol},
    Config, SchemeKind, MAX_RECOVERED_IN_ONE_ROW, MIN_DECODED_SYMBOL_TO_PARSE,
    RECEIVE_BUFFER_MAX_LENGTH,
};
use bytes::Bytes;
use fecquic_codec::u24;
use std::collections::{BTreeMap, VecDeque};

/// A reconstructed packet, ready to be fed back through the frame decoder
#[derive(Clone, Debug)]
pub struct RecoveredPacket {
    /// Packet number recorded in the symbol prefix
    pub packet_number: u64,
    /// Payload past the symbol prefix; zero padding decodes as PADDING
    pub payload: Bytes,
}

pub struct Receiver {
    code: ErasureCode,
    scheme: SchemeReceiver,
    recovered: VecDeque<RecoveredPacket>,
    evicted: VecDeque<u32>,
    recovered_count: u64,
    evicted_count: u64,
}

enum SchemeReceiver {
    Block {
        ring: Ring,
    },
    Window {
        symbols: BTreeMap<u32, SourceSymbol>,
        /// Repair symbols with their announced totals, keyed by the first
        /// covered source FPID
        repairs: BTreeMap<u32, Vec<(RepairSymbol, u8, u8)>>,
    },
}

impl Receiver {
    pub fn new(config: &Config) -> Self {
        let scheme = match config.scheme {
            SchemeKind::Block => SchemeReceiver::Block { ring: Ring::new() },
            SchemeKind::Window => SchemeReceiver::Window {
                symbols: BTreeMap::new(),
                repairs: BTreeMap::new(),
            },
        };

        Self {
            code: ErasureCode::new(config.code),
            scheme,
            recovered: VecDeque::new(),
            evicted: VecDeque::new(),
            recovered_count: 0,
            evicted_count: 0,
        }
    }

    /// Places a received source symbol into its block or window; may make
    /// a block decodable and trigger recovery
    pub fn receive_source_symbol(&mut self, symbol: SourceSymbol) {
        match &mut self.scheme {
            SchemeReceiver::Block { ring } => {
                let number = symbol.id().block_number();
                let Some(block) = ring.block_mut(number) else {
                    return;
                };
                block.insert_source(symbol);
                self.note_evictions();
                self.try_recover_block(number);
            }
            SchemeReceiver::Window { symbols, .. } => {
                let id = symbol.id().0;
                symbols.insert(id, symbol);
                while symbols.len() > RECEIVE_BUFFER_MAX_LENGTH {
                    symbols.pop_first();
                }
                self.try_recover_windows();
            }
        }
    }

    /// Records a repair symbol with the block totals it announces
    pub fn receive_repair_symbol(&mut self, symbol: RepairSymbol, nss: u8, nrs: u8) {
        match &mut self.scheme {
            SchemeReceiver::Block { ring } => {
                let number = symbol.id().block_number();
                let Some(block) = ring.block_mut(number) else {
                    return;
                };
                block.insert_repair(symbol, nss, nrs);
                self.note_evictions();
                self.try_recover_block(number);
            }
            SchemeReceiver::Window { repairs, .. } => {
                let start = u32::from(symbol.id().block_number());
                repairs.entry(start).or_default().push((symbol, nss, nrs));
                self.try_recover_windows();
            }
        }
    }

    /// The next reconstructed packet, in recovery order
    pub fn take_recovered(&mut self) -> Option<RecoveredPacket> {
        self.recovered.pop_front()
    }

    /// The next evicted block number, for observers
    pub fn take_evicted_block(&mut self) -> Option<u32> {
        self.evicted.pop_front()
    }

    /// Total symbols reconstructed so far
    #[inline]
    pub fn recovered_count(&self) -> u64 {
        self.recovered_count
    }

    /// Blocks evicted before they completed; their unrecovered data is lost
    #[inline]
    pub fn evicted_count(&self) -> u64 {
        self.evicted_count
    }

    fn note_evictions(&mut self) {
        let SchemeReceiver::Block { ring } = &mut self.scheme else {
            return;
        };
        for number in ring.take_evicted() {
            self.evicted_count += 1;
            self.evicted.push_back(u32::from(number));
        }
    }

    fn try_recover_block(&mut self, number: u24) {
        let SchemeReceiver::Block { ring } = &mut self.scheme else {
            return;
        };

        let decodable = ring
            .block_mut(number)
            .map(|block| block.is_decodable() && block.missing_sources() > 0)
            .unwrap_or(false);
        if !decodable {
            return;
        }

        // the block leaves the ring before decoding; recovery frees it
        let Some(block) = ring.remove(number) else {
            return;
        };
        let Some(total_source) = block.total_source() else {
            return;
        };
        let total_source = total_source as usize;

        let symbol_size = block
            .sources()
            .iter()
            .flatten()
            .map(|symbol| symbol.len())
            .chain(block.repairs().iter().map(|repair| repair.len()))
            .max()
            .unwrap_or(0);

        let mut slots: Vec<Option<Vec<u8>>> = block
            .sources()
            .iter()
            .map(|slot| {
                slot.as_ref()
                    .map(|symbol| pad(symbol.data(), symbol_size))
            })
            .collect();
        slots.resize(slots.len().max(total_source), None);

        let padded_repairs: Vec<Vec<u8>> = block
            .repairs()
            .iter()
            .map(|repair| pad(repair.data(), symbol_size))
            .collect();
        let repairs: Vec<(usize, &[u8])> = block
            .repairs()
            .iter()
            .zip(&padded_repairs)
            .map(|(repair, data)| (repair.id().symbol_offset() as usize, data.as_slice()))
            .collect();

        let offsets = self.code.recover(
            total_source,
            &mut slots,
            &repairs,
            MAX_RECOVERED_IN_ONE_ROW,
        );

        for offset in offsets {
            if let Some(data) = slots[offset].take() {
                self.queue_recovered(data);
            }
        }
    }

    fn try_recover_windows(&mut self) {
        let SchemeReceiver::Window { symbols, repairs } = &mut self.scheme else {
            return;
        };

        let ranges: Vec<u32> = repairs.keys().copied().collect();
        let mut decoded = Vec::new();

        for start in ranges {
            let Some(range_repairs) = repairs.get(&start) else {
                continue;
            };
            let Some(&(_, nss, _)) = range_repairs.first() else {
                continue;
            };
            let total_source = nss as usize;
            let end = start + total_source as u32;

            let present: Vec<&SourceSymbol> = symbols
                .range(start..end)
                .map(|(_, symbol)| symbol)
                .collect();
            let missing = total_source - present.len();
            if missing == 0 || present.len() + range_repairs.len() < total_source {
                continue;
            }

            let symbol_size = present
                .iter()
                .map(|symbol| symbol.len())
                .chain(range_repairs.iter().map(|(repair, _, _)| repair.len()))
                .max()
                .unwrap_or(0);

            let mut slots: Vec<Option<Vec<u8>>> = (0..total_source)
                .map(|offset| {
                    symbols
                        .get(&(start + offset as u32))
                        .map(|symbol| pad(symbol.data(), symbol_size))
                })
                .collect();

            let padded_repairs: Vec<Vec<u8>> = range_repairs
                .iter()
                .map(|(repair, _, _)| pad(repair.data(), symbol_size))
                .collect();
            let repair_refs: Vec<(usize, &[u8])> = range_repairs
                .iter()
                .zip(&padded_repairs)
                .map(|((repair, _, _), data)| {
                    (repair.id().symbol_offset() as usize, data.as_slice())
                })
                .collect();

            let offsets = self.code.recover(
                total_source,
                &mut slots,
                &repair_refs,
                MAX_RECOVERED_IN_ONE_ROW,
            );

            for offset in offsets {
                if let Some(data) = slots[offset].take() {
                    decoded.push(data);
                }
            }
            repairs.remove(&start);
        }

        for data in decoded {
            self.queue_recovered(data);
        }
    }

    fn queue_recovered(&mut self, data: Vec<u8>) {
        self.recovered_count += 1;

        if data.len() <= MIN_DECODED_SYMBOL_TO_PARSE {
            return;
        }

        let symbol = SourceSymbol::new(Default::default(), data.into());
        let Some(packet_number) = symbol.packet_number() else {
            return;
        };

        self.recovered.push_back(RecoveredPacket {
            packet_number,
            payload: Bytes::copy_from_slice(symbol.packet_payload()),
        });
    }
}

impl core::fmt::Debug for Receiver {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Receiver")
            .field("recovered_count", &self.recovered_count)
            .field("evicted_count", &self.evicted_count)
            .finish_non_exhaustive()
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
    use crate::fec::{code, symbol::SourceFpid, Sender};

    fn pair(scheme: SchemeKind, k: u8, r: u8) -> (Sender, Receiver) {
        let config = Config {
            scheme,
            code: code::Kind::ReedSolomon,
            source_count: k,
            repair_count: r,
        };
        (Sender::new(&config), Receiver::new(&config))
    }

    fn protect_packets(sender: &mut Sender, count: u64) -> Vec<SourceSymbol> {
        (0..count)
            .map(|packet_number| {
                let frame = sender.begin_packet().unwrap();
                sender.mark_source_frame_written();
                let payload = vec![packet_number as u8 + 1; 64];
                sender.finalize_and_protect_packet(packet_number + 100, &payload);
                SourceSymbol::from_packet(frame.source_id, packet_number + 100, &payload)
            })
            .collect()
    }

    #[test]
    fn block_recovery_test() {
        let (mut sender, mut receiver) = pair(SchemeKind::Block, 5, 2);
        let symbols = protect_packets(&mut sender, 5);

        // deliver S0, S2, S4 and both repairs
        receiver.receive_source_symbol(symbols[0].clone());
        receiver.receive_source_symbol(symbols[2].clone());
        receiver.receive_source_symbol(symbols[4].clone());
        assert!(receiver.take_recovered().is_none());

        let (repair, nss, nrs) = sender.next_repair().unwrap();
        receiver.receive_repair_symbol(repair, nss, nrs);
        assert!(receiver.take_recovered().is_none());

        let (repair, nss, nrs) = sender.next_repair().unwrap();
        receiver.receive_repair_symbol(repair.clone(), nss, nrs);

        let first = receiver.take_recovered().unwrap();
        let second = receiver.take_recovered().unwrap();
        assert!(receiver.take_recovered().is_none());

        assert_eq!(first.packet_number, 101);
        assert_eq!(&first.payload[..], symbols[1].packet_payload());
        assert_eq!(second.packet_number, 103);
        assert_eq!(&second.payload[..], symbols[3].packet_payload());

        assert_eq!(receiver.recovered_count(), 2);

        // the block was freed: replaying a repair cannot recover again
        receiver.receive_repair_symbol(repair, nss, nrs);
        assert!(receiver.take_recovered().is_none());
        assert_eq!(receiver.recovered_count(), 2);
    }

    #[test]
    fn small_symbols_not_reinjected_test() {
        let (mut sender, mut receiver) = pair(SchemeKind::Block, 2, 1);

        for packet_number in 0..2u64 {
            sender.begin_packet().unwrap();
            sender.mark_source_frame_written();
            // well under MIN_DECODED_SYMBOL_TO_PARSE
            sender.finalize_and_protect_packet(packet_number, b"tiny");
        }

        let frame_id = SourceFpid::new(u24::ZERO, 0);
        receiver.receive_source_symbol(SourceSymbol::from_packet(frame_id, 0, b"tiny"));

        let (repair, nss, nrs) = sender.next_repair().unwrap();
        receiver.receive_repair_symbol(repair, nss, nrs);

        // recovered, but too small to re-parse
        assert_eq!(receiver.recovered_count(), 1);
        assert!(receiver.take_recovered().is_none());
    }

    #[test]
    fn window_recovery_test() {
        let (mut sender, mut receiver) = pair(SchemeKind::Window, 4, 1);
        let symbols = protect_packets(&mut sender, 4);
        sender.flush_repair_symbols();

        receiver.receive_source_symbol(symbols[0].clone());
        receiver.receive_source_symbol(symbols[1].clone());
        receiver.receive_source_symbol(symbols[3].clone());

        let (repair, nss, nrs) = sender.next_repair().unwrap();
        receiver.receive_repair_symbol(repair, nss, nrs);

        let recovered = receiver.take_recovered().unwrap();
        assert_eq!(recovered.packet_number, 102);
        assert_eq!(&recovered.payload[..], symbols[2].packet_payload());
    }

    #[test]
    fn eviction_counter_test() {
        let (_, mut receiver) = pair(SchemeKind::Block, 5, 2);

        let colliding = 3 + crate::fec::MAX_FEC_BLOCKS as u32;
        receiver.receive_source_symbol(SourceSymbol::from_packet(
            SourceFpid::new(u24::new_truncated(3), 0),
            1,
            &[0; 64],
        ));
        receiver.receive_source_symbol(SourceSymbol::from_packet(
            SourceFpid::new(u24::new_truncated(colliding), 0),
            2,
            &[0; 64],
        ));

        assert_eq!(receiver.evicted_count(), 1);
        assert_eq!(receiver.take_evicted_block(), Some(3));
        assert!(receiver.take_evicted_block().is_none());
    }
}
