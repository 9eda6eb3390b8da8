// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use crate::fec::{RepairSymbol, SourceSymbol, MAX_FEC_BLOCKS};
use fecquic_codec::u24;

/// One receive-side FEC block accumulating source and repair symbols
#[derive(Debug)]
pub struct Block {
    number: u24,
    /// Total source symbols the block was sent with; learned from repair
    /// frames
    total_source: Option<u8>,
    total_repair: Option<u8>,
    sources: Vec<Option<SourceSymbol>>,
    repairs: Vec<RepairSymbol>,
}

impl Block {
    pub fn new(number: u24) -> Self {
        Self {
            number,
            total_source: None,
            total_repair: None,
            sources: Vec::new(),
            repairs: Vec::new(),
        }
    }

    #[inline]
    pub fn number(&self) -> u24 {
        self.number
    }

    /// Places a source symbol into the slot matching its in-block offset.
    /// Returns `false` for duplicates.
    pub fn insert_source(&mut self, symbol: SourceSymbol) -> bool {
        debug_assert_eq!(symbol.id().block_number(), self.number);

        let offset = symbol.id().symbol_offset() as usize;
        if self.sources.len() <= offset {
            self.sources.resize(offset + 1, None);
        }
        if self.sources[offset].is_some() {
            return false;
        }
        self.sources[offset] = Some(symbol);
        true
    }

    /// Records a repair symbol along with the block totals it announces
    pub fn insert_repair(&mut self, symbol: RepairSymbol, total_source: u8, total_repair: u8) -> bool {
        debug_assert_eq!(symbol.id().block_number(), self.number);

        if self.repairs.iter().any(|repair| repair.id() == symbol.id()) {
            return false;
        }

        self.total_source.get_or_insert(total_source);
        self.total_repair.get_or_insert(total_repair);

        if self.sources.len() < total_source as usize {
            self.sources.resize(total_source as usize, None);
        }

        self.repairs.push(symbol);
        true
    }

    #[inline]
    pub fn total_source(&self) -> Option<u8> {
        self.total_source
    }

    #[inline]
    pub fn total_repair(&self) -> Option<u8> {
        self.total_repair
    }

    #[inline]
    pub fn present_sources(&self) -> usize {
        self.sources.iter().filter(|slot| slot.is_some()).count()
    }

    /// Missing source symbols, once the total is known
    pub fn missing_sources(&self) -> usize {
        match self.total_source {
            Some(total) => total as usize - self.present_sources().min(total as usize),
            None => 0,
        }
    }

    /// The block is decodable when the present source and repair symbols
    /// reach the announced source total
    pub fn is_decodable(&self) -> bool {
        match self.total_source {
            Some(total) => self.present_sources() + self.repairs.len() >= total as usize,
            None => false,
        }
    }

    pub fn sources(&self) -> &[Option<SourceSymbol>] {
        &self.sources
    }

    pub fn repairs(&self) -> &[RepairSymbol] {
        &self.repairs
    }
}

/// Fixed-capacity ring of receive blocks, indexed by block number modulo
/// capacity. Eviction is FIFO by block number: a newer block replaces an
/// older one in its slot; symbols for already-evicted blocks are dropped.
#[derive(Debug)]
pub struct Ring {
    slots: Vec<Option<Block>>,
    evicted: Vec<u24>,
}

impl Default for Ring {
    fn default() -> Self {
        Self::new()
    }
}

impl Ring {
    pub fn new() -> Self {
        let mut slots = Vec::with_capacity(MAX_FEC_BLOCKS);
        slots.resize_with(MAX_FEC_BLOCKS, || None);
        Self {
            slots,
            evicted: Vec::new(),
        }
    }

    /// The block for `number`, creating it (and possibly evicting an older
    /// block) as needed. Returns `None` when `number` is older than the
    /// block currently holding its slot.
    pub fn block_mut(&mut self, number: u24) -> Option<&mut Block> {
        let index = usize::from(number) % MAX_FEC_BLOCKS;
        let slot = &mut self.slots[index];

        match slot {
            Some(block) if block.number() == number => {}
            Some(block) if block.number() > number => return None,
            Some(block) => {
                self.evicted.push(block.number());
                *slot = Some(Block::new(number));
            }
            None => {
                *slot = Some(Block::new(number));
            }
        }

        slot.as_mut()
    }

    /// Removes the block for `number`, when present
    pub fn remove(&mut self, number: u24) -> Option<Block> {
        let index = usize::from(number) % MAX_FEC_BLOCKS;
        let slot = &mut self.slots[index];
        if slot.as_ref()?.number() != number {
            return None;
        }
        slot.take()
    }

    /// Block numbers evicted since the last call
    pub fn take_evicted(&mut self) -> Vec<u24> {
        core::mem::take(&mut self.evicted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fec::symbol::{RepairFpid, SourceFpid};
    use bytes::Bytes;

    fn source(block: u32, offset: u8) -> SourceSymbol {
        SourceSymbol::new(
            SourceFpid::new(u24::new_truncated(block), offset),
            Bytes::from_static(b"data"),
        )
    }

    fn repair(block: u32, offset: u8) -> RepairSymbol {
        RepairSymbol::new(
            RepairFpid::new(u24::new_truncated(block), offset),
            Bytes::from_static(b"data"),
        )
    }

    #[test]
    fn decodable_test() {
        let mut block = Block::new(u24::new_truncated(1));
        assert!(!block.is_decodable());

        assert!(block.insert_source(source(1, 0)));
        assert!(!block.insert_source(source(1, 0)));
        assert!(block.insert_source(source(1, 2)));

        // totals unknown until a repair arrives
        assert!(!block.is_decodable());

        assert!(block.insert_repair(repair(1, 0), 3, 1));
        assert!(block.is_decodable());
        assert_eq!(block.missing_sources(), 1);
    }

    #[test]
    fn ring_eviction_test() {
        let mut ring = Ring::new();

        let old = u24::new_truncated(3);
        let colliding = u24::new_truncated(3 + MAX_FEC_BLOCKS as u32);

        assert!(ring.block_mut(old).unwrap().insert_source(source(3, 0)));
        assert!(ring.take_evicted().is_empty());

        // the colliding newer block evicts the old one
        assert!(ring.block_mut(colliding).is_some());
        assert_eq!(ring.take_evicted(), vec![old]);

        // symbols for the evicted block are now rejected
        assert!(ring.block_mut(old).is_none());

        // no double free: the old block is gone
        assert!(ring.remove(old).is_none());
        assert!(ring.remove(colliding).is_some());
        assert!(ring.remove(colliding).is_none());
    }
}
