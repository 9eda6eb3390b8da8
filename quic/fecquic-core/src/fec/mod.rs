// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Forward-error-correction sublayer.
//!
//! Outgoing protected packets are wrapped into source symbols; repair
//! symbols generated by an erasure code travel in repair frames. On the
//! receive side, symbols accumulate per block (or sliding window) until
//! enough are present to reconstruct the missing ones, whose payloads are
//! re-injected through the frame decoder.

pub mod block;
pub mod code;
pub mod frame;
pub mod gf256;
pub mod receiver;
pub mod sender;
pub mod symbol;

pub use receiver::{Receiver, RecoveredPacket};
pub use sender::Sender;
pub use symbol::{RepairFpid, RepairSymbol, SourceFpid, SourceSymbol};

/// Capacity of the receive-side block ring
pub const MAX_FEC_BLOCKS: usize = 64;

/// Upper bound on the sliding window of in-transit source symbols
pub const RECEIVE_BUFFER_MAX_LENGTH: usize = 64;

/// At most this many missing symbols are materialized per recovery pass
pub const MAX_RECOVERED_IN_ONE_ROW: usize = 5;

/// Recovered symbols at or below this size are not worth re-parsing
pub const MIN_DECODED_SYMBOL_TO_PARSE: usize = 50;

/// Which symbol-selection scheme a connection runs
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SchemeKind {
    /// Fixed (n, k) blocks closed in send order
    Block,
    /// Sliding window over the in-transit symbols
    Window,
}

/// FEC parameters for one connection
#[derive(Clone, Copy, Debug)]
pub struct Config {
    pub scheme: SchemeKind,
    pub code: code::Kind,
    /// Source symbols per block (k)
    pub source_count: u8,
    /// Repair symbols per block (n - k)
    pub repair_count: u8,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            scheme: SchemeKind::Block,
            code: code::Kind::ReedSolomon,
            source_count: 5,
            repair_count: 2,
        }
    }
}

/// Per-connection FEC state: the sender and receiver frameworks plus the
/// bookkeeping that ties symbols to the packet currently being processed
pub struct State {
    pub sender: Sender,
    pub receiver: Receiver,
    pending_source_id: Option<SourceFpid>,
}

impl core::fmt::Debug for State {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("State")
            .field("pending_source_id", &self.pending_source_id)
            .finish_non_exhaustive()
    }
}

impl State {
    /// Creates the sender and receiver frameworks together; both exist or
    /// neither does
    pub fn new(config: &Config) -> Self {
        Self {
            sender: Sender::new(config),
            receiver: Receiver::new(config),
            pending_source_id: None,
        }
    }

    /// Called by the frame processor when the payload being decoded carries
    /// a source FPID frame; the enclosing packet is a source symbol
    pub fn on_source_fpid_frame(&mut self, frame: frame::SourceFpidFrame) {
        self.pending_source_id = Some(frame.source_id);
    }

    /// Called by the frame processor for each repair frame it decodes
    pub fn on_repair_frame(&mut self, frame: &frame::RepairFrame<'_>) {
        let symbol = RepairSymbol::new(
            frame.repair_id,
            bytes::Bytes::copy_from_slice(frame.data),
        );
        self.receiver
            .receive_repair_symbol(symbol, frame.source_count, frame.repair_count);
    }

    /// The source FPID announced by the payload just decoded, if any
    pub(crate) fn take_pending_source_id(&mut self) -> Option<SourceFpid> {
        self.pending_source_id.take()
    }
}
