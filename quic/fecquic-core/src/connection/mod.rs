// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Per-connection state: identifiers, crypto contexts, paths, spin-bit
//! observables and the FEC frameworks.

pub mod id;

mod error;
mod state;
mod table;

pub use error::ProcessingError;
pub use id::ConnectionId;
pub use state::State;
pub use table::{Handle, Table};

use crate::{
    crypto::{CryptoContext, Epoch},
    fec,
    packet::number::PacketNumberSpace,
    path::{self, Path},
    stateless_reset,
    time::Timestamp,
};
use std::net::SocketAddr;

/// Endpoint state for one QUIC connection
pub struct Connection {
    state: State,
    client_mode: bool,
    version: u32,
    local_id: ConnectionId,
    initial_id: ConnectionId,
    remote_id: Option<ConnectionId>,
    crypto: [Option<CryptoContext>; Epoch::COUNT],
    paths: Vec<Path>,
    retry_token: Vec<u8>,
    reset_token: Option<stateless_reset::Token>,
    current_spin: bool,
    spin_edge: Option<Timestamp>,
    spin_vec: u8,
    handshake_done: bool,
    transport_parameters_received: bool,
    transport_parameters_processed: bool,
    next_wake_time: Option<Timestamp>,
    fec: Option<fec::State>,
}

impl core::fmt::Debug for Connection {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Connection")
            .field("state", &self.state)
            .field("client_mode", &self.client_mode)
            .field("local_id", &self.local_id)
            .field("remote_id", &self.remote_id)
            .field("paths", &self.paths.len())
            .finish_non_exhaustive()
    }
}

impl Connection {
    /// Creates the server-side connection for a newly observed client
    /// Initial. The client-chosen destination connection ID stays
    /// registered as the initial ID; the server issues its own local ID.
    #[allow(clippy::too_many_arguments)]
    pub fn new_server(
        local_connection_id: ConnectionId,
        initial_connection_id: ConnectionId,
        source_connection_id: ConnectionId,
        peer_address: SocketAddr,
        local_address: SocketAddr,
        if_index: u32,
        version: u32,
        initial_crypto: CryptoContext,
        fec: Option<fec::State>,
    ) -> Self {
        let mut connection = Self::new(
            false,
            version,
            local_connection_id,
            initial_connection_id,
            peer_address,
            local_address,
            if_index,
            fec,
        );
        connection.state = State::ServerInit;
        connection.remote_id = Some(source_connection_id);
        connection.crypto[Epoch::Initial.as_index()] = Some(initial_crypto);
        connection
    }

    /// Creates a client connection about to send its first Initial
    #[allow(clippy::too_many_arguments)]
    pub fn new_client(
        initial_connection_id: ConnectionId,
        local_connection_id: ConnectionId,
        peer_address: SocketAddr,
        local_address: SocketAddr,
        if_index: u32,
        version: u32,
        initial_crypto: CryptoContext,
        fec: Option<fec::State>,
    ) -> Self {
        let mut connection = Self::new(
            true,
            version,
            local_connection_id,
            initial_connection_id,
            peer_address,
            local_address,
            if_index,
            fec,
        );
        connection.state = State::ClientInit;
        connection.crypto[Epoch::Initial.as_index()] = Some(initial_crypto);
        connection
    }

    #[allow(clippy::too_many_arguments)]
    fn new(
        client_mode: bool,
        version: u32,
        local_id: ConnectionId,
        initial_id: ConnectionId,
        peer_address: SocketAddr,
        local_address: SocketAddr,
        if_index: u32,
        fec: Option<fec::State>,
    ) -> Self {
        Self {
            state: State::ClientInit,
            client_mode,
            version,
            local_id,
            initial_id,
            remote_id: None,
            crypto: Default::default(),
            paths: vec![Path::new(peer_address, local_address, if_index, local_id)],
            retry_token: Vec::new(),
            reset_token: None,
            current_spin: false,
            spin_edge: None,
            spin_vec: 0,
            handshake_done: false,
            transport_parameters_received: false,
            transport_parameters_processed: false,
            next_wake_time: None,
            fec,
        }
    }

    // === identifiers ===

    #[inline]
    pub fn local_id(&self) -> &ConnectionId {
        &self.local_id
    }

    #[inline]
    pub fn initial_id(&self) -> &ConnectionId {
        &self.initial_id
    }

    #[inline]
    pub fn remote_id(&self) -> Option<&ConnectionId> {
        self.remote_id.as_ref()
    }

    /// Verifies the peer's connection ID, or establishes it when this is
    /// the first packet allowed to do so
    pub(crate) fn establish_remote_id(
        &mut self,
        source_connection_id: &[u8],
    ) -> Result<(), ProcessingError> {
        if let Some(remote_id) = self.remote_id {
            if remote_id == *source_connection_id {
                Ok(())
            } else {
                Err(ProcessingError::CnxidCheck)
            }
        } else {
            let id = ConnectionId::try_from_bytes(source_connection_id)
                .ok_or(ProcessingError::CnxidCheck)?;
            self.remote_id = Some(id);
            Ok(())
        }
    }

    /// Verifies the peer's connection ID matches the one already recorded
    pub(crate) fn verify_remote_id(
        &self,
        source_connection_id: &[u8],
    ) -> Result<(), ProcessingError> {
        match self.remote_id {
            Some(remote_id) if remote_id == *source_connection_id => Ok(()),
            _ => Err(ProcessingError::CnxidCheck),
        }
    }

    /// A Retry replaces the connection ID the next Initial is keyed on
    pub(crate) fn set_initial_id(&mut self, id: ConnectionId) {
        self.initial_id = id;
    }

    /// Returns `true` if `bytes` routes to this connection
    pub fn matches_local_id(&self, bytes: &[u8]) -> bool {
        self.local_id == *bytes || self.initial_id == *bytes
    }

    // === state ===

    #[inline]
    pub fn state(&self) -> State {
        self.state
    }

    #[inline]
    pub(crate) fn set_state(&mut self, state: State) {
        self.state = state;
    }

    #[inline]
    pub fn is_client(&self) -> bool {
        self.client_mode
    }

    #[inline]
    pub fn version(&self) -> u32 {
        self.version
    }

    #[inline]
    pub(crate) fn set_version(&mut self, version: u32) {
        self.version = version;
    }

    #[inline]
    pub fn handshake_done(&self) -> bool {
        self.handshake_done
    }

    #[inline]
    pub(crate) fn set_handshake_done(&mut self) {
        self.handshake_done = true;
    }

    // === crypto ===

    #[inline]
    pub fn crypto(&self, epoch: Epoch) -> Option<&CryptoContext> {
        self.crypto[epoch.as_index()].as_ref()
    }

    /// Installs the crypto context for an epoch, replacing any previous one
    #[inline]
    pub fn set_crypto(&mut self, epoch: Epoch, context: CryptoContext) {
        self.crypto[epoch.as_index()] = Some(context);
    }

    /// Registers the reset token the peer announced for this connection
    #[inline]
    pub fn set_reset_token(&mut self, token: stateless_reset::Token) {
        self.reset_token = Some(token);
    }

    #[inline]
    pub fn reset_token(&self) -> Option<&stateless_reset::Token> {
        self.reset_token.as_ref()
    }

    // === retry ===

    #[inline]
    pub fn retry_token(&self) -> &[u8] {
        &self.retry_token
    }

    /// Retry tokens are single-owner: the previous token is dropped before
    /// the replacement is recorded
    #[inline]
    pub(crate) fn set_retry_token(&mut self, token: &[u8]) {
        self.retry_token.clear();
        self.retry_token.extend_from_slice(token);
    }

    // === paths ===

    #[inline]
    pub fn paths(&self) -> &[Path] {
        &self.paths
    }

    #[inline]
    pub fn path(&self, id: path::Id) -> Option<&Path> {
        self.paths.get(id)
    }

    #[inline]
    pub fn path_mut(&mut self, id: path::Id) -> Option<&mut Path> {
        self.paths.get_mut(id)
    }

    /// Resolves the incoming path by destination connection ID; the packet
    /// routes to a path whose local ID (or the connection's initial ID)
    /// matches
    pub fn incoming_path(&self, destination_connection_id: &[u8]) -> Option<path::Id> {
        if self.initial_id == *destination_connection_id {
            return Some(0);
        }
        self.paths
            .iter()
            .position(|path| path.local_connection_id == *destination_connection_id)
    }

    /// Clears the ack-needed flag of `space` on every path, acknowledging
    /// the space implicitly
    pub(crate) fn implicit_ack(&mut self, space: PacketNumberSpace) {
        for path in &mut self.paths {
            path.context_mut(space).ack_needed = false;
        }
    }

    // === spin bit ===

    /// Observes the spin bit of a 1-RTT packet that advanced the highest
    /// packet number
    pub(crate) fn update_spin(&mut self, spin: bool, now: Timestamp) {
        let observed = spin ^ self.client_mode;
        if observed != self.current_spin {
            self.current_spin = observed;
            self.spin_edge = Some(now);
            self.spin_vec = (self.spin_vec + 1).min(3);
        }
    }

    #[inline]
    pub fn spin_vec(&self) -> u8 {
        self.spin_vec
    }

    #[inline]
    pub fn spin_edge(&self) -> Option<Timestamp> {
        self.spin_edge
    }

    // === transport parameters ===

    /// Called by the frame processor once the peer's transport parameters
    /// have been decoded
    #[inline]
    pub fn mark_transport_parameters_received(&mut self) {
        self.transport_parameters_received = true;
    }

    /// Returns `true` the first time transport parameters are ready to be
    /// applied; subsequent calls return `false`
    pub(crate) fn take_transport_parameters_pending(&mut self) -> bool {
        if self.transport_parameters_received && !self.transport_parameters_processed {
            self.transport_parameters_processed = true;
            true
        } else {
            false
        }
    }

    // === timers ===

    #[inline]
    pub fn next_wake_time(&self) -> Option<Timestamp> {
        self.next_wake_time
    }

    #[inline]
    pub(crate) fn nudge_wake_time(&mut self, now: Timestamp) {
        self.next_wake_time = Some(match self.next_wake_time {
            Some(previous) => previous.min(now),
            None => now,
        });
    }

    // === fec ===

    #[inline]
    pub fn fec(&self) -> Option<&fec::State> {
        self.fec.as_ref()
    }

    #[inline]
    pub fn fec_mut(&mut self) -> Option<&mut fec::State> {
        self.fec.as_mut()
    }
}
