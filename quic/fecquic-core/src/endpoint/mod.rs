// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Datagram ingress.
//!
//! [`Endpoint::incoming_packet`] splits a datagram into coalesced segments
//! and walks each through header parsing, connection resolution, packet
//! protection removal, duplicate detection and the per-type handlers.
//! Responses that need no connection state (version negotiation, stateless
//! reset, retry) are queued as stateless packets for the socket layer.

mod handlers;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

#[cfg(test)]
mod tests;

use crate::{
    connection::{self, id::ConnectionInfo, Connection, ProcessingError},
    crypto::{tls, CryptoContext, Epoch},
    event::{self, Subscriber as _},
    fec, frame,
    packet::{
        long::VERSION_DRAFT_29,
        number::{PacketNumber, PacketNumberSpace},
        short::{CleartextShort, ProtectedShort},
        stateless_reset::{self, RESET_PACKET_MIN_SIZE},
        version_negotiation::{SupportedVersions, VersionNegotiation},
        ProtectedPacket,
    },
    path,
    random::{self, Generator},
    stateless_reset::{Token, RESET_SECRET_SIZE},
    token,
    time::Timestamp,
    varint::VarInt,
};
use fecquic_codec::{DecoderBufferMut, EncoderValue};
use std::{collections::VecDeque, net::SocketAddr};

/// Which side of connections this endpoint drives
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Type {
    Client,
    Server,
}

/// Endpoint-wide configuration
#[derive(Clone, Debug)]
pub struct Config {
    pub endpoint_type: Type,
    /// Versions this endpoint accepts, in preference order
    pub supported_versions: Vec<u32>,
    /// Length of locally issued connection IDs; `None` routes short
    /// headers by peer address instead
    pub local_connection_id_len: Option<u8>,
    /// Require a valid retry token on every client Initial
    pub enforce_retry_tokens: bool,
    /// Key deriving the stateless reset token of a connection ID
    pub reset_secret: [u8; RESET_SECRET_SIZE],
    /// FEC parameters applied to new connections
    pub fec: Option<fec::Config>,
}

impl Config {
    pub fn builder(endpoint_type: Type) -> Builder {
        Builder {
            config: Config {
                endpoint_type,
                supported_versions: vec![VERSION_DRAFT_29],
                local_connection_id_len: Some(8),
                enforce_retry_tokens: false,
                reset_secret: [0; RESET_SECRET_SIZE],
                fec: None,
            },
        }
    }

    fn version_index(&self, version: u32) -> Option<usize> {
        self.supported_versions
            .iter()
            .position(|supported| *supported == version)
    }
}

#[derive(Debug)]
pub struct Builder {
    config: Config,
}

impl Builder {
    pub fn with_supported_versions(mut self, versions: &[u32]) -> Self {
        self.config.supported_versions = versions.to_vec();
        self
    }

    pub fn with_local_connection_id_len(mut self, len: Option<u8>) -> Self {
        self.config.local_connection_id_len = len;
        self
    }

    pub fn with_retry_tokens(mut self, enforce: bool) -> Self {
        self.config.enforce_retry_tokens = enforce;
        self
    }

    pub fn with_reset_secret(mut self, secret: [u8; RESET_SECRET_SIZE]) -> Self {
        self.config.reset_secret = secret;
        self
    }

    pub fn with_fec(mut self, fec: Option<fec::Config>) -> Self {
        self.config.fec = fec;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}

/// The collaborators one datagram needs, bundled so the driver loop passes
/// a single context
pub trait Context {
    type Frames: frame::Processor;
    type Tls: tls::Session;
    type Token: token::Format;
    type Random: random::Generator;
    type Events: event::Subscriber;

    fn frames(&mut self) -> &mut Self::Frames;
    fn tls(&mut self) -> &mut Self::Tls;
    fn token(&mut self) -> &mut Self::Token;
    fn random(&mut self) -> &mut Self::Random;
    fn events(&mut self) -> &mut Self::Events;

    /// Derives the crypto context protecting Initial packets for
    /// `destination_connection_id`
    fn initial_crypto(&mut self, version: u32, destination_connection_id: &[u8]) -> CryptoContext;
}

/// A connectionless response waiting for the socket layer
#[derive(Clone, Debug)]
pub struct StatelessPacket {
    pub remote_address: SocketAddr,
    pub payload: Vec<u8>,
}

/// Result of processing one datagram
#[derive(Debug)]
pub struct Outcome {
    /// Disposition of the datagram; errors normalize to "dropped" at this
    /// boundary, detail flows through the event subscriber
    pub result: Result<(), ProcessingError>,
    /// A new connection context was created for this datagram
    pub new_connection: bool,
}

/// Per-segment facts captured before parsing consumes the buffer
pub(crate) struct SegmentContext {
    pub first_byte: u8,
    pub reset_tail: Option<[u8; crate::stateless_reset::token::LEN]>,
    pub segment_len: usize,
    pub datagram_len: usize,
    pub remote_address: SocketAddr,
    pub local_address: SocketAddr,
    pub if_index: u32,
    pub now: Timestamp,
}

/// Removes header protection and decrypts a long packet, expanding its
/// packet number against the path's highest accepted
macro_rules! remove_protection {
    ($connection:ident, $packet:ident, $epoch:expr, $path_id:expr) => {{
        let crypto = $connection
            .crypto($epoch)
            .ok_or(ProcessingError::UnexpectedPacket)?;
        let space = $epoch.space();
        let largest = $connection
            .path($path_id)
            .and_then(|path| path.context(space).largest());
        let expand_base = largest.unwrap_or_else(|| space.new_packet_number(VarInt::ZERO));

        let encrypted = $packet.unprotect(&*crypto.header_key, expand_base)?;
        let packet_number = encrypted.packet_number;
        let cleartext = encrypted.decrypt(&*crypto.key)?;
        (packet_number, cleartext)
    }};
}

pub struct Endpoint {
    config: Config,
    connections: connection::Table,
    pending_stateless: VecDeque<StatelessPacket>,
}

impl Endpoint {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            connections: connection::Table::new(),
            pending_stateless: VecDeque::new(),
        }
    }

    #[inline]
    pub fn config(&self) -> &Config {
        &self.config
    }

    #[inline]
    pub fn connections(&self) -> &connection::Table {
        &self.connections
    }

    #[inline]
    pub fn connections_mut(&mut self) -> &mut connection::Table {
        &mut self.connections
    }

    /// Registers a locally created (client) connection
    pub fn add_connection(&mut self, connection: Connection) -> connection::Handle {
        self.connections.insert(connection)
    }

    /// The next queued connectionless response
    pub fn poll_stateless_packet(&mut self) -> Option<StatelessPacket> {
        self.pending_stateless.pop_front()
    }

    /// Processes one UDP datagram, walking its coalesced segments in wire
    /// order. Each segment consumes exactly its header and payload bytes.
    pub fn incoming_packet<Cx: Context>(
        &mut self,
        cx: &mut Cx,
        payload: &mut [u8],
        remote_address: SocketAddr,
        local_address: SocketAddr,
        if_index: u32,
        now: Timestamp,
    ) -> Outcome {
        let datagram_len = payload.len();
        let mut new_connection = false;
        let mut result = Ok(());

        let mut buffer = DecoderBufferMut::new(payload);

        while !buffer.is_empty() {
            let segment_len = buffer.len();
            let first_byte = match buffer.peek_byte(0) {
                Ok(byte) => byte,
                Err(_) => break,
            };
            let reset_tail = reset_token_tail(&buffer);

            let connection_info = ConnectionInfo::new(&remote_address);
            let local_id_len = self.config.local_connection_id_len.unwrap_or(0) as usize;

            let (packet, remaining) =
                match ProtectedPacket::decode(buffer, &connection_info, &local_id_len) {
                    Ok(decoded) => decoded,
                    Err(error) => {
                        // segmentation is lost once a header fails to parse
                        tracing::debug!(%error, len = segment_len, "malformed segment");
                        cx.events().on_packet_dropped(&event::PacketDropped {
                            reason: "malformed header",
                            len: segment_len,
                        });
                        result = Err(ProcessingError::MalformedHeader(error));
                        break;
                    }
                };

            let consumed = segment_len - remaining.len();
            cx.events().on_header_parsed(&event::HeaderParsed {
                packet_kind: packet_kind(&packet),
                consumed,
            });

            let segment = SegmentContext {
                first_byte,
                reset_tail,
                segment_len: consumed,
                datagram_len,
                remote_address,
                local_address,
                if_index,
                now,
            };

            if let Err(error) = self.on_segment(cx, packet, &segment, &mut new_connection) {
                if error.is_benign() {
                    tracing::trace!(%error, "segment dropped");
                } else {
                    tracing::debug!(%error, "segment failed");
                }
                cx.events().on_packet_dropped(&event::PacketDropped {
                    reason: error.name(),
                    len: segment.segment_len,
                });
                result = Err(error);
            }

            buffer = remaining;
        }

        Outcome {
            result,
            new_connection,
        }
    }

    fn on_segment<Cx: Context>(
        &mut self,
        cx: &mut Cx,
        packet: ProtectedPacket<'_>,
        segment: &SegmentContext,
        new_connection: &mut bool,
    ) -> Result<(), ProcessingError> {
        let handle = self
            .connections
            .by_id(packet.destination_connection_id())
            .or_else(|| {
                // with no configured connection ID length, fall back to
                // routing by peer address
                if self.config.local_connection_id_len.is_none() {
                    self.connections.by_address(&segment.remote_address)
                } else {
                    None
                }
            });

        match handle {
            Some(handle) => self.on_connection_segment(cx, handle, packet, segment),
            None => self.on_unmatched_segment(cx, packet, segment, new_connection),
        }
    }

    /// A segment that resolved to no connection: negotiate the version,
    /// accept a new Initial, or answer with a stateless reset
    fn on_unmatched_segment<Cx: Context>(
        &mut self,
        cx: &mut Cx,
        packet: ProtectedPacket<'_>,
        segment: &SegmentContext,
        new_connection: &mut bool,
    ) -> Result<(), ProcessingError> {
        if let Some(version) = packet.version() {
            if self.config.version_index(version).is_none() && version != 0 {
                return self.queue_version_negotiation(cx, &packet, segment);
            }
        }

        match packet {
            ProtectedPacket::Initial(packet) => {
                if self.config.endpoint_type != Type::Server {
                    return Err(ProcessingError::UnexpectedPacket);
                }

                //= https://www.rfc-editor.org/rfc/rfc9000#section-14.1
                //# A server MUST discard an Initial packet that is carried in a UDP
                //# datagram with a payload that is smaller than the smallest allowed
                //# maximum datagram size of 1200 bytes.
                if segment.datagram_len < path::ENFORCED_INITIAL_MTU {
                    return Err(ProcessingError::InitialTooShort);
                }

                let initial_connection_id =
                    connection::ConnectionId::try_from_bytes(packet.destination_connection_id())
                        .ok_or(ProcessingError::CnxidCheck)?;
                let source_connection_id =
                    connection::ConnectionId::try_from_bytes(packet.source_connection_id())
                        .ok_or(ProcessingError::CnxidCheck)?;

                // the server issues its own local connection ID; the
                // client-chosen one keeps routing the handshake
                let mut local_id_bytes = [0u8; connection::id::MAX_LEN];
                let local_id_len = self.config.local_connection_id_len.unwrap_or(0) as usize;
                cx.random()
                    .public_random_fill(&mut local_id_bytes[..local_id_len]);
                let local_connection_id =
                    connection::ConnectionId::try_from_bytes(&local_id_bytes[..local_id_len])
                        .ok_or(ProcessingError::CnxidCheck)?;

                let initial_crypto =
                    cx.initial_crypto(packet.version, initial_connection_id.as_bytes());
                let connection = Connection::new_server(
                    local_connection_id,
                    initial_connection_id,
                    source_connection_id,
                    segment.remote_address,
                    segment.local_address,
                    segment.if_index,
                    packet.version,
                    initial_crypto,
                    self.config.fec.as_ref().map(fec::State::new),
                );

                let handle = self.connections.insert(connection);
                *new_connection = true;

                match self.on_connection_segment(cx, handle, ProtectedPacket::Initial(packet), segment)
                {
                    Err(ProcessingError::AeadCheck) => {
                        // the transient Initial context never held real state
                        self.connections.remove(handle);
                        *new_connection = false;
                        Err(ProcessingError::ConnectionDeleted)
                    }
                    other => other,
                }
            }
            ProtectedPacket::Short(packet) => {
                let destination_connection_id = packet.destination_connection_id();
                self.queue_stateless_reset(cx, segment, destination_connection_id)
            }
            _ => Err(ProcessingError::UnexpectedPacket),
        }
    }

    fn queue_version_negotiation<Cx: Context>(
        &mut self,
        cx: &mut Cx,
        packet: &ProtectedPacket<'_>,
        segment: &SegmentContext,
    ) -> Result<(), ProcessingError> {
        let source_connection_id = packet
            .source_connection_id()
            .ok_or(ProcessingError::UnexpectedPacket)?;

        let mut unused = [0u8; 1];
        cx.random().public_random_fill(&mut unused);

        let response = VersionNegotiation {
            tag: unused[0],
            destination_connection_id: source_connection_id,
            source_connection_id: packet.destination_connection_id(),
            supported_versions: SupportedVersions(&self.config.supported_versions),
        };

        self.pending_stateless.push_back(StatelessPacket {
            remote_address: segment.remote_address,
            payload: response.encode_to_vec(),
        });
        cx.events()
            .on_version_negotiation_sent(&event::VersionNegotiationSent {
                peer_address: segment.remote_address,
            });
        Ok(())
    }

    /// Answers an unmatched 1-RTT-looking packet with a stateless reset
    /// carrying the token its destination connection ID derives to
    fn queue_stateless_reset<Cx: Context>(
        &mut self,
        cx: &mut Cx,
        segment: &SegmentContext,
        destination_connection_id: &[u8],
    ) -> Result<(), ProcessingError> {
        if destination_connection_id.is_empty() || segment.segment_len < RESET_PACKET_MIN_SIZE {
            return Err(ProcessingError::UnexpectedPacket);
        }

        let token = Token::derive(&self.config.reset_secret, destination_connection_id);

        let mut packet_buf = vec![0u8; segment.segment_len.max(stateless_reset::MIN_EMITTED_LEN)];
        let packet_len = stateless_reset::encode_packet(
            token,
            segment.first_byte,
            segment.segment_len,
            cx.random(),
            &mut packet_buf,
        )
        .ok_or(ProcessingError::UnexpectedPacket)?;
        packet_buf.truncate(packet_len);

        self.pending_stateless.push_back(StatelessPacket {
            remote_address: segment.remote_address,
            payload: packet_buf,
        });
        cx.events()
            .on_stateless_reset_sent(&event::StatelessResetSent {
                peer_address: segment.remote_address,
            });
        Ok(())
    }

    /// Removes packet protection and dispatches to the per-type handler
    fn on_connection_segment<Cx: Context>(
        &mut self,
        cx: &mut Cx,
        handle: connection::Handle,
        packet: ProtectedPacket<'_>,
        segment: &SegmentContext,
    ) -> Result<(), ProcessingError> {
        let Self {
            config,
            connections,
            pending_stateless,
        } = self;

        let connection = connections
            .get_mut(handle)
            .ok_or(ProcessingError::UnexpectedPacket)?;

        let result = dispatch_packet(config, connection, pending_stateless, cx, packet, segment);

        // record the packet number only after fully successful processing
        let result = result.map(|accepted| {
            if let Some((packet_number, path_id, packet_kind)) = accepted {
                if let Some(path) = connection.path_mut(path_id) {
                    let context = path.context_mut(packet_number.space());
                    let _ = context.window.insert(packet_number);
                    context.ack_needed = true;
                }
                cx.events().on_packet_received(&event::PacketReceived {
                    packet_kind,
                    packet_number: packet_number.as_u64(),
                    epoch: packet_kind_epoch(packet_kind),
                    path: path_id,
                });
            }
        });

        connection.nudge_wake_time(segment.now);
        if connection.take_transport_parameters_pending() {
            cx.events()
                .on_transport_parameters_processed(&event::TransportParametersProcessed {});
        }

        result
    }
}

/// Removes packet protection, checks for duplicates and runs the per-type
/// handler; returns what to record when the segment fully succeeded
fn dispatch_packet<Cx: Context>(
    config: &Config,
    connection: &mut Connection,
    pending_stateless: &mut VecDeque<StatelessPacket>,
    cx: &mut Cx,
    packet: ProtectedPacket<'_>,
    segment: &SegmentContext,
) -> Result<Option<(PacketNumber, path::Id, event::PacketKind)>, ProcessingError> {
    match packet {
        ProtectedPacket::VersionNegotiation(packet) => {
            handlers::on_version_negotiation(config, connection, cx, &packet).map(|()| None)
        }
        ProtectedPacket::Retry(packet) => handlers::on_retry(connection, cx, &packet).map(|()| None),
        ProtectedPacket::Initial(packet) => {
            let epoch = Epoch::Initial;
            let path_id = 0;
            let (packet_number, cleartext) = remove_protection!(connection, packet, epoch, path_id);

            check_duplicate(connection, path_id, epoch.space(), packet_number)?;

            handlers::on_initial(config, connection, pending_stateless, cx, &cleartext, segment)
                .map(|()| Some((packet_number, path_id, event::PacketKind::Initial)))
        }
        ProtectedPacket::Handshake(packet) => {
            let epoch = Epoch::Handshake;
            let path_id = 0;
            let (packet_number, cleartext) = remove_protection!(connection, packet, epoch, path_id);

            check_duplicate(connection, path_id, epoch.space(), packet_number)?;

            handlers::on_handshake(connection, cx, &cleartext, segment)
                .map(|()| Some((packet_number, path_id, event::PacketKind::Handshake)))
        }
        ProtectedPacket::ZeroRtt(packet) => {
            let epoch = Epoch::ZeroRtt;
            let path_id = 0;
            let (packet_number, cleartext) = remove_protection!(connection, packet, epoch, path_id);

            check_duplicate(connection, path_id, epoch.space(), packet_number)?;

            handlers::on_zero_rtt(connection, cx, &cleartext, segment)
                .map(|()| Some((packet_number, path_id, event::PacketKind::ZeroRtt)))
        }
        ProtectedPacket::Short(packet) => {
            let path_id = connection
                .incoming_path(packet.destination_connection_id())
                .ok_or(ProcessingError::CnxidCheck)?;

            match short_remove_protection(connection, packet, path_id) {
                Ok((packet_number, pn_advanced, cleartext)) => {
                    check_duplicate(
                        connection,
                        path_id,
                        PacketNumberSpace::ApplicationData,
                        packet_number,
                    )?;

                    handlers::incoming_encrypted(
                        connection,
                        cx,
                        &cleartext,
                        path_id,
                        packet_number,
                        pn_advanced,
                        segment,
                    )
                    .map(|()| Some((packet_number, path_id, event::PacketKind::OneRtt)))
                }
                Err(error) => {
                    // a failed 1-RTT decrypt ending in the registered reset
                    // token is a stateless reset
                    if let Some(tail) = segment.reset_tail {
                        let token = Token::new(tail);
                        if connection.reset_token() == Some(&token) {
                            connection.set_state(connection::State::Disconnected);
                            cx.events().on_stateless_reset(&event::StatelessReset {});
                            return Err(ProcessingError::StatelessReset);
                        }
                    }
                    Err(error)
                }
            }
        }
    }
}

fn short_remove_protection<'a>(
    connection: &Connection,
    packet: ProtectedShort<'a>,
    path_id: path::Id,
) -> Result<(PacketNumber, bool, CleartextShort<'a>), ProcessingError> {
    let crypto = connection
        .crypto(Epoch::OneRtt)
        .ok_or(ProcessingError::UnexpectedPacket)?;
    let space = PacketNumberSpace::ApplicationData;
    let largest = connection
        .path(path_id)
        .and_then(|path| path.context(space).largest());
    let expand_base = largest.unwrap_or_else(|| space.new_packet_number(VarInt::ZERO));

    let encrypted = packet.unprotect(&*crypto.header_key, expand_base)?;
    let packet_number = encrypted.packet_number;
    let pn_advanced = Some(packet_number) > largest;
    let cleartext = encrypted.decrypt(&*crypto.key)?;

    Ok((packet_number, pn_advanced, cleartext))
}

/// Duplicate packets set `ack_needed` without being recorded or processed
fn check_duplicate(
    connection: &mut Connection,
    path_id: path::Id,
    space: PacketNumberSpace,
    packet_number: PacketNumber,
) -> Result<(), ProcessingError> {
    let path = connection
        .path_mut(path_id)
        .ok_or(ProcessingError::UnexpectedPacket)?;
    let context = path.context_mut(space);

    if context.window.check(packet_number).is_err() {
        context.ack_needed = true;
        return Err(ProcessingError::Duplicate);
    }
    Ok(())
}

fn reset_token_tail(
    buffer: &DecoderBufferMut<'_>,
) -> Option<[u8; crate::stateless_reset::token::LEN]> {
    let len = buffer.len();
    let slice = buffer.as_less_safe_slice();
    let tail = slice.get(len.checked_sub(crate::stateless_reset::token::LEN)?..)?;
    let mut bytes = [0u8; crate::stateless_reset::token::LEN];
    bytes.copy_from_slice(tail);
    Some(bytes)
}

fn packet_kind(packet: &ProtectedPacket<'_>) -> event::PacketKind {
    match packet {
        ProtectedPacket::Initial(_) => event::PacketKind::Initial,
        ProtectedPacket::ZeroRtt(_) => event::PacketKind::ZeroRtt,
        ProtectedPacket::Handshake(_) => event::PacketKind::Handshake,
        ProtectedPacket::Retry(_) => event::PacketKind::Retry,
        ProtectedPacket::VersionNegotiation(_) => event::PacketKind::VersionNegotiation,
        ProtectedPacket::Short(_) => event::PacketKind::OneRtt,
    }
}

fn packet_kind_epoch(kind: event::PacketKind) -> Epoch {
    match kind {
        event::PacketKind::Initial => Epoch::Initial,
        event::PacketKind::ZeroRtt => Epoch::ZeroRtt,
        event::PacketKind::Handshake => Epoch::Handshake,
        event::PacketKind::OneRtt => Epoch::OneRtt,
        event::PacketKind::Retry | event::PacketKind::VersionNegotiation => Epoch::Initial,
    }
}
