// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use crate::{crypto::packet_protection, packet::number::SlidingWindowError};
use core::fmt;
use fecquic_codec::DecoderError;

/// The disposition of one incoming segment.
///
/// Transport-layer errors are recovered locally: the segment is dropped and
/// processing continues. Only [`ProcessingError::StatelessReset`] and
/// [`ProcessingError::ProtocolViolation`] surface through the event
/// subscriber.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProcessingError {
    /// The segment was not a valid long or short header
    MalformedHeader(DecoderError),
    /// A server-side Initial arrived in a datagram below the enforced MTU
    InitialTooShort,
    /// Header protection removal or AEAD decryption failed
    AeadCheck,
    /// The packet number was already received for this path and space
    Duplicate,
    /// A valid Retry was observed, or a Retry was enqueued; the packet is
    /// not acknowledged
    Retry,
    /// The packet type is not valid in the connection's current state
    UnexpectedPacket,
    /// The destination or source connection ID invariant was broken
    CnxidCheck,
    /// The segment carried a valid stateless reset token
    StatelessReset,
    /// A transient Initial was rejected and its connection torn down
    ConnectionDeleted,
    /// A writer had insufficient space
    FrameBufferTooSmall,
    /// The peer violated the protocol; the connection is closed
    ProtocolViolation(&'static str),
}

impl ProcessingError {
    /// Returns `true` when the error is recovered locally by dropping the
    /// segment
    pub fn is_benign(self) -> bool {
        !matches!(
            self,
            Self::StatelessReset | Self::ProtocolViolation(_) | Self::FrameBufferTooSmall
        )
    }

    /// Short name for logs and events
    pub fn name(self) -> &'static str {
        match self {
            Self::MalformedHeader(_) => "malformed header",
            Self::InitialTooShort => "initial too short",
            Self::AeadCheck => "aead check",
            Self::Duplicate => "duplicate",
            Self::Retry => "retry",
            Self::UnexpectedPacket => "unexpected packet",
            Self::CnxidCheck => "connection id check",
            Self::StatelessReset => "stateless reset",
            Self::ConnectionDeleted => "connection deleted",
            Self::FrameBufferTooSmall => "frame buffer too small",
            Self::ProtocolViolation(_) => "protocol violation",
        }
    }
}

impl fmt::Display for ProcessingError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::MalformedHeader(error) => write!(f, "malformed header: {error}"),
            Self::ProtocolViolation(reason) => write!(f, "protocol violation: {reason}"),
            other => f.write_str(other.name()),
        }
    }
}

impl std::error::Error for ProcessingError {}

impl From<DecoderError> for ProcessingError {
    fn from(error: DecoderError) -> Self {
        Self::MalformedHeader(error)
    }
}

impl From<packet_protection::Error> for ProcessingError {
    fn from(_error: packet_protection::Error) -> Self {
        Self::AeadCheck
    }
}

impl From<SlidingWindowError> for ProcessingError {
    fn from(_error: SlidingWindowError) -> Self {
        Self::Duplicate
    }
}
