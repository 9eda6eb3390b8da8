// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

/// Connection lifecycle.
///
/// Client chain: `ClientInit → ClientInitSent → (ClientInitResent) →
/// ClientHandshakeStart → ClientHandshakeProgress → ClientAlmostReady →
/// ClientReady`. Server chain: `ServerInit → ServerHandshake →
/// ServerAlmostReady → ServerReady`. Both end in the common terminal chain
/// `ClosingReceived → Closing → (Draining | Disconnected)`.
///
/// The discriminants order the states so range checks (`>=`) can gate
/// handlers the way the handshake progresses.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum State {
    ClientInit = 0,
    ClientInitSent = 1,
    ClientInitResent = 2,
    ClientHandshakeStart = 3,
    ClientHandshakeProgress = 4,
    ServerInit = 5,
    ServerHandshake = 6,
    ClientAlmostReady = 7,
    ServerAlmostReady = 8,
    ClientReady = 9,
    ServerReady = 10,
    ClosingReceived = 11,
    Closing = 12,
    Draining = 13,
    Disconnected = 14,
}

impl State {
    /// Returns `true` once the connection has entered its terminal chain
    #[inline]
    pub fn is_closing(self) -> bool {
        self >= Self::ClosingReceived
    }

    /// Returns `true` when 1-RTT packets may be read in this state
    #[inline]
    pub fn may_receive_encrypted(self) -> bool {
        self >= Self::ClientAlmostReady && self != Self::Disconnected
    }

    /// Returns `true` when the handshake has fully completed
    #[inline]
    pub fn is_ready(self) -> bool {
        matches!(self, Self::ClientReady | Self::ServerReady)
    }

    #[inline]
    pub fn is_disconnected(self) -> bool {
        self == Self::Disconnected
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ordering_test() {
        assert!(State::ClientInit < State::ClientInitSent);
        assert!(State::ServerHandshake < State::ClientAlmostReady);
        assert!(State::ServerReady < State::ClosingReceived);

        assert!(!State::ServerHandshake.may_receive_encrypted());
        assert!(State::ServerAlmostReady.may_receive_encrypted());
        assert!(State::Closing.may_receive_encrypted());
        assert!(!State::Disconnected.may_receive_encrypted());

        assert!(State::ClosingReceived.is_closing());
        assert!(!State::ServerReady.is_closing());
    }
}
