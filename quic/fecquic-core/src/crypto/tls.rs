// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Seam for the external TLS handshake driver.
//!
//! The pipeline feeds decrypted crypto frames to the frame processor and then
//! advances the handshake through this trait; key installation happens out of
//! band by placing `CryptoContext`s on the connection.

use crate::connection::{Connection, ProcessingError};

pub trait Session {
    /// Advances the TLS state machine for the connection after newly decoded
    /// crypto data
    fn stream_process(&mut self, connection: &mut Connection) -> Result<(), ProcessingError>;

    /// Returns `true` once the TLS handshake has completed for the connection
    fn is_handshake_complete(&self, connection: &Connection) -> bool;
}

#[cfg(any(test, feature = "testing"))]
pub mod testing {
    use super::*;

    /// Test driver: handshake completion is toggled by the test
    #[derive(Debug, Default)]
    pub struct Session {
        pub handshake_complete: bool,
        pub process_calls: usize,
    }

    impl super::Session for Session {
        fn stream_process(&mut self, _connection: &mut Connection) -> Result<(), ProcessingError> {
            self.process_calls += 1;
            Ok(())
        }

        fn is_handshake_complete(&self, _connection: &Connection) -> bool {
            self.handshake_complete
        }
    }
}
