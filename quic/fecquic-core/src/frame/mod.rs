// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Seam for the external frame decoder.
//!
//! The pipeline hands every successfully decrypted payload to a
//! [`Processor`]; stream, ACK and flow-control semantics live behind it.
//! When the processor meets the FEC frame types
//! ([`fec::frame::SOURCE_FPID_TYPE`](crate::fec::frame::SOURCE_FPID_TYPE) and
//! [`fec::frame::REPAIR_TYPE`](crate::fec::frame::REPAIR_TYPE)) it decodes
//! them with [`fec::frame`](crate::fec::frame) and forwards them to the
//! connection's [`fec::State`](crate::fec::State) handlers; the dispatcher
//! finishes the symbol bookkeeping once the payload is fully decoded.

use crate::{
    connection::{Connection, ProcessingError},
    crypto::Epoch,
    path,
    time::Timestamp,
};

pub trait Processor {
    /// Decodes the frames of one decrypted payload
    fn decode(
        &mut self,
        connection: &mut Connection,
        payload: &[u8],
        epoch: Epoch,
        now: Timestamp,
        path_id: path::Id,
    ) -> Result<(), ProcessingError>;

    /// Decodes a payload while the connection is closing; only
    /// connection-close frames are read. Returns `true` when a closing
    /// frame was received.
    fn decode_closing(
        &mut self,
        connection: &mut Connection,
        payload: &[u8],
    ) -> Result<bool, ProcessingError>;
}

#[cfg(any(test, feature = "testing"))]
pub mod testing {
    use super::*;
    use crate::fec;
    use fecquic_codec::DecoderBuffer;

    /// Recorded frame-decoder invocation
    #[derive(Clone, Debug)]
    pub struct Decoded {
        pub payload: Vec<u8>,
        pub epoch: Epoch,
        pub path_id: path::Id,
    }

    /// Test processor: records payloads and understands just enough frame
    /// structure to drive the FEC sublayer (everything else is treated as
    /// padding).
    #[derive(Debug, Default)]
    pub struct Processor {
        pub decoded: Vec<Decoded>,
        pub closing_decoded: usize,
        /// Next `decode_closing` call reports a closing frame
        pub closing_received: bool,
        /// Mark transport parameters as received on the first decode
        pub receive_transport_parameters: bool,
    }

    impl super::Processor for Processor {
        fn decode(
            &mut self,
            connection: &mut Connection,
            payload: &[u8],
            epoch: Epoch,
            now: Timestamp,
            path_id: path::Id,
        ) -> Result<(), ProcessingError> {
            let _ = now;
            self.decoded.push(Decoded {
                payload: payload.to_vec(),
                epoch,
                path_id,
            });

            if self.receive_transport_parameters {
                connection.mark_transport_parameters_received();
            }

            // walk the payload for FEC frames; unknown bytes are padding
            let mut buffer = DecoderBuffer::new(payload);
            while let Ok(frame_type) = buffer.peek_byte(0) {
                match frame_type {
                    fec::frame::SOURCE_FPID_TYPE => {
                        let (frame, remaining) = fec::frame::SourceFpidFrame::decode(buffer)?;
                        if let Some(state) = connection.fec_mut() {
                            state.on_source_fpid_frame(frame);
                        }
                        buffer = remaining;
                    }
                    fec::frame::REPAIR_TYPE => {
                        let (frame, remaining) = fec::frame::RepairFrame::decode(buffer)?;
                        if let Some(state) = connection.fec_mut() {
                            state.on_repair_frame(&frame);
                        }
                        buffer = remaining;
                    }
                    _ => {
                        buffer = buffer.skip(1)?;
                    }
                }
            }

            Ok(())
        }

        fn decode_closing(
            &mut self,
            _connection: &mut Connection,
            _payload: &[u8],
        ) -> Result<bool, ProcessingError> {
            self.closing_decoded += 1;
            Ok(self.closing_received)
        }
    }
}
