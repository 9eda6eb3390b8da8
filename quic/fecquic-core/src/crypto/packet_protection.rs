// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use core::fmt;
use fecquic_codec::DecoderError;

/// Removing or applying packet protection failed
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Error {
    reason: &'static str,
}

impl Error {
    /// The AEAD tag did not authenticate the payload
    pub const AEAD_FAILURE: Self = Self::new("aead authentication failed");

    /// The ciphertext sample for header protection did not fit in the payload
    pub const SAMPLE_OUT_OF_RANGE: Self = Self::new("header protection sample out of range");

    pub const fn new(reason: &'static str) -> Self {
        Self { reason }
    }

    pub const fn reason(self) -> &'static str {
        self.reason
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "packet protection error: {}", self.reason)
    }
}

impl std::error::Error for Error {}

impl From<DecoderError> for Error {
    fn from(_error: DecoderError) -> Self {
        Self::SAMPLE_OUT_OF_RANGE
    }
}
