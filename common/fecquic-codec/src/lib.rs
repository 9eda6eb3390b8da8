// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Panic-free encoding and decoding primitives for untrusted wire input.

#![cfg_attr(not(any(test, feature = "std")), no_std)]

#[cfg(feature = "alloc")]
extern crate alloc;

#[macro_use]
pub mod decoder;
#[macro_use]
pub mod encoder;
pub mod unaligned;

pub use decoder::*;
pub use encoder::*;
pub use unaligned::*;
