// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

/// A packet number that is still header-protected and cannot be read yet
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ProtectedPacketNumber;
