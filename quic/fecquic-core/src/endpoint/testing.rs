// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Deterministic collaborator bundle for driving an endpoint in tests

use crate::{
    crypto::{self, tls, CryptoContext},
    endpoint::Context,
    event, frame, random, token,
};

pub const TEST_TOKEN_KEY: [u8; 16] = [0x42; 16];

/// Bundles testing implementations of every collaborator the dispatcher
/// consumes
#[derive(Debug)]
pub struct TestContext {
    pub frames: frame::testing::Processor,
    pub tls: tls::testing::Session,
    pub token: token::KeyedFormat,
    pub random: random::testing::Generator,
    pub events: event::testing::Subscriber,
}

impl Default for TestContext {
    fn default() -> Self {
        Self {
            frames: frame::testing::Processor::default(),
            tls: tls::testing::Session::default(),
            token: token::KeyedFormat::new(TEST_TOKEN_KEY),
            random: random::testing::Generator::default(),
            events: event::testing::Subscriber::default(),
        }
    }
}

impl TestContext {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Context for TestContext {
    type Frames = frame::testing::Processor;
    type Tls = tls::testing::Session;
    type Token = token::KeyedFormat;
    type Random = random::testing::Generator;
    type Events = event::testing::Subscriber;

    fn frames(&mut self) -> &mut Self::Frames {
        &mut self.frames
    }

    fn tls(&mut self) -> &mut Self::Tls {
        &mut self.tls
    }

    fn token(&mut self) -> &mut Self::Token {
        &mut self.token
    }

    fn random(&mut self) -> &mut Self::Random {
        &mut self.random
    }

    fn events(&mut self) -> &mut Self::Events {
        &mut self.events
    }

    fn initial_crypto(&mut self, version: u32, destination_connection_id: &[u8]) -> CryptoContext {
        crypto::testing::initial_context(version, destination_connection_id)
    }
}
