// Copyright 2025 Instanced Maintainers
// SPDX-License-Identifier: Apache-2.0

//! Custom resource definitions for the instanced challenge instancer

pub mod v1_unstable;

pub use v1_unstable::InstancedChallenge;
pub use v1_unstable::InstancedChallengeSpec;
