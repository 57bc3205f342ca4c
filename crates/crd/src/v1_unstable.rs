// Copyright 2025 Instanced Maintainers
// SPDX-License-Identifier: Apache-2.0

//! `unstable` CRD resources

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Spec object for the `InstancedChallenge` CRD.
///
/// A cluster operator installs one of these per challenge instead of (or in
/// addition to) listing the challenge inline in the instancer's config file.
/// The instancer never mutates these resources; it only reads them, on
/// startup and whenever `/reload` is hit.
#[derive(CustomResource, Deserialize, Serialize, Clone, Debug, JsonSchema)]
#[cfg_attr(test, derive(Default))]
#[serde(rename_all = "camelCase")]
#[kube(
    kind = "InstancedChallenge",
    group = "k8s.maplebacon.org",
    version = "unstable",
    plural = "instancedchallenges"
)]
#[kube(namespaced)]
pub struct InstancedChallengeSpec {
    /// Hides this challenge from the catalog (and from `teamStates`) without
    /// deleting the resource. Defaults to `false`.
    #[serde(default)]
    pub hidden: bool,
    /// Multi-document manifest text, `---`-delimited, templated with a single
    /// `ID` variable substituted with the instance's 8-character uuid.
    #[schemars(length(min = 1, max = 65536))]
    pub challenge_template: String,
}
