// Copyright 2025 Instanced Maintainers
// SPDX-License-Identifier: Apache-2.0

//! Instancer internals: store, cluster dispatcher, manifest catalog, CRD
//! loader, lifecycle engine and HTTP control surface.

/// Generic error for the instancer's lifecycle
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// No catalog entry matches the requested challenge name
    #[error("challenge not found: {0}")]
    ChallengeNotFound(String),

    /// A live instance already exists for this `(team, challenge)` pair
    #[error("instance already exists for this challenge")]
    AlreadyExists,

    /// A request parameter was missing or malformed
    #[error("bad request: {0}")]
    BadRequest(String),

    /// A challenge's manifest template failed to compile or render
    #[error("bad challenge template: {0}")]
    BadTemplate(String),

    /// Not every object in a rendered manifest could be created in the cluster
    #[error("instance deployment failed: {0}")]
    DeployFailed(String),

    /// A record id did not resolve to exactly one stored instance
    #[error("instance record not found")]
    NotFound,

    /// The durable store failed
    #[error("store error: {0}")]
    Store(#[from] rusqlite::Error),

    /// Discovery, REST mapping, create or delete against the cluster failed
    #[error("dispatcher error: {0}")]
    Dispatcher(#[from] kube::Error),

    /// An object's `apiVersion` did not parse as a group/version pair
    #[error("dispatcher error: {0}")]
    GroupVersion(#[from] kube::core::gvk::ParseGroupVersionError),

    /// Generic string error messages
    #[error("{0}")]
    Message(String),
}

impl From<String> for Error {
    fn from(msg: String) -> Self {
        Error::Message(msg)
    }
}

/// Generic result type used throughout the instancer
pub type Result<T, E = Error> = std::result::Result<T, E>;

pub mod api;
pub mod catalog;
pub mod config;
pub mod crd_loader;
pub mod dispatcher;
pub mod engine;
pub mod metrics;
pub mod store;
pub mod telemetry;
