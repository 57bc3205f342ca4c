// Copyright 2025 Instanced Maintainers
// SPDX-License-Identifier: Apache-2.0

//! Request-count metrics exposed over `/metrics`, in the Prometheus text
//! exposition format.

use prometheus_client::encoding::EncodeLabelSet;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::registry::Registry;

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct RequestLabels {
    pub path: String,
    pub status: u16,
}

/// Holds the registry and the one metric family this control API exposes:
/// a request counter keyed by path and response status.
pub struct Metrics {
    registry: Registry,
    requests: Family<RequestLabels, Counter>,
}

impl Metrics {
    #[must_use]
    pub fn new() -> Self {
        let mut registry = Registry::default();
        let requests = Family::<RequestLabels, Counter>::default();
        registry.register(
            "instanced_http_requests",
            "HTTP requests handled by the control API",
            requests.clone(),
        );
        Self { registry, requests }
    }

    pub fn observe(&self, path: &str, status: u16) {
        self.requests
            .get_or_create(&RequestLabels {
                path: path.to_string(),
                status,
            })
            .inc();
    }

    /// Encodes the registry in the Prometheus text exposition format.
    #[must_use]
    pub fn encode(&self) -> String {
        let mut buffer = String::new();
        let _ = prometheus_client::encoding::text::encode(&mut buffer, &self.registry);
        buffer
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_includes_observed_request() {
        let metrics = Metrics::new();
        metrics.observe("/instances", 202);
        let text = metrics.encode();
        assert!(text.contains("instanced_http_requests"));
        assert!(text.contains("202"));
    }
}
