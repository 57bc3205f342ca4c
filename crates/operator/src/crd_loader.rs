// Copyright 2025 Instanced Maintainers
// SPDX-License-Identifier: Apache-2.0

//! Queries `instancedchallenge` custom resources and populates the catalog.

use std::collections::HashMap;

use instanced_crd::InstancedChallenge;
use kube::api::{Api, ListParams};
use kube::{Client, ResourceExt};
use tracing::{debug, info, warn};

use crate::catalog::{Catalog, ChallengeTemplate};

/// Lists `instancedchallenge` resources in `namespace`, compiles every
/// non-hidden entry's template, and returns the resulting name -> template
/// map. Does not touch the catalog itself; the caller decides how to merge
/// this with config-file-sourced entries and swaps it in.
///
/// One bad CRD (missing template, unparsable template) is logged and
/// skipped; it does not fail the whole load.
///
/// # Errors
///
/// Returns an error only if listing the custom resources itself fails
/// (transport, auth, or the CRD not being installed at all).
pub async fn load_templates(
    client: &Client,
    namespace: &str,
) -> crate::Result<HashMap<String, ChallengeTemplate>> {
    let api: Api<InstancedChallenge> = Api::namespaced(client.clone(), namespace);
    let items = api.list(&ListParams::default()).await?;

    let mut templates = HashMap::with_capacity(items.items.len());
    for item in items.items {
        let name = item.name_any();

        if item.spec.hidden {
            debug!(challenge = %name, "skipping hidden challenge CRD");
            continue;
        }

        match ChallengeTemplate::compile(&item.spec.challenge_template) {
            Ok(tmpl) => {
                info!(challenge = %name, "compiled challenge template from CRD");
                templates.insert(name, tmpl);
            }
            Err(e) => {
                warn!(challenge = %name, error = %e, "could not compile challenge CRD's template, skipping");
            }
        }
    }

    Ok(templates)
}

/// Merges `config_challenges` (inline, config-file-sourced) and
/// `crd_challenges` (cluster-sourced) into one map and atomically replaces
/// the catalog's contents. On a name collision, the CRD-sourced entry wins:
/// CRDs are the live, reloadable source, the config file exists to bootstrap
/// a cluster that has no CRDs installed yet.
pub async fn reload(
    catalog: &Catalog,
    config_challenges: &HashMap<String, String>,
    crd_challenges: HashMap<String, ChallengeTemplate>,
) {
    let mut merged = HashMap::with_capacity(config_challenges.len() + crd_challenges.len());
    for (name, text) in config_challenges {
        match ChallengeTemplate::compile(text) {
            Ok(tmpl) => {
                merged.insert(name.clone(), tmpl);
            }
            Err(e) => warn!(challenge = %name, error = %e, "could not compile a config-file challenge template"),
        }
    }
    merged.extend(crd_challenges);

    let count = merged.len();
    let mut guard = catalog.write().await;
    *guard = merged;
    drop(guard);
    info!(count, "catalog reloaded");
}
