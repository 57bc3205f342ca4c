// Copyright 2025 Instanced Maintainers
// SPDX-License-Identifier: Apache-2.0

//! Orchestrates create/destroy/reap across the store, dispatcher and
//! catalog.
//!
//! ```text
//! NONE --create()-->  CREATING  --ok-->     LIVE  --tick(now>expiry)--> DESTROYING --> NONE
//!                         \--err-->       PARTIAL (record present, objects incomplete;
//!                                           operator purge or manual cleanup)
//!                                           LIVE --destroy()-->         DESTROYING --> NONE
//! ```

use std::time::Duration;

use tracing::{error, info, warn};
use uuid::Uuid;

use crate::catalog::Catalog;
use crate::config::CHALLENGE_NAMESPACE;
use crate::dispatcher::Dispatcher;
use crate::store::{InstanceRecord, Store};
use crate::{Error, Result};

/// Holds the collaborators the lifecycle procedures are built from. Does not
/// hold any per-instance in-memory state beyond the catalog snapshot.
#[derive(Clone)]
pub struct Engine {
    store: Store,
    dispatcher: Dispatcher,
    catalog: Catalog,
    default_ttl: String,
}

impl Engine {
    /// Builds an engine from its collaborators and the configured default
    /// instance TTL (a duration string, parsed lazily per-`create`).
    #[must_use]
    pub fn new(store: Store, dispatcher: Dispatcher, catalog: Catalog, default_ttl: String) -> Self {
        Self {
            store,
            dispatcher,
            catalog,
            default_ttl,
        }
    }

    /// Provides access to the store, for uniqueness checks the control API
    /// performs itself (see spec.md §4.6 and §5 on the check-then-act race).
    #[must_use]
    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Provides access to the catalog snapshot, for membership checks.
    #[must_use]
    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Creates a fresh instance of `challenge` for `team`.
    ///
    /// Generates an 8-hex-character uuid, renders the challenge's template
    /// with it, inserts a store record, then dispatches one cluster create
    /// per rendered object in order. On the first dispatch failure, the
    /// already-inserted record and any already-created objects are left in
    /// place (cleanup is deferred to the reaper or an operator purge, per
    /// spec.md §4.5/§9).
    ///
    /// # Errors
    ///
    /// `Error::ChallengeNotFound` if `challenge` isn't in the catalog.
    /// `Error::BadTemplate` if the template fails to render/parse.
    /// `Error::DeployFailed` if any object create fails.
    pub async fn create(&self, team: &str, challenge: &str) -> Result<InstanceRecord> {
        let tmpl = {
            let guard = self.catalog.read().await;
            guard
                .get(challenge)
                .cloned()
                .ok_or_else(|| Error::ChallengeNotFound(challenge.to_string()))?
        };

        let id = &Uuid::new_v4().simple().to_string()[..8];
        let objs = tmpl.render(id)?;

        let ttl = match humantime::parse_duration(&self.default_ttl) {
            Ok(ttl) => ttl,
            Err(e) => {
                warn!(error = %e, configured = %self.default_ttl, "could not parse instance ttl, defaulting to 10 minutes");
                Duration::from_secs(600)
            }
        };

        let record = self.store.insert(ttl, team, challenge, id)?;
        info!(id = record.id, challenge, team, "registered new instance");

        for obj in &objs {
            if let Err(e) = self.dispatcher.create(obj, CHALLENGE_NAMESPACE).await {
                error!(error = %e, challenge, "object creation failed, instance left partial");
                return Err(Error::DeployFailed(e.to_string()));
            }
        }

        Ok(record)
    }

    /// Destroys a live instance: re-renders its challenge's template with the
    /// record's stored uuid to recover the exact object names, deletes each
    /// object, then deletes the store record.
    ///
    /// Best-effort past the template lookup: per-object delete failures and
    /// the final record delete failure are logged as warnings, not
    /// surfaced, so that one stuck object doesn't block the rest of cleanup
    /// or a later reap retry.
    ///
    /// # Errors
    ///
    /// `Error::ChallengeNotFound` if the record's challenge isn't in the
    /// catalog (e.g. removed by a reload since creation).
    pub async fn destroy(&self, record: &InstanceRecord) -> Result<()> {
        let tmpl = {
            let guard = self.catalog.read().await;
            guard
                .get(&record.challenge)
                .cloned()
                .ok_or_else(|| Error::ChallengeNotFound(record.challenge.clone()))?
        };

        let objs = tmpl.render(&record.uuid)?;

        for obj in &objs {
            if let Err(e) = self.dispatcher.delete(obj, CHALLENGE_NAMESPACE).await {
                warn!(error = %e, id = record.id, "error deleting object, continuing");
            }
        }

        if let Err(e) = self.store.delete_by_id(record.id) {
            warn!(error = %e, id = record.id, "error deleting instance record");
        }

        Ok(())
    }

    /// Lists every record, destroys every one whose expiry has passed.
    /// Logs an aggregate count plus per-record outcomes; errors from
    /// individual `destroy` calls are swallowed (they're already warned
    /// internally) so one broken record doesn't stop the sweep.
    pub async fn reap_expired(&self) {
        let records = match self.store.list() {
            Ok(records) => records,
            Err(e) => {
                error!(error = %e, "error reading instance records for reap");
                return;
            }
        };

        let now = std::time::SystemTime::now();
        let expired: Vec<_> = records.into_iter().filter(|r| r.is_expired(now)).collect();
        info!(count = expired.len(), "reaping expired instances");

        for record in expired {
            info!(id = record.id, challenge = %record.challenge, "destroying expired instance");
            if let Err(e) = self.destroy(&record).await {
                error!(error = %e, id = record.id, "error destroying expired instance");
            }
        }
    }

    /// Returns `team`'s live records, augmented with one synthetic
    /// "inactive" record (`expiry = 0`) for every catalog entry the team
    /// hasn't deployed, so a UI can enumerate every challenge's state
    /// uniformly. Hidden CRDs never reach the catalog, so they never appear
    /// here either.
    ///
    /// # Errors
    ///
    /// Returns `Error::Store` if listing the team's records fails.
    pub async fn team_states(&self, team: &str) -> Result<Vec<InstanceRecord>> {
        let mut records = self.store.list_by_team(team)?;

        let guard = self.catalog.read().await;
        for name in guard.keys() {
            if !records.iter().any(|r| &r.challenge == name) {
                records.push(InstanceRecord {
                    id: 0,
                    challenge: name.clone(),
                    team: team.to_string(),
                    uuid: String::new(),
                    expiry: 0,
                });
            }
        }
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::ChallengeTemplate;
    use http::{Request, Response};
    use kube::Client;
    use kube::client::Body;
    use std::collections::HashMap;
    use tower_test::mock;

    fn nginx_template() -> ChallengeTemplate {
        ChallengeTemplate::compile(
            r"apiVersion: v1
kind: ConfigMap
metadata:
  name: nginx-{{ ID }}
",
        )
        .unwrap()
    }

    async fn engine_with_catalog(client: Client, ttl: &str) -> Engine {
        let store = Store::open_in_memory().unwrap();
        let dispatcher = Dispatcher::new(client);
        let mut map = HashMap::new();
        map.insert("nginx".to_string(), nginx_template());
        let catalog = Catalog::new(tokio::sync::RwLock::new(map));
        Engine::new(store, dispatcher, catalog, ttl.to_string())
    }

    #[tokio::test]
    async fn create_unknown_challenge_fails_without_touching_store() {
        let (mock_service, _handle) = mock::pair::<Request<Body>, Response<Body>>();
        let client = Client::new(mock_service, "default");
        let engine = engine_with_catalog(client, "10m").await;

        let err = engine.create("teamA", "ghost").await.unwrap_err();
        assert!(matches!(err, Error::ChallengeNotFound(_)));
        assert!(engine.store().list().unwrap().is_empty());
    }

    #[tokio::test]
    async fn bad_ttl_falls_back_to_ten_minutes() {
        let (mock_service, mut handle) = mock::pair::<Request<Body>, Response<Body>>();
        let client = Client::new(mock_service, "default");
        let engine = engine_with_catalog(client, "not-a-duration").await;

        tokio::spawn(async move {
            let (_request, send) = handle.next_request().await.unwrap();
            let api_resources = serde_json::json!({
                "kind": "APIResourceList", "apiVersion": "v1", "groupVersion": "v1",
                "resources": [{"name": "configmaps", "singularName": "configmap", "namespaced": true, "kind": "ConfigMap", "verbs": []}]
            });
            send.send_response(Response::builder().status(200).body(Body::from(serde_json::to_vec(&api_resources).unwrap())).unwrap());

            let (_request, send) = handle.next_request().await.unwrap();
            let created = serde_json::json!({"apiVersion": "v1", "kind": "ConfigMap", "metadata": {"name": "nginx-deadbeef"}});
            send.send_response(Response::builder().status(201).body(Body::from(serde_json::to_vec(&created).unwrap())).unwrap());
        });

        let record = engine.create("teamA", "nginx").await.unwrap();
        let expected_expiry_floor = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_secs() as i64
            + 599;
        assert!(record.expiry >= expected_expiry_floor);
    }

    #[tokio::test]
    async fn team_states_synthesizes_inactive_entries() {
        let (mock_service, _handle) = mock::pair::<Request<Body>, Response<Body>>();
        let client = Client::new(mock_service, "default");
        let engine = engine_with_catalog(client, "10m").await;

        let states = engine.team_states("teamA").await.unwrap();
        assert_eq!(states.len(), 1);
        assert_eq!(states[0].challenge, "nginx");
        assert_eq!(states[0].expiry, 0);
    }

    #[tokio::test]
    async fn reap_expired_destroys_past_expiry_records_only() {
        let (mock_service, mut handle) = mock::pair::<Request<Body>, Response<Body>>();
        let client = Client::new(mock_service, "default");
        let engine = engine_with_catalog(client, "10m").await;

        let live = engine
            .store()
            .insert(Duration::from_secs(600), "teamA", "nginx", "aaaaaaaa")
            .unwrap();
        let expired = engine
            .store()
            .insert(Duration::from_secs(0), "teamA", "nginx", "bbbbbbbb")
            .unwrap();

        tokio::spawn(async move {
            let api_resources = serde_json::json!({
                "kind": "APIResourceList", "apiVersion": "v1", "groupVersion": "v1",
                "resources": [{"name": "configmaps", "singularName": "configmap", "namespaced": true, "kind": "ConfigMap", "verbs": []}]
            });
            let (_request, send) = handle.next_request().await.unwrap();
            send.send_response(Response::builder().status(200).body(Body::from(serde_json::to_vec(&api_resources).unwrap())).unwrap());
            let (_request, send) = handle.next_request().await.unwrap();
            send.send_response(Response::builder().status(200).body(Body::empty()).unwrap());
        });

        // expiry=0 ttl means "now", so give it a moment to become past-due.
        tokio::time::sleep(Duration::from_millis(1100)).await;

        engine.reap_expired().await;

        let remaining = engine.store().list().unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].id, live.id);
        assert_ne!(remaining[0].id, expired.id);
    }
}
