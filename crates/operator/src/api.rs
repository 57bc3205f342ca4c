// Copyright 2025 Instanced Maintainers
// SPDX-License-Identifier: Apache-2.0

//! HTTP control surface: validates requests, enforces per-team uniqueness,
//! and serializes operations onto the [`Engine`].

use actix_web::web::{Data, Query};
use actix_web::{HttpResponse, Responder, delete, get, post};
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::Error;
use crate::engine::Engine;

#[derive(Serialize)]
struct CreatedResponse {
    action: &'static str,
    challenge: String,
    id: i64,
    url: String,
}

#[derive(Serialize)]
struct DestroyedResponse {
    action: &'static str,
    challenge: String,
    id: i64,
}

fn instance_url(uuid: &str, challenge: &str) -> String {
    format!("https://{uuid}.{challenge}.ctf.maplebacon.org")
}

#[get("/healthz")]
pub async fn healthz() -> impl Responder {
    HttpResponse::Ok().json("healthy")
}

/// `GET /metrics` — Prometheus text exposition of request counters.
#[get("/metrics")]
pub async fn metrics(metrics: Data<crate::metrics::Metrics>) -> impl Responder {
    HttpResponse::Ok()
        .content_type("text/plain; version=0.0.4")
        .body(metrics.encode())
}

#[derive(Deserialize)]
pub struct CreateQuery {
    chal: String,
    team: String,
}

/// `POST /instances?chal=...&team=...`
///
/// Enforces per-team uniqueness with a check-then-act read of the team's
/// current records; this is not strictly atomic under concurrent requests
/// for the same team (spec.md §5), an accepted limitation under the
/// single-writer assumption.
#[post("/instances")]
pub async fn create_instance(engine: Data<Engine>, query: Query<CreateQuery>) -> impl Responder {
    let existing = match engine.store().list_by_team(&query.team) {
        Ok(recs) => recs,
        Err(e) => {
            error!(error = %e, "request failed");
            return HttpResponse::InternalServerError().json("challenge deploy failed: contact admin");
        }
    };
    if existing.iter().any(|r| r.challenge == query.chal) {
        return HttpResponse::TooManyRequests().json("instance already exists for this challenge");
    }

    match engine.create(&query.team, &query.chal).await {
        Ok(record) => {
            info!("processed request to provision new instance");
            HttpResponse::Accepted().json(CreatedResponse {
                action: "created",
                challenge: record.challenge.clone(),
                id: record.id,
                url: instance_url(&record.uuid, &record.challenge),
            })
        }
        Err(Error::ChallengeNotFound(_)) => HttpResponse::NotFound().json("challenge not supported"),
        Err(e) => {
            error!(error = %e, "request failed");
            HttpResponse::InternalServerError().json("challenge deploy failed: contact admin")
        }
    }
}

#[derive(Deserialize)]
pub struct DeleteQuery {
    id: Option<i64>,
}

/// `DELETE /instances?id=...`, or purge-all when `id` is absent.
#[delete("/instances")]
pub async fn delete_instance(engine: Data<Engine>, query: Query<DeleteQuery>) -> impl Responder {
    let Some(id) = query.id else {
        return purge(&engine).await;
    };

    let record = match engine.store().read_by_id(id) {
        Ok(record) => record,
        Err(e) => {
            error!(error = %e, "request failed");
            return HttpResponse::NotFound().json("instance id not found");
        }
    };

    match engine.destroy(&record).await {
        Ok(()) => {
            info!("processed request to destroy an instance");
            HttpResponse::Accepted().json(DestroyedResponse {
                action: "destroyed",
                challenge: record.challenge,
                id: record.id,
            })
        }
        Err(Error::ChallengeNotFound(_)) => HttpResponse::NotFound().json("challenge not supported"),
        Err(e) => {
            error!(error = %e, "request failed");
            HttpResponse::InternalServerError().json("challenge destroy failed: contact admin")
        }
    }
}

async fn purge(engine: &Engine) -> HttpResponse {
    let records = match engine.store().list() {
        Ok(records) => records,
        Err(e) => {
            error!(error = %e, "request failed");
            return HttpResponse::NotFound().json("instance id not found");
        }
    };

    let engine = engine.clone();
    actix_web::rt::spawn(async move {
        for record in records {
            if let Err(e) = engine.destroy(&record).await {
                error!(error = %e, id = record.id, "an instance failed to purge");
            }
        }
    });

    HttpResponse::Accepted().json("instance purge started")
}

/// `GET /instances` — lists every record. Accepted, never validated, per
/// the api-token design note.
#[get("/instances")]
pub async fn list_instances(engine: Data<Engine>) -> impl Responder {
    match engine.store().list() {
        Ok(records) => HttpResponse::Ok().json(records),
        Err(e) => {
            error!(error = %e, "request failed");
            HttpResponse::InternalServerError().json("request failed")
        }
    }
}

#[derive(Deserialize)]
pub struct TeamQuery {
    team: String,
}

/// `GET /challenges?team=...`
#[get("/challenges")]
pub async fn list_team_challenges(engine: Data<Engine>, query: Query<TeamQuery>) -> impl Responder {
    match engine.team_states(&query.team).await {
        Ok(records) => HttpResponse::Ok().json(records),
        Err(e) => {
            error!(error = %e, "request failed");
            HttpResponse::InternalServerError().json("request failed")
        }
    }
}

/// `POST /reload` — kicks off an async CRD reload and returns immediately.
/// Access control is unspecified upstream; this endpoint accepts any
/// request, matching that ambiguity (spec.md §9).
#[post("/reload")]
pub async fn reload(client: Data<kube::Client>, catalog: Data<crate::catalog::Catalog>, config: Data<crate::config::Config>) -> impl Responder {
    let client = (**client).clone();
    let catalog = (**catalog).clone();
    let namespace = config.challenge_namespace.clone();
    let config_challenges = config.challenges.clone();

    actix_web::rt::spawn(async move {
        match crate::crd_loader::load_templates(&client, &namespace).await {
            Ok(crd_challenges) => {
                crate::crd_loader::reload(&catalog, &config_challenges, crd_challenges).await;
            }
            Err(e) => error!(error = %e, "crd reload failed"),
        }
    });

    HttpResponse::Accepted().json("accepted")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::ChallengeTemplate;
    use crate::dispatcher::Dispatcher;
    use crate::store::{InstanceRecord, Store};
    use actix_web::{App, test};
    use http::{Request as HttpRequest, Response as HttpResponse2};
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

    fn test_engine(client: Client) -> Engine {
        let store = Store::open_in_memory().unwrap();
        let dispatcher = Dispatcher::new(client);
        let mut map = HashMap::new();
        map.insert("nginx".to_string(), nginx_template());
        let catalog = crate::catalog::Catalog::new(tokio::sync::RwLock::new(map));
        Engine::new(store, dispatcher, catalog, "10m".to_string())
    }

    #[actix_web::test]
    async fn healthz_returns_healthy() {
        let app = test::init_service(App::new().service(healthz)).await;
        let req = test::TestRequest::get().uri("/healthz").to_request();
        let resp = test::call_service(&app, req).await;
        assert!(resp.status().is_success());
        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body, "healthy");
    }

    #[actix_web::test]
    async fn create_then_duplicate_is_rate_limited() {
        let (mock_service, mut handle) = mock::pair::<HttpRequest<Body>, HttpResponse2<Body>>();
        let client = Client::new(mock_service, "default");
        let engine = test_engine(client);

        tokio::spawn(async move {
            let api_resources = serde_json::json!({
                "kind": "APIResourceList", "apiVersion": "v1", "groupVersion": "v1",
                "resources": [{"name": "configmaps", "singularName": "configmap", "namespaced": true, "kind": "ConfigMap", "verbs": []}]
            });
            let (_req, send) = handle.next_request().await.unwrap();
            send.send_response(HttpResponse2::builder().status(200).body(Body::from(serde_json::to_vec(&api_resources).unwrap())).unwrap());
            let (_req, send) = handle.next_request().await.unwrap();
            let created = serde_json::json!({"apiVersion": "v1", "kind": "ConfigMap", "metadata": {"name": "nginx-deadbeef"}});
            send.send_response(HttpResponse2::builder().status(201).body(Body::from(serde_json::to_vec(&created).unwrap())).unwrap());
        });

        let app = test::init_service(
            App::new()
                .app_data(Data::new(engine))
                .service(create_instance),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/instances?chal=nginx&team=T1")
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), actix_web::http::StatusCode::ACCEPTED);

        let req = test::TestRequest::post()
            .uri("/instances?chal=nginx&team=T1")
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), actix_web::http::StatusCode::TOO_MANY_REQUESTS);
    }

    #[actix_web::test]
    async fn create_unknown_challenge_is_not_found() {
        let (mock_service, _handle) = mock::pair::<HttpRequest<Body>, HttpResponse2<Body>>();
        let client = Client::new(mock_service, "default");
        let engine = test_engine(client);

        let app = test::init_service(
            App::new()
                .app_data(Data::new(engine))
                .service(create_instance),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/instances?chal=ghost&team=T1")
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), actix_web::http::StatusCode::NOT_FOUND);
    }

    #[actix_web::test]
    async fn delete_missing_id_is_not_found() {
        let (mock_service, _handle) = mock::pair::<HttpRequest<Body>, HttpResponse2<Body>>();
        let client = Client::new(mock_service, "default");
        let engine = test_engine(client);

        let app = test::init_service(
            App::new()
                .app_data(Data::new(engine))
                .service(delete_instance),
        )
        .await;

        let req = test::TestRequest::delete().uri("/instances?id=999").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), actix_web::http::StatusCode::NOT_FOUND);
    }

    #[actix_web::test]
    async fn list_team_challenges_includes_inactive_entries() {
        let (mock_service, _handle) = mock::pair::<HttpRequest<Body>, HttpResponse2<Body>>();
        let client = Client::new(mock_service, "default");
        let engine = test_engine(client);

        let app = test::init_service(
            App::new()
                .app_data(Data::new(engine))
                .service(list_team_challenges),
        )
        .await;

        let req = test::TestRequest::get().uri("/challenges?team=T1").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), actix_web::http::StatusCode::OK);
        let body: Vec<InstanceRecord> = test::read_body_json(resp).await;
        assert_eq!(body.len(), 1);
        assert_eq!(body[0].challenge, "nginx");
    }
}
