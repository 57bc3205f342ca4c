// Copyright 2025 Instanced Maintainers
// SPDX-License-Identifier: Apache-2.0

//! Operator entrypoint: wires configuration, store, cluster client, catalog
//! and engine together, then serves the control API until signalled to
//! shut down.

use actix_web::body::MessageBody;
use actix_web::dev::{ServiceRequest, ServiceResponse};
use actix_web::middleware::{self, Next};
use actix_web::web::Data;
use actix_web::{App, Error, HttpServer};
use instanced::catalog::Catalog;
use instanced::config::Config;
use instanced::dispatcher::Dispatcher;
use instanced::engine::Engine;
use instanced::metrics::Metrics;
use instanced::store::Store;
use instanced::{api, crd_loader, telemetry};
use kube::Client;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tracing::{info, instrument, warn};

/// Records every request's path and status in `Metrics`, the way the Go
/// original's `echoprometheus` middleware auto-records each request instead
/// of relying on handlers to instrument themselves.
async fn record_metrics(
    req: ServiceRequest,
    next: Next<impl MessageBody>,
) -> Result<ServiceResponse<impl MessageBody>, Error> {
    let path = req.path().to_string();
    let metrics = req.app_data::<Data<Metrics>>().cloned();
    let res = next.call(req).await?;
    if let Some(metrics) = metrics {
        metrics.observe(&path, res.status().as_u16());
    }
    Ok(res)
}

/// `HttpServer::bind` requires an explicit host; a `":8080"`-style
/// listen-addr (all interfaces) has to be expanded the same way a bare
/// Go `net.Listen("tcp", ":8080")` would.
fn normalize_listen_addr(addr: &str) -> String {
    if let Some(port) = addr.strip_prefix(':') {
        format!("0.0.0.0:{port}")
    } else {
        addr.to_string()
    }
}

#[tokio::main]
#[instrument(level = "info", target = "instanced::main", name = "main")]
async fn main() -> anyhow::Result<()> {
    let config = Config::load()?;
    telemetry::init(&config.log_level)?;

    let store = Store::open(&config.db_file)?;
    let client = Client::try_default().await?;
    let dispatcher = Dispatcher::new(client.clone());
    let catalog: Catalog = Catalog::default();

    match crd_loader::load_templates(&client, &config.challenge_namespace).await {
        Ok(crd_challenges) => {
            crd_loader::reload(&catalog, &config.challenges, crd_challenges).await;
        }
        Err(e) => {
            warn!(error = %e, "initial crd load failed, starting with config-file challenges only");
            crd_loader::reload(&catalog, &config.challenges, HashMap::new()).await;
        }
    }

    let engine = Engine::new(store, dispatcher, catalog.clone(), config.instance_expiry.clone());
    let metrics = Arc::new(Metrics::new());

    let reaper_engine = engine.clone();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(60));
        loop {
            ticker.tick().await;
            reaper_engine.reap_expired().await;
        }
    });

    let log_request = config.log_request;
    let listen_addr = normalize_listen_addr(&config.listen_addr);

    let server = HttpServer::new(move || {
        App::new()
            .app_data(Data::new(engine.clone()))
            .app_data(Data::new(client.clone()))
            .app_data(Data::new(catalog.clone()))
            .app_data(Data::new(config.clone()))
            .app_data(Data::from(metrics.clone()))
            .wrap(middleware::from_fn(record_metrics))
            .wrap(middleware::Condition::new(
                log_request,
                middleware::Logger::default().exclude("/healthz"),
            ))
            .service(api::healthz)
            .service(api::metrics)
            .service(api::create_instance)
            .service(api::delete_instance)
            .service(api::list_instances)
            .service(api::list_team_challenges)
            .service(api::reload)
    })
    .bind(listen_addr.clone())?
    .shutdown_timeout(10);

    info!(addr = %listen_addr, "control api listening");

    tokio::select! {
        res = server.run() => res?,
        _ = signal::ctrl_c() => {
            info!("received shutdown signal");
        },
    };

    Ok(())
}
