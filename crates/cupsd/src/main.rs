// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2026 cupsd-rs contributors
//
// Entry point. Initialises logging, backend services, the DNS-SD
// advertiser, and the HTTP/IPP listener.

mod app;
mod http_server;
mod services;

use std::sync::Arc;

use app::AppState;

#[tokio::main]
async fn main() -> std::io::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    tracing::info!("cupsd starting");

    let state = match AppState::init() {
        Ok(state) => state,
        Err(e) => {
            tracing::error!(error = %e, "failed to initialise services");
            std::process::exit(1);
        }
    };
    let state = Arc::new(state);

    state.start_discovery();

    http_server::serve(state).await
}
