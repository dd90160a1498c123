// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use anyhow::{Context, Result};
use kube::Client;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use dpa_operator::config::Config;
use dpa_operator::credentials::{sts_standardized_flow, SecretVisibility, VisibilityWait};
use dpa_operator::kubernetes::wait_for_dpa_crd;
use dpa_operator::reconcilers::DpaReconciler;

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env()?;
    init_tracing(config.json_logs);

    info!("Starting DataProtectionApplication operator");
    info!(
        "Configuration loaded: watch_namespace={}, resync_interval={:?}",
        config.watch_namespace, config.resync_interval
    );

    let client = Client::try_default().await?;
    info!("Connected to Kubernetes cluster");

    info!("Waiting for DataProtectionApplication CRD to become available...");
    wait_for_dpa_crd(&client).await?;

    // Interrupting startup aborts the visibility wait instead of hanging on it
    let cancel = CancellationToken::new();
    let shutdown = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            shutdown.cancel();
        }
    });

    let visibility = SecretVisibility {
        reader: &client,
        wait: VisibilityWait::new(config.sts_wait_timeout),
    };
    let outcome = sts_standardized_flow(
        &client,
        &config.watch_namespace,
        &config.sts,
        Some(visibility),
        &cancel,
    )
    .await
    .context("failed to provision STS credentials secret")?;

    match outcome {
        Some(outcome) => info!(
            "STS credentials for {} stored in secret {}/{}",
            outcome.provider, outcome.namespace, outcome.secret_name
        ),
        None => info!("No cloud identity configured, using static credentials"),
    }

    DpaReconciler::new(client, config).run().await?;

    warn!("Reconciler stopped unexpectedly");
    Ok(())
}
