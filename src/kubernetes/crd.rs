// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! CRD availability checking utilities

use crate::constants::crd::{POLL_INTERVAL_SECS, POLL_MAX_INTERVAL_SECS};
use crate::error::Result;
use crate::types::DataProtectionApplication;
use kube::{discovery::Discovery, Client, Resource};
use std::time::Duration;
use tokio::time::sleep;
use tracing::{info, warn};

/// Wait for the DataProtectionApplication CRD to be served by the API server.
/// Polls with exponential backoff starting at POLL_INTERVAL_SECS seconds.
pub async fn wait_for_dpa_crd(client: &Client) -> Result<()> {
    let group = DataProtectionApplication::group(&());
    let version = DataProtectionApplication::version(&());
    let mut interval = POLL_INTERVAL_SECS;

    loop {
        match check_dpa_crd_exists(client).await {
            Ok(true) => {
                info!("DataProtectionApplication CRD ({}/{}) is available", group, version);
                return Ok(());
            }
            Ok(false) => {
                info!(
                    "DataProtectionApplication CRD ({}/{}) not yet available, waiting {} seconds...",
                    group, version, interval
                );
            }
            Err(e) => {
                warn!(
                    "Error checking for DataProtectionApplication CRD: {}, retrying in {} seconds...",
                    e, interval
                );
            }
        }

        sleep(Duration::from_secs(interval)).await;

        interval = (interval * 2).min(POLL_MAX_INTERVAL_SECS);
    }
}

async fn check_dpa_crd_exists(client: &Client) -> Result<bool> {
    let group = DataProtectionApplication::group(&());
    let discovery = Discovery::new(client.clone())
        .filter(&[group.as_ref()])
        .run()
        .await?;

    let kind = DataProtectionApplication::kind(&());
    let version = DataProtectionApplication::version(&());
    let found = discovery
        .groups()
        .filter(|g| g.name() == group)
        .flat_map(|g| g.recommended_resources())
        .any(|(ar, _)| ar.kind == kind && ar.version == version);

    Ok(found)
}
