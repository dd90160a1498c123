// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! DataProtectionApplication checks run before any resource is written.

use super::dpa::Context;
use super::pipeline::ReconcileStep;
use crate::error::{DpaError, Result};
use crate::types::DataProtectionApplication;
use async_trait::async_trait;
use kube::ResourceExt;
use tracing::debug;

const SUPPORTED_PROVIDERS: &[&str] = &["aws", "gcp", "azure"];

/// Rejects malformed specs and stops the pass for applications being deleted
pub struct ValidateDataProtectionApplication;

#[async_trait]
impl ReconcileStep<Context> for ValidateDataProtectionApplication {
    fn name(&self) -> &'static str {
        "ValidateDataProtectionApplication"
    }

    async fn reconcile(&self, dpa: &DataProtectionApplication, _ctx: &Context) -> Result<bool> {
        if dpa.is_being_deleted() {
            debug!("DataProtectionApplication {} is being deleted", dpa.name_any());
            return Ok(false);
        }
        validate(dpa)?;
        Ok(true)
    }
}

pub fn validate(dpa: &DataProtectionApplication) -> Result<()> {
    let velero = dpa.velero_config().ok_or_else(|| {
        DpaError::Validation("velero configuration is required".to_string())
    })?;

    let locations = &dpa.spec.backup_locations;
    if locations.is_empty() && !velero.no_default_backup_location {
        return Err(DpaError::Validation(
            "no backup locations configured, set noDefaultBackupLocation to run without one"
                .to_string(),
        ));
    }

    let defaults = locations.iter().filter(|l| l.default == Some(true)).count();
    if defaults > 1 {
        return Err(DpaError::Validation(format!(
            "only one backup location can be default, found {}",
            defaults
        )));
    }

    for (i, location) in locations.iter().enumerate() {
        let provider = location
            .provider
            .strip_prefix("velero.io/")
            .unwrap_or(&location.provider);
        if !SUPPORTED_PROVIDERS.contains(&provider) {
            return Err(DpaError::Validation(format!(
                "backup location {} has unsupported provider '{}'",
                i, location.provider
            )));
        }
        if location.object_storage.bucket.trim().is_empty() {
            return Err(DpaError::Validation(format!(
                "backup location {} has no bucket",
                i
            )));
        }
    }

    Ok(())
}
