// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Reconcile step that provisions the STS credentials secret.

use super::dpa::Context;
use super::pipeline::ReconcileStep;
use crate::credentials::sts_standardized_flow;
use crate::error::{DpaError, Result};
use crate::types::DataProtectionApplication;
use async_trait::async_trait;
use kube::ResourceExt;
use tokio_util::sync::CancellationToken;

/// Keeps the STS credentials secret in the application namespace current.
/// Does not wait for the secret to become readable.
pub struct ReconcileStsCredentials;

#[async_trait]
impl ReconcileStep<Context> for ReconcileStsCredentials {
    fn name(&self) -> &'static str {
        "ReconcileStsCredentials"
    }

    async fn reconcile(&self, dpa: &DataProtectionApplication, ctx: &Context) -> Result<bool> {
        let namespace = dpa
            .namespace()
            .ok_or_else(|| DpaError::Validation("DataProtectionApplication has no namespace".to_string()))?;

        sts_standardized_flow(
            &ctx.client,
            &namespace,
            &ctx.config.sts,
            None,
            &CancellationToken::new(),
        )
        .await?;
        Ok(true)
    }
}
