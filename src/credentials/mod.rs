// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Federated (STS) cloud credential provisioning.

pub mod flow;
pub mod providers;
pub mod secrets;
pub mod service_account;

pub use flow::{provision, sts_standardized_flow, ProvisionOutcome, SecretVisibility};
pub use providers::{select_credentials, ProviderCredentials};
pub use secrets::{SecretReader, SecretWrite, VisibilityWait};
pub use service_account::AnnotationOutcome;
