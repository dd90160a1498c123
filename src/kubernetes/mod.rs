// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Kubernetes utilities for CRD discovery and event recording.

pub mod crd;
pub mod events;

pub use crd::wait_for_dpa_crd;
pub use events::{EventPublisher, KubeEventPublisher};
