// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Custom resource types watched by the operator.

pub mod dpa;

pub use dpa::{
    set_status_condition, Condition, ConditionStatus, DataProtectionApplication,
    DataProtectionApplicationSpec, DataProtectionApplicationStatus,
};
