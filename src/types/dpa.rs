// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use crate::constants::{labels, OPERATOR_NAME};
use kube::{CustomResource, ResourceExt};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, Default, schemars::JsonSchema)]
#[kube(
    group = "oadp.openshift.io",
    version = "v1alpha1",
    kind = "DataProtectionApplication",
    shortname = "dpa"
)]
#[kube(namespaced)]
#[kube(status = "DataProtectionApplicationStatus")]
#[serde(rename_all = "camelCase")]
pub struct DataProtectionApplicationSpec {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub backup_locations: Vec<BackupLocation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub configuration: Option<ApplicationConfig>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct BackupLocation {
    pub provider: String,
    pub object_storage: ObjectStorageLocation,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub credential: Option<SecretKeyRef>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<bool>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ObjectStorageLocation {
    pub bucket: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, schemars::JsonSchema)]
pub struct SecretKeyRef {
    pub name: String,
    pub key: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, schemars::JsonSchema)]
pub struct ApplicationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub velero: Option<VeleroConfig>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct VeleroConfig {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub default_plugins: Vec<String>,
    #[serde(default)]
    pub no_default_backup_location: bool,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DataProtectionApplicationStatus {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, schemars::JsonSchema)]
pub enum ConditionStatus {
    True,
    False,
    Unknown,
}

impl fmt::Display for ConditionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConditionStatus::True => "True",
            ConditionStatus::False => "False",
            ConditionStatus::Unknown => "Unknown",
        };
        f.write_str(s)
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    #[serde(rename = "type")]
    pub condition_type: String,
    pub status: ConditionStatus,
    pub reason: String,
    #[serde(default)]
    pub message: String,
    /// RFC 3339 timestamp of the last status flip
    pub last_transition_time: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
}

impl DataProtectionApplication {
    pub fn conditions(&self) -> &[Condition] {
        self.status
            .as_ref()
            .map(|s| s.conditions.as_slice())
            .unwrap_or_default()
    }

    /// Look up a status condition by type
    pub fn condition(&self, condition_type: &str) -> Option<&Condition> {
        self.conditions()
            .iter()
            .find(|c| c.condition_type == condition_type)
    }

    pub fn is_being_deleted(&self) -> bool {
        self.metadata.deletion_timestamp.is_some()
    }

    pub fn velero_config(&self) -> Option<&VeleroConfig> {
        self.spec
            .configuration
            .as_ref()
            .and_then(|c| c.velero.as_ref())
    }

    /// Labels stamped on objects the operator creates for this application
    pub fn app_labels(&self) -> BTreeMap<String, String> {
        BTreeMap::from([
            (labels::APP_NAME.to_string(), "oadp-operator-velero".to_string()),
            (labels::APP_INSTANCE.to_string(), self.name_any()),
            (labels::APP_MANAGED_BY.to_string(), OPERATOR_NAME.to_string()),
            (labels::APP_COMPONENT.to_string(), "Velero".to_string()),
            (
                labels::OADP_OPERATOR.to_string(),
                labels::OADP_OPERATOR_VALUE.to_string(),
            ),
        ])
    }
}

/// Insert or update a condition keyed by its type.
///
/// `last_transition_time` only moves when the status flips, so re-applying the
/// same outcome leaves the list byte-for-byte unchanged. Returns whether anything changed.
pub fn set_status_condition(conditions: &mut Vec<Condition>, new: Condition) -> bool {
    let Some(existing) = conditions
        .iter_mut()
        .find(|c| c.condition_type == new.condition_type)
    else {
        conditions.push(new);
        return true;
    };

    let mut changed = false;
    if existing.status != new.status {
        existing.status = new.status;
        existing.last_transition_time = new.last_transition_time;
        changed = true;
    }
    if existing.reason != new.reason {
        existing.reason = new.reason;
        changed = true;
    }
    if existing.message != new.message {
        existing.message = new.message;
        changed = true;
    }
    if existing.observed_generation != new.observed_generation {
        existing.observed_generation = new.observed_generation;
        changed = true;
    }
    changed
}
