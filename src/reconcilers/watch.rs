// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Maps labelled secondary objects back to the DataProtectionApplication they belong to.

use crate::constants::labels::{DPA_NAME, OADP_OPERATOR};
use crate::types::DataProtectionApplication;
use kube::runtime::reflector::ObjectRef;
use kube::Resource;

/// Reconcile request for the DPA named in the object's labels.
///
/// Objects without the operator marker label or with an empty DPA name label map to nothing.
/// The request always targets the object's own namespace.
pub fn dpa_ref_for_labels<K: Resource>(obj: &K) -> Option<ObjectRef<DataProtectionApplication>> {
    let meta = obj.meta();
    let labels = meta.labels.as_ref()?;
    labels.get(OADP_OPERATOR).filter(|v| !v.is_empty())?;
    let name = labels.get(DPA_NAME).filter(|v| !v.is_empty())?;

    let dpa_ref = ObjectRef::new(name);
    Some(match meta.namespace.as_deref() {
        Some(ns) => dpa_ref.within(ns),
        None => dpa_ref,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::Secret;
    use kube::api::ObjectMeta;
    use std::collections::BTreeMap;

    fn secret(labels: &[(&str, &str)]) -> Secret {
        Secret {
            metadata: ObjectMeta {
                name: Some("velero-sample-1".to_string()),
                namespace: Some("openshift-adp".to_string()),
                labels: Some(
                    labels
                        .iter()
                        .map(|(k, v)| (k.to_string(), v.to_string()))
                        .collect::<BTreeMap<_, _>>(),
                ),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[test]
    fn test_labelled_secret_maps_to_dpa_in_same_namespace() {
        let dpa_ref =
            dpa_ref_for_labels(&secret(&[(OADP_OPERATOR, "True"), (DPA_NAME, "velero-sample")]))
                .unwrap();

        assert_eq!(dpa_ref.name, "velero-sample");
        assert_eq!(dpa_ref.namespace.as_deref(), Some("openshift-adp"));
    }

    #[test]
    fn test_missing_marker_label_maps_to_nothing() {
        assert!(dpa_ref_for_labels(&secret(&[(DPA_NAME, "velero-sample")])).is_none());
    }

    #[test]
    fn test_empty_marker_label_maps_to_nothing() {
        assert!(dpa_ref_for_labels(&secret(&[(OADP_OPERATOR, ""), (DPA_NAME, "velero-sample")])).is_none());
    }

    #[test]
    fn test_empty_name_label_maps_to_nothing() {
        assert!(dpa_ref_for_labels(&secret(&[(OADP_OPERATOR, "True"), (DPA_NAME, "")])).is_none());
        assert!(dpa_ref_for_labels(&secret(&[(OADP_OPERATOR, "True")])).is_none());
    }

    #[test]
    fn test_unlabelled_object_maps_to_nothing() {
        assert!(dpa_ref_for_labels(&Secret::default()).is_none());
    }
}
