//! # Triggers
//!
//! Maps changes of watched objects back to the gateways they affect.

use crate::crd::{ApplicationGateway, SourceType};
use k8s_openapi::api::core::v1::ConfigMap;
use kube_runtime::reflector::ObjectRef;
use std::sync::Arc;

/// Gateways in the ConfigMap's namespace with a `configmap` source naming it
#[must_use]
pub fn gateways_referencing_config_map(
    gateways: &[Arc<ApplicationGateway>],
    config_map: &ConfigMap,
) -> Vec<ObjectRef<ApplicationGateway>> {
    let Some(cm_name) = config_map.metadata.name.as_deref() else {
        return Vec::new();
    };
    let cm_namespace = config_map.metadata.namespace.as_deref();

    gateways
        .iter()
        .filter(|gw| gw.metadata.namespace.as_deref() == cm_namespace)
        .filter(|gw| {
            gw.spec.configuration.iter().any(|entry| {
                entry.source_type == SourceType::ConfigMap
                    && entry.name.as_deref() == Some(cm_name)
            })
        })
        .map(|gw| ObjectRef::from_obj(gw.as_ref()))
        .collect()
}
