//! Manifest application
//!
//! Applies a multi-document YAML manifest (such as the Flux Operator install
//! bundle) with server-side apply, resolving each object's kind through API
//! discovery.

use kube::api::{Api, DynamicObject, Patch, PatchParams};
use kube::core::GroupVersionKind;
use kube::discovery::{Discovery, Scope};
use kube::{Client, ResourceExt};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::{ClientError, Result};

/// Field manager recorded on applied objects
const FIELD_MANAGER: &str = "flux-burst";

/// Splits a manifest into typed dynamic objects, skipping empty documents
pub fn parse_documents(manifest: &str) -> Result<Vec<DynamicObject>> {
    let mut objects = Vec::new();

    for document in serde_yaml::Deserializer::from_str(manifest) {
        let value = serde_yaml::Value::deserialize(document)
            .map_err(|e| ClientError::InvalidManifest(e.to_string()))?;
        if value.is_null() {
            continue;
        }

        let object: DynamicObject = serde_yaml::from_value(value)
            .map_err(|e| ClientError::InvalidManifest(e.to_string()))?;
        if object.types.is_none() {
            return Err(ClientError::InvalidManifest(format!(
                "object '{}' has no apiVersion/kind",
                object.name_any()
            )));
        }
        objects.push(object);
    }

    Ok(objects)
}

/// Applies every object of the manifest
///
/// Objects whose kind the server does not know are skipped with a warning.
///
/// # Returns
/// Number of objects applied
pub async fn apply(client: &Client, manifest: &str) -> Result<usize> {
    let objects = parse_documents(manifest)?;
    let discovery = Discovery::new(client.clone()).run().await?;
    let params = PatchParams::apply(FIELD_MANAGER).force();
    let mut applied = 0;

    for object in objects {
        let Some(types) = object.types.as_ref() else {
            continue;
        };
        let gvk = GroupVersionKind::try_from(types)
            .map_err(|e| ClientError::InvalidManifest(e.to_string()))?;
        let name = object.name_any();

        let Some((resource, capabilities)) = discovery.resolve_gvk(&gvk) else {
            warn!("Skipping {} {}: kind not served by cluster", gvk.kind, name);
            continue;
        };

        let api: Api<DynamicObject> = if matches!(capabilities.scope, Scope::Namespaced) {
            let namespace = object.namespace().unwrap_or_else(|| "default".to_string());
            Api::namespaced_with(client.clone(), &namespace, &resource)
        } else {
            Api::all_with(client.clone(), &resource)
        };

        let data = serde_json::to_value(&object)
            .map_err(|e| ClientError::InvalidManifest(e.to_string()))?;
        api.patch(&name, &params, &Patch::Apply(data)).await?;

        debug!("Applied {} {}", gvk.kind, name);
        applied += 1;
    }

    Ok(applied)
}

#[cfg(test)]
mod tests {
    use super::*;

    const MANIFEST: &str = r#"
apiVersion: v1
kind: Namespace
metadata:
  name: operator-system
---
---
apiVersion: apps/v1
kind: Deployment
metadata:
  name: operator-controller-manager
  namespace: operator-system
spec:
  replicas: 1
"#;

    #[test]
    fn test_parse_skips_empty_documents() {
        let objects = parse_documents(MANIFEST).unwrap();
        assert_eq!(objects.len(), 2);
        assert_eq!(objects[0].name_any(), "operator-system");
        assert_eq!(objects[1].namespace().as_deref(), Some("operator-system"));
        assert_eq!(objects[1].types.as_ref().unwrap().kind, "Deployment");
    }

    #[test]
    fn test_parse_rejects_untyped_objects() {
        let err = parse_documents("metadata:\n  name: lonely\n").unwrap_err();
        assert!(matches!(err, ClientError::InvalidManifest(_)));
    }
}
