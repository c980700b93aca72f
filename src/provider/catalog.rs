//! Provider operation catalog types
//!
//! Mirrors the payload of the ARM `providerOperations` endpoint with
//! `$expand=resourceTypes`.

use serde::{Deserialize, Deserializer, Serialize};

/// A single RBAC operation exposed by a resource provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderOperation {
    /// RBAC action string, e.g. `Microsoft.Compute/virtualMachines/start/action`
    pub name: String,
    /// Human-readable name
    #[serde(default, deserialize_with = "null_as_default")]
    pub display_name: String,
    /// Human-readable description
    #[serde(default, deserialize_with = "null_as_default")]
    pub description: String,
    /// Whether this is a data action rather than a management action
    #[serde(default, deserialize_with = "null_as_default")]
    pub is_data_action: bool,
}

/// A resource type and the operations defined on it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceType {
    /// Hierarchical path segment, e.g. `blobServices/containers/blobs`
    pub name: String,
    /// Operations in catalog order
    #[serde(default, deserialize_with = "null_as_default")]
    pub operations: Vec<ProviderOperation>,
}

/// The operation catalog of one resource provider namespace
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderCatalog {
    /// Provider namespace, e.g. `Microsoft.Compute`
    pub namespace: String,
    /// Provider-level operations
    #[serde(default)]
    pub operations: Vec<ProviderOperation>,
    /// Resource types with their operations
    #[serde(default)]
    pub resource_types: Vec<ResourceType>,
}

/// Raw provider operations metadata as returned by ARM
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProviderOperationsMetadata {
    #[serde(default)]
    id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    operations: Vec<ProviderOperation>,
    #[serde(default, deserialize_with = "null_as_default")]
    resource_types: Vec<ResourceType>,
}

impl ProviderCatalog {
    /// Decode a single provider's operations metadata document.
    ///
    /// The namespace is taken from `name`, or from the last segment of `id`
    /// (`/providers/Microsoft.Authorization/providerOperations/Microsoft.Compute`).
    pub fn from_json(body: &str) -> serde_json::Result<Self> {
        let raw: ProviderOperationsMetadata = serde_json::from_str(body)?;
        let namespace = if raw.name.is_empty() {
            raw.id.rsplit('/').next().unwrap_or_default().to_string()
        } else {
            raw.name
        };

        Ok(Self {
            namespace,
            operations: raw.operations,
            resource_types: raw.resource_types,
        })
    }

    /// Total number of operations across the provider and its resource types
    #[must_use]
    pub fn operation_count(&self) -> usize {
        self.operations.len()
            + self
                .resource_types
                .iter()
                .map(|rt| rt.operations.len())
                .sum::<usize>()
    }
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_json_reads_namespace_from_name() {
        let body = json!({
            "id": "/providers/Microsoft.Authorization/providerOperations/Microsoft.Compute",
            "name": "Microsoft.Compute",
            "displayName": "Microsoft Compute",
            "operations": [
                {"name": "Microsoft.Compute/register/action", "displayName": "Register", "isDataAction": false}
            ],
            "resourceTypes": [
                {
                    "name": "virtualMachines",
                    "displayName": "Virtual Machines",
                    "operations": [
                        {"name": "Microsoft.Compute/virtualMachines/start/action", "displayName": "Start", "description": "Starts the VM", "isDataAction": false},
                        {"name": "Microsoft.Compute/virtualMachines/read"}
                    ]
                }
            ]
        })
        .to_string();

        let catalog = ProviderCatalog::from_json(&body).unwrap();
        assert_eq!(catalog.namespace, "Microsoft.Compute");
        assert_eq!(catalog.operations.len(), 1);
        assert_eq!(catalog.resource_types[0].name, "virtualMachines");
        assert_eq!(
            catalog.resource_types[0].operations[0].description,
            "Starts the VM"
        );
        assert_eq!(catalog.resource_types[0].operations[1].display_name, "");
        assert_eq!(catalog.operation_count(), 3);
    }

    #[test]
    fn test_from_json_falls_back_to_id_segment() {
        let body = json!({
            "id": "/providers/Microsoft.Authorization/providerOperations/Microsoft.KeyVault",
            "resourceTypes": []
        })
        .to_string();

        let catalog = ProviderCatalog::from_json(&body).unwrap();
        assert_eq!(catalog.namespace, "Microsoft.KeyVault");
        assert!(catalog.operations.is_empty());
    }

    #[test]
    fn test_from_json_tolerates_nulls() {
        let body = json!({
            "name": "Microsoft.Storage",
            "operations": null,
            "resourceTypes": [
                {"name": "storageAccounts", "operations": null},
                {"name": "storageAccounts/blobServices/containers/blobs", "operations": [
                    {"name": "Microsoft.Storage/storageAccounts/blobServices/containers/blobs/write", "displayName": null, "description": null, "isDataAction": true}
                ]}
            ]
        })
        .to_string();

        let catalog = ProviderCatalog::from_json(&body).unwrap();
        assert!(catalog.operations.is_empty());
        assert!(catalog.resource_types[0].operations.is_empty());
        assert!(catalog.resource_types[1].operations[0].is_data_action);
    }

    #[test]
    fn test_from_json_rejects_garbage() {
        assert!(ProviderCatalog::from_json("<html>").is_err());
    }
}
