//! Compute Engine instance configuration structures
//!
//! These structs represent the JSON body of an `instances.insert` request.
//! Only the fields this tool sets are modelled.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Instance creation request
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct InstanceSpec {
    pub name: String,
    pub machine_type: String,
    pub disks: Vec<AttachedDisk>,
    pub network_interfaces: Vec<NetworkInterface>,
    pub metadata: Metadata,
    pub service_accounts: Vec<ServiceAccount>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
}

/// Disk attached to the instance
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AttachedDisk {
    pub auto_delete: bool,
    pub boot: bool,
    #[serde(rename = "type")]
    pub disk_type: String,
    pub initialize_params: AttachedDiskInitializeParams,
}

/// Parameters for creating the boot disk alongside the instance
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AttachedDiskInitializeParams {
    /// Serialized as a string, like all int64 fields in the Compute API
    #[serde(with = "int64_string")]
    pub disk_size_gb: u64,
    pub disk_type: String,
    pub source_image: String,
}

/// Network interface with optional external access
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NetworkInterface {
    pub subnetwork: String,
    pub access_configs: Vec<AccessConfig>,
}

/// External (NAT) address configuration
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AccessConfig {
    pub name: String,
    #[serde(rename = "type")]
    pub access_type: String,
    pub network_tier: String,
}

/// Instance metadata; the guest reads these back as attributes
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct Metadata {
    pub items: Vec<MetadataItem>,
}

impl Metadata {
    /// Look up a metadata value by key
    pub fn get(&self, key: &str) -> Option<&str> {
        self.items
            .iter()
            .find(|item| item.key == key)
            .map(|item| item.value.as_str())
    }
}

/// One metadata key/value pair
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct MetadataItem {
    pub key: String,
    pub value: String,
}

/// Identity and OAuth scopes granted to the instance
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ServiceAccount {
    pub email: String,
    pub scopes: Vec<String>,
}

mod int64_string {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &u64, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disk_serializes_with_api_field_names() {
        let disk = AttachedDisk {
            auto_delete: true,
            boot: true,
            disk_type: "PERSISTENT".to_string(),
            initialize_params: AttachedDiskInitializeParams {
                disk_size_gb: 10,
                disk_type: "zones/us-central1-a/diskTypes/pd-balanced".to_string(),
                source_image: "projects/cos-cloud/global/images/family/cos-stable".to_string(),
            },
        };

        let json = serde_json::to_value(&disk).unwrap();
        assert_eq!(json["autoDelete"], true);
        assert_eq!(json["type"], "PERSISTENT");
        assert_eq!(json["initializeParams"]["diskSizeGb"], "10");
        assert_eq!(
            json["initializeParams"]["sourceImage"],
            "projects/cos-cloud/global/images/family/cos-stable"
        );
    }

    #[test]
    fn test_metadata_lookup() {
        let metadata = Metadata {
            items: vec![MetadataItem {
                key: "runbatch-image".to_string(),
                value: "busybox".to_string(),
            }],
        };
        assert_eq!(metadata.get("runbatch-image"), Some("busybox"));
        assert_eq!(metadata.get("startup-script"), None);
    }
}
