//! Shell and submodel descriptor value types.
//!
//! A [`ShellDescriptor`] is the catalog entry for one digital twin. It owns an
//! ordered sequence of [`SubmodelDescriptor`]s; submodels have no lifecycle of
//! their own and are only ever created, replaced, or removed as a mutation of
//! their parent shell.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

/// Field name of the embedded submodel array in the JSON document form.
///
/// Search paths starting with `submodelDescriptors.` address fields inside
/// the nested submodel array.
pub const SUBMODELS_FIELD: &str = "submodelDescriptors";

/// A network endpoint where a shell or submodel can be reached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    /// Interface protocol, e.g. `"HTTP"` or `"OPC-UA"`.
    pub protocol: String,
    /// Endpoint address.
    pub address: String,
}

impl Endpoint {
    pub fn new(protocol: impl Into<String>, address: impl Into<String>) -> Self {
        Endpoint {
            protocol: protocol.into(),
            address: address.into(),
        }
    }
}

/// One typed key of a model reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Key {
    #[serde(rename = "type")]
    pub key_type: String,
    pub value: String,
}

/// A reference to a global asset or a semantic definition.
///
/// Serialized either as `{"keys": [...]}` or as a bare string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Reference {
    /// A typed key sequence.
    Model { keys: Vec<Key> },
    /// A flat global reference.
    Global(String),
}

impl Reference {
    /// Builds a single-key model reference.
    pub fn key(key_type: impl Into<String>, value: impl Into<String>) -> Self {
        Reference::Model {
            keys: vec![Key {
                key_type: key_type.into(),
                value: value.into(),
            }],
        }
    }
}

/// Catalog entry describing where one aspect of a twin can be reached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmodelDescriptor {
    /// Identifier, unique within the owning shell.
    pub id: String,
    #[serde(default)]
    pub id_short: String,
    #[serde(default)]
    pub endpoints: Vec<Endpoint>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub semantic_id: Option<Reference>,
}

impl SubmodelDescriptor {
    pub fn new(id: impl Into<String>, id_short: impl Into<String>) -> Self {
        SubmodelDescriptor {
            id: id.into(),
            id_short: id_short.into(),
            endpoints: Vec::new(),
            semantic_id: None,
        }
    }

    pub fn with_endpoint(mut self, endpoint: Endpoint) -> Self {
        self.endpoints.push(endpoint);
        self
    }

    pub fn with_semantic_id(mut self, semantic_id: Reference) -> Self {
        self.semantic_id = Some(semantic_id);
        self
    }
}

/// Catalog entry for one digital twin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShellDescriptor {
    /// Globally unique shell identifier.
    pub id: String,
    #[serde(default)]
    pub id_short: String,
    #[serde(default)]
    pub endpoints: Vec<Endpoint>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub global_asset_id: Option<Reference>,
    /// Embedded submodels, in registration order.
    #[serde(default)]
    pub submodel_descriptors: Vec<SubmodelDescriptor>,
}

impl ShellDescriptor {
    pub fn new(id: impl Into<String>, id_short: impl Into<String>) -> Self {
        ShellDescriptor {
            id: id.into(),
            id_short: id_short.into(),
            endpoints: Vec::new(),
            global_asset_id: None,
            submodel_descriptors: Vec::new(),
        }
    }

    pub fn with_endpoint(mut self, endpoint: Endpoint) -> Self {
        self.endpoints.push(endpoint);
        self
    }

    pub fn with_global_asset_id(mut self, reference: Reference) -> Self {
        self.global_asset_id = Some(reference);
        self
    }

    pub fn with_submodel(mut self, submodel: SubmodelDescriptor) -> Self {
        self.submodel_descriptors.push(submodel);
        self
    }

    /// Returns the embedded submodel with the given id, if any.
    pub fn submodel(&self, submodel_id: &str) -> Option<&SubmodelDescriptor> {
        self.submodel_descriptors
            .iter()
            .find(|sm| sm.id == submodel_id)
    }

    /// Returns the ids of the embedded submodels in array order.
    pub fn submodel_ids(&self) -> impl Iterator<Item = &str> {
        self.submodel_descriptors.iter().map(|sm| sm.id.as_str())
    }

    /// Returns the first submodel id that occurs more than once in the
    /// embedded array.
    pub fn find_duplicate_submodel_id(&self) -> Option<&str> {
        let mut seen = HashSet::new();
        self.submodel_ids().find(|id| !seen.insert(*id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_field_names() {
        let shell = ShellDescriptor::new("shell-1", "pump")
            .with_global_asset_id(Reference::Global("urn:asset:pump".into()))
            .with_submodel(
                SubmodelDescriptor::new("sm-1", "nameplate")
                    .with_semantic_id(Reference::key("GlobalReference", "urn:sem:nameplate")),
            );

        let json = serde_json::to_value(&shell).unwrap();
        assert_eq!(json["id"], "shell-1");
        assert_eq!(json["idShort"], "pump");
        assert_eq!(json["globalAssetId"], "urn:asset:pump");
        assert_eq!(json[SUBMODELS_FIELD][0]["idShort"], "nameplate");
        assert_eq!(
            json[SUBMODELS_FIELD][0]["semanticId"]["keys"][0]["type"],
            "GlobalReference"
        );

        let back: ShellDescriptor = serde_json::from_value(json).unwrap();
        assert_eq!(back, shell);
    }

    #[test]
    fn test_missing_optional_fields_default() {
        let shell: ShellDescriptor =
            serde_json::from_str(r#"{"id": "bare"}"#).unwrap();
        assert_eq!(shell.id, "bare");
        assert!(shell.id_short.is_empty());
        assert!(shell.submodel_descriptors.is_empty());
        assert!(shell.global_asset_id.is_none());
    }

    #[test]
    fn test_find_duplicate_submodel_id() {
        let unique = ShellDescriptor::new("s", "s")
            .with_submodel(SubmodelDescriptor::new("a", "a"))
            .with_submodel(SubmodelDescriptor::new("b", "b"));
        assert_eq!(unique.find_duplicate_submodel_id(), None);

        let dup = unique
            .clone()
            .with_submodel(SubmodelDescriptor::new("a", "again"));
        assert_eq!(dup.find_duplicate_submodel_id(), Some("a"));
    }

    #[test]
    fn test_submodel_lookup() {
        let shell = ShellDescriptor::new("s", "s")
            .with_submodel(SubmodelDescriptor::new("a", "first"))
            .with_submodel(SubmodelDescriptor::new("b", "second"));
        assert_eq!(shell.submodel("b").map(|sm| sm.id_short.as_str()), Some("second"));
        assert!(shell.submodel("c").is_none());
        assert_eq!(shell.submodel_ids().collect::<Vec<_>>(), vec!["a", "b"]);
    }
}
